//! Record codec.
//!
//! A record is the payload of a table leaf cell and the whole key of an
//! index cell. It starts with a header: one varint giving the header size
//! in bytes (itself included), then one serial-type varint per column. The
//! column bodies follow, tightly packed, in declaration order. Skipping to
//! column `i` therefore only needs the header.

use crate::types::error::{DatabaseError, Result};
use crate::types::value::Value;
use crate::types::varint::{read_varint, varint_len, write_varint};

pub fn encode_record(values: &[Value]) -> Vec<u8> {
    let types: Vec<u64> = values.iter().map(Value::serial_type).collect();
    let types_len: usize = types.iter().map(|&t| varint_len(t)).sum();

    // The header-size varint counts itself, so its width can bump the total.
    let mut header_len = types_len + 1;
    loop {
        let total = types_len + varint_len(header_len as u64);
        if total == header_len {
            break;
        }
        header_len = total;
    }

    let mut buf = Vec::with_capacity(header_len + 16);
    write_varint(&mut buf, header_len as u64);
    for &t in &types {
        write_varint(&mut buf, t);
    }
    for v in values {
        v.write_body(&mut buf);
    }
    buf
}

pub fn decode_record(bytes: &[u8]) -> Result<Vec<Value>> {
    let (header_len, mut header_pos) = read_varint(bytes)?;
    let header_len = header_len as usize;
    if header_len > bytes.len() || header_len < header_pos {
        return Err(DatabaseError::RecordCorrupt {
            details: format!(
                "record header length {header_len} out of bounds ({} payload bytes)",
                bytes.len()
            ),
        });
    }

    let mut types = Vec::new();
    while header_pos < header_len {
        let (serial_type, n) = read_varint(&bytes[header_pos..])?;
        header_pos += n;
        types.push(serial_type);
    }

    let mut body_pos = header_len;
    let mut values = Vec::with_capacity(types.len());
    for serial_type in types {
        let (value, n) = Value::read_body(serial_type, &bytes[body_pos..])?;
        body_pos += n;
        values.push(value);
    }
    Ok(values)
}

/// Decode only column `index`, skipping earlier columns via the header.
pub fn decode_column(bytes: &[u8], index: usize) -> Result<Value> {
    let (header_len, mut header_pos) = read_varint(bytes)?;
    let header_len = header_len as usize;
    if header_len > bytes.len() || header_len < header_pos {
        return Err(DatabaseError::RecordCorrupt {
            details: "record header length out of bounds".to_string(),
        });
    }

    let mut body_pos = header_len;
    let mut col = 0;
    while header_pos < header_len {
        let (serial_type, n) = read_varint(&bytes[header_pos..])?;
        header_pos += n;
        if col == index {
            let (value, _) = Value::read_body(serial_type, &bytes[body_pos..])?;
            return Ok(value);
        }
        body_pos += Value::serial_type_len(serial_type)?;
        col += 1;
    }
    Err(DatabaseError::RecordCorrupt {
        details: format!("record has {col} columns, wanted column {index}"),
    })
}

/// Number of columns in the record, read from the header alone.
pub fn record_column_count(bytes: &[u8]) -> Result<usize> {
    let (header_len, mut header_pos) = read_varint(bytes)?;
    let header_len = header_len as usize;
    let mut count = 0;
    while header_pos < header_len {
        let (_, n) = read_varint(
            bytes
                .get(header_pos..)
                .ok_or_else(|| DatabaseError::RecordCorrupt {
                    details: "record header overruns payload".to_string(),
                })?,
        )?;
        header_pos += n;
        count += 1;
    }
    Ok(count)
}
