use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::error::{DatabaseError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Null,
    Integer,
    Real,
    Text,
    Blob,
}

impl DataType {
    pub fn from_string(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "NULL" => Ok(DataType::Null),
            "INTEGER" => Ok(DataType::Integer),
            "REAL" => Ok(DataType::Real),
            "TEXT" => Ok(DataType::Text),
            "BLOB" => Ok(DataType::Blob),
            _ => Err(DatabaseError::TypeMismatch {
                expected: "NULL|INTEGER|REAL|TEXT|BLOB".to_string(),
                actual: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Null => "NULL",
            DataType::Integer => "INTEGER",
            DataType::Real => "REAL",
            DataType::Text => "TEXT",
            DataType::Blob => "BLOB",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Null => DataType::Null,
            Value::Integer(_) => DataType::Integer,
            Value::Real(_) => DataType::Real,
            Value::Text(_) => DataType::Text,
            Value::Blob(_) => DataType::Blob,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_compatible_with_type(&self, data_type: &DataType) -> bool {
        match (self, data_type) {
            (Value::Null, _) => true,
            (Value::Integer(_), DataType::Integer) => true,
            (Value::Integer(_), DataType::Real) => true,
            (Value::Real(_), DataType::Real) => true,
            (Value::Text(_), DataType::Text) => true,
            (Value::Blob(_), DataType::Blob) => true,
            _ => false,
        }
    }

    pub fn from_string(s: &str, data_type: &DataType) -> Result<Self> {
        match data_type {
            DataType::Null => Ok(Value::Null),
            DataType::Integer => s.parse::<i64>().map(Value::Integer).map_err(|_| {
                DatabaseError::TypeMismatch {
                    expected: "INTEGER".to_string(),
                    actual: s.to_string(),
                }
            }),
            DataType::Real => s.parse::<f64>().map(Value::Real).map_err(|_| {
                DatabaseError::TypeMismatch {
                    expected: "REAL".to_string(),
                    actual: s.to_string(),
                }
            }),
            DataType::Text => Ok(Value::Text(s.to_string())),
            DataType::Blob => Ok(Value::Blob(s.as_bytes().to_vec())),
        }
    }

    /// The serial type tag this value takes in a record header.
    /// Integers use the smallest of the 1/2/3/4/6/8-byte forms; the literal
    /// 0 and 1 collapse to the zero-length tags 8 and 9.
    pub fn serial_type(&self) -> u64 {
        match self {
            Value::Null => 0,
            Value::Integer(0) => 8,
            Value::Integer(1) => 9,
            Value::Integer(i) => match *i {
                -128..=127 => 1,
                -32768..=32767 => 2,
                -8_388_608..=8_388_607 => 3,
                -2_147_483_648..=2_147_483_647 => 4,
                -140_737_488_355_328..=140_737_488_355_327 => 5,
                _ => 6,
            },
            Value::Real(_) => 7,
            Value::Blob(b) => 12 + 2 * b.len() as u64,
            Value::Text(s) => 13 + 2 * s.len() as u64,
        }
    }

    /// Body length in bytes for a given serial type tag.
    pub fn serial_type_len(serial_type: u64) -> Result<usize> {
        match serial_type {
            0 | 8 | 9 => Ok(0),
            1 => Ok(1),
            2 => Ok(2),
            3 => Ok(3),
            4 => Ok(4),
            5 => Ok(6),
            6 | 7 => Ok(8),
            10 | 11 => Err(DatabaseError::RecordCorrupt {
                details: format!("reserved serial type {serial_type}"),
            }),
            n => Ok(((n - 12) / 2) as usize),
        }
    }

    /// Append this value's body bytes (big-endian twos-complement for ints).
    pub fn write_body(&self, buf: &mut Vec<u8>) {
        match self {
            Value::Null | Value::Integer(0) | Value::Integer(1) => {}
            Value::Integer(i) => {
                let bytes = i.to_be_bytes();
                let len = Self::serial_type_len(self.serial_type()).unwrap_or(8);
                buf.extend_from_slice(&bytes[8 - len..]);
            }
            Value::Real(r) => buf.extend_from_slice(&r.to_be_bytes()),
            Value::Text(s) => buf.extend_from_slice(s.as_bytes()),
            Value::Blob(b) => buf.extend_from_slice(b),
        }
    }

    /// Decode a value body of the given serial type from the front of `bytes`.
    pub fn read_body(serial_type: u64, bytes: &[u8]) -> Result<(Value, usize)> {
        let len = Self::serial_type_len(serial_type)?;
        if bytes.len() < len {
            return Err(DatabaseError::RecordCorrupt {
                details: format!(
                    "serial type {serial_type} needs {len} bytes, {} available",
                    bytes.len()
                ),
            });
        }
        let value = match serial_type {
            0 => Value::Null,
            8 => Value::Integer(0),
            9 => Value::Integer(1),
            1..=6 => {
                // Sign-extend a big-endian twos-complement integer.
                let mut acc: i64 = if bytes[0] & 0x80 != 0 { -1 } else { 0 };
                for &b in &bytes[..len] {
                    acc = (acc << 8) | i64::from(b);
                }
                Value::Integer(acc)
            }
            7 => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&bytes[..8]);
                Value::Real(f64::from_be_bytes(raw))
            }
            n if n >= 13 && n % 2 == 1 => {
                let text = std::str::from_utf8(&bytes[..len]).map_err(|_| {
                    DatabaseError::RecordCorrupt {
                        details: "invalid UTF-8 in text value".to_string(),
                    }
                })?;
                Value::Text(text.to_string())
            }
            n if n >= 12 => Value::Blob(bytes[..len].to_vec()),
            n => {
                return Err(DatabaseError::RecordCorrupt {
                    details: format!("reserved serial type {n}"),
                });
            }
        };
        Ok((value, len))
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::Text(s) => f.write_str(s),
            Value::Blob(b) => write!(f, "x'{}'", hex(b)),
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Total order used for B-tree keys: NULL sorts first, then numeric values
/// (integers and reals compare numerically across types), then text, then
/// blob. Within reals, NaN is treated as smaller than every other number.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn class(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Integer(_) | Value::Real(_) => 1,
            Value::Text(_) => 2,
            Value::Blob(_) => 3,
        }
    }
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Integer(x), Value::Integer(y)) => x.cmp(y),
        (Value::Real(x), Value::Real(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Value::Integer(x), Value::Real(y)) => {
            (*x as f64).partial_cmp(y).unwrap_or(Ordering::Greater)
        }
        (Value::Real(x), Value::Integer(y)) => {
            x.partial_cmp(&(*y as f64)).unwrap_or(Ordering::Less)
        }
        (Value::Text(x), Value::Text(y)) => x.as_bytes().cmp(y.as_bytes()),
        (Value::Blob(x), Value::Blob(y)) => x.cmp(y),
        _ => class(a).cmp(&class(b)),
    }
}

/// Lexicographic comparison of two key tuples.
pub fn compare_tuples(a: &[Value], b: &[Value]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        let ord = compare_values(x, y);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}
