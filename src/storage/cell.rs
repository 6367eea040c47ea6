//! Cell codec.
//!
//! Four cell kinds, one per node kind:
//! - table leaf:     payload-length varint, row-ID varint, local payload,
//!                   then a 4-byte first-overflow page number if it spilled;
//! - table interior: 4-byte left-child page number, row-ID varint;
//! - index leaf:     payload-length varint, local payload, overflow pointer;
//! - index interior: 4-byte left-child, payload-length varint, local
//!                   payload, overflow pointer.
//!
//! The local payload is capped so that several cells always fit on a page;
//! the excess goes into a chain of overflow pages, each a 4-byte next
//! pointer followed by payload bytes.

use crate::storage::pager::Pager;
use crate::types::error::{DatabaseError, Result};
use crate::types::page::PageType;
use crate::types::varint::{read_varint, write_varint};
use crate::types::{PageNo, RowId, OVERFLOW_NEXT_SIZE};

#[derive(Debug, Clone)]
pub struct ParsedCell {
    /// Left child page, present on interior cells.
    pub left_child: Option<PageNo>,
    /// Row ID, present on table cells.
    pub row_id: Option<RowId>,
    /// Full payload length, local and spilled bytes together.
    pub payload_len: usize,
    /// Range of the local payload within the cell bytes.
    pub local_start: usize,
    pub local_len: usize,
    /// First overflow page, if the payload spilled.
    pub overflow: Option<PageNo>,
    /// Total encoded size of the cell.
    pub size: usize,
}

/// Maximum payload stored inline (the X of the spill computation). The
/// cap keeps at least four cells on a page, so splitting a node can always
/// partition its cells across two pages.
pub fn max_local(page_type: PageType, usable: usize) -> usize {
    match page_type {
        PageType::LeafTable | PageType::LeafIndex | PageType::InteriorIndex => {
            (usable - 12) * 64 / 255 - 23
        }
        PageType::InteriorTable => 0,
    }
}

/// Minimum payload kept inline once a cell spills (the M of the spill
/// computation). Shared by every spilling cell kind.
pub fn min_local(usable: usize) -> usize {
    (usable - 12) * 32 / 255 - 23
}

/// How many payload bytes stay in the cell for a payload of `payload_len`.
pub fn local_payload_len(page_type: PageType, usable: usize, payload_len: usize) -> usize {
    let x = max_local(page_type, usable);
    if payload_len <= x {
        return payload_len;
    }
    let m = min_local(usable);
    let k = m + (payload_len - m) % (usable - OVERFLOW_NEXT_SIZE);
    if k <= x {
        k
    } else {
        m
    }
}

pub fn parse_cell(page_type: PageType, bytes: &[u8], usable: usize) -> Result<ParsedCell> {
    let corrupt = |details: &str| DatabaseError::RecordCorrupt {
        details: details.to_string(),
    };

    let mut pos = 0;
    let left_child = if !page_type.is_leaf() {
        if bytes.len() < 4 {
            return Err(corrupt("interior cell shorter than its child pointer"));
        }
        let child = u32::from_be_bytes(bytes[0..4].try_into().unwrap());
        pos = 4;
        Some(child)
    } else {
        None
    };

    if page_type == PageType::InteriorTable {
        let (key, n) = read_varint(&bytes[pos..])?;
        return Ok(ParsedCell {
            left_child,
            row_id: Some(key as i64),
            payload_len: 0,
            local_start: pos + n,
            local_len: 0,
            overflow: None,
            size: pos + n,
        });
    }

    let (payload_len, n) = read_varint(&bytes[pos..])?;
    let payload_len = payload_len as usize;
    pos += n;

    let row_id = if page_type == PageType::LeafTable {
        let (key, n) = read_varint(&bytes[pos..])?;
        pos += n;
        Some(key as i64)
    } else {
        None
    };

    let local_len = local_payload_len(page_type, usable, payload_len);
    if bytes.len() < pos + local_len {
        return Err(corrupt(
            "cell payload length exceeds the physical cell with no overflow to reconcile it",
        ));
    }
    let local_start = pos;
    pos += local_len;

    let overflow = if local_len < payload_len {
        if bytes.len() < pos + OVERFLOW_NEXT_SIZE {
            return Err(corrupt("spilled cell is missing its overflow pointer"));
        }
        let page = u32::from_be_bytes(bytes[pos..pos + 4].try_into().unwrap());
        if page == 0 {
            return Err(corrupt("spilled cell has a zero overflow pointer"));
        }
        pos += OVERFLOW_NEXT_SIZE;
        Some(page)
    } else {
        None
    };

    Ok(ParsedCell {
        left_child,
        row_id,
        payload_len,
        local_start,
        local_len,
        overflow,
        size: pos,
    })
}

/// Encoded size of the cell at the front of `bytes`.
pub fn cell_size(page_type: PageType, bytes: &[u8], usable: usize) -> Result<usize> {
    Ok(parse_cell(page_type, bytes, usable)?.size)
}

pub fn build_table_leaf(
    pager: &mut Pager,
    usable: usize,
    row_id: RowId,
    payload: &[u8],
) -> Result<Vec<u8>> {
    let mut cell = Vec::with_capacity(payload.len() + 18);
    write_varint(&mut cell, payload.len() as u64);
    write_varint(&mut cell, row_id as u64);
    append_payload(pager, PageType::LeafTable, usable, payload, &mut cell)?;
    Ok(cell)
}

pub fn build_table_interior(left_child: PageNo, row_id: RowId) -> Vec<u8> {
    let mut cell = Vec::with_capacity(13);
    cell.extend_from_slice(&left_child.to_be_bytes());
    write_varint(&mut cell, row_id as u64);
    cell
}

pub fn build_index_leaf(pager: &mut Pager, usable: usize, payload: &[u8]) -> Result<Vec<u8>> {
    let mut cell = Vec::with_capacity(payload.len() + 9);
    write_varint(&mut cell, payload.len() as u64);
    append_payload(pager, PageType::LeafIndex, usable, payload, &mut cell)?;
    Ok(cell)
}

pub fn build_index_interior(
    pager: &mut Pager,
    usable: usize,
    left_child: PageNo,
    payload: &[u8],
) -> Result<Vec<u8>> {
    let mut cell = Vec::with_capacity(payload.len() + 13);
    cell.extend_from_slice(&left_child.to_be_bytes());
    write_varint(&mut cell, payload.len() as u64);
    append_payload(pager, PageType::InteriorIndex, usable, payload, &mut cell)?;
    Ok(cell)
}

fn append_payload(
    pager: &mut Pager,
    page_type: PageType,
    usable: usize,
    payload: &[u8],
    cell: &mut Vec<u8>,
) -> Result<()> {
    let local_len = local_payload_len(page_type, usable, payload.len());
    cell.extend_from_slice(&payload[..local_len]);
    if local_len < payload.len() {
        let first = write_overflow_chain(pager, usable, &payload[local_len..])?;
        cell.extend_from_slice(&first.to_be_bytes());
    }
    Ok(())
}

/// Spill `data` into a linked chain of overflow pages, returning the first
/// page number.
fn write_overflow_chain(pager: &mut Pager, usable: usize, data: &[u8]) -> Result<PageNo> {
    let chunk_size = usable - OVERFLOW_NEXT_SIZE;
    let chunks: Vec<&[u8]> = data.chunks(chunk_size).collect();
    let mut pages = Vec::with_capacity(chunks.len());
    for _ in 0..chunks.len() {
        pages.push(pager.allocate()?);
    }
    for (i, chunk) in chunks.iter().enumerate() {
        let next: PageNo = pages.get(i + 1).copied().unwrap_or(0);
        let mut image = vec![0u8; pager.page_size()];
        image[0..4].copy_from_slice(&next.to_be_bytes());
        image[OVERFLOW_NEXT_SIZE..OVERFLOW_NEXT_SIZE + chunk.len()].copy_from_slice(chunk);
        pager.write(pages[i], image)?;
    }
    Ok(pages[0])
}

/// Reassemble a cell's full payload, following its overflow chain.
pub fn read_payload(pager: &mut Pager, cell_bytes: &[u8], parsed: &ParsedCell) -> Result<Vec<u8>> {
    let mut payload = Vec::with_capacity(parsed.payload_len);
    payload.extend_from_slice(&cell_bytes[parsed.local_start..parsed.local_start + parsed.local_len]);

    let usable = pager.usable_size();
    let chunk_size = usable - OVERFLOW_NEXT_SIZE;
    let mut next = parsed.overflow.unwrap_or(0);
    let mut hops = 0usize;
    let max_hops = parsed.payload_len / chunk_size + 2;
    while payload.len() < parsed.payload_len {
        if next == 0 {
            return Err(DatabaseError::RecordCorrupt {
                details: format!(
                    "overflow chain ends early ({} of {} payload bytes)",
                    payload.len(),
                    parsed.payload_len
                ),
            });
        }
        if hops >= max_hops {
            return Err(DatabaseError::RecordCorrupt {
                details: "overflow chain longer than the payload requires".to_string(),
            });
        }
        let image = pager.read(next)?;
        next = u32::from_be_bytes(image[0..4].try_into().unwrap());
        let want = (parsed.payload_len - payload.len()).min(chunk_size);
        payload.extend_from_slice(&image[OVERFLOW_NEXT_SIZE..OVERFLOW_NEXT_SIZE + want]);
        hops += 1;
    }
    Ok(payload)
}

/// Free every page of an overflow chain.
pub fn free_overflow(pager: &mut Pager, first: PageNo) -> Result<()> {
    let mut next = first;
    let mut hops: u32 = 0;
    while next != 0 {
        if hops > pager.page_count() {
            return Err(DatabaseError::CorruptPage {
                page_no: next,
                reason: "overflow chain contains a cycle".to_string(),
            });
        }
        let image = pager.read(next)?;
        let following = u32::from_be_bytes(image[0..4].try_into().unwrap());
        pager.free(next)?;
        next = following;
        hops += 1;
    }
    Ok(())
}
