use crate::types::error::{DatabaseError, Result};
use crate::types::{
    PageNo, CELL_POINTER_SIZE, INTERIOR_PAGE_HEADER_SIZE, LEAF_PAGE_HEADER_SIZE,
    PAGE_TYPE_INTERIOR_INDEX, PAGE_TYPE_INTERIOR_TABLE, PAGE_TYPE_LEAF_INDEX, PAGE_TYPE_LEAF_TABLE,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    InteriorIndex,
    InteriorTable,
    LeafIndex,
    LeafTable,
}

impl PageType {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            PAGE_TYPE_INTERIOR_INDEX => Ok(PageType::InteriorIndex),
            PAGE_TYPE_INTERIOR_TABLE => Ok(PageType::InteriorTable),
            PAGE_TYPE_LEAF_INDEX => Ok(PageType::LeafIndex),
            PAGE_TYPE_LEAF_TABLE => Ok(PageType::LeafTable),
            _ => Err(DatabaseError::InvalidPageType(value)),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            PageType::InteriorIndex => PAGE_TYPE_INTERIOR_INDEX,
            PageType::InteriorTable => PAGE_TYPE_INTERIOR_TABLE,
            PageType::LeafIndex => PAGE_TYPE_LEAF_INDEX,
            PageType::LeafTable => PAGE_TYPE_LEAF_TABLE,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, PageType::LeafIndex | PageType::LeafTable)
    }

    pub fn is_table(&self) -> bool {
        matches!(self, PageType::InteriorTable | PageType::LeafTable)
    }

    pub fn header_size(&self) -> usize {
        if self.is_leaf() {
            LEAF_PAGE_HEADER_SIZE
        } else {
            INTERIOR_PAGE_HEADER_SIZE
        }
    }

    pub fn leaf_variant(&self) -> PageType {
        if self.is_table() {
            PageType::LeafTable
        } else {
            PageType::LeafIndex
        }
    }

    pub fn interior_variant(&self) -> PageType {
        if self.is_table() {
            PageType::InteriorTable
        } else {
            PageType::InteriorIndex
        }
    }
}

/*
 * B-tree page layout (header at byte 0, or byte 100 on page 1):
 * ┌──────────────────────────────────────────────────────────────┐
 * │ type(1) | first_freeblock(2) | cell_count(2) |               │
 * │ content_start(2) | fragmented(1) | [right_child(4)]          │
 * ├──────────────────────────────────────────────────────────────┤
 * │ cell pointer array: u16 offsets, one per cell, in key order  │
 * ├──────────────────────────────────────────────────────────────┤
 * │                         free space                           │
 * ├──────────────────────────────────────────────────────────────┤
 * │ cell content area, growing downward from the usable end      │
 * └──────────────────────────────────────────────────────────────┘
 * All integers big-endian. Freed space is reclaimed by compaction, so the
 * freeblock and fragmented-byte fields stay zero.
 */
pub struct Page {
    pub page_no: PageNo,
    pub hdr_off: usize,
    usable: usize,
    buf: Vec<u8>,
}

impl Page {
    pub fn new(
        page_no: PageNo,
        page_type: PageType,
        hdr_off: usize,
        page_size: usize,
        usable: usize,
    ) -> Self {
        let mut page = Self {
            page_no,
            hdr_off,
            usable,
            buf: vec![0u8; page_size],
        };
        page.buf[hdr_off] = page_type.as_u8();
        page.set_cell_count(0);
        page.set_content_start(usable);
        page
    }

    pub fn from_buf(page_no: PageNo, buf: Vec<u8>, hdr_off: usize, usable: usize) -> Result<Self> {
        if buf.len() < usable || hdr_off + INTERIOR_PAGE_HEADER_SIZE > usable {
            return Err(DatabaseError::CorruptPage {
                page_no,
                reason: "page buffer smaller than usable size".to_string(),
            });
        }
        let page = Self {
            page_no,
            hdr_off,
            usable,
            buf,
        };
        let page_type = PageType::from_u8(page.buf[hdr_off])?;
        let hdr_end = hdr_off + page_type.header_size();
        let count = page.cell_count();
        let ptr_end = hdr_end + count * CELL_POINTER_SIZE;
        if ptr_end > usable || page.content_start() < ptr_end || page.content_start() > usable {
            return Err(DatabaseError::CorruptPage {
                page_no,
                reason: format!(
                    "cell directory out of bounds (cells={count}, content_start={})",
                    page.content_start()
                ),
            });
        }
        for i in 0..count {
            let off = page.cell_offset(i);
            if off < page.content_start() || off >= usable {
                return Err(DatabaseError::CorruptPage {
                    page_no,
                    reason: format!("cell {i} offset {off} outside content area"),
                });
            }
        }
        Ok(page)
    }

    pub fn into_buf(self) -> Vec<u8> {
        self.buf
    }

    pub fn buf(&self) -> &[u8] {
        &self.buf
    }

    pub fn page_type(&self) -> PageType {
        // validated in from_buf / set in new
        PageType::from_u8(self.buf[self.hdr_off]).expect("page type byte")
    }

    pub fn usable(&self) -> usize {
        self.usable
    }

    pub fn cell_count(&self) -> usize {
        u16::from_be_bytes([self.buf[self.hdr_off + 3], self.buf[self.hdr_off + 4]]) as usize
    }

    fn set_cell_count(&mut self, count: usize) {
        self.buf[self.hdr_off + 3..self.hdr_off + 5]
            .copy_from_slice(&(count as u16).to_be_bytes());
    }

    pub fn content_start(&self) -> usize {
        let raw = u16::from_be_bytes([self.buf[self.hdr_off + 5], self.buf[self.hdr_off + 6]]);
        if raw == 0 {
            65536
        } else {
            raw as usize
        }
    }

    fn set_content_start(&mut self, start: usize) {
        let raw = if start == 65536 { 0u16 } else { start as u16 };
        self.buf[self.hdr_off + 5..self.hdr_off + 7].copy_from_slice(&raw.to_be_bytes());
    }

    pub fn right_child(&self) -> PageNo {
        debug_assert!(!self.page_type().is_leaf());
        u32::from_be_bytes([
            self.buf[self.hdr_off + 8],
            self.buf[self.hdr_off + 9],
            self.buf[self.hdr_off + 10],
            self.buf[self.hdr_off + 11],
        ])
    }

    pub fn set_right_child(&mut self, child: PageNo) {
        debug_assert!(!self.page_type().is_leaf());
        self.buf[self.hdr_off + 8..self.hdr_off + 12].copy_from_slice(&child.to_be_bytes());
    }

    fn ptr_array_start(&self) -> usize {
        self.hdr_off + self.page_type().header_size()
    }

    pub fn cell_offset(&self, slot: usize) -> usize {
        let p = self.ptr_array_start() + slot * CELL_POINTER_SIZE;
        u16::from_be_bytes([self.buf[p], self.buf[p + 1]]) as usize
    }

    fn set_cell_offset(&mut self, slot: usize, offset: usize) {
        let p = self.ptr_array_start() + slot * CELL_POINTER_SIZE;
        self.buf[p..p + 2].copy_from_slice(&(offset as u16).to_be_bytes());
    }

    /// Bytes of the cell at `slot`, up to the end of the usable area. The
    /// cell codec determines where the cell actually ends.
    pub fn cell_slice(&self, slot: usize) -> &[u8] {
        &self.buf[self.cell_offset(slot)..self.usable]
    }

    /// Re-point an interior cell at a different child. Interior cells
    /// begin with their 4-byte left-child page number.
    pub fn set_cell_child(&mut self, slot: usize, child: PageNo) {
        debug_assert!(!self.page_type().is_leaf());
        let off = self.cell_offset(slot);
        self.buf[off..off + 4].copy_from_slice(&child.to_be_bytes());
    }

    pub fn free_space(&self) -> usize {
        self.content_start() - self.ptr_array_start() - self.cell_count() * CELL_POINTER_SIZE
    }

    pub fn can_fit(&self, cell_len: usize) -> bool {
        self.free_space() >= cell_len + CELL_POINTER_SIZE
    }

    pub fn insert_cell(&mut self, slot: usize, cell: &[u8]) -> Result<()> {
        let count = self.cell_count();
        debug_assert!(slot <= count);
        if !self.can_fit(cell.len()) {
            return Err(DatabaseError::PageFull {
                page_no: self.page_no,
            });
        }
        let new_start = self.content_start() - cell.len();
        self.buf[new_start..new_start + cell.len()].copy_from_slice(cell);

        // Shift pointers after `slot` right by one entry.
        let ptr_start = self.ptr_array_start();
        let from = ptr_start + slot * CELL_POINTER_SIZE;
        let to = ptr_start + count * CELL_POINTER_SIZE;
        self.buf.copy_within(from..to, from + CELL_POINTER_SIZE);

        self.set_cell_count(count + 1);
        self.set_content_start(new_start);
        self.set_cell_offset(slot, new_start);
        Ok(())
    }

    /// Remove the cell at `slot`, whose encoded length is `cell_len`, and
    /// compact the content area so free space stays contiguous.
    pub fn remove_cell(&mut self, slot: usize, cell_len: usize) {
        let count = self.cell_count();
        debug_assert!(slot < count);
        let removed = self.cell_offset(slot);
        let start = self.content_start();

        // Close the hole: everything below the removed cell slides up.
        self.buf.copy_within(start..removed, start + cell_len);

        // Drop the pointer and fix up offsets that moved.
        let ptr_start = self.ptr_array_start();
        let from = ptr_start + (slot + 1) * CELL_POINTER_SIZE;
        let to = ptr_start + count * CELL_POINTER_SIZE;
        self.buf.copy_within(from..to, from - CELL_POINTER_SIZE);
        self.set_cell_count(count - 1);
        for i in 0..count - 1 {
            let off = self.cell_offset(i);
            if off < removed {
                self.set_cell_offset(i, off + cell_len);
            }
        }
        self.set_content_start(start + cell_len);
    }

    /// Replace the whole cell set, rebuilding the content area compactly.
    pub fn replace_cells(&mut self, cells: &[Vec<u8>]) -> Result<()> {
        let start = self.ptr_array_start();
        self.buf[start..self.usable].fill(0);
        self.set_cell_count(0);
        self.set_content_start(self.usable);
        for (i, cell) in cells.iter().enumerate() {
            self.insert_cell(i, cell)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_read_back() {
        let mut page = Page::new(2, PageType::LeafTable, 0, 512, 512);
        page.insert_cell(0, b"bbb").unwrap();
        page.insert_cell(0, b"aa").unwrap();
        page.insert_cell(2, b"cccc").unwrap();
        assert_eq!(page.cell_count(), 3);
        assert_eq!(&page.cell_slice(0)[..2], b"aa");
        assert_eq!(&page.cell_slice(1)[..3], b"bbb");
        assert_eq!(&page.cell_slice(2)[..4], b"cccc");
    }

    #[test]
    fn remove_compacts_content() {
        let mut page = Page::new(2, PageType::LeafTable, 0, 512, 512);
        page.insert_cell(0, b"aaaa").unwrap();
        page.insert_cell(1, b"bbbb").unwrap();
        page.insert_cell(2, b"cccc").unwrap();
        let free_before = page.free_space();
        page.remove_cell(1, 4);
        assert_eq!(page.cell_count(), 2);
        assert_eq!(&page.cell_slice(0)[..4], b"aaaa");
        assert_eq!(&page.cell_slice(1)[..4], b"cccc");
        assert_eq!(page.free_space(), free_before + 4 + CELL_POINTER_SIZE);
    }

    #[test]
    fn full_page_reports_page_full() {
        let mut page = Page::new(2, PageType::LeafTable, 0, 512, 512);
        let big = vec![0xabu8; 200];
        page.insert_cell(0, &big).unwrap();
        page.insert_cell(1, &big).unwrap();
        let err = page.insert_cell(2, &big).unwrap_err();
        assert!(matches!(err, DatabaseError::PageFull { page_no: 2 }));
    }
}
