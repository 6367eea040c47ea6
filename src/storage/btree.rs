//! The B-tree engine.
//!
//! Two tree flavours share the machinery: table trees are keyed by row ID
//! and store a record per leaf cell; index trees are keyed by the whole
//! record (indexed values with the row ID as the final column) and store
//! nothing else. Interior cells hold (left child, separator key); every key
//! under the left child is <= the separator, everything to the right is
//! greater. Index separators are navigational copies of real entries.
//!
//! Pages are always re-acquired from the pager by number. Nothing here
//! keeps a page across operations, so splits and merges can never leave a
//! stale reference behind.

use std::cmp::Ordering;

use log::debug;

use crate::storage::cell::{
    build_index_interior, build_index_leaf, build_table_interior, build_table_leaf, cell_size,
    free_overflow, parse_cell, read_payload, ParsedCell,
};
use crate::storage::pager::Pager;
use crate::types::error::{DatabaseError, Result};
use crate::types::page::{Page, PageType};
use crate::types::record::decode_record;
use crate::types::value::{compare_tuples, Value};
use crate::types::{PageNo, RowId, DB_HEADER_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeKind {
    Table,
    Index,
}

impl TreeKind {
    fn leaf_type(&self) -> PageType {
        match self {
            TreeKind::Table => PageType::LeafTable,
            TreeKind::Index => PageType::LeafIndex,
        }
    }

    fn interior_type(&self) -> PageType {
        match self {
            TreeKind::Table => PageType::InteriorTable,
            TreeKind::Index => PageType::InteriorIndex,
        }
    }
}

/// A search key: a row ID for table trees, a value tuple for index trees.
/// Index tuples may be a prefix (values only, no row ID) when probing.
#[derive(Debug, Clone)]
pub enum Key {
    Row(RowId),
    Tuple(Vec<Value>),
}

impl Key {
    fn row_id(&self) -> RowId {
        match self {
            Key::Row(id) => *id,
            Key::Tuple(values) => values
                .last()
                .and_then(Value::as_integer)
                .unwrap_or_default(),
        }
    }
}

fn key_cmp(a: &Key, b: &Key) -> Ordering {
    match (a, b) {
        (Key::Row(x), Key::Row(y)) => x.cmp(y),
        (Key::Tuple(x), Key::Tuple(y)) => compare_tuples(x, y),
        (Key::Row(_), Key::Tuple(_)) => Ordering::Less,
        (Key::Tuple(_), Key::Row(_)) => Ordering::Greater,
    }
}

/// Separator carried upward out of a split.
enum SepKey {
    /// Table separator: a bare row ID.
    Row(RowId),
    /// Index separator copied up from a leaf: the full key record. The new
    /// interior cell re-spills it, so the leaf keeps its own overflow chain.
    Payload(Vec<u8>),
    /// Index separator pushed up from an interior cell: the cell bytes
    /// after the child pointer, moved verbatim (overflow chain included).
    Tail(Vec<u8>),
}

struct Split {
    left: PageNo,
    right: PageNo,
    sep: SepKey,
}

/// An entry produced by a scan: the cell's key and its full payload.
#[derive(Debug, Clone)]
pub struct ScanEntry {
    pub key: Key,
    pub payload: Vec<u8>,
}

/// Forward-only cursor. Holds only page numbers and slot indices; every
/// step re-reads pages through the pager.
pub struct Cursor {
    stack: Vec<(PageNo, usize)>,
}

pub struct Btree {
    pub root: PageNo,
    kind: TreeKind,
}

impl Btree {
    pub fn open(root: PageNo, kind: TreeKind) -> Self {
        Self { root, kind }
    }

    /// Allocate and initialize an empty tree, returning its root page.
    pub fn create(pager: &mut Pager, kind: TreeKind) -> Result<PageNo> {
        let root = pager.allocate()?;
        let page = Page::new(
            root,
            kind.leaf_type(),
            hdr_off(root),
            pager.page_size(),
            pager.usable_size(),
        );
        pager.write(root, page.into_buf())?;
        Ok(root)
    }

    pub fn kind(&self) -> TreeKind {
        self.kind
    }

    fn load(&self, pager: &mut Pager, page_no: PageNo) -> Result<Page> {
        let buf = pager.read(page_no)?;
        let page = Page::from_buf(page_no, buf, hdr_off(page_no), pager.usable_size())?;
        let expected = [self.kind.leaf_type(), self.kind.interior_type()];
        if !expected.contains(&page.page_type()) {
            return Err(DatabaseError::CorruptPage {
                page_no,
                reason: format!(
                    "page type {:?} does not belong to a {:?} tree",
                    page.page_type(),
                    self.kind
                ),
            });
        }
        Ok(page)
    }

    fn save(&self, pager: &mut Pager, page: &Page) -> Result<()> {
        pager.write(page.page_no, page.buf().to_vec())
    }

    /// Key of the cell at `slot`. Index keys may require following the
    /// cell's overflow chain before they can be decoded.
    fn cell_key(&self, pager: &mut Pager, page: &Page, slot: usize) -> Result<Key> {
        let bytes = page.cell_slice(slot);
        let parsed = parse_cell(page.page_type(), bytes, page.usable())?;
        match self.kind {
            TreeKind::Table => {
                let row_id = parsed.row_id.ok_or_else(|| DatabaseError::CorruptPage {
                    page_no: page.page_no,
                    reason: "table cell without a row ID".to_string(),
                })?;
                Ok(Key::Row(row_id))
            }
            TreeKind::Index => {
                let payload = read_payload(pager, bytes, &parsed)?;
                Ok(Key::Tuple(decode_record(&payload)?))
            }
        }
    }

    /// Binary search within one node. Returns the first slot whose key is
    /// >= `key` and whether it matched exactly. The same slot doubles as
    /// the child to descend on interior nodes (left subtree holds keys <=
    /// its separator) and as the insert position on leaves.
    fn find_slot(&self, pager: &mut Pager, page: &Page, key: &Key) -> Result<(usize, bool)> {
        let mut lo = 0;
        let mut hi = page.cell_count();
        while lo < hi {
            let mid = (lo + hi) / 2;
            match key_cmp(&self.cell_key(pager, page, mid)?, key) {
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
                Ordering::Equal => return Ok((mid, true)),
            }
        }
        Ok((lo, false))
    }

    fn child_at(page: &Page, slot: usize) -> Result<PageNo> {
        if slot < page.cell_count() {
            let parsed = parse_cell(page.page_type(), page.cell_slice(slot), page.usable())?;
            parsed.left_child.ok_or_else(|| DatabaseError::CorruptPage {
                page_no: page.page_no,
                reason: "interior cell without a child pointer".to_string(),
            })
        } else {
            Ok(page.right_child())
        }
    }

    fn parse_slot(page: &Page, slot: usize) -> Result<ParsedCell> {
        parse_cell(page.page_type(), page.cell_slice(slot), page.usable())
    }

    fn gather_cells(page: &Page) -> Result<Vec<Vec<u8>>> {
        (0..page.cell_count())
            .map(|i| {
                let bytes = page.cell_slice(i);
                let size = cell_size(page.page_type(), bytes, page.usable())?;
                Ok(bytes[..size].to_vec())
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // search

    /// Exact lookup. Returns the cell's full payload, or `None` on a miss.
    pub fn search(&self, pager: &mut Pager, key: &Key) -> Result<Option<Vec<u8>>> {
        let mut page_no = self.root;
        let mut hops = 0u32;
        loop {
            if hops > pager.page_count() {
                return Err(DatabaseError::CorruptPage {
                    page_no,
                    reason: "tree deeper than the database has pages".to_string(),
                });
            }
            let page = self.load(pager, page_no)?;
            let (slot, exact) = self.find_slot(pager, &page, key)?;
            if page.page_type().is_leaf() {
                if !exact {
                    return Ok(None);
                }
                let parsed = Self::parse_slot(&page, slot)?;
                return read_payload(pager, page.cell_slice(slot), &parsed).map(Some);
            }
            page_no = Self::child_at(&page, slot)?;
            hops += 1;
        }
    }

    /// Rightmost key of the tree, or `None` when empty.
    pub fn max_key(&self, pager: &mut Pager) -> Result<Option<Key>> {
        let mut page_no = self.root;
        let mut hops = 0u32;
        loop {
            if hops > pager.page_count() {
                return Err(DatabaseError::CorruptPage {
                    page_no,
                    reason: "tree deeper than the database has pages".to_string(),
                });
            }
            let page = self.load(pager, page_no)?;
            if page.page_type().is_leaf() {
                if page.cell_count() == 0 {
                    return Ok(None);
                }
                return self.cell_key(pager, &page, page.cell_count() - 1).map(Some);
            }
            page_no = page.right_child();
            hops += 1;
        }
    }

    // ------------------------------------------------------------------
    // scan

    /// Cursor positioned at the smallest entry.
    pub fn cursor_first(&self, pager: &mut Pager) -> Result<Cursor> {
        self.descend_cursor(pager, None)
    }

    /// Cursor positioned at the first entry >= `key`.
    pub fn cursor_seek(&self, pager: &mut Pager, key: &Key) -> Result<Cursor> {
        self.descend_cursor(pager, Some(key))
    }

    fn descend_cursor(&self, pager: &mut Pager, key: Option<&Key>) -> Result<Cursor> {
        let mut stack = Vec::new();
        let mut page_no = self.root;
        let mut hops = 0u32;
        loop {
            if hops > pager.page_count() {
                return Err(DatabaseError::CorruptPage {
                    page_no,
                    reason: "tree deeper than the database has pages".to_string(),
                });
            }
            let page = self.load(pager, page_no)?;
            let slot = match key {
                Some(key) => self.find_slot(pager, &page, key)?.0,
                None => 0,
            };
            if page.page_type().is_leaf() {
                stack.push((page_no, slot));
                return Ok(Cursor { stack });
            }
            // Record the next child to visit once this subtree is done.
            stack.push((page_no, slot + 1));
            page_no = Self::child_at(&page, slot)?;
            hops += 1;
        }
    }

    /// Advance the cursor, returning the next entry in key order. The
    /// separator copies on interior index pages are never emitted.
    pub fn cursor_next(&self, pager: &mut Pager, cursor: &mut Cursor) -> Result<Option<ScanEntry>> {
        loop {
            let Some(&(page_no, slot)) = cursor.stack.last() else {
                return Ok(None);
            };
            let page = self.load(pager, page_no)?;
            if page.page_type().is_leaf() {
                if slot < page.cell_count() {
                    cursor.stack.last_mut().expect("leaf frame").1 += 1;
                    let parsed = Self::parse_slot(&page, slot)?;
                    let key = self.cell_key(pager, &page, slot)?;
                    let payload = read_payload(pager, page.cell_slice(slot), &parsed)?;
                    return Ok(Some(ScanEntry { key, payload }));
                }
                cursor.stack.pop();
                continue;
            }
            if slot <= page.cell_count() {
                // For interior frames the slot is the next child to visit.
                cursor.stack.last_mut().expect("interior frame").1 += 1;
                let child = Self::child_at(&page, slot)?;
                cursor.stack.push((child, 0));
                continue;
            }
            cursor.stack.pop();
        }
    }

    // ------------------------------------------------------------------
    // insert

    /// Insert a (key, payload) pair. Returns the new root page number when
    /// a root split moved the tree, which the catalog must record.
    pub fn insert(&mut self, pager: &mut Pager, key: &Key, payload: &[u8]) -> Result<Option<PageNo>> {
        let old_root = self.root;
        if let Some(split) = self.insert_into(pager, self.root, key, payload)? {
            let root_no = pager.allocate()?;
            let mut root = Page::new(
                root_no,
                self.kind.interior_type(),
                hdr_off(root_no),
                pager.page_size(),
                pager.usable_size(),
            );
            let sep_cell = self.build_sep_cell(pager, split.left, &split.sep)?;
            root.insert_cell(0, &sep_cell)?;
            root.set_right_child(split.right);
            self.save(pager, &root)?;
            self.root = root_no;
            debug!("root split moved tree root {old_root} -> {root_no}");
        }
        Ok((self.root != old_root).then_some(self.root))
    }

    fn insert_into(
        &mut self,
        pager: &mut Pager,
        page_no: PageNo,
        key: &Key,
        payload: &[u8],
    ) -> Result<Option<Split>> {
        let mut page = self.load(pager, page_no)?;

        if page.page_type().is_leaf() {
            let (slot, exact) = self.find_slot(pager, &page, key)?;
            if exact {
                return Err(DatabaseError::DuplicateKey {
                    row_id: key.row_id(),
                });
            }
            let cell = match self.kind {
                TreeKind::Table => {
                    build_table_leaf(pager, page.usable(), key.row_id(), payload)?
                }
                TreeKind::Index => build_index_leaf(pager, page.usable(), payload)?,
            };
            if page.can_fit(cell.len()) {
                page.insert_cell(slot, &cell)?;
                self.save(pager, &page)?;
                return Ok(None);
            }
            return self.split_page(pager, page, slot, cell).map(Some);
        }

        let (slot, _) = self.find_slot(pager, &page, key)?;
        let child_no = Self::child_at(&page, slot)?;
        let Some(split) = self.insert_into(pager, child_no, key, payload)? else {
            return Ok(None);
        };

        // The pointer that reached the split child now leads to its upper
        // half; the new separator cell re-attaches the lower half.
        if slot < page.cell_count() {
            page.set_cell_child(slot, split.right);
        } else {
            page.set_right_child(split.right);
        }
        let sep_cell = self.build_sep_cell(pager, split.left, &split.sep)?;
        if page.can_fit(sep_cell.len()) {
            page.insert_cell(slot, &sep_cell)?;
            self.save(pager, &page)?;
            return Ok(None);
        }
        self.split_page(pager, page, slot, sep_cell).map(Some)
    }

    /// Split an overfull node. The original page keeps the lower half (and
    /// its page number); the upper half moves to a fresh page. Leaves copy
    /// their separator up, interiors push theirs up.
    fn split_page(
        &mut self,
        pager: &mut Pager,
        mut page: Page,
        pending_slot: usize,
        pending_cell: Vec<u8>,
    ) -> Result<Split> {
        let mut cells = Self::gather_cells(&page)?;
        cells.insert(pending_slot, pending_cell);
        let total: usize = cells.iter().map(|c| c.len() + 2).sum();

        let right_no = pager.allocate()?;
        let mut right = Page::new(
            right_no,
            page.page_type(),
            hdr_off(right_no),
            pager.page_size(),
            pager.usable_size(),
        );

        if page.page_type().is_leaf() {
            // Pick the most balanced split point where both halves fit
            // their page. The left page may be page 1, which is 100 bytes
            // smaller than the rest.
            let left_cap =
                page.usable() - page.hdr_off - page.page_type().header_size();
            let right_cap = pager.usable_size() - page.page_type().header_size();
            let mut best: Option<(usize, usize)> = None;
            let mut prefix = 0;
            for at in 1..cells.len() {
                prefix += cells[at - 1].len() + 2;
                let suffix = total - prefix;
                if prefix <= left_cap && suffix <= right_cap {
                    let imbalance = prefix.abs_diff(suffix);
                    if best.is_none_or(|(_, b)| imbalance < b) {
                        best = Some((at, imbalance));
                    }
                }
            }
            let Some((split_at, _)) = best else {
                return Err(DatabaseError::PageFull {
                    page_no: page.page_no,
                });
            };
            let upper = cells.split_off(split_at);
            page.replace_cells(&cells)?;
            right.replace_cells(&upper)?;

            let last = cells.len() - 1;
            let sep = match self.kind {
                TreeKind::Table => {
                    let parsed = Self::parse_slot(&page, last)?;
                    SepKey::Row(parsed.row_id.unwrap_or_default())
                }
                TreeKind::Index => {
                    let parsed = Self::parse_slot(&page, last)?;
                    let payload = read_payload(pager, page.cell_slice(last), &parsed)?;
                    SepKey::Payload(payload)
                }
            };
            self.save(pager, &page)?;
            self.save(pager, &right)?;
            return Ok(Split {
                left: page.page_no,
                right: right_no,
                sep,
            });
        }

        // Interior: the separator cell leaves the node entirely. Pick the
        // most balanced push-up point where both halves fit their page.
        let left_cap = page.usable() - page.hdr_off - page.page_type().header_size();
        let right_cap = pager.usable_size() - page.page_type().header_size();
        let push_at = {
            let mut best: Option<(usize, usize)> = None;
            let mut prefix = 0;
            for at in 1..cells.len() {
                prefix += cells[at - 1].len() + 2;
                let suffix = total - prefix - (cells[at].len() + 2);
                if prefix <= left_cap && suffix <= right_cap {
                    let imbalance = prefix.abs_diff(suffix);
                    if best.is_none_or(|(_, b)| imbalance < b) {
                        best = Some((at, imbalance));
                    }
                }
            }
            let Some((at, _)) = best else {
                return Err(DatabaseError::PageFull {
                    page_no: page.page_no,
                });
            };
            at
        };
        let old_right_child = page.right_child();
        let upper = cells.split_off(push_at + 1);
        let pushed = cells.pop().expect("push-up separator cell");
        let pushed_parsed = parse_cell(page.page_type(), &pushed, page.usable())?;

        page.replace_cells(&cells)?;
        page.set_right_child(pushed_parsed.left_child.ok_or_else(|| {
            DatabaseError::CorruptPage {
                page_no: page.page_no,
                reason: "interior cell without a child pointer".to_string(),
            }
        })?);
        right.replace_cells(&upper)?;
        right.set_right_child(old_right_child);

        let sep = match self.kind {
            TreeKind::Table => SepKey::Row(pushed_parsed.row_id.unwrap_or_default()),
            TreeKind::Index => SepKey::Tail(pushed[4..].to_vec()),
        };
        self.save(pager, &page)?;
        self.save(pager, &right)?;
        Ok(Split {
            left: page.page_no,
            right: right_no,
            sep,
        })
    }

    fn build_sep_cell(&self, pager: &mut Pager, left: PageNo, sep: &SepKey) -> Result<Vec<u8>> {
        match sep {
            SepKey::Row(row_id) => Ok(build_table_interior(left, *row_id)),
            SepKey::Payload(payload) => {
                let usable = pager.usable_size();
                build_index_interior(pager, usable, left, payload)
            }
            SepKey::Tail(tail) => {
                let mut cell = Vec::with_capacity(4 + tail.len());
                cell.extend_from_slice(&left.to_be_bytes());
                cell.extend_from_slice(tail);
                Ok(cell)
            }
        }
    }

    // ------------------------------------------------------------------
    // delete

    /// Remove the entry with exactly this key. Returns the new root page
    /// number when collapsing the root moved the tree.
    pub fn delete(&mut self, pager: &mut Pager, key: &Key) -> Result<Option<PageNo>> {
        let old_root = self.root;
        let mut path: Vec<(PageNo, usize)> = Vec::new();
        let mut page_no = self.root;
        let (leaf_no, slot) = loop {
            if path.len() > pager.page_count() as usize {
                return Err(DatabaseError::CorruptPage {
                    page_no,
                    reason: "tree deeper than the database has pages".to_string(),
                });
            }
            let page = self.load(pager, page_no)?;
            let (slot, exact) = self.find_slot(pager, &page, key)?;
            if page.page_type().is_leaf() {
                if !exact {
                    return Err(DatabaseError::KeyNotFound);
                }
                break (page_no, slot);
            }
            path.push((page_no, slot));
            page_no = Self::child_at(&page, slot)?;
        };

        let mut leaf = self.load(pager, leaf_no)?;
        let parsed = Self::parse_slot(&leaf, slot)?;
        if let Some(first) = parsed.overflow {
            free_overflow(pager, first)?;
        }
        leaf.remove_cell(slot, parsed.size);
        self.save(pager, &leaf)?;

        // Walk back up, fixing any node the removal left underfull.
        let mut lower = leaf_no;
        while let Some((parent_no, child_slot)) = path.pop() {
            let lower_page = self.load(pager, lower)?;
            if !is_underfull(&lower_page) {
                break;
            }
            self.rebalance_child(pager, parent_no, child_slot)?;
            lower = parent_no;
        }

        // An interior root left with no separators collapses onto its only
        // child; repeat in case a whole spine emptied out.
        loop {
            let root = self.load(pager, self.root)?;
            if root.page_type().is_leaf() || root.cell_count() > 0 {
                break;
            }
            let child = root.right_child();
            let freed = self.root;
            self.root = child;
            pager.free(freed)?;
            debug!("root collapse moved tree root {freed} -> {child}");
        }
        Ok((self.root != old_root).then_some(self.root))
    }

    /// Fix the underfull child at `child_slot` of `parent_no` by merging
    /// with a neighbour when the two fit on one page, otherwise by
    /// borrowing cells through the parent separator.
    fn rebalance_child(
        &mut self,
        pager: &mut Pager,
        parent_no: PageNo,
        child_slot: usize,
    ) -> Result<()> {
        let parent = self.load(pager, parent_no)?;
        let n = parent.cell_count();
        if n == 0 {
            // A single-child interior has no sibling to merge with or
            // borrow from; its own parent (or the root collapse) fixes it.
            return Ok(());
        }
        let child_no = Self::child_at(&parent, child_slot)?;
        let child = self.load(pager, child_no)?;
        if !is_underfull(&child) {
            return Ok(());
        }

        if child_slot > 0 {
            let left_no = Self::child_at(&parent, child_slot - 1)?;
            let left = self.load(pager, left_no)?;
            if self.merge_fits(&parent, child_slot - 1, &left, &child)? {
                return self.merge(pager, parent, child_slot - 1, left, child);
            }
        }
        if child_slot < n {
            let right_no = Self::child_at(&parent, child_slot + 1)?;
            let right = self.load(pager, right_no)?;
            if self.merge_fits(&parent, child_slot, &child, &right)? {
                return self.merge(pager, parent, child_slot, child, right);
            }
        }

        // No merge possible: one neighbour is rich enough to donate.
        if child_slot > 0 {
            let left_no = Self::child_at(&parent, child_slot - 1)?;
            let left = self.load(pager, left_no)?;
            self.borrow_from_left(pager, parent, child_slot, left, child)
        } else {
            let right_no = Self::child_at(&parent, child_slot + 1)?;
            let right = self.load(pager, right_no)?;
            self.borrow_from_right(pager, parent, child_slot, child, right)
        }
    }

    /// Would children `a` (at parent slot `sep_slot`) and `b` fit on one
    /// page, separator included for interiors?
    fn merge_fits(&self, parent: &Page, sep_slot: usize, a: &Page, b: &Page) -> Result<bool> {
        let usable = a.usable().min(b.usable());
        let hdr = a.page_type().header_size();
        let content = (a.usable() - a.content_start()) + (b.usable() - b.content_start());
        let pointers = 2 * (a.cell_count() + b.cell_count());
        let mut needed = content + pointers + hdr;
        if !a.page_type().is_leaf() {
            // The separator comes down and becomes a real cell.
            needed += Self::parse_slot(parent, sep_slot)?.size + 2;
        }
        // Page 1 loses 100 bytes to the database header.
        Ok(needed + hdr_off(a.page_no) <= usable)
    }

    /// Merge child `b` into its left neighbour `a` and drop the separator
    /// at `sep_slot` from the parent. `a` is always the left of the pair,
    /// so page 1 (always the leftmost schema page) is never the one freed.
    fn merge(
        &mut self,
        pager: &mut Pager,
        mut parent: Page,
        sep_slot: usize,
        mut a: Page,
        b: Page,
    ) -> Result<()> {
        let mut cells = Self::gather_cells(&a)?;
        if !a.page_type().is_leaf() {
            // The separator comes down as a real cell gluing the two halves.
            let sep = Self::parse_slot(&parent, sep_slot)?;
            let mid = match self.kind {
                TreeKind::Table => {
                    build_table_interior(a.right_child(), sep.row_id.unwrap_or_default())
                }
                TreeKind::Index => {
                    let bytes = parent.cell_slice(sep_slot);
                    let mut cell = Vec::with_capacity(sep.size);
                    cell.extend_from_slice(&a.right_child().to_be_bytes());
                    cell.extend_from_slice(&bytes[4..sep.size]);
                    cell
                }
            };
            cells.push(mid);
        }
        cells.extend(Self::gather_cells(&b)?);
        a.replace_cells(&cells)?;
        if !a.page_type().is_leaf() {
            a.set_right_child(b.right_child());
        }

        let sep_parsed = Self::parse_slot(&parent, sep_slot)?;
        if a.page_type().is_leaf() {
            // Leaf merges drop the separator copy outright; an index
            // separator may own an overflow chain of its own.
            if let (TreeKind::Index, Some(first)) = (self.kind, sep_parsed.overflow) {
                free_overflow(pager, first)?;
            }
        }
        parent.remove_cell(sep_slot, sep_parsed.size);
        if sep_slot < parent.cell_count() {
            parent.set_cell_child(sep_slot, a.page_no);
        } else {
            parent.set_right_child(a.page_no);
        }

        let freed = b.page_no;
        self.save(pager, &a)?;
        self.save(pager, &parent)?;
        pager.free(freed)?;
        debug!("merged page {freed} into {}", a.page_no);
        Ok(())
    }

    fn borrow_from_left(
        &mut self,
        pager: &mut Pager,
        mut parent: Page,
        child_slot: usize,
        mut left: Page,
        mut child: Page,
    ) -> Result<()> {
        let sep_slot = child_slot - 1;
        let usable = child.usable();
        let mut moved = false;

        while is_underfull(&child) && left.cell_count() > 1 {
            let last = left.cell_count() - 1;
            let last_parsed = Self::parse_slot(&left, last)?;
            let donor_used_after = used_bytes(&left) - last_parsed.size - 2;
            if donor_used_after * 4 < usable {
                break;
            }
            if child.page_type().is_leaf() {
                let cell = left.cell_slice(last)[..last_parsed.size].to_vec();
                if !child.can_fit(cell.len()) {
                    break;
                }
                left.remove_cell(last, last_parsed.size);
                child.insert_cell(0, &cell)?;
            } else {
                // Rotate: the parent separator drops into the child, the
                // donor's last separator replaces it in the parent.
                let old_sep = Self::parse_slot(&parent, sep_slot)?;
                let new_front = match self.kind {
                    TreeKind::Table => build_table_interior(
                        left.right_child(),
                        old_sep.row_id.unwrap_or_default(),
                    ),
                    TreeKind::Index => {
                        let bytes = parent.cell_slice(sep_slot);
                        let mut cell = Vec::with_capacity(old_sep.size);
                        cell.extend_from_slice(&left.right_child().to_be_bytes());
                        cell.extend_from_slice(&bytes[4..old_sep.size]);
                        cell
                    }
                };
                let new_sep = {
                    let bytes = left.cell_slice(last);
                    let mut cell = Vec::with_capacity(last_parsed.size);
                    cell.extend_from_slice(&left.page_no.to_be_bytes());
                    cell.extend_from_slice(&bytes[4..last_parsed.size]);
                    cell
                };
                if !child.can_fit(new_front.len()) {
                    break;
                }
                // The parent swaps one separator for another; sizes differ.
                if parent.free_space() + old_sep.size < new_sep.len() {
                    break;
                }
                let donor_right = last_parsed.left_child.unwrap_or_default();
                left.remove_cell(last, last_parsed.size);
                left.set_right_child(donor_right);
                child.insert_cell(0, &new_front)?;
                parent.remove_cell(sep_slot, old_sep.size);
                parent.insert_cell(sep_slot, &new_sep)?;
                moved = true;
                break; // interior rotation moves exactly one separator
            }
            moved = true;
        }

        if moved && child.page_type().is_leaf() {
            // New leaf separator: the donor's new largest key.
            let last = left.cell_count() - 1;
            let new_sep = match self.kind {
                TreeKind::Table => {
                    let parsed = Self::parse_slot(&left, last)?;
                    build_table_interior(left.page_no, parsed.row_id.unwrap_or_default())
                }
                TreeKind::Index => {
                    let parsed = Self::parse_slot(&left, last)?;
                    let payload = read_payload(pager, left.cell_slice(last), &parsed)?;
                    build_index_interior(pager, usable, left.page_no, &payload)?
                }
            };
            let old_sep = Self::parse_slot(&parent, sep_slot)?;
            if parent.free_space() + old_sep.size < new_sep.len() {
                // The replacement separator does not fit the parent, and
                // the old one no longer bounds the donor. Give the moved
                // cells back and leave the node underfull.
                self.discard_sep_cell(pager, &new_sep)?;
                return self.unwind_leaf_borrow(pager, parent, sep_slot, left, child);
            }
            if let (TreeKind::Index, Some(first)) = (self.kind, old_sep.overflow) {
                free_overflow(pager, first)?;
            }
            parent.remove_cell(sep_slot, old_sep.size);
            parent.insert_cell(sep_slot, &new_sep)?;
        }

        if moved {
            self.save(pager, &left)?;
            self.save(pager, &child)?;
            self.save(pager, &parent)?;
            debug!(
                "borrowed from left sibling {} into {}",
                left.page_no, child.page_no
            );
        }
        Ok(())
    }

    /// Drop a separator cell that never made it into a parent, freeing any
    /// overflow chain it was built with.
    fn discard_sep_cell(&mut self, pager: &mut Pager, cell: &[u8]) -> Result<()> {
        if self.kind == TreeKind::Index {
            let parsed = parse_cell(PageType::InteriorIndex, cell, pager.usable_size())?;
            if let Some(first) = parsed.overflow {
                free_overflow(pager, first)?;
            }
        }
        Ok(())
    }

    /// Give leaf cells moved during an aborted borrow back to the donor.
    /// The untouched parent separator still bounds the donor, so anything
    /// at or below it belongs back on the left page.
    fn unwind_leaf_borrow(
        &mut self,
        pager: &mut Pager,
        parent: Page,
        sep_slot: usize,
        mut left: Page,
        mut child: Page,
    ) -> Result<()> {
        let bound = self.cell_key(pager, &parent, sep_slot)?;
        while child.cell_count() > 0 {
            if key_cmp(&self.cell_key(pager, &child, 0)?, &bound) == Ordering::Greater {
                break;
            }
            let parsed = Self::parse_slot(&child, 0)?;
            let cell = child.cell_slice(0)[..parsed.size].to_vec();
            child.remove_cell(0, parsed.size);
            left.insert_cell(left.cell_count(), &cell)?;
        }
        self.save(pager, &left)?;
        self.save(pager, &child)?;
        Ok(())
    }

    fn borrow_from_right(
        &mut self,
        pager: &mut Pager,
        mut parent: Page,
        child_slot: usize,
        mut child: Page,
        mut right: Page,
    ) -> Result<()> {
        let sep_slot = child_slot;
        let usable = child.usable();
        let mut moved = false;

        while is_underfull(&child) && right.cell_count() > 1 {
            let first_parsed = Self::parse_slot(&right, 0)?;
            let donor_used_after = used_bytes(&right) - first_parsed.size - 2;
            if donor_used_after * 4 < usable {
                break;
            }
            if child.page_type().is_leaf() {
                let cell = right.cell_slice(0)[..first_parsed.size].to_vec();
                if !child.can_fit(cell.len()) {
                    break;
                }
                right.remove_cell(0, first_parsed.size);
                child.insert_cell(child.cell_count(), &cell)?;
                moved = true;
            } else {
                // Rotate through the parent, mirror image of the left case.
                let old_sep = Self::parse_slot(&parent, sep_slot)?;
                let new_back = match self.kind {
                    TreeKind::Table => build_table_interior(
                        child.right_child(),
                        old_sep.row_id.unwrap_or_default(),
                    ),
                    TreeKind::Index => {
                        let bytes = parent.cell_slice(sep_slot);
                        let mut cell = Vec::with_capacity(old_sep.size);
                        cell.extend_from_slice(&child.right_child().to_be_bytes());
                        cell.extend_from_slice(&bytes[4..old_sep.size]);
                        cell
                    }
                };
                let new_sep = {
                    let bytes = right.cell_slice(0);
                    let mut cell = Vec::with_capacity(first_parsed.size);
                    cell.extend_from_slice(&child.page_no.to_be_bytes());
                    cell.extend_from_slice(&bytes[4..first_parsed.size]);
                    cell
                };
                if !child.can_fit(new_back.len()) {
                    break;
                }
                if parent.free_space() + old_sep.size < new_sep.len() {
                    break;
                }
                let donor_first_child = first_parsed.left_child.unwrap_or_default();
                right.remove_cell(0, first_parsed.size);
                child.insert_cell(child.cell_count(), &new_back)?;
                child.set_right_child(donor_first_child);
                parent.remove_cell(sep_slot, old_sep.size);
                parent.insert_cell(sep_slot, &new_sep)?;
                moved = true;
                break;
            }
        }

        if moved && child.page_type().is_leaf() {
            // New separator: the child's new largest key (the moved cell).
            let last = child.cell_count() - 1;
            let new_sep = match self.kind {
                TreeKind::Table => {
                    let parsed = Self::parse_slot(&child, last)?;
                    build_table_interior(child.page_no, parsed.row_id.unwrap_or_default())
                }
                TreeKind::Index => {
                    let parsed = Self::parse_slot(&child, last)?;
                    let payload = read_payload(pager, child.cell_slice(last), &parsed)?;
                    build_index_interior(pager, usable, child.page_no, &payload)?
                }
            };
            let old_sep = Self::parse_slot(&parent, sep_slot)?;
            if parent.free_space() + old_sep.size < new_sep.len() {
                self.discard_sep_cell(pager, &new_sep)?;
                return self.unwind_right_borrow(pager, parent, sep_slot, child, right);
            }
            if let (TreeKind::Index, Some(first)) = (self.kind, old_sep.overflow) {
                free_overflow(pager, first)?;
            }
            parent.remove_cell(sep_slot, old_sep.size);
            parent.insert_cell(sep_slot, &new_sep)?;
        }

        if moved {
            self.save(pager, &child)?;
            self.save(pager, &right)?;
            self.save(pager, &parent)?;
            debug!(
                "borrowed from right sibling {} into {}",
                right.page_no, child.page_no
            );
        }
        Ok(())
    }

    /// Mirror of `unwind_leaf_borrow`: cells taken from the right donor sit
    /// at the child's tail, above the untouched parent separator.
    fn unwind_right_borrow(
        &mut self,
        pager: &mut Pager,
        parent: Page,
        sep_slot: usize,
        mut child: Page,
        mut right: Page,
    ) -> Result<()> {
        let bound = self.cell_key(pager, &parent, sep_slot)?;
        while child.cell_count() > 0 {
            let last = child.cell_count() - 1;
            if key_cmp(&self.cell_key(pager, &child, last)?, &bound) != Ordering::Greater {
                break;
            }
            let parsed = Self::parse_slot(&child, last)?;
            let cell = child.cell_slice(last)[..parsed.size].to_vec();
            child.remove_cell(last, parsed.size);
            right.insert_cell(0, &cell)?;
        }
        self.save(pager, &child)?;
        self.save(pager, &right)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // bulk reclaim

    /// Free every page reachable from `root`, overflow chains included.
    /// Used when a table or index is dropped.
    pub fn reclaim(pager: &mut Pager, root: PageNo) -> Result<usize> {
        let mut stack = vec![root];
        let mut freed = 0usize;
        let mut visited = 0u32;
        while let Some(page_no) = stack.pop() {
            visited += 1;
            if visited > pager.page_count() {
                return Err(DatabaseError::CorruptPage {
                    page_no,
                    reason: "page graph contains a cycle".to_string(),
                });
            }
            let buf = pager.read(page_no)?;
            let page = Page::from_buf(page_no, buf, hdr_off(page_no), pager.usable_size())?;
            for slot in 0..page.cell_count() {
                let parsed = parse_cell(page.page_type(), page.cell_slice(slot), page.usable())?;
                if let Some(first) = parsed.overflow {
                    free_overflow(pager, first)?;
                }
                if let Some(child) = parsed.left_child {
                    stack.push(child);
                }
            }
            if !page.page_type().is_leaf() {
                stack.push(page.right_child());
            }
            pager.free(page_no)?;
            freed += 1;
        }
        debug!("reclaimed {freed} page(s) from tree rooted at {root}");
        Ok(freed)
    }
}

fn hdr_off(page_no: PageNo) -> usize {
    if page_no == 1 {
        DB_HEADER_SIZE
    } else {
        0
    }
}

fn used_bytes(page: &Page) -> usize {
    page.usable() - page.free_space()
}

/// A node under a quarter full wants rebalancing. The root is exempt; the
/// caller never asks about it.
fn is_underfull(page: &Page) -> bool {
    used_bytes(page) * 4 < page.usable()
}
