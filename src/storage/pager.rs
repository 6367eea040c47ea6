use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::debug;

use crate::storage::header::{validate_page_size, DatabaseHeader};
use crate::storage::wal::Wal;
use crate::types::error::{DatabaseError, Result};
use crate::types::page::{Page, PageType};
use crate::types::{PageNo, DB_HEADER_SIZE, MAX_PAGE_COUNT};

/// Cached frames beyond this are eligible for eviction (clean frames only;
/// dirty frames stay pinned until commit or rollback).
const MAX_CACHED_PAGES: usize = 256;

/// Trunk page layout: next-trunk (4), leaf count (4), leaf page numbers.
const TRUNK_HEADER_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Idle,
    Active,
    Committing,
    RollingBack,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PagerStats {
    /// Pages handed out by `read`, cached or not.
    pub pages_read: u64,
    /// Pages actually fetched from disk.
    pub pages_fetched: u64,
    /// Pages staged by `write`.
    pub pages_written: u64,
    pub pages_allocated: u64,
    pub pages_freed: u64,
}

struct Frame {
    data: Vec<u8>,
    dirty: bool,
    last_access: u64,
}

/// Page-level I/O: maps the flat database file onto fixed-size pages,
/// caches them, allocates and frees through the freelist, and stages every
/// write in memory until the write-ahead log commits it.
///
/// One pager instance owns one open database handle; there is no implicit
/// shared state between handles.
pub struct Pager {
    path: PathBuf,
    file: File,
    wal: Wal,
    header: DatabaseHeader,
    header_dirty: bool,
    page_size: usize,
    usable: usize,
    cache: HashMap<PageNo, Frame>,
    access_counter: u64,
    state: TxState,
    stats: PagerStats,
}

impl std::fmt::Debug for Pager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pager")
            .field("path", &self.path)
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

impl Pager {
    /// Create a fresh database file. Page 1 is written out as the database
    /// header followed by an empty table-leaf node: the schema tree root.
    pub fn create<P: AsRef<Path>>(path: P, page_size: usize) -> Result<Self> {
        validate_page_size(page_size)?;
        let path = path.as_ref();
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(path)?;

        let header = DatabaseHeader::with_page_size(page_size as u32);
        let usable = header.usable_page_size();
        let page1 = Page::new(1, PageType::LeafTable, DB_HEADER_SIZE, page_size, usable);
        let mut buf = page1.into_buf();
        buf[..DB_HEADER_SIZE].copy_from_slice(&header.to_bytes());
        file.write_all(&buf)?;
        file.sync_all()?;

        let wal = Wal::open(path, page_size)?;
        debug!("created database {} (page size {page_size})", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            file,
            wal,
            header,
            header_dirty: false,
            page_size,
            usable,
            cache: HashMap::new(),
            access_counter: 0,
            state: TxState::Idle,
            stats: PagerStats::default(),
        })
    }

    /// Open an existing database, replaying any committed write-ahead log
    /// frames left behind by an interrupted process.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;

        let mut header_buf = [0u8; DB_HEADER_SIZE];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut header_buf)?;
        let mut header = DatabaseHeader::from_bytes(&header_buf)?;
        let page_size = header.page_size as usize;

        let mut wal = Wal::open(path, page_size)?;
        let replayed = wal.recover(&mut file)?;
        if replayed > 0 {
            // The header itself may have been part of the replayed commit.
            file.seek(SeekFrom::Start(0))?;
            file.read_exact(&mut header_buf)?;
            header = DatabaseHeader::from_bytes(&header_buf)?;
        }

        let file_len = file.metadata()?.len();
        let expected = header.page_count as u64 * page_size as u64;
        if file_len != expected {
            return Err(DatabaseError::InvalidHeader {
                reason: format!(
                    "file is {file_len} bytes but the header claims {} page(s) of {page_size}",
                    header.page_count
                ),
            });
        }

        let usable = header.usable_page_size();
        Ok(Self {
            path: path.to_path_buf(),
            file,
            wal,
            header,
            header_dirty: false,
            page_size,
            usable,
            cache: HashMap::new(),
            access_counter: 0,
            state: TxState::Idle,
            stats: PagerStats::default(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn usable_size(&self) -> usize {
        self.usable
    }

    pub fn page_count(&self) -> u32 {
        self.header.page_count
    }

    pub fn header(&self) -> &DatabaseHeader {
        &self.header
    }

    pub fn schema_root(&self) -> PageNo {
        self.header.schema_root
    }

    pub fn set_schema_root(&mut self, root: PageNo) {
        self.header.schema_root = root;
        self.header_dirty = true;
    }

    pub fn bump_schema_cookie(&mut self) {
        self.header.schema_cookie = self.header.schema_cookie.wrapping_add(1);
        self.header_dirty = true;
    }

    pub fn freelist_count(&self) -> u32 {
        self.header.freelist_count
    }

    pub fn stats(&self) -> PagerStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = PagerStats::default();
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    pub fn in_transaction(&self) -> bool {
        self.state == TxState::Active
    }

    /// Fetch a copy of a page. A read after a buffered write inside the
    /// same transaction observes the write.
    pub fn read(&mut self, page_no: PageNo) -> Result<Vec<u8>> {
        self.check_in_range(page_no)?;
        self.ensure_loaded(page_no)?;
        if page_no == 1 && self.header_dirty {
            self.stage_header();
        }
        self.stats.pages_read += 1;
        self.access_counter += 1;
        let frame = self.cache.get_mut(&page_no).expect("frame just loaded");
        frame.last_access = self.access_counter;
        Ok(frame.data.clone())
    }

    /// Stage a full page image. Buffered until commit; never touches the
    /// main file while the transaction is active.
    pub fn write(&mut self, page_no: PageNo, data: Vec<u8>) -> Result<()> {
        self.check_writable()?;
        self.check_in_range(page_no)?;
        if data.len() != self.page_size {
            return Err(DatabaseError::CorruptPage {
                page_no,
                reason: format!(
                    "staged image is {} bytes, page size is {}",
                    data.len(),
                    self.page_size
                ),
            });
        }
        self.stats.pages_written += 1;
        self.access_counter += 1;
        self.cache.insert(
            page_no,
            Frame {
                data,
                dirty: true,
                last_access: self.access_counter,
            },
        );
        Ok(())
    }

    /// Allocate a page: reuse a freelist entry if one exists, otherwise
    /// extend the file. The returned page is staged zero-filled.
    pub fn allocate(&mut self) -> Result<PageNo> {
        self.check_writable()?;
        let page_no = if self.header.freelist_trunk != 0 {
            self.allocate_from_freelist()?
        } else {
            if self.header.page_count >= MAX_PAGE_COUNT {
                return Err(DatabaseError::OutOfSpace);
            }
            let page_no = self.header.page_count + 1;
            self.header.page_count = page_no;
            self.header_dirty = true;
            page_no
        };
        self.stats.pages_allocated += 1;
        self.access_counter += 1;
        self.cache.insert(
            page_no,
            Frame {
                data: vec![0u8; self.page_size],
                dirty: true,
                last_access: self.access_counter,
            },
        );
        debug!("allocated page {page_no}");
        Ok(page_no)
    }

    /// Return a page to the freelist.
    pub fn free(&mut self, page_no: PageNo) -> Result<()> {
        self.check_writable()?;
        self.check_in_range(page_no)?;
        if page_no == 1 {
            return Err(DatabaseError::CorruptPage {
                page_no,
                reason: "page 1 can never be freed".to_string(),
            });
        }
        if self.freelist_contains(page_no)? {
            return Err(DatabaseError::CorruptPage {
                page_no,
                reason: "page is already on the freelist".to_string(),
            });
        }

        let trunk_no = self.header.freelist_trunk;
        let leaf_capacity = (self.usable - TRUNK_HEADER_SIZE) / 4;
        let mut appended = false;
        if trunk_no != 0 {
            let mut trunk = self.read(trunk_no)?;
            let count = u32::from_be_bytes(trunk[4..8].try_into().unwrap()) as usize;
            if count < leaf_capacity {
                let at = TRUNK_HEADER_SIZE + count * 4;
                trunk[at..at + 4].copy_from_slice(&page_no.to_be_bytes());
                trunk[4..8].copy_from_slice(&((count + 1) as u32).to_be_bytes());
                self.write(trunk_no, trunk)?;
                appended = true;
            }
        }
        if !appended {
            // The freed page becomes a new trunk, chained in front.
            let mut trunk = vec![0u8; self.page_size];
            trunk[0..4].copy_from_slice(&trunk_no.to_be_bytes());
            self.write(page_no, trunk)?;
            self.header.freelist_trunk = page_no;
        } else {
            // Leaf pages get cleared so stale tree data does not linger.
            self.write(page_no, vec![0u8; self.page_size])?;
        }
        self.header.freelist_count += 1;
        self.header_dirty = true;
        self.stats.pages_freed += 1;
        debug!("freed page {page_no}");
        Ok(())
    }

    pub fn begin(&mut self) -> Result<()> {
        if self.state != TxState::Idle {
            return Err(DatabaseError::TransactionAborted {
                reason: "a transaction is already active".to_string(),
            });
        }
        self.state = TxState::Active;
        Ok(())
    }

    /// Commit the active transaction: journal every dirty page to the
    /// write-ahead log, fsync, then checkpoint the frames into the main
    /// file and truncate the log. Visibility is gated on the commit frame
    /// alone; a failure before it leaves the main file untouched.
    pub fn commit(&mut self) -> Result<()> {
        if self.state != TxState::Active {
            return Err(DatabaseError::TransactionAborted {
                reason: "no active transaction to commit".to_string(),
            });
        }

        let mut dirty: Vec<PageNo> = self
            .cache
            .iter()
            .filter(|(_, f)| f.dirty)
            .map(|(&n, _)| n)
            .collect();
        if dirty.is_empty() && !self.header_dirty {
            self.state = TxState::Idle;
            return Ok(());
        }

        self.header.change_counter = self.header.change_counter.wrapping_add(1);
        self.header.version_valid_for = self.header.change_counter;
        self.header_dirty = true;
        self.ensure_loaded(1)?;
        self.stage_header();
        if !dirty.contains(&1) {
            dirty.push(1);
        }
        dirty.sort_unstable();

        let frames: Vec<(PageNo, Vec<u8>)> = dirty
            .iter()
            .map(|n| (*n, self.cache.get(n).expect("dirty frame").data.clone()))
            .collect();

        if let Err(err) = self.wal.append_transaction(&frames) {
            // The commit frame never became durable; undo the buffered state.
            self.rollback_inner();
            return Err(DatabaseError::TransactionAborted {
                reason: format!("journaling failed: {err}"),
            });
        }

        self.state = TxState::Committing;
        for (page_no, image) in &frames {
            let offset = (*page_no as u64 - 1) * self.page_size as u64;
            self.file.seek(SeekFrom::Start(offset))?;
            self.file.write_all(image)?;
        }
        self.file.sync_all()?;
        self.wal.reset()?;

        for page_no in &dirty {
            if let Some(frame) = self.cache.get_mut(page_no) {
                frame.dirty = false;
            }
        }
        self.evict_excess();
        self.state = TxState::Idle;
        debug!("committed {} page(s)", frames.len());
        Ok(())
    }

    /// Abort the active transaction, discarding every buffered write.
    pub fn rollback(&mut self) -> Result<()> {
        if self.state != TxState::Active {
            return Err(DatabaseError::TransactionAborted {
                reason: "no active transaction to roll back".to_string(),
            });
        }
        self.state = TxState::RollingBack;
        self.rollback_inner();
        Ok(())
    }

    fn rollback_inner(&mut self) {
        self.cache.retain(|_, frame| !frame.dirty);
        self.header_dirty = false;
        // The on-disk header is the last committed one.
        let mut header_buf = [0u8; DB_HEADER_SIZE];
        if self.file.seek(SeekFrom::Start(0)).is_ok()
            && self.file.read_exact(&mut header_buf).is_ok()
        {
            if let Ok(header) = DatabaseHeader::from_bytes(&header_buf) {
                self.header = header;
            }
        }
        self.state = TxState::Idle;
        debug!("transaction rolled back");
    }

    fn allocate_from_freelist(&mut self) -> Result<PageNo> {
        let trunk_no = self.header.freelist_trunk;
        let trunk = self.read(trunk_no)?;
        let next = u32::from_be_bytes(trunk[0..4].try_into().unwrap());
        let count = u32::from_be_bytes(trunk[4..8].try_into().unwrap()) as usize;

        let page_no = if count > 0 {
            let at = TRUNK_HEADER_SIZE + (count - 1) * 4;
            let leaf = u32::from_be_bytes(trunk[at..at + 4].try_into().unwrap());
            self.check_in_range(leaf).map_err(|_| DatabaseError::CorruptPage {
                page_no: trunk_no,
                reason: format!("freelist leaf {leaf} out of range"),
            })?;
            let mut trunk = trunk;
            trunk[at..at + 4].fill(0);
            trunk[4..8].copy_from_slice(&((count - 1) as u32).to_be_bytes());
            self.write(trunk_no, trunk)?;
            leaf
        } else {
            // Empty trunk: reuse the trunk page itself.
            if next != 0 {
                self.check_in_range(next).map_err(|_| DatabaseError::CorruptPage {
                    page_no: trunk_no,
                    reason: format!("freelist trunk chain points at {next}, out of range"),
                })?;
            }
            self.header.freelist_trunk = next;
            trunk_no
        };
        self.header.freelist_count = self.header.freelist_count.saturating_sub(1);
        self.header_dirty = true;
        Ok(page_no)
    }

    fn freelist_contains(&mut self, page_no: PageNo) -> Result<bool> {
        let mut trunk_no = self.header.freelist_trunk;
        let mut hops = 0u32;
        while trunk_no != 0 {
            if trunk_no == page_no {
                return Ok(true);
            }
            if hops > self.header.freelist_count {
                return Err(DatabaseError::CorruptPage {
                    page_no: trunk_no,
                    reason: "freelist trunk chain longer than its recorded count".to_string(),
                });
            }
            let trunk = self.read_uncounted(trunk_no)?;
            let count = u32::from_be_bytes(trunk[4..8].try_into().unwrap()) as usize;
            for i in 0..count.min((self.usable - TRUNK_HEADER_SIZE) / 4) {
                let at = TRUNK_HEADER_SIZE + i * 4;
                if u32::from_be_bytes(trunk[at..at + 4].try_into().unwrap()) == page_no {
                    return Ok(true);
                }
            }
            trunk_no = u32::from_be_bytes(trunk[0..4].try_into().unwrap());
            hops += 1;
        }
        Ok(false)
    }

    fn read_uncounted(&mut self, page_no: PageNo) -> Result<Vec<u8>> {
        self.check_in_range(page_no)?;
        self.ensure_loaded(page_no)?;
        Ok(self.cache.get(&page_no).expect("frame just loaded").data.clone())
    }

    fn ensure_loaded(&mut self, page_no: PageNo) -> Result<()> {
        if self.cache.contains_key(&page_no) {
            return Ok(());
        }
        self.evict_excess();
        let mut data = vec![0u8; self.page_size];
        let offset = (page_no as u64 - 1) * self.page_size as u64;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut data)?;
        self.stats.pages_fetched += 1;
        self.access_counter += 1;
        self.cache.insert(
            page_no,
            Frame {
                data,
                dirty: false,
                last_access: self.access_counter,
            },
        );
        Ok(())
    }

    fn evict_excess(&mut self) {
        while self.cache.len() >= MAX_CACHED_PAGES {
            let victim = self
                .cache
                .iter()
                .filter(|(_, f)| !f.dirty)
                .min_by_key(|(_, f)| f.last_access)
                .map(|(&n, _)| n);
            match victim {
                Some(page_no) => {
                    self.cache.remove(&page_no);
                }
                None => break, // everything is dirty; the cache must hold it
            }
        }
    }

    fn stage_header(&mut self) {
        let frame = self.cache.get_mut(&1).expect("page 1 loaded before staging");
        frame.data[..DB_HEADER_SIZE].copy_from_slice(&self.header.to_bytes());
        frame.dirty = true;
        self.header_dirty = false;
    }

    fn check_in_range(&self, page_no: PageNo) -> Result<()> {
        if page_no == 0 || page_no > self.header.page_count {
            return Err(DatabaseError::CorruptPage {
                page_no,
                reason: format!(
                    "page number out of range (page_count={})",
                    self.header.page_count
                ),
            });
        }
        Ok(())
    }

    fn check_writable(&self) -> Result<()> {
        if self.state != TxState::Active {
            return Err(DatabaseError::TransactionAborted {
                reason: "page writes require an active transaction".to_string(),
            });
        }
        Ok(())
    }
}
