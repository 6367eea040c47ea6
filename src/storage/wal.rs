use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, warn};

use crate::storage::WAL_MAGIC;
use crate::types::error::{DatabaseError, Result};
use crate::types::PageNo;

pub const WAL_VERSION: u32 = 1;
pub const WAL_HEADER_SIZE: u64 = 32;

const FRAME_TYPE_PAGE: u8 = 1;
const FRAME_TYPE_COMMIT: u8 = 2;
const FRAME_HEADER_SIZE: u64 = 1 + 4 + 4;

/// Append-only write-ahead log, one per database file (`<db>-wal`).
///
/// Layout: a 32-byte header (magic, version, page size, two checksum salts,
/// random session id), then frames. A page frame is (type, page number,
/// checksum, full page image); a commit frame is (type, frame count,
/// checksum). Nothing before a commit frame is ever applied to the main
/// file, which is what makes multi-page writes atomic.
pub struct Wal {
    path: PathBuf,
    file: File,
    page_size: usize,
    salt1: u32,
    salt2: u32,
}

impl Wal {
    pub fn open(db_path: &Path, page_size: usize) -> Result<Self> {
        let path = wal_path_for(db_path);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let len = file.metadata()?.len();
        if len < WAL_HEADER_SIZE {
            if len != 0 {
                warn!("write-ahead log shorter than its header, resetting");
            }
            let (salt1, salt2) = fresh_salts();
            let mut wal = Self {
                path,
                file,
                page_size,
                salt1,
                salt2,
            };
            wal.write_header()?;
            return Ok(wal);
        }

        file.seek(SeekFrom::Start(0))?;
        let mut header = [0u8; WAL_HEADER_SIZE as usize];
        file.read_exact(&mut header)?;
        if &header[0..8] != WAL_MAGIC {
            return Err(DatabaseError::RecoveryFailed {
                reason: "write-ahead log has a bad magic".to_string(),
            });
        }
        let version = u32::from_be_bytes(header[8..12].try_into().unwrap());
        if version != WAL_VERSION {
            return Err(DatabaseError::RecoveryFailed {
                reason: format!("unsupported write-ahead log version {version}"),
            });
        }
        let wal_page_size = u32::from_be_bytes(header[12..16].try_into().unwrap()) as usize;
        if wal_page_size != page_size {
            return Err(DatabaseError::RecoveryFailed {
                reason: format!(
                    "write-ahead log page size {wal_page_size} does not match database page size {page_size}"
                ),
            });
        }
        let salt1 = u32::from_be_bytes(header[16..20].try_into().unwrap());
        let salt2 = u32::from_be_bytes(header[20..24].try_into().unwrap());

        Ok(Self {
            path,
            file,
            page_size,
            salt1,
            salt2,
        })
    }

    /// Append one transaction: every dirty page image followed by a commit
    /// frame, then fsync. The commit frame hitting stable storage is the
    /// moment the transaction becomes durable.
    pub fn append_transaction(&mut self, frames: &[(PageNo, Vec<u8>)]) -> Result<()> {
        self.file.seek(SeekFrom::End(0))?;
        for (page_no, image) in frames {
            debug_assert_eq!(image.len(), self.page_size);
            let checksum = self.frame_checksum(FRAME_TYPE_PAGE, *page_no, image);
            self.file.write_all(&[FRAME_TYPE_PAGE])?;
            self.file.write_all(&page_no.to_be_bytes())?;
            self.file.write_all(&checksum.to_be_bytes())?;
            self.file.write_all(image)?;
        }
        let count = frames.len() as u32;
        let checksum = self.frame_checksum(FRAME_TYPE_COMMIT, count, &[]);
        self.file.write_all(&[FRAME_TYPE_COMMIT])?;
        self.file.write_all(&count.to_be_bytes())?;
        self.file.write_all(&checksum.to_be_bytes())?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Replay committed transactions into `db_file` and reset the log.
    /// Frames after the last valid commit frame are an interrupted
    /// transaction (or a torn write) and are discarded.
    ///
    /// Replay is idempotent: frames are whole-page images, so applying an
    /// already-applied frame rewrites identical bytes.
    pub fn recover(&mut self, db_file: &mut File) -> Result<usize> {
        let len = self.file.metadata()?.len();
        if len <= WAL_HEADER_SIZE {
            return Ok(0);
        }

        self.file.seek(SeekFrom::Start(WAL_HEADER_SIZE))?;
        let mut pending: Vec<(PageNo, Vec<u8>)> = Vec::new();
        let mut applied = 0usize;
        let mut pos = WAL_HEADER_SIZE;

        loop {
            if pos == len {
                break;
            }
            if pos + FRAME_HEADER_SIZE > len {
                warn!("write-ahead log ends mid-frame, discarding tail");
                break;
            }
            let mut head = [0u8; FRAME_HEADER_SIZE as usize];
            self.file.read_exact(&mut head)?;
            let frame_type = head[0];
            let arg = u32::from_be_bytes(head[1..5].try_into().unwrap());
            let stored_checksum = u32::from_be_bytes(head[5..9].try_into().unwrap());

            match frame_type {
                FRAME_TYPE_PAGE => {
                    if pos + FRAME_HEADER_SIZE + self.page_size as u64 > len {
                        warn!("write-ahead log ends mid-page-image, discarding tail");
                        break;
                    }
                    let mut image = vec![0u8; self.page_size];
                    self.file.read_exact(&mut image)?;
                    if self.frame_checksum(FRAME_TYPE_PAGE, arg, &image) != stored_checksum {
                        warn!("write-ahead log page frame fails its checksum, discarding tail");
                        break;
                    }
                    pending.push((arg, image));
                    pos += FRAME_HEADER_SIZE + self.page_size as u64;
                }
                FRAME_TYPE_COMMIT => {
                    if self.frame_checksum(FRAME_TYPE_COMMIT, arg, &[]) != stored_checksum
                        || arg as usize != pending.len()
                    {
                        warn!("write-ahead log commit frame fails validation, discarding tail");
                        break;
                    }
                    apply_frames(db_file, self.page_size, &pending)?;
                    applied += pending.len();
                    pending.clear();
                    pos += FRAME_HEADER_SIZE;
                }
                other => {
                    warn!("unknown write-ahead log frame type {other}, discarding tail");
                    break;
                }
            }
        }

        if !pending.is_empty() {
            debug!(
                "discarding {} uncommitted write-ahead log frame(s)",
                pending.len()
            );
        }
        if applied > 0 {
            db_file.sync_all()?;
            debug!("replayed {applied} committed page frame(s) from the write-ahead log");
        }
        self.reset()?;
        Ok(applied)
    }

    /// Truncate back to a bare header with rotated salts. Called after every
    /// checkpoint so old frames can never be mistaken for current ones.
    pub fn reset(&mut self) -> Result<()> {
        self.salt1 = self.salt1.wrapping_add(1);
        self.salt2 = fresh_salts().1;
        self.file.set_len(0)?;
        self.write_header()?;
        Ok(())
    }

    pub fn remove_file(db_path: &Path) -> std::io::Result<()> {
        let path = wal_path_for(db_path);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_header(&mut self) -> Result<()> {
        let session: u64 = fresh_session_id();
        let mut header = Vec::with_capacity(WAL_HEADER_SIZE as usize);
        header.extend_from_slice(WAL_MAGIC);
        header.extend_from_slice(&WAL_VERSION.to_be_bytes());
        header.extend_from_slice(&(self.page_size as u32).to_be_bytes());
        header.extend_from_slice(&self.salt1.to_be_bytes());
        header.extend_from_slice(&self.salt2.to_be_bytes());
        header.extend_from_slice(&session.to_be_bytes());
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&header)?;
        self.file.sync_all()?;
        Ok(())
    }

    fn frame_checksum(&self, frame_type: u8, arg: u32, payload: &[u8]) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&self.salt1.to_be_bytes());
        hasher.update(&self.salt2.to_be_bytes());
        hasher.update(&[frame_type]);
        hasher.update(&arg.to_be_bytes());
        hasher.update(payload);
        hasher.finalize()
    }
}

fn apply_frames(db_file: &mut File, page_size: usize, frames: &[(PageNo, Vec<u8>)]) -> Result<()> {
    for (page_no, image) in frames {
        let offset = (*page_no as u64 - 1) * page_size as u64;
        db_file.seek(SeekFrom::Start(offset))?;
        db_file.write_all(image)?;
    }
    Ok(())
}

pub fn wal_path_for(db_path: &Path) -> PathBuf {
    let mut os: OsString = db_path.as_os_str().to_os_string();
    os.push("-wal");
    PathBuf::from(os)
}

fn fresh_salts() -> (u32, u32) {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    ((nanos as u32) | 1, (nanos >> 32) as u32 ^ 0x9e37_79b9)
}

fn fresh_session_id() -> u64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    (nanos as u64) ^ ((nanos >> 64) as u64) ^ u64::from(std::process::id())
}
