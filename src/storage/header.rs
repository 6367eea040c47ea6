use crate::storage::GUDANG_MAGIC;
use crate::types::error::{DatabaseError, Result};
use crate::types::{PageNo, DB_HEADER_SIZE, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, MIN_PAGE_SIZE};

/// The 100-byte database header occupying the start of page 1. Field order
/// and widths follow the SQLite layout; everything is big-endian. A page
/// size of 65536 is stored as the sentinel value 1.
#[derive(Debug, Clone)]
pub struct DatabaseHeader {
    pub magic: [u8; 16],
    pub page_size: u32,
    pub write_version: u8,
    pub read_version: u8,
    pub reserved_per_page: u8,
    pub max_payload_fraction: u8,
    pub min_payload_fraction: u8,
    pub leaf_payload_fraction: u8,
    pub change_counter: u32,
    pub page_count: u32,
    pub freelist_trunk: PageNo,
    pub freelist_count: u32,
    pub schema_cookie: u32,
    pub schema_format: u32,
    pub default_cache_size: u32,
    pub schema_root: PageNo,
    pub text_encoding: u32,
    pub user_version: u32,
    pub incremental_vacuum: u32,
    pub application_id: u32,
    pub reserved: [u8; 20],
    pub version_valid_for: u32,
    pub engine_version: u32,
}

impl Default for DatabaseHeader {
    fn default() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE as u32)
    }
}

impl DatabaseHeader {
    pub fn with_page_size(page_size: u32) -> Self {
        Self {
            magic: *GUDANG_MAGIC,
            page_size,
            write_version: 2,
            read_version: 2,
            reserved_per_page: 0,
            max_payload_fraction: 64,
            min_payload_fraction: 32,
            leaf_payload_fraction: 32,
            change_counter: 1,
            page_count: 1,
            freelist_trunk: 0,
            freelist_count: 0,
            schema_cookie: 1,
            schema_format: 4,
            default_cache_size: 0,
            schema_root: 1,
            text_encoding: 1,
            user_version: 0,
            incremental_vacuum: 0,
            application_id: 0,
            reserved: [0; 20],
            version_valid_for: 1,
            engine_version: 1000,
        }
    }

    pub fn usable_page_size(&self) -> usize {
        self.page_size as usize - self.reserved_per_page as usize
    }

    pub fn to_bytes(&self) -> [u8; DB_HEADER_SIZE] {
        let mut buf = [0u8; DB_HEADER_SIZE];
        buf[0..16].copy_from_slice(&self.magic);
        let raw_page_size: u16 = if self.page_size == 65536 {
            1
        } else {
            self.page_size as u16
        };
        buf[16..18].copy_from_slice(&raw_page_size.to_be_bytes());
        buf[18] = self.write_version;
        buf[19] = self.read_version;
        buf[20] = self.reserved_per_page;
        buf[21] = self.max_payload_fraction;
        buf[22] = self.min_payload_fraction;
        buf[23] = self.leaf_payload_fraction;
        buf[24..28].copy_from_slice(&self.change_counter.to_be_bytes());
        buf[28..32].copy_from_slice(&self.page_count.to_be_bytes());
        buf[32..36].copy_from_slice(&self.freelist_trunk.to_be_bytes());
        buf[36..40].copy_from_slice(&self.freelist_count.to_be_bytes());
        buf[40..44].copy_from_slice(&self.schema_cookie.to_be_bytes());
        buf[44..48].copy_from_slice(&self.schema_format.to_be_bytes());
        buf[48..52].copy_from_slice(&self.default_cache_size.to_be_bytes());
        buf[52..56].copy_from_slice(&self.schema_root.to_be_bytes());
        buf[56..60].copy_from_slice(&self.text_encoding.to_be_bytes());
        buf[60..64].copy_from_slice(&self.user_version.to_be_bytes());
        buf[64..68].copy_from_slice(&self.incremental_vacuum.to_be_bytes());
        buf[68..72].copy_from_slice(&self.application_id.to_be_bytes());
        buf[72..92].copy_from_slice(&self.reserved);
        buf[92..96].copy_from_slice(&self.version_valid_for.to_be_bytes());
        buf[96..100].copy_from_slice(&self.engine_version.to_be_bytes());
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < DB_HEADER_SIZE {
            return Err(DatabaseError::InvalidHeader {
                reason: "header too short".to_string(),
            });
        }
        let mut magic = [0u8; 16];
        magic.copy_from_slice(&bytes[0..16]);
        if &magic != GUDANG_MAGIC {
            return Err(DatabaseError::InvalidHeader {
                reason: "bad magic".to_string(),
            });
        }

        let raw_page_size = u16::from_be_bytes([bytes[16], bytes[17]]);
        let page_size: u32 = if raw_page_size == 1 {
            65536
        } else {
            raw_page_size as u32
        };
        validate_page_size(page_size as usize)?;

        let write_version = bytes[18];
        let read_version = bytes[19];
        if write_version > 2 || read_version > 2 {
            return Err(DatabaseError::InvalidHeader {
                reason: format!("unsupported format version {write_version}/{read_version}"),
            });
        }

        let u32_at = |off: usize| {
            u32::from_be_bytes([bytes[off], bytes[off + 1], bytes[off + 2], bytes[off + 3]])
        };
        let mut reserved = [0u8; 20];
        reserved.copy_from_slice(&bytes[72..92]);

        Ok(Self {
            magic,
            page_size,
            write_version,
            read_version,
            reserved_per_page: bytes[20],
            max_payload_fraction: bytes[21],
            min_payload_fraction: bytes[22],
            leaf_payload_fraction: bytes[23],
            change_counter: u32_at(24),
            page_count: u32_at(28),
            freelist_trunk: u32_at(32),
            freelist_count: u32_at(36),
            schema_cookie: u32_at(40),
            schema_format: u32_at(44),
            default_cache_size: u32_at(48),
            schema_root: u32_at(52),
            text_encoding: u32_at(56),
            user_version: u32_at(60),
            incremental_vacuum: u32_at(64),
            application_id: u32_at(68),
            reserved,
            version_valid_for: u32_at(92),
            engine_version: u32_at(96),
        })
    }
}

pub fn validate_page_size(size: usize) -> Result<()> {
    if size < MIN_PAGE_SIZE || size > MAX_PAGE_SIZE || !size.is_power_of_two() {
        return Err(DatabaseError::InvalidPageSize { size });
    }
    Ok(())
}
