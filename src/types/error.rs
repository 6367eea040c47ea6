use thiserror::Error;

use crate::types::{PageNo, RowId};

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupted page: page_no={page_no}, reason={reason}")]
    CorruptPage { page_no: PageNo, reason: String },

    #[error("Corrupted record: {details}")]
    RecordCorrupt { details: String },

    #[error("Invalid database header: {reason}")]
    InvalidHeader { reason: String },

    #[error("Invalid page size: {size}")]
    InvalidPageSize { size: usize },

    #[error("Invalid page type: {0}")]
    InvalidPageType(u8),

    #[error("Page is full (page_no: {page_no})")]
    PageFull { page_no: PageNo },

    #[error("Key not found")]
    KeyNotFound,

    #[error("Duplicate key: row_id={row_id}")]
    DuplicateKey { row_id: RowId },

    #[error("Table '{name}' not found")]
    TableNotFound { name: String },

    #[error("Table '{name}' already exists")]
    TableExists { name: String },

    #[error("Index '{name}' not found")]
    IndexNotFound { name: String },

    #[error("Index '{name}' already exists")]
    IndexExists { name: String },

    #[error("Column '{name}' not found in table '{table}'")]
    ColumnNotFound { name: String, table: String },

    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("Invalid data: {details}")]
    InvalidData { details: String },

    #[error("Transaction aborted: {reason}")]
    TransactionAborted { reason: String },

    #[error("Recovery failed: {reason}")]
    RecoveryFailed { reason: String },

    #[error("Out of space: database cannot grow")]
    OutOfSpace,
}

pub type Result<T> = std::result::Result<T, DatabaseError>;
