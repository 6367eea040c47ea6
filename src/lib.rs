pub mod executor;
pub mod storage;
pub mod types;
pub mod utils;

pub use executor::predicate::{ComparisonOp, Predicate};
pub use storage::database::{Command, Database};
pub use storage::schema::{ColumnSchema, IndexSchema, TableSchema};
pub use types::error::{DatabaseError, Result};
pub use types::row::Row;
pub use types::value::{DataType, Value};
