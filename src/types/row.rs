use serde::{Deserialize, Serialize};

use crate::types::error::{DatabaseError, Result};
use crate::types::record::{decode_record, encode_record};
use crate::types::value::Value;
use crate::types::RowId;

/// A table row. The row ID is the B-tree key and is not part of the encoded
/// record; it is `None` until the row has been assigned one by an insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub row_id: Option<RowId>,
    pub values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self {
            row_id: None,
            values,
        }
    }

    pub fn with_row_id(row_id: RowId, values: Vec<Value>) -> Self {
        Self {
            row_id: Some(row_id),
            values,
        }
    }

    pub fn get_value(&self, column_index: usize) -> Option<&Value> {
        self.values.get(column_index)
    }

    pub fn set_value(&mut self, column_index: usize, value: Value) -> Result<()> {
        if column_index >= self.values.len() {
            return Err(DatabaseError::InvalidData {
                details: format!("column index {column_index} out of bounds"),
            });
        }
        self.values[column_index] = value;
        Ok(())
    }

    /// Encode the row's values in record format.
    pub fn to_record(&self) -> Vec<u8> {
        encode_record(&self.values)
    }

    /// Decode a row from a record payload fetched under `row_id`.
    pub fn from_record(row_id: RowId, payload: &[u8]) -> Result<Self> {
        Ok(Self {
            row_id: Some(row_id),
            values: decode_record(payload)?,
        })
    }
}
