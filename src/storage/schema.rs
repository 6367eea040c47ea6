use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::error::{DatabaseError, Result};
use crate::types::row::Row;
use crate::types::value::{DataType, Value};
use crate::types::PageNo;

/// Object type tags used in the first column of every catalog row.
pub const CATALOG_TABLE: &str = "table";
pub const CATALOG_COLUMN: &str = "column";
pub const CATALOG_INDEX: &str = "index";

/// Represents a column definition in a table schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: DataType,
    pub position: usize,
    pub nullable: bool,
    pub default_value: Option<Value>,
    pub primary_key: bool,
    pub unique: bool,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, data_type: DataType, position: usize) -> Self {
        Self {
            name: name.into(),
            data_type,
            position,
            nullable: true,
            default_value: None,
            primary_key: false,
            unique: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_default(mut self, default_value: Value) -> Self {
        self.default_value = Some(default_value);
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false; // primary keys are always NOT NULL
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Convert this column into its catalog row.
    pub fn to_catalog_row(&self, table_name: &str) -> Row {
        Row::new(vec![
            Value::Text(CATALOG_COLUMN.to_string()),
            Value::Text(self.name.clone()),
            Value::Text(table_name.to_string()),
            Value::Integer(self.position as i64),
            Value::Text(self.data_type.to_string()),
            Value::Integer(if self.nullable { 1 } else { 0 }),
            Value::Text(
                self.default_value
                    .as_ref()
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "NULL".to_string()),
            ),
            Value::Integer(if self.primary_key { 1 } else { 0 }),
            Value::Integer(if self.unique { 1 } else { 0 }),
        ])
    }

    pub fn from_catalog_row(row: &Row) -> Result<Self> {
        let corrupt = |what: &str| DatabaseError::RecordCorrupt {
            details: format!("invalid {what} in catalog column row"),
        };
        if row.values.len() < 9 {
            return Err(corrupt("length"));
        }
        let name = row.values[1].as_text().ok_or_else(|| corrupt("name"))?;
        let position = row.values[3]
            .as_integer()
            .ok_or_else(|| corrupt("position"))? as usize;
        let data_type = match &row.values[4] {
            Value::Text(s) => DataType::from_string(s)?,
            _ => return Err(corrupt("data type")),
        };
        let nullable = row.values[5]
            .as_integer()
            .ok_or_else(|| corrupt("nullable flag"))?
            != 0;
        let default_value = match &row.values[6] {
            Value::Text(s) if s != "NULL" => Some(Value::from_string(s, &data_type)?),
            _ => None,
        };
        let primary_key = row.values[7]
            .as_integer()
            .ok_or_else(|| corrupt("primary key flag"))?
            != 0;
        let unique = row.values[8]
            .as_integer()
            .ok_or_else(|| corrupt("unique flag"))?
            != 0;

        Ok(Self {
            name: name.to_string(),
            data_type,
            position,
            nullable,
            default_value,
            primary_key,
            unique,
        })
    }
}

/// Represents a complete table schema with all column definitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub table_name: String,
    pub columns: Vec<ColumnSchema>,
    pub root_page: PageNo,
    pub definition: String,
}

impl TableSchema {
    pub fn new(
        table_name: impl Into<String>,
        columns: Vec<ColumnSchema>,
        root_page: PageNo,
    ) -> Self {
        let table_name = table_name.into();
        let definition = describe_table(&table_name, &columns);
        Self {
            table_name,
            columns,
            root_page,
            definition,
        }
    }

    pub fn to_catalog_row(&self) -> Row {
        Row::new(vec![
            Value::Text(CATALOG_TABLE.to_string()),
            Value::Text(self.table_name.clone()),
            Value::Text(self.table_name.clone()),
            Value::Integer(self.root_page as i64),
            Value::Text(self.definition.clone()),
        ])
    }

    pub fn get_column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|col| col.name == name)
    }

    pub fn get_column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|col| col.name == name)
    }

    pub fn column_names(&self) -> Vec<String> {
        let mut sorted = self.columns.clone();
        sorted.sort_by_key(|col| col.position);
        sorted.into_iter().map(|col| col.name).collect()
    }

    /// The INTEGER PRIMARY KEY column, if any; it aliases the row ID.
    pub fn rowid_alias(&self) -> Option<&ColumnSchema> {
        self.columns
            .iter()
            .find(|col| col.primary_key && col.data_type == DataType::Integer)
    }

    /// Validate a row against this schema.
    pub fn validate_row(&self, row: &Row) -> Result<()> {
        if row.values.len() != self.columns.len() {
            return Err(DatabaseError::InvalidData {
                details: format!(
                    "row has {} values but table '{}' expects {} columns",
                    row.values.len(),
                    self.table_name,
                    self.columns.len()
                ),
            });
        }
        for (i, value) in row.values.iter().enumerate() {
            if let Some(column) = self.columns.iter().find(|c| c.position == i) {
                if !column.nullable && value.is_null() {
                    return Err(DatabaseError::InvalidData {
                        details: format!("column '{}' cannot be NULL", column.name),
                    });
                }
                if !value.is_null() && !value.is_compatible_with_type(&column.data_type) {
                    return Err(DatabaseError::TypeMismatch {
                        expected: column.data_type.to_string(),
                        actual: format!("{value:?} in column '{}'", column.name),
                    });
                }
            }
        }
        Ok(())
    }

    /// Fill in declared defaults where values are missing or null.
    pub fn apply_defaults(&self, row: &mut Row) {
        while row.values.len() < self.columns.len() {
            row.values.push(Value::Null);
        }
        for column in &self.columns {
            if let Some(default) = &column.default_value {
                if let Some(slot) = row.values.get_mut(column.position) {
                    if slot.is_null() {
                        *slot = default.clone();
                    }
                }
            }
        }
    }
}

/// A single-column secondary index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSchema {
    pub index_name: String,
    pub table_name: String,
    pub column_name: String,
    pub root_page: PageNo,
}

impl IndexSchema {
    pub fn to_catalog_row(&self) -> Row {
        Row::new(vec![
            Value::Text(CATALOG_INDEX.to_string()),
            Value::Text(self.index_name.clone()),
            Value::Text(self.table_name.clone()),
            Value::Integer(self.root_page as i64),
            Value::Text(self.column_name.clone()),
        ])
    }

    pub fn from_catalog_row(row: &Row) -> Result<Self> {
        let corrupt = |what: &str| DatabaseError::RecordCorrupt {
            details: format!("invalid {what} in catalog index row"),
        };
        if row.values.len() < 5 {
            return Err(corrupt("length"));
        }
        Ok(Self {
            index_name: row.values[1]
                .as_text()
                .ok_or_else(|| corrupt("name"))?
                .to_string(),
            table_name: row.values[2]
                .as_text()
                .ok_or_else(|| corrupt("table name"))?
                .to_string(),
            root_page: row.values[3]
                .as_integer()
                .ok_or_else(|| corrupt("root page"))? as PageNo,
            column_name: row.values[4]
                .as_text()
                .ok_or_else(|| corrupt("column name"))?
                .to_string(),
        })
    }
}

/// In-memory view of the catalog, rebuilt from the schema tree on open and
/// after any DDL.
#[derive(Debug, Clone, Default)]
pub struct SchemaManager {
    tables: HashMap<String, TableSchema>,
    indexes: HashMap<String, IndexSchema>,
}

impl SchemaManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&mut self, schema: TableSchema) {
        self.tables.insert(schema.table_name.clone(), schema);
    }

    pub fn add_index(&mut self, schema: IndexSchema) {
        self.indexes.insert(schema.index_name.clone(), schema);
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(name)
    }

    pub fn table_mut(&mut self, name: &str) -> Option<&mut TableSchema> {
        self.tables.get_mut(name)
    }

    pub fn index(&self, name: &str) -> Option<&IndexSchema> {
        self.indexes.get(name)
    }

    pub fn index_mut(&mut self, name: &str) -> Option<&mut IndexSchema> {
        self.indexes.get_mut(name)
    }

    pub fn remove_table(&mut self, name: &str) -> Option<TableSchema> {
        self.indexes.retain(|_, idx| idx.table_name != name);
        self.tables.remove(name)
    }

    pub fn remove_index(&mut self, name: &str) -> Option<IndexSchema> {
        self.indexes.remove(name)
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn index_exists(&self, name: &str) -> bool {
        self.indexes.contains_key(name)
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn indexes_for_table(&self, table_name: &str) -> Vec<&IndexSchema> {
        let mut found: Vec<&IndexSchema> = self
            .indexes
            .values()
            .filter(|idx| idx.table_name == table_name)
            .collect();
        found.sort_by(|a, b| a.index_name.cmp(&b.index_name));
        found
    }

    /// The index covering `column` on `table`, if one exists.
    pub fn index_on(&self, table_name: &str, column_name: &str) -> Option<&IndexSchema> {
        self.indexes
            .values()
            .find(|idx| idx.table_name == table_name && idx.column_name == column_name)
    }

    pub fn clear(&mut self) {
        self.tables.clear();
        self.indexes.clear();
    }
}

fn describe_table(table_name: &str, columns: &[ColumnSchema]) -> String {
    let mut sorted: Vec<&ColumnSchema> = columns.iter().collect();
    sorted.sort_by_key(|col| col.position);
    let cols: Vec<String> = sorted
        .iter()
        .map(|col| {
            let mut s = format!("{} {}", col.name, col.data_type);
            if col.primary_key {
                s.push_str(" PRIMARY KEY");
            } else if !col.nullable {
                s.push_str(" NOT NULL");
            }
            if col.unique && !col.primary_key {
                s.push_str(" UNIQUE");
            }
            s
        })
        .collect();
    format!("TABLE {table_name}({})", cols.join(", "))
}
