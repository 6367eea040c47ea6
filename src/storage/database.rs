//! Catalog and query surface.
//!
//! A thin layer over the pager, the B-tree engine, and the write-ahead
//! log. The catalog itself is just another table tree (the schema tree)
//! whose root page is recorded in the database header; its rows describe
//! every table, column, and index.

use std::path::Path;

use log::debug;

use crate::executor::predicate::Predicate;
use crate::storage::btree::{Btree, Key, TreeKind};
use crate::storage::header::DatabaseHeader;
use crate::storage::pager::{Pager, PagerStats};
use crate::storage::schema::{
    ColumnSchema, IndexSchema, SchemaManager, TableSchema, CATALOG_COLUMN, CATALOG_INDEX,
    CATALOG_TABLE,
};
use crate::storage::wal;
use crate::types::error::{DatabaseError, Result};
use crate::types::record::encode_record;
use crate::types::row::Row;
use crate::types::value::{compare_values, Value};
use crate::types::{PageNo, RowId, DEFAULT_PAGE_SIZE};

/// One step of a multi-statement transaction.
#[derive(Debug, Clone)]
pub enum Command {
    Set {
        table: String,
        fields: Vec<String>,
        values: Vec<Value>,
    },
    Delete {
        table: String,
        filters: Vec<Predicate>,
    },
}

pub struct Database {
    pager: Pager,
    schema: SchemaManager,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

impl Database {
    /// Create a new database file. Fails if the path already exists.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::create_with_page_size(path, DEFAULT_PAGE_SIZE)
    }

    pub fn create_with_page_size<P: AsRef<Path>>(path: P, page_size: usize) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Err(DatabaseError::InvalidData {
                details: format!("database '{}' already exists", path.display()),
            });
        }
        let pager = Pager::create(path, page_size)?;
        Ok(Self {
            pager,
            schema: SchemaManager::new(),
        })
    }

    /// Open an existing database, running crash recovery if the last
    /// process left committed frames in the write-ahead log.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let pager = Pager::open(path)?;
        let mut db = Self {
            pager,
            schema: SchemaManager::new(),
        };
        db.load_schema()?;
        Ok(db)
    }

    /// Delete a database and its write-ahead log from disk.
    pub fn destroy<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        wal::Wal::remove_file(path)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        self.pager.path()
    }

    pub fn header(&self) -> &DatabaseHeader {
        self.pager.header()
    }

    pub fn stats(&self) -> PagerStats {
        self.pager.stats()
    }

    pub fn reset_stats(&mut self) {
        self.pager.reset_stats()
    }

    pub fn table_names(&self) -> Vec<String> {
        self.schema.table_names()
    }

    pub fn table_schema(&self, name: &str) -> Option<&TableSchema> {
        self.schema.table(name)
    }

    pub fn index_schema(&self, name: &str) -> Option<&IndexSchema> {
        self.schema.index(name)
    }

    pub fn freelist_len(&self) -> u32 {
        self.pager.freelist_count()
    }

    // ------------------------------------------------------------------
    // transactions

    pub fn begin(&mut self) -> Result<()> {
        self.pager.begin()
    }

    pub fn commit(&mut self) -> Result<()> {
        self.pager.commit()
    }

    pub fn rollback(&mut self) -> Result<()> {
        self.pager.rollback()?;
        // Buffered schema changes are gone too; rebuild from disk.
        self.load_schema()
    }

    pub fn in_transaction(&self) -> bool {
        self.pager.in_transaction()
    }

    /// Run a list of commands as one atomic transaction. Any failure rolls
    /// everything back; nothing becomes visible short of the commit marker.
    pub fn transaction(&mut self, commands: Vec<Command>) -> Result<()> {
        self.begin()?;
        for command in commands {
            let outcome = match command {
                Command::Set {
                    table,
                    fields,
                    values,
                } => {
                    let fields: Vec<&str> = fields.iter().map(String::as_str).collect();
                    self.set(&table, &fields, values).map(|_| ())
                }
                Command::Delete { table, filters } => {
                    self.delete_rows(&table, &filters).map(|_| ())
                }
            };
            if let Err(err) = outcome {
                self.rollback()?;
                return Err(err);
            }
        }
        match self.commit() {
            Ok(()) => Ok(()),
            Err(err) => {
                let _ = self.load_schema();
                Err(err)
            }
        }
    }

    /// Auto-wrap a mutating closure in a transaction unless one is active.
    fn with_tx<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.pager.in_transaction() {
            return f(self);
        }
        self.pager.begin()?;
        match f(self) {
            Ok(value) => match self.pager.commit() {
                Ok(()) => Ok(value),
                Err(err) => {
                    // A failed commit already rolled the pager back; the
                    // schema cache may describe discarded pages.
                    let _ = self.load_schema();
                    Err(err)
                }
            },
            Err(err) => {
                let _ = self.pager.rollback();
                self.load_schema()?;
                Err(err)
            }
        }
    }

    // ------------------------------------------------------------------
    // DDL

    pub fn create_table(&mut self, name: &str, mut columns: Vec<ColumnSchema>) -> Result<PageNo> {
        if self.schema.table_exists(name) {
            return Err(DatabaseError::TableExists {
                name: name.to_string(),
            });
        }
        if columns.is_empty() {
            return Err(DatabaseError::InvalidData {
                details: format!("table '{name}' needs at least one column"),
            });
        }
        for (i, column) in columns.iter_mut().enumerate() {
            column.position = i;
        }
        for i in 1..columns.len() {
            if columns[..i].iter().any(|c| c.name == columns[i].name) {
                return Err(DatabaseError::InvalidData {
                    details: format!("duplicate column '{}'", columns[i].name),
                });
            }
        }

        let name = name.to_string();
        self.with_tx(|db| {
            let root = Btree::create(&mut db.pager, TreeKind::Table)?;
            let table = TableSchema::new(name.clone(), columns, root);
            db.insert_schema_row(table.to_catalog_row())?;
            for column in &table.columns {
                db.insert_schema_row(column.to_catalog_row(&name))?;
            }
            db.pager.bump_schema_cookie();
            db.schema.add_table(table);
            debug!("created table '{name}' with root page {root}");
            Ok(root)
        })
    }

    /// Drop a table: every page reachable from its root (and from each of
    /// its indexes) goes back to the freelist, then the catalog rows go.
    pub fn drop_table(&mut self, name: &str) -> Result<()> {
        let table = self.require_table(name)?;
        let indexes: Vec<IndexSchema> = self
            .schema
            .indexes_for_table(name)
            .into_iter()
            .cloned()
            .collect();

        let name = name.to_string();
        self.with_tx(|db| {
            for index in &indexes {
                Btree::reclaim(&mut db.pager, index.root_page)?;
            }
            Btree::reclaim(&mut db.pager, table.root_page)?;
            db.delete_schema_rows(|row| {
                let kind = row.values[0].as_text().unwrap_or_default();
                let owner = row.values[2].as_text().unwrap_or_default();
                (kind == CATALOG_TABLE && owner == name)
                    || (kind == CATALOG_COLUMN && owner == name)
                    || (kind == CATALOG_INDEX && owner == name)
            })?;
            db.pager.bump_schema_cookie();
            db.schema.remove_table(&name);
            debug!("dropped table '{name}'");
            Ok(())
        })
    }

    /// Create a single-column index and populate it from existing rows.
    pub fn create_index(&mut self, index_name: &str, table_name: &str, column_name: &str) -> Result<PageNo> {
        if self.schema.index_exists(index_name) {
            return Err(DatabaseError::IndexExists {
                name: index_name.to_string(),
            });
        }
        let table = self.require_table(table_name)?;
        let column = table
            .get_column_index(column_name)
            .ok_or_else(|| DatabaseError::ColumnNotFound {
                name: column_name.to_string(),
                table: table_name.to_string(),
            })?;

        let index_name = index_name.to_string();
        self.with_tx(|db| {
            let root = Btree::create(&mut db.pager, TreeKind::Index)?;
            let mut index_tree = Btree::open(root, TreeKind::Index);

            let table_tree = Btree::open(table.root_page, TreeKind::Table);
            let mut cursor = table_tree.cursor_first(&mut db.pager)?;
            while let Some(entry) = table_tree.cursor_next(&mut db.pager, &mut cursor)? {
                let Key::Row(row_id) = entry.key else {
                    continue;
                };
                let row = Row::from_record(row_id, &entry.payload)?;
                let value = row.get_value(column).cloned().unwrap_or(Value::Null);
                let tuple = vec![value, Value::Integer(row_id)];
                let payload = encode_record(&tuple);
                index_tree.insert(&mut db.pager, &Key::Tuple(tuple), &payload)?;
            }

            let index = IndexSchema {
                index_name: index_name.clone(),
                table_name: table.table_name.clone(),
                column_name: column_name.to_string(),
                root_page: index_tree.root,
            };
            db.insert_schema_row(index.to_catalog_row())?;
            db.pager.bump_schema_cookie();
            db.schema.add_index(index);
            debug!("created index '{index_name}' with root page {root}");
            Ok(root)
        })
    }

    pub fn drop_index(&mut self, name: &str) -> Result<()> {
        let index = self
            .schema
            .index(name)
            .cloned()
            .ok_or_else(|| DatabaseError::IndexNotFound {
                name: name.to_string(),
            })?;

        let name = name.to_string();
        self.with_tx(|db| {
            Btree::reclaim(&mut db.pager, index.root_page)?;
            db.delete_schema_rows(|row| {
                row.values[0].as_text() == Some(CATALOG_INDEX)
                    && row.values[1].as_text() == Some(name.as_str())
            })?;
            db.pager.bump_schema_cookie();
            db.schema.remove_index(&name);
            debug!("dropped index '{name}'");
            Ok(())
        })
    }

    // ------------------------------------------------------------------
    // DML

    /// Insert or update one row. Named fields are placed by the schema,
    /// defaults fill the gaps, and the row ID comes from the INTEGER
    /// PRIMARY KEY column when one is supplied, otherwise it is the next
    /// unused row ID. Writing to an existing row ID replaces the row.
    pub fn set(&mut self, table_name: &str, fields: &[&str], values: Vec<Value>) -> Result<RowId> {
        let table = self.require_table(table_name)?;
        if fields.len() != values.len() {
            return Err(DatabaseError::InvalidData {
                details: format!(
                    "{} field name(s) for {} value(s)",
                    fields.len(),
                    values.len()
                ),
            });
        }

        let mut row = Row::new(vec![Value::Null; table.columns.len()]);
        for (field, value) in fields.iter().zip(values) {
            let index = table
                .get_column_index(field)
                .ok_or_else(|| DatabaseError::ColumnNotFound {
                    name: field.to_string(),
                    table: table_name.to_string(),
                })?;
            row.values[index] = value;
        }
        table.apply_defaults(&mut row);

        let explicit_id = table
            .rowid_alias()
            .and_then(|col| row.get_value(col.position))
            .and_then(Value::as_integer);

        self.with_tx(|db| {
            let mut tree = Btree::open(table.root_page, TreeKind::Table);
            let row_id = match explicit_id {
                Some(id) => id,
                None => match tree.max_key(&mut db.pager)? {
                    Some(Key::Row(max)) => max + 1,
                    _ => 1,
                },
            };
            // An omitted INTEGER PRIMARY KEY takes the assigned row ID.
            if let Some(col) = table.rowid_alias() {
                if row.values[col.position].is_null() {
                    row.values[col.position] = Value::Integer(row_id);
                }
            }
            table.validate_row(&row)?;

            // Upsert: replace the previous row and its index entries.
            if let Some(old_payload) = tree.search(&mut db.pager, &Key::Row(row_id))? {
                let old_row = Row::from_record(row_id, &old_payload)?;
                db.unindex_row(&table, &old_row)?;
                tree.delete(&mut db.pager, &Key::Row(row_id))?;
            }

            let payload = row.to_record();
            tree.insert(&mut db.pager, &Key::Row(row_id), &payload)?;
            if tree.root != table.root_page {
                db.update_table_root(&table.table_name, tree.root)?;
            }

            let mut indexed = row.clone();
            indexed.row_id = Some(row_id);
            db.index_row(&table, &indexed)?;
            Ok(row_id)
        })
    }

    /// Delete every row matching the filters. Returns the number removed.
    pub fn delete_rows(&mut self, table_name: &str, filters: &[Predicate]) -> Result<usize> {
        let table = self.require_table(table_name)?;
        let victims = self.collect_rows(&table, filters)?;
        self.with_tx(|db| {
            let mut tree = Btree::open(
                db.schema
                    .table(&table.table_name)
                    .map(|t| t.root_page)
                    .unwrap_or(table.root_page),
                TreeKind::Table,
            );
            for row in &victims {
                let row_id = row.row_id.expect("collected rows carry their row ID");
                db.unindex_row(&table, row)?;
                tree.delete(&mut db.pager, &Key::Row(row_id))?;
            }
            if tree.root != table.root_page {
                db.update_table_root(&table.table_name, tree.root)?;
            }
            Ok(victims.len())
        })
    }

    /// Delete one row by its row ID.
    pub fn delete_row(&mut self, table_name: &str, row_id: RowId) -> Result<()> {
        let table = self.require_table(table_name)?;
        self.with_tx(|db| {
            let mut tree = Btree::open(table.root_page, TreeKind::Table);
            let payload = tree
                .search(&mut db.pager, &Key::Row(row_id))?
                .ok_or(DatabaseError::KeyNotFound)?;
            let row = Row::from_record(row_id, &payload)?;
            db.unindex_row(&table, &row)?;
            tree.delete(&mut db.pager, &Key::Row(row_id))?;
            if tree.root != table.root_page {
                db.update_table_root(&table.table_name, tree.root)?;
            }
            Ok(())
        })
    }

    /// Fetch rows, projected to `fields` (all columns when empty), that
    /// satisfy every filter. When a filter is strict equality on a fully
    /// indexed column the matching index drives the lookup; every other
    /// predicate is evaluated row by row after retrieval. Results come
    /// back in row-ID order.
    pub fn get(&mut self, table_name: &str, fields: &[&str], filters: &[Predicate]) -> Result<Vec<Row>> {
        let table = self.require_table(table_name)?;
        let projection: Vec<usize> = if fields.is_empty() {
            (0..table.columns.len()).collect()
        } else {
            fields
                .iter()
                .map(|f| {
                    table
                        .get_column_index(f)
                        .ok_or_else(|| DatabaseError::ColumnNotFound {
                            name: f.to_string(),
                            table: table_name.to_string(),
                        })
                })
                .collect::<Result<_>>()?
        };

        let rows = self.collect_rows(&table, filters)?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let values = projection
                    .iter()
                    .map(|&i| row.values.get(i).cloned().unwrap_or(Value::Null))
                    .collect();
                Row {
                    row_id: row.row_id,
                    values,
                }
            })
            .collect())
    }

    /// Full rows matching the filters, in row-ID order.
    fn collect_rows(&mut self, table: &TableSchema, filters: &[Predicate]) -> Result<Vec<Row>> {
        for filter in filters {
            filter.validate_against_schema(table)?;
        }

        // Index probe: the first strict-equality constraint on an indexed
        // column wins. Point lookups by row ID then replace the full scan.
        let mut probe: Option<(IndexSchema, Value)> = None;
        'outer: for filter in filters {
            for (column, value) in filter.equality_constraints() {
                if let Some(index) = self.schema.index_on(&table.table_name, column) {
                    probe = Some((index.clone(), value.clone()));
                    break 'outer;
                }
            }
        }

        let mut rows = Vec::new();
        if let Some((index, value)) = probe {
            debug!(
                "get on '{}' resolved via index '{}'",
                table.table_name, index.index_name
            );
            let mut row_ids = self.index_lookup(&index, &value)?;
            row_ids.sort_unstable();
            let tree = Btree::open(table.root_page, TreeKind::Table);
            for row_id in row_ids {
                let Some(payload) = tree.search(&mut self.pager, &Key::Row(row_id))? else {
                    return Err(DatabaseError::CorruptPage {
                        page_no: index.root_page,
                        reason: format!(
                            "index '{}' refers to missing row {row_id}",
                            index.index_name
                        ),
                    });
                };
                let row = Row::from_record(row_id, &payload)?;
                if self.row_matches(table, &row, filters)? {
                    rows.push(row);
                }
            }
        } else {
            let tree = Btree::open(table.root_page, TreeKind::Table);
            let mut cursor = tree.cursor_first(&mut self.pager)?;
            while let Some(entry) = tree.cursor_next(&mut self.pager, &mut cursor)? {
                let Key::Row(row_id) = entry.key else {
                    continue;
                };
                let row = Row::from_record(row_id, &entry.payload)?;
                if self.row_matches(table, &row, filters)? {
                    rows.push(row);
                }
            }
        }
        Ok(rows)
    }

    fn row_matches(&self, table: &TableSchema, row: &Row, filters: &[Predicate]) -> Result<bool> {
        for filter in filters {
            if !filter.evaluate(row, table)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Row IDs of index entries whose indexed value equals `value`.
    fn index_lookup(&mut self, index: &IndexSchema, value: &Value) -> Result<Vec<RowId>> {
        let tree = Btree::open(index.root_page, TreeKind::Index);
        let probe = Key::Tuple(vec![value.clone()]);
        let mut cursor = tree.cursor_seek(&mut self.pager, &probe)?;
        let mut row_ids = Vec::new();
        while let Some(entry) = tree.cursor_next(&mut self.pager, &mut cursor)? {
            let Key::Tuple(tuple) = entry.key else {
                continue;
            };
            let Some(first) = tuple.first() else {
                continue;
            };
            if compare_values(first, value) != std::cmp::Ordering::Equal {
                break;
            }
            if let Some(row_id) = tuple.get(1).and_then(Value::as_integer) {
                row_ids.push(row_id);
            }
        }
        Ok(row_ids)
    }

    // ------------------------------------------------------------------
    // index maintenance

    fn index_row(&mut self, table: &TableSchema, row: &Row) -> Result<()> {
        let row_id = row.row_id.expect("indexed rows carry their row ID");
        let indexes: Vec<IndexSchema> = self
            .schema
            .indexes_for_table(&table.table_name)
            .into_iter()
            .cloned()
            .collect();
        for index in indexes {
            let column = table
                .get_column_index(&index.column_name)
                .ok_or_else(|| DatabaseError::ColumnNotFound {
                    name: index.column_name.clone(),
                    table: table.table_name.clone(),
                })?;
            let value = row.get_value(column).cloned().unwrap_or(Value::Null);
            let tuple = vec![value, Value::Integer(row_id)];
            let payload = encode_record(&tuple);
            let mut tree = Btree::open(index.root_page, TreeKind::Index);
            tree.insert(&mut self.pager, &Key::Tuple(tuple), &payload)?;
            if tree.root != index.root_page {
                self.update_index_root(&index.index_name, tree.root)?;
            }
        }
        Ok(())
    }

    fn unindex_row(&mut self, table: &TableSchema, row: &Row) -> Result<()> {
        let row_id = row.row_id.expect("indexed rows carry their row ID");
        let indexes: Vec<IndexSchema> = self
            .schema
            .indexes_for_table(&table.table_name)
            .into_iter()
            .cloned()
            .collect();
        for index in indexes {
            let column = table
                .get_column_index(&index.column_name)
                .ok_or_else(|| DatabaseError::ColumnNotFound {
                    name: index.column_name.clone(),
                    table: table.table_name.clone(),
                })?;
            let value = row.get_value(column).cloned().unwrap_or(Value::Null);
            let tuple = vec![value, Value::Integer(row_id)];
            let mut tree = Btree::open(index.root_page, TreeKind::Index);
            tree.delete(&mut self.pager, &Key::Tuple(tuple))?;
            if tree.root != index.root_page {
                self.update_index_root(&index.index_name, tree.root)?;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // catalog plumbing

    fn require_table(&self, name: &str) -> Result<TableSchema> {
        self.schema
            .table(name)
            .cloned()
            .ok_or_else(|| DatabaseError::TableNotFound {
                name: name.to_string(),
            })
    }

    fn schema_tree(&self) -> Btree {
        Btree::open(self.pager.schema_root(), TreeKind::Table)
    }

    /// Insert a catalog row, assigning the next row ID. Splitting the
    /// schema tree can move its root; the header field tracks it.
    fn insert_schema_row(&mut self, row: Row) -> Result<RowId> {
        let mut tree = self.schema_tree();
        let row_id = match tree.max_key(&mut self.pager)? {
            Some(Key::Row(max)) => max + 1,
            _ => 1,
        };
        let payload = row.to_record();
        if tree.insert(&mut self.pager, &Key::Row(row_id), &payload)?.is_some() {
            self.pager.set_schema_root(tree.root);
        }
        Ok(row_id)
    }

    fn delete_schema_rows(&mut self, matches: impl Fn(&Row) -> bool) -> Result<usize> {
        let victims: Vec<RowId> = self
            .scan_schema_rows()?
            .into_iter()
            .filter(|row| row.values.len() >= 3 && matches(row))
            .map(|row| row.row_id.expect("catalog rows carry their row ID"))
            .collect();
        let mut tree = self.schema_tree();
        for row_id in &victims {
            if tree.delete(&mut self.pager, &Key::Row(*row_id))?.is_some() {
                self.pager.set_schema_root(tree.root);
            }
        }
        Ok(victims.len())
    }

    fn scan_schema_rows(&mut self) -> Result<Vec<Row>> {
        let tree = self.schema_tree();
        let mut cursor = tree.cursor_first(&mut self.pager)?;
        let mut rows = Vec::new();
        while let Some(entry) = tree.cursor_next(&mut self.pager, &mut cursor)? {
            let Key::Row(row_id) = entry.key else {
                continue;
            };
            rows.push(Row::from_record(row_id, &entry.payload)?);
        }
        Ok(rows)
    }

    /// Rewrite the catalog row recording a table's root page.
    fn update_table_root(&mut self, table_name: &str, new_root: PageNo) -> Result<()> {
        self.rewrite_catalog_row(
            |row| {
                row.values[0].as_text() == Some(CATALOG_TABLE)
                    && row.values[1].as_text() == Some(table_name)
            },
            |row| row.set_value(3, Value::Integer(new_root as i64)),
        )?;
        if let Some(table) = self.schema.table_mut(table_name) {
            table.root_page = new_root;
        }
        debug!("table '{table_name}' root moved to page {new_root}");
        Ok(())
    }

    fn update_index_root(&mut self, index_name: &str, new_root: PageNo) -> Result<()> {
        self.rewrite_catalog_row(
            |row| {
                row.values[0].as_text() == Some(CATALOG_INDEX)
                    && row.values[1].as_text() == Some(index_name)
            },
            |row| row.set_value(3, Value::Integer(new_root as i64)),
        )?;
        if let Some(index) = self.schema.index_mut(index_name) {
            index.root_page = new_root;
        }
        debug!("index '{index_name}' root moved to page {new_root}");
        Ok(())
    }

    fn rewrite_catalog_row(
        &mut self,
        matches: impl Fn(&Row) -> bool,
        mutate: impl Fn(&mut Row) -> Result<()>,
    ) -> Result<()> {
        let row = self
            .scan_schema_rows()?
            .into_iter()
            .find(|row| row.values.len() >= 4 && matches(row));
        let Some(mut row) = row else {
            return Err(DatabaseError::RecordCorrupt {
                details: "catalog row missing during rewrite".to_string(),
            });
        };
        mutate(&mut row)?;
        let row_id = row.row_id.expect("catalog rows carry their row ID");

        let mut tree = self.schema_tree();
        if tree.delete(&mut self.pager, &Key::Row(row_id))?.is_some() {
            self.pager.set_schema_root(tree.root);
        }
        let payload = row.to_record();
        if tree.insert(&mut self.pager, &Key::Row(row_id), &payload)?.is_some() {
            self.pager.set_schema_root(tree.root);
        }
        Ok(())
    }

    /// Rebuild the schema cache from the schema tree.
    fn load_schema(&mut self) -> Result<()> {
        let rows = self.scan_schema_rows()?;
        self.schema.clear();

        // Tables first, then their columns, then indexes.
        for row in &rows {
            if row.values.len() >= 5 && row.values[0].as_text() == Some(CATALOG_TABLE) {
                let name = row.values[1].as_text().unwrap_or_default().to_string();
                let root = row.values[3].as_integer().unwrap_or_default() as PageNo;
                let definition = row.values[4].as_text().unwrap_or_default().to_string();
                self.schema.add_table(TableSchema {
                    table_name: name,
                    columns: Vec::new(),
                    root_page: root,
                    definition,
                });
            }
        }
        for row in &rows {
            if row.values.len() >= 9 && row.values[0].as_text() == Some(CATALOG_COLUMN) {
                let table_name = row.values[2].as_text().unwrap_or_default().to_string();
                let column = ColumnSchema::from_catalog_row(row)?;
                if let Some(table) = self.schema.table_mut(&table_name) {
                    table.columns.push(column);
                }
            }
        }
        for name in self.schema.table_names() {
            if let Some(table) = self.schema.table_mut(&name) {
                table.columns.sort_by_key(|col| col.position);
            }
        }
        for row in &rows {
            if row.values.len() >= 5 && row.values[0].as_text() == Some(CATALOG_INDEX) {
                self.schema.add_index(IndexSchema::from_catalog_row(row)?);
            }
        }
        Ok(())
    }
}
