use gudang::utils::mock::TempDatabase;
use gudang::{ColumnSchema, Command, DataType, Database, DatabaseError, Predicate, Value};

fn people_columns() -> Vec<ColumnSchema> {
    vec![
        ColumnSchema::new("id", DataType::Integer, 0).primary_key(),
        ColumnSchema::new("name", DataType::Text, 1),
        ColumnSchema::new("age", DataType::Integer, 2),
    ]
}

fn seed_people(db: &mut Database) {
    db.create_table("t", people_columns()).unwrap();
    for (id, name, age) in [(1, "a", 30), (2, "b", 25), (3, "c", 40)] {
        db.set(
            "t",
            &["id", "name", "age"],
            vec![
                Value::Integer(id),
                Value::Text(name.to_string()),
                Value::Integer(age),
            ],
        )
        .unwrap();
    }
}

#[test]
fn filtered_get_in_row_id_order() {
    let mut tmp = TempDatabase::new();
    let db = tmp.create();
    seed_people(db);

    let rows = db
        .get("t", &["name"], &[Predicate::gt("age", Value::Integer(28))])
        .unwrap();
    let names: Vec<&str> = rows
        .iter()
        .map(|row| row.values[0].as_text().unwrap())
        .collect();
    assert_eq!(names, vec!["a", "c"]);
    assert!(rows[0].row_id.unwrap() < rows[1].row_id.unwrap());
}

#[test]
fn equality_get_resolves_via_index() {
    let mut tmp = TempDatabase::new();
    let db = tmp.create();
    db.create_table("t", people_columns()).unwrap();
    for i in 1..=200i64 {
        db.set(
            "t",
            &["id", "name", "age"],
            vec![
                Value::Integer(i),
                Value::Text(format!("p{i}")),
                Value::Integer(20 + (i % 50)),
            ],
        )
        .unwrap();
    }
    db.create_index("t_age", "t", "age").unwrap();

    // Full scan cost, measured in pages touched.
    db.reset_stats();
    let scanned = db
        .get("t", &["id"], &[Predicate::ne("age", Value::Integer(0))])
        .unwrap();
    let full_scan_reads = db.stats().pages_read;
    assert_eq!(scanned.len(), 200);

    // Index probe: far fewer page reads than the scan.
    db.reset_stats();
    let rows = db
        .get("t", &["id"], &[Predicate::eq("age", Value::Integer(25))])
        .unwrap();
    let indexed_reads = db.stats().pages_read;

    let expected: Vec<i64> = (1..=200).filter(|i| 20 + (i % 50) == 25).collect();
    let got: Vec<i64> = rows
        .iter()
        .map(|row| row.values[0].as_integer().unwrap())
        .collect();
    assert_eq!(got, expected);
    assert!(
        indexed_reads < full_scan_reads,
        "index probe read {indexed_reads} pages, full scan {full_scan_reads}"
    );
}

#[test]
fn index_probe_on_age_25() {
    let mut tmp = TempDatabase::new();
    let db = tmp.create();
    seed_people(db);
    db.create_index("t_age", "t", "age").unwrap();

    let rows = db
        .get("t", &["id"], &[Predicate::eq("age", Value::Integer(25))])
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].values[0], Value::Integer(2));
}

#[test]
fn set_without_explicit_id_autoincrements() {
    let mut tmp = TempDatabase::new();
    let db = tmp.create();
    db.create_table(
        "notes",
        vec![ColumnSchema::new("body", DataType::Text, 0)],
    )
    .unwrap();

    let first = db
        .set("notes", &["body"], vec![Value::Text("one".into())])
        .unwrap();
    let second = db
        .set("notes", &["body"], vec![Value::Text("two".into())])
        .unwrap();
    assert_eq!(first, 1);
    assert_eq!(second, 2);
}

#[test]
fn set_with_existing_id_updates_in_place() {
    let mut tmp = TempDatabase::new();
    let db = tmp.create();
    seed_people(db);

    db.set(
        "t",
        &["id", "name", "age"],
        vec![Value::Integer(2), Value::Text("b2".into()), Value::Integer(26)],
    )
    .unwrap();

    let rows = db.get("t", &[], &[]).unwrap();
    assert_eq!(rows.len(), 3);
    let updated = rows.iter().find(|r| r.row_id == Some(2)).unwrap();
    assert_eq!(updated.values[1], Value::Text("b2".into()));
    assert_eq!(updated.values[2], Value::Integer(26));
}

#[test]
fn updates_keep_indexes_consistent() {
    let mut tmp = TempDatabase::new();
    let db = tmp.create();
    seed_people(db);
    db.create_index("t_age", "t", "age").unwrap();

    db.set(
        "t",
        &["id", "name", "age"],
        vec![Value::Integer(2), Value::Text("b".into()), Value::Integer(31)],
    )
    .unwrap();

    let at_25 = db
        .get("t", &["id"], &[Predicate::eq("age", Value::Integer(25))])
        .unwrap();
    assert!(at_25.is_empty());
    let at_31 = db
        .get("t", &["id"], &[Predicate::eq("age", Value::Integer(31))])
        .unwrap();
    assert_eq!(at_31.len(), 1);
    assert_eq!(at_31[0].values[0], Value::Integer(2));
}

#[test]
fn delete_rows_with_filter() {
    let mut tmp = TempDatabase::new();
    let db = tmp.create();
    seed_people(db);

    let removed = db
        .delete_rows("t", &[Predicate::lt("age", Value::Integer(35))])
        .unwrap();
    assert_eq!(removed, 2);
    let rows = db.get("t", &["name"], &[]).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].values[0], Value::Text("c".into()));
}

#[test]
fn failed_transaction_leaves_table_unchanged() {
    let mut tmp = TempDatabase::new();
    let db = tmp.create();
    seed_people(db);

    // Second command fails (no such table); the first Set must not stick.
    let err = db
        .transaction(vec![
            Command::Set {
                table: "t".into(),
                fields: vec!["id".into(), "name".into(), "age".into()],
                values: vec![Value::Integer(9), Value::Text("x".into()), Value::Integer(50)],
            },
            Command::Set {
                table: "missing".into(),
                fields: vec!["id".into()],
                values: vec![Value::Integer(1)],
            },
        ])
        .unwrap_err();
    assert!(matches!(err, DatabaseError::TableNotFound { .. }));

    let rows = db.get("t", &[], &[]).unwrap();
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r.row_id != Some(9)));
}

#[test]
fn rolled_back_transaction_is_invisible_after_reopen() {
    let mut tmp = TempDatabase::new();
    {
        let db = tmp.create();
        seed_people(db);
        db.begin().unwrap();
        db.set(
            "t",
            &["id", "name", "age"],
            vec![Value::Integer(4), Value::Text("d".into()), Value::Integer(99)],
        )
        .unwrap();
        db.rollback().unwrap();
    }
    tmp.close();

    let db = tmp.open();
    let rows = db.get("t", &[], &[]).unwrap();
    assert_eq!(rows.len(), 3);
}

#[test]
fn schema_survives_reopen() {
    let mut tmp = TempDatabase::new();
    {
        let db = tmp.create();
        seed_people(db);
        db.create_index("t_age", "t", "age").unwrap();
    }
    tmp.close();

    let db = tmp.open();
    assert_eq!(db.table_names(), vec!["t".to_string()]);
    let schema = db.table_schema("t").unwrap();
    assert_eq!(schema.columns.len(), 3);
    assert_eq!(schema.columns[1].name, "name");
    assert!(db.index_schema("t_age").is_some());

    let rows = db
        .get("t", &["id"], &[Predicate::eq("age", Value::Integer(25))])
        .unwrap();
    assert_eq!(rows.len(), 1);
}

#[test]
fn drop_table_reclaims_its_pages() {
    let mut tmp = TempDatabase::new();
    let db = tmp.create();
    db.create_table("big", people_columns()).unwrap();
    for i in 1..=300i64 {
        db.set(
            "big",
            &["id", "name", "age"],
            vec![
                Value::Integer(i),
                Value::Text("n".repeat(64)),
                Value::Integer(i),
            ],
        )
        .unwrap();
    }
    db.create_index("big_age", "big", "age").unwrap();
    assert!(db.header().page_count > 4);

    db.drop_table("big").unwrap();
    assert!(db.table_schema("big").is_none());
    assert!(db.index_schema("big_age").is_none());
    assert!(db.freelist_len() > 0);

    // A new table reuses reclaimed pages instead of growing the file.
    let before = db.header().page_count;
    db.create_table("small", people_columns()).unwrap();
    db.set(
        "small",
        &["id", "name", "age"],
        vec![Value::Integer(1), Value::Text("s".into()), Value::Integer(1)],
    )
    .unwrap();
    assert_eq!(db.header().page_count, before);
}

#[test]
fn duplicate_table_and_missing_table_errors() {
    let mut tmp = TempDatabase::new();
    let db = tmp.create();
    seed_people(db);

    let err = db.create_table("t", people_columns()).unwrap_err();
    assert!(matches!(err, DatabaseError::TableExists { .. }));
    let err = db.get("nope", &[], &[]).unwrap_err();
    assert!(matches!(err, DatabaseError::TableNotFound { .. }));
    let err = db
        .get("t", &["ghost"], &[])
        .unwrap_err();
    assert!(matches!(err, DatabaseError::ColumnNotFound { .. }));
    let err = db.drop_index("ghost").unwrap_err();
    assert!(matches!(err, DatabaseError::IndexNotFound { .. }));
}

#[test]
fn create_database_refuses_to_overwrite() {
    let mut tmp = TempDatabase::new();
    tmp.create();
    tmp.close();
    let err = Database::create(&tmp.path).unwrap_err();
    assert!(matches!(err, DatabaseError::InvalidData { .. }));
}

#[test]
fn destroy_removes_database_and_wal() {
    let mut tmp = TempDatabase::new();
    {
        let db = tmp.create();
        seed_people(db);
    }
    tmp.close();
    Database::destroy(&tmp.path).unwrap();
    assert!(!tmp.path.exists());
    assert!(!gudang::storage::wal::wal_path_for(&tmp.path).exists());
}

#[test]
fn null_comparisons_never_match() {
    let mut tmp = TempDatabase::new();
    let db = tmp.create();
    db.create_table(
        "n",
        vec![
            ColumnSchema::new("id", DataType::Integer, 0).primary_key(),
            ColumnSchema::new("v", DataType::Integer, 1),
        ],
    )
    .unwrap();
    db.set("n", &["id", "v"], vec![Value::Integer(1), Value::Null]).unwrap();
    db.set("n", &["id", "v"], vec![Value::Integer(2), Value::Integer(7)]).unwrap();

    let eq = db.get("n", &["id"], &[Predicate::eq("v", Value::Integer(7))]).unwrap();
    assert_eq!(eq.len(), 1);
    let null_rows = db.get("n", &["id"], &[Predicate::is_null("v")]).unwrap();
    assert_eq!(null_rows.len(), 1);
    assert_eq!(null_rows[0].values[0], Value::Integer(1));
    let lt = db.get("n", &["id"], &[Predicate::lt("v", Value::Integer(100))]).unwrap();
    assert_eq!(lt.len(), 1, "NULL never satisfies an ordering comparison");
}

#[test]
fn defaults_fill_missing_fields() {
    let mut tmp = TempDatabase::new();
    let db = tmp.create();
    db.create_table(
        "d",
        vec![
            ColumnSchema::new("id", DataType::Integer, 0).primary_key(),
            ColumnSchema::new("status", DataType::Text, 1)
                .with_default(Value::Text("new".into())),
        ],
    )
    .unwrap();
    db.set("d", &["id"], vec![Value::Integer(1)]).unwrap();
    let rows = db.get("d", &["status"], &[]).unwrap();
    assert_eq!(rows[0].values[0], Value::Text("new".into()));
}
