use std::fs::OpenOptions;
use std::io::Write;

use gudang::storage::wal::{wal_path_for, Wal, WAL_HEADER_SIZE};
use gudang::utils::mock::TempDatabase;
use gudang::{ColumnSchema, DataType, Value};
use tempfile::TempDir;

fn person_columns() -> Vec<ColumnSchema> {
    vec![
        ColumnSchema::new("id", DataType::Integer, 0).primary_key(),
        ColumnSchema::new("name", DataType::Text, 1),
    ]
}

#[test]
fn committed_data_survives_reopen() {
    let mut tmp = TempDatabase::new();
    {
        let db = tmp.create();
        db.create_table("people", person_columns()).unwrap();
        db.set("people", &["id", "name"], vec![Value::Integer(1), Value::Text("ana".into())])
            .unwrap();
    }
    tmp.close();
    let db = tmp.open();
    let rows = db.get("people", &["name"], &[]).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].values[0], Value::Text("ana".into()));
}

#[test]
fn torn_wal_tail_is_discarded() {
    let mut tmp = TempDatabase::new();
    {
        let db = tmp.create();
        db.create_table("people", person_columns()).unwrap();
        db.set("people", &["id", "name"], vec![Value::Integer(1), Value::Text("ana".into())])
            .unwrap();
    }
    tmp.close();

    let before = std::fs::read(&tmp.path).unwrap();

    // Simulate a crash mid-journal: page frames (here, a half-written one)
    // land in the log, but no commit marker ever does.
    let wal_path = wal_path_for(&tmp.path);
    let mut wal_file = OpenOptions::new().append(true).open(&wal_path).unwrap();
    let mut torn = vec![1u8]; // page-frame type
    torn.extend_from_slice(&2u32.to_be_bytes()); // page number
    torn.extend_from_slice(&0xdeadbeefu32.to_be_bytes()); // bogus checksum
    torn.extend_from_slice(&vec![0x55u8; 100]); // truncated page image
    wal_file.write_all(&torn).unwrap();
    wal_file.sync_all().unwrap();
    drop(wal_file);

    // Recovery discards the tail; the main file is byte-identical.
    let db = tmp.open();
    let rows = db.get("people", &["name"], &[]).unwrap();
    assert_eq!(rows.len(), 1);
    drop(tmp.database.take());
    assert_eq!(std::fs::read(&tmp.path).unwrap(), before);
}

#[test]
fn uncommitted_frames_without_marker_leave_file_untouched() {
    let mut tmp = TempDatabase::new();
    {
        let db = tmp.create();
        db.create_table("people", person_columns()).unwrap();
        db.set("people", &["id", "name"], vec![Value::Integer(1), Value::Text("ana".into())])
            .unwrap();
    }
    tmp.close();
    let before = std::fs::read(&tmp.path).unwrap();

    // A whole, well-formed-looking frame set with no commit marker: the
    // checksums cannot match the salts, and even if the frames parsed,
    // visibility is gated on the marker alone.
    let wal_path = wal_path_for(&tmp.path);
    let mut wal_file = OpenOptions::new().append(true).open(&wal_path).unwrap();
    let mut frame = vec![1u8];
    frame.extend_from_slice(&1u32.to_be_bytes());
    frame.extend_from_slice(&0u32.to_be_bytes());
    frame.extend_from_slice(&vec![0xffu8; 4096]);
    wal_file.write_all(&frame).unwrap();
    wal_file.sync_all().unwrap();
    drop(wal_file);

    tmp.open();
    tmp.close();
    assert_eq!(std::fs::read(&tmp.path).unwrap(), before);

    // Recovery also truncated the log back to its bare header.
    assert_eq!(
        std::fs::metadata(&wal_path).unwrap().len(),
        WAL_HEADER_SIZE
    );
}

#[test]
fn replaying_identical_frames_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("wal_idempotent.db");
    let mut db_file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .read(true)
        .write(true)
        .open(&db_path)
        .unwrap();
    db_file.write_all(&vec![0u8; 3 * 512]).unwrap();
    db_file.sync_all().unwrap();

    let frames = vec![(2u32, vec![0xaau8; 512]), (3u32, vec![0xbbu8; 512])];

    let mut wal = Wal::open(&db_path, 512).unwrap();
    wal.append_transaction(&frames).unwrap();
    wal.recover(&mut db_file).unwrap();
    let first = std::fs::read(&db_path).unwrap();

    // The same committed images a second time: same bytes, no-op.
    wal.append_transaction(&frames).unwrap();
    wal.recover(&mut db_file).unwrap();
    assert_eq!(std::fs::read(&db_path).unwrap(), first);
}
