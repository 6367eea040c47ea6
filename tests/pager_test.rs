use gudang::storage::pager::Pager;
use gudang::DatabaseError;
use tempfile::TempDir;

fn temp_db_path(dir: &TempDir) -> std::path::PathBuf {
    dir.path().join("pager_test.db")
}

#[test]
fn create_then_reopen() {
    let dir = TempDir::new().unwrap();
    let path = temp_db_path(&dir);
    {
        let pager = Pager::create(&path, 4096).unwrap();
        assert_eq!(pager.page_size(), 4096);
        assert_eq!(pager.page_count(), 1);
        assert_eq!(pager.schema_root(), 1);
    }
    let pager = Pager::open(&path).unwrap();
    assert_eq!(pager.page_size(), 4096);
    assert_eq!(pager.page_count(), 1);
}

#[test]
fn rejects_bad_page_sizes() {
    let dir = TempDir::new().unwrap();
    for size in [0usize, 100, 4095, 256, 131072] {
        let err = Pager::create(dir.path().join(format!("bad{size}.db")), size).unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidPageSize { .. }));
    }
}

#[test]
fn writes_require_a_transaction() {
    let dir = TempDir::new().unwrap();
    let mut pager = Pager::create(temp_db_path(&dir), 4096).unwrap();
    let err = pager.write(1, vec![0u8; 4096]).unwrap_err();
    assert!(matches!(err, DatabaseError::TransactionAborted { .. }));
    let err = pager.allocate().unwrap_err();
    assert!(matches!(err, DatabaseError::TransactionAborted { .. }));
}

#[test]
fn read_your_writes_inside_a_transaction() {
    let dir = TempDir::new().unwrap();
    let mut pager = Pager::create(temp_db_path(&dir), 4096).unwrap();
    pager.begin().unwrap();
    let page_no = pager.allocate().unwrap();
    let mut image = vec![0u8; 4096];
    image[100] = 0xab;
    pager.write(page_no, image.clone()).unwrap();
    assert_eq!(pager.read(page_no).unwrap(), image);
    pager.commit().unwrap();
    assert_eq!(pager.read(page_no).unwrap(), image);
}

#[test]
fn rollback_discards_buffered_writes() {
    let dir = TempDir::new().unwrap();
    let path = temp_db_path(&dir);
    let mut pager = Pager::create(&path, 4096).unwrap();

    pager.begin().unwrap();
    let page_no = pager.allocate().unwrap();
    pager.write(page_no, vec![0x77u8; 4096]).unwrap();
    pager.rollback().unwrap();

    // The allocation never happened as far as the file is concerned.
    assert_eq!(pager.page_count(), 1);
    let err = pager.read(page_no).unwrap_err();
    assert!(matches!(err, DatabaseError::CorruptPage { .. }));
}

#[test]
fn rollback_leaves_file_untouched() {
    let dir = TempDir::new().unwrap();
    let path = temp_db_path(&dir);
    let mut pager = Pager::create(&path, 4096).unwrap();
    pager.begin().unwrap();
    let a = pager.allocate().unwrap();
    pager.write(a, vec![1u8; 4096]).unwrap();
    pager.commit().unwrap();

    let before = std::fs::read(&path).unwrap();
    pager.begin().unwrap();
    pager.write(a, vec![2u8; 4096]).unwrap();
    pager.rollback().unwrap();
    drop(pager);
    assert_eq!(std::fs::read(&path).unwrap(), before);
}

#[test]
fn freed_pages_are_reused() {
    let dir = TempDir::new().unwrap();
    let mut pager = Pager::create(temp_db_path(&dir), 4096).unwrap();

    pager.begin().unwrap();
    let a = pager.allocate().unwrap();
    let b = pager.allocate().unwrap();
    assert_ne!(a, b);
    pager.commit().unwrap();

    pager.begin().unwrap();
    pager.free(b).unwrap();
    pager.free(a).unwrap();
    assert_eq!(pager.freelist_count(), 2);
    pager.commit().unwrap();
    let pages_before = pager.page_count();

    pager.begin().unwrap();
    let c = pager.allocate().unwrap();
    let d = pager.allocate().unwrap();
    pager.commit().unwrap();

    // Both came off the freelist, so the file did not grow.
    assert!([a, b].contains(&c));
    assert!([a, b].contains(&d));
    assert_eq!(pager.page_count(), pages_before);
    assert_eq!(pager.freelist_count(), 0);
}

#[test]
fn double_free_is_rejected() {
    let dir = TempDir::new().unwrap();
    let mut pager = Pager::create(temp_db_path(&dir), 4096).unwrap();
    pager.begin().unwrap();
    let a = pager.allocate().unwrap();
    pager.free(a).unwrap();
    let err = pager.free(a).unwrap_err();
    assert!(matches!(err, DatabaseError::CorruptPage { .. }));
    let err = pager.free(1).unwrap_err();
    assert!(matches!(err, DatabaseError::CorruptPage { .. }));
}

#[test]
fn only_one_active_transaction() {
    let dir = TempDir::new().unwrap();
    let mut pager = Pager::create(temp_db_path(&dir), 4096).unwrap();
    pager.begin().unwrap();
    let err = pager.begin().unwrap_err();
    assert!(matches!(err, DatabaseError::TransactionAborted { .. }));
    pager.commit().unwrap();
    pager.begin().unwrap();
    pager.rollback().unwrap();
}

#[test]
fn commit_bumps_change_counter() {
    let dir = TempDir::new().unwrap();
    let mut pager = Pager::create(temp_db_path(&dir), 4096).unwrap();
    let before = pager.header().change_counter;
    pager.begin().unwrap();
    let a = pager.allocate().unwrap();
    pager.write(a, vec![9u8; 4096]).unwrap();
    pager.commit().unwrap();
    assert!(pager.header().change_counter > before);
}
