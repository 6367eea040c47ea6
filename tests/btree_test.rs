use gudang::storage::btree::{Btree, Key, TreeKind};
use gudang::storage::pager::Pager;
use gudang::types::record::encode_record;
use gudang::types::value::Value;
use gudang::DatabaseError;
use tempfile::TempDir;

fn fresh_pager(dir: &TempDir) -> Pager {
    Pager::create(dir.path().join("btree_test.db"), 4096).unwrap()
}

fn row_payload(key: i64, name: &str) -> Vec<u8> {
    encode_record(&[Value::Integer(key), Value::Text(name.to_string())])
}

fn new_table_tree(pager: &mut Pager) -> Btree {
    pager.begin().unwrap();
    let root = Btree::create(pager, TreeKind::Table).unwrap();
    pager.commit().unwrap();
    Btree::open(root, TreeKind::Table)
}

fn scan_row_ids(tree: &Btree, pager: &mut Pager) -> Vec<i64> {
    let mut cursor = tree.cursor_first(pager).unwrap();
    let mut ids = Vec::new();
    while let Some(entry) = tree.cursor_next(pager, &mut cursor).unwrap() {
        match entry.key {
            Key::Row(id) => ids.push(id),
            Key::Tuple(_) => panic!("table scan produced a tuple key"),
        }
    }
    ids
}

#[test]
fn insert_then_search() {
    let dir = TempDir::new().unwrap();
    let mut pager = fresh_pager(&dir);
    let mut tree = new_table_tree(&mut pager);

    pager.begin().unwrap();
    for i in 1..=10 {
        tree.insert(&mut pager, &Key::Row(i), &row_payload(i, "row")).unwrap();
    }
    pager.commit().unwrap();

    for i in 1..=10 {
        let payload = tree.search(&mut pager, &Key::Row(i)).unwrap().unwrap();
        assert_eq!(payload, row_payload(i, "row"));
    }
    assert!(tree.search(&mut pager, &Key::Row(11)).unwrap().is_none());
}

#[test]
fn traversal_is_sorted_regardless_of_insert_order() {
    let dir = TempDir::new().unwrap();
    let mut pager = fresh_pager(&dir);
    let mut tree = new_table_tree(&mut pager);

    // A few hundred rows in shuffled order forces several splits.
    let mut keys: Vec<i64> = (1..=500).collect();
    for i in 0..keys.len() {
        let j = (i * 7919 + 13) % keys.len();
        keys.swap(i, j);
    }

    pager.begin().unwrap();
    for &key in &keys {
        tree.insert(&mut pager, &Key::Row(key), &row_payload(key, "shuffled"))
            .unwrap();
    }
    pager.commit().unwrap();

    let ids = scan_row_ids(&tree, &mut pager);
    assert_eq!(ids, (1..=500).collect::<Vec<i64>>());
}

#[test]
fn root_split_reports_new_root() {
    let dir = TempDir::new().unwrap();
    let mut pager = fresh_pager(&dir);
    let mut tree = new_table_tree(&mut pager);
    let first_root = tree.root;

    pager.begin().unwrap();
    let mut root_changes = 0;
    for i in 1..=200 {
        let big = "x".repeat(100);
        if tree
            .insert(&mut pager, &Key::Row(i), &row_payload(i, &big))
            .unwrap()
            .is_some()
        {
            root_changes += 1;
        }
    }
    pager.commit().unwrap();

    assert!(root_changes > 0, "200 fat rows must split the root");
    assert_ne!(tree.root, first_root);
    assert_eq!(scan_row_ids(&tree, &mut pager).len(), 200);
}

#[test]
fn duplicate_row_id_is_rejected() {
    let dir = TempDir::new().unwrap();
    let mut pager = fresh_pager(&dir);
    let mut tree = new_table_tree(&mut pager);

    pager.begin().unwrap();
    tree.insert(&mut pager, &Key::Row(7), &row_payload(7, "first")).unwrap();
    let err = tree
        .insert(&mut pager, &Key::Row(7), &row_payload(7, "second"))
        .unwrap_err();
    assert!(matches!(err, DatabaseError::DuplicateKey { row_id: 7 }));
    pager.rollback().unwrap();
}

#[test]
fn delete_missing_key_is_an_error() {
    let dir = TempDir::new().unwrap();
    let mut pager = fresh_pager(&dir);
    let mut tree = new_table_tree(&mut pager);

    pager.begin().unwrap();
    tree.insert(&mut pager, &Key::Row(1), &row_payload(1, "only")).unwrap();
    let err = tree.delete(&mut pager, &Key::Row(2)).unwrap_err();
    assert!(matches!(err, DatabaseError::KeyNotFound));
    pager.rollback().unwrap();
}

#[test]
fn delete_everything_returns_pages_to_freelist() {
    let dir = TempDir::new().unwrap();
    let mut pager = fresh_pager(&dir);
    let mut tree = new_table_tree(&mut pager);

    pager.begin().unwrap();
    for i in 1..=300 {
        tree.insert(&mut pager, &Key::Row(i), &row_payload(i, &"y".repeat(60)))
            .unwrap();
    }
    pager.commit().unwrap();
    assert!(pager.page_count() > 3, "the tree should span several pages");

    pager.begin().unwrap();
    for i in 1..=300 {
        tree.delete(&mut pager, &Key::Row(i)).unwrap();
    }
    pager.commit().unwrap();

    assert_eq!(scan_row_ids(&tree, &mut pager), Vec::<i64>::new());
    // Every page except the schema root and the (empty) tree root is on
    // the freelist again.
    assert_eq!(
        pager.freelist_count() + 2,
        pager.page_count(),
        "all non-root pages must return to the freelist"
    );
}

#[test]
fn overflow_payload_roundtrip() {
    let dir = TempDir::new().unwrap();
    let mut pager = fresh_pager(&dir);
    let mut tree = new_table_tree(&mut pager);

    // Far larger than a page, so the payload must chain through several
    // overflow pages.
    let long_text = "abcdefgh".repeat(4000);
    let payload = encode_record(&[Value::Integer(1), Value::Text(long_text.clone())]);
    assert!(payload.len() > 3 * 4096);

    pager.begin().unwrap();
    tree.insert(&mut pager, &Key::Row(1), &payload).unwrap();
    tree.insert(&mut pager, &Key::Row(2), &row_payload(2, "small")).unwrap();
    pager.commit().unwrap();

    let fetched = tree.search(&mut pager, &Key::Row(1)).unwrap().unwrap();
    assert_eq!(fetched, payload);

    // Deleting the fat row frees its whole overflow chain.
    let before = pager.freelist_count();
    pager.begin().unwrap();
    tree.delete(&mut pager, &Key::Row(1)).unwrap();
    pager.commit().unwrap();
    assert!(pager.freelist_count() >= before + 3);
}

#[test]
fn max_key_tracks_the_rightmost_row() {
    let dir = TempDir::new().unwrap();
    let mut pager = fresh_pager(&dir);
    let mut tree = new_table_tree(&mut pager);

    assert!(tree.max_key(&mut pager).unwrap().is_none());
    pager.begin().unwrap();
    for i in [5i64, 1, 9, 3] {
        tree.insert(&mut pager, &Key::Row(i), &row_payload(i, "m")).unwrap();
    }
    pager.commit().unwrap();
    match tree.max_key(&mut pager).unwrap() {
        Some(Key::Row(id)) => assert_eq!(id, 9),
        other => panic!("unexpected max key {other:?}"),
    }
}

#[test]
fn index_tree_orders_by_value_then_row_id() {
    let dir = TempDir::new().unwrap();
    let mut pager = fresh_pager(&dir);
    pager.begin().unwrap();
    let root = Btree::create(&mut pager, TreeKind::Index).unwrap();
    pager.commit().unwrap();
    let mut tree = Btree::open(root, TreeKind::Index);

    let entries = [
        (Value::Integer(30), 1i64),
        (Value::Integer(25), 2),
        (Value::Integer(30), 3),
        (Value::Integer(40), 4),
    ];
    pager.begin().unwrap();
    for (value, row_id) in &entries {
        let tuple = vec![value.clone(), Value::Integer(*row_id)];
        let payload = encode_record(&tuple);
        tree.insert(&mut pager, &Key::Tuple(tuple), &payload).unwrap();
    }
    pager.commit().unwrap();

    let mut cursor = tree.cursor_first(&mut pager).unwrap();
    let mut seen = Vec::new();
    while let Some(entry) = tree.cursor_next(&mut pager, &mut cursor).unwrap() {
        let Key::Tuple(tuple) = entry.key else {
            panic!("index scan produced a row key")
        };
        seen.push((tuple[0].clone(), tuple[1].clone()));
    }
    assert_eq!(
        seen,
        vec![
            (Value::Integer(25), Value::Integer(2)),
            (Value::Integer(30), Value::Integer(1)),
            (Value::Integer(30), Value::Integer(3)),
            (Value::Integer(40), Value::Integer(4)),
        ]
    );
}

#[test]
fn reclaim_frees_a_whole_tree() {
    let dir = TempDir::new().unwrap();
    let mut pager = fresh_pager(&dir);
    let mut tree = new_table_tree(&mut pager);

    pager.begin().unwrap();
    for i in 1..=200 {
        tree.insert(&mut pager, &Key::Row(i), &row_payload(i, &"z".repeat(80)))
            .unwrap();
    }
    pager.commit().unwrap();

    pager.begin().unwrap();
    Btree::reclaim(&mut pager, tree.root).unwrap();
    pager.commit().unwrap();

    // Only page 1 remains out of the freelist.
    assert_eq!(pager.freelist_count() + 1, pager.page_count());
}
