use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use gudang::utils::mock::TempDatabase;
use gudang::{ColumnSchema, DataType, Database, Predicate, Value};

const DATASET_SIZES: &[usize] = &[1_000, 5_000, 10_000];

fn setup_table(db: &mut Database, row_count: usize) {
    db.create_table(
        "bench",
        vec![
            ColumnSchema::new("id", DataType::Integer, 0).primary_key(),
            ColumnSchema::new("name", DataType::Text, 1),
            ColumnSchema::new("score", DataType::Integer, 2),
        ],
    )
    .unwrap();
    for i in 1..=row_count {
        db.set(
            "bench",
            &["id", "name", "score"],
            vec![
                Value::Integer(i as i64),
                Value::Text(format!("row-{i}")),
                Value::Integer((i % 1000) as i64),
            ],
        )
        .unwrap();
    }
}

fn benchmark_full_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("table_scan");
    for &size in DATASET_SIZES {
        let mut tmp = TempDatabase::with_prefix("bench_scan");
        let db = tmp.create();
        setup_table(db, size);

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let rows = black_box(db.get("bench", &["name"], &[]).unwrap());
                assert_eq!(rows.len(), size);
            });
        });
    }
    group.finish();
}

fn benchmark_indexed_point_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("indexed_lookup");
    for &size in DATASET_SIZES {
        let mut tmp = TempDatabase::with_prefix("bench_lookup");
        let db = tmp.create();
        setup_table(db, size);
        db.create_index("bench_score", "bench", "score").unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let rows = black_box(
                    db.get(
                        "bench",
                        &["id"],
                        &[Predicate::eq("score", Value::Integer(500))],
                    )
                    .unwrap(),
                );
                assert!(!rows.is_empty());
            });
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_full_scan, benchmark_indexed_point_lookup);
criterion_main!(benches);
