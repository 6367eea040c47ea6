use gudang::types::record::{decode_column, decode_record, encode_record, record_column_count};
use gudang::types::value::{compare_values, Value};

fn sample_values() -> Vec<Value> {
    vec![
        Value::Null,
        Value::Integer(0),
        Value::Integer(1),
        Value::Integer(-1),
        Value::Integer(127),
        Value::Integer(-32768),
        Value::Integer(i64::MAX),
        Value::Integer(i64::MIN),
        Value::Real(3.5),
        Value::Real(-0.25),
        Value::Text(String::new()),
        Value::Text("hello".to_string()),
        Value::Blob(vec![0xde, 0xad, 0xbe, 0xef]),
    ]
}

#[test]
fn record_roundtrip() {
    let values = sample_values();
    let encoded = encode_record(&values);
    let decoded = decode_record(&encoded).unwrap();
    assert_eq!(decoded, values);
}

#[test]
fn record_roundtrip_empty() {
    let encoded = encode_record(&[]);
    assert_eq!(decode_record(&encoded).unwrap(), Vec::<Value>::new());
}

#[test]
fn record_roundtrip_large_text() {
    // Large enough that its serial type needs a multi-byte varint.
    let big = Value::Text("x".repeat(100_000));
    let values = vec![Value::Integer(7), big.clone(), Value::Null];
    let decoded = decode_record(&encode_record(&values)).unwrap();
    assert_eq!(decoded[1], big);
}

#[test]
fn column_skip_matches_full_decode() {
    let values = sample_values();
    let encoded = encode_record(&values);
    for (i, expected) in values.iter().enumerate() {
        assert_eq!(&decode_column(&encoded, i).unwrap(), expected);
    }
    assert!(decode_column(&encoded, values.len()).is_err());
    assert_eq!(record_column_count(&encoded).unwrap(), values.len());
}

#[test]
fn integers_use_smallest_width() {
    // One column each; the record is header-size varint + serial type +
    // body, so the body width shows in the total length.
    let len = |v: Value| encode_record(&[v]).len();
    assert_eq!(len(Value::Integer(0)), 2); // literal-zero tag, empty body
    assert_eq!(len(Value::Integer(1)), 2);
    assert_eq!(len(Value::Integer(2)), 3); // one-byte integer
    assert_eq!(len(Value::Integer(1000)), 4); // two-byte integer
    assert_eq!(len(Value::Integer(i64::MAX)), 10); // eight-byte integer
}

#[test]
fn truncated_record_is_an_error() {
    let encoded = encode_record(&[Value::Text("truncate me please".to_string())]);
    assert!(decode_record(&encoded[..encoded.len() - 4]).is_err());
    assert!(decode_record(&[0x7f]).is_err());
}

#[test]
fn value_ordering_classes() {
    use std::cmp::Ordering;
    let null = Value::Null;
    let int = Value::Integer(5);
    let real = Value::Real(5.5);
    let text = Value::Text("a".to_string());
    let blob = Value::Blob(vec![1]);

    assert_eq!(compare_values(&null, &int), Ordering::Less);
    assert_eq!(compare_values(&int, &real), Ordering::Less);
    assert_eq!(compare_values(&real, &text), Ordering::Less);
    assert_eq!(compare_values(&text, &blob), Ordering::Less);
    assert_eq!(
        compare_values(&Value::Integer(6), &Value::Real(5.5)),
        Ordering::Greater
    );
    assert_eq!(
        compare_values(&Value::Integer(5), &Value::Real(5.0)),
        Ordering::Equal
    );
}
