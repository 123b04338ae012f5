use std::path::PathBuf;

use readyscore_core::{ColumnType, CsvOptions, Dataset, Table, Value};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

#[test]
fn customers_fixture_loads_with_inferred_types() {
    let table = Table::from_csv_path(&fixture("customers.csv"), &CsvOptions::default())
        .expect("load customers.csv");

    assert_eq!(table.name(), "customers");
    assert_eq!(table.row_count(), 10);
    assert_eq!(table.column_count(), 7);
    assert_eq!(table.column_type("customer_id"), Some(ColumnType::Integer));
    assert_eq!(table.column_type("balance"), Some(ColumnType::Float));
    assert_eq!(table.column_type("signup_date"), Some(ColumnType::Date));
    assert_eq!(table.column_type("last_updated"), Some(ColumnType::Timestamp));
    assert_eq!(table.missing_count("email"), Some(1));
    assert_eq!(table.missing_count("age"), Some(1));

    let stats = table.numeric_stats("age").expect("age stats");
    assert_eq!(stats.count, 9);
    assert_eq!(stats.max, 230.0);
}

#[test]
fn missing_file_is_an_io_error() {
    let result = Table::from_csv_path(&fixture("absent.csv"), &CsvOptions::default());
    assert!(matches!(result, Err(readyscore_core::CoreError::Io(_))));
}

#[test]
fn explicit_not_applicable_marker_is_kept_apart_from_nulls() {
    let data = "a,b\n1,-\n2,\n";
    let options = CsvOptions {
        not_applicable_markers: vec!["-".to_string()],
        ..CsvOptions::default()
    };
    let table = Table::from_csv_reader("marks", data.as_bytes(), &options).expect("load");
    let values = table.values("b").expect("column b");
    assert_eq!(values, &[Value::NotApplicable, Value::Null]);
    assert_eq!(table.missing_count("b"), Some(1));
}

#[test]
fn semicolon_file_loads_with_custom_delimiter() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("orders.csv");
    std::fs::write(&path, "id;total;shipped\n1;10.5;true\n2;NA;false\n").expect("write");

    let options = CsvOptions {
        delimiter: b';',
        ..CsvOptions::default()
    };
    let table = Table::from_csv_path(&path, &options).expect("load");
    assert_eq!(table.name(), "orders");
    assert_eq!(table.source_type(), "csv");
    assert_eq!(table.column_names(), vec!["id", "total", "shipped"]);
    assert_eq!(table.missing_count("total"), Some(1));
    assert_eq!(table.column_type("shipped"), Some(ColumnType::Boolean));
}
