//! End-to-end scenarios against the `dummy://` fixture adapter, covering
//! the universal invariants: projection, predicate pushdown, impossible
//! filters, parameter coercion, auto-materialization, and DROP TABLE.

use sqlport_core::config::ConnectOptions;
use sqlport_core::connection::Connection;
use sqlport_core::registry::AdapterRegistry;
use sqlport_core::value::{EngineValue, NativeValue};
use std::sync::Arc;

fn open() -> Connection {
    let mut registry = AdapterRegistry::new();
    registry.add(Arc::new(sqlport_dummy::DummyAdapterFactory));
    Connection::open_with_registry(ConnectOptions::new(), &registry).unwrap()
}

#[test]
fn simple_projection_returns_both_seed_rows_in_order() {
    let conn = open();
    let mut cursor = conn.cursor().unwrap();
    cursor
        .execute("SELECT * FROM \"dummy://\"", &[] as &[NativeValue])
        .unwrap();

    let rows = cursor.fetchall().unwrap();
    assert_eq!(
        rows,
        vec![
            vec![
                EngineValue::Text("Alice".into()),
                EngineValue::Double(20.0),
                EngineValue::Integer(0),
            ],
            vec![
                EngineValue::Text("Bob".into()),
                EngineValue::Double(23.0),
                EngineValue::Integer(3),
            ],
        ]
    );
    assert_eq!(cursor.rowcount().unwrap(), 2);
}

#[test]
fn pushed_range_filters_to_one_row() {
    let conn = open();
    let mut cursor = conn.cursor().unwrap();
    cursor
        .execute(
            "SELECT * FROM \"dummy://\" WHERE age > 21",
            &[] as &[NativeValue],
        )
        .unwrap();

    let rows = cursor.fetchall().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][0], EngineValue::Text("Bob".into()));
    assert_eq!(cursor.rowcount().unwrap(), 1);
}

#[test]
fn impossible_filter_returns_no_rows() {
    let conn = open();
    let mut cursor = conn.cursor().unwrap();
    cursor
        .execute(
            "SELECT * FROM \"dummy://\" WHERE age < 10 AND age > 100",
            &[] as &[NativeValue],
        )
        .unwrap();

    let rows = cursor.fetchall().unwrap();
    assert!(rows.is_empty());
    assert_eq!(cursor.rowcount().unwrap(), 0);
}

#[test]
fn parameters_are_coerced_and_bound_positionally() {
    let conn = open();
    let mut cursor = conn.cursor().unwrap();
    cursor
        .execute(
            "SELECT * FROM \"dummy://\" WHERE age > ?",
            &[NativeValue::Float(21.0)],
        )
        .unwrap();

    let rows = cursor.fetchall().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][0], EngineValue::Text("Bob".into()));
}

#[test]
fn datetime_parameter_is_coerced_to_an_iso_offset_string_before_binding() {
    use chrono::DateTime;

    let conn = open();
    let mut cursor = conn.cursor().unwrap();
    let created_after = NativeValue::datetime_aware(
        DateTime::parse_from_rfc3339("2024-01-01T00:00:00+00:00").unwrap(),
    );

    // `dummy://` has no datetime column; this only exercises that a
    // native `DateTime` parameter is coerced to its ISO-8601 text form
    // (spec §4.7/§7 scenario 4) rather than rejected at bind time.
    cursor
        .execute(
            "SELECT * FROM \"dummy://\" WHERE name > ?",
            &[created_after],
        )
        .unwrap();

    let rows = cursor.fetchall().unwrap();
    assert_eq!(rows.len(), 2);
}

#[test]
fn auto_materialization_happens_once_per_uri() {
    let conn = open();
    let mut cursor = conn.cursor().unwrap();

    // First reference: "no such table" triggers CREATE VIRTUAL TABLE.
    cursor
        .execute("SELECT 1 FROM \"dummy://\"", &[] as &[NativeValue])
        .unwrap();
    assert_eq!(cursor.fetchall().unwrap().len(), 2);

    // Mutate state behind the now-materialized virtual table.
    cursor
        .execute(
            "INSERT INTO \"dummy://\" (name, age, pets) VALUES ('Carol', 31.0, 1)",
            &[] as &[NativeValue],
        )
        .unwrap();

    // A second reference to the same URI must reuse the existing virtual
    // table rather than re-materializing it (which would reset the
    // adapter's state and lose the row just inserted).
    cursor
        .execute("SELECT * FROM \"dummy://\"", &[] as &[NativeValue])
        .unwrap();
    assert_eq!(cursor.fetchall().unwrap().len(), 3);
}

#[test]
fn drop_table_forwards_to_adapter_and_bypasses_the_engine() {
    let conn = open();
    let mut cursor = conn.cursor().unwrap();

    // Never materialized: if DROP TABLE were submitted to the engine
    // this would fail with "no such table".
    cursor
        .execute("DROP TABLE \"dummy://\"", &[] as &[NativeValue])
        .unwrap();
    assert_eq!(cursor.rowcount().unwrap(), 0);

    // The engine still has no record of the table, so the usual
    // auto-materialization path fires on the next reference.
    cursor
        .execute("SELECT * FROM \"dummy://\"", &[] as &[NativeValue])
        .unwrap();
    assert_eq!(cursor.fetchall().unwrap().len(), 2);
}
