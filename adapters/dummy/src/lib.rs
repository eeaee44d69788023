//! A dummy in-memory adapter (spec §8 test fixtures): two seed rows,
//! `name`/`age` pushdown-capable, `pets` sortable but not filterable.
//! Used by `sqlport_core`'s own integration tests and as a reference
//! for anyone writing a new adapter.

use std::collections::HashMap;
use std::sync::Mutex;

use sqlport_core::adapter::{Adapter, AdapterFactory, OrderSpec, RequestedOrder};
use sqlport_core::error::{Error, Result};
use sqlport_core::fields::{Field, FieldConfig, FloatField, IntegerField, Order, StringField};
use sqlport_core::row::{Bounds, Row};
use sqlport_core::value::NativeValue;

fn seed_rows() -> Vec<Row> {
    vec![
        row(0, "Alice", 20.0, 0),
        row(1, "Bob", 23.0, 3),
    ]
}

fn row(rowid: i64, name: &str, age: f64, pets: i64) -> Row {
    let mut row: Row = [
        ("name".to_string(), NativeValue::String(name.to_string())),
        ("age".to_string(), NativeValue::Float(age)),
        ("pets".to_string(), NativeValue::Integer(pets)),
    ]
    .into_iter()
    .collect();
    row.rowid = Some(rowid);
    row
}

fn columns() -> Vec<(String, Box<dyn Field>)> {
    vec![
        (
            "name".to_string(),
            Box::new(StringField::new(
                FieldConfig::default()
                    .with_filters(vec!["Equal"])
                    .with_order(Order::Any)
                    .with_exact(true),
            )),
        ),
        (
            "age".to_string(),
            Box::new(FloatField::new(
                FieldConfig::default()
                    .with_filters(vec!["Range"])
                    .with_order(Order::Any)
                    .with_exact(true),
            )),
        ),
        (
            "pets".to_string(),
            Box::new(IntegerField::new(
                FieldConfig::default().with_order(Order::Any),
            )),
        ),
    ]
}

/// Claims the `dummy://` scheme. Registered under the name `"dummy"`
/// (the SQLite module name used in generated `CREATE VIRTUAL TABLE`
/// statements).
pub struct DummyAdapterFactory;

impl AdapterFactory for DummyAdapterFactory {
    fn name(&self) -> &'static str {
        "dummy"
    }

    fn supports(&self, uri: &str, _fast: bool) -> Option<bool> {
        Some(uri.starts_with("dummy://"))
    }

    fn construct(&self, _uri: &str, _kwargs: &HashMap<String, String>) -> Result<Box<dyn Adapter>> {
        Ok(Box::new(DummyAdapter {
            rows: Mutex::new(seed_rows()),
        }))
    }

    fn is_safe(&self) -> bool {
        false
    }
}

pub struct DummyAdapter {
    rows: Mutex<Vec<Row>>,
}

impl Adapter for DummyAdapter {
    fn get_columns(&self) -> Result<Vec<(String, Box<dyn Field>)>> {
        Ok(columns())
    }

    fn get_cost(&self, _bounds: &Bounds, _order: &[OrderSpec]) -> (Option<u64>, f64) {
        let rows = self.rows.lock().expect("dummy adapter mutex poisoned");
        (Some(rows.len() as u64), rows.len() as f64)
    }

    fn get_data(
        &self,
        bounds: &Bounds,
        order: &[OrderSpec],
        _limit: Option<u64>,
        _offset: Option<u64>,
        _requested_columns: Option<&[String]>,
    ) -> Result<Box<dyn Iterator<Item = Result<Row>>>> {
        let rows = self.rows.lock().expect("dummy adapter mutex poisoned");

        let mut matched: Vec<Row> = rows
            .iter()
            .filter(|row| {
                bounds.iter().all(|(column, filter)| {
                    let value = row.get(column).unwrap_or(&NativeValue::Null);
                    filter.check(value)
                })
            })
            .cloned()
            .collect();

        for spec in order.iter().rev() {
            matched.sort_by(|a, b| {
                let a_value = a.get(&spec.column).unwrap_or(&NativeValue::Null);
                let b_value = b.get(&spec.column).unwrap_or(&NativeValue::Null);
                let ordering = a_value.cmp(b_value);
                match spec.direction {
                    RequestedOrder::Ascending => ordering,
                    RequestedOrder::Descending => ordering.reverse(),
                }
            });
        }

        Ok(Box::new(matched.into_iter().map(Ok)))
    }

    fn supports_limit(&self) -> bool {
        false
    }

    fn supports_offset(&self) -> bool {
        false
    }

    fn insert_row(&mut self, row: &Row) -> Result<i64> {
        let mut rows = self.rows.lock().expect("dummy adapter mutex poisoned");
        let rowid = row.rowid.unwrap_or_else(|| {
            rows.iter().filter_map(|r| r.rowid).max().unwrap_or(0) + 1
        });
        let mut inserted = row.clone();
        inserted.rowid = Some(rowid);
        rows.push(inserted);
        Ok(rowid)
    }

    fn delete_row(&mut self, rowid: i64) -> Result<()> {
        let mut rows = self.rows.lock().expect("dummy adapter mutex poisoned");
        let before = rows.len();
        rows.retain(|row| row.rowid != Some(rowid));
        if rows.len() == before {
            return Err(Error::integrity(format!("no row with rowid {rowid}")));
        }
        Ok(())
    }

    fn drop_table(&mut self) -> Result<()> {
        self.rows.lock().expect("dummy adapter mutex poisoned").clear();
        Ok(())
    }

    fn eager_schema(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlport_core::filters::Filter;

    #[test]
    fn supports_matches_scheme_only() {
        let factory = DummyAdapterFactory;
        assert_eq!(factory.supports("dummy://", true), Some(true));
        assert_eq!(factory.supports("csv:///tmp/foo.csv", true), Some(false));
    }

    #[test]
    fn get_data_returns_seed_rows_unfiltered() {
        let adapter = DummyAdapterFactory.construct("dummy://", &HashMap::new()).unwrap();
        let rows: Vec<Row> = adapter
            .get_data(&Bounds::new(), &[], None, None, None)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn get_data_applies_equal_filter_on_name() {
        let adapter = DummyAdapterFactory.construct("dummy://", &HashMap::new()).unwrap();
        let mut bounds = Bounds::new();
        bounds.insert(
            "name".to_string(),
            Filter::Equal(NativeValue::String("Bob".to_string())),
        );
        let rows: Vec<Row> = adapter
            .get_data(&bounds, &[], None, None, None)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("name"), Some(&NativeValue::String("Bob".to_string())));
    }

    #[test]
    fn insert_then_delete_round_trips() {
        let mut adapter = DummyAdapterFactory.construct("dummy://", &HashMap::new()).unwrap();
        let new_row = row(-1, "Carol", 31.0, 1);
        let rowid = adapter.insert_row(&new_row).unwrap();
        assert_eq!(rowid, 2);

        adapter.delete_row(rowid).unwrap();
        let rows: Vec<Row> = adapter
            .get_data(&Bounds::new(), &[], None, None, None)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(rows.len(), 2);
    }
}
