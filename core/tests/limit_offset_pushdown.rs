//! Regression coverage for the client-side limit/offset fallback in the
//! virtual-table cursor (spec §4.5): an adapter that can only push down
//! one of `LIMIT`/`OFFSET` must still produce the correct page, with the
//! other half of the slicing done by the bridge itself.

use std::collections::HashMap;
use std::sync::Arc;

use sqlport_core::adapter::{Adapter, AdapterFactory, OrderSpec};
use sqlport_core::config::ConnectOptions;
use sqlport_core::connection::Connection;
use sqlport_core::error::Result;
use sqlport_core::fields::{Field, FieldConfig, IntegerField, Order};
use sqlport_core::registry::AdapterRegistry;
use sqlport_core::row::{Bounds, Row};
use sqlport_core::value::{EngineValue, NativeValue};

const ROW_COUNT: i64 = 20;

/// Claims rows with a pushdown-capable `LIMIT` but no `OFFSET` support,
/// so the bridge has to drain leading rows itself while still trusting
/// the adapter to cut the tail.
struct LimitOnlyAdapter;

impl Adapter for LimitOnlyAdapter {
    fn get_columns(&self) -> Result<Vec<(String, Box<dyn Field>)>> {
        Ok(vec![(
            "id".to_string(),
            Box::new(IntegerField::new(
                FieldConfig::default().with_order(Order::Any),
            )),
        )])
    }

    fn get_data(
        &self,
        _bounds: &Bounds,
        _order: &[OrderSpec],
        limit: Option<u64>,
        _offset: Option<u64>,
        _requested_columns: Option<&[String]>,
    ) -> Result<Box<dyn Iterator<Item = Result<Row>>>> {
        // Already ascending by id; this fixture only ever sees `ORDER BY id`.
        let mut ids: Vec<i64> = (0..ROW_COUNT).collect();
        if let Some(lim) = limit {
            ids.truncate(lim as usize);
        }
        let rows = ids
            .into_iter()
            .map(|id| {
                let mut row: Row = [("id".to_string(), NativeValue::Integer(id))]
                    .into_iter()
                    .collect();
                row.rowid = Some(id);
                Ok(row)
            })
            .collect::<Vec<_>>();
        Ok(Box::new(rows.into_iter()))
    }

    fn supports_limit(&self) -> bool {
        true
    }

    fn supports_offset(&self) -> bool {
        false
    }
}

struct LimitOnlyAdapterFactory;

impl AdapterFactory for LimitOnlyAdapterFactory {
    fn name(&self) -> &'static str {
        "limitonly"
    }

    fn supports(&self, uri: &str, _fast: bool) -> Option<bool> {
        Some(uri.starts_with("limitonly://"))
    }

    fn construct(&self, _uri: &str, _kwargs: &HashMap<String, String>) -> Result<Box<dyn Adapter>> {
        Ok(Box::new(LimitOnlyAdapter))
    }
}

fn open() -> Connection {
    let mut registry = AdapterRegistry::new();
    registry.add(Arc::new(LimitOnlyAdapterFactory));
    Connection::open_with_registry(ConnectOptions::new(), &registry).unwrap()
}

#[test]
fn limit_with_unsupported_offset_still_starts_at_the_right_row() {
    let conn = open();
    let mut cursor = conn.cursor().unwrap();
    cursor
        .execute(
            "SELECT id FROM \"limitonly://\" ORDER BY id LIMIT 5 OFFSET 10",
            &[] as &[NativeValue],
        )
        .unwrap();

    let rows = cursor.fetchall().unwrap();
    assert_eq!(
        rows,
        vec![
            vec![EngineValue::Integer(10)],
            vec![EngineValue::Integer(11)],
            vec![EngineValue::Integer(12)],
            vec![EngineValue::Integer(13)],
            vec![EngineValue::Integer(14)],
        ]
    );
}

#[test]
fn limit_without_offset_is_pushed_down_unchanged() {
    let conn = open();
    let mut cursor = conn.cursor().unwrap();
    cursor
        .execute(
            "SELECT id FROM \"limitonly://\" ORDER BY id LIMIT 3",
            &[] as &[NativeValue],
        )
        .unwrap();

    let rows = cursor.fetchall().unwrap();
    assert_eq!(
        rows,
        vec![
            vec![EngineValue::Integer(0)],
            vec![EngineValue::Integer(1)],
            vec![EngineValue::Integer(2)],
        ]
    );
}
