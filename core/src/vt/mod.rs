//! The bridge between this crate and SQLite's virtual-table callbacks
//! (spec §4.5). `AdapterVTab` is generic only in spirit: a single
//! concrete type is registered per adapter factory, with the factory
//! itself carried as the module's `Aux` data, so one `CREATE VIRTUAL
//! TABLE ... USING <name>(uri, key=value, ...)` statement can construct
//! any adapter that factory builds.

pub mod best_index;

use std::collections::HashMap;
use std::os::raw::c_int;
use std::sync::{Arc, Mutex};

use rusqlite::ffi;
use rusqlite::vtab::{
    Context, CreateVTab, IndexConstraintOp, IndexInfo, UpdateVTab, VTab, VTabConnection,
    VTabCursor, VTabKind, Values,
};
use rusqlite::Connection as SqliteConnection;

use crate::adapter::{Adapter, AdapterFactory};
use crate::error::Error;
use crate::fields::Field;
use crate::filters::Filter;
use crate::row::{Bounds, Row};
use crate::value::EngineValue;

use self::best_index::{decode_plan, estimate_cost, plan_index, ConstraintOp, RawConstraint, RawOrderBy};

/// Registered once per adapter factory as the module's auxiliary data.
pub struct ModuleAux {
    pub factory: Arc<dyn AdapterFactory>,
}

fn sqlite_error(message: impl Into<String>) -> rusqlite::Error {
    rusqlite::Error::ModuleError(message.into())
}

fn to_sqlite_error(err: Error) -> rusqlite::Error {
    sqlite_error(err.to_string())
}

/// Serialize one virtual-table constructor argument as a base64 blob of
/// its MessagePack encoding (spec §6 "Serialization of virtual-table
/// arguments": "each independently serialized to a base64 of a compact
/// binary form"), single-quoted so it drops straight into the `USING
/// module(...)` argument list SQLite's DDL parser expects.
pub fn encode_arg<T: serde::Serialize>(value: &T) -> crate::error::Result<String> {
    let bytes = rmp_serde::to_vec(value)?;
    let b64 = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, bytes);
    Ok(format!("'{b64}'"))
}

fn decode_arg<T: serde::de::DeserializeOwned>(token: &str) -> crate::error::Result<T> {
    let trimmed = token.trim().trim_matches(|c| c == '\'' || c == '"');
    let bytes = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, trimmed)
        .map_err(|e| Error::internal(format!("malformed virtual-table argument: {e}")))?;
    Ok(rmp_serde::from_slice(&bytes)?)
}

/// Split the `CREATE VIRTUAL TABLE ... USING name('<b64 uri>', '<b64
/// (key, value)>', ...)` argument tokens back into the adapter URI and
/// its extra keyword arguments. Every token is independently
/// base64(msgpack(...))-encoded by [`encode_arg`]; the first decodes to
/// a bare `String` (the URI), the rest to `(String, String)` pairs.
fn parse_module_args(args: &[&[u8]]) -> rusqlite::Result<(String, HashMap<String, String>)> {
    // args[0]/args[1] are the module and table name per the vtab ABI;
    // real arguments start at args[2].
    let tokens: Vec<String> = args
        .iter()
        .skip(3)
        .map(|a| String::from_utf8_lossy(a).trim().to_string())
        .collect();

    let uri_token = tokens
        .first()
        .ok_or_else(|| sqlite_error("CREATE VIRTUAL TABLE requires a URI argument"))?;
    let uri: String = decode_arg(uri_token).map_err(to_sqlite_error)?;

    let mut kwargs = HashMap::new();
    for token in tokens.iter().skip(1) {
        let (key, value): (String, String) = decode_arg(token).map_err(to_sqlite_error)?;
        kwargs.insert(key, value);
    }

    Ok((uri, kwargs))
}

fn create_table_sql(columns: &[(String, Box<dyn Field>)]) -> String {
    let cols: Vec<String> = columns
        .iter()
        .map(|(name, field)| format!("\"{name}\" {}", field.field_type()))
        .collect();
    format!("CREATE TABLE x({})", cols.join(", "))
}

fn engine_value_from_argv(value: rusqlite::types::ValueRef<'_>) -> EngineValue {
    let owned: rusqlite::types::Value = value.into();
    owned.into()
}

#[repr(C)]
pub struct AdapterVTab {
    base: ffi::sqlite3_vtab,
    adapter: Mutex<Box<dyn Adapter>>,
    columns: Vec<(String, Box<dyn Field>)>,
}

unsafe impl<'vtab> VTab<'vtab> for AdapterVTab {
    type Aux = ModuleAux;
    type Cursor = AdapterVTabCursor<'vtab>;

    fn connect(
        _db: &mut VTabConnection,
        aux: Option<&Self::Aux>,
        args: &[&[u8]],
    ) -> rusqlite::Result<(String, Self)> {
        let aux = aux.ok_or_else(|| sqlite_error("adapter module registered without aux data"))?;
        let (uri, kwargs) = parse_module_args(args)?;
        let adapter = aux.factory.construct(&uri, &kwargs).map_err(to_sqlite_error)?;
        let columns = adapter.get_columns().map_err(to_sqlite_error)?;
        let sql = create_table_sql(&columns);

        Ok((
            sql,
            AdapterVTab {
                base: unsafe { std::mem::zeroed() },
                adapter: Mutex::new(adapter),
                columns,
            },
        ))
    }

    fn best_index(&self, info: &mut IndexInfo) -> rusqlite::Result<()> {
        let mut raw_constraints = Vec::new();
        for constraint in info.constraints() {
            let op = match constraint.operator() {
                IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_EQ => ConstraintOp::Eq,
                IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_NE => ConstraintOp::NotEq,
                IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_GT => ConstraintOp::Gt,
                IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_GE => ConstraintOp::Ge,
                IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_LT => ConstraintOp::Lt,
                IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_LE => ConstraintOp::Le,
                IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_LIKE => ConstraintOp::Like,
                IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_ISNULL => ConstraintOp::IsNull,
                IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_ISNOTNULL => ConstraintOp::IsNotNull,
                IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_LIMIT => ConstraintOp::Limit,
                IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_OFFSET => ConstraintOp::Offset,
                _ => ConstraintOp::Unsupported,
            };
            raw_constraints.push(RawConstraint {
                column: constraint.column(),
                op,
                usable: constraint.usable(),
            });
        }

        let order_by: Vec<RawOrderBy> = info
            .order_bys()
            .map(|ob| RawOrderBy {
                column: ob.column(),
                desc: ob.is_order_desc(),
            })
            .collect();

        let plan = plan_index(&self.columns, &raw_constraints, &order_by).map_err(to_sqlite_error)?;

        // Cost reflects what this plan actually accepted, not an empty
        // placeholder: real predicate values aren't known until `xFilter`,
        // but the pushed-down columns and order are, so those are what get
        // passed to `get_cost`.
        let cost_bounds: Bounds = plan
            .accepted_columns
            .iter()
            .map(|name| (name.clone(), Filter::IsNotNull))
            .collect();
        let estimated_rows = {
            let adapter = self
                .adapter
                .lock()
                .map_err(|_| sqlite_error("adapter mutex poisoned"))?;
            adapter.get_cost(&cost_bounds, &plan.accepted_order).0
        };
        let estimated_cost = estimate_cost(estimated_rows);

        for (i, usage) in plan.argv_usage.iter().enumerate() {
            if let Some(argv_index) = usage.argv_index {
                let mut constraint_usage = info.constraint_usage(i);
                constraint_usage.set_argv_index(argv_index);
                constraint_usage.set_omit(usage.omit);
            }
        }
        info.set_idx_str(&plan.idx_str);
        info.set_estimated_cost(estimated_cost);
        if let Some(rows) = estimated_rows {
            info.set_estimated_rows(rows as i64);
        }
        info.set_order_by_consumed(plan.order_by_consumed);

        Ok(())
    }

    fn open(&'vtab mut self) -> rusqlite::Result<Self::Cursor> {
        Ok(AdapterVTabCursor {
            vtab: self,
            rows: Vec::new(),
            position: 0,
        })
    }
}

impl CreateVTab<'_> for AdapterVTab {
    const KIND: VTabKind = VTabKind::Default;

    fn destroy(&self) -> rusqlite::Result<()> {
        let mut adapter = self
            .adapter
            .lock()
            .map_err(|_| sqlite_error("adapter mutex poisoned"))?;
        adapter.drop_table().map_err(to_sqlite_error)
    }
}

impl UpdateVTab<'_> for AdapterVTab {
    fn delete(&mut self, rowid: rusqlite::types::ValueRef<'_>) -> rusqlite::Result<()> {
        let rowid = rowid.as_i64()?;
        log::debug!("DELETE rowid {rowid}");
        let mut adapter = self
            .adapter
            .lock()
            .map_err(|_| sqlite_error("adapter mutex poisoned"))?;
        adapter.delete_row(rowid).map_err(to_sqlite_error)
    }

    fn insert(&mut self, args: &Values<'_>) -> rusqlite::Result<i64> {
        log::debug!("INSERT row");
        let row = self.row_from_values(args, 2)?;
        let mut adapter = self
            .adapter
            .lock()
            .map_err(|_| sqlite_error("adapter mutex poisoned"))?;
        adapter.insert_row(&row).map_err(to_sqlite_error)
    }

    fn update(&mut self, args: &Values<'_>) -> rusqlite::Result<()> {
        let rowid = args.get::<i64>(1)?;
        log::debug!("UPDATE rowid {rowid}");
        let row = self.row_from_values(args, 2)?;
        let mut adapter = self
            .adapter
            .lock()
            .map_err(|_| sqlite_error("adapter mutex poisoned"))?;
        adapter.update_row(rowid, &row).map_err(to_sqlite_error)
    }
}

impl AdapterVTab {
    fn row_from_values(&self, args: &Values<'_>, start: usize) -> rusqlite::Result<Row> {
        let mut row = Row::new();
        for (i, (name, field)) in self.columns.iter().enumerate() {
            let raw = args.get::<rusqlite::types::Value>(start + i)?;
            let engine_value: EngineValue = raw.into();
            let native = field.parse(&engine_value).map_err(to_sqlite_error)?;
            row.insert(name.clone(), native);
        }
        Ok(row)
    }
}

pub struct AdapterVTabCursor<'vtab> {
    vtab: &'vtab AdapterVTab,
    rows: Vec<Row>,
    position: usize,
}

unsafe impl VTabCursor for AdapterVTabCursor<'_> {
    fn filter(
        &mut self,
        _idx_num: c_int,
        idx_str: Option<&str>,
        args: &Values<'_>,
    ) -> rusqlite::Result<()> {
        let idx_str = idx_str.unwrap_or_default();
        let argv: Vec<EngineValue> = args
            .iter()
            .map(|v| engine_value_from_argv(v))
            .collect::<Vec<_>>();

        let (bounds, order, limit, offset) = decode_plan(idx_str, &self.vtab.columns, &argv)
            .map_err(to_sqlite_error)?;

        let adapter = self
            .vtab
            .adapter
            .lock()
            .map_err(|_| sqlite_error("adapter mutex poisoned"))?;

        // Offset can always be pushed down if the adapter supports it.
        // Limit can only be pushed down if doing so won't conflict with
        // an offset the adapter *doesn't* support: if the client has to
        // drain rows off the front afterward, an adapter-applied limit
        // would have already cut the tail those rows needed to leave
        // behind.
        let push_offset = adapter.supports_offset();
        let push_limit = adapter.supports_limit() && (offset.is_none() || push_offset);

        let effective_limit = if push_limit { limit } else { None };
        let effective_offset = if push_offset { offset } else { None };

        let iter = adapter
            .get_data(&bounds, &order, effective_limit, effective_offset, None)
            .map_err(to_sqlite_error)?;
        let mut rows: Vec<Row> = iter.collect::<Result<Vec<_>, _>>().map_err(to_sqlite_error)?;

        if let (Some(off), false) = (offset, push_offset) {
            rows.drain(0..off.min(rows.len() as u64) as usize);
        }
        if let (Some(lim), false) = (limit, push_limit) {
            rows.truncate(lim as usize);
        }

        self.rows = rows;
        self.position = 0;
        Ok(())
    }

    fn next(&mut self) -> rusqlite::Result<()> {
        self.position += 1;
        Ok(())
    }

    fn eof(&self) -> bool {
        self.position >= self.rows.len()
    }

    fn column(&self, ctx: &mut Context, i: c_int) -> rusqlite::Result<()> {
        let row = &self.rows[self.position];
        let (name, field) = &self.vtab.columns[i as usize];
        let native = row.get(name).cloned().unwrap_or(crate::value::NativeValue::Null);
        let engine_value = field.format(&native).map_err(to_sqlite_error)?;
        match engine_value {
            EngineValue::Null => ctx.set_result(&rusqlite::types::Null),
            EngineValue::Integer(v) => ctx.set_result(&v),
            EngineValue::Double(v) => ctx.set_result(&v),
            EngineValue::Text(v) => ctx.set_result(&v),
            EngineValue::Blob(v) => ctx.set_result(&v),
        }
    }

    fn rowid(&self) -> rusqlite::Result<i64> {
        Ok(self.rows[self.position]
            .rowid
            .unwrap_or(self.position as i64))
    }
}

/// Register an adapter factory as a module named `name` on `conn`, so
/// `CREATE VIRTUAL TABLE t USING name(uri, ...)` can instantiate it.
pub fn register_module(
    conn: &SqliteConnection,
    name: &str,
    factory: Arc<dyn AdapterFactory>,
) -> rusqlite::Result<()> {
    let module = rusqlite::vtab::update_module::<AdapterVTab>();
    conn.create_module(name, module, Some(ModuleAux { factory }))
}
