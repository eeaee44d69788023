//! The adapter contract (spec §4.3): the seam every external data source
//! implements to be exposed as a SQL table.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::fields::Field;
use crate::row::{Bounds, Row};

/// Sort order requested by the engine for one column of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestedOrder {
    Ascending,
    Descending,
}

/// One column's contribution to an `ORDER BY` clause the engine would
/// like the adapter to satisfy itself.
#[derive(Debug, Clone)]
pub struct OrderSpec {
    pub column: String,
    pub direction: RequestedOrder,
}

/// Split out of [`Adapter`] so a registry can decide whether a URI is
/// handled by an adapter, and build one, without already holding an
/// instance (spec §4.4).
pub trait AdapterFactory: Send + Sync {
    /// A short, URI-scheme-like name such as `"csv"` or `"dummy"`.
    fn name(&self) -> &'static str;

    /// Whether this adapter claims the given URI. Adapters that can't
    /// tell without trying a connection return `None`; the registry
    /// probes those last and only if no other adapter claimed the URI.
    fn supports(&self, uri: &str, fast: bool) -> Option<bool>;

    /// Build an adapter instance bound to `uri`, with any extra
    /// `CREATE VIRTUAL TABLE ... USING table(uri, key=value, ...)`
    /// arguments in `kwargs`.
    fn construct(&self, uri: &str, kwargs: &HashMap<String, String>) -> Result<Box<dyn Adapter>>;

    /// Whether this adapter is safe to autoload without explicit
    /// opt-in (spec §4.4 "safe mode").
    fn is_safe(&self) -> bool {
        false
    }
}

/// An instance of an adapter bound to one URI/table. The virtual-table
/// bridge drives all scanning, insertion and mutation through this
/// trait; everything else (SQL parsing, predicate algebra, cursoring)
/// lives in the bridge.
pub trait Adapter: Send {
    /// Column name -> field codec/capability, in declaration order.
    fn get_columns(&self) -> Result<Vec<(String, Box<dyn Field>)>>;

    /// Estimated row count and cost, used for `BestIndex` cost reporting.
    /// Adapters that can't estimate return `(None, 0.0)`.
    fn get_cost(&self, _bounds: &Bounds, _order: &[OrderSpec]) -> (Option<u64>, f64) {
        (None, 0.0)
    }

    /// Produce rows matching `bounds`, in `order` if this adapter
    /// declared it can sort the requested columns, optionally sliced by
    /// `limit`/`offset` if it declared `supports_limit`/`supports_offset`,
    /// and restricted to `requested_columns` if it declared
    /// `supports_requested_columns` (otherwise every column is still
    /// expected in the returned rows; the bridge simply won't ask the
    /// engine to use unrequested ones).
    ///
    /// The returned iterator owns everything it needs (a buffered `Vec`,
    /// an owned paginator, ...) rather than borrowing from `self`, so the
    /// virtual-table cursor can hold it independently of the adapter.
    fn get_data(
        &self,
        bounds: &Bounds,
        order: &[OrderSpec],
        limit: Option<u64>,
        offset: Option<u64>,
        requested_columns: Option<&[String]>,
    ) -> Result<Box<dyn Iterator<Item = Result<Row>>>>;

    fn supports_limit(&self) -> bool {
        false
    }

    fn supports_offset(&self) -> bool {
        false
    }

    /// Whether `get_data` honors a `requested_columns` projection; unused
    /// columns are still present in returned rows if this is `false`.
    fn supports_requested_columns(&self) -> bool {
        false
    }

    fn insert_row(&mut self, _row: &Row) -> Result<i64> {
        Err(Error::not_supported(
            "Adapter does not support INSERT statements",
        ))
    }

    fn update_row(&mut self, _rowid: i64, _row: &Row) -> Result<()> {
        Err(Error::not_supported(
            "Adapter does not support UPDATE statements",
        ))
    }

    fn delete_row(&mut self, _rowid: i64) -> Result<()> {
        Err(Error::not_supported(
            "Adapter does not support DELETE statements",
        ))
    }

    /// Called when a `DROP TABLE <uri>` naming this adapter is executed.
    /// The cursor layer recognizes and dispatches this itself (spec §4.5),
    /// so implementors can assume the embedded engine never sees the
    /// statement and this is the only cleanup signal they'll get.
    fn drop_table(&mut self) -> Result<()> {
        Err(Error::not_supported(
            "Adapter does not support DROP TABLE",
        ))
    }

    /// Whether this adapter probes its backend for schema (e.g. a `LIMIT
    /// 1` request) as soon as it's constructed, rather than waiting for
    /// the first `get_columns()` call (spec §9 "Open question" —
    /// per-adapter, not a crate-wide policy). The virtual-table bridge
    /// always calls `get_columns()` once, synchronously, at `xConnect`
    /// time regardless of this flag; it exists for adapters whose own
    /// constructor wants to know whether to do that probing work now or
    /// defer it.
    fn eager_schema(&self) -> bool {
        false
    }
}
