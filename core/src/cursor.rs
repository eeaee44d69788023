//! Cursor layer (spec §4.6/§6): a DB-API-2.0-shaped cursor over the
//! embedded engine, with auto-materialization of virtual tables the
//! first time a query references one that doesn't exist yet.

use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::rc::{Rc, Weak};

use crate::connection::ConnectionInner;
use crate::error::{Error, Result};
use crate::registry::find_in;
use crate::value::{EngineValue, NativeValue};
use crate::vt;

/// One column of a [`Cursor::description`] result: the DB-API 2.0
/// seven-tuple (name, type_code, display_size, internal_size, precision,
/// scale, null_ok). Only `name` and `type_name` carry real values here;
/// the sizing/precision fields have no equivalent in the embedded engine
/// and stay `None`, and `null_ok` defaults `true` since SQLite doesn't
/// surface per-column nullability through `column_decltype`, the way the
/// teacher's own `driver_manager` leaves unsupported `ArrowSchema`
/// metadata fields as `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescription {
    pub name: String,
    pub type_name: Option<String>,
    pub display_size: Option<i64>,
    pub internal_size: Option<i64>,
    pub precision: Option<i64>,
    pub scale: Option<i64>,
    pub null_ok: bool,
}

pub type Description = Option<Vec<ColumnDescription>>;
pub type ResultRow = Vec<EngineValue>;

const NO_SUCH_TABLE_PREFIX: &str = "no such table: ";

pub(crate) struct CursorInner {
    /// Weak back-reference: the connection is the one holding a strong
    /// `Rc` to this cursor's state (spec §9 design note), so this edge
    /// has to be the weak one to avoid a cycle.
    connection: Weak<RefCell<ConnectionInner>>,
    pub(crate) id: u64,
    pub(crate) in_transaction: bool,
    isolation_level: Option<String>,
    pub(crate) closed: bool,
    description: Description,
    results: Option<VecDeque<ResultRow>>,
    rowcount: i64,
    arraysize: usize,
}

impl CursorInner {
    pub(crate) fn new(connection: Weak<RefCell<ConnectionInner>>, isolation_level: Option<String>) -> Self {
        Self {
            connection,
            id: 0,
            in_transaction: false,
            isolation_level,
            closed: false,
            description: None,
            results: None,
            rowcount: -1,
            arraysize: 1,
        }
    }

    fn connection(&self) -> Result<Rc<RefCell<ConnectionInner>>> {
        self.connection
            .upgrade()
            .ok_or_else(|| Error::interface("underlying connection has been closed"))
    }
}

/// A cursor obtained from [`crate::connection::Connection::cursor`].
/// Cloning a `Cursor` shares the same underlying state (same cursor,
/// same position), matching the teacher's `ManagedStatement` sharing a
/// single prepared statement handle across clones.
#[derive(Clone)]
pub struct Cursor {
    inner: Rc<RefCell<CursorInner>>,
}

impl Cursor {
    pub(crate) fn from_inner(inner: Rc<RefCell<CursorInner>>) -> Self {
        Self { inner }
    }

    fn check_closed(&self) -> Result<()> {
        if self.inner.borrow().closed {
            return Err(Error::interface("Cursor already closed"));
        }
        Ok(())
    }

    fn check_executed(&self) -> Result<()> {
        if self.inner.borrow().results.is_none() {
            return Err(Error::interface("Called before `execute`"));
        }
        Ok(())
    }

    pub fn arraysize(&self) -> usize {
        self.inner.borrow().arraysize
    }

    pub fn set_arraysize(&self, size: usize) {
        self.inner.borrow_mut().arraysize = size;
    }

    pub fn is_closed(&self) -> bool {
        self.inner.borrow().closed
    }

    pub fn description(&self) -> Description {
        self.inner.borrow().description.clone()
    }

    /// Rows already fetched count towards `rowcount`; the rest of the
    /// result set is consumed to find the total, same as the teacher's
    /// Python ancestor, whose `rowcount` property drains `_results` into
    /// a list to measure it and puts the iterator back.
    pub fn rowcount(&self) -> Result<i64> {
        self.check_closed()?;
        let mut inner = self.inner.borrow_mut();
        let Some(results) = inner.results.take() else {
            return Ok(-1);
        };
        let remaining = results.len() as i64;
        inner.results = Some(results);
        Ok(inner.rowcount.max(0) + remaining)
    }

    pub fn close(&self) {
        self.inner.borrow_mut().closed = true;
    }

    /// Execute one statement, materializing any referenced virtual
    /// table on first use (spec §4.5/§4.6 "auto-materialization").
    ///
    /// `DROP TABLE <uri>` is recognized ahead of the engine (spec §4.5/§6)
    /// and dispatched straight to the adapter's `drop_table`; the engine
    /// never sees the statement, so its own drop never runs.
    ///
    /// `parameters` are native-typed values; each is coerced into the
    /// engine's narrow value set before binding (spec §4.7/§7 scenario 4:
    /// "native-typed parameters are coerced by the value bridge before
    /// binding").
    pub fn execute(&mut self, operation: &str, parameters: &[NativeValue]) -> Result<&mut Self> {
        self.check_closed()?;

        let parameters: Vec<EngineValue> = parameters.iter().map(NativeValue::to_engine_value).collect();
        let connection = self.inner.borrow().connection()?;

        if let Some(uri) = parse_drop_table_uri(operation) {
            drop_table(&connection, &uri)?;
            let mut inner = self.inner.borrow_mut();
            inner.description = None;
            inner.rowcount = 0;
            inner.results = Some(VecDeque::new());
            return Ok(self);
        }
        {
            let isolation_level = self.inner.borrow().isolation_level.clone();
            let mut inner = self.inner.borrow_mut();
            if !inner.in_transaction {
                if let Some(level) = isolation_level {
                    connection
                        .borrow()
                        .conn
                        .execute_batch(&format!("BEGIN {level}"))?;
                    inner.in_transaction = true;
                }
            }
            inner.description = None;
            inner.rowcount = -1;
            inner.results = None;
        }

        let mut attempted = HashSet::new();
        loop {
            match run_once(&connection, operation, &parameters) {
                Ok((description, rows)) => {
                    let mut inner = self.inner.borrow_mut();
                    inner.description = description;
                    inner.results = Some(rows.into());
                    break;
                }
                Err(sqlite_err) => {
                    if let Some(uri) = missing_table_uri(&sqlite_err) {
                        if !attempted.insert(uri.clone()) {
                            return Err(Error::programming(format!(
                                "table for {uri} was created but is still missing"
                            )));
                        }
                        create_table(&connection, &uri)?;
                        continue;
                    }
                    return Err(sqlite_err.into());
                }
            }
        }

        Ok(self)
    }

    /// Always fails: executing one statement repeatedly with different
    /// parameter sets has no well-defined cost model in this bridge, so
    /// callers are asked to call [`Cursor::execute`] themselves in a
    /// loop (spec §4.6 "`executemany` is not supported").
    pub fn executemany(&mut self, _operation: &str, _seq_of_parameters: &[&[NativeValue]]) -> Result<&mut Self> {
        Err(Error::not_supported(
            "`executemany` is not supported, use `execute` instead",
        ))
    }

    pub fn fetchone(&mut self) -> Result<Option<ResultRow>> {
        self.check_closed()?;
        self.check_executed()?;
        let mut inner = self.inner.borrow_mut();
        let row = inner.results.as_mut().and_then(VecDeque::pop_front);
        if row.is_some() {
            inner.rowcount = inner.rowcount.max(0) + 1;
        }
        Ok(row)
    }

    pub fn fetchmany(&mut self, size: Option<usize>) -> Result<Vec<ResultRow>> {
        self.check_closed()?;
        self.check_executed()?;
        let size = size.unwrap_or_else(|| self.arraysize());
        let mut inner = self.inner.borrow_mut();
        let results = inner.results.as_mut().expect("checked above");
        let n = size.min(results.len());
        let rows: Vec<ResultRow> = results.drain(..n).collect();
        inner.rowcount = inner.rowcount.max(0) + rows.len() as i64;
        Ok(rows)
    }

    pub fn fetchall(&mut self) -> Result<Vec<ResultRow>> {
        self.check_closed()?;
        self.check_executed()?;
        let mut inner = self.inner.borrow_mut();
        let results = inner.results.take().unwrap_or_default();
        let rows: Vec<ResultRow> = results.into_iter().collect();
        inner.rowcount = inner.rowcount.max(0) + rows.len() as i64;
        inner.results = Some(VecDeque::new());
        Ok(rows)
    }

    pub fn setinputsizes(&self, _sizes: usize) {}

    pub fn setoutputsizes(&self, _sizes: usize) {}
}

impl Iterator for Cursor {
    type Item = Result<ResultRow>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.fetchone() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => None,
            Err(err) => Some(Err(err)),
        }
    }
}

fn run_once(
    connection: &Rc<RefCell<ConnectionInner>>,
    operation: &str,
    parameters: &[EngineValue],
) -> rusqlite::Result<(Description, Vec<ResultRow>)> {
    let inner = connection.borrow();
    let mut stmt = inner.conn.prepare(operation)?;
    let params: Vec<rusqlite::types::Value> =
        parameters.iter().cloned().map(Into::into).collect();

    let column_count = stmt.column_count();
    let description = if column_count == 0 {
        None
    } else {
        Some(
            (0..column_count)
                .map(|i| ColumnDescription {
                    name: stmt.column_name(i).unwrap_or_default().to_string(),
                    type_name: stmt.column_decltype(i).map(str::to_string),
                    display_size: None,
                    internal_size: None,
                    precision: None,
                    scale: None,
                    null_ok: true,
                })
                .collect(),
        )
    };

    let mut rows = Vec::new();
    let mut query_rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;
    while let Some(row) = query_rows.next()? {
        let mut values = Vec::with_capacity(column_count);
        for i in 0..column_count {
            let value: rusqlite::types::Value = row.get(i)?;
            values.push(value.into());
        }
        rows.push(values);
    }

    Ok((description, rows))
}

/// Recognizes `DROP TABLE <uri>` ahead of the engine, tolerating leading
/// whitespace and `--`/`/* */` comments and an optional `IF EXISTS` (spec
/// §6: "the middleware itself parses only enough to recognize `DROP TABLE
/// <uri>`"). Anything else, including a trailing `WHERE`/extra clauses
/// SQLite itself would reject, is left alone for the engine to see.
fn parse_drop_table_uri(sql: &str) -> Option<String> {
    let rest = take_keyword(sql, "DROP")?;
    let rest = take_keyword(rest, "TABLE")?;
    let rest = match take_keyword(rest, "IF") {
        Some(after_if) => take_keyword(after_if, "EXISTS").unwrap_or(rest),
        None => rest,
    };
    parse_table_identifier(skip_trivia(rest))
}

fn skip_trivia(input: &str) -> &str {
    let mut rest = input;
    loop {
        let trimmed = rest.trim_start();
        if let Some(after) = trimmed.strip_prefix("--") {
            rest = after.split_once('\n').map_or("", |(_, tail)| tail);
            continue;
        }
        if let Some(after) = trimmed.strip_prefix("/*") {
            rest = after.split_once("*/").map_or("", |(_, tail)| tail);
            continue;
        }
        return trimmed;
    }
}

fn take_keyword<'a>(input: &'a str, keyword: &str) -> Option<&'a str> {
    let trimmed = skip_trivia(input);
    let len = keyword.len();
    if trimmed.len() < len || !trimmed.as_bytes()[..len].eq_ignore_ascii_case(keyword.as_bytes()) {
        return None;
    }
    let boundary_ok = trimmed[len..]
        .chars()
        .next()
        .map_or(true, |c| !(c.is_alphanumeric() || c == '_'));
    boundary_ok.then(|| &trimmed[len..])
}

fn parse_table_identifier(input: &str) -> Option<String> {
    match input.chars().next()? {
        quote @ ('"' | '`' | '\'') => {
            let body = &input[quote.len_utf8()..];
            let end = body.find(quote)?;
            Some(body[..end].to_string())
        }
        _ => {
            let end = input
                .find(|c: char| c.is_whitespace() || c == ';')
                .unwrap_or(input.len());
            (end > 0).then(|| input[..end].to_string())
        }
    }
}

/// Dispatches directly to the matching adapter's `drop_table` (spec §8
/// scenario 6). A fresh adapter instance is constructed for the call
/// since this bridge doesn't keep a connection-wide index of the
/// instances living inside already-materialized virtual tables; for the
/// external side effects `drop_table` exists for (deleting a file,
/// invalidating a cache entry) that's equivalent, and it keeps this path
/// from ever touching the embedded engine at all.
fn drop_table(connection: &Rc<RefCell<ConnectionInner>>, uri: &str) -> Result<()> {
    let (factory, kwargs) = {
        let inner = connection.borrow();
        let factory = find_in(&inner.factories, uri)?;
        let kwargs = inner.options.kwargs_for(factory.name());
        (factory, kwargs)
    };
    let mut adapter = factory.construct(uri, &kwargs)?;
    adapter.drop_table()
}

fn missing_table_uri(err: &rusqlite::Error) -> Option<String> {
    if let rusqlite::Error::SqliteFailure(_, Some(message)) = err {
        message
            .strip_prefix(NO_SUCH_TABLE_PREFIX)
            .map(|rest| rest.trim_matches('"').to_string())
    } else {
        None
    }
}

/// Escape a table name for use inside double quotes in a `CREATE
/// VIRTUAL TABLE "..."` statement.
fn quote_identifier(value: &str) -> String {
    value.replace('"', "\"\"")
}

fn create_table(connection: &Rc<RefCell<ConnectionInner>>, uri: &str) -> Result<()> {
    let factory = {
        let inner = connection.borrow();
        find_in(&inner.factories, uri)?
    };

    let kwargs = connection.borrow().options.kwargs_for(factory.name());
    let mut args = vec![vt::encode_arg(&uri.to_string())?];
    for (key, value) in &kwargs {
        args.push(vt::encode_arg(&(key.clone(), value.clone()))?);
    }

    let table_name = quote_identifier(uri);
    let sql = format!(
        "CREATE VIRTUAL TABLE \"{table_name}\" USING {}({})",
        factory.name(),
        args.join(", ")
    );

    log::debug!("materializing {uri} via adapter {}", factory.name());
    connection.borrow().conn.execute_batch(&sql)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_drop_table_uri_recognizes_quoted_uri() {
        let uri = parse_drop_table_uri(r#"DROP TABLE "csv:///tmp/file.csv""#).unwrap();
        assert_eq!(uri, "csv:///tmp/file.csv");
    }

    #[test]
    fn parse_drop_table_uri_tolerates_leading_comments_and_if_exists() {
        let sql = "-- cleanup\n/* note */  drop table if exists \"dummy://\"";
        assert_eq!(parse_drop_table_uri(sql).unwrap(), "dummy://");
    }

    #[test]
    fn parse_drop_table_uri_rejects_select() {
        assert!(parse_drop_table_uri("SELECT * FROM \"dummy://\"").is_none());
    }

    #[test]
    fn parse_drop_table_uri_accepts_bare_identifier() {
        assert_eq!(parse_drop_table_uri("DROP TABLE dummy").unwrap(), "dummy");
    }
}
