//! Column field types: the codec between what the adapter stores and what
//! crosses the native/engine value boundary (spec §4.2).
//!
//! Every field knows three things about its column: which [`Filter`] tags
//! the adapter can accept for it (`filters`), whether the adapter can
//! already return rows in sorted order for it (`order`), and whether that
//! order/filter application is exact or needs a residual check
//! (`exact`). The codec itself is three functions: `parse` turns a value
//! coming out of the embedded engine into the adapter's native domain,
//! `format` goes the other way for values flowing into the engine, and
//! `quote` renders a native value as a SQL literal for composing pushed
//! down predicates.

use std::fmt;

use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;

use crate::error::{Error, Result};
use crate::value::{EngineValue, NativeValue};

/// Whether an adapter already returns rows sorted on a given column, and
/// in which direction. Mirrors spec §4.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    None,
    Ascending,
    Descending,
    /// The adapter will sort however the engine asks.
    Any,
}

/// The declared SQLite column affinity a field maps to; used when the
/// virtual-table bridge emits the `CREATE TABLE` DDL for `xCreate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Integer,
    Float,
    Decimal,
    Text,
    Blob,
    Boolean,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FieldType::Integer => "INTEGER",
            FieldType::Float => "REAL",
            FieldType::Decimal => "REAL",
            FieldType::Text => "TEXT",
            FieldType::Blob => "BLOB",
            FieldType::Boolean => "INTEGER",
        };
        f.write_str(s)
    }
}

/// Per-column capability declaration shared by every field type.
#[derive(Debug, Clone)]
pub struct FieldConfig {
    /// Filter tags (see [`crate::filters::Filter::ALL_TAGS`]) the adapter
    /// accepts being pushed down for this column.
    pub filters: Vec<&'static str>,
    pub order: Order,
    /// If `false`, the engine must re-check rows the adapter returned
    /// (filter applied conservatively, or order only partially honored).
    pub exact: bool,
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            order: Order::None,
            exact: true,
        }
    }
}

impl FieldConfig {
    pub fn with_filters(mut self, filters: Vec<&'static str>) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    pub fn with_exact(mut self, exact: bool) -> Self {
        self.exact = exact;
        self
    }
}

/// The codec and capability contract for one column.
pub trait Field: fmt::Debug + Send + Sync {
    fn field_type(&self) -> FieldType;
    fn config(&self) -> &FieldConfig;

    fn filters(&self) -> &[&'static str] {
        &self.config().filters
    }

    fn order(&self) -> Order {
        self.config().order
    }

    fn exact(&self) -> bool {
        self.config().exact
    }

    /// Engine value -> native value.
    fn parse(&self, value: &EngineValue) -> Result<NativeValue>;

    /// Native value -> engine value.
    fn format(&self, value: &NativeValue) -> Result<EngineValue>;

    /// Native value -> SQL literal, for predicates pushed into generated
    /// `CREATE VIRTUAL TABLE` statements or adapter-side query strings.
    fn quote(&self, value: &NativeValue) -> Result<String>;
}

fn type_mismatch(expected: &str, value: &NativeValue) -> Error {
    Error::data(format!("expected {expected}, got {value:?}"))
}

fn engine_mismatch(expected: &str, value: &EngineValue) -> Error {
    Error::data(format!("expected {expected}, got {value:?}"))
}

/// `Field::parse` never fails outward (spec §4.2: "errors produce null,
/// never exceptions, for robustness; unexpected input is logged, not
/// fatal"). Every `parse` impl below funnels its fallible match through
/// this so a malformed or wrong-typed storage value degrades to a
/// logged warning plus `NativeValue::Null` instead of an `Err`.
fn parse_or_null(result: Result<NativeValue>) -> Result<NativeValue> {
    match result {
        Ok(value) => Ok(value),
        Err(err) => {
            log::warn!("field parse failed, returning null: {err}");
            Ok(NativeValue::Null)
        }
    }
}

macro_rules! field_struct {
    ($name:ident) => {
        #[derive(Debug, Clone)]
        pub struct $name(pub FieldConfig);

        impl $name {
            pub fn new(config: FieldConfig) -> Self {
                Self(config)
            }
        }
    };
}

field_struct!(IntegerField);
field_struct!(FloatField);
field_struct!(DecimalField);
field_struct!(StringField);
field_struct!(BlobField);
field_struct!(BooleanField);
field_struct!(DateField);
field_struct!(TimeField);
field_struct!(DateTimeField);
field_struct!(DurationField);
field_struct!(UnknownField);
field_struct!(StringIntegerField);
field_struct!(StringDecimalField);
field_struct!(StringBooleanField);
field_struct!(StringBlobField);
field_struct!(StringDurationField);
field_struct!(IntBooleanField);

impl Field for IntegerField {
    fn field_type(&self) -> FieldType {
        FieldType::Integer
    }
    fn config(&self) -> &FieldConfig {
        &self.0
    }
    fn parse(&self, value: &EngineValue) -> Result<NativeValue> {
        parse_or_null(match value {
            EngineValue::Null => Ok(NativeValue::Null),
            EngineValue::Integer(i) => Ok(NativeValue::Integer(*i)),
            other => Err(engine_mismatch("integer", other)),
        })
    }
    fn format(&self, value: &NativeValue) -> Result<EngineValue> {
        match value {
            NativeValue::Null => Ok(EngineValue::Null),
            NativeValue::Integer(i) => Ok(EngineValue::Integer(*i)),
            other => Err(type_mismatch("integer", other)),
        }
    }
    fn quote(&self, value: &NativeValue) -> Result<String> {
        match value {
            NativeValue::Null => Ok("NULL".into()),
            NativeValue::Integer(i) => Ok(i.to_string()),
            other => Err(type_mismatch("integer", other)),
        }
    }
}

impl Field for FloatField {
    fn field_type(&self) -> FieldType {
        FieldType::Float
    }
    fn config(&self) -> &FieldConfig {
        &self.0
    }
    fn parse(&self, value: &EngineValue) -> Result<NativeValue> {
        parse_or_null(match value {
            EngineValue::Null => Ok(NativeValue::Null),
            EngineValue::Double(f) => Ok(NativeValue::Float(*f)),
            EngineValue::Integer(i) => Ok(NativeValue::Float(*i as f64)),
            other => Err(engine_mismatch("float", other)),
        })
    }
    fn format(&self, value: &NativeValue) -> Result<EngineValue> {
        match value {
            NativeValue::Null => Ok(EngineValue::Null),
            NativeValue::Float(f) => Ok(EngineValue::Double(*f)),
            other => Err(type_mismatch("float", other)),
        }
    }
    fn quote(&self, value: &NativeValue) -> Result<String> {
        match value {
            NativeValue::Null => Ok("NULL".into()),
            NativeValue::Float(f) => Ok(f.to_string()),
            other => Err(type_mismatch("float", other)),
        }
    }
}

impl Field for DecimalField {
    fn field_type(&self) -> FieldType {
        FieldType::Decimal
    }
    fn config(&self) -> &FieldConfig {
        &self.0
    }
    fn parse(&self, value: &EngineValue) -> Result<NativeValue> {
        parse_or_null((|| -> Result<NativeValue> {
            match value {
                EngineValue::Null => Ok(NativeValue::Null),
                EngineValue::Double(f) => Ok(NativeValue::Decimal(
                    Decimal::try_from(*f).map_err(|e| Error::data(e.to_string()))?,
                )),
                EngineValue::Text(s) => Ok(NativeValue::Decimal(s.parse::<Decimal>()?)),
                other => Err(engine_mismatch("decimal", other)),
            }
        })())
    }
    fn format(&self, value: &NativeValue) -> Result<EngineValue> {
        match value {
            NativeValue::Null => Ok(EngineValue::Null),
            NativeValue::Decimal(d) => Ok(EngineValue::Text(d.to_string())),
            other => Err(type_mismatch("decimal", other)),
        }
    }
    fn quote(&self, value: &NativeValue) -> Result<String> {
        match value {
            NativeValue::Null => Ok("NULL".into()),
            NativeValue::Decimal(d) => Ok(d.to_string()),
            other => Err(type_mismatch("decimal", other)),
        }
    }
}

impl Field for StringField {
    fn field_type(&self) -> FieldType {
        FieldType::Text
    }
    fn config(&self) -> &FieldConfig {
        &self.0
    }
    fn parse(&self, value: &EngineValue) -> Result<NativeValue> {
        parse_or_null(match value {
            EngineValue::Null => Ok(NativeValue::Null),
            EngineValue::Text(s) => Ok(NativeValue::String(s.clone())),
            other => Err(engine_mismatch("text", other)),
        })
    }
    fn format(&self, value: &NativeValue) -> Result<EngineValue> {
        match value {
            NativeValue::Null => Ok(EngineValue::Null),
            NativeValue::String(s) => Ok(EngineValue::Text(s.clone())),
            other => Err(type_mismatch("string", other)),
        }
    }
    fn quote(&self, value: &NativeValue) -> Result<String> {
        match value {
            NativeValue::Null => Ok("NULL".into()),
            NativeValue::String(s) => Ok(format!("'{}'", s.replace('\'', "''"))),
            other => Err(type_mismatch("string", other)),
        }
    }
}

impl Field for BlobField {
    fn field_type(&self) -> FieldType {
        FieldType::Blob
    }
    fn config(&self) -> &FieldConfig {
        &self.0
    }
    fn parse(&self, value: &EngineValue) -> Result<NativeValue> {
        parse_or_null(match value {
            EngineValue::Null => Ok(NativeValue::Null),
            EngineValue::Blob(b) => Ok(NativeValue::Blob(b.clone())),
            other => Err(engine_mismatch("blob", other)),
        })
    }
    fn format(&self, value: &NativeValue) -> Result<EngineValue> {
        match value {
            NativeValue::Null => Ok(EngineValue::Null),
            NativeValue::Blob(b) => Ok(EngineValue::Blob(b.clone())),
            other => Err(type_mismatch("blob", other)),
        }
    }
    fn quote(&self, value: &NativeValue) -> Result<String> {
        match value {
            NativeValue::Null => Ok("NULL".into()),
            NativeValue::Blob(b) => {
                let hex: String = b.iter().map(|byte| format!("{byte:02X}")).collect();
                Ok(format!("X'{hex}'"))
            }
            other => Err(type_mismatch("blob", other)),
        }
    }
}

impl Field for BooleanField {
    fn field_type(&self) -> FieldType {
        FieldType::Boolean
    }
    fn config(&self) -> &FieldConfig {
        &self.0
    }
    fn parse(&self, value: &EngineValue) -> Result<NativeValue> {
        parse_or_null(match value {
            EngineValue::Null => Ok(NativeValue::Null),
            EngineValue::Integer(i) => Ok(NativeValue::Boolean(*i != 0)),
            other => Err(engine_mismatch("boolean", other)),
        })
    }
    fn format(&self, value: &NativeValue) -> Result<EngineValue> {
        match value {
            NativeValue::Null => Ok(EngineValue::Null),
            NativeValue::Boolean(b) => Ok(EngineValue::Integer(*b as i64)),
            other => Err(type_mismatch("boolean", other)),
        }
    }
    fn quote(&self, value: &NativeValue) -> Result<String> {
        match value {
            NativeValue::Null => Ok("NULL".into()),
            NativeValue::Boolean(true) => Ok("TRUE".into()),
            NativeValue::Boolean(false) => Ok("FALSE".into()),
            other => Err(type_mismatch("boolean", other)),
        }
    }
}

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";
pub(crate) const TIME_FORMAT: &str = "%H:%M:%S%.f";
pub(crate) const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";
pub(crate) const DATETIME_FORMAT_OFFSET: &str = "%Y-%m-%dT%H:%M:%S%.f%:z";

impl Field for DateField {
    fn field_type(&self) -> FieldType {
        FieldType::Text
    }
    fn config(&self) -> &FieldConfig {
        &self.0
    }
    fn parse(&self, value: &EngineValue) -> Result<NativeValue> {
        parse_or_null((|| -> Result<NativeValue> {
            match value {
                EngineValue::Null => Ok(NativeValue::Null),
                EngineValue::Text(s) => {
                    Ok(NativeValue::Date(NaiveDate::parse_from_str(s, DATE_FORMAT)?))
                }
                other => Err(engine_mismatch("date string", other)),
            }
        })())
    }
    fn format(&self, value: &NativeValue) -> Result<EngineValue> {
        match value {
            NativeValue::Null => Ok(EngineValue::Null),
            NativeValue::Date(d) => Ok(EngineValue::Text(d.format(DATE_FORMAT).to_string())),
            other => Err(type_mismatch("date", other)),
        }
    }
    fn quote(&self, value: &NativeValue) -> Result<String> {
        match value {
            NativeValue::Null => Ok("NULL".into()),
            NativeValue::Date(d) => Ok(format!("'{}'", d.format(DATE_FORMAT))),
            other => Err(type_mismatch("date", other)),
        }
    }
}

impl Field for TimeField {
    fn field_type(&self) -> FieldType {
        FieldType::Text
    }
    fn config(&self) -> &FieldConfig {
        &self.0
    }
    fn parse(&self, value: &EngineValue) -> Result<NativeValue> {
        parse_or_null((|| -> Result<NativeValue> {
            match value {
                EngineValue::Null => Ok(NativeValue::Null),
                EngineValue::Text(s) => {
                    Ok(NativeValue::Time(NaiveTime::parse_from_str(s, TIME_FORMAT)?))
                }
                other => Err(engine_mismatch("time string", other)),
            }
        })())
    }
    fn format(&self, value: &NativeValue) -> Result<EngineValue> {
        match value {
            NativeValue::Null => Ok(EngineValue::Null),
            NativeValue::Time(t) => Ok(EngineValue::Text(t.format(TIME_FORMAT).to_string())),
            other => Err(type_mismatch("time", other)),
        }
    }
    fn quote(&self, value: &NativeValue) -> Result<String> {
        match value {
            NativeValue::Null => Ok("NULL".into()),
            NativeValue::Time(t) => Ok(format!("'{}'", t.format(TIME_FORMAT))),
            other => Err(type_mismatch("time", other)),
        }
    }
}

impl Field for DateTimeField {
    fn field_type(&self) -> FieldType {
        FieldType::Text
    }
    fn config(&self) -> &FieldConfig {
        &self.0
    }
    fn parse(&self, value: &EngineValue) -> Result<NativeValue> {
        parse_or_null((|| -> Result<NativeValue> {
            match value {
                EngineValue::Null => Ok(NativeValue::Null),
                EngineValue::Text(s) => {
                    if let Ok(dt) = chrono::DateTime::parse_from_str(s, DATETIME_FORMAT_OFFSET) {
                        Ok(NativeValue::datetime_aware(dt))
                    } else {
                        let naive = chrono::NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)?;
                        Ok(NativeValue::datetime_naive(naive))
                    }
                }
                other => Err(engine_mismatch("datetime string", other)),
            }
        })())
    }
    fn format(&self, value: &NativeValue) -> Result<EngineValue> {
        match value {
            NativeValue::Null => Ok(EngineValue::Null),
            NativeValue::DateTime {
                value,
                has_offset: true,
            } => Ok(EngineValue::Text(
                value.format(DATETIME_FORMAT_OFFSET).to_string(),
            )),
            NativeValue::DateTime {
                value,
                has_offset: false,
            } => Ok(EngineValue::Text(
                value.naive_utc().format(DATETIME_FORMAT).to_string(),
            )),
            other => Err(type_mismatch("datetime", other)),
        }
    }
    fn quote(&self, value: &NativeValue) -> Result<String> {
        match self.format(value)? {
            EngineValue::Null => Ok("NULL".into()),
            EngineValue::Text(s) => Ok(format!("'{s}'")),
            _ => unreachable!(),
        }
    }
}

impl Field for DurationField {
    fn field_type(&self) -> FieldType {
        FieldType::Float
    }
    fn config(&self) -> &FieldConfig {
        &self.0
    }
    fn parse(&self, value: &EngineValue) -> Result<NativeValue> {
        parse_or_null(match value {
            EngineValue::Null => Ok(NativeValue::Null),
            EngineValue::Double(seconds) => Ok(NativeValue::Duration(
                chrono::Duration::milliseconds((*seconds * 1000.0).round() as i64),
            )),
            other => Err(engine_mismatch("duration seconds", other)),
        })
    }
    fn format(&self, value: &NativeValue) -> Result<EngineValue> {
        match value {
            NativeValue::Null => Ok(EngineValue::Null),
            NativeValue::Duration(d) => Ok(EngineValue::Double(
                d.num_milliseconds() as f64 / 1000.0,
            )),
            other => Err(type_mismatch("duration", other)),
        }
    }
    fn quote(&self, value: &NativeValue) -> Result<String> {
        match self.format(value)? {
            EngineValue::Null => Ok("NULL".into()),
            EngineValue::Double(f) => Ok(f.to_string()),
            _ => unreachable!(),
        }
    }
}

/// A column whose storage type isn't known ahead of time; values pass
/// through unparsed as text. Used for adapters that can't declare a
/// schema until they've seen at least one row.
impl Field for UnknownField {
    fn field_type(&self) -> FieldType {
        FieldType::Text
    }
    fn config(&self) -> &FieldConfig {
        &self.0
    }
    fn parse(&self, value: &EngineValue) -> Result<NativeValue> {
        match value {
            EngineValue::Null => Ok(NativeValue::Null),
            EngineValue::Text(s) => Ok(NativeValue::String(s.clone())),
            EngineValue::Integer(i) => Ok(NativeValue::Integer(*i)),
            EngineValue::Double(f) => Ok(NativeValue::Float(*f)),
            EngineValue::Blob(b) => Ok(NativeValue::Blob(b.clone())),
        }
    }
    fn format(&self, value: &NativeValue) -> Result<EngineValue> {
        match value {
            NativeValue::Null => Ok(EngineValue::Null),
            NativeValue::String(s) => Ok(EngineValue::Text(s.clone())),
            NativeValue::Integer(i) => Ok(EngineValue::Integer(*i)),
            NativeValue::Float(f) => Ok(EngineValue::Double(*f)),
            NativeValue::Blob(b) => Ok(EngineValue::Blob(b.clone())),
            other => Err(type_mismatch("string, integer, float or blob", other)),
        }
    }
    fn quote(&self, value: &NativeValue) -> Result<String> {
        match value {
            NativeValue::Null => Ok("NULL".into()),
            NativeValue::String(s) => Ok(format!("'{}'", s.replace('\'', "''"))),
            NativeValue::Integer(i) => Ok(i.to_string()),
            NativeValue::Float(f) => Ok(f.to_string()),
            other => Err(type_mismatch("string, integer or float", other)),
        }
    }
}

/// Adapters whose backend only speaks strings (CSV cells, spreadsheet
/// values, query-string parameters) but whose column is logically
/// typed. These fields round-trip through `String` on the wire while
/// still exposing a typed [`NativeValue`] to the rest of the bridge.
impl Field for StringIntegerField {
    fn field_type(&self) -> FieldType {
        FieldType::Text
    }
    fn config(&self) -> &FieldConfig {
        &self.0
    }
    fn parse(&self, value: &EngineValue) -> Result<NativeValue> {
        parse_or_null((|| -> Result<NativeValue> {
            match value {
                EngineValue::Null => Ok(NativeValue::Null),
                EngineValue::Text(s) => Ok(NativeValue::Integer(
                    s.parse()
                        .map_err(|_| Error::data(format!("invalid integer: {s}")))?,
                )),
                other => Err(engine_mismatch("text", other)),
            }
        })())
    }
    fn format(&self, value: &NativeValue) -> Result<EngineValue> {
        match value {
            NativeValue::Null => Ok(EngineValue::Null),
            NativeValue::Integer(i) => Ok(EngineValue::Text(i.to_string())),
            other => Err(type_mismatch("integer", other)),
        }
    }
    fn quote(&self, value: &NativeValue) -> Result<String> {
        match value {
            NativeValue::Null => Ok("NULL".into()),
            NativeValue::Integer(i) => Ok(format!("'{i}'")),
            other => Err(type_mismatch("integer", other)),
        }
    }
}

impl Field for StringDecimalField {
    fn field_type(&self) -> FieldType {
        FieldType::Text
    }
    fn config(&self) -> &FieldConfig {
        &self.0
    }
    fn parse(&self, value: &EngineValue) -> Result<NativeValue> {
        parse_or_null((|| -> Result<NativeValue> {
            match value {
                EngineValue::Null => Ok(NativeValue::Null),
                EngineValue::Text(s) => Ok(NativeValue::Decimal(s.parse::<Decimal>()?)),
                other => Err(engine_mismatch("text", other)),
            }
        })())
    }
    fn format(&self, value: &NativeValue) -> Result<EngineValue> {
        match value {
            NativeValue::Null => Ok(EngineValue::Null),
            NativeValue::Decimal(d) => Ok(EngineValue::Text(d.to_string())),
            other => Err(type_mismatch("decimal", other)),
        }
    }
    fn quote(&self, value: &NativeValue) -> Result<String> {
        match value {
            NativeValue::Null => Ok("NULL".into()),
            NativeValue::Decimal(d) => Ok(format!("'{d}'")),
            other => Err(type_mismatch("decimal", other)),
        }
    }
}

impl Field for StringBooleanField {
    fn field_type(&self) -> FieldType {
        FieldType::Text
    }
    fn config(&self) -> &FieldConfig {
        &self.0
    }
    fn parse(&self, value: &EngineValue) -> Result<NativeValue> {
        parse_or_null(match value {
            EngineValue::Null => Ok(NativeValue::Null),
            EngineValue::Text(s) => match s.to_ascii_uppercase().as_str() {
                "TRUE" | "1" => Ok(NativeValue::Boolean(true)),
                "FALSE" | "0" => Ok(NativeValue::Boolean(false)),
                other => Err(Error::data(format!("invalid boolean: {other}"))),
            },
            other => Err(engine_mismatch("text", other)),
        })
    }
    fn format(&self, value: &NativeValue) -> Result<EngineValue> {
        match value {
            NativeValue::Null => Ok(EngineValue::Null),
            NativeValue::Boolean(b) => {
                Ok(EngineValue::Text(if *b { "TRUE" } else { "FALSE" }.into()))
            }
            other => Err(type_mismatch("boolean", other)),
        }
    }
    fn quote(&self, value: &NativeValue) -> Result<String> {
        match value {
            NativeValue::Null => Ok("NULL".into()),
            NativeValue::Boolean(true) => Ok("'TRUE'".into()),
            NativeValue::Boolean(false) => Ok("'FALSE'".into()),
            other => Err(type_mismatch("boolean", other)),
        }
    }
}

impl Field for StringBlobField {
    fn field_type(&self) -> FieldType {
        FieldType::Text
    }
    fn config(&self) -> &FieldConfig {
        &self.0
    }
    fn parse(&self, value: &EngineValue) -> Result<NativeValue> {
        parse_or_null((|| -> Result<NativeValue> {
            match value {
                EngineValue::Null => Ok(NativeValue::Null),
                EngineValue::Text(s) => Ok(NativeValue::Blob(
                    base64::Engine::decode(&base64::engine::general_purpose::STANDARD, s)
                        .map_err(|e| Error::data(e.to_string()))?,
                )),
                other => Err(engine_mismatch("text", other)),
            }
        })())
    }
    fn format(&self, value: &NativeValue) -> Result<EngineValue> {
        match value {
            NativeValue::Null => Ok(EngineValue::Null),
            NativeValue::Blob(b) => Ok(EngineValue::Text(base64::Engine::encode(
                &base64::engine::general_purpose::STANDARD,
                b,
            ))),
            other => Err(type_mismatch("blob", other)),
        }
    }
    fn quote(&self, value: &NativeValue) -> Result<String> {
        match self.format(value)? {
            EngineValue::Null => Ok("NULL".into()),
            EngineValue::Text(s) => Ok(format!("'{s}'")),
            _ => unreachable!(),
        }
    }
}

/// Parses both the `HH:MM:SS[.ffffff]` form and the
/// `D day[s], HH:MM:SS[.ffffff]` form a backend might render a duration
/// as.
impl Field for StringDurationField {
    fn field_type(&self) -> FieldType {
        FieldType::Text
    }
    fn config(&self) -> &FieldConfig {
        &self.0
    }
    fn parse(&self, value: &EngineValue) -> Result<NativeValue> {
        parse_or_null((|| -> Result<NativeValue> {
            match value {
                EngineValue::Null => Ok(NativeValue::Null),
                EngineValue::Text(s) => Ok(NativeValue::Duration(parse_duration_string(s)?)),
                other => Err(engine_mismatch("text", other)),
            }
        })())
    }
    fn format(&self, value: &NativeValue) -> Result<EngineValue> {
        match value {
            NativeValue::Null => Ok(EngineValue::Null),
            NativeValue::Duration(d) => Ok(EngineValue::Text(format_duration_string(d))),
            other => Err(type_mismatch("duration", other)),
        }
    }
    fn quote(&self, value: &NativeValue) -> Result<String> {
        match self.format(value)? {
            EngineValue::Null => Ok("NULL".into()),
            EngineValue::Text(s) => Ok(format!("'{s}'")),
            _ => unreachable!(),
        }
    }
}

pub(crate) fn parse_duration_string(s: &str) -> Result<chrono::Duration> {
    let (days, rest) = match s.split_once(" day, ").or_else(|| s.split_once(" days, ")) {
        Some((days, rest)) => (
            days.trim()
                .parse::<i64>()
                .map_err(|_| Error::data(format!("invalid duration: {s}")))?,
            rest,
        ),
        None => (0, s),
    };

    let parts: Vec<&str> = rest.split(':').collect();
    if parts.len() != 3 {
        return Err(Error::data(format!("invalid duration: {s}")));
    }
    let hours: i64 = parts[0]
        .trim()
        .parse()
        .map_err(|_| Error::data(format!("invalid duration: {s}")))?;
    let minutes: i64 = parts[1]
        .parse()
        .map_err(|_| Error::data(format!("invalid duration: {s}")))?;
    let seconds: f64 = parts[2]
        .parse()
        .map_err(|_| Error::data(format!("invalid duration: {s}")))?;

    Ok(chrono::Duration::days(days)
        + chrono::Duration::hours(hours)
        + chrono::Duration::minutes(minutes)
        + chrono::Duration::milliseconds((seconds * 1000.0).round() as i64))
}

pub(crate) fn format_duration_string(d: &chrono::Duration) -> String {
    let total_ms = d.num_milliseconds();
    let days = total_ms / 86_400_000;
    let remainder_ms = total_ms - days * 86_400_000;
    let hours = remainder_ms / 3_600_000;
    let minutes = (remainder_ms % 3_600_000) / 60_000;
    let seconds = (remainder_ms % 60_000) as f64 / 1000.0;

    if days != 0 {
        let unit = if days.abs() == 1 { "day" } else { "days" };
        format!("{days} {unit}, {hours}:{minutes:02}:{seconds:09.6}")
    } else {
        format!("{hours}:{minutes:02}:{seconds:09.6}")
    }
}

/// A boolean stored as `0`/`1` on a backend that otherwise only has
/// integer columns (no native boolean type, e.g. some spreadsheets).
impl Field for IntBooleanField {
    fn field_type(&self) -> FieldType {
        FieldType::Integer
    }
    fn config(&self) -> &FieldConfig {
        &self.0
    }
    fn parse(&self, value: &EngineValue) -> Result<NativeValue> {
        parse_or_null(match value {
            EngineValue::Null => Ok(NativeValue::Null),
            EngineValue::Integer(i) => Ok(NativeValue::Boolean(*i != 0)),
            other => Err(engine_mismatch("integer", other)),
        })
    }
    fn format(&self, value: &NativeValue) -> Result<EngineValue> {
        match value {
            NativeValue::Null => Ok(EngineValue::Null),
            NativeValue::Boolean(b) => Ok(EngineValue::Integer(*b as i64)),
            other => Err(type_mismatch("boolean", other)),
        }
    }
    fn quote(&self, value: &NativeValue) -> Result<String> {
        match value {
            NativeValue::Null => Ok("NULL".into()),
            NativeValue::Boolean(b) => Ok((*b as i64).to_string()),
            other => Err(type_mismatch("boolean", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_field_quote_escapes_single_quotes() {
        let field = StringField::new(FieldConfig::default());
        let quoted = field
            .quote(&NativeValue::String("O'Brien".into()))
            .unwrap();
        assert_eq!(quoted, "'O''Brien'");
    }

    #[test]
    fn blob_field_quotes_as_hex_literal() {
        let field = BlobField::new(FieldConfig::default());
        let quoted = field.quote(&NativeValue::Blob(vec![0xDE, 0xAD])).unwrap();
        assert_eq!(quoted, "X'DEAD'");
    }

    #[test]
    fn boolean_field_quotes_as_true_false() {
        let field = BooleanField::new(FieldConfig::default());
        assert_eq!(field.quote(&NativeValue::Boolean(true)).unwrap(), "TRUE");
        assert_eq!(field.quote(&NativeValue::Boolean(false)).unwrap(), "FALSE");
    }

    #[test]
    fn string_duration_field_round_trips_hms() {
        let field = StringDurationField::new(FieldConfig::default());
        let parsed = field
            .parse(&EngineValue::Text("1:02:03.500000".into()))
            .unwrap();
        assert_eq!(
            parsed,
            NativeValue::Duration(
                chrono::Duration::hours(1)
                    + chrono::Duration::minutes(2)
                    + chrono::Duration::milliseconds(3500)
            )
        );
    }

    #[test]
    fn string_duration_field_parses_days_form() {
        let field = StringDurationField::new(FieldConfig::default());
        let parsed = field
            .parse(&EngineValue::Text("2 days, 0:00:00".into()))
            .unwrap();
        assert_eq!(parsed, NativeValue::Duration(chrono::Duration::days(2)));
    }

    #[test]
    fn integer_field_parses_wrong_engine_value_as_null() {
        let field = IntegerField::new(FieldConfig::default());
        assert_eq!(
            field.parse(&EngineValue::Text("1".into())).unwrap(),
            NativeValue::Null
        );
    }

    #[test]
    fn date_field_parses_malformed_text_as_null() {
        let field = DateField::new(FieldConfig::default());
        assert_eq!(
            field.parse(&EngineValue::Text("not-a-date".into())).unwrap(),
            NativeValue::Null
        );
    }
}
