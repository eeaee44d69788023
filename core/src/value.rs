//! The native/engine value split described in spec §4.7: adapters and
//! fields operate on the rich [`NativeValue`] domain, but only the narrow
//! [`EngineValue`] set actually crosses into the embedded SQL engine.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone};
use rust_decimal::Decimal;
use std::cmp::Ordering;

use crate::error::{Error, Result};

/// A value in a column's native domain. Produced by `Field::parse`,
/// consumed by `Field::format`/`Field::quote`, and stored in [`crate::Row`].
#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    Integer(i64),
    Float(f64),
    Decimal(Decimal),
    String(String),
    Blob(Vec<u8>),
    Boolean(bool),
    Date(NaiveDate),
    Time(NaiveTime),
    /// Timezone-aware datetime. Naive (no-offset) values are represented
    /// with `has_offset = false`; the `FixedOffset` is then meaningless
    /// (treated as UTC) and must not be round-tripped into a formatted
    /// string that claims an explicit offset. See DESIGN.md.
    DateTime {
        value: DateTime<FixedOffset>,
        has_offset: bool,
    },
    Duration(chrono::Duration),
    Null,
}

impl NativeValue {
    pub fn datetime_aware(value: DateTime<FixedOffset>) -> Self {
        NativeValue::DateTime {
            value,
            has_offset: true,
        }
    }

    pub fn datetime_naive(value: chrono::NaiveDateTime) -> Self {
        NativeValue::DateTime {
            value: FixedOffset::east_opt(0).unwrap().from_utc_datetime(&value),
            has_offset: false,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, NativeValue::Null)
    }

    /// Generic native -> engine coercion used to bind query parameters
    /// (spec §4.7/§7 scenario 4: "native-typed parameters are coerced by
    /// the value bridge before binding"). A `?` placeholder isn't tied to
    /// any particular column's [`crate::fields::Field`], so this takes the
    /// same fixed path the spec spells out directly: datetimes to ISO
    /// strings, booleans to 0/1, decimals and durations to strings.
    pub fn to_engine_value(&self) -> EngineValue {
        use crate::fields::{
            format_duration_string, DATETIME_FORMAT, DATETIME_FORMAT_OFFSET, DATE_FORMAT,
            TIME_FORMAT,
        };

        match self {
            NativeValue::Null => EngineValue::Null,
            NativeValue::Integer(i) => EngineValue::Integer(*i),
            NativeValue::Float(f) => EngineValue::Double(*f),
            NativeValue::Boolean(b) => EngineValue::Integer(*b as i64),
            NativeValue::Decimal(d) => EngineValue::Text(d.to_string()),
            NativeValue::String(s) => EngineValue::Text(s.clone()),
            NativeValue::Blob(b) => EngineValue::Blob(b.clone()),
            NativeValue::Date(d) => EngineValue::Text(d.format(DATE_FORMAT).to_string()),
            NativeValue::Time(t) => EngineValue::Text(t.format(TIME_FORMAT).to_string()),
            NativeValue::DateTime {
                value,
                has_offset: true,
            } => EngineValue::Text(value.format(DATETIME_FORMAT_OFFSET).to_string()),
            NativeValue::DateTime {
                value,
                has_offset: false,
            } => EngineValue::Text(value.naive_utc().format(DATETIME_FORMAT).to_string()),
            NativeValue::Duration(d) => EngineValue::Text(format_duration_string(d)),
        }
    }

    /// Type order used to break ties when comparing values of different
    /// variants (e.g. for residual filtering against mismatched types).
    fn type_order(&self) -> u8 {
        match self {
            NativeValue::Boolean(_) => 0,
            NativeValue::Integer(_) => 1,
            NativeValue::Float(_) => 2,
            NativeValue::Decimal(_) => 3,
            NativeValue::String(_) => 4,
            NativeValue::Date(_) => 5,
            NativeValue::Time(_) => 6,
            NativeValue::DateTime { .. } => 7,
            NativeValue::Duration(_) => 8,
            NativeValue::Blob(_) => 9,
            NativeValue::Null => 10,
        }
    }
}

impl Eq for NativeValue {}

impl PartialOrd for NativeValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NativeValue {
    fn cmp(&self, other: &Self) -> Ordering {
        use NativeValue::*;

        match (self, other) {
            // Nulls sort last, matching SQL ORDER BY default behavior.
            (Null, Null) => Ordering::Equal,
            (Null, _) => Ordering::Greater,
            (_, Null) => Ordering::Less,

            (Boolean(a), Boolean(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (Decimal(a), Decimal(b)) => a.cmp(b),
            (String(a), String(b)) => a.cmp(b),
            (Blob(a), Blob(b)) => a.cmp(b),
            (Date(a), Date(b)) => a.cmp(b),
            (Time(a), Time(b)) => a.cmp(b),
            (DateTime { value: a, .. }, DateTime { value: b, .. }) => a.cmp(b),
            (Duration(a), Duration(b)) => a.cmp(b),

            (Integer(a), Float(b)) => (*a as f64).total_cmp(b),
            (Float(a), Integer(b)) => a.total_cmp(&(*b as f64)),

            _ => self.type_order().cmp(&other.type_order()),
        }
    }
}

/// The small set of value kinds that the embedded SQL engine understands
/// natively (spec §4.7 / §6: "signed integer, float, text, blob, null").
#[derive(Debug, Clone, PartialEq)]
pub enum EngineValue {
    Integer(i64),
    Double(f64),
    Text(String),
    Blob(Vec<u8>),
    Null,
}

impl From<rusqlite::types::Value> for EngineValue {
    fn from(value: rusqlite::types::Value) -> Self {
        match value {
            rusqlite::types::Value::Null => EngineValue::Null,
            rusqlite::types::Value::Integer(i) => EngineValue::Integer(i),
            rusqlite::types::Value::Real(f) => EngineValue::Double(f),
            rusqlite::types::Value::Text(s) => EngineValue::Text(s),
            rusqlite::types::Value::Blob(b) => EngineValue::Blob(b),
        }
    }
}

impl From<EngineValue> for rusqlite::types::Value {
    fn from(value: EngineValue) -> Self {
        match value {
            EngineValue::Null => rusqlite::types::Value::Null,
            EngineValue::Integer(i) => rusqlite::types::Value::Integer(i),
            EngineValue::Double(f) => rusqlite::types::Value::Real(f),
            EngineValue::Text(s) => rusqlite::types::Value::Text(s),
            EngineValue::Blob(b) => rusqlite::types::Value::Blob(b),
        }
    }
}

impl EngineValue {
    pub fn as_integer(&self) -> Result<i64> {
        match self {
            EngineValue::Integer(i) => Ok(*i),
            other => Err(Error::data(format!("expected integer, got {other:?}"))),
        }
    }

    pub fn as_text(&self) -> Result<&str> {
        match self {
            EngineValue::Text(s) => Ok(s),
            other => Err(Error::data(format!("expected text, got {other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nulls_sort_last() {
        let mut values = vec![NativeValue::Integer(3), NativeValue::Null, NativeValue::Integer(1)];
        values.sort();
        assert_eq!(
            values,
            vec![
                NativeValue::Integer(1),
                NativeValue::Integer(3),
                NativeValue::Null
            ]
        );
    }

    #[test]
    fn integer_and_float_compare_numerically() {
        assert!(NativeValue::Integer(2) < NativeValue::Float(2.5));
        assert!(NativeValue::Float(1.5) < NativeValue::Integer(2));
    }

    #[test]
    fn to_engine_value_coerces_aware_datetime_to_offset_iso_string() {
        let dt = DateTime::parse_from_rfc3339("2024-01-01T00:00:00+00:00").unwrap();
        let native = NativeValue::datetime_aware(dt);
        assert_eq!(
            native.to_engine_value(),
            EngineValue::Text("2024-01-01T00:00:00+00:00".to_string())
        );
    }

    #[test]
    fn to_engine_value_coerces_boolean_to_integer() {
        assert_eq!(
            NativeValue::Boolean(true).to_engine_value(),
            EngineValue::Integer(1)
        );
    }

    #[test]
    fn to_engine_value_coerces_decimal_to_text() {
        let value = NativeValue::Decimal(Decimal::try_from(12.5).unwrap());
        assert_eq!(value.to_engine_value(), EngineValue::Text("12.5".to_string()));
    }

    #[test]
    fn engine_value_round_trips_through_rusqlite_value() {
        let v = EngineValue::Text("hello".into());
        let sqlite_value: rusqlite::types::Value = v.clone().into();
        let back: EngineValue = sqlite_value.into();
        assert_eq!(v, back);
    }
}
