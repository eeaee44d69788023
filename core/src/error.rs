//! Error and result types.
//!
//! The taxonomy mirrors a DB-API 2.0 style hierarchy: every [`Error`] carries
//! a [`Status`] that callers can match on to recover the exception class a
//! DB-API implementation would have raised (`InterfaceError`,
//! `OperationalError`, `ProgrammingError`, ...).

use std::fmt::Display;

/// Coarse classification of an [`Error`], used by callers that want to
/// react differently to different failure modes without string-matching
/// messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Status {
    /// Malformed use of the API itself: bad SQL, wrong parameter count,
    /// operating on a closed cursor.
    Interface,
    /// A value could not be converted or decoded.
    Data,
    /// A transport/I/O failure reaching the adapter's backing service.
    Operational,
    /// A constraint on the underlying data was violated.
    Integrity,
    /// An invariant internal to the bridge was violated; indicates a bug.
    Internal,
    /// The statement is well-formed but asks for something the system
    /// cannot do (unknown table, bad DDL, wrong table shape).
    Programming,
    /// An adapter declined to support an optional operation (DML, limit,
    /// offset, `executemany`, ...).
    NotSupported,
    /// An adapter reported a failed authentication.
    Unauthenticated,
    /// Safe-mode autoload found more than one safe adapter registered
    /// under the same name, with no way to pick between them.
    UnsafeAdapters,
}

/// An error produced anywhere in the bridge: adapter construction, the
/// registry, the virtual-table callbacks, or the cursor layer.
#[derive(Debug)]
pub struct Error {
    pub message: String,
    pub status: Status,
    /// Chained cause, when the error wraps another adapter- or
    /// engine-reported failure.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn new(status: Status, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status,
            source: None,
        }
    }

    pub fn with_source(
        status: Status,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            status,
            source: Some(Box::new(source)),
        }
    }

    pub fn interface(message: impl Into<String>) -> Self {
        Self::new(Status::Interface, message)
    }

    pub fn data(message: impl Into<String>) -> Self {
        Self::new(Status::Data, message)
    }

    pub fn operational(message: impl Into<String>) -> Self {
        Self::new(Status::Operational, message)
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::new(Status::Integrity, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Status::Internal, message)
    }

    pub fn programming(message: impl Into<String>) -> Self {
        Self::new(Status::Programming, message)
    }

    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::new(Status::NotSupported, message)
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(Status::Unauthenticated, message)
    }

    pub fn unsafe_adapters(message: impl Into<String>) -> Self {
        Self::new(Status::UnsafeAdapters, message)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.status, self.message)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        let status = match &value {
            rusqlite::Error::QueryReturnedNoRows => Status::Programming,
            rusqlite::Error::InvalidParameterName(_)
            | rusqlite::Error::InvalidColumnIndex(_)
            | rusqlite::Error::InvalidColumnName(_)
            | rusqlite::Error::InvalidColumnType(..) => Status::Data,
            rusqlite::Error::SqliteFailure(..) => Status::Operational,
            _ => Status::Internal,
        };
        Self::with_source(status, value.to_string(), value)
    }
}

impl From<chrono::ParseError> for Error {
    fn from(value: chrono::ParseError) -> Self {
        Self::with_source(Status::Data, value.to_string(), value)
    }
}

impl From<rust_decimal::Error> for Error {
    fn from(value: rust_decimal::Error) -> Self {
        Self::with_source(Status::Data, value.to_string(), value)
    }
}

impl From<rmp_serde::encode::Error> for Error {
    fn from(value: rmp_serde::encode::Error) -> Self {
        Self::with_source(Status::Internal, value.to_string(), value)
    }
}

impl From<rmp_serde::decode::Error> for Error {
    fn from(value: rmp_serde::decode::Error) -> Self {
        Self::with_source(Status::Internal, value.to_string(), value)
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::with_source(Status::Internal, value.to_string(), value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_status_and_message() {
        let err = Error::programming("no such table: dummy://");
        assert_eq!(
            err.to_string(),
            "Programming: no such table: dummy://".to_string()
        );
    }

    #[test]
    fn source_is_preserved_through_conversion() {
        let sqlite_err = rusqlite::Error::QueryReturnedNoRows;
        let err: Error = sqlite_err.into();
        assert_eq!(err.status, Status::Programming);
        assert!(err.source().is_some());
    }
}
