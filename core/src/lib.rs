//! sqlport: SQL over anything.
//!
//! This crate lets arbitrary external data sources — REST APIs,
//! spreadsheets, object storage, search indexes, CSV/Parquet files — be
//! queried with SQL, by exposing each one as a SQLite virtual table
//! backed by an [`Adapter`](adapter::Adapter) implementation.
//!
//! The pieces:
//! - [`adapter`] — the contract every external source implements.
//! - [`registry`] — tracks loaded adapters and dispatches URIs to them.
//! - [`filters`] and [`fields`] — the predicate algebra and value codec
//!   used to push `WHERE`/`ORDER BY`/`LIMIT`/`OFFSET` down to adapters.
//! - [`vt`] — the bridge between this crate and SQLite's virtual-table
//!   callbacks (`BestIndex`, `xFilter`, `xUpdate`, ...).
//! - [`cursor`] and [`connection`] — a DB-API 2.0 shaped surface on top
//!   of the bridge, including auto-materialization of virtual tables on
//!   first reference.
//!
//! # Example
//!
//! ```no_run
//! use sqlport_core::connection::Connection;
//! use sqlport_core::config::ConnectOptions;
//!
//! let conn = Connection::open(ConnectOptions::new()).unwrap();
//! let mut cursor = conn.cursor().unwrap();
//! cursor.execute("SELECT * FROM \"dummy://\"", &[]).unwrap();
//! let rows = cursor.fetchall().unwrap();
//! ```

pub mod adapter;
pub mod config;
pub mod connection;
pub mod cursor;
pub mod error;
pub mod fields;
pub mod filters;
pub mod registry;
pub mod row;
pub mod value;
pub mod vt;

pub use adapter::{Adapter, AdapterFactory};
pub use error::{Error, Result, Status};
pub use fields::Field;
pub use filters::Filter;
pub use row::{Bounds, Row};
pub use value::{EngineValue, NativeValue};
