//! Zero-configuration, type-safe document persistence on top of SQLite.
//!
//! A [`Database`] opens a SQLite file (or an in-memory database for
//! tests) and hands out [`Collection`]s, one per record type, whose
//! backing table and indices it creates and migrates automatically from
//! the type's reflected [`shelfdb_reflect::Schema`]. Queries are built
//! with [`query::QueryBuilder`] against typed [`shelfdb_reflect::FieldPath`]
//! accessors rather than column-name strings.

mod codec;
mod collection;
mod database;
mod error;
mod options;
mod query;

pub use codec::RecordCodec;
pub use collection::{Collection, OnConflict};
pub use database::Database;
pub use error::Error;
pub use options::{Options, SqlLogger, TracingSqlLogger};
pub use query::{Direction, Nulls, Op, QueryBuilder};

pub use shelfdb_reflect::{
    sample, FieldConfig, FieldPath, IndexKind, Record, Sampleable, Schema, SchemaBuilder,
};
pub use shelfdb_value::{DbValue, FromDbValue, ToDbValue};
