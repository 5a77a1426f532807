//! Connection, statement, collation and pool layer wrapping `rusqlite`.
//!
//! This crate speaks only in [`shelfdb_value::DbValue`] and the tagged
//! [`error::Error`] taxonomy; it has no notion of documents, schemas, or
//! reflection; that belongs to the layer above.

mod collation;
mod connection;
mod error;
mod pool;
mod statement;
mod value_bridge;

pub use collation::{Collations, Comparator, BUILTIN_COLLATIONS};
pub use connection::DbConnection;
pub use error::Error;
pub use pool::{Pool, SharedComparator, WriteGuard};
pub use statement::{RowCursor, Stmt};
pub use value_bridge::{bind_value, value_ref_to_db_value};
