//! Tagged database value codec.
//!
//! `DbValue` is the only representation that crosses the SQLite boundary:
//! every leaf of a record, and every SQL statement parameter or result
//! column, passes through it. See [`value`] for the encode/decode traits
//! and [`ptr`] for the property-path machinery used to locate leaves
//! inside a record's encoded JSON tree.

mod ptr;
mod value;

pub use ptr::{walk_leaves, PropertyPath, Token};
pub use value::{DbValue, FromDbValue, ToDbValue, ValueError};
