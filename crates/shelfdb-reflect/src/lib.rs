//! Structural reflection over encodable record types, without runtime type
//! introspection.
//!
//! A [`Record`] supplies a [`Schema`] naming its top-level fields, their
//! [`FieldConfig`], and a sample accessor pair per field. From that,
//! [`build_samples`] synthesises a small grid of instances whose every
//! field is observably different across the grid, and [`FieldPathMapper`]
//! fingerprints the grid's encoded trees to invert a typed [`FieldPath`]
//! accessor into the property path it lands on, using only the types'
//! ordinary `serde` encoding rather than `std::any` downcasting.

mod error;
mod mapper;
mod sampleable;
mod samples;
mod schema;

pub use error::ReflectionError;
pub use mapper::FieldPathMapper;
pub use sampleable::{sample, Sampleable};
pub use samples::build_samples;
pub use schema::{CombinedConfig, FieldConfig, FieldDescriptor, FieldPath, IndexKind, Record, Schema, SchemaBuilder};

pub use shelfdb_value::PropertyPath;
