use std::collections::HashMap;

use shelfdb_value::{walk_leaves, PropertyPath};

use crate::error::ReflectionError;
use crate::schema::{FieldPath, Schema};
use crate::samples::build_samples;

/// Inverts a [`FieldPath`] accessor into a [`PropertyPath`] in the
/// encoded representation.
///
/// Construction runs the sample-value grid through `serde_json::to_value`
/// to get each sample's encoded tree, verifies every sample has the same
/// set of property paths, then fingerprints every property path and every
/// declared field by the tuple of its value across samples. A field whose
/// fingerprint doesn't appear among the tree's fingerprints is a
/// reflection error; that is the one surface where a `FieldPath` accessor
/// could exist but not resolve to storage.
pub struct FieldPathMapper {
    type_name: &'static str,
    by_field_index: HashMap<usize, PropertyPath>,
}

impl FieldPathMapper {
    pub fn build<T: serde::Serialize>(schema: &Schema<T>) -> Result<Self, ReflectionError> {
        let samples = build_samples(schema)?;

        let encoded: Vec<serde_json::Value> = samples
            .iter()
            .map(|s| {
                serde_json::to_value(s).map_err(|err| ReflectionError::DecodingError {
                    type_name: schema.type_name,
                    reason: err.to_string(),
                })
            })
            .collect::<Result<_, _>>()?;

        let leaf_sets: Vec<Vec<(PropertyPath, serde_json::Value)>> =
            encoded.iter().map(walk_leaves).collect();

        let first_paths: std::collections::BTreeSet<&PropertyPath> =
            leaf_sets[0].iter().map(|(p, _)| p).collect();
        for (index, leaves) in leaf_sets.iter().enumerate().skip(1) {
            let paths: std::collections::BTreeSet<&PropertyPath> =
                leaves.iter().map(|(p, _)| p).collect();
            if paths != first_paths {
                return Err(ReflectionError::InconsistentShape {
                    type_name: schema.type_name,
                    index,
                });
            }
        }

        // fingerprint(path) -> path, keyed by the canonical JSON rendering
        // of the tuple of per-sample values (serde_json::Value has no
        // Hash impl, so the canonical string stands in for it; sorted-key
        // serialisation keeps it stable).
        let mut by_fingerprint: HashMap<String, PropertyPath> = HashMap::new();
        for (path, _) in &leaf_sets[0] {
            let tuple: Vec<&serde_json::Value> = leaf_sets
                .iter()
                .map(|leaves| {
                    leaves
                        .iter()
                        .find(|(p, _)| p == path)
                        .map(|(_, v)| v)
                        .expect("path presence already verified above")
                })
                .collect();
            by_fingerprint.insert(fingerprint_key(&tuple), path.clone());
        }

        let mut by_field_index = HashMap::new();
        for (index, field) in schema.fields.iter().enumerate() {
            let tuple: Vec<serde_json::Value> =
                samples.iter().map(|s| (field.sample_get)(s)).collect();
            let tuple_refs: Vec<&serde_json::Value> = tuple.iter().collect();
            let key = fingerprint_key(&tuple_refs);
            let path = by_fingerprint.get(&key).cloned().ok_or(
                ReflectionError::FieldPathNotFound {
                    type_name: schema.type_name,
                    field: field.name,
                },
            )?;
            by_field_index.insert(index, path);
        }

        Ok(FieldPathMapper {
            type_name: schema.type_name,
            by_field_index,
        })
    }

    /// Looks up the property path for a declared [`FieldPath`]. Returns a
    /// `NestedFieldPathNotImplemented` error when the path resolves below
    /// the top level; the query builder only accepts whole columns.
    pub fn resolve<T, V>(&self, field: &FieldPath<T, V>) -> Result<&PropertyPath, ReflectionError> {
        let path = self
            .by_field_index
            .get(&field.index)
            .expect("FieldPath indices are only constructed for declared schema fields");
        if !path.is_column() {
            return Err(ReflectionError::NestedFieldPathNotImplemented {
                type_name: self.type_name,
                path: path.clone(),
            });
        }
        Ok(path)
    }

    pub fn column_name<T, V>(&self, field: &FieldPath<T, V>) -> Result<&str, ReflectionError> {
        self.resolve(field)
            .map(|p| p.head().expect("resolve() already rejected non-column paths"))
    }
}

fn fingerprint_key(values: &[&serde_json::Value]) -> String {
    serde_json::to_string(values).expect("serde_json::Value always serialises")
}
