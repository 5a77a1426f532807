use base64::Engine;

use shelfdb_value::DbValue;

use crate::error::Error;

/// Converts a single encoded-tree leaf into a tagged database value.
/// Composite leaves (arrays/objects) fall back to JSON text.
pub fn json_to_db_value(value: &serde_json::Value) -> DbValue {
    match value {
        serde_json::Value::Null => DbValue::Null,
        serde_json::Value::Bool(b) => DbValue::Integer(if *b { 1 } else { 0 }),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                DbValue::Integer(i)
            } else if let Some(u) = n.as_u64() {
                DbValue::Integer(u as i64)
            } else {
                DbValue::Real(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => DbValue::Text(s.clone()),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
            DbValue::Text(value.to_string())
        }
    }
}

/// Inverse of [`json_to_db_value`]. Text bracketed by a leading/trailing
/// `{}`/`[]` pair is parsed back into a nested value; anything else
/// round-trips as a JSON string. Blobs have no literal encoded-tree
/// representation, so they surface as base64 text.
pub fn db_value_to_json(value: &DbValue) -> serde_json::Value {
    match value {
        DbValue::Null => serde_json::Value::Null,
        DbValue::Integer(i) => serde_json::Value::Number((*i).into()),
        DbValue::Real(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        DbValue::Text(s) => {
            let bytes = s.as_bytes();
            let looks_nested = matches!(
                (bytes.first(), bytes.last()),
                (Some(b'{'), Some(b'}')) | (Some(b'['), Some(b']'))
            );
            if looks_nested {
                if let Ok(parsed) = serde_json::from_str(s) {
                    return parsed;
                }
            }
            serde_json::Value::String(s.clone())
        }
        DbValue::Blob(b) => {
            serde_json::Value::String(base64::engine::general_purpose::STANDARD.encode(b))
        }
    }
}

/// Encodes a record's top-level fields for statement binding and
/// materialises rows back into records, through the record's own
/// `Serialize`/`Deserialize` implementation: every top-level key becomes
/// a column, and values round-trip through the encoded-tree leaf
/// conversion above.
pub struct RecordCodec;

impl RecordCodec {
    /// Encodes `record`'s root fields into one `DbValue` per requested
    /// `columns` entry, in order. A field absent from the record's
    /// current encoding (e.g. an `Option<T>` introduced by a later
    /// migration) binds `null` explicitly.
    pub fn encode<T: serde::Serialize>(
        record: &T,
        columns: &[String],
    ) -> Result<Vec<DbValue>, Error> {
        let encoded = serde_json::to_value(record)?;
        let object = encoded.as_object().ok_or_else(|| {
            Error::Misuse("record type must encode to a JSON object at its root".to_string())
        })?;

        Ok(columns
            .iter()
            .map(|column| {
                json_to_db_value(object.get(column).unwrap_or(&serde_json::Value::Null))
            })
            .collect())
    }

    /// Decodes one row into a record of type `T`, given its column names
    /// in the same order as `values`. Either the whole record decodes or
    /// a `Coding` error surfaces; a partial record never leaks out.
    ///
    /// Failure messages start with the stable prefix
    /// `Error thrown from <Type>.init`, so applications can pattern-match
    /// on which record type refused a row.
    pub fn decode<T: serde::de::DeserializeOwned>(
        columns: &[String],
        values: &[DbValue],
    ) -> Result<T, Error> {
        let mut object = serde_json::Map::new();
        for (column, value) in columns.iter().zip(values) {
            object.insert(column.clone(), db_value_to_json(value));
        }
        serde_json::from_value(serde_json::Value::Object(object)).map_err(|err| {
            let type_name = std::any::type_name::<T>()
                .rsplit("::")
                .next()
                .unwrap_or("record");
            Error::Coding {
                path: columns.join(","),
                message: format!("Error thrown from {type_name}.init: {err}"),
            }
        })
    }
}
