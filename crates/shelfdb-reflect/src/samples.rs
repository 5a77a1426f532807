use crate::error::ReflectionError;
use crate::schema::Schema;

/// Builds the sample-value grid: for `N` fields, `⌈log2(N+1)⌉` instances
/// such that every pair of distinct fields has at least one instance where
/// they encode to different values.
///
/// Instance `row` sets field `col` (0-indexed) to its "sample one" when
/// bit `row` of `col + 1` is set, and to "sample zero" otherwise. Because
/// `col + 1` ranges over `1..=N` and every value in that range has a
/// distinct binary representation within `⌈log2(N+1)⌉` bits, the
/// per-field bit-vector across rows is distinct for every field. Read
/// row-wise, row `r` flips runs of length `2^r`.
pub fn build_samples<T>(schema: &Schema<T>) -> Result<Vec<T>, ReflectionError> {
    let field_count = schema.fields.len();
    if field_count == 0 {
        return Err(ReflectionError::NoSamples {
            type_name: schema.type_name,
        });
    }

    let rows = row_count(field_count);
    let mut instances = Vec::with_capacity(rows);

    for row in 0..rows {
        let mut instance = (schema.blank)();
        for (col, field) in schema.fields.iter().enumerate() {
            let bit = ((col + 1) >> row) & 1;
            (field.sample_set)(&mut instance, bit == 1);
        }
        instances.push(instance);
    }

    Ok(instances)
}

fn row_count(field_count: usize) -> usize {
    // ceil(log2(field_count + 1))
    let mut rows = 0;
    while (1usize << rows) < field_count + 1 {
        rows += 1;
    }
    rows.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldConfig, SchemaBuilder};

    #[derive(Default, serde::Serialize)]
    struct Wide {
        a: i64,
        b: i64,
        c: i64,
        d: i64,
        e: i64,
    }

    fn schema() -> Schema<Wide> {
        let mut b = SchemaBuilder::new("Wide", "wide", Wide::default);
        b.field(
            "a",
            FieldConfig::new(),
            |r, one| r.a = crate::sample(one),
            |r| serde_json::json!(r.a),
        );
        b.field(
            "b",
            FieldConfig::new(),
            |r, one| r.b = crate::sample(one),
            |r| serde_json::json!(r.b),
        );
        b.field(
            "c",
            FieldConfig::new(),
            |r, one| r.c = crate::sample(one),
            |r| serde_json::json!(r.c),
        );
        b.field(
            "d",
            FieldConfig::new(),
            |r, one| r.d = crate::sample(one),
            |r| serde_json::json!(r.d),
        );
        b.field(
            "e",
            FieldConfig::new(),
            |r, one| r.e = crate::sample(one),
            |r| serde_json::json!(r.e),
        );
        b.build().unwrap()
    }

    #[test]
    fn row_count_matches_ceil_log2() {
        assert_eq!(row_count(1), 1);
        assert_eq!(row_count(3), 2);
        assert_eq!(row_count(4), 3);
        assert_eq!(row_count(7), 3);
        assert_eq!(row_count(8), 4);
    }

    #[test]
    fn every_pair_of_fields_differs_in_some_instance() {
        let schema = schema();
        let samples = build_samples(&schema).unwrap();
        assert_eq!(samples.len(), row_count(5));

        let fingerprints: Vec<Vec<i64>> = (0..5)
            .map(|field| samples.iter().map(|s| [s.a, s.b, s.c, s.d, s.e][field]).collect())
            .collect();

        for i in 0..fingerprints.len() {
            for j in (i + 1)..fingerprints.len() {
                assert_ne!(fingerprints[i], fingerprints[j], "fields {i} and {j} collide");
            }
        }
    }
}
