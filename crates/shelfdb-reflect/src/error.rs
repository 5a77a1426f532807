use shelfdb_value::PropertyPath;

/// Errors raised while reflecting a record type's encoded shape. These
/// are fatal for the affected type but never poison the database handle.
#[derive(thiserror::Error, Debug)]
pub enum ReflectionError {
    #[error("{type_name}: record type declares no fields")]
    NoSamples { type_name: &'static str },

    #[error(
        "{type_name}: sample instance {index} produced a different set of property paths than \
         the first sample; encoded form of a record must not vary in shape across values"
    )]
    InconsistentShape {
        type_name: &'static str,
        index: usize,
    },

    #[error(
        "{type_name}.{field}: field path cannot be mapped to a property; subscript paths into \
         arrays/dictionaries are not supported"
    )]
    FieldPathNotFound {
        type_name: &'static str,
        field: &'static str,
    },

    #[error(
        "{type_name}.{field}: collation is configured more than once ({first} and {second})"
    )]
    DuplicateCollation {
        type_name: &'static str,
        field: &'static str,
        first: String,
        second: String,
    },

    #[error(
        "{type_name}.{field}: `no_default_unique_id` cannot be combined with an explicit unique index"
    )]
    NoDefaultUniqueIdWithUniqueIndex {
        type_name: &'static str,
        field: &'static str,
    },

    #[error("{type_name}.{field}: `no_default_unique_id` is only valid on the identity field")]
    NoDefaultUniqueIdOnNonIdentity {
        type_name: &'static str,
        field: &'static str,
    },

    #[error(
        "{type_name}: field path at {path} resolves to a nested JSON location, which the query \
         builder does not implement"
    )]
    NestedFieldPathNotImplemented {
        type_name: &'static str,
        path: PropertyPath,
    },

    #[error("{type_name}: {reason}")]
    DecodingError {
        type_name: &'static str,
        reason: String,
    },
}
