use std::marker::PhantomData;

use crate::error::ReflectionError;

/// The kind of index a field should carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    None,
    Regular,
    Unique,
}

/// A field's configuration exactly as declared at schema-build time,
/// before the identity-field default and conflict rules are applied.
#[derive(Debug, Clone, Default)]
pub struct FieldConfig {
    collations: Vec<String>,
    index_regular: bool,
    index_unique: bool,
    no_default_unique_id: bool,
}

impl FieldConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unique(mut self) -> Self {
        self.index_unique = true;
        self
    }

    pub fn indexed(mut self) -> Self {
        self.index_regular = true;
        self
    }

    pub fn collation(mut self, name: impl Into<String>) -> Self {
        self.collations.push(name.into());
        self
    }

    pub fn no_default_unique_id(mut self) -> Self {
        self.no_default_unique_id = true;
        self
    }
}

/// The resolved per-field configuration: one collation, one index kind.
/// Unique wins over regular, and the identity field is implicitly unique
/// absent an override.
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedConfig {
    pub collation: String,
    pub index: IndexKind,
}

/// The default collation for every field: a case-folding, normalising
/// Unicode comparison.
pub const DEFAULT_COLLATION: &str = "string";

fn combine(
    type_name: &'static str,
    field: &'static str,
    is_identity: bool,
    raw: FieldConfig,
) -> Result<CombinedConfig, ReflectionError> {
    if raw.collations.len() > 1 {
        return Err(ReflectionError::DuplicateCollation {
            type_name,
            field,
            first: raw.collations[0].clone(),
            second: raw.collations[1].clone(),
        });
    }
    let collation = raw
        .collations
        .into_iter()
        .next()
        .unwrap_or_else(|| DEFAULT_COLLATION.to_string());

    let mut index = if raw.index_unique {
        IndexKind::Unique
    } else if raw.index_regular {
        IndexKind::Regular
    } else {
        IndexKind::None
    };

    if is_identity {
        if raw.no_default_unique_id && raw.index_unique {
            return Err(ReflectionError::NoDefaultUniqueIdWithUniqueIndex { type_name, field });
        }
        if !raw.no_default_unique_id && index == IndexKind::None {
            index = IndexKind::Unique;
        }
    } else if raw.no_default_unique_id {
        return Err(ReflectionError::NoDefaultUniqueIdOnNonIdentity { type_name, field });
    }

    Ok(CombinedConfig { collation, index })
}

/// A typed, compile-time selector denoting a top-level field of a record,
/// used in place of a column-name string everywhere the query builder
/// accepts a field reference.
///
/// `index` is the field's position within its [`Schema`]; `name` is kept
/// only for diagnostics (the schema's field order is authoritative, not
/// the name).
pub struct FieldPath<T, V> {
    pub index: usize,
    pub name: &'static str,
    marker: PhantomData<fn(&T) -> &V>,
}

impl<T, V> FieldPath<T, V> {
    pub const fn new(index: usize, name: &'static str) -> Self {
        FieldPath {
            index,
            name,
            marker: PhantomData,
        }
    }
}

impl<T, V> Clone for FieldPath<T, V> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T, V> Copy for FieldPath<T, V> {}

impl<T, V> std::fmt::Debug for FieldPath<T, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FieldPath({})", self.name)
    }
}

/// One field's full description within a [`Schema`]: its name, resolved
/// configuration, and a pair of accessors used only during reflection.
/// `sample_set` writes a zero/one sample into a blank instance and
/// `sample_get` reads the field's current encoded value back out.
pub struct FieldDescriptor<T> {
    pub name: &'static str,
    pub config: CombinedConfig,
    pub(crate) sample_set: fn(&mut T, bool),
    pub(crate) sample_get: fn(&T) -> serde_json::Value,
}

/// The reflected shape of a record type: its ordered fields and which one
/// (if any) is the identity field.
pub struct Schema<T> {
    pub type_name: &'static str,
    pub table_name: &'static str,
    pub identity_index: Option<usize>,
    pub fields: Vec<FieldDescriptor<T>>,
    pub(crate) blank: fn() -> T,
}

impl<T> Schema<T> {
    pub fn field(&self, index: usize) -> &FieldDescriptor<T> {
        &self.fields[index]
    }

    pub fn identity(&self) -> Option<&FieldDescriptor<T>> {
        self.identity_index.map(|i| &self.fields[i])
    }
}

/// A trait implemented (by hand, or by a future derive macro) for every
/// record type stored in a collection. It is the entry point the rest of
/// the library uses to reach a type's reflected shape.
pub trait Record: serde::Serialize + serde::de::DeserializeOwned + Sized + 'static {
    fn type_name() -> &'static str;

    fn schema() -> &'static Schema<Self>;
}

/// Builds a [`Schema`] by explicit, ordered field registration.
pub struct SchemaBuilder<T> {
    type_name: &'static str,
    table_name: &'static str,
    blank: fn() -> T,
    pending: Vec<PendingField<T>>,
    identity_name: Option<&'static str>,
}

struct PendingField<T> {
    name: &'static str,
    config: FieldConfig,
    sample_set: fn(&mut T, bool),
    sample_get: fn(&T) -> serde_json::Value,
}

impl<T> SchemaBuilder<T> {
    pub fn new(type_name: &'static str, table_name: &'static str, blank: fn() -> T) -> Self {
        SchemaBuilder {
            type_name,
            table_name,
            blank,
            pending: Vec::new(),
            identity_name: None,
        }
    }

    /// Registers a top-level field. `sample_get` must encode the field the
    /// same way [`crate::build_samples`] will later compare it: typically
    /// `|record| serde_json::to_value(&record.field).unwrap()`.
    pub fn field(
        &mut self,
        name: &'static str,
        config: FieldConfig,
        sample_set: fn(&mut T, bool),
        sample_get: fn(&T) -> serde_json::Value,
    ) -> &mut Self {
        self.pending.push(PendingField {
            name,
            config,
            sample_set,
            sample_get,
        });
        self
    }

    /// Marks `name` as the record's identity field. It is unique by
    /// default unless its `FieldConfig` carries `no_default_unique_id()`.
    pub fn identity(&mut self, name: &'static str) -> &mut Self {
        self.identity_name = Some(name);
        self
    }

    pub fn build(self) -> Result<Schema<T>, ReflectionError> {
        if self.pending.is_empty() {
            return Err(ReflectionError::NoSamples {
                type_name: self.type_name,
            });
        }

        let identity_index = self
            .identity_name
            .and_then(|name| self.pending.iter().position(|f| f.name == name));

        let mut fields = Vec::with_capacity(self.pending.len());
        for (index, pending) in self.pending.into_iter().enumerate() {
            let is_identity = identity_index == Some(index);
            let combined = combine(self.type_name, pending.name, is_identity, pending.config)?;
            fields.push(FieldDescriptor {
                name: pending.name,
                config: combined,
                sample_set: pending.sample_set,
                sample_get: pending.sample_get,
            });
        }

        Ok(Schema {
            type_name: self.type_name,
            table_name: self.table_name,
            identity_index,
            fields,
            blank: self.blank,
        })
    }
}
