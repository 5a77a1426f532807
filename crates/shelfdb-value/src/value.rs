use std::fmt;

/// The tagged database value that crosses the SQLite boundary. Every leaf
/// of a record is encoded to one of these before binding, and every
/// column read back is decoded from one of these.
///
/// Unsigned 64-bit integers are stored by bit-reinterpretation into
/// signed 64-bit (`u64::MAX` round-trips as `-1i64`); this is the only
/// representation that does not literally preserve the numeric value,
/// only its bit pattern.
#[derive(Debug, Clone, PartialEq)]
pub enum DbValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl DbValue {
    pub fn is_null(&self) -> bool {
        matches!(self, DbValue::Null)
    }

    /// Renders the value as a SQL literal, the form an SQL logger
    /// interpolates into logged statement text.
    pub fn render_sql_literal(&self) -> String {
        match self {
            DbValue::Null => "NULL".to_string(),
            DbValue::Integer(i) => i.to_string(),
            DbValue::Real(f) => f.to_string(),
            DbValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
            DbValue::Blob(b) => format!("x'{}'", hex_encode(b)),
        }
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    use fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{:02x}", b);
    }
    out
}

#[derive(thiserror::Error, Debug)]
pub enum ValueError {
    #[error("value {value:?} cannot be narrowed to {target} without loss")]
    LossyNarrowing { value: DbValue, target: &'static str },
    #[error("blob values cannot be decoded as text")]
    BlobAsText,
    #[error("{value:?} could not be decoded as {target}: {reason}")]
    Malformed {
        value: DbValue,
        target: &'static str,
        reason: String,
    },
}

/// Encodes a single leaf value into its tagged database representation.
/// Known primitives map directly onto a tag; composite leaves are the
/// structured codec's concern, which renders them as JSON text before
/// they reach this layer.
pub trait ToDbValue {
    fn to_db_value(&self) -> DbValue;
}

/// Decodes a tagged database value back into a leaf type. Numeric
/// narrowing is lossless-only; text-to-number coerces; blob-to-text never
/// does.
pub trait FromDbValue: Sized {
    fn from_db_value(value: &DbValue) -> Result<Self, ValueError>;
}

macro_rules! impl_signed_int {
    ($t:ty) => {
        impl ToDbValue for $t {
            fn to_db_value(&self) -> DbValue {
                DbValue::Integer(*self as i64)
            }
        }
        impl FromDbValue for $t {
            fn from_db_value(value: &DbValue) -> Result<Self, ValueError> {
                let i = as_i64(value)?;
                <$t>::try_from(i).map_err(|_| ValueError::LossyNarrowing {
                    value: value.clone(),
                    target: stringify!($t),
                })
            }
        }
    };
}

macro_rules! impl_unsigned_int {
    ($t:ty) => {
        impl ToDbValue for $t {
            fn to_db_value(&self) -> DbValue {
                DbValue::Integer(*self as i64)
            }
        }
        impl FromDbValue for $t {
            fn from_db_value(value: &DbValue) -> Result<Self, ValueError> {
                let i = as_i64(value)?;
                <$t>::try_from(i).map_err(|_| ValueError::LossyNarrowing {
                    value: value.clone(),
                    target: stringify!($t),
                })
            }
        }
    };
}

impl_signed_int!(i8);
impl_signed_int!(i16);
impl_signed_int!(i32);
impl_signed_int!(i64);
impl_unsigned_int!(u8);
impl_unsigned_int!(u16);
impl_unsigned_int!(u32);

// u64 is bit-reinterpreted into i64, not narrowed: it is the one integer
// type that round-trips by bit pattern rather than by numeric value.
impl ToDbValue for u64 {
    fn to_db_value(&self) -> DbValue {
        DbValue::Integer(*self as i64)
    }
}
impl FromDbValue for u64 {
    fn from_db_value(value: &DbValue) -> Result<Self, ValueError> {
        Ok(as_i64(value)? as u64)
    }
}

impl ToDbValue for bool {
    fn to_db_value(&self) -> DbValue {
        DbValue::Integer(if *self { 1 } else { 0 })
    }
}
impl FromDbValue for bool {
    fn from_db_value(value: &DbValue) -> Result<Self, ValueError> {
        Ok(as_i64(value)? != 0)
    }
}

impl ToDbValue for f32 {
    fn to_db_value(&self) -> DbValue {
        DbValue::Real(*self as f64)
    }
}
impl FromDbValue for f32 {
    fn from_db_value(value: &DbValue) -> Result<Self, ValueError> {
        Ok(as_f64(value)? as f32)
    }
}

impl ToDbValue for f64 {
    fn to_db_value(&self) -> DbValue {
        DbValue::Real(*self)
    }
}
impl FromDbValue for f64 {
    fn from_db_value(value: &DbValue) -> Result<Self, ValueError> {
        as_f64(value)
    }
}

impl ToDbValue for String {
    fn to_db_value(&self) -> DbValue {
        DbValue::Text(self.clone())
    }
}
impl ToDbValue for str {
    fn to_db_value(&self) -> DbValue {
        DbValue::Text(self.to_string())
    }
}
impl FromDbValue for String {
    fn from_db_value(value: &DbValue) -> Result<Self, ValueError> {
        match value {
            DbValue::Text(s) => Ok(s.clone()),
            DbValue::Integer(i) => Ok(i.to_string()),
            DbValue::Real(f) => Ok(f.to_string()),
            DbValue::Null => Ok(String::new()),
            DbValue::Blob(_) => Err(ValueError::BlobAsText),
        }
    }
}

impl ToDbValue for Vec<u8> {
    fn to_db_value(&self) -> DbValue {
        DbValue::Blob(self.clone())
    }
}
impl FromDbValue for Vec<u8> {
    fn from_db_value(value: &DbValue) -> Result<Self, ValueError> {
        match value {
            DbValue::Blob(b) => Ok(b.clone()),
            other => Err(ValueError::Malformed {
                value: other.clone(),
                target: "Vec<u8>",
                reason: "only blob columns decode to byte vectors".to_string(),
            }),
        }
    }
}

impl ToDbValue for uuid::Uuid {
    fn to_db_value(&self) -> DbValue {
        DbValue::Text(self.to_string())
    }
}
impl FromDbValue for uuid::Uuid {
    fn from_db_value(value: &DbValue) -> Result<Self, ValueError> {
        let text = as_text(value, "Uuid")?;
        uuid::Uuid::parse_str(&text).map_err(|err| ValueError::Malformed {
            value: value.clone(),
            target: "Uuid",
            reason: err.to_string(),
        })
    }
}

impl ToDbValue for url::Url {
    fn to_db_value(&self) -> DbValue {
        DbValue::Text(self.to_string())
    }
}
impl FromDbValue for url::Url {
    fn from_db_value(value: &DbValue) -> Result<Self, ValueError> {
        let text = as_text(value, "Url")?;
        url::Url::parse(&text).map_err(|err| ValueError::Malformed {
            value: value.clone(),
            target: "Url",
            reason: err.to_string(),
        })
    }
}

impl ToDbValue for time::OffsetDateTime {
    fn to_db_value(&self) -> DbValue {
        DbValue::Text(
            self.format(&time::format_description::well_known::Rfc3339)
                .expect("rfc3339 formatting never fails for OffsetDateTime"),
        )
    }
}
impl FromDbValue for time::OffsetDateTime {
    fn from_db_value(value: &DbValue) -> Result<Self, ValueError> {
        let text = as_text(value, "OffsetDateTime")?;
        time::OffsetDateTime::parse(&text, &time::format_description::well_known::Rfc3339)
            .map_err(|err| ValueError::Malformed {
                value: value.clone(),
                target: "OffsetDateTime",
                reason: err.to_string(),
            })
    }
}

impl<T: ToDbValue> ToDbValue for Option<T> {
    fn to_db_value(&self) -> DbValue {
        match self {
            Some(v) => v.to_db_value(),
            None => DbValue::Null,
        }
    }
}
impl<T: FromDbValue> FromDbValue for Option<T> {
    fn from_db_value(value: &DbValue) -> Result<Self, ValueError> {
        if value.is_null() {
            Ok(None)
        } else {
            Ok(Some(T::from_db_value(value)?))
        }
    }
}

fn as_i64(value: &DbValue) -> Result<i64, ValueError> {
    match value {
        DbValue::Integer(i) => Ok(*i),
        DbValue::Real(f) if f.fract() == 0.0 => Ok(*f as i64),
        DbValue::Text(s) => s.parse().map_err(|_| ValueError::Malformed {
            value: value.clone(),
            target: "integer",
            reason: format!("{s:?} is not an integer"),
        }),
        other => Err(ValueError::Malformed {
            value: other.clone(),
            target: "integer",
            reason: "value is not numeric".to_string(),
        }),
    }
}

fn as_f64(value: &DbValue) -> Result<f64, ValueError> {
    match value {
        DbValue::Real(f) => Ok(*f),
        DbValue::Integer(i) => Ok(*i as f64),
        DbValue::Text(s) => s.parse().map_err(|_| ValueError::Malformed {
            value: value.clone(),
            target: "float",
            reason: format!("{s:?} is not a number"),
        }),
        other => Err(ValueError::Malformed {
            value: other.clone(),
            target: "float",
            reason: "value is not numeric".to_string(),
        }),
    }
}

fn as_text(value: &DbValue, target: &'static str) -> Result<String, ValueError> {
    match value {
        DbValue::Text(s) => Ok(s.clone()),
        DbValue::Blob(_) => Err(ValueError::BlobAsText),
        other => Err(ValueError::Malformed {
            value: other.clone(),
            target,
            reason: "expected a text column".to_string(),
        }),
    }
}
