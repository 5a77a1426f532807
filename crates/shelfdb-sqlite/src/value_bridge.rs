use shelfdb_value::DbValue;

/// Binds `value` at the 1-indexed SQLite parameter `index` of a prepared,
/// not-yet-executed statement.
///
/// `DbValue` is foreign to this crate with respect to `rusqlite::ToSql`, and
/// `rusqlite`'s types are foreign with respect to `DbValue`, so the two are
/// bridged here with free functions rather than trait impls, dispatching on
/// the value's tag.
pub fn bind_value(
    stmt: &mut rusqlite::Statement<'_>,
    index: usize,
    value: &DbValue,
) -> rusqlite::Result<()> {
    match value {
        DbValue::Null => stmt.raw_bind_parameter(index + 1, None::<bool>),
        DbValue::Integer(i) => stmt.raw_bind_parameter(index + 1, *i),
        DbValue::Real(f) => stmt.raw_bind_parameter(index + 1, *f),
        DbValue::Text(s) => stmt.raw_bind_parameter(index + 1, s),
        DbValue::Blob(b) => stmt.raw_bind_parameter(index + 1, b),
    }
}

/// Converts a row's column value back into the tagged representation. Every
/// SQLite storage class maps onto exactly one `DbValue` variant; whether a
/// text column holds encoded JSON is the structured codec's concern, not
/// this layer's.
pub fn value_ref_to_db_value(value: rusqlite::types::ValueRef<'_>) -> DbValue {
    use rusqlite::types::ValueRef;

    match value {
        ValueRef::Null => DbValue::Null,
        ValueRef::Integer(i) => DbValue::Integer(i),
        ValueRef::Real(f) => DbValue::Real(f),
        ValueRef::Text(s) => DbValue::Text(String::from_utf8_lossy(s).into_owned()),
        ValueRef::Blob(b) => DbValue::Blob(b.to_vec()),
    }
}
