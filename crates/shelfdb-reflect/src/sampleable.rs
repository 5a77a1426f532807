/// A leaf type that can produce two observably distinct sample values.
///
/// Each leaf type opts in explicitly by implementing this trait; a schema
/// registration for a type with no impl fails to compile, naming the type,
/// rather than failing later at reflection time.
pub trait Sampleable: Sized {
    /// Returns a pair of values whose encoded JSON forms are never equal
    /// to one another, and (for types that could otherwise collide with
    /// the numeric/boolean/string conventions below) never equal to the
    /// literal `0`/`false`/`"0"` pair either.
    fn sample_values() -> (Self, Self);
}

macro_rules! impl_numeric_sample {
    ($t:ty) => {
        impl Sampleable for $t {
            fn sample_values() -> (Self, Self) {
                (0 as $t, 1 as $t)
            }
        }
    };
}

impl_numeric_sample!(i8);
impl_numeric_sample!(i16);
impl_numeric_sample!(i32);
impl_numeric_sample!(i64);
impl_numeric_sample!(u8);
impl_numeric_sample!(u16);
impl_numeric_sample!(u32);
impl_numeric_sample!(u64);
impl_numeric_sample!(f32);
impl_numeric_sample!(f64);

impl Sampleable for bool {
    fn sample_values() -> (Self, Self) {
        (false, true)
    }
}

impl Sampleable for String {
    fn sample_values() -> (Self, Self) {
        ("0".to_string(), "1".to_string())
    }
}

impl Sampleable for Vec<u8> {
    fn sample_values() -> (Self, Self) {
        (vec![0u8], vec![1u8, 1u8])
    }
}

impl Sampleable for uuid::Uuid {
    fn sample_values() -> (Self, Self) {
        (
            uuid::Uuid::from_u128(0x0000_0000_0000_0000_0000_0000_0000_0000),
            uuid::Uuid::from_u128(0x1111_1111_1111_1111_1111_1111_1111_1111),
        )
    }
}

impl Sampleable for url::Url {
    fn sample_values() -> (Self, Self) {
        (
            url::Url::parse("https://shelfdb.invalid/sample-0").unwrap(),
            url::Url::parse("https://shelfdb.invalid/sample-1").unwrap(),
        )
    }
}

impl Sampleable for time::OffsetDateTime {
    fn sample_values() -> (Self, Self) {
        (
            time::OffsetDateTime::from_unix_timestamp(0).unwrap(),
            time::OffsetDateTime::from_unix_timestamp(1).unwrap(),
        )
    }
}

impl<T: Sampleable> Sampleable for Option<T> {
    fn sample_values() -> (Self, Self) {
        let (zero, one) = T::sample_values();
        (Some(zero), Some(one))
    }
}

/// Picks one of `T`'s two registered sample values, the form a schema
/// registration's `sample_set` closure wants:
/// `|record, one| record.field = sample(one)`.
pub fn sample<T: Sampleable>(one: bool) -> T {
    let (zero, one_value) = T::sample_values();
    if one {
        one_value
    } else {
        zero
    }
}
