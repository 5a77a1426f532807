/// The top-level error surface. Engine errors, reflection errors, and
/// value coding errors each keep their own variant instead of being
/// flattened into one opaque string, so a caller can tell a constraint
/// violation from a record type that failed reflection.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Sqlite(#[from] shelfdb_sqlite::Error),

    #[error(transparent)]
    Reflection(#[from] shelfdb_reflect::ReflectionError),

    #[error("coding error at {path}: {message}")]
    Coding { path: String, message: String },

    #[error("{0}")]
    Misuse(String),

    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl From<shelfdb_value::ValueError> for Error {
    fn from(err: shelfdb_value::ValueError) -> Self {
        Error::Coding {
            path: String::new(),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Coding {
            path: String::new(),
            message: err.to_string(),
        }
    }
}
