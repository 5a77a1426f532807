/// Errors raised at the connection/statement layer. Engine failures keep
/// their SQLite result code and message verbatim, with the originating
/// SQL attached.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{message} (SQLite code {code:?}) while executing: {sql}")]
    Sqlite {
        code: Option<rusqlite::ErrorCode>,
        message: String,
        sql: String,
    },

    #[error("no column named {0:?} in the current row")]
    NoSuchColumn(String),

    #[error("no parameter named {name} in the prepared statement: did you mean {closest} ?")]
    NoSuchParameter { name: String, closest: String },

    #[error("statement produced no row")]
    NoRow,

    #[error("statement already exhausted: stepped again after Done without a reset")]
    AlreadyDone,

    #[error("misuse: {0}")]
    Misuse(String),
}

impl Error {
    pub fn sqlite(err: rusqlite::Error, sql: impl Into<String>) -> Self {
        let code = match &err {
            rusqlite::Error::SqliteFailure(ffi_err, _) => Some(ffi_err.code),
            _ => None,
        };
        Error::Sqlite {
            code,
            message: err.to_string(),
            sql: sql.into(),
        }
    }
}
