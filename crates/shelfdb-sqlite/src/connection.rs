use crate::collation::{Collations, Comparator};
use crate::error::Error;

/// A single SQLite connection plus the collation registry installed on it.
///
/// Opening sets WAL journaling and installs the built-in collations
/// exactly once.
pub struct DbConnection {
    conn: rusqlite::Connection,
    collations: Collations,
}

impl DbConnection {
    pub fn open(path: &str) -> Result<Self, Error> {
        let conn =
            rusqlite::Connection::open(path).map_err(|err| Error::sqlite(err, "open"))?;
        Self::from_raw(conn)
    }

    pub fn open_in_memory() -> Result<Self, Error> {
        let conn = rusqlite::Connection::open_in_memory()
            .map_err(|err| Error::sqlite(err, "open_in_memory"))?;
        Self::from_raw(conn)
    }

    /// Opens a named, shared-cache in-memory database: every connection
    /// opened with the same `name` sees the same data, unlike plain
    /// `open_in_memory`, whose `:memory:` database is private to the
    /// connection that created it. Used by [`crate::Pool`] so its read
    /// pool and write connection agree on one in-memory database.
    pub fn open_shared_memory(name: &str) -> Result<Self, Error> {
        let uri = format!("file:{name}?mode=memory&cache=shared");
        let flags = rusqlite::OpenFlags::default() | rusqlite::OpenFlags::SQLITE_OPEN_URI;
        let conn = rusqlite::Connection::open_with_flags(&uri, flags)
            .map_err(|err| Error::sqlite(err, "open_shared_memory"))?;
        Self::from_raw(conn)
    }

    fn from_raw(conn: rusqlite::Connection) -> Result<Self, Error> {
        // An in-memory database reports `memory` here instead of `wal`;
        // either way the pragma returns a row, which is discarded.
        conn.query_row("PRAGMA journal_mode = WAL", [], |_row| Ok(()))
            .map_err(|err| Error::sqlite(err, "PRAGMA journal_mode = WAL"))?;

        let collations = Collations::new();
        collations.install_builtins(&conn)?;

        Ok(DbConnection { conn, collations })
    }

    /// Marks the connection read-only at the SQLite level. Set once at
    /// open for connections destined for the read pool; never toggled
    /// per statement.
    pub fn set_query_only(&self, query_only: bool) -> Result<(), Error> {
        self.conn
            .execute_batch(&format!("PRAGMA query_only = {};", query_only as i32))
            .map_err(|err| Error::sqlite(err, "PRAGMA query_only"))
    }

    pub fn install_collation(&self, name: &str, compare: Comparator) -> Result<(), Error> {
        self.collations.install(&self.conn, name, compare)
    }

    pub fn has_collation(&self, name: &str) -> bool {
        self.collations.is_installed(name)
    }

    pub fn raw(&self) -> &rusqlite::Connection {
        &self.conn
    }

    pub fn execute_batch(&self, sql: &str) -> Result<(), Error> {
        self.conn
            .execute_batch(sql)
            .map_err(|err| Error::sqlite(err, sql))
    }
}
