use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::panic::RefUnwindSafe;
use std::sync::{Arc, Mutex};

use shelfdb_reflect::Record;
use shelfdb_sqlite::{DbConnection, Pool, Stmt, WriteGuard};
use shelfdb_value::{DbValue, FromDbValue};

use crate::codec::RecordCodec;
use crate::collection::Collection;
use crate::error::Error;
use crate::options::{interpolate, Options};

/// The handle opened once per backing SQLite file.
///
/// Collections are cached per record type behind their own mutex,
/// distinct from the pool's write lock, so looking one up never contends
/// with an in-flight transaction on another collection.
pub struct Database {
    pool: Arc<Pool>,
    options: Options,
    collections: Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl Database {
    pub fn open(path: &str, options: Options) -> Result<Self, Error> {
        let pool = Arc::new(Pool::open(path, options.read_pool_size)?);
        Ok(Database {
            pool,
            options,
            collections: Mutex::new(HashMap::new()),
        })
    }

    pub fn open_in_memory(options: Options) -> Result<Self, Error> {
        let pool = Arc::new(Pool::open_in_memory(options.read_pool_size)?);
        Ok(Database {
            pool,
            options,
            collections: Mutex::new(HashMap::new()),
        })
    }

    /// Returns the cached [`Collection`] for `T`, migrating its table and
    /// indices on first access (unless `auto_migrate` is disabled).
    pub fn collection<T: Record>(&self) -> Result<Collection<T>, Error> {
        let mut collections = self.collections.lock().unwrap();
        if let Some(existing) = collections.get(&TypeId::of::<T>()) {
            return Ok(existing
                .downcast_ref::<Collection<T>>()
                .expect("cache is keyed by TypeId::of::<T>()")
                .clone());
        }

        let collection = Collection::<T>::open(Arc::clone(&self.pool), &self.options)?;
        collections.insert(TypeId::of::<T>(), Arc::new(collection.clone()));
        Ok(collection)
    }

    /// Runs `f` inside a write transaction (or a nested savepoint, if
    /// called from within another `write`), committing on `Ok` and
    /// rolling back on `Err`.
    pub fn write<R>(&self, f: impl FnOnce(&WriteGuard) -> Result<R, Error>) -> Result<R, Error> {
        self.pool.write(f)
    }

    /// Runs `f` against a pooled read-only connection. Attempts to
    /// mutate inside `f` fail with the engine's readonly error.
    pub fn read<R>(&self, f: impl FnOnce(&DbConnection) -> Result<R, Error>) -> Result<R, Error> {
        self.pool.read(f)
    }

    /// Registers a custom collation across the write connection and the
    /// whole read pool, so statements naming it can run on any of them.
    pub fn install_collation<C>(&self, name: &str, compare: C) -> Result<(), Error>
    where
        C: Fn(&str, &str) -> std::cmp::Ordering + Send + Sync + RefUnwindSafe + 'static,
    {
        Ok(self.pool.install_collation(name, compare)?)
    }

    /// Runs raw SQL with no result rows expected, inside a write
    /// transaction, as an escape hatch for schema or data operations the
    /// typed collection API doesn't cover.
    pub fn execute(&self, sql: &str, params: &[DbValue]) -> Result<usize, Error> {
        self.pool.write(|guard| {
            let mut stmt = Stmt::prepare(guard.connection(), sql)?;
            stmt.bind_all(params)?;
            self.options.sql_logger.log(&interpolate(sql, params));
            Ok(stmt.execute()?)
        })
    }

    /// Runs a raw `SELECT` and decodes each row as `R`, keyed by the
    /// statement's own column names rather than any collection's schema.
    /// `R` may be a record type or a column-name-to-value map.
    pub fn query<R: serde::de::DeserializeOwned>(
        &self,
        sql: &str,
        params: &[DbValue],
    ) -> Result<Vec<R>, Error> {
        self.pool.read(|conn| {
            let mut stmt = Stmt::prepare(conn, sql)?;
            stmt.bind_all(params)?;
            self.options.sql_logger.log(&interpolate(sql, params));
            let columns = stmt.column_names();
            let mut cursor = stmt.query();
            let mut out = Vec::new();
            while let Some(row) = cursor.next_row()? {
                out.push(RecordCodec::decode(&columns, &row)?);
            }
            Ok(out)
        })
    }

    /// Like [`Database::query`], but insists on exactly one row and
    /// returns it directly.
    pub fn query_one<R: serde::de::DeserializeOwned>(
        &self,
        sql: &str,
        params: &[DbValue],
    ) -> Result<R, Error> {
        self.query(sql, params)?
            .into_iter()
            .next()
            .ok_or(Error::Sqlite(shelfdb_sqlite::Error::NoRow))
    }

    /// Runs a raw single-column `SELECT`, decoding each row's only value
    /// as the scalar `V`.
    pub fn query_scalar<V: FromDbValue>(
        &self,
        sql: &str,
        params: &[DbValue],
    ) -> Result<Vec<V>, Error> {
        self.pool.read(|conn| {
            let mut stmt = Stmt::prepare(conn, sql)?;
            stmt.bind_all(params)?;
            self.options.sql_logger.log(&interpolate(sql, params));
            if stmt.column_names().len() != 1 {
                return Err(Error::Misuse(
                    "query_scalar requires a single-column SELECT".to_string(),
                ));
            }
            let mut cursor = stmt.query();
            let mut out = Vec::new();
            while let Some(row) = cursor.next_row()? {
                out.push(V::from_db_value(&row[0])?);
            }
            Ok(out)
        })
    }
}
