use std::cell::UnsafeCell;
use std::cmp::Ordering;
use std::collections::VecDeque;
use std::panic::RefUnwindSafe;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::ThreadId;

use crate::connection::DbConnection;
use crate::error::Error;

/// A comparator shared across every connection of a [`Pool`]. Each
/// connection receives its own boxed closure delegating to the shared
/// one, since the engine pins one registration per connection.
pub type SharedComparator =
    Arc<dyn Fn(&str, &str) -> Ordering + Send + Sync + RefUnwindSafe + 'static>;

struct LockState {
    owner: Option<ThreadId>,
    depth: u32,
}

/// A reentrant write lock around a single SQLite connection.
///
/// `std::sync::Mutex` is not reentrant, so a naive `Mutex<DbConnection>`
/// would deadlock the moment a nested `write` call from the same thread
/// tried to re-enter. `WriteLock` tracks the owning thread and a
/// reentrancy depth itself, using the mutex only to guard that
/// bookkeeping, and reaches the connection through an `UnsafeCell` once
/// the caller is known to hold the lock. Depth 1 opens a transaction;
/// any deeper re-entry opens a savepoint nested inside it.
pub struct WriteLock {
    state: Mutex<LockState>,
    available: Condvar,
    conn: UnsafeCell<DbConnection>,
}

// SAFETY: `conn` is only dereferenced by the thread recorded as
// `state.owner`, and `state` serialises every change of that ownership,
// so no two threads ever observe `conn` at the same time.
unsafe impl Sync for WriteLock {}

impl WriteLock {
    pub fn new(conn: DbConnection) -> Self {
        WriteLock {
            state: Mutex::new(LockState {
                owner: None,
                depth: 0,
            }),
            available: Condvar::new(),
            conn: UnsafeCell::new(conn),
        }
    }

    /// Blocks until this thread owns the lock, then records one more
    /// level of reentrancy and returns the new depth.
    fn enter(&self) -> u32 {
        let this_thread = std::thread::current().id();
        let mut state = self.state.lock().unwrap();
        loop {
            match state.owner {
                Some(owner) if owner == this_thread => break,
                None => {
                    state.owner = Some(this_thread);
                    break;
                }
                Some(_) => {
                    state = self.available.wait(state).unwrap();
                }
            }
        }
        state.depth += 1;
        state.depth
    }

    fn exit(&self) {
        let mut state = self.state.lock().unwrap();
        state.depth -= 1;
        if state.depth == 0 {
            state.owner = None;
            self.available.notify_one();
        }
    }

    fn acquire(&self) -> Result<WriteGuard<'_>, Error> {
        let depth = self.enter();

        // SAFETY: this thread now owns the lock, at reentrancy `depth`.
        let conn = unsafe { &*self.conn.get() };
        let begun = if depth == 1 {
            conn.execute_batch("BEGIN IMMEDIATE;")
        } else {
            conn.execute_batch(&format!("SAVEPOINT sp_{depth};"))
        };
        if let Err(err) = begun {
            self.exit();
            return Err(err);
        }

        Ok(WriteGuard {
            lock: self,
            depth,
            finished: false,
        })
    }

    /// Runs `f` against the write connection without opening a
    /// transaction or savepoint, for administrative calls like
    /// installing a collation, which must still serialise against
    /// concurrent writers.
    fn with_connection<R>(&self, f: impl FnOnce(&DbConnection) -> R) -> R {
        self.enter();
        // Balances `enter` even if `f` unwinds, so a panicking caller
        // can't wedge the lock for every other thread.
        struct Exit<'lock>(&'lock WriteLock);
        impl Drop for Exit<'_> {
            fn drop(&mut self) {
                self.0.exit();
            }
        }
        let _exit = Exit(self);

        // SAFETY: this thread owns the lock until `_exit` drops.
        let conn = unsafe { &*self.conn.get() };
        f(conn)
    }

    fn release(&self, depth: u32, commit: bool) -> Result<(), Error> {
        // SAFETY: caller still owns the lock at `depth`; this runs before
        // ownership is released below.
        let conn = unsafe { &*self.conn.get() };
        let result = if depth == 1 {
            conn.execute_batch(if commit { "COMMIT;" } else { "ROLLBACK;" })
        } else if commit {
            conn.execute_batch(&format!("RELEASE sp_{depth};"))
        } else {
            conn.execute_batch(&format!("ROLLBACK TO sp_{depth}; RELEASE sp_{depth};"))
        };
        self.exit();
        result
    }
}

/// Held for the duration of one (possibly nested) write transaction.
/// Dropping without calling `finish` rolls back, so a panic or an early
/// `?` return out of the enclosing `write` closure can't leave the lock
/// held or the transaction half-applied.
pub struct WriteGuard<'lock> {
    lock: &'lock WriteLock,
    depth: u32,
    finished: bool,
}

impl<'lock> WriteGuard<'lock> {
    pub fn connection(&self) -> &DbConnection {
        // SAFETY: this guard is proof the calling thread holds the lock.
        unsafe { &*self.lock.conn.get() }
    }

    pub(crate) fn finish(mut self, commit: bool) -> Result<(), Error> {
        self.finished = true;
        self.lock.release(self.depth, commit)
    }
}

impl<'lock> Drop for WriteGuard<'lock> {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.lock.release(self.depth, false);
        }
    }
}

/// Owns the write connection and a fixed-size pool of read-only
/// connections. Writers serialise through [`WriteLock`]; readers check a
/// connection out of a `Condvar`-guarded queue and, with the database in
/// WAL mode, never block a concurrent writer or each other.
pub struct Pool {
    write_lock: WriteLock,
    read_pool: Mutex<VecDeque<DbConnection>>,
    read_available: Condvar,
    custom_collations: Mutex<Vec<(String, SharedComparator)>>,
}

impl Pool {
    pub fn open(path: &str, read_pool_size: usize) -> Result<Self, Error> {
        // At least one read connection, so checkout_read always has a
        // connection to hand out eventually.
        let read_pool_size = read_pool_size.max(1);
        let write_conn = DbConnection::open(path)?;

        let mut read_pool = VecDeque::with_capacity(read_pool_size);
        for _ in 0..read_pool_size {
            let conn = DbConnection::open(path)?;
            conn.set_query_only(true)?;
            read_pool.push_back(conn);
        }

        Ok(Pool {
            write_lock: WriteLock::new(write_conn),
            read_pool: Mutex::new(read_pool),
            read_available: Condvar::new(),
            custom_collations: Mutex::new(Vec::new()),
        })
    }

    /// Opens a write connection and `read_pool_size` read connections
    /// all pointing at the same shared-cache in-memory database, named
    /// uniquely per call so concurrent tests never collide.
    pub fn open_in_memory(read_pool_size: usize) -> Result<Self, Error> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let name = format!("shelfdb_mem_{}", COUNTER.fetch_add(1, Ordering::Relaxed));

        let read_pool_size = read_pool_size.max(1);
        let write_conn = DbConnection::open_shared_memory(&name)?;
        let mut read_pool = VecDeque::with_capacity(read_pool_size);
        for _ in 0..read_pool_size {
            let conn = DbConnection::open_shared_memory(&name)?;
            conn.set_query_only(true)?;
            read_pool.push_back(conn);
        }
        Ok(Pool {
            write_lock: WriteLock::new(write_conn),
            read_pool: Mutex::new(read_pool),
            read_available: Condvar::new(),
            custom_collations: Mutex::new(Vec::new()),
        })
    }

    /// Runs `f` inside a write transaction, committing on `Ok` and rolling
    /// back on `Err`. Reentrant: calling `write` again from inside `f` on
    /// the same thread opens a nested savepoint instead of deadlocking,
    /// and a failure inside the nested call rolls back only that
    /// savepoint.
    ///
    /// Generic over the closure's error type so a layer above this crate
    /// can run its own richer error type through `write` without first
    /// narrowing it to this crate's `Error`; it only needs `From<Error>`,
    /// the same bound `?` already relies on.
    pub fn write<T, E: From<Error>>(&self, f: impl FnOnce(&WriteGuard) -> Result<T, E>) -> Result<T, E> {
        let guard = self.write_lock.acquire().map_err(E::from)?;
        match f(&guard) {
            Ok(value) => {
                guard.finish(true).map_err(E::from)?;
                Ok(value)
            }
            Err(err) => {
                let _ = guard.finish(false);
                Err(err)
            }
        }
    }

    /// Registers a named collation on the write connection, every pooled
    /// read connection, and (via the registry) every read connection
    /// checked out later, so a statement that names the collation never
    /// steps on a connection missing it.
    pub fn install_collation<C>(&self, name: &str, compare: C) -> Result<(), Error>
    where
        C: Fn(&str, &str) -> Ordering + Send + Sync + RefUnwindSafe + 'static,
    {
        let shared: SharedComparator = Arc::new(compare);
        self.custom_collations
            .lock()
            .unwrap()
            .push((name.to_string(), Arc::clone(&shared)));

        self.write_lock.with_connection(|conn| {
            let delegate = Arc::clone(&shared);
            conn.install_collation(name, Box::new(move |a, b| delegate(a, b)))
        })?;

        let pool = self.read_pool.lock().unwrap();
        for conn in pool.iter() {
            let delegate = Arc::clone(&shared);
            conn.install_collation(name, Box::new(move |a, b| delegate(a, b)))?;
        }
        Ok(())
    }

    /// Runs `f` against a checked-out read connection, returning it to
    /// the pool when `f` completes (even on error). Generic over the
    /// error type for the same reason as [`Pool::write`].
    pub fn read<T, E: From<Error>>(&self, f: impl FnOnce(&DbConnection) -> Result<T, E>) -> Result<T, E> {
        let conn = self.checkout_read().map_err(E::from)?;
        let result = f(&conn);
        self.checkin_read(conn);
        result
    }

    /// Pops a read connection, first catching it up on any custom
    /// collations registered while it was checked out elsewhere.
    /// Re-installation of an already present name is a no-op.
    fn checkout_read(&self) -> Result<DbConnection, Error> {
        let conn = {
            let mut pool = self.read_pool.lock().unwrap();
            loop {
                if let Some(conn) = pool.pop_front() {
                    break conn;
                }
                pool = self.read_available.wait(pool).unwrap();
            }
        };

        let customs = self.custom_collations.lock().unwrap();
        for (name, shared) in customs.iter() {
            let delegate = Arc::clone(shared);
            conn.install_collation(name, Box::new(move |a, b| delegate(a, b)))?;
        }
        Ok(conn)
    }

    fn checkin_read(&self, conn: DbConnection) {
        let mut pool = self.read_pool.lock().unwrap();
        pool.push_back(conn);
        self.read_available.notify_one();
    }
}
