use std::cmp::Ordering;
use std::collections::HashSet;
use std::panic::UnwindSafe;
use std::sync::Mutex;

use caseless::Caseless;
use unicode_normalization::UnicodeNormalization;

use crate::error::Error;

/// A named comparison over text values. SQLite retains the boxed closure
/// for the lifetime of the connection once registered, so comparators
/// must own everything they capture.
pub type Comparator = Box<dyn Fn(&str, &str) -> Ordering + Send + Sync + UnwindSafe + 'static>;

/// The built-in collation names installed on every connection at open.
pub const BUILTIN_COLLATIONS: &[&str] = &[
    "binary",
    "string",
    "caseInsensitive",
    "localized",
    "localizedCaseInsensitive",
];

/// Per-connection registry of named comparison functions installed into
/// SQLite via `create_collation`. `rusqlite` pins the boxed closure
/// inside the connection once registered; this registry only tracks
/// which names have already been installed so a second registration is
/// a no-op. Bookkeeping lives behind a `Mutex` rather than requiring
/// `&mut self` so a collation can be installed on a connection shared
/// through a `&DbConnection`, e.g. an application-registered custom
/// collation installed across every pooled read connection.
pub struct Collations {
    installed: Mutex<HashSet<String>>,
}

impl Collations {
    pub fn new() -> Self {
        Collations {
            installed: Mutex::new(HashSet::new()),
        }
    }

    /// Installs the five built-in collations. Called once at connection
    /// open.
    pub fn install_builtins(&self, conn: &rusqlite::Connection) -> Result<(), Error> {
        self.install(conn, "binary", Box::new(|a, b| a.cmp(b)))?;
        self.install(conn, "string", Box::new(collated_cmp))?;
        self.install(
            conn,
            "caseInsensitive",
            Box::new(|a, b| {
                a.chars()
                    .flat_map(char::to_lowercase)
                    .cmp(b.chars().flat_map(char::to_lowercase))
            }),
        )?;
        self.install(conn, "localized", Box::new(normalized_cmp))?;
        self.install(conn, "localizedCaseInsensitive", Box::new(collated_cmp))?;
        Ok(())
    }

    /// Installs a custom collation under `name`, case-folded for lookup.
    /// A second install under the same (case-folded) name is a no-op.
    pub fn install(
        &self,
        conn: &rusqlite::Connection,
        name: &str,
        compare: Comparator,
    ) -> Result<(), Error> {
        let key = name.to_ascii_lowercase();
        let mut installed = self.installed.lock().unwrap();
        if installed.contains(&key) {
            return Ok(());
        }
        conn.create_collation(name, compare)
            .map_err(|err| Error::sqlite(err, format!("create_collation({name})")))?;
        installed.insert(key);
        Ok(())
    }

    pub fn is_installed(&self, name: &str) -> bool {
        self.installed
            .lock()
            .unwrap()
            .contains(&name.to_ascii_lowercase())
    }
}

impl Default for Collations {
    fn default() -> Self {
        Self::new()
    }
}

/// Map input characters into their collated form, which ignores casing
/// and is unicode-normalized, following the Unicode default caseless
/// matching recipe: NFD, default case fold, then NFKC.
fn collate<I>(i: I) -> impl Iterator<Item = char>
where
    I: Iterator<Item = char>,
{
    i.nfd().default_case_fold().nfkc()
}

/// Unicode normalize input characters without case-folding them.
fn normalize<I>(i: I) -> impl Iterator<Item = char>
where
    I: Iterator<Item = char>,
{
    i.nfd().nfkc()
}

/// The default `string` collation: caseless, normalization-insensitive
/// comparison, so `"e\u{0301}"` and `"\u{00e9}"` compare equal.
fn collated_cmp(a: &str, b: &str) -> Ordering {
    collate(a.chars()).cmp(collate(b.chars()))
}

/// The `localized` collation: normalization-insensitive but
/// case-sensitive.
fn normalized_cmp(a: &str, b: &str) -> Ordering {
    normalize(a.chars()).cmp(normalize(b.chars()))
}
