use std::sync::Arc;

use shelfdb_value::DbValue;

/// A sink for rendered SQL, invoked with the final statement text
/// (parameters already interpolated as literals) when a statement is
/// first stepped.
pub trait SqlLogger: Send + Sync {
    fn log(&self, sql: &str);
}

/// A logger that forwards to `tracing`, the default when none is
/// configured.
pub struct TracingSqlLogger;

impl SqlLogger for TracingSqlLogger {
    fn log(&self, sql: &str) {
        tracing::debug!(sql, "executed SQL statement");
    }
}

/// Database-wide configuration. The serializable fields can be
/// deserialized from an application's own config file; the logger is
/// runtime-only and always starts as [`TracingSqlLogger`] there.
#[derive(serde::Deserialize)]
pub struct Options {
    /// Run schema migrations (`CREATE TABLE` / `ALTER TABLE ADD COLUMN`)
    /// automatically when a collection is first opened. Disabling this
    /// means `collection(T)` fails if the live schema doesn't already
    /// match `T`.
    #[serde(default = "default_auto_migrate")]
    pub auto_migrate: bool,
    /// Permit `collection(T)` to drop columns that are no longer present
    /// on `T`, via a copy-rename rebuild. Strictly opt-in: destructive
    /// migration is never silent.
    #[serde(default)]
    pub auto_drop_columns: bool,
    /// Number of pooled read connections. The pool floors this at one,
    /// so reads can always make progress.
    #[serde(default = "default_read_pool_size")]
    pub read_pool_size: usize,
    /// Shared rather than boxed: a [`Collection`](crate::Collection) and
    /// the owning [`Database`](crate::Database) each keep their own
    /// handle to the same logger.
    #[serde(skip, default = "default_sql_logger")]
    pub sql_logger: Arc<dyn SqlLogger>,
}

fn default_auto_migrate() -> bool {
    true
}

fn default_read_pool_size() -> usize {
    4
}

fn default_sql_logger() -> Arc<dyn SqlLogger> {
    Arc::new(TracingSqlLogger)
}

impl Default for Options {
    fn default() -> Self {
        Options {
            auto_migrate: default_auto_migrate(),
            auto_drop_columns: false,
            read_pool_size: default_read_pool_size(),
            sql_logger: default_sql_logger(),
        }
    }
}

/// Replaces each positional `?` with the corresponding parameter rendered
/// as a SQL literal, producing the text handed to the [`SqlLogger`]. Only
/// for logging: the executed statement always binds parameters properly.
pub(crate) fn interpolate(sql: &str, params: &[DbValue]) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut params = params.iter();
    for ch in sql.chars() {
        match ch {
            '?' => match params.next() {
                Some(value) => out.push_str(&value.render_sql_literal()),
                None => out.push(ch),
            },
            ch => out.push(ch),
        }
    }
    out
}

/// Named-parameter variant of [`interpolate`]. A single left-to-right
/// pass over the statement text: each `:identifier` token is replaced at
/// most once, and substituted literals are never rescanned, so a text
/// parameter whose value happens to look like another parameter's token
/// stays a literal in the logged output.
pub(crate) fn interpolate_named(sql: &str, params: &[(String, DbValue)]) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut rest = sql;
    while let Some(colon) = rest.find(':') {
        out.push_str(&rest[..colon]);
        let after = &rest[colon..];
        let token_len = after[1..]
            .find(|c: char| !c.is_alphanumeric() && c != '_')
            .map(|len| len + 1)
            .unwrap_or(after.len());
        let token = &after[..token_len];
        match params.iter().find(|(name, _)| name == token) {
            Some((_, value)) => out.push_str(&value.render_sql_literal()),
            None => out.push_str(token),
        }
        rest = &after[token_len..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolation_renders_literals_in_order() {
        let sql = "INSERT INTO t (a, b) VALUES (?, ?)";
        let params = vec![DbValue::Integer(1), DbValue::Text("x'y".into())];
        assert_eq!(
            interpolate(sql, &params),
            "INSERT INTO t (a, b) VALUES (1, 'x''y')"
        );
    }

    #[test]
    fn named_interpolation_respects_token_boundaries() {
        let sql = "VALUES (:a, :ab)";
        let params = vec![
            (":a".to_string(), DbValue::Integer(1)),
            (":ab".to_string(), DbValue::Integer(2)),
        ];
        assert_eq!(interpolate_named(sql, &params), "VALUES (1, 2)");
    }

    #[test]
    fn named_interpolation_never_rescans_substituted_text() {
        // A value that is literally another parameter's token must stay
        // a quoted literal in the logged output.
        let sql = "VALUES (:a, :b)";
        let params = vec![
            (":a".to_string(), DbValue::Text(":b".into())),
            (":b".to_string(), DbValue::Integer(2)),
        ];
        assert_eq!(interpolate_named(sql, &params), "VALUES (':b', 2)");
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: Options = serde_json::from_str(r#"{"read_pool_size": 2}"#).unwrap();
        assert!(options.auto_migrate);
        assert!(!options.auto_drop_columns);
        assert_eq!(options.read_pool_size, 2);
    }
}
