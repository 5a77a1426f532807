use std::collections::HashMap;

use shelfdb_value::DbValue;

use crate::connection::DbConnection;
use crate::error::Error;
use crate::value_bridge::{bind_value, value_ref_to_db_value};

/// A prepared statement bound to a connection's lifetime, with lazily
/// built column-name and parameter-name lookup maps.
///
/// `query()` does not return `rusqlite::Rows` directly: `Rows<'stmt>`
/// borrows from the `Statement<'stmt>` it was produced from, so storing
/// both in one struct would be self-referential. Instead `query()` hands
/// back a short-lived [`RowCursor`] tied to `&mut self` that materialises
/// each row into owned [`DbValue`]s as it's stepped, so nothing ever
/// borrows across the boundary.
pub struct Stmt<'conn> {
    inner: rusqlite::Statement<'conn>,
    sql: String,
    columns: Option<HashMap<String, usize>>,
    parameters: Option<HashMap<String, usize>>,
}

impl<'conn> Stmt<'conn> {
    pub fn prepare(conn: &'conn DbConnection, sql: &str) -> Result<Self, Error> {
        tracing::trace!(sql, "preparing statement");
        let inner = conn
            .raw()
            .prepare(sql)
            .map_err(|err| Error::sqlite(err, sql))?;
        Ok(Stmt {
            inner,
            sql: sql.to_string(),
            columns: None,
            parameters: None,
        })
    }

    pub fn column_names(&self) -> Vec<String> {
        self.inner
            .column_names()
            .into_iter()
            .map(|s| s.to_string())
            .collect()
    }

    /// The 0-based result column holding `name`.
    pub fn column_index(&mut self, name: &str) -> Result<usize, Error> {
        let columns = self.columns.get_or_insert_with(|| {
            self.inner
                .column_names()
                .into_iter()
                .enumerate()
                .map(|(index, column)| (column.to_string(), index))
                .collect()
        });
        columns
            .get(name)
            .copied()
            .ok_or_else(|| Error::NoSuchColumn(name.to_string()))
    }

    /// Rebinds every declared parameter to null, so a reused statement
    /// never carries a stale value forward into its next execution.
    fn clear_bindings(&mut self) -> Result<(), Error> {
        for index in 1..=self.inner.parameter_count() {
            self.inner
                .raw_bind_parameter(index, None::<bool>)
                .map_err(|err| Error::sqlite(err, &self.sql))?;
        }
        Ok(())
    }

    /// Binds `value` at the 0-based positional parameter `index`. Binding
    /// position 0 clears every previous binding first.
    pub fn bind(&mut self, index: usize, value: &DbValue) -> Result<(), Error> {
        if index == 0 {
            self.clear_bindings()?;
        }
        bind_value(&mut self.inner, index, value).map_err(|err| Error::sqlite(err, &self.sql))
    }

    pub fn bind_all(&mut self, values: &[DbValue]) -> Result<(), Error> {
        self.clear_bindings()?;
        for (index, value) in values.iter().enumerate() {
            bind_value(&mut self.inner, index, value)
                .map_err(|err| Error::sqlite(err, &self.sql))?;
        }
        Ok(())
    }

    /// Binds `value` to the named parameter `name` (including its `:`
    /// prefix). An unknown name reports the closest declared parameter.
    pub fn bind_named(&mut self, name: &str, value: &DbValue) -> Result<(), Error> {
        if self.parameters.is_none() {
            let map = (1..=self.inner.parameter_count())
                .filter_map(|index| {
                    self.inner
                        .parameter_name(index)
                        .map(|n| (n.to_string(), index))
                })
                .collect();
            self.parameters = Some(map);
        }
        let parameters = self.parameters.as_ref().expect("initialised above");

        let index = match parameters.get(name) {
            Some(index) => *index,
            None => {
                let closest = parameters
                    .keys()
                    .map(|declared| (strsim::osa_distance(name, declared), declared))
                    .min()
                    .map(|(_, declared)| declared.clone())
                    .unwrap_or_default();
                return Err(Error::NoSuchParameter {
                    name: name.to_string(),
                    closest,
                });
            }
        };

        bind_value(&mut self.inner, index - 1, value)
            .map_err(|err| Error::sqlite(err, &self.sql))
    }

    /// Binds every `(name, value)` pair after clearing previous bindings,
    /// so an absent field binds null rather than inheriting a stale value.
    pub fn bind_all_named(&mut self, values: &[(String, DbValue)]) -> Result<(), Error> {
        self.clear_bindings()?;
        for (name, value) in values {
            self.bind_named(name, value)?;
        }
        Ok(())
    }

    /// Executes a statement with no result rows expected (INSERT/UPDATE/
    /// DELETE/DDL), returning the number of rows changed.
    pub fn execute(&mut self) -> Result<usize, Error> {
        self.inner
            .raw_execute()
            .map_err(|err| Error::sqlite(err, &self.sql))
    }

    pub fn query(&mut self) -> RowCursor<'_> {
        RowCursor {
            rows: self.inner.raw_query(),
            sql: &self.sql,
            done: false,
        }
    }
}

/// Steps through a statement's result rows one at a time, materialising
/// each into an owned `Vec<DbValue>` immediately so the cursor never
/// exposes a borrow that outlives a single `next_row` call. Stepping past
/// the final `None` is an error, matching the engine's own contract that
/// a finished statement must be reset before it's stepped again.
pub struct RowCursor<'s> {
    rows: rusqlite::Rows<'s>,
    sql: &'s str,
    done: bool,
}

impl<'s> RowCursor<'s> {
    pub fn next_row(&mut self) -> Result<Option<Vec<DbValue>>, Error> {
        if self.done {
            return Err(Error::AlreadyDone);
        }
        let row = match self
            .rows
            .next()
            .map_err(|err| Error::sqlite(err, self.sql))?
        {
            Some(row) => row,
            None => {
                self.done = true;
                return Ok(None);
            }
        };

        let column_count = row.as_ref().column_count();
        let mut values = Vec::with_capacity(column_count);
        for index in 0..column_count {
            let value_ref = row
                .get_ref(index)
                .map_err(|err| Error::sqlite(err, self.sql))?;
            values.push(value_ref_to_db_value(value_ref));
        }
        Ok(Some(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binds_and_reads_back_a_row() {
        let conn = DbConnection::open_in_memory().unwrap();
        conn.execute_batch("create table t (a integer, b text);")
            .unwrap();

        let mut insert = Stmt::prepare(&conn, "insert into t (a, b) values (?1, ?2)").unwrap();
        insert
            .bind_all(&[DbValue::Integer(7), DbValue::Text("hi".into())])
            .unwrap();
        insert.execute().unwrap();

        let mut select = Stmt::prepare(&conn, "select a, b from t").unwrap();
        let mut cursor = select.query();
        let row = cursor.next_row().unwrap().unwrap();
        assert_eq!(row, vec![DbValue::Integer(7), DbValue::Text("hi".into())]);
        assert!(cursor.next_row().unwrap().is_none());
    }

    #[test]
    fn stepping_past_done_is_an_error() {
        let conn = DbConnection::open_in_memory().unwrap();
        let mut stmt = Stmt::prepare(&conn, "select 1 where 1 = 0").unwrap();
        let mut cursor = stmt.query();
        assert!(cursor.next_row().unwrap().is_none());
        assert!(matches!(cursor.next_row(), Err(Error::AlreadyDone)));
    }

    #[test]
    fn named_binding_reports_the_closest_parameter_on_a_miss() {
        let conn = DbConnection::open_in_memory().unwrap();
        conn.execute_batch("create table t (title text);").unwrap();

        let mut stmt =
            Stmt::prepare(&conn, "insert into t (title) values (:title)").unwrap();
        stmt.bind_named(":title", &DbValue::Text("ok".into())).unwrap();
        stmt.execute().unwrap();

        let mut stmt =
            Stmt::prepare(&conn, "insert into t (title) values (:title)").unwrap();
        let err = stmt
            .bind_named(":titel", &DbValue::Text("typo".into()))
            .unwrap_err();
        match err {
            Error::NoSuchParameter { name, closest } => {
                assert_eq!(name, ":titel");
                assert_eq!(closest, ":title");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rebinding_clears_previous_values() {
        let conn = DbConnection::open_in_memory().unwrap();
        let mut stmt = Stmt::prepare(&conn, "select ?1, ?2").unwrap();
        stmt.bind_all(&[DbValue::Integer(1), DbValue::Integer(2)])
            .unwrap();
        {
            let mut cursor = stmt.query();
            cursor.next_row().unwrap();
        }
        // A shorter re-bind must not leave ?2 holding the old value.
        stmt.bind_all(&[DbValue::Integer(9)]).unwrap();
        let mut cursor = stmt.query();
        let row = cursor.next_row().unwrap().unwrap();
        assert_eq!(row, vec![DbValue::Integer(9), DbValue::Null]);
    }

    #[test]
    fn column_index_is_by_name() {
        let conn = DbConnection::open_in_memory().unwrap();
        let mut stmt = Stmt::prepare(&conn, "select 1 as a, 2 as b").unwrap();
        assert_eq!(stmt.column_index("b").unwrap(), 1);
        assert!(matches!(
            stmt.column_index("missing"),
            Err(Error::NoSuchColumn(_))
        ));
    }
}
