use itertools::Itertools;

use shelfdb_reflect::{FieldPath, Record, ReflectionError};
use shelfdb_sqlite::Stmt;
use shelfdb_value::{DbValue, ToDbValue};

use crate::codec::RecordCodec;
use crate::collection::Collection;
use crate::error::Error;
use crate::options::interpolate;

/// A filter comparison operator.
///
/// `Eq`/`Ne` against a `null` value are rewritten to `IsNull`/`IsNotNull`
/// at filter time, since SQL's `= NULL` is never true; the builder
/// never emits a bare equality comparison against `NULL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    NotLike,
    IsNull,
    IsNotNull,
}

impl Op {
    fn sql(self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::Ne => "<>",
            Op::Lt => "<",
            Op::Le => "<=",
            Op::Gt => ">",
            Op::Ge => ">=",
            Op::Like => "LIKE",
            Op::NotLike => "NOT LIKE",
            Op::IsNull | Op::IsNotNull => unreachable!("null checks are rendered separately"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nulls {
    First,
    Last,
}

struct Filter {
    column: String,
    collation: Option<String>,
    op: Op,
    value: Option<DbValue>,
}

struct Order {
    column: String,
    collation: Option<String>,
    direction: Direction,
    nulls: Option<Nulls>,
}

/// Accumulates filters, ordering, paging and pending updates against one
/// [`Collection`] and renders them into a single SQL statement when a
/// terminal method (`fetch_one`, `fetch_many`, `delete`, `update`) is
/// called. Field references are typed [`FieldPath`] accessors, resolved
/// to column names through the collection's mapper; a comparison without
/// an explicit collation renders with the field's default one.
pub struct QueryBuilder<'c, T: Record> {
    collection: &'c Collection<T>,
    filters: Vec<Filter>,
    orders: Vec<Order>,
    sets: Vec<(String, DbValue)>,
    limit: Option<i64>,
    offset: Option<i64>,
}

impl<'c, T: Record> QueryBuilder<'c, T> {
    pub(crate) fn new(collection: &'c Collection<T>) -> Self {
        QueryBuilder {
            collection,
            filters: Vec::new(),
            orders: Vec::new(),
            sets: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// Resolves a field accessor to its column, with the mapper's nested
    /// rejection surfaced as this layer's "not implemented".
    fn column_for<V>(&self, field: &FieldPath<T, V>) -> Result<(String, String), Error> {
        match self.collection.mapper().column_name(field) {
            Ok(column) => {
                let default_collation = self
                    .collection
                    .schema()
                    .field(field.index)
                    .config
                    .collation
                    .clone();
                Ok((column.to_string(), default_collation))
            }
            Err(ReflectionError::NestedFieldPathNotImplemented { .. }) => Err(
                Error::NotImplemented("filtering or ordering by a nested field path"),
            ),
            Err(err) => Err(err.into()),
        }
    }

    pub fn filter<V: ToDbValue>(self, field: FieldPath<T, V>, op: Op, value: V) -> Result<Self, Error> {
        self.filter_collated(field, op, value, None)
    }

    pub fn filter_collated<V: ToDbValue>(
        mut self,
        field: FieldPath<T, V>,
        op: Op,
        value: V,
        collation: Option<&str>,
    ) -> Result<Self, Error> {
        let (column, default_collation) = self.column_for(&field)?;
        let collation = collation.map(str::to_string).unwrap_or(default_collation);
        self.push_filter(column, collation, op, value.to_db_value());
        Ok(self)
    }

    /// Shortcut for equality on the identity field.
    pub fn filter_id<V: ToDbValue>(mut self, value: V) -> Result<Self, Error> {
        let schema = self.collection.schema();
        let identity = schema.identity().ok_or_else(|| {
            Error::Misuse(format!(
                "{} declares no identity field to filter by",
                schema.type_name
            ))
        })?;
        self.push_filter(
            identity.name.to_string(),
            identity.config.collation.clone(),
            Op::Eq,
            value.to_db_value(),
        );
        Ok(self)
    }

    fn push_filter(&mut self, column: String, collation: String, op: Op, value: DbValue) {
        let (op, value) = match (op, value.is_null()) {
            (Op::Eq, true) => (Op::IsNull, None),
            (Op::Ne, true) => (Op::IsNotNull, None),
            (op, _) => (op, Some(value)),
        };
        self.filters.push(Filter {
            column,
            collation: Some(collation),
            op,
            value,
        });
    }

    pub fn order_by<V>(self, field: FieldPath<T, V>, direction: Direction) -> Result<Self, Error> {
        self.order_by_collated(field, direction, None, None)
    }

    pub fn order_by_collated<V>(
        mut self,
        field: FieldPath<T, V>,
        direction: Direction,
        nulls: Option<Nulls>,
        collation: Option<&str>,
    ) -> Result<Self, Error> {
        let (column, default_collation) = self.column_for(&field)?;
        let collation = collation.map(str::to_string).unwrap_or(default_collation);
        self.orders.push(Order {
            column,
            collation: Some(collation),
            direction,
            nulls,
        });
        Ok(self)
    }

    pub fn limit(mut self, n: i64) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn offset(mut self, n: i64) -> Self {
        self.offset = Some(n);
        self
    }

    pub fn all(&self) -> Result<Vec<T>, Error> {
        self.fetch_many()
    }

    pub fn fetch_many(&self) -> Result<Vec<T>, Error> {
        let columns = self.collection.column_names();
        let (sql, params) = self.render_select(&columns);

        self.collection.pool().read(|conn| {
            let mut stmt = Stmt::prepare(conn, &sql)?;
            stmt.bind_all(&params)?;
            self.collection.logger().log(&interpolate(&sql, &params));
            let mut cursor = stmt.query();
            let mut out = Vec::new();
            while let Some(row) = cursor.next_row()? {
                out.push(RecordCodec::decode(&columns, &row)?);
            }
            Ok(out)
        })
    }

    /// Reads at most one row. Stops stepping the cursor the instant that
    /// row is read, so a later row in the result set that would fail to
    /// decode never runs through the codec and never surfaces an error.
    pub fn fetch_one(&self) -> Result<Option<T>, Error> {
        let columns = self.collection.column_names();
        let (sql, params) = self.render_select(&columns);

        self.collection.pool().read(|conn| {
            let mut stmt = Stmt::prepare(conn, &sql)?;
            stmt.bind_all(&params)?;
            self.collection.logger().log(&interpolate(&sql, &params));
            let mut cursor = stmt.query();
            match cursor.next_row()? {
                Some(row) => RecordCodec::decode(&columns, &row).map(Some),
                None => Ok(None),
            }
        })
    }

    pub fn delete(&self) -> Result<usize, Error> {
        let mut sql = format!("DELETE FROM \"{}\"", self.collection.schema().table_name);
        let mut params = Vec::new();
        self.render_where(&mut sql, &mut params);
        self.run_write(sql, params)
    }

    /// Queues one column assignment; terminal [`Self::apply_update`]
    /// turns the queued set into a single `UPDATE`.
    pub fn updating<V: ToDbValue>(mut self, field: FieldPath<T, V>, value: V) -> Result<Self, Error> {
        let (column, _) = self.column_for(&field)?;
        self.sets.push((column, value.to_db_value()));
        Ok(self)
    }

    /// Applies every queued [`Self::updating`] assignment to the rows the
    /// filters select.
    pub fn apply_update(&self) -> Result<usize, Error> {
        if self.sets.is_empty() {
            return Err(Error::Misuse(
                "apply_update called with no queued assignments".to_string(),
            ));
        }
        let assignments = self.sets.iter().map(|(column, _)| format!("\"{column}\" = ?")).join(", ");
        let mut sql = format!(
            "UPDATE \"{}\" SET {}",
            self.collection.schema().table_name,
            assignments
        );
        let mut params: Vec<DbValue> = self.sets.iter().map(|(_, value)| value.clone()).collect();
        self.render_where(&mut sql, &mut params);
        self.run_write(sql, params)
    }

    /// Single-column shortcut for [`Self::updating`] + [`Self::apply_update`].
    pub fn update<V: ToDbValue>(self, field: FieldPath<T, V>, value: V) -> Result<usize, Error> {
        self.updating(field, value)?.apply_update()
    }

    /// Runs a caller-supplied `SET` fragment (e.g. `"priceCents" = "priceCents" + ?`)
    /// against the rows this builder's filters select, for updates that
    /// don't fit the column-assignment shortcuts.
    pub fn update_with(&self, set_fragment: &str, set_params: &[DbValue]) -> Result<usize, Error> {
        let mut sql = format!(
            "UPDATE \"{}\" SET {}",
            self.collection.schema().table_name,
            set_fragment
        );
        let mut params = set_params.to_vec();
        self.render_where(&mut sql, &mut params);
        self.run_write(sql, params)
    }

    fn run_write(&self, sql: String, params: Vec<DbValue>) -> Result<usize, Error> {
        self.collection.pool().write(|guard| {
            let mut stmt = Stmt::prepare(guard.connection(), &sql)?;
            stmt.bind_all(&params)?;
            self.collection.logger().log(&interpolate(&sql, &params));
            Ok(stmt.execute()?)
        })
    }

    fn render_select(&self, columns: &[String]) -> (String, Vec<DbValue>) {
        let select_list = columns.iter().map(|c| format!("\"{c}\"")).join(", ");
        let mut sql = format!(
            "SELECT {select_list} FROM \"{}\"",
            self.collection.schema().table_name
        );
        let mut params = Vec::new();
        self.render_where(&mut sql, &mut params);
        self.render_order(&mut sql);
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }
        (sql, params)
    }

    fn render_where(&self, sql: &mut String, params: &mut Vec<DbValue>) {
        if self.filters.is_empty() {
            return;
        }
        sql.push_str(" WHERE ");
        let clauses = self
            .filters
            .iter()
            .map(|f| {
                let collate = f
                    .collation
                    .as_deref()
                    .map(|c| format!(" COLLATE \"{c}\""))
                    .unwrap_or_default();
                match f.op {
                    Op::IsNull => format!("\"{}\" IS NULL", f.column),
                    Op::IsNotNull => format!("\"{}\" IS NOT NULL", f.column),
                    _ => {
                        params.push(
                            f.value
                                .clone()
                                .expect("non-null-check filters always carry a bound value"),
                        );
                        format!("\"{}\"{} {} ?", f.column, collate, f.op.sql())
                    }
                }
            })
            .join(" AND ");
        sql.push_str(&clauses);
    }

    fn render_order(&self, sql: &mut String) {
        if self.orders.is_empty() {
            return;
        }
        sql.push_str(" ORDER BY ");
        let clauses = self
            .orders
            .iter()
            .map(|o| {
                let collate = o
                    .collation
                    .as_deref()
                    .map(|c| format!(" COLLATE \"{c}\""))
                    .unwrap_or_default();
                let direction = match o.direction {
                    Direction::Asc => "ASC",
                    Direction::Desc => "DESC",
                };
                let nulls = match o.nulls {
                    Some(Nulls::First) => " NULLS FIRST",
                    Some(Nulls::Last) => " NULLS LAST",
                    None => "",
                };
                format!("\"{}\"{} {}{}", o.column, collate, direction, nulls)
            })
            .join(", ");
        sql.push_str(&clauses);
    }
}
