use std::sync::Arc;

use itertools::Itertools;

use shelfdb_reflect::{FieldPathMapper, IndexKind, Record, Schema};
use shelfdb_sqlite::{DbConnection, Pool, Stmt};
use shelfdb_value::DbValue;

use crate::codec::RecordCodec;
use crate::error::Error;
use crate::options::{interpolate_named, Options, SqlLogger};
use crate::query::QueryBuilder;

/// What to do when an insert collides with a unique index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnConflict {
    /// Fail the statement and roll back the surrounding batch.
    #[default]
    Abort,
    /// Keep the existing row and skip the new one.
    Ignore,
    /// Replace the existing row with the new one.
    Replace,
}

impl OnConflict {
    fn insert_verb(self) -> &'static str {
        match self {
            OnConflict::Abort => "INSERT",
            OnConflict::Ignore => "INSERT OR IGNORE",
            OnConflict::Replace => "INSERT OR REPLACE",
        }
    }
}

/// The application-facing handle bundling a record type, its table, its
/// indices, and its cached reflection artefacts. Created once per
/// `(database, record type)` by [`crate::Database::collection`], which
/// caches the result.
pub struct Collection<T: Record> {
    schema: &'static Schema<T>,
    mapper: Arc<FieldPathMapper>,
    pool: Arc<Pool>,
    logger: Arc<dyn SqlLogger>,
}

impl<T: Record> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Collection {
            schema: self.schema,
            mapper: Arc::clone(&self.mapper),
            pool: Arc::clone(&self.pool),
            logger: Arc::clone(&self.logger),
        }
    }
}

impl<T: Record> Collection<T> {
    pub(crate) fn open(pool: Arc<Pool>, options: &Options) -> Result<Self, Error> {
        let schema = T::schema();
        let mapper = Arc::new(FieldPathMapper::build(schema)?);

        if options.auto_migrate {
            migrate(&pool, schema, options)?;
        }

        Ok(Collection {
            schema,
            mapper,
            pool,
            logger: Arc::clone(&options.sql_logger),
        })
    }

    pub fn schema(&self) -> &'static Schema<T> {
        self.schema
    }

    pub fn mapper(&self) -> &FieldPathMapper {
        &self.mapper
    }

    pub(crate) fn pool(&self) -> &Pool {
        &self.pool
    }

    pub(crate) fn logger(&self) -> &Arc<dyn SqlLogger> {
        &self.logger
    }

    pub(crate) fn column_names(&self) -> Vec<String> {
        self.schema.fields.iter().map(|f| f.name.to_string()).collect()
    }

    pub fn query(&self) -> QueryBuilder<'_, T> {
        QueryBuilder::new(self)
    }

    pub fn all(&self) -> Result<Vec<T>, Error> {
        self.query().fetch_many()
    }

    /// Inserts one record. A collision on a unique index (including the
    /// identity field's implicit one) surfaces as a constraint-violation
    /// error rather than silently overwriting.
    pub fn insert(&self, record: &T) -> Result<(), Error> {
        self.insert_many_with(std::slice::from_ref(record), OnConflict::Abort)
    }

    pub fn insert_with(&self, record: &T, on_conflict: OnConflict) -> Result<(), Error> {
        self.insert_many_with(std::slice::from_ref(record), on_conflict)
    }

    /// Inserts every record in one transaction: a single failing record
    /// rolls the whole batch back.
    pub fn insert_many(&self, records: &[T]) -> Result<(), Error> {
        self.insert_many_with(records, OnConflict::Abort)
    }

    pub fn insert_many_with(&self, records: &[T], on_conflict: OnConflict) -> Result<(), Error> {
        let columns = self.column_names();
        let sql = insert_sql(on_conflict.insert_verb(), self.schema.table_name, &columns);

        self.pool.write(|guard| {
            let mut stmt = Stmt::prepare(guard.connection(), &sql)?;
            for record in records {
                let bindings = self.bindings_for(record, &columns)?;
                stmt.bind_all_named(&bindings)?;
                self.logger.log(&interpolate_named(&sql, &bindings));
                stmt.execute()?;
            }
            Ok(())
        })
    }

    /// Inserts the record, or updates it in place if its identity value
    /// already exists. Falls back to a plain insert for record types
    /// with no declared identity field.
    pub fn save(&self, record: &T) -> Result<(), Error> {
        let Some(identity) = self.schema.identity() else {
            return self.insert(record);
        };

        let columns = self.column_names();
        let assignments = columns
            .iter()
            .filter(|c| c.as_str() != identity.name)
            .map(|c| format!("\"{c}\" = excluded.\"{c}\""))
            .join(", ");
        let sql = format!(
            "{} ON CONFLICT (\"{}\") DO UPDATE SET {}",
            insert_sql("INSERT", self.schema.table_name, &columns),
            identity.name,
            assignments,
        );

        self.pool.write(|guard| {
            let bindings = self.bindings_for(record, &columns)?;
            let mut stmt = Stmt::prepare(guard.connection(), &sql)?;
            stmt.bind_all_named(&bindings)?;
            self.logger.log(&interpolate_named(&sql, &bindings));
            stmt.execute()?;
            Ok(())
        })
    }

    /// Encodes `record` into `(parameter name, value)` pairs, one per
    /// column, the shape `Stmt::bind_all_named` wants. An absent field
    /// encodes (and therefore binds) an explicit null.
    fn bindings_for(&self, record: &T, columns: &[String]) -> Result<Vec<(String, DbValue)>, Error> {
        let values = RecordCodec::encode(record, columns)?;
        Ok(columns
            .iter()
            .zip(values)
            .map(|(column, value)| (format!(":{column}"), value))
            .collect())
    }
}

fn insert_sql(verb: &str, table_name: &str, columns: &[String]) -> String {
    let column_list = columns.iter().map(|c| format!("\"{c}\"")).join(", ");
    let parameters = columns.iter().map(|c| format!(":{c}")).join(", ");
    format!("{verb} INTO \"{table_name}\" ({column_list}) VALUES ({parameters})")
}

/// Creates or migrates the backing table and its indices for `T`. Runs
/// inside one write transaction so a crash mid-migration never leaves
/// the table half-altered.
fn migrate<T>(pool: &Pool, schema: &Schema<T>, options: &Options) -> Result<(), Error> {
    pool.write(|guard| {
        let conn = guard.connection();
        let ddl = DdlRunner {
            conn,
            logger: &options.sql_logger,
        };
        match table_columns(conn, schema.table_name)? {
            None => create_table(&ddl, schema)?,
            Some(existing) => {
                add_missing_columns(&ddl, schema, &existing)?;
                if options.auto_drop_columns {
                    drop_unknown_columns(&ddl, schema, &existing)?;
                }
            }
        }
        sync_indices(&ddl, schema)?;
        Ok(())
    })
}

/// Executes DDL while echoing it to the SQL logger; migration statements
/// carry no parameters, so the text logs as-is.
struct DdlRunner<'a> {
    conn: &'a DbConnection,
    logger: &'a Arc<dyn SqlLogger>,
}

impl DdlRunner<'_> {
    fn run(&self, sql: &str) -> Result<(), Error> {
        tracing::info!(sql, "applying schema migration");
        self.logger.log(sql);
        Ok(self.conn.execute_batch(sql)?)
    }
}

/// Returns `None` if the table does not exist yet; `PRAGMA table_info`
/// yields zero rows in that case.
fn table_columns(conn: &DbConnection, table_name: &str) -> Result<Option<Vec<String>>, Error> {
    let mut stmt = Stmt::prepare(conn, &format!("PRAGMA table_info(\"{table_name}\")"))?;
    let name_column = stmt.column_index("name")?;
    let mut cursor = stmt.query();
    let mut columns = Vec::new();
    while let Some(row) = cursor.next_row()? {
        if let Some(DbValue::Text(name)) = row.get(name_column) {
            columns.push(name.clone());
        }
    }
    Ok(if columns.is_empty() { None } else { Some(columns) })
}

fn create_table<T>(ddl: &DdlRunner, schema: &Schema<T>) -> Result<(), Error> {
    // Untyped column declarations: values keep the natural affinity of
    // whatever tag they were bound with.
    let columns = schema.fields.iter().map(|f| format!("\"{}\"", f.name)).join(", ");
    ddl.run(&format!(
        "CREATE TABLE \"{}\" ({});",
        schema.table_name, columns
    ))
}

fn add_missing_columns<T>(
    ddl: &DdlRunner,
    schema: &Schema<T>,
    existing: &[String],
) -> Result<(), Error> {
    for field in &schema.fields {
        if !existing.iter().any(|c| c == field.name) {
            ddl.run(&format!(
                "ALTER TABLE \"{}\" ADD COLUMN \"{}\";",
                schema.table_name, field.name
            ))?;
        }
    }
    Ok(())
}

/// Rebuilds the table keeping only the schema's declared columns, via a
/// copy-rename (SQLite has no portable `DROP COLUMN` across the versions
/// this library targets). Reached only when `auto_drop_columns` is set,
/// since it discards data in any column the current record type no
/// longer declares.
fn drop_unknown_columns<T>(
    ddl: &DdlRunner,
    schema: &Schema<T>,
    existing: &[String],
) -> Result<(), Error> {
    let desired: Vec<&str> = schema.fields.iter().map(|f| f.name).collect();
    let has_obsolete = existing.iter().any(|c| !desired.contains(&c.as_str()));
    if !has_obsolete {
        return Ok(());
    }

    let columns = desired.iter().map(|c| format!("\"{c}\"")).join(", ");
    let rebuilt = format!("{}__shelfdb_rebuild", schema.table_name);
    ddl.run(&format!(
        "ALTER TABLE \"{table}\" RENAME TO \"{rebuilt}\";\n\
         CREATE TABLE \"{table}\" ({columns});\n\
         INSERT INTO \"{table}\" ({columns}) SELECT {columns} FROM \"{rebuilt}\";\n\
         DROP TABLE \"{rebuilt}\";",
        table = schema.table_name,
        rebuilt = rebuilt,
        columns = columns,
    ))
}

/// Diffs the live indices against the schema's declared configuration.
/// Index names encode their configuration (`table-column-kind`, where
/// kind is `unique` or the collation name), so a configuration change
/// shows up as one obsolete name to drop and one missing name to create.
fn sync_indices<T>(ddl: &DdlRunner, schema: &Schema<T>) -> Result<(), Error> {
    let existing = existing_index_names(ddl.conn, schema.table_name)?;
    let mut desired_names = Vec::new();

    for field in &schema.fields {
        if field.config.index == IndexKind::None {
            continue;
        }
        let kind_label = if field.config.index == IndexKind::Unique {
            "unique".to_string()
        } else {
            field.config.collation.clone()
        };
        let index_name = format!("{}-{}-{}", schema.table_name, field.name, kind_label);
        desired_names.push(index_name.clone());

        if existing.contains(&index_name) {
            continue;
        }
        let unique_kw = if field.config.index == IndexKind::Unique {
            "UNIQUE "
        } else {
            ""
        };
        ddl.run(&format!(
            "CREATE {unique_kw}INDEX \"{index_name}\" ON \"{table}\" (\"{column}\" COLLATE \"{collation}\");",
            unique_kw = unique_kw,
            index_name = index_name,
            table = schema.table_name,
            column = field.name,
            collation = field.config.collation,
        ))?;
    }

    let prefix = format!("{}-", schema.table_name);
    for name in existing {
        if name.starts_with(&prefix) && !desired_names.contains(&name) {
            ddl.run(&format!("DROP INDEX \"{name}\";"))?;
        }
    }
    Ok(())
}

fn existing_index_names(conn: &DbConnection, table_name: &str) -> Result<Vec<String>, Error> {
    let mut stmt = Stmt::prepare(
        conn,
        "SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = ?",
    )?;
    stmt.bind(0, &DbValue::Text(table_name.to_string()))?;
    let mut cursor = stmt.query();
    let mut names = Vec::new();
    while let Some(row) = cursor.next_row()? {
        if let Some(DbValue::Text(name)) = row.first() {
            names.push(name.clone());
        }
    }
    Ok(names)
}
