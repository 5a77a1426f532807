use std::sync::{Arc, Mutex};

use shelfdb::{
    sample, Database, Direction, Error, FieldConfig, FieldPath, OnConflict, Op, Options,
    Record, Schema, SchemaBuilder, SqlLogger,
};

#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
struct Book {
    id: uuid::Uuid,
    name: String,
    author: String,
    price_cents: i64,
}

const BOOK_AUTHOR: FieldPath<Book, String> = FieldPath::new(2, "author");
const BOOK_PRICE: FieldPath<Book, i64> = FieldPath::new(3, "price_cents");

impl Record for Book {
    fn type_name() -> &'static str {
        "Book"
    }
    fn schema() -> &'static Schema<Self> {
        static SCHEMA: std::sync::OnceLock<Schema<Book>> = std::sync::OnceLock::new();
        SCHEMA.get_or_init(|| {
            let mut b = SchemaBuilder::new("Book", "Book", Book::default);
            b.field(
                "id",
                FieldConfig::new(),
                |r, one| r.id = sample(one),
                |r| serde_json::json!(r.id),
            );
            b.field(
                "name",
                FieldConfig::new().unique(),
                |r, one| r.name = sample(one),
                |r| serde_json::json!(r.name),
            );
            b.field(
                "author",
                FieldConfig::new(),
                |r, one| r.author = sample(one),
                |r| serde_json::json!(r.author),
            );
            b.field(
                "price_cents",
                FieldConfig::new(),
                |r, one| r.price_cents = sample(one),
                |r| serde_json::json!(r.price_cents),
            );
            b.identity("id");
            b.build().unwrap()
        })
    }
}

#[test]
fn headline_insert_and_filter() {
    let db = Database::open_in_memory(Options::default()).unwrap();
    let books = db.collection::<Book>().unwrap();

    books
        .insert(&Book {
            id: uuid::Uuid::new_v4(),
            name: "Catch-22".into(),
            author: "Joseph Heller".into(),
            price_cents: 1050,
        })
        .unwrap();

    let cheap = books
        .query()
        .filter(BOOK_PRICE, Op::Lt, 1000)
        .unwrap()
        .order_by(BOOK_AUTHOR, Direction::Desc)
        .unwrap()
        .fetch_many()
        .unwrap();
    assert!(cheap.is_empty());

    let indices: Vec<String> = db
        .query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = 'Book'",
            &[],
        )
        .unwrap();
    assert_eq!(indices.len(), 2);
    assert!(indices.iter().any(|n| n.contains("-id-")));
    assert!(indices.iter().any(|n| n.contains("-name-")));
}

#[test]
fn save_inserts_then_updates_in_place() {
    let db = Database::open_in_memory(Options::default()).unwrap();
    let books = db.collection::<Book>().unwrap();

    let mut book = Book {
        id: uuid::Uuid::new_v4(),
        name: "Catch-22".into(),
        author: "Joseph Heller".into(),
        price_cents: 1050,
    };
    books.save(&book).unwrap();

    book.price_cents = 899;
    books.save(&book).unwrap();

    let all = books.all().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].price_cents, 899);
}

#[test]
fn insert_conflict_policies_keep_or_replace_the_existing_row() {
    let db = Database::open_in_memory(Options::default()).unwrap();
    let books = db.collection::<Book>().unwrap();

    books
        .insert(&Book {
            id: uuid::Uuid::new_v4(),
            name: "Dune".into(),
            author: "Frank Herbert".into(),
            price_cents: 999,
        })
        .unwrap();

    let same_name = Book {
        id: uuid::Uuid::new_v4(),
        name: "Dune".into(),
        author: "An Impostor".into(),
        price_cents: 1,
    };

    books.insert_with(&same_name, OnConflict::Ignore).unwrap();
    let kept = books.all().unwrap();
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].author, "Frank Herbert");

    books.insert_with(&same_name, OnConflict::Replace).unwrap();
    let replaced = books.all().unwrap();
    assert_eq!(replaced.len(), 1);
    assert_eq!(replaced[0].author, "An Impostor");
}

#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
struct WidgetV1 {
    id: uuid::Uuid,
    a: i64,
}

impl Record for WidgetV1 {
    fn type_name() -> &'static str {
        "WidgetV1"
    }
    fn schema() -> &'static Schema<Self> {
        static SCHEMA: std::sync::OnceLock<Schema<WidgetV1>> = std::sync::OnceLock::new();
        SCHEMA.get_or_init(|| {
            let mut b = SchemaBuilder::new("WidgetV1", "widgets", WidgetV1::default);
            b.field(
                "id",
                FieldConfig::new(),
                |r, one| r.id = sample(one),
                |r| serde_json::json!(r.id),
            );
            b.field(
                "a",
                FieldConfig::new(),
                |r, one| r.a = sample(one),
                |r| serde_json::json!(r.a),
            );
            b.identity("id");
            b.build().unwrap()
        })
    }
}

#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
struct WidgetV2 {
    id: uuid::Uuid,
    a: i64,
    b: Option<String>,
}

impl Record for WidgetV2 {
    fn type_name() -> &'static str {
        "WidgetV2"
    }
    fn schema() -> &'static Schema<Self> {
        static SCHEMA: std::sync::OnceLock<Schema<WidgetV2>> = std::sync::OnceLock::new();
        SCHEMA.get_or_init(|| {
            let mut b = SchemaBuilder::new("WidgetV2", "widgets", WidgetV2::default);
            b.field(
                "id",
                FieldConfig::new(),
                |r, one| r.id = sample(one),
                |r| serde_json::json!(r.id),
            );
            b.field(
                "a",
                FieldConfig::new(),
                |r, one| r.a = sample(one),
                |r| serde_json::json!(r.a),
            );
            b.field(
                "b",
                FieldConfig::new(),
                |r, one| r.b = sample(one),
                |r| serde_json::json!(r.b),
            );
            b.identity("id");
            b.build().unwrap()
        })
    }
}

#[test]
fn migration_adds_exactly_one_column_and_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("widgets.sqlite3");
    let path = path.to_str().unwrap();

    let u1 = uuid::Uuid::new_v4();
    let u2 = uuid::Uuid::new_v4();
    let u3 = uuid::Uuid::new_v4();

    {
        let db = Database::open(path, Options::default()).unwrap();
        let widgets = db.collection::<WidgetV1>().unwrap();
        widgets
            .insert_many(&[WidgetV1 { id: u1, a: 4 }, WidgetV1 { id: u2, a: 5 }])
            .unwrap();
    }

    // Reopening with the same record type performs no DDL: SQLite bumps
    // schema_version on every schema change, so an unchanged version
    // proves the second migration pass was a no-op.
    let version_after_first = {
        let db = Database::open(path, Options::default()).unwrap();
        db.collection::<WidgetV1>().unwrap();
        db.query_scalar::<i64>("PRAGMA schema_version", &[]).unwrap()
    };
    let version_after_second = {
        let db = Database::open(path, Options::default()).unwrap();
        db.collection::<WidgetV1>().unwrap();
        db.query_scalar::<i64>("PRAGMA schema_version", &[]).unwrap()
    };
    assert_eq!(version_after_first, version_after_second);

    {
        let db = Database::open(path, Options::default()).unwrap();
        let widgets = db.collection::<WidgetV2>().unwrap();
        widgets
            .insert(&WidgetV2 {
                id: u3,
                a: 6,
                b: Some("yo".into()),
            })
            .unwrap();

        let mut all = widgets.all().unwrap();
        all.sort_by_key(|w| w.a);
        assert_eq!(
            all,
            vec![
                WidgetV2 { id: u1, a: 4, b: None },
                WidgetV2 { id: u2, a: 5, b: None },
                WidgetV2 { id: u3, a: 6, b: Some("yo".into()) },
            ]
        );
    }
}

#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
struct Row {
    value: i64,
}

impl Record for Row {
    fn type_name() -> &'static str {
        "Row"
    }
    fn schema() -> &'static Schema<Self> {
        static SCHEMA: std::sync::OnceLock<Schema<Row>> = std::sync::OnceLock::new();
        SCHEMA.get_or_init(|| {
            let mut b = SchemaBuilder::new("Row", "rows", Row::default);
            b.field(
                "value",
                FieldConfig::new(),
                |r, one| r.value = sample(one),
                |r| serde_json::json!(r.value),
            );
            b.build().unwrap()
        })
    }
}

#[test]
fn a_raised_error_inside_write_rolls_back_the_whole_block() {
    let db = Database::open_in_memory(Options::default()).unwrap();
    let rows = db.collection::<Row>().unwrap();

    let result: Result<(), Error> = db.write(|_guard| {
        rows.insert(&Row { value: 1 })?;
        Err(Error::Misuse("boom".into()))
    });
    assert!(result.is_err());
    assert!(rows.all().unwrap().is_empty());
}

#[test]
fn a_swallowed_nested_failure_rolls_back_only_the_inner_savepoint() {
    let db = Database::open_in_memory(Options::default()).unwrap();
    let rows = db.collection::<Row>().unwrap();

    db.write(|_outer| {
        rows.insert(&Row { value: 1 })?;

        let nested: Result<(), Error> = db.write(|_inner| {
            rows.insert(&Row { value: 2 })?;
            Err(Error::Misuse("force rollback".into()))
        });
        assert!(nested.is_err());

        rows.insert(&Row { value: 3 })
    })
    .unwrap();

    let mut values: Vec<i64> = rows.all().unwrap().into_iter().map(|r| r.value).collect();
    values.sort();
    assert_eq!(values, vec![1, 3]);
}

#[test]
fn writers_serialise_and_a_reader_is_not_blocked_by_a_writer() {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("concurrent.sqlite3");
    let db = Arc::new(Database::open(path.to_str().unwrap(), Options::default()).unwrap());
    let rows = db.collection::<Row>().unwrap();

    let in_write = Arc::new(AtomicBool::new(false));
    let overlapped = Arc::new(AtomicBool::new(false));
    let (entered_tx, entered_rx) = mpsc::channel::<()>();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    let first_writer = {
        let db = Arc::clone(&db);
        let in_write = Arc::clone(&in_write);
        std::thread::spawn(move || {
            db.write(|_guard| {
                in_write.store(true, Ordering::SeqCst);
                entered_tx.send(()).unwrap();
                release_rx.recv().unwrap();
                in_write.store(false, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        })
    };

    entered_rx.recv().unwrap();

    // With the write lock held, a read proceeds immediately against the
    // WAL snapshot rather than waiting for the writer.
    let count = db
        .query_scalar::<i64>("SELECT count(*) FROM rows", &[])
        .unwrap();
    assert_eq!(count, vec![0]);

    let second_writer = {
        let db = Arc::clone(&db);
        let rows = rows.clone();
        let in_write = Arc::clone(&in_write);
        let overlapped = Arc::clone(&overlapped);
        std::thread::spawn(move || {
            db.write(|_guard| {
                if in_write.load(Ordering::SeqCst) {
                    overlapped.store(true, Ordering::SeqCst);
                }
                rows.insert(&Row { value: 1 })
            })
            .unwrap();
        })
    };

    std::thread::sleep(std::time::Duration::from_millis(50));
    release_tx.send(()).unwrap();
    first_writer.join().unwrap();
    second_writer.join().unwrap();

    assert!(!overlapped.load(Ordering::SeqCst));
    assert_eq!(rows.all().unwrap().len(), 1);
}

#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
struct Word {
    value: String,
}

impl Record for Word {
    fn type_name() -> &'static str {
        "Word"
    }
    fn schema() -> &'static Schema<Self> {
        static SCHEMA: std::sync::OnceLock<Schema<Word>> = std::sync::OnceLock::new();
        SCHEMA.get_or_init(|| {
            let mut b = SchemaBuilder::new("Word", "words", Word::default);
            b.field(
                "value",
                FieldConfig::new(),
                |r, one| r.value = sample(one),
                |r| serde_json::json!(r.value),
            );
            b.build().unwrap()
        })
    }
}

const WORD_VALUE: FieldPath<Word, String> = FieldPath::new(0, "value");

#[test]
fn unicode_collation_equates_combining_sequences_under_string_but_not_binary() {
    let db = Database::open_in_memory(Options::default()).unwrap();
    let words = db.collection::<Word>().unwrap();
    // "e" + combining acute accent, vs the precomposed "é".
    words.insert(&Word { value: "e\u{0301}".into() }).unwrap();

    let matched = words
        .query()
        .filter(WORD_VALUE, Op::Eq, "\u{00e9}".to_string())
        .unwrap()
        .fetch_many()
        .unwrap();
    assert_eq!(matched.len(), 1);

    let matched_binary = words
        .query()
        .filter_collated(WORD_VALUE, Op::Eq, "\u{00e9}".to_string(), Some("binary"))
        .unwrap()
        .fetch_many()
        .unwrap();
    assert!(matched_binary.is_empty());
}

#[test]
fn custom_collation_orders_a_literal_before_everything_else() {
    let db = Database::open_in_memory(Options::default()).unwrap();
    let words = db.collection::<Word>().unwrap();
    for value in ["x", "me first!", "a"] {
        words.insert(&Word { value: value.into() }).unwrap();
    }

    db.install_collation("meFirst", |a: &str, b: &str| {
        match (a == "me first!", b == "me first!") {
            (true, true) => std::cmp::Ordering::Equal,
            (true, false) => std::cmp::Ordering::Less,
            (false, true) => std::cmp::Ordering::Greater,
            (false, false) => a.cmp(b),
        }
    })
    .unwrap();

    let ordered: Vec<String> = words
        .query()
        .order_by_collated(WORD_VALUE, Direction::Asc, None, Some("meFirst"))
        .unwrap()
        .fetch_many()
        .unwrap()
        .into_iter()
        .map(|w| w.value)
        .collect();
    assert_eq!(ordered, vec!["me first!", "a", "x"]);
}

#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
struct Tagged {
    id: i64,
    label: String,
}

impl Record for Tagged {
    fn type_name() -> &'static str {
        "Tagged"
    }
    fn schema() -> &'static Schema<Self> {
        static SCHEMA: std::sync::OnceLock<Schema<Tagged>> = std::sync::OnceLock::new();
        SCHEMA.get_or_init(|| {
            let mut b = SchemaBuilder::new("Tagged", "tagged", Tagged::default);
            b.field(
                "id",
                FieldConfig::new(),
                |r, one| r.id = sample(one),
                |r| serde_json::json!(r.id),
            );
            b.field(
                "label",
                FieldConfig::new(),
                |r, one| r.label = sample(one),
                |r| serde_json::json!(r.label),
            );
            b.identity("id");
            b.build().unwrap()
        })
    }
}

const TAGGED_ID: FieldPath<Tagged, i64> = FieldPath::new(0, "id");

#[test]
fn fetch_one_succeeds_on_a_row_that_decodes_even_if_a_later_row_would_not() {
    let db = Database::open_in_memory(Options::default()).unwrap();
    let tagged = db.collection::<Tagged>().unwrap();
    tagged
        .insert_many(&[
            Tagged { id: 1, label: "OK".into() },
            Tagged { id: 2, label: "placeholder".into() },
        ])
        .unwrap();
    db.execute("UPDATE tagged SET label = NULL WHERE id = 2", &[])
        .unwrap();

    let first = tagged
        .query()
        .order_by(TAGGED_ID, Direction::Asc)
        .unwrap()
        .fetch_one()
        .unwrap();
    assert_eq!(first.unwrap().label, "OK");

    let all = tagged.query().order_by(TAGGED_ID, Direction::Asc).unwrap().fetch_many();
    let message = all.unwrap_err().to_string();
    assert!(message.contains("Error thrown from Tagged.init"), "{message}");
}

#[test]
fn bulk_insert_with_a_uniqueness_violation_commits_nothing() {
    let db = Database::open_in_memory(Options::default()).unwrap();
    let books = db.collection::<Book>().unwrap();

    let a = Book {
        id: uuid::Uuid::new_v4(),
        name: "Dune".into(),
        author: "Frank Herbert".into(),
        price_cents: 999,
    };
    let b = Book {
        id: uuid::Uuid::new_v4(),
        name: "Shogun".into(),
        author: "James Clavell".into(),
        price_cents: 1299,
    };
    let duplicate_name = Book {
        id: uuid::Uuid::new_v4(),
        name: "Dune".into(),
        author: "Someone Else".into(),
        price_cents: 1,
    };

    let result = books.insert_many(&[a, b, duplicate_name]);
    assert!(result.is_err());
    assert!(books.all().unwrap().is_empty());
}

#[derive(Default)]
struct CapturingLogger(Mutex<Vec<String>>);

impl SqlLogger for CapturingLogger {
    fn log(&self, sql: &str) {
        self.0.lock().unwrap().push(sql.to_string());
    }
}

#[test]
fn sql_logger_receives_rendered_statements_with_literal_parameters() {
    let logger = Arc::new(CapturingLogger::default());
    let sql_logger: Arc<dyn SqlLogger> = logger.clone();
    let options = Options {
        sql_logger,
        ..Options::default()
    };

    let db = Database::open_in_memory(options).unwrap();
    let rows = db.collection::<Row>().unwrap();
    rows.insert(&Row { value: 7 }).unwrap();
    rows.all().unwrap();

    let logged = logger.0.lock().unwrap();
    assert!(logged.iter().any(|sql| sql.starts_with("CREATE TABLE \"rows\"")));
    assert!(logged
        .iter()
        .any(|sql| sql.contains("INSERT INTO \"rows\"") && sql.contains("(7)")));
    assert!(logged.iter().any(|sql| sql.starts_with("SELECT")));
}
