//! SQLite-backed content store.
//!
//! # Schema
//!
//! ```text
//! content(id, url, content_type, title, raw_content, summary,
//!         timestamp_ms, content_hash, supersedes)
//! content_keywords(content_id, keyword)
//! content_metadata(content_id, key, value_json)
//! ```
//!
//! Text search compares through `kb_lower`, a Unicode-aware lowercase
//! function registered on every connection, because SQLite's own `LIKE` and
//! `lower()` only fold ASCII.
//!
//! Every call runs on the blocking pool. A file-backed store keeps a writer
//! connection and a separate read-only connection in WAL mode so reads do not
//! queue behind writes; an in-memory store uses a single connection.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as TimeDelta, TimeZone, Utc};
use rusqlite::functions::FunctionFlags;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension, Row};
use tracing::{debug, info, instrument};

use super::{ContentStats, ContentStore, KeywordCount, KeywordPair, RecentCounts, SearchFilter};
use crate::domain::{content_hash, normalize_keywords, ContentRecord, ContentType, Metadata, RecordId};
use crate::error::{KbError, Result};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS content (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        url TEXT NOT NULL,
        content_type TEXT NOT NULL,
        title TEXT NOT NULL DEFAULT '',
        raw_content TEXT NOT NULL,
        summary TEXT NOT NULL DEFAULT '',
        timestamp_ms INTEGER NOT NULL,
        content_hash TEXT NOT NULL,
        supersedes INTEGER REFERENCES content(id)
    );

    CREATE TABLE IF NOT EXISTS content_keywords (
        content_id INTEGER NOT NULL REFERENCES content(id) ON DELETE CASCADE,
        keyword TEXT NOT NULL,
        PRIMARY KEY (content_id, keyword)
    );

    CREATE TABLE IF NOT EXISTS content_metadata (
        content_id INTEGER NOT NULL REFERENCES content(id) ON DELETE CASCADE,
        key TEXT NOT NULL,
        value_json TEXT NOT NULL,
        PRIMARY KEY (content_id, key)
    );

    CREATE INDEX IF NOT EXISTS idx_content_type ON content(content_type);
    CREATE INDEX IF NOT EXISTS idx_content_timestamp ON content(timestamp_ms DESC, id DESC);
    CREATE INDEX IF NOT EXISTS idx_content_url ON content(url);
    CREATE INDEX IF NOT EXISTS idx_content_keywords_keyword ON content_keywords(keyword);
";

const RECORD_COLUMNS: &str =
    "c.id, c.url, c.content_type, c.title, c.raw_content, c.summary, c.timestamp_ms, c.content_hash, c.supersedes";

/// Which connection a call needs
#[derive(Debug, Clone, Copy)]
enum Access {
    Read,
    Write,
}

struct Connections {
    writer: Mutex<Option<Connection>>,
    reader: Option<Mutex<Option<Connection>>>,
}

/// SQLite implementation of [`ContentStore`]
#[derive(Clone)]
pub struct SqliteContentStore {
    conns: Arc<Connections>,
    path: Option<PathBuf>,
}

impl SqliteContentStore {
    /// Open (or create) a database file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let writer = Connection::open(path)?;
        writer.busy_timeout(Duration::from_secs(5))?;
        register_functions(&writer)?;
        let mode: String =
            writer.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        initialize_schema(&writer)?;

        let reader = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        reader.busy_timeout(Duration::from_secs(5))?;
        register_functions(&reader)?;

        info!(path = %path.display(), journal_mode = %mode, "Opened content store");

        Ok(Self {
            conns: Arc::new(Connections {
                writer: Mutex::new(Some(writer)),
                reader: Some(Mutex::new(Some(reader))),
            }),
            path: Some(path.to_path_buf()),
        })
    }

    /// Private in-memory database, mainly for tests
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        register_functions(&conn)?;
        initialize_schema(&conn)?;

        Ok(Self {
            conns: Arc::new(Connections {
                writer: Mutex::new(Some(conn)),
                reader: None,
            }),
            path: None,
        })
    }

    /// Database file, if file-backed
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Close the connections; later calls fail
    pub fn close(&self) -> Result<()> {
        let slots = std::iter::once(&self.conns.writer).chain(self.conns.reader.as_ref());
        for slot in slots {
            let conn = slot
                .lock()
                .map_err(|_| KbError::Config("Content store lock poisoned".to_string()))?
                .take();
            if let Some(conn) = conn {
                conn.close().map_err(|(_, e)| KbError::Storage(e))?;
            }
        }
        debug!("Closed content store");
        Ok(())
    }

    async fn run<T, F>(&self, access: Access, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conns = Arc::clone(&self.conns);
        tokio::task::spawn_blocking(move || {
            let slot = match access {
                Access::Write => &conns.writer,
                Access::Read => conns.reader.as_ref().unwrap_or(&conns.writer),
            };
            let mut guard = slot
                .lock()
                .map_err(|_| KbError::Config("Content store lock poisoned".to_string()))?;
            let conn = guard
                .as_mut()
                .ok_or_else(|| KbError::Config("Content store is closed".to_string()))?;
            f(conn)
        })
        .await
        .map_err(|e| KbError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
    }
}

impl std::fmt::Debug for SqliteContentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteContentStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

fn initialize_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// `kb_lower(text)`: `str::to_lowercase`, NULL in and out
fn register_functions(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        "kb_lower",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let text: Option<String> = ctx.get(0)?;
            Ok(text.map(|t| t.to_lowercase()))
        },
    )?;
    Ok(())
}

// ============================================================================
// Row mapping
// ============================================================================

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, message.into())
}

/// Map a `RECORD_COLUMNS` row; keywords and metadata are attached later
fn row_to_record(row: &Row<'_>) -> rusqlite::Result<ContentRecord> {
    let content_type: String = row.get(2)?;
    let content_type = content_type
        .parse::<ContentType>()
        .map_err(|e| conversion_error(2, e.to_string()))?;

    let millis: i64 = row.get(6)?;
    let timestamp: DateTime<Utc> = Utc
        .timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| conversion_error(6, format!("Invalid timestamp: {}", millis)))?;

    Ok(ContentRecord {
        id: Some(RecordId::new(row.get(0)?)),
        url: row.get(1)?,
        content_type,
        title: row.get(3)?,
        raw_content: row.get(4)?,
        summary: row.get(5)?,
        keywords: BTreeSet::new(),
        timestamp,
        metadata: Metadata::new(),
        content_hash: row.get(7)?,
        supersedes: row.get::<_, Option<i64>>(8)?.map(RecordId::new),
    })
}

fn attach_details(conn: &Connection, record: &mut ContentRecord) -> Result<()> {
    let id = match record.id {
        Some(id) => id.get(),
        None => return Ok(()),
    };

    let mut stmt =
        conn.prepare_cached("SELECT keyword FROM content_keywords WHERE content_id = ?1")?;
    record.keywords = stmt
        .query_map(params![id], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<BTreeSet<_>>>()?;

    let mut stmt = conn
        .prepare_cached("SELECT key, value_json FROM content_metadata WHERE content_id = ?1")?;
    let pairs = stmt
        .query_map(params![id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    for (key, json) in pairs {
        record.metadata.insert(key, serde_json::from_str(&json)?);
    }

    Ok(())
}

fn load_record(conn: &Connection, id: i64) -> Result<Option<ContentRecord>> {
    let sql = format!("SELECT {} FROM content c WHERE c.id = ?1", RECORD_COLUMNS);
    let record = conn
        .query_row(&sql, params![id], row_to_record)
        .optional()?;

    match record {
        Some(mut record) => {
            attach_details(conn, &mut record)?;
            Ok(Some(record))
        }
        None => Ok(None),
    }
}

/// Wrap a user query for `LIKE ... ESCAPE '\'`
fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for ch in query.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

/// Build the WHERE clause and its positional values
fn filter_clause(filter: &SearchFilter) -> (String, Vec<Value>) {
    let mut clauses: Vec<String> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    if let Some(content_type) = filter.content_type {
        values.push(Value::Text(content_type.as_str().to_string()));
        clauses.push(format!("c.content_type = ?{}", values.len()));
    }

    let keywords = normalize_keywords(&filter.keywords);
    if !keywords.is_empty() {
        let mut placeholders = Vec::with_capacity(keywords.len());
        for keyword in keywords {
            values.push(Value::Text(keyword));
            placeholders.push(format!("?{}", values.len()));
        }
        clauses.push(format!(
            "EXISTS (SELECT 1 FROM content_keywords k WHERE k.content_id = c.id AND k.keyword IN ({}))",
            placeholders.join(", ")
        ));
    }

    if let Some(query) = filter.effective_text_query() {
        values.push(Value::Text(like_pattern(&query.to_lowercase())));
        let n = values.len();
        clauses.push(format!(
            "(kb_lower(c.summary) LIKE ?{n} ESCAPE '\\' OR kb_lower(c.raw_content) LIKE ?{n} ESCAPE '\\')"
        ));
    }

    if let Some(range) = filter.time_range {
        if let Some(start) = range.start {
            values.push(Value::Integer(start.timestamp_millis()));
            clauses.push(format!("c.timestamp_ms >= ?{}", values.len()));
        }
        if let Some(end) = range.end {
            values.push(Value::Integer(end.timestamp_millis()));
            clauses.push(format!("c.timestamp_ms < ?{}", values.len()));
        }
    }

    let clause = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    (clause, values)
}

fn to_count(n: i64) -> u64 {
    u64::try_from(n).unwrap_or(0)
}

fn collect_stats(conn: &Connection, now: DateTime<Utc>, top: usize) -> Result<ContentStats> {
    let top = i64::try_from(top).unwrap_or(i64::MAX);

    let total: i64 = conn.query_row("SELECT COUNT(*) FROM content", [], |row| row.get(0))?;

    let mut stmt = conn.prepare_cached(
        "SELECT content_type, COUNT(*) AS n FROM content
         GROUP BY content_type ORDER BY n DESC, content_type",
    )?;
    let by_type = stmt
        .query_map([], |row| {
            let content_type: String = row.get(0)?;
            let content_type = content_type
                .parse::<ContentType>()
                .map_err(|e| conversion_error(0, e.to_string()))?;
            Ok((content_type, to_count(row.get(1)?)))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let cutoff = |days: i64| (now - TimeDelta::days(days)).timestamp_millis();
    let recent = conn.query_row(
        "SELECT COALESCE(SUM(timestamp_ms >= ?1), 0), COALESCE(SUM(timestamp_ms >= ?2), 0),
                COALESCE(SUM(timestamp_ms >= ?3), 0), COALESCE(SUM(timestamp_ms >= ?4), 0)
         FROM content",
        params![cutoff(1), cutoff(7), cutoff(30), cutoff(365)],
        |row| {
            Ok(RecentCounts {
                last_24h: to_count(row.get(0)?),
                last_7d: to_count(row.get(1)?),
                last_30d: to_count(row.get(2)?),
                last_365d: to_count(row.get(3)?),
            })
        },
    )?;

    let (assignments, distinct): (i64, i64) = conn.query_row(
        "SELECT COUNT(*), COUNT(DISTINCT keyword) FROM content_keywords",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let mut stmt = conn.prepare_cached(
        "SELECT keyword, COUNT(*) AS n FROM content_keywords
         GROUP BY keyword ORDER BY n DESC, keyword LIMIT ?1",
    )?;
    let top_keywords = stmt
        .query_map(params![top], |row| {
            Ok(KeywordCount {
                keyword: row.get(0)?,
                count: to_count(row.get(1)?),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut stmt = conn.prepare_cached(
        "SELECT a.keyword, b.keyword, COUNT(*) AS n
         FROM content_keywords a
         JOIN content_keywords b ON b.content_id = a.content_id AND a.keyword < b.keyword
         GROUP BY a.keyword, b.keyword
         ORDER BY n DESC, a.keyword, b.keyword LIMIT ?1",
    )?;
    let keyword_pairs = stmt
        .query_map(params![top], |row| {
            Ok(KeywordPair {
                first: row.get(0)?,
                second: row.get(1)?,
                count: to_count(row.get(2)?),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let average_keywords = if total > 0 {
        assignments as f64 / total as f64
    } else {
        0.0
    };

    Ok(ContentStats {
        total: to_count(total),
        by_type,
        recent,
        average_keywords,
        distinct_keywords: to_count(distinct),
        top_keywords,
        keyword_pairs,
    })
}

// ============================================================================
// ContentStore
// ============================================================================

#[async_trait]
impl ContentStore for SqliteContentStore {
    #[instrument(skip(self, record), fields(url = %record.url))]
    async fn save(&self, record: &ContentRecord) -> Result<RecordId> {
        let record = record.clone();

        let id = self
            .run(Access::Write, move |conn| {
                let supersedes = record.id.or(record.supersedes).map(|id| id.get());
                let keywords = normalize_keywords(&record.keywords);

                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO content (url, content_type, title, raw_content, summary,
                                          timestamp_ms, content_hash, supersedes)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        record.url,
                        record.content_type.as_str(),
                        record.title,
                        record.raw_content,
                        record.summary,
                        record.timestamp.timestamp_millis(),
                        content_hash(&record.raw_content),
                        supersedes,
                    ],
                )?;
                let id = tx.last_insert_rowid();

                {
                    let mut insert_keyword = tx.prepare_cached(
                        "INSERT OR IGNORE INTO content_keywords (content_id, keyword) VALUES (?1, ?2)",
                    )?;
                    for keyword in &keywords {
                        insert_keyword.execute(params![id, keyword])?;
                    }

                    let mut insert_meta = tx.prepare_cached(
                        "INSERT INTO content_metadata (content_id, key, value_json) VALUES (?1, ?2, ?3)",
                    )?;
                    for (key, value) in &record.metadata {
                        insert_meta.execute(params![id, key, serde_json::to_string(value)?])?;
                    }
                }

                tx.commit()?;
                Ok(RecordId::new(id))
            })
            .await?;

        debug!(%id, "Saved content record");
        Ok(id)
    }

    async fn get(&self, id: RecordId) -> Result<ContentRecord> {
        self.run(Access::Read, move |conn| {
            load_record(conn, id.get())?.ok_or(KbError::NotFound(id))
        })
        .await
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<ContentRecord>> {
        let url = url.to_string();
        self.run(Access::Read, move |conn| {
            let id: Option<i64> = conn
                .query_row(
                    "SELECT id FROM content WHERE url = ?1
                     ORDER BY timestamp_ms DESC, id DESC LIMIT 1",
                    params![url],
                    |row| row.get(0),
                )
                .optional()?;

            match id {
                Some(id) => load_record(conn, id),
                None => Ok(None),
            }
        })
        .await
    }

    #[instrument(skip(self, filter))]
    async fn search(
        &self,
        filter: &SearchFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ContentRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let (clause, mut values) = filter_clause(filter);
        values.push(Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
        let limit_idx = values.len();
        values.push(Value::Integer(i64::try_from(offset).unwrap_or(i64::MAX)));
        let offset_idx = values.len();

        let sql = format!(
            "SELECT {} FROM content c {} ORDER BY c.timestamp_ms DESC, c.id DESC LIMIT ?{} OFFSET ?{}",
            RECORD_COLUMNS, clause, limit_idx, offset_idx
        );

        let records = self
            .run(Access::Read, move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let mut records = stmt
                    .query_map(params_from_iter(values.iter()), row_to_record)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                drop(stmt);

                for record in &mut records {
                    attach_details(conn, record)?;
                }
                Ok(records)
            })
            .await?;

        debug!(results = records.len(), "Search completed");
        Ok(records)
    }

    async fn count(&self) -> Result<u64> {
        self.run(Access::Read, |conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM content", [], |row| row.get(0))?;
            Ok(to_count(n))
        })
        .await
    }

    #[instrument(skip(self))]
    async fn stats(&self, top: usize) -> Result<ContentStats> {
        let now = Utc::now();
        self.run(Access::Read, move |conn| collect_stats(conn, now, top))
            .await
    }
}
