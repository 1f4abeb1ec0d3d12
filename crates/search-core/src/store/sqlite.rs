//! SQLite-backed document store.

use super::{DocumentFilter, DocumentStore};
use crate::models::CatalogDocument;
use crate::{Result, SearchError};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, params_from_iter, Connection, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Maximum ids bound in one `IN (...)` lookup.
const ID_CHUNK: usize = 500;

const COLUMNS: &str = "id, name, description, price, category, created_at";

/// Catalog store on a single SQLite database.
///
/// Thread-safe via internal mutex on the connection; queries run on the
/// blocking pool.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open (or create) the store at `db_path`.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| SearchError::Store {
                    message: format!("Failed to create store directory: {}", e),
                    source: None,
                })?;
            }
        }

        let conn = Connection::open(db_path).map_err(|e| SearchError::Store {
            message: format!("Failed to open store database: {}", e),
            source: Some(e),
        })?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        debug!("Opened document store at {}", db_path.display());
        Self::with_connection(conn)
    }

    /// A private in-memory store.
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS items (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                price REAL NOT NULL DEFAULT 0,
                category TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_items_category ON items(category);
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| SearchError::Store {
            message: format!("Failed to lock database: {}", e),
            source: None,
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|e| SearchError::Store {
                message: format!("Failed to lock database: {}", e),
                source: None,
            })?;
            f(&conn)
        })
        .await
        .map_err(|e| SearchError::Other(format!("store task failed: {}", e)))?
    }

    /// Insert or replace documents. Used for seeding.
    pub async fn insert_many(&self, docs: Vec<CatalogDocument>) -> Result<usize> {
        self.with_conn(move |conn| {
            let tx = conn.unchecked_transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT OR REPLACE INTO items (id, name, description, price, category, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )?;
                for doc in &docs {
                    stmt.execute(params![
                        doc.id,
                        doc.name,
                        doc.description,
                        doc.price,
                        doc.category,
                        doc.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
                    ])?;
                }
            }
            tx.commit()?;
            Ok(docs.len())
        })
        .await
    }
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<(CatalogDocument, String)> {
    let created_at: String = row.get(5)?;
    let doc = CatalogDocument {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        price: row.get(3)?,
        category: row.get(4)?,
        created_at: DateTime::<Utc>::MIN_UTC,
    };
    Ok((doc, created_at))
}

fn finish_row((mut doc, created_at): (CatalogDocument, String)) -> Result<CatalogDocument> {
    doc.created_at = DateTime::parse_from_rfc3339(&created_at)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| SearchError::Store {
            message: format!("Invalid created_at for {}: {}", doc.id, e),
            source: None,
        })?;
    Ok(doc)
}

fn collect_rows<I>(rows: I) -> Result<Vec<CatalogDocument>>
where
    I: Iterator<Item = rusqlite::Result<(CatalogDocument, String)>>,
{
    rows.map(|row| finish_row(row?)).collect()
}

/// SQLite integers are signed; values past `i64::MAX` saturate.
fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn find_all(
        &self,
        filter: &DocumentFilter,
        skip: u64,
        limit: Option<u64>,
    ) -> Result<Vec<CatalogDocument>> {
        let category = filter.category.clone();
        // SQLite treats a negative LIMIT as unbounded.
        let limit = limit.map(clamp_i64).unwrap_or(-1);
        let skip = clamp_i64(skip);

        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM items WHERE (?1 IS NULL OR category = ?1)
                 ORDER BY rowid LIMIT ?2 OFFSET ?3",
                COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![category, limit, skip], read_row)?;
            let docs = collect_rows(rows)?;
            Ok(docs)
        })
        .await
    }

    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<CatalogDocument>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = ids.to_vec();

        self.with_conn(move |conn| {
            let mut docs = Vec::with_capacity(ids.len());
            for chunk in ids.chunks(ID_CHUNK) {
                let placeholders = vec!["?"; chunk.len()].join(", ");
                let sql = format!(
                    "SELECT {} FROM items WHERE id IN ({})",
                    COLUMNS, placeholders
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params_from_iter(chunk.iter()), read_row)?;
                docs.extend(collect_rows(rows)?);
            }
            Ok(docs)
        })
        .await
    }

    async fn count(&self, filter: &DocumentFilter) -> Result<u64> {
        let category = filter.category.clone();
        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM items WHERE (?1 IS NULL OR category = ?1)",
                params![category],
                |row| row.get(0),
            )?;
            Ok(count.max(0) as u64)
        })
        .await
    }
}
