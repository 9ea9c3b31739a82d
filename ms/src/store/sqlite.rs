//! SQLite-backed store shared by every process
//!
//! Each process opens the same database file. The rusqlite connection is
//! blocking, so every operation runs on the blocking pool behind a mutex.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

use super::{COUNTER_INITIAL_VALUE, COUNTER_RECORD_ID, ContentStore, CounterStore, StoreError};
use crate::domain::{Article, Comment, DomainId, ServiceUser};

/// How long a writer waits for another process holding the database lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Snapshot of the Counter Record row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterRecord {
    pub value: u64,
    pub updated_at: DateTime<Utc>,
}

/// SQLite implementation of [`CounterStore`] and [`ContentStore`]
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
    /// Open (creating if needed) the database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        debug!(path = %path.as_ref().display(), "SqliteStore::open: called");
        let conn = Connection::open(path.as_ref())?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.migrate()?;
        info!(path = %path.as_ref().display(), "Opened store");
        Ok(store)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self, StoreError> {
        debug!("SqliteStore::open_in_memory: called");
        let store = Self {
            conn: Arc::new(Mutex::new(Connection::open_in_memory()?)),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<(), StoreError> {
        debug!("SqliteStore::migrate: called");
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;

            CREATE TABLE IF NOT EXISTS last_updates (
                id INTEGER PRIMARY KEY,
                last_update INTEGER NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS articles (
                id INTEGER PRIMARY KEY,
                text TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS comments (
                id INTEGER PRIMARY KEY,
                article_id INTEGER NOT NULL,
                text TEXT NOT NULL,
                reply_to_id INTEGER
            );

            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                endpoint TEXT
            );
            "#,
        )?;
        Ok(())
    }

    /// Run `f` against the connection on the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| StoreError::LockPoisoned)?;
            f(&guard)
        })
        .await?
    }

    /// Read the full Counter Record, creating it if absent
    pub async fn counter_record(&self) -> Result<CounterRecord, StoreError> {
        debug!("SqliteStore::counter_record: called");
        self.with_conn(|conn| {
            ensure_counter(conn)?;
            let (value, updated_at): (i64, String) = conn.query_row(
                "SELECT last_update, updated_at FROM last_updates WHERE id = ?1",
                params![COUNTER_RECORD_ID],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            let updated_at = DateTime::parse_from_rfc3339(&updated_at)
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_default();
            Ok(CounterRecord {
                value: to_counter(value)?,
                updated_at,
            })
        })
        .await
    }

    pub async fn insert_article(&self, article: &Article) -> Result<(), StoreError> {
        debug!(article_id = %article.id, "SqliteStore::insert_article: called");
        let article = article.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO articles (id, text) VALUES (?1, ?2)",
                params![to_row_id(article.id)?, article.text],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn insert_comment(&self, comment: &Comment) -> Result<(), StoreError> {
        debug!(comment_id = %comment.id, "SqliteStore::insert_comment: called");
        let comment = comment.clone();
        self.with_conn(move |conn| {
            let reply_to_id = comment.reply_to_id.map(to_row_id).transpose()?;
            conn.execute(
                "INSERT OR REPLACE INTO comments (id, article_id, text, reply_to_id) VALUES (?1, ?2, ?3, ?4)",
                params![
                    to_row_id(comment.id)?,
                    to_row_id(comment.article_id)?,
                    comment.text,
                    reply_to_id
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn insert_service_user(&self, user: &ServiceUser) -> Result<(), StoreError> {
        debug!(user_id = %user.id, "SqliteStore::insert_service_user: called");
        let user = user.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO users (id, endpoint) VALUES (?1, ?2)",
                params![to_row_id(user.id)?, user.endpoint],
            )?;
            Ok(())
        })
        .await
    }
}

/// Create the Counter Record if no process has done so yet
fn ensure_counter(conn: &Connection) -> Result<(), StoreError> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO last_updates (id, last_update, updated_at) VALUES (?1, ?2, ?3)",
        params![
            COUNTER_RECORD_ID,
            COUNTER_INITIAL_VALUE as i64,
            Utc::now().to_rfc3339()
        ],
    )?;
    if inserted > 0 {
        debug!("ensure_counter: created counter record");
    }
    Ok(())
}

fn to_counter(value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::OutOfRange(value))
}

fn to_row_id(id: DomainId) -> Result<i64, StoreError> {
    i64::try_from(id).map_err(|_| StoreError::IdRange(id))
}

fn from_row_id(id: i64) -> Result<DomainId, StoreError> {
    DomainId::try_from(id).map_err(|_| StoreError::OutOfRange(id))
}

#[async_trait]
impl CounterStore for SqliteStore {
    async fn current(&self) -> Result<u64, StoreError> {
        debug!("SqliteStore::current: called");
        self.with_conn(|conn| {
            ensure_counter(conn)?;
            let value: i64 = conn.query_row(
                "SELECT last_update FROM last_updates WHERE id = ?1",
                params![COUNTER_RECORD_ID],
                |row| row.get(0),
            )?;
            to_counter(value)
        })
        .await
    }

    async fn increment(&self) -> Result<u64, StoreError> {
        debug!("SqliteStore::increment: called");
        self.with_conn(|conn| {
            ensure_counter(conn)?;
            // Single statement so concurrent writers never lose a bump
            let value: i64 = conn.query_row(
                "UPDATE last_updates SET last_update = last_update + 1, updated_at = ?2 \
                 WHERE id = ?1 RETURNING last_update",
                params![COUNTER_RECORD_ID, Utc::now().to_rfc3339()],
                |row| row.get(0),
            )?;
            to_counter(value)
        })
        .await
    }
}

#[async_trait]
impl ContentStore for SqliteStore {
    async fn find_article(&self, id: DomainId) -> Result<Option<Article>, StoreError> {
        debug!(%id, "SqliteStore::find_article: called");
        self.with_conn(move |conn| {
            let row: Option<(i64, String)> = conn
                .query_row(
                    "SELECT id, text FROM articles WHERE id = ?1",
                    params![to_row_id(id)?],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            row.map(|(id, text)| Ok(Article::new(from_row_id(id)?, text)))
                .transpose()
        })
        .await
    }

    async fn find_comment(&self, id: DomainId) -> Result<Option<Comment>, StoreError> {
        debug!(%id, "SqliteStore::find_comment: called");
        self.with_conn(move |conn| {
            let row: Option<(i64, i64, String, Option<i64>)> = conn
                .query_row(
                    "SELECT id, article_id, text, reply_to_id FROM comments WHERE id = ?1",
                    params![to_row_id(id)?],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                )
                .optional()?;
            row.map(|(id, article_id, text, reply_to_id)| {
                Ok(Comment {
                    id: from_row_id(id)?,
                    article_id: from_row_id(article_id)?,
                    text,
                    reply_to_id: reply_to_id.map(from_row_id).transpose()?,
                })
            })
            .transpose()
        })
        .await
    }

    async fn find_service_user(&self, id: DomainId) -> Result<Option<ServiceUser>, StoreError> {
        debug!(%id, "SqliteStore::find_service_user: called");
        self.with_conn(move |conn| {
            let row: Option<(i64, String)> = conn
                .query_row(
                    "SELECT id, endpoint FROM users WHERE id = ?1 AND endpoint IS NOT NULL",
                    params![to_row_id(id)?],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            row.map(|(id, endpoint)| Ok(ServiceUser::new(from_row_id(id)?, endpoint)))
                .transpose()
        })
        .await
    }
}
