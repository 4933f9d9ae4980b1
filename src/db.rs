use crate::error::Result;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Number of completed searches kept in the history.
pub const SEARCH_HISTORY_LIMIT: i64 = 5;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct VideoRecord {
    pub filename: String,
    pub views: i64,
}

/// Handle to the persisted catalog. Opened once at startup and shared as an
/// `Arc<Db>`; every mutation is a single statement or a single transaction.
pub struct Db {
    pool: SqlitePool,
}

impl Db {
    pub async fn new(db_path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(10));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| crate::error::VidshelfError::StoreUnavailable(e.into()))?;

        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Registers a video if unknown. Returns `true` when a row was created;
    /// an existing view count is never touched.
    pub async fn upsert_video(&self, filename: &str) -> Result<bool> {
        let result = sqlx::query("INSERT OR IGNORE INTO videos (filename) VALUES (?)")
            .bind(filename)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_video(&self, filename: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM videos WHERE filename = ?")
            .bind(filename)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Atomically bumps the view counter. Unknown filenames are ignored and
    /// no record is created for them.
    pub async fn increment_views(&self, filename: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE videos SET views = views + 1 WHERE filename = ?")
            .bind(filename)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get_video(&self, filename: &str) -> Result<Option<VideoRecord>> {
        let video = sqlx::query_as::<_, VideoRecord>(
            "SELECT filename, views FROM videos WHERE filename = ?",
        )
        .bind(filename)
        .fetch_optional(&self.pool)
        .await?;

        Ok(video)
    }

    /// All known filenames in insertion order.
    pub async fn list_all(&self) -> Result<Vec<String>> {
        let filenames = sqlx::query_scalar::<_, String>("SELECT filename FROM videos ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        Ok(filenames)
    }

    pub async fn list_top_by_views(&self, limit: i64) -> Result<Vec<String>> {
        let filenames = sqlx::query_scalar::<_, String>(
            "SELECT filename FROM videos ORDER BY views DESC, id ASC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(filenames)
    }

    /// Substring match over filenames (ASCII case-insensitive). `%`, `_` and
    /// `\` in the needle match literally.
    pub async fn search_by_filename(&self, needle: &str) -> Result<Vec<String>> {
        let pattern = format!("%{}%", escape_like(needle));
        let filenames = sqlx::query_scalar::<_, String>(
            "SELECT filename FROM videos WHERE filename LIKE ? ESCAPE '\\' ORDER BY id",
        )
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;

        Ok(filenames)
    }

    /// Records a finished search. Keystroke-level queries (`is_complete ==
    /// false`), empty queries and searches without matches are not recorded.
    /// Returns whether the history was written.
    pub async fn record_search_if_complete(
        &self,
        query: &str,
        had_results: bool,
        is_complete: bool,
    ) -> Result<bool> {
        if !is_complete || !had_results || query.is_empty() {
            return Ok(false);
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT OR IGNORE INTO search_history (query) VALUES (?)")
            .bind(query)
            .execute(&mut *tx)
            .await?;

        let evicted = sqlx::query(
            "DELETE FROM search_history
             WHERE id NOT IN (SELECT id FROM search_history ORDER BY id DESC LIMIT ?)",
        )
        .bind(SEARCH_HISTORY_LIMIT)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        if evicted.rows_affected() > 0 {
            debug!("Evicted {} old search(es)", evicted.rows_affected());
        }
        Ok(true)
    }

    /// Most recent first.
    pub async fn recent_search_history(&self) -> Result<Vec<String>> {
        let queries = sqlx::query_scalar::<_, String>(
            "SELECT query FROM search_history ORDER BY id DESC LIMIT ?",
        )
        .bind(SEARCH_HISTORY_LIMIT)
        .fetch_all(&self.pool)
        .await?;

        Ok(queries)
    }
}

fn escape_like(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len());
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
