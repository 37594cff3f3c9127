use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::time::Duration;

use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error};

use crate::Result;

/// How long a correlation entry stays readable after a forward.
pub const CORRELATION_TTL: Duration = Duration::from_secs(300);

/// Serialized entry key. Compatibility surface when the store is shared
/// with another running instance; must stay `"<chatId>_<messageId>"`.
pub fn correlation_key(chat_id: i64, forwarded_message_id: i64) -> String {
    format!("{chat_id}_{forwarded_message_id}")
}

/// Maps a freshly forwarded message id back to the id it was forwarded
/// from. Absence is an expected outcome, not an error; last write wins
/// per key.
pub trait CorrelationStore: Send + Sync {
    fn put<'a>(
        &'a self,
        chat_id: i64,
        forwarded_message_id: i64,
        original_message_id: i64,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    fn get<'a>(
        &'a self,
        chat_id: i64,
        forwarded_message_id: i64,
    ) -> Pin<Box<dyn Future<Output = Result<Option<i64>>> + Send + 'a>>;
}

#[derive(Debug)]
pub struct InMemoryCorrelationStore {
    ttl: Duration,
    inner: Mutex<HashMap<String, (i64, Instant)>>,
}

impl InMemoryCorrelationStore {
    pub fn new() -> Self {
        Self::with_ttl(CORRELATION_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub async fn entry_count(&self) -> usize {
        self.inner.lock().await.len()
    }
}

impl Default for InMemoryCorrelationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CorrelationStore for InMemoryCorrelationStore {
    fn put<'a>(
        &'a self,
        chat_id: i64,
        forwarded_message_id: i64,
        original_message_id: i64,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let key = correlation_key(chat_id, forwarded_message_id);
            let deadline = Instant::now() + self.ttl;
            let mut inner = self.inner.lock().await;
            inner.retain(|_, (_, d)| *d > Instant::now());
            inner.insert(key, (original_message_id, deadline));
            Ok(())
        })
    }

    fn get<'a>(
        &'a self,
        chat_id: i64,
        forwarded_message_id: i64,
    ) -> Pin<Box<dyn Future<Output = Result<Option<i64>>> + Send + 'a>> {
        Box::pin(async move {
            let key = correlation_key(chat_id, forwarded_message_id);
            let mut inner = self.inner.lock().await;
            match inner.get(&key) {
                Some((original, deadline)) if *deadline > Instant::now() => Ok(Some(*original)),
                Some(_) => {
                    // Lazy eviction of the expired entry.
                    inner.remove(&key);
                    Ok(None)
                }
                None => Ok(None),
            }
        })
    }
}

/// SQLite-backed store so multiple processes (or a restarted one)
/// observe a consistent view. Fills the role the original deployment
/// gave to Redis.
pub struct SqliteCorrelationStore {
    pool: sqlx::SqlitePool,
    ttl: Duration,
}

impl SqliteCorrelationStore {
    pub async fn connect(path: &Path, ttl: Duration) -> Result<Self> {
        debug!(
            event = "sqlite.open",
            db_path = %path.display(),
            create_if_missing = true,
            "sqlite.open"
        );
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Delete)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| {
                error!(
                    event = "io.sqlite.connect_failed",
                    db_path = %path.display(),
                    error = %e,
                    "io.sqlite.connect_failed"
                );
                e
            })?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS correlations (
                key TEXT PRIMARY KEY,
                original_id TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool, ttl })
    }
}

impl CorrelationStore for SqliteCorrelationStore {
    fn put<'a>(
        &'a self,
        chat_id: i64,
        forwarded_message_id: i64,
        original_message_id: i64,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let now = chrono::Utc::now().timestamp();
            let expires_at = now + self.ttl.as_secs() as i64;

            // Opportunistic sweep keeps the table from accumulating
            // dead entries between reads.
            sqlx::query("DELETE FROM correlations WHERE expires_at <= ?")
                .bind(now)
                .execute(&self.pool)
                .await?;

            sqlx::query(
                "INSERT OR REPLACE INTO correlations (key, original_id, expires_at) VALUES (?, ?, ?)",
            )
            .bind(correlation_key(chat_id, forwarded_message_id))
            .bind(original_message_id.to_string())
            .bind(expires_at)
            .execute(&self.pool)
            .await?;

            Ok(())
        })
    }

    fn get<'a>(
        &'a self,
        chat_id: i64,
        forwarded_message_id: i64,
    ) -> Pin<Box<dyn Future<Output = Result<Option<i64>>> + Send + 'a>> {
        Box::pin(async move {
            let now = chrono::Utc::now().timestamp();
            let row = sqlx::query(
                "SELECT original_id FROM correlations WHERE key = ? AND expires_at > ?",
            )
            .bind(correlation_key(chat_id, forwarded_message_id))
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;

            let Some(row) = row else {
                return Ok(None);
            };

            let original: String = row.try_get("original_id")?;
            Ok(original.parse::<i64>().ok())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_format_is_stable() {
        assert_eq!(correlation_key(-1001234, 42), "-1001234_42");
        assert_eq!(correlation_key(77, 5), "77_5");
    }
}
