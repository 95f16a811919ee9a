//! The relational log tables: `express_logs` and `resource_access_logs`.

use crate::Database;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use serde::Serialize;
use sqlx::SqlitePool;
use time::OffsetDateTime;
use time::macros::format_description;

/// Current UTC time as `YYYY-MM-DD HH:MM:SS.mmm`, the format every log row
/// and the `GET /api/` response carry.
pub fn timestamp() -> String {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]");
    // Formatting a UTC datetime with a fixed description cannot fail.
    OffsetDateTime::now_utc().format(&format).unwrap_or_default()
}

/// One row of `express_logs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct LogEntry {
    pub timestamp: String,
    pub category: String,
    pub level: String,
    pub message: String,
}

/// One row of `resource_access_logs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct AccessEntry {
    pub timestamp: String,
    pub location: String,
    pub ip_address: String,
}

/// Append-only writer for the log tables.
#[derive(Debug, Clone)]
pub struct Journal {
    pool: SqlitePool,
}
impl From<&Database> for Journal {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}
impl Journal {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a `(timestamp, category, level, message)` row, stamped now.
    pub async fn append(&self, category: &str, level: &str, message: &str) -> Result<()> {
        sqlx::query(include_str!("../queries/insert_log.sql"))
            .bind(timestamp())
            .bind(category)
            .bind(level)
            .bind(message)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /// Insert a `(timestamp, location, ip_address)` row, stamped now.
    pub async fn record_access(&self, location: &str, ip_address: &str) -> Result<()> {
        sqlx::query(include_str!("../queries/insert_resource_access.sql"))
            .bind(timestamp())
            .bind(location)
            .bind(ip_address)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /// The most recent log rows, newest first.
    pub async fn list_recent_logs(&self, limit: u32) -> Result<Vec<LogEntry>> {
        sqlx::query_as(include_str!("../queries/list_recent_logs.sql"))
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)
    }

    /// The most recent resource access rows, newest first.
    pub async fn list_recent_access(&self, limit: u32) -> Result<Vec<AccessEntry>> {
        sqlx::query_as(include_str!("../queries/list_recent_resource_access.sql"))
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_shape() {
        let ts = timestamp();
        // 2026-10-16 09:41:07.123
        assert_eq!(ts.len(), 23, "{ts}");
        assert_eq!(&ts[4..5], "-");
        assert_eq!(&ts[10..11], " ");
        assert_eq!(&ts[19..20], ".");
        assert!(ts[20..].chars().all(|c| c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn test_append_and_list() {
        let db = Database::connect_in_memory().await.unwrap();
        let journal = Journal::from(&db);
        journal.append("MAIN", "INFO", "first").await.unwrap();
        journal.append("PHOTOGRAPHY", "ERROR", "second").await.unwrap();

        let logs = journal.list_recent_logs(10).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].message, "second");
        assert_eq!(logs[0].category, "PHOTOGRAPHY");
        assert_eq!(logs[1].level, "INFO");

        assert_eq!(journal.list_recent_logs(1).await.unwrap().len(), 1);
        db.close().await;
    }

    #[tokio::test]
    async fn test_record_access() {
        let db = Database::connect_in_memory().await.unwrap();
        let journal = Journal::from(&db);
        journal.record_access("https://cjremmett.com/api/", "203.0.113.7").await.unwrap();
        let access = journal.list_recent_access(5).await.unwrap();
        assert_eq!(access.len(), 1);
        assert_eq!(access[0].location, "https://cjremmett.com/api/");
        assert_eq!(access[0].ip_address, "203.0.113.7");
        assert!(journal.list_recent_logs(5).await.unwrap().is_empty());
        db.close().await;
    }
}
