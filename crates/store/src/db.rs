//! Connection pool for the site database.

use exn::ResultExt;
use sqlx::SqliteConnection;
use sqlx::pool::PoolConnectionMetadata;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::instrument;

use crate::error::{ErrorKind, Result};

/// Embedded migrations that are run automatically on connect.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
/// Request handlers and reload tasks share the pool; SQLite still only has
/// one writer at a time.
const MAX_CONNECTIONS: u32 = 5;
/// A reload upserts from several tasks at once while the journal writer
/// inserts log rows; give the single WAL writer slack before SQLITE_BUSY.
const BUSY_TIMEOUT: Duration = Duration::from_millis(1500);

/// Where the database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Location {
    File(PathBuf),
    Memory,
}

impl Location {
    fn options(&self) -> SqliteConnectOptions {
        let options = SqliteConnectOptions::new()
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT);
        match self {
            Self::File(path) => options.filename(path).create_if_missing(true),
            Self::Memory => options.filename(":memory:"),
        }
    }

    /// Every connection to ":memory:" opens its own, empty database.
    fn max_connections(&self) -> u32 {
        match self {
            Self::File(_) => MAX_CONNECTIONS,
            Self::Memory => 1,
        }
    }
}

/// Database connection pool.
///
/// Handlers never hold a connection across requests: repositories built from
/// this pool ([`Photos`](crate::Photos), [`Journal`](crate::Journal)) borrow
/// one connection per logical operation and hand it back when done.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    #[instrument(level = "debug", skip_all, fields(location = ?location))]
    async fn open(location: Location) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .after_connect(|conn, meta| Box::pin(async move { Self::prepare(conn, meta).await }))
            .max_connections(location.max_connections())
            .connect_with(location.options())
            .await
            .or_raise(|| ErrorKind::Database)?;
        let db = Self { pool };
        db.require_json().await?;
        MIGRATOR.run(&db.pool).await.or_raise(|| ErrorKind::Migration)?;
        Ok(db)
    }

    /// Open (creating if needed) the database file at `path` and bring its
    /// schema up to date.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(Location::File(path.as_ref().to_path_buf())).await
    }

    /// A throwaway database, for tests here and in downstream crates.
    ///
    /// Deliberately not `#[cfg(test)]`, so other crates can use it too.
    pub async fn connect_in_memory() -> Result<Self> {
        Self::open(Location::Memory).await
    }

    /// PRAGMAs not exposed through [`SqliteConnectOptions`], applied to every
    /// pooled connection.
    async fn prepare(conn: &mut SqliteConnection, _meta: PoolConnectionMetadata) -> sqlx::Result<()> {
        sqlx::query(
            r#"
                PRAGMA wal_autocheckpoint = 800;
                PRAGMA cache_size = -8192;
                PRAGMA temp_store = MEMORY;
            "#,
        )
        .execute(conn)
        .await?;
        Ok(())
    }

    /// The document collections are queried with SQLite's JSON functions;
    /// refuse to start on a build of SQLite without them.
    async fn require_json(&self) -> Result<()> {
        let probe: Option<String> = sqlx::query_scalar("SELECT json_extract('{\"ok\": \"yes\"}', '$.ok')")
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        match probe.as_deref() {
            Some("yes") => Ok(()),
            _ => exn::bail!(ErrorKind::Database),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Wait for every borrowed connection to come back, then close the pool.
    pub async fn close(&self) {
        // Lets SQLite refresh its query planner statistics.
        _ = sqlx::query("PRAGMA optimize").execute(&self.pool).await;
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_database_closes() {
        let db = Database::connect_in_memory().await.unwrap();
        assert!(!db.pool().is_closed());
        db.close().await;
        assert!(db.pool().is_closed());
    }

    #[tokio::test]
    async fn test_database_file_survives_reconnect() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("shutter.sqlite");
        let db = Database::connect(&path).await.unwrap();
        assert!(path.exists());
        sqlx::query("INSERT INTO express_logs VALUES ('2024-01-01 00:00:00.000', 'MAIN', 'INFO', 'hello')")
            .execute(db.pool())
            .await
            .unwrap();
        db.close().await;

        // Migrations already applied; the row is still there.
        let db = Database::connect(&path).await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM express_logs").fetch_one(db.pool()).await.unwrap();
        assert_eq!(count, 1);
        db.close().await;
    }

    #[tokio::test]
    async fn test_schema() {
        let db = Database::connect_in_memory().await.unwrap();
        let tables: Vec<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE '\\_%' ESCAPE '\\' AND name NOT LIKE 'sqlite%' ORDER BY name")
                .fetch_all(db.pool())
                .await
                .unwrap();
        assert_eq!(tables, vec!["express_logs", "photos", "resource_access_logs", "tags"]);
        db.close().await;
    }

    #[tokio::test]
    async fn test_documents_must_be_json() {
        let db = Database::connect_in_memory().await.unwrap();
        let rejected = sqlx::query("INSERT INTO photos (id, document) VALUES ('x', 'not json')").execute(db.pool()).await;
        assert!(rejected.is_err());
        let row: (i64,) = sqlx::query_as("PRAGMA wal_autocheckpoint").fetch_one(db.pool()).await.unwrap();
        assert_eq!(row.0, 800);
        db.close().await;
    }
}
