//! The `photos` and `tags` document collections.

use crate::Database;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use serde_json::{Map, Value};
use sqlx::{Connection, QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::future::Future;
use std::pin::Pin;

/// A stored JSON document: one top-level object.
pub type Document = Map<String, Value>;

type Scoped<'c, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'c>>;

/// Run one at a time, inside a single transaction.
const RECREATE_COLLECTIONS: [&str; 4] = [
    "DROP TABLE IF EXISTS photos",
    "DROP TABLE IF EXISTS tags",
    "CREATE TABLE photos (id TEXT PRIMARY KEY NOT NULL, document TEXT NOT NULL CHECK (json_valid(document)))",
    "CREATE TABLE tags (_id INTEGER PRIMARY KEY AUTOINCREMENT, document TEXT NOT NULL CHECK (json_valid(document)))",
];

/// Repository over the `photography` document collections.
///
/// - `photos` holds one document per photo, keyed by its `id` field.
/// - `tags` holds the tag index as a single document. The row id the store
///   assigns to it is never part of the returned document.
///
/// Every operation borrows exactly one pooled connection for its duration
/// (see [`scoped`](Self::scoped)); nothing holds a connection between calls.
#[derive(Debug, Clone)]
pub struct Photos {
    pool: SqlitePool,
}
impl From<&Database> for Photos {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}
impl Photos {
    /// Run one logical operation on a single pooled connection.
    ///
    /// The connection goes back to the pool when the operation finishes,
    /// whether it returned `Ok`, `Err`, or the future was dropped half-way.
    async fn scoped<T, F>(&self, operation: F) -> Result<T>
    where
        F: for<'c> FnOnce(&'c mut SqliteConnection) -> Scoped<'c, T>,
    {
        let mut conn = self.pool.acquire().await.or_raise(|| ErrorKind::Database)?;
        operation(&mut *conn).await
    }

    fn encode(document: &Document) -> Result<String> {
        serde_json::to_string(document).or_raise(|| ErrorKind::InvalidData("document"))
    }

    fn decode(raw: &str) -> Result<Document> {
        serde_json::from_str(raw).or_raise(|| ErrorKind::InvalidData("document"))
    }

    // =========================================================================
    // Collections
    // =========================================================================

    /// Drop both collections and recreate them empty, atomically.
    pub async fn recreate_collections(&self) -> Result<()> {
        self.scoped(|conn| {
            Box::pin(async move {
                let mut tx = conn.begin().await.or_raise(|| ErrorKind::Database)?;
                for statement in RECREATE_COLLECTIONS {
                    sqlx::query(statement).execute(&mut *tx).await.or_raise(|| ErrorKind::Database)?;
                }
                tx.commit().await.or_raise(|| ErrorKind::Database)
            })
        })
        .await
    }

    // =========================================================================
    // Photos
    // =========================================================================

    /// Insert or update the photo document with the given `id`.
    ///
    /// Update semantics match a `$set` of every top-level field in
    /// `document`: fields present in `document` replace the stored ones,
    /// stored fields missing from `document` are kept. The `id` field is
    /// always written as `id`.
    pub async fn upsert(&self, id: &str, document: &Document) -> Result<()> {
        let id = id.to_string();
        let mut incoming = document.clone();
        incoming.insert("id".to_string(), Value::String(id.clone()));
        self.scoped(|conn| {
            Box::pin(async move {
                let mut tx = conn.begin().await.or_raise(|| ErrorKind::Database)?;
                let existing: Option<String> = sqlx::query_scalar(include_str!("../queries/get_photo.sql"))
                    .bind(&id)
                    .fetch_optional(&mut *tx)
                    .await
                    .or_raise(|| ErrorKind::Database)?;
                let merged = match existing {
                    Some(raw) => {
                        let mut stored = Self::decode(&raw)?;
                        stored.extend(incoming);
                        stored
                    },
                    None => incoming,
                };
                sqlx::query(include_str!("../queries/upsert_photo.sql"))
                    .bind(&id)
                    .bind(Self::encode(&merged)?)
                    .execute(&mut *tx)
                    .await
                    .or_raise(|| ErrorKind::Database)?;
                tx.commit().await.or_raise(|| ErrorKind::Database)
            })
        })
        .await
    }

    /// Fetch the photo document with the given `id`.
    pub async fn get(&self, id: &str) -> Result<Option<Document>> {
        let id = id.to_string();
        self.scoped(|conn| {
            Box::pin(async move {
                let raw: Option<String> = sqlx::query_scalar(include_str!("../queries/get_photo.sql"))
                    .bind(&id)
                    .fetch_optional(&mut *conn)
                    .await
                    .or_raise(|| ErrorKind::Database)?;
                raw.as_deref().map(Self::decode).transpose()
            })
        })
        .await
    }

    /// Fetch every photo document whose `tags` map has each of the given tag
    /// names set to `true`, in insertion order.
    ///
    /// An empty tag list matches every document.
    pub async fn find_by_tags(&self, tags: &[String]) -> Result<Vec<Document>> {
        let tags = tags.to_vec();
        self.scoped(|conn| {
            Box::pin(async move {
                let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT document FROM photos");
                for (i, tag) in tags.into_iter().enumerate() {
                    query.push(if i == 0 { " WHERE " } else { " AND " });
                    // `json_quote` turns the name into a quoted path label, so
                    // dots or spaces inside a tag name can't change the path.
                    query.push("json_type(document, '$.tags.' || json_quote(");
                    query.push_bind(tag);
                    query.push(")) = 'true'");
                }
                query.push(" ORDER BY rowid");
                let rows: Vec<String> =
                    query.build_query_scalar().fetch_all(&mut *conn).await.or_raise(|| ErrorKind::Database)?;
                rows.iter().map(|raw| Self::decode(raw)).collect()
            })
        })
        .await
    }

    // =========================================================================
    // Tags
    // =========================================================================

    /// Replace the contents of the `tags` collection with a single document.
    pub async fn replace_tags(&self, tags: &Document) -> Result<()> {
        let encoded = Self::encode(tags)?;
        self.scoped(|conn| {
            Box::pin(async move {
                let mut tx = conn.begin().await.or_raise(|| ErrorKind::Database)?;
                sqlx::query("DELETE FROM tags").execute(&mut *tx).await.or_raise(|| ErrorKind::Database)?;
                sqlx::query(include_str!("../queries/insert_tags.sql"))
                    .bind(encoded)
                    .execute(&mut *tx)
                    .await
                    .or_raise(|| ErrorKind::Database)?;
                tx.commit().await.or_raise(|| ErrorKind::Database)
            })
        })
        .await
    }

    /// The persisted tag index, if one has been flushed.
    pub async fn tags(&self) -> Result<Option<Document>> {
        self.scoped(|conn| {
            Box::pin(async move {
                let raw: Option<String> = sqlx::query_scalar(include_str!("../queries/get_tags.sql"))
                    .fetch_optional(&mut *conn)
                    .await
                    .or_raise(|| ErrorKind::Database)?;
                raw.as_deref().map(Self::decode).transpose()
            })
        })
        .await
    }
}
