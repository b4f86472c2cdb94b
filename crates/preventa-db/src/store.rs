//! # Local Store
//!
//! Durable keyed collections with secondary indexes, on top of SQLite.
//!
//! ## Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         LocalStore                                      │
//! │                                                                         │
//! │  store.put(&order)                                                      │
//! │       │                                                                 │
//! │       ▼  one transaction                                                │
//! │  ┌──────────────────────────────┐   ┌────────────────────────────────┐  │
//! │  │ records                      │   │ record_index                   │  │
//! │  │ (orders, o-1) → {json body}  │◄──│ orders/o-1  client_id = c-7    │  │
//! │  │                              │   │ orders/o-1  status = pendiente │  │
//! │  │                              │   │ orders/o-1  synced = 0         │  │
//! │  └──────────────────────────────┘   └────────────────────────────────┘  │
//! │                                                                         │
//! │  get / get_all / get_by_index / count / count_by_index                 │
//! │  put (upsert) / delete / clear / replace_all                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A type becomes storable by implementing [`Record`] (see `records.rs`):
//! its collection name, which attributes are indexed and how to read them.
//! Records carrying a sync flag also implement [`SyncTracked`].
//!
//! Every write is a single transaction; readers never see a record without
//! its index rows.

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use tracing::debug;

use crate::error::{DbError, DbResult};

// =============================================================================
// Record Traits
// =============================================================================

/// A value stored in a secondary index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexValue {
    Text(String),
    Int(i64),
    Bool(bool),
}

impl std::fmt::Display for IndexValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexValue::Text(s) => f.write_str(s),
            IndexValue::Int(i) => write!(f, "{i}"),
            IndexValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for IndexValue {
    fn from(value: &str) -> Self {
        IndexValue::Text(value.to_string())
    }
}

impl From<String> for IndexValue {
    fn from(value: String) -> Self {
        IndexValue::Text(value)
    }
}

impl From<&String> for IndexValue {
    fn from(value: &String) -> Self {
        IndexValue::Text(value.clone())
    }
}

impl From<i64> for IndexValue {
    fn from(value: i64) -> Self {
        IndexValue::Int(value)
    }
}

impl From<bool> for IndexValue {
    fn from(value: bool) -> Self {
        IndexValue::Bool(value)
    }
}

/// A type stored in a Local Store collection.
pub trait Record: Serialize + DeserializeOwned + Send + Sync + Unpin + 'static {
    /// Collection name, also used in log fields and error messages.
    const COLLECTION: &'static str;

    /// Non-unique indexed attributes.
    const INDEXES: &'static [&'static str];

    /// Indexed attributes whose values must be unique in the collection.
    const UNIQUE_INDEXES: &'static [&'static str] = &[];

    fn id(&self) -> &str;

    /// Current values of the indexed attributes. Attributes whose value is
    /// absent are left out and never match a lookup.
    fn index_values(&self) -> Vec<(&'static str, IndexValue)>;

    /// Returns true if `attribute` is indexed for this collection.
    fn is_indexed(attribute: &str) -> bool {
        Self::INDEXES.contains(&attribute) || Self::UNIQUE_INDEXES.contains(&attribute)
    }
}

/// A record with an upload flag.
pub trait SyncTracked: Record {
    fn is_synced(&self) -> bool;
    fn set_synced(&mut self, synced: bool);
}

// =============================================================================
// Local Store
// =============================================================================

/// Handle to the Local Store collections.
#[derive(Debug, Clone)]
pub struct LocalStore {
    pool: SqlitePool,
}

impl LocalStore {
    pub fn new(pool: SqlitePool) -> Self {
        LocalStore { pool }
    }

    /// Starts a transaction spanning several writes.
    pub async fn begin(&self) -> DbResult<StoreTx> {
        Ok(StoreTx {
            tx: self.pool.begin().await?,
        })
    }

    /// Gets a record by id.
    pub async fn get<R: Record>(&self, id: &str) -> DbResult<Option<R>> {
        let mut conn = self.pool.acquire().await?;
        get_record(&mut conn, id).await
    }

    /// Gets a record by id or fails with [`DbError::NotFound`].
    pub async fn require<R: Record>(&self, entity: &str, id: &str) -> DbResult<R> {
        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found(entity, id))
    }

    /// Returns every record of the collection, in insertion order.
    pub async fn get_all<R: Record>(&self) -> DbResult<Vec<R>> {
        let bodies: Vec<String> = sqlx::query_scalar(
            "SELECT body FROM records WHERE collection = ?1 ORDER BY rowid",
        )
        .bind(R::COLLECTION)
        .fetch_all(&self.pool)
        .await?;

        decode_all(bodies)
    }

    /// Returns the records whose indexed `attribute` equals `value`.
    pub async fn get_by_index<R: Record>(
        &self,
        attribute: &str,
        value: impl Into<IndexValue>,
    ) -> DbResult<Vec<R>> {
        ensure_indexed::<R>(attribute)?;

        let query = sqlx::query_scalar::<_, String>(
            r#"
            SELECT r.body
            FROM records r
            INNER JOIN record_index i
                ON i.collection = r.collection AND i.record_id = r.id
            WHERE r.collection = ?1
            AND i.attribute = ?2
            AND i.value = ?3
            ORDER BY r.rowid
            "#,
        )
        .bind(R::COLLECTION)
        .bind(attribute);

        let bodies = match value.into() {
            IndexValue::Text(v) => query.bind(v).fetch_all(&self.pool).await?,
            IndexValue::Int(v) => query.bind(v).fetch_all(&self.pool).await?,
            IndexValue::Bool(v) => query.bind(v).fetch_all(&self.pool).await?,
        };

        decode_all(bodies)
    }

    /// Returns the single record holding a unique attribute value.
    pub async fn get_unique<R: Record>(
        &self,
        attribute: &str,
        value: impl Into<IndexValue>,
    ) -> DbResult<Option<R>> {
        Ok(self.get_by_index(attribute, value).await?.into_iter().next())
    }

    /// Counts the records whose indexed `attribute` equals `value`.
    pub async fn count_by_index<R: Record>(
        &self,
        attribute: &str,
        value: impl Into<IndexValue>,
    ) -> DbResult<u64> {
        ensure_indexed::<R>(attribute)?;

        let query = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM record_index
            WHERE collection = ?1 AND attribute = ?2 AND value = ?3
            "#,
        )
        .bind(R::COLLECTION)
        .bind(attribute);

        let count = match value.into() {
            IndexValue::Text(v) => query.bind(v).fetch_one(&self.pool).await?,
            IndexValue::Int(v) => query.bind(v).fetch_one(&self.pool).await?,
            IndexValue::Bool(v) => query.bind(v).fetch_one(&self.pool).await?,
        };

        Ok(count as u64)
    }

    /// Counts the records of a collection.
    pub async fn count<R: Record>(&self) -> DbResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE collection = ?1")
            .bind(R::COLLECTION)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    /// Inserts or replaces a record by id.
    pub async fn put<R: Record>(&self, record: &R) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        put_record(&mut tx, record).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Inserts or replaces several records in one transaction.
    pub async fn put_many<R: Record>(&self, records: &[R]) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        for record in records {
            put_record(&mut tx, record).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Deletes a record by id. Returns false when it did not exist.
    pub async fn delete<R: Record>(&self, id: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM records WHERE collection = ?1 AND id = ?2")
            .bind(R::COLLECTION)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Removes every record of a collection.
    pub async fn clear<R: Record>(&self) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM records WHERE collection = ?1")
            .bind(R::COLLECTION)
            .execute(&self.pool)
            .await?;
        debug!(collection = R::COLLECTION, removed = result.rows_affected(), "Collection cleared");
        Ok(result.rows_affected())
    }

    /// Clears a collection and refills it in one transaction. On any error
    /// the previous contents stay in place.
    pub async fn replace_all<R: Record>(&self, records: &[R]) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM records WHERE collection = ?1")
            .bind(R::COLLECTION)
            .execute(&mut *tx)
            .await?;

        for record in records {
            put_record(&mut tx, record).await?;
        }

        tx.commit().await?;
        debug!(collection = R::COLLECTION, count = records.len(), "Collection replaced");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Sync flag helpers
    // -------------------------------------------------------------------------

    /// Records still waiting for upload.
    pub async fn pending<R: SyncTracked>(&self) -> DbResult<Vec<R>> {
        self.get_by_index("synced", false).await
    }

    /// Number of records still waiting for upload.
    pub async fn count_pending<R: SyncTracked>(&self) -> DbResult<u64> {
        self.count_by_index::<R>("synced", false).await
    }

    /// Sets the sync flag of a stored record.
    pub async fn mark_synced<R: SyncTracked>(&self, id: &str) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        let mut record: R = get_record(&mut tx, id)
            .await?
            .ok_or_else(|| DbError::not_found(R::COLLECTION, id))?;
        record.set_synced(true);
        put_record(&mut tx, &record).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Sets the sync flag only if the stored record still equals `uploaded`.
    ///
    /// Returns false when the record changed after the snapshot was taken;
    /// it then stays pending and goes up with the next sync.
    pub async fn mark_synced_if_unchanged<R: SyncTracked>(&self, uploaded: &R) -> DbResult<bool> {
        let mut tx = self.begin().await?;
        let marked = tx.mark_synced_if_unchanged(uploaded).await?;
        tx.commit().await?;
        Ok(marked)
    }
}

// =============================================================================
// Transactions
// =============================================================================

/// A transaction over the Local Store. Dropped without [`StoreTx::commit`],
/// every write is rolled back.
pub struct StoreTx {
    tx: Transaction<'static, Sqlite>,
}

impl StoreTx {
    pub async fn get<R: Record>(&mut self, id: &str) -> DbResult<Option<R>> {
        get_record(&mut self.tx, id).await
    }

    pub async fn exists<R: Record>(&mut self, id: &str) -> DbResult<bool> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM records WHERE collection = ?1 AND id = ?2")
                .bind(R::COLLECTION)
                .bind(id)
                .fetch_optional(&mut *self.tx)
                .await?;
        Ok(found.is_some())
    }

    pub async fn put<R: Record>(&mut self, record: &R) -> DbResult<()> {
        put_record(&mut self.tx, record).await
    }

    /// Gets a record by id or fails with [`DbError::NotFound`].
    pub async fn require<R: Record>(&mut self, entity: &str, id: &str) -> DbResult<R> {
        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found(entity, id))
    }

    /// Records whose indexed `attribute` equals the text `value`, read
    /// inside this transaction.
    pub async fn get_by_text_index<R: Record>(&mut self, attribute: &str, value: &str) -> DbResult<Vec<R>> {
        ensure_indexed::<R>(attribute)?;

        let bodies: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT r.body
            FROM records r
            INNER JOIN record_index i
                ON i.collection = r.collection AND i.record_id = r.id
            WHERE r.collection = ?1
            AND i.attribute = ?2
            AND i.value = ?3
            ORDER BY r.rowid
            "#,
        )
        .bind(R::COLLECTION)
        .bind(attribute)
        .bind(value)
        .fetch_all(&mut *self.tx)
        .await?;

        decode_all(bodies)
    }

    /// Compare-and-set of the sync flag; see
    /// [`LocalStore::mark_synced_if_unchanged`].
    pub async fn mark_synced_if_unchanged<R: SyncTracked>(&mut self, uploaded: &R) -> DbResult<bool> {
        let id = uploaded.id();
        let mut current: R = self.require(R::COLLECTION, id).await?;

        if serde_json::to_value(&current)? != serde_json::to_value(uploaded)? {
            debug!(collection = R::COLLECTION, id = %id, "Changed during upload, left pending");
            return Ok(false);
        }

        current.set_synced(true);
        put_record(&mut self.tx, &current).await?;
        Ok(true)
    }

    pub async fn commit(self) -> DbResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

// =============================================================================
// Connection-level helpers
// =============================================================================

fn ensure_indexed<R: Record>(attribute: &str) -> DbResult<()> {
    if !R::is_indexed(attribute) {
        return Err(DbError::UnknownIndex {
            collection: R::COLLECTION.to_string(),
            attribute: attribute.to_string(),
        });
    }
    Ok(())
}

fn decode_all<R: Record>(bodies: Vec<String>) -> DbResult<Vec<R>> {
    bodies
        .iter()
        .map(|body| serde_json::from_str(body).map_err(DbError::from))
        .collect()
}

async fn get_record<R: Record>(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<R>> {
    let body: Option<String> =
        sqlx::query_scalar("SELECT body FROM records WHERE collection = ?1 AND id = ?2")
            .bind(R::COLLECTION)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

    match body {
        Some(body) => Ok(Some(serde_json::from_str(&body)?)),
        None => Ok(None),
    }
}

async fn put_record<R: Record>(conn: &mut SqliteConnection, record: &R) -> DbResult<()> {
    let id = record.id();
    let body = serde_json::to_string(record)?;

    sqlx::query(
        r#"
        INSERT INTO records (collection, id, body, updated_at)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT (collection, id)
        DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at
        "#,
    )
    .bind(R::COLLECTION)
    .bind(id)
    .bind(&body)
    .bind(Utc::now().to_rfc3339())
    .execute(&mut *conn)
    .await?;

    sqlx::query("DELETE FROM record_index WHERE collection = ?1 AND record_id = ?2")
        .bind(R::COLLECTION)
        .bind(id)
        .execute(&mut *conn)
        .await?;

    for (attribute, value) in record.index_values() {
        let is_unique = R::UNIQUE_INDEXES.contains(&attribute);

        let query = sqlx::query(
            r#"
            INSERT INTO record_index (collection, record_id, attribute, value, is_unique)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(R::COLLECTION)
        .bind(id)
        .bind(attribute);

        let result = match &value {
            IndexValue::Text(v) => query.bind(v.as_str()).bind(is_unique).execute(&mut *conn).await,
            IndexValue::Int(v) => query.bind(*v).bind(is_unique).execute(&mut *conn).await,
            IndexValue::Bool(v) => query.bind(*v).bind(is_unique).execute(&mut *conn).await,
        };

        match result.map_err(DbError::from) {
            Ok(_) => {}
            Err(DbError::UniqueViolation { .. }) => {
                return Err(DbError::duplicate(
                    format!("{}.{}", R::COLLECTION, attribute),
                    value.to_string(),
                ));
            }
            Err(err) => return Err(err),
        }
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
