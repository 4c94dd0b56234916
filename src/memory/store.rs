use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::{debug, warn};

use super::{MemoryRecord, MemoryType, NewMemory};
use crate::error::{StorageError, StorageResult};
use crate::graph::NodePath;
use crate::storage::Database;

/// CRUD store over episodic memory records.
///
/// IDs come from the table's AUTOINCREMENT counter, which SQLite keeps
/// monotonic and durable across deletions and restarts. The `_on` variants
/// take an explicit connection so a caller can batch operations into one
/// transaction.
#[derive(Clone)]
pub struct MemoryStore {
    db: Database,
}

impl MemoryStore {
    /// Create a new memory store over the shared database
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a new record and return its allocated id
    pub async fn create(&self, memory: &NewMemory) -> StorageResult<i64> {
        let mut conn = self.db.pool().acquire().await?;
        self.create_on(&mut conn, memory).await
    }

    pub(crate) async fn create_on(
        &self,
        conn: &mut SqliteConnection,
        memory: &NewMemory,
    ) -> StorageResult<i64> {
        let linked = serde_json::to_string(&memory.linked_node_ids).unwrap_or_else(|_| "[]".into());

        let result = sqlx::query(
            r#"
            INSERT INTO memory_records (content, memory_type, value_tier, confidence, status, created_at, linked_node_ids)
            VALUES (?, ?, ?, ?, 'active', ?, ?)
            "#,
        )
        .bind(&memory.content)
        .bind(memory.memory_type.to_string())
        .bind(memory.value_tier.map(|t| t.to_string()))
        .bind(memory.confidence)
        .bind(Utc::now().to_rfc3339())
        .bind(&linked)
        .execute(&mut *conn)
        .await?;

        let id = result.last_insert_rowid();
        debug!(id, memory_type = %memory.memory_type, "Memory record created");
        Ok(id)
    }

    /// Fetch a record by id
    pub async fn get(&self, id: i64) -> StorageResult<Option<MemoryRecord>> {
        let mut conn = self.db.pool().acquire().await?;
        self.get_on(&mut conn, id).await
    }

    pub(crate) async fn get_on(
        &self,
        conn: &mut SqliteConnection,
        id: i64,
    ) -> StorageResult<Option<MemoryRecord>> {
        let row: Option<MemoryRow> = sqlx::query_as(
            r#"
            SELECT id, content, memory_type, value_tier, confidence, status, created_at, linked_node_ids
            FROM memory_records
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    /// Resolve a batch of ids, silently skipping those that no longer exist.
    ///
    /// Graph-side summaries may lag behind the store, so unresolvable ids are
    /// expected and only logged.
    pub async fn get_many(&self, ids: &[i64]) -> StorageResult<Vec<MemoryRecord>> {
        let mut records = Vec::with_capacity(ids.len());
        for &id in ids {
            match self.get(id).await? {
                Some(record) => records.push(record),
                None => warn!(id, "Memory id did not resolve, dropping"),
            }
        }
        Ok(records)
    }

    /// Whole-document replace of a record's mutable fields.
    ///
    /// Id and creation time are fixed at allocation.
    pub async fn update(&self, record: &MemoryRecord) -> StorageResult<()> {
        let mut conn = self.db.pool().acquire().await?;
        self.update_on(&mut conn, record).await
    }

    pub(crate) async fn update_on(
        &self,
        conn: &mut SqliteConnection,
        record: &MemoryRecord,
    ) -> StorageResult<()> {
        let linked = serde_json::to_string(&record.linked_node_ids).unwrap_or_else(|_| "[]".into());

        let result = sqlx::query(
            r#"
            UPDATE memory_records
            SET content = ?, memory_type = ?, value_tier = ?, confidence = ?, status = ?, linked_node_ids = ?
            WHERE id = ?
            "#,
        )
        .bind(&record.content)
        .bind(record.memory_type.to_string())
        .bind(record.value_tier.map(|t| t.to_string()))
        .bind(record.confidence)
        .bind(record.status.to_string())
        .bind(&linked)
        .bind(record.id)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::MemoryNotFound { id: record.id });
        }
        Ok(())
    }

    /// Deprecate a record: confidence forced to 0, status flagged.
    ///
    /// Records are never hard-deleted by normal operation.
    pub async fn deprecate(&self, id: i64) -> StorageResult<()> {
        let mut conn = self.db.pool().acquire().await?;
        self.deprecate_on(&mut conn, id).await
    }

    pub(crate) async fn deprecate_on(
        &self,
        conn: &mut SqliteConnection,
        id: i64,
    ) -> StorageResult<()> {
        let result = sqlx::query(
            "UPDATE memory_records SET status = 'deprecated', confidence = 0.0 WHERE id = ?",
        )
        .bind(id)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::MemoryNotFound { id });
        }
        debug!(id, "Memory record deprecated");
        Ok(())
    }

    /// Active records of a type, highest confidence first
    pub async fn list_by_type(
        &self,
        memory_type: MemoryType,
        limit: usize,
    ) -> StorageResult<Vec<MemoryRecord>> {
        let rows: Vec<MemoryRow> = sqlx::query_as(
            r#"
            SELECT id, content, memory_type, value_tier, confidence, status, created_at, linked_node_ids
            FROM memory_records
            WHERE memory_type = ? AND status = 'active'
            ORDER BY confidence DESC, created_at DESC
            LIMIT ?
            "#,
        )
        .bind(memory_type.to_string())
        .bind(limit as i64)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    /// Most recent active working-tier records, newest first
    pub async fn recent_working(&self, limit: usize) -> StorageResult<Vec<MemoryRecord>> {
        let rows: Vec<MemoryRow> = sqlx::query_as(
            r#"
            SELECT id, content, memory_type, value_tier, confidence, status, created_at, linked_node_ids
            FROM memory_records
            WHERE memory_type = 'working' AND status = 'active'
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    /// Number of active working-tier records awaiting integration
    pub async fn count_working(&self) -> StorageResult<u64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM memory_records WHERE memory_type = 'working' AND status = 'active'",
        )
        .fetch_one(self.db.pool())
        .await?;
        Ok(count as u64)
    }
}

// Internal row type for SQLx mapping
#[derive(sqlx::FromRow)]
struct MemoryRow {
    id: i64,
    content: String,
    memory_type: String,
    value_tier: Option<String>,
    confidence: f64,
    status: String,
    created_at: String,
    linked_node_ids: String,
}

impl From<MemoryRow> for MemoryRecord {
    fn from(row: MemoryRow) -> Self {
        Self {
            id: row.id,
            content: row.content,
            memory_type: row.memory_type.parse().unwrap_or_default(),
            value_tier: row.value_tier.and_then(|t| t.parse().ok()),
            confidence: row.confidence,
            status: row.status.parse().unwrap_or_default(),
            created_at: DateTime::parse_from_rfc3339(&row.created_at)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            linked_node_ids: serde_json::from_str::<Vec<NodePath>>(&row.linked_node_ids)
                .unwrap_or_default(),
        }
    }
}
