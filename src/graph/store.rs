use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use super::{GraphNode, MemorySummary, NodePath, PeerAssociation};
use crate::error::{StorageError, StorageResult};
use crate::storage::Database;

/// CRUD store over the hierarchical node graph.
///
/// Path allocation for new children is serialized through a store-level
/// async mutex so concurrent maintenance and turn-triggered writes cannot
/// collide on the same local index. Multi-statement writes run inside a
/// transaction; the `_on` variants take an explicit connection so a caller
/// can batch several operations into one transaction.
#[derive(Clone)]
pub struct GraphStore {
    db: Database,
    alloc: Arc<Mutex<()>>,
}

impl GraphStore {
    /// Create a new graph store over the shared database
    pub fn new(db: Database) -> Self {
        Self {
            db,
            alloc: Arc::new(Mutex::new(())),
        }
    }

    pub(crate) fn database(&self) -> &Database {
        &self.db
    }

    /// Take the index-allocation lock for an externally managed write batch
    pub(crate) async fn alloc_guard(&self) -> MutexGuard<'_, ()> {
        self.alloc.lock().await
    }

    /// Ensure the distinguished root node exists
    pub async fn ensure_root(&self) -> StorageResult<()> {
        let inserted = sqlx::query(
            r#"
            INSERT OR IGNORE INTO graph_nodes (path, parent_path, local_index, content, confidence, created_at)
            VALUES ('root', NULL, 0, 'Knowledge root', 1.0, ?)
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .execute(self.db.pool())
        .await?;

        if inserted.rows_affected() > 0 {
            info!("Root node created");
        }
        Ok(())
    }

    /// Create a new child node under `parent`.
    ///
    /// The local index is the smallest unused positive integer among the
    /// parent's current children.
    pub async fn create_node(
        &self,
        parent: &NodePath,
        content: &str,
        confidence: f64,
    ) -> StorageResult<NodePath> {
        let _guard = self.alloc.lock().await;
        let mut conn = self.db.pool().acquire().await?;
        self.create_node_on(&mut conn, parent, content, confidence)
            .await
    }

    pub(crate) async fn create_node_on(
        &self,
        conn: &mut SqliteConnection,
        parent: &NodePath,
        content: &str,
        confidence: f64,
    ) -> StorageResult<NodePath> {
        if !self.node_exists_on(&mut *conn, parent).await? {
            return Err(StorageError::ParentNotFound {
                path: parent.to_string(),
            });
        }

        let used: Vec<(i64,)> =
            sqlx::query_as("SELECT local_index FROM graph_nodes WHERE parent_path = ?")
                .bind(parent.as_str())
                .fetch_all(&mut *conn)
                .await?;
        let used: std::collections::HashSet<i64> = used.into_iter().map(|(i,)| i).collect();

        let mut index = 1u32;
        while used.contains(&(index as i64)) {
            index += 1;
        }

        let path = parent.child(index);
        self.insert_row_on(&mut *conn, &path, parent, index, content, confidence)
            .await?;

        debug!(path = %path, parent = %parent, "Node created");
        Ok(path)
    }

    /// Create a node at an explicit path (used by maintenance commits).
    ///
    /// The parent derived from the path must already exist.
    pub async fn create_node_at(
        &self,
        path: &NodePath,
        content: &str,
        confidence: f64,
    ) -> StorageResult<()> {
        let _guard = self.alloc.lock().await;
        let mut conn = self.db.pool().acquire().await?;
        self.create_node_at_on(&mut conn, path, content, confidence)
            .await
    }

    pub(crate) async fn create_node_at_on(
        &self,
        conn: &mut SqliteConnection,
        path: &NodePath,
        content: &str,
        confidence: f64,
    ) -> StorageResult<()> {
        let parent = path.parent().ok_or(StorageError::InvalidPath {
            path: path.to_string(),
        })?;
        if !self.node_exists_on(&mut *conn, &parent).await? {
            return Err(StorageError::ParentNotFound {
                path: parent.to_string(),
            });
        }

        let index = path.local_index().ok_or(StorageError::InvalidPath {
            path: path.to_string(),
        })?;
        self.insert_row_on(&mut *conn, path, &parent, index, content, confidence)
            .await?;

        debug!(path = %path, "Node created at explicit path");
        Ok(())
    }

    async fn insert_row_on(
        &self,
        conn: &mut SqliteConnection,
        path: &NodePath,
        parent: &NodePath,
        index: u32,
        content: &str,
        confidence: f64,
    ) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO graph_nodes (path, parent_path, local_index, content, confidence, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(path.as_str())
        .bind(parent.as_str())
        .bind(index as i64)
        .bind(content)
        .bind(confidence)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Whether a node exists at the given path
    pub async fn node_exists(&self, path: &NodePath) -> StorageResult<bool> {
        let mut conn = self.db.pool().acquire().await?;
        self.node_exists_on(&mut conn, path).await
    }

    pub(crate) async fn node_exists_on(
        &self,
        conn: &mut SqliteConnection,
        path: &NodePath,
    ) -> StorageResult<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM graph_nodes WHERE path = ?")
            .bind(path.as_str())
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.is_some())
    }

    /// Fetch a node with its derived child list and attached links
    pub async fn get_node(&self, path: &NodePath) -> StorageResult<Option<GraphNode>> {
        let row: Option<NodeRow> = sqlx::query_as(
            "SELECT path, content, confidence, created_at FROM graph_nodes WHERE path = ?",
        )
        .bind(path.as_str())
        .fetch_optional(self.db.pool())
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let children: Vec<(String,)> = sqlx::query_as(
            "SELECT path FROM graph_nodes WHERE parent_path = ? ORDER BY local_index ASC",
        )
        .bind(path.as_str())
        .fetch_all(self.db.pool())
        .await?;

        let summaries: Vec<MemoryLinkRow> = sqlx::query_as(
            r#"
            SELECT memory_id, snippet, memory_type, value_tier, confidence
            FROM memory_links
            WHERE node_path = ?
            ORDER BY memory_id ASC
            "#,
        )
        .bind(path.as_str())
        .fetch_all(self.db.pool())
        .await?;

        let peers: Vec<(String, f64)> = sqlx::query_as(
            "SELECT to_path, weight FROM peer_links WHERE from_path = ? ORDER BY weight DESC",
        )
        .bind(path.as_str())
        .fetch_all(self.db.pool())
        .await?;

        Ok(Some(GraphNode {
            path: NodePath::parse(&row.path)?,
            content: row.content,
            confidence: row.confidence,
            created_at: parse_timestamp(&row.created_at),
            child_ids: children
                .into_iter()
                .filter_map(|(p,)| NodePath::parse(&p).ok())
                .collect(),
            memory_summaries: summaries.into_iter().map(|r| r.into()).collect(),
            peer_associations: peers
                .into_iter()
                .filter_map(|(p, w)| {
                    NodePath::parse(&p)
                        .ok()
                        .map(|target| PeerAssociation { target, weight: w })
                })
                .collect(),
        }))
    }

    /// Whole-document replace of a node's content, confidence and links.
    ///
    /// Path, child list and creation time are not updatable through this
    /// contract. The replace runs in one transaction, so a fault cannot
    /// leave the node stripped of its links.
    pub async fn update_node(&self, node: &GraphNode) -> StorageResult<()> {
        let mut tx = self.db.pool().begin().await?;
        self.update_node_on(&mut tx, node).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn update_node_on(
        &self,
        conn: &mut SqliteConnection,
        node: &GraphNode,
    ) -> StorageResult<()> {
        self.update_node_fields_on(&mut *conn, &node.path, &node.content, node.confidence)
            .await?;

        sqlx::query("DELETE FROM memory_links WHERE node_path = ?")
            .bind(node.path.as_str())
            .execute(&mut *conn)
            .await?;
        for summary in &node.memory_summaries {
            self.insert_memory_link_on(&mut *conn, &node.path, summary)
                .await?;
        }

        sqlx::query("DELETE FROM peer_links WHERE from_path = ?")
            .bind(node.path.as_str())
            .execute(&mut *conn)
            .await?;
        for peer in &node.peer_associations {
            sqlx::query(
                "INSERT OR REPLACE INTO peer_links (from_path, to_path, weight) VALUES (?, ?, ?)",
            )
            .bind(node.path.as_str())
            .bind(peer.target.as_str())
            .bind(peer.weight)
            .execute(&mut *conn)
            .await?;
        }

        Ok(())
    }

    /// Replace only a node's content and confidence
    pub(crate) async fn update_node_fields_on(
        &self,
        conn: &mut SqliteConnection,
        path: &NodePath,
        content: &str,
        confidence: f64,
    ) -> StorageResult<()> {
        let result = sqlx::query("UPDATE graph_nodes SET content = ?, confidence = ? WHERE path = ?")
            .bind(content)
            .bind(confidence)
            .bind(path.as_str())
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NodeNotFound {
                path: path.to_string(),
            });
        }
        Ok(())
    }

    /// Delete a node and its whole subtree (cascade policy).
    ///
    /// Attached memory links and peer links are removed with the subtree in
    /// one transaction. Deleting root is rejected explicitly.
    pub async fn delete_node(&self, path: &NodePath) -> StorageResult<()> {
        if path.is_root() {
            return Err(StorageError::RootImmutable);
        }
        if !self.node_exists(path).await? {
            return Err(StorageError::NodeNotFound {
                path: path.to_string(),
            });
        }

        let subtree_pattern = format!("{}.%", path.as_str());
        let mut tx = self.db.pool().begin().await?;

        sqlx::query("DELETE FROM memory_links WHERE node_path = ? OR node_path LIKE ?")
            .bind(path.as_str())
            .bind(&subtree_pattern)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            DELETE FROM peer_links
            WHERE from_path = ? OR from_path LIKE ? OR to_path = ? OR to_path LIKE ?
            "#,
        )
        .bind(path.as_str())
        .bind(&subtree_pattern)
        .bind(path.as_str())
        .bind(&subtree_pattern)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query("DELETE FROM graph_nodes WHERE path = ? OR path LIKE ?")
            .bind(path.as_str())
            .bind(&subtree_pattern)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(path = %path, removed = result.rows_affected(), "Subtree deleted");
        Ok(())
    }

    /// Attach a memory summary to a node
    pub async fn add_memory_link(
        &self,
        path: &NodePath,
        summary: &MemorySummary,
    ) -> StorageResult<()> {
        let mut conn = self.db.pool().acquire().await?;
        self.add_memory_link_on(&mut conn, path, summary).await
    }

    pub(crate) async fn add_memory_link_on(
        &self,
        conn: &mut SqliteConnection,
        path: &NodePath,
        summary: &MemorySummary,
    ) -> StorageResult<()> {
        if !self.node_exists_on(&mut *conn, path).await? {
            return Err(StorageError::NodeNotFound {
                path: path.to_string(),
            });
        }
        self.insert_memory_link_on(&mut *conn, path, summary).await
    }

    async fn insert_memory_link_on(
        &self,
        conn: &mut SqliteConnection,
        path: &NodePath,
        summary: &MemorySummary,
    ) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO memory_links (node_path, memory_id, snippet, memory_type, value_tier, confidence)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(path.as_str())
        .bind(summary.memory_id)
        .bind(&summary.snippet)
        .bind(summary.memory_type.to_string())
        .bind(summary.value_tier.map(|t| t.to_string()))
        .bind(summary.confidence)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Add a weighted association between two non-ancestor nodes
    pub async fn add_peer_association(
        &self,
        from: &NodePath,
        to: &NodePath,
        weight: f64,
    ) -> StorageResult<()> {
        if !self.node_exists(from).await? {
            return Err(StorageError::NodeNotFound {
                path: from.to_string(),
            });
        }
        if !self.node_exists(to).await? {
            return Err(StorageError::NodeNotFound {
                path: to.to_string(),
            });
        }

        sqlx::query(
            "INSERT OR REPLACE INTO peer_links (from_path, to_path, weight) VALUES (?, ?, ?)",
        )
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(weight)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

// Internal row types for SQLx mapping
#[derive(sqlx::FromRow)]
struct NodeRow {
    path: String,
    content: String,
    confidence: f64,
    created_at: String,
}

#[derive(sqlx::FromRow)]
struct MemoryLinkRow {
    memory_id: i64,
    snippet: String,
    memory_type: String,
    value_tier: Option<String>,
    confidence: f64,
}

impl From<MemoryLinkRow> for MemorySummary {
    fn from(row: MemoryLinkRow) -> Self {
        Self {
            memory_id: row.memory_id,
            snippet: row.snippet,
            memory_type: row.memory_type.parse().unwrap_or_default(),
            value_tier: row.value_tier.and_then(|t| t.parse().ok()),
            confidence: row.confidence,
        }
    }
}
