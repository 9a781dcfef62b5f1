//! SQLite-backed storage + graph adapter
//!
//! The default `MemoryStorage`/`GraphStore` implementation: a single file
//! (or in-memory, for tests) SQLite database with an FTS5 virtual table for
//! full-text search, mirroring the teacher's `storage/sqlite.rs`
//! reader/writer-connection-pair idiom. `rusqlite::Connection` is not
//! `Sync`, so both connections are held behind a `Mutex` the way the
//! teacher does.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};
use crate::model::{Direction, GraphEdge, GraphNode, Layer, MemoryRecord};

use super::graph::GraphStore;
use super::storage::{MemoryFilter, MemoryStorage, SearchHit};

/// SQLite-backed implementation of [`MemoryStorage`] and [`GraphStore`].
pub struct SqliteAdapter {
    conn: Mutex<Connection>,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    project TEXT NOT NULL,
    agent_id TEXT NOT NULL,
    session_id TEXT,
    content TEXT NOT NULL,
    layer TEXT NOT NULL,
    memory_type TEXT NOT NULL,
    source TEXT NOT NULL,
    importance REAL NOT NULL,
    strength REAL NOT NULL,
    tags TEXT NOT NULL,
    metadata TEXT NOT NULL,
    embedding TEXT,
    created_at TEXT NOT NULL,
    modified_at TEXT NOT NULL,
    last_accessed_at TEXT NOT NULL,
    expires_at TEXT,
    access_count INTEGER NOT NULL,
    usage_count INTEGER NOT NULL,
    version INTEGER NOT NULL,
    info_class TEXT NOT NULL,
    provenance TEXT NOT NULL,
    sync_metadata TEXT NOT NULL,
    is_consolidated INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_memories_tenant ON memories(tenant_id);
CREATE INDEX IF NOT EXISTS idx_memories_tenant_layer ON memories(tenant_id, layer);
CREATE INDEX IF NOT EXISTS idx_memories_session ON memories(tenant_id, session_id);

CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(
    id UNINDEXED,
    tenant_id UNINDEXED,
    content
);

CREATE TABLE IF NOT EXISTS graph_nodes (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    label TEXT NOT NULL,
    properties TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_graph_nodes_tenant ON graph_nodes(tenant_id);

CREATE TABLE IF NOT EXISTS graph_edges (
    source_id TEXT NOT NULL,
    target_id TEXT NOT NULL,
    tenant_id TEXT NOT NULL,
    relation TEXT NOT NULL,
    weight REAL NOT NULL,
    properties TEXT NOT NULL,
    PRIMARY KEY (source_id, target_id, relation)
);
CREATE INDEX IF NOT EXISTS idx_graph_edges_source ON graph_edges(tenant_id, source_id);
CREATE INDEX IF NOT EXISTS idx_graph_edges_target ON graph_edges(tenant_id, target_id);
";

impl SqliteAdapter {
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Opens the default on-disk database under the platform's standard
    /// data directory (`~/.local/share/memoria` on Linux, etc.), creating
    /// it on first run. Mirrors the teacher's `Storage::new(None)` path:
    /// the data directory is created with `0700` and the database file
    /// with `0600` on Unix so a multi-user host can't read another
    /// tenant's memories off disk.
    pub fn open_default() -> StorageResult<Self> {
        let proj_dirs = directories::ProjectDirs::from("com", "memoria", "core")
            .ok_or_else(|| StorageError::Init("could not determine a data directory for this platform".to_string()))?;
        let data_dir = proj_dirs.data_dir();
        std::fs::create_dir_all(data_dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(data_dir, std::fs::Permissions::from_mode(0o700));
        }
        let path = data_dir.join("memoria.db");
        let existed = path.exists();
        let adapter = Self::open(&path)?;
        #[cfg(unix)]
        if !existed {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600));
        }
        Ok(adapter)
    }

    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> StorageResult<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .or_else(|_| conn.execute_batch("PRAGMA foreign_keys = ON;"))?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<MemoryRecord> {
        let tags_json: String = row.get("tags")?;
        let metadata_json: String = row.get("metadata")?;
        let embedding_json: Option<String> = row.get("embedding")?;
        let provenance_json: String = row.get("provenance")?;
        let sync_json: String = row.get("sync_metadata")?;
        let layer_str: String = row.get("layer")?;
        let memory_type_str: String = row.get("memory_type")?;
        let info_class_str: String = row.get("info_class")?;

        Ok(MemoryRecord {
            id: Uuid::parse_str(&row.get::<_, String>("id")?).unwrap_or_default(),
            tenant_id: row.get("tenant_id")?,
            project: row.get("project")?,
            agent_id: row.get("agent_id")?,
            session_id: row.get("session_id")?,
            content: row.get("content")?,
            layer: layer_str.parse().unwrap_or(Layer::Working),
            memory_type: serde_json::from_str(&format!("\"{memory_type_str}\"")).unwrap_or_default(),
            source: row.get("source")?,
            importance: row.get("importance")?,
            strength: row.get("strength")?,
            tags: serde_json::from_str(&tags_json).unwrap_or_default(),
            metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
            embedding: embedding_json.and_then(|s| serde_json::from_str(&s).ok()),
            created_at: row.get::<_, String>("created_at")?.parse().unwrap_or_else(|_| Utc::now()),
            modified_at: row.get::<_, String>("modified_at")?.parse().unwrap_or_else(|_| Utc::now()),
            last_accessed_at: row.get::<_, String>("last_accessed_at")?.parse().unwrap_or_else(|_| Utc::now()),
            expires_at: row
                .get::<_, Option<String>>("expires_at")?
                .and_then(|s| s.parse::<DateTime<Utc>>().ok()),
            access_count: row.get::<_, i64>("access_count")? as u64,
            usage_count: row.get::<_, i64>("usage_count")? as u64,
            version: row.get::<_, i64>("version")? as u64,
            info_class: serde_json::from_str(&format!("\"{info_class_str}\"")).unwrap_or_default(),
            provenance: serde_json::from_str(&provenance_json).unwrap_or_default(),
            sync_metadata: serde_json::from_str(&sync_json).unwrap_or_default(),
            is_consolidated: row.get::<_, i64>("is_consolidated")? != 0,
        })
    }

    fn insert(conn: &Connection, record: &MemoryRecord) -> rusqlite::Result<()> {
        conn.execute(
            "INSERT OR REPLACE INTO memories (
                id, tenant_id, project, agent_id, session_id, content, layer, memory_type,
                source, importance, strength, tags, metadata, embedding, created_at,
                modified_at, last_accessed_at, expires_at, access_count, usage_count,
                version, info_class, provenance, sync_metadata, is_consolidated
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,?21,?22,?23,?24,?25)",
            params![
                record.id.to_string(),
                record.tenant_id,
                record.project,
                record.agent_id,
                record.session_id,
                record.content,
                record.layer.as_str(),
                record.memory_type.as_str(),
                record.source,
                record.importance,
                record.strength,
                serde_json::to_string(&record.tags).unwrap_or_default(),
                serde_json::to_string(&record.metadata).unwrap_or_default(),
                record.embedding.as_ref().map(|e| serde_json::to_string(e).unwrap_or_default()),
                record.created_at.to_rfc3339(),
                record.modified_at.to_rfc3339(),
                record.last_accessed_at.to_rfc3339(),
                record.expires_at.map(|d| d.to_rfc3339()),
                record.access_count as i64,
                record.usage_count as i64,
                record.version as i64,
                record.info_class.as_str(),
                serde_json::to_string(&record.provenance).unwrap_or_default(),
                serde_json::to_string(&record.sync_metadata).unwrap_or_default(),
                record.is_consolidated as i64,
            ],
        )?;
        conn.execute(
            "INSERT OR REPLACE INTO memories_fts (rowid, id, tenant_id, content)
             SELECT (SELECT rowid FROM memories WHERE id = ?1), ?1, ?2, ?3",
            params![record.id.to_string(), record.tenant_id, record.content],
        )?;
        Ok(())
    }

    fn build_filter_sql(tenant_id: &str, filter: &MemoryFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut sql = String::from("tenant_id = ?1");
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(tenant_id.to_string())];

        if let Some(agent_id) = &filter.agent_id {
            values.push(Box::new(agent_id.clone()));
            sql.push_str(&format!(" AND agent_id = ?{}", values.len()));
        }
        if let Some(layer) = filter.layer {
            values.push(Box::new(layer.as_str().to_string()));
            sql.push_str(&format!(" AND layer = ?{}", values.len()));
        }
        if let Some(session_id) = &filter.session_id {
            values.push(Box::new(session_id.clone()));
            sql.push_str(&format!(" AND session_id = ?{}", values.len()));
        }
        if let Some(source) = &filter.source {
            values.push(Box::new(source.clone()));
            sql.push_str(&format!(" AND source = ?{}", values.len()));
        }
        if let Some(min_importance) = filter.min_importance {
            values.push(Box::new(min_importance));
            sql.push_str(&format!(" AND importance >= ?{}", values.len()));
        }
        if let Some(after) = filter.created_after {
            values.push(Box::new(after.to_rfc3339()));
            sql.push_str(&format!(" AND created_at >= ?{}", values.len()));
        }
        if let Some(before) = filter.created_before {
            values.push(Box::new(before.to_rfc3339()));
            sql.push_str(&format!(" AND created_at <= ?{}", values.len()));
        }
        if filter.exclude_consolidated {
            sql.push_str(" AND is_consolidated = 0");
        }
        if let Some(tags) = &filter.tags {
            for tag in tags {
                values.push(Box::new(format!("%\"{tag}\"%")));
                sql.push_str(&format!(" AND tags LIKE ?{}", values.len()));
            }
        }
        if let Some((key, value)) = &filter.metadata_equals {
            let needle = format!("%\"{key}\":{}%", value);
            values.push(Box::new(needle));
            sql.push_str(&format!(" AND metadata LIKE ?{}", values.len()));
        }
        (sql, values)
    }
}

#[async_trait]
impl MemoryStorage for SqliteAdapter {
    async fn store_memory(&self, record: MemoryRecord) -> StorageResult<Uuid> {
        let conn = self.lock();
        Self::insert(&conn, &record)?;
        Ok(record.id)
    }

    async fn get_memory(&self, memory_id: Uuid, tenant_id: &str) -> StorageResult<Option<MemoryRecord>> {
        let conn = self.lock();
        let record = conn
            .query_row(
                "SELECT * FROM memories WHERE id = ?1 AND tenant_id = ?2",
                params![memory_id.to_string(), tenant_id],
                Self::row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    async fn get_memories_batch(&self, memory_ids: &[Uuid], tenant_id: &str) -> StorageResult<Vec<MemoryRecord>> {
        let conn = self.lock();
        let mut out = Vec::with_capacity(memory_ids.len());
        for id in memory_ids {
            if let Some(r) = conn
                .query_row(
                    "SELECT * FROM memories WHERE id = ?1 AND tenant_id = ?2",
                    params![id.to_string(), tenant_id],
                    Self::row_to_record,
                )
                .optional()?
            {
                out.push(r);
            }
        }
        Ok(out)
    }

    async fn update_memory(&self, memory_id: Uuid, tenant_id: &str, updates: serde_json::Value) -> StorageResult<bool> {
        let conn = self.lock();
        let mut record = match conn
            .query_row(
                "SELECT * FROM memories WHERE id = ?1 AND tenant_id = ?2",
                params![memory_id.to_string(), tenant_id],
                Self::row_to_record,
            )
            .optional()?
        {
            Some(r) => r,
            None => return Ok(false),
        };

        if let Some(obj) = updates.as_object() {
            if let Some(v) = obj.get("content").and_then(|v| v.as_str()) {
                record.content = v.to_string();
            }
            if let Some(v) = obj.get("importance").and_then(|v| v.as_f64()) {
                record.importance = v as f32;
            }
            if let Some(v) = obj.get("strength").and_then(|v| v.as_f64()) {
                record.strength = v as f32;
            }
            if let Some(v) = obj.get("layer").and_then(|v| v.as_str()) {
                if let Ok(layer) = v.parse() {
                    record.layer = layer;
                }
            }
            if let Some(v) = obj.get("is_consolidated").and_then(|v| v.as_bool()) {
                record.is_consolidated = v;
            }
            if let Some(v) = obj.get("tags").and_then(|v| v.as_array()) {
                record.tags = v.iter().filter_map(|t| t.as_str().map(String::from)).collect();
            }
            if let Some(v) = obj.get("metadata").and_then(|v| v.as_object()) {
                for (k, val) in v {
                    record.metadata.insert(k.clone(), val.clone());
                }
            }
        }
        record.bump_version();
        Self::insert(&conn, &record)?;
        Ok(true)
    }

    async fn delete_memory(&self, memory_id: Uuid, tenant_id: &str) -> StorageResult<bool> {
        let conn = self.lock();
        conn.execute(
            "DELETE FROM memories_fts WHERE id = ?1 AND tenant_id = ?2",
            params![memory_id.to_string(), tenant_id],
        )?;
        let n = conn.execute(
            "DELETE FROM memories WHERE id = ?1 AND tenant_id = ?2",
            params![memory_id.to_string(), tenant_id],
        )?;
        Ok(n > 0)
    }

    async fn list_memories(
        &self,
        tenant_id: &str,
        filter: &MemoryFilter,
        limit: usize,
        offset: usize,
        order_by: &str,
        descending: bool,
    ) -> StorageResult<Vec<MemoryRecord>> {
        let conn = self.lock();
        let (where_sql, values) = Self::build_filter_sql(tenant_id, filter);
        let order_col = match order_by {
            "importance" | "created_at" | "modified_at" | "last_accessed_at" | "access_count" => order_by,
            _ => "created_at",
        };
        let dir = if descending { "DESC" } else { "ASC" };
        let sql = format!(
            "SELECT * FROM memories WHERE {where_sql} ORDER BY {order_col} {dir} LIMIT {limit} OFFSET {offset}"
        );
        let mut stmt = conn.prepare(&sql)?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = values.iter().map(|v| v.as_ref()).collect();
        let rows = stmt.query_map(param_refs.as_slice(), Self::row_to_record)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    async fn count_memories(&self, tenant_id: &str, filter: &MemoryFilter) -> StorageResult<usize> {
        let conn = self.lock();
        let (where_sql, values) = Self::build_filter_sql(tenant_id, filter);
        let sql = format!("SELECT COUNT(*) FROM memories WHERE {where_sql}");
        let param_refs: Vec<&dyn rusqlite::ToSql> = values.iter().map(|v| v.as_ref()).collect();
        let count: i64 = conn.query_row(&sql, param_refs.as_slice(), |r| r.get(0))?;
        Ok(count as usize)
    }

    async fn search_memories(
        &self,
        tenant_id: &str,
        layer: Option<Layer>,
        query: &str,
        limit: usize,
        exact_phrase: bool,
    ) -> StorageResult<Vec<SearchHit>> {
        let conn = self.lock();
        let fts_query = if exact_phrase {
            format!("\"{}\"", sanitize_fts5_query(query))
        } else {
            sanitize_fts5_query(query)
        };
        if fts_query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let sql = if layer.is_some() {
            "SELECT m.*, bm25(memories_fts) AS rank FROM memories_fts
             JOIN memories m ON m.id = memories_fts.id
             WHERE memories_fts.content MATCH ?1 AND m.tenant_id = ?2 AND m.layer = ?3
             ORDER BY rank LIMIT ?4"
        } else {
            "SELECT m.*, bm25(memories_fts) AS rank FROM memories_fts
             JOIN memories m ON m.id = memories_fts.id
             WHERE memories_fts.content MATCH ?1 AND m.tenant_id = ?2
             ORDER BY rank LIMIT ?3"
        };
        let mut stmt = conn.prepare(sql)?;
        let mut hits = Vec::new();
        let rows: Vec<(MemoryRecord, f64)> = if let Some(layer) = layer {
            stmt.query_map(params![fts_query, tenant_id, layer.as_str(), limit as i64], |row| {
                Ok((Self::row_to_record(row)?, row.get::<_, f64>("rank")?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?
        } else {
            stmt.query_map(params![fts_query, tenant_id, limit as i64], |row| {
                Ok((Self::row_to_record(row)?, row.get::<_, f64>("rank")?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        for (memory, rank) in rows {
            // bm25() returns lower-is-better; fold into a [0,1]-ish score.
            let score = (1.0 / (1.0 + rank.abs())) as f32;
            hits.push(SearchHit { memory, score });
        }
        Ok(hits)
    }

    async fn delete_memories_with_metadata_filter(
        &self,
        tenant_id: &str,
        layer: Layer,
        metadata_key: &str,
        metadata_value: &serde_json::Value,
    ) -> StorageResult<usize> {
        let conn = self.lock();
        let needle = format!("%\"{metadata_key}\":{metadata_value}%");
        let n = conn.execute(
            "DELETE FROM memories WHERE tenant_id = ?1 AND layer = ?2 AND metadata LIKE ?3",
            params![tenant_id, layer.as_str(), needle],
        )?;
        Ok(n)
    }

    async fn delete_memories_below_importance(
        &self,
        tenant_id: &str,
        layer: Layer,
        importance_threshold: f32,
    ) -> StorageResult<usize> {
        let conn = self.lock();
        let n = conn.execute(
            "DELETE FROM memories WHERE tenant_id = ?1 AND layer = ?2 AND importance < ?3",
            params![tenant_id, layer.as_str(), importance_threshold],
        )?;
        Ok(n)
    }

    async fn delete_expired_memories(&self, tenant_id: &str, layer: Layer) -> StorageResult<usize> {
        let conn = self.lock();
        let now = Utc::now().to_rfc3339();
        let n = conn.execute(
            "DELETE FROM memories WHERE tenant_id = ?1 AND layer = ?2 AND expires_at IS NOT NULL AND expires_at <= ?3",
            params![tenant_id, layer.as_str(), now],
        )?;
        Ok(n)
    }

    async fn touch_access(&self, memory_id: Uuid, tenant_id: &str) -> StorageResult<bool> {
        let conn = self.lock();
        let now = Utc::now().to_rfc3339();
        let n = conn.execute(
            "UPDATE memories SET access_count = access_count + 1, last_accessed_at = ?1
             WHERE id = ?2 AND tenant_id = ?3",
            params![now, memory_id.to_string(), tenant_id],
        )?;
        Ok(n > 0)
    }

    async fn touch_access_batch(&self, memory_ids: &[Uuid], tenant_id: &str) -> StorageResult<bool> {
        let conn = self.lock();
        let now = Utc::now().to_rfc3339();
        let mut any = false;
        for id in memory_ids {
            let n = conn.execute(
                "UPDATE memories SET access_count = access_count + 1, last_accessed_at = ?1
                 WHERE id = ?2 AND tenant_id = ?3",
                params![now, id.to_string(), tenant_id],
            )?;
            any |= n > 0;
        }
        Ok(any)
    }

    async fn touch_usage_batch(&self, memory_ids: &[Uuid], tenant_id: &str) -> StorageResult<bool> {
        let conn = self.lock();
        let mut any = false;
        for id in memory_ids {
            let n = conn.execute(
                "UPDATE memories SET usage_count = usage_count + 1 WHERE id = ?1 AND tenant_id = ?2",
                params![id.to_string(), tenant_id],
            )?;
            any |= n > 0;
        }
        Ok(any)
    }

    async fn adjust_importance(&self, memory_id: Uuid, tenant_id: &str, delta: f32) -> StorageResult<f32> {
        let conn = self.lock();
        let current: f32 = conn.query_row(
            "SELECT importance FROM memories WHERE id = ?1 AND tenant_id = ?2",
            params![memory_id.to_string(), tenant_id],
            |r| r.get(0),
        )?;
        let updated = (current + delta).clamp(0.0, 1.0);
        conn.execute(
            "UPDATE memories SET importance = ?1, version = version + 1, modified_at = ?2
             WHERE id = ?3 AND tenant_id = ?4",
            params![updated, Utc::now().to_rfc3339(), memory_id.to_string(), tenant_id],
        )?;
        Ok(updated)
    }

    async fn decay_importance(
        &self,
        tenant_id: &str,
        layer: Layer,
        factor_fn: &(dyn Fn(&MemoryRecord) -> f32 + Send + Sync),
    ) -> StorageResult<usize> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT * FROM memories WHERE tenant_id = ?1 AND layer = ?2")?;
        let records: Vec<MemoryRecord> = stmt
            .query_map(params![tenant_id, layer.as_str()], Self::row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(stmt);
        let mut updated = 0;
        for mut record in records {
            let new_importance = factor_fn(&record).clamp(0.01, 1.0);
            if (new_importance - record.importance).abs() > f32::EPSILON {
                record.importance = new_importance;
                record.bump_version();
                Self::insert(&conn, &record)?;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn get_metric_aggregate(
        &self,
        tenant_id: &str,
        filter: &MemoryFilter,
        metric: &str,
        func: &str,
    ) -> StorageResult<f64> {
        let conn = self.lock();
        let column = match metric {
            "importance" | "strength" | "access_count" | "usage_count" | "version" => metric,
            _ => return Ok(0.0),
        };
        let sql_func = match func.to_lowercase().as_str() {
            "avg" => "AVG",
            "sum" => "SUM",
            "min" => "MIN",
            "max" => "MAX",
            _ => "COUNT",
        };
        let (where_sql, values) = Self::build_filter_sql(tenant_id, filter);
        let sql = format!("SELECT {sql_func}({column}) FROM memories WHERE {where_sql}");
        let param_refs: Vec<&dyn rusqlite::ToSql> = values.iter().map(|v| v.as_ref()).collect();
        let value: Option<f64> = conn.query_row(&sql, param_refs.as_slice(), |r| r.get(0))?;
        Ok(value.unwrap_or(0.0))
    }

    async fn clear_tenant(&self, tenant_id: &str) -> StorageResult<usize> {
        let conn = self.lock();
        conn.execute("DELETE FROM memories_fts WHERE tenant_id = ?1", params![tenant_id])?;
        let n = conn.execute("DELETE FROM memories WHERE tenant_id = ?1", params![tenant_id])?;
        conn.execute("DELETE FROM graph_edges WHERE tenant_id = ?1", params![tenant_id])?;
        conn.execute("DELETE FROM graph_nodes WHERE tenant_id = ?1", params![tenant_id])?;
        Ok(n)
    }
}

#[async_trait]
impl GraphStore for SqliteAdapter {
    async fn create_node(&self, node: GraphNode) -> StorageResult<bool> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR REPLACE INTO graph_nodes (id, tenant_id, label, properties) VALUES (?1,?2,?3,?4)",
            params![
                node.id.to_string(),
                node.tenant_id,
                node.label,
                serde_json::to_string(&node.properties).unwrap_or_default(),
            ],
        )?;
        Ok(true)
    }

    async fn create_edge(&self, edge: GraphEdge) -> StorageResult<bool> {
        edge.validate().map_err(StorageError::Init)?;
        let conn = self.lock();
        conn.execute(
            "INSERT OR REPLACE INTO graph_edges (source_id, target_id, tenant_id, relation, weight, properties)
             VALUES (?1,?2,?3,?4,?5,?6)",
            params![
                edge.source_id.to_string(),
                edge.target_id.to_string(),
                edge.tenant_id,
                edge.relation,
                edge.weight,
                serde_json::to_string(&edge.properties).unwrap_or_default(),
            ],
        )?;
        Ok(true)
    }

    async fn get_neighbors(
        &self,
        node_id: Uuid,
        tenant_id: &str,
        relation: Option<&str>,
        direction: Direction,
        max_depth: u32,
    ) -> StorageResult<Vec<Uuid>> {
        let conn = self.lock();
        let mut frontier = vec![node_id];
        let mut visited = std::collections::HashSet::from([node_id]);
        let mut depth = 0;
        while depth < max_depth.max(1) && !frontier.is_empty() {
            let mut next_frontier = Vec::new();
            for current in &frontier {
                let mut neighbors = Vec::new();
                if matches!(direction, Direction::Out | Direction::Both) {
                    neighbors.extend(Self::query_edge_targets(
                        &conn,
                        current,
                        tenant_id,
                        relation,
                        true,
                    )?);
                }
                if matches!(direction, Direction::In | Direction::Both) {
                    neighbors.extend(Self::query_edge_targets(
                        &conn,
                        current,
                        tenant_id,
                        relation,
                        false,
                    )?);
                }
                for n in neighbors {
                    if visited.insert(n) {
                        next_frontier.push(n);
                    }
                }
            }
            frontier = next_frontier;
            depth += 1;
        }
        visited.remove(&node_id);
        Ok(visited.into_iter().collect())
    }

    async fn delete_node(&self, node_id: Uuid, tenant_id: &str) -> StorageResult<bool> {
        let conn = self.lock();
        conn.execute(
            "DELETE FROM graph_edges WHERE tenant_id = ?1 AND (source_id = ?2 OR target_id = ?2)",
            params![tenant_id, node_id.to_string()],
        )?;
        let n = conn.execute(
            "DELETE FROM graph_nodes WHERE id = ?1 AND tenant_id = ?2",
            params![node_id.to_string(), tenant_id],
        )?;
        Ok(n > 0)
    }

    async fn delete_edge(&self, source_id: Uuid, target_id: Uuid, relation: &str, tenant_id: &str) -> StorageResult<bool> {
        let conn = self.lock();
        let n = conn.execute(
            "DELETE FROM graph_edges WHERE source_id = ?1 AND target_id = ?2 AND relation = ?3 AND tenant_id = ?4",
            params![source_id.to_string(), target_id.to_string(), relation, tenant_id],
        )?;
        Ok(n > 0)
    }

    async fn shortest_path(
        &self,
        source_id: Uuid,
        target_id: Uuid,
        tenant_id: &str,
        max_depth: u32,
    ) -> StorageResult<Option<Vec<Uuid>>> {
        let conn = self.lock();
        use std::collections::{HashMap, VecDeque};
        let mut queue = VecDeque::from([source_id]);
        let mut came_from: HashMap<Uuid, Uuid> = HashMap::new();
        let mut visited = std::collections::HashSet::from([source_id]);
        let mut depth_of = HashMap::from([(source_id, 0u32)]);

        while let Some(current) = queue.pop_front() {
            let depth = depth_of[&current];
            if current == target_id {
                let mut path = vec![current];
                let mut cursor = current;
                while let Some(prev) = came_from.get(&cursor) {
                    path.push(*prev);
                    cursor = *prev;
                }
                path.reverse();
                return Ok(Some(path));
            }
            if depth >= max_depth {
                continue;
            }
            for neighbor in Self::query_edge_targets(&conn, &current, tenant_id, None, true)? {
                if visited.insert(neighbor) {
                    came_from.insert(neighbor, current);
                    depth_of.insert(neighbor, depth + 1);
                    queue.push_back(neighbor);
                }
            }
        }
        Ok(None)
    }

    async fn get_subgraph(
        &self,
        node_ids: &[Uuid],
        tenant_id: &str,
        include_edges: bool,
    ) -> StorageResult<(Vec<GraphNode>, Vec<GraphEdge>)> {
        let conn = self.lock();
        let mut nodes = Vec::new();
        for id in node_ids {
            if let Some(node) = conn
                .query_row(
                    "SELECT id, tenant_id, label, properties FROM graph_nodes WHERE id = ?1 AND tenant_id = ?2",
                    params![id.to_string(), tenant_id],
                    |row| {
                        let properties: String = row.get(3)?;
                        Ok(GraphNode {
                            id: row.get::<_, String>(0)?.parse().unwrap_or_default(),
                            tenant_id: row.get(1)?,
                            label: row.get(2)?,
                            properties: serde_json::from_str(&properties).unwrap_or_default(),
                        })
                    },
                )
                .optional()?
            {
                nodes.push(node);
            }
        }
        let mut edges = Vec::new();
        if include_edges {
            let id_set: std::collections::HashSet<Uuid> = node_ids.iter().copied().collect();
            let mut stmt = conn.prepare(
                "SELECT source_id, target_id, tenant_id, relation, weight, properties FROM graph_edges WHERE tenant_id = ?1",
            )?;
            let rows = stmt.query_map(params![tenant_id], |row| {
                let properties: String = row.get(5)?;
                Ok(GraphEdge {
                    source_id: row.get::<_, String>(0)?.parse().unwrap_or_default(),
                    target_id: row.get::<_, String>(1)?.parse().unwrap_or_default(),
                    tenant_id: row.get(2)?,
                    relation: row.get(3)?,
                    weight: row.get(4)?,
                    properties: serde_json::from_str(&properties).unwrap_or_default(),
                })
            })?;
            for edge in rows {
                let edge = edge?;
                if id_set.contains(&edge.source_id) && id_set.contains(&edge.target_id) {
                    edges.push(edge);
                }
            }
        }
        Ok((nodes, edges))
    }
}

impl SqliteAdapter {
    fn query_edge_targets(
        conn: &Connection,
        node: &Uuid,
        tenant_id: &str,
        relation: Option<&str>,
        outgoing: bool,
    ) -> StorageResult<Vec<Uuid>> {
        let (select_col, where_col) = if outgoing {
            ("target_id", "source_id")
        } else {
            ("source_id", "target_id")
        };
        let sql = if relation.is_some() {
            format!("SELECT {select_col} FROM graph_edges WHERE tenant_id = ?1 AND {where_col} = ?2 AND relation = ?3")
        } else {
            format!("SELECT {select_col} FROM graph_edges WHERE tenant_id = ?1 AND {where_col} = ?2")
        };
        let mut stmt = conn.prepare(&sql)?;
        let rows: Vec<Uuid> = if let Some(relation) = relation {
            stmt.query_map(params![tenant_id, node.to_string(), relation], |r| r.get::<_, String>(0))?
                .filter_map(|r| r.ok().and_then(|s| s.parse().ok()))
                .collect()
        } else {
            stmt.query_map(params![tenant_id, node.to_string()], |r| r.get::<_, String>(0))?
                .filter_map(|r| r.ok().and_then(|s| s.parse().ok()))
                .collect()
        };
        Ok(rows)
    }
}

/// Strips FTS5 operator characters that would otherwise throw a syntax
/// error from a raw user query, the same defensive pass the teacher's
/// `search::sanitize_fts5_query` performs before any MATCH.
pub fn sanitize_fts5_query(query: &str) -> String {
    query
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .map(|tok| format!("{tok}*"))
        .collect::<Vec<_>>()
        .join(" ")
}
