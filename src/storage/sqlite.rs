//! SQLite-backed memory store

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::MemoryStore;
use crate::embedding::cosine_similarity;
use crate::error::{Result, SynapseError};
use crate::types::{Memory, MemoryId};

/// Memory store backed by a single SQLite connection.
///
/// Also owns the `relationships` table consumed by
/// [`crate::graph::SqliteGraph`]; both adapters share one connection so a
/// memory insert and its node are visible to edge merges immediately.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) a database file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database, mainly for tests
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "foreign_keys", "ON")?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) fn connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS memories (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            text        TEXT NOT NULL,
            embedding   BLOB NOT NULL,
            group_id    TEXT,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_memories_group ON memories(group_id);

        CREATE TABLE IF NOT EXISTS relationships (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            from_id     INTEGER NOT NULL REFERENCES memories(id),
            to_id       INTEGER NOT NULL REFERENCES memories(id),
            rel_type    TEXT NOT NULL,
            properties  TEXT NOT NULL DEFAULT '{}',
            created_at  TEXT NOT NULL,
            UNIQUE(from_id, to_id, rel_type)
        );
        CREATE INDEX IF NOT EXISTS idx_relationships_from ON relationships(from_id);
        CREATE INDEX IF NOT EXISTS idx_relationships_to ON relationships(to_id);",
    )?;
    Ok(())
}

/// Encode an embedding as little-endian f32 bytes
pub(crate) fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(embedding.len() * 4);
    for v in embedding {
        blob.extend_from_slice(&v.to_le_bytes());
    }
    blob
}

/// Decode little-endian f32 bytes back into an embedding
pub(crate) fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SynapseError::Storage(format!("bad timestamp '{}': {}", raw, e)))
}

fn memory_from_row(row: &Row<'_>) -> rusqlite::Result<(MemoryId, String, Vec<u8>, Option<String>, String, String)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn build_memory(
    (id, text, blob, group_id, created_at, updated_at): (
        MemoryId,
        String,
        Vec<u8>,
        Option<String>,
        String,
        String,
    ),
) -> Result<Memory> {
    Ok(Memory {
        id,
        text,
        embedding: blob_to_embedding(&blob),
        group_id,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

const MEMORY_COLUMNS: &str = "id, text, embedding, group_id, created_at, updated_at";

#[async_trait]
impl MemoryStore for SqliteStore {
    async fn create_memory(
        &self,
        text: &str,
        embedding: &[f32],
        group_id: Option<&str>,
    ) -> Result<Memory> {
        let now = Utc::now();
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO memories (text, embedding, group_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                text,
                embedding_to_blob(embedding),
                group_id,
                now.to_rfc3339(),
                now.to_rfc3339()
            ],
        )?;
        let id = conn.last_insert_rowid();

        Ok(Memory {
            id,
            text: text.to_string(),
            embedding: embedding.to_vec(),
            group_id: group_id.map(|g| g.to_string()),
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_memory(&self, id: MemoryId) -> Result<Memory> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                &format!("SELECT {} FROM memories WHERE id = ?1", MEMORY_COLUMNS),
                params![id],
                memory_from_row,
            )
            .optional()?;

        match row {
            Some(raw) => build_memory(raw),
            None => Err(SynapseError::NotFound(id)),
        }
    }

    async fn get_memories(&self, ids: &[MemoryId]) -> Result<Vec<Memory>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT {} FROM memories WHERE id IN ({}) ORDER BY id",
            MEMORY_COLUMNS, placeholders
        );

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(ids.iter()), memory_from_row)?;

        let mut memories = Vec::new();
        for row in rows {
            memories.push(build_memory(row?)?);
        }
        Ok(memories)
    }

    async fn nearest_neighbors(
        &self,
        query: &[f32],
        k: usize,
        min_similarity: f32,
        group_id: Option<&str>,
    ) -> Result<Vec<(Memory, f32)>> {
        if k == 0 {
            return Ok(vec![]);
        }

        let conn = self.conn.lock();
        let mut scored: Vec<(Memory, f32)> = Vec::new();

        let mut scan = |raw: (MemoryId, String, Vec<u8>, Option<String>, String, String)| -> Result<()> {
            let memory = build_memory(raw)?;
            let similarity = cosine_similarity(query, &memory.embedding);
            if min_similarity <= 0.0 || similarity >= min_similarity {
                scored.push((memory, similarity));
            }
            Ok(())
        };

        if let Some(group) = group_id {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM memories WHERE group_id = ?1",
                MEMORY_COLUMNS
            ))?;
            let rows = stmt.query_map(params![group], memory_from_row)?;
            for row in rows {
                scan(row?)?;
            }
        } else {
            let mut stmt = conn.prepare(&format!("SELECT {} FROM memories", MEMORY_COLUMNS))?;
            let rows = stmt.query_map([], memory_from_row)?;
            for row in rows {
                scan(row?)?;
            }
        }

        // Similarity descending, ties by ascending id for determinism
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.id.cmp(&b.0.id))
        });
        scored.truncate(k);

        Ok(scored)
    }
}
