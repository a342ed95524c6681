//! SQLite-backed relationship graph

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection};

use super::GraphStore;
use crate::error::{Result, SynapseError};
use crate::storage::SqliteStore;
use crate::types::{MemoryId, PropertyBag, RelationshipType};

/// Graph adapter over the `relationships` table.
///
/// Nodes are the memory rows themselves; edges live in a table with a
/// UNIQUE(from_id, to_id, rel_type) constraint so merges are idempotent.
/// Every statement is parameterized - ids, type tokens, and property values
/// never appear in query text.
pub struct SqliteGraph {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteGraph {
    /// Build a graph view over the same database as a [`SqliteStore`]
    pub fn from_store(store: &SqliteStore) -> Self {
        Self {
            conn: store.connection(),
        }
    }

    fn node_exists(conn: &Connection, id: MemoryId) -> Result<bool> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM memories WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

#[async_trait]
impl GraphStore for SqliteGraph {
    async fn upsert_node(&self, memory_id: MemoryId) -> Result<()> {
        let conn = self.conn.lock();
        if Self::node_exists(&conn, memory_id)? {
            Ok(())
        } else {
            Err(SynapseError::NotFound(memory_id))
        }
    }

    async fn merge_edge(
        &self,
        from_id: MemoryId,
        to_id: MemoryId,
        rel_type: &RelationshipType,
        properties: &PropertyBag,
    ) -> Result<()> {
        let properties_json = serde_json::to_string(properties)?;
        let conn = self.conn.lock();

        for id in [from_id, to_id] {
            if !Self::node_exists(&conn, id)? {
                return Err(SynapseError::NotFound(id));
            }
        }

        conn.execute(
            "INSERT INTO relationships (from_id, to_id, rel_type, properties, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(from_id, to_id, rel_type)
             DO UPDATE SET properties = excluded.properties",
            params![
                from_id,
                to_id,
                rel_type.as_str(),
                properties_json,
                Utc::now().to_rfc3339()
            ],
        )?;

        Ok(())
    }

    async fn traverse(&self, seed_id: MemoryId, max_depth: u32) -> Result<Vec<(MemoryId, u32)>> {
        let conn = self.conn.lock();

        let mut visited: HashSet<MemoryId> = HashSet::from([seed_id]);
        let mut frontier: Vec<MemoryId> = vec![seed_id];
        let mut reachable: Vec<(MemoryId, u32)> = Vec::new();

        // Level-based BFS: one batched edge query per depth
        for depth in 1..=max_depth {
            if frontier.is_empty() {
                break;
            }

            let placeholders = vec!["?"; frontier.len()].join(", ");
            let sql = format!(
                "SELECT from_id, to_id FROM relationships
                 WHERE from_id IN ({ph}) OR to_id IN ({ph})",
                ph = placeholders
            );

            let mut stmt = conn.prepare(&sql)?;
            let frontier_params: Vec<&dyn rusqlite::ToSql> = frontier
                .iter()
                .chain(frontier.iter())
                .map(|id| id as &dyn rusqlite::ToSql)
                .collect();

            let edges: Vec<(MemoryId, MemoryId)> = stmt
                .query_map(frontier_params.as_slice(), |row| {
                    Ok((row.get(0)?, row.get(1)?))
                })?
                .collect::<rusqlite::Result<_>>()?;

            let frontier_set: HashSet<MemoryId> = frontier.iter().copied().collect();
            let mut next_frontier = Vec::new();

            for (from, to) in edges {
                // Direction-agnostic: either endpoint of a frontier edge is a neighbor
                for neighbor in [from, to] {
                    if !frontier_set.contains(&neighbor) && visited.insert(neighbor) {
                        reachable.push((neighbor, depth));
                        next_frontier.push(neighbor);
                    }
                }
            }

            frontier = next_frontier;
        }

        Ok(reachable)
    }
}
