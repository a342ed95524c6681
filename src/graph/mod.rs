//! Relationship graph
//!
//! The `GraphStore` seam covers the three capabilities retrieval and
//! inference need from a property graph: node upsert, idempotent edge merge,
//! and bounded-depth traversal. The bundled `SqliteGraph` keeps edges in the
//! same SQLite database as the memories themselves.

mod sqlite;

pub use sqlite::SqliteGraph;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{MemoryId, PropertyBag, RelationshipType};

/// Typed directed edges between memory ids
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Ensure a node exists for the given memory id. NotFound if the id does
    /// not refer to a stored memory.
    async fn upsert_node(&self, memory_id: MemoryId) -> Result<()>;

    /// Create the edge (from, to, type) if absent, otherwise update its
    /// properties. Never duplicates: the triple is unique.
    async fn merge_edge(
        &self,
        from_id: MemoryId,
        to_id: MemoryId,
        rel_type: &RelationshipType,
        properties: &PropertyBag,
    ) -> Result<()>;

    /// All distinct memory ids reachable from `seed_id` within `max_depth`
    /// hops, following edges in either direction, each with its hop distance
    /// (>= 1). The seed itself is not included.
    async fn traverse(&self, seed_id: MemoryId, max_depth: u32) -> Result<Vec<(MemoryId, u32)>>;
}
