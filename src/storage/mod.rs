//! Memory storage and vector lookup
//!
//! The `MemoryStore` trait is the seam to the vector-similarity index. The
//! bundled `SqliteStore` keeps memories and embeddings in SQLite and scores
//! them with an in-process cosine scan; any backend that can rank memories
//! by similarity can stand in for it.

mod sqlite;

pub use sqlite::SqliteStore;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Memory, MemoryId};

/// Storage backend for memories, including nearest-neighbor lookup
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Persist a new memory and assign it an id
    async fn create_memory(
        &self,
        text: &str,
        embedding: &[f32],
        group_id: Option<&str>,
    ) -> Result<Memory>;

    /// Fetch a memory by id. NotFound if no such id.
    async fn get_memory(&self, id: MemoryId) -> Result<Memory>;

    /// Fetch several memories at once. Unknown ids are skipped.
    async fn get_memories(&self, ids: &[MemoryId]) -> Result<Vec<Memory>>;

    /// Rank the `k` memories nearest to `query` by cosine similarity,
    /// descending, ties broken by ascending id. `min_similarity > 0` filters
    /// low scores; `group_id` restricts to one partition.
    async fn nearest_neighbors(
        &self,
        query: &[f32],
        k: usize,
        min_similarity: f32,
        group_id: Option<&str>,
    ) -> Result<Vec<(Memory, f32)>>;
}
