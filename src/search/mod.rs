//! Hybrid retrieval
//!
//! Combines a required vector-similarity stage with a best-effort graph
//! expansion stage. Vector matches are authoritative; graph expansion adds
//! relationship-implied context on top and can never fail the search.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::join_all;

use crate::error::Result;
use crate::graph::GraphStore;
use crate::storage::MemoryStore;
use crate::types::{Memory, MemoryId, SearchResult};

/// Two-stage retriever over a vector index and a relationship graph
pub struct HybridRetriever {
    store: Arc<dyn MemoryStore>,
    graph: Arc<dyn GraphStore>,
    expansion_depth: u32,
}

impl HybridRetriever {
    pub fn new(store: Arc<dyn MemoryStore>, graph: Arc<dyn GraphStore>, expansion_depth: u32) -> Self {
        Self {
            store,
            graph,
            expansion_depth,
        }
    }

    /// Stage-1-only search, used for relationship candidate selection
    pub async fn vector_only(
        &self,
        query: &[f32],
        limit: usize,
        min_similarity: f32,
        group_id: Option<&str>,
    ) -> Result<Vec<(Memory, f32)>> {
        self.store
            .nearest_neighbors(query, limit, min_similarity, group_id)
            .await
            .map_err(|e| e.with_context("vector stage"))
    }

    /// Hybrid retrieval.
    ///
    /// Stage 1 ranks the `limit` nearest memories by cosine similarity
    /// (descending, ties by ascending id). Stage 2 traverses the graph from
    /// every stage-1 seed up to the configured depth and appends reachable
    /// memories not already present, ordered by (hop distance, id) ascending.
    /// The combined list is not re-limited: expansion is additive so
    /// graph-implied context is never silently dropped.
    ///
    /// Stage 1 failure fails the call. Stage 2 failures - a single seed or
    /// the whole graph store - degrade to whatever was found, with a warning.
    pub async fn retrieve(
        &self,
        query: &[f32],
        limit: usize,
        min_similarity: f32,
        group_id: Option<&str>,
    ) -> Result<Vec<SearchResult>> {
        let direct = self
            .vector_only(query, limit, min_similarity, group_id)
            .await?;

        if direct.is_empty() {
            return Ok(vec![]);
        }

        let seed_ids: Vec<MemoryId> = direct.iter().map(|(m, _)| m.id).collect();
        let hops = self.expand_seeds(&seed_ids).await;

        let mut results: Vec<SearchResult> = direct
            .into_iter()
            .map(|(memory, similarity)| SearchResult::direct(memory, similarity))
            .collect();
        results.extend(self.fetch_graph_results(&seed_ids, hops).await);

        Ok(results)
    }

    /// Traverse from every seed concurrently and merge the reachable sets
    async fn expand_seeds(&self, seed_ids: &[MemoryId]) -> HashMap<MemoryId, u32> {
        let traversals = join_all(
            seed_ids
                .iter()
                .map(|&seed| self.graph.traverse(seed, self.expansion_depth)),
        )
        .await;

        let reachable_sets = seed_ids.iter().zip(traversals).filter_map(|(seed, traversal)| {
            match traversal {
                Ok(reachable) => Some(reachable),
                Err(e) => {
                    // Graph expansion is best-effort: skip this seed
                    tracing::warn!(seed, error = %e, "graph traversal failed, skipping seed");
                    None
                }
            }
        });

        merge_min_hops(reachable_sets)
    }

    async fn fetch_graph_results(
        &self,
        seed_ids: &[MemoryId],
        mut hops: HashMap<MemoryId, u32>,
    ) -> Vec<SearchResult> {
        let seen: HashSet<MemoryId> = seed_ids.iter().copied().collect();
        hops.retain(|id, _| !seen.contains(id));

        if hops.is_empty() {
            return vec![];
        }

        let ids: Vec<MemoryId> = hops.keys().copied().collect();
        let memories = match self.store.get_memories(&ids).await {
            Ok(memories) => memories,
            Err(e) => {
                tracing::warn!(error = %e, "failed to fetch graph-discovered memories, degrading to vector-only");
                return vec![];
            }
        };

        let mut results: Vec<SearchResult> = memories
            .into_iter()
            .filter_map(|memory| {
                let hop = *hops.get(&memory.id)?;
                Some(SearchResult::via_graph(memory, hop))
            })
            .collect();

        // Ascending hop distance, ties by ascending id
        results.sort_by(|a, b| {
            a.hop_distance
                .cmp(&b.hop_distance)
                .then(a.memory.id.cmp(&b.memory.id))
        });
        results
    }
}

/// Merge per-seed traversal results, keeping the minimum hop distance
/// observed for each memory id. Minimum is commutative and associative, so
/// the result is independent of seed order and completion order.
pub fn merge_min_hops(
    reachable_sets: impl IntoIterator<Item = Vec<(MemoryId, u32)>>,
) -> HashMap<MemoryId, u32> {
    let mut hops: HashMap<MemoryId, u32> = HashMap::new();
    for reachable in reachable_sets {
        for (id, hop) in reachable {
            hops.entry(id)
                .and_modify(|existing| *existing = (*existing).min(hop))
                .or_insert(hop);
        }
    }
    hops
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SynapseError;
    use crate::storage::SqliteStore;
    use crate::types::{PropertyBag, RelationshipType, ResultOrigin};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    /// Scripted graph: fixed adjacency, optional per-seed or total failure
    struct StubGraph {
        edges: HashMap<MemoryId, Vec<(MemoryId, u32)>>,
        fail_seeds: HashSet<MemoryId>,
        fail_all: bool,
    }

    impl StubGraph {
        fn empty() -> Self {
            Self {
                edges: HashMap::new(),
                fail_seeds: HashSet::new(),
                fail_all: false,
            }
        }

        fn with_edges(edges: &[(MemoryId, MemoryId, u32)]) -> Self {
            let mut map: HashMap<MemoryId, Vec<(MemoryId, u32)>> = HashMap::new();
            for &(seed, target, hop) in edges {
                map.entry(seed).or_default().push((target, hop));
            }
            Self {
                edges: map,
                fail_seeds: HashSet::new(),
                fail_all: false,
            }
        }
    }

    #[async_trait]
    impl GraphStore for StubGraph {
        async fn upsert_node(&self, _memory_id: MemoryId) -> Result<()> {
            Ok(())
        }

        async fn merge_edge(
            &self,
            _from_id: MemoryId,
            _to_id: MemoryId,
            _rel_type: &RelationshipType,
            _properties: &PropertyBag,
        ) -> Result<()> {
            Ok(())
        }

        async fn traverse(&self, seed_id: MemoryId, _max_depth: u32) -> Result<Vec<(MemoryId, u32)>> {
            if self.fail_all || self.fail_seeds.contains(&seed_id) {
                return Err(SynapseError::Graph("graph store unreachable".into()));
            }
            Ok(self.edges.get(&seed_id).cloned().unwrap_or_default())
        }
    }

    async fn seeded_store() -> (Arc<SqliteStore>, Vec<MemoryId>) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let mut ids = Vec::new();
        // Decreasing similarity to the query [1, 0]
        let vectors: &[(&str, [f32; 2])] = &[
            ("anchor", [1.0, 0.0]),
            ("close", [0.9, 0.4]),
            ("mid", [0.5, 0.8]),
            ("far", [0.0, 1.0]),
        ];
        for (text, v) in vectors {
            ids.push(store.create_memory(text, v, None).await.unwrap().id);
        }
        (store, ids)
    }

    #[tokio::test]
    async fn test_empty_store_returns_empty_without_expansion() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let retriever = HybridRetriever::new(store, Arc::new(StubGraph::empty()), 1);

        let results = retriever.retrieve(&[1.0, 0.0], 5, 0.0, None).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_graph_results_follow_direct_and_dedup() {
        let (store, ids) = seeded_store().await;
        // Both seeds reach "far"; seed 0 also reaches seed 1 (already direct)
        let graph = StubGraph::with_edges(&[
            (ids[0], ids[3], 2),
            (ids[0], ids[1], 1),
            (ids[1], ids[3], 1),
        ]);
        let retriever = HybridRetriever::new(store, Arc::new(graph), 2);

        let results = retriever.retrieve(&[1.0, 0.0], 2, 0.0, None).await.unwrap();

        // Two direct (similarity desc), then "far" once via graph at min hop 1
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].memory.id, ids[0]);
        assert_eq!(results[1].memory.id, ids[1]);
        assert_eq!(results[0].origin, ResultOrigin::Direct);
        assert!(results[0].similarity >= results[1].similarity);

        let graph_hit = &results[2];
        assert_eq!(graph_hit.memory.id, ids[3]);
        assert_eq!(graph_hit.origin, ResultOrigin::Graph);
        assert_eq!(graph_hit.similarity, 0.0);
        assert_eq!(graph_hit.hop_distance, 1);

        // No duplicates
        let unique: HashSet<MemoryId> = results.iter().map(|r| r.memory.id).collect();
        assert_eq!(unique.len(), results.len());
    }

    #[tokio::test]
    async fn test_expansion_is_additive_beyond_limit() {
        let (store, ids) = seeded_store().await;
        let graph = StubGraph::with_edges(&[(ids[0], ids[2], 1), (ids[0], ids[3], 1)]);
        let retriever = HybridRetriever::new(store, Arc::new(graph), 1);

        // limit 1 direct result, expansion still appends both neighbors
        let results = retriever.retrieve(&[1.0, 0.0], 1, 0.0, None).await.unwrap();
        assert_eq!(results.len(), 3);
        // Graph results tie on hop distance, so ascending id decides
        assert_eq!(results[1].memory.id, ids[2]);
        assert_eq!(results[2].memory.id, ids[3]);
    }

    #[tokio::test]
    async fn test_min_similarity_exempts_graph_results() {
        let (store, ids) = seeded_store().await;
        // "far" has similarity 0 to the query, below the floor
        let graph = StubGraph::with_edges(&[(ids[0], ids[3], 1)]);
        let retriever = HybridRetriever::new(store, Arc::new(graph), 1);

        let results = retriever.retrieve(&[1.0, 0.0], 5, 0.6, None).await.unwrap();
        let far = results.iter().find(|r| r.memory.id == ids[3]).unwrap();
        assert_eq!(far.origin, ResultOrigin::Graph);
        // And no direct result below the floor slipped through
        for r in &results {
            if r.origin == ResultOrigin::Direct {
                assert!(r.similarity >= 0.6);
            }
        }
    }

    #[tokio::test]
    async fn test_total_graph_failure_degrades_to_vector_only() {
        let (store, _ids) = seeded_store().await;
        let graph = StubGraph {
            edges: HashMap::new(),
            fail_seeds: HashSet::new(),
            fail_all: true,
        };
        let retriever = HybridRetriever::new(store, Arc::new(graph), 1);

        let results = retriever.retrieve(&[1.0, 0.0], 3, 0.0, None).await.unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.origin == ResultOrigin::Direct));
    }

    #[tokio::test]
    async fn test_single_seed_failure_skips_only_that_seed() {
        let (store, ids) = seeded_store().await;
        let mut graph = StubGraph::with_edges(&[(ids[0], ids[3], 1), (ids[1], ids[2], 1)]);
        graph.fail_seeds.insert(ids[0]);
        let retriever = HybridRetriever::new(store, Arc::new(graph), 1);

        let results = retriever.retrieve(&[1.0, 0.0], 2, 0.0, None).await.unwrap();
        let graph_ids: Vec<MemoryId> = results
            .iter()
            .filter(|r| r.origin == ResultOrigin::Graph)
            .map(|r| r.memory.id)
            .collect();
        // The surviving seed still contributes its neighbor
        assert_eq!(graph_ids, vec![ids[2]]);
    }

    #[tokio::test]
    async fn test_minimum_hop_kept_across_seeds() {
        let (store, ids) = seeded_store().await;
        // Same target at different distances from two seeds
        let graph = StubGraph::with_edges(&[(ids[0], ids[3], 2), (ids[1], ids[3], 1)]);
        let retriever = HybridRetriever::new(store, Arc::new(graph), 2);

        let results = retriever.retrieve(&[1.0, 0.0], 2, 0.0, None).await.unwrap();
        let target = results.iter().find(|r| r.memory.id == ids[3]).unwrap();
        assert_eq!(target.hop_distance, 1);
    }
}
