//! Memory service
//!
//! The single context object a transport layer talks to. Constructed once
//! from the four external seams plus configuration; no process-wide state.
//! Input validation happens here, before any external call.

use std::sync::Arc;

use serde::Serialize;

use crate::classify::RelationshipClassifier;
use crate::embedding::EmbeddingProvider;
use crate::error::{Result, SynapseError};
use crate::graph::GraphStore;
use crate::inference::{FailurePolicy, RelationshipInferencePipeline};
use crate::search::HybridRetriever;
use crate::storage::MemoryStore;
use crate::types::{
    Memory, MemoryId, PropertyBag, RelationshipProposal, RelationshipType, SearchConfig,
    SearchResult,
};

/// Outcome of storing a memory, including any auto-detected relationships
#[derive(Debug, Clone, Serialize)]
pub struct StoreOutcome {
    pub memory: Memory,
    pub relationships_created: usize,
    pub message: String,
}

/// Outcome of an explicit relationship-detection run
#[derive(Debug, Clone, Serialize)]
pub struct DetectionOutcome {
    /// Proposals that passed the acceptance filter
    pub proposals: Vec<RelationshipProposal>,
    pub relationships_created: usize,
    pub message: String,
}

/// A memory reached through graph traversal
#[derive(Debug, Clone, Serialize)]
pub struct ConnectedMemory {
    pub memory: Memory,
    pub hop_distance: u32,
}

/// The memory service: hybrid retrieval plus relationship management
pub struct MemoryService {
    store: Arc<dyn MemoryStore>,
    graph: Arc<dyn GraphStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    retriever: HybridRetriever,
    pipeline: RelationshipInferencePipeline,
    config: SearchConfig,
}

impl MemoryService {
    pub fn new(
        store: Arc<dyn MemoryStore>,
        graph: Arc<dyn GraphStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        classifier: Arc<dyn RelationshipClassifier>,
        config: SearchConfig,
    ) -> Self {
        let retriever =
            HybridRetriever::new(Arc::clone(&store), Arc::clone(&graph), config.expansion_depth);
        let pipeline = RelationshipInferencePipeline::new(
            Arc::clone(&store),
            Arc::clone(&graph),
            classifier,
        );

        Self {
            store,
            graph,
            embedder,
            retriever,
            pipeline,
            config,
        }
    }

    /// Store a memory; optionally run relationship auto-detection afterward.
    ///
    /// Once the memory row is written it is never rolled back: any failure in
    /// the detection step (candidate search, classifier, edge write) degrades
    /// to a successful store with a message noting that relationship
    /// detection did not complete.
    pub async fn store_and_maybe_infer(
        &self,
        text: &str,
        group_id: Option<&str>,
        auto_infer: bool,
    ) -> Result<StoreOutcome> {
        if text.trim().is_empty() {
            return Err(SynapseError::Validation("text cannot be empty".into()));
        }

        let embedding = self
            .embedder
            .generate(text)
            .await
            .map_err(|e| e.with_context("embedding new memory"))?;

        let memory = self.store.create_memory(text, &embedding, group_id).await?;
        self.graph.upsert_node(memory.id).await?;
        tracing::debug!(memory_id = memory.id, "memory stored");

        if !auto_infer {
            return Ok(StoreOutcome {
                message: format!("Memory stored successfully with ID {}", memory.id),
                memory,
                relationships_created: 0,
            });
        }

        let inference = self
            .pipeline
            .infer(
                &memory,
                self.config.candidate_min_similarity,
                self.config.max_candidates,
                self.config.min_confidence,
                false,
                FailurePolicy::AbortOnFailure,
            )
            .await;

        let (created, message) = match inference {
            Ok(outcome) if outcome.created > 0 => (
                outcome.created,
                format!(
                    "Memory stored with ID {} and {} relationships auto-created",
                    memory.id, outcome.created
                ),
            ),
            Ok(_) => (
                0,
                format!("Memory stored successfully with ID {}", memory.id),
            ),
            Err(e) => {
                tracing::warn!(memory_id = memory.id, error = %e, "relationship auto-detection failed");
                (
                    0,
                    format!(
                        "Memory stored with ID {} (relationship auto-detection failed: {})",
                        memory.id, e
                    ),
                )
            }
        };

        Ok(StoreOutcome {
            memory,
            relationships_created: created,
            message,
        })
    }

    /// Hybrid search: embed the query, then run two-stage retrieval
    pub async fn hybrid_search(
        &self,
        query: &str,
        limit: Option<usize>,
        min_similarity: f32,
        group_id: Option<&str>,
    ) -> Result<Vec<SearchResult>> {
        if query.trim().is_empty() {
            return Err(SynapseError::Validation("query cannot be empty".into()));
        }

        let query_embedding = self
            .embedder
            .generate(query)
            .await
            .map_err(|e| e.with_context("embedding search query"))?;

        self.retriever
            .retrieve(
                &query_embedding,
                limit.unwrap_or(self.config.default_limit),
                min_similarity,
                group_id,
            )
            .await
    }

    /// Create a manual relationship between two memories. Idempotent: the
    /// (from, to, type) triple is merged, never duplicated.
    pub async fn add_relationship(
        &self,
        from_id: MemoryId,
        to_id: MemoryId,
        rel_type: &str,
        properties: PropertyBag,
    ) -> Result<()> {
        if from_id <= 0 || to_id <= 0 {
            return Err(SynapseError::Validation(
                "from_id and to_id are required".into(),
            ));
        }
        let rel_type = RelationshipType::parse(rel_type)?;

        self.graph
            .merge_edge(from_id, to_id, &rel_type, &properties)
            .await
            .map_err(|e| {
                e.with_context(format!(
                    "creating {} relationship from {} to {}",
                    rel_type, from_id, to_id
                ))
            })
    }

    /// Memories connected to `memory_id` within `max_depth` hops, in either
    /// edge direction, ordered by (hop distance, id)
    pub async fn explore_connections(
        &self,
        memory_id: MemoryId,
        max_depth: Option<u32>,
    ) -> Result<Vec<ConnectedMemory>> {
        if memory_id <= 0 {
            return Err(SynapseError::Validation("memory_id is required".into()));
        }
        // Surface NotFound for unknown starting points instead of an empty list
        self.store.get_memory(memory_id).await?;

        let depth = max_depth.unwrap_or(self.config.explore_depth);
        let reachable = self.graph.traverse(memory_id, depth).await?;

        let ids: Vec<MemoryId> = reachable.iter().map(|(id, _)| *id).collect();
        let hops: std::collections::HashMap<MemoryId, u32> = reachable.into_iter().collect();
        let memories = self.store.get_memories(&ids).await?;

        let mut connected: Vec<ConnectedMemory> = memories
            .into_iter()
            .filter_map(|memory| {
                let hop_distance = *hops.get(&memory.id)?;
                Some(ConnectedMemory {
                    memory,
                    hop_distance,
                })
            })
            .collect();
        connected.sort_by(|a, b| {
            a.hop_distance
                .cmp(&b.hop_distance)
                .then(a.memory.id.cmp(&b.memory.id))
        });

        Ok(connected)
    }

    /// Run relationship detection for an existing memory.
    ///
    /// Best-effort persistence: individual edge failures are counted, not
    /// fatal. `dry_run` returns the accepted proposals without writing.
    pub async fn detect_relationships(
        &self,
        memory_id: MemoryId,
        min_similarity: Option<f32>,
        max_candidates: Option<usize>,
        min_confidence: Option<f64>,
        dry_run: bool,
    ) -> Result<DetectionOutcome> {
        if memory_id <= 0 {
            return Err(SynapseError::Validation("memory_id is required".into()));
        }

        let memory = self.store.get_memory(memory_id).await?;

        let outcome = self
            .pipeline
            .infer(
                &memory,
                min_similarity.unwrap_or(self.config.candidate_min_similarity),
                max_candidates.unwrap_or(self.config.max_candidates),
                min_confidence.unwrap_or(self.config.min_confidence),
                dry_run,
                FailurePolicy::BestEffort,
            )
            .await?;

        let message = if outcome.proposals.is_empty() {
            "No relationships detected".to_string()
        } else if dry_run {
            format!("Found {} relationship suggestions", outcome.proposals.len())
        } else {
            format!(
                "Created {} relationships from {} suggestions",
                outcome.created,
                outcome.proposals.len()
            )
        };

        Ok(DetectionOutcome {
            proposals: outcome.proposals,
            relationships_created: outcome.created,
            message,
        })
    }

    /// Fetch a memory by id
    pub async fn get_memory(&self, memory_id: MemoryId) -> Result<Memory> {
        self.store.get_memory(memory_id).await
    }
}
