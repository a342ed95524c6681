//! Relationship inference
//!
//! Discovers typed relationships for one memory: select nearby candidates by
//! vector similarity, ask the classifier, re-validate its proposals, and
//! persist the survivors as idempotent graph edges.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use crate::classify::RelationshipClassifier;
use crate::error::Result;
use crate::graph::GraphStore;
use crate::storage::MemoryStore;
use crate::types::{CandidateMemory, Memory, PropertyBag, RelationshipProposal};

/// What to do when an individual edge write fails mid-run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop at the first failed write and surface the error. Used when
    /// inference runs as a side effect of storing a new memory.
    AbortOnFailure,
    /// Keep going and count successes. Used for explicit, standalone
    /// detection runs.
    BestEffort,
}

/// Result of one inference run
#[derive(Debug, Clone, Default, Serialize)]
pub struct InferenceOutcome {
    /// Proposals that passed the acceptance filter (confidence and
    /// candidate-set membership), whether or not they were persisted
    pub proposals: Vec<RelationshipProposal>,
    /// Edges actually created or refreshed (0 on dry runs)
    pub created: usize,
}

/// Candidate selection, classification, and confidence-gated persistence
/// for a single memory. Each run is independent and replayable: edge merges
/// are idempotent, so re-running over the same pair never duplicates.
pub struct RelationshipInferencePipeline {
    store: Arc<dyn MemoryStore>,
    graph: Arc<dyn GraphStore>,
    classifier: Arc<dyn RelationshipClassifier>,
}

impl RelationshipInferencePipeline {
    pub fn new(
        store: Arc<dyn MemoryStore>,
        graph: Arc<dyn GraphStore>,
        classifier: Arc<dyn RelationshipClassifier>,
    ) -> Self {
        Self {
            store,
            graph,
            classifier,
        }
    }

    /// Infer relationships for `memory`.
    ///
    /// Searches for up to `max_candidates + 1` neighbors of the memory's own
    /// embedding (the extra slot absorbs the memory itself), classifies the
    /// rest, and accepts a proposal only if its confidence clears
    /// `min_confidence` AND its target is one of the candidates actually
    /// shown to the classifier. Anything referencing an id outside the
    /// candidate set is a hallucination and is dropped, never persisted.
    pub async fn infer(
        &self,
        memory: &Memory,
        min_similarity: f32,
        max_candidates: usize,
        min_confidence: f64,
        dry_run: bool,
        policy: FailurePolicy,
    ) -> Result<InferenceOutcome> {
        let candidates = self
            .select_candidates(memory, min_similarity, max_candidates)
            .await?;

        if candidates.is_empty() {
            tracing::debug!(memory_id = memory.id, "no candidates, skipping classifier");
            return Ok(InferenceOutcome::default());
        }

        let proposals = self
            .classifier
            .classify(&memory.text, &candidates)
            .await
            .map_err(|e| e.with_context(format!("classifying memory {}", memory.id)))?;

        let accepted = accept_proposals(proposals, &candidates, min_confidence);

        if dry_run {
            return Ok(InferenceOutcome {
                proposals: accepted,
                created: 0,
            });
        }

        let created = self.persist(memory, &accepted, policy).await?;
        Ok(InferenceOutcome {
            proposals: accepted,
            created,
        })
    }

    async fn select_candidates(
        &self,
        memory: &Memory,
        min_similarity: f32,
        max_candidates: usize,
    ) -> Result<Vec<CandidateMemory>> {
        let neighbors = self
            .store
            .nearest_neighbors(&memory.embedding, max_candidates + 1, min_similarity, None)
            .await
            .map_err(|e| e.with_context(format!("candidate search for memory {}", memory.id)))?;

        Ok(neighbors
            .into_iter()
            .filter(|(m, _)| m.id != memory.id)
            .map(|(m, similarity)| CandidateMemory {
                id: m.id,
                text: m.text,
                similarity,
            })
            .collect())
    }

    async fn persist(
        &self,
        memory: &Memory,
        accepted: &[RelationshipProposal],
        policy: FailurePolicy,
    ) -> Result<usize> {
        let mut created = 0;
        for proposal in accepted {
            let mut properties = PropertyBag::new();
            properties.insert("reason".into(), proposal.reason.clone().into());
            properties.insert("confidence".into(), proposal.confidence.into());
            properties.insert("auto_detected".into(), true.into());

            let write = self
                .graph
                .merge_edge(memory.id, proposal.target_id, &proposal.rel_type, &properties)
                .await;

            match write {
                Ok(()) => created += 1,
                Err(e) => match policy {
                    FailurePolicy::AbortOnFailure => {
                        return Err(e.with_context(format!(
                            "creating {} edge from {} to {}",
                            proposal.rel_type, memory.id, proposal.target_id
                        )));
                    }
                    FailurePolicy::BestEffort => {
                        tracing::warn!(
                            from = memory.id,
                            to = proposal.target_id,
                            rel_type = %proposal.rel_type,
                            error = %e,
                            "failed to create relationship, continuing"
                        );
                    }
                },
            }
        }
        Ok(created)
    }
}

/// The acceptance filter. The classifier is instructed to self-filter below
/// 0.7 and to stay inside the candidate set, but nothing it says is trusted:
/// both conditions are re-checked here.
fn accept_proposals(
    proposals: Vec<RelationshipProposal>,
    candidates: &[CandidateMemory],
    min_confidence: f64,
) -> Vec<RelationshipProposal> {
    let candidate_ids: HashSet<_> = candidates.iter().map(|c| c.id).collect();

    proposals
        .into_iter()
        .filter(|p| {
            if !candidate_ids.contains(&p.target_id) {
                tracing::warn!(
                    target_id = p.target_id,
                    "classifier proposed an id outside the candidate set, rejecting"
                );
                return false;
            }
            if p.confidence < min_confidence {
                tracing::debug!(
                    target_id = p.target_id,
                    confidence = p.confidence,
                    "proposal below confidence floor, rejecting"
                );
                return false;
            }
            true
        })
        .collect()
}
