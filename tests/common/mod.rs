//! Shared test doubles for the integration suites
#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use synapse::classify::RelationshipClassifier;
use synapse::embedding::EmbeddingProvider;
use synapse::graph::{GraphStore, SqliteGraph};
use synapse::storage::{MemoryStore, SqliteStore};
use synapse::{
    CandidateMemory, MemoryId, MemoryService, PropertyBag, RelationshipProposal,
    RelationshipType, Result, SearchConfig, SynapseError,
};

/// Embedder with a fixed text -> vector table. Unknown texts fail like an
/// unreachable service, which doubles as the embedding-failure fixture.
pub struct StubEmbedder {
    vectors: Mutex<HashMap<String, Vec<f32>>>,
}

impl StubEmbedder {
    pub fn new() -> Self {
        Self {
            vectors: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_vector(self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.lock().unwrap().insert(text.to_string(), vector);
        self
    }
}

#[async_trait]
impl EmbeddingProvider for StubEmbedder {
    async fn generate(&self, text: &str) -> Result<Vec<f32>> {
        self.vectors
            .lock()
            .unwrap()
            .get(text)
            .cloned()
            .ok_or_else(|| SynapseError::unavailable("embedding", "connection refused"))
    }

    fn model_name(&self) -> &str {
        "stub-embedder"
    }
}

/// One scripted classifier turn
pub enum ScriptedReply {
    Proposals(Vec<RelationshipProposal>),
    Unavailable,
    Malformed,
}

/// Classifier that replays scripted replies in order and records what it was
/// shown. Panics if called more times than scripted.
pub struct ScriptedClassifier {
    replies: Mutex<VecDeque<ScriptedReply>>,
    pub calls: Mutex<Vec<(String, Vec<CandidateMemory>)>>,
}

impl ScriptedClassifier {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A classifier that must never be reached
    pub fn unreachable() -> Self {
        Self::new(vec![])
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl RelationshipClassifier for ScriptedClassifier {
    async fn classify(
        &self,
        source_text: &str,
        candidates: &[CandidateMemory],
    ) -> Result<Vec<RelationshipProposal>> {
        self.calls
            .lock()
            .unwrap()
            .push((source_text.to_string(), candidates.to_vec()));

        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("classifier called more times than scripted");

        match reply {
            ScriptedReply::Proposals(proposals) => Ok(proposals),
            ScriptedReply::Unavailable => {
                Err(SynapseError::unavailable("classifier", "connection refused"))
            }
            ScriptedReply::Malformed => Err(SynapseError::malformed(
                "classifier",
                "expected JSON array of proposals",
            )),
        }
    }
}

/// Graph wrapper that fails selected merge_edge calls (1-based call index)
pub struct FlakyGraph {
    inner: SqliteGraph,
    fail_on_calls: HashSet<usize>,
    calls: Mutex<usize>,
}

impl FlakyGraph {
    pub fn new(inner: SqliteGraph, fail_on_calls: impl IntoIterator<Item = usize>) -> Self {
        Self {
            inner,
            fail_on_calls: fail_on_calls.into_iter().collect(),
            calls: Mutex::new(0),
        }
    }
}

#[async_trait]
impl GraphStore for FlakyGraph {
    async fn upsert_node(&self, memory_id: MemoryId) -> Result<()> {
        self.inner.upsert_node(memory_id).await
    }

    async fn merge_edge(
        &self,
        from_id: MemoryId,
        to_id: MemoryId,
        rel_type: &RelationshipType,
        properties: &PropertyBag,
    ) -> Result<()> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            *calls
        };
        if self.fail_on_calls.contains(&call) {
            return Err(SynapseError::Graph("edge write failed".into()));
        }
        self.inner
            .merge_edge(from_id, to_id, rel_type, properties)
            .await
    }

    async fn traverse(&self, seed_id: MemoryId, max_depth: u32) -> Result<Vec<(MemoryId, u32)>> {
        self.inner.traverse(seed_id, max_depth).await
    }
}

pub fn proposal(target_id: MemoryId, rel_type: &str, confidence: f64) -> RelationshipProposal {
    RelationshipProposal {
        target_id,
        rel_type: RelationshipType::parse(rel_type).unwrap(),
        reason: format!("scripted {rel_type} proposal"),
        confidence,
    }
}

/// Service over an in-memory database with the given embedder and classifier
pub fn service_with(
    embedder: StubEmbedder,
    classifier: ScriptedClassifier,
) -> (MemoryService, Arc<SqliteStore>) {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let graph = Arc::new(SqliteGraph::from_store(&store));
    let service = MemoryService::new(
        Arc::clone(&store) as Arc<dyn MemoryStore>,
        graph,
        Arc::new(embedder),
        Arc::new(classifier),
        SearchConfig::default(),
    );
    (service, store)
}

/// Like `service_with`, but edge writes fail on the given 1-based call indices
pub fn service_with_flaky_graph(
    embedder: StubEmbedder,
    classifier: ScriptedClassifier,
    fail_on_calls: impl IntoIterator<Item = usize>,
) -> (MemoryService, Arc<SqliteStore>) {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let graph = Arc::new(FlakyGraph::new(
        SqliteGraph::from_store(&store),
        fail_on_calls,
    ));
    let service = MemoryService::new(
        Arc::clone(&store) as Arc<dyn MemoryStore>,
        graph,
        Arc::new(embedder),
        Arc::new(classifier),
        SearchConfig::default(),
    );
    (service, store)
}

/// Vectors arranged so that:
/// - cos(A, B) ~= 0.82 (B is a strong candidate for A)
/// - cos(query, A) = 0.90 (query direct-matches A)
/// - cos(query, B) ~= 0.49 (B is below a 0.6 similarity floor)
pub const TEXT_A: &str = "Rust has a borrow checker";
pub const TEXT_B: &str = "Ownership prevents data races";
pub const QUERY_NEAR_A: &str = "how does rust check borrows";

pub fn scenario_embedder() -> StubEmbedder {
    StubEmbedder::new()
        .with_vector(TEXT_A, vec![1.0, 0.0, 0.0])
        .with_vector(TEXT_B, vec![0.82, 0.5724, 0.0])
        .with_vector(QUERY_NEAR_A, vec![0.9, -0.4359, 0.0])
}
