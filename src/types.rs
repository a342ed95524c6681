//! Core types for Synapse

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Unique identifier for a memory
pub type MemoryId = i64;

/// A stored memory: text plus its embedding and an optional group tag.
///
/// Memories are created once and never mutated except for timestamps;
/// deletion is out of scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    /// Unique identifier, assigned on store, never reused
    pub id: MemoryId,
    /// The remembered text (never empty)
    pub text: String,
    /// Embedding vector. Skipped in output to keep payloads small; it is
    /// only consumed by the vector index.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
    /// Optional partition key for multi-tenant isolation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    /// When the memory was created
    pub created_at: DateTime<Utc>,
    /// When the memory was last updated
    pub updated_at: DateTime<Utc>,
}

/// How a search result was discovered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultOrigin {
    /// Matched the query vector directly
    Direct,
    /// Reached through relationship edges from a direct match
    Graph,
}

/// A single search hit.
///
/// Direct results carry a cosine similarity in [-1, 1] and hop distance 0.
/// Graph results are unscored (similarity fixed at 0) and carry the minimum
/// hop distance observed from any seed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub memory: Memory,
    pub similarity: f32,
    pub origin: ResultOrigin,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub hop_distance: u32,
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

impl SearchResult {
    /// A stage-1 vector match
    pub fn direct(memory: Memory, similarity: f32) -> Self {
        Self {
            memory,
            similarity,
            origin: ResultOrigin::Direct,
            hop_distance: 0,
        }
    }

    /// A stage-2 graph-discovered result
    pub fn via_graph(memory: Memory, hop_distance: u32) -> Self {
        Self {
            memory,
            similarity: 0.0,
            origin: ResultOrigin::Graph,
            hop_distance,
        }
    }
}

/// A memory offered to the relationship classifier as a potential target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateMemory {
    pub id: MemoryId,
    pub text: String,
    pub similarity: f32,
}

/// Maximum relationship type token length
pub const MAX_RELATIONSHIP_TYPE_LENGTH: usize = 64;

/// The conventional relationship vocabulary. The type space is open, but the
/// classifier is instructed to stay within these eight.
pub const CANONICAL_RELATIONSHIP_TYPES: &[&str] = &[
    "RELATES_TO",
    "BUILDS_ON",
    "CONTRADICTS",
    "EXEMPLIFIES",
    "DEPENDS_ON",
    "SIMILAR_TO",
    "CAUSES",
    "SOLVED_BY",
];

/// A validated relationship type token.
///
/// Tokens are normalized to uppercase `[A-Z0-9_]`, max 64 chars. Validation
/// happens before any storage call, so the graph layer never sees a token it
/// would have to escape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelationshipType(String);

impl RelationshipType {
    /// Normalize and validate a raw type token
    pub fn parse(raw: &str) -> crate::error::Result<Self> {
        let normalized = raw.trim().to_uppercase();

        if normalized.is_empty() {
            return Err(crate::error::SynapseError::Validation(
                "relationship type cannot be empty".to_string(),
            ));
        }
        if normalized.len() > MAX_RELATIONSHIP_TYPE_LENGTH {
            return Err(crate::error::SynapseError::Validation(format!(
                "relationship type exceeds {} characters",
                MAX_RELATIONSHIP_TYPE_LENGTH
            )));
        }
        if !normalized
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(crate::error::SynapseError::Validation(format!(
                "relationship type '{}' may only contain letters, digits, and underscores",
                raw
            )));
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this token is one of the eight conventional types
    pub fn is_canonical(&self) -> bool {
        CANONICAL_RELATIONSHIP_TYPES.contains(&self.0.as_str())
    }
}

impl std::fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RelationshipType {
    type Err = crate::error::SynapseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for RelationshipType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for RelationshipType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// A scalar edge property value.
///
/// Deliberately closed: a property is exactly one of string, number, or
/// boolean. No nested structures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::Text(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::Text(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Number(v)
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

/// Property bag attached to a relationship edge
pub type PropertyBag = HashMap<String, PropertyValue>;

/// A directed, typed edge between two memories.
///
/// A given (from_id, to_id, type) triple is logically unique; recreating it
/// updates properties instead of duplicating the edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub from_id: MemoryId,
    pub to_id: MemoryId,
    #[serde(rename = "type")]
    pub rel_type: RelationshipType,
    #[serde(default)]
    pub properties: PropertyBag,
    pub created_at: DateTime<Utc>,
}

/// A relationship proposed by the classifier. Transient: consumed by the
/// inference pipeline in the same call that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipProposal {
    pub target_id: MemoryId,
    #[serde(rename = "type")]
    pub rel_type: RelationshipType,
    pub reason: String,
    pub confidence: f64,
}

/// Embedding service configuration
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// OpenAI-compatible API base URL
    pub base_url: String,
    /// Model name
    pub model: String,
    /// API key (optional for local endpoints)
    pub api_key: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:1234/v1".to_string(),
            model: "text-embedding-3-small".to_string(),
            api_key: None,
            timeout_secs: 30,
        }
    }
}

/// Relationship classifier (LLM) configuration
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// OpenAI-compatible API base URL
    pub base_url: String,
    /// Model name
    pub model: String,
    /// API key (optional for local endpoints)
    pub api_key: Option<String>,
    /// Request timeout in seconds. Longer than embedding: classification is
    /// latency-prone but called at most once per operation.
    pub timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:1234/v1".to_string(),
            model: "qwen/qwen3-4b-2507".to_string(),
            api_key: None,
            timeout_secs: 60,
        }
    }
}

/// Retrieval and inference tunables
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Default result limit for hybrid search
    pub default_limit: usize,
    /// Graph expansion depth for hybrid search
    pub expansion_depth: u32,
    /// Default traversal depth for explore_connections
    pub explore_depth: u32,
    /// Minimum candidate similarity for relationship detection
    pub candidate_min_similarity: f32,
    /// Maximum candidates handed to the classifier
    pub max_candidates: usize,
    /// Minimum classifier confidence to persist a relationship
    pub min_confidence: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 5,
            expansion_depth: 1,
            explore_depth: 2,
            candidate_min_similarity: 0.5,
            max_candidates: 10,
            min_confidence: 0.7,
        }
    }
}

/// Full service configuration, loaded once and handed to the service
/// constructor. No process-wide state.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub embedding: EmbeddingConfig,
    pub classifier: ClassifierConfig,
    pub search: SearchConfig,
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        let embedding = EmbeddingConfig {
            base_url: env_or("EMBEDDING_BASE_URL", "http://localhost:1234/v1"),
            model: env_or("EMBEDDING_MODEL", "text-embedding-3-small"),
            api_key: std::env::var("EMBEDDING_API_KEY").ok().filter(|k| !k.is_empty()),
            ..EmbeddingConfig::default()
        };
        let classifier = ClassifierConfig {
            base_url: env_or("LLM_BASE_URL", "http://localhost:1234/v1"),
            model: env_or("LLM_MODEL", "qwen/qwen3-4b-2507"),
            api_key: std::env::var("LLM_API_KEY").ok().filter(|k| !k.is_empty()),
            ..ClassifierConfig::default()
        };

        Self {
            embedding,
            classifier,
            search: SearchConfig::default(),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
