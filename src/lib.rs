//! Synapse - hybrid memory retrieval
//!
//! Stores text memories with embeddings, answers search queries by combining
//! dense-vector similarity with relationship-graph expansion, and infers
//! typed relationships between memories with an LLM classifier.

pub mod classify;
pub mod embedding;
pub mod error;
pub mod graph;
pub mod inference;
pub mod search;
pub mod service;
pub mod storage;
pub mod types;

pub use error::{Result, SynapseError};
pub use service::MemoryService;
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
