//! Embedding generation
//!
//! The `EmbeddingProvider` seam hides the embedding service; the bundled
//! implementation talks to any OpenAI-compatible `/embeddings` endpoint
//! (OpenAI, LM Studio, Ollama's compat layer, OpenRouter).

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Result, SynapseError};
use crate::types::EmbeddingConfig;

/// Trait for embedding generators
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single text. Exactly one vector per call;
    /// an empty result is an error, never an empty vector.
    async fn generate(&self, text: &str) -> Result<Vec<f32>>;

    /// Model name, for logging
    fn model_name(&self) -> &str;
}

/// Embedding client for OpenAI-compatible APIs
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn generate(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/embeddings", self.base_url);

        let mut request = self.client.post(&url).json(&serde_json::json!({
            "input": text,
            "model": self.model,
        }));
        if let Some(ref key) = self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| SynapseError::unavailable("embedding", e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SynapseError::unavailable(
                "embedding",
                format!("API error {}: {}", status, body),
            ));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SynapseError::malformed("embedding", e.to_string()))?;

        let embedding: Vec<f32> = data["data"][0]["embedding"]
            .as_array()
            .ok_or_else(|| SynapseError::malformed("embedding", "missing data[0].embedding"))?
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect();

        if embedding.is_empty() {
            return Err(SynapseError::malformed("embedding", "empty embedding returned"));
        }

        Ok(embedding)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Cosine similarity between two vectors, range [-1, 1].
///
/// Mismatched lengths and zero vectors score 0 rather than erroring; a
/// degenerate embedding should rank last, not break retrieval.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.001);

        let c = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &c).abs() < 0.001);

        let d = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &d) + 1.0).abs() < 0.001);
    }

    #[test]
    fn test_cosine_similarity_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }
}
