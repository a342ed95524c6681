//! Relationship classification
//!
//! Sends a source memory plus its nearest candidates to an LLM and parses
//! back typed relationship proposals. The pipeline in `crate::inference`
//! re-validates everything the classifier returns; nothing here is trusted
//! beyond being syntactically well-formed.

use std::fmt::Write as _;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Result, SynapseError};
use crate::types::{CandidateMemory, ClassifierConfig, RelationshipProposal};

/// Trait for relationship classifiers
#[async_trait]
pub trait RelationshipClassifier: Send + Sync {
    /// Propose typed relationships between the source text and the given
    /// candidates. An empty list is a valid "no relationships" answer.
    async fn classify(
        &self,
        source_text: &str,
        candidates: &[CandidateMemory],
    ) -> Result<Vec<RelationshipProposal>>;
}

/// Classifier backed by an OpenAI-compatible chat completions endpoint
pub struct OpenAiClassifier {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiClassifier {
    pub fn new(config: &ClassifierConfig) -> Result<Self> {
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

    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut request = self.client.post(&url).json(&serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            // Low temperature for consistent JSON
            "temperature": 0.1,
            "max_tokens": 1000,
        }));
        if let Some(ref key) = self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| SynapseError::unavailable("classifier", e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SynapseError::unavailable(
                "classifier",
                format!("API error {}: {}", status, body),
            ));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SynapseError::malformed("classifier", e.to_string()))?;

        data["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| SynapseError::malformed("classifier", "no completion returned"))
    }
}

#[async_trait]
impl RelationshipClassifier for OpenAiClassifier {
    async fn classify(
        &self,
        source_text: &str,
        candidates: &[CandidateMemory],
    ) -> Result<Vec<RelationshipProposal>> {
        let prompt = build_relationship_prompt(source_text, candidates);
        let response = self.complete(&prompt).await?;
        tracing::debug!(bytes = response.len(), "classifier response received");
        parse_proposals(&response)
    }
}

/// Build the relationship-analysis prompt
pub fn build_relationship_prompt(source_text: &str, candidates: &[CandidateMemory]) -> String {
    let mut prompt = format!(
        "You are analyzing memories to detect semantic relationships.\n\n\
         SOURCE MEMORY: \"{}\"\n\n\
         CANDIDATE MEMORIES:\n",
        source_text
    );

    for (i, candidate) in candidates.iter().enumerate() {
        let _ = writeln!(
            prompt,
            "{}. [ID: {}, Similarity: {:.2}] \"{}\"",
            i + 1,
            candidate.id,
            candidate.similarity,
            candidate.text
        );
    }

    prompt.push_str(
        "\nAnalyze each candidate and determine if there's a meaningful relationship with the source memory.\n\
         \n\
         RELATIONSHIP TYPES:\n\
         - RELATES_TO: General semantic connection\n\
         - BUILDS_ON: Extends or improves the source concept\n\
         - CONTRADICTS: Presents conflicting information\n\
         - EXEMPLIFIES: Provides a specific example of the source concept\n\
         - DEPENDS_ON: Source requires understanding this first\n\
         - SIMILAR_TO: Very similar but different context\n\
         - CAUSES: Source leads to this outcome\n\
         - SOLVED_BY: Source problem is resolved by this\n\
         \n\
         Return ONLY a JSON array (no markdown, no explanation) with this format:\n\
         [\n\
           {\n\
             \"target_id\": 123,\n\
             \"type\": \"RELATES_TO\",\n\
             \"reason\": \"Brief explanation why\",\n\
             \"confidence\": 0.85\n\
           }\n\
         ]\n\
         \n\
         Only include relationships with confidence >= 0.7. Return empty array [] if no strong relationships found.",
    );

    prompt
}

/// Parse the classifier's JSON array, tolerating markdown code fences.
///
/// Models wrap output in ``` blocks despite instructions often enough that
/// rejecting fenced output would turn routine calls into failures.
pub fn parse_proposals(response: &str) -> Result<Vec<RelationshipProposal>> {
    let body = strip_code_fences(response);
    serde_json::from_str(body).map_err(|e| {
        SynapseError::malformed("classifier", format!("expected JSON array of proposals: {}", e))
    })
}

fn strip_code_fences(s: &str) -> &str {
    let trimmed = s.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop an optional language tag after the opening fence
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.trim().strip_suffix("```").unwrap_or(inner).trim()
}
