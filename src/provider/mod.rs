//! LLM and knowledge-retrieval seams.
//!
//! The engine never talks to a backend directly: the model sub-extractor and
//! the final-note synthesis go through [`LlmProvider`], evidence lookup goes
//! through [`KnowledgeRetriever`]. Both are async traits so a transport can
//! be local (Ollama) or remote without the pipeline noticing.
//!
//! Every call site wraps the provider in [`call_with_retry`]: one timeout,
//! at most one retry, and only for transient failures.

pub mod ollama;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

pub use ollama::OllamaProvider;

// ═══════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════

/// Errors surfaced by LLM and retrieval backends.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider unavailable: {0}")]
    Unavailable(String),
    #[error("Provider rate limited: {0}")]
    RateLimited(String),
    #[error("Provider call timed out after {0:?}")]
    Timeout(Duration),
    #[error("Provider returned an unusable response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Transient failures are worth a second attempt. Rate limits and
    /// malformed output are not — retrying them repeats the problem.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::Unavailable(_) | ProviderError::Timeout(_)
        )
    }
}

// ═══════════════════════════════════════════════════════════
// Traits
// ═══════════════════════════════════════════════════════════

/// A text-generation backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate a completion for `prompt` under the given system prompt.
    async fn generate(&self, prompt: &str, system: &str) -> Result<String, ProviderError>;

    /// Stream a completion as text chunks.
    async fn generate_stream(
        &self,
        prompt: &str,
        system: &str,
    ) -> Result<mpsc::Receiver<String>, ProviderError>;

    /// Embed text for similarity search.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;
}

/// An evidence passage returned by the knowledge retriever.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidencePassage {
    pub content: String,
    pub source: String,
    pub score: f32,
}

/// A clinical-knowledge search backend.
#[async_trait]
pub trait KnowledgeRetriever: Send + Sync {
    /// Return up to `k` passages relevant to `query`, optionally scoped to a
    /// calculator category.
    async fn search(
        &self,
        query: &str,
        category: Option<&str>,
        k: usize,
    ) -> Result<Vec<EvidencePassage>, ProviderError>;
}

// ═══════════════════════════════════════════════════════════
// Retry policy
// ═══════════════════════════════════════════════════════════

/// Run a provider call under a timeout, retrying transient failures.
///
/// `retries` counts extra attempts after the first. Non-transient errors
/// propagate immediately.
pub async fn call_with_retry<T, F, Fut>(
    op: &'static str,
    timeout: Duration,
    retries: u32,
    mut call: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt: u32 = 0;
    loop {
        let result = match tokio::time::timeout(timeout, call()).await {
            Ok(inner) => inner,
            Err(_) => Err(ProviderError::Timeout(timeout)),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < retries => {
                tracing::warn!(op, attempt = attempt + 1, error = %e, "provider call failed, retrying");
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Mocks — shipped so downstream crates can test against the seams
// ═══════════════════════════════════════════════════════════

/// Mock LLM provider for testing — returns a configurable response.
pub struct MockProvider {
    response: String,
    embedding: Vec<f32>,
}

impl MockProvider {
    pub fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
            embedding: vec![0.1, 0.2, 0.3],
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = embedding;
        self
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    async fn generate(&self, _prompt: &str, _system: &str) -> Result<String, ProviderError> {
        Ok(self.response.clone())
    }

    async fn generate_stream(
        &self,
        _prompt: &str,
        _system: &str,
    ) -> Result<mpsc::Receiver<String>, ProviderError> {
        let (tx, rx) = mpsc::channel(1);
        let response = self.response.clone();
        tokio::spawn(async move {
            let _ = tx.send(response).await;
        });
        Ok(rx)
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
        Ok(self.embedding.clone())
    }
}

/// Mock retriever for testing — returns configured passages.
pub struct MockRetriever {
    passages: Vec<EvidencePassage>,
}

impl MockRetriever {
    pub fn new(passages: Vec<EvidencePassage>) -> Self {
        Self { passages }
    }

    pub fn empty() -> Self {
        Self { passages: Vec::new() }
    }
}

#[async_trait]
impl KnowledgeRetriever for MockRetriever {
    async fn search(
        &self,
        _query: &str,
        _category: Option<&str>,
        k: usize,
    ) -> Result<Vec<EvidencePassage>, ProviderError> {
        Ok(self.passages.iter().take(k).cloned().collect())
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
