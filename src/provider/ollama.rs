//! Ollama-backed [`LlmProvider`] for local inference.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::{LlmProvider, ProviderError};

/// Preferred generation models in order of preference.
const PREFERRED_MODELS: &[&str] = &[
    "medgemma",
    "medgemma:27b",
    "medgemma:4b",
    "llama3.1:8b",
];

/// Default embedding model served by Ollama.
const DEFAULT_EMBED_MODEL: &str = "nomic-embed-text";

/// Ollama HTTP client for local LLM inference.
pub struct OllamaProvider {
    base_url: String,
    model: String,
    embed_model: String,
    client: reqwest::Client,
    timeout: std::time::Duration,
}

impl OllamaProvider {
    /// Create a provider pointing at an Ollama instance.
    pub fn new(base_url: &str, model: &str, timeout: std::time::Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Unavailable(format!("HTTP client init failed: {e}")))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            embed_model: DEFAULT_EMBED_MODEL.to_string(),
            client,
            timeout,
        })
    }

    /// Default Ollama instance at localhost:11434 with a 5-minute timeout.
    pub fn default_local(model: &str) -> Result<Self, ProviderError> {
        Self::new("http://localhost:11434", model, std::time::Duration::from_secs(300))
    }

    pub fn with_embed_model(mut self, embed_model: &str) -> Self {
        self.embed_model = embed_model.to_string();
        self
    }

    /// Find the best available generation model.
    pub async fn find_best_model(&self) -> Result<String, ProviderError> {
        let available = self.list_models().await?;
        for preferred in PREFERRED_MODELS {
            if available.iter().any(|m| m.starts_with(preferred)) {
                return Ok(preferred.to_string());
            }
        }
        Err(ProviderError::Unavailable(
            "no preferred model installed".to_string(),
        ))
    }

    /// List models installed on the Ollama instance.
    pub async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;
        let response = self.check_status(response).await?;

        let parsed: OllamaTagsResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        Ok(parsed.models.into_iter().map(|m| m.name).collect())
    }

    fn map_transport(&self, e: reqwest::Error) -> ProviderError {
        if e.is_connect() {
            ProviderError::Unavailable(format!("cannot reach Ollama at {}", self.base_url))
        } else if e.is_timeout() {
            ProviderError::Timeout(self.timeout)
        } else {
            ProviderError::Unavailable(e.to_string())
        }
    }

    async fn check_status(
        &self,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ProviderError> {
        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::RateLimited(body));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Unavailable(format!(
                "Ollama returned {status}: {body}"
            )));
        }
        Ok(response)
    }
}

/// Request body for Ollama /api/generate
#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
}

/// Response body from Ollama /api/generate (non-streaming)
#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

/// One NDJSON line from Ollama /api/generate (streaming)
#[derive(Deserialize)]
struct OllamaStreamChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
}

/// Request body for Ollama /api/embeddings
#[derive(Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

/// Response body from Ollama /api/embeddings
#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embedding: Vec<f32>,
}

/// Response body from Ollama /api/tags
#[derive(Deserialize)]
struct OllamaTagsResponse {
    models: Vec<OllamaModel>,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn generate(&self, prompt: &str, system: &str) -> Result<String, ProviderError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = OllamaGenerateRequest {
            model: &self.model,
            prompt,
            system,
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;
        let response = self.check_status(response).await?;

        let parsed: OllamaGenerateResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        Ok(parsed.response)
    }

    async fn generate_stream(
        &self,
        prompt: &str,
        system: &str,
    ) -> Result<mpsc::Receiver<String>, ProviderError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = OllamaGenerateRequest {
            model: &self.model,
            prompt,
            system,
            stream: true,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;
        let mut response = self.check_status(response).await?;

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            // NDJSON lines may split across chunks; buffer until newline.
            let mut buffer = String::new();
            loop {
                match response.chunk().await {
                    Ok(Some(bytes)) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));
                        while let Some(pos) = buffer.find('\n') {
                            let line: String = buffer.drain(..=pos).collect();
                            let line = line.trim();
                            if line.is_empty() {
                                continue;
                            }
                            match serde_json::from_str::<OllamaStreamChunk>(line) {
                                Ok(chunk) => {
                                    if !chunk.response.is_empty()
                                        && tx.send(chunk.response).await.is_err()
                                    {
                                        return;
                                    }
                                    if chunk.done {
                                        return;
                                    }
                                }
                                Err(e) => {
                                    tracing::debug!(error = %e, "skipping malformed stream line");
                                }
                            }
                        }
                    }
                    Ok(None) => return,
                    Err(e) => {
                        tracing::warn!(error = %e, "Ollama stream read failed");
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let url = format!("{}/api/embeddings", self.base_url);
        let body = OllamaEmbedRequest {
            model: &self.embed_model,
            prompt: text,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;
        let response = self.check_status(response).await?;

        let parsed: OllamaEmbedResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        Ok(parsed.embedding)
    }
}
