// EmbeddingProvider (spec §4.9): cloud (authenticated, rate-limited) and
// offline (local model file) variants behind one trait.

use crate::error::{FindItError, Result};
use crate::providers::rate_limit::RateLimiter;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &str;
    fn dimensions(&self) -> usize;
    fn is_available(&self) -> bool;
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

/// Authenticated cloud embedding backend, rate-limited via a shared token
/// bucket (spec: "Provider rate limiter: global per-provider token bucket
/// shared by all pipelines").
pub struct CloudEmbeddingProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    dimensions: usize,
    rate_limiter: Arc<RateLimiter>,
}

impl CloudEmbeddingProvider {
    pub fn new(endpoint: String, api_key: Option<String>, dimensions: usize, rate_limiter: Arc<RateLimiter>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
            dimensions,
            rate_limiter,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for CloudEmbeddingProvider {
    fn name(&self) -> &str {
        "cloud-embedding"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let Some(api_key) = &self.api_key else {
            return Err(FindItError::ProviderUnavailable(self.name().to_string()));
        };

        self.rate_limiter.acquire().await;

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&serde_json::json!({ "input": text }))
            .send()
            .await
            .map_err(|e| FindItError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(FindItError::ApiError { status, message });
        }

        #[derive(serde::Deserialize)]
        struct EmbeddingResponse {
            embedding: Vec<f32>,
        }
        let parsed: EmbeddingResponse = response.json().await.map_err(|e| FindItError::Network(e.to_string()))?;

        if parsed.embedding.len() != self.dimensions {
            return Err(FindItError::DimensionMismatch {
                expected: self.dimensions,
                got: parsed.embedding.len(),
            });
        }
        Ok(parsed.embedding)
    }
}

/// Local model, available only while its weight file is present on disk.
/// The spec explicitly excludes model weights and decode internals from
/// scope; this stub implements the availability/dimension contract only.
pub struct OfflineEmbeddingProvider {
    model_path: PathBuf,
    dimensions: usize,
}

impl OfflineEmbeddingProvider {
    pub fn new(model_path: PathBuf, dimensions: usize) -> Self {
        Self { model_path, dimensions }
    }
}

#[async_trait]
impl EmbeddingProvider for OfflineEmbeddingProvider {
    fn name(&self) -> &str {
        "offline-embedding"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn is_available(&self) -> bool {
        self.model_path.exists()
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        if !self.is_available() {
            return Err(FindItError::ProviderUnavailable(self.name().to_string()));
        }
        Err(FindItError::ProviderUnavailable(
            "offline embedding model invocation is not wired in this build".to_string(),
        ))
    }
}

/// Tries the cloud provider, then falls back to offline; if neither is
/// configured the caller treats "no dense channel" as the answer and search
/// still works with FTS + CLIP alone (spec §9 design notes).
pub async fn resolve_provider_chain(providers: &[Arc<dyn EmbeddingProvider>]) -> Option<Arc<dyn EmbeddingProvider>> {
    providers.iter().find(|p| p.is_available()).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn offline_provider_unavailable_without_model_file() {
        let provider = OfflineEmbeddingProvider::new(PathBuf::from("/nonexistent/model.bin"), 768);
        assert!(!provider.is_available());
        let result = provider.embed("hello").await;
        assert!(matches!(result, Err(FindItError::ProviderUnavailable(_))));
    }

    #[tokio::test]
    async fn cloud_provider_without_api_key_is_unavailable() {
        let limiter = Arc::new(RateLimiter::new(60));
        let provider = CloudEmbeddingProvider::new("https://example.invalid/embed".to_string(), None, 768, limiter);
        assert!(!provider.is_available());
    }
}
