// CLIPEmbeddingProvider (spec §4.9): text and image embeddings share one
// 768-dim comparable space.

use crate::constants::CLIP_EMBEDDING_DIMENSIONS;
use crate::error::{FindItError, Result};
use async_trait::async_trait;
use std::path::Path;

#[async_trait]
pub trait CLIPEmbeddingProvider: Send + Sync {
    fn name(&self) -> &str;
    fn dimensions(&self) -> usize {
        CLIP_EMBEDDING_DIMENSIONS
    }
    fn is_available(&self) -> bool;
    async fn encode_text(&self, text: &str) -> Result<Vec<f32>>;
    async fn encode_image(&self, image_path: &Path) -> Result<Vec<f32>>;
}

pub struct CloudCLIPEmbeddingProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl CloudCLIPEmbeddingProvider {
    pub fn new(endpoint: String, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
        }
    }

    async fn post(&self, body: serde_json::Value) -> Result<Vec<f32>> {
        let Some(api_key) = &self.api_key else {
            return Err(FindItError::ProviderUnavailable(self.name().to_string()));
        };
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| FindItError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(FindItError::ApiError { status, message });
        }

        #[derive(serde::Deserialize)]
        struct Resp {
            embedding: Vec<f32>,
        }
        let parsed: Resp = response.json().await.map_err(|e| FindItError::Network(e.to_string()))?;
        if parsed.embedding.len() != self.dimensions() {
            return Err(FindItError::DimensionMismatch {
                expected: self.dimensions(),
                got: parsed.embedding.len(),
            });
        }
        Ok(parsed.embedding)
    }
}

#[async_trait]
impl CLIPEmbeddingProvider for CloudCLIPEmbeddingProvider {
    fn name(&self) -> &str {
        "cloud-clip"
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn encode_text(&self, text: &str) -> Result<Vec<f32>> {
        self.post(serde_json::json!({ "modality": "text", "input": text })).await
    }

    async fn encode_image(&self, image_path: &Path) -> Result<Vec<f32>> {
        let bytes = tokio::fs::read(image_path).await?;
        self.post(serde_json::json!({ "modality": "image", "size": bytes.len() })).await
    }
}

pub struct OfflineCLIPEmbeddingProvider {
    model_path: std::path::PathBuf,
}

impl OfflineCLIPEmbeddingProvider {
    pub fn new(model_path: std::path::PathBuf) -> Self {
        Self { model_path }
    }
}

#[async_trait]
impl CLIPEmbeddingProvider for OfflineCLIPEmbeddingProvider {
    fn name(&self) -> &str {
        "offline-clip"
    }

    fn is_available(&self) -> bool {
        self.model_path.exists()
    }

    async fn encode_text(&self, _text: &str) -> Result<Vec<f32>> {
        Err(FindItError::ProviderUnavailable(self.name().to_string()))
    }

    async fn encode_image(&self, _image_path: &Path) -> Result<Vec<f32>> {
        Err(FindItError::ProviderUnavailable(self.name().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cloud_clip_without_key_reports_unavailable() {
        let provider = CloudCLIPEmbeddingProvider::new("https://example.invalid/clip".to_string(), None);
        assert!(!provider.is_available());
        let result = provider.encode_text("hello").await;
        assert!(matches!(result, Err(FindItError::ProviderUnavailable(_))));
    }
}
