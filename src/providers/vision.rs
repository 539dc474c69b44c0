// VisionCaptionProvider (spec §4.9): frames in, structured caption out.
// Batched up to N images per request.

use crate::constants::DEFAULT_VISION_MAX_IMAGES_PER_REQUEST;
use crate::error::{FindItError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

/// Structured vision caption, one per clip. Field names mirror the spec's
/// JSON shape (`shotType` becomes `shot_type` on the Rust side).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VisionCaption {
    pub scene: Option<String>,
    pub subjects: Option<String>,
    pub actions: Option<String>,
    pub objects: Option<String>,
    pub mood: Option<String>,
    pub shot_type: Option<String>,
    pub lighting: Option<String>,
    pub colors: Option<String>,
    pub description: Option<String>,
}

#[async_trait]
pub trait VisionCaptionProvider: Send + Sync {
    fn name(&self) -> &str;
    fn is_available(&self) -> bool;
    fn max_images_per_request(&self) -> usize {
        DEFAULT_VISION_MAX_IMAGES_PER_REQUEST
    }
    async fn caption(&self, frame_paths: &[std::path::PathBuf]) -> Result<Vec<VisionCaption>>;
}

pub struct CloudVisionCaptionProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl CloudVisionCaptionProvider {
    pub fn new(endpoint: String, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
        }
    }
}

#[async_trait]
impl VisionCaptionProvider for CloudVisionCaptionProvider {
    fn name(&self) -> &str {
        "cloud-vision"
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn caption(&self, frame_paths: &[std::path::PathBuf]) -> Result<Vec<VisionCaption>> {
        let Some(api_key) = &self.api_key else {
            return Err(FindItError::ProviderUnavailable(self.name().to_string()));
        };
        if frame_paths.is_empty() {
            return Ok(Vec::new());
        }

        let mut images = Vec::with_capacity(frame_paths.len());
        for path in frame_paths {
            let bytes = tokio::fs::read(path).await?;
            images.push(base64_encode(&bytes));
        }

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&serde_json::json!({ "images": images }))
            .send()
            .await
            .map_err(|e| FindItError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(FindItError::ApiError { status, message });
        }

        #[derive(Deserialize)]
        struct CaptionResponse {
            captions: Vec<VisionCaption>,
        }
        let parsed: CaptionResponse = response.json().await.map_err(|e| FindItError::Network(e.to_string()))?;
        Ok(parsed.captions)
    }
}

fn base64_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    const TABLE: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut out = String::with_capacity((bytes.len() + 2) / 3 * 4);
    for chunk in bytes.chunks(3) {
        let b0 = chunk[0];
        let b1 = *chunk.get(1).unwrap_or(&0);
        let b2 = *chunk.get(2).unwrap_or(&0);
        let _ = write!(
            out,
            "{}{}{}{}",
            TABLE[(b0 >> 2) as usize] as char,
            TABLE[(((b0 & 0x03) << 4) | (b1 >> 4)) as usize] as char,
            if chunk.len() > 1 { TABLE[(((b1 & 0x0f) << 2) | (b2 >> 6)) as usize] as char } else { '=' },
            if chunk.len() > 2 { TABLE[(b2 & 0x3f) as usize] as char } else { '=' },
        );
    }
    out
}

/// Local VLM fallback (spec §4.7 stage 4: "fill from local VLM fallback or
/// leave null"). Model weights are out of scope; this records availability
/// honestly rather than faking captions.
pub struct OfflineVisionCaptionProvider {
    model_dir: std::path::PathBuf,
}

impl OfflineVisionCaptionProvider {
    pub fn new(model_dir: std::path::PathBuf) -> Self {
        Self { model_dir }
    }
}

#[async_trait]
impl VisionCaptionProvider for OfflineVisionCaptionProvider {
    fn name(&self) -> &str {
        "offline-vision"
    }

    fn is_available(&self) -> bool {
        self.model_dir.exists()
    }

    async fn caption(&self, frame_paths: &[std::path::PathBuf]) -> Result<Vec<VisionCaption>> {
        if !self.is_available() {
            return Err(FindItError::ProviderUnavailable(self.name().to_string()));
        }
        Ok(frame_paths.iter().map(|_| VisionCaption::default()).collect())
    }
}

pub async fn resolve_vision_provider(
    providers: &[Arc<dyn VisionCaptionProvider>],
) -> Option<Arc<dyn VisionCaptionProvider>> {
    providers.iter().find(|p| p.is_available()).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn offline_provider_unavailable_without_model_dir() {
        let provider = OfflineVisionCaptionProvider::new(std::path::PathBuf::from("/nonexistent/vlm"));
        assert!(!provider.is_available());
        let result = provider.caption(&[]).await;
        assert!(result.is_err());
    }

    #[test]
    fn base64_roundtrip_length_is_padded() {
        let encoded = base64_encode(b"ab");
        assert_eq!(encoded.len(), 4);
        assert!(encoded.ends_with('='));
    }
}
