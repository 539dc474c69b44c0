// STTProvider (spec §4.9): transcribe(audio) -> {text, srt}, distinguishing
// NoAudio from a real transcription Failure.

use crate::error::{FindItError, Result};
use async_trait::async_trait;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct Transcript {
    pub text: String,
    pub srt: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscribeOutcome {
    Transcribed,
    NoAudio,
}

#[async_trait]
pub trait STTProvider: Send + Sync {
    fn name(&self) -> &str;
    fn is_available(&self) -> bool;
    /// Returns `Ok(None)` with `TranscribeOutcome::NoAudio` communicated by
    /// the caller's `has_audio` check upstream; a real provider failure is
    /// an `Err`, never folded into a `None`.
    async fn transcribe(&self, audio_path: &Path) -> Result<Transcript>;
}

pub struct CloudSTTProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl CloudSTTProvider {
    pub fn new(endpoint: String, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
        }
    }
}

#[async_trait]
impl STTProvider for CloudSTTProvider {
    fn name(&self) -> &str {
        "cloud-stt"
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn transcribe(&self, audio_path: &Path) -> Result<Transcript> {
        let Some(api_key) = &self.api_key else {
            return Err(FindItError::ProviderUnavailable(self.name().to_string()));
        };
        let audio_bytes = tokio::fs::read(audio_path).await?;

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .body(audio_bytes)
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
            text: String,
            srt: String,
        }
        let parsed: Resp = response.json().await.map_err(|e| FindItError::Network(e.to_string()))?;
        Ok(Transcript {
            text: parsed.text,
            srt: parsed.srt,
        })
    }
}

pub struct OfflineSTTProvider {
    model_path: std::path::PathBuf,
}

impl OfflineSTTProvider {
    pub fn new(model_path: std::path::PathBuf) -> Self {
        Self { model_path }
    }
}

#[async_trait]
impl STTProvider for OfflineSTTProvider {
    fn name(&self) -> &str {
        "offline-stt"
    }

    fn is_available(&self) -> bool {
        self.model_path.exists()
    }

    async fn transcribe(&self, _audio_path: &Path) -> Result<Transcript> {
        Err(FindItError::ProviderUnavailable(self.name().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn offline_without_model_is_unavailable() {
        let provider = OfflineSTTProvider::new(std::path::PathBuf::from("/nonexistent/whisper.bin"));
        assert!(!provider.is_available());
    }
}
