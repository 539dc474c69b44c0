// Provider interfaces (spec §4.9). The pipeline consumes capability traits,
// not concrete backends, the same way the teacher's `camera` layer used to
// sit behind a trait before device-specific implementations (now gone from
// this crate, but the shape survives: `initialize`/`is_available`/`work`).

pub mod clip_embed;
pub mod embedding;
pub mod rate_limit;
pub mod stt;
pub mod vision;

pub use clip_embed::CLIPEmbeddingProvider;
pub use embedding::EmbeddingProvider;
pub use rate_limit::RateLimiter;
pub use stt::STTProvider;
pub use vision::{VisionCaptionProvider, VisionCaption};

use async_trait::async_trait;

/// Common lifecycle every provider handle exposes regardless of capability.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;
    /// Cheap local check (API key present, model file on disk); never makes
    /// a network call.
    fn is_available(&self) -> bool;
}
