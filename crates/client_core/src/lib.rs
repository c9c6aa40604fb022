use async_trait::async_trait;
use shared::{
    domain::{ProductItem, StyleProfile},
    error::PipelineError,
};

pub mod config;
pub mod http_backend;
pub mod image_set;
pub mod orchestrator;
pub mod sse;
pub mod stream_consumer;

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;

pub use config::{load_settings_from, PipelineSettings, StageTimeouts};
pub use http_backend::HttpStyleBackend;
pub use image_set::{ImageSet, InputImage};
pub use orchestrator::{PipelineEvent, PipelineOrchestrator, PipelineView};
pub use stream_consumer::{decode_event, OutfitStream, StreamConsumer, StreamSignal};

/// The three backend operations a run depends on, in call order.
#[async_trait]
pub trait StyleBackend: Send + Sync {
    async fn acquire_profile(&self, images: &[InputImage]) -> Result<StyleProfile, PipelineError>;
    async fn open_outfit_stream(
        &self,
        profile: &StyleProfile,
    ) -> Result<Box<dyn OutfitStream>, PipelineError>;
    async fn acquire_products(&self) -> Result<Vec<ProductItem>, PipelineError>;
}

pub struct MissingStyleBackend;

#[async_trait]
impl StyleBackend for MissingStyleBackend {
    async fn acquire_profile(&self, _images: &[InputImage]) -> Result<StyleProfile, PipelineError> {
        Err(unavailable())
    }

    async fn open_outfit_stream(
        &self,
        _profile: &StyleProfile,
    ) -> Result<Box<dyn OutfitStream>, PipelineError> {
        Err(unavailable())
    }

    async fn acquire_products(&self) -> Result<Vec<ProductItem>, PipelineError> {
        Err(unavailable())
    }
}

fn unavailable() -> PipelineError {
    PipelineError::transport("style backend is unavailable")
}
