pub mod analysis;
pub mod audio_extractor;
pub mod brief;
pub mod composer;
pub mod config;
pub mod data_uri;
pub mod error;
pub mod extractor;
pub mod frame_sampler;
pub mod handler;
pub mod payload;
pub mod prompts;
pub mod provider;
pub mod report;
pub mod timestamp;
pub mod wav;

pub use analysis::AnalysisService;
pub use audio_extractor::{AudioClip, AudioExtractor};
pub use composer::{AnalysisClient, ComposeError};
pub use config::{AppConfig, ConfigLoader, ExtractConfig, Overrides, ServerConfig};
pub use error::AnalysisError;
pub use extractor::{extract_media, ExtractedMedia};
pub use frame_sampler::{FrameSampler, MediaDecodeError};
pub use payload::{AnalysisPayload, Frame};
pub use provider::{ModelProvider, OpenAiProvider};
pub use report::{merge_partials, AnalysisResult, AudioPartial, VisionPartial};
