//! Stage executors.
//!
//! Each stage is an I/O boundary behind a capability trait:
//! - **Topic**: [`TopicSource`] (built-in list or external endpoint)
//! - **Text**: [`TextGenerator`] (chat completion or placeholder)
//! - **Audio**: [`VoiceSynthesizer`] (text-to-speech or placeholder)
//! - **Video**: [`VideoGenerator`] (avatar render or placeholder)
//! - **Distribution**: one [`Publisher`] per platform
//!
//! [`StageExecutor`] bundles them with the run directory layout and can
//! replay a dead-lettered operation from its serialized input.

mod dirs;
mod distribution;
mod error;
mod executor;
mod text;
mod topic;
mod traits;
mod types;
mod video;
mod voice;

pub use dirs::RunDirs;
pub use distribution::{PlaceholderPublisher, WebhookPublisher};
pub use error::StageError;
pub use executor::{build_stage_executor, DeliveredReceipts, StageExecutor};
pub use text::{OpenAiTextGenerator, PlaceholderTextGenerator};
pub use topic::{ExternalTopicSource, InternalTopicSource};
pub use traits::{Publisher, TextGenerator, TopicSource, VideoGenerator, VoiceSynthesizer};
pub use types::{
    validate_text_payload, AudioArtifact, AudioInput, Derivative, DistributionInput, Receipt,
    ReceiptStatus, Stage, StageOutput, TextInput, TextPayload, Topic, VideoArtifact, VideoInput,
};
pub use video::{AvatarVideoGenerator, PlaceholderVideo};
pub use voice::{ElevenLabsVoice, PlaceholderVoice};
