//!
//! Prayer Flows - generative AI features of the prayer journal
//!
//! Each flow builds a prompt, asks a [`GenerativeModel`] for a JSON answer and
//! routes the call through a shared [`FlowCache`](prayer_ai_cache::FlowCache),
//! so repeated questions are answered from memory and the model's request
//! budget is enforced per flow.

/// Error module
pub mod error;

/// Model interface module
pub mod model;

/// Result types
pub mod types;

/// Model answer parsing
pub mod parse;

/// Flows module
pub mod flows;

/// Offline models
pub mod fakes;

// Re-export key types
pub use error::{FlowsError, FlowsResult};
pub use flows::{operations, PrayerFlows};
pub use model::{GenerationRequest, GenerativeModel, MediaPart};
pub use types::{CategorySuggestion, DailyVerse, PrayerPoint, Transcription};
