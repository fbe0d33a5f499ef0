//! The seam to the hosted generative model.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Inline binary input sent along with a prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaPart {
    pub mime_type: String,
    pub data_base64: String,
}

impl MediaPart {
    /// Encodes raw bytes for transport
    pub fn inline(mime_type: impl Into<String>, data: &[u8]) -> Self {
        Self {
            mime_type: mime_type.into(),
            data_base64: base64::encode(data),
        }
    }
}

/// One generation call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(default)]
    pub media: Vec<MediaPart>,
}

impl GenerationRequest {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            media: Vec::new(),
        }
    }

    pub fn with_media(mut self, part: MediaPart) -> Self {
        self.media.push(part);
        self
    }
}

/// A text generation backend
///
/// Implementations report upstream failures as plain errors; throttling and
/// quota exhaustion are recognized from the error text by the flow cache.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Generate a text completion for the request
    async fn generate(&self, request: GenerationRequest) -> anyhow::Result<String>;
}
