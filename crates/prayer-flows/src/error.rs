//! Error types for the flows

use prayer_ai_cache::FlowError;
use thiserror::Error;

/// Errors returned by [`PrayerFlows`](crate::PrayerFlows)
#[derive(Error, Debug, Clone)]
pub enum FlowsError {
    /// The model answered with something that is not the expected JSON
    #[error("Malformed model output for {operation}: {message}")]
    MalformedOutput { operation: String, message: String },

    /// Nothing to send to the model
    #[error("Empty input: {0}")]
    EmptyInput(String),

    #[error(transparent)]
    Cache(#[from] FlowError),
}

impl FlowsError {
    /// Unwraps flow errors that originated in this crate's producers
    pub(crate) fn lift(error: FlowError) -> Self {
        if let FlowError::Producer(producer) = &error {
            if let Some(own) = producer.downcast_ref::<FlowsError>() {
                return own.clone();
            }
        }
        FlowsError::Cache(error)
    }

    /// Text suitable for showing to the person using the journal
    pub fn user_message(&self) -> String {
        match self {
            FlowsError::Cache(FlowError::RateLimitExceeded { retry_after, .. }) => format!(
                "You're going a little fast. Please wait {} seconds and try again.",
                retry_after.as_secs().max(1)
            ),
            FlowsError::Cache(FlowError::UpstreamRateLimited { .. }) => {
                "The AI service is busy right now. Please wait a minute and try again.".to_string()
            }
            FlowsError::Cache(FlowError::QuotaExhausted { .. }) => {
                "Today's AI quota has been used up. Please try again tomorrow.".to_string()
            }
            FlowsError::EmptyInput(what) => format!("Please provide {what} first."),
            _ => "Something went wrong while talking to the AI service. Please try again."
                .to_string(),
        }
    }
}

pub type FlowsResult<T> = Result<T, FlowsError>;
