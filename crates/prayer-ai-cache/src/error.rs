//! Error types for the flow cache

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by [`FlowCache::execute_flow`](crate::FlowCache::execute_flow)
///
/// The type is `Clone` so that every caller coalesced onto one producer
/// invocation observes the same outcome.
#[derive(Error, Debug, Clone)]
pub enum FlowError {
    /// The local admission window for the operation is saturated
    #[error("Rate limit exceeded for {operation}: at most {max_requests} requests per {window:?}, retry in {retry_after:?}")]
    RateLimitExceeded {
        operation: String,
        max_requests: u32,
        window: Duration,
        retry_after: Duration,
    },

    /// The upstream service answered with a 429 style rejection
    #[error("Rate limit exceeded upstream. Please wait a moment before trying again ({message})")]
    UpstreamRateLimited { message: String },

    /// The upstream service reported an exhausted quota
    #[error("API quota exceeded. Please try again later ({message})")]
    QuotaExhausted { message: String },

    /// Any other producer failure, with the original error intact
    #[error(transparent)]
    Producer(#[from] ProducerError),

    /// The operation name was empty
    #[error("Operation name must not be empty")]
    InvalidOperation,

    /// The parameters could not be turned into a JSON value
    #[error("Invalid flow parameters: {0}")]
    InvalidParams(String),

    /// A producer result could not be converted to or from its cached form
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A configuration value is out of range
    #[error("Configuration error: {0}")]
    InvalidConfig(String),
}

/// Coarse classification of a [`FlowError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowErrorKind {
    RateLimitExceeded,
    UpstreamRateLimited,
    QuotaExhausted,
    Producer,
    Usage,
}

impl FlowError {
    /// The classification of this error
    pub fn kind(&self) -> FlowErrorKind {
        match self {
            FlowError::RateLimitExceeded { .. } => FlowErrorKind::RateLimitExceeded,
            FlowError::UpstreamRateLimited { .. } => FlowErrorKind::UpstreamRateLimited,
            FlowError::QuotaExhausted { .. } => FlowErrorKind::QuotaExhausted,
            FlowError::Producer(_) => FlowErrorKind::Producer,
            FlowError::InvalidOperation
            | FlowError::InvalidParams(_)
            | FlowError::Serialization(_)
            | FlowError::InvalidConfig(_) => FlowErrorKind::Usage,
        }
    }

    /// Whether a rate limit was hit, locally or upstream
    pub fn is_rate_limited(&self) -> bool {
        matches!(
            self.kind(),
            FlowErrorKind::RateLimitExceeded | FlowErrorKind::UpstreamRateLimited
        )
    }

    /// Whether retrying later can reasonably succeed
    ///
    /// Quota exhaustion resets on a much longer period and is not considered
    /// retryable here.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            FlowErrorKind::RateLimitExceeded
                | FlowErrorKind::UpstreamRateLimited
                | FlowErrorKind::Producer
        )
    }

    /// How long the caller should wait, when the local limiter knows it
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            FlowError::RateLimitExceeded { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }
}

/// A producer failure that did not match any upstream limit pattern
#[derive(Clone)]
pub struct ProducerError(Arc<anyhow::Error>);

impl ProducerError {
    pub fn new(error: anyhow::Error) -> Self {
        Self(Arc::new(error))
    }

    /// The error as returned by the producer
    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }

    /// Attempt to downcast the original error to a concrete type
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.0.downcast_ref::<E>()
    }
}

impl fmt::Display for ProducerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl fmt::Debug for ProducerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl std::error::Error for ProducerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

/// Result alias used across the crate
pub type FlowResult<T> = Result<T, FlowError>;
