//!
//! Prayer AI Cache - result cache and rate limiter for generative AI flows
//!
//! Every AI-backed operation goes through [`FlowCache::execute_flow`], which
//! serves repeated `(operation, params)` calls from memory and enforces a
//! fixed-window request budget per operation before the external service is
//! reached.

/// Error module
pub mod error;

/// Cache key module
pub mod fingerprint;

/// Producer error classification
pub mod classify;

/// Configuration module
pub mod config;

/// Rate limiting module
pub mod rate_limit;

/// Result store module
pub mod store;

/// Background sweep module
pub mod sweeper;

mod in_flight;

/// Flow cache module
pub mod flow_cache;

// Re-export key types
pub use classify::classify_producer_error;
pub use config::FlowCacheConfig;
pub use error::{FlowError, FlowErrorKind, FlowResult, ProducerError};
pub use fingerprint::{canonical_json, Fingerprint};
pub use flow_cache::{FlowCache, FlowCacheStats, FlowOptions, WeakFlowCache};
pub use rate_limit::{RateLimiter, RateLimiterConfig, RateWindowStats, WindowState};
pub use sweeper::SweeperHandle;
