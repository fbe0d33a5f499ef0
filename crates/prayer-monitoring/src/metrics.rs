//! Flow cache metrics, recorded as tracing events.

use tracing::{debug, info, warn};

/// Flow cache specific metrics
pub struct FlowCacheMetrics;

impl FlowCacheMetrics {
    /// Record a lookup served from the cache
    pub fn record_cache_hit(operation: &str) {
        debug!(operation, outcome = "hit", "Flow cache lookup");
    }

    /// Record a lookup that found no live entry
    pub fn record_cache_miss(operation: &str) {
        debug!(operation, outcome = "miss", "Flow cache lookup");
    }

    /// Record a call that joined an identical in-flight call
    pub fn record_coalesced(operation: &str) {
        debug!(operation, outcome = "coalesced", "Flow cache lookup");
    }

    /// Record a call rejected by the local rate window
    pub fn record_rate_limited(operation: &str, max_requests: u32, retry_after_ms: u64) {
        warn!(
            operation,
            max_requests, retry_after_ms, "Flow rate limit exceeded"
        );
    }

    /// Record a finished producer invocation
    pub fn record_producer_call(operation: &str, duration_ms: f64, outcome: &str) {
        info!(operation, duration_ms, outcome, "Flow producer call");
    }

    /// Record a sweep pass
    pub fn record_sweep(removed: usize, remaining: usize) {
        if removed > 0 {
            info!(removed, remaining, "Flow cache sweep");
        } else {
            debug!(removed, remaining, "Flow cache sweep");
        }
    }
}
