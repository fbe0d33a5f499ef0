//! Fixed-window admission control per operation name.
//!
//! Each operation gets its own window. A window opens on the first admitted
//! call, counts admitted calls until `reset_at`, and is replaced by the next
//! call after that. Up to twice the limit can pass around a window boundary.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use prayer_monitoring::FlowCacheMetrics;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

use crate::error::{FlowError, FlowResult};

/// Rate limiter configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimiterConfig {
    /// Maximum number of admitted calls per operation in one window
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    /// Window length in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
}

fn default_max_requests() -> u32 {
    10
}

fn default_window_ms() -> u64 {
    60_000 // 1 minute
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_ms: default_window_ms(),
        }
    }
}

impl RateLimiterConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Admission window of one operation
#[derive(Debug, Clone, Copy)]
struct RateWindow {
    /// Calls admitted since the window opened
    count: u32,
    /// When the count starts over
    reset_at: Instant,
}

/// Observable state of an operation's window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    /// No call was ever admitted for the operation
    NoWindow,
    /// The window is running
    Open { count: u32, reset_at: Instant },
    /// The window ran out; the next admitted call opens a new one
    Expired { reset_at: Instant },
}

/// Rate window statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateWindowStats {
    /// Operation the window belongs to
    pub operation: String,
    /// Calls admitted in the current window
    pub current_count: u32,
    /// Maximum calls per window
    pub max_requests: u32,
    /// Window length
    pub window: Duration,
    /// Time until the window resets
    pub reset_in: Duration,
}

/// Per-operation fixed-window rate limiter
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    windows: Mutex<HashMap<String, RateWindow>>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    fn windows(&self) -> MutexGuard<'_, HashMap<String, RateWindow>> {
        // every mutation is a single assignment, a poisoned map is still consistent
        self.windows.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fails if the operation's window is saturated, without charging it
    pub fn check(&self, operation: &str) -> FlowResult<()> {
        let now = Instant::now();
        let windows = self.windows();

        match windows.get(operation) {
            Some(window) if now < window.reset_at && window.count >= self.config.max_requests => {
                Err(self.rejection(operation, window, now))
            }
            _ => Ok(()),
        }
    }

    /// Admits one call, charging it to the operation's window
    ///
    /// Returns the window count including this call. Check and increment
    /// happen under one lock.
    pub fn admit(&self, operation: &str) -> FlowResult<u32> {
        let now = Instant::now();
        let window_duration = self.config.window();
        let mut windows = self.windows();

        match windows.get_mut(operation) {
            Some(window) if now < window.reset_at => {
                if window.count >= self.config.max_requests {
                    return Err(self.rejection(operation, window, now));
                }
                window.count += 1;
                debug!(
                    "Rate window {} count: {}/{}",
                    operation, window.count, self.config.max_requests
                );
                Ok(window.count)
            }
            Some(window) => {
                *window = RateWindow {
                    count: 1,
                    reset_at: now + window_duration,
                };
                debug!("Rate window {} reset", operation);
                Ok(1)
            }
            None => {
                windows.insert(
                    operation.to_string(),
                    RateWindow {
                        count: 1,
                        reset_at: now + window_duration,
                    },
                );
                debug!("Rate window {} opened", operation);
                Ok(1)
            }
        }
    }

    /// The operation's window as of now
    pub fn state(&self, operation: &str) -> WindowState {
        let now = Instant::now();
        match self.windows().get(operation) {
            None => WindowState::NoWindow,
            Some(window) if now < window.reset_at => WindowState::Open {
                count: window.count,
                reset_at: window.reset_at,
            },
            Some(window) => WindowState::Expired {
                reset_at: window.reset_at,
            },
        }
    }

    /// Statistics for the operation's window, `None` if it never opened
    ///
    /// An expired window reports a zero count without being replaced.
    pub fn stats(&self, operation: &str) -> Option<RateWindowStats> {
        let (current_count, reset_in) = match self.state(operation) {
            WindowState::NoWindow => return None,
            WindowState::Open { count, reset_at } => {
                (count, reset_at.saturating_duration_since(Instant::now()))
            }
            WindowState::Expired { .. } => (0, Duration::ZERO),
        };

        Some(RateWindowStats {
            operation: operation.to_string(),
            current_count,
            max_requests: self.config.max_requests,
            window: self.config.window(),
            reset_in,
        })
    }

    /// Forget every window
    pub fn reset(&self) {
        self.windows().clear();
    }

    fn rejection(&self, operation: &str, window: &RateWindow, now: Instant) -> FlowError {
        let retry_after = window.reset_at.saturating_duration_since(now);
        FlowCacheMetrics::record_rate_limited(
            operation,
            self.config.max_requests,
            retry_after.as_millis() as u64,
        );
        FlowError::RateLimitExceeded {
            operation: operation.to_string(),
            max_requests: self.config.max_requests,
            window: self.config.window(),
            retry_after,
        }
    }
}
