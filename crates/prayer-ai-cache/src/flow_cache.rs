//! The flow cache: memoization and admission control in front of a
//! rate-limited generation service.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use once_cell::sync::OnceCell;
use prayer_monitoring::FlowCacheMetrics;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::classify::classify_producer_error;
use crate::config::FlowCacheConfig;
use crate::error::{FlowError, FlowResult};
use crate::fingerprint::Fingerprint;
use crate::in_flight::{InFlight, Slot};
use crate::rate_limit::{RateLimiter, RateWindowStats, WindowState};
use crate::store::ResultStore;
use crate::sweeper::{spawn_sweeper, SweeperHandle};

/// Per-call options for [`FlowCache::execute_flow`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowOptions {
    /// Overrides the configured default TTL for the stored result
    pub ttl: Option<Duration>,
    /// Neither read nor write the cache for this call
    pub skip_cache: bool,
    /// Neither check nor charge the rate window for this call
    pub skip_rate_limit: bool,
}

impl FlowOptions {
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn skip_cache(mut self) -> Self {
        self.skip_cache = true;
        self
    }

    pub fn skip_rate_limit(mut self) -> Self {
        self.skip_rate_limit = true;
        self
    }
}

/// Snapshot of cache counters since construction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlowCacheStats {
    /// Stored entries, including expired ones not yet evicted
    pub entries: usize,
    /// Producer invocations currently shared with followers
    pub in_flight: usize,
    pub hits: u64,
    pub misses: u64,
    /// Calls served by joining an identical in-flight call
    pub coalesced: u64,
    /// Calls rejected by the local rate window
    pub rejected: u64,
    pub producer_failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
    rejected: AtomicU64,
    producer_failures: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug)]
struct Inner {
    config: FlowCacheConfig,
    store: ResultStore,
    limiter: RateLimiter,
    in_flight: InFlight,
    counters: Counters,
    sweeper: OnceCell<SweeperHandle>,
}

impl Inner {
    fn new(config: FlowCacheConfig) -> Self {
        let limiter = RateLimiter::new(config.rate_limit.clone());
        Self {
            config,
            store: ResultStore::new(),
            limiter,
            in_flight: InFlight::default(),
            counters: Counters::default(),
            sweeper: OnceCell::new(),
        }
    }

    fn sweep_expired(&self) -> usize {
        let removed = self.store.sweep();
        FlowCacheMetrics::record_sweep(removed, self.store.len());
        removed
    }
}

/// Result cache and rate limiter for AI flows
///
/// Construct one per process and hand clones to the call sites; clones share
/// all state. Tests construct their own instance for isolation.
#[derive(Debug, Clone)]
pub struct FlowCache {
    inner: Arc<Inner>,
}

impl Default for FlowCache {
    fn default() -> Self {
        Self {
            inner: Arc::new(Inner::new(FlowCacheConfig::default())),
        }
    }
}

impl FlowCache {
    /// Create a validated cache without a background sweep
    ///
    /// Expired entries are still never returned; they are evicted when read.
    pub fn new(config: FlowCacheConfig) -> FlowResult<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Inner::new(config)),
        })
    }

    /// Create a validated cache whose background sweep lives as long as the cache
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: FlowCacheConfig) -> FlowResult<Self> {
        let cache = Self::new(config)?;
        cache.inner.sweeper.get_or_init(|| cache.spawn_sweeper());
        info!(
            sweep_interval = ?cache.inner.config.sweep_interval(),
            "Flow cache started"
        );
        Ok(cache)
    }

    /// Start a sweep task on the configured interval, owned by the caller
    pub fn spawn_sweeper(&self) -> SweeperHandle {
        spawn_sweeper(
            Arc::downgrade(&self.inner),
            self.inner.config.sweep_interval(),
            |inner: &Inner| {
                inner.sweep_expired();
            },
        )
    }

    pub fn config(&self) -> &FlowCacheConfig {
        &self.inner.config
    }

    /// Run `producer` through the cache and the rate limiter
    ///
    /// `params` only feed the fingerprint; the producer must capture its own
    /// arguments. A cache hit never invokes the producer and never charges
    /// the rate window. Producer errors are classified, never cached, and
    /// leave any existing entry untouched.
    ///
    /// A call that finds an identical call in flight waits for it and gets its
    /// outcome, including a rate limit rejection, and the result is stored
    /// with the TTL of the call that produced it. Calls with `skip_cache` or
    /// `skip_rate_limit` never wait on another call.
    pub async fn execute_flow<T, P, F, Fut, E>(
        &self,
        operation: &str,
        producer: F,
        params: &P,
        options: FlowOptions,
    ) -> FlowResult<T>
    where
        T: Serialize + DeserializeOwned,
        P: Serialize + ?Sized,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<anyhow::Error>,
    {
        let key = Fingerprint::new(operation, params)?;
        let inner = &*self.inner;

        if !options.skip_rate_limit {
            inner.limiter.check(operation).map_err(|e| self.rejected(e))?;
        }

        if options.skip_cache {
            debug!("Flow {} bypassing cache", key);
            self.admit(operation, &options)?;
            return self.invoke(operation, producer).await;
        }

        let leader = loop {
            if let Some(value) = self.lookup(&key) {
                return Ok(value);
            }

            if !inner.config.coalesce_in_flight || options.skip_rate_limit {
                break None;
            }

            match inner.in_flight.join(&key) {
                Slot::Leader(guard) => {
                    // a previous leader may have stored its result between our lookup and join
                    if let Some(value) = self.lookup(&key) {
                        return Ok(value);
                    }
                    break Some(guard);
                }
                Slot::Follower(follower) => {
                    Counters::bump(&inner.counters.coalesced);
                    FlowCacheMetrics::record_coalesced(operation);
                    if let Some(outcome) = follower.outcome().await {
                        return outcome.and_then(decode);
                    }
                    debug!("Leader for {} went away, retrying", key);
                }
            }
        };

        Counters::bump(&inner.counters.misses);
        FlowCacheMetrics::record_cache_miss(operation);

        if let Err(e) = self.admit(operation, &options) {
            if let Some(guard) = leader {
                guard.complete(&Err(e.clone()));
            }
            return Err(e);
        }

        let outcome = self
            .invoke(operation, producer)
            .await
            .and_then(|value| encode(&value).map(|encoded| (value, encoded)));

        match outcome {
            Ok((value, encoded)) => {
                let ttl = options.ttl.unwrap_or_else(|| inner.config.default_ttl());
                inner.store.insert(key.clone(), encoded.clone(), ttl);
                debug!("Stored {} for {:?}", key, ttl);
                if let Some(guard) = leader {
                    guard.complete(&Ok(encoded));
                }
                Ok(value)
            }
            Err(e) => {
                if let Some(guard) = leader {
                    guard.complete(&Err(e.clone()));
                }
                Err(e)
            }
        }
    }

    fn lookup<T: DeserializeOwned>(&self, key: &Fingerprint) -> Option<T> {
        let value = self.inner.store.get(key)?;
        match serde_json::from_value(value) {
            Ok(value) => {
                Counters::bump(&self.inner.counters.hits);
                FlowCacheMetrics::record_cache_hit(key.operation());
                Some(value)
            }
            Err(e) => {
                warn!(
                    "Cached value for {} does not match the requested type, recomputing: {}",
                    key, e
                );
                None
            }
        }
    }

    fn admit(&self, operation: &str, options: &FlowOptions) -> FlowResult<()> {
        if options.skip_rate_limit {
            return Ok(());
        }
        self.inner
            .limiter
            .admit(operation)
            .map(|_| ())
            .map_err(|e| self.rejected(e))
    }

    fn rejected(&self, error: FlowError) -> FlowError {
        Counters::bump(&self.inner.counters.rejected);
        error
    }

    async fn invoke<T, F, Fut, E>(&self, operation: &str, producer: F) -> FlowResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<anyhow::Error>,
    {
        let started = Instant::now();
        let result = producer().await;
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

        match result {
            Ok(value) => {
                FlowCacheMetrics::record_producer_call(operation, duration_ms, "ok");
                Ok(value)
            }
            Err(e) => {
                Counters::bump(&self.inner.counters.producer_failures);
                let error = classify_producer_error(e.into());
                FlowCacheMetrics::record_producer_call(operation, duration_ms, outcome_label(&error));
                Err(error)
            }
        }
    }

    /// Whether a live entry exists for `(operation, params)`
    pub fn contains<P: Serialize + ?Sized>(&self, operation: &str, params: &P) -> FlowResult<bool> {
        let key = Fingerprint::new(operation, params)?;
        Ok(self.inner.store.contains(&key))
    }

    /// Drop the entry for `(operation, params)`, returning whether one existed
    pub fn invalidate<P: Serialize + ?Sized>(&self, operation: &str, params: &P) -> FlowResult<bool> {
        let key = Fingerprint::new(operation, params)?;
        Ok(self.inner.store.remove(&key))
    }

    /// Drop every entry of `operation`
    pub fn invalidate_operation(&self, operation: &str) -> usize {
        self.inner.store.remove_operation(operation)
    }

    /// Drop every entry; rate windows are kept
    pub fn clear(&self) {
        self.inner.store.clear();
    }

    /// Forget all rate windows
    pub fn reset_rate_limits(&self) {
        self.inner.limiter.reset();
    }

    /// One sweep pass over expired entries, returning how many were removed
    pub fn sweep_expired(&self) -> usize {
        self.inner.sweep_expired()
    }

    pub fn rate_window(&self, operation: &str) -> Option<RateWindowStats> {
        self.inner.limiter.stats(operation)
    }

    pub fn window_state(&self, operation: &str) -> WindowState {
        self.inner.limiter.state(operation)
    }

    pub fn stats(&self) -> FlowCacheStats {
        let counters = &self.inner.counters;
        FlowCacheStats {
            entries: self.inner.store.len(),
            in_flight: self.inner.in_flight.len(),
            hits: counters.hits.load(Ordering::Relaxed),
            misses: counters.misses.load(Ordering::Relaxed),
            coalesced: counters.coalesced.load(Ordering::Relaxed),
            rejected: counters.rejected.load(Ordering::Relaxed),
            producer_failures: counters.producer_failures.load(Ordering::Relaxed),
        }
    }

    /// A weak handle, for tasks that must not keep the cache alive
    pub fn downgrade(&self) -> WeakFlowCache {
        WeakFlowCache {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

/// Non-owning reference to a [`FlowCache`]
#[derive(Debug, Clone)]
pub struct WeakFlowCache {
    inner: Weak<Inner>,
}

impl WeakFlowCache {
    pub fn upgrade(&self) -> Option<FlowCache> {
        self.inner.upgrade().map(|inner| FlowCache { inner })
    }
}

fn encode<T: Serialize>(value: &T) -> FlowResult<Value> {
    serde_json::to_value(value).map_err(|e| FlowError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(value: Value) -> FlowResult<T> {
    serde_json::from_value(value).map_err(|e| FlowError::Serialization(e.to_string()))
}

fn outcome_label(error: &FlowError) -> &'static str {
    match error {
        FlowError::UpstreamRateLimited { .. } => "upstream_rate_limited",
        FlowError::QuotaExhausted { .. } => "quota_exhausted",
        _ => "error",
    }
}
