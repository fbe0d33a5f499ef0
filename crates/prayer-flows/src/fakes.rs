//! Offline models for tests and the demo.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;

use crate::model::{GenerationRequest, GenerativeModel};

/// Answers every request with the same text
#[derive(Debug)]
pub struct StaticModel {
    response: String,
    latency: Duration,
    calls: AtomicUsize,
}

impl StaticModel {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// Delays every answer, so that concurrent callers overlap
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Number of requests received
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerativeModel for StaticModel {
    async fn generate(&self, _request: GenerationRequest) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok(self.response.clone())
    }
}

/// Replays queued answers in order and records every request
///
/// Failures are queued as messages and returned as errors carrying that text.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    script: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, response: impl Into<String>) -> Self {
        self.script.lock().unwrap_or_else(|e| e.into_inner()).push_back(Ok(response.into()));
        self
    }

    pub fn fail(self, message: impl Into<String>) -> Self {
        self.script.lock().unwrap_or_else(|e| e.into_inner()).push_back(Err(message.into()));
        self
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl GenerativeModel for ScriptedModel {
    async fn generate(&self, request: GenerationRequest) -> anyhow::Result<String> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).push(request);
        let next = self.script.lock().unwrap_or_else(|e| e.into_inner()).pop_front();
        match next {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("ScriptedModel has no more responses")),
        }
    }
}
