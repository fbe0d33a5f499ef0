//! Coalescing of concurrent identical flow calls.
//!
//! The first caller for a fingerprint becomes the leader and runs the
//! producer; later callers subscribe to the leader's outcome. The entry is
//! removed before the outcome is published, and also when the leader is
//! dropped early, in which case followers observe a closed channel and start
//! over.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use serde_json::Value;
use tokio::sync::watch;
use tracing::debug;

use crate::error::FlowError;
use crate::fingerprint::Fingerprint;

/// What a finished leader hands to its followers
pub(crate) type Outcome = Result<Value, FlowError>;

type Receiver = watch::Receiver<Option<Outcome>>;

#[derive(Debug, Default)]
pub(crate) struct InFlight {
    calls: Mutex<HashMap<Fingerprint, Receiver>>,
}

/// Role of a caller for one fingerprint
pub(crate) enum Slot<'a> {
    Leader(LeaderGuard<'a>),
    Follower(Follower),
}

impl InFlight {
    fn calls(&self) -> MutexGuard<'_, HashMap<Fingerprint, Receiver>> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers as leader for `key`, or subscribes to the running leader
    pub(crate) fn join(&self, key: &Fingerprint) -> Slot<'_> {
        let mut calls = self.calls();

        if let Some(receiver) = calls.get(key) {
            return Slot::Follower(Follower {
                receiver: receiver.clone(),
            });
        }

        let (sender, receiver) = watch::channel(None);
        calls.insert(key.clone(), receiver);
        Slot::Leader(LeaderGuard {
            in_flight: self,
            key: key.clone(),
            sender,
            finished: false,
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.calls().len()
    }
}

/// Held by the caller that runs the producer
pub(crate) struct LeaderGuard<'a> {
    in_flight: &'a InFlight,
    key: Fingerprint,
    sender: watch::Sender<Option<Outcome>>,
    finished: bool,
}

impl LeaderGuard<'_> {
    /// Unregisters the call, then publishes its outcome to every follower
    pub(crate) fn complete(mut self, outcome: &Outcome) {
        self.in_flight.calls().remove(&self.key);
        self.finished = true;
        self.sender.send_replace(Some(outcome.clone()));
    }
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.in_flight.calls().remove(&self.key);
            debug!("In-flight call {} abandoned before completion", self.key);
        }
    }
}

/// Held by callers waiting on a leader
pub(crate) struct Follower {
    receiver: Receiver,
}

impl Follower {
    /// The leader's outcome, or `None` if the leader went away without one
    pub(crate) async fn outcome(mut self) -> Option<Outcome> {
        let outcome = match self.receiver.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };
        outcome
    }
}
