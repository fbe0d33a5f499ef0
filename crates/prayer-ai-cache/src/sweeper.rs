//! Periodic eviction of expired entries.

use std::sync::Weak;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

/// Owns the background sweep task; dropping it stops the task
#[derive(Debug)]
pub struct SweeperHandle {
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Whether the task has ended, either because its target was dropped or it was aborted
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Runs `sweep` against `target` every `period`, first after one full period
///
/// Only a weak reference is held, so the task ends on the first tick after
/// the target is gone. Must be called from within a tokio runtime.
pub fn spawn_sweeper<T, F>(target: Weak<T>, period: Duration, sweep: F) -> SweeperHandle
where
    T: Send + Sync + 'static,
    F: Fn(&T) + Send + 'static,
{
    let task = tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let Some(target) = target.upgrade() else {
                debug!("Sweep target dropped, stopping sweeper");
                break;
            };
            sweep(&target);
        }
    });

    SweeperHandle { task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_sweeps_on_interval_and_stops_with_target() {
        let counter = Arc::new(AtomicUsize::new(0));
        let handle = spawn_sweeper(Arc::downgrade(&counter), Duration::from_secs(300), |c| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_secs(299)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);

        drop(counter);
        tokio::time::sleep(Duration::from_secs(301)).await;
        assert!(handle.is_finished());
    }
}
