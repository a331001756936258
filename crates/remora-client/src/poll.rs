//! Periodic torrent-list polling.
//!
//! One loop runs per epoch. The next request is only issued after the
//! previous one completed and the poll interval elapsed, so polls never
//! overlap. The current phase is observable through a `watch` channel.
//! The loop only holds a weak reference to its target and ends once the
//! target is gone.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{Notify, watch};
use tracing::debug;

use crate::session::Epoch;

/// Scheduler phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollPhase {
    /// No loop running.
    #[default]
    Idle,
    /// Sleeping until the next poll.
    Waiting,
    /// A `torrent-get` request is outstanding.
    InFlight,
}

/// Result of a single poll, as seen by the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PollStep {
    /// Snapshot reconciled.
    Applied,
    /// Poll failed but the session survives.
    Failed,
    /// Epoch stale, session gone or failure limit reached.
    Stop,
}

/// Work performed on every poll tick.
#[async_trait]
pub(crate) trait PollTarget: Send + Sync + 'static {
    /// Fetch and apply one snapshot for `epoch`.
    async fn poll_once(&self, epoch: Epoch, first: bool) -> PollStep;
}

struct ActiveRun {
    id: u64,
    cancel: Arc<Notify>,
}

/// Drives the poll loop for the current epoch.
pub struct PollScheduler {
    interval: Duration,
    phase: Arc<watch::Sender<PollPhase>>,
    run_counter: Arc<AtomicU64>,
    active: Mutex<Option<ActiveRun>>,
}

impl PollScheduler {
    /// Scheduler sleeping `interval` between polls.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        let (phase, _) = watch::channel(PollPhase::Idle);
        Self {
            interval,
            phase: Arc::new(phase),
            run_counter: Arc::new(AtomicU64::new(0)),
            active: Mutex::new(None),
        }
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> PollPhase {
        *self.phase.borrow()
    }

    /// Receiver notified on every phase change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<PollPhase> {
        self.phase.subscribe()
    }

    /// Start polling `target` for `epoch`, replacing any running loop.
    pub(crate) fn start<T: PollTarget>(&self, target: Weak<T>, epoch: Epoch) {
        let run = self.run_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = Arc::new(Notify::new());
        if let Some(previous) = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(ActiveRun {
                id: run,
                cancel: Arc::clone(&cancel),
            })
        {
            previous.cancel.notify_one();
        }

        let phase = Arc::clone(&self.phase);
        let counter = Arc::clone(&self.run_counter);
        let interval = self.interval;
        tokio::spawn(async move {
            let set_phase = |value: PollPhase| {
                if counter.load(Ordering::SeqCst) == run {
                    phase.send_replace(value);
                }
            };

            let mut first = true;
            loop {
                let Some(current) = target.upgrade() else {
                    debug!(epoch, "poll target dropped");
                    break;
                };
                set_phase(PollPhase::InFlight);
                let step = current.poll_once(epoch, first).await;
                drop(current);
                match step {
                    PollStep::Applied => first = false,
                    PollStep::Failed => {}
                    PollStep::Stop => break,
                }

                set_phase(PollPhase::Waiting);
                tokio::select! {
                    () = tokio::time::sleep(interval) => {}
                    () = cancel.notified() => break,
                }
            }
            debug!(epoch, "poll loop finished");
            set_phase(PollPhase::Idle);
        });
    }

    /// Stop the running loop. A request already in flight completes and is
    /// discarded by its target.
    pub(crate) fn stop(&self) {
        if let Some(active) = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            active.cancel.notify_one();
            // Retire the run so its late phase updates are ignored.
            if self
                .run_counter
                .compare_exchange(active.id, active.id + 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                self.phase.send_replace(PollPhase::Idle);
            }
        }
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remora_test_support::fixtures::eventually;
    use std::sync::atomic::AtomicUsize;

    struct CountingTarget {
        calls: AtomicUsize,
        firsts: AtomicUsize,
        stop_after: usize,
    }

    #[async_trait]
    impl PollTarget for CountingTarget {
        async fn poll_once(&self, _epoch: Epoch, first: bool) -> PollStep {
            if first {
                self.firsts.fetch_add(1, Ordering::SeqCst);
            }
            let calls = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if calls >= self.stop_after {
                PollStep::Stop
            } else if calls == 1 {
                PollStep::Failed
            } else {
                PollStep::Applied
            }
        }
    }

    #[tokio::test]
    async fn loop_runs_until_target_stops() {
        let scheduler = PollScheduler::new(Duration::from_millis(5));
        let target = Arc::new(CountingTarget {
            calls: AtomicUsize::new(0),
            firsts: AtomicUsize::new(0),
            stop_after: 4,
        });
        scheduler.start(Arc::downgrade(&target), 1);

        let (scheduler_ref, target_ref) = (&scheduler, &target);
        let finished = eventually(Duration::from_secs(2), || async move {
            target_ref.calls.load(Ordering::SeqCst) == 4
                && scheduler_ref.phase() == PollPhase::Idle
        })
        .await;
        assert!(finished);
        // The first poll failed, so the second one is still a first snapshot.
        assert_eq!(target.firsts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stop_interrupts_waiting_phase() {
        let scheduler = PollScheduler::new(Duration::from_secs(60));
        let target = Arc::new(CountingTarget {
            calls: AtomicUsize::new(0),
            firsts: AtomicUsize::new(0),
            stop_after: usize::MAX,
        });
        let phases = scheduler.subscribe();
        scheduler.start(Arc::downgrade(&target), 1);

        let scheduler_ref = &scheduler;
        let waiting = eventually(Duration::from_secs(2), || async move {
            scheduler_ref.phase() == PollPhase::Waiting
        })
        .await;
        assert!(waiting);

        scheduler.stop();
        assert_eq!(scheduler.phase(), PollPhase::Idle);
        assert!(phases.has_changed().unwrap_or(false));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(target.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn loop_ends_once_target_is_dropped() {
        let scheduler = PollScheduler::new(Duration::from_millis(5));
        let target = Arc::new(CountingTarget {
            calls: AtomicUsize::new(0),
            firsts: AtomicUsize::new(0),
            stop_after: usize::MAX,
        });
        scheduler.start(Arc::downgrade(&target), 1);

        let target_ref = &target;
        assert!(
            eventually(Duration::from_secs(2), || async move {
                target_ref.calls.load(Ordering::SeqCst) >= 2
            })
            .await
        );
        let weak = Arc::downgrade(&target);
        drop(target);

        let scheduler_ref = &scheduler;
        let idle = eventually(Duration::from_secs(2), || async move {
            scheduler_ref.phase() == PollPhase::Idle
        })
        .await;
        assert!(idle);
        assert!(weak.upgrade().is_none());
    }
}
