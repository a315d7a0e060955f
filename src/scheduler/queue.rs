//! Named work queues with per-queue worker pools and bounded retries.

use crate::campaign::domain::{AssignmentId, CampaignId};
use crate::config::QueueConfig;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

/// Queue a unit of work runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkKind {
    /// Identity sync for one campaign.
    SyncIdentities,
    /// Poll pass for one campaign.
    PollStatus,
    /// Follow-up generation for one assignment.
    GenerateFollowUp,
    /// Sweep over every active campaign.
    Sweep,
}

impl WorkKind {
    /// Every queue, in start-up order.
    pub const ALL: [Self; 4] = [
        Self::SyncIdentities,
        Self::PollStatus,
        Self::GenerateFollowUp,
        Self::Sweep,
    ];

    /// Returns the queue name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SyncIdentities => "sync_identities",
            Self::PollStatus => "poll_status",
            Self::GenerateFollowUp => "generate_follow_up",
            Self::Sweep => "sweep",
        }
    }
}

impl fmt::Display for WorkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkUnit {
    /// Bind provider jobs for a campaign.
    SyncIdentities(CampaignId),
    /// Run a one-shot poll pass for a campaign.
    PollStatus(CampaignId),
    /// Generate the follow-up for an assignment.
    GenerateFollowUp(AssignmentId),
    /// Sweep every active campaign.
    Sweep,
}

impl WorkUnit {
    /// Returns the queue the unit belongs on.
    #[must_use]
    pub const fn kind(self) -> WorkKind {
        match self {
            Self::SyncIdentities(_) => WorkKind::SyncIdentities,
            Self::PollStatus(_) => WorkKind::PollStatus,
            Self::GenerateFollowUp(_) => WorkKind::GenerateFollowUp,
            Self::Sweep => WorkKind::Sweep,
        }
    }
}

/// Failure reported by a work handler.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct WorkFailure {
    message: String,
    retryable: bool,
}

impl WorkFailure {
    /// A failure worth retrying.
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    /// A failure that must not be retried.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns whether the unit should be re-queued.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.retryable
    }
}

/// Executes work units pulled from the queues.
///
/// Returning `Ok` covers skipped and deferred outcomes too; only a
/// retryable [`WorkFailure`] re-queues the unit.
#[async_trait]
pub trait WorkHandler: Send + Sync + 'static {
    /// Runs one unit.
    async fn handle(&self, unit: WorkUnit) -> Result<(), WorkFailure>;
}

/// Errors returned when submitting work.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum QueueError {
    /// The queue's workers have shut down.
    #[error("work queue {0} is closed")]
    Closed(WorkKind),
}

/// Worker pool sizing and retry settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSettings {
    /// Workers per named queue.
    pub workers_per_queue: usize,
    /// Buffered units per queue.
    pub capacity: usize,
    /// Total attempts per unit including the first.
    pub max_attempts: u32,
    /// Delay before a failed unit is re-queued.
    pub retry_delay: Duration,
}

impl QueueSettings {
    /// Builds settings from configuration.
    #[must_use]
    pub const fn from_config(config: &QueueConfig) -> Self {
        Self {
            workers_per_queue: config.workers_per_queue,
            capacity: config.capacity,
            max_attempts: config.max_attempts,
            retry_delay: config.retry_delay(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Queued {
    unit: WorkUnit,
    attempt: u32,
}

/// Handle for submitting work to the named queues.
#[derive(Debug, Clone)]
pub struct WorkQueues {
    senders: Arc<HashMap<WorkKind, mpsc::Sender<Queued>>>,
    settings: QueueSettings,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl WorkQueues {
    /// Starts one worker pool per queue.
    ///
    /// Workers stop when `cancel` fires; [`Self::shutdown`] waits for them.
    pub fn start<H: WorkHandler>(
        handler: &Arc<H>,
        settings: QueueSettings,
        cancel: CancellationToken,
    ) -> Self {
        let tracker = TaskTracker::new();
        let mut senders = HashMap::new();
        let mut receivers = Vec::new();
        for kind in WorkKind::ALL {
            let (sender, receiver) = mpsc::channel(settings.capacity.max(1));
            senders.insert(kind, sender);
            receivers.push((kind, Arc::new(Mutex::new(receiver))));
        }
        let queues = Self {
            senders: Arc::new(senders),
            settings,
            tracker,
            cancel,
        };

        for (kind, receiver) in receivers {
            for worker in 0..settings.workers_per_queue.max(1) {
                let worker_queues = queues.clone();
                let worker_handler = Arc::clone(handler);
                let worker_receiver = Arc::clone(&receiver);
                queues.tracker.spawn(async move {
                    worker_queues
                        .work(kind, worker, &*worker_handler, &worker_receiver)
                        .await;
                });
            }
        }
        queues
    }

    /// Queues a unit, waiting for room when the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Closed`] after shutdown.
    pub async fn submit(&self, unit: WorkUnit) -> Result<(), QueueError> {
        self.enqueue(Queued { unit, attempt: 1 }).await
    }

    /// Queues a unit after `delay`, unless shutdown happens first.
    pub fn submit_after(&self, unit: WorkUnit, delay: Duration) {
        self.enqueue_after(Queued { unit, attempt: 1 }, delay);
    }

    /// Returns the cancellation token shared with the workers.
    #[must_use]
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancels the workers and waits for them and any delayed submissions
    /// to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }

    async fn enqueue(&self, queued: Queued) -> Result<(), QueueError> {
        let kind = queued.unit.kind();
        let sender = self.senders.get(&kind).ok_or(QueueError::Closed(kind))?;
        sender
            .send(queued)
            .await
            .map_err(|_| QueueError::Closed(kind))
    }

    fn enqueue_after(&self, queued: Queued, delay: Duration) {
        let queues = self.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                () = queues.cancel.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    if let Err(err) = queues.enqueue(queued).await {
                        debug!(error = %err, "dropping delayed unit");
                    }
                }
            }
        });
    }

    async fn work<H: WorkHandler>(
        &self,
        kind: WorkKind,
        worker: usize,
        handler: &H,
        receiver: &Mutex<mpsc::Receiver<Queued>>,
    ) {
        debug!(queue = %kind, worker, "worker started");
        loop {
            let next = tokio::select! {
                () = self.cancel.cancelled() => None,
                queued = async { receiver.lock().await.recv().await } => queued,
            };
            let Some(queued) = next else {
                break;
            };

            match handler.handle(queued.unit).await {
                Ok(()) => {}
                Err(failure) if failure.is_retryable() && queued.attempt < self.settings.max_attempts => {
                    warn!(
                        queue = %kind,
                        unit = ?queued.unit,
                        attempt = queued.attempt,
                        error = %failure,
                        "work unit failed; retrying"
                    );
                    self.enqueue_after(
                        Queued {
                            unit: queued.unit,
                            attempt: queued.attempt + 1,
                        },
                        self.settings.retry_delay,
                    );
                }
                Err(failure) => {
                    error!(
                        queue = %kind,
                        unit = ?queued.unit,
                        attempt = queued.attempt,
                        error = %failure,
                        "work unit abandoned"
                    );
                }
            }
        }
        debug!(queue = %kind, worker, "worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingHandler {
        calls: AtomicU32,
        failure: Option<WorkFailure>,
    }

    #[async_trait]
    impl WorkHandler for CountingHandler {
        async fn handle(&self, _unit: WorkUnit) -> Result<(), WorkFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.failure.clone().map_or(Ok(()), Err)
        }
    }

    fn settings() -> QueueSettings {
        QueueSettings {
            workers_per_queue: 2,
            capacity: 16,
            max_attempts: 3,
            retry_delay: Duration::ZERO,
        }
    }

    async fn run_until_idle(handler: &Arc<CountingHandler>, unit: WorkUnit) -> u32 {
        let queues = WorkQueues::start(handler, settings(), CancellationToken::new());
        queues.submit(unit).await.expect("queue accepts unit");
        tokio::time::sleep(Duration::from_millis(200)).await;
        queues.shutdown().await;
        handler.calls.load(Ordering::SeqCst)
    }

    #[rstest]
    #[case(None, 1)]
    #[case(Some(WorkFailure::retryable("store unavailable")), 3)]
    #[case(Some(WorkFailure::permanent("campaign missing")), 1)]
    #[tokio::test(flavor = "multi_thread")]
    async fn failed_units_are_retried_within_budget(
        #[case] failure: Option<WorkFailure>,
        #[case] expected_calls: u32,
    ) {
        let handler = Arc::new(CountingHandler {
            calls: AtomicU32::new(0),
            failure,
        });

        let calls = run_until_idle(&handler, WorkUnit::PollStatus(CampaignId::new())).await;

        assert_eq!(calls, expected_calls);
    }

    #[rstest]
    #[tokio::test(flavor = "multi_thread")]
    async fn delayed_units_are_dropped_on_shutdown() {
        let handler = Arc::new(CountingHandler {
            calls: AtomicU32::new(0),
            failure: None,
        });
        let queues = WorkQueues::start(&handler, settings(), CancellationToken::new());

        queues.submit_after(WorkUnit::Sweep, Duration::from_secs(3600));
        queues.shutdown().await;

        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    #[rstest]
    fn units_route_to_their_queue() {
        assert_eq!(WorkUnit::Sweep.kind().as_str(), "sweep");
        assert_eq!(
            WorkUnit::GenerateFollowUp(AssignmentId::new()).kind(),
            WorkKind::GenerateFollowUp
        );
    }
}
