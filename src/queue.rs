//! The in-memory fake job queue.
//!
//! [`FakeJobQueue`] plays both sides of an asynchronous work queue: producers
//! enqueue jobs, and tests drive consumption explicitly with
//! [`FakeJobQueue::handle_jobs`] instead of running workers. Time comes from
//! a [`Clock`], so delivery delays and backoff are checked against whatever
//! instant the test has advanced to.
//!
//! # Examples
//!
//! ```rust
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use fakequeue::{FakeJobQueue, HandleOptions, Job, JobRequest, MockClock, Outcome};
//! use fakequeue::handler::handler_fn;
//! use chrono::Duration;
//!
//! let clock = MockClock::new();
//! let queue = FakeJobQueue::with_clock(clock.clone());
//! queue
//!     .register_handler("green", handler_fn(|_job: Job| async { Ok(Outcome::Ack) }))
//!     .await;
//!
//! queue
//!     .enqueue("green", JobRequest::new("later").with_delivery_delay(Duration::seconds(10)))
//!     .await?;
//!
//! let options = HandleOptions::for_queue("green").considering_delays();
//! assert!(queue.handle_jobs(options.clone()).await?.is_empty());
//!
//! clock.advance(Duration::seconds(10));
//! let handled = queue.handle_jobs(options).await?;
//! assert_eq!(handled.len(), 1);
//! assert!(handled[0].acknowledged);
//! # Ok(())
//! # }
//! ```

use crate::{
    FakeQueueError, Result,
    clock::{Clock, MockClock},
    config::{FakeQueueConfig, UnmappedQueuePolicy},
    dispatch::{Decision, Disposition, HandleOptions},
    failure::FailureInjector,
    handler::{HandlerRegistry, JobHandler},
    id::IdGenerator,
    job::{Job, JobId, JobRequest},
    stats::QueueStats,
    store::QueueStore,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Everything the queue mutates, guarded by one lock.
#[derive(Debug)]
struct QueueState {
    store: QueueStore,
    ids: IdGenerator,
    failures: FailureInjector,
    handlers: HandlerRegistry,
}

impl QueueState {
    fn new(config: &FakeQueueConfig) -> Self {
        Self {
            store: QueueStore::new(),
            ids: IdGenerator::new(config.id_prefix.clone(), config.id_width),
            failures: FailureInjector::new(),
            handlers: HandlerRegistry::new(),
        }
    }

    fn create_job(&mut self, queue_name: &str, request: JobRequest, now: DateTime<Utc>) -> Job {
        let job = Job::from_request(self.ids.next_id(), queue_name, request, now);
        self.store.append(job.clone());
        job
    }
}

fn validate_request(queue_name: &str, request: &JobRequest) -> Result<()> {
    match request.delivery_delay {
        Some(delay) if delay < chrono::Duration::zero() => Err(FakeQueueError::InvalidDeliveryDelay {
            queue_name: queue_name.to_string(),
            delay_ms: delay.num_milliseconds(),
        }),
        _ => Ok(()),
    }
}

/// In-memory job queue for exercising producers and handlers in tests.
///
/// Clones share the same queues, so a handler can hold a clone and enqueue
/// follow-up jobs. Jobs enqueued while a dispatch call is running are stored
/// immediately but only delivered by a later call: each pass works from the
/// eligible ids it saw when it started.
///
/// Handlers must not call the dispatch methods (`handle_jobs`, `handle_job`,
/// `reprocess_*`) themselves: dispatch calls are serialized and the call
/// would wait on itself.
#[derive(Clone, Debug)]
pub struct FakeJobQueue {
    state: Arc<Mutex<QueueState>>,
    dispatch_gate: Arc<Mutex<()>>,
    clock: Arc<dyn Clock>,
    backoff_delay: chrono::Duration,
    unmapped_queue_policy: UnmappedQueuePolicy,
}

impl FakeJobQueue {
    /// Create a queue with default settings and a fresh [`MockClock`].
    pub fn new() -> Self {
        Self::with_clock(MockClock::new())
    }

    /// Create a queue with default settings reading time from `clock`.
    pub fn with_clock(clock: impl Clock + 'static) -> Self {
        Self::from_parts(
            &FakeQueueConfig::default(),
            chrono::Duration::seconds(1),
            Arc::new(clock),
        )
    }

    /// Create a queue from validated `config`, reading time from `clock`.
    pub fn with_config(config: FakeQueueConfig, clock: impl Clock + 'static) -> Result<Self> {
        config.validate()?;
        let backoff_delay = config.backoff_delay_chrono()?;
        Ok(Self::from_parts(&config, backoff_delay, Arc::new(clock)))
    }

    fn from_parts(
        config: &FakeQueueConfig,
        backoff_delay: chrono::Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState::new(config))),
            dispatch_gate: Arc::new(Mutex::new(())),
            clock,
            backoff_delay,
            unmapped_queue_policy: config.unmapped_queue_policy,
        }
    }

    /// The clock delivery times are measured against.
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Register the handler for `queue_name`, replacing any previous one.
    pub async fn register_handler(&self, queue_name: impl Into<String>, handler: impl JobHandler + 'static) {
        let queue_name = queue_name.into();
        debug!("Registering handler for queue {}", queue_name);
        self.state.lock().await.handlers.register(queue_name, handler);
    }

    pub async fn has_handler(&self, queue_name: &str) -> bool {
        self.state.lock().await.handlers.contains(queue_name)
    }

    /// Enqueue one job.
    ///
    /// Fails without storing anything if a failure was pushed for this queue
    /// (or globally), consuming that failure.
    pub async fn enqueue(&self, queue_name: &str, request: JobRequest) -> Result<Job> {
        let mut state = self.state.lock().await;
        state.failures.check(queue_name)?;
        validate_request(queue_name, &request)?;

        let job = state.create_job(queue_name, request, self.clock.now());
        debug!("Enqueued job {} on queue {}", job.id, queue_name);
        Ok(job)
    }

    /// Enqueue several jobs at once. Either every job is stored, in order and
    /// sharing one `enqueued_at`, or none is.
    pub async fn batch_enqueue(&self, queue_name: &str, requests: Vec<JobRequest>) -> Result<Vec<Job>> {
        let mut state = self.state.lock().await;
        state.failures.check(queue_name)?;
        for request in &requests {
            validate_request(queue_name, request)?;
        }

        let now = self.clock.now();
        let jobs: Vec<Job> = requests
            .into_iter()
            .map(|request| state.create_job(queue_name, request, now))
            .collect();
        debug!("Enqueued batch of {} job(s) on queue {}", jobs.len(), queue_name);
        Ok(jobs)
    }

    /// Make the next enqueue on `queue_name` (any queue when `None`) fail with
    /// `reason`.
    pub async fn push_failure(&self, reason: impl Into<String>, queue_name: Option<&str>) {
        self.state.lock().await.failures.push(reason, queue_name);
    }

    /// Failures still waiting to be raised, counted the way they were pushed:
    /// those targeting `queue_name`, or the global ones when `None`.
    pub async fn pending_failures(&self, queue_name: Option<&str>) -> usize {
        let state = self.state.lock().await;
        match queue_name {
            Some(queue_name) => state.failures.pending_for(queue_name),
            None => state.failures.pending_global(),
        }
    }

    /// Number of job ids handed out so far, across all queues.
    pub async fn issued_ids(&self) -> u64 {
        self.state.lock().await.ids.issued()
    }

    /// Pending jobs of `queue_name` in enqueue order.
    pub async fn peek_jobs(&self, queue_name: &str) -> Vec<Job> {
        self.state.lock().await.store.pending(queue_name).to_vec()
    }

    /// Dead-lettered jobs of `queue_name` in the order they were dead-lettered.
    pub async fn peek_deadlettered(&self, queue_name: &str) -> Vec<Job> {
        self.state.lock().await.store.dead_lettered(queue_name).to_vec()
    }

    /// Every queue name seen so far, in ascending order.
    pub async fn queue_names(&self) -> Vec<String> {
        self.state.lock().await.store.queue_names()
    }

    /// Counts for `queue_name`, with eligibility measured at the clock's current instant.
    pub async fn queue_stats(&self, queue_name: &str) -> QueueStats {
        self.state.lock().await.store.stats(queue_name, self.clock.now())
    }

    /// Deliver the eligible jobs of one queue, or of every queue, to their
    /// handlers.
    ///
    /// Returns the jobs that left the pending collection, with their final
    /// `acknowledged` / `dead_lettered` flags. Jobs that asked for backoff stay
    /// pending and are not returned.
    pub async fn handle_jobs(&self, options: HandleOptions) -> Result<Vec<Job>> {
        let _gate = self.dispatch_gate.lock().await;
        self.run_pass(&options).await
    }

    /// Deliver a single pending job, once, whatever its delivery delay.
    ///
    /// Returns `false` without invoking anything when the job is not pending
    /// on its queue (never enqueued, already handled, or dead-lettered) or
    /// when it backed off and its backoff has not elapsed yet.
    pub async fn handle_job(&self, job: &Job) -> Result<bool> {
        let _gate = self.dispatch_gate.lock().await;
        Ok(self
            .handle_pending(&job.queue_name, &job.id)
            .await?
            .was_dispatched())
    }

    /// Move `job` from dead-letter back to pending and deliver it once.
    ///
    /// Returns `false` when the job is not in dead-letter.
    pub async fn reprocess_deadlettered(&self, job: &Job) -> Result<bool> {
        let _gate = self.dispatch_gate.lock().await;
        Ok(self.reprocess(&job.queue_name, &job.id).await?.is_some())
    }

    /// Reprocess every dead-lettered job of `queue_name`, oldest first.
    ///
    /// Returns every job moved out of dead-letter, in the state its single
    /// attempt left it: acknowledged, dead-lettered again, or back in pending
    /// after a backoff (or untouched when the queue has no handler).
    pub async fn reprocess_deadlettered_queue(&self, queue_name: &str) -> Result<Vec<Job>> {
        let _gate = self.dispatch_gate.lock().await;
        let ids = self.state.lock().await.store.dead_letter_ids(queue_name);
        let mut reprocessed = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(job) = self.reprocess(queue_name, &id).await? {
                reprocessed.push(job);
            }
        }
        Ok(reprocessed)
    }

    async fn handler_for(&self, queue_name: &str) -> Result<Option<Arc<dyn JobHandler>>> {
        let handler = self.state.lock().await.handlers.get(queue_name);
        match (handler, self.unmapped_queue_policy) {
            (Some(handler), _) => Ok(Some(handler)),
            (None, UnmappedQueuePolicy::Ignore) => {
                debug!("No handler for queue {}, leaving its jobs in place", queue_name);
                Ok(None)
            }
            (None, UnmappedQueuePolicy::Reject) => Err(FakeQueueError::NoHandler {
                queue_name: queue_name.to_string(),
            }),
        }
    }

    async fn run_pass(&self, options: &HandleOptions) -> Result<Vec<Job>> {
        let now = self.clock.now();
        // Jobs enqueued by handlers during this pass are left for the next one.
        let snapshot: Vec<(String, Vec<JobId>)> = {
            let state = self.state.lock().await;
            let queue_names = match &options.queue_name {
                Some(queue_name) => vec![queue_name.clone()],
                None => state.store.queue_names(),
            };
            queue_names
                .into_iter()
                .map(|queue_name| {
                    let eligible = state.store.eligible(&queue_name, now, options.consider_delays);
                    (queue_name, eligible)
                })
                .filter(|(_, eligible)| !eligible.is_empty())
                .collect()
        };

        let mut handled = Vec::new();
        for (queue_name, eligible) in snapshot {
            let Some(handler) = self.handler_for(&queue_name).await? else {
                continue;
            };

            debug!("Dispatching {} job(s) from queue {}", eligible.len(), queue_name);
            let mut count = 0;
            for id in eligible {
                let disposition = self
                    .dispatch_job(handler.as_ref(), &queue_name, &id, now, options.max_attempts())
                    .await?;

                if let Disposition::Exhausted(job) = &disposition {
                    if options.assert_acknowledged {
                        warn!("Job {} was not acknowledged after handling", job.id);
                        return Err(FakeQueueError::UnacknowledgedJob {
                            job: Box::new(job.clone()),
                        });
                    }
                }
                if let Some(job) = disposition.into_handled() {
                    handled.push(job);
                    count += 1;
                }
            }
            info!("Handled {} job(s) from queue {}", count, queue_name);
        }

        Ok(handled)
    }

    async fn handle_pending(&self, queue_name: &str, id: &JobId) -> Result<Disposition> {
        let now = self.clock.now();
        let backing_off = match self.state.lock().await.store.find_pending(queue_name, id) {
            Some(job) => job.is_backing_off(now),
            None => {
                debug!("Job {} is not pending on queue {}", id, queue_name);
                return Ok(Disposition::NotDispatched);
            }
        };
        if backing_off {
            debug!("Job {} is backing off, not handling it yet", id);
            return Ok(Disposition::NotDispatched);
        }
        let Some(handler) = self.handler_for(queue_name).await? else {
            return Ok(Disposition::NotDispatched);
        };
        self.dispatch_job(handler.as_ref(), queue_name, id, now, 1).await
    }

    /// The job after its single reprocessing attempt, or `None` when it is
    /// not in dead-letter.
    async fn reprocess(&self, queue_name: &str, id: &JobId) -> Result<Option<Job>> {
        let in_dead_letter = self
            .state
            .lock()
            .await
            .store
            .dead_lettered(queue_name)
            .iter()
            .any(|job| &job.id == id);
        if !in_dead_letter {
            debug!("Job {} is not dead-lettered on queue {}", id, queue_name);
            return Ok(None);
        }

        let handler = self.handler_for(queue_name).await?;
        let Some(revived) = self.state.lock().await.store.revive(queue_name, id) else {
            return Ok(None);
        };
        info!("Reprocessing dead-lettered job {} on queue {}", id, queue_name);

        let Some(handler) = handler else {
            return Ok(Some(revived));
        };
        let disposition = self
            .dispatch_job(handler.as_ref(), queue_name, id, self.clock.now(), 1)
            .await?;
        Ok(Some(disposition.into_job().unwrap_or(revived)))
    }

    /// Run up to `max_attempts` handler invocations for one pending job and
    /// record where it ends up. The state lock is released while the handler
    /// runs.
    async fn dispatch_job(
        &self,
        handler: &dyn JobHandler,
        queue_name: &str,
        id: &JobId,
        now: DateTime<Utc>,
        max_attempts: u32,
    ) -> Result<Disposition> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let Some(job) = self.state.lock().await.store.begin_attempt(queue_name, id) else {
                return Ok(Disposition::NotDispatched);
            };

            let result = handler.handle(job).await;
            if let Err(e) = &result {
                warn!("Handler for queue {} failed on job {} (attempt {}): {}", queue_name, id, attempt, e);
            }

            let decision = Decision::after_attempt(result.as_ref().ok().copied(), attempt, max_attempts);
            let mut state = self.state.lock().await;
            let store = &mut state.store;
            let disposition = match decision {
                Decision::Retry => {
                    debug!("Job {} unresolved after attempt {}, retrying", id, attempt);
                    continue;
                }
                Decision::Acknowledge => store.acknowledge(queue_name, id).map(Disposition::Acknowledged),
                Decision::DeadLetter => {
                    info!("Job {} dead-lettered by handler", id);
                    store.dead_letter(queue_name, id, true).map(Disposition::DeadLettered)
                }
                Decision::BackOff => {
                    debug!("Job {} backing off for {}ms", id, self.backoff_delay.num_milliseconds());
                    store
                        .back_off(queue_name, id, now + self.backoff_delay)
                        .map(Disposition::BackedOff)
                }
                Decision::Exhaust => {
                    info!("Job {} exhausted {} attempt(s), moving to dead-letter", id, attempt);
                    store.dead_letter(queue_name, id, false).map(Disposition::Exhausted)
                }
            }
            .unwrap_or(Disposition::NotDispatched);

            return match result {
                Err(source) if matches!(disposition, Disposition::Exhausted(_)) => {
                    Err(FakeQueueError::HandlerFailed {
                        queue_name: queue_name.to_string(),
                        job_id: id.clone(),
                        source,
                    })
                }
                _ => Ok(disposition),
            };
        }
    }
}

impl Default for FakeJobQueue {
    fn default() -> Self {
        Self::new()
    }
}
