//! Dispatch options and the per-attempt decision table.

use crate::{handler::Outcome, job::Job};
use serde::{Deserialize, Serialize};

/// Parameters of one `handle_jobs` call.
///
/// ```rust
/// use fakequeue::HandleOptions;
///
/// let options = HandleOptions::for_queue("green")
///     .considering_delays()
///     .with_retries(2)
///     .with_assert_acknowledged(false);
///
/// assert_eq!(options.max_attempts(), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandleOptions {
    /// Queue to dispatch; every known queue when `None`.
    pub queue_name: Option<String>,
    /// Only deliver jobs whose `deliver_at` has been reached.
    pub consider_delays: bool,
    /// Extra attempts per job after the first.
    pub retries: u32,
    /// Fail the pass when a job is still unresolved after its last attempt.
    pub assert_acknowledged: bool,
}

impl Default for HandleOptions {
    fn default() -> Self {
        Self {
            queue_name: None,
            consider_delays: false,
            retries: 0,
            assert_acknowledged: true,
        }
    }
}

impl HandleOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_queue(queue_name: impl Into<String>) -> Self {
        Self::default().with_queue(queue_name)
    }

    pub fn with_queue(mut self, queue_name: impl Into<String>) -> Self {
        self.queue_name = Some(queue_name.into());
        self
    }

    pub fn considering_delays(self) -> Self {
        self.with_consider_delays(true)
    }

    pub fn with_consider_delays(mut self, consider_delays: bool) -> Self {
        self.consider_delays = consider_delays;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_assert_acknowledged(mut self, assert_acknowledged: bool) -> Self {
        self.assert_acknowledged = assert_acknowledged;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }
}

/// Where a job ended up after being dispatched.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    /// Acknowledged and removed from pending.
    Acknowledged(Job),
    /// Dead-lettered by the handler.
    DeadLettered(Job),
    /// Ran out of attempts without being resolved; now in dead-letter.
    Exhausted(Job),
    /// Still pending with a later `deliver_at`.
    BackedOff(Job),
    /// The handler was not invoked.
    NotDispatched,
}

impl Disposition {
    /// The job as returned from a dispatch pass. Backed-off jobs stay in the
    /// queue and are not reported.
    pub fn into_handled(self) -> Option<Job> {
        match self {
            Disposition::Acknowledged(job)
            | Disposition::DeadLettered(job)
            | Disposition::Exhausted(job) => Some(job),
            Disposition::BackedOff(_) | Disposition::NotDispatched => None,
        }
    }

    /// The job in whatever state dispatch left it, including one that backed
    /// off and is still pending.
    pub fn into_job(self) -> Option<Job> {
        match self {
            Disposition::Acknowledged(job)
            | Disposition::DeadLettered(job)
            | Disposition::Exhausted(job)
            | Disposition::BackedOff(job) => Some(job),
            Disposition::NotDispatched => None,
        }
    }

    pub fn was_dispatched(&self) -> bool {
        !matches!(self, Disposition::NotDispatched)
    }
}

/// What the queue does after one handler invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Decision {
    Acknowledge,
    DeadLetter,
    BackOff,
    Retry,
    Exhaust,
}

impl Decision {
    /// `outcome` is `None` when the handler returned an error.
    pub(crate) fn after_attempt(outcome: Option<Outcome>, attempt: u32, max_attempts: u32) -> Self {
        match outcome {
            Some(Outcome::Ack) => Decision::Acknowledge,
            Some(Outcome::DeadLetter) => Decision::DeadLetter,
            Some(Outcome::Backoff) => Decision::BackOff,
            Some(Outcome::NoOp) | None if attempt < max_attempts => Decision::Retry,
            Some(Outcome::NoOp) | None => Decision::Exhaust,
        }
    }
}
