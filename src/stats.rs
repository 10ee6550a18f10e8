use serde::{Deserialize, Serialize};

/// Lifetime counters kept per queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounters {
    /// Jobs stored by successful enqueues
    pub enqueued: u64,
    /// Jobs removed after a handler acknowledged them
    pub acknowledged: u64,
    /// Jobs moved to dead-letter, explicitly or by exhausting retries
    pub dead_lettered: u64,
    /// Backoff requests honoured
    pub backoffs: u64,
    /// Jobs moved back from dead-letter to pending
    pub reprocessed: u64,
}

/// Point-in-time view of one queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Name of the queue
    pub queue_name: String,
    /// Number of pending jobs, due or not
    pub pending_count: u64,
    /// Pending jobs whose delivery time has been reached
    pub eligible_count: u64,
    /// Number of jobs in the dead-letter collection
    pub dead_letter_count: u64,
    pub counters: QueueCounters,
}

impl QueueStats {
    pub fn empty(queue_name: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
            pending_count: 0,
            eligible_count: 0,
            dead_letter_count: 0,
            counters: QueueCounters::default(),
        }
    }

    /// Jobs waiting for their delivery delay or a backoff to elapse.
    pub fn delayed_count(&self) -> u64 {
        self.pending_count.saturating_sub(self.eligible_count)
    }
}
