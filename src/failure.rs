//! Synthetic enqueue failures.
//!
//! Tests register failure reasons ahead of time; the next enqueue calls consume
//! them one at a time instead of storing anything. Global failures apply to
//! every queue and are consumed before queue-specific ones.

use crate::{FakeQueueError, Result};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

#[derive(Debug, Default)]
pub struct FailureInjector {
    global: VecDeque<String>,
    per_queue: HashMap<String, VecDeque<String>>,
}

impl FailureInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a failure for `queue_name`, or for every queue when `None`.
    pub fn push(&mut self, reason: impl Into<String>, queue_name: Option<&str>) {
        let reason = reason.into();
        match queue_name {
            Some(queue_name) => self
                .per_queue
                .entry(queue_name.to_string())
                .or_default()
                .push_back(reason),
            None => self.global.push_back(reason),
        }
    }

    /// Consume at most one pending failure for an enqueue on `queue_name`.
    ///
    /// Returns `Err` with the consumed reason, `Ok(())` when nothing is pending.
    pub fn check(&mut self, queue_name: &str) -> Result<()> {
        let reason = match self.global.pop_front() {
            Some(reason) => Some(reason),
            None => self
                .per_queue
                .get_mut(queue_name)
                .and_then(VecDeque::pop_front),
        };

        match reason {
            Some(reason) => {
                debug!("Injecting enqueue failure on queue {}: {}", queue_name, reason);
                Err(FakeQueueError::InjectedFailure {
                    queue_name: queue_name.to_string(),
                    reason,
                })
            }
            None => Ok(()),
        }
    }

    /// Failures still waiting for `queue_name`, excluding global ones.
    pub fn pending_for(&self, queue_name: &str) -> usize {
        self.per_queue.get(queue_name).map_or(0, VecDeque::len)
    }

    pub fn pending_global(&self) -> usize {
        self.global.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reason(result: Result<()>) -> String {
        match result {
            Err(FakeQueueError::InjectedFailure { reason, .. }) => reason,
            other => panic!("expected injected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_injector_passes() {
        let mut failures = FailureInjector::new();
        assert!(failures.check("red").is_ok());
    }

    #[test]
    fn test_failures_are_consumed_in_order() {
        let mut failures = FailureInjector::new();
        failures.push(":) 1", Some("red"));
        failures.push(":) 2", Some("red"));

        assert!(failures.check("green").is_ok());
        assert_eq!(reason(failures.check("red")), ":) 1");
        assert_eq!(reason(failures.check("red")), ":) 2");
        assert!(failures.check("red").is_ok());
    }

    #[test]
    fn test_global_failures_apply_to_any_queue() {
        let mut failures = FailureInjector::new();
        failures.push(":) 1", None);
        failures.push(":) 2", None);

        assert_eq!(reason(failures.check("red")), ":) 1");
        assert_eq!(reason(failures.check("green")), ":) 2");
        assert!(failures.check("red").is_ok());
    }

    #[test]
    fn test_global_consumed_before_queue_specific() {
        let mut failures = FailureInjector::new();
        failures.push("queue", Some("red"));
        failures.push("global", None);

        assert_eq!(reason(failures.check("red")), "global");
        assert_eq!(failures.pending_for("red"), 1);
        assert_eq!(failures.pending_global(), 0);

        assert_eq!(reason(failures.check("red")), "queue");
        assert_eq!(failures.pending_for("red"), 0);
    }

    #[test]
    fn test_queue_failure_does_not_touch_global() {
        let mut failures = FailureInjector::new();
        failures.push("red only", Some("red"));

        assert!(failures.check("green").is_ok());
        assert_eq!(failures.pending_for("red"), 1);
    }
}
