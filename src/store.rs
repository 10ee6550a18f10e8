//! Per-queue storage of pending and dead-lettered jobs.
//!
//! Each queue owns two insertion-ordered sequences. A job is in exactly one
//! of them from the moment it is stored: dispatch only ever moves a job
//! between the two or removes it from `pending` once acknowledged.

use crate::{
    job::{Job, JobId},
    stats::{QueueCounters, QueueStats},
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

#[derive(Debug, Default)]
struct QueueSlot {
    pending: Vec<Job>,
    dead_lettered: Vec<Job>,
    counters: QueueCounters,
}

impl QueueSlot {
    fn take_pending(&mut self, id: &JobId) -> Option<Job> {
        let index = self.pending.iter().position(|job| &job.id == id)?;
        Some(self.pending.remove(index))
    }

    fn pending_mut(&mut self, id: &JobId) -> Option<&mut Job> {
        self.pending.iter_mut().find(|job| &job.id == id)
    }
}

/// Queues keyed by exact, case-sensitive name. Iteration is in name order.
#[derive(Debug, Default)]
pub struct QueueStore {
    queues: BTreeMap<String, QueueSlot>,
}

impl QueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot_mut(&mut self, queue_name: &str) -> &mut QueueSlot {
        self.queues.entry(queue_name.to_string()).or_default()
    }

    /// Store a freshly enqueued job at the back of its queue.
    pub fn append(&mut self, job: Job) {
        let slot = self.slot_mut(&job.queue_name);
        slot.counters.enqueued += 1;
        slot.pending.push(job);
    }

    pub fn queue_names(&self) -> Vec<String> {
        self.queues.keys().cloned().collect()
    }

    pub fn pending(&self, queue_name: &str) -> &[Job] {
        self.queues
            .get(queue_name)
            .map(|slot| slot.pending.as_slice())
            .unwrap_or_default()
    }

    pub fn dead_lettered(&self, queue_name: &str) -> &[Job] {
        self.queues
            .get(queue_name)
            .map(|slot| slot.dead_lettered.as_slice())
            .unwrap_or_default()
    }

    pub fn find_pending(&self, queue_name: &str, id: &JobId) -> Option<&Job> {
        self.pending(queue_name).iter().find(|job| &job.id == id)
    }

    /// Ids of the pending jobs a dispatch pass should deliver, in delivery
    /// order: ascending `deliver_at`, then ascending id.
    pub fn eligible(
        &self,
        queue_name: &str,
        now: DateTime<Utc>,
        consider_delays: bool,
    ) -> Vec<JobId> {
        let mut eligible: Vec<&Job> = self
            .pending(queue_name)
            .iter()
            .filter(|job| !consider_delays || job.is_due(now))
            .collect();
        eligible.sort_by(|a, b| a.deliver_at.cmp(&b.deliver_at).then_with(|| a.id.cmp(&b.id)));
        eligible.into_iter().map(|job| job.id.clone()).collect()
    }

    /// Count one handler invocation and return the job as the handler sees it.
    pub fn begin_attempt(&mut self, queue_name: &str, id: &JobId) -> Option<Job> {
        let job = self.queues.get_mut(queue_name)?.pending_mut(id)?;
        job.attempts += 1;
        Some(job.clone())
    }

    /// Remove an acknowledged job from pending.
    pub fn acknowledge(&mut self, queue_name: &str, id: &JobId) -> Option<Job> {
        let slot = self.queues.get_mut(queue_name)?;
        let mut job = slot.take_pending(id)?;
        job.acknowledged = true;
        job.backoff_until = None;
        slot.counters.acknowledged += 1;
        Some(job)
    }

    /// Move a pending job to dead-letter.
    ///
    /// `explicit` marks a handler's own dead-letter request; jobs that merely
    /// ran out of attempts keep `dead_lettered == false`.
    pub fn dead_letter(&mut self, queue_name: &str, id: &JobId, explicit: bool) -> Option<Job> {
        let slot = self.queues.get_mut(queue_name)?;
        let mut job = slot.take_pending(id)?;
        job.dead_lettered = explicit;
        job.backoff_until = None;
        slot.counters.dead_lettered += 1;
        slot.dead_lettered.push(job.clone());
        Some(job)
    }

    /// Push a pending job's delivery time out to `deliver_at`.
    pub fn back_off(&mut self, queue_name: &str, id: &JobId, deliver_at: DateTime<Utc>) -> Option<Job> {
        let slot = self.queues.get_mut(queue_name)?;
        let job = slot.pending_mut(id)?;
        job.deliver_at = deliver_at;
        job.backoff_until = Some(deliver_at);
        let job = job.clone();
        slot.counters.backoffs += 1;
        Some(job)
    }

    /// Move a dead-lettered job back to the end of pending with a fresh
    /// attempt cycle. Returns `None` if it is not in dead-letter.
    pub fn revive(&mut self, queue_name: &str, id: &JobId) -> Option<Job> {
        let slot = self.queues.get_mut(queue_name)?;
        let index = slot.dead_lettered.iter().position(|job| &job.id == id)?;

        let mut job = slot.dead_lettered.remove(index);
        job.acknowledged = false;
        job.dead_lettered = false;
        job.attempts = 0;
        job.backoff_until = None;
        slot.pending.push(job.clone());
        slot.counters.reprocessed += 1;
        Some(job)
    }

    pub fn dead_letter_ids(&self, queue_name: &str) -> Vec<JobId> {
        self.dead_lettered(queue_name)
            .iter()
            .map(|job| job.id.clone())
            .collect()
    }

    pub fn stats(&self, queue_name: &str, now: DateTime<Utc>) -> QueueStats {
        let Some(slot) = self.queues.get(queue_name) else {
            return QueueStats::empty(queue_name);
        };

        QueueStats {
            queue_name: queue_name.to_string(),
            pending_count: slot.pending.len() as u64,
            eligible_count: slot.pending.iter().filter(|job| job.is_due(now)).count() as u64,
            dead_letter_count: slot.dead_lettered.len() as u64,
            counters: slot.counters,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobRequest;
    use chrono::{Duration, TimeZone};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn job(id: u64, queue: &str, enqueued: i64, delay: Option<i64>) -> Job {
        let mut request = JobRequest::new(format!("job {}", id));
        if let Some(delay) = delay {
            request = request.with_delivery_delay(Duration::seconds(delay));
        }
        Job::from_request(
            JobId::new(format!("id{:03}", id)),
            queue,
            request,
            at(enqueued),
        )
    }

    fn bodies(store: &QueueStore, ids: &[JobId], queue: &str) -> Vec<String> {
        ids.iter()
            .map(|id| {
                store
                    .pending(queue)
                    .iter()
                    .find(|job| &job.id == id)
                    .map(|job| job.body.clone())
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_unknown_queue_is_empty() {
        let store = QueueStore::new();
        assert!(store.pending("missing").is_empty());
        assert!(store.dead_lettered("missing").is_empty());
        assert!(store.queue_names().is_empty());
        assert_eq!(store.stats("missing", at(0)), QueueStats::empty("missing"));
    }

    #[test]
    fn test_queue_names_are_case_sensitive() {
        let mut store = QueueStore::new();
        store.append(job(1, "green", 0, None));
        store.append(job(2, "Green", 0, None));

        assert_eq!(store.pending("green").len(), 1);
        assert_eq!(store.pending("Green").len(), 1);
        assert_eq!(store.queue_names(), vec!["Green".to_string(), "green".to_string()]);
    }

    #[test]
    fn test_eligible_orders_by_deliver_at_then_id() {
        let mut store = QueueStore::new();
        store.append(job(1, "green", 0, None));
        store.append(job(2, "green", 0, Some(10)));
        store.append(job(3, "green", 0, None));
        store.append(job(4, "green", 0, Some(5)));
        store.append(job(5, "green", 4, None));
        store.append(job(6, "green", 4, Some(1)));

        let ids = store.eligible("green", at(10), true);
        assert_eq!(
            bodies(&store, &ids, "green"),
            vec!["job 1", "job 3", "job 5", "job 4", "job 6", "job 2"]
        );
    }

    #[test]
    fn test_eligible_respects_delays_only_when_asked() {
        let mut store = QueueStore::new();
        store.append(job(1, "green", 0, Some(10)));
        store.append(job(2, "green", 0, None));

        assert_eq!(store.eligible("green", at(5), true).len(), 1);
        assert_eq!(store.eligible("green", at(5), false).len(), 2);
    }

    #[test]
    fn test_acknowledge_removes_from_pending() {
        let mut store = QueueStore::new();
        store.append(job(1, "green", 0, None));
        let id = JobId::new("id001");

        let attempt = store.begin_attempt("green", &id).unwrap();
        assert_eq!(attempt.attempts, 1);

        let acked = store.acknowledge("green", &id).unwrap();
        assert!(acked.acknowledged);
        assert!(store.pending("green").is_empty());
        assert!(store.acknowledge("green", &id).is_none());
        assert_eq!(store.stats("green", at(0)).counters.acknowledged, 1);
    }

    #[test]
    fn test_dead_letter_and_revive() {
        let mut store = QueueStore::new();
        store.append(job(1, "green", 0, None));
        store.append(job(2, "green", 0, None));
        let first = JobId::new("id001");
        let second = JobId::new("id002");

        store.begin_attempt("green", &first);
        let explicit = store.dead_letter("green", &first, true).unwrap();
        let exhausted = store.dead_letter("green", &second, false).unwrap();
        assert!(explicit.dead_lettered);
        assert!(!exhausted.dead_lettered);

        assert!(store.pending("green").is_empty());
        assert_eq!(store.dead_letter_ids("green"), vec![first.clone(), second.clone()]);

        assert!(store.revive("green", &first).is_some());
        assert!(store.revive("green", &first).is_none());

        let revived = &store.pending("green")[0];
        assert_eq!(revived.id, first);
        assert!(!revived.dead_lettered);
        assert_eq!(revived.attempts, 0);
        assert_eq!(store.dead_letter_ids("green"), vec![second]);

        let stats = store.stats("green", at(0));
        assert_eq!(stats.counters.dead_lettered, 2);
        assert_eq!(stats.counters.reprocessed, 1);
    }

    #[test]
    fn test_back_off_moves_deliver_at() {
        let mut store = QueueStore::new();
        store.append(job(1, "green", 0, None));
        let id = JobId::new("id001");

        let backed_off = store.back_off("green", &id, at(1)).unwrap();
        assert_eq!(backed_off.backoff_until, Some(at(1)));
        assert!(backed_off.is_backing_off(at(0)));
        assert!(!backed_off.is_backing_off(at(1)));

        assert!(store.find_pending("green", &id).is_some());
        assert!(store.eligible("green", at(0), true).is_empty());
        assert_eq!(store.eligible("green", at(1), true), vec![id]);

        let stats = store.stats("green", at(0));
        assert_eq!(stats.pending_count, 1);
        assert_eq!(stats.eligible_count, 0);
        assert_eq!(stats.counters.backoffs, 1);
    }
}
