use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt};
use uuid::Uuid;

/// Serializes optional delays as whole milliseconds.
mod delay_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(delay: &Option<chrono::Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        delay.map(|d| d.num_milliseconds()).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<chrono::Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<i64>::deserialize(deserializer)?.map(chrono::Duration::milliseconds))
    }
}

/// Identifier assigned to a job when it is enqueued.
///
/// Ids are rendered as a constant prefix followed by a zero-padded counter,
/// so lexical order matches enqueue order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A unit of work held by the fake queue.
///
/// `acknowledged`, `dead_lettered` and `attempts` are owned by the queue and
/// only change during a dispatch pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub queue_name: String,
    pub idempotence_key: String,
    pub body: String,
    pub attributes: HashMap<String, String>,
    pub enqueued_at: DateTime<Utc>,
    #[serde(default, with = "delay_millis")]
    pub delivery_delay: Option<chrono::Duration>,
    /// Earliest instant the job may be delivered. Starts at
    /// `enqueued_at + delivery_delay` and moves forward on backoff.
    pub deliver_at: DateTime<Utc>,
    pub acknowledged: bool,
    pub dead_lettered: bool,
    /// Handler invocations in the current attempt cycle.
    pub attempts: u32,
    /// Set while the job waits out a backoff its handler asked for.
    #[serde(default)]
    pub backoff_until: Option<DateTime<Utc>>,
}

impl Job {
    pub(crate) fn from_request(
        id: JobId,
        queue_name: &str,
        request: JobRequest,
        enqueued_at: DateTime<Utc>,
    ) -> Self {
        let deliver_at = match request.delivery_delay {
            Some(delay) => enqueued_at + delay,
            None => enqueued_at,
        };

        Self {
            id,
            queue_name: queue_name.to_string(),
            idempotence_key: request
                .idempotence_key
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            body: request.body,
            attributes: request.attributes,
            enqueued_at,
            delivery_delay: request.delivery_delay,
            deliver_at,
            acknowledged: false,
            dead_lettered: false,
            attempts: 0,
            backoff_until: None,
        }
    }

    /// Whether the job may be delivered at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.deliver_at <= now
    }

    pub fn is_backing_off(&self, now: DateTime<Utc>) -> bool {
        self.backoff_until.is_some_and(|until| until > now)
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// What a producer hands to `enqueue`: everything except the fields the queue
/// assigns itself.
///
/// ```rust
/// use fakequeue::JobRequest;
/// use chrono::Duration;
///
/// let request = JobRequest::new("stop sign")
///     .with_idempotence_key("order-42")
///     .with_attribute("color", "red")
///     .with_delivery_delay(Duration::seconds(10));
///
/// assert_eq!(request.body, "stop sign");
/// assert_eq!(request.attributes["color"], "red");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    pub body: String,
    /// A random UUID is used when no key is given.
    pub idempotence_key: Option<String>,
    pub attributes: HashMap<String, String>,
    #[serde(default, with = "delay_millis")]
    pub delivery_delay: Option<chrono::Duration>,
}

impl JobRequest {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn with_idempotence_key(mut self, key: impl Into<String>) -> Self {
        self.idempotence_key = Some(key.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_attributes(mut self, attributes: HashMap<String, String>) -> Self {
        self.attributes.extend(attributes);
        self
    }

    pub fn with_delivery_delay(mut self, delay: chrono::Duration) -> Self {
        self.delivery_delay = Some(delay);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(secs)
    }

    #[test]
    fn test_job_without_delay_is_due_at_enqueue() {
        let job = Job::from_request(
            JobId::new("fakej0bqee000000000000001"),
            "green",
            JobRequest::new("android"),
            at(0),
        );

        assert_eq!(job.deliver_at, job.enqueued_at);
        assert!(job.delivery_delay.is_none());
        assert!(job.is_due(at(0)));
        assert!(!job.acknowledged);
        assert!(!job.dead_lettered);
        assert_eq!(job.attempts, 0);
    }

    #[test]
    fn test_job_with_delay_derives_deliver_at() {
        let job = Job::from_request(
            JobId::new("fakej0bqee000000000000001"),
            "green",
            JobRequest::new("dinosaur").with_delivery_delay(Duration::milliseconds(1000)),
            at(0),
        );

        assert_eq!(job.delivery_delay, Some(Duration::seconds(1)));
        assert_eq!(job.deliver_at, at(1));
        assert!(!job.is_due(at(0)));
        assert!(job.is_due(at(1)));
    }

    #[test]
    fn test_idempotence_key_defaults_to_uuid() {
        let first = Job::from_request(JobId::new("a"), "q", JobRequest::new("x"), at(0));
        let second = Job::from_request(JobId::new("b"), "q", JobRequest::new("x"), at(0));

        assert!(Uuid::parse_str(&first.idempotence_key).is_ok());
        assert_ne!(first.idempotence_key, second.idempotence_key);

        let keyed = Job::from_request(
            JobId::new("c"),
            "q",
            JobRequest::new("x").with_idempotence_key("order-42"),
            at(0),
        );
        assert_eq!(keyed.idempotence_key, "order-42");
    }

    #[test]
    fn test_request_attributes() {
        let mut extra = HashMap::new();
        extra.insert("b".to_string(), "2".to_string());

        let request = JobRequest::new("body")
            .with_attribute("a", "1")
            .with_attributes(extra);

        let job = Job::from_request(JobId::new("id"), "q", request, at(0));
        assert_eq!(job.attribute("a"), Some("1"));
        assert_eq!(job.attribute("b"), Some("2"));
        assert_eq!(job.attribute("c"), None);
    }

    #[test]
    fn test_job_id_ordering_follows_padding() {
        let nine = JobId::new("fakej0bqee000000000000009");
        let ten = JobId::new("fakej0bqee000000000000010");
        assert!(nine < ten);
        assert_eq!(ten.to_string(), "fakej0bqee000000000000010");
    }
}
