use crate::job::{Job, JobId};
use crate::handler::HandlerError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FakeQueueError {
    /// A failure registered with `push_failure`, surfaced verbatim.
    #[error("{reason}")]
    InjectedFailure { queue_name: String, reason: String },

    #[error("Expected job {} to be acknowledged after handling", job.id)]
    UnacknowledgedJob { job: Box<Job> },

    #[error("Handler for queue {queue_name} failed on job {job_id}: {source}")]
    HandlerFailed {
        queue_name: String,
        job_id: JobId,
        #[source]
        source: HandlerError,
    },

    #[error("No handler registered for queue: {queue_name}")]
    NoHandler { queue_name: String },

    #[error("Invalid delivery delay for queue {queue_name}: {delay_ms}ms")]
    InvalidDeliveryDelay { queue_name: String, delay_ms: i64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl FakeQueueError {
    /// The job named by a dispatch error, if any.
    pub fn job_id(&self) -> Option<&JobId> {
        match self {
            FakeQueueError::UnacknowledgedJob { job } => Some(&job.id),
            FakeQueueError::HandlerFailed { job_id, .. } => Some(job_id),
            _ => None,
        }
    }
}

impl From<toml::de::Error> for FakeQueueError {
    fn from(err: toml::de::Error) -> Self {
        FakeQueueError::Config(format!("TOML deserialization error: {}", err))
    }
}

impl From<toml::ser::Error> for FakeQueueError {
    fn from(err: toml::ser::Error) -> Self {
        FakeQueueError::Config(format!("TOML serialization error: {}", err))
    }
}
