//! Handlers invoked by the fake queue during dispatch.
//!
//! A handler receives a snapshot of the job and reports what should happen to
//! it by returning an [`Outcome`]. Returning `Err` counts as an attempt that
//! did not acknowledge the job.
//!
//! ```rust
//! use fakequeue::handler::{handler_fn, HandlerRegistry, Outcome};
//! use fakequeue::Job;
//!
//! let mut registry = HandlerRegistry::new();
//! registry.register("green", handler_fn(|job: Job| async move {
//!     if job.body == "poison" {
//!         Ok(Outcome::DeadLetter)
//!     } else {
//!         Ok(Outcome::Ack)
//!     }
//! }));
//!
//! assert!(registry.get("green").is_some());
//! assert!(registry.get("red").is_none());
//! ```

use crate::job::Job;
use async_trait::async_trait;
use std::{collections::HashMap, fmt, future::Future, sync::Arc};

/// Error raised by a handler.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

pub type HandlerResult = std::result::Result<Outcome, HandlerError>;

/// What a handler decided about the job it was given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Processed; remove the job.
    Ack,
    /// Reject the job; move it to dead-letter without further attempts.
    DeadLetter,
    /// Not yet; redeliver after the configured backoff delay.
    Backoff,
    /// Returned without resolving the job.
    NoOp,
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: Job) -> HandlerResult;
}

/// Adapter turning an async closure into a [`JobHandler`].
#[derive(Clone)]
pub struct HandlerFn<F> {
    f: F,
}

pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(Job) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    HandlerFn { f }
}

#[async_trait]
impl<F, Fut> JobHandler for HandlerFn<F>
where
    F: Fn(Job) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, job: Job) -> HandlerResult {
        (self.f)(job).await
    }
}

/// Maps queue names to the handler that consumes them.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `queue_name`, returning the handler it replaced.
    pub fn register(
        &mut self,
        queue_name: impl Into<String>,
        handler: impl JobHandler + 'static,
    ) -> Option<Arc<dyn JobHandler>> {
        self.register_arc(queue_name, Arc::new(handler))
    }

    pub fn register_arc(
        &mut self,
        queue_name: impl Into<String>,
        handler: Arc<dyn JobHandler>,
    ) -> Option<Arc<dyn JobHandler>> {
        self.handlers.insert(queue_name.into(), handler)
    }

    pub fn get(&self, queue_name: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(queue_name).cloned()
    }

    pub fn contains(&self, queue_name: &str) -> bool {
        self.handlers.contains_key(queue_name)
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut queues: Vec<&String> = self.handlers.keys().collect();
        queues.sort();
        f.debug_struct("HandlerRegistry")
            .field("queues", &queues)
            .finish()
    }
}
