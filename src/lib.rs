//! # Fakequeue
//!
//! A deterministic, in-memory job queue for testing code that produces and
//! consumes background jobs, without running workers or a broker.
//!
//! ## Features
//!
//! - **Explicit dispatch**: jobs sit in their queue until a test calls
//!   [`FakeJobQueue::handle_jobs`], [`FakeJobQueue::handle_job`] or one of the
//!   dead-letter reprocessing methods
//! - **Controllable time**: delivery delays and backoff are measured against a
//!   [`Clock`], normally a [`MockClock`] the test advances by hand
//! - **Failure injection**: make the next enqueue on a queue (or any queue)
//!   fail with a chosen reason
//! - **Dead-letter inspection**: see what was rejected and push it back through
//!   its handler
//! - **Predictable ids**: zero-padded sequential job ids such as
//!   `fakej0bqee000000000000001`
//!
//! ## Quick Start
//!
//! ```rust
//! use fakequeue::{FakeJobQueue, HandleOptions, Job, JobRequest};
//! use fakequeue::handler::{handler_fn, Outcome};
//!
//! #[tokio::main]
//! async fn main() -> fakequeue::Result<()> {
//!     let queue = FakeJobQueue::new();
//!     queue
//!         .register_handler("green", handler_fn(|job: Job| async move {
//!             Ok(if job.body == "reject me" {
//!                 Outcome::DeadLetter
//!             } else {
//!                 Outcome::Ack
//!             })
//!         }))
//!         .await;
//!
//!     queue.enqueue("green", JobRequest::new("hello")).await?;
//!     queue.enqueue("green", JobRequest::new("reject me")).await?;
//!
//!     let handled = queue.handle_jobs(HandleOptions::for_queue("green")).await?;
//!     assert_eq!(handled.len(), 2);
//!     assert!(queue.peek_jobs("green").await.is_empty());
//!     assert_eq!(queue.peek_deadlettered("green").await.len(), 1);
//!     Ok(())
//! }
//! ```
//!
//! ## Core Concepts
//!
//! ### Jobs
//!
//! A [`Job`] carries a text body, optional attributes, an idempotence key and
//! an optional delivery delay. Its `deliver_at` is `enqueued_at` plus the
//! delay, and dispatch orders eligible jobs by `deliver_at` then id.
//!
//! ### Handlers
//!
//! One [`JobHandler`] per queue name. A handler returns an [`Outcome`]:
//! acknowledge, dead-letter, back off, or leave the job unresolved. Returning
//! an error counts as an unresolved attempt.
//!
//! ### Configuration
//!
//! [`FakeQueueConfig`] controls the id format, the backoff delay and what
//! happens when jobs sit on a queue without a handler. It can be built in
//! code, read from TOML, or read from `FAKEQUEUE_*` environment variables.

pub mod clock;
pub mod config;
pub mod dispatch;
pub mod error;
pub(crate) mod failure;
pub mod handler;
pub(crate) mod id;
pub mod job;
pub mod queue;
pub mod stats;
pub(crate) mod store;

pub use clock::{Clock, MockClock, SystemClock};
pub use config::{FakeQueueConfig, UnmappedQueuePolicy};
pub use dispatch::{Disposition, HandleOptions};
pub use error::FakeQueueError;
pub use handler::{
    HandlerError, HandlerRegistry, HandlerResult, JobHandler, Outcome, handler_fn,
};
pub use job::{Job, JobId, JobRequest};
pub use queue::FakeJobQueue;
pub use stats::{QueueCounters, QueueStats};

/// Convenient type alias for Results with [`FakeQueueError`] as the error type.
pub type Result<T> = std::result::Result<T, FakeQueueError>;
