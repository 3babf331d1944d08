//! Durable, conversation-partitioned job queue for outbound delivery.
//!
//! The queue persists every job before running it, executes jobs for one
//! conversation strictly in enqueue order, retries failures with
//! exponential backoff inside a bounded retry window, honors
//! server-mandated rate-limit waits, and parks jobs whose recipients
//! await identity re-verification until the application resolves the
//! approval.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use courier_core::{MemoryConversationStore, MemoryMessageStore, NullEvents};
//! use courier_queue::{
//!     ConversationJobQueue, JobPayload, MemoryJobStore, ProfileKeyPayload, QueueDeps,
//!     QueueOptions,
//! };
//!
//! # async fn example(delivery: Arc<dyn courier_core::MessageDelivery>) -> courier_common::AppResult<()> {
//! let queue = ConversationJobQueue::new(
//!     QueueDeps {
//!         jobs: Arc::new(MemoryJobStore::new()),
//!         messages: Arc::new(MemoryMessageStore::new()),
//!         conversations: Arc::new(MemoryConversationStore::new()),
//!         delivery,
//!         events: Arc::new(NullEvents),
//!     },
//!     QueueOptions::default(),
//! );
//! queue.resume().await?;
//!
//! queue
//!     .add(JobPayload::ProfileKey(ProfileKeyPayload {
//!         conversation_id: "c1".into(),
//!         is_one_time_send: false,
//!     }))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod classify;
pub mod gate;
pub mod handlers;
pub mod job;
pub mod jobs;
pub mod lanes;
pub mod runner;
pub mod store;

pub use backoff::BackoffConfig;
pub use classify::{Classification, classify_attempt};
pub use gate::ApprovalGate;
pub use handlers::{AttemptContext, HandlerOutcome};
pub use job::{Job, StoredJob};
pub use jobs::{
    DeleteForEveryonePayload, ExpirationTimerUpdatePayload, GroupUpdatePayload, JobPayload,
    NormalMessagePayload, ProfileKeyPayload, ReactionPayload, StoryPayload,
};
pub use lanes::KeyedLanes;
pub use runner::{ConversationJobQueue, QUEUE_TYPE, QueueDeps, QueueOptions};
pub use store::{JobStore, MemoryJobStore, SideEffect};
