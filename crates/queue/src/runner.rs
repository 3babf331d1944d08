//! The conversation job queue.
//!
//! One logical queue partitioned by conversation: jobs for the same
//! conversation run strictly one at a time in enqueue order, jobs for
//! different conversations run concurrently. Each job advances through an
//! explicit state machine:
//!
//! ```text
//! Evaluating -> AwaitingApproval -> Evaluating ...
//!     |
//!     v
//! Executing -> Retrying -> Evaluating ...
//!     |
//!     v
//!  finished (job removed; terminally failed jobs mark their message)
//! ```
//!
//! The queue owns retry policy (exponential backoff inside a bounded
//! retry window, server-mandated rate-limit waits) and approval gating;
//! handlers own single attempts.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tracing::Instrument;

use courier_common::config::Config;
use courier_common::{AppError, AppResult, IdGenerator};
use courier_core::delivery::{MessageDelivery, TimedDelivery};
use courier_core::events::DeliveryEvents;
use courier_core::store::{ConversationStore, MessageStore};

use crate::backoff::BackoffConfig;
use crate::classify::classify_attempt;
use crate::gate::ApprovalGate;
use crate::handlers::{AttemptContext, HandlerOutcome, dispatch, mark_message_failed};
use crate::job::{Job, StoredJob};
use crate::jobs::JobPayload;
use crate::lanes::KeyedLanes;
use crate::store::{JobStore, SideEffect};

/// Queue-type tag under which jobs are persisted.
pub const QUEUE_TYPE: &str = "conversation";

/// The collaborators a running queue needs.
pub struct QueueDeps {
    /// Durable job store.
    pub jobs: Arc<dyn JobStore>,
    /// Outbound message store.
    pub messages: Arc<dyn MessageStore>,
    /// Conversation store.
    pub conversations: Arc<dyn ConversationStore>,
    /// Delivery primitive.
    pub delivery: Arc<dyn MessageDelivery>,
    /// Application event sink.
    pub events: Arc<dyn DeliveryEvents>,
}

/// Tunables, usually derived from application configuration.
#[derive(Debug, Clone)]
pub struct QueueOptions {
    /// Retry backoff policy.
    pub backoff: BackoffConfig,
    /// Ceiling for a single wait on the approval gate.
    pub approval_wait: Duration,
    /// Deadline for a single network send.
    pub send_timeout: Duration,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl QueueOptions {
    /// Derive options from the application configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            backoff: BackoffConfig::from_queue_config(&config.queue),
            approval_wait: config.queue.approval_wait(),
            send_timeout: config.delivery.send_timeout(),
        }
    }
}

/// Per-job state within the runner.
#[derive(Debug, Clone, Copy)]
enum RunState {
    /// Decide what to do next. `iteration` counts evaluations within the
    /// current attempt; backoff applies only on the first.
    Evaluating { iteration: u32 },
    /// Wait (bounded) for an approval on this job's conversation.
    AwaitingApproval { iteration: u32 },
    /// Run the handler once.
    Executing,
    /// Record a failed attempt, then sleep before the next one. A
    /// server-mandated wait replaces the backoff delay.
    Retrying { server_delay: Option<Duration> },
}

/// The conversation job queue.
pub struct ConversationJobQueue {
    deps: QueueDeps,
    options: QueueOptions,
    max_attempts: u32,
    gate: Arc<ApprovalGate>,
    lanes: Arc<KeyedLanes>,
    ids: IdGenerator,
    in_flight: watch::Sender<usize>,
    shutting_down: watch::Sender<bool>,
}

impl ConversationJobQueue {
    /// Create a queue with its own approval gate and lanes. Call
    /// [`ConversationJobQueue::resume`] afterwards to pick up jobs
    /// persisted by a previous run.
    #[must_use]
    pub fn new(deps: QueueDeps, options: QueueOptions) -> Arc<Self> {
        Self::with_services(
            deps,
            options,
            ApprovalGate::shared(),
            Arc::new(KeyedLanes::new()),
        )
    }

    /// Create a queue around caller-provided gate and lane services, for
    /// applications that share them with other subsystems.
    #[must_use]
    pub fn with_services(
        mut deps: QueueDeps,
        options: QueueOptions,
        gate: Arc<ApprovalGate>,
        lanes: Arc<KeyedLanes>,
    ) -> Arc<Self> {
        deps.delivery = Arc::new(TimedDelivery::new(deps.delivery, options.send_timeout));
        let max_attempts = options.backoff.max_attempts();
        let (in_flight, _) = watch::channel(0usize);
        let (shutting_down, _) = watch::channel(false);
        Arc::new(Self {
            deps,
            options,
            max_attempts,
            gate,
            lanes,
            ids: IdGenerator::new(),
            in_flight,
            shutting_down,
        })
    }

    /// The approval gate; the application resolves approvals through it.
    #[must_use]
    pub fn approval_gate(&self) -> Arc<ApprovalGate> {
        Arc::clone(&self.gate)
    }

    /// Report that the approval for `conversation_id` resolved.
    pub async fn resolve_approval(&self, conversation_id: &str) {
        self.gate.resolve(conversation_id).await;
    }

    /// Validate, persist, and start a job. Returns the job ID.
    ///
    /// Fails once shutdown has begun; a job accepted then would neither
    /// run nor be resumed cleanly.
    pub async fn add(self: &Arc<Self>, payload: JobPayload) -> AppResult<String> {
        self.check_accepting()?;
        payload.validate()?;
        let stored = self.stored_job(&payload)?;
        self.deps.jobs.insert(&stored).await?;
        let id = stored.id.clone();
        self.spawn(stored);
        Ok(id)
    }

    /// Like [`ConversationJobQueue::add`], committing `side_effect` in the
    /// same transaction as the job insert. Used to persist the message
    /// being sent together with the job that will send it.
    pub async fn add_with(
        self: &Arc<Self>,
        payload: JobPayload,
        side_effect: SideEffect<'_>,
    ) -> AppResult<String> {
        self.check_accepting()?;
        payload.validate()?;
        let stored = self.stored_job(&payload)?;
        self.deps.jobs.insert_atomic(&stored, side_effect).await?;
        let id = stored.id.clone();
        self.spawn(stored);
        Ok(id)
    }

    /// Restart every persisted job from a previous run. Returns how many
    /// jobs were started.
    pub async fn resume(self: &Arc<Self>) -> AppResult<usize> {
        let pending = self.deps.jobs.list_pending(QUEUE_TYPE).await?;
        let count = pending.len();
        if count > 0 {
            tracing::info!(count, "Resuming persisted jobs");
        }
        for stored in pending {
            self.spawn(stored);
        }
        Ok(count)
    }

    /// Wait until no job is running or sleeping. Test and shutdown hook.
    pub async fn idle(&self) {
        let mut in_flight = self.in_flight.subscribe();
        let _ = in_flight.wait_for(|count| *count == 0).await;
    }

    /// Cooperative shutdown: stop in-flight jobs at their next state
    /// transition and wait for them to wind down. Persisted jobs are
    /// untouched; `resume` picks them up next run.
    pub async fn shutdown(&self) {
        tracing::info!("Queue shutting down");
        self.shutting_down.send_replace(true);
        self.gate.reject_all().await;
        self.idle().await;
    }

    fn is_shutting_down(&self) -> bool {
        *self.shutting_down.borrow()
    }

    fn check_accepting(&self) -> AppResult<()> {
        if self.is_shutting_down() {
            return Err(AppError::Queue("queue is shutting down".into()));
        }
        Ok(())
    }

    /// Sleep `delay`, returning early if shutdown starts.
    async fn interruptible_sleep(&self, delay: Duration) {
        let mut shutting_down = self.shutting_down.subscribe();
        tokio::select! {
            () = sleep(delay) => {}
            _ = shutting_down.wait_for(|stop| *stop) => {}
        }
    }

    fn stored_job(&self, payload: &JobPayload) -> AppResult<StoredJob> {
        Ok(StoredJob {
            id: self.ids.generate(),
            queue_type: QUEUE_TYPE.to_string(),
            payload: serde_json::to_value(payload)?,
            enqueued_at: Utc::now(),
            attempts: 0,
            max_attempts: self.max_attempts,
        })
    }

    fn spawn(self: &Arc<Self>, stored: StoredJob) {
        self.in_flight.send_modify(|count| *count += 1);
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            queue.run_stored(stored).await;
            queue.in_flight.send_modify(|count| *count -= 1);
        });
    }

    async fn run_stored(&self, stored: StoredJob) {
        let job = match stored.parse() {
            Ok(job) => job,
            Err(error) => {
                tracing::error!(
                    job_id = %stored.id,
                    code = error.error_code(),
                    error = %error,
                    "Discarding job with malformed payload"
                );
                self.remove_job(&stored.id).await;
                return;
            }
        };

        let key = job.payload.conversation_id().to_string();
        let span = tracing::info_span!(
            "job",
            job_id = %job.id,
            kind = job.payload.kind(),
            conversation_id = %key,
        );
        async {
            let _lane = self.lanes.acquire(&key).await;
            self.run_job(job, &key).await;
        }
        .instrument(span)
        .await;
    }

    async fn run_job(&self, mut job: Job, key: &str) {
        let mut state = RunState::Evaluating { iteration: 1 };
        loop {
            if self.is_shutting_down() {
                tracing::info!("Shutdown; leaving job persisted for the next run");
                return;
            }
            state = match state {
                RunState::Evaluating { iteration } => {
                    if iteration == 1 && job.attempts > 0 {
                        let delay = self.options.backoff.delay_for_attempt(job.attempts + 1);
                        if !delay.is_zero() {
                            tracing::debug!(delay_secs = delay.as_secs(), "Backing off");
                            self.interruptible_sleep(delay).await;
                        }
                    }
                    // Wait for a pending approval at most once per attempt;
                    // after that the attempt proceeds and the handler
                    // reports Blocked again, which is what bounds the loop.
                    if iteration == 1 && self.gate.is_pending(key).await {
                        RunState::AwaitingApproval { iteration }
                    } else {
                        RunState::Executing
                    }
                }

                RunState::AwaitingApproval { iteration } => {
                    tracing::info!("Waiting for approval");
                    if timeout(self.options.approval_wait, self.gate.wait(key))
                        .await
                        .is_err()
                    {
                        tracing::info!("Approval wait timed out; re-evaluating");
                    }
                    RunState::Evaluating {
                        iteration: iteration + 1,
                    }
                }

                RunState::Executing => {
                    let now = Utc::now();
                    let time_remaining =
                        self.options.backoff.time_remaining(job.enqueued_at, now);
                    let attempt = AttemptContext {
                        is_final_attempt: job.is_final_attempt(),
                        should_continue: !time_remaining.is_zero(),
                        now,
                    };
                    tracing::info!(
                        attempt = job.attempts + 1,
                        max_attempts = job.max_attempts,
                        "Running attempt"
                    );

                    match dispatch(&self.deps, &job, &attempt).await {
                        Ok(HandlerOutcome::Done) => {
                            tracing::info!("Job complete");
                            self.remove_job(&job.id).await;
                            return;
                        }
                        Ok(HandlerOutcome::Fatal(error)) => {
                            tracing::error!(
                                code = error.error_code(),
                                "Handler reported a non-retryable error"
                            );
                            self.fail_job(&job, &error.to_string()).await;
                            return;
                        }
                        Ok(HandlerOutcome::Blocked(untrusted)) => {
                            tracing::info!(
                                untrusted_count = untrusted.len(),
                                "Blocked on recipient re-verification"
                            );
                            self.deps.events.blocked_on_approval(key, &untrusted).await;
                            self.gate.require(key).await;
                            job.attempts += 1;
                            self.persist_attempts(&job).await;
                            if job.attempts >= job.max_attempts {
                                self.fail_job(&job, "attempts exhausted while blocked").await;
                                return;
                            }
                            RunState::AwaitingApproval { iteration: 1 }
                        }
                        Ok(HandlerOutcome::Retry(errors)) => {
                            let decision = classify_attempt(
                                &errors,
                                attempt.is_final_attempt || !attempt.should_continue,
                            );
                            if decision.is_terminal {
                                self.fail_job(&job, &decision.representative.to_string())
                                    .await;
                                return;
                            }
                            RunState::Retrying {
                                server_delay: decision.retry_after,
                            }
                        }
                        Err(error) if error.is_fatal() => {
                            tracing::error!(
                                code = error.error_code(),
                                "Attempt failed fatally"
                            );
                            self.fail_job(&job, &error.to_string()).await;
                            return;
                        }
                        Err(error) => {
                            tracing::warn!(error = %error, "Attempt failed internally");
                            if job.is_final_attempt() {
                                self.fail_job(&job, &error.to_string()).await;
                                return;
                            }
                            RunState::Retrying { server_delay: None }
                        }
                    }
                }

                RunState::Retrying { server_delay } => {
                    job.attempts += 1;
                    self.persist_attempts(&job).await;
                    match server_delay {
                        Some(delay) => {
                            tracing::info!(
                                delay_secs = delay.as_secs(),
                                "Honoring server-mandated wait"
                            );
                            self.interruptible_sleep(delay).await;
                            // The server wait replaces the backoff delay.
                            RunState::Evaluating { iteration: 2 }
                        }
                        None => RunState::Evaluating { iteration: 1 },
                    }
                }
            };
        }
    }

    /// Terminal failure: mark the message failed (when the job carries
    /// one), then drop the job.
    async fn fail_job(&self, job: &Job, reason: &str) {
        tracing::error!(reason = %reason, "Job failed terminally");
        if let Some(message_id) = job.payload.message_id() {
            if let Err(error) = mark_message_failed(&self.deps, message_id, Utc::now()).await {
                tracing::error!(
                    message_id = %message_id,
                    error = %error,
                    "Failed to mark message failed"
                );
            }
        }
        self.remove_job(&job.id).await;
    }

    async fn persist_attempts(&self, job: &Job) {
        if let Err(error) = self.deps.jobs.update_attempts(&job.id, job.attempts).await {
            tracing::error!(error = %error, "Failed to persist attempt count");
        }
    }

    async fn remove_job(&self, id: &str) {
        if let Err(error) = self.deps.jobs.remove(id).await {
            tracing::error!(job_id = %id, error = %error, "Failed to remove job");
        }
    }
}
