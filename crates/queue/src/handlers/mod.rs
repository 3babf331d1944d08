//! Per-kind job handlers.
//!
//! Each handler performs one attempt for its kind and reports what
//! happened through [`HandlerOutcome`]; the runner owns the retry loop,
//! backoff, and approval waits. Handlers never sleep and never retry on
//! their own.

mod delete_for_everyone;
mod expiration_timer_update;
mod group_update;
mod normal_message;
mod profile_key;
mod reaction;
mod story;

use chrono::{DateTime, Utc};

use courier_common::{AppError, AppResult};
use courier_core::conversation::Conversation;
use courier_core::delivery::{DeliveryPayload, SendError};
use courier_core::message::{OutboundMessage, RecipientId};

use crate::job::Job;
use crate::jobs::JobPayload;
use crate::runner::QueueDeps;

/// What one attempt produced.
#[derive(Debug)]
pub enum HandlerOutcome {
    /// The job is finished; remove it.
    Done,
    /// The attempt failed with these recipient errors; the runner
    /// classifies them into a retry decision.
    Retry(Vec<SendError>),
    /// Sending is blocked until the listed recipients are re-verified.
    Blocked(Vec<RecipientId>),
    /// The job can never succeed; fail the message and remove the job.
    Fatal(AppError),
}

/// Facts about the current attempt, computed by the runner.
#[derive(Debug, Clone, Copy)]
pub struct AttemptContext {
    /// Whether this is the last attempt allowed.
    pub is_final_attempt: bool,
    /// Whether the retry window is still open. When it is not, handlers
    /// do their failure cleanup and report `Done`.
    pub should_continue: bool,
    /// Wall-clock time of the attempt.
    pub now: DateTime<Utc>,
}

/// Run one attempt of `job` through its kind's handler.
pub async fn dispatch(
    deps: &QueueDeps,
    job: &Job,
    attempt: &AttemptContext,
) -> AppResult<HandlerOutcome> {
    match &job.payload {
        JobPayload::NormalMessage(data) => normal_message::run(deps, data, attempt).await,
        JobPayload::Reaction(data) => reaction::run(deps, data, attempt).await,
        JobPayload::DeleteForEveryone(data) => delete_for_everyone::run(deps, data, attempt).await,
        JobPayload::ExpirationTimerUpdate(data) => {
            expiration_timer_update::run(deps, data, attempt).await
        }
        JobPayload::GroupUpdate(data) => group_update::run(deps, data, attempt).await,
        JobPayload::ProfileKey(data) => profile_key::run(deps, data, attempt).await,
        JobPayload::Story(data) => story::run(deps, data, attempt).await,
    }
}

/// Terminally fail a message: mark unsent recipients failed, persist, and
/// notify the application.
pub(crate) async fn mark_message_failed(
    deps: &QueueDeps,
    message_id: &str,
    now: DateTime<Utc>,
) -> AppResult<()> {
    let Some(mut message) = deps.messages.message(message_id).await? else {
        tracing::warn!(message_id = %message_id, "Cannot mark failed: message is gone");
        return Ok(());
    };
    message.mark_failed(now);
    deps.messages.save_message(&message).await?;
    deps.events.message_failed(message_id).await;
    Ok(())
}

/// Load a conversation, or report the fatal outcome when it is gone.
pub(crate) async fn load_conversation(
    deps: &QueueDeps,
    conversation_id: &str,
) -> AppResult<Result<Conversation, HandlerOutcome>> {
    match deps.conversations.conversation(conversation_id).await? {
        Some(conversation) => Ok(Ok(conversation)),
        None => {
            tracing::error!(conversation_id = %conversation_id, "Conversation is gone; dropping job");
            Ok(Err(HandlerOutcome::Fatal(AppError::ConversationNotFound(
                conversation_id.to_string(),
            ))))
        }
    }
}

/// Members of `recipients` currently blocked on re-verification.
pub(crate) fn untrusted_subset(
    conversation: &Conversation,
    recipients: &[RecipientId],
) -> Vec<RecipientId> {
    recipients
        .iter()
        .filter(|recipient| conversation.is_untrusted(recipient))
        .cloned()
        .collect()
}

/// One attempt of the ledger-tracked send shared by message-bearing
/// kinds (normal messages, reactions, stories).
///
/// Loads the message, narrows to recipients still needing a send, checks
/// trust, performs one delivery attempt, and records the per-recipient
/// results back into the message's ledger.
pub(crate) async fn send_tracked_message<F>(
    deps: &QueueDeps,
    conversation_id: &str,
    message_id: &str,
    attempt: &AttemptContext,
    build_payload: F,
) -> AppResult<HandlerOutcome>
where
    F: FnOnce(&OutboundMessage) -> DeliveryPayload,
{
    let Some(mut message) = deps.messages.message(message_id).await? else {
        tracing::info!(message_id = %message_id, "Message is gone; nothing to send");
        return Ok(HandlerOutcome::Done);
    };
    if message.deleted_for_everyone {
        tracing::info!(message_id = %message_id, "Message was deleted for everyone; nothing to send");
        return Ok(HandlerOutcome::Done);
    }

    if !attempt.should_continue {
        tracing::warn!(message_id = %message_id, "Retry window closed; marking message failed");
        mark_message_failed(deps, message_id, attempt.now).await?;
        return Ok(HandlerOutcome::Done);
    }

    let conversation = match load_conversation(deps, conversation_id).await? {
        Ok(conversation) => conversation,
        Err(outcome) => return Ok(outcome),
    };

    let unsent = message.unsent_recipients();
    if unsent.is_empty() {
        return Ok(HandlerOutcome::Done);
    }

    let untrusted = untrusted_subset(&conversation, &unsent);
    if !untrusted.is_empty() {
        return Ok(HandlerOutcome::Blocked(untrusted));
    }

    let targets = conversation.retain_members(&unsent);
    if targets.is_empty() {
        tracing::warn!(
            message_id = %message_id,
            "All remaining recipients have left the conversation; nothing to send"
        );
        return Ok(HandlerOutcome::Done);
    }

    let payload = build_payload(&message);
    let timestamp = message.timestamp;
    match deps
        .delivery
        .send(&conversation.id, &targets, &payload, timestamp)
        .await
    {
        Ok(outcome) => {
            let failed_ids: Vec<RecipientId> =
                outcome.failed.iter().map(|(id, _)| id.clone()).collect();
            message.record_send_outcome(&outcome.sent, &failed_ids, attempt.now);
            deps.messages.save_message(&message).await?;

            let newly_untrusted: Vec<RecipientId> = outcome
                .failed
                .iter()
                .filter_map(|(_, error)| error.untrusted_recipient().cloned())
                .collect();
            if !newly_untrusted.is_empty() {
                record_untrusted(deps, conversation, &newly_untrusted).await?;
                return Ok(HandlerOutcome::Blocked(newly_untrusted));
            }

            if outcome.is_complete() {
                tracing::info!(message_id = %message_id, "Sent to every remaining recipient");
                Ok(HandlerOutcome::Done)
            } else {
                Ok(HandlerOutcome::Retry(outcome.errors()))
            }
        }
        Err(error) => {
            if let Some(recipient) = error.untrusted_recipient().cloned() {
                record_untrusted(deps, conversation, std::slice::from_ref(&recipient)).await?;
                return Ok(HandlerOutcome::Blocked(vec![recipient]));
            }
            Ok(HandlerOutcome::Retry(vec![error]))
        }
    }
}

/// Persist newly-discovered untrusted recipients on the conversation.
pub(crate) async fn record_untrusted(
    deps: &QueueDeps,
    mut conversation: Conversation,
    recipients: &[RecipientId],
) -> AppResult<()> {
    for recipient in recipients {
        conversation.untrusted.insert(recipient.clone());
    }
    deps.conversations.save_conversation(&conversation).await
}
