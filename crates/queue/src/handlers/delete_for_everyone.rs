//! Delete-for-everyone tombstone sends.

use std::time::Duration;

use courier_common::{AppError, AppResult};
use courier_core::delivery::DeliveryPayload;
use courier_core::message::RecipientId;

use crate::handlers::{
    AttemptContext, HandlerOutcome, load_conversation, record_untrusted, untrusted_subset,
};
use crate::jobs::DeleteForEveryonePayload;
use crate::runner::QueueDeps;

/// Servers reject delete-for-everyone past this age, so retrying after it
/// is pointless.
const DELETE_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

pub(crate) async fn run(
    deps: &QueueDeps,
    payload: &DeleteForEveryonePayload,
    attempt: &AttemptContext,
) -> AppResult<HandlerOutcome> {
    if !attempt.should_continue {
        tracing::warn!(message_id = %payload.message_id, "Retry window closed; giving up on delete");
        return Ok(HandlerOutcome::Done);
    }

    let age = (attempt.now - payload.target_timestamp)
        .to_std()
        .unwrap_or(Duration::ZERO);
    if age > DELETE_WINDOW {
        return Ok(HandlerOutcome::Fatal(AppError::Delivery(format!(
            "delete-for-everyone window elapsed for message {}",
            payload.message_id
        ))));
    }

    let conversation = match load_conversation(deps, &payload.conversation_id).await? {
        Ok(conversation) => conversation,
        Err(outcome) => return Ok(outcome),
    };

    // The recipient set was fixed at enqueue time; members who have since
    // left still get the tombstone if possible, but trust gating applies.
    let untrusted = untrusted_subset(&conversation, &payload.recipients);
    if !untrusted.is_empty() {
        return Ok(HandlerOutcome::Blocked(untrusted));
    }

    let delivery_payload = DeliveryPayload::DeleteForEveryone {
        target_timestamp: payload.target_timestamp,
    };
    match deps
        .delivery
        .send(
            &conversation.id,
            &payload.recipients,
            &delivery_payload,
            attempt.now,
        )
        .await
    {
        Ok(outcome) => {
            let newly_untrusted: Vec<RecipientId> = outcome
                .failed
                .iter()
                .filter_map(|(_, error)| error.untrusted_recipient().cloned())
                .collect();
            if !newly_untrusted.is_empty() {
                record_untrusted(deps, conversation, &newly_untrusted).await?;
                return Ok(HandlerOutcome::Blocked(newly_untrusted));
            }
            if !outcome.is_complete() {
                return Ok(HandlerOutcome::Retry(outcome.errors()));
            }

            if let Some(mut message) = deps.messages.message(&payload.message_id).await? {
                message.deleted_for_everyone = true;
                deps.messages.save_message(&message).await?;
            }
            Ok(HandlerOutcome::Done)
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
