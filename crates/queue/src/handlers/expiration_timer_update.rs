//! Disappearing-message timer updates.
//!
//! Direct conversations only: group timers travel inside group state
//! changes, so a timer-update job against a group is a stale enqueue and
//! is dropped.

use courier_common::AppResult;
use courier_core::conversation::ConversationKind;
use courier_core::delivery::DeliveryPayload;

use crate::handlers::{AttemptContext, HandlerOutcome, load_conversation, untrusted_subset};
use crate::jobs::ExpirationTimerUpdatePayload;
use crate::runner::QueueDeps;

pub(crate) async fn run(
    deps: &QueueDeps,
    payload: &ExpirationTimerUpdatePayload,
    attempt: &AttemptContext,
) -> AppResult<HandlerOutcome> {
    if !attempt.should_continue {
        tracing::warn!(
            conversation_id = %payload.conversation_id,
            "Retry window closed; giving up on timer update"
        );
        return Ok(HandlerOutcome::Done);
    }

    let conversation = match load_conversation(deps, &payload.conversation_id).await? {
        Ok(conversation) => conversation,
        Err(outcome) => return Ok(outcome),
    };
    if conversation.kind == ConversationKind::Group {
        tracing::warn!(
            conversation_id = %conversation.id,
            "Timer updates do not apply to groups; dropping job"
        );
        return Ok(HandlerOutcome::Done);
    }

    let untrusted = untrusted_subset(&conversation, &conversation.recipients);
    if !untrusted.is_empty() {
        return Ok(HandlerOutcome::Blocked(untrusted));
    }

    let delivery_payload = DeliveryPayload::ExpirationTimerUpdate {
        expire_timer: payload.expire_timer,
    };
    let recipients = conversation.recipients.clone();
    match deps
        .delivery
        .send(&conversation.id, &recipients, &delivery_payload, attempt.now)
        .await
    {
        Ok(outcome) if outcome.is_complete() => {
            let mut conversation = conversation;
            conversation.expire_timer = payload.expire_timer;
            deps.conversations.save_conversation(&conversation).await?;
            Ok(HandlerOutcome::Done)
        }
        Ok(outcome) => Ok(HandlerOutcome::Retry(outcome.errors())),
        Err(error) => Ok(HandlerOutcome::Retry(vec![error])),
    }
}
