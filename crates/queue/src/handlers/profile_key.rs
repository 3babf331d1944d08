//! Profile key pushes.
//!
//! Best-effort: uses whichever member list is current when the job runs,
//! and cancels rather than blocks when a member awaits re-verification:
//! pushing a profile key is never worth holding an approval open for.

use courier_common::AppResult;
use courier_core::delivery::DeliveryPayload;

use crate::handlers::{AttemptContext, HandlerOutcome, load_conversation};
use crate::jobs::ProfileKeyPayload;
use crate::runner::QueueDeps;

pub(crate) async fn run(
    deps: &QueueDeps,
    payload: &ProfileKeyPayload,
    attempt: &AttemptContext,
) -> AppResult<HandlerOutcome> {
    if !attempt.should_continue {
        tracing::warn!(
            conversation_id = %payload.conversation_id,
            "Retry window closed; giving up on profile key push"
        );
        return Ok(HandlerOutcome::Done);
    }

    let conversation = match load_conversation(deps, &payload.conversation_id).await? {
        Ok(conversation) => conversation,
        Err(outcome) => return Ok(outcome),
    };

    if !conversation.profile_shared && !payload.is_one_time_send {
        tracing::info!(
            conversation_id = %conversation.id,
            "Profile no longer shared with this conversation; dropping push"
        );
        return Ok(HandlerOutcome::Done);
    }
    if !conversation.untrusted.is_empty() {
        tracing::info!(
            conversation_id = %conversation.id,
            "Member awaits re-verification; canceling profile key push"
        );
        return Ok(HandlerOutcome::Done);
    }

    let recipients = conversation.recipients.clone();
    if recipients.is_empty() {
        return Ok(HandlerOutcome::Done);
    }

    match deps
        .delivery
        .send(
            &conversation.id,
            &recipients,
            &DeliveryPayload::ProfileKey,
            attempt.now,
        )
        .await
    {
        Ok(outcome) if outcome.is_complete() => Ok(HandlerOutcome::Done),
        Ok(outcome) => Ok(HandlerOutcome::Retry(outcome.errors())),
        Err(error) => Ok(HandlerOutcome::Retry(vec![error])),
    }
}
