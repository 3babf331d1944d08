//! Group state change sends.

use courier_common::AppResult;
use courier_core::delivery::DeliveryPayload;

use crate::handlers::{AttemptContext, HandlerOutcome, load_conversation, untrusted_subset};
use crate::jobs::GroupUpdatePayload;
use crate::runner::QueueDeps;

pub(crate) async fn run(
    deps: &QueueDeps,
    payload: &GroupUpdatePayload,
    attempt: &AttemptContext,
) -> AppResult<HandlerOutcome> {
    if !attempt.should_continue {
        tracing::warn!(
            conversation_id = %payload.conversation_id,
            "Retry window closed; giving up on group update"
        );
        return Ok(HandlerOutcome::Done);
    }

    let conversation = match load_conversation(deps, &payload.conversation_id).await? {
        Ok(conversation) => conversation,
        Err(outcome) => return Ok(outcome),
    };

    // A newer change has superseded this one; members already received it.
    if conversation.revision > payload.revision {
        tracing::info!(
            conversation_id = %conversation.id,
            job_revision = payload.revision,
            current_revision = conversation.revision,
            "Group update superseded by a newer revision; dropping job"
        );
        return Ok(HandlerOutcome::Done);
    }

    let targets = conversation.retain_members(&payload.recipients);
    if targets.is_empty() {
        return Ok(HandlerOutcome::Done);
    }
    let untrusted = untrusted_subset(&conversation, &targets);
    if !untrusted.is_empty() {
        return Ok(HandlerOutcome::Blocked(untrusted));
    }

    let delivery_payload = DeliveryPayload::GroupUpdate {
        revision: payload.revision,
        change: payload.change.clone().unwrap_or_default(),
    };
    match deps
        .delivery
        .send(&conversation.id, &targets, &delivery_payload, attempt.now)
        .await
    {
        Ok(outcome) if outcome.is_complete() => Ok(HandlerOutcome::Done),
        Ok(outcome) => Ok(HandlerOutcome::Retry(outcome.errors())),
        Err(error) => Ok(HandlerOutcome::Retry(vec![error])),
    }
}
