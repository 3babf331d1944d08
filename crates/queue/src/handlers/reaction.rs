//! Reaction sends.
//!
//! A reaction is its own message entity with its own ledger, so this is
//! the tracked-send flow with a reaction payload.

use courier_common::AppResult;
use courier_core::delivery::DeliveryPayload;

use crate::handlers::{AttemptContext, HandlerOutcome, send_tracked_message};
use crate::jobs::ReactionPayload;
use crate::runner::QueueDeps;

pub(crate) async fn run(
    deps: &QueueDeps,
    payload: &ReactionPayload,
    attempt: &AttemptContext,
) -> AppResult<HandlerOutcome> {
    send_tracked_message(
        deps,
        &payload.conversation_id,
        &payload.message_id,
        attempt,
        |_message| DeliveryPayload::Reaction {
            emoji: payload.emoji.clone(),
            target_timestamp: payload.target_timestamp,
            remove: payload.remove,
        },
    )
    .await
}
