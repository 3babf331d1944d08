//! Story post sends.

use courier_common::AppResult;
use courier_core::delivery::DeliveryPayload;

use crate::handlers::{AttemptContext, HandlerOutcome, send_tracked_message};
use crate::jobs::StoryPayload;
use crate::runner::QueueDeps;

pub(crate) async fn run(
    deps: &QueueDeps,
    payload: &StoryPayload,
    attempt: &AttemptContext,
) -> AppResult<HandlerOutcome> {
    send_tracked_message(
        deps,
        &payload.conversation_id,
        &payload.message_id,
        attempt,
        |message| DeliveryPayload::Story {
            body: message.body.clone(),
            allows_replies: payload.allows_replies,
        },
    )
    .await
}
