//! Normal message sends.

use courier_common::AppResult;
use courier_core::delivery::DeliveryPayload;

use crate::handlers::{AttemptContext, HandlerOutcome, send_tracked_message};
use crate::jobs::NormalMessagePayload;
use crate::runner::QueueDeps;

pub(crate) async fn run(
    deps: &QueueDeps,
    payload: &NormalMessagePayload,
    attempt: &AttemptContext,
) -> AppResult<HandlerOutcome> {
    send_tracked_message(
        deps,
        &payload.conversation_id,
        &payload.message_id,
        attempt,
        |message| DeliveryPayload::Text {
            body: message.body.clone().unwrap_or_default(),
            expire_timer: message.expire_timer,
        },
    )
    .await
}
