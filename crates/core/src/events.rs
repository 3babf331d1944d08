//! Approval/UI collaborator.

use async_trait::async_trait;

use crate::message::RecipientId;

/// Notifications the delivery core raises toward the surrounding
/// application (UI layer, approval flows).
///
/// The inverse direction, the application reporting that an approval
/// resolved, is wired to the queue's approval gate, not to this trait.
#[async_trait]
pub trait DeliveryEvents: Send + Sync {
    /// A send is blocked until the listed recipients are re-verified.
    async fn blocked_on_approval(&self, conversation_id: &str, untrusted: &[RecipientId]);

    /// A message was terminally marked failed.
    async fn message_failed(&self, message_id: &str);
}

/// No-op event sink.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEvents;

#[async_trait]
impl DeliveryEvents for NullEvents {
    async fn blocked_on_approval(&self, conversation_id: &str, untrusted: &[RecipientId]) {
        tracing::debug!(
            conversation_id = %conversation_id,
            untrusted_count = untrusted.len(),
            "Dropping blocked-on-approval notification (no event sink)"
        );
    }

    async fn message_failed(&self, message_id: &str) {
        tracing::debug!(message_id = %message_id, "Dropping message-failed notification (no event sink)");
    }
}
