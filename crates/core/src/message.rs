//! Outbound message entity.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::send_state::{
    SendAction, SendActionType, SendState, SendStatus, is_failed, is_sent, send_state_reducer,
};

/// Identifier of a recipient (a contact or our own sync device set).
pub type RecipientId = String;

/// Identifier of a message.
pub type MessageId = String;

/// Identifier of a conversation, used as the job queue's partition key.
pub type ConversationId = String;

/// An outgoing message and its per-recipient delivery ledger.
///
/// The send-state map is only ever mutated by the single job currently
/// executing for this message's conversation, so no locking is needed
/// beyond the queue's per-key serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Message ID.
    pub id: MessageId,
    /// Owning conversation.
    pub conversation_id: ConversationId,
    /// Client timestamp of the message, used as the send timestamp.
    pub timestamp: DateTime<Utc>,
    /// Text body, if any.
    pub body: Option<String>,
    /// Disappearing-message timer carried by the message, in seconds.
    pub expire_timer: Option<u32>,
    /// Whether this message has been deleted for everyone.
    pub deleted_for_everyone: bool,
    /// Delivery ledger, one entry per recipient.
    pub send_states: HashMap<RecipientId, SendState>,
}

impl OutboundMessage {
    /// Create a message with a `Pending` entry for every recipient.
    #[must_use]
    pub fn new(
        id: impl Into<MessageId>,
        conversation_id: impl Into<ConversationId>,
        timestamp: DateTime<Utc>,
        recipients: impl IntoIterator<Item = RecipientId>,
    ) -> Self {
        let send_states = recipients
            .into_iter()
            .map(|recipient| (recipient, SendState::pending(Some(timestamp))))
            .collect();
        Self {
            id: id.into(),
            conversation_id: conversation_id.into(),
            timestamp,
            body: None,
            expire_timer: None,
            deleted_for_everyone: false,
            send_states,
        }
    }

    /// Apply one action to one recipient's send state through the reducer.
    ///
    /// Creates a `Pending` entry first if this recipient has none yet.
    pub fn apply(&mut self, recipient: &str, action: SendAction) {
        let entry = self
            .send_states
            .entry(recipient.to_string())
            .or_insert_with(|| SendState::pending(action.updated_at));
        *entry = send_state_reducer(*entry, action);
    }

    /// Record the per-recipient results of one delivery attempt.
    pub fn record_send_outcome<'a, S, F>(&mut self, sent: S, failed: F, now: DateTime<Utc>)
    where
        S: IntoIterator<Item = &'a RecipientId>,
        F: IntoIterator<Item = &'a RecipientId>,
    {
        for recipient in sent {
            self.apply(recipient, SendAction::new(SendActionType::Sent, Some(now)));
        }
        for recipient in failed {
            self.apply(recipient, SendAction::new(SendActionType::Failed, Some(now)));
        }
    }

    /// Mark every recipient that has not reached `Sent` as `Failed`.
    pub fn mark_failed(&mut self, now: DateTime<Utc>) {
        let unsent: Vec<RecipientId> = self.unsent_recipients();
        for recipient in unsent {
            self.apply(
                &recipient,
                SendAction::new(SendActionType::Failed, Some(now)),
            );
        }
    }

    /// Reset failed recipients back to `Pending` for a manual retry.
    ///
    /// Only the previously-failed subset is re-attempted; recipients that
    /// already reached `Sent` or later are untouched.
    pub fn prepare_manual_retry(&mut self, now: DateTime<Utc>) {
        let failed: Vec<RecipientId> = self.failed_recipients();
        for recipient in failed {
            self.apply(
                &recipient,
                SendAction::new(SendActionType::ManuallyRetried, Some(now)),
            );
        }
    }

    /// `true` iff every recipient's status is `Sent` or later.
    #[must_use]
    pub fn did_send_to_everyone(&self) -> bool {
        self.send_states.values().all(|state| is_sent(state.status))
    }

    /// Recipients whose current status is `Failed`.
    #[must_use]
    pub fn failed_recipients(&self) -> Vec<RecipientId> {
        self.send_states
            .iter()
            .filter(|(_, state)| is_failed(state.status))
            .map(|(recipient, _)| recipient.clone())
            .collect()
    }

    /// Recipients that still need a send (`Pending` or `Failed`).
    #[must_use]
    pub fn unsent_recipients(&self) -> Vec<RecipientId> {
        self.send_states
            .iter()
            .filter(|(_, state)| !is_sent(state.status))
            .map(|(recipient, _)| recipient.clone())
            .collect()
    }

    /// Current status for one recipient, if tracked.
    #[must_use]
    pub fn status_of(&self, recipient: &str) -> Option<SendStatus> {
        self.send_states.get(recipient).map(|state| state.status)
    }
}
