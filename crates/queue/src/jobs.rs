//! Job payload definitions.
//!
//! One variant per outbound action. The union is closed: adding a kind
//! means adding a variant here, a handler in `handlers/`, and a dispatch
//! arm; the compiler enforces the last one.
//!
//! Payloads are persisted as JSON and validated again at read time;
//! a payload that fails to parse or validate is a fatal, non-retryable
//! error and the job is discarded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use courier_common::{AppError, AppResult};
use courier_core::message::{ConversationId, MessageId, RecipientId};

/// Payload for a normal message send.
///
/// Recipients are baked into the message's own send-state ledger, so the
/// payload only needs to point at the message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct NormalMessagePayload {
    /// Owning conversation.
    #[validate(length(min = 1))]
    pub conversation_id: ConversationId,
    /// The message to send.
    #[validate(length(min = 1))]
    pub message_id: MessageId,
    /// Group revision the send is valid for, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<u64>,
    /// Set when this send carries an edit of an earlier message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_message_timestamp: Option<DateTime<Utc>>,
}

/// Payload for a reaction send. Same shape as a normal message: the
/// reaction is itself a message entity with its own ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ReactionPayload {
    /// Owning conversation.
    #[validate(length(min = 1))]
    pub conversation_id: ConversationId,
    /// The reaction message to send.
    #[validate(length(min = 1))]
    pub message_id: MessageId,
    /// Emoji of the reaction.
    #[validate(length(min = 1))]
    pub emoji: String,
    /// Timestamp identifying the reacted-to message.
    pub target_timestamp: DateTime<Utc>,
    /// Whether the reaction is being removed.
    #[serde(default)]
    pub remove: bool,
}

/// Payload for a delete-for-everyone send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct DeleteForEveryonePayload {
    /// Owning conversation.
    #[validate(length(min = 1))]
    pub conversation_id: ConversationId,
    /// The locally-deleted message.
    #[validate(length(min = 1))]
    pub message_id: MessageId,
    /// Recipients the tombstone must reach.
    #[validate(length(min = 1))]
    pub recipients: Vec<RecipientId>,
    /// Timestamp identifying the deleted message.
    pub target_timestamp: DateTime<Utc>,
}

/// Payload for a disappearing-message timer update.
///
/// No recipients or revision: this job is for direct conversations only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ExpirationTimerUpdatePayload {
    /// Owning conversation.
    #[validate(length(min = 1))]
    pub conversation_id: ConversationId,
    /// New timer value, in seconds. `None` disables the timer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire_timer: Option<u32>,
}

/// Payload for a group-metadata change send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct GroupUpdatePayload {
    /// Owning conversation.
    #[validate(length(min = 1))]
    pub conversation_id: ConversationId,
    /// Members the change must reach.
    #[validate(length(min = 1))]
    pub recipients: Vec<RecipientId>,
    /// Revision the change produces.
    pub revision: u64,
    /// Opaque serialized group change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change: Option<String>,
}

/// Payload for a profile-key push.
///
/// Uses whichever recipient list is current when the job runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ProfileKeyPayload {
    /// Owning conversation.
    #[validate(length(min = 1))]
    pub conversation_id: ConversationId,
    /// One-off share that must not add the conversation to contacts.
    #[serde(default)]
    pub is_one_time_send: bool,
}

/// Payload for a story post send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct StoryPayload {
    /// Owning conversation (the distribution list).
    #[validate(length(min = 1))]
    pub conversation_id: ConversationId,
    /// The story message to send.
    #[validate(length(min = 1))]
    pub message_id: MessageId,
    /// Client timestamp of the story.
    pub timestamp: DateTime<Utc>,
    /// Whether recipients may reply.
    #[serde(default)]
    pub allows_replies: bool,
}

/// The closed union of job payloads, tagged by kind.
///
/// Generally we only want to add to this list; renaming or removing a
/// kind needs a migration of persisted jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobPayload {
    /// Send a normal message.
    NormalMessage(NormalMessagePayload),
    /// Send a reaction.
    Reaction(ReactionPayload),
    /// Send a delete-for-everyone tombstone.
    DeleteForEveryone(DeleteForEveryonePayload),
    /// Send a timer update (direct conversations only).
    ExpirationTimerUpdate(ExpirationTimerUpdatePayload),
    /// Send a group state change.
    GroupUpdate(GroupUpdatePayload),
    /// Push our profile key.
    ProfileKey(ProfileKeyPayload),
    /// Send a story post.
    Story(StoryPayload),
}

impl JobPayload {
    /// The kind tag, for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NormalMessage(_) => "normal_message",
            Self::Reaction(_) => "reaction",
            Self::DeleteForEveryone(_) => "delete_for_everyone",
            Self::ExpirationTimerUpdate(_) => "expiration_timer_update",
            Self::GroupUpdate(_) => "group_update",
            Self::ProfileKey(_) => "profile_key",
            Self::Story(_) => "story",
        }
    }

    /// The partition key: the owning conversation.
    #[must_use]
    pub fn conversation_id(&self) -> &str {
        match self {
            Self::NormalMessage(data) => &data.conversation_id,
            Self::Reaction(data) => &data.conversation_id,
            Self::DeleteForEveryone(data) => &data.conversation_id,
            Self::ExpirationTimerUpdate(data) => &data.conversation_id,
            Self::GroupUpdate(data) => &data.conversation_id,
            Self::ProfileKey(data) => &data.conversation_id,
            Self::Story(data) => &data.conversation_id,
        }
    }

    /// The message this job pertains to, for kinds that carry one.
    #[must_use]
    pub fn message_id(&self) -> Option<&str> {
        match self {
            Self::NormalMessage(data) => Some(&data.message_id),
            Self::Reaction(data) => Some(&data.message_id),
            Self::DeleteForEveryone(data) => Some(&data.message_id),
            Self::Story(data) => Some(&data.message_id),
            Self::ExpirationTimerUpdate(_) | Self::GroupUpdate(_) | Self::ProfileKey(_) => None,
        }
    }

    /// Validate the kind-specific schema constraints.
    pub fn validate(&self) -> AppResult<()> {
        let result = match self {
            Self::NormalMessage(data) => data.validate(),
            Self::Reaction(data) => data.validate(),
            Self::DeleteForEveryone(data) => data.validate(),
            Self::ExpirationTimerUpdate(data) => data.validate(),
            Self::GroupUpdate(data) => data.validate(),
            Self::ProfileKey(data) => data.validate(),
            Self::Story(data) => data.validate(),
        };
        result.map_err(AppError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_roundtrips_through_tagged_json() {
        let payload = JobPayload::NormalMessage(NormalMessagePayload {
            conversation_id: "c1".into(),
            message_id: "m1".into(),
            revision: Some(3),
            edited_message_timestamp: None,
        });

        let json = serde_json::to_value(&payload).expect("serialize");
        assert_eq!(json["kind"], "normal_message");
        assert_eq!(json["conversation_id"], "c1");

        let back: JobPayload = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, payload);
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let json = serde_json::json!({
            "kind": "carrier_pigeon",
            "conversation_id": "c1",
        });
        assert!(serde_json::from_value::<JobPayload>(json).is_err());
    }

    #[test]
    fn test_empty_recipient_list_fails_validation() {
        let payload = JobPayload::DeleteForEveryone(DeleteForEveryonePayload {
            conversation_id: "c1".into(),
            message_id: "m1".into(),
            recipients: vec![],
            target_timestamp: Utc::now(),
        });
        let err = payload.validate().expect_err("must fail");
        assert!(err.is_fatal());
    }

    #[test]
    fn test_partition_key_and_message_id() {
        let payload = JobPayload::ExpirationTimerUpdate(ExpirationTimerUpdatePayload {
            conversation_id: "c9".into(),
            expire_timer: Some(3600),
        });
        assert_eq!(payload.conversation_id(), "c9");
        assert_eq!(payload.kind(), "expiration_timer_update");
        assert!(payload.message_id().is_none());
    }
}
