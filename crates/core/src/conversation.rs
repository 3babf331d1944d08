//! Conversation entity.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::message::{ConversationId, RecipientId};

/// Whether a conversation is one-to-one or a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    /// A one-to-one conversation.
    Direct,
    /// A group conversation.
    Group,
}

/// A conversation and the recipient/trust facts handlers need.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Conversation ID, also the job queue's partition key.
    pub id: ConversationId,
    /// Direct or group.
    pub kind: ConversationKind,
    /// Current member recipients.
    pub recipients: Vec<RecipientId>,
    /// Recipients whose identity key changed and awaits re-verification.
    pub untrusted: HashSet<RecipientId>,
    /// Group state revision. Always 0 for direct conversations.
    pub revision: u64,
    /// Disappearing-message timer for new messages, in seconds.
    pub expire_timer: Option<u32>,
    /// Whether we share our profile key with this conversation.
    pub profile_shared: bool,
}

impl Conversation {
    /// Create a direct conversation with a single recipient.
    #[must_use]
    pub fn direct(id: impl Into<ConversationId>, recipient: impl Into<RecipientId>) -> Self {
        Self {
            id: id.into(),
            kind: ConversationKind::Direct,
            recipients: vec![recipient.into()],
            untrusted: HashSet::new(),
            revision: 0,
            expire_timer: None,
            profile_shared: false,
        }
    }

    /// Create a group conversation.
    #[must_use]
    pub fn group(
        id: impl Into<ConversationId>,
        recipients: impl IntoIterator<Item = RecipientId>,
        revision: u64,
    ) -> Self {
        Self {
            id: id.into(),
            kind: ConversationKind::Group,
            recipients: recipients.into_iter().collect(),
            untrusted: HashSet::new(),
            revision,
            expire_timer: None,
            profile_shared: false,
        }
    }

    /// Whether this recipient is a current member.
    #[must_use]
    pub fn is_member(&self, recipient: &str) -> bool {
        self.recipients.iter().any(|member| member == recipient)
    }

    /// Whether this recipient is blocked on identity re-verification.
    #[must_use]
    pub fn is_untrusted(&self, recipient: &str) -> bool {
        self.untrusted.contains(recipient)
    }

    /// Restrict a recipient list to current members, preserving order.
    #[must_use]
    pub fn retain_members(&self, recipients: &[RecipientId]) -> Vec<RecipientId> {
        recipients
            .iter()
            .filter(|recipient| self.is_member(recipient))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_membership_and_trust() {
        let mut conversation = Conversation::group(
            "g1",
            ["a".to_string(), "b".to_string()],
            7,
        );
        conversation.untrusted.insert("b".to_string());

        assert!(conversation.is_member("a"));
        assert!(!conversation.is_member("z"));
        assert!(conversation.is_untrusted("b"));
        assert!(!conversation.is_untrusted("a"));
    }

    #[test]
    fn test_retain_members_drops_departed_recipients() {
        let conversation = Conversation::group("g1", ["a".to_string(), "b".to_string()], 1);
        let requested = vec!["a".to_string(), "z".to_string()];
        assert_eq!(conversation.retain_members(&requested), vec!["a".to_string()]);
    }
}
