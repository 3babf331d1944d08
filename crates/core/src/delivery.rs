//! Delivery primitive collaborator.
//!
//! The queue treats the encryption/transport layer as an opaque "deliver
//! one plaintext to a set of recipients" primitive behind
//! [`MessageDelivery`]. Errors carry enough shape (an HTTP-like status
//! code, a retry-after hint) for the queue's classifier to derive a retry
//! decision without knowing anything about the wire protocol.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::message::{ConversationId, RecipientId};

/// Status code a server uses to rate-limit a sender.
pub const STATUS_RATE_LIMITED: u16 = 413;

/// Status code a server uses to ask the client to stop retrying entirely.
pub const STATUS_SERVER_STOP: u16 = 508;

/// A classifiable error from one delivery attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SendError {
    /// The server answered with an error status.
    #[error("server responded with {code}: {message}")]
    Http {
        /// HTTP-like status code.
        code: u16,
        /// Server-provided wait before the next attempt, when rate limited.
        retry_after: Option<Duration>,
        /// Diagnostic text.
        message: String,
    },

    /// The recipient's identity key changed; sending needs re-approval.
    #[error("identity key changed for {recipient}")]
    UntrustedIdentity {
        /// The recipient that needs re-verification.
        recipient: RecipientId,
    },

    /// The network layer failed before any server answer.
    #[error("network error: {0}")]
    Network(String),

    /// The send timed out.
    #[error("send timed out")]
    Timeout,
}

impl SendError {
    /// The server's retry-after hint, if this is a rate-limit error.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Http { code, retry_after, .. } if *code == STATUS_RATE_LIMITED => *retry_after,
            _ => None,
        }
    }

    /// Whether the server asked us to stop retrying this job entirely.
    #[must_use]
    pub const fn is_server_stop(&self) -> bool {
        matches!(self, Self::Http { code, .. } if *code == STATUS_SERVER_STOP)
    }

    /// The recipient blocked on re-verification, if this is a trust error.
    #[must_use]
    pub fn untrusted_recipient(&self) -> Option<&RecipientId> {
        match self {
            Self::UntrustedIdentity { recipient } => Some(recipient),
            _ => None,
        }
    }
}

/// The plaintext handed to the delivery primitive, one variant per action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeliveryPayload {
    /// A normal text message.
    Text {
        /// Message body.
        body: String,
        /// Disappearing-message timer to attach, in seconds.
        expire_timer: Option<u32>,
    },
    /// A reaction to a previous message.
    Reaction {
        /// Emoji of the reaction.
        emoji: String,
        /// Timestamp identifying the reacted-to message.
        target_timestamp: DateTime<Utc>,
        /// Whether the reaction is being removed.
        remove: bool,
    },
    /// A delete-for-everyone tombstone.
    DeleteForEveryone {
        /// Timestamp identifying the deleted message.
        target_timestamp: DateTime<Utc>,
    },
    /// A disappearing-message timer update.
    ExpirationTimerUpdate {
        /// New timer value, in seconds. `None` disables the timer.
        expire_timer: Option<u32>,
    },
    /// A group state change.
    GroupUpdate {
        /// Revision the change produces.
        revision: u64,
        /// Opaque serialized group change.
        change: String,
    },
    /// Our profile key.
    ProfileKey,
    /// A story post.
    Story {
        /// Message body or caption.
        body: Option<String>,
        /// Whether recipients may reply.
        allows_replies: bool,
    },
}

/// Per-recipient results of one delivery attempt.
#[derive(Debug, Clone, Default)]
pub struct SendOutcome {
    /// Recipients the server accepted the message for.
    pub sent: Vec<RecipientId>,
    /// Recipients that failed, with the error for each.
    pub failed: Vec<(RecipientId, SendError)>,
}

impl SendOutcome {
    /// An outcome where every recipient succeeded.
    #[must_use]
    pub fn all_sent(recipients: impl IntoIterator<Item = RecipientId>) -> Self {
        Self {
            sent: recipients.into_iter().collect(),
            failed: Vec::new(),
        }
    }

    /// Whether every recipient succeeded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// The errors of the failed subset, in input order.
    #[must_use]
    pub fn errors(&self) -> Vec<SendError> {
        self.failed.iter().map(|(_, error)| error.clone()).collect()
    }
}

/// Delivers one plaintext payload to a set of recipients.
///
/// Implementations own encryption, fan-out to devices, and transport.
/// A `Result::Err` means the attempt failed wholesale before any
/// per-recipient result was produced; partial failure is expressed through
/// [`SendOutcome::failed`].
#[async_trait]
pub trait MessageDelivery: Send + Sync {
    /// Attempt one network send.
    async fn send(
        &self,
        conversation_id: &ConversationId,
        recipients: &[RecipientId],
        payload: &DeliveryPayload,
        timestamp: DateTime<Utc>,
    ) -> Result<SendOutcome, SendError>;
}

/// Wraps a delivery implementation with a per-send deadline.
///
/// A transport that never answers would otherwise hold its conversation
/// lane indefinitely; the deadline turns silence into
/// [`SendError::Timeout`], which retries like any other transient error.
pub struct TimedDelivery {
    inner: Arc<dyn MessageDelivery>,
    timeout: Duration,
}

impl TimedDelivery {
    /// Wrap `inner`, bounding each send by `timeout`.
    #[must_use]
    pub fn new(inner: Arc<dyn MessageDelivery>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl MessageDelivery for TimedDelivery {
    async fn send(
        &self,
        conversation_id: &ConversationId,
        recipients: &[RecipientId],
        payload: &DeliveryPayload,
        timestamp: DateTime<Utc>,
    ) -> Result<SendOutcome, SendError> {
        tokio::time::timeout(
            self.timeout,
            self.inner.send(conversation_id, recipients, payload, timestamp),
        )
        .await
        .map_err(|_| SendError::Timeout)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SilentDelivery;

    #[async_trait]
    impl MessageDelivery for SilentDelivery {
        async fn send(
            &self,
            _conversation_id: &ConversationId,
            _recipients: &[RecipientId],
            _payload: &DeliveryPayload,
            _timestamp: DateTime<Utc>,
        ) -> Result<SendOutcome, SendError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_delivery_converts_silence_into_timeout() {
        let delivery = TimedDelivery::new(Arc::new(SilentDelivery), Duration::from_secs(30));
        let result = delivery
            .send(
                &"conv".to_string(),
                &["a".to_string()],
                &DeliveryPayload::ProfileKey,
                Utc::now(),
            )
            .await;
        assert!(matches!(result, Err(SendError::Timeout)));
    }

    #[test]
    fn test_retry_after_only_for_rate_limits() {
        let rate_limited = SendError::Http {
            code: STATUS_RATE_LIMITED,
            retry_after: Some(Duration::from_secs(30)),
            message: "slow down".into(),
        };
        assert_eq!(rate_limited.retry_after(), Some(Duration::from_secs(30)));

        let server_error = SendError::Http {
            code: 500,
            retry_after: Some(Duration::from_secs(30)),
            message: "oops".into(),
        };
        assert_eq!(server_error.retry_after(), None);
        assert_eq!(SendError::Timeout.retry_after(), None);
    }

    #[test]
    fn test_server_stop_detection() {
        let stop = SendError::Http {
            code: STATUS_SERVER_STOP,
            retry_after: None,
            message: "please stop".into(),
        };
        assert!(stop.is_server_stop());
        assert!(!SendError::Network("reset".into()).is_server_stop());
    }

    #[test]
    fn test_outcome_partitioning() {
        let outcome = SendOutcome {
            sent: vec!["a".into()],
            failed: vec![("b".into(), SendError::Timeout)],
        };
        assert!(!outcome.is_complete());
        assert_eq!(outcome.errors(), vec![SendError::Timeout]);
        assert!(SendOutcome::all_sent(["a".to_string()]).is_complete());
    }
}
