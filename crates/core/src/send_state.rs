//! Per-recipient delivery status ledger.
//!
//! Every outgoing message tracks one [`SendState`] per recipient. States
//! only ever move forward through the status lattice; receipts that arrive
//! late, duplicated, or out of order cannot lower a status. This makes the
//! reducer idempotent and commutative with respect to receipt replays.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Delivery status for one (message, recipient) pair.
///
/// Variant order defines the status lattice: `Failed < Pending < Sent <
/// Delivered < Read < Viewed`. `Failed` sorts below `Pending` so that any
/// successful signal outranks a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendStatus {
    /// The send failed and has not been confirmed by any receipt.
    Failed,
    /// No send has been attempted, or a retry is scheduled.
    Pending,
    /// The server accepted the message for this recipient.
    Sent,
    /// A delivery receipt arrived.
    Delivered,
    /// A read receipt arrived.
    Read,
    /// A viewed receipt arrived.
    Viewed,
}

/// Returns the higher of two statuses in the lattice.
#[must_use]
pub fn max_status(a: SendStatus, b: SendStatus) -> SendStatus {
    a.max(b)
}

/// `true` for `Sent` and everything above it.
#[must_use]
pub fn is_sent(status: SendStatus) -> bool {
    status >= SendStatus::Sent
}

/// `true` for `Delivered` and everything above it.
#[must_use]
pub fn is_delivered(status: SendStatus) -> bool {
    status >= SendStatus::Delivered
}

/// `true` for `Read` and `Viewed`.
#[must_use]
pub fn is_read(status: SendStatus) -> bool {
    status >= SendStatus::Read
}

/// `true` only for `Viewed`.
#[must_use]
pub fn is_viewed(status: SendStatus) -> bool {
    status == SendStatus::Viewed
}

/// `true` only for `Failed`.
#[must_use]
pub fn is_failed(status: SendStatus) -> bool {
    status == SendStatus::Failed
}

/// Send state for one recipient: the status plus when it last changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendState {
    /// Current status in the lattice.
    pub status: SendStatus,
    /// When the status last moved forward. `None` for states migrated from
    /// ledgers that predate timestamps.
    pub updated_at: Option<DateTime<Utc>>,
}

impl SendState {
    /// A fresh `Pending` entry, created when a send is first attempted.
    #[must_use]
    pub const fn pending(updated_at: Option<DateTime<Utc>>) -> Self {
        Self {
            status: SendStatus::Pending,
            updated_at,
        }
    }
}

/// What kind of event is being applied to a send state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendActionType {
    /// The server accepted the message for this recipient.
    Sent,
    /// The attempt failed for this recipient.
    Failed,
    /// The user asked to retry a failed recipient.
    ManuallyRetried,
    /// A delivery receipt arrived.
    GotDeliveryReceipt,
    /// A read receipt arrived.
    GotReadReceipt,
    /// A viewed receipt arrived.
    GotViewedReceipt,
}

/// An event applied to a send state through [`send_state_reducer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendAction {
    /// The event kind.
    pub kind: SendActionType,
    /// When the event happened.
    pub updated_at: Option<DateTime<Utc>>,
}

impl SendAction {
    /// Convenience constructor.
    #[must_use]
    pub const fn new(kind: SendActionType, updated_at: Option<DateTime<Utc>>) -> Self {
        Self { kind, updated_at }
    }
}

/// Pure reducer for send states.
///
/// The action's `updated_at` is kept only when the status actually moves
/// forward; stale or replayed events leave the state untouched.
#[must_use]
pub fn send_state_reducer(state: SendState, action: SendAction) -> SendState {
    let next_status = match action.kind {
        SendActionType::Sent => {
            if state.status < SendStatus::Sent {
                SendStatus::Sent
            } else {
                state.status
            }
        }
        // A failure can land on `Pending` or `Sent`, but a confirmed
        // delivery is never retroactively un-confirmed, and a stale failure
        // never overwrites a newer `Sent`.
        SendActionType::Failed => match state.status {
            SendStatus::Pending => SendStatus::Failed,
            SendStatus::Sent => {
                let stale = match (action.updated_at, state.updated_at) {
                    (Some(action_at), Some(state_at)) => action_at < state_at,
                    (None, Some(_)) => true,
                    _ => false,
                };
                if stale {
                    SendStatus::Sent
                } else {
                    SendStatus::Failed
                }
            }
            other => other,
        },
        SendActionType::ManuallyRetried => {
            if state.status == SendStatus::Failed {
                SendStatus::Pending
            } else {
                state.status
            }
        }
        SendActionType::GotDeliveryReceipt => max_status(state.status, SendStatus::Delivered),
        SendActionType::GotReadReceipt => max_status(state.status, SendStatus::Read),
        SendActionType::GotViewedReceipt => max_status(state.status, SendStatus::Viewed),
    };

    if next_status == state.status {
        state
    } else {
        SendState {
            status: next_status,
            updated_at: action.updated_at,
        }
    }
}

/// `true` if any send state in the map satisfies the predicate.
pub fn some_send_status<K, F>(
    send_states: &std::collections::HashMap<K, SendState>,
    predicate: F,
) -> bool
where
    K: std::hash::Hash + Eq,
    F: Fn(SendStatus) -> bool,
{
    send_states.values().any(|state| predicate(state.status))
}

/// `true` if any send state other than our own satisfies the predicate.
pub fn some_recipient_send_status<F>(
    send_states: &std::collections::HashMap<String, SendState>,
    our_id: Option<&str>,
    predicate: F,
) -> bool
where
    F: Fn(SendStatus) -> bool,
{
    send_states
        .iter()
        .filter(|(recipient, _)| Some(recipient.as_str()) != our_id)
        .any(|(_, state)| predicate(state.status))
}

/// The highest successful status any recipient (other than us) has reached.
///
/// Returns `Pending` for an empty ledger.
#[must_use]
pub fn highest_successful_recipient_status(
    send_states: &std::collections::HashMap<String, SendState>,
    our_id: &str,
) -> SendStatus {
    send_states
        .iter()
        .filter(|(recipient, _)| recipient.as_str() != our_id)
        .map(|(_, state)| state.status)
        .filter(|status| !is_failed(*status))
        .fold(SendStatus::Pending, max_status)
}

/// `true` if the only entry in the ledger is our own sync copy.
#[must_use]
pub fn is_message_just_for_me(
    send_states: &std::collections::HashMap<String, SendState>,
    our_id: Option<&str>,
) -> bool {
    match our_id {
        Some(our_id) => send_states.len() == 1 && send_states.contains_key(our_id),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn at(ts: i64) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp(ts, 0)
    }

    fn assert_transition(start: SendStatus, kind: SendActionType, expected: SendStatus) {
        let state = SendState {
            status: start,
            updated_at: at(1),
        };
        let result = send_state_reducer(state, SendAction::new(kind, at(2)));
        assert_eq!(result.status, expected, "{start:?} + {kind:?}");
        // The timestamp advances only when the status moves.
        let expected_at = if start == expected { at(1) } else { at(2) };
        assert_eq!(result.updated_at, expected_at, "{start:?} + {kind:?}");
    }

    #[test]
    fn test_status_lattice_order() {
        let expected = [
            SendStatus::Failed,
            SendStatus::Pending,
            SendStatus::Sent,
            SendStatus::Delivered,
            SendStatus::Read,
            SendStatus::Viewed,
        ];
        for pair in expected.windows(2) {
            assert!(pair[0] < pair[1]);
            assert_eq!(max_status(pair[0], pair[1]), pair[1]);
            assert_eq!(max_status(pair[1], pair[0]), pair[1]);
        }
    }

    #[test]
    fn test_predicates() {
        assert!(is_sent(SendStatus::Sent));
        assert!(is_sent(SendStatus::Viewed));
        assert!(!is_sent(SendStatus::Pending));
        assert!(!is_sent(SendStatus::Failed));

        assert!(is_delivered(SendStatus::Delivered));
        assert!(is_delivered(SendStatus::Read));
        assert!(!is_delivered(SendStatus::Sent));

        assert!(is_read(SendStatus::Viewed));
        assert!(!is_read(SendStatus::Delivered));

        assert!(is_viewed(SendStatus::Viewed));
        assert!(!is_viewed(SendStatus::Read));

        assert!(is_failed(SendStatus::Failed));
        assert!(!is_failed(SendStatus::Pending));
    }

    #[test]
    fn test_transitions_from_pending() {
        assert_transition(SendStatus::Pending, SendActionType::Failed, SendStatus::Failed);
        assert_transition(
            SendStatus::Pending,
            SendActionType::ManuallyRetried,
            SendStatus::Pending,
        );
        assert_transition(SendStatus::Pending, SendActionType::Sent, SendStatus::Sent);
        assert_transition(
            SendStatus::Pending,
            SendActionType::GotDeliveryReceipt,
            SendStatus::Delivered,
        );
        assert_transition(
            SendStatus::Pending,
            SendActionType::GotReadReceipt,
            SendStatus::Read,
        );
        assert_transition(
            SendStatus::Pending,
            SendActionType::GotViewedReceipt,
            SendStatus::Viewed,
        );
    }

    #[test]
    fn test_transitions_from_failed() {
        // A repeated failure keeps the original timestamp.
        assert_transition(SendStatus::Failed, SendActionType::Failed, SendStatus::Failed);
        assert_transition(
            SendStatus::Failed,
            SendActionType::ManuallyRetried,
            SendStatus::Pending,
        );
        assert_transition(SendStatus::Failed, SendActionType::Sent, SendStatus::Sent);
        assert_transition(
            SendStatus::Failed,
            SendActionType::GotDeliveryReceipt,
            SendStatus::Delivered,
        );
        assert_transition(
            SendStatus::Failed,
            SendActionType::GotViewedReceipt,
            SendStatus::Viewed,
        );
    }

    #[test]
    fn test_transitions_from_sent() {
        // A fresher failure can undo `Sent` (the server may accept a
        // message and later reject the recipient), but a stale one cannot.
        assert_transition(SendStatus::Sent, SendActionType::Failed, SendStatus::Failed);
        let sent = SendState {
            status: SendStatus::Sent,
            updated_at: at(10),
        };
        let stale_failure = send_state_reducer(
            sent,
            SendAction::new(SendActionType::Failed, at(3)),
        );
        assert_eq!(stale_failure, sent);
        let undated_failure = send_state_reducer(
            sent,
            SendAction::new(SendActionType::Failed, None),
        );
        assert_eq!(undated_failure, sent);

        assert_transition(
            SendStatus::Sent,
            SendActionType::ManuallyRetried,
            SendStatus::Sent,
        );
        assert_transition(SendStatus::Sent, SendActionType::Sent, SendStatus::Sent);
        assert_transition(
            SendStatus::Sent,
            SendActionType::GotDeliveryReceipt,
            SendStatus::Delivered,
        );
        assert_transition(SendStatus::Sent, SendActionType::GotReadReceipt, SendStatus::Read);
    }

    #[test]
    fn test_transitions_from_delivered_and_read() {
        assert_transition(
            SendStatus::Delivered,
            SendActionType::Sent,
            SendStatus::Delivered,
        );
        assert_transition(
            SendStatus::Delivered,
            SendActionType::GotDeliveryReceipt,
            SendStatus::Delivered,
        );
        assert_transition(
            SendStatus::Delivered,
            SendActionType::GotReadReceipt,
            SendStatus::Read,
        );
        assert_transition(
            SendStatus::Read,
            SendActionType::GotDeliveryReceipt,
            SendStatus::Read,
        );
        assert_transition(
            SendStatus::Read,
            SendActionType::GotViewedReceipt,
            SendStatus::Viewed,
        );
    }

    #[test]
    fn test_viewed_ignores_everything() {
        for kind in [
            SendActionType::Sent,
            SendActionType::Failed,
            SendActionType::ManuallyRetried,
            SendActionType::GotDeliveryReceipt,
            SendActionType::GotReadReceipt,
            SendActionType::GotViewedReceipt,
        ] {
            assert_transition(SendStatus::Viewed, kind, SendStatus::Viewed);
        }
    }

    #[test]
    fn test_receipts_commute() {
        // Every ordering of the same receipt set lands on the same status.
        let receipts = [
            SendActionType::GotDeliveryReceipt,
            SendActionType::GotReadReceipt,
            SendActionType::GotViewedReceipt,
        ];
        let orderings: [[usize; 3]; 6] = [
            [0, 1, 2],
            [0, 2, 1],
            [1, 0, 2],
            [1, 2, 0],
            [2, 0, 1],
            [2, 1, 0],
        ];
        for ordering in orderings {
            let mut state = SendState {
                status: SendStatus::Sent,
                updated_at: at(1),
            };
            for (step, index) in ordering.into_iter().enumerate() {
                let ts = at(10 + step as i64);
                state = send_state_reducer(state, SendAction::new(receipts[index], ts));
            }
            assert_eq!(state.status, SendStatus::Viewed, "ordering {ordering:?}");
        }
    }

    #[test]
    fn test_replayed_receipt_is_idempotent() {
        let mut state = SendState {
            status: SendStatus::Sent,
            updated_at: at(1),
        };
        state = send_state_reducer(
            state,
            SendAction::new(SendActionType::GotReadReceipt, at(5)),
        );
        let replay = send_state_reducer(
            state,
            SendAction::new(SendActionType::GotReadReceipt, at(9)),
        );
        assert_eq!(replay, state);
        assert_eq!(replay.updated_at, at(5));
    }

    #[test]
    fn test_action_without_timestamp() {
        let state = SendState {
            status: SendStatus::Pending,
            updated_at: at(1),
        };
        let result = send_state_reducer(state, SendAction::new(SendActionType::Sent, None));
        assert_eq!(result.status, SendStatus::Sent);
        assert!(result.updated_at.is_none());
    }

    #[test]
    fn test_some_recipient_send_status_excludes_us() {
        let mut send_states = HashMap::new();
        send_states.insert(
            "us".to_string(),
            SendState {
                status: SendStatus::Read,
                updated_at: at(1),
            },
        );
        send_states.insert(
            "them".to_string(),
            SendState {
                status: SendStatus::Sent,
                updated_at: at(1),
            },
        );

        assert!(!some_recipient_send_status(&send_states, Some("us"), is_read));
        assert!(some_recipient_send_status(&send_states, Some("us"), is_sent));
        assert!(some_send_status(&send_states, is_read));
    }

    #[test]
    fn test_highest_successful_recipient_status() {
        let mut send_states = HashMap::new();
        assert_eq!(
            highest_successful_recipient_status(&send_states, "us"),
            SendStatus::Pending
        );

        send_states.insert(
            "us".to_string(),
            SendState {
                status: SendStatus::Viewed,
                updated_at: at(1),
            },
        );
        send_states.insert(
            "a".to_string(),
            SendState {
                status: SendStatus::Delivered,
                updated_at: at(1),
            },
        );
        send_states.insert(
            "b".to_string(),
            SendState {
                status: SendStatus::Failed,
                updated_at: at(1),
            },
        );
        assert_eq!(
            highest_successful_recipient_status(&send_states, "us"),
            SendStatus::Delivered
        );
    }

    #[test]
    fn test_is_message_just_for_me() {
        let mut send_states = HashMap::new();
        assert!(!is_message_just_for_me(&send_states, Some("us")));

        send_states.insert(
            "us".to_string(),
            SendState {
                status: SendStatus::Sent,
                updated_at: at(1),
            },
        );
        assert!(is_message_just_for_me(&send_states, Some("us")));
        assert!(!is_message_just_for_me(&send_states, None));

        send_states.insert(
            "them".to_string(),
            SendState {
                status: SendStatus::Pending,
                updated_at: at(1),
            },
        );
        assert!(!is_message_just_for_me(&send_states, Some("us")));
    }
}
