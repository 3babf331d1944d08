//! Domain model for courier's outbound-delivery core.
//!
//! This crate holds the pieces the job queue orchestrates:
//!
//! - **Send states**: the per-recipient monotonic delivery ledger and its
//!   pure reducer
//! - **Entities**: outbound messages and conversations
//! - **Collaborator seams**: persistence ([`MessageStore`],
//!   [`ConversationStore`]), transport ([`MessageDelivery`]), and UI
//!   notifications ([`DeliveryEvents`])
//!
//! The queue crate depends on these seams without knowing anything about
//! the application's database, encryption, or rendering layers.

pub mod conversation;
pub mod delivery;
pub mod events;
pub mod message;
pub mod send_state;
pub mod store;

pub use conversation::{Conversation, ConversationKind};
pub use delivery::{
    DeliveryPayload, MessageDelivery, STATUS_RATE_LIMITED, STATUS_SERVER_STOP, SendError,
    SendOutcome, TimedDelivery,
};
pub use events::{DeliveryEvents, NullEvents};
pub use message::{ConversationId, MessageId, OutboundMessage, RecipientId};
pub use send_state::{
    SendAction, SendActionType, SendState, SendStatus, highest_successful_recipient_status,
    is_delivered, is_failed, is_message_just_for_me, is_read, is_sent, is_viewed, max_status,
    send_state_reducer, some_recipient_send_status, some_send_status,
};
pub use store::{ConversationStore, MemoryConversationStore, MemoryMessageStore, MessageStore};
