//! Persistence collaborator traits.
//!
//! The queue and its handlers consume persistence as an opaque record
//! store. The in-memory implementations below back the test suite and
//! small embedders; production embedders wire these traits to their own
//! database layer.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use courier_common::AppResult;

use crate::conversation::Conversation;
use crate::message::OutboundMessage;

/// Record store for outbound messages.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Fetch a message by ID. `Ok(None)` when it no longer exists.
    async fn message(&self, id: &str) -> AppResult<Option<OutboundMessage>>;

    /// Persist a message, replacing any previous record.
    async fn save_message(&self, message: &OutboundMessage) -> AppResult<()>;
}

/// Record store for conversations.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Fetch a conversation by ID. `Ok(None)` when it no longer exists.
    async fn conversation(&self, id: &str) -> AppResult<Option<Conversation>>;

    /// Persist a conversation, replacing any previous record.
    async fn save_conversation(&self, conversation: &Conversation) -> AppResult<()>;
}

/// In-memory message store.
#[derive(Debug, Clone, Default)]
pub struct MemoryMessageStore {
    messages: Arc<RwLock<HashMap<String, OutboundMessage>>>,
}

impl MemoryMessageStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn message(&self, id: &str) -> AppResult<Option<OutboundMessage>> {
        Ok(self.messages.read().await.get(id).cloned())
    }

    async fn save_message(&self, message: &OutboundMessage) -> AppResult<()> {
        self.messages
            .write()
            .await
            .insert(message.id.clone(), message.clone());
        Ok(())
    }
}

/// In-memory conversation store.
#[derive(Debug, Clone, Default)]
pub struct MemoryConversationStore {
    conversations: Arc<RwLock<HashMap<String, Conversation>>>,
}

impl MemoryConversationStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn conversation(&self, id: &str) -> AppResult<Option<Conversation>> {
        Ok(self.conversations.read().await.get(id).cloned())
    }

    async fn save_conversation(&self, conversation: &Conversation) -> AppResult<()> {
        self.conversations
            .write()
            .await
            .insert(conversation.id.clone(), conversation.clone());
        Ok(())
    }
}
