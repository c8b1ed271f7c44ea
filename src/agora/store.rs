//! The persistence boundary consumed by thinker agents.
//!
//! The orchestrator never talks to a database. It is handed one
//! [`ConversationStore`] per conversation start and calls exactly two
//! operations: fetch the ordered history, and append a thinker message with
//! its generation cost. Whoever implements the trait owns ids, timestamps,
//! and any side effects (such as accumulating cost into the owning user's
//! spend total).
//!
//! # Example
//!
//! ```rust,no_run
//! use agora::store::{ConversationStore, StoreError};
//! use agora::message::{ChatMessage, SenderKind};
//! use async_trait::async_trait;
//! use chrono::Utc;
//!
//! struct InMemoryStore; // back with your database of choice
//!
//! #[async_trait]
//! impl ConversationStore for InMemoryStore {
//!     async fn messages(&self, _conversation_id: &str) -> Result<Vec<ChatMessage>, StoreError> {
//!         Ok(Vec::new())
//!     }
//!
//!     async fn save_thinker_message(
//!         &self,
//!         _conversation_id: &str,
//!         thinker_name: &str,
//!         content: &str,
//!         cost: f64,
//!     ) -> Result<ChatMessage, StoreError> {
//!         Ok(ChatMessage {
//!             id: "m-1".to_string(),
//!             sender: SenderKind::Thinker,
//!             sender_name: Some(thinker_name.to_string()),
//!             content: content.to_string(),
//!             cost: Some(cost),
//!             created_at: Utc::now(),
//!         })
//!     }
//! }
//! ```

use crate::agora::message::ChatMessage;
use async_trait::async_trait;
use std::error::Error;

/// Errors surfaced by store implementations. Agents treat these as
/// transient internal failures (logged, broadcast generically, retried).
pub type StoreError = Box<dyn Error + Send + Sync>;

/// Storage contract for one conversation's message log.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Return the full message history for a conversation, ordered by
    /// creation time (oldest first).
    async fn messages(&self, conversation_id: &str) -> Result<Vec<ChatMessage>, StoreError>;

    /// Append a thinker-authored message and return the stored record with
    /// its assigned id and timestamp.
    async fn save_thinker_message(
        &self,
        conversation_id: &str,
        thinker_name: &str,
        content: &str,
        cost: f64,
    ) -> Result<ChatMessage, StoreError>;
}
