//! Core conversation data model: messages, thinker personas, and the
//! immutable conversation snapshot handed to the orchestrator when agents
//! start.
//!
//! Everything here is plain data. The orchestrator never owns the
//! conversation (persistence lives behind
//! [`ConversationStore`](crate::store::ConversationStore)), so these types
//! are the read-side view the agents reason over plus the persona inputs
//! they prompt with.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderKind {
    /// A human participant.
    User,
    /// A simulated thinker agent.
    Thinker,
    /// The system itself (joins, notices, etc.).
    System,
}

/// One message in a conversation, as returned by the persistence adapter.
///
/// Messages are append-only and totally ordered by `created_at`. `cost` is
/// `Some` (and non-negative) only for thinker-authored messages; user and
/// system messages never carry a cost.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Storage-assigned identifier.
    pub id: String,
    /// Sender classification.
    pub sender: SenderKind,
    /// Display name of the sender; `None` for anonymous user/system entries.
    pub sender_name: Option<String>,
    /// The message text.
    pub content: String,
    /// Dollar cost of generating this message, thinker messages only.
    pub cost: Option<f64>,
    /// Creation timestamp, the total order over the conversation.
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// Display label used when flattening history into a prompt: "User" for
    /// human messages, the sender name otherwise.
    pub fn sender_label(&self) -> &str {
        match self.sender {
            SenderKind::User => "User",
            _ => self.sender_name.as_deref().unwrap_or("Unknown"),
        }
    }
}

/// Persona descriptor for one simulated thinker.
///
/// Immutable for the lifetime of a conversation. The name doubles as the
/// display label and the correlation key: exactly one agent loop runs per
/// thinker name per conversation, and typing/thinking events are keyed on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thinker {
    /// Full name, unique within the conversation.
    pub name: String,
    /// Short biographical summary fed into the persona prompt.
    pub bio: String,
    /// Known positions and beliefs relevant to discussion topics.
    pub positions: String,
    /// Rhetorical style, tone and manner.
    pub style: String,
    /// Display color for clients (hex string).
    pub color: String,
    /// Optional portrait URL for clients.
    pub image_url: Option<String>,
}

impl Thinker {
    pub fn new(
        name: impl Into<String>,
        bio: impl Into<String>,
        positions: impl Into<String>,
        style: impl Into<String>,
    ) -> Self {
        Thinker {
            name: name.into(),
            bio: bio.into(),
            positions: positions.into(),
            style: style.into(),
            color: "#6366f1".to_string(),
            image_url: None,
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    pub fn with_image_url(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }
}

/// Immutable snapshot of a conversation handed to the orchestrator when its
/// agents start: identity, topic, the human participant's display name (if
/// known) and the thinker roster.
#[derive(Debug, Clone)]
pub struct ConversationSpec {
    /// Conversation identifier, the key for rooms, stores and agent sets.
    pub id: String,
    /// Free-text discussion topic shared by every agent's prompt.
    pub topic: String,
    /// Display name of the human participant, used when a thinker invites
    /// them back into the discussion. `None` disables that behavior.
    pub user_name: Option<String>,
    /// Ordered thinker roster; one agent task is spawned per entry.
    pub thinkers: Vec<Thinker>,
}

impl ConversationSpec {
    pub fn new(id: impl Into<String>, topic: impl Into<String>, thinkers: Vec<Thinker>) -> Self {
        ConversationSpec {
            id: id.into(),
            topic: topic.into(),
            user_name: None,
            thinkers,
        }
    }

    pub fn with_user_name(mut self, name: impl Into<String>) -> Self {
        self.user_name = Some(name.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_label_prefers_user_over_name() {
        let msg = ChatMessage {
            id: "m1".to_string(),
            sender: SenderKind::User,
            sender_name: Some("Ada".to_string()),
            content: "hello".to_string(),
            cost: None,
            created_at: Utc::now(),
        };
        assert_eq!(msg.sender_label(), "User");
    }

    #[test]
    fn sender_label_falls_back_to_unknown() {
        let msg = ChatMessage {
            id: "m2".to_string(),
            sender: SenderKind::Thinker,
            sender_name: None,
            content: "hm".to_string(),
            cost: Some(0.01),
            created_at: Utc::now(),
        };
        assert_eq!(msg.sender_label(), "Unknown");
    }

    #[test]
    fn thinker_builder_sets_optional_fields() {
        let t = Thinker::new("Marie Curie", "Physicist and chemist.", "Empiricism.", "Precise.")
            .with_color("#22c55e")
            .with_image_url("https://example.org/curie.jpg");
        assert_eq!(t.color, "#22c55e");
        assert_eq!(t.image_url.as_deref(), Some("https://example.org/curie.jpg"));
    }
}
