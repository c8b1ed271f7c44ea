//! Room event and control-command vocabulary.
//!
//! The control channel is modeled as two tagged unions rather than a wire
//! protocol: [`RoomEvent`] is everything the server fans out to connected
//! clients, [`ClientCommand`] is everything a client may send in. Each
//! variant carries only the fields that kind of event needs. Both serialize
//! with an external `type` tag in `snake_case`, so a gateway can forward
//! them over a WebSocket (or anything else) as-is.
//!
//! # Event flow for one thinker turn
//!
//! ```text
//! ThinkerTyping { thinker }
//!   └─ ThinkerThinking { thinker, preview }   (throttled, 0..n times)
//!   └─ Message { .. }                         (one per bubble, 1..n times)
//! ThinkerStoppedTyping { thinker }
//! ```

use crate::agora::message::{ChatMessage, SenderKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Events broadcast to every connection in a room.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoomEvent {
    /// A finalized message (from a thinker, a user notification, or the
    /// system), ready for display.
    Message {
        message_id: String,
        sender: SenderKind,
        sender_name: Option<String>,
        content: String,
        cost: Option<f64>,
        timestamp: DateTime<Utc>,
    },

    /// A thinker began composing a response.
    ThinkerTyping { thinker: String },

    /// A throttled, style-transformed fragment of a thinker's in-progress
    /// reasoning.
    ThinkerThinking { thinker: String, preview: String },

    /// A thinker finished (or abandoned) composing.
    ThinkerStoppedTyping { thinker: String },

    /// The conversation was paused; agents stop generating and persisting.
    Paused,

    /// The conversation was resumed.
    Resumed,

    /// The pacing multiplier changed. Higher values slow the conversation.
    SpeedChanged { multiplier: f64 },

    /// A client connected to the room.
    UserJoined,

    /// A client disconnected from the room.
    UserLeft,

    /// A user-facing error notice (quota exhaustion, transient provider
    /// failures, internal errors).
    Error { content: String },
}

impl RoomEvent {
    /// Build a [`RoomEvent::Message`] from a stored record.
    pub fn from_message(message: &ChatMessage) -> Self {
        RoomEvent::Message {
            message_id: message.id.clone(),
            sender: message.sender,
            sender_name: message.sender_name.clone(),
            content: message.content.clone(),
            cost: message.cost,
            timestamp: message.created_at,
        }
    }
}

/// Commands a connected client may send over the control channel.
///
/// `Join`/`Leave` are acknowledged for completeness but connection
/// lifecycle is driven by the transport gateway calling
/// [`RoomRegistry::connect`](crate::room::RoomRegistry::connect) and
/// [`RoomRegistry::disconnect`](crate::room::RoomRegistry::disconnect)
/// directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    Join,
    Leave,
    /// Real-time notification of a user message; storage is handled by the
    /// external API layer, this only fans the text out to other clients.
    UserMessage { content: String },
    TypingStart,
    TypingStop,
    Pause,
    Resume,
    SetSpeed { multiplier: f64 },
}
