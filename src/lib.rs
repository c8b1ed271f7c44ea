//! # Agora
//!
//! Agora is a multi-agent conversation engine: several simulated "thinkers"
//! (historical or contemporary figures, each a persona driving an LLM)
//! share one live chat room with a human participant, and each decides
//! autonomously, and probabilistically, when to speak.
//!
//! The crate is the conversation *orchestrator*. HTTP routing, auth and
//! storage stay outside, behind two narrow seams:
//!
//! * **[`store::ConversationStore`]**: fetch ordered history, append a
//!   thinker message with its cost. Implemented by whoever owns the
//!   database.
//! * **[`room::RoomRegistry`] connections**: a transport gateway attaches
//!   one [`room::Connection`] per client and forwards the
//!   [`event::RoomEvent`] stream over its wire of choice; inbound control
//!   commands arrive as [`event::ClientCommand`]s.
//!
//! Inside those seams the [`orchestrator::Orchestrator`] spawns one
//! independently scheduled agent task per (conversation, thinker) pair.
//! Each agent polls the shared room state (activity, pause flag, speed
//! multiplier), applies a stochastic "should I speak now" policy, streams a
//! persona-voiced reply with live thinking previews, and persists the
//! result bubble by bubble, save first, then broadcast. There is no
//! central turn arbiter; natural conversation flow comes from probabilistic
//! damping, pacing intervals, and self-reply suppression.
//!
//! ## Quickstart
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use agora::clients::anthropic::AnthropicClient;
//! use agora::message::{ConversationSpec, Thinker};
//! use agora::orchestrator::Orchestrator;
//! # use agora::store::ConversationStore;
//!
//! # async fn example(store: Arc<dyn ConversationStore>) {
//! agora::init_logger();
//!
//! let llm = Arc::new(AnthropicClient::from_env().unwrap());
//! let orchestrator = Orchestrator::new(llm);
//!
//! // The gateway attaches clients through the registry...
//! let rooms = orchestrator.rooms();
//! let connection = rooms.connect("conv-42").await;
//!
//! // ...and the orchestrator runs the thinkers.
//! let spec = ConversationSpec::new(
//!     "conv-42",
//!     "Is mathematics discovered or invented?",
//!     vec![Thinker::new(
//!         "Emmy Noether",
//!         "Mathematician who reshaped abstract algebra.",
//!         "Structures are primary; symmetry explains conservation.",
//!         "Direct, generous, allergic to pomp.",
//!     )],
//! );
//! orchestrator.start_agents(spec, store).await;
//! # drop(connection);
//! # }
//! ```
//!
//! Agents only work while at least one client is connected; room activity
//! is the system's backpressure. Pause/resume, a clamped speed multiplier
//! in `[0.5, 6.0]` (higher is slower), and typing indicators are shared
//! room state every agent re-checks at each suspension point.

use std::sync::Once;

static INIT_LOGGER: Once = Once::new();

/// Initialise the global [`env_logger`] subscriber exactly once.
///
/// Lightweight on purpose: embedding applications opt in to `RUST_LOG`
/// driven diagnostics without being forced onto a particular logging
/// backend.
///
/// ```rust
/// agora::init_logger();
/// log::info!("Logger is ready");
/// ```
pub fn init_logger() {
    INIT_LOGGER.call_once(|| {
        env_logger::init();
    });
}

// Import the top-level `agora` module.
pub mod agora;

// Re-export the modules and key items for easier external access.
pub use crate::agora::agent;
pub use crate::agora::agent::{should_respond, PacingConfig, ThinkerAgent};
pub use crate::agora::chance;
pub use crate::agora::chance::{Chance, SeededChance, ThreadChance};
pub use crate::agora::clients;
pub use crate::agora::event;
pub use crate::agora::event::{ClientCommand, RoomEvent};
pub use crate::agora::llm_client;
pub use crate::agora::llm_client::{
    CompletionRequest, CompletionStream, LlmClient, LlmError, LlmTokenUsage, StreamEvent,
};
pub use crate::agora::message;
pub use crate::agora::message::{ChatMessage, ConversationSpec, SenderKind, Thinker};
pub use crate::agora::orchestrator;
pub use crate::agora::orchestrator::Orchestrator;
pub use crate::agora::responder;
pub use crate::agora::responder::{
    choose_response_style, split_into_bubbles, GeneratedReply, PreviewConfig, ResponseGenerator,
    ResponseStyle,
};
pub use crate::agora::room;
pub use crate::agora::room::{Connection, RoomRegistry};
pub use crate::agora::store;
pub use crate::agora::store::{ConversationStore, StoreError};
