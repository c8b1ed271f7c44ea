//! Conversation orchestration: starting, stopping and steering the agent
//! set for each conversation.
//!
//! The [`Orchestrator`] is an explicitly constructed object, not a global
//! singleton. Whatever owns the transport and HTTP layers holds a handle
//! to it (and to its [`RoomRegistry`]) and calls in. It owns the map from
//! conversation id to running agent tasks, and guarantees that at most one
//! agent ever runs per (conversation, thinker) pair.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use agora::message::{ConversationSpec, Thinker};
//! use agora::orchestrator::Orchestrator;
//! use agora::clients::anthropic::AnthropicClient;
//! # use agora::store::ConversationStore;
//!
//! # async fn example(store: Arc<dyn ConversationStore>) {
//! let llm = Arc::new(AnthropicClient::from_env().unwrap());
//! let orchestrator = Orchestrator::new(llm);
//!
//! let spec = ConversationSpec::new(
//!     "conv-42",
//!     "Does progress have a direction?",
//!     vec![
//!         Thinker::new("Ibn Khaldun", "Historian.", "Cyclical history.", "Analytical."),
//!         Thinker::new("Condorcet", "Philosopher.", "Perfectibility.", "Optimistic."),
//!     ],
//! )
//! .with_user_name("Sam");
//!
//! orchestrator.start_agents(spec, store).await;
//! # }
//! ```

use crate::agora::agent::{PacingConfig, ThinkerAgent};
use crate::agora::chance::{Chance, SeededChance, ThreadChance};
use crate::agora::event::{ClientCommand, RoomEvent};
use crate::agora::llm_client::LlmClient;
use crate::agora::message::{ConversationSpec, SenderKind};
use crate::agora::responder::{PreviewConfig, ResponseGenerator};
use crate::agora::room::RoomRegistry;
use crate::agora::store::ConversationStore;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Owns the rooms and the running agent tasks for every conversation.
pub struct Orchestrator {
    rooms: Arc<RoomRegistry>,
    llm: Arc<dyn LlmClient>,
    pacing: PacingConfig,
    preview: PreviewConfig,
    seed: Option<u64>,
    agents: Mutex<HashMap<String, Vec<JoinHandle<()>>>>,
}

impl Orchestrator {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Orchestrator {
            rooms: Arc::new(RoomRegistry::new()),
            llm,
            pacing: PacingConfig::default(),
            preview: PreviewConfig::default(),
            seed: None,
            agents: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_pacing(mut self, pacing: PacingConfig) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_preview_config(mut self, preview: PreviewConfig) -> Self {
        self.preview = preview;
        self
    }

    /// Seed the per-agent random sources for reproducible behavior. Each
    /// agent derives its own stream from the base seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Handle to the room registry, for the transport gateway.
    pub fn rooms(&self) -> Arc<RoomRegistry> {
        Arc::clone(&self.rooms)
    }

    /// Spawn one agent task per thinker in the conversation. Any agents
    /// already running for this conversation are stopped first, so the
    /// same (conversation, thinker) pair never runs twice.
    pub async fn start_agents(&self, spec: ConversationSpec, store: Arc<dyn ConversationStore>) {
        self.stop_agents(&spec.id).await;

        let mut handles = Vec::with_capacity(spec.thinkers.len());
        for (index, thinker) in spec.thinkers.iter().enumerate() {
            let chance: Box<dyn Chance> = match self.seed {
                Some(seed) => Box::new(SeededChance::new(seed.wrapping_add(index as u64))),
                None => Box::new(ThreadChance),
            };
            let generator = ResponseGenerator::new(Arc::clone(&self.llm), self.rooms())
                .with_preview_config(self.preview.clone());
            let agent = ThinkerAgent::new(
                spec.id.clone(),
                spec.topic.clone(),
                spec.user_name.clone(),
                thinker.clone(),
                self.rooms(),
                Arc::clone(&store),
                generator,
                self.pacing.clone(),
                chance,
            );
            handles.push(tokio::spawn(agent.run()));
        }

        log::info!(
            "started {} agents for conversation {}",
            handles.len(),
            spec.id
        );
        self.agents.lock().await.insert(spec.id, handles);
    }

    /// Cancel every agent task for a conversation and wait for each to
    /// acknowledge cancellation, so nothing is left zombie-running when
    /// this returns. The room's runtime state is discarded; pause state is
    /// deliberately preserved.
    pub async fn stop_agents(&self, conversation_id: &str) {
        let handles = self.agents.lock().await.remove(conversation_id);
        let handles = match handles {
            Some(handles) => handles,
            None => return,
        };
        let count = handles.len();
        for handle in handles {
            handle.abort();
            // The JoinError from an aborted task is the acknowledgment we
            // are waiting for; it is not propagated.
            let _ = handle.await;
        }
        self.rooms.discard(conversation_id).await;
        log::info!(
            "stopped {} agents for conversation {}",
            count,
            conversation_id
        );
    }

    /// Number of agent tasks currently registered for a conversation.
    pub async fn agent_count(&self, conversation_id: &str) -> usize {
        self.agents
            .lock()
            .await
            .get(conversation_id)
            .map(|handles| handles.len())
            .unwrap_or(0)
    }

    pub async fn pause(&self, conversation_id: &str) {
        self.rooms.pause(conversation_id).await;
    }

    pub async fn resume(&self, conversation_id: &str) {
        self.rooms.resume(conversation_id).await;
    }

    pub async fn is_paused(&self, conversation_id: &str) -> bool {
        self.rooms.is_paused(conversation_id).await
    }

    pub async fn set_speed(&self, conversation_id: &str, multiplier: f64) {
        self.rooms.set_speed(conversation_id, multiplier).await;
    }

    /// Ingest one client control command.
    ///
    /// User messages are fan-out notifications only; their storage is the
    /// external API layer's job. `Join`/`Leave` are satisfied by the
    /// gateway calling [`RoomRegistry::connect`]/[`RoomRegistry::disconnect`]
    /// directly, and user typing indicators are accepted without effect;
    /// nothing reacts to them yet.
    pub async fn handle_command(&self, conversation_id: &str, command: ClientCommand) {
        match command {
            ClientCommand::Pause => self.pause(conversation_id).await,
            ClientCommand::Resume => self.resume(conversation_id).await,
            ClientCommand::SetSpeed { multiplier } => {
                self.set_speed(conversation_id, multiplier).await
            }
            ClientCommand::UserMessage { content } => {
                self.rooms
                    .broadcast(
                        conversation_id,
                        RoomEvent::Message {
                            message_id: Uuid::new_v4().to_string(),
                            sender: SenderKind::User,
                            sender_name: None,
                            content,
                            cost: None,
                            timestamp: Utc::now(),
                        },
                    )
                    .await
            }
            ClientCommand::Join
            | ClientCommand::Leave
            | ClientCommand::TypingStart
            | ClientCommand::TypingStop => {}
        }
    }
}
