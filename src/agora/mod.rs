// src/agora/mod.rs

pub mod agent;
pub mod chance;
pub mod clients;
pub mod event;
pub mod llm_client;
pub mod message;
pub mod orchestrator;
pub mod responder;
pub mod room;
pub mod store;

// Export the two entry points directly so callers reach them as
// agora::Orchestrator / agora::RoomRegistry.
pub use orchestrator::Orchestrator;
pub use room::RoomRegistry;
