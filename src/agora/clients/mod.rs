// src/agora/clients/mod.rs

pub mod anthropic;

pub use anthropic::AnthropicClient;
