//! # chesslm
//!
//! Chess between humans and tool-calling language-model agents.
//!
//! A [`Game`] owns the board and the transcript. When an agent is to move it
//! builds a side-restricted set of board tools, lets the agent reason and
//! call them until it has moved, and repeats until a human must act, the game
//! ends or the move ceiling is hit. Every transcript change is streamed to an
//! observer as a [`GameUpdate`].

pub mod agent;
pub mod board;
pub mod config;
pub mod llms;
pub mod mcp;
pub mod orchestrator;
pub mod server;
pub mod tools;
pub mod transcript;

#[cfg(test)]
pub(crate) mod testing;

pub use agent::{AgentFactory, Provider, ProviderAgentFactory, ToolAgent};
pub use board::{Board, BoardHandle, Side};
pub use llms::ChatModel;
pub use orchestrator::{Game, GameUpdate, PlayerConfig, Players, StopReason};
pub use tools::{Tool, ToolError};
pub use transcript::{Transcript, TranscriptEntry};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
