//! Turn orchestration.
//!
//! - [`players`] - who controls each side
//! - [`prompts`] - instruction text for agent turns
//! - [`game`] - the autoplay loop and its entry points

pub mod game;
pub mod players;
pub mod prompts;

pub use game::{
    Game, GameError, GameUpdate, HumanMove, StopReason, TurnPhase, UpdateSender, DEFAULT_MAX_MOVES,
    NO_AGENT_MESSAGE, RESET_MESSAGE,
};
pub use players::{PlayerConfig, Players};
