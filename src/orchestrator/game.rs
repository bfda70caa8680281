//! The turn orchestrator.
//!
//! A [`Game`] owns the board, the transcript and both player configs. Each
//! entry point (chat, human move, reset) runs until a human must act, the
//! game ends, or the move ceiling is hit, sending a [`GameUpdate`] after every
//! transcript change and a final one carrying the [`StopReason`].

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::agent::{bridge, AgentError, AgentFactory, ToolAgent};
use crate::board::{BoardError, BoardHandle};
use crate::orchestrator::players::{PlayerConfig, Players};
use crate::orchestrator::prompts::{autoplay_instruction, chat_instruction};
use crate::tools::{create_base_tools, BoardTools, Tool, ToolError};
use crate::transcript::{Transcript, TranscriptEntry};

/// Default cap on agent plies per run.
pub const DEFAULT_MAX_MOVES: usize = 200;

/// System entry appended by [`Game::reset`].
pub const RESET_MESSAGE: &str = "New game started. White to move.";

/// Reply to a chat message when the side to move is human.
pub const NO_AGENT_MESSAGE: &str = "No AI configured for the side to move.";

/// Channel end that receives game updates.
pub type UpdateSender = mpsc::Sender<GameUpdate>;

// ---------------------------------------------------------------------------
// Updates
// ---------------------------------------------------------------------------

/// Where the orchestrator is in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    AwaitingInput,
    Resolving,
    AgentTurn,
    Done,
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    GameOver,
    CeilingReached,
    HumanToMove,
    AgentUnavailable,
    Cancelled,
    ChatTurnComplete,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StopReason::GameOver => "game over",
            StopReason::CeilingReached => "move ceiling reached",
            StopReason::HumanToMove => "human to move",
            StopReason::AgentUnavailable => "agent unavailable",
            StopReason::Cancelled => "cancelled",
            StopReason::ChatTurnComplete => "chat turn complete",
        };
        f.write_str(text)
    }
}

/// Snapshot sent to observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameUpdate {
    pub transcript: Transcript,
    pub fen: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<StopReason>,
    /// Agent plies attempted in the run; set on the final update only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moves_played: Option<usize>,
}

/// A move made by a human outside the agent loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HumanMove {
    /// Position after the move, as reported by a board widget.
    Fen(String),
    /// A move code applied to the current position.
    Move(String),
}

/// Input rejected before a run starts.
#[derive(Debug, Error)]
pub enum GameError {
    #[error(transparent)]
    InvalidFen(#[from] BoardError),

    #[error("{0}")]
    InvalidMove(#[from] ToolError),
}

// ---------------------------------------------------------------------------
// Game
// ---------------------------------------------------------------------------

/// One game: board, transcript, players and the agents' tool sources.
pub struct Game {
    board: BoardHandle,
    transcript: Transcript,
    players: Players,
    factory: Arc<dyn AgentFactory>,
    remote_tools: Vec<Arc<dyn Tool>>,
    max_moves: usize,
    cancel: Arc<AtomicBool>,
    phase: TurnPhase,
}

impl fmt::Debug for Game {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Game")
            .field("fen", &self.board.fen())
            .field("transcript_len", &self.transcript.len())
            .field("players", &self.players)
            .field("remote_tools", &self.remote_tools.len())
            .field("max_moves", &self.max_moves)
            .field("phase", &self.phase)
            .finish()
    }
}

impl Game {
    pub fn new(factory: Arc<dyn AgentFactory>) -> Self {
        Self {
            board: BoardHandle::default(),
            transcript: Transcript::new(),
            players: Players::default(),
            factory,
            remote_tools: Vec::new(),
            max_moves: DEFAULT_MAX_MOVES,
            cancel: Arc::new(AtomicBool::new(false)),
            phase: TurnPhase::AwaitingInput,
        }
    }

    pub fn with_players(mut self, players: Players) -> Self {
        self.players = players;
        self
    }

    /// Tools merged into chat turns.
    pub fn with_remote_tools(mut self, tools: Vec<Arc<dyn Tool>>) -> Self {
        self.remote_tools = tools;
        self
    }

    pub fn with_max_moves(mut self, max_moves: usize) -> Self {
        self.max_moves = max_moves;
        self
    }

    pub fn board(&self) -> &BoardHandle {
        &self.board
    }

    pub fn fen(&self) -> String {
        self.board.fen()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn players(&self) -> &Players {
        &self.players
    }

    pub fn set_players(&mut self, players: Players) {
        log::info!("Players set: white={:?} black={:?}", players.white, players.black);
        self.players = players;
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn max_moves(&self) -> usize {
        self.max_moves
    }

    /// Flag checked at the top of every autoplay iteration.
    ///
    /// Setting it stops the current run before its next ply. Every entry
    /// point clears it on start, so a request that lands between runs does
    /// not stop the next one.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn snapshot(&self) -> GameUpdate {
        GameUpdate {
            transcript: self.transcript.clone(),
            fen: self.board.fen(),
            stop: None,
            moves_played: None,
        }
    }

    // -----------------------------------------------------------------------
    // Entry points
    // -----------------------------------------------------------------------

    /// Answer a chat message with the agent of the side to move.
    ///
    /// Runs exactly one turn, with the unrestricted board tools plus any
    /// remote tools.
    pub async fn chat(
        &mut self,
        prompt: &str,
        fen: Option<&str>,
        tx: &UpdateSender,
    ) -> Result<StopReason, GameError> {
        if let Some(fen) = fen {
            self.sync_fen(fen)?;
        }
        self.begin_run();
        self.phase = TurnPhase::Resolving;
        self.transcript.push(TranscriptEntry::user(prompt));
        if !self.emit(tx).await {
            return Ok(self.finish(StopReason::Cancelled, 0, tx).await);
        }

        let side = self.board.side_to_move();
        let config = match self.players.for_side(side) {
            PlayerConfig::Human => {
                self.transcript.push(TranscriptEntry::assistant(NO_AGENT_MESSAGE));
                self.emit(tx).await;
                return Ok(self.finish(StopReason::HumanToMove, 0, tx).await);
            }
            PlayerConfig::Agent(config) => config.clone(),
        };

        let mut tools = create_base_tools(self.board.clone(), None);
        tools.extend(self.remote_tools.iter().cloned());
        let agent = match self.factory.create_agent(&config, tools) {
            Ok(agent) => agent,
            Err(e) => return Ok(self.agent_unavailable(e, 0, tx).await),
        };

        log::info!("Chat turn for {} ({})", side, config.model);
        let instruction = chat_instruction(prompt, &self.board.fen());
        let reason = if self.run_agent_turn(&agent, instruction, tx).await {
            StopReason::ChatTurnComplete
        } else {
            StopReason::Cancelled
        };
        Ok(self.finish(reason, 1, tx).await)
    }

    /// Apply a human move, then let agents play until a human is due.
    pub async fn play_human_move(
        &mut self,
        human_move: HumanMove,
        tx: &UpdateSender,
    ) -> Result<StopReason, GameError> {
        self.apply_human_move(human_move)?;
        Ok(self.resume(tx).await)
    }

    /// Start a run from the current position, up to the configured ceiling.
    pub async fn resume(&mut self, tx: &UpdateSender) -> StopReason {
        self.begin_run();
        self.autoplay(Some(self.max_moves), tx).await
    }

    /// Load a FEN reported by a UI, keeping history when it is unchanged.
    pub fn sync_fen(&mut self, fen: &str) -> Result<(), BoardError> {
        let mut board = self.board.lock();
        if board.fen() != fen.trim() {
            board.set_fen(fen)?;
        }
        Ok(())
    }

    /// Apply a human move without running any agent.
    pub fn apply_human_move(&mut self, human_move: HumanMove) -> Result<(), GameError> {
        match human_move {
            HumanMove::Fen(fen) => self.sync_fen(&fen)?,
            HumanMove::Move(code) => {
                let outcome = BoardTools::new(self.board.clone(), None).make_move(&code)?;
                log::info!("Human played {}: {}", code, outcome);
            }
        }
        Ok(())
    }

    /// Start a new game and autoplay from the initial position.
    pub async fn reset(&mut self, tx: &UpdateSender) -> StopReason {
        self.begin_run();
        self.board.lock().reset();
        self.transcript.push(TranscriptEntry::system(RESET_MESSAGE));
        log::info!("Game reset");
        if !self.emit(tx).await {
            return self.finish(StopReason::Cancelled, 0, tx).await;
        }
        self.autoplay(Some(self.max_moves), tx).await
    }

    /// Play agent turns until a human is to move, the game ends, the ceiling
    /// is reached or the run is cancelled.
    pub async fn autoplay(&mut self, ceiling: Option<usize>, tx: &UpdateSender) -> StopReason {
        let mut moves_played = 0;

        let reason = loop {
            self.phase = TurnPhase::Resolving;
            if self.cancel.load(Ordering::SeqCst) {
                break StopReason::Cancelled;
            }
            if self.board.is_game_over() {
                break StopReason::GameOver;
            }
            if ceiling.is_some_and(|c| moves_played >= c) {
                break StopReason::CeilingReached;
            }

            let side = self.board.side_to_move();
            let config = match self.players.for_side(side) {
                PlayerConfig::Human => break StopReason::HumanToMove,
                PlayerConfig::Agent(config) => config.clone(),
            };

            let tools = create_base_tools(self.board.clone(), Some(side));
            let agent = match self.factory.create_agent(&config, tools) {
                Ok(agent) => agent,
                Err(e) => return self.agent_unavailable(e, moves_played, tx).await,
            };

            log::info!(
                "Ply {}: {} to move ({} {})",
                moves_played + 1,
                side,
                config.provider,
                config.model
            );
            let instruction = autoplay_instruction(side, &self.board.fen());
            if !self.run_agent_turn(&agent, instruction, tx).await {
                break StopReason::Cancelled;
            }
            moves_played += 1;
        };

        self.finish(reason, moves_played, tx).await
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Stream one agent turn into the transcript.
    ///
    /// Returns false when the observer has gone away.
    async fn run_agent_turn(
        &mut self,
        agent: &ToolAgent,
        instruction: String,
        tx: &UpdateSender,
    ) -> bool {
        self.phase = TurnPhase::AgentTurn;
        let mut updates = bridge::invoke(agent, self.transcript.clone(), instruction);
        while let Some(transcript) = updates.next().await {
            self.transcript = transcript;
            if !self.emit(tx).await {
                log::warn!("Observer disconnected mid-turn");
                return false;
            }
        }
        true
    }

    async fn agent_unavailable(
        &mut self,
        error: AgentError,
        moves_played: usize,
        tx: &UpdateSender,
    ) -> StopReason {
        log::error!("Could not create agent: {}", error);
        self.transcript.push(TranscriptEntry::assistant(format!("Error: {}", error)));
        self.emit(tx).await;
        self.finish(StopReason::AgentUnavailable, moves_played, tx).await
    }

    fn begin_run(&mut self) {
        self.cancel.store(false, Ordering::SeqCst);
    }

    async fn emit(&self, tx: &UpdateSender) -> bool {
        tx.send(self.snapshot()).await.is_ok()
    }

    async fn finish(
        &mut self,
        reason: StopReason,
        moves_played: usize,
        tx: &UpdateSender,
    ) -> StopReason {
        self.phase = TurnPhase::Done;
        self.cancel.store(false, Ordering::SeqCst);
        log::info!("Run stopped: {} after {} agent ply(s)", reason, moves_played);

        let mut update = self.snapshot();
        update.stop = Some(reason);
        update.moves_played = Some(moves_played);
        // The observer may already be gone.
        let _ = tx.send(update).await;
        reason
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{ModelConfig, Provider};
    use crate::board::{Side, STARTING_FEN};
    use crate::llms::base_llm::ModelResponse;
    use crate::testing::{tool_call, ScriptedFactory};
    use crate::tools::StructuredTool;
    use crate::transcript::Role;
    use serde_json::json;

    fn agent() -> PlayerConfig {
        PlayerConfig::Agent(ModelConfig::new(Provider::Ollama, "", None))
    }

    fn channel() -> (UpdateSender, mpsc::Receiver<GameUpdate>) {
        mpsc::channel(1024)
    }

    async fn drain(mut rx: mpsc::Receiver<GameUpdate>) -> Vec<GameUpdate> {
        let mut updates = Vec::new();
        while let Some(update) = rx.recv().await {
            updates.push(update);
        }
        updates
    }

    fn game(factory: &ScriptedFactory, players: Players) -> Game {
        Game::new(Arc::new(factory.clone())).with_players(players)
    }

    #[tokio::test]
    async fn test_agents_play_one_ply_under_ceiling_of_one() {
        let factory = ScriptedFactory::new(vec![
            Ok(tool_call("make_move", json!({"move": "e2e4"}))),
            Ok(ModelResponse::text("e4, the classic.")),
        ]);
        let mut game = game(&factory, Players::new(agent(), agent()));
        let (tx, rx) = channel();

        let reason = game.autoplay(Some(1), &tx).await;
        drop(tx);
        let updates = drain(rx).await;

        assert_eq!(reason, StopReason::CeilingReached);
        let last = updates.last().unwrap();
        assert_eq!(last.stop, Some(StopReason::CeilingReached));
        assert_eq!(last.moves_played, Some(1));
        assert_eq!(last.fen, "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1");
        assert!(game
            .transcript()
            .iter()
            .any(|e| e.role == Role::Assistant && e.attribution.is_none()));
        assert_eq!(factory.created().len(), 1);
        assert_eq!(game.phase(), TurnPhase::Done);
    }

    #[tokio::test]
    async fn test_human_move_triggers_single_agent_reply() {
        let factory = ScriptedFactory::new(vec![
            Ok(tool_call("make_move", json!({"move": "e7e5"}))),
            Ok(ModelResponse::text("e5")),
        ]);
        let mut game = game(&factory, Players::new(PlayerConfig::Human, agent()));
        let (tx, rx) = channel();

        let reason = game
            .play_human_move(HumanMove::Move("e2e4".into()), &tx)
            .await
            .unwrap();
        drop(tx);
        let updates = drain(rx).await;

        assert_eq!(reason, StopReason::HumanToMove);
        assert_eq!(updates.last().unwrap().moves_played, Some(1));
        assert_eq!(game.board().side_to_move(), Side::White);
        assert_eq!(
            game.fen(),
            "rnbqkbnr/pppp1ppp/8/4p3/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 2"
        );
        // Autoplay tools are restricted: six board tools only.
        assert_eq!(factory.created()[0].len(), 6);
    }

    #[tokio::test]
    async fn test_human_move_rejected_before_run() {
        let factory = ScriptedFactory::default();
        let mut game = game(&factory, Players::humans());
        let (tx, rx) = channel();

        let err = game
            .play_human_move(HumanMove::Move("e2e5".into()), &tx)
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Illegal move 'e2e5'"));
        assert!(game
            .play_human_move(HumanMove::Fen("not a fen".into()), &tx)
            .await
            .is_err());
        drop(tx);
        assert!(drain(rx).await.is_empty());
        assert_eq!(game.fen(), STARTING_FEN);
    }

    #[tokio::test]
    async fn test_reset_appends_one_system_entry() {
        let factory = ScriptedFactory::default();
        let mut game = game(&factory, Players::humans());
        game.board().lock().set_fen("8/8/8/8/8/8/8/K1k5 w - - 0 1").unwrap();
        game.transcript.push(TranscriptEntry::user("old"));
        let (tx, rx) = channel();

        let reason = game.reset(&tx).await;
        drop(tx);
        let updates = drain(rx).await;

        assert_eq!(reason, StopReason::HumanToMove);
        assert_eq!(game.fen(), STARTING_FEN);
        assert_eq!(game.transcript().len(), 2);
        assert_eq!(game.transcript().last().unwrap().role, Role::System);
        assert_eq!(game.transcript().last().unwrap().content, RESET_MESSAGE);
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].transcript.len(), 2);
    }

    #[tokio::test]
    async fn test_failing_agent_is_stopped_by_ceiling() {
        let factory = ScriptedFactory::new(Vec::new());
        let mut game = game(&factory, Players::new(agent(), agent())).with_max_moves(3);
        let (tx, rx) = channel();

        let reason = game.reset(&tx).await;
        drop(tx);
        drain(rx).await;

        assert_eq!(reason, StopReason::CeilingReached);
        let errors = game
            .transcript()
            .iter()
            .filter(|e| e.content.starts_with("Error: "))
            .count();
        assert_eq!(errors, 3);
        assert_eq!(game.fen(), STARTING_FEN);
    }

    #[tokio::test]
    async fn test_factory_failure_stops_with_agent_unavailable() {
        let factory = ScriptedFactory::failing();
        let mut game = game(&factory, Players::new(agent(), PlayerConfig::Human));
        let (tx, rx) = channel();

        let reason = game.autoplay(None, &tx).await;
        drop(tx);
        let updates = drain(rx).await;

        assert_eq!(reason, StopReason::AgentUnavailable);
        assert!(game
            .transcript()
            .last()
            .unwrap()
            .content
            .starts_with("Error: Ollama API key not set"));
        assert_eq!(updates.last().unwrap().moves_played, Some(0));
    }

    #[tokio::test]
    async fn test_game_over_stops_immediately() {
        let factory = ScriptedFactory::default();
        let mut game = game(&factory, Players::new(agent(), agent()));
        game.board()
            .lock()
            .set_fen("rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3")
            .unwrap();
        let (tx, _rx) = channel();
        assert_eq!(game.autoplay(None, &tx).await, StopReason::GameOver);
        assert!(factory.created().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_flag_checked_before_ply() {
        let factory = ScriptedFactory::default();
        let mut game = game(&factory, Players::new(agent(), agent()));
        game.cancel_flag().store(true, Ordering::SeqCst);
        let (tx, _rx) = channel();

        assert_eq!(game.autoplay(None, &tx).await, StopReason::Cancelled);
        assert!(factory.created().is_empty());
        assert!(!game.cancel_flag().load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_entry_points_clear_a_stale_cancel() {
        let factory = ScriptedFactory::new(vec![
            Ok(tool_call("make_move", json!({"move": "e2e4"}))),
            Ok(ModelResponse::text("e4")),
        ]);
        let mut game = game(&factory, Players::new(agent(), PlayerConfig::Human));
        game.cancel_flag().store(true, Ordering::SeqCst);
        let (tx, rx) = channel();

        let reason = game.reset(&tx).await;
        drop(tx);
        let updates = drain(rx).await;

        assert_eq!(reason, StopReason::HumanToMove);
        assert_eq!(updates.last().unwrap().moves_played, Some(1));
        assert_eq!(game.board().side_to_move(), Side::Black);
    }

    #[tokio::test]
    async fn test_chat_with_human_to_move() {
        let factory = ScriptedFactory::default();
        let mut game = game(&factory, Players::humans());
        let (tx, rx) = channel();

        let reason = game.chat("hello", Some(STARTING_FEN), &tx).await.unwrap();
        drop(tx);
        let updates = drain(rx).await;

        assert_eq!(reason, StopReason::HumanToMove);
        let entries = game.transcript().entries();
        assert_eq!(entries[0], TranscriptEntry::user("hello"));
        assert_eq!(entries[1], TranscriptEntry::assistant(NO_AGENT_MESSAGE));
        assert_eq!(updates.len(), 3);
    }

    #[tokio::test]
    async fn test_chat_uses_unrestricted_and_remote_tools() {
        let factory = ScriptedFactory::new(vec![Ok(ModelResponse::text("Try e4."))]);
        let remote: Arc<dyn Tool> = Arc::new(StructuredTool::new(
            "analyze_position",
            "Engine analysis",
            json!({"type": "object", "properties": {}}),
            Arc::new(|_| Ok("+0.3".to_string())),
        ));
        let mut game = game(&factory, Players::new(agent(), PlayerConfig::Human))
            .with_remote_tools(vec![remote]);
        let (tx, _rx) = channel();

        let reason = game.chat("What should I play?", None, &tx).await.unwrap();

        assert_eq!(reason, StopReason::ChatTurnComplete);
        let created = factory.created();
        assert_eq!(created[0].len(), 7);
        assert_eq!(created[0][6], "analyze_position");
        assert_eq!(game.transcript().last().unwrap().content, "Try e4.");

        // The user entry is replaced by the instruction, not sent twice.
        let sent = &factory.model.requests()[0];
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].text_content(),
            format!("What should I play?\nCurrent board state: {}", STARTING_FEN)
        );
    }

    #[tokio::test]
    async fn test_update_serialization() {
        let factory = ScriptedFactory::default();
        let game = game(&factory, Players::humans());
        let mut update = game.snapshot();
        assert!(serde_json::to_value(&update).unwrap().get("stop").is_none());
        update.stop = Some(StopReason::HumanToMove);
        update.moves_played = Some(0);
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["stop"], "human_to_move");
        assert_eq!(json["fen"], STARTING_FEN);
    }
}
