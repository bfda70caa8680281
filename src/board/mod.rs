//! Board state authority.
//!
//! Wraps a [`shakmaty::Chess`] position with the bookkeeping the rules engine
//! leaves to its callers: FEN round-tripping, a repetition history for draw
//! claims, and the game-over rules that depend on it.
//!
//! A [`Board`] is owned by one game and shared with that game's tools through
//! a [`BoardHandle`]. The handle lock is short-lived and never held across an
//! await point.

pub mod status;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use shakmaty::fen::Fen;
use shakmaty::san::San;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Move, Position};
use thiserror::Error;

pub use status::{GameStatus, StatusReport};

/// FEN of the standard starting position.
pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Halfmove clock at which a fifty-move draw can be claimed.
const FIFTY_MOVE_PLIES: u32 = 100;

/// Halfmove clock at which the game ends automatically.
const SEVENTY_FIVE_MOVE_PLIES: u32 = 150;

// ---------------------------------------------------------------------------
// Side
// ---------------------------------------------------------------------------

/// One of the two players.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    White,
    Black,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Side::White => "white",
            Side::Black => "black",
        }
    }

    pub fn opponent(self) -> Side {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Color> for Side {
    fn from(color: Color) -> Self {
        match color {
            Color::White => Side::White,
            Color::Black => Side::Black,
        }
    }
}

/// Error returned when a string is not a side name.
#[derive(Debug, Clone, Error)]
#[error("unknown side '{0}', expected 'white' or 'black'")]
pub struct ParseSideError(pub String);

impl FromStr for Side {
    type Err = ParseSideError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "white" | "w" => Ok(Side::White),
            "black" | "b" => Ok(Side::Black),
            _ => Err(ParseSideError(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by the board itself.
#[derive(Debug, Error)]
pub enum BoardError {
    /// The FEN text could not be parsed.
    #[error("invalid FEN '{fen}': {reason}")]
    InvalidFen { fen: String, reason: String },

    /// The FEN parsed but describes an impossible position.
    #[error("invalid position '{fen}': {reason}")]
    InvalidPosition { fen: String, reason: String },
}

// ---------------------------------------------------------------------------
// Board
// ---------------------------------------------------------------------------

/// The authoritative game position plus its repetition history.
#[derive(Debug, Clone)]
pub struct Board {
    position: Chess,
    /// Occurrence count of every position reached since the last FEN
    /// replacement, keyed by [`repetition_key`].
    seen: HashMap<String, u32>,
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

impl Board {
    /// Create a board in the standard starting position.
    pub fn new() -> Self {
        let position = Chess::default();
        let mut board = Self {
            position,
            seen: HashMap::new(),
        };
        board.record_current();
        board
    }

    /// Create a board from a FEN string.
    pub fn from_fen(fen: &str) -> Result<Self, BoardError> {
        let mut board = Self::new();
        board.set_fen(fen)?;
        Ok(board)
    }

    /// Wrap this board in a shareable handle.
    pub fn into_handle(self) -> BoardHandle {
        BoardHandle(Arc::new(Mutex::new(self)))
    }

    /// Current position as a FEN string.
    pub fn fen(&self) -> String {
        Fen::from_position(&self.position, EnPassantMode::Legal).to_string()
    }

    /// Replace the position. History is cleared; on error the board is untouched.
    pub fn set_fen(&mut self, fen: &str) -> Result<String, BoardError> {
        let trimmed = fen.trim();
        let parsed = Fen::from_str(trimmed).map_err(|e| BoardError::InvalidFen {
            fen: trimmed.to_string(),
            reason: e.to_string(),
        })?;
        let position: Chess = parsed
            .into_position(CastlingMode::Standard)
            .map_err(|e| BoardError::InvalidPosition {
                fen: trimmed.to_string(),
                reason: e.to_string(),
            })?;

        self.position = position;
        self.seen.clear();
        self.record_current();
        Ok(self.fen())
    }

    /// Restore the standard starting position.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn side_to_move(&self) -> Side {
        self.position.turn().into()
    }

    /// All legal moves in the current position.
    pub fn legal_moves(&self) -> Vec<Move> {
        self.position.legal_moves().into_iter().collect()
    }

    /// Legal moves rendered as move codes (`e2e4`, `e7e8q`, `e1g1`).
    pub fn legal_move_codes(&self) -> Vec<String> {
        self.position
            .legal_moves()
            .iter()
            .map(|m| move_code(*m))
            .collect()
    }

    /// Resolve a parsed move code against the legal move set.
    pub fn find_legal(&self, code: &UciMove) -> Option<Move> {
        code.to_move(&self.position).ok()
    }

    /// Resolve standard algebraic notation (`Nf3`, `O-O`, `exd5`) to a legal move.
    pub fn parse_san(&self, san: &str) -> Result<Move, String> {
        let cleaned = san.trim().trim_end_matches(['+', '#', '!', '?']);
        let parsed: San = cleaned
            .parse()
            .map_err(|e: shakmaty::san::ParseSanError| format!("invalid san: {}", e))?;
        parsed
            .to_move(&self.position)
            .map_err(|e| format!("{} in {}", e, self.fen()))
    }

    /// Apply a move that is known to be legal.
    pub fn push(&mut self, mv: Move) {
        self.position.play_unchecked(mv);
        self.record_current();
    }

    pub fn is_check(&self) -> bool {
        self.position.is_check()
    }

    pub fn is_checkmate(&self) -> bool {
        self.position.is_checkmate()
    }

    pub fn is_stalemate(&self) -> bool {
        self.position.is_stalemate()
    }

    pub fn is_insufficient_material(&self) -> bool {
        self.position.is_insufficient_material()
    }

    /// How many times the current position has occurred.
    pub fn repetitions(&self) -> u32 {
        self.seen
            .get(&repetition_key(&self.position))
            .copied()
            .unwrap_or(0)
    }

    pub fn can_claim_threefold_repetition(&self) -> bool {
        self.repetitions() >= 3
    }

    pub fn can_claim_fifty_moves(&self) -> bool {
        self.position.halfmoves() >= FIFTY_MOVE_PLIES && !self.position.legal_moves().is_empty()
    }

    pub fn is_fivefold_repetition(&self) -> bool {
        self.repetitions() >= 5
    }

    pub fn is_seventyfive_moves(&self) -> bool {
        self.position.halfmoves() >= SEVENTY_FIVE_MOVE_PLIES
            && !self.position.legal_moves().is_empty()
    }

    /// Whether the game has ended without anyone claiming a draw.
    pub fn is_game_over(&self) -> bool {
        self.position.is_game_over() || self.is_seventyfive_moves() || self.is_fivefold_repetition()
    }

    /// Game result in PGN notation.
    ///
    /// With `claim_draw`, positions where a draw can be claimed count as drawn.
    pub fn result(&self, claim_draw: bool) -> &'static str {
        if self.is_checkmate() {
            return match self.side_to_move() {
                Side::White => "0-1",
                Side::Black => "1-0",
            };
        }
        if self.is_game_over() {
            return "1/2-1/2";
        }
        if claim_draw && (self.can_claim_threefold_repetition() || self.can_claim_fifty_moves()) {
            return "1/2-1/2";
        }
        "*"
    }

    /// Classify the current position.
    pub fn status(&self) -> GameStatus {
        GameStatus::classify(self)
    }

    /// Human-readable snapshot used by the `get_status` tool.
    pub fn status_report(&self) -> StatusReport {
        StatusReport::capture(self)
    }

    fn record_current(&mut self) {
        *self.seen.entry(repetition_key(&self.position)).or_insert(0) += 1;
    }
}

/// Move code (UCI) for a move, with castling written king-to-destination.
pub fn move_code(mv: Move) -> String {
    mv.to_uci(CastlingMode::Standard).to_string()
}

/// Position identity for repetition: placement, side, castling and the
/// legal en-passant square. Move counters are ignored.
fn repetition_key(position: &Chess) -> String {
    Fen::from_position(position, EnPassantMode::Legal)
        .to_string()
        .split_whitespace()
        .take(4)
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// BoardHandle
// ---------------------------------------------------------------------------

/// Shared handle to one game's board.
#[derive(Debug, Clone, Default)]
pub struct BoardHandle(Arc<Mutex<Board>>);

impl BoardHandle {
    pub fn new(board: Board) -> Self {
        board.into_handle()
    }

    /// Lock the board for a short, synchronous section.
    pub fn lock(&self) -> MutexGuard<'_, Board> {
        self.0.lock()
    }

    pub fn fen(&self) -> String {
        self.lock().fen()
    }

    pub fn side_to_move(&self) -> Side {
        self.lock().side_to_move()
    }

    pub fn is_game_over(&self) -> bool {
        self.lock().is_game_over()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
