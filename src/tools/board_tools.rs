//! The board tool surface.
//!
//! [`BoardTools`] implements the six board operations with structured
//! results. [`create_base_tools`] wraps them as agent-callable
//! [`StructuredTool`]s that render every outcome to text.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use shakmaty::uci::UciMove;

use super::base_tool::{empty_schema, string_arg, Tool, ToolError, ToolErrorKind};
use super::structured_tool::StructuredTool;
use crate::board::{move_code, BoardHandle, GameStatus, Side, StatusReport};

/// Number of legal moves suggested after an illegal move.
const ILLEGAL_MOVE_SUGGESTIONS: usize = 10;

/// Number of legal moves listed by `get_legal_moves`.
const LEGAL_MOVES_LISTED: usize = 20;

/// Two squares and an optional piece letter. Any piece letter is well formed;
/// whether the promotion is possible is a legality question.
static MOVE_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-h][1-8][a-h][1-8][pnbrqk]?$").expect("valid move code regex"));

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Outcome of an applied move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOutcome {
    pub fen: String,
    pub status: GameStatus,
}

impl fmt::Display for MoveOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} | status={}", self.fen, self.status)
    }
}

/// Legal moves of a position, listed up to a limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegalMoves {
    pub moves: Vec<String>,
}

impl fmt::Display for LegalMoves {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown: Vec<&str> = self
            .moves
            .iter()
            .take(LEGAL_MOVES_LISTED)
            .map(String::as_str)
            .collect();
        write!(f, "Legal moves (UCI format): {}", shown.join(", "))?;
        if self.moves.len() > LEGAL_MOVES_LISTED {
            write!(f, ", ... and {} more", self.moves.len() - LEGAL_MOVES_LISTED)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// BoardTools
// ---------------------------------------------------------------------------

/// Board operations bound to one game, optionally restricted to one side.
#[derive(Debug, Clone)]
pub struct BoardTools {
    board: BoardHandle,
    allowed_side: Option<Side>,
}

impl BoardTools {
    pub fn new(board: BoardHandle, allowed_side: Option<Side>) -> Self {
        Self {
            board,
            allowed_side,
        }
    }

    pub fn get_fen(&self) -> String {
        let fen = self.board.fen();
        log::info!("get_fen: {}", fen);
        fen
    }

    pub fn set_fen(&self, fen: &str) -> Result<String, ToolError> {
        log::info!("set_fen: input={}", fen);
        let result = self.board.lock().set_fen(fen);
        match result {
            Ok(new_fen) => {
                log::info!("set_fen: new_fen={}", new_fen);
                Ok(new_fen)
            }
            Err(e) => {
                log::warn!("set_fen: {}", e);
                Err(ToolError::new(
                    ToolErrorKind::InvalidPosition,
                    fen,
                    e.to_string(),
                ))
            }
        }
    }

    /// Validate and apply a move code.
    ///
    /// Checks run in order: side restriction, move-code shape, legality.
    /// The position is only mutated when all three pass.
    pub fn make_move(&self, code: &str) -> Result<MoveOutcome, ToolError> {
        log::info!("make_move: move={}", code);
        let mut board = self.board.lock();

        if let Some(allowed) = self.allowed_side {
            let current = board.side_to_move();
            if current != allowed {
                log::info!("make_move: rejected, {} to move", current);
                return Err(ToolError::new(
                    ToolErrorKind::NotYourTurn,
                    code,
                    current.as_str(),
                ));
            }
        }

        let trimmed = code.trim();
        if !MOVE_CODE.is_match(trimmed) {
            log::info!("make_move: bad format {:?}", code);
            return Err(ToolError::new(
                ToolErrorKind::InvalidMoveFormat,
                code,
                "expected source square, destination square and optional promotion piece",
            ));
        }

        let legal = trimmed
            .parse::<UciMove>()
            .ok()
            .and_then(|uci| board.find_legal(&uci));
        let Some(mv) = legal else {
            log::info!("make_move: illegal move={}", trimmed);
            let suggestions = board
                .legal_move_codes()
                .into_iter()
                .take(ILLEGAL_MOVE_SUGGESTIONS)
                .collect();
            return Err(ToolError::new(
                ToolErrorKind::IllegalMove,
                code,
                format!("not legal in {}", board.fen()),
            )
            .with_suggestions(suggestions));
        };

        board.push(mv);
        let outcome = MoveOutcome {
            fen: board.fen(),
            status: board.status(),
        };
        log::info!("make_move: ok new_fen={} status={}", outcome.fen, outcome.status);
        Ok(outcome)
    }

    pub fn get_legal_moves(&self) -> LegalMoves {
        let moves = self.board.lock().legal_move_codes();
        let listing = LegalMoves { moves };
        log::info!("get_legal_moves: {}", listing);
        listing
    }

    pub fn convert_move_to_uci(&self, algebraic: &str) -> Result<String, ToolError> {
        log::info!("convert_move_to_uci: input={}", algebraic);
        let board = self.board.lock();
        match board.parse_san(algebraic) {
            Ok(mv) => {
                let code = move_code(mv);
                log::info!("convert_move_to_uci: {} -> {}", algebraic, code);
                Ok(code)
            }
            Err(e) => {
                log::warn!("convert_move_to_uci: {}", e);
                Err(ToolError::new(ToolErrorKind::InvalidSan, algebraic, e))
            }
        }
    }

    pub fn get_status(&self) -> StatusReport {
        let report = self.board.lock().status_report();
        log::info!("get_status: {}", report);
        report
    }
}

// ---------------------------------------------------------------------------
// Agent-facing tools
// ---------------------------------------------------------------------------

fn single_string_schema(name: &str, description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            name: {
                "type": "string",
                "description": description
            }
        },
        "required": [name]
    })
}

/// Build the six board tools for agents.
///
/// With `allowed_side` set, `make_move` refuses to move for the other side.
pub fn create_base_tools(board: BoardHandle, allowed_side: Option<Side>) -> Vec<Arc<dyn Tool>> {
    let ops = BoardTools::new(board, allowed_side);

    let get_fen = {
        let ops = ops.clone();
        StructuredTool::new(
            "get_fen",
            "Get the current FEN string of the chess board.",
            empty_schema(),
            Arc::new(move |_args: HashMap<String, Value>| Ok(ops.get_fen())),
        )
    };

    let set_fen = {
        let ops = ops.clone();
        StructuredTool::new(
            "set_fen",
            "Set the chess board to a specific FEN string. Don't use when you are playing \
             a game, use the `make_move` tool instead.",
            single_string_schema("fen", "The FEN string to set the board to."),
            Arc::new(move |args: HashMap<String, Value>| {
                let fen = string_arg(&args, "fen")?;
                ops.set_fen(fen)
            }),
        )
    };

    let make_move = {
        let ops = ops.clone();
        StructuredTool::new(
            "make_move",
            "Make a move on the chess board and return the new FEN string with the game \
             status. The move must be in UCI format: source square + destination square + \
             promotion piece (if any). Examples: e2e4 (pawn), b1c3 (knight), f1c4 (bishop), \
             e1g1 (kingside castle), e7e8q (pawn promotion to queen).",
            single_string_schema("move", "The move in UCI format, e.g. \"e2e4\"."),
            Arc::new(move |args: HashMap<String, Value>| {
                let code = string_arg(&args, "move")?;
                ops.make_move(code).map(|outcome| outcome.to_string())
            }),
        )
    };

    let get_legal_moves = {
        let ops = ops.clone();
        StructuredTool::new(
            "get_legal_moves",
            "Get all legal moves in UCI format for the current position.",
            empty_schema(),
            Arc::new(move |_args: HashMap<String, Value>| Ok(ops.get_legal_moves().to_string())),
        )
    };

    let convert_move_to_uci = {
        let ops = ops.clone();
        StructuredTool::new(
            "convert_move_to_uci",
            "Convert a move from algebraic notation to UCI format.",
            single_string_schema(
                "algebraic_move",
                "Move in algebraic notation (e.g. \"Nf3\", \"Bxe3\", \"O-O\").",
            ),
            Arc::new(move |args: HashMap<String, Value>| {
                let san = string_arg(&args, "algebraic_move")?;
                ops.convert_move_to_uci(san)
                    .map(|code| format!("UCI format: {}", code))
            }),
        )
    };

    let get_status = StructuredTool::new(
        "get_status",
        "Return a summary of the current game status (turn, check, checkmate, stalemate, result).",
        empty_schema(),
        Arc::new(move |_args: HashMap<String, Value>| Ok(ops.get_status().to_string())),
    );

    vec![
        Arc::new(get_fen),
        Arc::new(set_fen),
        Arc::new(make_move),
        Arc::new(get_legal_moves),
        Arc::new(convert_move_to_uci),
        Arc::new(get_status),
    ]
}
