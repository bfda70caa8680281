//! Position classification.

use std::fmt;

use serde::Serialize;

use super::{Board, Side};

/// Outcome class of a position, checked in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GameStatus {
    /// The side to move is mated; `winner` is the other side.
    Checkmate { winner: Side },
    Stalemate,
    InsufficientMaterial,
    /// Threefold repetition reached; a draw may be claimed.
    ThreefoldClaimAvailable,
    /// Fifty moves without capture or pawn move; a draw may be claimed.
    FiftyMoveClaimAvailable,
    Ongoing,
}

impl GameStatus {
    pub fn classify(board: &Board) -> Self {
        if board.is_checkmate() {
            GameStatus::Checkmate {
                winner: board.side_to_move().opponent(),
            }
        } else if board.is_stalemate() {
            GameStatus::Stalemate
        } else if board.is_insufficient_material() {
            GameStatus::InsufficientMaterial
        } else if board.can_claim_threefold_repetition() {
            GameStatus::ThreefoldClaimAvailable
        } else if board.can_claim_fifty_moves() {
            GameStatus::FiftyMoveClaimAvailable
        } else {
            GameStatus::Ongoing
        }
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameStatus::Checkmate { winner } => write!(f, "checkmate:{}", winner),
            GameStatus::Stalemate => f.write_str("stalemate"),
            GameStatus::InsufficientMaterial => f.write_str("draw:insufficient_material"),
            GameStatus::ThreefoldClaimAvailable => {
                f.write_str("draw:threefold_repetition_claim_available")
            }
            GameStatus::FiftyMoveClaimAvailable => {
                f.write_str("draw:fifty_move_rule_claim_available")
            }
            GameStatus::Ongoing => f.write_str("ongoing"),
        }
    }
}

/// Snapshot reported by the `get_status` tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub fen: String,
    pub turn: Side,
    pub checkmate: bool,
    pub stalemate: bool,
    pub check: bool,
    /// PGN result, counting claimable draws as drawn.
    pub result: String,
}

impl StatusReport {
    pub fn capture(board: &Board) -> Self {
        Self {
            fen: board.fen(),
            turn: board.side_to_move(),
            checkmate: board.is_checkmate(),
            stalemate: board.is_stalemate(),
            check: board.is_check(),
            result: board.result(true).to_string(),
        }
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FEN={} | turn={}", self.fen, self.turn)?;
        if self.checkmate {
            f.write_str(", checkmate")?;
        }
        if self.stalemate {
            f.write_str(", stalemate")?;
        }
        if self.check {
            f.write_str(", check")?;
        }
        write!(f, ", result={}", self.result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_ongoing_at_start() {
        let board = Board::new();
        assert_eq!(board.status(), GameStatus::Ongoing);
        assert_eq!(board.status().to_string(), "ongoing");
    }

    #[test]
    fn test_status_checkmate_names_winner() {
        // Fool's mate, white to move and mated.
        let board =
            Board::from_fen("rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3")
                .unwrap();
        assert_eq!(
            board.status(),
            GameStatus::Checkmate {
                winner: Side::Black
            }
        );
        assert_eq!(board.status().to_string(), "checkmate:black");
    }

    #[test]
    fn test_status_stalemate() {
        let board = Board::from_fen("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1").unwrap();
        assert_eq!(board.status(), GameStatus::Stalemate);
    }

    #[test]
    fn test_status_insufficient_material() {
        let board = Board::from_fen("8/8/4k3/8/8/4K3/8/8 w - - 0 1").unwrap();
        assert_eq!(board.status().to_string(), "draw:insufficient_material");
    }

    #[test]
    fn test_status_fifty_move_claim() {
        let board = Board::from_fen("8/8/4k3/8/8/4K3/4R3/8 w - - 100 80").unwrap();
        assert_eq!(
            board.status().to_string(),
            "draw:fifty_move_rule_claim_available"
        );
    }

    #[test]
    fn test_checkmate_outranks_fifty_move_claim() {
        let board =
            Board::from_fen("rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 100 60")
                .unwrap();
        assert!(matches!(board.status(), GameStatus::Checkmate { .. }));
    }

    #[test]
    fn test_status_report_format() {
        let board = Board::new();
        let report = board.status_report().to_string();
        assert_eq!(
            report,
            "FEN=rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1 | turn=white, result=*"
        );

        let mated =
            Board::from_fen("rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3")
                .unwrap();
        let report = mated.status_report().to_string();
        assert!(report.contains("turn=white, checkmate, check, result=0-1"));
    }
}
