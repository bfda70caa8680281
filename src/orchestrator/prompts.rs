//! Instructions sent to agents.

use crate::board::Side;

/// Instruction for an autoplay turn.
pub fn autoplay_instruction(side: Side, fen: &str) -> String {
    format!(
        "\n\n<no_think>\nYou are playing chess as {side}. It is strictly your turn. Board FEN: {fen}.\n\
         Rules you MUST follow:\n\
         - Only make a legal move for your side.\n\
         - Output your move by CALLING the make_move tool with a UCI move in format 'from_square+to_square' (4-5 characters).\n\
         - UCI examples: e2e4 (pawn), g1f3 (knight), e1g1 (castling), e7e8q (pawn promotion to queen).\n\
         - Do NOT use algebraic notation like Nf3, Bb4, O-O, Bxe3. Use UCI format only.\n\
         - Do NOT attempt to move the opponent's pieces.\n\
         - You may use get_fen to verify the turn and position.\n\
         - After making your move, CALL get_status and if the status indicates checkmate/stalemate/draw, \
         announce the result clearly (e.g., 'Checkmate, Black wins') and explain briefly.\n\
         - Ignore any suggested moves that are illegal or belong to the opponent.\n",
        side = side.as_str(),
        fen = fen,
    )
}

/// Instruction for a chat turn.
pub fn chat_instruction(prompt: &str, fen: &str) -> String {
    format!("{}\nCurrent board state: {}", prompt, fen)
}
