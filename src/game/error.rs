//! Error types for game module
//!
//! Provides custom error types for move notation and session bookkeeping.

use crate::game::codec::Move;
use crate::game::types::Outcome;

/// Compact move text that does not describe a move
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedMoveError {
    /// Not 4 (or 5, with promotion) ASCII characters
    #[error("Malformed move `{text}`: expected 4 or 5 ASCII characters")]
    Length { text: String },

    /// Origin or destination is not a square
    #[error("Malformed move: `{text}` is not a board square")]
    Square { text: String },

    /// Fifth character is not a promotion piece
    #[error("Malformed move: `{piece}` is not a promotion piece")]
    Promotion { piece: char },
}

/// Errors that can occur while applying or reverting moves
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The rules oracle rejected the move
    #[error("Illegal move: {mv}")]
    IllegalMove { mv: Move },

    /// A terminal outcome is latched
    #[error("Game is over ({outcome})")]
    GameOver { outcome: Outcome },

    /// Undo with no applied moves
    #[error("Nothing to undo")]
    NothingToUndo,

    /// Starting position could not be imported
    #[error("Invalid position `{fen}`: {reason}")]
    InvalidPosition { fen: String, reason: String },
}

/// Result type alias for session operations
pub type SessionResult<T> = Result<T, SessionError>;
