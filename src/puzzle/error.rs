//! Error types for puzzle training

use crate::game::error::{MalformedMoveError, SessionError};
use crate::puzzle::matcher::PuzzleState;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PuzzleError {
    /// Solution lines are not a move tree
    #[error("Invalid puzzle line: {reason}")]
    InvalidLine { reason: String },

    #[error("Unknown puzzle color `{0}`")]
    InvalidColor(String),

    #[error(transparent)]
    Move(#[from] MalformedMoveError),

    #[error(transparent)]
    Session(#[from] SessionError),

    /// Input arrived in a state that does not take it
    #[error("Puzzle cannot {operation} while {state:?}")]
    InvalidState {
        operation: &'static str,
        state: PuzzleState,
    },

    #[error("No puzzle loaded")]
    NoPuzzle,
}

pub type PuzzleResult<T> = Result<T, PuzzleError>;
