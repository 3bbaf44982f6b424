//! Puzzle training
//!
//! - `tree` - [`PuzzleTree`], the nested solution lines as served
//! - `matcher` - [`PuzzleMatcher`], validating moves and auto-playing replies
//! - `error` - [`PuzzleError`]

pub mod error;
pub mod matcher;
pub mod tree;

pub use error::{PuzzleError, PuzzleResult};
pub use matcher::{MoveOutcome, Puzzle, PuzzleMatcher, PuzzleState, PuzzleTimer};
pub use tree::PuzzleTree;
