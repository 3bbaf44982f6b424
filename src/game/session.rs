//! Game session - one rules oracle plus ply/turn/outcome bookkeeping
//!
//! [`GameSession`] is the only thing that mutates a position. Local moves,
//! server moves and puzzle replies all go through [`GameSession::apply_move`],
//! which keeps three invariants:
//!
//! - `ply_count` grows by exactly one per applied move and only shrinks via
//!   [`GameSession::undo_last`]
//! - the turn reported in [`GameState`] is always the oracle's turn
//! - once a terminal [`Outcome`] is latched every further move is refused
//!
//! Outcomes the oracle can see (checkmate, draw) are derived after each move.
//! Outcomes it cannot see (resignation, flag fall) arrive from the server and
//! are latched with [`GameSession::latch_outcome`].

use crate::game::codec::Move;
use crate::game::error::{SessionError, SessionResult};
use crate::game::rules::{LegalMove, RulesOracle, ShakmatyOracle};
use crate::game::types::{Color, Outcome, Square};
use tracing::{debug, info};

/// Snapshot of the session handed to presentation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameState {
    pub fen: String,
    pub ply_count: u32,
    pub turn_to_move: Color,
    pub outcome: Outcome,
    pub last_move: Option<Move>,
    pub in_check: bool,
}

#[derive(Debug, Clone)]
pub struct GameSession<O: RulesOracle = ShakmatyOracle> {
    oracle: O,
    ply_count: u32,
    outcome: Outcome,
    moves: Vec<Move>,
}

impl GameSession<ShakmatyOracle> {
    /// Session at the standard starting position
    pub fn new() -> Self {
        Self::with_oracle(ShakmatyOracle::new())
    }

    /// Session seeded from a FEN position (puzzles start mid-game)
    pub fn from_fen(fen: &str) -> SessionResult<Self> {
        Ok(Self::with_oracle(ShakmatyOracle::from_fen(fen)?))
    }
}

impl Default for GameSession<ShakmatyOracle> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: RulesOracle> GameSession<O> {
    pub fn with_oracle(oracle: O) -> Self {
        let mut session = Self {
            oracle,
            ply_count: 0,
            outcome: Outcome::Pending,
            moves: Vec::new(),
        };
        session.outcome = session.derive_outcome();
        session
    }

    /// Apply a move after checking it with the oracle.
    ///
    /// # Errors
    ///
    /// - [`SessionError::GameOver`] once an outcome is latched
    /// - [`SessionError::IllegalMove`] when the oracle rejects the move
    pub fn apply_move(&mut self, mv: Move) -> SessionResult<GameState> {
        if self.outcome.is_terminal() {
            return Err(SessionError::GameOver {
                outcome: self.outcome,
            });
        }

        let played = self
            .oracle
            .play(&mv)
            .ok_or(SessionError::IllegalMove { mv })?;

        self.ply_count += 1;
        self.moves.push(played);
        self.outcome = self.derive_outcome();

        debug!(
            "[SESSION] Applied {} (ply {}, {:?} to move)",
            played,
            self.ply_count,
            self.oracle.turn()
        );
        if self.outcome.is_terminal() {
            info!("[SESSION] Game over: {}", self.outcome);
        }

        Ok(self.state())
    }

    /// Revert exactly one ply
    pub fn undo_last(&mut self) -> SessionResult<GameState> {
        if self.moves.is_empty() || !self.oracle.undo() {
            return Err(SessionError::NothingToUndo);
        }

        self.moves.pop();
        self.ply_count -= 1;
        self.outcome = self.derive_outcome();
        Ok(self.state())
    }

    /// Whether `color` may pick up the piece on `square` right now
    pub fn can_select(&self, square: Square, color: Color) -> bool {
        !self.outcome.is_terminal()
            && self.oracle.turn() == color
            && self
                .oracle
                .piece_at(square)
                .is_some_and(|piece| piece.color == color)
    }

    /// Latch an outcome reported from outside the oracle.
    ///
    /// Returns `false` if a terminal outcome was already latched; the first
    /// one wins.
    pub fn latch_outcome(&mut self, outcome: Outcome) -> bool {
        if self.outcome.is_terminal() || !outcome.is_terminal() {
            return false;
        }
        info!("[SESSION] Outcome latched: {}", outcome);
        self.outcome = outcome;
        true
    }

    pub fn state(&self) -> GameState {
        GameState {
            fen: self.oracle.fen(),
            ply_count: self.ply_count,
            turn_to_move: self.oracle.turn(),
            outcome: self.outcome,
            last_move: self.moves.last().copied(),
            in_check: self.oracle.is_check(),
        }
    }

    pub fn ply_count(&self) -> u32 {
        self.ply_count
    }

    pub fn turn(&self) -> Color {
        self.oracle.turn()
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn is_over(&self) -> bool {
        self.outcome.is_terminal()
    }

    pub fn fen(&self) -> String {
        self.oracle.fen()
    }

    /// Moves applied since the session started, oldest first
    pub fn history(&self) -> &[Move] {
        &self.moves
    }

    /// Legal moves of the piece on `square`, for highlighting
    pub fn legal_moves_from(&self, square: Square) -> Vec<LegalMove> {
        if self.is_over() {
            return Vec::new();
        }
        self.oracle.legal_moves(Some(square))
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    fn derive_outcome(&self) -> Outcome {
        if self.oracle.is_checkmate() {
            Outcome::Checkmate {
                winner: !self.oracle.turn(),
            }
        } else if self.oracle.is_draw() {
            Outcome::Draw
        } else {
            Outcome::Pending
        }
    }
}
