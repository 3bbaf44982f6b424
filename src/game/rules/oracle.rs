//! Rules oracle backed by `shakmaty`
//!
//! `shakmaty` positions are immutable values, so undo is a stack of the
//! positions that preceded each applied move.

use crate::game::codec::Move;
use crate::game::error::{SessionError, SessionResult};
use crate::game::types::{Color, PieceKind, Square};
use shakmaty::fen::Fen;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, EnPassantMode, Piece, Position};

/// A legal move with the metadata presentation needs for highlighting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegalMove {
    pub mv: Move,
    pub role: PieceKind,
    pub capture: Option<PieceKind>,
    pub is_castle: bool,
    pub is_en_passant: bool,
}

/// Everything the session asks of a rules engine
pub trait RulesOracle {
    /// Side to move
    fn turn(&self) -> Color;

    fn piece_at(&self, square: Square) -> Option<Piece>;

    fn is_check(&self) -> bool;

    fn is_checkmate(&self) -> bool;

    /// Stalemate, insufficient material or the fifty-move rule
    fn is_draw(&self) -> bool;

    fn is_game_over(&self) -> bool {
        self.is_checkmate() || self.is_draw()
    }

    /// Legal moves, optionally only those starting on `from`
    fn legal_moves(&self, from: Option<Square>) -> Vec<LegalMove>;

    /// Apply `mv` if legal and return the move as played.
    ///
    /// A pawn reaching the last rank without a promotion piece promotes to a
    /// queen. Returns `None` for an illegal move and leaves the position
    /// untouched.
    fn play(&mut self, mv: &Move) -> Option<Move>;

    /// Revert the last applied move. Returns `false` when there is none.
    fn undo(&mut self) -> bool;

    /// Current position as FEN
    fn fen(&self) -> String;
}

/// [`RulesOracle`] over a standard-chess `shakmaty` position
#[derive(Debug, Clone, Default)]
pub struct ShakmatyOracle {
    position: Chess,
    history: Vec<Chess>,
}

impl ShakmatyOracle {
    /// Standard starting position
    pub fn new() -> Self {
        Self::default()
    }

    /// Import a position from FEN
    pub fn from_fen(fen: &str) -> SessionResult<Self> {
        let invalid = |reason: String| SessionError::InvalidPosition {
            fen: fen.to_owned(),
            reason,
        };

        let setup = fen.parse::<Fen>().map_err(|e| invalid(e.to_string()))?;
        let position: Chess = setup
            .into_position(CastlingMode::Standard)
            .map_err(|e| invalid(e.to_string()))?;

        Ok(Self {
            position,
            history: Vec::new(),
        })
    }

    pub fn position(&self) -> &Chess {
        &self.position
    }

    fn resolve(&self, mv: &Move) -> Option<shakmaty::Move> {
        let uci = UciMove::Normal {
            from: mv.origin,
            to: mv.destination,
            promotion: mv.promotion,
        };
        uci.to_move(&self.position).ok()
    }
}

fn to_client_move(m: &shakmaty::Move) -> Option<Move> {
    match m.to_uci(CastlingMode::Standard) {
        UciMove::Normal {
            from,
            to,
            promotion,
        } => Some(Move {
            origin: from,
            destination: to,
            promotion,
        }),
        _ => None,
    }
}

impl RulesOracle for ShakmatyOracle {
    fn turn(&self) -> Color {
        self.position.turn()
    }

    fn piece_at(&self, square: Square) -> Option<Piece> {
        self.position.board().piece_at(square)
    }

    fn is_check(&self) -> bool {
        self.position.is_check()
    }

    fn is_checkmate(&self) -> bool {
        self.position.is_checkmate()
    }

    fn is_draw(&self) -> bool {
        self.position.is_stalemate()
            || self.position.is_insufficient_material()
            || self.position.halfmoves() >= 100
    }

    fn legal_moves(&self, from: Option<Square>) -> Vec<LegalMove> {
        self.position
            .legal_moves()
            .iter()
            .filter(|m| from.map_or(true, |sq| m.from() == Some(sq)))
            .filter_map(|m| {
                Some(LegalMove {
                    mv: to_client_move(m)?,
                    role: m.role(),
                    capture: m.capture(),
                    is_castle: m.is_castle(),
                    is_en_passant: m.is_en_passant(),
                })
            })
            .collect()
    }

    fn play(&mut self, mv: &Move) -> Option<Move> {
        let resolved = self.resolve(mv).or_else(|| {
            if mv.promotion.is_none() {
                self.resolve(&mv.with_promotion(PieceKind::Queen))
            } else {
                None
            }
        })?;
        let played = to_client_move(&resolved)?;

        self.history.push(self.position.clone());
        self.position.play_unchecked(&resolved);
        Some(played)
    }

    fn undo(&mut self) -> bool {
        match self.history.pop() {
            Some(previous) => {
                self.position = previous;
                true
            }
            None => false,
        }
    }

    fn fen(&self) -> String {
        Fen::from_position(self.position.clone(), EnPassantMode::Legal).to_string()
    }
}
