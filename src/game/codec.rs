//! Compact move notation
//!
//! The wire carries moves as origin + destination square text (`e2e4`), with
//! the promotion piece appended as a fifth character (`e7e8q`). Castling may
//! be reported with the rook's squares; the accompanying [`CastleInfo`]
//! carries the king's real squares and always wins.

use crate::game::error::MalformedMoveError;
use crate::game::types::{PieceKind, Square};
use shared::protocol::{CastleInfo, ClientMessage, CompactMove};
use std::fmt;
use std::str::FromStr;

/// A move as the rules oracle consumes it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Move {
    pub origin: Square,
    pub destination: Square,
    pub promotion: Option<PieceKind>,
}

impl Move {
    pub fn new(origin: Square, destination: Square) -> Self {
        Self {
            origin,
            destination,
            promotion: None,
        }
    }

    pub fn with_promotion(self, promotion: PieceKind) -> Self {
        Self {
            promotion: Some(promotion),
            ..self
        }
    }

    /// Outbound wire message for this move
    pub fn to_client_message(&self) -> ClientMessage {
        ClientMessage::Move {
            from: self.origin.to_string(),
            to: self.destination.to_string(),
            promotion: self.promotion.map(|role| role.char()),
        }
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.origin, self.destination)?;
        if let Some(role) = self.promotion {
            write!(f, "{}", role.char())?;
        }
        Ok(())
    }
}

impl FromStr for Move {
    type Err = MalformedMoveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode(s, None)
    }
}

/// Parse compact move text.
///
/// When `castle` names the king's squares they replace the literal squares,
/// so a castle reported as `h1f1` still moves the king `e1g1` locally.
pub fn decode(compact: &str, castle: Option<&CastleInfo>) -> Result<Move, MalformedMoveError> {
    if !compact.is_ascii() || !(4..=5).contains(&compact.len()) {
        return Err(MalformedMoveError::Length {
            text: compact.to_owned(),
        });
    }

    let promotion = match compact.chars().nth(4) {
        Some(piece) => Some(parse_promotion(piece)?),
        None => None,
    };

    if let Some((from, to)) = castle.and_then(|c| c.king.as_ref()) {
        return Ok(Move::new(parse_square(from)?, parse_square(to)?));
    }

    Ok(Move {
        origin: parse_square(&compact[0..2])?,
        destination: parse_square(&compact[2..4])?,
        promotion,
    })
}

/// Encode a move as compact text
pub fn encode(mv: &Move) -> CompactMove {
    CompactMove::new(mv.to_string())
}

/// Parse a single square such as `e4`
pub fn parse_square(text: &str) -> Result<Square, MalformedMoveError> {
    text.parse::<Square>()
        .map_err(|_| MalformedMoveError::Square {
            text: text.to_owned(),
        })
}

fn parse_promotion(piece: char) -> Result<PieceKind, MalformedMoveError> {
    match PieceKind::from_char(piece) {
        Some(role @ (PieceKind::Knight | PieceKind::Bishop | PieceKind::Rook | PieceKind::Queen)) => {
            Ok(role)
        }
        _ => Err(MalformedMoveError::Promotion { piece }),
    }
}
