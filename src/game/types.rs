//! Shared game types
//!
//! Board primitives come straight from `shakmaty`; [`Outcome`] is the
//! client's own view of how a game ended, including endings the rules
//! oracle cannot see (resignation, flag fall).

use std::fmt;

pub use shakmaty::{Color, Role as PieceKind, Square};

/// How the game stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Outcome {
    #[default]
    Pending,
    Checkmate {
        winner: Color,
    },
    Draw,
    Resigned {
        by: Color,
    },
    Timeout {
        winner: Color,
    },
}

impl Outcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Outcome::Pending)
    }

    pub fn winner(&self) -> Option<Color> {
        match *self {
            Outcome::Checkmate { winner } | Outcome::Timeout { winner } => Some(winner),
            Outcome::Resigned { by } => Some(!by),
            Outcome::Pending | Outcome::Draw => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Pending => write!(f, "in progress"),
            Outcome::Checkmate { winner } => write!(f, "checkmate, {} wins", color_name(*winner)),
            Outcome::Draw => write!(f, "draw"),
            Outcome::Resigned { by } => write!(f, "{} resigned", color_name(*by)),
            Outcome::Timeout { winner } => write!(f, "time out, {} wins", color_name(*winner)),
        }
    }
}

/// Lowercase color name as used on the wire
pub fn color_name(color: Color) -> &'static str {
    match color {
        Color::White => "white",
        Color::Black => "black",
    }
}

/// Inverse of [`color_name`]
pub fn parse_color(name: &str) -> Option<Color> {
    match name {
        "white" | "w" => Some(Color::White),
        "black" | "b" => Some(Color::Black),
        _ => None,
    }
}
