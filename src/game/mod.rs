//! Chess game model - the local side of a synchronized game
//!
//! Pure game logic with no I/O. Everything here is driven by the sync engine
//! (network games) or the puzzle matcher (training).
//!
//! # Module Organization
//!
//! - `codec` - compact move notation (`e2e4`, `e7e8q`) to and from [`codec::Move`]
//! - `rules` - the rules oracle seam and its `shakmaty` implementation
//! - `session` - [`session::GameSession`]: ply count, turn and outcome bookkeeping
//! - `clock` - authoritative clock snapshots with an advisory countdown
//! - `types` - [`types::Outcome`] and re-exported board primitives
//! - `error` - codec and session errors

pub mod clock;
pub mod codec;
pub mod error;
pub mod rules;
pub mod session;
pub mod types;

pub use codec::Move;
pub use error::{MalformedMoveError, SessionError};
pub use session::{GameSession, GameState};
pub use types::{Color, Outcome, PieceKind, Square};
