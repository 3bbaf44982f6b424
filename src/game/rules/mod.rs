//! Chess rules module - the rules oracle seam
//!
//! The client never decides legality itself. [`RulesOracle`] is the narrow
//! interface the session needs (turn, legal moves, apply/undo, outcome
//! predicates, FEN export) and [`ShakmatyOracle`] implements it on top of
//! `shakmaty`.
//!
//! # Module Structure
//!
//! - `oracle` - [`RulesOracle`], [`LegalMove`] and [`ShakmatyOracle`]

pub mod oracle;


// Re-export commonly used items
pub use oracle::{LegalMove, RulesOracle, ShakmatyOracle};
