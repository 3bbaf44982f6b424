//! Chess client that keeps a local game in sync with a lichess-style server
//!
//! - [`core`] - configuration, logging and the single client event queue
//! - [`game`] - move notation, rules oracle, session and clock
//! - [`networking`] - socket lifecycle, the sync engine and the HTTP API
//! - [`puzzle`] - solution trees and the puzzle matcher

pub mod core;
pub mod game;
pub mod networking;
pub mod puzzle;
