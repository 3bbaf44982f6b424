//! Events delivered to the client's event loop
//!
//! Socket callbacks, timers, fetch completions and user intents all arrive as
//! a [`ClientEvent`] on one queue. Handlers run one event at a time, which is
//! what makes the sync engine and the puzzle matcher free of locking.

use crate::game::codec::Move;
use crate::networking::api::{ApiError, PuzzleData};
use crate::networking::connection::ConnectionEndpoint;
use crate::networking::transport::{ConnectionId, TransportEvent};
use crate::puzzle::matcher::PuzzleTimer;

#[derive(Debug)]
pub enum ClientEvent {
    /// Lifecycle or message from one transport; stale connections are filtered by id
    Transport {
        connection: ConnectionId,
        event: TransportEvent,
    },
    /// Heartbeat interval elapsed for this connection
    HeartbeatDue { connection: ConnectionId },
    /// Advisory clock countdown, once per second
    ClockTick,
    /// Result of the game fetch triggered by a `reload`
    EndpointFetched(Result<ConnectionEndpoint, ApiError>),
    /// Delayed puzzle action (setup move, opponent reply, take-back)
    Puzzle(PuzzleTimer),
    /// Result of fetching the next training puzzle
    PuzzleFetched(Result<PuzzleData, ApiError>),
    /// Move entered by the local player
    LocalMove(Move),
    /// Non-move input from the local player
    Command(UserCommand),
    /// Tear the screen down
    Shutdown,
}

/// Puzzle review and navigation input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserCommand {
    StepForward,
    StepBackward,
    Restart,
    Abandon,
    NextPuzzle,
}

impl UserCommand {
    /// Parse a typed command word
    pub fn parse(word: &str) -> Option<Self> {
        match word {
            "forward" | "f" => Some(UserCommand::StepForward),
            "back" | "b" => Some(UserCommand::StepBackward),
            "restart" => Some(UserCommand::Restart),
            "giveup" | "resign" => Some(UserCommand::Abandon),
            "next" | "n" => Some(UserCommand::NextPuzzle),
            _ => None,
        }
    }
}
