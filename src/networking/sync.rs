//! Sync engine - reconciles the local session with the server's event stream
//!
//! Every input reaches the engine as a [`ClientEvent`] from the one event
//! queue, so it never needs a lock. Ordering is the hard part and is handled
//! by three rules:
//!
//! - **Sequence filter**: a server move is applied only if its `seq` is at
//!   least the local ply count and above the last applied `seq`. Replays after
//!   a reconnect and echoes of our own moves are dropped.
//! - **Batch order**: a batch is applied in the order the server sent it; a
//!   mate or game end inside it stops the rest of the batch.
//! - **One reconnect at a time**: a `reload` starts a single game fetch; any
//!   further `reload` while it is pending is folded into it.
//!
//! Clock snapshots are applied whenever present, even on a dropped move,
//! since the server clock is authoritative and is not game state.
//!
//! # Outputs
//!
//! Changes presentation needs to know about are queued as [`SyncUpdate`]s and
//! drained with [`SyncEngine::drain_updates`].

use crate::core::error_handling::log_and_discard;
use crate::core::events::ClientEvent;
use crate::core::scheduler::{ScheduledTask, Scheduler};
use crate::game::clock::GameClock;
use crate::game::codec::{self, Move};
use crate::game::error::SessionError;
use crate::game::rules::RulesOracle;
use crate::game::session::{GameSession, GameState};
use crate::game::types::{color_name, Color, Outcome};
use crate::networking::api::{ApiError, GameDirectory};
use crate::networking::connection::{
    ConnectionEndpoint, ConnectionError, ConnectionManager, ConnectionNotice, ConnectionState,
};
use crate::networking::role::RolePolicy;
use shared::protocol::{ClockSnapshot, GameStatus, InboundEvent, MoveEvent, Victor};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const CLOCK_TICK: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Local input for a piece or turn that is not ours
    #[error("It is not {color}'s move from {square}")]
    NotLocalMove { color: &'static str, square: String },
}

/// Something presentation should react to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncUpdate {
    MoveApplied {
        mv: Move,
        state: GameState,
        local: bool,
    },
    ClockUpdated(ClockSnapshot),
    LowTime(Color),
    GameOver(Outcome),
    Connection(ConnectionState),
}

#[derive(Debug)]
struct PendingReload {
    baseline: u64,
    _fetch: ScheduledTask,
}

pub struct SyncEngine {
    session: GameSession,
    connection: ConnectionManager,
    role: RolePolicy,
    directory: Arc<dyn GameDirectory>,
    scheduler: Scheduler,
    game_id: String,
    clock: GameClock,
    clock_ticker: Option<ScheduledTask>,
    pending_reload: Option<PendingReload>,
    last_applied_seq: Option<u64>,
    updates: VecDeque<SyncUpdate>,
}

impl SyncEngine {
    pub fn new(
        session: GameSession,
        connection: ConnectionManager,
        role: RolePolicy,
        directory: Arc<dyn GameDirectory>,
        scheduler: Scheduler,
        game_id: impl Into<String>,
        clock: GameClock,
    ) -> Self {
        Self {
            session,
            connection,
            role,
            directory,
            scheduler,
            game_id: game_id.into(),
            clock,
            clock_ticker: None,
            pending_reload: None,
            last_applied_seq: None,
            updates: VecDeque::new(),
        }
    }

    /// Open the first connection and start the advisory clock
    pub fn start(&mut self, endpoint: ConnectionEndpoint) -> Result<(), SyncError> {
        info!("[SYNC] Starting game {}: {}", self.game_id, self.role.describe());
        self.connection.connect(endpoint)?;
        if !self.clock.is_unlimited() {
            self.clock_ticker = Some(self.scheduler.every(CLOCK_TICK, || ClientEvent::ClockTick));
        }
        self.pump();
        Ok(())
    }

    /// Dispatch one event from the queue
    pub fn handle(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::Transport { connection, event } => {
                self.connection.handle_transport(connection, event);
            }
            ClientEvent::HeartbeatDue { connection } => {
                self.connection
                    .heartbeat(connection, self.session.ply_count());
            }
            ClientEvent::ClockTick => self.on_clock_tick(),
            ClientEvent::EndpointFetched(result) => self.on_endpoint_fetched(result),
            ClientEvent::LocalMove(mv) => {
                log_and_discard(self.on_local_move(mv), "local move");
            }
            ClientEvent::Puzzle(_) | ClientEvent::PuzzleFetched(_) | ClientEvent::Command(_) => {
                debug!("[SYNC] Ignoring puzzle input during a game");
            }
            ClientEvent::Shutdown => self.teardown(),
        }
        self.pump();
    }

    /// Apply a move made on this device and forward it to the server.
    ///
    /// The move is applied before the server confirms it. It is sent only
    /// when it hands the turn to the opponent; if the connection is not open
    /// it stays applied locally and is not resent.
    pub fn on_local_move(&mut self, mv: Move) -> Result<GameState, SyncError> {
        let local = self.role.local_color;
        if self.session.is_over() {
            return Err(SessionError::GameOver {
                outcome: self.session.outcome(),
            }
            .into());
        }
        if !self.session.can_select(mv.origin, local) {
            return Err(SyncError::NotLocalMove {
                color: color_name(local),
                square: mv.origin.to_string(),
            });
        }

        let seq = u64::from(self.session.ply_count());
        let state = self.session.apply_move(mv)?;
        self.last_applied_seq = Some(seq);
        let played = state.last_move.unwrap_or(mv);

        if state.turn_to_move != local && !self.connection.send(&played.to_client_message()) {
            info!(
                "[SYNC] Connection is {}; {} kept locally only",
                self.connection.state(),
                played
            );
        }

        self.updates.push_back(SyncUpdate::MoveApplied {
            mv: played,
            state: state.clone(),
            local: true,
        });
        self.after_move(&state);
        Ok(state)
    }

    /// Classify one server event and apply it
    pub fn on_inbound_event(&mut self, event: InboundEvent) {
        match event {
            InboundEvent::Move(mv) => self.on_remote_move(mv),
            InboundEvent::Batch(events) => {
                for event in events {
                    let terminal = match &event {
                        InboundEvent::Move(mv) => mv.is_mate(),
                        InboundEvent::GameEnd { .. } => true,
                        _ => false,
                    };
                    self.on_inbound_event(event);
                    if terminal {
                        debug!("[SYNC] Terminal event ends batch");
                        break;
                    }
                }
            }
            InboundEvent::Reload { seq } => self.on_reload(seq),
            InboundEvent::GameEnd { victor, status } => self.on_game_end(victor, status),
            InboundEvent::Heartbeat => {}
        }
    }

    /// Stop everything this engine scheduled and close the connection
    pub fn teardown(&mut self) {
        info!("[SYNC] Tearing down game {}", self.game_id);
        self.clock_ticker = None;
        self.pending_reload = None;
        self.connection.close();
    }

    pub fn drain_updates(&mut self) -> Vec<SyncUpdate> {
        self.updates.drain(..).collect()
    }

    pub fn session(&self) -> &GameSession {
        &self.session
    }

    pub fn state(&self) -> GameState {
        self.session.state()
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn clock(&self) -> &GameClock {
        &self.clock
    }

    pub fn role(&self) -> &RolePolicy {
        &self.role
    }

    pub fn last_applied_seq(&self) -> Option<u64> {
        self.last_applied_seq
    }

    pub fn is_reconnect_pending(&self) -> bool {
        self.pending_reload.is_some()
    }

    /// Move connection notices into the engine until none are left
    fn pump(&mut self) {
        loop {
            let notices = self.connection.drain_notices();
            if notices.is_empty() {
                break;
            }
            for notice in notices {
                match notice {
                    ConnectionNotice::Event(event) => self.on_inbound_event(event),
                    ConnectionNotice::StateChanged(state) => {
                        self.updates.push_back(SyncUpdate::Connection(state));
                    }
                }
            }
        }
    }

    fn on_remote_move(&mut self, event: MoveEvent) {
        if let Some(snapshot) = event.clock {
            self.clock.apply_snapshot(snapshot);
            self.updates.push_back(SyncUpdate::ClockUpdated(snapshot));
        }

        let ply = u64::from(self.session.ply_count());
        let replayed = self.last_applied_seq.is_some_and(|last| event.seq <= last);
        if event.seq < ply || replayed {
            debug!(
                "[SYNC] Dropping move {} with seq {} (ply {}, last applied {:?})",
                event.uci, event.seq, ply, self.last_applied_seq
            );
            return;
        }

        let Some(mv) = log_and_discard(
            codec::decode(event.uci.as_str(), event.castle.as_ref()),
            "decoding server move",
        ) else {
            return;
        };

        let state = match self.session.apply_move(mv) {
            Ok(state) => state,
            Err(e) => {
                warn!("[SYNC] Server move {} (seq {}) not applied: {}", mv, event.seq, e);
                return;
            }
        };
        self.last_applied_seq = Some(event.seq);
        debug!("[SYNC] Applied server move {} (seq {})", mv, event.seq);

        self.updates.push_back(SyncUpdate::MoveApplied {
            mv: state.last_move.unwrap_or(mv),
            state: state.clone(),
            local: false,
        });

        if event.is_mate() && !state.outcome.is_terminal() {
            self.latch(Outcome::Checkmate {
                winner: !state.turn_to_move,
            });
        } else {
            self.after_move(&state);
        }
    }

    fn on_reload(&mut self, seq: u64) {
        if let Some(pending) = self.pending_reload.as_mut() {
            if seq > pending.baseline {
                pending.baseline = seq;
            }
            debug!(
                "[SYNC] Reload {} folded into pending reconnect (baseline {})",
                seq, pending.baseline
            );
            return;
        }

        if let Some(applied) = self.last_applied_seq.filter(|applied| seq < *applied) {
            debug!(
                "[SYNC] Ignoring reload {}: already applied sequence {}",
                seq, applied
            );
            return;
        }

        if let Err(e) = self.connection.begin_reconnect() {
            warn!("[SYNC] Ignoring reload {}: {}", seq, e);
            return;
        }

        info!("[SYNC] Reload {}: fetching game {}", seq, self.game_id);
        let directory = Arc::clone(&self.directory);
        let game_id = self.game_id.clone();
        let fetch = self.scheduler.spawn(async move {
            ClientEvent::EndpointFetched(directory.fetch_game(&game_id).await)
        });
        self.pending_reload = Some(PendingReload {
            baseline: seq,
            _fetch: fetch,
        });
    }

    fn on_endpoint_fetched(&mut self, result: Result<ConnectionEndpoint, ApiError>) {
        let Some(pending) = self.pending_reload.take() else {
            debug!("[SYNC] Endpoint arrived with no reconnect pending");
            return;
        };

        let outcome = result
            .map_err(|e| e.to_string())
            .and_then(|endpoint| {
                self.connection
                    .reconnect_to(endpoint)
                    .map_err(|e| e.to_string())
            });

        if let Err(reason) = outcome {
            warn!(
                "[SYNC] Reconnect for reload {} dropped: {}",
                pending.baseline, reason
            );
            self.connection.abort_reconnect();
        }
    }

    fn on_game_end(&mut self, victor: Victor, status: Option<GameStatus>) {
        let outcome = match victor {
            Victor::Draw => Outcome::Draw,
            Victor::White => self.decisive_outcome(Color::White, status),
            Victor::Black => self.decisive_outcome(Color::Black, status),
        };
        self.latch(outcome);
        self.clock_ticker = None;
    }

    fn decisive_outcome(&self, winner: Color, status: Option<GameStatus>) -> Outcome {
        match status {
            Some(GameStatus::Mate) => Outcome::Checkmate { winner },
            Some(GameStatus::Resign) => Outcome::Resigned { by: !winner },
            Some(GameStatus::OutOfTime) => Outcome::Timeout { winner },
            Some(GameStatus::Draw | GameStatus::Stalemate) => Outcome::Draw,
            Some(GameStatus::Other(_)) | None => {
                if self.session.oracle().is_checkmate() {
                    Outcome::Checkmate { winner }
                } else {
                    Outcome::Resigned { by: !winner }
                }
            }
        }
    }

    fn latch(&mut self, outcome: Outcome) {
        if self.session.latch_outcome(outcome) {
            self.updates.push_back(SyncUpdate::GameOver(outcome));
        }
    }

    fn after_move(&mut self, state: &GameState) {
        if state.outcome.is_terminal() {
            self.clock_ticker = None;
            self.updates.push_back(SyncUpdate::GameOver(state.outcome));
        }
    }

    fn on_clock_tick(&mut self) {
        if self.session.is_over() || self.connection.state() != ConnectionState::Open {
            return;
        }
        // The clock only runs once both sides have moved
        if self.session.ply_count() < 2 {
            return;
        }
        let side = self.session.turn();
        if self.clock.tick(side) {
            self.updates.push_back(SyncUpdate::LowTime(side));
        }
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("game_id", &self.game_id)
            .field("ply_count", &self.session.ply_count())
            .field("connection", &self.connection)
            .field("last_applied_seq", &self.last_applied_seq)
            .finish()
    }
}
