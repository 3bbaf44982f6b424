//! Connection manager - one logical real-time connection
//!
//! A game may traverse several sockets over its lifetime: the server asks for
//! a reload, the client fetches a fresh endpoint and moves over to it.
//! [`ConnectionManager`] owns at most one active [`Link`] at a time and
//! explicitly supersedes it on reconnect, so the game never sees two sockets.
//!
//! # States
//!
//! ```text
//! Disconnected -> Connecting -> Open -> Reconnecting -> Connecting -> Open ... -> Closed
//! ```
//!
//! - The heartbeat runs only while `Open` and is cancelled on every exit
//! - `send` silently drops frames outside `Open`
//! - `reconnect_to` refuses an endpoint whose sequence baseline is behind the
//!   last sequence this manager has seen, and leaves the state untouched
//!
//! Inbound frames and state changes are queued as [`ConnectionNotice`]s for
//! the sync engine to drain after each event.

use crate::core::events::ClientEvent;
use crate::core::scheduler::{ScheduledTask, Scheduler};
use crate::networking::transport::{ConnectionId, Connector, Link, TransportEvent};
use shared::protocol::{ClientMessage, InboundEvent};
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// One reachable socket address plus its sequence baseline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionEndpoint {
    pub url: String,
    pub last_known_event_seq: u64,
}

impl ConnectionEndpoint {
    pub fn new(url: impl Into<String>, last_known_event_seq: u64) -> Self {
        Self {
            url: url.into(),
            last_known_event_seq,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Open,
    Reconnecting,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    /// Offered endpoint is behind what this connection has already seen
    #[error("Stale endpoint: baseline {offered} is behind last seen sequence {held}")]
    StaleEndpoint { offered: u64, held: u64 },

    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: ConnectionState,
    },
}

/// What the manager surfaces to its subscriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionNotice {
    Event(InboundEvent),
    StateChanged(ConnectionState),
}

struct ActiveLink {
    id: ConnectionId,
    endpoint: ConnectionEndpoint,
    link: Box<dyn Link>,
}

pub struct ConnectionManager {
    connector: Box<dyn Connector>,
    scheduler: Scheduler,
    heartbeat_interval: Duration,
    state: ConnectionState,
    active: Option<ActiveLink>,
    next_id: u64,
    last_seen_seq: u64,
    heartbeat: Option<ScheduledTask>,
    notices: VecDeque<ConnectionNotice>,
}

impl ConnectionManager {
    pub fn new(
        connector: Box<dyn Connector>,
        scheduler: Scheduler,
        heartbeat_interval: Duration,
    ) -> Self {
        Self {
            connector,
            scheduler,
            heartbeat_interval,
            state: ConnectionState::Disconnected,
            active: None,
            next_id: 0,
            last_seen_seq: 0,
            heartbeat: None,
            notices: VecDeque::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Id of the socket currently owned, if any
    pub fn active_id(&self) -> Option<ConnectionId> {
        self.active.as_ref().map(|active| active.id)
    }

    pub fn endpoint(&self) -> Option<&ConnectionEndpoint> {
        self.active.as_ref().map(|active| &active.endpoint)
    }

    /// Highest sequence seen on any socket of this connection
    pub fn last_seen_seq(&self) -> u64 {
        self.last_seen_seq
    }

    pub fn is_heartbeat_running(&self) -> bool {
        self.heartbeat.is_some()
    }

    /// Open the first socket of this connection
    pub fn connect(&mut self, endpoint: ConnectionEndpoint) -> Result<(), ConnectionError> {
        if self.state != ConnectionState::Disconnected {
            return Err(ConnectionError::InvalidState {
                operation: "connect",
                state: self.state,
            });
        }

        self.last_seen_seq = self.last_seen_seq.max(endpoint.last_known_event_seq);
        self.open(endpoint);
        Ok(())
    }

    /// Leave `Open` while a fresh endpoint is being fetched
    pub fn begin_reconnect(&mut self) -> Result<(), ConnectionError> {
        match self.state {
            ConnectionState::Reconnecting => Ok(()),
            ConnectionState::Open => {
                self.stop_heartbeat();
                self.set_state(ConnectionState::Reconnecting);
                Ok(())
            }
            state => Err(ConnectionError::InvalidState {
                operation: "begin a reconnect",
                state,
            }),
        }
    }

    /// Replace the active socket with one on `endpoint`.
    ///
    /// # Errors
    ///
    /// - [`ConnectionError::InvalidState`] outside `Open`/`Reconnecting`
    /// - [`ConnectionError::StaleEndpoint`] when the endpoint's baseline is
    ///   behind [`Self::last_seen_seq`]; the current socket and state are kept
    pub fn reconnect_to(&mut self, endpoint: ConnectionEndpoint) -> Result<(), ConnectionError> {
        if !matches!(
            self.state,
            ConnectionState::Open | ConnectionState::Reconnecting
        ) {
            return Err(ConnectionError::InvalidState {
                operation: "reconnect",
                state: self.state,
            });
        }
        if endpoint.last_known_event_seq < self.last_seen_seq {
            return Err(ConnectionError::StaleEndpoint {
                offered: endpoint.last_known_event_seq,
                held: self.last_seen_seq,
            });
        }

        info!(
            "[NETWORK] Reconnecting to {} (baseline {})",
            endpoint.url, endpoint.last_known_event_seq
        );
        self.detach();
        self.last_seen_seq = endpoint.last_known_event_seq;
        self.open(endpoint);
        Ok(())
    }

    /// Give up a pending reconnect and keep using the current socket
    pub fn abort_reconnect(&mut self) {
        if self.state != ConnectionState::Reconnecting {
            return;
        }
        match self.active_id() {
            Some(id) => {
                self.set_state(ConnectionState::Open);
                self.start_heartbeat(id);
            }
            None => self.set_state(ConnectionState::Closed),
        }
    }

    /// Feed a transport event; events from superseded sockets are dropped
    pub fn handle_transport(&mut self, id: ConnectionId, event: TransportEvent) {
        if self.active_id() != Some(id) {
            debug!("[NETWORK] Ignoring {:?} from stale connection {}", event, id);
            return;
        }

        match event {
            TransportEvent::Opened => {
                if self.state == ConnectionState::Connecting {
                    info!("[NETWORK] Connection {} open", id);
                    self.set_state(ConnectionState::Open);
                    self.start_heartbeat(id);
                }
            }
            TransportEvent::Text(text) => match InboundEvent::parse(&text) {
                Ok(Some(event)) => {
                    if let Some(seq) = event.seq() {
                        self.last_seen_seq = self.last_seen_seq.max(seq);
                    }
                    self.notices.push_back(ConnectionNotice::Event(event));
                }
                Ok(None) => debug!("[NETWORK] Ignoring frame: {}", text),
                Err(e) => warn!("[NETWORK] Undecodable frame on {}: {}", id, e),
            },
            TransportEvent::Error(message) => {
                warn!("[NETWORK] Transport error on {}: {}", id, message);
            }
            TransportEvent::Closed => {
                info!("[NETWORK] Connection {} closed by peer", id);
                self.detach();
                // A pending reconnect still owns the connection; the new
                // endpoint (or abort_reconnect) decides what comes next
                if self.state != ConnectionState::Reconnecting {
                    self.set_state(ConnectionState::Closed);
                }
            }
        }
    }

    /// Heartbeat tick for `id`: send a ping carrying the applied ply count
    pub fn heartbeat(&mut self, id: ConnectionId, ply: u32) -> bool {
        if self.active_id() != Some(id) {
            return false;
        }
        self.send(&ClientMessage::Ping { ply })
    }

    /// Send a frame. Dropped, not queued, unless the connection is `Open`.
    pub fn send(&mut self, message: &ClientMessage) -> bool {
        if self.state != ConnectionState::Open {
            debug!("[NETWORK] Dropping {:?} while {}", message, self.state);
            return false;
        }
        let Some(active) = self.active.as_mut() else {
            return false;
        };
        match message.to_text() {
            Ok(text) => active.link.send(text),
            Err(e) => {
                warn!("[NETWORK] Could not encode {:?}: {}", message, e);
                false
            }
        }
    }

    /// Tear the connection down for good
    pub fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        self.detach();
        self.set_state(ConnectionState::Closed);
    }

    pub fn drain_notices(&mut self) -> Vec<ConnectionNotice> {
        self.notices.drain(..).collect()
    }

    fn open(&mut self, endpoint: ConnectionEndpoint) {
        self.next_id += 1;
        let id = ConnectionId(self.next_id);
        let link = self.connector.open(id, &endpoint.url, &self.scheduler);
        self.active = Some(ActiveLink { id, endpoint, link });
        self.set_state(ConnectionState::Connecting);
    }

    fn detach(&mut self) {
        self.stop_heartbeat();
        if let Some(mut active) = self.active.take() {
            debug!("[NETWORK] Detaching connection {}", active.id);
            active.link.close();
        }
    }

    fn start_heartbeat(&mut self, id: ConnectionId) {
        self.heartbeat = Some(
            self.scheduler
                .every(self.heartbeat_interval, move || ClientEvent::HeartbeatDue {
                    connection: id,
                }),
        );
    }

    fn stop_heartbeat(&mut self) {
        if let Some(task) = self.heartbeat.take() {
            task.cancel();
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state == state {
            return;
        }
        debug!("[NETWORK] {} -> {}", self.state, state);
        self.state = state;
        self.notices.push_back(ConnectionNotice::StateChanged(state));
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state)
            .field("active", &self.active_id())
            .field("last_seen_seq", &self.last_seen_seq)
            .finish()
    }
}
