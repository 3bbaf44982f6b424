//! Networking module - keeping a local game in step with the server
//!
//! # Module Organization
//!
//! - `transport` - [`transport::Connector`]/[`transport::Link`] seam and the
//!   `tokio-websockets` implementation
//! - `connection` - [`ConnectionManager`]: socket lifecycle, heartbeat, reconnects
//! - `sync` - [`SyncEngine`]: applies server events to the session in order
//! - `api` - HTTP collaborator for game setup, invitations and puzzles
//! - `role` - vs-computer / vs-friend policy
//! - `deep_link` - invitation link parsing
//!
//! # Data Flow
//!
//! ```text
//! local move -> SyncEngine -> GameSession -> ConnectionManager -> socket
//! socket -> ConnectionManager -> InboundEvent -> SyncEngine -> GameSession
//! ```

pub mod api;
pub mod connection;
pub mod deep_link;
pub mod role;
pub mod sync;
pub mod transport;

pub use api::{ApiError, GameDirectory, LichessClient};
pub use connection::{ConnectionEndpoint, ConnectionError, ConnectionManager, ConnectionState};
pub use role::RolePolicy;
pub use sync::{SyncEngine, SyncError, SyncUpdate};
pub use transport::{ConnectionId, Connector, Link, TransportEvent, WebSocketConnector};
