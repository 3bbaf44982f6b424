//! Core module - client infrastructure shared by every mode
//!
//! # Architecture Overview
//!
//! - [`config`] - [`ClientConfig`] loading with file fallback and human-readable durations
//! - [`logging`] - `tracing` subscriber setup
//! - [`events`] - [`ClientEvent`], the single queue every input is serialized through
//! - [`scheduler`] - posts to that queue and owns cancellable delayed/periodic tasks
//! - [`error`] / [`error_handling`] - core error type and log-and-continue helpers
//!
//! Nothing in the client mutates game state outside the event loop that drains
//! [`ClientEvent`]s, so socket messages, timer callbacks and user moves are
//! always applied one at a time.

pub mod config;
pub mod error;
pub mod error_handling;
pub mod events;
pub mod logging;
pub mod scheduler;

pub use config::ClientConfig;
pub use error::{CoreError, CoreResult};
pub use events::{ClientEvent, UserCommand};
pub use scheduler::{EventReceiver, ScheduledTask, Scheduler};
