//! Error handling utilities for event handlers
//!
//! Event handlers never propagate errors out of the event loop: a failure is
//! logged and the current state is kept. [`log_and_discard`] keeps that pattern
//! uniform across the sync engine and the puzzle matcher.

use std::fmt::Display;
use tracing::warn;

/// Log a failed result and turn it into `None`
///
/// Used where an error means "ignore this input", e.g. a malformed server
/// move or a stale reconnect.
pub fn log_and_discard<T, E: Display>(result: Result<T, E>, context: &str) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("[ERROR_HANDLER] {} failed: {}", context, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_and_discard_keeps_ok_values() {
        let ok: Result<u32, String> = Ok(7);
        assert_eq!(log_and_discard(ok, "ok path"), Some(7));
    }

    #[test]
    fn test_log_and_discard_drops_errors() {
        let err: Result<u32, String> = Err("boom".to_owned());
        assert_eq!(log_and_discard(err, "error path"), None);
    }
}
