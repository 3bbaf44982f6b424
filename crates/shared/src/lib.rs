//! Wire types shared between the sync client and its tests
//!
//! The real-time channel speaks JSON envelopes of the shape `{t, d, v}`.
//! [`protocol`] turns those frames into typed [`protocol::InboundEvent`]s and
//! encodes the client's outbound pings and moves.

pub mod protocol;
