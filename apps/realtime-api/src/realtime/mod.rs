//! Real-time connection hub: WebSocket fan-out of server-originated events
//! with per-user and per-organization addressing.
//!
//! Delivery is best-effort, in-memory, and single-process: a slow client's
//! full buffer drops messages rather than stalling anyone else, and nothing
//! is replayed after a reconnect.

pub mod connection;
pub mod hub;
pub mod notifier;
pub mod server;
