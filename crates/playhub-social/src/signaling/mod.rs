//! Request/acknowledge signaling over a persistent connection.
//!
//! [`SignalingChannel`] is the contract the voice and chat controllers
//! use: connection check, bounded wait for the acknowledgement, and
//! error-field rejection. [`WsSignaling`] is the WebSocket transport
//! underneath it, with heartbeats and reconnect backoff.

mod channel;
mod connection;
mod handler;
mod types;


pub use channel::{SignalingChannel, SignalingTransport};
pub use connection::WsSignaling;
pub use types::{Envelope, SignalingConfig, SignalingEvent};
