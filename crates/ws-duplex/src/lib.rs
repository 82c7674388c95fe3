//! Stream endpoints over an event-driven WebSocket connection.
//!
//! [`duplex::WsDuplex::open`] performs the connection handshake and returns
//! an adapter exposing the socket as a pull-driven [`inbound::Inbound`]
//! stream, a push-driven [`outbound::Outbound`] sink, and a settle-once
//! close outcome.

pub mod duplex;
pub mod error;
pub mod inbound;
pub mod message;
pub mod outbound;
pub mod transport;
pub mod ws;

mod bridge;

#[cfg(test)]
pub(crate) mod mock;
