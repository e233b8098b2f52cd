//! The `transport` module is the dashboard-facing side of the service.
//!
//! It defines the JSON messages exchanged with dashboard sessions and the
//! WebSocket server that attaches each session to the broadcast hub and
//! forwards its command requests to the correlator.

pub mod message;
pub mod websocket;

#[cfg(test)]
mod tests;
