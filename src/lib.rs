//! # SeanoLink
//!
//! `seanolink` is the ground-side link for a fleet of unmanned surface
//! vehicles. It ingests vehicle telemetry over MQTT, stores it, fans it out
//! to dashboards over WebSockets, and sends control commands back to the
//! vehicles, waiting for their acknowledgment.
//!
//! ## Core Modules
//!
//! - `mqtt`: The shared broker connection and the topic layout.
//! - `listener`: Turns inbound telemetry, sensor, raw log and battery messages into records and events.
//! - `persistence`: The fleet directory and the telemetry store (`sled`).
//! - `hub`: Broadcasts events to dashboard sessions, honoring each session's filter.
//! - `command`: Publishes commands and correlates the hardware acknowledgments.
//! - `client`: A connected dashboard session.
//! - `transport`: The dashboard WebSocket server and its message protocol.
//! - `config`: Loads and validates the configuration.
//! - `utils`: Error types and logging setup.

pub mod client;
pub mod command;
pub mod config;
pub mod hub;
pub mod listener;
pub mod mqtt;
pub mod persistence;
pub mod transport;
pub mod utils;
