//! The `mqtt` module owns the broker side of the system: the shared
//! connection, the subscription routing table and the topic layout.

pub mod connection;
mod routes;
pub mod topic;

pub use connection::{BrokerConnection, BrokerLink, LinkState, MessageHandler};
pub use topic::{ParsedTopic, TopicScheme};
