//! The `hub` module fans persisted telemetry out to dashboard sessions.
//!
//! A single coordinator task owns the session registry; listeners and the
//! WebSocket transport reach it through the cloneable [`HubHandle`].

pub mod engine;
pub mod event;
pub mod filter;

use async_trait::async_trait;

pub use engine::{Hub, HubHandle};
pub use event::TelemetryEvent;
pub use filter::{ClientFilter, FilterUpdate};

/// Sink for normalized events. Returns whether the event was accepted.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: TelemetryEvent) -> bool;
}
