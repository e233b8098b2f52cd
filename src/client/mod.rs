//! The `client` module defines a dashboard connection as tracked by the hub:
//! its id, its bounded outbound queue and its current filter.

pub mod session;
pub use session::{ClientId, ClientSession};
