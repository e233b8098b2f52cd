//! The `command` module sends control commands to vehicles and correlates
//! the hardware acknowledgments with the waiting callers.

pub mod correlator;
pub mod payload;
pub mod request;

pub use correlator::CommandCorrelator;
pub use payload::{AckPayload, CommandKind, CommandPayload};
pub use request::{Command, CommandRequest};

#[cfg(test)]
mod tests;
