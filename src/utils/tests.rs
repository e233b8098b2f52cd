use std::time::Duration;

use super::error::{CommandError, RequestError};
use super::logging;

#[test]
fn logging_init_accepts_levels() {
    // Should not panic
    logging::init("info");
    logging::init("debug");
    logging::init("warn");
}

#[test]
fn parse_level_falls_back_to_info() {
    assert_eq!(logging::parse_level("WARNING"), tracing::Level::WARN);
    assert_eq!(logging::parse_level(" trace "), tracing::Level::TRACE);
    assert_eq!(logging::parse_level("verbose"), tracing::Level::INFO);
}

#[test]
fn timeout_and_unavailable_render_differently() {
    let timeout = CommandError::NoResponse(Duration::from_secs(8));
    let unavailable = CommandError::BrokerUnavailable;

    assert_eq!(timeout.to_string(), "hardware did not respond within 8s");
    assert_ne!(timeout.to_string(), unavailable.to_string());
}

#[test]
fn request_error_messages() {
    assert_eq!(
        RequestError::MissingMode.to_string(),
        "mode is required for set_mode command"
    );
    assert_eq!(
        RequestError::UnknownCommand("launch".into()).to_string(),
        "command must be one of: arm, disarm, set_mode"
    );
}
