//! The `error` module defines the error types used across `seanolink`.
//!
//! Each pipeline stage has its own enum so that callers can tell transport
//! failures, protocol failures and storage failures apart without string
//! matching. In particular, a command that timed out (`CommandError::NoResponse`)
//! is never represented the same way as a hardware rejection, which arrives as
//! a successful ACK whose status is `"error"`.

use std::time::Duration;

use thiserror::Error;

/// Failures of the shared MQTT connection.
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("broker is not connected")]
    NotConnected,

    #[error("broker request timed out after {0:?}")]
    Timeout(Duration),

    #[error("mqtt client error: {0}")]
    Client(#[from] rumqttc::ClientError),
}

/// Failures of the persistence collaborator.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(#[from] sled::Error),

    #[error("record encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("storage worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Reasons a listener drops an inbound message.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("unexpected topic shape: {0}")]
    Topic(String),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("unknown vehicle code: {0}")]
    UnknownVehicle(String),

    #[error("unknown sensor code: {0}")]
    UnknownSensor(String),

    #[error("failed to persist record: {0}")]
    Store(#[from] StoreError),
}

/// Outcomes of `send_command` that are not a hardware ACK.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("broker unavailable, control commands are disabled")]
    BrokerUnavailable,

    #[error("failed to subscribe to ack topic: {0}")]
    Subscribe(#[source] BrokerError),

    #[error("failed to publish command: {0}")]
    Publish(#[source] BrokerError),

    #[error("failed to encode command: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("hardware did not respond within {0:?}")]
    NoResponse(Duration),
}

/// Boundary validation failures for an operator command request.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RequestError {
    #[error("vehicle_code is required")]
    MissingVehicleCode,

    #[error("vehicle_code must not contain '+', '#' or '/': {0}")]
    InvalidVehicleCode(String),

    #[error("command must be one of: arm, disarm, set_mode")]
    UnknownCommand(String),

    #[error("mode is required for set_mode command")]
    MissingMode,
}
