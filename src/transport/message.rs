use serde::{Deserialize, Deserializer, Serialize};

use crate::command::{AckPayload, CommandRequest};
use crate::utils::error::{CommandError, RequestError};

/// Control messages a dashboard may send.
#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Updates the session filter. A missing field is left unchanged; an
    /// empty string or `null` clears it.
    Subscribe {
        #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
        vehicle_code: Option<Option<String>>,
        #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
        sensor_code: Option<Option<String>>,
        #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
        sensor_type: Option<Option<String>>,
    },
    Stats,
    Command(CommandRequest),
}

// only called for keys present in the message, so `null` stays distinct from absent
fn present<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

/// Replies addressed to a single session. Broadcast events have their own
/// wire form (see `TelemetryEvent::to_json`).
#[derive(Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Stats {
        connected_clients: usize,
    },
    CommandResult {
        command: String,
        status: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mode: Option<String>,
    },
    Error {
        kind: ErrorKind,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidRequest,
    Unavailable,
    Timeout,
    Transport,
}

impl ServerMessage {
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_request(err: &RequestError) -> Self {
        Self::error(ErrorKind::InvalidRequest, err.to_string())
    }

    /// A hardware ACK (either status) becomes `command_result`; everything
    /// else is an `error` whose kind tells a timeout from a broker outage.
    pub fn from_command_outcome(outcome: Result<AckPayload, CommandError>, mode: Option<&str>) -> Self {
        match outcome {
            Ok(ack) => ServerMessage::CommandResult {
                command: ack.command,
                status: ack.status,
                message: ack.message,
                mode: mode.map(str::to_string),
            },
            Err(err) => {
                let kind = match err {
                    CommandError::BrokerUnavailable => ErrorKind::Unavailable,
                    CommandError::NoResponse(_) => ErrorKind::Timeout,
                    CommandError::Subscribe(_)
                    | CommandError::Publish(_)
                    | CommandError::Encode(_) => ErrorKind::Transport,
                };
                Self::error(kind, err.to_string())
            }
        }
    }
}
