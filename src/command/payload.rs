use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::utils::error::RequestError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Arm,
    Disarm,
    SetMode,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Arm => "arm",
            CommandKind::Disarm => "disarm",
            CommandKind::SetMode => "set_mode",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandKind {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "arm" => Ok(CommandKind::Arm),
            "disarm" => Ok(CommandKind::Disarm),
            "set_mode" => Ok(CommandKind::SetMode),
            other => Err(RequestError::UnknownCommand(other.to_string())),
        }
    }
}

/// Published to `{prefix}/{vehicle_code}/command`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandPayload {
    pub command: CommandKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    pub request_id: String,
}

/// Published by the vehicle to `{prefix}/{vehicle_code}/ack`.
///
/// `status` is the hardware outcome (`"ok"` or `"error"`), passed through
/// untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckPayload {
    pub request_id: String,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: String,
}

impl AckPayload {
    pub fn is_error(&self) -> bool {
        self.status.eq_ignore_ascii_case("error")
    }
}
