use serde::{Deserialize, Serialize};

use super::payload::{CommandKind, CommandPayload};
use crate::mqtt::topic::is_topic_level;
use crate::utils::error::RequestError;

/// A command as an operator submits it, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandRequest {
    #[serde(default)]
    pub vehicle_code: String,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub mode: Option<String>,
}

/// A command that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Arm,
    Disarm,
    SetMode(String),
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Arm => CommandKind::Arm,
            Command::Disarm => CommandKind::Disarm,
            Command::SetMode(_) => CommandKind::SetMode,
        }
    }

    pub fn mode(&self) -> Option<&str> {
        match self {
            Command::SetMode(mode) => Some(mode),
            _ => None,
        }
    }

    pub(crate) fn to_payload(&self, request_id: &str) -> CommandPayload {
        CommandPayload {
            command: self.kind(),
            mode: self.mode().map(str::to_string),
            request_id: request_id.to_string(),
        }
    }
}

impl CommandRequest {
    /// Returns the target vehicle code and the command.
    ///
    /// `mode` is ignored for everything but `set_mode`, where it is required.
    pub fn validate(&self) -> Result<(String, Command), RequestError> {
        let vehicle_code = self.vehicle_code.trim();
        if vehicle_code.is_empty() {
            return Err(RequestError::MissingVehicleCode);
        }
        if !is_topic_level(vehicle_code) {
            return Err(RequestError::InvalidVehicleCode(vehicle_code.to_string()));
        }

        let command = match self.command.parse::<CommandKind>()? {
            CommandKind::Arm => Command::Arm,
            CommandKind::Disarm => Command::Disarm,
            CommandKind::SetMode => {
                let mode = self
                    .mode
                    .as_deref()
                    .map(str::trim)
                    .filter(|m| !m.is_empty())
                    .ok_or(RequestError::MissingMode)?;
                Command::SetMode(mode.to_string())
            }
        };

        Ok((vehicle_code.to_string(), command))
    }
}
