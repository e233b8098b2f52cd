//! Topic layout
//!
//! Every topic the fleet uses lives under one configurable prefix:
//!
//! - `{prefix}/{vehicle_code}/telemetry`
//! - `{prefix}/{vehicle_code}/{sensor_code}/data`
//! - `{prefix}/{vehicle_code}/raw`
//! - `{prefix}/{vehicle_code}/battery`
//! - `{prefix}/{vehicle_code}/command` (outbound)
//! - `{prefix}/{vehicle_code}/ack` (inbound)

use crate::utils::error::IngestError;

pub const TELEMETRY: &str = "telemetry";
pub const SENSOR_DATA: &str = "data";
pub const RAW_LOG: &str = "raw";
pub const BATTERY: &str = "battery";
pub const COMMAND: &str = "command";
pub const ACK: &str = "ack";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicScheme {
    prefix: String,
}

/// Codes carried by an inbound topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTopic {
    pub vehicle_code: String,
    pub sensor_code: Option<String>,
    pub channel: String,
}

impl TopicScheme {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.trim_matches('/').to_string(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn telemetry_filter(&self) -> String {
        format!("{}/+/{TELEMETRY}", self.prefix)
    }

    pub fn sensor_data_filter(&self) -> String {
        format!("{}/+/+/{SENSOR_DATA}", self.prefix)
    }

    pub fn raw_log_filter(&self) -> String {
        format!("{}/+/{RAW_LOG}", self.prefix)
    }

    pub fn battery_filter(&self) -> String {
        format!("{}/+/{BATTERY}", self.prefix)
    }

    pub fn command_topic(&self, vehicle_code: &str) -> String {
        self.vehicle_topic(vehicle_code, COMMAND)
    }

    pub fn ack_topic(&self, vehicle_code: &str) -> String {
        self.vehicle_topic(vehicle_code, ACK)
    }

    pub fn vehicle_topic(&self, vehicle_code: &str, channel: &str) -> String {
        format!("{}/{vehicle_code}/{channel}", self.prefix)
    }

    /// Split an inbound topic into its codes.
    ///
    /// Accepts `{prefix}/{vehicle}/{channel}` and
    /// `{prefix}/{vehicle}/{sensor}/{channel}`; anything else is rejected.
    pub fn parse(&self, topic: &str) -> Result<ParsedTopic, IngestError> {
        let rest = topic
            .strip_prefix(self.prefix.as_str())
            .and_then(|r| r.strip_prefix('/'))
            .ok_or_else(|| IngestError::Topic(topic.to_string()))?;

        let parts: Vec<&str> = rest.split('/').collect();
        if parts.iter().any(|p| p.trim().is_empty()) {
            return Err(IngestError::Topic(topic.to_string()));
        }

        match parts.as_slice() {
            [vehicle, channel] => Ok(ParsedTopic {
                vehicle_code: vehicle.to_string(),
                sensor_code: None,
                channel: channel.to_string(),
            }),
            [vehicle, sensor, channel] => Ok(ParsedTopic {
                vehicle_code: vehicle.to_string(),
                sensor_code: Some(sensor.to_string()),
                channel: channel.to_string(),
            }),
            _ => Err(IngestError::Topic(topic.to_string())),
        }
    }
}

/// MQTT filter matching with `+` (one level) and `#` (remaining levels).
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            // `#` is only valid as the last level
            (Some("#"), _) => return filter_levels.next().is_none(),
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Whether `code` can be used as a single literal topic level.
pub fn is_topic_level(code: &str) -> bool {
    !code.is_empty() && !code.contains(['+', '#', '/', '\0'])
}
