//! Inbound payload shapes and the pure rules applied to them.

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::config::BatterySettings;
use crate::persistence::VehicleTelemetry;

/// Longest log text kept before truncation.
pub const MAX_LOG_CHARS: usize = 255;
const TRUNCATION_MARKER: &str = "...";

#[derive(Debug, Default, Deserialize)]
pub struct TelemetryPayload {
    pub vehicle_code: Option<String>,
    pub battery_voltage: Option<f64>,
    pub battery_current: Option<f64>,
    pub battery_percentage: Option<f64>,
    pub rssi: Option<i64>,
    pub mode: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
    pub heading: Option<f64>,
    pub armed: Option<bool>,
    pub gps_ok: Option<bool>,
    pub system_status: Option<String>,
    pub speed: Option<f64>,
    pub roll: Option<f64>,
    pub pitch: Option<f64>,
    pub yaw: Option<f64>,
    #[serde(default, deserialize_with = "flexible_string")]
    pub temperature_system: Option<String>,
}

impl TelemetryPayload {
    /// Record fields, with the battery percentage derived from the voltage
    /// when the vehicle did not send one.
    pub fn into_telemetry(self, battery: &BatterySettings) -> VehicleTelemetry {
        let battery_percentage = self
            .battery_percentage
            .or_else(|| self.battery_voltage.map(|v| percentage_from_voltage(v, battery)));

        VehicleTelemetry {
            battery_voltage: self.battery_voltage,
            battery_current: self.battery_current,
            battery_percentage,
            rssi: self.rssi,
            mode: self.mode,
            latitude: self.latitude,
            longitude: self.longitude,
            altitude: self.altitude,
            heading: self.heading,
            armed: self.armed,
            gps_ok: self.gps_ok,
            system_status: self.system_status,
            speed: self.speed,
            roll: self.roll,
            pitch: self.pitch,
            yaw: self.yaw,
            temperature_system: self.temperature_system,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct BatteryPayload {
    pub vehicle_code: Option<String>,
    pub battery_id: i64,
    pub percentage: Option<f64>,
    pub voltage: Option<f64>,
    pub current: Option<f64>,
    pub temperature: Option<f64>,
    pub status: Option<String>,
    #[serde(default)]
    pub cell_voltages: Vec<f64>,
    pub cell_count: Option<i64>,
}

impl BatteryPayload {
    /// `None` when neither a percentage nor a voltage was reported.
    pub fn resolved_percentage(&self, battery: &BatterySettings) -> Option<f64> {
        self.percentage
            .or_else(|| self.voltage.map(|v| percentage_from_voltage(v, battery)))
    }
}

/// Affine map of the configured voltage range onto 0..=100, clamped.
pub fn percentage_from_voltage(voltage: f64, battery: &BatterySettings) -> f64 {
    let span = battery.voltage_full - battery.voltage_empty;
    if span <= 0.0 || voltage.is_nan() {
        return 0.0;
    }
    ((voltage - battery.voltage_empty) / span * 100.0).clamp(0.0, 100.0)
}

/// Reported status wins; otherwise derived from the charge level.
pub fn battery_status(reported: Option<&str>, percentage: f64) -> String {
    match reported.map(str::trim).filter(|s| !s.is_empty()) {
        Some(status) => status.to_string(),
        None if percentage >= 90.0 => "Full".to_string(),
        None if percentage <= 20.0 => "Low".to_string(),
        None => "Normal".to_string(),
    }
}

/// A raw log payload: a JSON object, or anything else kept as text.
#[derive(Debug, Clone, PartialEq)]
pub enum RawPayload {
    Structured(Map<String, Value>),
    Text(String),
}

impl RawPayload {
    pub fn parse(bytes: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(bytes) {
            Ok(Value::Object(map)) => RawPayload::Structured(map),
            _ => RawPayload::Text(String::from_utf8_lossy(bytes).into_owned()),
        }
    }

    pub fn vehicle_code(&self) -> Option<&str> {
        match self {
            RawPayload::Structured(map) => non_empty_str(map.get("vehicle_code")),
            RawPayload::Text(_) => None,
        }
    }

    /// The log line: `logs` (compacted when not a string), then `message`,
    /// `text` or `log`, then the whole object compacted.
    pub fn log_text(&self) -> String {
        let map = match self {
            RawPayload::Text(text) => return text.clone(),
            RawPayload::Structured(map) => map,
        };

        if let Some(logs) = map.get("logs") {
            return match logs {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
        }
        ["message", "text", "log"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| Value::Object(map.clone()).to_string())
    }
}

/// Cut text over [`MAX_LOG_CHARS`] characters down to fit, marker included.
pub fn truncate_log(text: &str) -> String {
    if text.chars().count() <= MAX_LOG_CHARS {
        return text.to_string();
    }
    let keep = MAX_LOG_CHARS - TRUNCATION_MARKER.len();
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(TRUNCATION_MARKER);
    out
}

/// Payload code when present and non-blank, topic code otherwise.
pub fn choose_code(from_payload: Option<&str>, from_topic: &str) -> String {
    from_payload
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(from_topic)
        .to_string()
}

pub(crate) fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.trim().is_empty())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TextOrNumber {
    Text(String),
    Number(serde_json::Number),
}

fn flexible_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(
        Option::<TextOrNumber>::deserialize(deserializer)?.map(|v| match v {
            TextOrNumber::Text(s) => s,
            TextOrNumber::Number(n) => n.to_string(),
        }),
    )
}
