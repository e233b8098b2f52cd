use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A vehicle resolved from its code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleRef {
    pub id: u64,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorRef {
    pub id: u64,
    pub code: String,
    pub brand: String,
    pub model: String,
    pub sensor_type: String,
}

/// Fields a vehicle may report on its telemetry topic. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleTelemetry {
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
    pub temperature_system: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleLog {
    pub id: u64,
    pub vehicle_id: u64,
    #[serde(flatten)]
    pub telemetry: VehicleTelemetry,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorLog {
    pub id: u64,
    pub vehicle_id: u64,
    pub sensor_id: u64,
    /// Payload text exactly as received.
    pub data: String,
    pub created_at: DateTime<Utc>,
}

/// Free-form log line; `vehicle_id` is `None` when the code did not resolve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLog {
    pub id: u64,
    pub vehicle_id: Option<u64>,
    pub logs: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatteryReading {
    pub vehicle_id: u64,
    pub battery_id: i64,
    pub percentage: f64,
    pub voltage: Option<f64>,
    pub current: Option<f64>,
    pub temperature: Option<f64>,
    pub status: String,
    #[serde(default)]
    pub cell_voltages: Vec<f64>,
    /// Extra values without a column of their own, e.g. `cell_count`.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatteryRecord {
    pub id: u64,
    #[serde(flatten)]
    pub reading: BatteryReading,
    pub created_at: DateTime<Utc>,
}
