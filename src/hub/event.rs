use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::persistence::{BatteryRecord, RawLog, SensorLog, SensorRef, VehicleLog, VehicleRef};

/// A persisted record on its way to dashboard sessions.
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryEvent {
    VehicleTelemetry {
        vehicle: VehicleRef,
        log: VehicleLog,
    },
    SensorReading {
        vehicle: VehicleRef,
        sensor: SensorRef,
        log: SensorLog,
    },
    RawLogEntry {
        /// Code the log arrived under, kept even when it did not resolve.
        vehicle_code: String,
        vehicle: Option<VehicleRef>,
        log: RawLog,
    },
    BatteryStatus {
        vehicle: VehicleRef,
        record: BatteryRecord,
    },
}

impl TelemetryEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            TelemetryEvent::VehicleTelemetry { .. } => "vehicle_log",
            TelemetryEvent::SensorReading { .. } => "sensor_log",
            TelemetryEvent::RawLogEntry { .. } => "raw_log",
            TelemetryEvent::BatteryStatus { .. } => "battery",
        }
    }

    pub fn vehicle_code(&self) -> &str {
        match self {
            TelemetryEvent::VehicleTelemetry { vehicle, .. }
            | TelemetryEvent::SensorReading { vehicle, .. }
            | TelemetryEvent::BatteryStatus { vehicle, .. } => &vehicle.code,
            TelemetryEvent::RawLogEntry { vehicle_code, .. } => vehicle_code,
        }
    }

    pub fn sensor_code(&self) -> Option<&str> {
        match self {
            TelemetryEvent::SensorReading { sensor, .. } => Some(&sensor.code),
            _ => None,
        }
    }

    pub fn sensor_type(&self) -> Option<&str> {
        match self {
            TelemetryEvent::SensorReading { sensor, .. } => Some(&sensor.sensor_type),
            _ => None,
        }
    }

    /// Server-side time the record was stored.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            TelemetryEvent::VehicleTelemetry { log, .. } => log.created_at,
            TelemetryEvent::SensorReading { log, .. } => log.created_at,
            TelemetryEvent::RawLogEntry { log, .. } => log.created_at,
            TelemetryEvent::BatteryStatus { record, .. } => record.created_at,
        }
    }

    /// Dashboard wire form: a `{type, timestamp, data}` envelope for log
    /// events, a flat object for battery updates.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let timestamp = self.timestamp();
        match self {
            TelemetryEvent::VehicleTelemetry { vehicle, log } => serde_json::to_string(&Envelope {
                kind: self.kind(),
                timestamp,
                data: VehicleLogData {
                    log,
                    vehicle: VehicleInfo::from(vehicle),
                },
            }),
            TelemetryEvent::SensorReading {
                vehicle,
                sensor,
                log,
            } => serde_json::to_string(&Envelope {
                kind: self.kind(),
                timestamp,
                data: SensorLogData {
                    id: log.id,
                    vehicle_id: log.vehicle_id,
                    sensor_id: log.sensor_id,
                    vehicle: VehicleInfo::from(vehicle),
                    sensor: SensorInfo::from(sensor),
                    data: &log.data,
                    created_at: log.created_at,
                },
            }),
            TelemetryEvent::RawLogEntry { vehicle, log, .. } => serde_json::to_string(&Envelope {
                kind: self.kind(),
                timestamp,
                data: RawLogData {
                    id: log.id,
                    vehicle_id: log.vehicle_id,
                    vehicle: vehicle.as_ref().map(VehicleInfo::from),
                    logs: &log.logs,
                    created_at: log.created_at,
                },
            }),
            TelemetryEvent::BatteryStatus { vehicle, record } => {
                let reading = &record.reading;
                serde_json::to_string(&BatteryMessage {
                    kind: self.kind(),
                    vehicle_id: reading.vehicle_id,
                    vehicle_code: &vehicle.code,
                    battery_id: reading.battery_id,
                    percentage: reading.percentage,
                    voltage: reading.voltage,
                    current: reading.current,
                    temperature: reading.temperature,
                    status: &reading.status,
                    cell_voltages: &reading.cell_voltages,
                    cell_count: reading.metadata.get("cell_count").and_then(|v| v.as_i64()),
                    timestamp,
                })
            }
        }
    }
}

#[derive(Serialize)]
struct Envelope<T: Serialize> {
    #[serde(rename = "type")]
    kind: &'static str,
    timestamp: DateTime<Utc>,
    data: T,
}

#[derive(Serialize)]
struct VehicleInfo<'a> {
    code: &'a str,
    name: &'a str,
}

impl<'a> From<&'a VehicleRef> for VehicleInfo<'a> {
    fn from(v: &'a VehicleRef) -> Self {
        Self {
            code: &v.code,
            name: &v.name,
        }
    }
}

#[derive(Serialize)]
struct SensorInfo<'a> {
    code: &'a str,
    brand: &'a str,
    model: &'a str,
    sensor_type: &'a str,
}

impl<'a> From<&'a SensorRef> for SensorInfo<'a> {
    fn from(s: &'a SensorRef) -> Self {
        Self {
            code: &s.code,
            brand: &s.brand,
            model: &s.model,
            sensor_type: &s.sensor_type,
        }
    }
}

#[derive(Serialize)]
struct VehicleLogData<'a> {
    #[serde(flatten)]
    log: &'a VehicleLog,
    vehicle: VehicleInfo<'a>,
}

#[derive(Serialize)]
struct SensorLogData<'a> {
    id: u64,
    vehicle_id: u64,
    sensor_id: u64,
    vehicle: VehicleInfo<'a>,
    sensor: SensorInfo<'a>,
    data: &'a str,
    created_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct RawLogData<'a> {
    id: u64,
    vehicle_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    vehicle: Option<VehicleInfo<'a>>,
    logs: &'a str,
    created_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct BatteryMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    vehicle_id: u64,
    vehicle_code: &'a str,
    battery_id: i64,
    percentage: f64,
    voltage: Option<f64>,
    current: Option<f64>,
    temperature: Option<f64>,
    status: &'a str,
    cell_voltages: &'a [f64],
    cell_count: Option<i64>,
    timestamp: DateTime<Utc>,
}
