//! The `persistence` module defines the storage collaborators used by the
//! ingestion pipeline and an embedded `sled` implementation of both.
//!
//! - `FleetDirectory` resolves vehicle and sensor codes to their ids.
//! - `TelemetrySink` writes one record per accepted message. Each save fails
//!   independently of the others.

pub mod records;
pub mod sled_store;

use async_trait::async_trait;

use crate::utils::error::StoreResult;

pub use records::{
    BatteryReading, BatteryRecord, RawLog, SensorLog, SensorRef, VehicleLog, VehicleRef,
    VehicleTelemetry,
};
pub use sled_store::SledStore;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FleetDirectory: Send + Sync {
    async fn resolve_vehicle_by_code(&self, code: &str) -> StoreResult<Option<VehicleRef>>;

    async fn resolve_sensor_by_code(&self, code: &str) -> StoreResult<Option<SensorRef>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn save_telemetry(
        &self,
        vehicle_id: u64,
        telemetry: VehicleTelemetry,
    ) -> StoreResult<VehicleLog>;

    async fn save_sensor_reading(
        &self,
        vehicle_id: u64,
        sensor_id: u64,
        data: String,
    ) -> StoreResult<SensorLog>;

    async fn save_raw_log(&self, vehicle_id: Option<u64>, logs: String) -> StoreResult<RawLog>;

    async fn save_battery_status(&self, reading: BatteryReading) -> StoreResult<BatteryRecord>;
}

#[cfg(test)]
mod tests;
