use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sled::{Db, Tree};
use tracing::{debug, info};

use super::records::{
    BatteryReading, BatteryRecord, RawLog, SensorLog, SensorRef, VehicleLog, VehicleRef,
    VehicleTelemetry,
};
use super::{FleetDirectory, TelemetrySink};
use crate::config::{FleetSettings, StorageSettings};
use crate::utils::error::StoreResult;

const VEHICLES: &str = "vehicles";
const SENSORS: &str = "sensors";
const VEHICLE_LOGS: &str = "vehicle_logs";
const SENSOR_LOGS: &str = "sensor_logs";
const RAW_LOGS: &str = "raw_logs";
const BATTERY_STATUS: &str = "battery_status";

/// Embedded store with one tree per record kind.
///
/// Log trees are keyed by big-endian ids from `Db::generate_id`, so iteration
/// order is insertion order. The fleet trees are keyed by code.
#[derive(Clone)]
pub struct SledStore {
    db: Db,
    max_records_per_tree: Option<usize>,
}

impl SledStore {
    pub fn open(settings: &StorageSettings) -> StoreResult<Self> {
        Self::open_path(&settings.path, settings.max_records_per_tree)
    }

    pub fn open_path(path: &str, max_records_per_tree: Option<usize>) -> StoreResult<Self> {
        let db = sled::open(path)?;
        info!(path = %path, "opened telemetry store");
        Ok(Self {
            db,
            max_records_per_tree,
        })
    }

    /// Insert or replace the configured vehicles and sensors.
    pub fn seed(&self, fleet: &FleetSettings) -> StoreResult<()> {
        for v in &fleet.vehicles {
            self.upsert_vehicle(&VehicleRef {
                id: v.id,
                code: v.code.clone(),
                name: v.name.clone(),
            })?;
        }
        for s in &fleet.sensors {
            self.upsert_sensor(&SensorRef {
                id: s.id,
                code: s.code.clone(),
                brand: s.brand.clone(),
                model: s.model.clone(),
                sensor_type: s.sensor_type.clone(),
            })?;
        }
        info!(
            vehicles = fleet.vehicles.len(),
            sensors = fleet.sensors.len(),
            "fleet directory seeded"
        );
        Ok(())
    }

    pub fn upsert_vehicle(&self, vehicle: &VehicleRef) -> StoreResult<()> {
        let tree = self.db.open_tree(VEHICLES)?;
        tree.insert(vehicle.code.as_bytes(), serde_json::to_vec(vehicle)?)?;
        Ok(())
    }

    pub fn upsert_sensor(&self, sensor: &SensorRef) -> StoreResult<()> {
        let tree = self.db.open_tree(SENSORS)?;
        tree.insert(sensor.code.as_bytes(), serde_json::to_vec(sensor)?)?;
        Ok(())
    }

    pub fn vehicle_logs(&self) -> StoreResult<Vec<VehicleLog>> {
        self.load_all(VEHICLE_LOGS)
    }

    pub fn sensor_logs(&self) -> StoreResult<Vec<SensorLog>> {
        self.load_all(SENSOR_LOGS)
    }

    pub fn raw_logs(&self) -> StoreResult<Vec<RawLog>> {
        self.load_all(RAW_LOGS)
    }

    pub fn battery_records(&self) -> StoreResult<Vec<BatteryRecord>> {
        self.load_all(BATTERY_STATUS)
    }

    /// Allocate an id, build the record and append it on the blocking pool.
    async fn persist<R, F>(&self, tree_name: &'static str, build: F) -> StoreResult<R>
    where
        R: Serialize + Send + 'static,
        F: FnOnce(u64) -> R + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || -> StoreResult<R> {
            let id = store.next_id()?;
            let record = build(id);
            store.append(tree_name, id, &record)?;
            Ok(record)
        })
        .await?
    }

    fn next_id(&self) -> StoreResult<u64> {
        Ok(self.db.generate_id()?)
    }

    fn append<T: Serialize>(&self, tree_name: &str, id: u64, record: &T) -> StoreResult<()> {
        let tree = self.db.open_tree(tree_name)?;
        tree.insert(id.to_be_bytes(), serde_json::to_vec(record)?)?;
        self.enforce_cap(tree_name, &tree)?;
        Ok(())
    }

    fn enforce_cap(&self, tree_name: &str, tree: &Tree) -> StoreResult<()> {
        let Some(max) = self.max_records_per_tree else {
            return Ok(());
        };
        let mut dropped = 0usize;
        while tree.len() > max {
            if tree.pop_min()?.is_none() {
                break;
            }
            dropped += 1;
        }
        if dropped > 0 {
            debug!(tree = tree_name, dropped, "retention cap applied");
        }
        Ok(())
    }

    fn lookup<T: DeserializeOwned>(&self, tree_name: &str, key: &str) -> StoreResult<Option<T>> {
        let tree = self.db.open_tree(tree_name)?;
        match tree.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn load_all<T: DeserializeOwned>(&self, tree_name: &str) -> StoreResult<Vec<T>> {
        let tree = self.db.open_tree(tree_name)?;
        let mut records = Vec::with_capacity(tree.len());
        for entry in tree.iter() {
            let (_, value) = entry?;
            records.push(serde_json::from_slice(&value)?);
        }
        Ok(records)
    }
}

impl std::fmt::Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStore")
            .field("db", &"sled::Db")
            .field("max_records_per_tree", &self.max_records_per_tree)
            .finish()
    }
}

#[async_trait]
impl FleetDirectory for SledStore {
    async fn resolve_vehicle_by_code(&self, code: &str) -> StoreResult<Option<VehicleRef>> {
        self.lookup(VEHICLES, code)
    }

    async fn resolve_sensor_by_code(&self, code: &str) -> StoreResult<Option<SensorRef>> {
        self.lookup(SENSORS, code)
    }
}

// sled writes (and retention pops) block, so they run off the async workers
#[async_trait]
impl TelemetrySink for SledStore {
    async fn save_telemetry(
        &self,
        vehicle_id: u64,
        telemetry: VehicleTelemetry,
    ) -> StoreResult<VehicleLog> {
        self.persist(VEHICLE_LOGS, move |id| VehicleLog {
            id,
            vehicle_id,
            telemetry,
            created_at: Utc::now(),
        })
        .await
    }

    async fn save_sensor_reading(
        &self,
        vehicle_id: u64,
        sensor_id: u64,
        data: String,
    ) -> StoreResult<SensorLog> {
        self.persist(SENSOR_LOGS, move |id| SensorLog {
            id,
            vehicle_id,
            sensor_id,
            data,
            created_at: Utc::now(),
        })
        .await
    }

    async fn save_raw_log(&self, vehicle_id: Option<u64>, logs: String) -> StoreResult<RawLog> {
        self.persist(RAW_LOGS, move |id| RawLog {
            id,
            vehicle_id,
            logs,
            created_at: Utc::now(),
        })
        .await
    }

    async fn save_battery_status(&self, reading: BatteryReading) -> StoreResult<BatteryRecord> {
        self.persist(BATTERY_STATUS, move |id| BatteryRecord {
            id,
            reading,
            created_at: Utc::now(),
        })
        .await
    }
}
