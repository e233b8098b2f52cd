use serde_json::json;
use tempfile::{TempDir, tempdir};

use super::records::{BatteryReading, VehicleTelemetry};
use super::sled_store::SledStore;
use super::{FleetDirectory, TelemetrySink};
use crate::config::{FleetSettings, SensorSeed, VehicleSeed};

fn create_test_store(max: Option<usize>) -> (TempDir, SledStore) {
    let dir = tempdir().unwrap();
    let store = SledStore::open_path(dir.path().to_str().unwrap(), max).unwrap();
    (dir, store)
}

fn fleet() -> FleetSettings {
    FleetSettings {
        vehicles: vec![VehicleSeed {
            id: 1,
            code: "USV-01".into(),
            name: "Seano One".into(),
        }],
        sensors: vec![SensorSeed {
            id: 7,
            code: "CTD-01".into(),
            brand: "Valeport".into(),
            model: "MIDAS 3000".into(),
            sensor_type: "ctd_midas3000".into(),
        }],
    }
}

#[tokio::test]
async fn test_seeded_codes_resolve() {
    let (_dir, store) = create_test_store(None);
    store.seed(&fleet()).unwrap();

    let vehicle = store.resolve_vehicle_by_code("USV-01").await.unwrap().unwrap();
    assert_eq!(vehicle.id, 1);
    assert_eq!(vehicle.name, "Seano One");

    let sensor = store.resolve_sensor_by_code("CTD-01").await.unwrap().unwrap();
    assert_eq!(sensor.id, 7);
    assert_eq!(sensor.sensor_type, "ctd_midas3000");
}

#[tokio::test]
async fn test_unknown_code_resolves_to_none() {
    let (_dir, store) = create_test_store(None);
    store.seed(&fleet()).unwrap();

    assert!(store.resolve_vehicle_by_code("USV-99").await.unwrap().is_none());
    assert!(store.resolve_sensor_by_code("USV-01").await.unwrap().is_none());
}

#[tokio::test]
async fn test_save_telemetry_assigns_id_and_persists() {
    let (_dir, store) = create_test_store(None);
    let telemetry = VehicleTelemetry {
        battery_voltage: Some(12.2),
        battery_percentage: Some(75.0),
        mode: Some("AUTO".into()),
        armed: Some(true),
        ..Default::default()
    };

    let saved = store.save_telemetry(1, telemetry.clone()).await.unwrap();
    let second = store.save_telemetry(1, telemetry).await.unwrap();
    assert_ne!(saved.id, second.id);

    let logs = store.vehicle_logs().unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0], saved);
    assert_eq!(logs[0].telemetry.mode.as_deref(), Some("AUTO"));
}

#[tokio::test]
async fn test_raw_log_without_vehicle() {
    let (_dir, store) = create_test_store(None);
    let saved = store
        .save_raw_log(None, "[USV-99] boot".into())
        .await
        .unwrap();
    assert_eq!(saved.vehicle_id, None);

    let logs = store.raw_logs().unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].logs, "[USV-99] boot");
}

#[tokio::test]
async fn test_sensor_reading_keeps_payload_text() {
    let (_dir, store) = create_test_store(None);
    let raw = r#"{"depth": 3.2, "temp": 28.1}"#.to_string();
    store.save_sensor_reading(1, 7, raw.clone()).await.unwrap();

    let logs = store.sensor_logs().unwrap();
    assert_eq!(logs[0].data, raw);
    assert_eq!(logs[0].sensor_id, 7);
}

#[tokio::test]
async fn test_battery_metadata_roundtrips_through_store() {
    let (_dir, store) = create_test_store(None);
    let reading = BatteryReading {
        vehicle_id: 1,
        battery_id: 2,
        percentage: 55.0,
        voltage: Some(12.0),
        current: None,
        temperature: Some(31.5),
        status: "Normal".into(),
        cell_voltages: vec![4.0, 4.0, 4.0],
        metadata: json!({"cell_count": 3}),
    };
    store.save_battery_status(reading.clone()).await.unwrap();

    let records = store.battery_records().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].reading, reading);
}

#[tokio::test]
async fn test_retention_cap_drops_oldest() {
    let (_dir, store) = create_test_store(Some(3));
    for i in 0..5 {
        store
            .save_raw_log(Some(1), format!("msg{i}"))
            .await
            .unwrap();
    }

    let logs: Vec<_> = store
        .raw_logs()
        .unwrap()
        .into_iter()
        .map(|l| l.logs)
        .collect();
    assert_eq!(logs, vec!["msg2", "msg3", "msg4"]);
}

#[tokio::test(flavor = "current_thread")]
async fn test_concurrent_saves_get_distinct_ids() {
    let (_dir, store) = create_test_store(None);
    let store = std::sync::Arc::new(store);

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            store
                .save_telemetry(1, VehicleTelemetry::default())
                .await
                .map(|log| log.id)
        }));
    }

    let mut ids = Vec::new();
    for task in tasks {
        ids.push(task.await.unwrap().unwrap());
    }
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 16);
    assert_eq!(store.vehicle_logs().unwrap().len(), 16);
}
