use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use super::payload::{choose_code, non_empty_str};
use super::{ListenerContext, TopicListener};
use crate::hub::TelemetryEvent;
use crate::mqtt::topic::SENSOR_DATA;
use crate::utils::error::IngestError;

/// `{prefix}/{vehicle_code}/{sensor_code}/data`
///
/// The payload is free-form per sensor type; it must be a JSON object and is
/// stored verbatim.
pub struct SensorListener {
    ctx: Arc<ListenerContext>,
}

impl SensorListener {
    pub fn new(ctx: Arc<ListenerContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl TopicListener for SensorListener {
    fn name(&self) -> &'static str {
        "sensor"
    }

    fn filter(&self) -> String {
        self.ctx.topics.sensor_data_filter()
    }

    async fn ingest(&self, topic: &str, payload: &[u8]) -> Result<(), IngestError> {
        let parsed = self.ctx.parse_topic(topic, SENSOR_DATA, true)?;
        let value: Value = serde_json::from_slice(payload)
            .map_err(|e| IngestError::MalformedPayload(e.to_string()))?;
        let Value::Object(fields) = value else {
            return Err(IngestError::MalformedPayload(
                "sensor payload must be a JSON object".to_string(),
            ));
        };

        let vehicle_code = choose_code(
            non_empty_str(fields.get("vehicle_code")),
            &parsed.vehicle_code,
        );
        let sensor_code = choose_code(
            non_empty_str(fields.get("sensor_code")),
            parsed.sensor_code.as_deref().unwrap_or_default(),
        );

        let vehicle = self.ctx.resolve_vehicle(&vehicle_code).await?;
        let sensor = self.ctx.resolve_sensor(&sensor_code).await?;

        let data = String::from_utf8_lossy(payload).into_owned();
        let log = self
            .ctx
            .sink
            .save_sensor_reading(vehicle.id, sensor.id, data)
            .await?;
        info!(
            vehicle_code = %vehicle_code,
            sensor_code = %sensor_code,
            log_id = log.id,
            "sensor reading saved"
        );

        self.ctx
            .forward(TelemetryEvent::SensorReading {
                vehicle,
                sensor,
                log,
            })
            .await;
        Ok(())
    }
}
