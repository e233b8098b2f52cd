use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;

use super::payload::{BatteryPayload, battery_status, choose_code};
use super::{ListenerContext, TopicListener};
use crate::hub::TelemetryEvent;
use crate::mqtt::topic::BATTERY;
use crate::persistence::BatteryReading;
use crate::utils::error::IngestError;

/// `{prefix}/{vehicle_code}/battery`
pub struct BatteryListener {
    ctx: Arc<ListenerContext>,
}

impl BatteryListener {
    pub fn new(ctx: Arc<ListenerContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl TopicListener for BatteryListener {
    fn name(&self) -> &'static str {
        "battery"
    }

    fn filter(&self) -> String {
        self.ctx.topics.battery_filter()
    }

    async fn ingest(&self, topic: &str, payload: &[u8]) -> Result<(), IngestError> {
        let parsed = self.ctx.parse_topic(topic, BATTERY, false)?;
        let data: BatteryPayload = serde_json::from_slice(payload)
            .map_err(|e| IngestError::MalformedPayload(e.to_string()))?;
        let percentage = data.resolved_percentage(&self.ctx.battery).ok_or_else(|| {
            IngestError::MalformedPayload("battery payload has neither percentage nor voltage".into())
        })?;

        let code = choose_code(data.vehicle_code.as_deref(), &parsed.vehicle_code);
        let vehicle = self.ctx.resolve_vehicle(&code).await?;

        let reading = BatteryReading {
            vehicle_id: vehicle.id,
            battery_id: data.battery_id,
            percentage,
            voltage: data.voltage,
            current: data.current,
            temperature: data.temperature,
            status: battery_status(data.status.as_deref(), percentage),
            cell_voltages: data.cell_voltages,
            metadata: data
                .cell_count
                .map(|n| json!({ "cell_count": n }))
                .unwrap_or(Value::Null),
        };
        let record = self.ctx.sink.save_battery_status(reading).await?;
        info!(
            vehicle_code = %code,
            battery_id = record.reading.battery_id,
            percentage,
            status = %record.reading.status,
            "battery status saved"
        );

        self.ctx
            .forward(TelemetryEvent::BatteryStatus { vehicle, record })
            .await;
        Ok(())
    }
}
