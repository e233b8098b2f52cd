use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::payload::{TelemetryPayload, choose_code};
use super::{ListenerContext, TopicListener};
use crate::hub::TelemetryEvent;
use crate::mqtt::topic::TELEMETRY;
use crate::utils::error::IngestError;

/// `{prefix}/{vehicle_code}/telemetry`
pub struct TelemetryListener {
    ctx: Arc<ListenerContext>,
}

impl TelemetryListener {
    pub fn new(ctx: Arc<ListenerContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl TopicListener for TelemetryListener {
    fn name(&self) -> &'static str {
        "telemetry"
    }

    fn filter(&self) -> String {
        self.ctx.topics.telemetry_filter()
    }

    async fn ingest(&self, topic: &str, payload: &[u8]) -> Result<(), IngestError> {
        let parsed = self.ctx.parse_topic(topic, TELEMETRY, false)?;
        let data: TelemetryPayload = serde_json::from_slice(payload)
            .map_err(|e| IngestError::MalformedPayload(e.to_string()))?;

        let code = choose_code(data.vehicle_code.as_deref(), &parsed.vehicle_code);
        let vehicle = self.ctx.resolve_vehicle(&code).await?;

        let telemetry = data.into_telemetry(&self.ctx.battery);
        let log = self.ctx.sink.save_telemetry(vehicle.id, telemetry).await?;
        info!(vehicle_code = %code, log_id = log.id, "telemetry saved");

        self.ctx
            .forward(TelemetryEvent::VehicleTelemetry { vehicle, log })
            .await;
        Ok(())
    }
}
