use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::payload::{RawPayload, choose_code, truncate_log};
use super::{ListenerContext, TopicListener};
use crate::hub::TelemetryEvent;
use crate::mqtt::topic::RAW_LOG;
use crate::utils::error::IngestError;

/// `{prefix}/{vehicle_code}/raw`
///
/// Unlike the other listeners, a log from an unknown vehicle is still stored,
/// without a vehicle association.
pub struct RawLogListener {
    ctx: Arc<ListenerContext>,
}

impl RawLogListener {
    pub fn new(ctx: Arc<ListenerContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl TopicListener for RawLogListener {
    fn name(&self) -> &'static str {
        "raw_log"
    }

    fn filter(&self) -> String {
        self.ctx.topics.raw_log_filter()
    }

    async fn ingest(&self, topic: &str, payload: &[u8]) -> Result<(), IngestError> {
        let parsed = self.ctx.parse_topic(topic, RAW_LOG, false)?;
        let raw = RawPayload::parse(payload);

        let code = choose_code(raw.vehicle_code(), &parsed.vehicle_code);
        let text = truncate_log(&raw.log_text());

        let vehicle = self.ctx.directory.resolve_vehicle_by_code(&code).await?;
        if vehicle.is_none() {
            warn!(vehicle_code = %code, "unknown vehicle, saving log without association");
        }

        let log = self
            .ctx
            .sink
            .save_raw_log(vehicle.as_ref().map(|v| v.id), format!("[{code}] {text}"))
            .await?;
        info!(vehicle_code = %code, log_id = log.id, "raw log saved");

        self.ctx
            .forward(TelemetryEvent::RawLogEntry {
                vehicle_code: code,
                vehicle,
                log,
            })
            .await;
        Ok(())
    }
}
