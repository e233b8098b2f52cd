//! The `listener` module turns inbound MQTT messages into persisted records
//! and hub events.
//!
//! Every listener follows the same steps: parse the topic, parse the payload,
//! pick the vehicle (and sensor) code, resolve it, persist, then forward. A
//! message that fails a step is logged and dropped; nothing is forwarded for
//! a record that was not stored.

pub mod battery;
pub mod payload;
pub mod raw_log;
pub mod sensor;
pub mod telemetry;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::config::BatterySettings;
use crate::hub::{EventPublisher, TelemetryEvent};
use crate::mqtt::{BrokerLink, MessageHandler, ParsedTopic, TopicScheme};
use crate::persistence::{FleetDirectory, SensorRef, TelemetrySink, VehicleRef};
use crate::utils::error::{BrokerError, IngestError};

pub use battery::BatteryListener;
pub use raw_log::RawLogListener;
pub use sensor::SensorListener;
pub use telemetry::TelemetryListener;

/// Collaborators shared by all listeners.
pub struct ListenerContext {
    pub directory: Arc<dyn FleetDirectory>,
    pub sink: Arc<dyn TelemetrySink>,
    pub publisher: Arc<dyn EventPublisher>,
    pub topics: TopicScheme,
    pub battery: BatterySettings,
}

impl ListenerContext {
    /// `with_sensor` selects the `{vehicle}/{sensor}/{channel}` shape.
    pub(crate) fn parse_topic(
        &self,
        topic: &str,
        channel: &str,
        with_sensor: bool,
    ) -> Result<ParsedTopic, IngestError> {
        let parsed = self.topics.parse(topic)?;
        if parsed.channel != channel || parsed.sensor_code.is_some() != with_sensor {
            return Err(IngestError::Topic(topic.to_string()));
        }
        Ok(parsed)
    }

    pub(crate) async fn resolve_vehicle(&self, code: &str) -> Result<VehicleRef, IngestError> {
        self.directory
            .resolve_vehicle_by_code(code)
            .await?
            .ok_or_else(|| IngestError::UnknownVehicle(code.to_string()))
    }

    pub(crate) async fn resolve_sensor(&self, code: &str) -> Result<SensorRef, IngestError> {
        self.directory
            .resolve_sensor_by_code(code)
            .await?
            .ok_or_else(|| IngestError::UnknownSensor(code.to_string()))
    }

    /// Broadcast failures are logged by the hub; the record stays stored.
    pub(crate) async fn forward(&self, event: TelemetryEvent) {
        let kind = event.kind();
        if !self.publisher.publish(event).await {
            debug!(kind, "event stored but not broadcast");
        }
    }
}

/// One inbound topic family.
#[async_trait]
pub trait TopicListener: Send + Sync {
    fn name(&self) -> &'static str;

    /// Wildcard subscription covering every vehicle.
    fn filter(&self) -> String;

    async fn ingest(&self, topic: &str, payload: &[u8]) -> Result<(), IngestError>;
}

#[async_trait]
impl<T: TopicListener> MessageHandler for T {
    async fn handle(&self, topic: &str, payload: &[u8]) {
        if let Err(e) = self.ingest(topic, payload).await {
            log_rejection(self.name(), topic, &e);
        }
    }
}

fn log_rejection(listener: &str, topic: &str, err: &IngestError) {
    match err {
        IngestError::Store(_) => {
            error!(listener, topic = %topic, error = %err, "failed to persist message")
        }
        _ => warn!(listener, topic = %topic, error = %err, "message dropped"),
    }
}

/// Subscribe all four listeners on the shared connection.
pub async fn start_listeners(
    link: &dyn BrokerLink,
    ctx: Arc<ListenerContext>,
) -> Result<(), BrokerError> {
    attach(link, TelemetryListener::new(ctx.clone())).await?;
    attach(link, SensorListener::new(ctx.clone())).await?;
    attach(link, RawLogListener::new(ctx.clone())).await?;
    attach(link, BatteryListener::new(ctx)).await?;
    Ok(())
}

async fn attach<L>(link: &dyn BrokerLink, listener: L) -> Result<(), BrokerError>
where
    L: TopicListener + 'static,
{
    let filter = listener.filter();
    let name = listener.name();
    link.subscribe(&filter, Arc::new(listener)).await?;
    info!(listener = name, filter = %filter, "listener subscribed");
    Ok(())
}
