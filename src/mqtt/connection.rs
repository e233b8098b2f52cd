//! Broker connection manager
//!
//! Owns the single MQTT connection shared by every listener and by the
//! command correlator. Responsibilities:
//! - drive the `rumqttc` event loop on a dedicated task
//! - reconnect with bounded exponential backoff after a failure
//! - keep a routing table of subscriptions and re-issue it on every ConnAck
//!   (the session is clean, so the broker forgets them on disconnect)
//! - hand each inbound publish to every matching handler on its own task
//!
//! Handlers must tolerate concurrent invocation: two messages on the same
//! subscription can be processed at the same time.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::routes::Routes;
use crate::config::MqttSettings;
use crate::utils::error::BrokerError;

/// Receives the messages of one subscription.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, topic: &str, payload: &[u8]);
}

/// Publish/subscribe primitives over the shared connection.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrokerLink: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Route messages matching `filter` to `handler`, replacing any previous
    /// handler for the same filter.
    async fn subscribe(
        &self,
        filter: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), BrokerError>;

    async fn unsubscribe(&self, filter: &str) -> Result<(), BrokerError>;

    /// Publish at QoS 1.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BrokerError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connecting,
    Connected,
    Disconnected,
}

pub struct BrokerConnection {
    client: AsyncClient,
    routes: Arc<Routes>,
    state: watch::Receiver<LinkState>,
    op_timeout: Duration,
    task: JoinHandle<()>,
}

impl BrokerConnection {
    /// Start connecting in the background and return immediately.
    ///
    /// A broker that is down at startup is not an error: the event loop keeps
    /// retrying and `is_connected` reports `false` until it succeeds.
    pub fn connect(settings: &MqttSettings, op_timeout: Duration) -> Self {
        // suffix avoids client id clashes with a previous run still known to the broker
        let client_id = format!("{}-{}", settings.client_id, chrono::Utc::now().timestamp());
        let mut options = MqttOptions::new(client_id, settings.host.clone(), settings.port);
        options.set_keep_alive(Duration::from_secs(settings.keep_alive_secs.max(5)));
        options.set_clean_session(true);
        if let Some(username) = &settings.username {
            options.set_credentials(username.clone(), settings.password.clone().unwrap_or_default());
        }

        let (client, eventloop) = AsyncClient::new(options, 100);
        let routes = Arc::new(Routes::default());
        let (state_tx, state_rx) = watch::channel(LinkState::Connecting);
        let backoff = Backoff::new(
            Duration::from_millis(settings.initial_backoff_ms.max(1)),
            Duration::from_secs(settings.max_backoff_secs.max(1)),
        );

        info!(
            host = %settings.host,
            port = settings.port,
            "connecting to MQTT broker"
        );

        let task = tokio::spawn(run_event_loop(
            eventloop,
            client.clone(),
            routes.clone(),
            state_tx,
            backoff,
        ));

        Self {
            client,
            routes,
            state: state_rx,
            op_timeout,
            task,
        }
    }

    pub fn state(&self) -> LinkState {
        *self.state.borrow()
    }

    /// Wait up to `limit` for the first successful connection.
    pub async fn wait_connected(&self, limit: Duration) -> bool {
        let mut state = self.state.clone();
        matches!(
            tokio::time::timeout(limit, state.wait_for(|s| *s == LinkState::Connected)).await,
            Ok(Ok(_))
        )
    }

    pub async fn disconnect(&self) {
        if let Err(e) = self.client.disconnect().await {
            debug!(error = %e, "MQTT disconnect request failed");
        }
        self.task.abort();
        info!("MQTT connection closed");
    }

    async fn bounded<F>(&self, op: F) -> Result<(), BrokerError>
    where
        F: std::future::Future<Output = Result<(), rumqttc::ClientError>>,
    {
        tokio::time::timeout(self.op_timeout, op)
            .await
            .map_err(|_| BrokerError::Timeout(self.op_timeout))?
            .map_err(BrokerError::from)
    }
}

#[async_trait]
impl BrokerLink for BrokerConnection {
    fn is_connected(&self) -> bool {
        self.state() == LinkState::Connected
    }

    async fn subscribe(
        &self,
        filter: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), BrokerError> {
        let previous = self.routes.insert(filter, handler);

        // while disconnected the route is picked up by the next ConnAck
        if self.is_connected() {
            if let Err(e) = self
                .bounded(self.client.subscribe(filter, QoS::AtLeastOnce))
                .await
            {
                // nobody owns a route whose subscribe failed
                self.routes.restore(filter, previous);
                return Err(e);
            }
        }
        debug!(filter = %filter, "subscription registered");
        Ok(())
    }

    async fn unsubscribe(&self, filter: &str) -> Result<(), BrokerError> {
        self.routes.remove(filter);

        if self.is_connected() {
            self.bounded(self.client.unsubscribe(filter)).await?;
        }
        debug!(filter = %filter, "subscription removed");
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        if !self.is_connected() {
            return Err(BrokerError::NotConnected);
        }
        self.bounded(self.client.publish(topic, QoS::AtLeastOnce, false, payload))
            .await
    }
}

async fn run_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    routes: Arc<Routes>,
    state: watch::Sender<LinkState>,
    mut backoff: Backoff,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                backoff.reset();
                state.send_replace(LinkState::Connected);
                info!("MQTT connected");
                // try_subscribe: awaiting here would stall the loop that drains the request channel
                routes.resubscribe(|filter| client.try_subscribe(filter, QoS::AtLeastOnce));
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                routes.dispatch(&publish.topic, publish.payload);
            }
            Ok(_) => {}
            Err(ConnectionError::RequestsDone) => {
                debug!("MQTT request channel closed, stopping event loop");
                break;
            }
            Err(e) => {
                let previous = state.send_replace(LinkState::Disconnected);
                if previous == LinkState::Connected {
                    warn!(error = %e, "MQTT connection lost, will reconnect");
                } else {
                    warn!(error = %e, "MQTT connection attempt failed");
                }
                let delay = backoff.next_delay();
                debug!(delay_ms = delay.as_millis() as u64, "waiting before reconnect");
                tokio::time::sleep(delay).await;
            }
        }
    }
    state.send_replace(LinkState::Disconnected);
}

/// Reconnect delay that doubles per consecutive failure, capped at `max`.
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub(crate) fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.min(max);
        Self {
            initial,
            max,
            current: initial,
        }
    }

    pub(crate) fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub(crate) fn reset(&mut self) {
        self.current = self.initial;
    }
}
