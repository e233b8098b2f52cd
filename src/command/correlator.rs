//! Command/ACK correlation
//!
//! A command is published to `{prefix}/{vehicle}/command` with a fresh
//! `request_id`; the vehicle answers on `{prefix}/{vehicle}/ack` echoing that
//! id. Callers wait on a oneshot keyed by the id in the pending map.
//!
//! ACK subscriptions are shared per vehicle and reference counted: the first
//! in-flight command to a vehicle subscribes, the last one to finish
//! unsubscribes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::payload::AckPayload;
use super::request::Command;
use crate::config::CommandSettings;
use crate::mqtt::{BrokerLink, MessageHandler, TopicScheme};
use crate::utils::error::CommandError;

type PendingMap = Mutex<HashMap<String, oneshot::Sender<AckPayload>>>;

pub struct CommandCorrelator {
    inner: Arc<Inner>,
}

struct Inner {
    link: Arc<dyn BrokerLink>,
    topics: TopicScheme,
    acks: Arc<AckRouter>,
    /// vehicle code -> in-flight commands using its ACK subscription
    subscriptions: tokio::sync::Mutex<HashMap<String, usize>>,
    ack_timeout: Duration,
}

/// Hands each ACK to the caller waiting on its `request_id`.
struct AckRouter {
    pending: PendingMap,
}

impl CommandCorrelator {
    pub fn new(link: Arc<dyn BrokerLink>, topics: TopicScheme, settings: &CommandSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                link,
                topics,
                acks: Arc::new(AckRouter {
                    pending: Mutex::new(HashMap::new()),
                }),
                subscriptions: tokio::sync::Mutex::new(HashMap::new()),
                ack_timeout: Duration::from_secs(settings.ack_timeout_secs),
            }),
        }
    }

    pub fn is_available(&self) -> bool {
        self.inner.link.is_connected()
    }

    /// Publish `command` to the vehicle and wait for its ACK.
    ///
    /// A returned ACK may still carry `status: "error"`: that is the
    /// hardware's answer. Transport problems and the absence of any answer are
    /// reported as [`CommandError`] instead.
    pub async fn send_command(
        &self,
        vehicle_code: &str,
        command: &Command,
    ) -> Result<AckPayload, CommandError> {
        if !self.inner.link.is_connected() {
            return Err(CommandError::BrokerUnavailable);
        }

        self.inner.acquire_ack_subscription(vehicle_code).await?;
        let in_flight = InFlight {
            inner: self.inner.clone(),
            request_id: Uuid::new_v4().to_string(),
            vehicle_code: vehicle_code.to_string(),
            released: false,
        };

        let outcome = self.exchange(&in_flight, command).await;
        in_flight.complete().await;
        outcome
    }

    async fn exchange(
        &self,
        in_flight: &InFlight,
        command: &Command,
    ) -> Result<AckPayload, CommandError> {
        let request_id = in_flight.request_id.as_str();
        let payload = serde_json::to_vec(&command.to_payload(request_id))?;

        let (tx, rx) = oneshot::channel();
        self.inner.acks.register(request_id, tx);

        let topic = self.inner.topics.command_topic(&in_flight.vehicle_code);
        self.inner
            .link
            .publish(&topic, payload)
            .await
            .map_err(CommandError::Publish)?;
        info!(
            vehicle_code = %in_flight.vehicle_code,
            command = %command.kind(),
            request_id = %request_id,
            "command published"
        );

        match tokio::time::timeout(self.inner.ack_timeout, rx).await {
            Ok(Ok(ack)) => {
                info!(
                    request_id = %request_id,
                    status = %ack.status,
                    message = %ack.message,
                    "command acknowledged"
                );
                Ok(ack)
            }
            Ok(Err(_)) | Err(_) => {
                warn!(
                    vehicle_code = %in_flight.vehicle_code,
                    request_id = %request_id,
                    "no ACK before timeout"
                );
                Err(CommandError::NoResponse(self.inner.ack_timeout))
            }
        }
    }

    /// Publish JSON to `{prefix}/{vehicle_code}/{channel}` without waiting
    /// for any reply.
    pub async fn notify_vehicle<T>(
        &self,
        vehicle_code: &str,
        channel: &str,
        payload: &T,
    ) -> Result<(), CommandError>
    where
        T: Serialize + ?Sized + Sync,
    {
        if !self.inner.link.is_connected() {
            return Err(CommandError::BrokerUnavailable);
        }
        let body = serde_json::to_vec(payload)?;
        let topic = self.inner.topics.vehicle_topic(vehicle_code, channel);
        self.inner
            .link
            .publish(&topic, body)
            .await
            .map_err(CommandError::Publish)?;
        debug!(topic = %topic, "vehicle notified");
        Ok(())
    }

    /// Number of commands still waiting for an ACK.
    pub fn pending_count(&self) -> usize {
        self.inner.acks.len()
    }
}

impl Inner {
    async fn acquire_ack_subscription(&self, vehicle_code: &str) -> Result<(), CommandError> {
        let mut subscriptions = self.subscriptions.lock().await;
        if let Some(count) = subscriptions.get_mut(vehicle_code) {
            *count += 1;
            return Ok(());
        }

        let filter = self.topics.ack_topic(vehicle_code);
        self.link
            .subscribe(&filter, self.acks.clone())
            .await
            .map_err(CommandError::Subscribe)?;
        subscriptions.insert(vehicle_code.to_string(), 1);
        debug!(filter = %filter, "ack subscription opened");
        Ok(())
    }

    async fn release_ack_subscription(&self, vehicle_code: &str) {
        let mut subscriptions = self.subscriptions.lock().await;
        let Some(count) = subscriptions.get_mut(vehicle_code) else {
            return;
        };
        *count -= 1;
        if *count > 0 {
            return;
        }
        subscriptions.remove(vehicle_code);

        let filter = self.topics.ack_topic(vehicle_code);
        match self.link.unsubscribe(&filter).await {
            Ok(()) => debug!(filter = %filter, "ack subscription closed"),
            Err(e) => warn!(filter = %filter, error = %e, "failed to unsubscribe ack topic"),
        }
    }
}

impl AckRouter {
    fn register(&self, request_id: &str, tx: oneshot::Sender<AckPayload>) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(request_id.to_string(), tx);
    }

    fn remove(&self, request_id: &str) -> Option<oneshot::Sender<AckPayload>> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(request_id)
    }

    fn len(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl MessageHandler for AckRouter {
    async fn handle(&self, topic: &str, payload: &[u8]) {
        let ack: AckPayload = match serde_json::from_slice(payload) {
            Ok(ack) => ack,
            Err(e) => {
                warn!(
                    topic = %topic,
                    error = %e,
                    raw = %String::from_utf8_lossy(payload),
                    "failed to parse ACK payload"
                );
                return;
            }
        };

        match self.remove(&ack.request_id) {
            Some(tx) => {
                let request_id = ack.request_id.clone();
                if tx.send(ack).is_err() {
                    debug!(request_id = %request_id, "ACK arrived after caller left");
                }
            }
            None => warn!(
                request_id = %ack.request_id,
                "ACK for unknown request_id (may have timed out)"
            ),
        }
    }
}

/// Cleans up one command: drops its pending entry and releases the vehicle's
/// ACK subscription, on every exit path including a dropped caller future.
struct InFlight {
    inner: Arc<Inner>,
    request_id: String,
    vehicle_code: String,
    released: bool,
}

impl InFlight {
    /// Release on its own task so a cancelled caller cannot interrupt it
    /// halfway, then wait for it.
    async fn complete(mut self) {
        self.inner.acks.remove(&self.request_id);
        if let Some(release) = self.spawn_release() {
            let _ = release.await;
        }
    }

    fn spawn_release(&mut self) -> Option<tokio::task::JoinHandle<()>> {
        if self.released {
            return None;
        }
        self.released = true;

        let inner = self.inner.clone();
        let vehicle_code = std::mem::take(&mut self.vehicle_code);
        let runtime = tokio::runtime::Handle::try_current().ok()?;
        Some(runtime.spawn(async move {
            inner.release_ack_subscription(&vehicle_code).await;
        }))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.inner.acks.remove(&self.request_id);
        self.spawn_release();
    }
}
