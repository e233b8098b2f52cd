use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use tungstenite::protocol::Message as WsMessage;

use super::EventPublisher;
use super::event::TelemetryEvent;
use super::filter::{ClientFilter, FilterUpdate};
use crate::client::{ClientId, ClientSession};
use crate::config::HubSettings;

/// Registry of live dashboard sessions.
///
/// Owned by a single coordinator task (see [`Hub::spawn`]); everything else
/// talks to it through a [`HubHandle`].
#[derive(Debug, Default)]
pub struct Hub {
    clients: HashMap<ClientId, ClientSession>,
}

pub(crate) enum HubCommand {
    Register(ClientSession),
    Unregister(ClientId),
    SetFilter {
        client_id: ClientId,
        filter: ClientFilter,
    },
    UpdateFilter {
        client_id: ClientId,
        update: FilterUpdate,
    },
    Broadcast(TelemetryEvent),
    Reply {
        client_id: ClientId,
        text: String,
    },
    ClientCount(oneshot::Sender<usize>),
}

impl Hub {
    pub fn new() -> Self {
        Self {
            clients: HashMap::new(),
        }
    }

    /// Returns `false` when a session with the same id is already registered;
    /// the existing one is kept.
    pub fn register_client(&mut self, session: ClientSession) -> bool {
        if self.clients.contains_key(&session.id) {
            warn!(client_id = %session.id, "duplicate registration ignored");
            return false;
        }
        self.clients.insert(session.id.clone(), session);
        info!(total = self.clients.len(), "dashboard client registered");
        true
    }

    /// Idempotent. Dropping the session closes its outbound queue.
    pub fn remove_client(&mut self, client_id: &str) -> bool {
        if self.clients.remove(client_id).is_some() {
            info!(
                client_id = %client_id,
                total = self.clients.len(),
                "dashboard client unregistered"
            );
            true
        } else {
            false
        }
    }

    pub fn set_filter(&mut self, client_id: &str, filter: ClientFilter) -> bool {
        match self.clients.get_mut(client_id) {
            Some(session) => {
                debug!(client_id = %client_id, ?filter, "client filter updated");
                session.filter = filter;
                true
            }
            None => false,
        }
    }

    /// Merge `update` into the session's current filter.
    pub fn update_filter(&mut self, client_id: &str, update: FilterUpdate) -> bool {
        match self.clients.get_mut(client_id) {
            Some(session) => {
                session.filter.apply(update);
                debug!(client_id = %client_id, filter = ?session.filter, "client filter updated");
                true
            }
            None => false,
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn filter_of(&self, client_id: &str) -> Option<&ClientFilter> {
        self.clients.get(client_id).map(|s| &s.filter)
    }

    /// Queue `event` for every session whose filter accepts it and return how
    /// many accepted it.
    ///
    /// A session whose queue is full or closed is dropped; the others are
    /// unaffected.
    pub fn broadcast(&mut self, event: &TelemetryEvent) -> usize {
        let text = match event.to_json() {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, kind = event.kind(), "failed to serialize event");
                return 0;
            }
        };
        let message = WsMessage::text(text);

        let mut delivered = 0;
        let mut lagging = Vec::new();
        for (id, session) in &self.clients {
            if !session.filter.matches(event) {
                continue;
            }
            match session.sender.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => lagging.push(id.clone()),
            }
        }

        for id in lagging {
            warn!(client_id = %id, "outbound queue full or closed, dropping client");
            self.remove_client(&id);
        }

        debug!(kind = event.kind(), delivered, "event broadcast");
        delivered
    }

    /// Queue a message for one session, with the same drop-on-failure rule as
    /// [`Hub::broadcast`].
    pub fn send_to(&mut self, client_id: &str, text: String) -> bool {
        let Some(session) = self.clients.get(client_id) else {
            return false;
        };
        if session.sender.try_send(WsMessage::text(text)).is_ok() {
            return true;
        }
        warn!(client_id = %client_id, "outbound queue full or closed, dropping client");
        self.remove_client(client_id);
        false
    }

    /// Move the registry onto its own task.
    pub fn spawn(self, settings: &HubSettings) -> (HubHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(settings.command_buffer.max(1));
        let handle = HubHandle {
            tx,
            submit_timeout: Duration::from_millis(settings.submit_timeout_ms),
        };
        let task = tokio::spawn(self.run(rx));
        (handle, task)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<HubCommand>) {
        while let Some(command) = rx.recv().await {
            match command {
                HubCommand::Register(session) => {
                    self.register_client(session);
                }
                HubCommand::Unregister(id) => {
                    self.remove_client(&id);
                }
                HubCommand::SetFilter { client_id, filter } => {
                    self.set_filter(&client_id, filter);
                }
                HubCommand::UpdateFilter { client_id, update } => {
                    self.update_filter(&client_id, update);
                }
                HubCommand::Broadcast(event) => {
                    self.broadcast(&event);
                }
                HubCommand::Reply { client_id, text } => {
                    self.send_to(&client_id, text);
                }
                HubCommand::ClientCount(reply) => {
                    let _ = reply.send(self.client_count());
                }
            }
        }
        debug!("hub command channel closed, coordinator exiting");
    }
}

/// Cloneable entry point to the hub coordinator.
#[derive(Clone, Debug)]
pub struct HubHandle {
    tx: mpsc::Sender<HubCommand>,
    submit_timeout: Duration,
}

impl HubHandle {
    pub async fn register(&self, session: ClientSession) -> bool {
        self.tx.send(HubCommand::Register(session)).await.is_ok()
    }

    pub async fn unregister(&self, client_id: ClientId) {
        let _ = self.tx.send(HubCommand::Unregister(client_id)).await;
    }

    /// Applies to broadcasts submitted after this call.
    pub async fn set_filter(&self, client_id: ClientId, filter: ClientFilter) {
        let _ = self
            .tx
            .send(HubCommand::SetFilter { client_id, filter })
            .await;
    }

    /// Like [`HubHandle::set_filter`], but keeps the fields `update` leaves out.
    pub async fn update_filter(&self, client_id: ClientId, update: FilterUpdate) {
        let _ = self
            .tx
            .send(HubCommand::UpdateFilter { client_id, update })
            .await;
    }

    pub async fn reply(&self, client_id: ClientId, text: String) {
        let _ = self.tx.send(HubCommand::Reply { client_id, text }).await;
    }

    /// `0` once the coordinator is gone.
    pub async fn client_count(&self) -> usize {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(HubCommand::ClientCount(reply)).await.is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    /// Best-effort submission bounded by the configured timeout.
    pub async fn broadcast(&self, event: TelemetryEvent) -> bool {
        match self
            .tx
            .send_timeout(HubCommand::Broadcast(event), self.submit_timeout)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "hub busy or stopped, event not broadcast");
                false
            }
        }
    }
}

impl std::fmt::Debug for HubCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HubCommand::Register(s) => write!(f, "Register({})", s.id),
            HubCommand::Unregister(id) => write!(f, "Unregister({id})"),
            HubCommand::SetFilter { client_id, .. } => write!(f, "SetFilter({client_id})"),
            HubCommand::UpdateFilter { client_id, .. } => write!(f, "UpdateFilter({client_id})"),
            HubCommand::Broadcast(e) => write!(f, "Broadcast({})", e.kind()),
            HubCommand::Reply { client_id, .. } => write!(f, "Reply({client_id})"),
            HubCommand::ClientCount(_) => write!(f, "ClientCount"),
        }
    }
}

#[async_trait]
impl EventPublisher for HubHandle {
    async fn publish(&self, event: TelemetryEvent) -> bool {
        self.broadcast(event).await
    }
}
