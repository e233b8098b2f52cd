use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::payload::{AckPayload, CommandKind, CommandPayload};
use super::request::{Command, CommandRequest};
use super::CommandCorrelator;
use crate::config::CommandSettings;
use crate::mqtt::topic::topic_matches;
use crate::mqtt::{BrokerLink, MessageHandler, TopicScheme};
use crate::utils::error::{BrokerError, CommandError, RequestError};

type Responder = Box<dyn Fn(&CommandPayload) -> Option<AckPayload> + Send + Sync>;

/// In-memory broker: records publishes and, when a responder is set, answers
/// commands on the matching ACK topic like a vehicle would.
#[derive(Default)]
struct LoopbackLink {
    disconnected: AtomicBool,
    fail_subscribe: AtomicBool,
    routes: Mutex<HashMap<String, Arc<dyn MessageHandler>>>,
    published: Mutex<Vec<(String, Vec<u8>)>>,
    subscribe_calls: AtomicUsize,
    unsubscribe_calls: AtomicUsize,
    responder: Mutex<Option<Responder>>,
}

impl LoopbackLink {
    fn answering(responder: impl Fn(&CommandPayload) -> Option<AckPayload> + Send + Sync + 'static) -> Self {
        let link = Self::default();
        *link.responder.lock().unwrap() = Some(Box::new(responder));
        link
    }

    fn published_commands(&self) -> Vec<(String, CommandPayload)> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|(topic, _)| topic.ends_with("/command"))
            .map(|(topic, body)| (topic.clone(), serde_json::from_slice(body).unwrap()))
            .collect()
    }

    fn route_count(&self) -> usize {
        self.routes.lock().unwrap().len()
    }

    async fn deliver(&self, topic: &str, payload: Vec<u8>) {
        let handlers: Vec<_> = self
            .routes
            .lock()
            .unwrap()
            .iter()
            .filter(|(filter, _)| topic_matches(filter, topic))
            .map(|(_, h)| h.clone())
            .collect();
        for handler in handlers {
            handler.handle(topic, &payload).await;
        }
    }
}

#[async_trait]
impl BrokerLink for LoopbackLink {
    fn is_connected(&self) -> bool {
        !self.disconnected.load(Ordering::SeqCst)
    }

    async fn subscribe(
        &self,
        filter: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), BrokerError> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(BrokerError::Timeout(Duration::from_secs(3)));
        }
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        self.routes
            .lock()
            .unwrap()
            .insert(filter.to_string(), handler);
        Ok(())
    }

    async fn unsubscribe(&self, filter: &str) -> Result<(), BrokerError> {
        self.unsubscribe_calls.fetch_add(1, Ordering::SeqCst);
        self.routes.lock().unwrap().remove(filter);
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), payload.clone()));

        let Some(ack_topic) = topic.strip_suffix("/command").map(|t| format!("{t}/ack")) else {
            return Ok(());
        };
        let command: CommandPayload = serde_json::from_slice(&payload).unwrap();
        let ack = self
            .responder
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|respond| respond(&command));
        if let Some(ack) = ack {
            self.deliver(&ack_topic, serde_json::to_vec(&ack).unwrap())
                .await;
        }
        Ok(())
    }
}

fn settings() -> CommandSettings {
    CommandSettings {
        ack_timeout_secs: 8,
        broker_op_timeout_secs: 3,
    }
}

fn correlator(link: &Arc<LoopbackLink>) -> CommandCorrelator {
    CommandCorrelator::new(link.clone(), TopicScheme::new("seano"), &settings())
}

fn ok_ack(cmd: &CommandPayload) -> Option<AckPayload> {
    Some(AckPayload {
        request_id: cmd.request_id.clone(),
        command: cmd.command.as_str().to_string(),
        status: "ok".into(),
        message: format!("{} done", cmd.command),
    })
}

#[tokio::test]
async fn test_round_trip_returns_matching_ack() {
    let link = Arc::new(LoopbackLink::answering(ok_ack));
    let correlator = correlator(&link);

    let ack = correlator.send_command("USV-01", &Command::Arm).await.unwrap();

    let published = link.published_commands();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, "seano/USV-01/command");
    assert_eq!(published[0].1.command, CommandKind::Arm);
    assert_eq!(ack.request_id, published[0].1.request_id);
    assert_eq!(ack.status, "ok");
    assert!(!ack.is_error());

    assert_eq!(correlator.pending_count(), 0);
    assert_eq!(link.route_count(), 0);
    assert_eq!(link.unsubscribe_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_hardware_error_is_an_ack_not_a_failure() {
    let link = Arc::new(LoopbackLink::answering(|cmd| {
        Some(AckPayload {
            request_id: cmd.request_id.clone(),
            command: "set_mode".into(),
            status: "error".into(),
            message: "mode not supported".into(),
        })
    }));
    let correlator = correlator(&link);

    let ack = correlator
        .send_command("USV-01", &Command::SetMode("WARP".into()))
        .await
        .unwrap();
    assert!(ack.is_error());
    assert_eq!(ack.message, "mode not supported");
    assert_eq!(link.published_commands()[0].1.mode.as_deref(), Some("WARP"));
}

#[tokio::test(start_paused = true)]
async fn test_no_ack_times_out_and_cleans_up() {
    let link = Arc::new(LoopbackLink::default());
    let correlator = correlator(&link);

    let err = correlator
        .send_command("USV-01", &Command::Disarm)
        .await
        .unwrap_err();
    assert!(matches!(err, CommandError::NoResponse(d) if d == Duration::from_secs(8)));
    assert_eq!(correlator.pending_count(), 0);
    assert_eq!(link.route_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_late_ack_is_discarded() {
    let link = Arc::new(LoopbackLink::default());
    let correlator = Arc::new(correlator(&link));

    let err = correlator
        .send_command("USV-01", &Command::Arm)
        .await
        .unwrap_err();
    assert!(matches!(err, CommandError::NoResponse(_)));
    let stale = ok_ack(&link.published_commands()[0].1).unwrap();

    // a second command re-opens the ack route; the stale ACK must not satisfy it
    let second = {
        let c = correlator.clone();
        tokio::spawn(async move { c.send_command("USV-01", &Command::Disarm).await })
    };
    while link.published_commands().len() < 2 {
        tokio::task::yield_now().await;
    }
    link.deliver("seano/USV-01/ack", serde_json::to_vec(&stale).unwrap())
        .await;
    assert_eq!(correlator.pending_count(), 1);

    let result = second.await.unwrap();
    assert!(matches!(result, Err(CommandError::NoResponse(_))));
    assert_eq!(correlator.pending_count(), 0);
    assert_eq!(link.route_count(), 0);
}

#[tokio::test]
async fn test_concurrent_commands_get_their_own_ack() {
    let link = Arc::new(LoopbackLink::default());
    let correlator = Arc::new(correlator(&link));

    let arm = {
        let c = correlator.clone();
        tokio::spawn(async move { c.send_command("USV-01", &Command::Arm).await })
    };
    let set_mode = {
        let c = correlator.clone();
        tokio::spawn(async move {
            c.send_command("USV-01", &Command::SetMode("AUTO".into()))
                .await
        })
    };

    while link.published_commands().len() < 2 {
        tokio::task::yield_now().await;
    }
    assert_eq!(link.subscribe_calls.load(Ordering::SeqCst), 1);
    assert_eq!(correlator.pending_count(), 2);

    // answer in reverse order
    let mut commands = link.published_commands();
    commands.reverse();
    for (_, cmd) in commands {
        let ack = ok_ack(&cmd).unwrap();
        link.deliver("seano/USV-01/ack", serde_json::to_vec(&ack).unwrap())
            .await;
    }

    let arm_ack = arm.await.unwrap().unwrap();
    let mode_ack = set_mode.await.unwrap().unwrap();
    assert_eq!(arm_ack.command, "arm");
    assert_eq!(mode_ack.command, "set_mode");
    assert_ne!(arm_ack.request_id, mode_ack.request_id);

    assert_eq!(correlator.pending_count(), 0);
    assert_eq!(link.unsubscribe_calls.load(Ordering::SeqCst), 1);
    assert_eq!(link.route_count(), 0);
}

#[tokio::test]
async fn test_commands_to_different_vehicles_use_separate_topics() {
    let link = Arc::new(LoopbackLink::answering(ok_ack));
    let correlator = correlator(&link);

    let (a, b) = tokio::join!(
        correlator.send_command("USV-01", &Command::Arm),
        correlator.send_command("USV-02", &Command::Arm),
    );
    assert!(a.is_ok() && b.is_ok());

    let topics: Vec<String> = link
        .published_commands()
        .into_iter()
        .map(|(t, _)| t)
        .collect();
    assert!(topics.contains(&"seano/USV-01/command".to_string()));
    assert!(topics.contains(&"seano/USV-02/command".to_string()));
    assert_eq!(link.route_count(), 0);
}

#[tokio::test]
async fn test_unavailable_broker_fails_fast() {
    let link = Arc::new(LoopbackLink::default());
    link.disconnected.store(true, Ordering::SeqCst);
    let correlator = correlator(&link);

    let err = correlator
        .send_command("USV-01", &Command::Arm)
        .await
        .unwrap_err();
    assert!(matches!(err, CommandError::BrokerUnavailable));
    assert!(!correlator.is_available());
    assert_eq!(link.subscribe_calls.load(Ordering::SeqCst), 0);
    assert!(link.published.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_subscribe_failure_is_reported() {
    let link = Arc::new(LoopbackLink::default());
    link.fail_subscribe.store(true, Ordering::SeqCst);
    let correlator = correlator(&link);

    let err = correlator
        .send_command("USV-01", &Command::Arm)
        .await
        .unwrap_err();
    assert!(matches!(err, CommandError::Subscribe(_)));
    assert_eq!(correlator.pending_count(), 0);
    assert!(link.published.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_caller_still_cleans_up() {
    let link = Arc::new(LoopbackLink::default());
    let correlator = correlator(&link);

    let result = tokio::time::timeout(
        Duration::from_secs(1),
        correlator.send_command("USV-01", &Command::Arm),
    )
    .await;
    assert!(result.is_err());
    assert_eq!(correlator.pending_count(), 0);

    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(link.route_count(), 0);
    assert_eq!(link.unsubscribe_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_malformed_ack_is_ignored() {
    let link = Arc::new(LoopbackLink::default());
    let correlator = Arc::new(correlator(&link));
    let pending = {
        let c = correlator.clone();
        tokio::spawn(async move { c.send_command("USV-01", &Command::Arm).await })
    };
    while link.published_commands().is_empty() {
        tokio::task::yield_now().await;
    }

    link.deliver("seano/USV-01/ack", b"not json".to_vec()).await;
    assert_eq!(correlator.pending_count(), 1);

    let cmd = link.published_commands().remove(0).1;
    link.deliver("seano/USV-01/ack", serde_json::to_vec(&ok_ack(&cmd).unwrap()).unwrap())
        .await;
    assert!(pending.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_notify_vehicle_publishes_without_waiting() {
    let link = Arc::new(LoopbackLink::default());
    let correlator = correlator(&link);

    correlator
        .notify_vehicle("USV-01", "mission", &json!({"waypoints": 3}))
        .await
        .unwrap();

    let published = link.published.lock().unwrap();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, "seano/USV-01/mission");
    assert_eq!(link.subscribe_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_command_payload_omits_mode_unless_set_mode() {
    let arm = serde_json::to_value(Command::Arm.to_payload("r1")).unwrap();
    assert_eq!(arm, json!({"command": "arm", "request_id": "r1"}));

    let set_mode = serde_json::to_value(Command::SetMode("HOLD".into()).to_payload("r2")).unwrap();
    assert_eq!(
        set_mode,
        json!({"command": "set_mode", "mode": "HOLD", "request_id": "r2"})
    );
}

#[test]
fn test_request_validation() {
    let request = |vehicle: &str, command: &str, mode: Option<&str>| CommandRequest {
        vehicle_code: vehicle.into(),
        command: command.into(),
        mode: mode.map(Into::into),
    };

    assert_eq!(
        request("USV-01", "arm", Some("AUTO")).validate(),
        Ok(("USV-01".to_string(), Command::Arm))
    );
    assert_eq!(
        request(" USV-01 ", "set_mode", Some("AUTO")).validate(),
        Ok(("USV-01".to_string(), Command::SetMode("AUTO".into())))
    );
    assert_eq!(
        request("USV-01", "set_mode", Some("")).validate(),
        Err(RequestError::MissingMode)
    );
    assert_eq!(
        request("USV-01", "set_mode", None).validate(),
        Err(RequestError::MissingMode)
    );
    assert_eq!(
        request("", "arm", None).validate(),
        Err(RequestError::MissingVehicleCode)
    );
    for code in ["#", "+", "USV-01/ack", "seano/#"] {
        assert_eq!(
            request(code, "arm", None).validate(),
            Err(RequestError::InvalidVehicleCode(code.to_string()))
        );
    }
    assert!(matches!(
        request("USV-01", "launch", None).validate(),
        Err(RequestError::UnknownCommand(c)) if c == "launch"
    ));
}
