use std::time::Duration;

use serde_json::json;

use super::message::{ClientMessage, ErrorKind, ServerMessage};
use crate::command::AckPayload;
use crate::utils::error::{BrokerError, CommandError, RequestError};

#[test]
fn subscribe_distinguishes_absent_from_cleared() {
    let msg: ClientMessage = serde_json::from_str(
        r#"{"type":"subscribe","vehicle_code":"USV-01","sensor_code":"","sensor_type":null}"#,
    )
    .unwrap();
    match msg {
        ClientMessage::Subscribe {
            vehicle_code,
            sensor_code,
            sensor_type,
        } => {
            assert_eq!(vehicle_code, Some(Some("USV-01".to_string())));
            assert_eq!(sensor_code, Some(Some(String::new())));
            assert_eq!(sensor_type, Some(None));
        }
        other => panic!("unexpected message: {other:?}"),
    }

    let msg: ClientMessage =
        serde_json::from_str(r#"{"type":"subscribe","sensor_type":"ctd"}"#).unwrap();
    let ClientMessage::Subscribe {
        vehicle_code,
        sensor_code,
        ..
    } = msg
    else {
        panic!("expected a subscribe");
    };
    assert!(vehicle_code.is_none());
    assert!(sensor_code.is_none());
}

#[test]
fn command_request_is_inline() {
    let msg: ClientMessage = serde_json::from_str(
        r#"{"type":"command","vehicle_code":"USV-01","command":"set_mode","mode":"AUTO"}"#,
    )
    .unwrap();
    let ClientMessage::Command(request) = msg else {
        panic!("expected a command");
    };
    assert_eq!(request.vehicle_code, "USV-01");
    assert_eq!(request.command, "set_mode");
    assert_eq!(request.mode.as_deref(), Some("AUTO"));
}

#[test]
fn unknown_message_type_is_rejected() {
    assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"publish"}"#).is_err());
    assert!(serde_json::from_str::<ClientMessage>("not json").is_err());
}

#[test]
fn stats_reply_shape() {
    let text = serde_json::to_value(ServerMessage::Stats {
        connected_clients: 3,
    })
    .unwrap();
    assert_eq!(text, json!({"type": "stats", "connected_clients": 3}));
}

#[test]
fn ack_becomes_command_result() {
    let ack = AckPayload {
        request_id: "r1".into(),
        command: "set_mode".into(),
        status: "success".into(),
        message: "Mode changed to AUTO".into(),
    };
    let reply = ServerMessage::from_command_outcome(Ok(ack), Some("AUTO"));
    assert_eq!(
        serde_json::to_value(&reply).unwrap(),
        json!({
            "type": "command_result",
            "command": "set_mode",
            "status": "success",
            "message": "Mode changed to AUTO",
            "mode": "AUTO"
        })
    );
}

#[test]
fn hardware_rejection_is_still_a_result() {
    let ack = AckPayload {
        request_id: "r1".into(),
        command: "arm".into(),
        status: "error".into(),
        message: "pre-arm check failed".into(),
    };
    let reply = ServerMessage::from_command_outcome(Ok(ack), None);
    assert!(matches!(
        reply,
        ServerMessage::CommandResult { ref status, mode: None, .. } if status == "error"
    ));
}

#[test]
fn failures_map_to_distinct_kinds() {
    let kind_of = |err: CommandError| match ServerMessage::from_command_outcome(Err(err), None) {
        ServerMessage::Error { kind, .. } => kind,
        other => panic!("expected an error, got {other:?}"),
    };

    assert_eq!(kind_of(CommandError::BrokerUnavailable), ErrorKind::Unavailable);
    assert_eq!(
        kind_of(CommandError::NoResponse(Duration::from_secs(8))),
        ErrorKind::Timeout
    );
    assert_eq!(
        kind_of(CommandError::Publish(BrokerError::NotConnected)),
        ErrorKind::Transport
    );
    assert_eq!(
        kind_of(CommandError::Subscribe(BrokerError::Timeout(Duration::from_secs(5)))),
        ErrorKind::Transport
    );
}

#[test]
fn invalid_request_carries_reason() {
    let reply = ServerMessage::invalid_request(&RequestError::MissingMode);
    assert_eq!(
        reply,
        ServerMessage::Error {
            kind: ErrorKind::InvalidRequest,
            message: "mode is required for set_mode command".into(),
        }
    );
}
