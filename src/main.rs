//! CLI for SeanoLink
//!
//! Subcommands:
//! - `server`: run ingestion, the broadcast hub and the WebSocket server
//! - `watch`: connect to a running server and print the events it broadcasts
//! - `send`: send one command to a vehicle and print its acknowledgment

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use seanolink::command::{CommandCorrelator, CommandRequest};
use seanolink::config::{Settings, load_config};
use seanolink::hub::Hub;
use seanolink::listener::{ListenerContext, start_listeners};
use seanolink::mqtt::{BrokerConnection, BrokerLink, TopicScheme};
use seanolink::persistence::SledStore;
use seanolink::transport::websocket::{ServerContext, start_websocket_server};
use seanolink::utils::logging;
use serde_json::json;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "seanolink")]
enum Command {
    /// Start the telemetry pipeline and the dashboard WebSocket server
    Server,
    /// Print the events a running server broadcasts
    Watch {
        /// WebSocket server URL to connect to
        #[arg(long, default_value = "ws://127.0.0.1:8080")]
        url: String,
        #[arg(long)]
        vehicle_code: Option<String>,
        #[arg(long)]
        sensor_code: Option<String>,
        #[arg(long)]
        sensor_type: Option<String>,
    },
    /// Send a command (arm, disarm, set_mode) and wait for the vehicle's ACK
    Send {
        vehicle_code: String,
        command: String,
        /// Flight mode, required for set_mode
        #[arg(long)]
        mode: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cmd = Command::parse();

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            logging::init("info");
            error!("Failed to load configuration: {}", e);
            return;
        }
    };
    logging::init(&config.logging.level);

    let result = match cmd {
        Command::Server => run_server(config).await,
        Command::Watch {
            url,
            vehicle_code,
            sensor_code,
            sensor_type,
        } => run_watch(&url, vehicle_code, sensor_code, sensor_type).await,
        Command::Send {
            vehicle_code,
            command,
            mode,
        } => {
            let request = CommandRequest {
                vehicle_code,
                command,
                mode,
            };
            run_send(config, request).await
        }
    };

    if let Err(e) = result {
        error!("{}", e);
    }
}

async fn run_server(config: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(SledStore::open(&config.storage)?);
    store.seed(&config.fleet)?;

    let (hub, _hub_task) = Hub::new().spawn(&config.hub);
    let topics = TopicScheme::new(&config.mqtt.topic_prefix);

    let mut broker = None;
    let mut commands = None;
    if config.mqtt.is_configured() {
        let connection = Arc::new(BrokerConnection::connect(
            &config.mqtt,
            Duration::from_secs(config.command.broker_op_timeout_secs),
        ));
        let link: Arc<dyn BrokerLink> = connection.clone();

        let ctx = Arc::new(ListenerContext {
            directory: store.clone(),
            sink: store.clone(),
            publisher: Arc::new(hub.clone()),
            topics: topics.clone(),
            battery: config.battery,
        });
        start_listeners(link.as_ref(), ctx).await?;

        commands = Some(Arc::new(CommandCorrelator::new(
            link,
            topics,
            &config.command,
        )));
        broker = Some(connection);
    } else {
        warn!("MQTT host not configured; running without ingestion, commands are disabled");
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let ctx = ServerContext {
        hub,
        commands,
        client_buffer: config.hub.client_buffer,
    };

    tokio::select! {
        res = start_websocket_server(&addr, ctx) => {
            match res {
                Ok(()) => error!("WebSocket server exited unexpectedly."),
                Err(e) => error!("WebSocket server failed: {}", e),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
        }
    }

    if let Some(connection) = broker {
        connection.disconnect().await;
    }

    Ok(())
}

async fn run_watch(
    url: &str,
    vehicle_code: Option<String>,
    sensor_code: Option<String>,
    sensor_type: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (mut ws_stream, _response) = connect_async(url).await?;

    let subscribe = json!({
        "type": "subscribe",
        "vehicle_code": vehicle_code,
        "sensor_code": sensor_code,
        "sensor_type": sensor_type,
    });
    ws_stream
        .send(WsMessage::Text(subscribe.to_string().into()))
        .await?;

    loop {
        tokio::select! {
            frame = ws_stream.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => println!("{text}"),
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            },
            _ = tokio::signal::ctrl_c() => {
                let _ = ws_stream.close(None).await;
                break;
            }
        }
    }

    Ok(())
}

async fn run_send(
    config: Settings,
    request: CommandRequest,
) -> Result<(), Box<dyn std::error::Error>> {
    let (vehicle_code, command) = request.validate()?;
    if !config.mqtt.is_configured() {
        return Err("MQTT host not configured".into());
    }

    let op_timeout = Duration::from_secs(config.command.broker_op_timeout_secs);
    let connection = Arc::new(BrokerConnection::connect(&config.mqtt, op_timeout));
    if !connection.wait_connected(op_timeout).await {
        warn!("broker not reachable within {:?}", op_timeout);
    }

    let correlator = CommandCorrelator::new(
        connection.clone(),
        TopicScheme::new(&config.mqtt.topic_prefix),
        &config.command,
    );
    let outcome = correlator.send_command(&vehicle_code, &command).await;
    connection.disconnect().await;

    let ack = outcome?;
    println!(
        "{} {}: {} ({})",
        vehicle_code, ack.command, ack.status, ack.message
    );
    if ack.is_error() {
        return Err(format!("{vehicle_code} rejected {}", ack.command).into());
    }
    Ok(())
}
