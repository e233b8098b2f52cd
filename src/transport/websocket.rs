//! WebSocket transport
//!
//! Dashboard sessions connect here. For each connection:
//! - a `ClientSession` with a bounded outbound queue is registered with the hub
//! - a write task drains that queue into the socket
//! - the read loop handles `subscribe`, `stats` and `command` requests
//!
//! The hub holds the only sender of a session's queue, so when it drops a
//! slow session the write task sees the queue close and shuts the socket.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::spawn;
use tokio_tungstenite::accept_async;
use tracing::{debug, info, warn};
use tungstenite::protocol::Message as WsMessage;

use super::message::{ClientMessage, ErrorKind, ServerMessage};
use crate::client::{ClientId, ClientSession};
use crate::command::{CommandCorrelator, CommandRequest};
use crate::hub::{FilterUpdate, HubHandle};

/// What every connection needs.
#[derive(Clone)]
pub struct ServerContext {
    pub hub: HubHandle,
    /// `None` while no broker is configured; commands are then refused.
    pub commands: Option<Arc<CommandCorrelator>>,
    pub client_buffer: usize,
}

pub async fn start_websocket_server(addr: &str, ctx: ServerContext) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "WebSocket server listening");
    serve(listener, ctx).await;
    Ok(())
}

/// Accept loop over an already bound listener.
pub async fn serve(listener: TcpListener, ctx: ServerContext) {
    let ctx = Arc::new(ctx);
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                spawn(handle_connection(stream, peer, ctx.clone()));
            }
            Err(e) => {
                warn!(error = %e, "failed to accept connection");
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, ctx: Arc<ServerContext>) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(peer = %peer, error = %e, "WebSocket handshake failed");
            return;
        }
    };
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let (session, mut rx) = ClientSession::channel(ctx.client_buffer);
    let client_id = session.id.clone();
    if !ctx.hub.register(session).await {
        warn!(peer = %peer, "hub is not running, closing connection");
        return;
    }
    info!(client_id = %client_id, peer = %peer, "dashboard connected");

    let writer = {
        let client_id = client_id.clone();
        spawn(async move {
            while let Some(msg) = rx.recv().await {
                if let Err(e) = ws_sender.send(msg).await {
                    debug!(client_id = %client_id, error = %e, "send failed");
                    break;
                }
            }
            let _ = ws_sender.close().await;
            debug!(client_id = %client_id, "send loop closed");
        })
    };

    while let Some(frame) = ws_receiver.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => handle_client_text(&ctx, &client_id, text.as_str()).await,
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(client_id = %client_id, error = %e, "read failed");
                break;
            }
        }
    }

    ctx.hub.unregister(client_id.clone()).await;
    let _ = writer.await;
    info!(client_id = %client_id, "dashboard disconnected");
}

async fn handle_client_text(ctx: &Arc<ServerContext>, client_id: &ClientId, text: &str) {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Subscribe {
            vehicle_code,
            sensor_code,
            sensor_type,
        }) => {
            let update = FilterUpdate {
                vehicle_code,
                sensor_code,
                sensor_type,
            };
            info!(client_id = %client_id, ?update, "client filter change requested");
            ctx.hub.update_filter(client_id.clone(), update).await;
        }
        Ok(ClientMessage::Stats) => {
            let connected_clients = ctx.hub.client_count().await;
            reply(ctx, client_id, &ServerMessage::Stats { connected_clients }).await;
        }
        Ok(ClientMessage::Command(request)) => {
            // ACK waits can take seconds; keep reading meanwhile
            let ctx = ctx.clone();
            let client_id = client_id.clone();
            spawn(async move {
                let response = run_command(&ctx, request).await;
                reply(&ctx, &client_id, &response).await;
            });
        }
        Err(e) => {
            warn!(
                client_id = %client_id,
                error = %e,
                snippet = %text.chars().take(100).collect::<String>(),
                "invalid client message"
            );
            reply(
                ctx,
                client_id,
                &ServerMessage::error(ErrorKind::InvalidRequest, format!("invalid message: {e}")),
            )
            .await;
        }
    }
}

async fn run_command(ctx: &ServerContext, request: CommandRequest) -> ServerMessage {
    let (vehicle_code, command) = match request.validate() {
        Ok(valid) => valid,
        Err(e) => return ServerMessage::invalid_request(&e),
    };
    let Some(correlator) = ctx.commands.as_ref() else {
        return ServerMessage::error(
            ErrorKind::Unavailable,
            "MQTT not connected, control commands are disabled",
        );
    };

    let outcome = correlator.send_command(&vehicle_code, &command).await;
    ServerMessage::from_command_outcome(outcome, command.mode())
}

async fn reply(ctx: &ServerContext, client_id: &ClientId, message: &ServerMessage) {
    match serde_json::to_string(message) {
        Ok(text) => ctx.hub.reply(client_id.clone(), text).await,
        Err(e) => warn!(client_id = %client_id, error = %e, "failed to serialize reply"),
    }
}
