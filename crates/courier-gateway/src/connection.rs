use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{info, trace, warn};
use uuid::Uuid;

use courier_types::events::{GatewayCommand, GatewayEvent};

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// How long a fresh connection may idle before sending its Join command.
const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Lifecycle of one WebSocket connection. Phases only move forward:
/// a connection that left its room never rejoins — the client reconnects
/// instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Connected,
    Joined(Uuid),
    Disconnected,
}

/// Handle a single WebSocket connection.
///
/// The session was authenticated before the upgrade; the Join command's
/// user id is trusted as the room name. No auth happens at this layer.
pub async fn handle_connection(socket: WebSocket, dispatcher: Dispatcher) {
    let conn_id = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();
    let mut phase = Phase::Connected;

    // Phase: Connected — wait for the Join command
    let user_id = match wait_for_join(&mut receiver).await {
        Some(id) => id,
        None => {
            warn!(conn = %conn_id, "WebSocket client never joined, closing");
            return;
        }
    };

    advance(&mut phase, Phase::Joined(user_id), conn_id);
    info!(conn = %conn_id, user = %user_id, "connection joined room");

    let (tx, mut user_rx) = mpsc::unbounded_channel();
    dispatcher.join(conn_id, user_id, tx).await;

    let ready = GatewayEvent::Ready { user_id };
    let ready_json = match serde_json::to_string(&ready) {
        Ok(json) => json,
        Err(e) => {
            warn!(conn = %conn_id, "failed to encode ready event: {e}");
            dispatcher.disconnect(conn_id).await;
            return;
        }
    };
    if sender.send(Message::Text(ready_json.into())).await.is_err() {
        dispatcher.disconnect(conn_id).await;
        return;
    }

    // Room publishes and global broadcasts both flow to this client
    let mut broadcast_rx = dispatcher.subscribe();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Pump task: room events + broadcasts -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = user_rx.recv() => {
                    let event = match result {
                        Some(event) => event,
                        None => break,
                    };
                    if forward(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                result = broadcast_rx.recv() => {
                    let event = match result {
                        Ok(event) => event,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("broadcast receiver lagged by {} events", n);
                            continue;
                        }
                        Err(_) => break,
                    };
                    if forward(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read task: drain client frames, track pongs
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    // Already joined — a second Join is a protocol slip, not an error
                    Ok(GatewayCommand::Join { user_id: other }) => {
                        warn!(conn = %conn_id, "ignoring join for {} on already-joined connection", other);
                    }
                    Err(e) => {
                        warn!(
                            conn = %conn_id,
                            "bad command: {} -- raw: {}",
                            e,
                            &text[..text.len().min(200)]
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Either side finishing tears the whole connection down
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    advance(&mut phase, Phase::Disconnected, conn_id);
    dispatcher.disconnect(conn_id).await;
    info!(conn = %conn_id, user = %user_id, "connection left room");
}

fn advance(phase: &mut Phase, next: Phase, conn_id: Uuid) {
    trace!(conn = %conn_id, from = ?*phase, to = ?next, "connection phase");
    *phase = next;
}

async fn forward(
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    event: &GatewayEvent,
) -> Result<(), axum::Error> {
    match serde_json::to_string(event) {
        Ok(json) => sender.send(Message::Text(json.into())).await,
        Err(e) => {
            warn!("failed to encode gateway event: {e}");
            Ok(())
        }
    }
}

async fn wait_for_join(
    receiver: &mut futures_util::stream::SplitStream<WebSocket>,
) -> Option<Uuid> {
    let timeout = tokio::time::timeout(JOIN_TIMEOUT, async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(GatewayCommand::Join { user_id }) =
                    serde_json::from_str::<GatewayCommand>(&text)
                {
                    return Some(user_id);
                }
            }
        }
        None
    });

    timeout.await.ok().flatten()
}
