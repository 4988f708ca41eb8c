//! WebSocket channel streaming live readings for one device at a time.
//!
//! Each connection owns at most one live feed. A `{"device":"<uuid>"}`
//! message from the client switches devices: the old feed handle is dropped,
//! which stops its task, and a new one is started.

use crate::auth::CurrentUser;
use crate::live::{start_live_feed, LiveFeedHandle, LiveUpdate};
use crate::web::state::{AppState, LiveClient};
use axum::extract::ws::{Message, WebSocket};
use axum::{
    extract::{Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::Utc;
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const UPDATE_BUFFER: usize = 32;

#[derive(Debug, Default, Deserialize)]
pub struct LiveSocketQuery {
    pub device: Option<String>,
}

/// Message a client may send over the live channel.
#[derive(Debug, Deserialize)]
pub struct ClientMessage {
    pub device: String,
}

/// `GET /ws/live?device=ID`: upgrade to the live channel.
pub async fn live_socket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<LiveSocketQuery>,
) -> Response {
    let client = LiveClient {
        id: Uuid::new_v4(),
        user_id: current.user.id,
        device_id: None,
        connected_at: Utc::now(),
    };
    let client_id = client.id;
    let max = state.config.max_websocket_connections;
    if !state.clients.try_register(client, max).await {
        warn!("Refusing WebSocket client: {} connections already open", max);
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "Too many live connections" })),
        )
            .into_response();
    }

    let initial = query.device.as_deref().map(str::trim).map(str::to_string);
    let clients = state.clients.clone();
    ws.on_failed_upgrade(move |e| {
        warn!("WebSocket upgrade failed for client {}: {}", client_id, e);
        tokio::spawn(async move { clients.remove(client_id).await });
    })
    .on_upgrade(move |socket| handle_live_socket(socket, state, client_id, initial))
}

type Sender = SplitSink<WebSocket, Message>;

async fn send_json(sender: &mut Sender, value: &impl serde::Serialize) -> bool {
    match serde_json::to_string(value) {
        Ok(text) => sender.send(Message::Text(text)).await.is_ok(),
        Err(e) => {
            error!("Failed to serialize live message: {}", e);
            true
        }
    }
}

/// Start a feed for `raw_device`, or the first device when none is given.
async fn switch_feed(
    state: &AppState,
    client_id: Uuid,
    raw_device: Option<&str>,
    updates: &mpsc::Sender<LiveUpdate>,
) -> Result<LiveFeedHandle, String> {
    let device_id = match raw_device.filter(|raw| !raw.is_empty()) {
        Some(raw) => Uuid::parse_str(raw).map_err(|_| "Device ID is not valid".to_string())?,
        None => state
            .store
            .list_devices()
            .await
            .map_err(|e| e.to_string())?
            .first()
            .map(|device| device.id)
            .ok_or_else(|| "No devices registered".to_string())?,
    };

    match state.store.get_device(device_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return Err(format!("Unknown device {}", device_id)),
        Err(e) => return Err(e.to_string()),
    }

    let handle = start_live_feed(
        state.store.clone(),
        device_id,
        state.config.feed_options(),
        updates.clone(),
    )
    .await
    .map_err(|e| e.to_string())?;
    state.clients.set_device(client_id, device_id).await;
    Ok(handle)
}

async fn handle_live_socket(
    socket: WebSocket,
    state: AppState,
    client_id: Uuid,
    initial: Option<String>,
) {
    info!("Live WebSocket client connected: {}", client_id);
    let (mut sender, mut receiver) = socket.split();
    let (switch_tx, mut switch_rx) = mpsc::channel::<String>(4);

    // Incoming messages only ever ask for a device switch.
    let recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(request) => {
                        if switch_tx.send(request.device).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => debug!("Ignoring message from {}: {}", client_id, e),
                },
                Ok(Message::Close(_)) => {
                    debug!("WebSocket client {} sent close", client_id);
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("WebSocket error for client {}: {}", client_id, e);
                    break;
                }
            }
        }
    });

    let send_state = state.clone();
    let send_task = tokio::spawn(async move {
        let state = send_state;
        let (updates_tx, mut updates_rx) = mpsc::channel::<LiveUpdate>(UPDATE_BUFFER);
        let mut feed: Option<LiveFeedHandle> = None;

        match switch_feed(&state, client_id, initial.as_deref(), &updates_tx).await {
            Ok(handle) => feed = Some(handle),
            Err(message) => {
                if !send_json(&mut sender, &json!({ "error": message })).await {
                    return;
                }
            }
        }

        loop {
            tokio::select! {
                Some(update) = updates_rx.recv() => {
                    // Drop updates still queued from a feed that was switched away.
                    if feed.as_ref().map(|f| f.device_id()) != Some(update.device_id) {
                        continue;
                    }
                    if !send_json(&mut sender, &update).await {
                        debug!("Client {} stopped receiving", client_id);
                        break;
                    }
                }
                requested = switch_rx.recv() => {
                    let Some(requested) = requested else { break };
                    match switch_feed(&state, client_id, Some(requested.trim()), &updates_tx).await {
                        Ok(handle) => {
                            info!("Client {} switched to device {}", client_id, handle.device_id());
                            feed = Some(handle);
                        }
                        Err(message) => {
                            if !send_json(&mut sender, &json!({ "error": message })).await {
                                break;
                            }
                        }
                    }
                }
            }
        }
    });

    let mut recv_task = recv_task;
    let mut send_task = send_task;
    tokio::select! {
        _ = &mut recv_task => {
            debug!("Receive task completed for client {}", client_id);
            send_task.abort();
        }
        _ = &mut send_task => {
            debug!("Send task completed for client {}", client_id);
            recv_task.abort();
        }
    }

    state.clients.remove(client_id).await;
    info!("Live WebSocket client disconnected: {}", client_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_shape() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"device":"6f1c1d4e-0000-4000-8000-000000000001"}"#).unwrap();
        assert_eq!(msg.device, "6f1c1d4e-0000-4000-8000-000000000001");
        assert!(serde_json::from_str::<ClientMessage>(r#"{"foo":1}"#).is_err());
    }
}
