//! WebSocket endpoint: one task per client connection, with a paired
//! writer task draining the connection's event channel.

use crate::presence::ConnectionHandle;
use crate::router::{self, RouterError, ServerState};
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use banter_proto::SESSION_COOKIE;
use banter_proto::protocol::{ClientIntent, MAX_FRAME_BYTES, ServerEvent};
use futures_util::{SinkExt, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Extract the session token from the Cookie header, if present.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|part| {
        part.trim()
            .strip_prefix(SESSION_COOKIE)?
            .strip_prefix('=')
            .map(str::to_string)
    })
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
) -> Response {
    // Sessions are checked before the upgrade so unauthenticated clients
    // get a plain 401 instead of a dead socket.
    let Some(token) = session_token(&headers) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    let user_id = {
        let sessions = state.sessions.lock().await;
        match sessions.resolve(&token) {
            Some(user_id) => user_id.to_string(),
            None => return StatusCode::UNAUTHORIZED.into_response(),
        }
    };
    ws.on_upgrade(move |socket| client_session(socket, state, user_id))
}

async fn client_session(socket: WebSocket, state: Arc<ServerState>, user_id: String) {
    let conn_id = Uuid::new_v4().to_string();
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    let write_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    tracing::debug!(error = %err, "failed to encode server event");
                    continue;
                }
            };
            if ws_sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    // Subscribe to the user's own channel plus every group they belong to.
    let mut channels = HashSet::from([user_id.clone()]);
    {
        let store = state.store.lock().await;
        for group in store.groups_for(&user_id) {
            channels.insert(group.id);
        }
    }
    let handle = ConnectionHandle {
        conn_id: conn_id.clone(),
        sender: tx,
        channels,
    };
    // Dropping a replaced handle closes the older connection's channel.
    drop(state.presence.register(&user_id, handle).await);

    tracing::info!(user = %user_id, "client connected");
    if let Err(err) = router::push_snapshot(&state, &user_id).await {
        tracing::error!(error = %err, "failed to push initial snapshot");
    }
    notify_presence_change(&state, &user_id).await;

    while let Some(msg_result) = ws_receiver.next().await {
        let msg = match msg_result {
            Ok(msg) => msg,
            Err(err) => {
                tracing::debug!(error = %err, "ws receive error");
                break;
            }
        };
        match msg {
            Message::Text(text) => {
                if text.len() > MAX_FRAME_BYTES {
                    let event = ServerEvent::Error {
                        text: format!("frame too large: {} > {}", text.len(), MAX_FRAME_BYTES),
                    };
                    state.presence.send_to_user(&user_id, event).await;
                    continue;
                }
                let intent: ClientIntent = match serde_json::from_str(&text) {
                    Ok(intent) => intent,
                    Err(err) => {
                        tracing::debug!(error = %err, "ignoring malformed client frame");
                        continue;
                    }
                };
                if let Err(err) = router::handle_intent(&state, &user_id, intent).await {
                    match &err {
                        RouterError::Storage(source) => {
                            tracing::error!(error = ?source, "intent failed in storage");
                        }
                        other => {
                            tracing::debug!(code = other.to_error_code(), "intent rejected");
                        }
                    }
                    let event = ServerEvent::Error {
                        text: err.to_string(),
                    };
                    state.presence.send_to_user(&user_id, event).await;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    // A replacement connection owns the registry entry now; only announce
    // offline if this one was still current.
    if state.presence.unregister(&user_id, &conn_id).await {
        notify_presence_change(&state, &user_id).await;
    }
    tracing::info!(user = %user_id, "client disconnected");
    let _ = write_task.await;
}

/// Tell the user's friends to re-pull contacts so the online marker updates.
async fn notify_presence_change(state: &Arc<ServerState>, user_id: &str) {
    let friends = {
        let store = state.store.lock().await;
        store.notifiable_friend_ids(user_id)
    };
    for friend in friends {
        state
            .presence
            .send_to_user(&friend, ServerEvent::RefreshData)
            .await;
    }
}
