use std::sync::Arc;

use axum::{
    debug_handler,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket, rejection::WebSocketUpgradeRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use tower_sessions::Session;

use crate::{AppResult, session::USER_ID};

use super::{ConnectionId, relay::ChatRelay, wire::ClientEvent};

#[debug_handler(state = crate::AppState)]
pub(crate) async fn chat_ws(
    State(relay): State<Arc<ChatRelay>>,
    session: Session,

    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> AppResult<Response> {
    // authentication is checked before the upgrade request itself
    let Some(user_id) = session.get::<String>(USER_ID).await? else {
        return Ok(StatusCode::UNAUTHORIZED.into_response());
    };
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return Ok(rejection.into_response()),
    };

    Ok(ws.on_upgrade(move |socket| serve_socket(socket, relay, user_id)))
}

async fn serve_socket(socket: WebSocket, relay: Arc<ChatRelay>, user_id: String) {
    let (connection, mut inbox) = relay.connect(user_id);
    let (mut sender, mut receiver) = socket.split();

    let mut forward_task = tokio::spawn(async move {
        while let Some(event) = inbox.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(err) => {
                    tracing::error!(%connection, "failed to encode event: {err}");
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            frame = receiver.next() => {
                let Some(Ok(frame)) = frame else {
                    break;
                };
                match frame {
                    Message::Text(text) => match serde_json::from_str::<ClientEvent>(text.as_str()) {
                        Ok(event) => handle_event(&relay, connection, event).await,
                        Err(err) => tracing::debug!(%connection, "skipping malformed frame: {err}"),
                    },
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            _ = &mut forward_task => break,
        }
    }

    relay.disconnect(connection);
    forward_task.abort();
}

/// Failures go back to this connection only.
async fn handle_event(relay: &ChatRelay, connection: ConnectionId, event: ClientEvent) {
    let result = match event {
        ClientEvent::RegisterLanguage(tag) => {
            relay.register_language(connection, &tag);
            Ok(())
        }
        ClientEvent::JoinChat(purchase_id) => {
            relay.join_chat(connection, &purchase_id);
            Ok(())
        }
        ClientEvent::LeaveChat(purchase_id) => {
            relay.leave_chat(connection, &purchase_id);
            Ok(())
        }
        ClientEvent::SendMessage(msg) => relay.send_message(connection, msg).await.map(|_| ()),
        ClientEvent::CloseChat(close) => relay.close_chat(close).await.map(|_| ()),
    };

    if let Err(err) = result {
        tracing::info!(%connection, code = ?err.code(), "rejected event: {err}");
        relay.deliver(connection, err.to_event());
    }
}
