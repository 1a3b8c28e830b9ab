use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};

use crate::protocol::{WsEvent, WsPayload};
use crate::state::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let client_id = state.register_client();
    info!(
        "client {} connected ({} active)",
        client_id,
        state.client_count()
    );

    let (mut sender, mut receiver) = socket.split();
    let mut updates = state.broadcaster.subscribe();

    let hello = serde_json::to_string(&WsEvent::hello(state.inventory())).unwrap();
    if sender.send(Message::Text(hello.into())).await.is_err() {
        state.unregister_client(&client_id);
        return;
    }

    // A late subscriber starts from the latest snapshot instead of a
    // backlog.
    if let Some(snapshot) = state.latest() {
        let event = serde_json::to_string(&WsEvent::snapshot(&snapshot)).unwrap();
        if sender.send(Message::Text(event.into())).await.is_err() {
            state.unregister_client(&client_id);
            return;
        }
    }

    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Ok(snapshot) => {
                    let event = serde_json::to_string(&WsEvent::snapshot(&snapshot)).unwrap();
                    // A failed send drops this subscriber, nothing else.
                    if sender.send(Message::Text(event.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!("client {} lagged, skipped {} snapshot(s)", client_id, skipped);
                }
                Err(RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<WsPayload>(&text) {
                    Ok(payload) if payload.init => {
                        debug!("client {} init ({:?})", client_id, payload.uuid);
                    }
                    Ok(_) => {}
                    Err(e) => debug!("client {} sent unparseable payload: {}", client_id, e),
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(_)) => break,
            },
        }
    }

    if let Some(connected_for) = state.unregister_client(&client_id) {
        info!(
            "client {} disconnected after {:.0?} ({} active)",
            client_id,
            connected_for,
            state.client_count()
        );
    }
}
