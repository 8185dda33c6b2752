use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::ws::{ClientMessage, RejectReason, ServerMessage},
    services::{
        broadcast::send_message_to_websocket,
        chat_service,
        game_service::{self, ActionError},
    },
    state::{SharedState, registry::ConnectionId},
};

/// Handle the full lifecycle of an authenticated game WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket, username: String) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let connection_id: ConnectionId = Uuid::new_v4();
    game_service::join(&state, connection_id, &username, outbound_tx.clone()).await;

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                debug!(%connection_id, payload = %text.as_str(), "received client message");
                let outcome = match ClientMessage::from_json_str(text.as_str()) {
                    Ok(inbound) => dispatch(&state, connection_id, &username, inbound).await,
                    Err(err) => Err(ActionError::Malformed(err.to_string())),
                };
                if let Err(err) = outcome {
                    reject(&outbound_tx, connection_id, &err);
                }
            }
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                info!(%connection_id, username, "client closed");
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {
                let _ = send_message_to_websocket(
                    &outbound_tx,
                    &ServerMessage::rejected(
                        RejectReason::MalformedMessage,
                        "binary frames are not supported",
                    ),
                );
            }
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(%connection_id, error = %err, "websocket error");
                break;
            }
        }
    }

    game_service::leave(&state, connection_id).await;
    finalize(writer_task, outbound_tx).await;
}

async fn dispatch(
    state: &SharedState,
    connection_id: ConnectionId,
    username: &str,
    message: ClientMessage,
) -> Result<(), ActionError> {
    match message {
        ClientMessage::SubmitMove { position, symbol } => {
            game_service::submit_move(state, connection_id, position, symbol).await
        }
        ClientMessage::ResetMatch => game_service::reset(state, connection_id).await,
        ClientMessage::PostChat { text } => {
            chat_service::post(state, username, &text).await;
            Ok(())
        }
        ClientMessage::ClearChat => {
            chat_service::clear(state, username).await;
            Ok(())
        }
        ClientMessage::ToggleDevMode => game_service::toggle_dev_mode(state, connection_id).await,
    }
}

fn reject(tx: &mpsc::UnboundedSender<Message>, connection_id: ConnectionId, err: &ActionError) {
    info!(%connection_id, reason = ?err.reason(), error = %err, "action rejected");
    if !send_message_to_websocket(tx, &err.to_message()) {
        debug!(%connection_id, "writer closed before rejection could be sent");
    }
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
