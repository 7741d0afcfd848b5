use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use warp::ws::{Message, WebSocket};

use crate::quiz::{ClientMessage, QuizServer, QuizSignalingHandler, ServerMessage};

pub async fn handle_quiz_websocket(websocket: WebSocket, server: Arc<QuizServer>) {
    let (mut ws_sender, mut ws_receiver) = websocket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    let mut signaling_handler = QuizSignalingHandler::new(server, tx);
    let connection_id = signaling_handler.connection_id().to_string();
    tracing::info!(connection_id = %connection_id, "New quiz WebSocket connection established");

    // Serializes outgoing messages in the order sessions produced them
    let sender_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(error = %e, kind = message.kind(), "Failed to serialize server message");
                    continue;
                }
            };
            if let Err(e) = ws_sender.send(Message::text(text)).await {
                tracing::debug!(error = %e, "Failed to send WebSocket message");
                break;
            }
        }
    });

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(message) => {
                if message.is_close() {
                    break;
                }
                handle_websocket_message(&mut signaling_handler, message).await;
            }
            Err(e) => {
                tracing::warn!(connection_id = %connection_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    signaling_handler.cleanup().await;
    sender_task.abort();
    tracing::info!(connection_id = %connection_id, "Quiz WebSocket connection closed");
}

async fn handle_websocket_message(signaling_handler: &mut QuizSignalingHandler, message: Message) {
    // Pings, pongs and binary frames carry no protocol messages
    let Ok(text) = message.to_str() else {
        return;
    };
    tracing::debug!("Received quiz message: {}", text);

    match serde_json::from_str::<ClientMessage>(text) {
        Ok(client_message) => signaling_handler.handle_message(client_message).await,
        Err(e) => {
            tracing::warn!(
                error = %e,
                raw_message = %text,
                "Failed to parse quiz message"
            );
            signaling_handler.reject_malformed(&e.to_string());
        }
    }
}
