use futures_util::sink::SinkExt;
use futures_util::stream::StreamExt;
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::mpsc;
use warp::ws::{Message, WebSocket};

use crate::core::connection::ConnectionContext;
use crate::core::lifecycle::teardown;
use crate::core::message_handler::handle_message;
use crate::core::server::ServerManager;

// Handle a WebSocket connection
pub async fn handle_ws_client(ws: WebSocket, server: Arc<ServerManager>) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (tx, rx) = mpsc::unbounded_channel();

    // Spawn a task to forward messages from our channel to the WebSocket
    tokio::task::spawn(async move {
        let mut rx = rx;
        while let Some(message) = rx.recv().await {
            if let Err(e) = ws_tx.send(message).await {
                error!("Failed to send WebSocket message: {}", e);
                break;
            }
        }
    });

    let mut context = ConnectionContext::new();
    server.register_connection(context.id.clone(), tx).await;
    info!("Client connected: {}", context.id);
    info!("Current connections: {}", server.connection_count().await);

    // Frames of one connection are handled strictly in order
    while let Some(result) = ws_rx.next().await {
        match result {
            Ok(msg) => {
                if msg.is_close() {
                    debug!("Client {} sent close frame", context.id);
                    break;
                }
                if !msg.is_text() {
                    continue;
                }
                match msg.to_str() {
                    Ok(text) => handle_message(&server, &mut context, text).await,
                    Err(_) => warn!("Failed to extract text from message of {}", context.id),
                }
            }
            Err(e) => {
                error!("WebSocket error on {}: {}", context.id, e);
                break;
            }
        }
    }

    // Client disconnected
    teardown(&server, &mut context).await;
    info!("Current connections: {}", server.connection_count().await);
}
