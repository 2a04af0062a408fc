//! Request handlers for the server endpoints

pub mod websocket;

use std::convert::Infallible;
use std::sync::Arc;
use warp::Filter;

use crate::constants::WS_PATH;
use crate::core::server::ServerManager;

// Re-export the websocket handler
pub use websocket::handle_ws_client;

/// WebSocket endpoint plus a health check
pub fn routes(
    server: Arc<ServerManager>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let ws_route = warp::path(WS_PATH)
        .and(warp::ws())
        .and(with_server(server))
        .map(|ws: warp::ws::Ws, server: Arc<ServerManager>| {
            log::debug!("New websocket connection");
            let max_frame = server.config().max_frame_bytes;
            ws.max_message_size(max_frame)
                .on_upgrade(move |socket| handle_ws_client(socket, server))
        });

    let health_route = warp::path("health").map(|| "OK");

    ws_route.or(health_route)
}

// Helper function to include the server state in request
fn with_server(
    server: Arc<ServerManager>,
) -> impl Filter<Extract = (Arc<ServerManager>,), Error = Infallible> + Clone {
    warp::any().map(move || server.clone())
}
