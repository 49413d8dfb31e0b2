use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;

use huddle_core::ids::{ConnectionId, RoomId};
use huddle_registry::RoomRegistry;

use crate::bridge;
use crate::handlers::HandlerState;
use crate::peer::{self, PeerRegistry};
use crate::rpc::{Request, Response};

/// Server configuration.
pub struct ServerConfig {
    pub port: u16,
    pub max_send_queue: usize,
    pub reap_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 9090,
            max_send_queue: 256,
            reap_interval: Duration::from_secs(60),
        }
    }
}

/// Shared application state passed to axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub handlers: Arc<HandlerState>,
    pub peers: Arc<PeerRegistry>,
    pub message_tx: mpsc::Sender<(ConnectionId, String)>,
}

/// Build the axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/api/rooms", get(list_rooms_handler))
        .route("/api/rooms/{room_id}", get(get_room_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Create and start the server. Returns a handle that keeps the background
/// tasks alive.
pub async fn start(config: ServerConfig, registry: RoomRegistry) -> Result<ServerHandle, std::io::Error> {
    let peers = Arc::new(PeerRegistry::new(config.max_send_queue));

    let bridge_handle = bridge::create_bridge(Arc::clone(&peers), registry.subscribe());
    let reaper_handle = peer::start_reaper_task(Arc::clone(&peers), config.reap_interval);

    let (msg_tx, msg_rx) = mpsc::channel::<(ConnectionId, String)>(1024);
    let handlers = Arc::new(HandlerState::new(registry));

    let rpc_handlers = Arc::clone(&handlers);
    let rpc_peers = Arc::clone(&peers);
    let rpc_handle = tokio::spawn(process_rpc_messages(msg_rx, rpc_handlers, rpc_peers));

    let app_state = AppState {
        handlers,
        peers,
        message_tx: msg_tx,
    };

    let router = build_router(app_state);
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(port = local_addr.port(), "Huddle server started");

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        _server: server_handle,
        _bridge: bridge_handle,
        _rpc: rpc_handle,
        _reaper: reaper_handle,
    })
}

/// Handle returned by `start()` — keeps background tasks alive.
pub struct ServerHandle {
    pub port: u16,
    _server: tokio::task::JoinHandle<()>,
    _bridge: tokio::task::JoinHandle<()>,
    _rpc: tokio::task::JoinHandle<()>,
    _reaper: tokio::task::JoinHandle<()>,
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Drive one WebSocket connection to completion, then run the disconnect
/// path: any room membership the connection still holds is released as if
/// the participant had left.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (connection_id, rx) = state.peers.register();
    tracing::info!(connection_id = %connection_id, "WebSocket peer connected");

    peer::handle_ws_connection(
        socket,
        connection_id.clone(),
        rx,
        Arc::clone(&state.peers),
        state.message_tx.clone(),
    )
    .await;

    if let Some(room) = state.handlers.registry.disconnect(&connection_id) {
        tracing::info!(
            connection_id = %connection_id,
            room_id = %room.id,
            "Disconnect released room membership"
        );
    }
    tracing::info!(connection_id = %connection_id, "WebSocket peer disconnected");
}

/// Health check HTTP endpoint.
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now(),
    }))
}

/// `GET /api/rooms` — public summaries of all rooms.
async fn list_rooms_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "success": true,
        "rooms": state.handlers.registry.list_rooms(),
    }))
}

/// `GET /api/rooms/{room_id}` — one room's full public view.
async fn get_room_handler(
    Path(room_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    match state.handlers.registry.get_room(&RoomId::from_raw(room_id)) {
        Some(room) => (
            StatusCode::OK,
            Json(serde_json::json!({"success": true, "room": room})),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"success": false, "error": "Room not found"})),
        ),
    }
}

/// Process incoming RPC messages from WebSocket peers.
async fn process_rpc_messages(
    mut rx: mpsc::Receiver<(ConnectionId, String)>,
    handlers: Arc<HandlerState>,
    peers: Arc<PeerRegistry>,
) {
    while let Some((connection_id, raw_message)) = rx.recv().await {
        let request: Request = match serde_json::from_str(&raw_message) {
            Ok(req) => req,
            Err(_) => {
                send_response(&peers, &connection_id, Response::parse_error());
                continue;
            }
        };

        let params = request.params.unwrap_or(serde_json::json!({}));
        let response = crate::handlers::dispatch(
            &handlers,
            &connection_id,
            &request.method,
            &params,
            request.id,
        );
        send_response(&peers, &connection_id, response);
    }
}

fn send_response(peers: &PeerRegistry, connection_id: &ConnectionId, response: Response) {
    match serde_json::to_string(&response) {
        Ok(json) => {
            peers.send_to(connection_id, json);
        }
        Err(e) => tracing::error!(error = %e, "Response serialization failed"),
    }
}
