use std::sync::Arc;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;

use gemgrid_core::ids::GameId;
use gemgrid_core::types::{GameCreated, GameStatus, PlayerToken, TokenPair};
use gemgrid_engine::{GameError, GameRegistry};

use crate::client::{self, ClientId, ClientRegistry};
use crate::handlers::HandlerState;
use crate::push;
use crate::rpc::{RpcRequest, RpcResponse};
use crate::validation;

/// Server configuration.
pub struct ServerConfig {
    pub port: u16,
    pub max_send_queue: usize,
    /// Advertised WebSocket URL; when unset it is derived from the bound
    /// address.
    pub public_ws_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 9090,
            max_send_queue: 256,
            public_ws_url: None,
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub handler_state: Arc<HandlerState>,
    pub client_registry: Arc<ClientRegistry>,
    pub message_tx: mpsc::Sender<(ClientId, String)>,
    pub ws_url: String,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/games", post(create_game_handler))
        .route("/games/{id}", get(get_game_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Create and start the server. Returns a handle to shut it down.
pub async fn start(
    config: ServerConfig,
    games: Arc<GameRegistry>,
) -> Result<ServerHandle, std::io::Error> {
    let client_registry = Arc::new(ClientRegistry::new(config.max_send_queue));

    // Dead-client cleanup (every 60s)
    let _cleanup = start_cleanup_task(
        Arc::clone(&client_registry),
        Arc::clone(&games),
        std::time::Duration::from_secs(60),
    );

    // Message processing channel
    let (msg_tx, msg_rx) = mpsc::channel::<(ClientId, String)>(1024);

    let handler_state = Arc::new(HandlerState::new(games, Arc::clone(&client_registry)));

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    let ws_url = config
        .public_ws_url
        .unwrap_or_else(|| format!("ws://localhost:{}/ws", local_addr.port()));

    let app_state = AppState {
        handler_state: Arc::clone(&handler_state),
        client_registry: Arc::clone(&client_registry),
        message_tx: msg_tx,
        ws_url,
    };

    // RPC message processor
    let rpc_handle = tokio::spawn(process_rpc_messages(
        msg_rx,
        Arc::clone(&handler_state),
        Arc::clone(&client_registry),
    ));

    let router = build_router(app_state);

    tracing::info!(port = local_addr.port(), "Gemgrid server started");

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        _server: server_handle,
        _rpc: rpc_handle,
        _cleanup,
    })
}

/// Handle returned by `start()` — keeps background tasks alive.
pub struct ServerHandle {
    pub port: u16,
    _server: tokio::task::JoinHandle<()>,
    _rpc: tokio::task::JoinHandle<()>,
    _cleanup: tokio::task::JoinHandle<()>,
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle a new WebSocket connection. When the socket closes with a seat
/// bound, the seat is marked disconnected and remaining viewers get the
/// updated presence.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (client_id, rx) = state.client_registry.register();
    tracing::info!(client_id = %client_id, "WebSocket client connected");

    let binding = client::handle_ws_connection(
        socket,
        client_id.clone(),
        rx,
        Arc::clone(&state.client_registry),
        state.message_tx.clone(),
    )
    .await;

    if let Some((game_id, slot)) = binding {
        match state.handler_state.games.disconnect(&game_id, slot).await {
            Ok(game_state) => {
                push::push_views(&state.client_registry, &game_id, &game_state).await;
            }
            Err(err) => {
                tracing::warn!(client_id = %client_id, game_id = %game_id, error = %err,
                    "Failed to mark seat disconnected");
            }
        }
    }
}

/// Reap timed-out clients and free their seats: each reaped seat goes
/// through the same disconnect + presence push as an orderly socket
/// close. Returns the number of seats freed.
async fn reap_dead_seats(clients: &Arc<ClientRegistry>, games: &Arc<GameRegistry>) -> usize {
    let reaped = clients.cleanup_dead_clients().await;
    let count = reaped.len();
    for (client_id, game_id, slot) in reaped {
        match games.disconnect(&game_id, slot).await {
            Ok(game_state) => {
                push::push_views(clients, &game_id, &game_state).await;
            }
            Err(err) => {
                tracing::warn!(client_id = %client_id, game_id = %game_id, error = %err,
                    "Failed to free seat of dead client");
            }
        }
    }
    count
}

/// Start a background task that periodically cleans up dead clients.
fn start_cleanup_task(
    clients: Arc<ClientRegistry>,
    games: Arc<GameRegistry>,
    interval: std::time::Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let freed = reap_dead_seats(&clients, &games).await;
            if freed > 0 {
                tracing::info!(freed, "Dead client cleanup");
            }
        }
    })
}

/// Health check HTTP endpoint.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let resp = crate::handlers::dispatch(
        &state.handler_state,
        None,
        "health",
        &serde_json::json!({}),
        None,
    )
    .await;

    (StatusCode::OK, Json(resp.result.unwrap_or_default()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateGameRequest {
    field_size: u8,
    diamonds_count: u32,
}

/// `POST /games` — create a game and hand out both player tokens. This
/// response is the only place tokens ever leave the server.
async fn create_game_handler(
    State(state): State<AppState>,
    Json(req): Json<CreateGameRequest>,
) -> impl IntoResponse {
    if let Err(msg) = validation::validate_create(req.field_size, req.diamonds_count) {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": {"code": "INVALID_PARAMS", "message": msg}})),
        );
    }

    match state
        .handler_state
        .games
        .create_game(req.field_size, req.diamonds_count)
    {
        Ok(created) => {
            let body = GameCreated {
                game_id: created.id,
                status: GameStatus::Waiting,
                field_size: created.field_size,
                diamonds_count: created.diamonds_count,
                ws_url: state.ws_url.clone(),
                players: TokenPair {
                    p1: PlayerToken {
                        token: created.player1_token,
                    },
                    p2: PlayerToken {
                        token: created.player2_token,
                    },
                },
            };
            match serde_json::to_value(&body) {
                Ok(json) => (StatusCode::CREATED, Json(json)),
                Err(err) => internal_error(err.to_string()),
            }
        }
        Err(err) => {
            tracing::error!(error = %err, "Failed to create game");
            internal_error("internal error".to_string())
        }
    }
}

/// `GET /games/{id}` — the viewer-agnostic projection.
async fn get_game_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let game_id = GameId::from_raw(id);
    match state.handler_state.games.view(&game_id, None).await {
        Ok(view) => match serde_json::to_value(&view) {
            Ok(json) => (StatusCode::OK, Json(json)),
            Err(err) => internal_error(err.to_string()),
        },
        Err(err @ GameError::GameNotFound(_)) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "error": {"code": err.code(), "message": err.to_string()}
            })),
        ),
        Err(err) => {
            tracing::error!(game_id = %game_id, error = %err, "Failed to load game view");
            internal_error("internal error".to_string())
        }
    }
}

fn internal_error(message: String) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({"error": {"code": "UNKNOWN_ERROR", "message": message}})),
    )
}

/// Process incoming RPC messages from WebSocket clients.
async fn process_rpc_messages(
    mut rx: mpsc::Receiver<(ClientId, String)>,
    state: Arc<HandlerState>,
    registry: Arc<ClientRegistry>,
) {
    while let Some((client_id, raw_message)) = rx.recv().await {
        let request: RpcRequest = match serde_json::from_str(&raw_message) {
            Ok(req) => req,
            Err(_) => {
                let resp = RpcResponse::parse_error();
                if let Ok(json) = serde_json::to_string(&resp) {
                    registry.send_to(&client_id, json).await;
                }
                continue;
            }
        };

        let params = request.params.unwrap_or(serde_json::json!({}));
        let response = crate::handlers::dispatch(
            &state,
            Some(&client_id),
            &request.method,
            &params,
            request.id,
        )
        .await;

        if let Ok(json) = serde_json::to_string(&response) {
            registry.send_to(&client_id, json).await;
        }
    }
}
