//! RPC method handlers.

use std::sync::Arc;

use gemgrid_core::ids::GameId;
use gemgrid_engine::{project, GameRegistry};

use crate::client::{ClientId, ClientRegistry};
use crate::push::{self, ServerPush};
use crate::rpc::{self, RpcResponse};

/// Shared state available to all RPC handlers.
pub struct HandlerState {
    pub games: Arc<GameRegistry>,
    pub clients: Arc<ClientRegistry>,
}

impl HandlerState {
    pub fn new(games: Arc<GameRegistry>, clients: Arc<ClientRegistry>) -> Self {
        Self { games, clients }
    }
}

/// Dispatch an RPC method to the appropriate handler. `client_id` is the
/// WebSocket client issuing the call; `None` for HTTP-originated calls,
/// which then skip seat binding.
pub async fn dispatch(
    state: &Arc<HandlerState>,
    client_id: Option<&ClientId>,
    method: &str,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    match method {
        "game.join" => game_join(state, client_id, params, id).await,
        "game.openCell" | "game.open_cell" => game_open_cell(state, params, id).await,
        "game.get" => game_get(state, params, id).await,
        "system.ping" | "health" => health(state, id),
        _ => RpcResponse::method_not_found(id, method),
    }
}

async fn game_join(
    state: &Arc<HandlerState>,
    client_id: Option<&ClientId>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let (game_id, token) = match game_and_token(params) {
        Ok(pair) => pair,
        Err(msg) => return RpcResponse::invalid_params(id, msg),
    };

    let applied = match state.games.join(&game_id, token).await {
        Ok(applied) => applied,
        Err(err) => return RpcResponse::game_error(id, &err),
    };

    if let Some(client_id) = client_id {
        state
            .clients
            .bind_game(client_id, game_id.clone(), applied.slot)
            .await;
    }
    // Everyone watching gets the refreshed presence, each with their
    // own seat.
    push::push_views(&state.clients, &game_id, &applied.state).await;

    let view = project(&applied.state, Some(applied.slot));
    match serde_json::to_value(&view) {
        Ok(result) => RpcResponse::success(id, result),
        Err(err) => RpcResponse::error(id, "UNKNOWN_ERROR", err.to_string()),
    }
}

async fn game_open_cell(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let (game_id, token) = match game_and_token(params) {
        Ok(pair) => pair,
        Err(msg) => return RpcResponse::invalid_params(id, msg),
    };
    let (x, y) = match (rpc::require_u8(params, "x"), rpc::require_u8(params, "y")) {
        (Ok(x), Ok(y)) => (x, y),
        (Err(msg), _) | (_, Err(msg)) => return RpcResponse::invalid_params(id, msg),
    };

    let applied = match state.games.open_cell(&game_id, token, x, y).await {
        Ok(applied) => applied,
        Err(err) => return RpcResponse::game_error(id, &err),
    };

    push::broadcast(
        &state.clients,
        &game_id,
        &ServerPush::MoveResult(applied.outcome.clone()),
    );
    push::push_views(&state.clients, &game_id, &applied.state).await;
    if let Some(report) = &applied.game_over {
        push::broadcast(&state.clients, &game_id, &ServerPush::GameOver(report.clone()));
    }

    let mut result = serde_json::json!({
        "moveNo": applied.move_no,
        "moveOutcome": applied.outcome,
    });
    if let Some(report) = &applied.game_over {
        match serde_json::to_value(report) {
            Ok(value) => {
                result["gameOver"] = value;
            }
            Err(err) => return RpcResponse::error(id, "UNKNOWN_ERROR", err.to_string()),
        }
    }
    RpcResponse::success(id, result)
}

async fn game_get(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let game_id = match require_game_id(params) {
        Ok(game_id) => game_id,
        Err(msg) => return RpcResponse::invalid_params(id, msg),
    };

    // With a token the caller gets its own seat in the view; without one
    // it gets the viewer-agnostic copy.
    let viewer = match rpc::optional_str(params, "token") {
        Some(token) => match state.games.authenticate(&game_id, token).await {
            Ok(slot) => Some(slot),
            Err(err) => return RpcResponse::game_error(id, &err),
        },
        None => None,
    };

    match state.games.view(&game_id, viewer).await {
        Ok(view) => match serde_json::to_value(&view) {
            Ok(result) => RpcResponse::success(id, result),
            Err(err) => RpcResponse::error(id, "UNKNOWN_ERROR", err.to_string()),
        },
        Err(err) => RpcResponse::game_error(id, &err),
    }
}

fn health(state: &Arc<HandlerState>, id: Option<serde_json::Value>) -> RpcResponse {
    RpcResponse::success(
        id,
        serde_json::json!({
            "status": "healthy",
            "games": state.games.len(),
            "clients": state.clients.count(),
        }),
    )
}

fn require_game_id(params: &serde_json::Value) -> Result<GameId, String> {
    rpc::require_str(params, "gameId").map(GameId::from_raw)
}

fn game_and_token(params: &serde_json::Value) -> Result<(GameId, &str), String> {
    let game_id = require_game_id(params)?;
    let token = rpc::require_str(params, "token")?;
    Ok((game_id, token))
}
