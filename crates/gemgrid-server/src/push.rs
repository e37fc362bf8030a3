//! Server-initiated messages. Unlike RPC responses these carry no `id`;
//! clients tell them apart by the `type` field:
//! `{"type": "state" | "move_result" | "game_over", "data": ...}`.

use std::sync::Arc;

use serde::Serialize;

use gemgrid_core::ids::GameId;
use gemgrid_core::types::{GameOverReport, GameView, MoveOutcome};
use gemgrid_engine::{project, GameState};

use crate::client::ClientRegistry;

#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerPush {
    /// A fresh per-viewer projection, pushed after every accepted mutation.
    State(GameView),
    /// The outcome of one accepted move, identical for every viewer.
    MoveResult(MoveOutcome),
    /// Terminal payload, sent once when the last diamond is found.
    GameOver(GameOverReport),
}

impl ServerPush {
    pub fn to_json(&self) -> Option<String> {
        match serde_json::to_string(self) {
            Ok(json) => Some(json),
            Err(err) => {
                tracing::error!(error = %err, "Failed to serialize push");
                None
            }
        }
    }
}

/// Push each viewer of the game its own projection of `state`, with its
/// own `youAre`. All projections come from the same state snapshot, so
/// viewers never see diverging boards for one mutation.
pub async fn push_views(clients: &Arc<ClientRegistry>, game_id: &GameId, state: &GameState) {
    for (client_id, slot) in clients.viewers_of_game(game_id).await {
        let push = ServerPush::State(project(state, Some(slot)));
        if let Some(json) = push.to_json() {
            clients.send_to(&client_id, json).await;
        }
    }
}

/// Broadcast one identical message to every viewer of the game.
pub fn broadcast(clients: &ClientRegistry, game_id: &GameId, push: &ServerPush) {
    if let Some(json) = push.to_json() {
        clients.broadcast_to_game(game_id, &json);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gemgrid_core::slot::PlayerSlot;
    use gemgrid_core::types::{BoardCell, CellContent, GameOverReason, GameStatus, Scores};

    #[test]
    fn move_result_wire_shape() {
        let push = ServerPush::MoveResult(MoveOutcome {
            x: 1,
            y: 2,
            cell: BoardCell::Opened {
                content: CellContent::Number { v: 3 },
            },
            turn: PlayerSlot::Two,
            scores: Scores { p1: 1, p2: 0 },
            found: 1,
        });
        let json: serde_json::Value = serde_json::from_str(&push.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "move_result");
        assert_eq!(json["data"]["x"], 1);
        assert_eq!(json["data"]["cell"]["v"], 3);
        assert_eq!(json["data"]["turn"], 2);
    }

    #[test]
    fn game_over_wire_shape() {
        let push = ServerPush::GameOver(GameOverReport {
            status: GameStatus::Finished,
            scores: Scores { p1: 2, p2: 1 },
            winner: 1,
            reason: GameOverReason::AllDiamondsFound,
        });
        let json: serde_json::Value = serde_json::from_str(&push.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "game_over");
        assert_eq!(json["data"]["status"], "finished");
        assert_eq!(json["data"]["winner"], 1);
        assert_eq!(json["data"]["reason"], "all_diamonds_found");
    }
}
