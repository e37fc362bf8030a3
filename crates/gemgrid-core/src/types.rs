//! Wire types shared by the engine and the transport layer.
//!
//! Cell encoding is deliberately compact (`s`/`t`/`v` tags) because a view
//! is re-sent to every connected client after each move:
//! closed = `{"s":"c"}`, opened number = `{"s":"o","t":"n","v":0..8}`,
//! opened diamond = `{"s":"o","t":"d"}`.

use serde::{Deserialize, Serialize};

use crate::ids::GameId;
use crate::slot::PlayerSlot;

/// Game lifecycle. Strictly forward-only: waiting → active → finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Waiting,
    Active,
    Finished,
}

impl std::fmt::Display for GameStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Waiting => write!(f, "waiting"),
            Self::Active => write!(f, "active"),
            Self::Finished => write!(f, "finished"),
        }
    }
}

impl std::str::FromStr for GameStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(Self::Waiting),
            "active" => Ok(Self::Active),
            "finished" => Ok(Self::Finished),
            other => Err(format!("unknown game status: {other}")),
        }
    }
}

/// What an opened cell revealed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum CellContent {
    /// Adjacent-diamond count, 0..=8.
    #[serde(rename = "n")]
    Number { v: u8 },
    #[serde(rename = "d")]
    Diamond,
}

/// One cell as a viewer sees it. Closed cells carry nothing — unopened
/// diamonds are never exposed regardless of viewer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "s")]
pub enum BoardCell {
    #[serde(rename = "c")]
    Closed,
    #[serde(rename = "o")]
    Opened {
        #[serde(flatten)]
        content: CellContent,
    },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scores {
    pub p1: u32,
    pub p2: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerPresence {
    pub connected: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayersView {
    pub p1: PlayerPresence,
    pub p2: PlayerPresence,
}

/// The redacted, viewer-specific projection of a game, pushed to clients
/// after every accepted mutation. `board[y][x]`: rows of cells.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameView {
    pub game_id: GameId,
    pub status: GameStatus,
    pub field_size: u8,
    pub diamonds_count: u32,
    pub found: u32,
    pub turn: PlayerSlot,
    pub scores: Scores,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub you_are: Option<PlayerSlot>,
    pub players: PlayersView,
    pub board: Vec<Vec<BoardCell>>,
}

/// Outcome of a single accepted move, broadcast verbatim to all viewers.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveOutcome {
    pub x: u8,
    pub y: u8,
    pub cell: BoardCell,
    /// Whose turn is next (the mover again after a diamond).
    pub turn: PlayerSlot,
    pub scores: Scores,
    pub found: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameOverReason {
    AllDiamondsFound,
}

/// Terminal payload, broadcast once when the last diamond is found.
/// `winner` is the slot with the strictly higher score, or 0 for a tie.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameOverReport {
    pub status: GameStatus,
    pub scores: Scores,
    pub winner: u8,
    pub reason: GameOverReason,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenPair {
    pub p1: PlayerToken,
    pub p2: PlayerToken,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlayerToken {
    pub token: String,
}

/// Response to game creation — the only place tokens ever appear.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameCreated {
    pub game_id: GameId,
    pub status: GameStatus,
    pub field_size: u8,
    pub diamonds_count: u32,
    pub ws_url: String,
    pub players: TokenPair,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_cell_wire_shape() {
        let json = serde_json::to_value(BoardCell::Closed).unwrap();
        assert_eq!(json, serde_json::json!({"s": "c"}));
    }

    #[test]
    fn opened_number_wire_shape() {
        let cell = BoardCell::Opened {
            content: CellContent::Number { v: 3 },
        };
        let json = serde_json::to_value(cell).unwrap();
        assert_eq!(json, serde_json::json!({"s": "o", "t": "n", "v": 3}));
    }

    #[test]
    fn opened_diamond_wire_shape() {
        let cell = BoardCell::Opened {
            content: CellContent::Diamond,
        };
        let json = serde_json::to_value(cell).unwrap();
        assert_eq!(json, serde_json::json!({"s": "o", "t": "d"}));
    }

    #[test]
    fn board_cell_roundtrip() {
        for cell in [
            BoardCell::Closed,
            BoardCell::Opened {
                content: CellContent::Diamond,
            },
            BoardCell::Opened {
                content: CellContent::Number { v: 8 },
            },
        ] {
            let json = serde_json::to_string(&cell).unwrap();
            let parsed: BoardCell = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed, cell);
        }
    }

    #[test]
    fn game_status_display_parse() {
        for status in [GameStatus::Waiting, GameStatus::Active, GameStatus::Finished] {
            let parsed: GameStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("paused".parse::<GameStatus>().is_err());
    }

    #[test]
    fn view_omits_you_are_for_broadcast_copy() {
        let view = GameView {
            game_id: GameId::from_raw("game_test"),
            status: GameStatus::Waiting,
            field_size: 2,
            diamonds_count: 1,
            found: 0,
            turn: PlayerSlot::One,
            scores: Scores::default(),
            you_are: None,
            players: PlayersView::default(),
            board: vec![vec![BoardCell::Closed; 2]; 2],
        };
        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("youAre").is_none());
        assert_eq!(json["fieldSize"], 2);
        assert_eq!(json["board"][0][0]["s"], "c");
    }

    #[test]
    fn view_includes_you_are_for_a_viewer() {
        let view = GameView {
            game_id: GameId::from_raw("game_test"),
            status: GameStatus::Active,
            field_size: 2,
            diamonds_count: 1,
            found: 0,
            turn: PlayerSlot::Two,
            scores: Scores { p1: 1, p2: 0 },
            you_are: Some(PlayerSlot::Two),
            players: PlayersView::default(),
            board: vec![vec![BoardCell::Closed; 2]; 2],
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["youAre"], 2);
        assert_eq!(json["turn"], 2);
    }

    #[test]
    fn game_over_reason_wire_token() {
        let json = serde_json::to_value(GameOverReason::AllDiamondsFound).unwrap();
        assert_eq!(json, "all_diamonds_found");
    }
}
