//! Projects a [`GameState`] into the redacted per-viewer [`GameView`].
//!
//! The projection is the only thing clients ever see of a game. Closed
//! cells carry no content at all, so an unopened diamond is
//! indistinguishable from an unopened number cell for every viewer.

use gemgrid_core::slot::PlayerSlot;
use gemgrid_core::types::{
    BoardCell, CellContent, GameView, PlayerPresence, PlayersView, Scores,
};

use crate::state::GameState;

/// Build the view of `state` for `viewer`. `None` produces the
/// viewer-agnostic broadcast copy (no `youAre`).
pub fn project(state: &GameState, viewer: Option<PlayerSlot>) -> GameView {
    let n = state.field_size;
    let board = (0..n)
        .map(|y| {
            (0..n)
                .map(|x| {
                    // cell() cannot miss inside the grid.
                    match state.cell(x, y) {
                        Some(cell) if cell.is_opened() => {
                            if cell.is_diamond {
                                BoardCell::Opened {
                                    content: CellContent::Diamond,
                                }
                            } else {
                                BoardCell::Opened {
                                    content: CellContent::Number {
                                        v: cell.adjacent_diamonds,
                                    },
                                }
                            }
                        }
                        _ => BoardCell::Closed,
                    }
                })
                .collect()
        })
        .collect();

    GameView {
        game_id: state.id.clone(),
        status: state.status,
        field_size: state.field_size,
        diamonds_count: state.diamonds_count,
        found: state.diamonds_found,
        turn: state.turn.unwrap_or(PlayerSlot::One),
        scores: state.scores(),
        you_are: viewer,
        players: PlayersView {
            p1: PlayerPresence {
                connected: state.player(PlayerSlot::One).connected,
            },
            p2: PlayerPresence {
                connected: state.player(PlayerSlot::Two).connected,
            },
        },
        board,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Board;
    use chrono::Utc;
    use gemgrid_core::types::GameStatus;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sample_state() -> GameState {
        let mut rng = StdRng::seed_from_u64(21);
        let board = Board::generate(3, 3, &mut rng);
        GameState::new(&board, 3, &mut rng)
    }

    #[test]
    fn fresh_game_projects_all_closed() {
        let state = sample_state();
        let view = project(&state, None);
        assert_eq!(view.status, GameStatus::Waiting);
        assert_eq!(view.board.len(), 3);
        assert!(view
            .board
            .iter()
            .flatten()
            .all(|c| matches!(c, BoardCell::Closed)));
        assert_eq!(view.found, 0);
        assert_eq!(view.scores, Scores::default());
        assert_eq!(view.you_are, None);
        // Unassigned turn is reported as slot 1.
        assert_eq!(view.turn, PlayerSlot::One);
    }

    #[test]
    fn unopened_diamonds_are_never_exposed() {
        let state = sample_state();
        for viewer in [None, Some(PlayerSlot::One), Some(PlayerSlot::Two)] {
            let json = serde_json::to_string(&project(&state, viewer)).unwrap();
            assert!(!json.contains("\"t\":\"d\""), "diamond leaked: {json}");
            assert!(!json.contains("\"t\":\"n\""), "adjacency leaked: {json}");
        }
    }

    #[test]
    fn opened_cells_reveal_their_content_at_the_right_coordinate() {
        let mut state = sample_state();
        let (dx, dy) = state
            .cells
            .iter()
            .find(|c| c.is_diamond)
            .map(|c| (c.x, c.y))
            .unwrap();
        let (nx, ny, adj) = state
            .cells
            .iter()
            .find(|c| !c.is_diamond)
            .map(|c| (c.x, c.y, c.adjacent_diamonds))
            .unwrap();
        for (x, y) in [(dx, dy), (nx, ny)] {
            let cell = state.cell_mut(x, y).unwrap();
            cell.opened_by = Some(PlayerSlot::One);
            cell.opened_at = Some(Utc::now());
        }

        let view = project(&state, None);
        assert_eq!(
            view.board[dy as usize][dx as usize],
            BoardCell::Opened {
                content: CellContent::Diamond
            }
        );
        assert_eq!(
            view.board[ny as usize][nx as usize],
            BoardCell::Opened {
                content: CellContent::Number { v: adj }
            }
        );
    }

    #[test]
    fn viewer_slot_and_presence_flow_through() {
        let mut state = sample_state();
        state.player_mut(PlayerSlot::Two).connected = true;
        state.status = GameStatus::Active;
        state.turn = Some(PlayerSlot::Two);

        let view = project(&state, Some(PlayerSlot::Two));
        assert_eq!(view.you_are, Some(PlayerSlot::Two));
        assert_eq!(view.turn, PlayerSlot::Two);
        assert!(!view.players.p1.connected);
        assert!(view.players.p2.connected);
    }
}
