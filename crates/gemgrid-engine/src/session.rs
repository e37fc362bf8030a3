//! The per-game state machine: validates and applies `join`, `open_cell`
//! and `disconnect` against a [`GameState`].
//!
//! A session never talks to storage or transport. Validation always runs
//! to completion before the first mutation, so a returned error means the
//! state is exactly as it was.

use chrono::Utc;
use rand::Rng;
use tracing::info;

use gemgrid_core::slot::PlayerSlot;
use gemgrid_core::types::{
    BoardCell, CellContent, GameOverReason, GameOverReport, GameStatus, MoveOutcome,
};

use crate::error::GameError;
use crate::state::GameState;

/// Everything one accepted move produced. `move_no` is the 1-based
/// position of this move in the game's history.
#[derive(Clone, Debug)]
pub struct OpenCellOutcome {
    pub slot: PlayerSlot,
    pub move_no: u32,
    pub outcome: MoveOutcome,
    pub game_over: Option<GameOverReport>,
}

#[derive(Debug)]
pub struct GameSession {
    state: GameState,
}

impl GameSession {
    pub fn new(state: GameState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// Clone of the current state, for rollback around fallible
    /// side effects.
    pub fn checkpoint(&self) -> GameState {
        self.state.clone()
    }

    pub fn restore(&mut self, checkpoint: GameState) {
        self.state = checkpoint;
    }

    /// Mark the token's player connected. The first join that completes
    /// the pair activates the game and picks a uniformly random first
    /// turn; rejoining later only refreshes presence.
    pub fn join<R: Rng>(&mut self, token: &str, rng: &mut R) -> Result<PlayerSlot, GameError> {
        let slot = self
            .state
            .slot_for_token(token)
            .ok_or(GameError::InvalidToken)?;

        let now = Utc::now();
        let player = self.state.player_mut(slot);
        player.connected = true;
        player.last_seen_at = Some(now);

        if self.state.status == GameStatus::Waiting && self.state.all_connected() {
            let first = if rng.gen_range(0..2u8) == 0 {
                PlayerSlot::One
            } else {
                PlayerSlot::Two
            };
            self.state.status = GameStatus::Active;
            self.state.turn = Some(first);
            info!(game_id = %self.state.id, first_turn = %first, "game activated");
        }
        Ok(slot)
    }

    /// Open one cell for the token's player. All checks run before any
    /// mutation, in a fixed order so clients see deterministic errors.
    pub fn open_cell(&mut self, token: &str, x: u8, y: u8) -> Result<OpenCellOutcome, GameError> {
        match self.state.status {
            GameStatus::Finished => return Err(GameError::GameFinished),
            GameStatus::Waiting => return Err(GameError::GameNotActive),
            GameStatus::Active => {}
        }
        let slot = self
            .state
            .slot_for_token(token)
            .ok_or(GameError::InvalidToken)?;
        if self.state.turn != Some(slot) {
            return Err(GameError::NotYourTurn);
        }
        if x >= self.state.field_size || y >= self.state.field_size {
            return Err(GameError::OutOfBounds {
                x,
                y,
                field_size: self.state.field_size,
            });
        }
        let cell = self
            .state
            .cell(x, y)
            .ok_or(GameError::CellNotFound { x, y })?;
        if cell.is_opened() {
            return Err(GameError::CellAlreadyOpened { x, y });
        }
        let is_diamond = cell.is_diamond;
        let adjacent = cell.adjacent_diamonds;

        // Validation done; apply.
        let now = Utc::now();
        {
            let cell = self
                .state
                .cell_mut(x, y)
                .ok_or(GameError::CellNotFound { x, y })?;
            cell.opened_by = Some(slot);
            cell.opened_at = Some(now);
        }

        let revealed = if is_diamond {
            self.state.player_mut(slot).score += 1;
            self.state.diamonds_found += 1;
            // Finder keeps the turn.
            BoardCell::Opened {
                content: CellContent::Diamond,
            }
        } else {
            self.state.turn = Some(slot.other());
            BoardCell::Opened {
                content: CellContent::Number { v: adjacent },
            }
        };

        let game_over = if self.state.diamonds_found == self.state.diamonds_count {
            self.state.status = GameStatus::Finished;
            self.state.turn = None;
            self.state.finished_at = Some(now);
            let scores = self.state.scores();
            let winner = if scores.p1 > scores.p2 {
                1
            } else if scores.p2 > scores.p1 {
                2
            } else {
                0
            };
            info!(game_id = %self.state.id, winner, "game finished");
            Some(GameOverReport {
                status: GameStatus::Finished,
                scores,
                winner,
                reason: GameOverReason::AllDiamondsFound,
            })
        } else {
            None
        };

        let outcome = MoveOutcome {
            x,
            y,
            cell: revealed,
            turn: self.state.turn.unwrap_or(PlayerSlot::One),
            scores: self.state.scores(),
            found: self.state.diamonds_found,
        };
        Ok(OpenCellOutcome {
            slot,
            move_no: self.state.opened_count(),
            outcome,
            game_over,
        })
    }

    /// Flip the player's presence off. Turn, scores and status are not
    /// touched; the game waits for a reconnect-by-token.
    pub fn disconnect(&mut self, slot: PlayerSlot) {
        let now = Utc::now();
        let player = self.state.player_mut(slot);
        player.connected = false;
        player.last_seen_at = Some(now);
    }
}
