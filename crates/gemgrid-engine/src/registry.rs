//! Owns every live game and serializes access to each one.
//!
//! Games live in a [`DashMap`] keyed by id; each entry is an
//! `Arc<tokio::sync::Mutex<GameSession>>`, so operations on different
//! games run freely in parallel while operations on one game queue up.
//! The Arc is cloned out of the map entry before the lock is awaited, so
//! no DashMap shard guard is ever held across an await point.
//!
//! Persistence happens inside the per-game critical section: the state is
//! checkpointed, mutated, then written through to the repo. A store
//! failure restores the checkpoint, so memory and storage never disagree
//! about an accepted move.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use gemgrid_core::ids::GameId;
use gemgrid_core::slot::PlayerSlot;
use gemgrid_core::types::{BoardCell, CellContent, GameOverReport, GameView, MoveOutcome};
use gemgrid_store::{GameRepo, MoveRecord};

use crate::board::Board;
use crate::error::GameError;
use crate::session::GameSession;
use crate::state::GameState;
use crate::view::project;

/// Result of creating a game: the id plus both secret tokens. Tokens are
/// surfaced exactly once, here.
#[derive(Clone, Debug)]
pub struct CreatedGame {
    pub id: GameId,
    pub field_size: u8,
    pub diamonds_count: u32,
    pub player1_token: String,
    pub player2_token: String,
}

/// A join that went through: the authenticated slot plus the state as it
/// stood inside the critical section, for per-viewer projection.
#[derive(Clone, Debug)]
pub struct JoinApplied {
    pub slot: PlayerSlot,
    pub state: GameState,
}

/// An accepted move, plus the post-move state for projection.
#[derive(Clone, Debug)]
pub struct MoveApplied {
    pub slot: PlayerSlot,
    pub move_no: u32,
    pub outcome: MoveOutcome,
    pub game_over: Option<GameOverReport>,
    pub state: GameState,
}

pub struct GameRegistry {
    games: DashMap<GameId, Arc<Mutex<GameSession>>>,
    repo: Option<GameRepo>,
    rng: parking_lot::Mutex<StdRng>,
}

impl GameRegistry {
    /// Registry with an OS-seeded random stream. `repo` is optional so
    /// the engine can run without persistence.
    pub fn new(repo: Option<GameRepo>) -> Self {
        Self::with_rng(repo, StdRng::from_entropy())
    }

    /// Registry with a caller-supplied random stream, for deterministic
    /// board placement and first-turn picks.
    pub fn with_rng(repo: Option<GameRepo>, rng: StdRng) -> Self {
        Self {
            games: DashMap::new(),
            repo,
            rng: parking_lot::Mutex::new(rng),
        }
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    /// Reload every unfinished game from the repo into memory. Called
    /// once at startup, before the registry is shared.
    #[instrument(skip(self))]
    pub fn hydrate(&self) -> Result<usize, GameError> {
        let Some(repo) = &self.repo else {
            return Ok(0);
        };
        let snapshots = repo.load_unfinished()?;
        let count = snapshots.len();
        for snapshot in &snapshots {
            let state = GameState::from_snapshot(snapshot)?;
            self.games
                .insert(state.id.clone(), Arc::new(Mutex::new(GameSession::new(state))));
        }
        if count > 0 {
            info!(count, "rehydrated unfinished games");
        }
        Ok(count)
    }

    /// Create a game: generate the board, mint both tokens, persist the
    /// initial snapshot, then publish the session.
    #[instrument(skip(self))]
    pub fn create_game(
        &self,
        field_size: u8,
        diamonds_count: u32,
    ) -> Result<CreatedGame, GameError> {
        let state = {
            let mut rng = self.rng.lock();
            let board = Board::generate(field_size, diamonds_count, &mut *rng);
            GameState::new(&board, diamonds_count, &mut *rng)
        };
        if let Some(repo) = &self.repo {
            repo.create(&state.to_snapshot())?;
        }
        let created = CreatedGame {
            id: state.id.clone(),
            field_size,
            diamonds_count,
            player1_token: state.players[0].token.clone(),
            player2_token: state.players[1].token.clone(),
        };
        info!(game_id = %created.id, field_size, diamonds_count, "game created");
        self.games
            .insert(created.id.clone(), Arc::new(Mutex::new(GameSession::new(state))));
        Ok(created)
    }

    /// The session for `id`, cloned out of the map so the caller can
    /// await its lock without holding a shard guard.
    pub fn session(&self, id: &GameId) -> Result<Arc<Mutex<GameSession>>, GameError> {
        self.games
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| GameError::GameNotFound(id.clone()))
    }

    #[instrument(skip(self, token))]
    pub async fn join(&self, id: &GameId, token: &str) -> Result<JoinApplied, GameError> {
        let session = self.session(id)?;
        let mut session = session.lock().await;

        let checkpoint = session.checkpoint();
        let slot = {
            let mut rng = self.rng.lock();
            session.join(token, &mut *rng)?
        };
        if let Err(err) = self.persist(&session) {
            session.restore(checkpoint);
            return Err(err);
        }
        Ok(JoinApplied {
            slot,
            state: session.checkpoint(),
        })
    }

    #[instrument(skip(self, token))]
    pub async fn open_cell(
        &self,
        id: &GameId,
        token: &str,
        x: u8,
        y: u8,
    ) -> Result<MoveApplied, GameError> {
        let session = self.session(id)?;
        let mut session = session.lock().await;

        let checkpoint = session.checkpoint();
        let result = session.open_cell(token, x, y)?;
        let persisted = self.persist(&session).and_then(|_| {
            if let Some(repo) = &self.repo {
                repo.record_move(&move_record(id, &result))?;
            }
            Ok(())
        });
        if let Err(err) = persisted {
            warn!(game_id = %id, error = %err, "rolling back move after store failure");
            session.restore(checkpoint);
            return Err(err);
        }
        Ok(MoveApplied {
            slot: result.slot,
            move_no: result.move_no,
            outcome: result.outcome,
            game_over: result.game_over,
            state: session.checkpoint(),
        })
    }

    #[instrument(skip(self))]
    pub async fn disconnect(&self, id: &GameId, slot: PlayerSlot) -> Result<GameState, GameError> {
        let session = self.session(id)?;
        let mut session = session.lock().await;

        let checkpoint = session.checkpoint();
        session.disconnect(slot);
        if let Err(err) = self.persist(&session) {
            session.restore(checkpoint);
            return Err(err);
        }
        Ok(session.checkpoint())
    }

    /// Project the game for one viewer. Takes the session lock, so a
    /// view never observes a half-applied mutation.
    pub async fn view(
        &self,
        id: &GameId,
        viewer: Option<PlayerSlot>,
    ) -> Result<GameView, GameError> {
        let session = self.session(id)?;
        let session = session.lock().await;
        Ok(project(session.state(), viewer))
    }

    /// Resolve a token to its slot without mutating anything.
    pub async fn authenticate(&self, id: &GameId, token: &str) -> Result<PlayerSlot, GameError> {
        let session = self.session(id)?;
        let session = session.lock().await;
        session
            .state()
            .slot_for_token(token)
            .ok_or(GameError::InvalidToken)
    }

    fn persist(&self, session: &GameSession) -> Result<(), GameError> {
        if let Some(repo) = &self.repo {
            repo.save(&session.state().to_snapshot())?;
        }
        Ok(())
    }
}

fn move_record(id: &GameId, result: &crate::session::OpenCellOutcome) -> MoveRecord {
    let (kind, number_value) = match result.outcome.cell {
        BoardCell::Opened {
            content: CellContent::Diamond,
        } => ("diamond", None),
        BoardCell::Opened {
            content: CellContent::Number { v },
        } => ("number", Some(v)),
        BoardCell::Closed => ("number", None),
    };
    MoveRecord {
        game_id: id.clone(),
        move_no: result.move_no,
        player_slot: result.slot,
        x: result.outcome.x,
        y: result.outcome.y,
        result: kind.to_string(),
        number_value,
        made_at: Utc::now().to_rfc3339(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gemgrid_core::types::GameStatus;
    use gemgrid_store::Database;

    fn seeded_registry(repo: Option<GameRepo>) -> GameRegistry {
        GameRegistry::with_rng(repo, StdRng::seed_from_u64(77))
    }

    async fn diamond_coord(registry: &GameRegistry, id: &GameId) -> (u8, u8) {
        let session = registry.session(id).unwrap();
        let session = session.lock().await;
        session
            .state()
            .cells
            .iter()
            .find(|c| c.is_diamond && !c.is_opened())
            .map(|c| (c.x, c.y))
            .unwrap()
    }

    async fn turn_token(registry: &GameRegistry, id: &GameId) -> String {
        let session = registry.session(id).unwrap();
        let session = session.lock().await;
        let slot = session.state().turn.unwrap();
        session.state().player(slot).token.clone()
    }

    #[tokio::test]
    async fn create_join_open_round_trip() {
        let registry = seeded_registry(None);
        let created = registry.create_game(2, 1).unwrap();
        assert!(created.player1_token.starts_with("p1_"));
        assert!(created.player2_token.starts_with("p2_"));

        let j1 = registry.join(&created.id, &created.player1_token).await.unwrap();
        assert_eq!(j1.slot, PlayerSlot::One);
        assert_eq!(j1.state.status, GameStatus::Waiting);
        let j2 = registry.join(&created.id, &created.player2_token).await.unwrap();
        assert_eq!(j2.state.status, GameStatus::Active);

        let (x, y) = diamond_coord(&registry, &created.id).await;
        let token = turn_token(&registry, &created.id).await;
        let applied = registry.open_cell(&created.id, &token, x, y).await.unwrap();
        assert_eq!(applied.move_no, 1);
        assert_eq!(applied.outcome.found, 1);
        let over = applied.game_over.unwrap();
        assert_eq!(over.winner, applied.slot.as_u8());
        assert_eq!(applied.state.status, GameStatus::Finished);
    }

    #[tokio::test]
    async fn unknown_game_is_reported_as_not_found() {
        let registry = seeded_registry(None);
        let id = GameId::new();
        let err = registry.join(&id, "p1_whatever").await.unwrap_err();
        assert_eq!(err.code(), "GAME_NOT_FOUND");
        let err = registry.view(&id, None).await.unwrap_err();
        assert_eq!(err.code(), "GAME_NOT_FOUND");
    }

    #[tokio::test]
    async fn concurrent_moves_on_one_cell_accept_exactly_one() {
        let registry = Arc::new(seeded_registry(None));
        let created = registry.create_game(3, 3).unwrap();
        registry.join(&created.id, &created.player1_token).await.unwrap();
        registry.join(&created.id, &created.player2_token).await.unwrap();

        // A diamond keeps the turn, so both racing calls pass the turn
        // check and only the cell state decides the loser.
        let (x, y) = diamond_coord(&registry, &created.id).await;
        let token = turn_token(&registry, &created.id).await;

        let a = tokio::spawn({
            let registry = Arc::clone(&registry);
            let id = created.id.clone();
            let token = token.clone();
            async move { registry.open_cell(&id, &token, x, y).await }
        });
        let b = tokio::spawn({
            let registry = Arc::clone(&registry);
            let id = created.id.clone();
            let token = token.clone();
            async move { registry.open_cell(&id, &token, x, y).await }
        });
        let (a, b) = (a.await.unwrap(), b.await.unwrap());

        let (ok, err) = match (a, b) {
            (Ok(ok), Err(err)) | (Err(err), Ok(ok)) => (ok, err),
            other => panic!("expected exactly one winner, got {other:?}"),
        };
        assert_eq!(err.code(), "CELL_ALREADY_OPENED");
        assert_eq!(ok.outcome.found, 1);

        let view = registry.view(&created.id, None).await.unwrap();
        assert_eq!(view.found, 1);
        assert_eq!(view.scores.p1 + view.scores.p2, 1);
    }

    #[tokio::test]
    async fn store_failure_rolls_the_move_back() {
        let db = Database::in_memory().unwrap();
        let registry = seeded_registry(Some(GameRepo::new(db.clone())));
        let created = registry.create_game(3, 3).unwrap();
        registry.join(&created.id, &created.player1_token).await.unwrap();
        registry.join(&created.id, &created.player2_token).await.unwrap();

        // Sabotage the journal so record_move fails after the snapshot
        // save succeeded.
        db.with_conn(|conn| Ok(conn.execute_batch("DROP TABLE moves")?))
            .unwrap();

        let (x, y) = diamond_coord(&registry, &created.id).await;
        let token = turn_token(&registry, &created.id).await;
        let err = registry.open_cell(&created.id, &token, x, y).await.unwrap_err();
        assert_eq!(err.code(), "UNKNOWN_ERROR");

        let view = registry.view(&created.id, None).await.unwrap();
        assert_eq!(view.found, 0);
        assert_eq!(view.scores.p1 + view.scores.p2, 0);
        assert_eq!(view.status, GameStatus::Active);
    }

    #[tokio::test]
    async fn hydrate_restores_unfinished_games_with_their_tokens() {
        let db = Database::in_memory().unwrap();
        let created = {
            let registry = seeded_registry(Some(GameRepo::new(db.clone())));
            let created = registry.create_game(3, 3).unwrap();
            registry.join(&created.id, &created.player1_token).await.unwrap();
            created
        };

        let registry = GameRegistry::new(Some(GameRepo::new(db)));
        assert_eq!(registry.hydrate().unwrap(), 1);

        // Presence reset on restart; tokens and board survive.
        let view = registry.view(&created.id, None).await.unwrap();
        assert!(!view.players.p1.connected);
        let joined = registry.join(&created.id, &created.player1_token).await.unwrap();
        assert_eq!(joined.slot, PlayerSlot::One);
    }

    #[tokio::test]
    async fn disconnect_updates_presence_only() {
        let registry = seeded_registry(None);
        let created = registry.create_game(3, 3).unwrap();
        registry.join(&created.id, &created.player1_token).await.unwrap();
        registry.join(&created.id, &created.player2_token).await.unwrap();

        let state = registry.disconnect(&created.id, PlayerSlot::Two).await.unwrap();
        assert!(!state.player(PlayerSlot::Two).connected);
        assert_eq!(state.status, GameStatus::Active);

        let view = registry.view(&created.id, None).await.unwrap();
        assert!(view.players.p1.connected);
        assert!(!view.players.p2.connected);
    }

    #[tokio::test]
    async fn authenticate_resolves_tokens() {
        let registry = seeded_registry(None);
        let created = registry.create_game(2, 1).unwrap();
        assert_eq!(
            registry.authenticate(&created.id, &created.player2_token).await.unwrap(),
            PlayerSlot::Two
        );
        let err = registry.authenticate(&created.id, "p1_nope").await.unwrap_err();
        assert_eq!(err.code(), "INVALID_TOKEN");
    }
}
