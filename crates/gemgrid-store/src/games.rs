//! Persistence for games: full-aggregate snapshots plus an append-only
//! move journal. The in-memory engine state is authoritative at runtime;
//! rows here exist so unfinished games survive a restart.

use rusqlite::OptionalExtension;
use tracing::instrument;

use gemgrid_core::ids::{GameId, PlayerId};
use gemgrid_core::slot::PlayerSlot;
use gemgrid_core::types::GameStatus;

use crate::database::Database;
use crate::error::StoreError;

#[derive(Clone, Debug, PartialEq)]
pub struct PlayerSnapshot {
    pub id: PlayerId,
    pub slot: PlayerSlot,
    pub token: String,
    pub connected: bool,
    pub score: u32,
    pub last_seen_at: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CellSnapshot {
    pub x: u8,
    pub y: u8,
    pub is_diamond: bool,
    pub adjacent_diamonds: u8,
    pub opened_by_slot: Option<PlayerSlot>,
    pub opened_at: Option<String>,
}

/// Everything needed to rebuild one game: row, both players, all cells.
#[derive(Clone, Debug, PartialEq)]
pub struct GameSnapshot {
    pub id: GameId,
    pub field_size: u8,
    pub diamonds_count: u32,
    pub diamonds_found: u32,
    pub status: GameStatus,
    pub turn_slot: Option<PlayerSlot>,
    pub created_at: String,
    pub finished_at: Option<String>,
    pub players: Vec<PlayerSnapshot>,
    pub cells: Vec<CellSnapshot>,
}

/// One row of the move journal.
#[derive(Clone, Debug, PartialEq)]
pub struct MoveRecord {
    pub game_id: GameId,
    pub move_no: u32,
    pub player_slot: PlayerSlot,
    pub x: u8,
    pub y: u8,
    /// "diamond" or "number".
    pub result: String,
    pub number_value: Option<u8>,
    pub made_at: String,
}

pub struct GameRepo {
    db: Database,
}

impl GameRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a freshly created game with its players and cells, atomically.
    #[instrument(skip(self, snapshot), fields(game_id = %snapshot.id))]
    pub fn create(&self, snapshot: &GameSnapshot) -> Result<(), StoreError> {
        self.db.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT INTO games (id, field_size, diamonds_count, diamonds_found, status, turn_slot, created_at, finished_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    snapshot.id.as_str(),
                    snapshot.field_size,
                    snapshot.diamonds_count,
                    snapshot.diamonds_found,
                    snapshot.status.to_string(),
                    snapshot.turn_slot.map(PlayerSlot::as_u8),
                    snapshot.created_at,
                    snapshot.finished_at,
                ],
            )?;

            for player in &snapshot.players {
                tx.execute(
                    "INSERT INTO players (id, game_id, slot, token, connected, score, last_seen_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    rusqlite::params![
                        player.id.as_str(),
                        snapshot.id.as_str(),
                        player.slot.as_u8(),
                        player.token,
                        player.connected,
                        player.score,
                        player.last_seen_at,
                    ],
                )?;
            }

            for cell in &snapshot.cells {
                tx.execute(
                    "INSERT INTO cells (game_id, x, y, is_diamond, adjacent_diamonds, opened_by_slot, opened_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    rusqlite::params![
                        snapshot.id.as_str(),
                        cell.x,
                        cell.y,
                        cell.is_diamond,
                        cell.adjacent_diamonds,
                        cell.opened_by_slot.map(PlayerSlot::as_u8),
                        cell.opened_at,
                    ],
                )?;
            }

            tx.commit()?;
            Ok(())
        })
    }

    /// Overwrite the mutable parts of a game after an accepted mutation:
    /// the game row, player presence/scores, and cell open markers.
    #[instrument(skip(self, snapshot), fields(game_id = %snapshot.id))]
    pub fn save(&self, snapshot: &GameSnapshot) -> Result<(), StoreError> {
        self.db.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let updated = tx.execute(
                "UPDATE games SET diamonds_found = ?2, status = ?3, turn_slot = ?4, finished_at = ?5
                 WHERE id = ?1",
                rusqlite::params![
                    snapshot.id.as_str(),
                    snapshot.diamonds_found,
                    snapshot.status.to_string(),
                    snapshot.turn_slot.map(PlayerSlot::as_u8),
                    snapshot.finished_at,
                ],
            )?;
            if updated == 0 {
                return Err(StoreError::NotFound(format!("game {}", snapshot.id)));
            }

            for player in &snapshot.players {
                tx.execute(
                    "UPDATE players SET connected = ?3, score = ?4, last_seen_at = ?5
                     WHERE game_id = ?1 AND slot = ?2",
                    rusqlite::params![
                        snapshot.id.as_str(),
                        player.slot.as_u8(),
                        player.connected,
                        player.score,
                        player.last_seen_at,
                    ],
                )?;
            }

            for cell in snapshot.cells.iter().filter(|c| c.opened_at.is_some()) {
                tx.execute(
                    "UPDATE cells SET opened_by_slot = ?4, opened_at = ?5
                     WHERE game_id = ?1 AND x = ?2 AND y = ?3",
                    rusqlite::params![
                        snapshot.id.as_str(),
                        cell.x,
                        cell.y,
                        cell.opened_by_slot.map(PlayerSlot::as_u8),
                        cell.opened_at,
                    ],
                )?;
            }

            tx.commit()?;
            Ok(())
        })
    }

    /// Append one move to the journal.
    #[instrument(skip(self, record), fields(game_id = %record.game_id, move_no = record.move_no))]
    pub fn record_move(&self, record: &MoveRecord) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO moves (game_id, move_no, player_slot, x, y, result, number_value, made_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    record.game_id.as_str(),
                    record.move_no,
                    record.player_slot.as_u8(),
                    record.x,
                    record.y,
                    record.result,
                    record.number_value,
                    record.made_at,
                ],
            )?;
            Ok(())
        })
    }

    /// Load one game with players and cells.
    #[instrument(skip(self), fields(game_id = %id))]
    pub fn load(&self, id: &GameId) -> Result<GameSnapshot, StoreError> {
        self.db.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, field_size, diamonds_count, diamonds_found, status, turn_slot, created_at, finished_at
                     FROM games WHERE id = ?1",
                    [id.as_str()],
                    game_row,
                )
                .optional()?;

            let mut snapshot = match row {
                Some(s) => s,
                None => return Err(StoreError::NotFound(format!("game {id}"))),
            };

            snapshot.players = load_players(conn, id)?;
            snapshot.cells = load_cells(conn, id)?;
            Ok(snapshot)
        })
    }

    /// Load every game that has not finished, for registry re-hydration.
    #[instrument(skip(self))]
    pub fn load_unfinished(&self) -> Result<Vec<GameSnapshot>, StoreError> {
        let ids: Vec<GameId> = self.db.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id FROM games WHERE status != 'finished' ORDER BY created_at")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            let mut ids = Vec::new();
            for row in rows {
                ids.push(GameId::from_raw(row?));
            }
            Ok(ids)
        })?;

        ids.iter().map(|id| self.load(id)).collect()
    }

    /// Number of journaled moves for a game.
    pub fn move_count(&self, id: &GameId) -> Result<u32, StoreError> {
        self.db.with_conn(|conn| {
            let count: u32 = conn.query_row(
                "SELECT COUNT(*) FROM moves WHERE game_id = ?1",
                [id.as_str()],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }
}

fn game_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<GameSnapshot> {
    let status: String = row.get(4)?;
    let turn_slot: Option<u8> = row.get(5)?;
    Ok(GameSnapshot {
        id: GameId::from_raw(row.get::<_, String>(0)?),
        field_size: row.get(1)?,
        diamonds_count: row.get(2)?,
        diamonds_found: row.get(3)?,
        status: status.parse().unwrap_or(GameStatus::Waiting),
        turn_slot: turn_slot.and_then(|s| PlayerSlot::try_from(s).ok()),
        created_at: row.get(6)?,
        finished_at: row.get(7)?,
        players: Vec::new(),
        cells: Vec::new(),
    })
}

fn load_players(
    conn: &rusqlite::Connection,
    game_id: &GameId,
) -> Result<Vec<PlayerSnapshot>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, slot, token, connected, score, last_seen_at
         FROM players WHERE game_id = ?1 ORDER BY slot",
    )?;
    let rows = stmt.query_map([game_id.as_str()], |row| {
        let slot: u8 = row.get(1)?;
        Ok(PlayerSnapshot {
            id: PlayerId::from_raw(row.get::<_, String>(0)?),
            slot: PlayerSlot::try_from(slot).unwrap_or(PlayerSlot::One),
            token: row.get(2)?,
            connected: row.get(3)?,
            score: row.get(4)?,
            last_seen_at: row.get(5)?,
        })
    })?;
    let mut players = Vec::new();
    for row in rows {
        players.push(row?);
    }
    Ok(players)
}

fn load_cells(
    conn: &rusqlite::Connection,
    game_id: &GameId,
) -> Result<Vec<CellSnapshot>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT x, y, is_diamond, adjacent_diamonds, opened_by_slot, opened_at
         FROM cells WHERE game_id = ?1 ORDER BY y, x",
    )?;
    let rows = stmt.query_map([game_id.as_str()], |row| {
        let opened_by: Option<u8> = row.get(4)?;
        Ok(CellSnapshot {
            x: row.get(0)?,
            y: row.get(1)?,
            is_diamond: row.get(2)?,
            adjacent_diamonds: row.get(3)?,
            opened_by_slot: opened_by.and_then(|s| PlayerSlot::try_from(s).ok()),
            opened_at: row.get(5)?,
        })
    })?;
    let mut cells = Vec::new();
    for row in rows {
        cells.push(row?);
    }
    Ok(cells)
}
