//! In-memory state for one game: the authoritative data model owned by
//! `GameSession` and mutated only through its operations.

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;

use gemgrid_core::ids::{GameId, PlayerId};
use gemgrid_core::slot::PlayerSlot;
use gemgrid_core::types::{GameStatus, Scores};
use gemgrid_store::{CellSnapshot, GameSnapshot, PlayerSnapshot, StoreError};

use crate::board::Board;

const TOKEN_SECRET_LEN: usize = 8;

#[derive(Clone, Debug)]
pub struct PlayerState {
    pub id: PlayerId,
    pub slot: PlayerSlot,
    pub token: String,
    pub connected: bool,
    pub score: u32,
    pub last_seen_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug)]
pub struct CellState {
    pub x: u8,
    pub y: u8,
    pub is_diamond: bool,
    pub adjacent_diamonds: u8,
    pub opened_by: Option<PlayerSlot>,
    pub opened_at: Option<DateTime<Utc>>,
}

impl CellState {
    pub fn is_opened(&self) -> bool {
        self.opened_at.is_some()
    }
}

/// One game: board cells, both players, turn and progress counters.
/// Cells are row-major (`index = y * field_size + x`).
#[derive(Clone, Debug)]
pub struct GameState {
    pub id: GameId,
    pub field_size: u8,
    pub diamonds_count: u32,
    pub diamonds_found: u32,
    pub status: GameStatus,
    pub turn: Option<PlayerSlot>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub players: [PlayerState; 2],
    pub cells: Vec<CellState>,
}

impl GameState {
    /// Build a fresh WAITING game from a generated board. Both players get
    /// a newly generated secret token and start disconnected with score 0.
    pub fn new<R: Rng>(board: &Board, diamonds_count: u32, rng: &mut R) -> Self {
        let field_size = board.field_size();
        let cells = (0..field_size)
            .flat_map(|y| (0..field_size).map(move |x| (x, y)))
            .map(|(x, y)| CellState {
                x,
                y,
                is_diamond: board.is_diamond(x, y),
                adjacent_diamonds: board.adjacent_diamonds(x, y),
                opened_by: None,
                opened_at: None,
            })
            .collect();

        let players = [
            new_player(PlayerSlot::One, generate_token("p1", rng)),
            new_player(PlayerSlot::Two, generate_token("p2", rng)),
        ];

        Self {
            id: GameId::new(),
            field_size,
            diamonds_count,
            diamonds_found: 0,
            status: GameStatus::Waiting,
            turn: None,
            created_at: Utc::now(),
            finished_at: None,
            players,
            cells,
        }
    }

    pub fn player(&self, slot: PlayerSlot) -> &PlayerState {
        &self.players[slot as usize - 1]
    }

    pub fn player_mut(&mut self, slot: PlayerSlot) -> &mut PlayerState {
        &mut self.players[slot as usize - 1]
    }

    pub fn slot_for_token(&self, token: &str) -> Option<PlayerSlot> {
        self.players
            .iter()
            .find(|p| p.token == token)
            .map(|p| p.slot)
    }

    pub fn cell(&self, x: u8, y: u8) -> Option<&CellState> {
        if x >= self.field_size || y >= self.field_size {
            return None;
        }
        self.cells
            .get(y as usize * self.field_size as usize + x as usize)
    }

    pub fn cell_mut(&mut self, x: u8, y: u8) -> Option<&mut CellState> {
        if x >= self.field_size || y >= self.field_size {
            return None;
        }
        self.cells
            .get_mut(y as usize * self.field_size as usize + x as usize)
    }

    pub fn all_connected(&self) -> bool {
        self.players.iter().all(|p| p.connected)
    }

    pub fn scores(&self) -> Scores {
        Scores {
            p1: self.player(PlayerSlot::One).score,
            p2: self.player(PlayerSlot::Two).score,
        }
    }

    /// Number of cells opened so far; the next move gets this + 1.
    pub fn opened_count(&self) -> u32 {
        self.cells.iter().filter(|c| c.is_opened()).count() as u32
    }

    /// Convert to the storage representation.
    pub fn to_snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            id: self.id.clone(),
            field_size: self.field_size,
            diamonds_count: self.diamonds_count,
            diamonds_found: self.diamonds_found,
            status: self.status,
            turn_slot: self.turn,
            created_at: self.created_at.to_rfc3339(),
            finished_at: self.finished_at.map(|t| t.to_rfc3339()),
            players: self
                .players
                .iter()
                .map(|p| PlayerSnapshot {
                    id: p.id.clone(),
                    slot: p.slot,
                    token: p.token.clone(),
                    connected: p.connected,
                    score: p.score,
                    last_seen_at: p.last_seen_at.map(|t| t.to_rfc3339()),
                })
                .collect(),
            cells: self
                .cells
                .iter()
                .map(|c| CellSnapshot {
                    x: c.x,
                    y: c.y,
                    is_diamond: c.is_diamond,
                    adjacent_diamonds: c.adjacent_diamonds,
                    opened_by_slot: c.opened_by,
                    opened_at: c.opened_at.map(|t| t.to_rfc3339()),
                })
                .collect(),
        }
    }

    /// Rebuild from a stored snapshot (registry re-hydration).
    pub fn from_snapshot(snapshot: &GameSnapshot) -> Result<Self, StoreError> {
        let mut players = Vec::with_capacity(2);
        for slot in PlayerSlot::both() {
            let p = snapshot
                .players
                .iter()
                .find(|p| p.slot == slot)
                .ok_or_else(|| {
                    StoreError::Serialization(format!(
                        "game {} is missing player slot {slot}",
                        snapshot.id
                    ))
                })?;
            players.push(PlayerState {
                id: p.id.clone(),
                slot: p.slot,
                token: p.token.clone(),
                // Presence does not survive a restart; clients re-join.
                connected: false,
                score: p.score,
                last_seen_at: parse_opt_timestamp(p.last_seen_at.as_deref())?,
            });
        }
        let players: [PlayerState; 2] = players
            .try_into()
            .map_err(|_| StoreError::Serialization("expected exactly 2 players".into()))?;

        let n = snapshot.field_size as usize;
        let mut cells: Vec<Option<CellState>> = vec![None; n * n];
        for c in &snapshot.cells {
            let idx = c.y as usize * n + c.x as usize;
            if idx >= cells.len() {
                return Err(StoreError::Serialization(format!(
                    "cell ({},{}) outside {n}x{n} board",
                    c.x, c.y
                )));
            }
            cells[idx] = Some(CellState {
                x: c.x,
                y: c.y,
                is_diamond: c.is_diamond,
                adjacent_diamonds: c.adjacent_diamonds,
                opened_by: c.opened_by_slot,
                opened_at: parse_opt_timestamp(c.opened_at.as_deref())?,
            });
        }
        let cells: Vec<CellState> = cells
            .into_iter()
            .collect::<Option<_>>()
            .ok_or_else(|| StoreError::Serialization("incomplete cell grid".into()))?;

        Ok(Self {
            id: snapshot.id.clone(),
            field_size: snapshot.field_size,
            diamonds_count: snapshot.diamonds_count,
            diamonds_found: snapshot.diamonds_found,
            status: snapshot.status,
            turn: snapshot.turn_slot,
            created_at: parse_timestamp(&snapshot.created_at)?,
            finished_at: parse_opt_timestamp(snapshot.finished_at.as_deref())?,
            players,
            cells,
        })
    }
}

fn new_player(slot: PlayerSlot, token: String) -> PlayerState {
    PlayerState {
        id: PlayerId::new(),
        slot,
        token,
        connected: false,
        score: 0,
        last_seen_at: None,
    }
}

/// `{prefix}_{8 random alphanumerics}` — the player's only credential.
fn generate_token<R: Rng>(prefix: &str, rng: &mut R) -> String {
    let secret: String = (0..TOKEN_SECRET_LEN)
        .map(|_| char::from(rng.sample(Alphanumeric)))
        .collect();
    format!("{prefix}_{secret}")
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Serialization(format!("bad timestamp {s:?}: {e}")))
}

fn parse_opt_timestamp(s: Option<&str>) -> Result<Option<DateTime<Utc>>, StoreError> {
    s.map(parse_timestamp).transpose()
}
