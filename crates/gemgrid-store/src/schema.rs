/// SQL DDL for the gemgrid store.
/// WAL mode + foreign keys enabled at connection time.
pub const SCHEMA_VERSION: u32 = 1;

pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS games (
    id TEXT PRIMARY KEY,
    field_size INTEGER NOT NULL,
    diamonds_count INTEGER NOT NULL,
    diamonds_found INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'waiting',
    turn_slot INTEGER,
    created_at TEXT NOT NULL,
    finished_at TEXT
);

CREATE TABLE IF NOT EXISTS players (
    id TEXT PRIMARY KEY,
    game_id TEXT NOT NULL REFERENCES games(id),
    slot INTEGER NOT NULL,
    token TEXT NOT NULL UNIQUE,
    connected INTEGER NOT NULL DEFAULT 0,
    score INTEGER NOT NULL DEFAULT 0,
    last_seen_at TEXT,
    UNIQUE (game_id, slot)
);

CREATE TABLE IF NOT EXISTS cells (
    game_id TEXT NOT NULL REFERENCES games(id),
    x INTEGER NOT NULL,
    y INTEGER NOT NULL,
    is_diamond INTEGER NOT NULL,
    adjacent_diamonds INTEGER NOT NULL,
    opened_by_slot INTEGER,
    opened_at TEXT,
    PRIMARY KEY (game_id, x, y)
);

CREATE TABLE IF NOT EXISTS moves (
    game_id TEXT NOT NULL REFERENCES games(id),
    move_no INTEGER NOT NULL,
    player_slot INTEGER NOT NULL,
    x INTEGER NOT NULL,
    y INTEGER NOT NULL,
    result TEXT NOT NULL,
    number_value INTEGER,
    made_at TEXT NOT NULL,
    PRIMARY KEY (game_id, move_no)
);

CREATE INDEX IF NOT EXISTS idx_players_game ON players(game_id);
CREATE INDEX IF NOT EXISTS idx_players_token ON players(token);
CREATE INDEX IF NOT EXISTS idx_cells_game ON cells(game_id);
CREATE INDEX IF NOT EXISTS idx_games_status ON games(status);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);
"#;

pub const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = NORMAL;
"#;
