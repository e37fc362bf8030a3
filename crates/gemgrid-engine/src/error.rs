use gemgrid_core::ids::GameId;
use gemgrid_store::StoreError;

/// Failures surfaced by game operations. Each maps to a stable wire code;
/// every variant aborts exactly one operation and leaves the game untouched.
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    #[error("game not found: {0}")]
    GameNotFound(GameId),

    #[error("invalid token")]
    InvalidToken,

    #[error("game is not active")]
    GameNotActive,

    #[error("game already finished")]
    GameFinished,

    #[error("not your turn")]
    NotYourTurn,

    #[error("coordinates ({x},{y}) out of bounds for field size {field_size}")]
    OutOfBounds { x: u8, y: u8, field_size: u8 },

    /// Defensive: valid bounds but no cell row. Should not occur.
    #[error("cell ({x},{y}) not found")]
    CellNotFound { x: u8, y: u8 },

    #[error("cell ({x},{y}) already opened")]
    CellAlreadyOpened { x: u8, y: u8 },

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl GameError {
    /// Stable string code sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::GameNotFound(_) => "GAME_NOT_FOUND",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::GameNotActive => "GAME_NOT_ACTIVE",
            Self::GameFinished => "GAME_FINISHED",
            Self::NotYourTurn => "NOT_YOUR_TURN",
            Self::OutOfBounds { .. } => "OUT_OF_BOUNDS",
            // Clients never learn about missing cell rows beyond "not found".
            Self::CellNotFound { .. } => "GAME_NOT_FOUND",
            Self::CellAlreadyOpened { .. } => "CELL_ALREADY_OPENED",
            Self::Store(_) => "UNKNOWN_ERROR",
        }
    }
}
