pub mod ids;
pub mod slot;
pub mod types;

pub use ids::{GameId, PlayerId};
pub use slot::PlayerSlot;
pub use types::{
    BoardCell, CellContent, GameCreated, GameOverReason, GameOverReport, GameStatus, GameView,
    MoveOutcome, PlayerPresence, PlayerToken, PlayersView, Scores, TokenPair,
};
