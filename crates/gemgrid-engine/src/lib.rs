pub mod board;
pub mod error;
pub mod registry;
pub mod session;
pub mod state;
pub mod view;

pub use board::Board;
pub use error::GameError;
pub use registry::{CreatedGame, GameRegistry, JoinApplied, MoveApplied};
pub use session::{GameSession, OpenCellOutcome};
pub use state::GameState;
pub use view::project;
