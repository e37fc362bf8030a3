pub mod database;
pub mod error;
pub mod games;
pub mod schema;

pub use database::Database;
pub use error::StoreError;
pub use games::{GameRepo, GameSnapshot, MoveRecord, PlayerSnapshot, CellSnapshot};
