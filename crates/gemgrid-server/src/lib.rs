//! WebSocket + HTTP transport for the game engine: RPC dispatch, client
//! tracking and per-viewer view pushes.

pub mod client;
pub mod handlers;
pub mod push;
pub mod rpc;
pub mod server;
pub mod validation;

pub use server::{build_router, start, AppState, ServerConfig, ServerHandle};
