//! `plaza_client`
//!
//! Client-side systems:
//! - Room connection (join handshake, inbound events, outbound commands)
//! - Remote entity registry (one avatar + one pending target per player)
//! - Per-frame position smoothing
//! - Click-to-move input with local prediction
//! - Session lifecycle (back to menu on leave)
//! - Media bridge for the conferencing session

pub mod console;
pub mod game;
pub mod input;
pub mod interp;
pub mod media;
pub mod registry;
pub mod room;
pub mod session;

pub use game::Game;
pub use room::RoomClient;
