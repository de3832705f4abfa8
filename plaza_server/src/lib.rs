//! `plaza_server`
//!
//! Development room server:
//! - Join handshake and session ids
//! - Player collection replication
//! - `updatePosition` commands
//! - Media grant issuance
//!
//! Networking model:
//! - TCP with length-prefixed JSON frames, one stream per member

pub mod server;

pub use server::RoomServer;
