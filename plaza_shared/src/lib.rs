//! `plaza_shared`
//!
//! Shared libraries used by both the plaza client and the room server.
//!
//! Design goals:
//! - Keep the wire format explicit and versionable.
//! - Traits at the collaborator seams (rendering) so the client runs headless.
//! - No `unsafe`.

pub mod config;
pub mod grant;
pub mod math;
pub mod net;
pub mod render;
