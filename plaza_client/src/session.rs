//! Session lifecycle.
//!
//! Two phases: the client is either in a room session or back at the menu.
//! Entering a session happens in the menu flow before a [`crate::Game`] exists;
//! this module only handles the way out, which is terminal for the session.

use plaza_shared::render::SceneBackend;
use tracing::{debug, info};

use crate::{registry::RemoteEntityRegistry, room::RoomConnection};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    InSession,
    AtMenu,
}

/// Fresh state handed to the menu flow after a session ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuContext {
    /// Leave code reported by the room, kept for display only.
    pub leave_code: u16,
}

#[derive(Debug)]
pub struct SessionLifecycle {
    phase: SessionPhase,
    menu: Option<MenuContext>,
}

impl Default for SessionLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionLifecycle {
    pub fn new() -> Self {
        Self {
            phase: SessionPhase::InSession,
            menu: None,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_in_session(&self) -> bool {
        self.phase == SessionPhase::InSession
    }

    pub fn menu(&self) -> Option<&MenuContext> {
        self.menu.as_ref()
    }

    /// Tears the session down after the room reports a leave.
    ///
    /// Room listeners are released first so nothing can reach the registry or
    /// scene once they are gone. A second leave is ignored.
    pub fn on_leave(
        &mut self,
        code: u16,
        registry: &mut RemoteEntityRegistry,
        scene: &mut dyn SceneBackend,
        room: &mut dyn RoomConnection,
    ) -> Option<&MenuContext> {
        if self.phase == SessionPhase::AtMenu {
            debug!(code, "Leave while at menu ignored");
            return None;
        }

        room.close();
        registry.clear();
        scene.dispose();

        self.phase = SessionPhase::AtMenu;
        self.menu = Some(MenuContext { leave_code: code });
        info!(code, room = %room.room_name(), "Left room, back at menu");
        self.menu.as_ref()
    }
}
