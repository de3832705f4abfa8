//! Input handling.
//!
//! Turns a pointer-down over the ground into a move: the picked point is
//! pinned to avatar height, clamped inside the playable ground, applied
//! locally as the player's own target, and sent to the room as an
//! `updatePosition` command. Every qualifying click sends; there is no debounce.

use plaza_shared::{
    config::GroundConfig,
    math::Vec3,
    net::{PositionPayload, UPDATE_POSITION},
};
use tracing::debug;

use crate::{registry::RemoteEntityRegistry, room::RoomConnection};

/// Button index of the primary (usually left) mouse button.
pub const PRIMARY_BUTTON: u8 = 0;

/// A pointer-down as reported by the scene's picking.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub button: u8,
    /// World point under the cursor, if anything pickable was hit.
    pub picked_point: Option<Vec3>,
}

impl PointerEvent {
    pub fn primary(picked_point: Option<Vec3>) -> Self {
        Self {
            button: PRIMARY_BUTTON,
            picked_point,
        }
    }
}

/// An outbound command ready for the room.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveCommand {
    pub name: &'static str,
    pub payload: PositionPayload,
}

/// Builds the `updatePosition` command for a clamped target.
pub fn build_command(target: Vec3) -> MoveCommand {
    MoveCommand {
        name: UPDATE_POSITION,
        payload: target,
    }
}

/// Pointer-to-command translator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputTranslator {
    bound: f32,
    level: f32,
}

impl InputTranslator {
    pub fn new(bound: f32, level: f32) -> Self {
        Self {
            bound: bound.abs(),
            level,
        }
    }

    pub fn from_ground(ground: &GroundConfig) -> Self {
        Self::new(ground.clamp_bound(), ground.avatar_level)
    }

    pub fn bound(&self) -> f32 {
        self.bound
    }

    /// Pins `point` to avatar height and clamps x/z to `[-bound, bound]`.
    pub fn clamp(&self, point: Vec3) -> Vec3 {
        Vec3::new(
            point.x.clamp(-self.bound, self.bound),
            self.level,
            point.z.clamp(-self.bound, self.bound),
        )
    }

    /// The move a pointer event asks for, if any.
    pub fn translate(&self, event: &PointerEvent) -> Option<MoveCommand> {
        if event.button != PRIMARY_BUTTON {
            return None;
        }
        let Some(point) = event.picked_point else {
            debug!("Pointer down without a picked point ignored");
            return None;
        };
        if !point.x.is_finite() || !point.z.is_finite() {
            debug!(?point, "Pointer down on a non-finite point ignored");
            return None;
        }
        Some(build_command(self.clamp(point)))
    }

    /// Handles a pointer-down: predicts the local target, then sends.
    pub fn on_pointer_down(
        &self,
        event: &PointerEvent,
        registry: &mut RemoteEntityRegistry,
        room: &mut dyn RoomConnection,
    ) -> anyhow::Result<Option<MoveCommand>> {
        let Some(cmd) = self.translate(event) else {
            return Ok(None);
        };

        let local = registry.local_session().clone();
        registry.set_target(&local, cmd.payload);
        room.send(cmd.name, cmd.payload)?;

        debug!(to = ?cmd.payload, "Move sent");
        Ok(Some(cmd))
    }
}
