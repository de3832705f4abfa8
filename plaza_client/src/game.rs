//! Game wiring.
//!
//! `Game` owns one room session and the scene drawn for it. It routes room
//! events into the registry, runs the reconciler once per frame before
//! drawing, turns clicks into moves, and hands control back to the menu when
//! the room reports a leave. Everything runs on the caller's thread.

use plaza_shared::{
    config::{ClientConfig, GroundConfig},
    render::{HudInfo, SceneBackend},
};
use tracing::{debug, warn};

use crate::{
    input::{InputTranslator, MoveCommand, PointerEvent},
    interp::PositionReconciler,
    registry::RemoteEntityRegistry,
    room::{RoomConnection, RoomEvent},
    session::{MenuContext, SessionLifecycle, SessionPhase},
};

pub struct Game<S, R> {
    scene: S,
    room: R,
    registry: RemoteEntityRegistry,
    reconciler: PositionReconciler,
    input: InputTranslator,
    lifecycle: SessionLifecycle,
    ground: GroundConfig,
}

impl<S: SceneBackend, R: RoomConnection> Game<S, R> {
    pub fn new(scene: S, room: R, cfg: &ClientConfig) -> anyhow::Result<Self> {
        cfg.validate()?;
        let registry = RemoteEntityRegistry::new(room.session_id().clone(), cfg.highlight()?);
        Ok(Self {
            scene,
            room,
            registry,
            reconciler: PositionReconciler::new(cfg.blend_factor)?,
            input: InputTranslator::from_ground(&cfg.ground),
            lifecycle: SessionLifecycle::new(),
            ground: cfg.ground,
        })
    }

    /// Builds the static scene: ground plane and overlay.
    pub fn bootstrap(&mut self) {
        self.scene
            .create_ground(self.ground.size, self.ground.plane_level);
        self.scene.show_hud(&HudInfo::new(
            self.room.room_name(),
            self.room.session_id().as_str(),
        ));
    }

    pub fn handle_room_event(&mut self, event: RoomEvent) {
        if !self.lifecycle.is_in_session() {
            debug!(?event, "Room event after leave dropped");
            return;
        }
        match event {
            RoomEvent::PlayerAdded { session_id, player } => {
                if let Err(e) =
                    self.registry
                        .on_player_added(&mut self.scene, &session_id, player.position())
                {
                    warn!(error = %e, "Player add ignored");
                }
            }
            RoomEvent::PlayerChanged { session_id, player } => {
                self.registry
                    .on_player_changed(&session_id, player.position());
            }
            RoomEvent::PlayerRemoved { session_id } => {
                self.registry.on_player_removed(&mut self.scene, &session_id);
            }
            RoomEvent::Left { code } => {
                self.lifecycle.on_leave(
                    code,
                    &mut self.registry,
                    &mut self.scene,
                    &mut self.room,
                );
            }
        }
    }

    /// Applies every queued room event. Returns how many were applied.
    pub fn pump_room_events(&mut self) -> usize {
        let mut applied = 0;
        while self.lifecycle.is_in_session() {
            let Some(event) = self.room.poll_event() else {
                break;
            };
            self.handle_room_event(event);
            applied += 1;
        }
        applied
    }

    /// One rendered frame: apply room events, smooth, draw.
    ///
    /// Returns `false` once the session has ended; no work is done then.
    pub fn frame(&mut self) -> bool {
        self.pump_room_events();
        if !self.lifecycle.is_in_session() {
            return false;
        }
        self.reconciler.reconcile(&mut self.registry, &mut self.scene);
        self.scene.render();
        true
    }

    pub fn on_pointer_down(&mut self, event: &PointerEvent) -> anyhow::Result<Option<MoveCommand>> {
        if !self.lifecycle.is_in_session() {
            return Ok(None);
        }
        self.input
            .on_pointer_down(event, &mut self.registry, &mut self.room)
    }

    /// The overlay's back button: a consented leave.
    pub fn press_back(&mut self) -> anyhow::Result<()> {
        if !self.lifecycle.is_in_session() {
            return Ok(());
        }
        self.room.leave(true)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.scene.resize(width, height);
    }

    pub fn phase(&self) -> SessionPhase {
        self.lifecycle.phase()
    }

    pub fn menu(&self) -> Option<&MenuContext> {
        self.lifecycle.menu()
    }

    pub fn registry(&self) -> &RemoteEntityRegistry {
        &self.registry
    }

    pub fn scene(&self) -> &S {
        &self.scene
    }

    pub fn room(&self) -> &R {
        &self.room
    }

    pub fn room_mut(&mut self) -> &mut R {
        &mut self.room
    }
}
