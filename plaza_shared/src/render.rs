//! Rendering abstraction.
//!
//! This crate intentionally does not depend on a graphics backend.
//! The client drives a scene through [`SceneBackend`]; a real engine binding
//! would satisfy it, and [`HeadlessScene`] does for tests and terminal runs.

use std::collections::BTreeMap;

use tracing::debug;

use crate::math::{Color3, Vec3};

/// Opaque handle to a mesh owned by the scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MeshHandle(pub u64);

/// Overlay text shown on top of the scene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HudInfo {
    pub title: String,
    pub instructions: String,
    pub back_label: String,
}

impl HudInfo {
    pub fn new(room_name: &str, session_id: &str) -> Self {
        Self {
            title: format!("Room name: {room_name}      Player: {session_id}").to_uppercase(),
            instructions: "CLICK ANYWHERE ON THE GROUND!".to_string(),
            back_label: "<- BACK".to_string(),
        }
    }
}

/// The scene operations the client needs from a rendering engine.
pub trait SceneBackend: Send {
    /// Creates the playable ground plane of edge `size` at height `level`.
    fn create_ground(&mut self, size: f32, level: f32);
    fn show_hud(&mut self, hud: &HudInfo);
    fn create_avatar(&mut self, name: &str, color: Color3, position: Vec3) -> MeshHandle;
    fn set_position(&mut self, mesh: MeshHandle, position: Vec3);
    /// Releases one mesh. Unknown handles are ignored.
    fn dispose_mesh(&mut self, mesh: MeshHandle);
    fn render(&mut self);
    fn resize(&mut self, width: u32, height: u32);
    /// Releases every resource held by the scene.
    fn dispose(&mut self);
}

/// A mesh as tracked by [`HeadlessScene`].
#[derive(Debug, Clone, PartialEq)]
pub struct HeadlessMesh {
    pub name: String,
    pub color: Color3,
    pub position: Vec3,
}

/// In-memory scene useful for headless runs and tests.
#[derive(Debug, Default)]
pub struct HeadlessScene {
    next_id: u64,
    meshes: BTreeMap<MeshHandle, HeadlessMesh>,
    pub ground: Option<(f32, f32)>,
    pub hud: Option<HudInfo>,
    pub viewport: (u32, u32),
    pub frames_rendered: u64,
    pub disposed: bool,
}

impl HeadlessScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mesh(&self, handle: MeshHandle) -> Option<&HeadlessMesh> {
        self.meshes.get(&handle)
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    pub fn meshes(&self) -> impl Iterator<Item = (MeshHandle, &HeadlessMesh)> {
        self.meshes.iter().map(|(h, m)| (*h, m))
    }
}

impl SceneBackend for HeadlessScene {
    fn create_ground(&mut self, size: f32, level: f32) {
        self.ground = Some((size, level));
    }

    fn show_hud(&mut self, hud: &HudInfo) {
        debug!(title = %hud.title, "HUD shown");
        self.hud = Some(hud.clone());
    }

    fn create_avatar(&mut self, name: &str, color: Color3, position: Vec3) -> MeshHandle {
        let handle = MeshHandle(self.next_id);
        self.next_id += 1;
        self.meshes.insert(
            handle,
            HeadlessMesh {
                name: name.to_string(),
                color,
                position,
            },
        );
        handle
    }

    fn set_position(&mut self, mesh: MeshHandle, position: Vec3) {
        if let Some(m) = self.meshes.get_mut(&mesh) {
            m.position = position;
        }
    }

    fn dispose_mesh(&mut self, mesh: MeshHandle) {
        self.meshes.remove(&mesh);
    }

    fn render(&mut self) {
        self.frames_rendered += 1;
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
    }

    fn dispose(&mut self) {
        self.meshes.clear();
        self.ground = None;
        self.hud = None;
        self.disposed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hud_title_is_upper_cased() {
        let hud = HudInfo::new("my_room", "aBc123xYz");
        assert_eq!(hud.title, "ROOM NAME: MY_ROOM      PLAYER: ABC123XYZ");
    }

    #[test]
    fn headless_scene_tracks_meshes() {
        let mut scene = HeadlessScene::new();
        let a = scene.create_avatar("player-a", Color3::gray(), Vec3::ZERO);
        let b = scene.create_avatar("player-b", Color3::gray(), Vec3::ZERO);
        assert_ne!(a, b);
        scene.set_position(a, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(scene.mesh(a).unwrap().position, Vec3::new(1.0, 2.0, 3.0));
        scene.dispose_mesh(a);
        scene.dispose_mesh(a);
        assert_eq!(scene.mesh_count(), 1);
        scene.dispose();
        assert_eq!(scene.mesh_count(), 0);
        assert!(scene.disposed);
    }
}
