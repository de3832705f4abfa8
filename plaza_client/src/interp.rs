//! Interpolation.
//!
//! The room pushes discrete position updates. The client renders at its own
//! rate and, once per frame, moves every avatar a fixed fraction of the way
//! towards its latest target. This is exponential smoothing: motion stays
//! continuous, a newer target simply redirects it, and the avatar approaches
//! a static target without ever overshooting it.

use plaza_shared::render::SceneBackend;

use crate::registry::RemoteEntityRegistry;

/// Per-frame position smoothing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionReconciler {
    blend_factor: f32,
}

impl PositionReconciler {
    /// `blend_factor` is the fraction of remaining distance closed per frame
    /// and must lie in `(0, 1]`.
    pub fn new(blend_factor: f32) -> anyhow::Result<Self> {
        anyhow::ensure!(
            blend_factor > 0.0 && blend_factor <= 1.0,
            "blend factor must be in (0, 1], got {blend_factor}"
        );
        Ok(Self { blend_factor })
    }

    pub fn blend_factor(&self) -> f32 {
        self.blend_factor
    }

    /// Blends every tracked avatar towards its target and pushes the result
    /// to the scene. Returns the number of avatars visited.
    pub fn reconcile(
        &self,
        registry: &mut RemoteEntityRegistry,
        scene: &mut dyn SceneBackend,
    ) -> usize {
        let mut visited = 0;
        for (_, avatar, target) in registry.tracked_mut() {
            avatar.position = avatar.position.lerp(target, self.blend_factor);
            scene.set_position(avatar.mesh, avatar.position);
            visited += 1;
        }
        visited
    }
}
