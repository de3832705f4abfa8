//! Remote entity registry.
//!
//! Maps a room session id to the avatar rendered for it and to the pending
//! target the avatar is being smoothed towards. Inbound room events are the
//! only writers of targets (plus local click prediction); the reconciler is
//! the only reader.
//!
//! Invariant: every tracked id has exactly one avatar and one pending target.

use std::collections::BTreeMap;

use plaza_shared::{
    math::{Color3, Vec3},
    net::SessionId,
    render::{MeshHandle, SceneBackend},
};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("entity already tracked: {0}")]
    DuplicateEntity(SessionId),
}

/// Local renderable representation of a player.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Avatar {
    pub mesh: MeshHandle,
    /// Position currently drawn.
    pub position: Vec3,
    /// Whether this avatar was created for the local session.
    pub highlighted: bool,
}

/// Owned registry of avatars and their pending targets.
#[derive(Debug)]
pub struct RemoteEntityRegistry {
    local_session: SessionId,
    highlight: Color3,
    avatars: BTreeMap<SessionId, Avatar>,
    targets: BTreeMap<SessionId, Vec3>,
}

impl RemoteEntityRegistry {
    pub fn new(local_session: SessionId, highlight: Color3) -> Self {
        Self {
            local_session,
            highlight,
            avatars: BTreeMap::new(),
            targets: BTreeMap::new(),
        }
    }

    pub fn local_session(&self) -> &SessionId {
        &self.local_session
    }

    /// Creates the avatar for a joining player.
    ///
    /// The colour is decided once here: highlighted for the local session,
    /// neutral otherwise.
    pub fn on_player_added(
        &mut self,
        scene: &mut dyn SceneBackend,
        id: &SessionId,
        initial: Vec3,
    ) -> Result<MeshHandle, RegistryError> {
        if self.avatars.contains_key(id) {
            return Err(RegistryError::DuplicateEntity(id.clone()));
        }

        let highlighted = *id == self.local_session;
        let color = if highlighted {
            self.highlight
        } else {
            Color3::gray()
        };
        let mesh = scene.create_avatar(&format!("player-{id}"), color, initial);

        self.avatars.insert(
            id.clone(),
            Avatar {
                mesh,
                position: initial,
                highlighted,
            },
        );
        self.targets.insert(id.clone(), initial);

        debug!(session_id = %id, highlighted, ?initial, "Avatar created");
        Ok(mesh)
    }

    /// Overwrites the pending target of a tracked player.
    ///
    /// Returns `false` (and changes nothing) for ids without an avatar.
    pub fn on_player_changed(&mut self, id: &SessionId, position: Vec3) -> bool {
        match self.targets.get_mut(id) {
            Some(target) => {
                *target = position;
                true
            }
            None => {
                debug!(session_id = %id, "Change for untracked player ignored");
                false
            }
        }
    }

    /// Releases the avatar of a leaving player. Unknown ids are a no-op.
    pub fn on_player_removed(&mut self, scene: &mut dyn SceneBackend, id: &SessionId) -> bool {
        let Some(avatar) = self.avatars.remove(id) else {
            debug!(session_id = %id, "Remove for untracked player ignored");
            return false;
        };
        scene.dispose_mesh(avatar.mesh);
        self.targets.remove(id);
        debug!(session_id = %id, "Avatar removed");
        true
    }

    /// Sets a pending target directly (client-side prediction).
    pub fn set_target(&mut self, id: &SessionId, position: Vec3) -> bool {
        if !self.avatars.contains_key(id) {
            warn!(session_id = %id, "No avatar to predict for");
            return false;
        }
        self.targets.insert(id.clone(), position);
        true
    }

    pub fn avatar(&self, id: &SessionId) -> Option<&Avatar> {
        self.avatars.get(id)
    }

    pub fn target(&self, id: &SessionId) -> Option<Vec3> {
        self.targets.get(id).copied()
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.avatars.contains_key(id)
    }

    /// Number of tracked avatars.
    pub fn len(&self) -> usize {
        self.avatars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.avatars.is_empty()
    }

    /// Number of tracked pending targets.
    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    /// Avatars paired with their pending target, in id order.
    pub fn tracked_mut(&mut self) -> impl Iterator<Item = (&SessionId, &mut Avatar, Vec3)> {
        let targets = &self.targets;
        self.avatars
            .iter_mut()
            .filter_map(move |(id, avatar)| targets.get(id).map(|t| (id, avatar, *t)))
    }

    /// Forgets every entry without touching the scene.
    pub fn clear(&mut self) {
        self.avatars.clear();
        self.targets.clear();
    }
}

#[cfg(test)]
mod tests {
    use plaza_shared::render::HeadlessScene;

    use super::*;

    fn orange() -> Color3 {
        Color3::new(1.0, 0.6, 0.0)
    }

    fn registry() -> RemoteEntityRegistry {
        RemoteEntityRegistry::new(SessionId::new("me"), orange())
    }

    #[test]
    fn add_creates_avatar_and_target_at_initial_position() {
        let mut scene = HeadlessScene::new();
        let mut reg = registry();
        let p1 = SessionId::new("p1");

        let mesh = reg
            .on_player_added(&mut scene, &p1, Vec3::new(1.0, 2.0, 3.0))
            .unwrap();

        assert_eq!(reg.avatar(&p1).unwrap().position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(reg.target(&p1), Some(Vec3::new(1.0, 2.0, 3.0)));
        let m = scene.mesh(mesh).unwrap();
        assert_eq!(m.name, "player-p1");
        assert_eq!(m.color, Color3::gray());
    }

    #[test]
    fn local_player_is_highlighted() {
        let mut scene = HeadlessScene::new();
        let mut reg = registry();
        let me = SessionId::new("me");

        let mesh = reg.on_player_added(&mut scene, &me, Vec3::ZERO).unwrap();

        assert!(reg.avatar(&me).unwrap().highlighted);
        assert_eq!(scene.mesh(mesh).unwrap().color, orange());
    }

    #[test]
    fn duplicate_add_is_rejected_without_side_effects() {
        let mut scene = HeadlessScene::new();
        let mut reg = registry();
        let p1 = SessionId::new("p1");
        reg.on_player_added(&mut scene, &p1, Vec3::ZERO).unwrap();

        let err = reg
            .on_player_added(&mut scene, &p1, Vec3::new(5.0, 0.0, 0.0))
            .unwrap_err();

        assert_eq!(err, RegistryError::DuplicateEntity(p1.clone()));
        assert_eq!(scene.mesh_count(), 1);
        assert_eq!(reg.target(&p1), Some(Vec3::ZERO));
    }

    #[test]
    fn change_overwrites_target_last_write_wins() {
        let mut scene = HeadlessScene::new();
        let mut reg = registry();
        let p1 = SessionId::new("p1");
        reg.on_player_added(&mut scene, &p1, Vec3::ZERO).unwrap();

        assert!(reg.on_player_changed(&p1, Vec3::new(1.0, 0.0, 0.0)));
        assert!(reg.on_player_changed(&p1, Vec3::new(2.0, 0.0, 0.0)));

        assert_eq!(reg.target(&p1), Some(Vec3::new(2.0, 0.0, 0.0)));
        assert_eq!(reg.target_count(), 1);
    }

    #[test]
    fn change_for_unknown_player_does_not_create_target() {
        let mut reg = registry();
        assert!(!reg.on_player_changed(&SessionId::new("ghost"), Vec3::ZERO));
        assert_eq!(reg.target_count(), 0);
    }

    #[test]
    fn remove_releases_mesh_and_target() {
        let mut scene = HeadlessScene::new();
        let mut reg = registry();
        let p1 = SessionId::new("p1");
        reg.on_player_added(&mut scene, &p1, Vec3::ZERO).unwrap();

        assert!(reg.on_player_removed(&mut scene, &p1));

        assert!(reg.is_empty());
        assert_eq!(reg.target_count(), 0);
        assert_eq!(scene.mesh_count(), 0);
    }

    #[test]
    fn remove_unknown_is_noop() {
        let mut scene = HeadlessScene::new();
        let mut reg = registry();
        reg.on_player_added(&mut scene, &SessionId::new("p1"), Vec3::ZERO)
            .unwrap();

        assert!(!reg.on_player_removed(&mut scene, &SessionId::new("p2")));
        assert_eq!(reg.len(), 1);
        assert_eq!(scene.mesh_count(), 1);
    }

    #[test]
    fn counts_track_joined_players_through_churn() {
        let mut scene = HeadlessScene::new();
        let mut reg = registry();
        let mut joined = std::collections::BTreeSet::new();

        for round in 0..5u32 {
            for i in 0..8u32 {
                let id = SessionId::new(format!("p{i}"));
                if (i + round) % 3 == 0 {
                    reg.on_player_removed(&mut scene, &id);
                    joined.remove(&id);
                } else if !joined.contains(&id) {
                    reg.on_player_added(&mut scene, &id, Vec3::ZERO).unwrap();
                    joined.insert(id);
                }
                assert_eq!(reg.len(), joined.len());
                assert_eq!(reg.target_count(), joined.len());
                assert_eq!(scene.mesh_count(), joined.len());
            }
        }
    }

    #[test]
    fn prediction_needs_a_tracked_avatar() {
        let mut scene = HeadlessScene::new();
        let mut reg = registry();
        let me = SessionId::new("me");

        assert!(!reg.set_target(&me, Vec3::new(1.0, 0.0, 0.0)));
        assert_eq!(reg.target_count(), 0);

        reg.on_player_added(&mut scene, &me, Vec3::ZERO).unwrap();
        assert!(reg.set_target(&me, Vec3::new(1.0, 0.0, 0.0)));
        assert_eq!(reg.target(&me), Some(Vec3::new(1.0, 0.0, 0.0)));
    }
}
