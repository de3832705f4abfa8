//! Configuration system.
//!
//! Loads client and server configuration from JSON strings (file IO left to app).

use anyhow::{ensure, Context};
use serde::{Deserialize, Serialize};

use crate::math::Color3;

/// Playable ground geometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroundConfig {
    /// Edge length of the rendered ground plane.
    #[serde(default = "default_ground_size")]
    pub size: f32,
    /// Distance kept between a move target and the ground edge.
    #[serde(default = "default_ground_margin")]
    pub margin: f32,
    /// Height every move target is forced to.
    #[serde(default = "default_avatar_level")]
    pub avatar_level: f32,
    /// Height of the rendered plane itself.
    #[serde(default = "default_plane_level")]
    pub plane_level: f32,
}

fn default_ground_size() -> f32 {
    500.0
}

fn default_ground_margin() -> f32 {
    5.0
}

fn default_avatar_level() -> f32 {
    -1.0
}

fn default_plane_level() -> f32 {
    -15.0
}

impl Default for GroundConfig {
    fn default() -> Self {
        Self {
            size: default_ground_size(),
            margin: default_ground_margin(),
            avatar_level: default_avatar_level(),
            plane_level: default_plane_level(),
        }
    }
}

impl GroundConfig {
    /// Largest absolute x/z a move target may have.
    pub fn clamp_bound(&self) -> f32 {
        self.size / 2.0 - self.margin
    }
}

/// Conferencing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Whether to join the conference alongside the room.
    #[serde(default = "default_media_enabled")]
    pub enabled: bool,
    /// Conferencing endpoint.
    #[serde(default = "default_media_url")]
    pub url: String,
}

fn default_media_enabled() -> bool {
    true
}

fn default_media_url() -> String {
    "ws://localhost:7800".to_string()
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            enabled: default_media_enabled(),
            url: default_media_url(),
        }
    }
}

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Room server address, e.g. `127.0.0.1:2567`.
    #[serde(default = "default_server_addr")]
    pub server_addr: String,
    /// Room to join.
    #[serde(default = "default_room_name")]
    pub room_name: String,
    #[serde(default = "default_player_name")]
    pub player_name: String,
    /// Render frames per second.
    #[serde(default = "default_frame_hz")]
    pub frame_hz: u32,
    /// Fraction of the remaining distance each avatar closes per frame.
    #[serde(default = "default_blend_factor")]
    pub blend_factor: f32,
    #[serde(default)]
    pub ground: GroundConfig,
    /// `#rrggbb` colour of the local player's avatar.
    #[serde(default = "default_highlight_color")]
    pub highlight_color: String,
    #[serde(default)]
    pub media: MediaConfig,
}

fn default_server_addr() -> String {
    "127.0.0.1:2567".to_string()
}

fn default_room_name() -> String {
    "my_room".to_string()
}

fn default_player_name() -> String {
    "Player".to_string()
}

fn default_frame_hz() -> u32 {
    60
}

fn default_blend_factor() -> f32 {
    0.05
}

fn default_highlight_color() -> String {
    "#ff9900".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: default_server_addr(),
            room_name: default_room_name(),
            player_name: default_player_name(),
            frame_hz: default_frame_hz(),
            blend_factor: default_blend_factor(),
            ground: GroundConfig::default(),
            highlight_color: default_highlight_color(),
            media: MediaConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// Checks values that would break smoothing, clamping or highlighting.
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.blend_factor > 0.0 && self.blend_factor <= 1.0,
            "blend_factor must be in (0, 1], got {}",
            self.blend_factor
        );
        ensure!(
            self.ground.clamp_bound() > 0.0,
            "ground margin {} leaves no playable area on a ground of size {}",
            self.ground.margin,
            self.ground.size
        );
        ensure!(self.frame_hz > 0, "frame_hz must be positive");
        self.highlight()?;
        Ok(())
    }

    /// Parsed highlight colour.
    pub fn highlight(&self) -> anyhow::Result<Color3> {
        Color3::from_hex(&self.highlight_color)
            .with_context(|| format!("parse highlight_color {:?}", self.highlight_color))
    }
}

/// Room server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address, e.g. `127.0.0.1:2567`.
    #[serde(default = "default_server_addr")]
    pub listen_addr: String,
    /// The single room this server hosts.
    #[serde(default = "default_room_name")]
    pub room_name: String,
    /// Appended to the room name to form the conference room name.
    #[serde(default = "default_media_room_suffix")]
    pub media_room_suffix: String,
    /// Lifetime of issued media grants.
    #[serde(default = "default_grant_ttl_secs")]
    pub grant_ttl_secs: u64,
    /// Players spawn within `[-spawn_extent, spawn_extent]` on x and z.
    #[serde(default = "default_spawn_extent")]
    pub spawn_extent: f32,
    /// Height players spawn at.
    #[serde(default = "default_avatar_level")]
    pub spawn_level: f32,
}

fn default_media_room_suffix() -> String {
    "-media".to_string()
}

fn default_grant_ttl_secs() -> u64 {
    3600
}

fn default_spawn_extent() -> f32 {
    200.0
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_server_addr(),
            room_name: default_room_name(),
            media_room_suffix: default_media_room_suffix(),
            grant_ttl_secs: default_grant_ttl_secs(),
            spawn_extent: default_spawn_extent(),
            spawn_level: default_avatar_level(),
        }
    }
}

impl ServerConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    pub fn media_room(&self) -> String {
        format!("{}{}", self.room_name, self.media_room_suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_yields_defaults() {
        let cfg = ClientConfig::from_json_str("{}").unwrap();
        assert_eq!(cfg, ClientConfig::default());
        assert_eq!(cfg.blend_factor, 0.05);
        assert_eq!(cfg.ground.clamp_bound(), 245.0);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_json_overrides() {
        let cfg = ClientConfig::from_json_str(
            r#"{"room_name":"lobby","ground":{"size":100.0},"media":{"enabled":false}}"#,
        )
        .unwrap();
        assert_eq!(cfg.room_name, "lobby");
        assert_eq!(cfg.ground.clamp_bound(), 45.0);
        assert_eq!(cfg.ground.avatar_level, -1.0);
        assert!(!cfg.media.enabled);
        assert_eq!(cfg.media.url, "ws://localhost:7800");
    }

    #[test]
    fn validate_rejects_bad_blend_factor() {
        let mut cfg = ClientConfig::default();
        cfg.blend_factor = 0.0;
        assert!(cfg.validate().is_err());
        cfg.blend_factor = 1.5;
        assert!(cfg.validate().is_err());
        cfg.blend_factor = 1.0;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_margin_swallowing_ground() {
        let mut cfg = ClientConfig::default();
        cfg.ground.margin = 250.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_highlight() {
        let mut cfg = ClientConfig::default();
        cfg.highlight_color = "orange".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn server_media_room_name() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.media_room(), "my_room-media");
    }
}
