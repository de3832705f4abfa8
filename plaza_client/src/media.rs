//! Media bridge.
//!
//! Joins a conferencing room alongside the game room and routes remote
//! audio/video tracks to playback elements:
//! - On connect, fetch a session-scoped grant, connect, publish camera + mic
//! - On track subscribed (audio or video), attach it to a new element
//! - On track unsubscribed, detach it from every element it was attached to
//! - On disconnect, log; there is no retry
//!
//! The conferencing SDK and the page are reached through [`MediaTransport`]
//! and [`PlaybackSurface`]; credentials through [`TokenProvider`].

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use plaza_shared::grant::MediaGrant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
    Data,
}

impl TrackKind {
    /// Whether the track can be played back in an element.
    pub fn is_playable(self) -> bool {
        matches!(self, TrackKind::Audio | TrackKind::Video)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TrackSid(pub String);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ParticipantId(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTrack {
    pub sid: TrackSid,
    pub kind: TrackKind,
}

/// A page element playing one track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlaybackElement {
    pub id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaEvent {
    TrackSubscribed {
        participant: ParticipantId,
        track: RemoteTrack,
    },
    TrackUnsubscribed {
        participant: ParticipantId,
        track: RemoteTrack,
    },
    LocalTrackUnpublished {
        track: TrackSid,
    },
    Disconnected {
        reason: Option<String>,
    },
}

/// Source of conferencing credentials.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn fetch_grant(&self) -> anyhow::Result<MediaGrant>;
}

/// The conferencing SDK operations the bridge needs.
#[async_trait]
pub trait MediaTransport: Send {
    async fn connect(&mut self, url: &str, token: &str) -> anyhow::Result<()>;
    async fn enable_camera_and_microphone(&mut self) -> anyhow::Result<()>;
    /// Conference room name once connected.
    fn room_name(&self) -> Option<&str>;
    /// Next queued event. Never blocks.
    fn poll_event(&mut self) -> Option<MediaEvent>;
    async fn disconnect(&mut self);
}

/// Where playback elements live.
pub trait PlaybackSurface: Send {
    /// Creates a new element playing `track`.
    fn attach(&mut self, track: &RemoteTrack) -> PlaybackElement;
    /// Makes the element part of the page.
    fn append(&mut self, element: PlaybackElement);
    /// Detaches `track` from every element it plays in; returns those elements.
    fn detach(&mut self, track: &RemoteTrack) -> Vec<PlaybackElement>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaState {
    Idle,
    Connected,
    Disconnected,
}

pub struct MediaBridge<T, P> {
    transport: T,
    surface: P,
    url: String,
    state: MediaState,
    subscribed: BTreeSet<TrackSid>,
}

impl<T: MediaTransport, P: PlaybackSurface> MediaBridge<T, P> {
    pub fn new(transport: T, surface: P, url: impl Into<String>) -> Self {
        Self {
            transport,
            surface,
            url: url.into(),
            state: MediaState::Idle,
            subscribed: BTreeSet::new(),
        }
    }

    pub fn state(&self) -> MediaState {
        self.state
    }

    pub fn surface(&self) -> &P {
        &self.surface
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Number of remote tracks currently attached.
    pub fn attached_tracks(&self) -> usize {
        self.subscribed.len()
    }

    /// Fetches a grant, connects, and publishes the local camera and mic.
    ///
    /// Failures are returned as-is; nothing is retried.
    pub async fn connect(&mut self, tokens: &dyn TokenProvider) -> anyhow::Result<()> {
        let grant = tokens.fetch_grant().await.context("fetch media grant")?;
        if grant.is_expired_at(Utc::now()) {
            anyhow::bail!("media grant for {} already expired", grant.room);
        }

        self.transport
            .connect(&self.url, &grant.token)
            .await
            .with_context(|| format!("connect to media endpoint {}", self.url))?;
        info!(
            room = self.transport.room_name().unwrap_or(&grant.room),
            "Connected to media room"
        );

        self.transport
            .enable_camera_and_microphone()
            .await
            .context("publish camera and microphone")?;
        self.state = MediaState::Connected;
        Ok(())
    }

    /// Handles every queued media event. Returns how many were handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.transport.poll_event() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    pub fn handle_event(&mut self, event: MediaEvent) {
        match event {
            MediaEvent::TrackSubscribed { participant, track } => {
                if !track.kind.is_playable() {
                    debug!(track = ?track.sid, kind = ?track.kind, "Non-media track ignored");
                    return;
                }
                if !self.subscribed.insert(track.sid.clone()) {
                    warn!(track = ?track.sid, "Track already attached");
                    return;
                }
                let element = self.surface.attach(&track);
                self.surface.append(element);
                debug!(participant = ?participant, track = ?track.sid, element = element.id, "Track attached");
            }
            MediaEvent::TrackUnsubscribed { participant, track } => {
                self.subscribed.remove(&track.sid);
                let detached = self.surface.detach(&track);
                debug!(participant = ?participant, track = ?track.sid, elements = detached.len(), "Track detached");
            }
            MediaEvent::LocalTrackUnpublished { track } => {
                debug!(track = ?track, "Local track unpublished");
            }
            MediaEvent::Disconnected { reason } => {
                self.state = MediaState::Disconnected;
                info!(reason = ?reason, "Disconnected from media room");
            }
        }
    }

    pub async fn disconnect(&mut self) {
        if self.state == MediaState::Connected {
            self.transport.disconnect().await;
            self.state = MediaState::Disconnected;
        }
    }
}

/// Transport for builds without a conferencing backend.
///
/// Connecting succeeds and nothing is ever received.
#[derive(Debug, Default)]
pub struct NullMediaTransport {
    connected_to: Option<String>,
}

#[async_trait]
impl MediaTransport for NullMediaTransport {
    async fn connect(&mut self, url: &str, _token: &str) -> anyhow::Result<()> {
        warn!(url, "No conferencing backend compiled in; media is silent");
        self.connected_to = Some(url.to_string());
        Ok(())
    }

    async fn enable_camera_and_microphone(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn room_name(&self) -> Option<&str> {
        None
    }

    fn poll_event(&mut self) -> Option<MediaEvent> {
        None
    }

    async fn disconnect(&mut self) {
        self.connected_to = None;
    }
}

/// One element tracked by [`HeadlessSurface`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadlessElement {
    pub track: TrackSid,
    pub kind: TrackKind,
    pub attached: bool,
    pub appended: bool,
}

/// In-memory playback surface.
#[derive(Debug, Default)]
pub struct HeadlessSurface {
    next_id: u64,
    elements: BTreeMap<PlaybackElement, HeadlessElement>,
}

impl HeadlessSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn element(&self, element: PlaybackElement) -> Option<&HeadlessElement> {
        self.elements.get(&element)
    }

    pub fn elements(&self) -> impl Iterator<Item = (PlaybackElement, &HeadlessElement)> {
        self.elements.iter().map(|(k, v)| (*k, v))
    }

    /// Elements on the page that still play something.
    pub fn playing(&self) -> usize {
        self.elements
            .values()
            .filter(|e| e.attached && e.appended)
            .count()
    }
}

impl PlaybackSurface for HeadlessSurface {
    fn attach(&mut self, track: &RemoteTrack) -> PlaybackElement {
        let element = PlaybackElement { id: self.next_id };
        self.next_id += 1;
        self.elements.insert(
            element,
            HeadlessElement {
                track: track.sid.clone(),
                kind: track.kind,
                attached: true,
                appended: false,
            },
        );
        element
    }

    fn append(&mut self, element: PlaybackElement) {
        if let Some(e) = self.elements.get_mut(&element) {
            e.appended = true;
        }
    }

    fn detach(&mut self, track: &RemoteTrack) -> Vec<PlaybackElement> {
        let mut detached = Vec::new();
        for (element, e) in self.elements.iter_mut() {
            if e.track == track.sid && e.attached {
                e.attached = false;
                detached.push(*element);
            }
        }
        detached
    }
}
