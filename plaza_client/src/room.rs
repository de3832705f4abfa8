//! Room connection.
//!
//! The client maintains one reliable control stream to the room server:
//! - A join handshake (`JoinRoom` -> `Joined`)
//! - A reader task turning replicated player events into [`RoomEvent`]s
//! - A writer task draining outbound commands
//!
//! Game code only sees the [`RoomConnection`] trait, so it can be driven by a
//! scripted room in tests.

use std::{collections::VecDeque, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use plaza_shared::{
    config::ClientConfig,
    grant::MediaGrant,
    net::{
        FrameReader, FrameWriter, NetMsg, PlayerState, PositionPayload, ReliableConn, SessionId,
        CLOSE_ABNORMAL, PROTOCOL_VERSION,
    },
};
use tokio::{
    sync::{mpsc, oneshot, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::media::TokenProvider;

/// How long to wait for the server to answer a media grant request.
pub const GRANT_TIMEOUT: Duration = Duration::from_secs(5);

/// Inbound room notification.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    PlayerAdded {
        session_id: SessionId,
        player: PlayerState,
    },
    PlayerChanged {
        session_id: SessionId,
        player: PlayerState,
    },
    PlayerRemoved {
        session_id: SessionId,
    },
    /// The local client is no longer in the room. `code` is not interpreted.
    Left {
        code: u16,
    },
}

/// The state-sync operations the game needs from a room.
pub trait RoomConnection: Send {
    fn room_name(&self) -> &str;
    fn session_id(&self) -> &SessionId;
    /// Next inbound event, if one is queued. Never blocks.
    fn poll_event(&mut self) -> Option<RoomEvent>;
    /// Queues a named command. Never blocks.
    fn send(&mut self, command: &str, payload: PositionPayload) -> anyhow::Result<()>;
    /// Asks to leave; the room answers with [`RoomEvent::Left`].
    fn leave(&mut self, consented: bool) -> anyhow::Result<()>;
    /// Stops delivering events. Queued and future events are dropped.
    fn close(&mut self);
}

/// Waiters for media grants, oldest first. The server answers requests in
/// order and every grant for a session is interchangeable.
type PendingGrant = Arc<Mutex<VecDeque<oneshot::Sender<MediaGrant>>>>;

/// TCP-backed room membership.
pub struct RoomClient {
    room_name: String,
    session_id: SessionId,
    events: mpsc::UnboundedReceiver<RoomEvent>,
    outbound: mpsc::UnboundedSender<NetMsg>,
    pending_grant: PendingGrant,
    reader: JoinHandle<()>,
    closed: bool,
}

impl RoomClient {
    /// Connects to the room server and joins the configured room.
    pub async fn join(cfg: &ClientConfig) -> anyhow::Result<Self> {
        let server_addr: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;
        info!(server = %server_addr, room = %cfg.room_name, "Joining room");

        let mut conn = ReliableConn::connect(server_addr).await?;
        conn.send(&NetMsg::JoinRoom {
            protocol: PROTOCOL_VERSION,
            room: cfg.room_name.clone(),
            name: cfg.player_name.clone(),
        })
        .await?;

        let (room_name, session_id) = match conn.recv().await.context("await join reply")? {
            NetMsg::Joined { room, session_id } => (room, session_id),
            NetMsg::JoinRejected { reason } => anyhow::bail!("join rejected: {reason}"),
            other => anyhow::bail!("expected Joined, got {other:?}"),
        };
        info!(room = %room_name, session_id = %session_id, "Joined room");

        let (reader, writer) = conn.into_split();
        let (events_tx, events) = mpsc::unbounded_channel();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let pending_grant = PendingGrant::default();

        let reader = tokio::spawn(read_loop(reader, events_tx, pending_grant.clone()));
        tokio::spawn(write_loop(writer, outbound_rx));

        Ok(Self {
            room_name,
            session_id,
            events,
            outbound,
            pending_grant,
            reader,
            closed: false,
        })
    }

    /// A handle that fetches conferencing grants over this room session.
    pub fn grant_requester(&self) -> GrantRequester {
        GrantRequester {
            outbound: self.outbound.clone(),
            pending: self.pending_grant.clone(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn enqueue(&self, msg: NetMsg) -> anyhow::Result<()> {
        if self.closed {
            anyhow::bail!("room connection closed");
        }
        self.outbound
            .send(msg)
            .map_err(|_| anyhow!("room connection closed"))
    }
}

impl RoomConnection for RoomClient {
    fn room_name(&self) -> &str {
        &self.room_name
    }

    fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    fn poll_event(&mut self) -> Option<RoomEvent> {
        if self.closed {
            return None;
        }
        self.events.try_recv().ok()
    }

    fn send(&mut self, command: &str, payload: PositionPayload) -> anyhow::Result<()> {
        self.enqueue(NetMsg::Command {
            name: command.to_string(),
            payload,
        })
    }

    fn leave(&mut self, consented: bool) -> anyhow::Result<()> {
        self.enqueue(NetMsg::Leave { consented })
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.reader.abort();
        self.events.close();
        while self.events.try_recv().is_ok() {}
        debug!(session_id = %self.session_id, "Room listeners released");
    }
}

impl Drop for RoomClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop(
    mut reader: FrameReader,
    events: mpsc::UnboundedSender<RoomEvent>,
    pending_grant: PendingGrant,
) {
    loop {
        let event = match reader.recv().await {
            Ok(NetMsg::PlayerAdded { session_id, player }) => {
                RoomEvent::PlayerAdded { session_id, player }
            }
            Ok(NetMsg::PlayerChanged { session_id, player }) => {
                RoomEvent::PlayerChanged { session_id, player }
            }
            Ok(NetMsg::PlayerRemoved { session_id }) => RoomEvent::PlayerRemoved { session_id },
            Ok(NetMsg::MediaGrant(grant)) => {
                deliver_grant(&mut *pending_grant.lock().await, grant);
                continue;
            }
            Ok(NetMsg::Left { code }) => {
                let _ = events.send(RoomEvent::Left { code });
                return;
            }
            Ok(other) => {
                debug!(?other, "Unhandled room message");
                continue;
            }
            Err(e) => {
                warn!(error = %e, "Room connection lost");
                let _ = events.send(RoomEvent::Left {
                    code: CLOSE_ABNORMAL,
                });
                return;
            }
        };
        if events.send(event).is_err() {
            return;
        }
    }
}

/// Hands `grant` to the oldest waiter still listening. Waiters that gave up
/// are discarded on the way.
fn deliver_grant(pending: &mut VecDeque<oneshot::Sender<MediaGrant>>, mut grant: MediaGrant) {
    while let Some(tx) = pending.pop_front() {
        match tx.send(grant) {
            Ok(()) => return,
            Err(unclaimed) => grant = unclaimed,
        }
    }
    debug!("Unrequested media grant dropped");
}

async fn write_loop(mut writer: FrameWriter, mut outbound: mpsc::UnboundedReceiver<NetMsg>) {
    while let Some(msg) = outbound.recv().await {
        if let Err(e) = writer.send(&msg).await {
            warn!(error = %e, "Room write failed");
            return;
        }
    }
    let _ = writer.shutdown().await;
}

/// Requests media grants over an existing room session.
#[derive(Clone)]
pub struct GrantRequester {
    outbound: mpsc::UnboundedSender<NetMsg>,
    pending: PendingGrant,
}

#[async_trait]
impl TokenProvider for GrantRequester {
    async fn fetch_grant(&self) -> anyhow::Result<MediaGrant> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.push_back(tx);
        self.outbound
            .send(NetMsg::RequestMediaGrant)
            .map_err(|_| anyhow!("room connection closed"))?;
        let grant = tokio::time::timeout(GRANT_TIMEOUT, rx)
            .await
            .context("media grant timed out")?
            .context("room closed before media grant arrived")?;
        debug!(room = %grant.room, expires_at = %grant.expires_at, "Media grant received");
        Ok(grant)
    }
}


#[cfg(test)]
pub(crate) mod testing {
    //! Scripted room for driving game code without sockets.

    use std::collections::VecDeque;

    use super::*;

    #[derive(Debug, Default)]
    pub struct ScriptedRoom {
        pub room_name: String,
        pub session_id: SessionId,
        pub inbound: VecDeque<RoomEvent>,
        pub sent: Vec<(String, PositionPayload)>,
        pub leave_requests: Vec<bool>,
        pub closed: bool,
    }

    impl ScriptedRoom {
        pub fn new(room_name: &str, session_id: &str) -> Self {
            Self {
                room_name: room_name.to_string(),
                session_id: SessionId::new(session_id),
                ..Default::default()
            }
        }

        pub fn push(&mut self, event: RoomEvent) {
            self.inbound.push_back(event);
        }
    }

    impl RoomConnection for ScriptedRoom {
        fn room_name(&self) -> &str {
            &self.room_name
        }

        fn session_id(&self) -> &SessionId {
            &self.session_id
        }

        fn poll_event(&mut self) -> Option<RoomEvent> {
            if self.closed {
                return None;
            }
            self.inbound.pop_front()
        }

        fn send(&mut self, command: &str, payload: PositionPayload) -> anyhow::Result<()> {
            anyhow::ensure!(!self.closed, "room connection closed");
            self.sent.push((command.to_string(), payload));
            Ok(())
        }

        fn leave(&mut self, consented: bool) -> anyhow::Result<()> {
            self.leave_requests.push(consented);
            Ok(())
        }

        fn close(&mut self) {
            self.closed = true;
            self.inbound.clear();
        }
    }
}
