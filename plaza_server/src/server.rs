//! Room server implementation.
//!
//! A single-room state server for development and integration tests. It
//! supports:
//! - Join handshake with session id allocation
//! - Replication of the player collection (add / change / remove)
//! - `updatePosition` commands
//! - Session-scoped media grants
//! - Consented and abrupt leaves
//!
//! Each connection runs its join handshake in its own task, then gets a
//! reader task feeding one inbox and a writer task draining its own outbox.
//! All room state is mutated by the owner of [`RoomServer`] only, in inbox
//! order, so a slow or silent peer never holds up the room.

use std::{
    collections::BTreeMap,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

use anyhow::Context;
use chrono::Utc;
use plaza_shared::{
    config::{ClientConfig, ServerConfig},
    grant::MediaGrant,
    math::Vec3,
    net::{
        decode_from_bytes, FrameReader, FrameWriter, NetMsg, PlayerState, ReliableConn,
        ReliableListener, SessionId, CLOSE_CONSENTED, CLOSE_SERVER, PROTOCOL_VERSION,
        UPDATE_POSITION,
    },
};
use rand::Rng;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// How long a new connection may take to send `JoinRoom`.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// A message read from a member's connection. `None` means the stream ended.
#[derive(Debug)]
struct Inbound {
    session_id: SessionId,
    msg: Option<NetMsg>,
}

/// A connection that passed the join handshake and waits to be admitted.
#[derive(Debug)]
struct Handshake {
    conn: ReliableConn,
    peer: SocketAddr,
    name: String,
}

/// Connected member state.
struct Member {
    name: String,
    outbox: mpsc::UnboundedSender<NetMsg>,
    player: PlayerState,
}

/// Room server.
pub struct RoomServer {
    pub cfg: ServerConfig,
    listener: ReliableListener,
    members: BTreeMap<SessionId, Member>,
    inbox_tx: mpsc::UnboundedSender<Inbound>,
    inbox: mpsc::UnboundedReceiver<Inbound>,
    joins_tx: mpsc::UnboundedSender<Handshake>,
    joins: mpsc::UnboundedReceiver<Handshake>,
}

impl RoomServer {
    /// Binds the listener from the config.
    pub async fn bind(cfg: ServerConfig) -> anyhow::Result<Self> {
        let addr: SocketAddr = cfg.listen_addr.parse().context("parse listen_addr")?;
        let listener = ReliableListener::bind(addr).await?;
        let (inbox_tx, inbox) = mpsc::unbounded_channel();
        let (joins_tx, joins) = mpsc::unbounded_channel();
        info!(addr = %listener.local_addr()?, room = %cfg.room_name, "Room server listening");
        Ok(Self {
            cfg,
            listener,
            members: BTreeMap::new(),
            inbox_tx,
            inbox,
            joins_tx,
            joins,
        })
    }

    /// Returns the local address (after binding).
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Replicated state of one member.
    pub fn player(&self, id: &SessionId) -> Option<PlayerState> {
        self.members.get(id).map(|m| m.player)
    }

    /// Accepts and admits exactly one client, handshaking inline.
    pub async fn accept_one(&mut self) -> anyhow::Result<SessionId> {
        let (conn, peer) = self.listener.accept().await?;
        let joined = handshake(conn, peer, self.cfg.room_name.clone()).await?;
        Ok(self.admit(joined))
    }

    /// Serves until the task is dropped.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((conn, peer)) => self.spawn_handshake(conn, peer),
                    Err(e) => warn!(error = %e, "Accept failed"),
                },
                Some(joined) = self.joins.recv() => {
                    self.admit(joined);
                }
                Some(inbound) = self.inbox.recv() => self.handle_inbound(inbound),
            }
        }
    }

    fn spawn_handshake(&self, conn: ReliableConn, peer: SocketAddr) {
        let room = self.cfg.room_name.clone();
        let joins = self.joins_tx.clone();
        tokio::spawn(async move {
            match handshake(conn, peer, room).await {
                Ok(joined) => {
                    let _ = joins.send(joined);
                }
                Err(e) => warn!(%peer, error = %e, "Join failed"),
            }
        });
    }

    /// Handles every inbound message already queued. Never blocks.
    pub fn step(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(inbound) = self.inbox.try_recv() {
            self.handle_inbound(inbound);
            handled += 1;
        }
        handled
    }

    /// Makes a handshaken connection a member. Never blocks: `Joined` and
    /// the current roster go through the new member's outbox.
    fn admit(&mut self, joined: Handshake) -> SessionId {
        let Handshake { conn, peer, name } = joined;
        let session_id = loop {
            let id = SessionId::random();
            if !self.members.contains_key(&id) {
                break id;
            }
        };
        let player = PlayerState::from(self.spawn_position());

        let (reader, writer) = conn.into_split();
        let (outbox, outbox_rx) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(writer, outbox_rx));
        tokio::spawn(read_loop(session_id.clone(), reader, self.inbox_tx.clone()));

        let _ = outbox.send(NetMsg::Joined {
            room: self.cfg.room_name.clone(),
            session_id: session_id.clone(),
        });
        // The newcomer first receives everyone already here.
        for (id, m) in &self.members {
            let _ = outbox.send(NetMsg::PlayerAdded {
                session_id: id.clone(),
                player: m.player,
            });
        }

        info!(session_id = %session_id, %peer, name = %name, "Player joined");
        self.members.insert(
            session_id.clone(),
            Member {
                name,
                outbox,
                player,
            },
        );
        self.broadcast(&NetMsg::PlayerAdded {
            session_id: session_id.clone(),
            player,
        });
        session_id
    }

    fn spawn_position(&self) -> Vec3 {
        let extent = self.cfg.spawn_extent.abs();
        let mut rng = rand::thread_rng();
        Vec3::new(
            rng.gen_range(-extent..=extent),
            self.cfg.spawn_level,
            rng.gen_range(-extent..=extent),
        )
    }

    fn handle_inbound(&mut self, inbound: Inbound) {
        let Inbound { session_id, msg } = inbound;
        if !self.members.contains_key(&session_id) {
            debug!(session_id = %session_id, "Message from departed member dropped");
            return;
        }

        match msg {
            Some(NetMsg::Command { name, payload }) if name == UPDATE_POSITION => {
                let player = PlayerState::from(payload);
                if let Some(m) = self.members.get_mut(&session_id) {
                    m.player = player;
                }
                self.broadcast(&NetMsg::PlayerChanged { session_id, player });
            }
            Some(NetMsg::Command { name, .. }) => {
                warn!(session_id = %session_id, command = %name, "Unknown command");
            }
            Some(NetMsg::RequestMediaGrant) => {
                let grant = MediaGrant::issue(
                    &self.cfg.media_room(),
                    session_id.as_str(),
                    Duration::from_secs(self.cfg.grant_ttl_secs),
                    Utc::now(),
                );
                debug!(session_id = %session_id, room = %grant.room, "Media grant issued");
                self.send_to(&session_id, NetMsg::MediaGrant(grant));
            }
            Some(NetMsg::Leave { consented }) => {
                let code = if consented {
                    CLOSE_CONSENTED
                } else {
                    CLOSE_SERVER
                };
                self.send_to(&session_id, NetMsg::Left { code });
                self.remove(&session_id);
            }
            Some(other) => {
                debug!(session_id = %session_id, ?other, "Unexpected client message");
            }
            None => self.remove(&session_id),
        }
    }

    /// Removes a member and tells everyone left. Dropping the outbox lets its
    /// writer flush and close the stream.
    fn remove(&mut self, session_id: &SessionId) {
        if let Some(m) = self.members.remove(session_id) {
            info!(session_id = %session_id, name = %m.name, "Player left");
            self.broadcast(&NetMsg::PlayerRemoved {
                session_id: session_id.clone(),
            });
        }
    }

    fn send_to(&self, session_id: &SessionId, msg: NetMsg) {
        if let Some(m) = self.members.get(session_id) {
            let _ = m.outbox.send(msg);
        }
    }

    fn broadcast(&self, msg: &NetMsg) {
        for m in self.members.values() {
            let _ = m.outbox.send(msg.clone());
        }
    }
}

async fn read_loop(
    session_id: SessionId,
    mut reader: FrameReader,
    inbox: mpsc::UnboundedSender<Inbound>,
) {
    loop {
        let body = match reader.recv_payload().await {
            Ok(body) => body,
            Err(e) => {
                debug!(session_id = %session_id, error = %e, "Member stream ended");
                let _ = inbox.send(Inbound {
                    session_id,
                    msg: None,
                });
                return;
            }
        };
        let msg = match decode_from_bytes(&body) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Undecodable frame skipped");
                continue;
            }
        };
        let inbound = Inbound {
            session_id: session_id.clone(),
            msg: Some(msg),
        };
        if inbox.send(inbound).is_err() {
            return;
        }
    }
}

async fn write_loop(mut writer: FrameWriter, mut outbox: mpsc::UnboundedReceiver<NetMsg>) {
    while let Some(msg) = outbox.recv().await {
        if let Err(e) = writer.send(&msg).await {
            debug!(error = %e, "Member write failed");
            return;
        }
    }
    let _ = writer.shutdown().await;
}

/// Reads `JoinRoom` and checks protocol and room. A mismatch is answered
/// with `JoinRejected` before failing.
async fn handshake(
    mut conn: ReliableConn,
    peer: SocketAddr,
    room_name: String,
) -> anyhow::Result<Handshake> {
    let hello = tokio::time::timeout(HANDSHAKE_TIMEOUT, conn.recv())
        .await
        .context("join handshake timed out")??;

    let (protocol, room, name) = match hello {
        NetMsg::JoinRoom {
            protocol,
            room,
            name,
        } => (protocol, room, name),
        other => anyhow::bail!("unexpected handshake msg: {other:?}"),
    };

    let rejection = if protocol != PROTOCOL_VERSION {
        Some(format!(
            "protocol {protocol} unsupported, expected {PROTOCOL_VERSION}"
        ))
    } else if room != room_name {
        Some(format!("no room named {room:?}"))
    } else {
        None
    };
    if let Some(reason) = rejection {
        conn.send(&NetMsg::JoinRejected {
            reason: reason.clone(),
        })
        .await?;
        anyhow::bail!("join rejected: {reason}");
    }

    debug!(%peer, name = %name, "Handshake complete");
    Ok(Handshake { conn, peer, name })
}

/// Helper for tests: bind to an ephemeral port.
///
/// Returns the server and a client config pointing at it.
pub async fn bind_ephemeral() -> anyhow::Result<(RoomServer, ClientConfig)> {
    let cfg = ServerConfig {
        listen_addr: format!("{}:{}", IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
        ..Default::default()
    };
    let server = RoomServer::bind(cfg).await?;

    let client_cfg = ClientConfig {
        server_addr: server.local_addr()?.to_string(),
        room_name: server.cfg.room_name.clone(),
        ..Default::default()
    };
    Ok((server, client_cfg))
}
