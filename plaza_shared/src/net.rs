//! Networking primitives.
//!
//! Goals:
//! - Provide a reliable (TCP) channel carrying length-prefixed JSON frames.
//! - Provide the room protocol messages exchanged by client and room server.
//! - Keep serialization explicit and versionable.
//!
//! The room protocol replicates a flat player collection: the server announces
//! adds, changes and removals; clients send named commands with a position payload.

use std::{fmt, net::SocketAddr};

use anyhow::{ensure, Context};
use bytes::{BufMut, Bytes, BytesMut};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream,
    },
};

use crate::{grant::MediaGrant, math::Vec3};

/// Protocol version for compatibility checks.
pub const PROTOCOL_VERSION: u32 = 1;

/// Frames larger than this are treated as a corrupt stream.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Command name for click-to-move updates.
pub const UPDATE_POSITION: &str = "updatePosition";

/// Leave code: the client asked to leave.
pub const CLOSE_CONSENTED: u16 = 1000;
/// Leave code: the connection dropped without a leave handshake.
pub const CLOSE_ABNORMAL: u16 = 1006;
/// Leave code: the server removed the client.
pub const CLOSE_SERVER: u16 = 4000;

/// Identifies one client's membership in a room.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub const LEN: usize = 9;

    pub fn new(id: impl Into<String>) -> Self {
        SessionId(id.into())
    }

    /// Random alphanumeric id of [`SessionId::LEN`] characters.
    pub fn random() -> Self {
        let id = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(Self::LEN)
            .map(char::from)
            .collect::<String>();
        SessionId(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Payload of a position command: `{x, y, z}`.
pub type PositionPayload = Vec3;

/// Replicated player fields.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct PlayerState {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl PlayerState {
    pub fn position(&self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }
}

impl From<Vec3> for PlayerState {
    fn from(v: Vec3) -> Self {
        Self {
            x: v.x,
            y: v.y,
            z: v.z,
        }
    }
}

/// High-level message envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum NetMsg {
    // ─── Join handshake ───
    JoinRoom {
        protocol: u32,
        room: String,
        name: String,
    },
    Joined {
        room: String,
        session_id: SessionId,
    },
    JoinRejected {
        reason: String,
    },

    // ─── Player collection replication ───
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

    // ─── Gameplay ───
    /// Client -> server: named command, e.g. [`UPDATE_POSITION`].
    Command {
        name: String,
        payload: PositionPayload,
    },

    // ─── Conferencing credentials ───
    RequestMediaGrant,
    MediaGrant(MediaGrant),

    // ─── Leave ───
    Leave {
        consented: bool,
    },
    Left {
        code: u16,
    },
}

/// Writes one length-prefixed frame.
pub async fn write_frame<W>(w: &mut W, msg: &NetMsg) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let payload = encode_to_bytes(msg)?;
    let mut buf = BytesMut::with_capacity(4 + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.extend_from_slice(&payload);
    w.write_all(&buf).await.context("tcp write")?;
    Ok(())
}

/// Reads one length-prefixed frame body without decoding it.
///
/// An error here means the stream itself is unusable; a body that fails to
/// decode afterwards leaves the stream aligned on the next frame.
pub async fn read_payload<R>(r: &mut R) -> anyhow::Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    r.read_exact(&mut len_buf).await.context("tcp read len")?;
    let len = u32::from_be_bytes(len_buf) as usize;
    ensure!(len <= MAX_FRAME_LEN, "frame of {len} bytes exceeds limit");
    let mut payload = vec![0u8; len];
    r.read_exact(&mut payload)
        .await
        .context("tcp read payload")?;
    Ok(Bytes::from(payload))
}

/// Reads and decodes one length-prefixed frame.
pub async fn read_frame<R>(r: &mut R) -> anyhow::Result<NetMsg>
where
    R: AsyncRead + Unpin,
{
    decode_from_bytes(&read_payload(r).await?)
}

/// Reliable connection over TCP with length-prefixed frames.
#[derive(Debug)]
pub struct ReliableConn {
    stream: TcpStream,
}

impl ReliableConn {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr).await.context("tcp connect")?;
        Ok(Self::new(stream))
    }

    pub async fn send(&mut self, msg: &NetMsg) -> anyhow::Result<()> {
        write_frame(&mut self.stream, msg).await
    }

    pub async fn recv(&mut self) -> anyhow::Result<NetMsg> {
        read_frame(&mut self.stream).await
    }

    /// Splits into independently owned halves once the handshake is done.
    pub fn into_split(self) -> (FrameReader, FrameWriter) {
        let (read, write) = self.stream.into_split();
        (FrameReader { read }, FrameWriter { write })
    }
}

/// Receiving half of a [`ReliableConn`].
#[derive(Debug)]
pub struct FrameReader {
    read: OwnedReadHalf,
}

impl FrameReader {
    pub async fn recv(&mut self) -> anyhow::Result<NetMsg> {
        read_frame(&mut self.read).await
    }

    /// Next frame body, undecoded. See [`read_payload`].
    pub async fn recv_payload(&mut self) -> anyhow::Result<Bytes> {
        read_payload(&mut self.read).await
    }
}

/// Sending half of a [`ReliableConn`].
#[derive(Debug)]
pub struct FrameWriter {
    write: OwnedWriteHalf,
}

impl FrameWriter {
    pub async fn send(&mut self, msg: &NetMsg) -> anyhow::Result<()> {
        write_frame(&mut self.write, msg).await
    }

    pub async fn shutdown(&mut self) -> anyhow::Result<()> {
        self.write.shutdown().await.context("tcp shutdown")
    }
}

/// TCP server listener.
pub struct ReliableListener {
    listener: TcpListener,
}

impl ReliableListener {
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await.context("tcp bind")?;
        Ok(Self { listener })
    }

    pub async fn accept(&self) -> anyhow::Result<(ReliableConn, SocketAddr)> {
        let (stream, addr) = self.listener.accept().await.context("tcp accept")?;
        Ok((ReliableConn::new(stream), addr))
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

/// Serializes one frame body.
pub fn encode_to_bytes(msg: &NetMsg) -> anyhow::Result<Bytes> {
    let payload = serde_json::to_vec(msg).context("serialize msg")?;
    Ok(Bytes::from(payload))
}

/// Deserializes one frame body.
pub fn decode_from_bytes(b: &[u8]) -> anyhow::Result<NetMsg> {
    serde_json::from_slice(b).context("deserialize msg")
}
