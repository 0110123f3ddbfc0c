//! A `Connection` owns one TCP channel, its protocol state, the codec
//! switches (compression threshold, cipher), and the currently active
//! session handler.
//!
//! Every connection is driven by a single task, so handlers never need
//! locks: all state mutation and handler invocation happen on that task.
//! Outbound frames are offloaded to a writer task which owns the
//! encode-side codec; codec switches travel the same queue as packets so
//! they apply in order. Other tasks interact with a connection only
//! through its [`ConnectionHandle`].

use crate::{
    player::ConnectedPlayer,
    protocol::{
        framing::{CompressionThreshold, EncryptionKey, FrameDecoder, FrameEncoder},
        packet::{self, OutboundPacket},
        Direction, ProtocolState, ProtocolVersion,
    },
    server_connection::ServerConnection,
    session::SessionHandler,
    text,
};
use anyhow::{anyhow, bail, Context};
use std::{fmt, net::SocketAddr, sync::Arc, time::Duration};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
    time::timeout,
};
use tokio_util::sync::CancellationToken;

/// Connections that stay silent this long are presumed dead.
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// The logical owner of a connection, for diagnostics.
#[derive(Clone)]
pub enum Association {
    /// A client that has not finished logging in yet.
    Client(SocketAddr),
    /// A logged-in player's client connection.
    Player(Arc<ConnectedPlayer>),
    /// An outbound connection to a backend on behalf of a player.
    Backend(Arc<ServerConnection>),
}

impl fmt::Display for Association {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Association::Client(addr) => write!(f, "[client] {addr}"),
            Association::Player(player) => write!(f, "[player] {}", player.username()),
            Association::Backend(server) => write!(f, "{server}"),
        }
    }
}

enum WriteCommand {
    Frame(Vec<u8>),
    EnableCompression(CompressionThreshold),
    EnableEncryption(EncryptionKey),
}

/// Request sent to a connection's driver task from another task.
pub enum ControlMessage {
    SetHandler(SessionHandler),
    Disconnect(String),
}

/// Cloneable reference to a connection, usable from any task.
#[derive(Clone)]
pub struct ConnectionHandle {
    write_tx: flume::Sender<WriteCommand>,
    control_tx: flume::Sender<ControlMessage>,
    shutdown: CancellationToken,
}

impl ConnectionHandle {
    /// Forwards an already-encoded frame payload (packet ID + body).
    pub fn send_payload(&self, payload: Vec<u8>) {
        self.write_tx.send(WriteCommand::Frame(payload)).ok();
    }

    /// Asks the connection's driver to install a new session handler.
    /// The swap happens on the driver task, never mid-dispatch.
    pub fn set_session_handler(&self, handler: SessionHandler) {
        self.control_tx.send(ControlMessage::SetHandler(handler)).ok();
    }

    /// Asks the connection's driver to send a disconnect packet with the
    /// given plain-text reason, then close.
    pub fn disconnect(&self, reason: &str) {
        self.control_tx
            .send(ControlMessage::Disconnect(reason.to_owned()))
            .ok();
        // If the driver is already gone the token still tears down the
        // writer task.
        if self.control_tx.is_disconnected() {
            self.shutdown.cancel();
        }
    }

    /// Closes the connection. Idempotent and callable from any task.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

/// State owned by a connection's driver task.
pub struct Connection {
    state: ProtocolState,
    protocol_version: Option<ProtocolVersion>,
    inbound_direction: Direction,
    association: Association,
    decoder: FrameDecoder,
    write_tx: flume::Sender<WriteCommand>,
    control_tx: flume::Sender<ControlMessage>,
    shutdown: CancellationToken,
    /// Handler swap requested by the active handler itself; the driver
    /// applies it before dispatching the next packet.
    pub(crate) pending_handler: Option<SessionHandler>,
}

impl Connection {
    pub fn state(&self) -> ProtocolState {
        self.state
    }

    /// Advances the protocol state machine. Only forward transitions
    /// (Handshake -> Status/Login -> Play) are permitted.
    pub fn set_state(&mut self, next: ProtocolState) -> anyhow::Result<()> {
        if !self.state.allows_transition_to(next) {
            bail!("illegal protocol state transition {} -> {next}", self.state);
        }
        tracing::debug!(connection = %self.association, "state {} -> {next}", self.state);
        self.state = next;
        Ok(())
    }

    pub fn protocol_version(&self) -> ProtocolVersion {
        self.protocol_version
            .unwrap_or(ProtocolVersion::MINECRAFT_1_8)
    }

    /// Fixes the protocol version negotiated in the handshake.
    ///
    /// # Panics
    /// Panics if the version was already set; it is immutable thereafter.
    pub fn set_protocol_version(&mut self, version: ProtocolVersion) {
        assert!(
            self.protocol_version.is_none(),
            "called set_protocol_version() multiple times"
        );
        self.protocol_version = Some(version);
    }

    /// Applies a compression threshold to both codec halves. A negative
    /// threshold is the protocol's "disabled" marker and is ignored.
    pub fn enable_compression(&mut self, threshold: i32) {
        let Ok(threshold) = usize::try_from(threshold) else {
            return;
        };
        self.decoder.enable_compression();
        self.write_tx
            .send(WriteCommand::EnableCompression(CompressionThreshold::new(
                threshold,
            )))
            .ok();
    }

    /// Switches both codec halves to encrypted mode. A one-way switch;
    /// enabling twice is a programming error.
    pub fn enable_encryption(&mut self, key: EncryptionKey) {
        self.decoder.enable_encryption(key);
        self.write_tx
            .send(WriteCommand::EnableEncryption(key))
            .ok();
    }

    /// Enqueues a packet for the outbound pipeline. Never blocks.
    pub fn write<P: OutboundPacket>(&mut self, packet: &P) {
        tracing::trace!(
            connection = %self.association,
            packet = packet.name(),
            "sending packet"
        );
        let payload = packet::encode_payload(packet, self.protocol_version());
        self.write_tx.send(WriteCommand::Frame(payload)).ok();
    }

    /// Forwards an already-encoded frame payload unchanged.
    pub fn send_payload(&mut self, payload: Vec<u8>) {
        self.write_tx.send(WriteCommand::Frame(payload)).ok();
    }

    /// Sends the state-appropriate disconnect packet carrying `reason`
    /// as a chat component, then closes the connection.
    pub fn disconnect_with(&mut self, reason: &str) {
        let reason = text::component(reason);
        match self.state {
            ProtocolState::Play => {
                self.write(&packet::server::play::Packet::Disconnect(
                    packet::server::play::Disconnect { reason },
                ));
            }
            _ => {
                self.write(&packet::server::login::Packet::Disconnect(
                    packet::server::login::Disconnect { reason },
                ));
            }
        }
        self.close();
    }

    /// Closes the connection. Idempotent.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Requests that the driver replace the active handler before the
    /// next packet is dispatched.
    pub fn set_session_handler(&mut self, handler: SessionHandler) {
        self.pending_handler = Some(handler);
    }

    pub fn association(&self) -> &Association {
        &self.association
    }

    pub fn set_association(&mut self, association: Association) {
        self.association = association;
    }

    pub fn handle(&self) -> ConnectionHandle {
        ConnectionHandle {
            write_tx: self.write_tx.clone(),
            control_tx: self.control_tx.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}

enum Event {
    Closed,
    Control(ControlMessage),
    Read(usize),
}

/// Drives one connection: reads socket bytes, assembles frames, decodes
/// them against the registry, and dispatches to the active handler.
pub struct ConnectionDriver {
    conn: Connection,
    handler: SessionHandler,
    reader: OwnedReadHalf,
    control_rx: flume::Receiver<ControlMessage>,
}

impl ConnectionDriver {
    pub fn new(
        stream: TcpStream,
        inbound_direction: Direction,
        association: Association,
        handler: SessionHandler,
    ) -> Self {
        stream.set_nodelay(true).ok();
        let (reader, writer) = stream.into_split();

        let (write_tx, write_rx) = flume::unbounded();
        let (control_tx, control_rx) = flume::unbounded();
        let shutdown = CancellationToken::new();

        tokio::spawn(run_writer(writer, write_rx, shutdown.clone()));

        let conn = Connection {
            state: ProtocolState::Handshake,
            protocol_version: None,
            inbound_direction,
            association,
            decoder: FrameDecoder::new(),
            write_tx,
            control_tx,
            shutdown,
            pending_handler: None,
        };

        Self {
            conn,
            handler,
            reader,
            control_rx,
        }
    }

    /// The connection, for configuration before the driver is spawned.
    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    pub fn handle(&self) -> ConnectionHandle {
        self.conn.handle()
    }

    pub async fn run(mut self) {
        self.handler.activated(&mut self.conn);
        self.apply_pending_handler();

        if let Err(e) = self.run_inner().await {
            tracing::debug!(connection = %self.conn.association, "connection lost: {e:#}");
            self.handler.exception(&mut self.conn, &e);
        }

        self.conn.close();
        self.handler.deactivated(&mut self.conn);
    }

    async fn run_inner(&mut self) -> anyhow::Result<()> {
        let mut buf = [0u8; 4096];
        loop {
            let event = tokio::select! {
                biased;
                () = self.conn.shutdown.cancelled() => Event::Closed,
                msg = self.control_rx.recv_async() => match msg {
                    Ok(msg) => Event::Control(msg),
                    Err(_) => Event::Closed,
                },
                read = timeout(READ_TIMEOUT, self.reader.read(&mut buf)) => {
                    let bytes_read = read
                        .map_err(|_| anyhow!("read timed out"))?
                        .context("socket read failed")?;
                    Event::Read(bytes_read)
                }
            };

            match event {
                Event::Closed => return Ok(()),
                Event::Control(ControlMessage::SetHandler(handler)) => {
                    self.conn.pending_handler = Some(handler);
                    self.apply_pending_handler();
                }
                Event::Control(ControlMessage::Disconnect(reason)) => {
                    self.conn.disconnect_with(&reason);
                }
                Event::Read(0) => return Ok(()), // remote closed cleanly
                Event::Read(n) => {
                    self.conn.decoder.give_data(&mut buf[..n]);
                    while let Some(frame) = self.conn.decoder.next_frame()? {
                        self.dispatch(&frame)?;
                        if self.conn.is_closed() {
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    fn dispatch(&mut self, frame: &[u8]) -> anyhow::Result<()> {
        let packet = packet::decode(
            self.conn.state,
            self.conn.inbound_direction,
            self.conn.protocol_version(),
            frame,
        )?;
        tracing::trace!(
            connection = %self.conn.association,
            packet = packet.name(),
            "received packet"
        );
        self.handler.handle(&mut self.conn, packet)?;
        self.apply_pending_handler();
        Ok(())
    }

    /// Applies a requested handler swap: the old handler is deactivated
    /// and the new one activated before any further packet is dispatched.
    fn apply_pending_handler(&mut self) {
        while let Some(next) = self.conn.pending_handler.take() {
            self.handler.deactivated(&mut self.conn);
            self.handler = next;
            self.handler.activated(&mut self.conn);
        }
    }
}

/// Writer task: owns the write half and the encode-side codec.
async fn run_writer(
    mut writer: OwnedWriteHalf,
    write_rx: flume::Receiver<WriteCommand>,
    shutdown: CancellationToken,
) {
    let mut encoder = FrameEncoder::new();

    let failed = loop {
        let command = tokio::select! {
            () = shutdown.cancelled() => break false,
            command = write_rx.recv_async() => match command {
                Ok(command) => command,
                Err(_) => break false,
            },
        };
        if !apply_write(&mut writer, &mut encoder, command).await {
            break true;
        }
    };

    // Flush whatever was queued before the close was requested, so a
    // final disconnect packet still reaches the peer.
    if !failed {
        while let Ok(command) = write_rx.try_recv() {
            if !apply_write(&mut writer, &mut encoder, command).await {
                break;
            }
        }
    }

    shutdown.cancel();
    writer.shutdown().await.ok();
}

async fn apply_write(
    writer: &mut OwnedWriteHalf,
    encoder: &mut FrameEncoder,
    command: WriteCommand,
) -> bool {
    match command {
        WriteCommand::Frame(payload) => {
            let frame = match encoder.encode(&payload) {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::warn!("failed to encode frame: {e}");
                    return false;
                }
            };
            if let Err(e) = writer.write_all(&frame).await {
                tracing::trace!("write failed: {e}");
                return false;
            }
            true
        }
        WriteCommand::EnableCompression(threshold) => {
            encoder.enable_compression(threshold);
            true
        }
        WriteCommand::EnableEncryption(key) => {
            encoder.enable_encryption(key);
            true
        }
    }
}
