//! Client-facing session handlers: handshake, status, login, play.

use crate::{
    connection::{Association, Connection},
    player::{ConnectedPlayer, GameProfile},
    protocol::{
        packet::{
            self,
            client::handshake::NextState,
            server::login::{LoginSuccess, SetCompression},
            InboundPacket,
        },
        ProtocolState, ProtocolVersion,
    },
    proxy::ProxyContext,
    server_connection::{ConnectionRequestResult, ServerConnection},
    session::SessionHandler,
};
use anyhow::bail;
use std::sync::Arc;

/// Reads the opening handshake and routes the connection to the status
/// or login path.
pub struct HandshakeSessionHandler {
    ctx: Arc<ProxyContext>,
}

impl HandshakeSessionHandler {
    pub fn new(ctx: Arc<ProxyContext>) -> Self {
        Self { ctx }
    }

    pub fn handle(&mut self, conn: &mut Connection, packet: InboundPacket) -> anyhow::Result<()> {
        let InboundPacket::Handshake(packet::client::handshake::Packet::Handshake(handshake)) =
            packet
        else {
            bail!("expected a handshake packet first");
        };

        let version = ProtocolVersion(handshake.protocol_version);
        conn.set_protocol_version(version);

        match handshake.next_state {
            NextState::Status => {
                conn.set_state(ProtocolState::Status)?;
                conn.set_session_handler(SessionHandler::ClientStatus(StatusSessionHandler::new(
                    self.ctx.clone(),
                )));
            }
            NextState::Login => {
                conn.set_state(ProtocolState::Login)?;
                if version.is_supported() {
                    conn.set_session_handler(SessionHandler::ClientLogin(
                        LoginSessionHandler::new(self.ctx.clone()),
                    ));
                } else {
                    tracing::debug!(
                        connection = %conn.association(),
                        "rejecting unsupported protocol version {version}"
                    );
                    conn.disconnect_with("This proxy does not support your client version.");
                }
            }
        }
        Ok(())
    }
}

/// Answers the server-list query: one status response, one ping echo.
pub struct StatusSessionHandler {
    ctx: Arc<ProxyContext>,
}

impl StatusSessionHandler {
    pub fn new(ctx: Arc<ProxyContext>) -> Self {
        Self { ctx }
    }

    pub fn handle(&mut self, conn: &mut Connection, packet: InboundPacket) -> anyhow::Result<()> {
        use crate::protocol::packet::client::status::Packet as Serverbound;
        use crate::protocol::packet::server::status::{Packet as Clientbound, Pong, Response};

        match packet {
            InboundPacket::StatusServerbound(Serverbound::Request(_)) => {
                let status = self.ctx.status_json(conn.protocol_version());
                conn.write(&Clientbound::Response(Response { status }));
                Ok(())
            }
            InboundPacket::StatusServerbound(Serverbound::Ping(ping)) => {
                conn.write(&Clientbound::Pong(Pong {
                    payload: ping.payload,
                }));
                conn.close();
                Ok(())
            }
            other => bail!("unexpected {} packet during status", other.name()),
        }
    }
}

/// Runs the client half of the login: builds the player's profile, sends
/// compression and login success, then kicks off the first backend
/// connection. The play handler is installed only once a backend login
/// succeeds.
pub struct LoginSessionHandler {
    ctx: Arc<ProxyContext>,
    player: Option<Arc<ConnectedPlayer>>,
}

impl LoginSessionHandler {
    pub fn new(ctx: Arc<ProxyContext>) -> Self {
        Self { ctx, player: None }
    }

    pub fn handle(&mut self, conn: &mut Connection, packet: InboundPacket) -> anyhow::Result<()> {
        use crate::protocol::packet::client::login::Packet as Serverbound;

        match packet {
            InboundPacket::LoginServerbound(Serverbound::LoginStart(login)) => {
                if self.player.is_some() {
                    bail!("client sent a second login start");
                }
                self.start_login(conn, &login.username)
            }
            InboundPacket::LoginServerbound(other) => {
                bail!("unexpected {} packet during login", other.as_ref())
            }
            // The client may race Play packets ahead of the first backend
            // join; there is nowhere to forward them yet.
            InboundPacket::PlayServerbound(early) => {
                tracing::debug!(
                    connection = %conn.association(),
                    packet = early.as_ref(),
                    "dropping packet received before a backend was joined"
                );
                Ok(())
            }
            other => bail!("unexpected {} packet during login", other.name()),
        }
    }

    fn start_login(&mut self, conn: &mut Connection, username: &str) -> anyhow::Result<()> {
        if self.ctx.player_count() >= self.ctx.config().max_players as usize {
            conn.disconnect_with("The proxy is full.");
            return Ok(());
        }

        let profile = GameProfile::offline(username);
        tracing::info!(
            username = profile.name.as_str(),
            uuid = %profile.uuid,
            "player logging in"
        );

        let remote_address = match conn.association() {
            Association::Client(addr) => *addr,
            other => bail!("login start on a {other} connection"),
        };
        let player = ConnectedPlayer::new(
            profile,
            remote_address,
            conn.protocol_version(),
            conn.handle(),
        );
        if !self.ctx.register_player(player.clone()) {
            conn.disconnect_with("You are already connected to this proxy.");
            return Ok(());
        }
        conn.set_association(Association::Player(player.clone()));
        self.player = Some(player.clone());

        let threshold = self.ctx.config().compression_threshold;
        if threshold >= 0 {
            conn.write(&packet::server::login::Packet::SetCompression(
                SetCompression { threshold },
            ));
            conn.enable_compression(threshold);
        }

        conn.write(&packet::server::login::Packet::LoginSuccess(LoginSuccess {
            uuid: player.uuid().hyphenated().to_string(),
            username: player.username().to_owned(),
        }));
        conn.set_state(ProtocolState::Play)?;

        let Some(server) = self.ctx.initial_server() else {
            conn.disconnect_with("No available servers.");
            return Ok(());
        };

        let server_connection = ServerConnection::new(server, player, self.ctx.clone());
        tokio::spawn(async move {
            match server_connection.connect().await {
                ConnectionRequestResult::Successful => {}
                // The backend handlers already surfaced these to the player.
                ConnectionRequestResult::Disconnected { .. } => {}
                ConnectionRequestResult::Failed { error } => {
                    server_connection.player().handle_connection_exception(
                        server_connection.server_info(),
                        &format!("{error:#}"),
                    );
                }
            }
        });
        Ok(())
    }

    pub fn deactivated(&mut self, conn: &mut Connection) {
        // A swap to the play handler leaves the player alone; only a
        // closing connection tears the player down.
        if conn.is_closed() {
            if let Some(player) = &self.player {
                self.ctx.unregister_player(player);
                player.close_connected_server();
            }
        }
    }
}

/// Bridges client traffic to whichever backend is currently active.
pub struct PlaySessionHandler {
    ctx: Arc<ProxyContext>,
    player: Arc<ConnectedPlayer>,
}

impl PlaySessionHandler {
    pub fn new(ctx: Arc<ProxyContext>, player: Arc<ConnectedPlayer>) -> Self {
        Self { ctx, player }
    }

    pub fn handle(&mut self, conn: &mut Connection, packet: InboundPacket) -> anyhow::Result<()> {
        match packet {
            InboundPacket::PlayServerbound(play) => {
                let payload = packet::encode_payload(&play, conn.protocol_version());
                match self.player.connected_server() {
                    Some(server) => {
                        if let Some(backend) = server.connection() {
                            backend.send_payload(payload);
                        }
                    }
                    None => tracing::debug!(
                        player = self.player.username(),
                        "no active backend; dropping client packet"
                    ),
                }
                Ok(())
            }
            other => bail!("unexpected {} packet during play", other.name()),
        }
    }

    pub fn deactivated(&mut self, _conn: &mut Connection) {
        // The play handler is terminal, so deactivation means the player
        // is gone.
        tracing::info!(player = self.player.username(), "player disconnected");
        self.ctx.unregister_player(&self.player);
        self.player.close_connected_server();
    }
}
