//! Backend-facing session handlers: the login negotiation (including
//! identity forwarding) and the play-phase bridge back to the client.

use crate::{
    connection::Connection,
    forwarding::{ForwardingData, ForwardingMode, FORWARDING_CHANNEL},
    protocol::{
        packet::{
            self,
            client::login::{LoginPluginResponse, LoginStart},
            InboundPacket,
        },
        ProtocolState,
    },
    proxy::ProxyContext,
    server_connection::{ConnectionRequestResult, ServerConnection},
    session::SessionHandler,
    text,
};
use anyhow::{anyhow, bail};
use std::{sync::Arc, time::Duration};
use tokio::task::JoinHandle;

/// How long a backend in modern forwarding mode may take to request the
/// forwarding payload before we give up on it.
const FORWARDING_TIMEOUT: Duration = Duration::from_secs(1);

/// Negotiates the proxy's login with a backend on behalf of a player.
pub struct LoginSessionHandler {
    server_conn: Arc<ServerConnection>,
    ctx: Arc<ProxyContext>,
    forwarding_check: Option<JoinHandle<()>>,
}

impl LoginSessionHandler {
    pub fn new(server_conn: Arc<ServerConnection>, ctx: Arc<ProxyContext>) -> Self {
        Self {
            server_conn,
            ctx,
            forwarding_check: None,
        }
    }

    pub fn activated(&mut self, _conn: &mut Connection) {
        if self.ctx.config().forwarding_mode != ForwardingMode::Modern {
            return;
        }
        // If the backend never initiates the forwarding exchange, it is
        // misconfigured; the player gets a descriptive error instead of
        // hanging in the login screen.
        let server_conn = self.server_conn.clone();
        self.forwarding_check = Some(tokio::spawn(async move {
            tokio::time::sleep(FORWARDING_TIMEOUT).await;
            let won = server_conn
                .notifier()
                .fulfill(ConnectionRequestResult::Failed {
                    error: anyhow!(
                        "{} did not request forwarding in time",
                        server_conn.server_info().name
                    ),
                });
            if won {
                server_conn.player().handle_connection_exception(
                    server_conn.server_info(),
                    "Your server did not send the forwarding request in time. Is it set up correctly?",
                );
                server_conn.disconnect();
            }
        }));
    }

    pub fn handle(&mut self, conn: &mut Connection, packet: InboundPacket) -> anyhow::Result<()> {
        use crate::protocol::packet::server::login::Packet as Clientbound;

        let login_packet = match packet {
            InboundPacket::LoginClientbound(login_packet) => login_packet,
            other => bail!("unexpected {} packet during backend login", other.name()),
        };

        match login_packet {
            Clientbound::EncryptionRequest(_) => {
                bail!("backend server is online-mode; it must trust the proxy instead")
            }
            Clientbound::LoginPluginRequest(request) => {
                if self.ctx.config().forwarding_mode == ForwardingMode::Modern
                    && request.channel == FORWARDING_CHANNEL
                {
                    self.cancel_forwarding_check();

                    let player = self.server_conn.player();
                    let data = ForwardingData::new(
                        player.remote_address().ip().to_string(),
                        player.profile().clone(),
                    )
                    .encode();
                    conn.write(&packet::client::login::Packet::LoginPluginResponse(
                        LoginPluginResponse {
                            message_id: request.message_id,
                            success: true,
                            data,
                        },
                    ));

                    // The login was held back for the forwarding exchange;
                    // send it now.
                    conn.write(&packet::client::login::Packet::LoginStart(LoginStart {
                        username: player.username().to_owned(),
                    }));
                } else {
                    // We don't understand this channel.
                    conn.write(&packet::client::login::Packet::LoginPluginResponse(
                        LoginPluginResponse {
                            message_id: request.message_id,
                            success: false,
                            data: Vec::new(),
                        },
                    ));
                }
                Ok(())
            }
            Clientbound::Disconnect(disconnect) => {
                conn.close();
                self.server_conn
                    .notifier()
                    .fulfill(ConnectionRequestResult::Disconnected {
                        reason: disconnect.reason.clone(),
                    });
                self.server_conn.player().handle_connection_exception(
                    self.server_conn.server_info(),
                    &text::plain_text(&disconnect.reason),
                );
                Ok(())
            }
            Clientbound::SetCompression(set_compression) => {
                conn.enable_compression(set_compression.threshold);
                Ok(())
            }
            Clientbound::LoginSuccess(_) => self.finish_login(conn),
        }
    }

    /// The player has been logged on to the backend: this connection
    /// becomes their active backend, replacing any previous one.
    fn finish_login(&mut self, conn: &mut Connection) -> anyhow::Result<()> {
        let player = self.server_conn.player().clone();
        if self.server_conn.was_gracefully_closed() || player.client().is_closed() {
            // Abandoned while the login was in flight, or the player
            // already left the proxy.
            conn.close();
            return Ok(());
        }

        conn.set_state(ProtocolState::Play)?;
        match player.connected_server() {
            // Session takeover: the previous backend connection becomes
            // obsolete and is closed before the new one is recorded.
            Some(existing) => existing.disconnect(),
            // First join: the client side finally gets its play handler.
            None => player
                .client()
                .set_session_handler(SessionHandler::ClientPlay(
                    crate::session::client::PlaySessionHandler::new(
                        self.ctx.clone(),
                        player.clone(),
                    ),
                )),
        }

        self.server_conn.notifier().fulfill(ConnectionRequestResult::Successful);

        conn.set_session_handler(SessionHandler::BackendPlay(PlaySessionHandler::new(
            self.server_conn.clone(),
        )));
        player.set_connected_server(self.server_conn.clone());

        tracing::info!(
            player = player.username(),
            server = self.server_conn.server_info().name.as_str(),
            "player connected to backend"
        );
        Ok(())
    }

    pub fn deactivated(&mut self, conn: &mut Connection) {
        self.cancel_forwarding_check();
        // A closing connection with the result still pending means the
        // login never finished; don't leave the caller waiting.
        if conn.is_closed() {
            self.server_conn
                .notifier()
                .fulfill(ConnectionRequestResult::Failed {
                    error: anyhow!(
                        "connection to {} closed during login",
                        self.server_conn.server_info().name
                    ),
                });
        }
    }

    pub fn exception(&mut self, _conn: &mut Connection, error: &anyhow::Error) {
        self.server_conn
            .notifier()
            .fulfill(ConnectionRequestResult::Failed {
                error: anyhow!("{error:#}"),
            });
        self.server_conn
            .player()
            .handle_connection_exception(self.server_conn.server_info(), &format!("{error:#}"));
    }

    fn cancel_forwarding_check(&mut self) {
        if let Some(task) = self.forwarding_check.take() {
            task.abort();
        }
    }
}

/// Bridges backend traffic to the player once the login completed.
pub struct PlaySessionHandler {
    server_conn: Arc<ServerConnection>,
    errored: bool,
}

impl PlaySessionHandler {
    pub fn new(server_conn: Arc<ServerConnection>) -> Self {
        Self {
            server_conn,
            errored: false,
        }
    }

    pub fn handle(&mut self, conn: &mut Connection, packet: InboundPacket) -> anyhow::Result<()> {
        use crate::protocol::packet::server::play::Packet as Clientbound;

        match packet {
            InboundPacket::PlayClientbound(Clientbound::Disconnect(disconnect)) => {
                self.errored = true;
                self.server_conn.disconnect();
                self.server_conn.player().handle_connection_exception(
                    self.server_conn.server_info(),
                    &text::plain_text(&disconnect.reason),
                );
                Ok(())
            }
            InboundPacket::PlayClientbound(play) => {
                let payload = packet::encode_payload(&play, conn.protocol_version());
                self.server_conn.player().client().send_payload(payload);
                Ok(())
            }
            other => bail!("unexpected {} packet from backend during play", other.name()),
        }
    }

    pub fn deactivated(&mut self, _conn: &mut Connection) {
        let player = self.server_conn.player();
        let was_active = player.clear_connected_server_if(&self.server_conn);
        // An active backend that vanished without the proxy closing it is
        // an error the player must hear about; a superseded or deliberately
        // closed one is not.
        if was_active && !self.errored && !self.server_conn.was_gracefully_closed() {
            player.handle_connection_exception(
                self.server_conn.server_info(),
                "The server closed the connection.",
            );
        }
    }

    pub fn exception(&mut self, _conn: &mut Connection, error: &anyhow::Error) {
        self.errored = true;
        self.server_conn
            .player()
            .handle_connection_exception(self.server_conn.server_info(), &format!("{error:#}"));
    }
}
