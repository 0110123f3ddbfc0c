//! The proxy's outbound link to a backend server, scoped to one player.

use crate::{
    connection::{Association, ConnectionDriver, ConnectionHandle},
    forwarding::{self, ForwardingMode},
    player::ConnectedPlayer,
    protocol::{packet::client, Direction, ProtocolState, ProtocolVersion},
    proxy::ProxyContext,
    session::{backend, SessionHandler},
};
use anyhow::anyhow;
use std::{
    fmt,
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, OnceLock,
    },
    time::Duration,
};
use tokio::{net::TcpStream, sync::oneshot, time::timeout};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// A named backend and its network address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    pub name: String,
    pub address: SocketAddr,
}

impl ServerInfo {
    pub fn new(name: impl Into<String>, address: SocketAddr) -> Self {
        Self {
            name: name.into(),
            address,
        }
    }
}

/// Outcome of one connect request, delivered exactly once to whoever
/// initiated it.
#[derive(Debug)]
pub enum ConnectionRequestResult {
    Successful,
    /// The backend refused us with an explicit disconnect; `reason` is the
    /// server-supplied chat-component JSON.
    Disconnected { reason: String },
    Failed { error: anyhow::Error },
}

/// One-shot completion primitive behind a connect request.
///
/// Whichever of {socket failure, login success, disconnect, exception,
/// forwarding timeout} happens first wins the slot; later fulfillment
/// attempts are reported back to the caller and change nothing.
pub struct CompletionSlot {
    sender: Mutex<Option<oneshot::Sender<ConnectionRequestResult>>>,
}

impl CompletionSlot {
    fn new() -> (Self, oneshot::Receiver<ConnectionRequestResult>) {
        let (sender, receiver) = oneshot::channel();
        (
            Self {
                sender: Mutex::new(Some(sender)),
            },
            receiver,
        )
    }

    /// Fulfills the slot if it is still pending. Returns whether this
    /// call delivered the result.
    pub fn fulfill(&self, result: ConnectionRequestResult) -> bool {
        match self.sender.lock().unwrap().take() {
            Some(sender) => {
                sender.send(result).ok();
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.sender.lock().unwrap().is_some()
    }
}

/// One proxy-to-backend connection attempt and, once login succeeds, the
/// player's live backend link.
pub struct ServerConnection {
    server: ServerInfo,
    player: Arc<ConnectedPlayer>,
    ctx: Arc<ProxyContext>,
    /// Set once the outbound socket is established.
    connection: OnceLock<ConnectionHandle>,
    notifier: CompletionSlot,
    result: Mutex<Option<oneshot::Receiver<ConnectionRequestResult>>>,
    /// Set when the proxy closes this connection on purpose (session
    /// takeover or the player leaving), so teardown does not report a
    /// backend failure to the player.
    gracefully_closed: AtomicBool,
}

impl ServerConnection {
    pub fn new(
        server: ServerInfo,
        player: Arc<ConnectedPlayer>,
        ctx: Arc<ProxyContext>,
    ) -> Arc<Self> {
        let (notifier, receiver) = CompletionSlot::new();
        Arc::new(Self {
            server,
            player,
            ctx,
            connection: OnceLock::new(),
            notifier,
            result: Mutex::new(Some(receiver)),
            gracefully_closed: AtomicBool::new(false),
        })
    }

    pub fn server_info(&self) -> &ServerInfo {
        &self.server
    }

    pub fn player(&self) -> &Arc<ConnectedPlayer> {
        &self.player
    }

    pub fn notifier(&self) -> &CompletionSlot {
        &self.notifier
    }

    pub fn connection(&self) -> Option<&ConnectionHandle> {
        self.connection.get()
    }

    pub fn was_gracefully_closed(&self) -> bool {
        self.gracefully_closed.load(Ordering::Acquire)
    }

    /// Deliberately closes this backend connection.
    pub fn disconnect(&self) {
        self.gracefully_closed.store(true, Ordering::Release);
        if let Some(connection) = self.connection.get() {
            connection.close();
        }
        // Never leave a caller waiting on a connection we are abandoning.
        self.notifier.fulfill(ConnectionRequestResult::Failed {
            error: anyhow!("connection to {} was abandoned", self.server.name),
        });
    }

    /// Opens the outbound channel and runs the backend login. The returned
    /// result is produced exactly once, by whichever terminal event
    /// happens first.
    pub async fn connect(self: &Arc<Self>) -> ConnectionRequestResult {
        let receiver = self
            .result
            .lock()
            .unwrap()
            .take()
            .expect("connect() called twice on one ServerConnection");

        match timeout(CONNECT_TIMEOUT, TcpStream::connect(self.server.address)).await {
            Ok(Ok(stream)) => {
                if let Err(error) = self.start_login(stream) {
                    self.notifier
                        .fulfill(ConnectionRequestResult::Failed { error });
                    if let Some(connection) = self.connection.get() {
                        connection.close();
                    }
                }
            }
            Ok(Err(e)) => {
                self.notifier.fulfill(ConnectionRequestResult::Failed {
                    error: anyhow::Error::from(e)
                        .context(format!("unable to connect to {}", self.server.name)),
                });
            }
            Err(_) => {
                self.notifier.fulfill(ConnectionRequestResult::Failed {
                    error: anyhow!("connection to {} timed out", self.server.name),
                });
            }
        }

        match receiver.await {
            Ok(result) => result,
            Err(_) => ConnectionRequestResult::Failed {
                error: anyhow!("connection closed before login completed"),
            },
        }
    }

    /// Installs the login session handler on the fresh connection and
    /// kicks off the handshake, rewriting the server address when legacy
    /// forwarding is configured.
    fn start_login(self: &Arc<Self>, stream: TcpStream) -> anyhow::Result<()> {
        let handler = SessionHandler::BackendLogin(backend::LoginSessionHandler::new(
            self.clone(),
            self.ctx.clone(),
        ));
        let mut driver = ConnectionDriver::new(
            stream,
            Direction::Clientbound,
            Association::Backend(self.clone()),
            handler,
        );
        self.connection.set(driver.handle()).ok();

        let version = self.player.protocol_version();
        let forwarding_mode = self.ctx.config().forwarding_mode;
        let host = self.server.address.ip().to_string();
        let server_address = match forwarding_mode {
            ForwardingMode::Legacy => {
                let profile = self.player.profile();
                forwarding::legacy_forwarding_address(
                    &host,
                    &self.player.remote_address().ip().to_string(),
                    &profile.undashed_id(),
                    &profile.properties,
                )
            }
            _ => host,
        };

        let conn = driver.connection_mut();
        conn.set_protocol_version(version);
        conn.write(&client::handshake::Packet::Handshake(
            client::handshake::Handshake {
                protocol_version: version.0,
                server_address,
                server_port: self.server.address.port(),
                next_state: client::handshake::NextState::Login,
            },
        ));
        conn.set_state(ProtocolState::Login)?;

        // Pre-1.13 backends cannot receive login plugin messages, and
        // outside modern forwarding there is nothing to defer for; in
        // those cases the login starts immediately. Modern forwarding on
        // 1.13+ holds the login back until the forwarding exchange ran.
        if version <= ProtocolVersion::MINECRAFT_1_12_2
            || forwarding_mode != ForwardingMode::Modern
        {
            conn.write(&client::login::Packet::LoginStart(
                client::login::LoginStart {
                    username: self.player.username().to_owned(),
                },
            ));
        }

        tokio::spawn(driver.run());
        Ok(())
    }
}

impl fmt::Display for ServerConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[server connection] {} -> {}",
            self.player.username(),
            self.server.name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completion_slot_fulfills_exactly_once() {
        let (slot, receiver) = CompletionSlot::new();
        assert!(slot.is_pending());

        assert!(slot.fulfill(ConnectionRequestResult::Successful));
        assert!(!slot.is_pending());

        // The race loser is detectable and does not alter the outcome.
        assert!(!slot.fulfill(ConnectionRequestResult::Disconnected {
            reason: "{}".into(),
        }));
        assert!(!slot.fulfill(ConnectionRequestResult::Failed {
            error: anyhow!("late"),
        }));

        assert!(matches!(
            receiver.await.unwrap(),
            ConnectionRequestResult::Successful
        ));
    }

    #[test]
    fn unfulfilled_slot_stays_pending() {
        let (slot, _receiver) = CompletionSlot::new();
        assert!(slot.is_pending());
    }
}
