//! The proxy context (configuration, server registry, player registry)
//! and the client accept loop.

use crate::{
    connection::{Association, ConnectionDriver},
    forwarding::ForwardingMode,
    player::ConnectedPlayer,
    protocol::{Direction, ProtocolVersion},
    server_connection::ServerInfo,
    session::{client, SessionHandler},
    text::TextComponent,
};
use ahash::AHashMap;
use anyhow::Context;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub motd: String,
    pub max_players: u32,
    /// Negative disables compression towards clients.
    pub compression_threshold: i32,
    pub forwarding_mode: ForwardingMode,
}

/// Everything a connection needs from the running proxy, passed explicitly
/// to constructors instead of living in a global.
pub struct ProxyContext {
    config: ProxyConfig,
    servers: Mutex<AHashMap<String, ServerInfo>>,
    /// Server names in registration order; players join the first entry.
    try_order: Mutex<Vec<String>>,
    players: Mutex<AHashMap<Uuid, Arc<ConnectedPlayer>>>,
}

impl ProxyContext {
    pub fn new(config: ProxyConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            servers: Mutex::new(AHashMap::new()),
            try_order: Mutex::new(Vec::new()),
            players: Mutex::new(AHashMap::new()),
        })
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn register_server(&self, info: ServerInfo) {
        let mut servers = self.servers.lock().unwrap();
        if servers.insert(info.name.clone(), info.clone()).is_none() {
            self.try_order.lock().unwrap().push(info.name);
        }
    }

    pub fn unregister_server(&self, name: &str) -> Option<ServerInfo> {
        let removed = self.servers.lock().unwrap().remove(name);
        if removed.is_some() {
            self.try_order.lock().unwrap().retain(|n| n != name);
        }
        removed
    }

    pub fn server(&self, name: &str) -> Option<ServerInfo> {
        self.servers.lock().unwrap().get(name).cloned()
    }

    pub fn all_servers(&self) -> Vec<ServerInfo> {
        self.servers.lock().unwrap().values().cloned().collect()
    }

    /// The server newly logged-in players are sent to.
    pub fn initial_server(&self) -> Option<ServerInfo> {
        let name = self.try_order.lock().unwrap().first().cloned()?;
        self.server(&name)
    }

    /// Registers a freshly logged-in player. Fails if the UUID is already
    /// online.
    pub fn register_player(&self, player: Arc<ConnectedPlayer>) -> bool {
        let mut players = self.players.lock().unwrap();
        if players.contains_key(&player.uuid()) {
            return false;
        }
        players.insert(player.uuid(), player);
        true
    }

    /// Removes a player, but only if the registered entry is this exact
    /// player (a reconnect may already occupy the UUID).
    pub fn unregister_player(&self, player: &Arc<ConnectedPlayer>) {
        let mut players = self.players.lock().unwrap();
        if let Some(current) = players.get(&player.uuid()) {
            if Arc::ptr_eq(current, player) {
                players.remove(&player.uuid());
            }
        }
    }

    pub fn player(&self, uuid: Uuid) -> Option<Arc<ConnectedPlayer>> {
        self.players.lock().unwrap().get(&uuid).cloned()
    }

    pub fn all_players(&self) -> Vec<Arc<ConnectedPlayer>> {
        self.players.lock().unwrap().values().cloned().collect()
    }

    pub fn player_count(&self) -> usize {
        self.players.lock().unwrap().len()
    }

    /// Builds the status-response JSON document for a server-list query.
    pub fn status_json(&self, client_version: ProtocolVersion) -> String {
        let protocol = if client_version.is_supported() {
            client_version
        } else {
            *ProtocolVersion::SUPPORTED.last().expect("versions exist")
        };
        let payload = StatusPayload {
            version: StatusVersion {
                name: "1.8-1.13",
                protocol: protocol.0,
            },
            players: StatusPlayers {
                max: self.config.max_players,
                online: self.player_count(),
                sample: Vec::new(),
            },
            description: TextComponent {
                text: self.config.motd.clone(),
            },
        };
        serde_json::to_string(&payload).expect("status payload always serializes")
    }
}

#[derive(Serialize)]
struct StatusPayload {
    version: StatusVersion,
    players: StatusPlayers,
    description: TextComponent,
}

#[derive(Serialize)]
struct StatusVersion {
    name: &'static str,
    protocol: i32,
}

#[derive(Serialize)]
struct StatusPlayers {
    max: u32,
    online: usize,
    sample: Vec<StatusSample>,
}

#[derive(Serialize)]
struct StatusSample {
    name: String,
    id: String,
}

/// Accepts client connections forever, spawning a driver per connection.
pub async fn run(ctx: Arc<ProxyContext>, listener: TcpListener) -> anyhow::Result<()> {
    loop {
        let (stream, remote_address) = listener.accept().await.context("listener closed")?;
        tracing::info!("Accepted connection from {remote_address}");

        let handler =
            SessionHandler::ClientHandshake(client::HandshakeSessionHandler::new(ctx.clone()));
        let driver = ConnectionDriver::new(
            stream,
            Direction::Serverbound,
            Association::Client(remote_address),
            handler,
        );
        tokio::spawn(driver.run());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ProxyConfig {
        ProxyConfig {
            motd: "test".into(),
            max_players: 10,
            compression_threshold: -1,
            forwarding_mode: ForwardingMode::None,
        }
    }

    #[test]
    fn initial_server_follows_registration_order() {
        let ctx = ProxyContext::new(test_config());
        assert!(ctx.initial_server().is_none());

        ctx.register_server(ServerInfo::new("lobby", "127.0.0.1:25566".parse().unwrap()));
        ctx.register_server(ServerInfo::new("pvp", "127.0.0.1:25567".parse().unwrap()));
        assert_eq!(ctx.initial_server().unwrap().name, "lobby");

        ctx.unregister_server("lobby");
        assert_eq!(ctx.initial_server().unwrap().name, "pvp");
    }

    #[test]
    fn status_json_echoes_supported_version() {
        let ctx = ProxyContext::new(test_config());
        let status = ctx.status_json(ProtocolVersion::MINECRAFT_1_12_2);
        assert!(status.contains(r#""protocol":340"#));
        assert!(status.contains(r#""text":"test""#));

        // Unsupported clients are offered our newest version instead.
        let status = ctx.status_json(ProtocolVersion(9999));
        assert!(status.contains(r#""protocol":393"#));
    }
}
