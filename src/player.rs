//! A player logged into the proxy, and their Mojang-style game profile.

use crate::{
    connection::ConnectionHandle,
    protocol::ProtocolVersion,
    server_connection::{ServerConnection, ServerInfo},
};
use serde::{Deserialize, Serialize};
use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
};
use uuid::Uuid;

/// One signed profile property ("textures" and friends), in the JSON
/// shape the Mojang session server uses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileProperty {
    pub name: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GameProfile {
    pub uuid: Uuid,
    pub name: String,
    pub properties: Vec<ProfileProperty>,
}

impl GameProfile {
    /// Derives the deterministic offline-mode profile for a username.
    pub fn offline(username: &str) -> Self {
        let uuid = Uuid::new_v3(
            &Uuid::NAMESPACE_OID,
            format!("OfflinePlayer:{username}").as_bytes(),
        );
        Self {
            uuid,
            name: username.to_owned(),
            properties: Vec::new(),
        }
    }

    /// The UUID without dashes, as forwarded to backends.
    pub fn undashed_id(&self) -> String {
        self.uuid.simple().to_string()
    }
}

/// A player whose login on the client side has completed.
///
/// The player's client connection and backend connection run on separate
/// tasks; the active-backend slot below is the one piece of state they
/// share, swapped under a short-lived mutex.
pub struct ConnectedPlayer {
    profile: GameProfile,
    remote_address: SocketAddr,
    protocol_version: ProtocolVersion,
    client: ConnectionHandle,
    connected_server: Mutex<Option<Arc<ServerConnection>>>,
}

impl ConnectedPlayer {
    pub fn new(
        profile: GameProfile,
        remote_address: SocketAddr,
        protocol_version: ProtocolVersion,
        client: ConnectionHandle,
    ) -> Arc<Self> {
        Arc::new(Self {
            profile,
            remote_address,
            protocol_version,
            client,
            connected_server: Mutex::new(None),
        })
    }

    pub fn username(&self) -> &str {
        &self.profile.name
    }

    pub fn uuid(&self) -> Uuid {
        self.profile.uuid
    }

    pub fn profile(&self) -> &GameProfile {
        &self.profile
    }

    pub fn remote_address(&self) -> SocketAddr {
        self.remote_address
    }

    pub fn protocol_version(&self) -> ProtocolVersion {
        self.protocol_version
    }

    pub fn client(&self) -> &ConnectionHandle {
        &self.client
    }

    /// The backend currently receiving this player's traffic, if any.
    pub fn connected_server(&self) -> Option<Arc<ServerConnection>> {
        self.connected_server.lock().unwrap().clone()
    }

    pub fn set_connected_server(&self, server: Arc<ServerConnection>) {
        *self.connected_server.lock().unwrap() = Some(server);
    }

    /// Clears the active-backend slot only if it still points at `server`.
    /// Returns whether the slot was cleared.
    pub fn clear_connected_server_if(&self, server: &Arc<ServerConnection>) -> bool {
        let mut slot = self.connected_server.lock().unwrap();
        match &*slot {
            Some(current) if Arc::ptr_eq(current, server) => {
                *slot = None;
                true
            }
            _ => false,
        }
    }

    /// Closes the active backend connection, if any. Used when the player
    /// leaves the proxy.
    pub fn close_connected_server(&self) {
        if let Some(server) = self.connected_server.lock().unwrap().take() {
            server.disconnect();
        }
    }

    /// Error-reporting sink for backend failures: the problem is presented
    /// to the player, never raised as a proxy fault.
    pub fn handle_connection_exception(&self, server: &ServerInfo, reason: &str) {
        tracing::warn!(
            player = self.username(),
            server = server.name.as_str(),
            "backend connection failed: {reason}"
        );
        self.disconnect(&format!("Unable to connect to {}: {reason}", server.name));
    }

    /// Kicks the player with the given plain-text reason.
    pub fn disconnect(&self, reason: &str) {
        self.client.disconnect(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_profiles_are_deterministic() {
        let a = GameProfile::offline("Notch");
        let b = GameProfile::offline("Notch");
        assert_eq!(a.uuid, b.uuid);
        assert_ne!(a.uuid, GameProfile::offline("jeb_").uuid);
        assert_eq!(a.undashed_id().len(), 32);
    }

    #[test]
    fn property_json_matches_mojang_shape() {
        let unsigned = ProfileProperty {
            name: "textures".into(),
            value: "dGVzdA==".into(),
            signature: None,
        };
        assert_eq!(
            serde_json::to_string(&unsigned).unwrap(),
            r#"{"name":"textures","value":"dGVzdA=="}"#
        );
    }
}
