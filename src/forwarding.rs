//! Conveying a player's verified identity to a backend that trusts
//! the proxy.
//!
//! Two mechanisms exist. Legacy forwarding smuggles the identity into the
//! handshake's server-address field, separated by NUL bytes. Modern
//! forwarding answers a login-phase plugin message on a well-known channel
//! with a binary payload instead, which lets the backend refuse
//! connections that bypass the proxy.

use crate::{
    player::{GameProfile, ProfileProperty},
    protocol::{Decode, DecodeError, Decoder, Encoder},
};
use clap::ValueEnum;

/// Channel identifier of the login plugin message used for modern
/// forwarding. Fixed constant agreed upon by proxy and backend.
pub const FORWARDING_CHANNEL: &str = "velocity:player_info";

/// How player identity is asserted towards backends.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ForwardingMode {
    /// Backends see the proxy's address; no identity is forwarded.
    None,
    /// BungeeCord-style injection into the handshake server address:
    /// `host\0clientIP\0undashedUUID\0jsonProperties`.
    Legacy,
    /// Signed plugin-message exchange during the backend login.
    Modern,
}

/// Builds the legacy forwarding server-address string. The UUID is passed
/// through verbatim; callers hand in the profile's undashed form.
pub fn legacy_forwarding_address(
    host: &str,
    client_ip: &str,
    uuid: &str,
    properties: &[ProfileProperty],
) -> String {
    let properties =
        serde_json::to_string(properties).expect("profile properties always serialize");
    format!("{host}\0{client_ip}\0{uuid}\0{properties}")
}

/// Binary payload answering the backend's forwarding request in
/// modern mode.
#[derive(Debug, Clone)]
pub struct ForwardingData {
    pub client_address: String,
    pub profile: GameProfile,
}

impl ForwardingData {
    pub fn new(client_address: String, profile: GameProfile) -> Self {
        Self {
            client_address,
            profile,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut data = Vec::new();
        let mut encoder = Encoder::new(&mut data);
        encoder.write_string(&self.client_address);
        encoder.write_uuid(self.profile.uuid);
        encoder.write_string(&self.profile.name);
        encoder.write_var_int(self.profile.properties.len().try_into().unwrap_or(i32::MAX));
        for property in &self.profile.properties {
            encoder.write_string(&property.name);
            encoder.write_string(&property.value);
            match &property.signature {
                Some(signature) => {
                    encoder.write_bool(true);
                    encoder.write_string(signature);
                }
                None => encoder.write_bool(false),
            }
        }
        data
    }

    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let mut decoder = Decoder::new(data);
        let client_address = String::decode(&mut decoder)?;
        let uuid = decoder.read_uuid()?;
        let name = String::decode(&mut decoder)?;

        let property_count = usize::try_from(decoder.read_var_int()?)?;
        let mut properties = Vec::with_capacity(property_count.min(16));
        for _ in 0..property_count {
            let name = String::decode(&mut decoder)?;
            let value = String::decode(&mut decoder)?;
            let signature = if decoder.read_bool()? {
                Some(String::decode(&mut decoder)?)
            } else {
                None
            };
            properties.push(ProfileProperty {
                name,
                value,
                signature,
            });
        }

        Ok(Self {
            client_address,
            profile: GameProfile {
                uuid,
                name,
                properties,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn legacy_address_layout() {
        let address = legacy_forwarding_address(
            "mc.example.com",
            "1.2.3.4",
            "123e4567-e89b-12d3-a456-426614174000",
            &[],
        );
        assert_eq!(
            address,
            "mc.example.com\x001.2.3.4\x00123e4567-e89b-12d3-a456-426614174000\x00[]"
        );
    }

    #[test]
    fn legacy_address_includes_signed_properties() {
        let properties = vec![ProfileProperty {
            name: "textures".into(),
            value: "abc".into(),
            signature: Some("sig".into()),
        }];
        let address = legacy_forwarding_address("host", "127.0.0.1", "id", &properties);
        let json = address.split('\0').nth(3).unwrap();
        assert_eq!(
            json,
            r#"[{"name":"textures","value":"abc","signature":"sig"}]"#
        );
    }

    #[test]
    fn forwarding_data_roundtrip() {
        let profile = GameProfile {
            uuid: Uuid::new_v3(&Uuid::NAMESPACE_OID, b"OfflinePlayer:Notch"),
            name: "Notch".into(),
            properties: vec![
                ProfileProperty {
                    name: "textures".into(),
                    value: "payload".into(),
                    signature: Some("signed".into()),
                },
                ProfileProperty {
                    name: "other".into(),
                    value: "x".into(),
                    signature: None,
                },
            ],
        };
        let data = ForwardingData::new("10.0.0.7".into(), profile);

        let decoded = ForwardingData::decode(&data.encode()).unwrap();
        assert_eq!(decoded.client_address, data.client_address);
        assert_eq!(decoded.profile.uuid, data.profile.uuid);
        assert_eq!(decoded.profile.name, "Notch");
        assert_eq!(decoded.profile.properties.len(), 2);
        assert_eq!(
            decoded.profile.properties[0].signature.as_deref(),
            Some("signed")
        );
        assert_eq!(decoded.profile.properties[1].signature, None);
    }

    #[test]
    fn truncated_forwarding_data_fails() {
        let profile = GameProfile::offline("Notch");
        let data = ForwardingData::new("10.0.0.7".into(), profile).encode();
        assert!(ForwardingData::decode(&data[..data.len() - 1]).is_err());
    }
}
