//! The per-version packet registry.
//!
//! Full parsing of packets is _not_ implemented. Only the protocol-control
//! and identity-forwarding packets the proxy must act on are decoded into
//! fields; everything else in the Play state decodes to an `Unknown` packet
//! carrying the raw body bytes, which the proxy forwards verbatim. (This
//! preserves roundtrip encoding/decoding without loss of information and
//! keeps the proxy forward-compatible with packets it has never heard of.)
//!
//! Numeric packet IDs are scoped to (state, direction) and may shift
//! between protocol versions; each state module resolves IDs against the
//! negotiated [`ProtocolVersion`].

use crate::protocol::{
    DecodeError, Decoder, Direction, Encoder, ProtocolState, ProtocolVersion,
};

pub mod client;
pub mod server;

/// One decoded inbound packet, tagged by the (state, direction) registry
/// it was resolved against.
#[derive(Debug, Clone)]
pub enum InboundPacket {
    Handshake(client::handshake::Packet),
    StatusServerbound(client::status::Packet),
    LoginServerbound(client::login::Packet),
    PlayServerbound(client::play::Packet),
    StatusClientbound(server::status::Packet),
    LoginClientbound(server::login::Packet),
    PlayClientbound(server::play::Packet),
}

impl InboundPacket {
    /// Short packet name for log lines.
    pub fn name(&self) -> &str {
        match self {
            InboundPacket::Handshake(p) => p.as_ref(),
            InboundPacket::StatusServerbound(p) => p.as_ref(),
            InboundPacket::LoginServerbound(p) => p.as_ref(),
            InboundPacket::PlayServerbound(p) => p.as_ref(),
            InboundPacket::StatusClientbound(p) => p.as_ref(),
            InboundPacket::LoginClientbound(p) => p.as_ref(),
            InboundPacket::PlayClientbound(p) => p.as_ref(),
        }
    }
}

/// Decodes one frame payload against the registry for the connection's
/// current state, inbound direction, and negotiated version.
///
/// Unknown IDs are an error in the Handshake, Status, and Login states
/// and an opaque passthrough packet in Play.
pub fn decode(
    state: ProtocolState,
    direction: Direction,
    version: ProtocolVersion,
    payload: &[u8],
) -> Result<InboundPacket, DecodeError> {
    let mut decoder = Decoder::new(payload);
    match (state, direction) {
        (ProtocolState::Handshake, Direction::Serverbound) => {
            client::handshake::Packet::decode(&mut decoder).map(InboundPacket::Handshake)
        }
        (ProtocolState::Status, Direction::Serverbound) => {
            client::status::Packet::decode(&mut decoder).map(InboundPacket::StatusServerbound)
        }
        (ProtocolState::Status, Direction::Clientbound) => {
            server::status::Packet::decode(&mut decoder).map(InboundPacket::StatusClientbound)
        }
        (ProtocolState::Login, Direction::Serverbound) => {
            client::login::Packet::decode(version, &mut decoder)
                .map(InboundPacket::LoginServerbound)
        }
        (ProtocolState::Login, Direction::Clientbound) => {
            server::login::Packet::decode(version, &mut decoder)
                .map(InboundPacket::LoginClientbound)
        }
        (ProtocolState::Play, Direction::Serverbound) => {
            client::play::Packet::decode(version, &mut decoder).map(InboundPacket::PlayServerbound)
        }
        (ProtocolState::Play, Direction::Clientbound) => {
            server::play::Packet::decode(version, &mut decoder).map(InboundPacket::PlayClientbound)
        }
        // The backend never initiates a handshake towards the proxy.
        (ProtocolState::Handshake, Direction::Clientbound) => Err(DecodeError::UnknownPacketId {
            state,
            id: -1,
        }),
    }
}

/// A typed packet that can be written to a connection: the implementation
/// writes its version-resolved numeric ID followed by the body.
pub trait OutboundPacket: std::fmt::Debug + Send + 'static {
    fn encode(&self, version: ProtocolVersion, encoder: &mut Encoder);

    /// Short packet name for log lines.
    fn name(&self) -> &str;
}

/// Encodes a packet into a frame payload (ID + body).
pub fn encode_payload(packet: &dyn OutboundPacket, version: ProtocolVersion) -> Vec<u8> {
    let mut payload = Vec::new();
    packet.encode(version, &mut Encoder::new(&mut payload));
    payload
}

pub(crate) fn decode_remaining(decoder: &mut Decoder) -> Vec<u8> {
    decoder.buffer().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Every registered (state, direction, version) table must map each
    /// numeric ID to exactly one packet type.
    #[test]
    fn no_packet_id_collisions() {
        for &version in ProtocolVersion::SUPPORTED {
            let tables: [(&str, Vec<i32>); 6] = [
                ("handshake/serverbound", client::handshake::registered_ids()),
                ("status/serverbound", client::status::registered_ids()),
                ("status/clientbound", server::status::registered_ids()),
                ("login/serverbound", client::login::registered_ids(version)),
                ("login/clientbound", server::login::registered_ids(version)),
                ("play/clientbound", server::play::registered_ids(version)),
            ];
            for (table, mut ids) in tables {
                let len = ids.len();
                ids.sort_unstable();
                ids.dedup();
                assert_eq!(ids.len(), len, "duplicate ID in {table} for {version}");
            }
        }
    }

    /// decode followed by encode must reproduce the original payload for
    /// every packet the registry knows by name.
    #[test]
    fn encode_decode_roundtrip_is_identity() {
        let version = ProtocolVersion::MINECRAFT_1_13;
        let cases: Vec<(ProtocolState, Direction, Vec<u8>)> = vec![
            (
                ProtocolState::Handshake,
                Direction::Serverbound,
                encode_payload(
                    &client::handshake::Packet::Handshake(client::handshake::Handshake {
                        protocol_version: version.0,
                        server_address: "play.example.net".into(),
                        server_port: 25565,
                        next_state: client::handshake::NextState::Login,
                    }),
                    version,
                ),
            ),
            (
                ProtocolState::Status,
                Direction::Serverbound,
                encode_payload(
                    &client::status::Packet::Ping(client::status::Ping { payload: -7 }),
                    version,
                ),
            ),
            (
                ProtocolState::Status,
                Direction::Clientbound,
                encode_payload(
                    &server::status::Packet::Response(server::status::Response {
                        status: r#"{"description":{"text":"hi"}}"#.into(),
                    }),
                    version,
                ),
            ),
            (
                ProtocolState::Login,
                Direction::Serverbound,
                encode_payload(
                    &client::login::Packet::LoginPluginResponse(
                        client::login::LoginPluginResponse {
                            message_id: 3,
                            success: true,
                            data: vec![0xAA, 0xBB],
                        },
                    ),
                    version,
                ),
            ),
            (
                ProtocolState::Login,
                Direction::Clientbound,
                encode_payload(
                    &server::login::Packet::LoginPluginRequest(
                        server::login::LoginPluginRequest {
                            message_id: 3,
                            channel: "velocity:player_info".into(),
                            data: vec![0x01],
                        },
                    ),
                    version,
                ),
            ),
            (
                ProtocolState::Login,
                Direction::Clientbound,
                encode_payload(
                    &server::login::Packet::SetCompression(server::login::SetCompression {
                        threshold: 256,
                    }),
                    version,
                ),
            ),
            (
                ProtocolState::Play,
                Direction::Clientbound,
                encode_payload(
                    &server::play::Packet::Disconnect(server::play::Disconnect {
                        reason: r#"{"text":"bye"}"#.into(),
                    }),
                    version,
                ),
            ),
        ];

        for (state, direction, payload) in cases {
            let decoded = decode(state, direction, version, &payload).unwrap();
            let reencoded = match decoded {
                InboundPacket::Handshake(p) => encode_payload(&p, version),
                InboundPacket::StatusServerbound(p) => encode_payload(&p, version),
                InboundPacket::StatusClientbound(p) => encode_payload(&p, version),
                InboundPacket::LoginServerbound(p) => encode_payload(&p, version),
                InboundPacket::LoginClientbound(p) => encode_payload(&p, version),
                InboundPacket::PlayServerbound(p) => encode_payload(&p, version),
                InboundPacket::PlayClientbound(p) => encode_payload(&p, version),
            };
            assert_eq!(reencoded, payload, "roundtrip mismatch in {state}");
        }
    }

    #[test]
    fn unknown_login_id_is_a_protocol_violation() {
        let payload = [0x7F, 0x01, 0x02];
        let err = decode(
            ProtocolState::Login,
            Direction::Clientbound,
            ProtocolVersion::MINECRAFT_1_12_2,
            &payload,
        )
        .unwrap_err();
        assert!(matches!(err, DecodeError::UnknownPacketId { .. }));
    }

    #[test]
    fn unknown_play_id_passes_through_byte_for_byte() {
        let payload = [0x63, 0xDE, 0xAD, 0xBE, 0xEF];
        let decoded = decode(
            ProtocolState::Play,
            Direction::Clientbound,
            ProtocolVersion::MINECRAFT_1_12_2,
            &payload,
        )
        .unwrap();

        let InboundPacket::PlayClientbound(packet) = decoded else {
            panic!("wrong direction");
        };
        let server::play::Packet::Unknown { id, ref data } = packet else {
            panic!("expected opaque packet");
        };
        assert_eq!(id, 0x63);
        assert_eq!(data, &[0xDE, 0xAD, 0xBE, 0xEF]);

        let reencoded = encode_payload(&packet, ProtocolVersion::MINECRAFT_1_12_2);
        assert_eq!(reencoded, payload);
    }
}
