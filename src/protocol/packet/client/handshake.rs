use crate::protocol::{
    packet::OutboundPacket, Decode, DecodeError, Decoder, Encoder, ProtocolState, ProtocolVersion,
};
use minecraft_relay_proxy_macros::{Decode, Encode};

const HANDSHAKE_ID: i32 = 0x00;

#[derive(Debug, Clone, strum::AsRefStr)]
pub enum Packet {
    Handshake(Handshake),
}

impl Packet {
    /// The handshake is decoded before any version is negotiated, so the
    /// registry for this state is version-independent.
    pub fn decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        match decoder.read_var_int()? {
            HANDSHAKE_ID => Handshake::decode(decoder).map(Packet::Handshake),
            id => Err(DecodeError::UnknownPacketId {
                state: ProtocolState::Handshake,
                id,
            }),
        }
    }
}

impl OutboundPacket for Packet {
    fn encode(&self, _version: ProtocolVersion, encoder: &mut Encoder) {
        match self {
            Packet::Handshake(body) => {
                encoder.write_var_int(HANDSHAKE_ID);
                crate::protocol::Encode::encode(body, encoder);
            }
        }
    }

    fn name(&self) -> &str {
        self.as_ref()
    }
}

/// Opens every connection: declares the client's protocol version, the
/// address it connected to, and which state it wants to enter next.
#[derive(Debug, Clone, Encode, Decode)]
pub struct Handshake {
    #[encoding(varint)]
    pub protocol_version: i32,
    pub server_address: String,
    pub server_port: u16,
    pub next_state: NextState,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Encode, Decode)]
#[encoding(discriminant = "varint")]
pub enum NextState {
    #[encoding(id = 1)]
    Status,
    #[encoding(id = 2)]
    Login,
}

pub(crate) fn registered_ids() -> Vec<i32> {
    vec![HANDSHAKE_ID]
}
