use crate::protocol::{
    packet::OutboundPacket, Decode, DecodeError, Decoder, Encoder, ProtocolState, ProtocolVersion,
};
use minecraft_relay_proxy_macros::{Decode, Encode};

const RESPONSE_ID: i32 = 0x00;
const PONG_ID: i32 = 0x01;

#[derive(Debug, Clone, strum::AsRefStr)]
pub enum Packet {
    Response(Response),
    Pong(Pong),
}

impl Packet {
    pub fn decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        match decoder.read_var_int()? {
            RESPONSE_ID => Response::decode(decoder).map(Packet::Response),
            PONG_ID => Pong::decode(decoder).map(Packet::Pong),
            id => Err(DecodeError::UnknownPacketId {
                state: ProtocolState::Status,
                id,
            }),
        }
    }
}

impl OutboundPacket for Packet {
    fn encode(&self, _version: ProtocolVersion, encoder: &mut Encoder) {
        match self {
            Packet::Response(body) => {
                encoder.write_var_int(RESPONSE_ID);
                crate::protocol::Encode::encode(body, encoder);
            }
            Packet::Pong(body) => {
                encoder.write_var_int(PONG_ID);
                crate::protocol::Encode::encode(body, encoder);
            }
        }
    }

    fn name(&self) -> &str {
        self.as_ref()
    }
}

/// JSON status document: version, player counts, MOTD.
#[derive(Debug, Clone, Encode, Decode)]
pub struct Response {
    pub status: String,
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct Pong {
    pub payload: i64,
}

pub(crate) fn registered_ids() -> Vec<i32> {
    vec![RESPONSE_ID, PONG_ID]
}
