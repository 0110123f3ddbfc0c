use crate::protocol::{
    packet::OutboundPacket, Decode, DecodeError, Decoder, Encoder, ProtocolState, ProtocolVersion,
};
use minecraft_relay_proxy_macros::{Decode, Encode};

const REQUEST_ID: i32 = 0x00;
const PING_ID: i32 = 0x01;

#[derive(Debug, Clone, strum::AsRefStr)]
pub enum Packet {
    Request(Request),
    Ping(Ping),
}

impl Packet {
    pub fn decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        match decoder.read_var_int()? {
            REQUEST_ID => Request::decode(decoder).map(Packet::Request),
            PING_ID => Ping::decode(decoder).map(Packet::Ping),
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
            Packet::Request(body) => {
                encoder.write_var_int(REQUEST_ID);
                crate::protocol::Encode::encode(body, encoder);
            }
            Packet::Ping(body) => {
                encoder.write_var_int(PING_ID);
                crate::protocol::Encode::encode(body, encoder);
            }
        }
    }

    fn name(&self) -> &str {
        self.as_ref()
    }
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct Request {}

#[derive(Debug, Clone, Encode, Decode)]
pub struct Ping {
    pub payload: i64,
}

pub(crate) fn registered_ids() -> Vec<i32> {
    vec![REQUEST_ID, PING_ID]
}
