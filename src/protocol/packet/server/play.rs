use crate::protocol::{
    packet::{decode_remaining, OutboundPacket},
    Decode, DecodeError, Decoder, Encoder, ProtocolVersion,
};
use minecraft_relay_proxy_macros::{Decode, Encode};

/// The one clientbound Play packet the proxy must recognize: a backend
/// kicking the player. Its ID moved twice across the supported versions.
fn disconnect_id(version: ProtocolVersion) -> i32 {
    if version >= ProtocolVersion::MINECRAFT_1_13 {
        0x1B
    } else if version >= ProtocolVersion::MINECRAFT_1_9 {
        0x1A
    } else {
        0x40
    }
}

#[derive(Debug, Clone, strum::AsRefStr)]
pub enum Packet {
    Disconnect(Disconnect),
    Unknown { id: i32, data: Vec<u8> },
}

impl Packet {
    pub fn decode(version: ProtocolVersion, decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let id = decoder.read_var_int()?;
        if id == disconnect_id(version) {
            Disconnect::decode(decoder).map(Packet::Disconnect)
        } else {
            Ok(Packet::Unknown {
                id,
                data: decode_remaining(decoder),
            })
        }
    }
}

impl OutboundPacket for Packet {
    fn encode(&self, version: ProtocolVersion, encoder: &mut Encoder) {
        match self {
            Packet::Disconnect(body) => {
                encoder.write_var_int(disconnect_id(version));
                crate::protocol::Encode::encode(body, encoder);
            }
            Packet::Unknown { id, data } => {
                encoder.write_var_int(*id);
                encoder.write_slice(data);
            }
        }
    }

    fn name(&self) -> &str {
        self.as_ref()
    }
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct Disconnect {
    pub reason: String,
}

pub(crate) fn registered_ids(version: ProtocolVersion) -> Vec<i32> {
    vec![disconnect_id(version)]
}
