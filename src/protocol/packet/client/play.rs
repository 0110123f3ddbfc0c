use crate::protocol::{
    packet::{decode_remaining, OutboundPacket},
    DecodeError, Decoder, Encoder, ProtocolVersion,
};

/// Serverbound Play traffic is never interpreted by the proxy; every
/// packet decodes to an opaque body forwarded to the active backend.
#[derive(Debug, Clone, strum::AsRefStr)]
pub enum Packet {
    Unknown { id: i32, data: Vec<u8> },
}

impl Packet {
    pub fn decode(_version: ProtocolVersion, decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let id = decoder.read_var_int()?;
        Ok(Packet::Unknown {
            id,
            data: decode_remaining(decoder),
        })
    }
}

impl OutboundPacket for Packet {
    fn encode(&self, _version: ProtocolVersion, encoder: &mut Encoder) {
        match self {
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
