use crate::protocol::{
    packet::OutboundPacket, Decode, DecodeError, Decoder, Encoder, ProtocolState, ProtocolVersion,
};
use minecraft_relay_proxy_macros::{Decode, Encode};

const LOGIN_START_ID: i32 = 0x00;
const ENCRYPTION_RESPONSE_ID: i32 = 0x01;
/// Only registered from 1.13, which introduced login plugin messages.
const LOGIN_PLUGIN_RESPONSE_ID: i32 = 0x02;

#[derive(Debug, Clone, strum::AsRefStr)]
pub enum Packet {
    LoginStart(LoginStart),
    EncryptionResponse(EncryptionResponse),
    LoginPluginResponse(LoginPluginResponse),
}

impl Packet {
    pub fn decode(version: ProtocolVersion, decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let id = decoder.read_var_int()?;
        match id {
            LOGIN_START_ID => LoginStart::decode(decoder).map(Packet::LoginStart),
            ENCRYPTION_RESPONSE_ID => {
                EncryptionResponse::decode(decoder).map(Packet::EncryptionResponse)
            }
            LOGIN_PLUGIN_RESPONSE_ID if version >= ProtocolVersion::MINECRAFT_1_13 => {
                LoginPluginResponse::decode(decoder).map(Packet::LoginPluginResponse)
            }
            id => Err(DecodeError::UnknownPacketId {
                state: ProtocolState::Login,
                id,
            }),
        }
    }
}

impl OutboundPacket for Packet {
    fn encode(&self, _version: ProtocolVersion, encoder: &mut Encoder) {
        match self {
            Packet::LoginStart(body) => {
                encoder.write_var_int(LOGIN_START_ID);
                crate::protocol::Encode::encode(body, encoder);
            }
            Packet::EncryptionResponse(body) => {
                encoder.write_var_int(ENCRYPTION_RESPONSE_ID);
                crate::protocol::Encode::encode(body, encoder);
            }
            Packet::LoginPluginResponse(body) => {
                encoder.write_var_int(LOGIN_PLUGIN_RESPONSE_ID);
                crate::protocol::Encode::encode(body, encoder);
            }
        }
    }

    fn name(&self) -> &str {
        self.as_ref()
    }
}

/// Starts the login exchange; carries only the claimed username.
#[derive(Debug, Clone, Encode, Decode)]
pub struct LoginStart {
    pub username: String,
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct EncryptionResponse {
    #[encoding(length_prefix = "varint")]
    pub shared_secret: Vec<u8>,
    #[encoding(length_prefix = "varint")]
    pub verify_token: Vec<u8>,
}

/// Reply to a [`crate::protocol::packet::server::login::LoginPluginRequest`];
/// the proxy answers the identity-forwarding request with one of these.
#[derive(Debug, Clone, Encode, Decode)]
pub struct LoginPluginResponse {
    #[encoding(varint)]
    pub message_id: i32,
    pub success: bool,
    #[encoding(length_prefix = "inferred")]
    pub data: Vec<u8>,
}

pub(crate) fn registered_ids(version: ProtocolVersion) -> Vec<i32> {
    let mut ids = vec![LOGIN_START_ID, ENCRYPTION_RESPONSE_ID];
    if version >= ProtocolVersion::MINECRAFT_1_13 {
        ids.push(LOGIN_PLUGIN_RESPONSE_ID);
    }
    ids
}
