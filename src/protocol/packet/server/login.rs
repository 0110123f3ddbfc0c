use crate::protocol::{
    packet::OutboundPacket, Decode, DecodeError, Decoder, Encoder, ProtocolState, ProtocolVersion,
};
use minecraft_relay_proxy_macros::{Decode, Encode};

const DISCONNECT_ID: i32 = 0x00;
const ENCRYPTION_REQUEST_ID: i32 = 0x01;
const LOGIN_SUCCESS_ID: i32 = 0x02;
const SET_COMPRESSION_ID: i32 = 0x03;
/// Only registered from 1.13, which introduced login plugin messages.
const LOGIN_PLUGIN_REQUEST_ID: i32 = 0x04;

#[derive(Debug, Clone, strum::AsRefStr)]
pub enum Packet {
    Disconnect(Disconnect),
    EncryptionRequest(EncryptionRequest),
    LoginSuccess(LoginSuccess),
    SetCompression(SetCompression),
    LoginPluginRequest(LoginPluginRequest),
}

impl Packet {
    pub fn decode(version: ProtocolVersion, decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let id = decoder.read_var_int()?;
        match id {
            DISCONNECT_ID => Disconnect::decode(decoder).map(Packet::Disconnect),
            ENCRYPTION_REQUEST_ID => {
                EncryptionRequest::decode(decoder).map(Packet::EncryptionRequest)
            }
            LOGIN_SUCCESS_ID => LoginSuccess::decode(decoder).map(Packet::LoginSuccess),
            SET_COMPRESSION_ID => SetCompression::decode(decoder).map(Packet::SetCompression),
            LOGIN_PLUGIN_REQUEST_ID if version >= ProtocolVersion::MINECRAFT_1_13 => {
                LoginPluginRequest::decode(decoder).map(Packet::LoginPluginRequest)
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
            Packet::Disconnect(body) => {
                encoder.write_var_int(DISCONNECT_ID);
                crate::protocol::Encode::encode(body, encoder);
            }
            Packet::EncryptionRequest(body) => {
                encoder.write_var_int(ENCRYPTION_REQUEST_ID);
                crate::protocol::Encode::encode(body, encoder);
            }
            Packet::LoginSuccess(body) => {
                encoder.write_var_int(LOGIN_SUCCESS_ID);
                crate::protocol::Encode::encode(body, encoder);
            }
            Packet::SetCompression(body) => {
                encoder.write_var_int(SET_COMPRESSION_ID);
                crate::protocol::Encode::encode(body, encoder);
            }
            Packet::LoginPluginRequest(body) => {
                encoder.write_var_int(LOGIN_PLUGIN_REQUEST_ID);
                crate::protocol::Encode::encode(body, encoder);
            }
        }
    }

    fn name(&self) -> &str {
        self.as_ref()
    }
}

/// Terminates the login with a chat-component JSON reason.
#[derive(Debug, Clone, Encode, Decode)]
pub struct Disconnect {
    pub reason: String,
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct EncryptionRequest {
    pub server_id: String,
    #[encoding(length_prefix = "varint")]
    pub public_key: Vec<u8>,
    #[encoding(length_prefix = "varint")]
    pub verify_token: Vec<u8>,
}

/// Completes the login; the UUID travels as its dashed string form
/// in this protocol era.
#[derive(Debug, Clone, Encode, Decode)]
pub struct LoginSuccess {
    pub uuid: String,
    pub username: String,
}

/// Announces the compression threshold for all subsequent frames,
/// in both directions.
#[derive(Debug, Clone, Encode, Decode)]
pub struct SetCompression {
    #[encoding(varint)]
    pub threshold: i32,
}

/// Server-initiated login-phase channel message; identity forwarding
/// rides on this exchange.
#[derive(Debug, Clone, Encode, Decode)]
pub struct LoginPluginRequest {
    #[encoding(varint)]
    pub message_id: i32,
    pub channel: String,
    #[encoding(length_prefix = "inferred")]
    pub data: Vec<u8>,
}

pub(crate) fn registered_ids(version: ProtocolVersion) -> Vec<i32> {
    let mut ids = vec![
        DISCONNECT_ID,
        ENCRYPTION_REQUEST_ID,
        LOGIN_SUCCESS_ID,
        SET_COMPRESSION_ID,
    ];
    if version >= ProtocolVersion::MINECRAFT_1_13 {
        ids.push(LOGIN_PLUGIN_REQUEST_ID);
    }
    ids
}
