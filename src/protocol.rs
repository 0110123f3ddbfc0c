//! Wire-protocol primitives: protocol versions, the connection state
//! machine, and the raw bitstream encoder/decoder.

mod decoder;
mod encoder;
pub mod framing;
pub mod packet;

pub use decoder::{Decode, DecodeError, Decoder};
pub use encoder::{Encode, Encoder};

/// Limit to avoid out-of-memory DOS.
pub(crate) const BUFFER_LIMIT: usize = 1024 * 1024; // 1 MiB

/// A Minecraft protocol version number, as sent in the handshake.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProtocolVersion(pub i32);

impl ProtocolVersion {
    pub const MINECRAFT_1_8: ProtocolVersion = ProtocolVersion(47);
    pub const MINECRAFT_1_9: ProtocolVersion = ProtocolVersion(107);
    pub const MINECRAFT_1_9_4: ProtocolVersion = ProtocolVersion(110);
    pub const MINECRAFT_1_11: ProtocolVersion = ProtocolVersion(315);
    pub const MINECRAFT_1_12: ProtocolVersion = ProtocolVersion(335);
    pub const MINECRAFT_1_12_1: ProtocolVersion = ProtocolVersion(338);
    pub const MINECRAFT_1_12_2: ProtocolVersion = ProtocolVersion(340);
    pub const MINECRAFT_1_13: ProtocolVersion = ProtocolVersion(393);

    /// Every version this proxy will accept from a handshake.
    pub const SUPPORTED: &'static [ProtocolVersion] = &[
        Self::MINECRAFT_1_8,
        Self::MINECRAFT_1_9,
        Self::MINECRAFT_1_9_4,
        Self::MINECRAFT_1_11,
        Self::MINECRAFT_1_12,
        Self::MINECRAFT_1_12_1,
        Self::MINECRAFT_1_12_2,
        Self::MINECRAFT_1_13,
    ];

    pub fn is_supported(self) -> bool {
        Self::SUPPORTED.contains(&self)
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which endpoint produced a packet.
///
/// `Serverbound` packets travel client -> proxy -> backend;
/// `Clientbound` packets travel backend -> proxy -> client.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Serverbound,
    Clientbound,
}

/// Protocol state of one connection.
///
/// The only legal progression is Handshake -> (Status | Login) -> Play;
/// there is no way back to an earlier state.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProtocolState {
    Handshake,
    Status,
    Login,
    Play,
}

impl ProtocolState {
    /// Whether the state machine may advance from `self` to `next`.
    pub fn allows_transition_to(self, next: ProtocolState) -> bool {
        use ProtocolState::*;
        matches!(
            (self, next),
            (Handshake, Status) | (Handshake, Login) | (Login, Play)
        )
    }
}

impl std::fmt::Display for ProtocolState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProtocolState::Handshake => "handshake",
            ProtocolState::Status => "status",
            ProtocolState::Login => "login",
            ProtocolState::Play => "play",
        };
        f.write_str(name)
    }
}
