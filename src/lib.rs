//! A protocol-aware reverse proxy for Minecraft: clients connect to the
//! proxy, the proxy connects onward to backend servers, and a player's
//! session can be moved between backends without reconnecting.
//!
//! # Proxying process
//! A client connection starts in the Handshake state, which routes it to
//! either the status path (server-list query) or the login path. Once the
//! client login completes, the proxy opens its own connection to a backend
//! and plays the client role there, negotiating identity forwarding when
//! configured. When that backend login succeeds, both connections enter
//! the Play state and traffic is bridged between them opaquely: Play
//! packets are identified only by numeric ID and forwarded byte-for-byte.
//!
//! A later connection to a different backend follows the same login
//! sequence; on success the previous backend connection is closed before
//! the new one takes over, so exactly one backend is active per player.

pub mod config;
pub mod connection;
pub mod forwarding;
pub mod player;
pub mod protocol;
pub mod proxy;
pub mod server_connection;
pub mod session;
pub mod text;
