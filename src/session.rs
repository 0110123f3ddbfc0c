//! Session handlers: one strategy object per protocol phase, installed on
//! a connection and swapped out as the phase advances.
//!
//! Exactly one handler is active per connection at any instant. The
//! connection driver calls `activated` when a handler is installed,
//! `handle` for every decoded inbound packet, `exception` when decode or
//! IO fails, and `deactivated` when the handler is replaced or the
//! connection goes away.

pub mod backend;
pub mod client;

use crate::{connection::Connection, protocol::packet::InboundPacket};

/// The active per-phase strategy for one connection.
pub enum SessionHandler {
    ClientHandshake(client::HandshakeSessionHandler),
    ClientStatus(client::StatusSessionHandler),
    ClientLogin(client::LoginSessionHandler),
    ClientPlay(client::PlaySessionHandler),
    BackendLogin(backend::LoginSessionHandler),
    BackendPlay(backend::PlaySessionHandler),
}

impl SessionHandler {
    pub fn activated(&mut self, conn: &mut Connection) {
        if let SessionHandler::BackendLogin(handler) = self {
            handler.activated(conn);
        }
    }

    pub fn handle(&mut self, conn: &mut Connection, packet: InboundPacket) -> anyhow::Result<()> {
        match self {
            SessionHandler::ClientHandshake(handler) => handler.handle(conn, packet),
            SessionHandler::ClientStatus(handler) => handler.handle(conn, packet),
            SessionHandler::ClientLogin(handler) => handler.handle(conn, packet),
            SessionHandler::ClientPlay(handler) => handler.handle(conn, packet),
            SessionHandler::BackendLogin(handler) => handler.handle(conn, packet),
            SessionHandler::BackendPlay(handler) => handler.handle(conn, packet),
        }
    }

    pub fn deactivated(&mut self, conn: &mut Connection) {
        match self {
            SessionHandler::ClientLogin(handler) => handler.deactivated(conn),
            SessionHandler::ClientPlay(handler) => handler.deactivated(conn),
            SessionHandler::BackendLogin(handler) => handler.deactivated(conn),
            SessionHandler::BackendPlay(handler) => handler.deactivated(conn),
            SessionHandler::ClientHandshake(_) | SessionHandler::ClientStatus(_) => {}
        }
    }

    pub fn exception(&mut self, conn: &mut Connection, error: &anyhow::Error) {
        match self {
            SessionHandler::BackendLogin(handler) => handler.exception(conn, error),
            SessionHandler::BackendPlay(handler) => handler.exception(conn, error),
            _ => {
                tracing::debug!(connection = %conn.association(), "client error: {error:#}");
            }
        }
    }
}
