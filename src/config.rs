//! Command-line configuration.

use crate::{forwarding::ForwardingMode, proxy::ProxyConfig, server_connection::ServerInfo};
use anyhow::{anyhow, Context};
use clap::Parser;
use std::net::{SocketAddr, ToSocketAddrs};

#[derive(Debug, Parser)]
#[command(name = "minecraft-relay-proxy")]
#[command(about = "Reverse proxy that relays Minecraft sessions across backend servers")]
pub struct Options {
    /// Address to accept client connections on.
    #[arg(long, default_value = "0.0.0.0:25577")]
    pub bind: SocketAddr,

    /// Backend server as `name=host:port`. Repeatable; players are sent to
    /// the first one on login.
    #[arg(long = "server", value_name = "NAME=ADDR", required = true)]
    pub servers: Vec<String>,

    /// How player identity is asserted towards backends.
    #[arg(long, value_enum, default_value = "none")]
    pub forwarding: ForwardingMode,

    /// Packet size at which client traffic is compressed; negative
    /// disables compression.
    #[arg(long, default_value_t = 256)]
    pub compression_threshold: i32,

    /// Message shown in the client's server list.
    #[arg(long, default_value = "A Minecraft proxy")]
    pub motd: String,

    #[arg(long, default_value_t = 500)]
    pub max_players: u32,
}

impl Options {
    pub fn proxy_config(&self) -> ProxyConfig {
        ProxyConfig {
            motd: self.motd.clone(),
            max_players: self.max_players,
            compression_threshold: self.compression_threshold,
            forwarding_mode: self.forwarding,
        }
    }

    /// Resolves the `name=host:port` server arguments, in order.
    pub fn parse_servers(&self) -> anyhow::Result<Vec<ServerInfo>> {
        self.servers.iter().map(|entry| parse_server(entry)).collect()
    }
}

fn parse_server(entry: &str) -> anyhow::Result<ServerInfo> {
    let (name, addr) = entry
        .split_once('=')
        .ok_or_else(|| anyhow!("expected `name=host:port`, got `{entry}`"))?;
    if name.is_empty() {
        return Err(anyhow!("empty server name in `{entry}`"));
    }
    let address = addr
        .to_socket_addrs()
        .with_context(|| format!("cannot resolve `{addr}`"))?
        .next()
        .ok_or_else(|| anyhow!("`{addr}` resolved to no addresses"))?;
    Ok(ServerInfo::new(name, address))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_server_entries() {
        let server = parse_server("lobby=127.0.0.1:25566").unwrap();
        assert_eq!(server.name, "lobby");
        assert_eq!(server.address, "127.0.0.1:25566".parse().unwrap());
    }

    #[test]
    fn rejects_malformed_entries() {
        assert!(parse_server("lobby").is_err());
        assert!(parse_server("=127.0.0.1:25566").is_err());
        assert!(parse_server("lobby=not-an-address").is_err());
    }
}
