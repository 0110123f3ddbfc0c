use clap::Parser;
use minecraft_relay_proxy::{config::Options, proxy, proxy::ProxyContext};
use tokio::net::TcpListener;

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let options = Options::parse();
    let servers = options.parse_servers()?;

    let ctx = ProxyContext::new(options.proxy_config());
    for server in servers {
        tracing::info!("Registered server {} at {}", server.name, server.address);
        ctx.register_server(server);
    }

    let listener = TcpListener::bind(options.bind).await?;
    tracing::info!("Listening on {}", options.bind);

    proxy::run(ctx, listener).await
}
