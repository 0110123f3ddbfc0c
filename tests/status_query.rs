//! The server-list status path: one response, one ping echo.

use minecraft_relay_proxy::{
    forwarding::ForwardingMode,
    protocol::{
        framing::{FrameDecoder, FrameEncoder},
        packet::{self, client, server, InboundPacket, OutboundPacket},
        Direction, ProtocolState, ProtocolVersion,
    },
    proxy::{self, ProxyConfig, ProxyContext},
};
use std::time::Duration;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    time::timeout,
};

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn status_query_reports_motd_and_echoes_ping() {
    let ctx = ProxyContext::new(ProxyConfig {
        motd: "status test".into(),
        max_players: 7,
        compression_threshold: -1,
        forwarding_mode: ForwardingMode::None,
    });
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(proxy::run(ctx, listener));

    let version = ProtocolVersion::MINECRAFT_1_12_2;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let mut decoder = FrameDecoder::new();
    let mut encoder = FrameEncoder::new();

    send(
        &mut stream,
        &mut encoder,
        &client::handshake::Packet::Handshake(client::handshake::Handshake {
            protocol_version: version.0,
            server_address: "proxy.test".into(),
            server_port: addr.port(),
            next_state: client::handshake::NextState::Status,
        }),
        version,
    )
    .await;
    send(
        &mut stream,
        &mut encoder,
        &client::status::Packet::Request(client::status::Request {}),
        version,
    )
    .await;

    let frame = read_frame(&mut stream, &mut decoder).await.unwrap();
    let packet =
        packet::decode(ProtocolState::Status, Direction::Clientbound, version, &frame).unwrap();
    let InboundPacket::StatusClientbound(server::status::Packet::Response(response)) = packet
    else {
        panic!("expected a status response");
    };
    assert!(response.status.contains(r#""text":"status test""#));
    assert!(response.status.contains(r#""max":7"#));
    assert!(response.status.contains(r#""protocol":340"#));

    send(
        &mut stream,
        &mut encoder,
        &client::status::Packet::Ping(client::status::Ping { payload: 0x1234 }),
        version,
    )
    .await;
    let frame = read_frame(&mut stream, &mut decoder).await.unwrap();
    let packet =
        packet::decode(ProtocolState::Status, Direction::Clientbound, version, &frame).unwrap();
    let InboundPacket::StatusClientbound(server::status::Packet::Pong(pong)) = packet else {
        panic!("expected a pong");
    };
    assert_eq!(pong.payload, 0x1234);

    // The proxy hangs up after the ping exchange.
    timeout(TEST_TIMEOUT, async {
        let mut buf = [0u8; 64];
        loop {
            if stream.read(&mut buf).await.unwrap_or(0) == 0 {
                return;
            }
        }
    })
    .await
    .expect("proxy closes the status connection");
}

async fn send(
    stream: &mut TcpStream,
    encoder: &mut FrameEncoder,
    packet: &impl OutboundPacket,
    version: ProtocolVersion,
) {
    let payload = packet::encode_payload(packet, version);
    let frame = encoder.encode(&payload).unwrap();
    stream.write_all(&frame).await.unwrap();
}

async fn read_frame(
    stream: &mut TcpStream,
    decoder: &mut FrameDecoder,
) -> anyhow::Result<Vec<u8>> {
    timeout(TEST_TIMEOUT, async {
        let mut buf = [0u8; 4096];
        loop {
            if let Some(frame) = decoder.next_frame()? {
                return Ok(frame);
            }
            let n = stream.read(&mut buf).await?;
            if n == 0 {
                anyhow::bail!("connection closed");
            }
            decoder.give_data(&mut buf[..n]);
        }
    })
    .await
    .map_err(|_| anyhow::anyhow!("timed out waiting for a frame"))?
}
