//! Client role end to end: PT negotiation, SOCKS5 front end, engine relay

mod common;

use async_socks5::Auth;
use common::{
    closed_port_addr, pt_env, spawn_echo_server, test_config, wait_for_active, wait_until_refused,
};
use std::net::SocketAddr;
use std::time::Duration;
use stegorelay::controller::ClientTransport;
use stegorelay::pt::Reporter;
use stegorelay::relay::TrackerState;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

fn client_env(transports: &str) -> std::collections::HashMap<String, String> {
    pt_env(&[
        ("TOR_PT_MANAGED_TRANSPORT_VER", "1"),
        ("TOR_PT_CLIENT_TRANSPORTS", transports),
    ])
}

fn bridge() -> SocketAddr {
    "192.0.2.10:443".parse().unwrap()
}

async fn socks_connect(
    proxy: SocketAddr,
    auth: Option<Auth>,
) -> Result<TcpStream, async_socks5::Error> {
    let mut stream = TcpStream::connect(proxy).await.unwrap();
    async_socks5::connect(&mut stream, bridge(), auth).await?;
    Ok(stream)
}

#[tokio::test]
async fn test_client_relays_to_engine() {
    let engine = spawn_echo_server().await;
    let config = test_config(engine);
    let mut reporter = Reporter::new(Vec::new());

    let launched = ClientTransport::launch(&config, &client_env("st-transparent"), &mut reporter)
        .await
        .unwrap();

    let proxy = launched.methods()[0].addr;
    let output = String::from_utf8(reporter.into_inner()).unwrap();
    assert_eq!(
        output,
        format!(
            "VERSION 1\nCMETHOD st-transparent socks5 {}\nCMETHODS DONE\n",
            proxy
        )
    );

    // The requested bridge is ignored: everything lands on the engine
    let mut stream = socks_connect(proxy, None).await.unwrap();
    stream.write_all(b"steg payload").await.unwrap();
    let mut buf = [0u8; 12];
    stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"steg payload");

    wait_for_active(launched.tracker(), 1).await;
    drop(stream);
    wait_for_active(launched.tracker(), 0).await;

    timeout(Duration::from_secs(5), launched.shutdown())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_client_accepts_pt_args() {
    let engine = spawn_echo_server().await;
    let config = test_config(engine);
    let mut reporter = Reporter::new(Vec::new());
    let launched = ClientTransport::launch(&config, &client_env("*"), &mut reporter)
        .await
        .unwrap();

    let auth = Auth {
        username: "shared-secret=abc;mode=chop".to_string(),
        password: "\0".to_string(),
    };
    let mut stream = socks_connect(launched.methods()[0].addr, Some(auth))
        .await
        .unwrap();
    stream.write_all(b"x").await.unwrap();
    let mut buf = [0u8; 1];
    stream.read_exact(&mut buf).await.unwrap();

    drop(stream);
    timeout(Duration::from_secs(5), launched.shutdown())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_engine_unreachable_rejects_request() {
    let config = test_config(closed_port_addr().await);
    let mut reporter = Reporter::new(Vec::new());
    let launched = ClientTransport::launch(&config, &client_env("st-transparent"), &mut reporter)
        .await
        .unwrap();

    // Speak SOCKS5 by hand so the exact reply code is visible
    let mut stream = TcpStream::connect(launched.methods()[0].addr).await.unwrap();
    stream.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
    let mut method = [0u8; 2];
    stream.read_exact(&mut method).await.unwrap();
    assert_eq!(method, [0x05, 0x00]);

    stream
        .write_all(&[0x05, 0x01, 0x00, 0x01, 192, 0, 2, 10, 0x01, 0xbb])
        .await
        .unwrap();
    let mut reply = [0u8; 10];
    timeout(Duration::from_secs(5), stream.read_exact(&mut reply))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply[0], 0x05);
    assert_eq!(reply[1], 0x05, "expected CONNECTION_REFUSED, got {:#04x}", reply[1]);
    assert_eq!(reply[3], 0x01);

    // Nothing follows the refusal
    let mut rest = Vec::new();
    let read = timeout(Duration::from_secs(5), stream.read_to_end(&mut rest))
        .await
        .unwrap();
    assert!(read.is_err() || rest.is_empty());

    wait_for_active(launched.tracker(), 0).await;
    let tracker = launched.tracker().clone();
    timeout(Duration::from_secs(5), launched.shutdown())
        .await
        .unwrap();
    assert_eq!(tracker.state(), TrackerState::Drained);
}

#[tokio::test]
async fn test_unsupported_method_reported_alone() {
    let engine = spawn_echo_server().await;
    let config = test_config(engine);
    let mut reporter = Reporter::new(Vec::new());
    let launched = ClientTransport::launch(
        &config,
        &client_env("obfs4,st-transparent,meek"),
        &mut reporter,
    )
    .await
    .unwrap();

    let lines: Vec<String> = String::from_utf8(reporter.into_inner())
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect();
    assert_eq!(lines.len(), 5);
    assert_eq!(lines[0], "VERSION 1");
    assert_eq!(lines[1], "CMETHOD-ERROR obfs4 no such method");
    assert!(lines[2].starts_with("CMETHOD st-transparent socks5 127.0.0.1:"));
    assert_eq!(lines[3], "CMETHOD-ERROR meek no such method");
    assert_eq!(lines[4], "CMETHODS DONE");

    // The supported method is still live
    assert_eq!(launched.methods().len(), 1);
    let mut stream = socks_connect(launched.methods()[0].addr, None).await.unwrap();
    stream.write_all(b"ok").await.unwrap();
    let mut buf = [0u8; 2];
    stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"ok");

    drop(stream);
    timeout(Duration::from_secs(5), launched.shutdown())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_shutdown_waits_for_in_flight_session() {
    let engine = spawn_echo_server().await;
    let config = test_config(engine);
    let mut reporter = Reporter::new(Vec::new());
    let launched = ClientTransport::launch(&config, &client_env("st-transparent"), &mut reporter)
        .await
        .unwrap();
    let proxy = launched.methods()[0].addr;
    let tracker = launched.tracker().clone();

    let mut stream = socks_connect(proxy, None).await.unwrap();
    stream.write_all(b"a").await.unwrap();
    let mut buf = [0u8; 1];
    stream.read_exact(&mut buf).await.unwrap();

    let shutdown = tokio::spawn(launched.shutdown());
    wait_until_refused(proxy).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!shutdown.is_finished());
    assert_eq!(tracker.state(), TrackerState::Draining);

    drop(stream);
    timeout(Duration::from_secs(5), shutdown)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(tracker.active(), 0);
}

#[tokio::test]
async fn test_proxy_request_is_fatal() {
    let config = test_config(closed_port_addr().await);
    let mut reporter = Reporter::new(Vec::new());
    let env = pt_env(&[
        ("TOR_PT_MANAGED_TRANSPORT_VER", "1"),
        ("TOR_PT_CLIENT_TRANSPORTS", "st-transparent"),
        ("TOR_PT_PROXY", "socks5://127.0.0.1:9050"),
    ]);

    let result = ClientTransport::launch(&config, &env, &mut reporter).await;
    assert!(result.is_err());

    let output = String::from_utf8(reporter.into_inner()).unwrap();
    assert_eq!(output, "VERSION 1\nPROXY-ERROR proxy is not supported\n");
}

#[tokio::test]
async fn test_unsupported_version_is_fatal() {
    let config = test_config(closed_port_addr().await);
    let mut reporter = Reporter::new(Vec::new());
    let env = pt_env(&[
        ("TOR_PT_MANAGED_TRANSPORT_VER", "2"),
        ("TOR_PT_CLIENT_TRANSPORTS", "st-transparent"),
    ]);

    assert!(ClientTransport::launch(&config, &env, &mut reporter)
        .await
        .is_err());
    let output = String::from_utf8(reporter.into_inner()).unwrap();
    assert_eq!(output, "VERSION-ERROR no-version\n");
}
