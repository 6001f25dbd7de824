//! Test utilities and mocks for Stegorelay
//!
//! This module provides common test utilities used across integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use stegorelay::config::Config;
use stegorelay::pt::{OrDialer, ServerInfo};
use stegorelay::relay::{DrainTracker, ServerDialer, Supervisor};
use stegorelay::transport::TcpDialer;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

/// Create a test TCP listener on an available port
pub async fn create_test_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Create a connected TCP stream pair for testing
pub async fn create_tcp_stream_pair() -> (TcpStream, TcpStream) {
    let (listener, addr) = create_test_listener().await;

    let connect_fut = TcpStream::connect(addr);
    let accept_fut = listener.accept();

    let (client_stream, accepted) = tokio::join!(connect_fut, accept_fut);
    let (server_stream, _) = accepted.unwrap();

    (client_stream.unwrap(), server_stream)
}

/// An address nothing is listening on
pub async fn closed_port_addr() -> SocketAddr {
    let (listener, addr) = create_test_listener().await;
    drop(listener);
    addr
}

/// Start a TCP echo server standing in for the engine or the ORPort
///
/// Each connection is echoed until the client closes, then closed.
pub async fn spawn_echo_server() -> SocketAddr {
    let (listener, addr) = create_test_listener().await;
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = stream.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });
    addr
}

/// Build a PT environment from key/value pairs
pub fn pt_env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Configuration with the engine disabled and the client peer at `engine_addr`
pub fn test_config(engine_addr: SocketAddr) -> Config {
    let mut config = Config::default();
    config.engine.enabled = false;
    config.client.engine_addr = engine_addr.to_string();
    config
}

/// Server-role supervisor relaying to a plain ORPort
pub fn orport_supervisor(orport: SocketAddr) -> Supervisor<ServerDialer> {
    let info = ServerInfo {
        bindaddrs: Vec::new(),
        orport: Some(orport),
        ext_orport: None,
        auth_cookie_file: None,
    };
    let or_dialer = OrDialer::new(&info, TcpDialer::default()).unwrap();
    Supervisor::new(
        ServerDialer::new(or_dialer, "transparent"),
        DrainTracker::spawn(),
    )
}

/// Wait (bounded) for the tracker to report `expected` sessions
pub async fn wait_for_active(tracker: &DrainTracker, expected: i64) {
    let mut rx = tracker.subscribe_active();
    timeout(Duration::from_secs(5), rx.wait_for(|n| *n == expected))
        .await
        .unwrap_or_else(|_| {
            panic!(
                "expected {} active sessions, still at {}",
                expected,
                tracker.active()
            )
        })
        .unwrap();
}

/// Wait (bounded) until connecting to `addr` is refused
pub async fn wait_until_refused(addr: SocketAddr) {
    timeout(Duration::from_secs(5), async {
        loop {
            if TcpStream::connect(addr).await.is_err() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("listener still accepting");
}
