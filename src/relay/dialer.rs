//! Per-role peer dialing
//!
//! The session lifecycle is identical for both roles; what differs is how
//! an accepted connection becomes an origin, where its peer lives, and
//! whether the origin must be told about the outcome. [`PeerDialer`]
//! captures exactly those differences.

use crate::error::Socks5ReplyCode;
use crate::pt::{OrDialer, Role};
use crate::config::SocksConfig;
use crate::socks::SocksConn;
use crate::transport::{Connection, TcpDialer};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tracing::debug;

/// Role-specific half of a session
#[async_trait]
pub trait PeerDialer: Send + Sync + 'static {
    /// Connection type delivered by the acceptor
    type Conn: Connection;
    /// Connection after any origin-side handshake
    type Origin: Connection + Sync;
    /// Connection to the peer
    type Peer: Connection;

    /// Which role this dialer serves
    fn role(&self) -> Role;

    /// Turn an accepted connection into an origin
    async fn open(&self, conn: Self::Conn, remote: SocketAddr) -> Result<Self::Origin>;

    /// Open the peer connection, returning it with its resolved address
    async fn dial(&self, origin: &Self::Origin, remote: SocketAddr) -> Result<(Self::Peer, SocketAddr)>;

    /// Tell the origin its peer is ready
    async fn grant(&self, _origin: &mut Self::Origin, _peer_addr: SocketAddr) -> Result<()> {
        Ok(())
    }

    /// Tell the origin its peer could not be reached
    async fn reject(&self, _origin: &mut Self::Origin, _error: &anyhow::Error) -> Result<()> {
        Ok(())
    }
}

/// Client role: SOCKS5 origins relayed to the local engine
#[derive(Debug, Clone)]
pub struct ClientDialer {
    engine_addr: SocketAddr,
    tcp: TcpDialer,
    socks: SocksConfig,
}

impl ClientDialer {
    /// Create a dialer that sends every session to `engine_addr`
    pub fn new(engine_addr: SocketAddr, tcp: TcpDialer, socks: SocksConfig) -> Self {
        ClientDialer {
            engine_addr,
            tcp,
            socks,
        }
    }

    /// Fixed peer address
    pub fn engine_addr(&self) -> SocketAddr {
        self.engine_addr
    }
}

#[async_trait]
impl PeerDialer for ClientDialer {
    type Conn = TcpStream;
    type Origin = SocksConn<TcpStream>;
    type Peer = TcpStream;

    fn role(&self) -> Role {
        Role::Client
    }

    async fn open(&self, conn: TcpStream, remote: SocketAddr) -> Result<Self::Origin> {
        SocksConn::handshake(conn, remote, &self.socks)
            .await
            .context("SOCKS5 handshake failed")
    }

    async fn dial(&self, origin: &Self::Origin, _remote: SocketAddr) -> Result<(TcpStream, SocketAddr)> {
        // All traffic goes to the engine; it learns the bridge on its own
        debug!(
            "Relaying request for {} to engine at {}",
            origin.target(),
            self.engine_addr
        );
        let stream = self.tcp.connect(self.engine_addr).await?;
        let peer_addr = stream.peer_addr().unwrap_or(self.engine_addr);
        Ok((stream, peer_addr))
    }

    async fn grant(&self, origin: &mut Self::Origin, peer_addr: SocketAddr) -> Result<()> {
        origin.grant(peer_addr).await
    }

    async fn reject(&self, origin: &mut Self::Origin, error: &anyhow::Error) -> Result<()> {
        origin.reject(Socks5ReplyCode::from_dial_error(error)).await
    }
}

/// Server role: engine traffic relayed to the ORPort
#[derive(Debug, Clone)]
pub struct ServerDialer {
    or_dialer: OrDialer,
    method_name: String,
}

impl ServerDialer {
    /// Create a dialer announcing `method_name` on the Extended ORPort
    pub fn new(or_dialer: OrDialer, method_name: impl Into<String>) -> Self {
        ServerDialer {
            or_dialer,
            method_name: method_name.into(),
        }
    }
}

#[async_trait]
impl PeerDialer for ServerDialer {
    type Conn = TcpStream;
    type Origin = TcpStream;
    type Peer = TcpStream;

    fn role(&self) -> Role {
        Role::Server
    }

    async fn open(&self, conn: TcpStream, _remote: SocketAddr) -> Result<TcpStream> {
        Ok(conn)
    }

    async fn dial(&self, _origin: &TcpStream, remote: SocketAddr) -> Result<(TcpStream, SocketAddr)> {
        let stream = self.or_dialer.dial(remote, &self.method_name).await?;
        let peer_addr = stream.peer_addr().unwrap_or_else(|_| self.or_dialer.addr());
        Ok((stream, peer_addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pt::ServerInfo;
    use tokio::net::TcpListener;

    #[test]
    fn test_roles() {
        let client = ClientDialer::new(
            "127.0.0.1:4999".parse().unwrap(),
            TcpDialer::default(),
            SocksConfig::default(),
        );
        assert_eq!(client.role(), Role::Client);
        assert_eq!(client.engine_addr().port(), 4999);

        let info = ServerInfo {
            bindaddrs: Vec::new(),
            orport: Some("127.0.0.1:9001".parse().unwrap()),
            ext_orport: None,
            auth_cookie_file: None,
        };
        let server = ServerDialer::new(
            OrDialer::new(&info, TcpDialer::default()).unwrap(),
            "transparent",
        );
        assert_eq!(server.role(), Role::Server);
    }

    #[tokio::test]
    async fn test_server_dial_reaches_orport() {
        let orport = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let or_addr = orport.local_addr().unwrap();
        let info = ServerInfo {
            bindaddrs: Vec::new(),
            orport: Some(or_addr),
            ext_orport: None,
            auth_cookie_file: None,
        };
        let dialer = ServerDialer::new(
            OrDialer::new(&info, TcpDialer::default()).unwrap(),
            "transparent",
        );

        let front = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (origin, _) = tokio::join!(
            TcpStream::connect(front.local_addr().unwrap()),
            front.accept()
        );
        let origin = origin.unwrap();

        let (dialed, accepted) = tokio::join!(
            dialer.dial(&origin, "127.0.0.1:1".parse().unwrap()),
            orport.accept()
        );
        let (_, peer_addr) = dialed.unwrap();
        assert_eq!(peer_addr, or_addr);
        assert!(accepted.is_ok());
    }
}
