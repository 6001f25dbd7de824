//! Plain TCP dialer
//!
//! Opens peer connections. No connect timeout is applied; a dial lasts as
//! long as the operating system lets it.

use super::SocketOpts;
use crate::config::TcpConfig;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use tokio::net::TcpStream;

/// TCP dialer applying socket options to every connection it opens
#[derive(Debug, Clone, Default)]
pub struct TcpDialer {
    /// Socket options to apply to connections
    socket_opts: SocketOpts,
}

impl TcpDialer {
    /// Create a dialer from configuration
    pub fn new(config: &TcpConfig) -> Self {
        TcpDialer {
            socket_opts: SocketOpts::from_tcp_config(config),
        }
    }

    /// Set socket options
    pub fn with_socket_opts(mut self, opts: SocketOpts) -> Self {
        self.socket_opts = opts;
        self
    }

    /// Socket options in use
    pub fn socket_opts(&self) -> &SocketOpts {
        &self.socket_opts
    }

    /// Connect to a remote address
    pub async fn connect(&self, addr: SocketAddr) -> Result<TcpStream> {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("Failed to connect to {}", addr))?;

        if let Err(e) = self.socket_opts.apply(&stream) {
            tracing::warn!("Failed to apply socket options to {}: {}", addr, e);
        }

        tracing::debug!("TCP connection established to {}", addr);

        Ok(stream)
    }
}
