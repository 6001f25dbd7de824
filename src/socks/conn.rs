//! Pre-negotiated SOCKS5 connection
//!
//! A [`SocksConn`] is what the client role hands to the session supervisor:
//! a connection whose CONNECT request has been read but not yet answered.
//! Exactly one of [`SocksConn::grant`] or [`SocksConn::reject`] must follow.

use super::auth::negotiate;
use super::request::{parse_request, send_reply};
use super::types::{PtArgs, SocksCommand, TargetAddr};
use crate::config::SocksConfig;
use crate::error::{Socks5Error, Socks5ReplyCode};
use crate::transport::Connection;
use anyhow::Result;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tracing::debug;

/// SOCKS5 connection awaiting a grant or reject
#[derive(Debug)]
pub struct SocksConn<S = TcpStream> {
    stream: S,
    remote: SocketAddr,
    target: TargetAddr,
    args: PtArgs,
    answered: bool,
}

impl<S: Connection> SocksConn<S> {
    /// Run the SOCKS5 handshake up to (not including) the reply
    ///
    /// Anything other than CONNECT is refused on the spot.
    pub async fn handshake(mut stream: S, remote: SocketAddr, config: &SocksConfig) -> Result<Self> {
        let args = negotiate(&mut stream, config).await?;
        let (cmd_byte, target) = parse_request(&mut stream).await?;

        match SocksCommand::from_byte(cmd_byte) {
            Some(SocksCommand::Connect) => {}
            other => {
                debug!("Refusing SOCKS5 command {:?} from {}", other, remote);
                send_reply(&mut stream, Socks5ReplyCode::CommandNotSupported, None).await?;
                return Err(Socks5Error::CommandNotSupported(cmd_byte).into());
            }
        }

        debug!("SOCKS5 CONNECT from {} requesting {}", remote, target);

        Ok(SocksConn {
            stream,
            remote,
            target,
            args,
            answered: false,
        })
    }

    /// Target the client asked for
    pub fn target(&self) -> &TargetAddr {
        &self.target
    }

    /// Per-connection transport arguments
    pub fn args(&self) -> &PtArgs {
        &self.args
    }

    /// Address of the SOCKS client
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    /// Accept the request, reporting `bind_addr` as the bound address
    pub async fn grant(&mut self, bind_addr: SocketAddr) -> Result<()> {
        self.answer(Socks5ReplyCode::Succeeded, Some(bind_addr))
            .await
    }

    /// Refuse the request
    pub async fn reject(&mut self, code: Socks5ReplyCode) -> Result<()> {
        self.answer(code, None).await
    }

    async fn answer(&mut self, code: Socks5ReplyCode, bind_addr: Option<SocketAddr>) -> Result<()> {
        if self.answered {
            return Err(Socks5Error::AlreadyAnswered.into());
        }
        self.answered = true;
        send_reply(&mut self.stream, code, bind_addr).await
    }

    /// Unwrap the underlying stream
    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: Connection> AsyncRead for SocksConn<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl<S: Connection> AsyncWrite for SocksConn<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}
