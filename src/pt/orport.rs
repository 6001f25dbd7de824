//! Upstream dial for the server role
//!
//! Plain ORPort is a bare TCP connect. The Extended ORPort additionally
//! authenticates with SAFE_COOKIE and tells the relay which address and
//! transport the connection came from:
//!
//! ```text
//! server: auth types ... 0x00
//! client: 0x01 (SAFE_COOKIE) | client nonce (32)
//! server: server hash (32)   | server nonce (32)
//! client: client hash (32)
//! server: status (1 = ok)
//! client: USERADDR, TRANSPORT, DONE   ([u16 cmd][u16 len][body])
//! server: OKAY | DENY
//! ```

use super::env::ServerInfo;
use crate::error::PtError;
use crate::transport::TcpDialer;
use anyhow::{Context, Result};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

const AUTH_COOKIE_HEADER: &[u8; 32] = b"! Extended ORPort Auth Cookie !\x0a";
const AUTH_COOKIE_LEN: usize = 32;
const AUTH_NONCE_LEN: usize = 32;
const AUTH_TYPE_END: u8 = 0x00;
const AUTH_TYPE_SAFE_COOKIE: u8 = 0x01;
const AUTH_STATUS_OK: u8 = 0x01;

const SERVER_HASH_CONTEXT: &[u8] = b"ExtORPort authentication server-to-client hash";
const CLIENT_HASH_CONTEXT: &[u8] = b"ExtORPort authentication client-to-server hash";

const CMD_DONE: u16 = 0x0000;
const CMD_USERADDR: u16 = 0x0001;
const CMD_TRANSPORT: u16 = 0x0002;
const REPLY_OKAY: u16 = 0x1000;
const REPLY_DENY: u16 = 0x1001;

fn ext_err(msg: impl Into<String>) -> PtError {
    PtError::ExtOrPort(msg.into())
}

#[derive(Debug, Clone)]
enum OrTarget {
    Plain(SocketAddr),
    Extended {
        addr: SocketAddr,
        cookie_file: PathBuf,
    },
}

/// Dials the ORPort on behalf of server sessions
#[derive(Debug, Clone)]
pub struct OrDialer {
    target: OrTarget,
    tcp: TcpDialer,
}

impl OrDialer {
    /// Pick the upstream from the server environment
    ///
    /// The Extended ORPort wins when both are configured.
    pub fn new(info: &ServerInfo, tcp: TcpDialer) -> Result<Self, PtError> {
        let target = match (info.ext_orport, &info.auth_cookie_file, info.orport) {
            (Some(addr), Some(cookie_file), _) => OrTarget::Extended {
                addr,
                cookie_file: cookie_file.clone(),
            },
            (Some(_), None, _) => return Err(ext_err("no auth cookie file")),
            (None, _, Some(addr)) => OrTarget::Plain(addr),
            (None, _, None) => {
                return Err(PtError::Env(
                    "no ORPort or Extended ORPort configured".to_string(),
                ))
            }
        };
        Ok(OrDialer { target, tcp })
    }

    /// Address this dialer connects to
    pub fn addr(&self) -> SocketAddr {
        match &self.target {
            OrTarget::Plain(addr) => *addr,
            OrTarget::Extended { addr, .. } => *addr,
        }
    }

    /// Whether the Extended ORPort handshake is used
    pub fn is_extended(&self) -> bool {
        matches!(self.target, OrTarget::Extended { .. })
    }

    /// Connect upstream for a connection that arrived from `remote` over
    /// transport `method`
    pub async fn dial(&self, remote: SocketAddr, method: &str) -> Result<TcpStream> {
        match &self.target {
            OrTarget::Plain(addr) => self.tcp.connect(*addr).await,
            OrTarget::Extended { addr, cookie_file } => {
                let cookie = read_auth_cookie(cookie_file).await?;
                let mut stream = self.tcp.connect(*addr).await?;
                ext_or_setup(&mut stream, &cookie, remote, method)
                    .await
                    .with_context(|| format!("Extended ORPort setup with {} failed", addr))?;
                Ok(stream)
            }
        }
    }
}

/// Read and validate a 64-byte Extended ORPort cookie file
pub async fn read_auth_cookie(path: &Path) -> Result<[u8; AUTH_COOKIE_LEN], PtError> {
    let content = tokio::fs::read(path).await?;
    if content.len() != AUTH_COOKIE_HEADER.len() + AUTH_COOKIE_LEN {
        return Err(ext_err(format!(
            "cookie file {:?} is {} bytes, expected {}",
            path,
            content.len(),
            AUTH_COOKIE_HEADER.len() + AUTH_COOKIE_LEN
        )));
    }
    let (header, body) = content.split_at(AUTH_COOKIE_HEADER.len());
    if header != AUTH_COOKIE_HEADER {
        return Err(ext_err(format!("cookie file {:?} has a bad header", path)));
    }
    let mut cookie = [0u8; AUTH_COOKIE_LEN];
    cookie.copy_from_slice(body);
    Ok(cookie)
}

fn auth_hash(
    cookie: &[u8],
    context: &[u8],
    client_nonce: &[u8],
    server_nonce: &[u8],
) -> Result<HmacSha256, PtError> {
    let mut mac =
        HmacSha256::new_from_slice(cookie).map_err(|_| ext_err("invalid auth cookie length"))?;
    mac.update(context);
    mac.update(client_nonce);
    mac.update(server_nonce);
    Ok(mac)
}

async fn authenticate<S>(stream: &mut S, cookie: &[u8]) -> Result<(), PtError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut safe_cookie_offered = false;
    loop {
        let auth_type = stream.read_u8().await?;
        if auth_type == AUTH_TYPE_END {
            break;
        }
        if auth_type == AUTH_TYPE_SAFE_COOKIE {
            safe_cookie_offered = true;
        }
    }
    if !safe_cookie_offered {
        return Err(ext_err("server did not offer SAFE_COOKIE authentication"));
    }

    let mut client_nonce = [0u8; AUTH_NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut client_nonce);

    stream.write_u8(AUTH_TYPE_SAFE_COOKIE).await?;
    stream.write_all(&client_nonce).await?;
    stream.flush().await?;

    let mut server_hash = [0u8; 32];
    let mut server_nonce = [0u8; AUTH_NONCE_LEN];
    stream.read_exact(&mut server_hash).await?;
    stream.read_exact(&mut server_nonce).await?;

    auth_hash(cookie, SERVER_HASH_CONTEXT, &client_nonce, &server_nonce)?
        .verify_slice(&server_hash)
        .map_err(|_| ext_err("server hash mismatch"))?;

    let client_hash = auth_hash(cookie, CLIENT_HASH_CONTEXT, &client_nonce, &server_nonce)?
        .finalize()
        .into_bytes();
    stream.write_all(&client_hash).await?;
    stream.flush().await?;

    let status = stream.read_u8().await?;
    if status != AUTH_STATUS_OK {
        return Err(ext_err(format!("authentication rejected (status {})", status)));
    }
    Ok(())
}

async fn write_command<S>(stream: &mut S, cmd: u16, body: &[u8]) -> Result<(), PtError>
where
    S: AsyncWrite + Unpin,
{
    let len = u16::try_from(body.len())
        .map_err(|_| ext_err(format!("command body of {} bytes is too long", body.len())))?;
    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&cmd.to_be_bytes());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(body);
    stream.write_all(&frame).await?;
    Ok(())
}

/// Authenticate and announce the client address and transport
pub async fn ext_or_setup<S>(
    stream: &mut S,
    cookie: &[u8],
    remote: SocketAddr,
    method: &str,
) -> Result<(), PtError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    authenticate(stream, cookie).await?;

    write_command(stream, CMD_USERADDR, remote.to_string().as_bytes()).await?;
    write_command(stream, CMD_TRANSPORT, method.as_bytes()).await?;
    write_command(stream, CMD_DONE, &[]).await?;
    stream.flush().await?;

    let reply = stream.read_u16().await?;
    let len = stream.read_u16().await?;
    let mut body = vec![0u8; len as usize];
    stream.read_exact(&mut body).await?;

    match reply {
        REPLY_OKAY => {
            debug!("Extended ORPort accepted {} via {}", remote, method);
            Ok(())
        }
        REPLY_DENY => Err(ext_err("server denied the connection")),
        other => Err(ext_err(format!("unexpected reply command 0x{:04x}", other))),
    }
}
