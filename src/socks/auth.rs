//! SOCKS5 authentication negotiation
//!
//! PT hosts use RFC 1929 username/password not as credentials but as a
//! carrier for per-connection transport arguments, so the sub-negotiation
//! always succeeds when the fields parse.

use super::consts::*;
use super::types::PtArgs;
use crate::config::SocksConfig;
use crate::error::Socks5Error;
use anyhow::Result;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Authentication method types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    /// No authentication required
    None,
    /// Username/password carrying PT arguments
    Password,
}

impl AuthMethod {
    /// Convert to SOCKS5 method byte
    pub fn to_byte(self) -> u8 {
        match self {
            AuthMethod::None => SOCKS5_AUTH_METHOD_NONE,
            AuthMethod::Password => SOCKS5_AUTH_METHOD_PASSWORD,
        }
    }
}

/// Perform method negotiation and, if selected, the username/password
/// sub-negotiation
///
/// Returns the PT arguments the client supplied (empty for no-auth).
pub async fn negotiate<S>(stream: &mut S, config: &SocksConfig) -> Result<PtArgs>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = [0u8; 2];
    stream.read_exact(&mut buf).await?;

    let version = buf[0];
    let num_methods = buf[1];

    if version != SOCKS5_VERSION {
        return Err(Socks5Error::UnsupportedVersion(version).into());
    }

    let mut methods = vec![0u8; num_methods as usize];
    stream.read_exact(&mut methods).await?;

    let selected = select_auth_method(&methods, config);

    stream
        .write_all(&[
            SOCKS5_VERSION,
            selected
                .map(|m| m.to_byte())
                .unwrap_or(SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE),
        ])
        .await?;
    stream.flush().await?;

    match selected {
        Some(AuthMethod::Password) => read_pt_args(stream).await,
        Some(AuthMethod::None) => Ok(PtArgs::default()),
        None => Err(Socks5Error::NoAcceptableMethod.into()),
    }
}

/// Prefer username/password when offered, since that is how arguments
/// arrive; fall back to no authentication
fn select_auth_method(methods: &[u8], config: &SocksConfig) -> Option<AuthMethod> {
    if config.allow_pt_args && methods.contains(&SOCKS5_AUTH_METHOD_PASSWORD) {
        return Some(AuthMethod::Password);
    }
    if methods.contains(&SOCKS5_AUTH_METHOD_NONE) {
        return Some(AuthMethod::None);
    }
    None
}

/// Read the RFC 1929 request and parse it as PT arguments
///
/// ```text
/// +----+------+----------+------+----------+
/// |VER | ULEN |  UNAME   | PLEN |  PASSWD  |
/// +----+------+----------+------+----------+
/// | 1  |  1   | 1 to 255 |  1   | 1 to 255 |
/// +----+------+----------+------+----------+
/// ```
async fn read_pt_args<S>(stream: &mut S) -> Result<PtArgs>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = [0u8; 2];
    stream.read_exact(&mut buf).await?;

    if buf[0] != SOCKS5_AUTH_VERSION {
        send_auth_result(stream, SOCKS5_AUTH_FAILURE).await?;
        return Err(Socks5Error::InvalidAuth(format!("version {}", buf[0])).into());
    }

    let mut username = vec![0u8; buf[1] as usize];
    stream.read_exact(&mut username).await?;

    let mut len = [0u8; 1];
    stream.read_exact(&mut len).await?;
    let mut password = vec![0u8; len[0] as usize];
    stream.read_exact(&mut password).await?;

    match PtArgs::from_credentials(&username, &password) {
        Ok(args) => {
            send_auth_result(stream, SOCKS5_AUTH_SUCCESS).await?;
            tracing::debug!("Received {} PT argument(s)", args.len());
            Ok(args)
        }
        Err(e) => {
            send_auth_result(stream, SOCKS5_AUTH_FAILURE).await?;
            Err(e.into())
        }
    }
}

async fn send_auth_result<S: AsyncWrite + Unpin>(stream: &mut S, status: u8) -> Result<()> {
    stream.write_all(&[SOCKS5_AUTH_VERSION, status]).await?;
    stream.flush().await?;
    Ok(())
}
