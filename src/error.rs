//! Error types for Stegorelay
//!
//! This module defines the error taxonomy shared by the negotiation layer,
//! the SOCKS5 origin handling and the relay core.

use std::io;
use thiserror::Error;

/// Main error type for Stegorelay operations
#[derive(Error, Debug)]
pub enum StegoRelayError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pluggable transport negotiation error
    #[error("PT negotiation error: {0}")]
    Pt(#[from] PtError),

    /// SOCKS5 protocol error
    #[error("SOCKS5 error: {0}")]
    Socks5(#[from] Socks5Error),
}

/// Errors raised while negotiating with the PT host process
///
/// These are startup-level failures: the process reports them on stdout
/// (where applicable) and exits with a non-zero status.
#[derive(Error, Debug)]
pub enum PtError {
    /// A required environment variable is missing or malformed
    #[error("{0}")]
    Env(String),

    /// The host does not speak a managed transport version we support
    #[error("no supported managed transport version: {0}")]
    Version(String),

    /// An upstream proxy was requested but proxying is not implemented
    #[error("proxy is not supported")]
    ProxyUnsupported,

    /// Extended ORPort protocol failure
    #[error("extended ORPort: {0}")]
    ExtOrPort(String),

    /// IO error while talking to the host or the ORPort
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// SOCKS5 specific errors
#[derive(Error, Debug)]
pub enum Socks5Error {
    /// Unsupported SOCKS version
    #[error("Unsupported SOCKS version: {0}")]
    UnsupportedVersion(u8),

    /// No acceptable authentication method
    #[error("No acceptable authentication method")]
    NoAcceptableMethod,

    /// Command not supported
    #[error("Command not supported: {0}")]
    CommandNotSupported(u8),

    /// Address type not supported
    #[error("Address type not supported: {0}")]
    AddressTypeNotSupported(u8),

    /// Invalid domain name
    #[error("Invalid domain name: {0}")]
    InvalidDomain(String),

    /// Malformed username/password sub-negotiation
    #[error("Invalid authentication request: {0}")]
    InvalidAuth(String),

    /// The request was already answered with a grant or a reject
    #[error("Request already answered")]
    AlreadyAnswered,
}

/// Reply codes for SOCKS5 protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Socks5ReplyCode {
    /// Command succeeded
    Succeeded = 0x00,
    /// General SOCKS server failure
    GeneralFailure = 0x01,
    /// Connection not allowed by ruleset
    ConnectionNotAllowed = 0x02,
    /// Network unreachable
    NetworkUnreachable = 0x03,
    /// Host unreachable
    HostUnreachable = 0x04,
    /// Connection refused
    ConnectionRefused = 0x05,
    /// TTL expired
    TtlExpired = 0x06,
    /// Command not supported
    CommandNotSupported = 0x07,
    /// Address type not supported
    AddressTypeNotSupported = 0x08,
}

impl From<Socks5ReplyCode> for u8 {
    fn from(code: Socks5ReplyCode) -> Self {
        code as u8
    }
}

impl TryFrom<u8> for Socks5ReplyCode {
    type Error = Socks5Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Socks5ReplyCode::Succeeded),
            0x01 => Ok(Socks5ReplyCode::GeneralFailure),
            0x02 => Ok(Socks5ReplyCode::ConnectionNotAllowed),
            0x03 => Ok(Socks5ReplyCode::NetworkUnreachable),
            0x04 => Ok(Socks5ReplyCode::HostUnreachable),
            0x05 => Ok(Socks5ReplyCode::ConnectionRefused),
            0x06 => Ok(Socks5ReplyCode::TtlExpired),
            0x07 => Ok(Socks5ReplyCode::CommandNotSupported),
            0x08 => Ok(Socks5ReplyCode::AddressTypeNotSupported),
            other => Err(Socks5Error::CommandNotSupported(other)),
        }
    }
}

impl From<&io::Error> for Socks5ReplyCode {
    fn from(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => Socks5ReplyCode::ConnectionRefused,
            io::ErrorKind::TimedOut => Socks5ReplyCode::HostUnreachable,
            io::ErrorKind::AddrNotAvailable => Socks5ReplyCode::HostUnreachable,
            io::ErrorKind::PermissionDenied => Socks5ReplyCode::ConnectionNotAllowed,
            _ => Socks5ReplyCode::GeneralFailure,
        }
    }
}

impl Socks5ReplyCode {
    /// Pick the reply code for a failed dial
    ///
    /// Walks the `anyhow` chain looking for the underlying `io::Error`;
    /// anything else is a general failure.
    pub fn from_dial_error(err: &anyhow::Error) -> Self {
        err.chain()
            .find_map(|cause| cause.downcast_ref::<io::Error>())
            .map(Socks5ReplyCode::from)
            .unwrap_or(Socks5ReplyCode::GeneralFailure)
    }
}
