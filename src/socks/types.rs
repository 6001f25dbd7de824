//! SOCKS5 type definitions
//!
//! Requested targets, commands and the per-connection PT arguments a host
//! smuggles through the username/password fields.

use super::consts::*;
use crate::error::Socks5Error;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// SOCKS5 command types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocksCommand {
    /// TCP CONNECT - establish a TCP connection to target
    Connect,
    /// TCP BIND - wait for incoming connection
    Bind,
    /// UDP ASSOCIATE - establish UDP relay
    UdpAssociate,
}

impl SocksCommand {
    /// Parse a command byte into SocksCommand
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            SOCKS5_CMD_TCP_CONNECT => Some(SocksCommand::Connect),
            SOCKS5_CMD_TCP_BIND => Some(SocksCommand::Bind),
            SOCKS5_CMD_UDP_ASSOCIATE => Some(SocksCommand::UdpAssociate),
            _ => None,
        }
    }
}

impl fmt::Display for SocksCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocksCommand::Connect => write!(f, "CONNECT"),
            SocksCommand::Bind => write!(f, "BIND"),
            SocksCommand::UdpAssociate => write!(f, "UDP ASSOCIATE"),
        }
    }
}

/// Target address of a SOCKS5 request
///
/// Domain names are kept unresolved: the relay never dials the requested
/// target itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetAddr {
    /// IP address with port
    Ip(SocketAddr),
    /// Domain name with port
    Domain(String, u16),
}

impl TargetAddr {
    /// Create a new TargetAddr from an IPv4 address and port
    pub fn ipv4(ip: Ipv4Addr, port: u16) -> Self {
        TargetAddr::Ip(SocketAddr::new(IpAddr::V4(ip), port))
    }

    /// Create a new TargetAddr from an IPv6 address and port
    pub fn ipv6(ip: Ipv6Addr, port: u16) -> Self {
        TargetAddr::Ip(SocketAddr::new(IpAddr::V6(ip), port))
    }

    /// Create a new TargetAddr from a domain name and port
    pub fn domain(domain: String, port: u16) -> Self {
        TargetAddr::Domain(domain, port)
    }

    /// Get the port number
    pub fn port(&self) -> u16 {
        match self {
            TargetAddr::Ip(addr) => addr.port(),
            TargetAddr::Domain(_, port) => *port,
        }
    }
}

impl fmt::Display for TargetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetAddr::Ip(addr) => write!(f, "{}", addr),
            TargetAddr::Domain(domain, port) => write!(f, "{}:{}", domain, port),
        }
    }
}

impl From<SocketAddr> for TargetAddr {
    fn from(addr: SocketAddr) -> Self {
        TargetAddr::Ip(addr)
    }
}

/// Per-connection transport arguments (`key=value;key=value`)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PtArgs(Vec<(String, String)>);

impl PtArgs {
    /// Parse arguments from the username/password sub-negotiation
    ///
    /// The two fields are concatenated; a password consisting of a single
    /// NUL byte is a placeholder and contributes nothing. `\` escapes the
    /// next character, so keys and values may contain `;`, `=` or `\`.
    pub fn from_credentials(username: &[u8], password: &[u8]) -> Result<Self, Socks5Error> {
        let mut raw = username.to_vec();
        if password != [0u8].as_slice() {
            raw.extend_from_slice(password);
        }
        let raw = String::from_utf8(raw)
            .map_err(|_| Socks5Error::InvalidAuth("arguments are not UTF-8".to_string()))?;
        Self::parse(&raw)
    }

    /// Parse a `key=value;key=value` string
    pub fn parse(raw: &str) -> Result<Self, Socks5Error> {
        let mut args = Vec::new();
        if raw.is_empty() {
            return Ok(PtArgs(args));
        }

        let mut key = String::new();
        let mut value = String::new();
        let mut in_value = false;
        let mut chars = raw.chars();

        while let Some(c) = chars.next() {
            match c {
                '\\' => {
                    let escaped = chars.next().ok_or_else(|| {
                        Socks5Error::InvalidAuth("trailing backslash in arguments".to_string())
                    })?;
                    if in_value {
                        value.push(escaped);
                    } else {
                        key.push(escaped);
                    }
                }
                '=' if !in_value => in_value = true,
                ';' => {
                    args.push(Self::finish_pair(&mut key, &mut value, in_value)?);
                    in_value = false;
                }
                c if in_value => value.push(c),
                c => key.push(c),
            }
        }
        args.push(Self::finish_pair(&mut key, &mut value, in_value)?);

        Ok(PtArgs(args))
    }

    fn finish_pair(
        key: &mut String,
        value: &mut String,
        in_value: bool,
    ) -> Result<(String, String), Socks5Error> {
        if !in_value {
            return Err(Socks5Error::InvalidAuth(format!(
                "argument '{}' has no value",
                key
            )));
        }
        if key.is_empty() {
            return Err(Socks5Error::InvalidAuth("empty argument key".to_string()));
        }
        Ok((std::mem::take(key), std::mem::take(value)))
    }

    /// First value for `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Number of arguments
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no arguments were supplied
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
