//! Pluggable transport managed-proxy IPC
//!
//! The PT host (normally tor) configures us through environment variables
//! and reads our answers as line records on stdout. This module covers both
//! halves plus the server-side upstream dial through the (Extended) ORPort.

mod env;
mod orport;
mod report;

pub use env::{
    check_managed_version, client_setup, exit_on_stdin_close, server_setup, Bindaddr, ClientInfo,
    EnvSource, ProcessEnv, ServerInfo,
};
pub use orport::{ext_or_setup, read_auth_cookie, OrDialer};
pub use report::Reporter;

use std::fmt;

/// The only transport method this relay implements
pub const SUPPORTED_METHOD: &str = "st-transparent";

/// Methods substituted for `*` in a transport list
pub const SUPPORTED_METHODS: &[&str] = &[SUPPORTED_METHOD];

/// Which side of the obfuscated link this process runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Role {
    /// Accepts SOCKS5 from the PT host and relays to the local engine
    Client,
    /// Accepts engine traffic and relays to the ORPort
    Server,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Client => write!(f, "client"),
            Role::Server => write!(f, "server"),
        }
    }
}
