//! Managed-proxy environment parsing
//!
//! Each setup function reports its own failures to the host (`ENV-ERROR`,
//! `VERSION-ERROR`) before returning them, so callers only need to exit.

use super::report::Reporter;
use super::SUPPORTED_METHODS;
use crate::error::PtError;
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::debug;
use url::Url;

const MANAGED_TRANSPORT_VER: &str = "TOR_PT_MANAGED_TRANSPORT_VER";
const CLIENT_TRANSPORTS: &str = "TOR_PT_CLIENT_TRANSPORTS";
const PROXY: &str = "TOR_PT_PROXY";
const SERVER_TRANSPORTS: &str = "TOR_PT_SERVER_TRANSPORTS";
const SERVER_BINDADDR: &str = "TOR_PT_SERVER_BINDADDR";
const ORPORT: &str = "TOR_PT_ORPORT";
const EXTENDED_SERVER_PORT: &str = "TOR_PT_EXTENDED_SERVER_PORT";
const AUTH_COOKIE_FILE: &str = "TOR_PT_AUTH_COOKIE_FILE";
const EXIT_ON_STDIN_CLOSE: &str = "TOR_PT_EXIT_ON_STDIN_CLOSE";

/// Source of environment variables
pub trait EnvSource {
    /// Value of `key`, if set
    fn var(&self, key: &str) -> Option<String>;
}

/// The real process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Client role setup result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    /// Requested method names, `*` already expanded
    pub method_names: Vec<String>,
    /// Upstream proxy the host wants us to use, if any
    pub proxy_url: Option<Url>,
}

/// One requested server listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bindaddr {
    /// Transport method name
    pub method_name: String,
    /// Address to listen on
    pub addr: SocketAddr,
}

/// Server role setup result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    /// Listeners to open, filtered by the requested transports
    pub bindaddrs: Vec<Bindaddr>,
    /// Plain ORPort
    pub orport: Option<SocketAddr>,
    /// Extended ORPort
    pub ext_orport: Option<SocketAddr>,
    /// Cookie file for Extended ORPort authentication
    pub auth_cookie_file: Option<PathBuf>,
}

fn env_error<W: Write>(reporter: &mut Reporter<W>, msg: String) -> PtError {
    reporter.env_error(&msg);
    PtError::Env(msg)
}

fn required<E, W>(env: &E, reporter: &mut Reporter<W>, key: &str) -> Result<String, PtError>
where
    E: EnvSource + ?Sized,
    W: Write,
{
    env.var(key)
        .ok_or_else(|| env_error(reporter, format!("no {} environment variable", key)))
}

fn optional_addr<E, W>(
    env: &E,
    reporter: &mut Reporter<W>,
    key: &str,
) -> Result<Option<SocketAddr>, PtError>
where
    E: EnvSource + ?Sized,
    W: Write,
{
    match env.var(key).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|e| env_error(reporter, format!("{}: cannot parse {:?}: {}", key, value, e))),
    }
}

/// Split a comma list, turning `*` into the supported methods
fn method_list(raw: &str) -> Vec<String> {
    if raw == "*" {
        return SUPPORTED_METHODS.iter().map(|m| m.to_string()).collect();
    }
    raw.split(',')
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .collect()
}

/// Check that the host speaks managed transport version 1
///
/// Emits `VERSION 1` on success and `VERSION-ERROR no-version` otherwise.
pub fn check_managed_version<E, W>(env: &E, reporter: &mut Reporter<W>) -> Result<(), PtError>
where
    E: EnvSource + ?Sized,
    W: Write,
{
    let versions = required(env, reporter, MANAGED_TRANSPORT_VER)?;
    if versions.split(',').any(|v| v == "1") {
        reporter.version("1");
        Ok(())
    } else {
        reporter.version_error("no-version");
        Err(PtError::Version(versions))
    }
}

/// Read the client role environment
pub fn client_setup<E, W>(env: &E, reporter: &mut Reporter<W>) -> Result<ClientInfo, PtError>
where
    E: EnvSource + ?Sized,
    W: Write,
{
    check_managed_version(env, reporter)?;

    let method_names = method_list(&required(env, reporter, CLIENT_TRANSPORTS)?);

    let proxy_url = match env.var(PROXY).filter(|v| !v.is_empty()) {
        None => None,
        Some(raw) => Some(
            Url::parse(&raw)
                .map_err(|e| env_error(reporter, format!("cannot parse {}: {}", PROXY, e)))?,
        ),
    };

    debug!("Client methods requested: {:?}", method_names);
    Ok(ClientInfo {
        method_names,
        proxy_url,
    })
}

/// Read the server role environment
pub fn server_setup<E, W>(env: &E, reporter: &mut Reporter<W>) -> Result<ServerInfo, PtError>
where
    E: EnvSource + ?Sized,
    W: Write,
{
    check_managed_version(env, reporter)?;

    let orport = optional_addr(env, reporter, ORPORT)?;
    let ext_orport = optional_addr(env, reporter, EXTENDED_SERVER_PORT)?;
    let auth_cookie_file = match ext_orport {
        Some(_) => Some(PathBuf::from(required(env, reporter, AUTH_COOKIE_FILE)?)),
        None => env.var(AUTH_COOKIE_FILE).map(PathBuf::from),
    };
    if orport.is_none() && ext_orport.is_none() {
        return Err(env_error(
            reporter,
            format!("need {} or {} environment variable", ORPORT, EXTENDED_SERVER_PORT),
        ));
    }

    let raw_bindaddrs = required(env, reporter, SERVER_BINDADDR)?;
    let mut seen = HashSet::new();
    let mut bindaddrs = Vec::new();
    for spec in raw_bindaddrs.split(',').filter(|s| !s.is_empty()) {
        // Method names may themselves contain '-', addresses never do
        let (method_name, addr) = spec.rsplit_once('-').ok_or_else(|| {
            env_error(
                reporter,
                format!("{}: {:?} doesn't contain \"-\"", SERVER_BINDADDR, spec),
            )
        })?;
        if !seen.insert(method_name.to_string()) {
            return Err(env_error(
                reporter,
                format!("{}: duplicate method name {:?}", SERVER_BINDADDR, method_name),
            ));
        }
        let addr = addr.parse().map_err(|e| {
            env_error(
                reporter,
                format!("{}: cannot parse {:?}: {}", SERVER_BINDADDR, addr, e),
            )
        })?;
        bindaddrs.push(Bindaddr {
            method_name: method_name.to_string(),
            addr,
        });
    }

    let transports = required(env, reporter, SERVER_TRANSPORTS)?;
    if transports != "*" {
        let wanted = method_list(&transports);
        bindaddrs.retain(|b| wanted.contains(&b.method_name));
    }

    debug!("Server bindaddrs requested: {:?}", bindaddrs);
    Ok(ServerInfo {
        bindaddrs,
        orport,
        ext_orport,
        auth_cookie_file,
    })
}

/// Whether the host asked us to treat stdin EOF as a shutdown request
pub fn exit_on_stdin_close<E: EnvSource + ?Sized>(env: &E) -> bool {
    env.var(EXIT_ON_STDIN_CLOSE).as_deref() == Some("1")
}
