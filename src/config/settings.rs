//! Relay configuration types
//!
//! Every field carries a default, so an empty file (or no file at all)
//! yields the stock stegotorus wrapper behaviour.

use super::TcpConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

fn default_client_listen_addr() -> String {
    "127.0.0.1:0".to_string()
}

/// Address the local obfuscation engine listens on for client traffic
fn default_engine_addr() -> String {
    "127.0.0.1:4999".to_string()
}

fn default_or_method_name() -> String {
    "transparent".to_string()
}

fn default_engine_program() -> String {
    "./stegotorus".to_string()
}

fn default_client_config_file() -> String {
    "chop-nosteg-client.yaml".to_string()
}

fn default_server_config_file() -> String {
    "chop-nosteg-server.yaml".to_string()
}

fn default_true() -> bool {
    true
}

/// Root configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    /// Client role settings
    #[serde(default)]
    pub client: ClientConfig,

    /// Server role settings
    #[serde(default)]
    pub server: ServerConfig,

    /// External obfuscation engine
    #[serde(default)]
    pub engine: EngineConfig,

    /// SOCKS5 front end (client role)
    #[serde(default)]
    pub socks: SocksConfig,

    /// Socket options for dialed peers
    #[serde(default)]
    pub tcp: TcpConfig,
}

/// Client role configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ClientConfig {
    /// Where each method's SOCKS5 listener binds
    #[serde(default = "default_client_listen_addr")]
    pub listen_addr: String,

    /// Fixed peer every client session is relayed to
    #[serde(default = "default_engine_addr")]
    pub engine_addr: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            listen_addr: default_client_listen_addr(),
            engine_addr: default_engine_addr(),
        }
    }
}

/// Server role configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    /// Transport name announced on the Extended ORPort
    #[serde(default = "default_or_method_name")]
    pub or_method_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            or_method_name: default_or_method_name(),
        }
    }
}

/// External obfuscation engine process
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EngineConfig {
    /// Spawn the engine at startup
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Engine executable
    #[serde(default = "default_engine_program")]
    pub program: String,

    /// Config file passed to the engine in the client role
    #[serde(default = "default_client_config_file")]
    pub client_config_file: String,

    /// Config file passed to the engine in the server role
    #[serde(default = "default_server_config_file")]
    pub server_config_file: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            enabled: true,
            program: default_engine_program(),
            client_config_file: default_client_config_file(),
            server_config_file: default_server_config_file(),
        }
    }
}

/// SOCKS5 front end configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SocksConfig {
    /// Offer username/password sub-negotiation, which PT hosts use to
    /// pass per-connection transport arguments
    #[serde(default = "default_true")]
    pub allow_pt_args: bool,
}

impl Default for SocksConfig {
    fn default() -> Self {
        SocksConfig {
            allow_pt_args: true,
        }
    }
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        self.client.listen_addr()?;
        self.client.engine_addr()?;
        if self.engine.enabled && self.engine.program.trim().is_empty() {
            return Err("engine.program must not be empty".to_string());
        }
        if self.server.or_method_name.trim().is_empty() {
            return Err("server.or_method_name must not be empty".to_string());
        }
        Ok(())
    }
}

impl ClientConfig {
    /// Parsed SOCKS listener address
    pub fn listen_addr(&self) -> Result<SocketAddr, String> {
        parse_socket_addr("client.listen_addr", &self.listen_addr)
    }

    /// Parsed engine address
    pub fn engine_addr(&self) -> Result<SocketAddr, String> {
        parse_socket_addr("client.engine_addr", &self.engine_addr)
    }
}

fn parse_socket_addr(field: &str, value: &str) -> Result<SocketAddr, String> {
    value
        .parse()
        .map_err(|e| format!("{} '{}' is not a socket address: {}", field, value, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_default() {
        let config = ClientConfig::default();
        assert_eq!(config.listen_addr, "127.0.0.1:0");
        assert_eq!(config.engine_addr, "127.0.0.1:4999");
        assert_eq!(
            config.engine_addr().unwrap(),
            "127.0.0.1:4999".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn test_engine_config_default() {
        let config = EngineConfig::default();
        assert!(config.enabled);
        assert_eq!(config.program, "./stegotorus");
        assert_eq!(config.client_config_file, "chop-nosteg-client.yaml");
        assert_eq!(config.server_config_file, "chop-nosteg-server.yaml");
    }

    #[test]
    fn test_validate_rejects_bad_engine_addr() {
        let mut config = Config::default();
        config.client.engine_addr = "localhost".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.contains("client.engine_addr"));
    }

    #[test]
    fn test_validate_rejects_empty_program() {
        let mut config = Config::default();
        config.engine.program = "  ".to_string();
        assert!(config.validate().is_err());

        config.engine.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
        assert_eq!(Config::default().server.or_method_name, "transparent");
    }
}
