//! # Stegorelay - Pluggable Transport Relay
//!
//! Stegorelay is the control plane of a steganographic pluggable transport.
//! It speaks the managed-proxy protocol with its PT host, opens a listener
//! per negotiated method and relays raw bytes between each accepted
//! connection and a local obfuscation engine running as a separate process.
//!
//! ## Features
//!
//! - **Both Roles**: SOCKS5 front end on the client, (Extended) ORPort upstream on the server
//! - **Opaque Relay**: Bytes pass through unchanged in both directions
//! - **Clean Shutdown**: Listeners close first, then in-flight sessions drain to zero
//! - **Engine Launch**: Starts the obfuscation engine once at startup
//!
//! ## Usage
//!
//! ```rust,ignore
//! use stegorelay::config::Config;
//! use stegorelay::controller::run;
//! use stegorelay::pt::Role;
//! use tokio::sync::broadcast;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
//!
//!     run(Config::default(), Role::Client, shutdown_rx).await
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! client: PT host --SOCKS5--> Stegorelay --> engine (127.0.0.1:4999) ~~~>
//! server: ~~~> engine --> Stegorelay --> (Extended) ORPort
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod pt;
pub mod relay;
pub mod socks;
pub mod transport;

// Re-export commonly used items
pub use config::{load_config, Config};
pub use controller::run;
pub use error::{PtError, Socks5Error, StegoRelayError};
pub use pt::Role;

/// Version of the Stegorelay library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");
