//! Client role setup

use super::{Launched, ListenerSet};
use crate::config::Config;
use crate::engine::spawn_engine;
use crate::error::{PtError, StegoRelayError};
use crate::pt::{client_setup, EnvSource, Reporter, Role, SUPPORTED_METHOD};
use crate::relay::{ClientDialer, DrainTracker, Supervisor};
use crate::transport::TcpDialer;
use anyhow::Result;
use std::io::Write;
use tokio::net::TcpListener;
use tracing::warn;

/// Client side of the transport
///
/// Opens a SOCKS5 listener per supported method; every session is relayed
/// to the engine's fixed address.
pub struct ClientTransport;

impl ClientTransport {
    /// Negotiate with the host and start listening
    pub async fn launch<E, W>(config: &Config, env: &E, reporter: &mut Reporter<W>) -> Result<Launched>
    where
        E: EnvSource + ?Sized,
        W: Write,
    {
        let info = client_setup(env, reporter)?;
        if info.proxy_url.is_some() {
            reporter.proxy_error("proxy is not supported");
            return Err(PtError::ProxyUnsupported.into());
        }

        let listen_addr = config
            .client
            .listen_addr()
            .map_err(StegoRelayError::Config)?;
        let engine_addr = config
            .client
            .engine_addr()
            .map_err(StegoRelayError::Config)?;

        let tracker = DrainTracker::spawn();
        let dialer = ClientDialer::new(
            engine_addr,
            TcpDialer::new(&config.tcp),
            config.socks.clone(),
        );
        let supervisor = Supervisor::new(dialer, tracker.clone());

        let mut listeners = ListenerSet::new();
        let mut engine = None;
        let mut engine_started = false;

        for name in &info.method_names {
            if name != SUPPORTED_METHOD {
                reporter.cmethod_error(name, "no such method");
                continue;
            }

            let listener = match TcpListener::bind(listen_addr).await {
                Ok(listener) => listener,
                Err(e) => {
                    warn!("Failed to bind {} for {}: {}", listen_addr, name, e);
                    reporter.cmethod_error(name, &e.to_string());
                    continue;
                }
            };
            let addr = match listeners.spawn(name, listener, supervisor.clone()) {
                Ok(addr) => addr,
                Err(e) => {
                    reporter.cmethod_error(name, &e.to_string());
                    continue;
                }
            };

            if !engine_started {
                engine = spawn_engine(&config.engine, Role::Client);
                engine_started = true;
            }
            reporter.cmethod(name, addr);
        }
        reporter.cmethods_done();

        Ok(Launched::new(listeners, tracker, engine))
    }
}
