//! Server role setup

use super::{Launched, ListenerSet};
use crate::config::Config;
use crate::engine::spawn_engine;
use crate::pt::{server_setup, EnvSource, OrDialer, Reporter, Role, SUPPORTED_METHOD};
use crate::relay::{DrainTracker, ServerDialer, Supervisor};
use crate::transport::TcpDialer;
use anyhow::Result;
use std::io::Write;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Server side of the transport
///
/// Listens where the host asks and relays every session to the ORPort.
pub struct ServerTransport;

impl ServerTransport {
    /// Negotiate with the host and start listening
    pub async fn launch<E, W>(config: &Config, env: &E, reporter: &mut Reporter<W>) -> Result<Launched>
    where
        E: EnvSource + ?Sized,
        W: Write,
    {
        let info = server_setup(env, reporter)?;
        let or_dialer = OrDialer::new(&info, TcpDialer::new(&config.tcp))?;
        info!(
            "Relaying to {}ORPort {}",
            if or_dialer.is_extended() { "Extended " } else { "" },
            or_dialer.addr()
        );

        let engine = spawn_engine(&config.engine, Role::Server);

        let tracker = DrainTracker::spawn();
        let dialer = ServerDialer::new(or_dialer, config.server.or_method_name.clone());
        let supervisor = Supervisor::new(dialer, tracker.clone());

        let mut listeners = ListenerSet::new();
        for bindaddr in &info.bindaddrs {
            let name = &bindaddr.method_name;
            if name != SUPPORTED_METHOD {
                reporter.smethod_error(name, "no such method");
                continue;
            }

            let listener = match TcpListener::bind(bindaddr.addr).await {
                Ok(listener) => listener,
                Err(e) => {
                    warn!("Failed to bind {} for {}: {}", bindaddr.addr, name, e);
                    reporter.smethod_error(name, &e.to_string());
                    continue;
                }
            };
            match listeners.spawn(name, listener, supervisor.clone()) {
                Ok(addr) => reporter.smethod(name, addr),
                Err(e) => reporter.smethod_error(name, &e.to_string()),
            }
        }
        reporter.smethods_done();

        Ok(Launched::new(listeners, tracker, engine))
    }
}
