//! Process controller
//!
//! Negotiates methods with the PT host, opens one listener per accepted
//! method, and on shutdown closes every listener before draining the
//! sessions still in flight.

mod client;
mod server;
pub mod signal;

pub use client::ClientTransport;
pub use server::ServerTransport;

use crate::config::Config;
use crate::pt::{ProcessEnv, Reporter, Role};
use crate::relay::{run_accept_loop, DrainTracker, PeerDialer, Supervisor};
use crate::transport::Acceptor;
use anyhow::{Context, Result};
use std::io;
use std::net::SocketAddr;
use tokio::process::Child;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A method that is up and accepting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundMethod {
    /// Method name as reported to the host
    pub name: String,
    /// Address the listener is bound to
    pub addr: SocketAddr,
}

/// Listeners opened for the negotiated methods
///
/// Each listener is owned by its accept loop; closing the set tells every
/// loop to stop and waits for them, which drops each socket exactly once.
pub struct ListenerSet {
    shutdown_tx: broadcast::Sender<bool>,
    methods: Vec<BoundMethod>,
    loops: Vec<JoinHandle<io::Result<()>>>,
}

impl Default for ListenerSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ListenerSet {
    /// Create an empty set
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        ListenerSet {
            shutdown_tx,
            methods: Vec::new(),
            loops: Vec::new(),
        }
    }

    /// Start an accept loop for `method` and return its bound address
    pub fn spawn<A, D>(
        &mut self,
        method: &str,
        acceptor: A,
        supervisor: Supervisor<D>,
    ) -> io::Result<SocketAddr>
    where
        A: Acceptor<Conn = D::Conn>,
        D: PeerDialer,
    {
        let addr = acceptor.local_addr()?;
        let handle = tokio::spawn(run_accept_loop(
            acceptor,
            supervisor,
            self.shutdown_tx.subscribe(),
        ));

        self.methods.push(BoundMethod {
            name: method.to_string(),
            addr,
        });
        self.loops.push(handle);
        Ok(addr)
    }

    /// Methods with a running listener
    pub fn methods(&self) -> &[BoundMethod] {
        &self.methods
    }

    /// Stop every accept loop and wait until their listeners are closed
    pub async fn close_all(self) {
        let _ = self.shutdown_tx.send(true);

        for (method, handle) in self.methods.iter().zip(self.loops) {
            match handle.await {
                Ok(Ok(())) => debug!("Listener for {} on {} closed", method.name, method.addr),
                Ok(Err(e)) => debug!(
                    "Listener for {} on {} had already stopped: {}",
                    method.name, method.addr, e
                ),
                Err(e) => warn!("Accept loop for {} panicked: {}", method.name, e),
            }
        }
    }
}

/// A running transport
pub struct Launched {
    listeners: ListenerSet,
    tracker: DrainTracker,
    engine: Option<Child>,
}

impl Launched {
    fn new(listeners: ListenerSet, tracker: DrainTracker, engine: Option<Child>) -> Self {
        Launched {
            listeners,
            tracker,
            engine,
        }
    }

    /// Methods that were reported as working
    pub fn methods(&self) -> &[BoundMethod] {
        self.listeners.methods()
    }

    /// Session counter for this transport
    pub fn tracker(&self) -> &DrainTracker {
        &self.tracker
    }

    /// Process id of the engine, if one was started
    pub fn engine_pid(&self) -> Option<u32> {
        self.engine.as_ref().and_then(|child| child.id())
    }

    /// Close all listeners, then wait for in-flight sessions to finish
    pub async fn shutdown(self) {
        self.listeners.close_all().await;
        info!(
            "Listeners closed, waiting for {} session(s)",
            self.tracker.active()
        );
        self.tracker.drain().await;
    }
}

/// Run a transport until `shutdown_rx` fires, then shut it down
pub async fn run(
    config: Config,
    role: Role,
    mut shutdown_rx: broadcast::Receiver<bool>,
) -> Result<()> {
    let env = ProcessEnv;
    let mut reporter = Reporter::new(io::stdout());

    let launched = match role {
        Role::Client => ClientTransport::launch(&config, &env, &mut reporter).await,
        Role::Server => ServerTransport::launch(&config, &env, &mut reporter).await,
    }
    .with_context(|| format!("Failed to start {} transport", role))?;

    if launched.methods().is_empty() {
        warn!("No transport method is active");
    }
    for method in launched.methods() {
        info!("{} listening on {}", method.name, method.addr);
    }

    let _ = shutdown_rx.recv().await;
    info!("Shutdown requested");

    launched.shutdown().await;
    info!("All sessions drained");
    Ok(())
}
