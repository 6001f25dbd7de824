//! Termination signals

use std::future::{pending, Future};
use std::io::{self, Read};
use std::thread;
use tokio::sync::oneshot;
use tracing::{info, warn};

/// Install the termination handlers and return a future that resolves
/// once the process is asked to terminate
///
/// SIGTERM and Ctrl+C always count. With `exit_on_stdin_close`, so does
/// stdin reaching end-of-file (the host going away). The handlers are in
/// place when this returns, before any method is reported to the host.
pub fn termination_requested(exit_on_stdin_close: bool) -> impl Future<Output = ()> + Send {
    let signals = Signals::install();
    async move {
        tokio::select! {
            _ = signals.recv() => {}
            _ = stdin_closed(), if exit_on_stdin_close => {
                info!("stdin closed, shutting down...");
            }
        }
    }
}

#[cfg(unix)]
struct Signals {
    sigterm: Option<tokio::signal::unix::Signal>,
    sigint: Option<tokio::signal::unix::Signal>,
}

#[cfg(unix)]
impl Signals {
    fn install() -> Self {
        use tokio::signal::unix::SignalKind;

        Signals {
            sigterm: install(SignalKind::terminate(), "SIGTERM"),
            sigint: install(SignalKind::interrupt(), "Ctrl+C"),
        }
    }

    async fn recv(mut self) {
        tokio::select! {
            _ = recv_or_pending(&mut self.sigint) => info!("Received Ctrl+C, shutting down..."),
            _ = recv_or_pending(&mut self.sigterm) => info!("Received SIGTERM, shutting down..."),
        }
    }
}

#[cfg(unix)]
fn install(
    kind: tokio::signal::unix::SignalKind,
    name: &str,
) -> Option<tokio::signal::unix::Signal> {
    match tokio::signal::unix::signal(kind) {
        Ok(signal) => Some(signal),
        Err(e) => {
            warn!("Failed to set up {} handler: {}", name, e);
            None
        }
    }
}

#[cfg(unix)]
async fn recv_or_pending(signal: &mut Option<tokio::signal::unix::Signal>) {
    if let Some(signal) = signal {
        if signal.recv().await.is_some() {
            return;
        }
    }
    pending::<()>().await
}

#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
    fn install() -> Self {
        Signals
    }

    async fn recv(self) {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down...");
    }
}

/// Resolves once stdin reaches end-of-file or fails
///
/// The read runs on a detached OS thread. A read parked on the runtime's
/// blocking pool would keep the runtime from shutting down while the host
/// still holds stdin open.
async fn stdin_closed() {
    let (closed_tx, closed_rx) = oneshot::channel();

    let spawned = thread::Builder::new()
        .name("stdin-watch".to_string())
        .spawn(move || {
            watch_stdin();
            let _ = closed_tx.send(());
        });
    if let Err(e) = spawned {
        warn!("Failed to watch stdin: {}", e);
        pending::<()>().await;
    }

    let _ = closed_rx.await;
}

fn watch_stdin() {
    let mut stdin = io::stdin().lock();
    let mut buf = [0u8; 512];
    loop {
        match stdin.read(&mut buf) {
            Ok(0) => return,
            Ok(_) => continue,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => return,
        }
    }
}
