//! Accept loop
//!
//! One loop per listener. Each accepted connection is handed to the
//! supervisor and the loop goes straight back to accepting. The loop owns
//! its acceptor, so the listening socket closes exactly once, when the loop
//! returns.

use super::dialer::PeerDialer;
use super::session::Supervisor;
use crate::transport::Acceptor;
use std::io;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

const ENOMEM: i32 = 12;
const ENFILE: i32 = 23;
const EMFILE: i32 = 24;
#[cfg(target_os = "linux")]
const ENOBUFS: i32 = 105;
#[cfg(not(target_os = "linux"))]
const ENOBUFS: i32 = 55;

/// Whether an accept error is worth retrying
///
/// Aborted handshakes and temporary resource exhaustion are transient;
/// anything else means the listener is unusable.
pub fn is_transient(err: &io::Error) -> bool {
    match err.kind() {
        io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::Interrupted
        | io::ErrorKind::WouldBlock
        | io::ErrorKind::TimedOut => true,
        _ => matches!(
            err.raw_os_error(),
            Some(ENOMEM) | Some(ENFILE) | Some(EMFILE) | Some(ENOBUFS)
        ),
    }
}

/// Accept connections until shutdown or a fatal accept error
///
/// Returns `Ok(())` on shutdown and the accept error otherwise. Either way
/// the acceptor is dropped before returning.
pub async fn run_accept_loop<A, D>(
    mut acceptor: A,
    supervisor: Supervisor<D>,
    mut shutdown_rx: broadcast::Receiver<bool>,
) -> io::Result<()>
where
    A: Acceptor<Conn = D::Conn>,
    D: PeerDialer,
{
    let local_addr = acceptor
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "<unknown>".to_string());
    info!("Accepting connections on {}", local_addr);

    loop {
        tokio::select! {
            biased;

            _ = shutdown_rx.recv() => {
                info!("Closing listener {}", local_addr);
                return Ok(());
            }

            accepted = acceptor.accept() => match accepted {
                Ok((conn, remote)) => {
                    debug!("Accepted connection from {} on {}", remote, local_addr);
                    supervisor.dispatch(conn, remote);
                }
                Err(e) if is_transient(&e) => {
                    warn!("Transient accept error on {}: {}", local_addr, e);
                    tokio::task::yield_now().await;
                }
                Err(e) => {
                    error!("Accept failed on {}, closing listener: {}", local_addr, e);
                    return Err(e);
                }
            }
        }
    }
}
