//! Session supervisor
//!
//! Drives one accepted connection through open, dial, grant or reject,
//! and relay. The session is counted by the drain tracker for its whole
//! lifetime; the count is released on every exit path by dropping the
//! [`SessionGuard`](super::SessionGuard).

use super::copy::{relay, RelayStats};
use super::dialer::PeerDialer;
use super::drain::DrainTracker;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Runs sessions for one role
pub struct Supervisor<D: PeerDialer> {
    dialer: Arc<D>,
    tracker: DrainTracker,
}

impl<D: PeerDialer> Clone for Supervisor<D> {
    fn clone(&self) -> Self {
        Supervisor {
            dialer: self.dialer.clone(),
            tracker: self.tracker.clone(),
        }
    }
}

impl<D: PeerDialer> Supervisor<D> {
    /// Create a supervisor reporting to `tracker`
    pub fn new(dialer: D, tracker: DrainTracker) -> Self {
        Supervisor {
            dialer: Arc::new(dialer),
            tracker,
        }
    }

    /// The tracker sessions are counted by
    pub fn tracker(&self) -> &DrainTracker {
        &self.tracker
    }

    /// The role-specific dialer
    pub fn dialer(&self) -> &D {
        &self.dialer
    }

    /// Register a session and run it on its own task
    ///
    /// Registration happens before this returns, so a drain started after
    /// `dispatch` always waits for the session.
    pub fn dispatch(&self, conn: D::Conn, remote: SocketAddr) -> JoinHandle<Result<RelayStats>> {
        let guard = self.tracker.register();
        let dialer = self.dialer.clone();

        tokio::spawn(async move {
            let _guard = guard;
            let result = run_session(&*dialer, conn, remote).await;
            if let Err(e) = &result {
                debug!("Session from {} ended: {:#}", remote, e);
            }
            result
        })
    }

    /// Run a session to completion on the current task
    pub async fn handle(&self, conn: D::Conn, remote: SocketAddr) -> Result<RelayStats> {
        let _guard = self.tracker.register();
        run_session(&*self.dialer, conn, remote).await
    }
}

async fn run_session<D: PeerDialer>(
    dialer: &D,
    conn: D::Conn,
    remote: SocketAddr,
) -> Result<RelayStats> {
    let mut origin = dialer.open(conn, remote).await?;

    let (peer, peer_addr) = match dialer.dial(&origin, remote).await {
        Ok(dialed) => dialed,
        Err(e) => {
            if let Err(reject_err) = dialer.reject(&mut origin, &e).await {
                debug!("Failed to reject {}: {:#}", remote, reject_err);
            }
            return Err(e.context("Failed to dial peer"));
        }
    };

    dialer
        .grant(&mut origin, peer_addr)
        .await
        .context("Failed to grant origin connection")?;

    debug!(
        "{} session {} <-> {} established",
        dialer.role(),
        remote,
        peer_addr
    );

    let stats = relay(origin, peer).await;
    info!(
        "{} session {} closed ({} bytes out, {} bytes in)",
        dialer.role(),
        remote,
        stats.a_to_b,
        stats.b_to_a
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pt::Role;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
    use tokio::sync::Mutex;

    /// Hands out pre-made peers and records grant/reject calls
    #[derive(Default)]
    struct ScriptedDialer {
        peers: Mutex<Vec<DuplexStream>>,
        granted: AtomicUsize,
        rejected: AtomicUsize,
    }

    #[async_trait]
    impl PeerDialer for ScriptedDialer {
        type Conn = DuplexStream;
        type Origin = DuplexStream;
        type Peer = DuplexStream;

        fn role(&self) -> Role {
            Role::Client
        }

        async fn open(&self, conn: DuplexStream, _remote: SocketAddr) -> Result<DuplexStream> {
            Ok(conn)
        }

        async fn dial(
            &self,
            _origin: &DuplexStream,
            _remote: SocketAddr,
        ) -> Result<(DuplexStream, SocketAddr)> {
            match self.peers.lock().await.pop() {
                Some(peer) => Ok((peer, "127.0.0.1:4999".parse()?)),
                None => Err(std::io::Error::from(std::io::ErrorKind::ConnectionRefused).into()),
            }
        }

        async fn grant(&self, _origin: &mut DuplexStream, _peer_addr: SocketAddr) -> Result<()> {
            self.granted.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn reject(&self, _origin: &mut DuplexStream, _error: &anyhow::Error) -> Result<()> {
            self.rejected.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn remote() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    #[tokio::test]
    async fn test_session_relays_and_grants() {
        let (mut peer_far, peer_near) = duplex(1024);
        let dialer = ScriptedDialer::default();
        dialer.peers.lock().await.push(peer_near);

        let supervisor = Supervisor::new(dialer, DrainTracker::spawn());
        let (mut origin_far, origin_near) = duplex(1024);
        let session = supervisor.dispatch(origin_near, remote());

        origin_far.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        peer_far.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        drop(origin_far);
        drop(peer_far);

        let stats = session.await.unwrap().unwrap();
        assert_eq!(stats.a_to_b, 4);
        assert_eq!(supervisor.dialer().granted.load(Ordering::SeqCst), 1);
        assert_eq!(supervisor.dialer().rejected.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dial_failure_rejects() {
        let supervisor = Supervisor::new(ScriptedDialer::default(), DrainTracker::spawn());
        let (_origin_far, origin_near) = duplex(1024);

        let err = supervisor.handle(origin_near, remote()).await.unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to dial peer"));
        assert_eq!(supervisor.dialer().rejected.load(Ordering::SeqCst), 1);
        assert_eq!(supervisor.dialer().granted.load(Ordering::SeqCst), 0);

        supervisor.tracker().drain().await;
        assert_eq!(supervisor.tracker().active(), 0);
    }

    #[tokio::test]
    async fn test_dispatch_registers_before_returning() {
        let (peer_far, peer_near) = duplex(1024);
        let dialer = ScriptedDialer::default();
        dialer.peers.lock().await.push(peer_near);
        let supervisor = Supervisor::new(dialer, DrainTracker::spawn());

        let (origin_far, origin_near) = duplex(1024);
        let session = supervisor.dispatch(origin_near, remote());

        let tracker = supervisor.tracker().clone();
        let drain = tokio::spawn(async move { tracker.drain().await });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!drain.is_finished());

        drop(origin_far);
        drop(peer_far);
        session.await.unwrap().unwrap();
        drain.await.unwrap();
    }
}
