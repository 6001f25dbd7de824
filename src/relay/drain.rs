//! Shutdown drain tracker
//!
//! One task owns the count of in-flight sessions. Everything else talks to
//! it through an unbounded channel of signed deltas, so updates are applied
//! in arrival order and never race. A drain request travels the same
//! channel, which orders it after every session registered before it.

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

/// Lifecycle of the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    /// Sessions come and go freely
    Running,
    /// Shutdown requested, waiting for sessions to finish
    Draining,
    /// Shutdown requested and no session is left
    Drained,
}

#[derive(Debug)]
enum TrackerMsg {
    Delta(i64),
    Drain(oneshot::Sender<()>),
}

/// Handle to the process-wide session counter
#[derive(Debug, Clone)]
pub struct DrainTracker {
    tx: mpsc::UnboundedSender<TrackerMsg>,
    active_rx: watch::Receiver<i64>,
    state_rx: watch::Receiver<TrackerState>,
}

impl DrainTracker {
    /// Start the tracker task
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (active_tx, active_rx) = watch::channel(0);
        let (state_tx, state_rx) = watch::channel(TrackerState::Running);

        tokio::spawn(run_tracker(rx, active_tx, state_tx));

        DrainTracker {
            tx,
            active_rx,
            state_rx,
        }
    }

    /// Count a new session; the returned guard uncounts it when dropped
    pub fn register(&self) -> SessionGuard {
        self.send(TrackerMsg::Delta(1));
        SessionGuard {
            tx: self.tx.clone(),
        }
    }

    /// Sessions currently counted
    pub fn active(&self) -> i64 {
        *self.active_rx.borrow()
    }

    /// Current lifecycle state
    pub fn state(&self) -> TrackerState {
        *self.state_rx.borrow()
    }

    /// Watch the session count as it changes
    pub fn subscribe_active(&self) -> watch::Receiver<i64> {
        self.active_rx.clone()
    }

    /// Wait until every session registered so far has finished
    pub async fn drain(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(TrackerMsg::Drain(done_tx)).is_err() {
            return;
        }
        let _ = done_rx.await;
    }

    fn send(&self, msg: TrackerMsg) {
        if self.tx.send(msg).is_err() {
            warn!("Drain tracker is gone, session count not updated");
        }
    }
}

/// Registration of one session with the tracker
#[derive(Debug)]
pub struct SessionGuard {
    tx: mpsc::UnboundedSender<TrackerMsg>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let _ = self.tx.send(TrackerMsg::Delta(-1));
    }
}

async fn run_tracker(
    mut rx: mpsc::UnboundedReceiver<TrackerMsg>,
    active_tx: watch::Sender<i64>,
    state_tx: watch::Sender<TrackerState>,
) {
    let mut total: i64 = 0;
    let mut draining = false;
    let mut waiters: Vec<oneshot::Sender<()>> = Vec::new();

    while let Some(msg) = rx.recv().await {
        match msg {
            TrackerMsg::Delta(delta) => {
                total += delta;
                if total < 0 {
                    warn!("Session count went negative ({}), resetting to 0", total);
                    debug_assert!(total >= 0, "unpaired session release: total {}", total);
                    total = 0;
                }
                active_tx.send_replace(total);
            }
            TrackerMsg::Drain(waiter) => {
                draining = true;
                waiters.push(waiter);
            }
        }

        if draining {
            if total == 0 {
                state_tx.send_replace(TrackerState::Drained);
                for waiter in waiters.drain(..) {
                    let _ = waiter.send(());
                }
            } else {
                state_tx.send_replace(TrackerState::Draining);
            }
        }
    }

    debug!("Drain tracker stopped with {} session(s) counted", total);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    async fn wait_active(tracker: &DrainTracker, expected: i64) {
        let mut rx = tracker.subscribe_active();
        timeout(Duration::from_secs(1), rx.wait_for(|n| *n == expected))
            .await
            .expect("timed out waiting for session count")
            .unwrap();
    }

    #[cfg(debug_assertions)]
    #[tokio::test]
    async fn test_unpaired_release_panics_tracker() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (active_tx, _active_rx) = watch::channel(0);
        let (state_tx, _state_rx) = watch::channel(TrackerState::Running);
        let task = tokio::spawn(run_tracker(rx, active_tx, state_tx));

        tx.send(TrackerMsg::Delta(-1)).unwrap();
        let err = timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap_err();
        assert!(err.is_panic());
    }

    #[tokio::test]
    async fn test_register_and_release() {
        let tracker = DrainTracker::spawn();
        assert_eq!(tracker.state(), TrackerState::Running);

        let a = tracker.register();
        let b = tracker.register();
        wait_active(&tracker, 2).await;

        drop(a);
        wait_active(&tracker, 1).await;
        drop(b);
        wait_active(&tracker, 0).await;
        assert_eq!(tracker.state(), TrackerState::Running);
    }

    #[tokio::test]
    async fn test_drain_when_idle_returns_immediately() {
        let tracker = DrainTracker::spawn();
        timeout(Duration::from_secs(1), tracker.drain())
            .await
            .unwrap();
        assert_eq!(tracker.state(), TrackerState::Drained);
    }

    #[tokio::test]
    async fn test_drain_waits_for_sessions() {
        let tracker = DrainTracker::spawn();
        let guard = tracker.register();

        let drainer = tracker.clone();
        let drain = tokio::spawn(async move { drainer.drain().await });

        let mut state = tracker.state_rx.clone();
        timeout(
            Duration::from_secs(1),
            state.wait_for(|s| *s == TrackerState::Draining),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(!drain.is_finished());

        drop(guard);
        timeout(Duration::from_secs(1), drain)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tracker.state(), TrackerState::Drained);
        assert_eq!(tracker.active(), 0);
    }

    #[tokio::test]
    async fn test_drain_is_ordered_after_registration() {
        let tracker = DrainTracker::spawn();
        // Registered and immediately drained: the drain must still see it
        let guard = tracker.register();
        let drainer = tracker.clone();
        let drain = tokio::spawn(async move { drainer.drain().await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!drain.is_finished());

        drop(guard);
        timeout(Duration::from_secs(1), drain)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_many_concurrent_sessions() {
        let tracker = DrainTracker::spawn();
        let mut handles = Vec::new();
        for i in 0..64u64 {
            let guard = tracker.register();
            handles.push(tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(i % 7)).await;
                drop(guard);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        wait_active(&tracker, 0).await;
    }
}
