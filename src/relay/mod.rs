//! Connection relay and lifecycle drain
//!
//! ```text
//! Acceptor -> run_accept_loop -> Supervisor::dispatch -> PeerDialer::{open, dial, grant|reject}
//!                                        |                         |
//!                                  DrainTracker (+1/-1)          relay()
//! ```

mod accept;
mod copy;
mod dialer;
mod drain;
mod session;

pub use accept::{is_transient, run_accept_loop};
pub use copy::{relay, RelayStats};
pub use dialer::{ClientDialer, PeerDialer, ServerDialer};
pub use drain::{DrainTracker, SessionGuard, TrackerState};
pub use session::Supervisor;
