//! SOCKS5 front end for the client role
//!
//! The PT host speaks SOCKS5 to the client listener to say which bridge it
//! wants; this module reads that request and answers it with a grant or a
//! reject once the session supervisor knows whether the peer dial worked.

mod auth;
mod conn;
mod consts;
mod request;
mod types;

pub use auth::{negotiate, AuthMethod};
pub use conn::SocksConn;
pub use consts::*;
pub use request::{parse_request, send_reply};
pub use types::{PtArgs, SocksCommand, TargetAddr};
