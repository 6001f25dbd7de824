//! Line records sent back to the PT host
//!
//! Every record is a single line, flushed immediately: the host parses our
//! stdout as it arrives and blocks startup until it sees `*METHODS DONE`.

use std::fmt::Write as _;
use std::io::Write;
use std::net::SocketAddr;
use tracing::{debug, warn};

/// Writer for managed-proxy status lines
#[derive(Debug)]
pub struct Reporter<W: Write> {
    out: W,
}

impl<W: Write> Reporter<W> {
    /// Wrap an output stream (stdout in production)
    pub fn new(out: W) -> Self {
        Reporter { out }
    }

    /// `VERSION <version>`
    pub fn version(&mut self, version: &str) {
        self.line("VERSION", &[version]);
    }

    /// `VERSION-ERROR <msg>`
    pub fn version_error(&mut self, msg: &str) {
        self.line("VERSION-ERROR", &[msg]);
    }

    /// `ENV-ERROR <msg>`
    pub fn env_error(&mut self, msg: &str) {
        self.line("ENV-ERROR", &[msg]);
    }

    /// `PROXY-ERROR <msg>`
    pub fn proxy_error(&mut self, msg: &str) {
        self.line("PROXY-ERROR", &[msg]);
    }

    /// `CMETHOD <name> socks5 <addr>`
    pub fn cmethod(&mut self, name: &str, addr: SocketAddr) {
        self.line("CMETHOD", &[name, "socks5", &addr.to_string()]);
    }

    /// `CMETHOD-ERROR <name> <msg>`
    pub fn cmethod_error(&mut self, name: &str, msg: &str) {
        self.line("CMETHOD-ERROR", &[name, msg]);
    }

    /// `CMETHODS DONE`
    pub fn cmethods_done(&mut self) {
        self.line("CMETHODS", &["DONE"]);
    }

    /// `SMETHOD <name> <addr>`
    pub fn smethod(&mut self, name: &str, addr: SocketAddr) {
        self.line("SMETHOD", &[name, &addr.to_string()]);
    }

    /// `SMETHOD-ERROR <name> <msg>`
    pub fn smethod_error(&mut self, name: &str, msg: &str) {
        self.line("SMETHOD-ERROR", &[name, msg]);
    }

    /// `SMETHODS DONE`
    pub fn smethods_done(&mut self) {
        self.line("SMETHODS", &["DONE"]);
    }

    /// Give back the underlying writer
    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, keyword: &str, args: &[&str]) {
        let mut record = String::from(keyword);
        for arg in args {
            record.push(' ');
            record.push_str(&escape(arg));
        }
        debug!("PT report: {}", record);

        record.push('\n');
        if let Err(e) = self
            .out
            .write_all(record.as_bytes())
            .and_then(|_| self.out.flush())
        {
            warn!("Failed to write PT status line '{}': {}", keyword, e);
        }
    }
}

/// Escape everything that could break the one-record-per-line framing
fn escape(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'\n' => escaped.push_str("\\n"),
            b'\\' => escaped.push_str("\\\\"),
            0x01..=0x7f => escaped.push(b as char),
            _ => {
                let _ = write!(escaped, "\\x{:02x}", b);
            }
        }
    }
    escaped
}
