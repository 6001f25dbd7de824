//! Bidirectional byte relay

use crate::transport::Connection;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

const COPY_BUF_SIZE: usize = 8 * 1024;

/// Bytes delivered in each direction by one relay
///
/// A direction cut short by an I/O error still counts what it delivered
/// before the error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Bytes copied from the first connection to the second
    pub a_to_b: u64,
    /// Bytes copied from the second connection to the first
    pub b_to_a: u64,
}

/// Relay data bidirectionally between two connections
///
/// Both directions run concurrently and the relay returns only once both
/// have finished. When one direction reaches end-of-stream the write half
/// of its destination is shut down, so the far side sees the close and can
/// finish the other direction. Both connections are dropped on return.
pub async fn relay<A, B>(a: A, b: B) -> RelayStats
where
    A: Connection,
    B: Connection,
{
    let (mut a_read, mut a_write) = tokio::io::split(a);
    let (mut b_read, mut b_write) = tokio::io::split(b);

    let (a_to_b, b_to_a) = tokio::join!(
        pipe(&mut a_read, &mut b_write, "A->B"),
        pipe(&mut b_read, &mut a_write, "B->A"),
    );

    RelayStats { a_to_b, b_to_a }
}

async fn pipe<R, W>(reader: &mut R, writer: &mut W, direction: &str) -> u64
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; COPY_BUF_SIZE];
    let mut copied: u64 = 0;

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => {
                debug!("{} finished: {} bytes", direction, copied);
                break;
            }
            Ok(n) => n,
            Err(e) => {
                debug!("{} read error after {} bytes: {}", direction, copied, e);
                break;
            }
        };

        if let Err(e) = writer.write_all(&buf[..n]).await {
            debug!("{} write error after {} bytes: {}", direction, copied, e);
            break;
        }
        if let Err(e) = writer.flush().await {
            debug!("{} flush error after {} bytes: {}", direction, copied, e);
            break;
        }
        copied += n as u64;
    }

    if let Err(e) = writer.shutdown().await {
        debug!("{} shutdown error: {}", direction, e);
    }

    copied
}
