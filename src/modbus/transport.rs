//! The carrier-agnostic transport seam the dispatcher drives.
//!
//! A thin trait over a raw byte send/receive so the dispatcher can drive
//! either an RTU serial link or a TCP socket without caring which one it
//! holds.

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::Instant;

/// A byte-oriented duplex the dispatcher reads requests from and writes
/// responses to. Implemented for TCP sockets and RTU serial ports alike.
pub trait Transport: Send + Sync {
    async fn send(&mut self, buf: &[u8]) -> std::io::Result<()>;

    /// Reads whatever is currently available into `buf`, returning the
    /// number of bytes read. Like `AsyncRead::read`, `Ok(0)` signals EOF.
    async fn recv(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;

    /// `None` for carriers without a notion of peer address (serial ports).
    fn peer_address(&self) -> Option<SocketAddr> {
        None
    }

    /// Re-establishes the carrier after an IO error (reopen the serial
    /// device, redial the socket). Carriers with nothing to reopen return
    /// `Unsupported`, which the dispatcher treats as a non-retryable error.
    async fn reconnect(&mut self) -> std::io::Result<()> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "this transport does not support reconnection",
        ))
    }
}

impl Transport for tokio::net::TcpStream {
    async fn send(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.write_all(buf).await
    }

    async fn recv(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.read(buf).await
    }

    fn peer_address(&self) -> Option<SocketAddr> {
        self.peer_addr().ok()
    }
}

/// A monotonic clock the dispatcher and RTU silent-interval timer use,
/// abstracted so tests can drive time deterministically instead of sleeping.
/// Returns `tokio::time::Instant` rather than `std::time::Instant` so it
/// respects a paused/advanced runtime clock under `#[tokio::test(start_paused
/// = true)]`.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokio_clock_advances() {
        let clock = TokioClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
