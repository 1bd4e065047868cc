//! The byte-stream transport consumed by the engine.

use std::time::Duration;

pub use crate::error::TransportError;

/// A connected, non-blocking byte stream, such as TCP or TLS over TCP.
///
/// After [`connect`](Transport::connect) returns, [`send`](Transport::send) and
/// [`receive`](Transport::receive) must not block: when no progress can be made they return
/// [`TransportError::WouldBlock`]. Only the engine's I/O thread calls into a transport once a
/// session is open.
pub trait Transport: Send + 'static {
    /// Failure reported by the underlying stream.
    type Error: core::error::Error + Send + Sync + 'static;

    /// Opens the stream. Any connect timeout is the transport's own.
    fn connect(&mut self, host: &str, port: u16) -> Result<(), TransportError<Self::Error>>;

    /// Writes some of `buf` and returns the number of bytes written.
    fn send(&mut self, buf: &[u8]) -> Result<usize, TransportError<Self::Error>>;

    /// Reads into `buf`. `Ok(0)` means the peer closed the stream.
    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, TransportError<Self::Error>>;

    /// Closes the stream. Calling it twice is harmless.
    fn disconnect(&mut self);

    /// Whether the stream is still usable.
    fn is_connected(&self) -> bool;
}

/// Writes all of `buf`, sleeping `backoff` between would-block retries.
///
/// Gives up with [`TransportError::WouldBlock`] when `interrupted` turns true while waiting,
/// and with [`TransportError::NotConnected`] when the transport drops mid-write.
pub(crate) fn send_all<T, F>(
    transport: &mut T,
    mut buf: &[u8],
    backoff: Duration,
    interrupted: F,
) -> Result<(), TransportError<T::Error>>
where
    T: Transport,
    F: Fn() -> bool,
{
    while !buf.is_empty() {
        if !transport.is_connected() {
            return Err(TransportError::NotConnected);
        }

        match transport.send(buf) {
            Ok(0) => return Err(TransportError::NotConnected),
            Ok(sent) => buf = &buf[sent.min(buf.len())..],
            Err(TransportError::WouldBlock) => {
                if interrupted() {
                    return Err(TransportError::WouldBlock);
                }

                std::thread::sleep(backoff);
            }
            Err(err) => return Err(err),
        }
    }

    Ok(())
}
