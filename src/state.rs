use core::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of a connection.
///
/// `Disconnected -> Connecting -> HandshakeInProgress -> Open -> Closing -> Disconnected`.
/// Failures at any step fall back to `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// No session. The only state `connect` starts from.
    Disconnected = 0,
    /// The transport is connecting.
    Connecting = 1,
    /// The upgrade request was sent and the response is being read.
    HandshakeInProgress = 2,
    /// Frames may be queued.
    Open = 3,
    /// A close was queued or the I/O loop is tearing down.
    Closing = 4,
}

impl ConnectionState {
    const fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::HandshakeInProgress,
            3 => ConnectionState::Open,
            4 => ConnectionState::Closing,
            _ => ConnectionState::Disconnected,
        }
    }
}

/// A [`ConnectionState`] shared between the caller threads and the I/O thread.
#[derive(Debug)]
pub struct AtomicConnectionState(AtomicU8);

impl AtomicConnectionState {
    pub const fn new(state: ConnectionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    #[inline]
    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set(&self, state: ConnectionState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Moves to `to` only if the current state is `from`.
    #[inline]
    pub fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.get() == ConnectionState::Open
    }
}
