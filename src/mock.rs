//! Noop implementations of [`Transport`] and [`RngCore`] for testing purposes.

use core::convert::Infallible;

use rand_core::RngCore;

use crate::transport::{Transport, TransportError};

/// Accepts every write and never has anything to read.
#[derive(Debug, Default)]
pub struct Noop {
    connected: bool,
}

impl Transport for Noop {
    type Error = Infallible;

    fn connect(&mut self, _host: &str, _port: u16) -> Result<(), TransportError<Self::Error>> {
        self.connected = true;

        Ok(())
    }

    fn send(&mut self, buf: &[u8]) -> Result<usize, TransportError<Self::Error>> {
        Ok(buf.len())
    }

    fn receive(&mut self, _buf: &mut [u8]) -> Result<usize, TransportError<Self::Error>> {
        Err(TransportError::WouldBlock)
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

impl RngCore for Noop {
    fn next_u32(&mut self) -> u32 {
        0
    }

    fn next_u64(&mut self) -> u64 {
        0
    }

    fn fill_bytes(&mut self, dst: &mut [u8]) {
        dst.fill(0);
    }
}
