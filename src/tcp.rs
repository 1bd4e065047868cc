use std::{
    io::{self, Read, Write},
    net::{Shutdown, TcpStream, ToSocketAddrs},
    time::Duration,
};

use tracing::{debug, warn};

use crate::transport::{Transport, TransportError};

/// Plain TCP [`Transport`]. The stream is switched to non-blocking mode once connected.
#[derive(Debug, Default)]
pub struct TcpTransport {
    stream: Option<TcpStream>,
    connect_timeout: Option<Duration>,
}

impl TcpTransport {
    /// A disconnected transport without a connect timeout.
    pub const fn new() -> Self {
        Self {
            stream: None,
            connect_timeout: None,
        }
    }

    /// Bounds each connection attempt.
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    fn open(&self, host: &str, port: u16) -> io::Result<TcpStream> {
        let Some(timeout) = self.connect_timeout else {
            return TcpStream::connect((host, port));
        };

        let mut last_error = None;

        for addr in (host, port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => return Ok(stream),
                Err(err) => last_error = Some(err),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses")
        }))
    }

    fn map_error(&mut self, err: io::Error) -> TransportError<io::Error> {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => TransportError::WouldBlock,
            _ => {
                warn!(%err, "TCP transport failed");

                self.stream = None;

                TransportError::Other(err)
            }
        }
    }
}

impl Transport for TcpTransport {
    type Error = io::Error;

    fn connect(&mut self, host: &str, port: u16) -> Result<(), TransportError<Self::Error>> {
        self.disconnect();

        let stream = self.open(host, port).map_err(TransportError::Other)?;

        stream.set_nodelay(true).map_err(TransportError::Other)?;
        stream.set_nonblocking(true).map_err(TransportError::Other)?;

        debug!(host, port, "TCP transport connected");

        self.stream = Some(stream);

        Ok(())
    }

    fn send(&mut self, buf: &[u8]) -> Result<usize, TransportError<Self::Error>> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;

        match stream.write(buf) {
            Ok(sent) => Ok(sent),
            Err(err) => Err(self.map_error(err)),
        }
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, TransportError<Self::Error>> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;

        match stream.read(buf) {
            Ok(0) => {
                self.stream = None;
                Ok(0)
            }
            Ok(read) => Ok(read),
            Err(err) => Err(self.map_error(err)),
        }
    }

    fn disconnect(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}
