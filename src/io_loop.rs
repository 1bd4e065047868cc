//! The session loop run on the dedicated I/O thread.
//!
//! Each iteration flushes whatever the producers queued, then polls the transport once and
//! dispatches every complete frame found in the receive buffer. The loop owns the transport
//! for the whole session and hands it back when it ends.

use std::{
    collections::VecDeque,
    sync::Arc,
    time::{Duration, Instant},
};

use rand_core::RngCore;
use tracing::{debug, error, info, trace, warn};

use crate::{
    CloseCode, CloseFrame, ConnectionState, Frame, OpCode,
    codec,
    error::{Error, ProtocolError, TransportError},
    events::{Callbacks, Event},
    fragments::Reassembler,
    options::Options,
    transport::{Transport, send_all},
    websocket::Shared,
};

/// Why a session ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    /// Stop requested locally.
    Stopped,
    /// The peer closed the stream.
    PeerClosed,
    /// The peer sent a close frame.
    CloseReceived(Option<CloseCode>),
    /// The transport dropped while writing.
    TransportClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit(Exit),
}

/// Routes decoded frames.
#[derive(Debug)]
struct Dispatcher {
    reassembler: Reassembler,
}

impl Dispatcher {
    fn dispatch<R, E>(
        &mut self,
        frame: Frame<'_>,
        shared: &Shared<R>,
        callbacks: &Callbacks<E>,
    ) -> Result<Flow, ProtocolError>
    where
        R: RngCore,
    {
        match frame.opcode() {
            OpCode::Text | OpCode::Binary | OpCode::Continuation => {
                if let Some(message) = self.reassembler.push(frame)? {
                    trace!(len = message.len(), binary = message.is_binary(), "Received message");

                    callbacks.emit(Event::Data(message));
                }

                Ok(Flow::Continue)
            }
            OpCode::Close => {
                let close = CloseFrame::parse(frame.payload());

                info!(
                    code = ?close.map(|close| close.code()),
                    reason = close.map(|close| close.reason()).unwrap_or_default(),
                    "Received close frame"
                );

                Ok(Flow::Exit(Exit::CloseReceived(close.map(|close| close.code()))))
            }
            OpCode::Ping => {
                trace!(len = frame.payload().len(), "Received ping");

                if let Err(err) = shared.queue_control(
                    OpCode::Pong,
                    frame.payload(),
                    &[ConnectionState::Open, ConnectionState::Closing],
                ) {
                    warn!(%err, "Failed to queue pong");
                }

                Ok(Flow::Continue)
            }
            OpCode::Pong => {
                trace!(len = frame.payload().len(), "Received pong");

                Ok(Flow::Continue)
            }
            OpCode::Reserved(code) => {
                warn!(code, "Ignoring frame with unknown opcode");

                Ok(Flow::Continue)
            }
        }
    }
}

pub(crate) struct IoLoop<T: Transport, R> {
    transport: T,
    shared: Arc<Shared<R>>,
    callbacks: Arc<Callbacks<T::Error>>,
    options: Options,
    buffer: Vec<u8>,
    /// End of the received bytes in `buffer`.
    offset: usize,
    /// Bytes received together with the handshake response.
    leftover: Vec<u8>,
    send_failures: usize,
    dispatcher: Dispatcher,
}

impl<T, R> IoLoop<T, R>
where
    T: Transport,
    R: RngCore,
{
    pub(crate) fn new(
        transport: T,
        shared: Arc<Shared<R>>,
        callbacks: Arc<Callbacks<T::Error>>,
        options: Options,
        leftover: Vec<u8>,
    ) -> Self {
        Self {
            transport,
            shared,
            callbacks,
            buffer: vec![0; options.receive_buffer_size()],
            offset: 0,
            leftover,
            send_failures: 0,
            dispatcher: Dispatcher {
                reassembler: Reassembler::new(options.max_message_size()),
            },
            options,
        }
    }

    /// Runs the session to its end and returns the transport.
    ///
    /// `Connected` is emitted first and `Disconnected` last, exactly once each.
    pub(crate) fn run(mut self) -> T {
        info!("I/O loop started");

        self.callbacks.emit(Event::Connected);

        let leftover = core::mem::take(&mut self.leftover);

        let outcome = self.absorb(&leftover).and_then(|flow| match flow {
            Flow::Continue => self.drive(),
            Flow::Exit(exit) => Ok(exit),
        });

        self.shared.state.set(ConnectionState::Closing);
        self.shared.queue.stop();

        match outcome {
            Ok(exit) => {
                info!(?exit, "I/O loop stopped");

                if let Exit::CloseReceived(code) = exit {
                    if self.options.echo_close() {
                        self.echo_close(code);
                    }
                }
            }
            Err(err) => {
                error!(%err, close_code = ?err.close_code(), "I/O loop failed");

                self.callbacks.emit(Event::Error(&err));
            }
        }

        if self.dispatcher.reassembler.is_fragmented() {
            debug!("Dropping incomplete fragmented message");
        }

        self.buffer = Vec::new();
        self.dispatcher.reassembler.reset();

        if self.transport.is_connected() {
            self.transport.disconnect();
        }

        self.shared.queue.clear();
        self.shared.state.set(ConnectionState::Disconnected);

        self.callbacks.emit(Event::Disconnected);

        self.transport
    }

    fn drive(&mut self) -> Result<Exit, Error<T::Error>> {
        loop {
            let Some(frames) = self.shared.queue.wait_drain(self.options.poll_interval()) else {
                return Ok(Exit::Stopped);
            };

            if let Some(exit) = self.flush(frames)? {
                return Ok(exit);
            }

            if self.shared.queue.is_stopped() {
                return Ok(Exit::Stopped);
            }

            if let Flow::Exit(exit) = self.receive()? {
                return Ok(exit);
            }
        }
    }

    /// Writes the drained frames in order.
    ///
    /// A failed frame is dropped and counted; the count resets on the next successful write.
    fn flush(&mut self, frames: VecDeque<Vec<u8>>) -> Result<Option<Exit>, Error<T::Error>> {
        let backoff = self.options.would_block_backoff();
        let mut last_error = None;

        for frame in frames {
            let shared = &self.shared;

            match send_all(&mut self.transport, &frame, backoff, || {
                shared.queue.is_stopped()
            }) {
                Ok(()) => self.send_failures = 0,
                // Interrupted by a stop request.
                Err(TransportError::WouldBlock) => return Ok(Some(Exit::Stopped)),
                Err(err) => {
                    self.send_failures += 1;

                    warn!(%err, failures = self.send_failures, "Failed to send frame");

                    last_error = Some(err);
                }
            }
        }

        if self.send_failures >= self.options.max_send_failures() {
            error!(failures = self.send_failures, "Too many send failures, disconnecting");

            return Err(Error::SendFailures {
                failures: self.send_failures,
            });
        }

        if !self.transport.is_connected() {
            return match last_error {
                Some(TransportError::NotConnected) | None => Ok(Some(Exit::TransportClosed)),
                Some(err) => Err(Error::Transport(err)),
            };
        }

        Ok(None)
    }

    /// Polls the transport once.
    fn receive(&mut self) -> Result<Flow, Error<T::Error>> {
        let free = self.buffer.len() - self.offset;

        match self.transport.receive(&mut self.buffer[self.offset..]) {
            Ok(0) => {
                info!("Connection closed by peer");

                Ok(Flow::Exit(Exit::PeerClosed))
            }
            Ok(read) => {
                self.offset += read.min(free);

                self.parse()
            }
            Err(TransportError::WouldBlock) => Ok(Flow::Continue),
            Err(err) => {
                error!(%err, "Failed to receive, disconnecting");

                Err(Error::Transport(err))
            }
        }
    }

    /// Feeds bytes that arrived before the loop started.
    fn absorb(&mut self, bytes: &[u8]) -> Result<Flow, Error<T::Error>> {
        if bytes.is_empty() {
            return Ok(Flow::Continue);
        }

        debug!(len = bytes.len(), "Processing bytes received with the handshake");

        let mut rest = bytes;

        // `parse` leaves free space behind or fails, so every pass makes progress.
        while !rest.is_empty() {
            let free = self.buffer.len() - self.offset;
            let (chunk, tail) = rest.split_at(free.min(rest.len()));

            self.buffer[self.offset..self.offset + chunk.len()].copy_from_slice(chunk);
            self.offset += chunk.len();
            rest = tail;

            if let flow @ Flow::Exit(_) = self.parse()? {
                return Ok(flow);
            }
        }

        Ok(Flow::Continue)
    }

    /// Dispatches every complete frame in the buffer, then moves the incomplete tail to the
    /// front.
    fn parse(&mut self) -> Result<Flow, Error<T::Error>> {
        let mut start = 0;
        let mut flow = Flow::Continue;

        while start < self.offset {
            let decoded = codec::decode(&self.buffer[start..self.offset]).inspect_err(|err| {
                error!(%err, "Failed to decode frame, closing connection");
            });

            let Some((frame, consumed)) = decoded.map_err(ProtocolError::from)? else {
                break;
            };

            start += consumed;

            flow = self
                .dispatcher
                .dispatch(frame, &*self.shared, &*self.callbacks)
                .inspect_err(|err| {
                    error!(%err, "Protocol violation, closing connection");
                })?;

            if let Flow::Exit(_) = flow {
                break;
            }
        }

        self.buffer.copy_within(start..self.offset, 0);
        self.offset -= start;

        if flow == Flow::Continue && self.offset >= self.buffer.len() {
            error!(
                capacity = self.buffer.len(),
                "Receive buffer full without a complete frame"
            );

            return Err(Error::ReceiveBufferOverflow {
                capacity: self.buffer.len(),
            });
        }

        Ok(flow)
    }

    /// Answers a received close frame, giving up after one poll interval.
    fn echo_close(&mut self, code: Option<CloseCode>) {
        let payload = code
            .map(|code| CloseFrame::no_reason(code).to_payload())
            .unwrap_or_default();

        let frame = match self.shared.encode_control(OpCode::Close, &payload) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(%err, "Failed to encode close frame");

                return;
            }
        };

        let deadline = Instant::now() + self.options.poll_interval().max(Duration::from_millis(1));

        if let Err(err) = send_all(
            &mut self.transport,
            &frame,
            self.options.would_block_backoff(),
            || Instant::now() >= deadline,
        ) {
            warn!(%err, "Failed to echo close frame");
        }
    }
}
