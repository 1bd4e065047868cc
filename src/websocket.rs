use std::{
    sync::Arc,
    thread::{self, JoinHandle, ThreadId},
};

use parking_lot::Mutex;
use rand::{SeedableRng, rngs::StdRng};
use rand_core::RngCore;
use tracing::{debug, error, info, warn};

use crate::{
    CloseFrame, ConnectionState, Message, OpCode, Options, Uri,
    codec::FramesCodec,
    error::{Error, FrameEncodeError, SendError},
    events::Callbacks,
    handshake,
    io_loop::IoLoop,
    queue::{OutboundQueue, Stopped},
    state::AtomicConnectionState,
    transport::Transport,
};

#[derive(Debug)]
struct Encoder<R> {
    codec: FramesCodec<R>,
    /// The last queued data frame was not final, so the next one continues its message.
    continuation: bool,
}

/// State shared by the callers and the I/O thread.
///
/// Producers lock the encoder first and the queue second, so frames enter the queue in the
/// order their fragments were encoded.
#[derive(Debug)]
pub(crate) struct Shared<R> {
    pub(crate) queue: OutboundQueue,
    pub(crate) state: AtomicConnectionState,
    encoder: Mutex<Encoder<R>>,
}

impl<R: RngCore> Shared<R> {
    fn new(capacity: usize, rng: R) -> Self {
        Self {
            queue: OutboundQueue::new(capacity),
            state: AtomicConnectionState::new(ConnectionState::Disconnected),
            encoder: Mutex::new(Encoder {
                codec: FramesCodec::new(rng),
                continuation: false,
            }),
        }
    }

    fn sec_key(&self) -> [u8; 24] {
        handshake::generate_sec_key(self.encoder.lock().codec.rng_mut())
    }

    fn reset_continuation(&self) {
        self.encoder.lock().continuation = false;
    }

    pub(crate) fn queue_data(
        &self,
        payload: &[u8],
        binary: bool,
        fin: bool,
    ) -> Result<(), SendError> {
        let mut encoder = self.encoder.lock();

        if !self.state.is_open() {
            return Err(SendError::NotConnected);
        }

        let opcode = match (encoder.continuation, binary) {
            (true, _) => OpCode::Continuation,
            (false, true) => OpCode::Binary,
            (false, false) => OpCode::Text,
        };

        let frame = encoder.codec.encode_data(fin, opcode, payload)?;

        self.queue
            .push(frame)
            .map_err(|Stopped| SendError::NotConnected)?;

        encoder.continuation = !fin;

        Ok(())
    }

    /// Queues a control frame while the connection is in one of `states`.
    pub(crate) fn queue_control(
        &self,
        opcode: OpCode,
        payload: &[u8],
        states: &[ConnectionState],
    ) -> Result<(), SendError> {
        let mut encoder = self.encoder.lock();

        if !states.contains(&self.state.get()) {
            return Err(SendError::NotConnected);
        }

        let frame = encoder.codec.encode_control(opcode, payload)?;

        self.queue
            .push(frame)
            .map_err(|Stopped| SendError::NotConnected)
    }

    pub(crate) fn encode_control(
        &self,
        opcode: OpCode,
        payload: &[u8],
    ) -> Result<Vec<u8>, FrameEncodeError> {
        self.encoder.lock().codec.encode_control(opcode, payload)
    }
}

#[derive(Debug)]
enum Session<T> {
    /// No session running. The transport is ready for the next connect.
    Idle(T),
    Running(JoinHandle<T>),
    /// The I/O thread panicked or never started.
    Lost,
}

/// A WebSocket client.
///
/// [`connect`](WebSocket::connect) performs the handshake on the calling thread and then
/// hands the transport to a dedicated I/O thread. From then on every method takes `&self`,
/// so the client can be shared between threads (e.g. in an [`Arc`]) to send from anywhere.
///
/// Outgoing frames go through a bounded queue. When it is full the oldest frame is dropped,
/// so a stalled peer costs memory proportional to the queue capacity only.
pub struct WebSocket<T: Transport, R = StdRng> {
    options: Options,
    callbacks: Callbacks<T::Error>,
    shared: Arc<Shared<R>>,
    session: Mutex<Session<T>>,
    io_thread: Mutex<Option<ThreadId>>,
}

impl<T: Transport, R> core::fmt::Debug for WebSocket<T, R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WebSocket")
            .field("state", &self.shared.state.get())
            .field("options", &self.options)
            .field("callbacks", &self.callbacks)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> WebSocket<T, StdRng> {
    /// Creates a client with default [`Options`], masking frames with an OS-seeded [`StdRng`].
    pub fn new(transport: T) -> Self {
        Self::with_options(Options::default(), transport)
    }

    /// Creates a client with `options`, masking frames with an OS-seeded [`StdRng`].
    pub fn with_options(options: Options, transport: T) -> Self {
        Self::with_rng(options, transport, StdRng::from_os_rng())
    }
}

impl<T, R> WebSocket<T, R>
where
    T: Transport,
    R: RngCore + Send + 'static,
{
    /// Creates a client drawing sec keys and masking keys from `rng`.
    pub fn with_rng(options: Options, transport: T, rng: R) -> Self {
        Self {
            shared: Arc::new(Shared::new(options.queue_capacity(), rng)),
            options,
            callbacks: Callbacks::default(),
            session: Mutex::new(Session::Idle(transport)),
            io_thread: Mutex::new(None),
        }
    }

    /// The options the next session is opened with.
    pub const fn options(&self) -> &Options {
        &self.options
    }

    /// Sets a handshake request header, replacing any header with the same name.
    ///
    /// Takes effect on the next [`connect`](WebSocket::connect).
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.options.set_header(name, value);
        self
    }

    /// Called on the I/O thread when a session starts.
    pub fn on_connected(&mut self, f: impl Fn() + Send + Sync + 'static) -> &mut Self {
        self.callbacks.set_on_connected(f);
        self
    }

    /// Called on the I/O thread once a session has ended.
    pub fn on_disconnected(&mut self, f: impl Fn() + Send + Sync + 'static) -> &mut Self {
        self.callbacks.set_on_disconnected(f);
        self
    }

    /// Called on the I/O thread for every complete message.
    ///
    /// The payload borrows the receive buffer and is only valid during the call.
    pub fn on_data(&mut self, f: impl Fn(Message<'_>) + Send + Sync + 'static) -> &mut Self {
        self.callbacks.set_on_data(f);
        self
    }

    /// Called on the I/O thread when a session fails, right before it is torn down.
    pub fn on_error(&mut self, f: impl Fn(&Error<T::Error>) + Send + Sync + 'static) -> &mut Self {
        self.callbacks.set_on_error(f);
        self
    }

    /// The current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state.get()
    }

    /// Whether the connection is [`ConnectionState::Open`].
    pub fn is_connected(&self) -> bool {
        self.shared.state.is_open()
    }

    /// Frames queued and not yet written.
    pub fn queued_frames(&self) -> usize {
        self.shared.queue.len()
    }

    fn on_io_thread(&self) -> bool {
        *self.io_thread.lock() == Some(thread::current().id())
    }

    /// Connects the transport, performs the handshake and starts the I/O thread.
    ///
    /// Blocks until the handshake completed or failed. On failure the transport is
    /// disconnected and kept, so `connect` can be retried. A finished session is cleaned up
    /// first, so reconnecting after the peer went away needs no explicit
    /// [`disconnect`](WebSocket::disconnect).
    pub fn connect(&self, uri: &str) -> Result<(), Error<T::Error>> {
        let uri = Uri::parse(uri)?;

        if self.on_io_thread() {
            return Err(Error::AlreadyConnected);
        }

        let mut session = self.session.lock();

        let mut transport = match core::mem::replace(&mut *session, Session::Lost) {
            Session::Idle(transport) => transport,
            Session::Running(handle) if handle.is_finished() => match handle.join() {
                Ok(transport) => transport,
                Err(_) => {
                    error!("I/O thread panicked");

                    return Err(Error::TransportLost);
                }
            },
            running @ Session::Running(_) => {
                *session = running;

                return Err(Error::AlreadyConnected);
            }
            Session::Lost => return Err(Error::TransportLost),
        };

        if !self
            .shared
            .state
            .transition(ConnectionState::Disconnected, ConnectionState::Connecting)
        {
            *session = Session::Idle(transport);

            return Err(Error::AlreadyConnected);
        }

        info!(%uri, secure = uri.is_secure(), "Connecting");

        let leftover = match self.open(&mut transport, &uri) {
            Ok(leftover) => leftover,
            Err(err) => {
                if transport.is_connected() {
                    transport.disconnect();
                }

                self.shared.state.set(ConnectionState::Disconnected);
                *session = Session::Idle(transport);

                return Err(err);
            }
        };

        self.shared.reset_continuation();
        self.shared.queue.restart();
        self.shared.state.set(ConnectionState::Open);

        let io = IoLoop::new(
            transport,
            self.shared.clone(),
            Arc::new(self.callbacks.clone()),
            self.options.clone(),
            leftover,
        );

        // Held until the id is stored, so callbacks always recognize their own thread.
        let mut io_thread = self.io_thread.lock();

        match thread::Builder::new()
            .name("websocket_io".into())
            .spawn(move || io.run())
        {
            Ok(handle) => {
                *io_thread = Some(handle.thread().id());
                *session = Session::Running(handle);

                Ok(())
            }
            Err(err) => {
                error!(%err, "Failed to spawn the I/O thread");

                self.shared.queue.stop();
                self.shared.state.set(ConnectionState::Disconnected);

                Err(Error::Spawn(err))
            }
        }
    }

    fn open(&self, transport: &mut T, uri: &Uri) -> Result<Vec<u8>, Error<T::Error>> {
        transport
            .connect(uri.host(), uri.port())
            .inspect_err(|err| {
                error!(%err, host = uri.host(), port = uri.port(), "Failed to connect");
            })?;

        self.shared.state.set(ConnectionState::HandshakeInProgress);

        let sec_key = self.shared.sec_key();

        handshake::client_handshake(transport, uri, &self.options, &sec_key)
    }

    /// Queues a data frame.
    ///
    /// With `fin` unset the frame starts (or continues) a fragmented message, and the next
    /// frames are sent as continuations until one with `fin` set ends it. `binary` only
    /// matters for the first frame of a message.
    pub fn send(&self, payload: &[u8], binary: bool, fin: bool) -> Result<(), SendError> {
        self.shared
            .queue_data(payload, binary, fin)
            .inspect_err(|err| debug!(%err, "Send rejected"))
    }

    /// Queues `text` as a single text frame.
    pub fn send_text(&self, text: &str) -> Result<(), SendError> {
        self.send(text.as_bytes(), false, true)
    }

    /// Queues `data` as a single binary frame.
    pub fn send_binary(&self, data: &[u8]) -> Result<(), SendError> {
        self.send(data, true, true)
    }

    /// Queues an empty ping.
    pub fn ping(&self) -> Result<(), SendError> {
        self.ping_with(&[])
    }

    /// Queues a ping carrying `payload`, at most 125 bytes.
    pub fn ping_with(&self, payload: &[u8]) -> Result<(), SendError> {
        self.shared
            .queue_control(OpCode::Ping, payload, &[ConnectionState::Open])
    }

    /// Queues an empty close frame and moves to [`ConnectionState::Closing`].
    ///
    /// The session keeps running until the peer closes or
    /// [`disconnect`](WebSocket::disconnect) is called.
    pub fn close(&self) -> Result<(), SendError> {
        self.queue_close(&[])
    }

    /// Like [`WebSocket::close`], with a status code and reason.
    pub fn close_with(&self, frame: CloseFrame<'_>) -> Result<(), SendError> {
        self.queue_close(&frame.to_payload())
    }

    fn queue_close(&self, payload: &[u8]) -> Result<(), SendError> {
        self.shared
            .queue_control(OpCode::Close, payload, &[ConnectionState::Open])?;

        self.shared
            .state
            .transition(ConnectionState::Open, ConnectionState::Closing);

        Ok(())
    }

    /// Stops the session, joins the I/O thread and disconnects the transport.
    ///
    /// Frames still queued are dropped. Called from a callback it only requests the stop,
    /// and the session ends once the callback returns.
    pub fn disconnect(&self) {
        if self.on_io_thread() {
            debug!("Disconnect requested from the I/O thread");

            self.shared.queue.stop();

            return;
        }

        let mut session = self.session.lock();

        self.shared.queue.stop();

        let transport = match core::mem::replace(&mut *session, Session::Lost) {
            Session::Idle(transport) => Some(transport),
            Session::Running(handle) => {
                self.shared.state.set(ConnectionState::Closing);

                match handle.join() {
                    Ok(transport) => Some(transport),
                    Err(_) => {
                        warn!("I/O thread panicked");

                        None
                    }
                }
            }
            Session::Lost => None,
        };

        *self.io_thread.lock() = None;

        if let Some(mut transport) = transport {
            if transport.is_connected() {
                transport.disconnect();
            }

            *session = Session::Idle(transport);
        }

        self.shared.queue.clear();
        self.shared.state.set(ConnectionState::Disconnected);
    }
}

impl<T: Transport, R> Drop for WebSocket<T, R> {
    fn drop(&mut self) {
        self.shared.queue.stop();

        if let Session::Running(handle) = core::mem::replace(self.session.get_mut(), Session::Lost)
        {
            if *self.io_thread.get_mut() != Some(thread::current().id()) {
                let _ = handle.join();
            }
        }
    }
}
