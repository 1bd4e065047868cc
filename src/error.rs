//! Error types.

use crate::{CloseCode, OpCode};

/// Errors raised while decoding a server frame.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameDecodeError {
    /// RSV1, RSV2 or RSV3 was set. No extension is negotiated.
    #[error("Reserved bits must be zero")]
    ReservedBitsNotZero,
    /// The server masked a frame.
    #[error("Server frames must not be masked")]
    MaskedFrame,
    /// A control frame without the FIN bit.
    #[error("Control frame fragmented")]
    ControlFrameFragmented,
    /// A control frame carrying more than 125 bytes.
    #[error("Control frame payload too large: {len} bytes")]
    ControlFrameTooLarge {
        /// Announced payload length.
        len: u64,
    },
    /// A 64-bit length larger than `usize`.
    #[error("Payload length does not fit in memory")]
    PayloadTooLarge,
}

/// Errors raised while encoding a client frame.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameEncodeError {
    /// A data payload over 65535 bytes.
    #[error("Data payload too large: {len} bytes, maximum is 65535")]
    PayloadTooLarge {
        /// Rejected payload length.
        len: usize,
    },
    /// A control payload over 125 bytes.
    #[error("Control payload too large: {len} bytes, maximum is 125")]
    ControlPayloadTooLarge {
        /// Rejected payload length.
        len: usize,
    },
}

/// Protocol violations by the peer. Always fatal for the session.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The frame could not be decoded.
    #[error("Decode error: {0}")]
    Decode(
        #[source]
        #[from]
        FrameDecodeError,
    ),
    /// A text or binary frame interrupted a fragmented message.
    #[error("New data frame received while a fragmented message is in progress")]
    InvalidFragment,
    /// A continuation frame arrived with no fragmented message to extend.
    #[error("Continuation frame received without a fragmented message in progress")]
    InvalidContinuationFrame,
    /// A control or reserved frame where a data frame was expected.
    #[error("Expected a data frame, got {opcode:?}")]
    UnexpectedOpCode {
        /// Received opcode.
        opcode: OpCode,
    },
    /// The fragments add up to more than [`Options::max_message_size`](crate::Options::max_message_size).
    #[error("Reassembled message exceeds {limit} bytes")]
    MessageTooLarge {
        /// Configured limit.
        limit: usize,
    },
}

/// Errors raised while parsing a `ws://` URI.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UriError {
    /// No `://` after the scheme.
    #[error("Missing `://` scheme separator")]
    MissingScheme,
    /// Nothing between the scheme and the port or path.
    #[error("Empty host")]
    EmptyHost,
    /// The port is not a number between 0 and 65535.
    #[error("Invalid port")]
    InvalidPort,
}

/// Errors raised by the opening handshake.
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    /// The server closed the connection before the response head was complete.
    #[error("Connection closed during handshake")]
    ConnectionClosed,
    /// The response head did not end within the configured limit.
    #[error("Handshake response exceeds {limit} bytes")]
    ResponseTooLarge {
        /// Configured limit.
        limit: usize,
    },
    /// The response head is not valid HTTP.
    #[error("Malformed handshake response: {0}")]
    Http(
        #[source]
        #[from]
        httparse::Error,
    ),
    /// The status is not `101 Switching Protocols`.
    #[error("Invalid status code: {code:?}")]
    InvalidStatusCode {
        /// Received status, if any.
        code: Option<u16>,
    },
    /// `Upgrade: websocket` is missing.
    #[error("Missing or invalid upgrade header")]
    MissingOrInvalidUpgrade,
    /// `Connection: Upgrade` is missing.
    #[error("Missing or invalid connection header")]
    MissingOrInvalidConnection,
    /// `Sec-WebSocket-Accept` is missing or does not match the key.
    #[error("Missing or invalid sec-websocket-accept header")]
    MissingOrInvalidAccept,
}

/// Result of a failed transport operation.
///
/// [`TransportError::WouldBlock`] is not a failure: the operation is retried later.
#[derive(Debug, thiserror::Error)]
pub enum TransportError<E> {
    /// Nothing could be read or written right now.
    #[error("Operation would block")]
    WouldBlock,
    /// The connection is gone.
    #[error("Transport is not connected")]
    NotConnected,
    /// Any other failure of the underlying stream.
    #[error("Transport error: {0}")]
    Other(#[source] E),
}

/// Rejection of a [`send`](crate::WebSocket::send), [`ping`](crate::WebSocket::ping)
/// or [`close`](crate::WebSocket::close) call. Never changes the connection state.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SendError {
    /// The connection is not in a state that accepts this frame.
    #[error("Not connected")]
    NotConnected,
    /// The payload is too large for its frame type.
    #[error("Encode error: {0}")]
    Encode(
        #[source]
        #[from]
        FrameEncodeError,
    ),
}

/// Engine error, returned by [`connect`](crate::WebSocket::connect) and delivered to the error callback.
#[derive(Debug, thiserror::Error)]
pub enum Error<E> {
    /// The URI passed to `connect` is malformed.
    #[error("Invalid URI: {0}")]
    InvalidUri(
        #[source]
        #[from]
        UriError,
    ),
    /// The server rejected or botched the upgrade.
    #[error("Handshake error: {0}")]
    Handshake(
        #[source]
        #[from]
        HandshakeError,
    ),
    /// The transport failed.
    #[error("Transport error: {0}")]
    Transport(
        #[source]
        #[from]
        TransportError<E>,
    ),
    /// The server violated the protocol.
    #[error("Protocol error: {0}")]
    Protocol(
        #[source]
        #[from]
        ProtocolError,
    ),
    /// A frame did not fit in the receive buffer.
    #[error("Receive buffer of {capacity} bytes filled without a complete frame")]
    ReceiveBufferOverflow {
        /// Size of the receive buffer.
        capacity: usize,
    },
    /// Too many writes failed in a row.
    #[error("{failures} consecutive frames failed to send")]
    SendFailures {
        /// Number of failed writes.
        failures: usize,
    },
    /// A session is already running, or `connect` was called from a callback.
    #[error("Already connected")]
    AlreadyConnected,
    /// The I/O thread panicked or could not be spawned and took the transport with it.
    #[error("Transport lost")]
    TransportLost,
    /// The I/O thread could not be started.
    #[error("Failed to spawn the I/O thread: {0}")]
    Spawn(#[source] std::io::Error),
}

impl<E> Error<E> {
    /// The close code matching this error, as reported in logs.
    pub const fn close_code(&self) -> CloseCode {
        match self {
            Error::Protocol(ProtocolError::MessageTooLarge { .. })
            | Error::ReceiveBufferOverflow { .. } => CloseCode::Size,
            Error::Protocol(_) => CloseCode::Protocol,
            _ => CloseCode::Abnormal,
        }
    }
}
