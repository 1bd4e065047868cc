//! Threaded, callback driven `websocket` client engine over any non-blocking byte stream.

#![deny(missing_debug_implementations)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! # Examples
//!
//! A `transport` is anything that implements [`Transport`]. [`TcpTransport`] covers plain TCP,
//! TLS is left to the caller's own transport.
//!
//! ## Client
//! ```no_run
//! use wsengine::{Options, TcpTransport, WebSocket};
//!
//! let options = Options::default()
//!     .with_header("User-Agent", "wsengine")
//!     .with_queue_capacity(128);
//!
//! let mut websocket = WebSocket::with_options(options, TcpTransport::new());
//!
//! // Callbacks run on the I/O thread and must be registered before connecting.
//! websocket
//!     .on_connected(|| println!("connected"))
//!     .on_data(|message| {
//!         // Messages borrow the receive buffer; copy what must outlive the callback.
//!         if let Some(text) = message.as_text() {
//!             println!("received: {text}");
//!         }
//!     })
//!     .on_error(|err| eprintln!("session failed: {err}"))
//!     .on_disconnected(|| println!("disconnected"));
//!
//! websocket
//!     .connect("ws://example.com:8080/ws")
//!     .expect("Handshake failed");
//!
//! // Sending never blocks: frames are queued and written by the I/O thread.
//! websocket
//!     .send_text("Hello, WebSocket!")
//!     .expect("Not connected");
//!
//! // A message split over three frames.
//! websocket.send(b"Hello, ", false, false).expect("Not connected");
//! websocket.send(b"fragmented ", false, false).expect("Not connected");
//! websocket.send(b"WebSocket!", false, true).expect("Not connected");
//!
//! websocket.close().expect("Not connected");
//! websocket.disconnect();
//! ```
//!
//! # Threads
//!
//! [`WebSocket::connect`] runs the handshake on the caller's thread, then spawns a thread named
//! `websocket_io` that owns the transport until the session ends. Every callback runs on that
//! thread. [`WebSocket::send`], [`WebSocket::ping`] and [`WebSocket::close`] take `&self` and
//! may be called from any number of threads. Only [`WebSocket::disconnect`] waits, for the
//! I/O thread to finish.
//!
//! # Ping and close
//!
//! Pings are answered with a pong carrying the same payload. A close frame from the peer ends
//! the session; answering it with a close frame first is opt-in, see
//! [`Options::with_echo_close`].

mod close_code;
pub use close_code::CloseCode;

mod close_frame;
pub use close_frame::CloseFrame;

mod codec;

pub mod error;
pub use error::Error;

mod events;
pub use events::{Callbacks, Event};

mod fragments;

mod frame;
pub use frame::Frame;
use frame::Header;

mod handshake;

pub mod http;

mod io_loop;

mod mask;

mod message;
pub use message::Message;

#[doc(hidden)]
pub mod mock;

mod opcode;
pub use opcode::OpCode;

mod options;
pub use options::Options;

mod queue;

mod state;
pub use state::ConnectionState;

mod tcp;
pub use tcp::TcpTransport;

pub mod transport;
pub use transport::Transport;

mod uri;
pub use uri::Uri;

mod websocket;
pub use websocket::WebSocket;

#[cfg(test)]
mod tests;
