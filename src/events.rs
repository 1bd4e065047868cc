//! Session events and the callbacks they are routed to.
//!
//! Every callback runs on the I/O thread. A callback that blocks stalls sending and
//! receiving for the whole session, and one that calls [`WebSocket::disconnect`] only
//! requests the stop (it cannot join its own thread).
//!
//! [`WebSocket::disconnect`]: crate::WebSocket::disconnect

use std::sync::Arc;

use crate::{Message, error::Error};

/// Something that happened on an open session.
#[derive(Debug)]
pub enum Event<'a, E> {
    /// The handshake completed and the I/O loop started.
    Connected,
    /// A complete data message arrived.
    Data(Message<'a>),
    /// The session failed. `Disconnected` follows.
    Error(&'a Error<E>),
    /// The session ended. Emitted exactly once per successful connect.
    Disconnected,
}

type Hook = Arc<dyn Fn() + Send + Sync>;
type DataHook = Arc<dyn Fn(Message<'_>) + Send + Sync>;
type ErrorHook<E> = Arc<dyn Fn(&Error<E>) + Send + Sync>;

/// Registered callbacks. Missing ones are skipped.
///
/// Each connect takes a snapshot, so changes apply from the next session on.
pub struct Callbacks<E> {
    on_connected: Option<Hook>,
    on_disconnected: Option<Hook>,
    on_data: Option<DataHook>,
    on_error: Option<ErrorHook<E>>,
}

impl<E> Default for Callbacks<E> {
    fn default() -> Self {
        Self {
            on_connected: None,
            on_disconnected: None,
            on_data: None,
            on_error: None,
        }
    }
}

impl<E> Clone for Callbacks<E> {
    fn clone(&self) -> Self {
        Self {
            on_connected: self.on_connected.clone(),
            on_disconnected: self.on_disconnected.clone(),
            on_data: self.on_data.clone(),
            on_error: self.on_error.clone(),
        }
    }
}

impl<E> core::fmt::Debug for Callbacks<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_connected", &self.on_connected.is_some())
            .field("on_disconnected", &self.on_disconnected.is_some())
            .field("on_data", &self.on_data.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

impl<E> Callbacks<E> {
    /// Called once the I/O loop runs.
    pub fn set_on_connected(&mut self, f: impl Fn() + Send + Sync + 'static) {
        self.on_connected = Some(Arc::new(f));
    }

    /// Called when the session ends.
    pub fn set_on_disconnected(&mut self, f: impl Fn() + Send + Sync + 'static) {
        self.on_disconnected = Some(Arc::new(f));
    }

    /// Called with every complete message.
    pub fn set_on_data(&mut self, f: impl Fn(Message<'_>) + Send + Sync + 'static) {
        self.on_data = Some(Arc::new(f));
    }

    /// Called with the error that ended a session.
    pub fn set_on_error(&mut self, f: impl Fn(&Error<E>) + Send + Sync + 'static) {
        self.on_error = Some(Arc::new(f));
    }

    /// Routes `event` to its callback.
    pub fn emit(&self, event: Event<'_, E>) {
        match event {
            Event::Connected => {
                if let Some(f) = &self.on_connected {
                    f();
                }
            }
            Event::Data(message) => {
                if let Some(f) = &self.on_data {
                    f(message);
                }
            }
            Event::Error(error) => {
                if let Some(f) = &self.on_error {
                    f(error);
                }
            }
            Event::Disconnected => {
                if let Some(f) = &self.on_disconnected {
                    f();
                }
            }
        }
    }
}
