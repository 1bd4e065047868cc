/// A complete data message delivered to the data callback.
///
/// Text payloads are handed over as received; no UTF-8 validation is performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message<'a> {
    /// A text WebSocket message.
    Text(&'a [u8]),
    /// A binary WebSocket message.
    Binary(&'a [u8]),
}

impl<'a> Message<'a> {
    pub(crate) const fn new(payload: &'a [u8], binary: bool) -> Self {
        match binary {
            true => Message::Binary(payload),
            false => Message::Text(payload),
        }
    }

    /// Indicates whether a message is a text message.
    pub const fn is_text(&self) -> bool {
        matches!(*self, Message::Text(_))
    }

    /// Indicates whether a message is a binary message.
    pub const fn is_binary(&self) -> bool {
        matches!(*self, Message::Binary(_))
    }

    /// The message body.
    pub const fn payload(&self) -> &'a [u8] {
        match *self {
            Message::Text(payload) | Message::Binary(payload) => payload,
        }
    }

    /// Returns the payload as a string slice if it is a text message holding valid UTF-8.
    pub fn as_text(&self) -> Option<&'a str> {
        match *self {
            Message::Text(payload) => core::str::from_utf8(payload).ok(),
            Message::Binary(_) => None,
        }
    }

    /// Get the length of the WebSocket message.
    pub const fn len(&self) -> usize {
        self.payload().len()
    }

    /// Returns true if the WebSocket message has no content.
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
