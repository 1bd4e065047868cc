use crate::CloseCode;

/// The payload of a close frame: a status code and an optional UTF-8 reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseFrame<'a> {
    code: CloseCode,
    reason: &'a str,
}

impl<'a> CloseFrame<'a> {
    /// Creates a close payload with a reason.
    pub const fn new(code: CloseCode, reason: &'a str) -> Self {
        Self { code, reason }
    }

    /// Creates a close payload carrying only `code`.
    pub const fn no_reason(code: CloseCode) -> Self {
        Self::new(code, "")
    }

    /// The status code.
    pub const fn code(&self) -> CloseCode {
        self.code
    }

    /// The reason, possibly empty.
    pub const fn reason(&self) -> &'a str {
        self.reason
    }

    /// Length of the encoded payload.
    pub const fn len(&self) -> usize {
        2 + self.reason.len()
    }

    /// Always `false`: the code takes two bytes.
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Encodes the code in network byte order followed by the reason.
    pub fn to_payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(self.len());

        payload.extend_from_slice(&self.code.as_u16().to_be_bytes());
        payload.extend_from_slice(self.reason.as_bytes());

        payload
    }

    /// Parses a received close payload.
    ///
    /// Returns `None` for an empty payload and for payloads that are not a valid close body
    /// (a single byte, a disallowed code or a non UTF-8 reason).
    pub fn parse(payload: &'a [u8]) -> Option<Self> {
        if payload.len() < 2 {
            return None;
        }

        let code = CloseCode::from_u16(u16::from_be_bytes([payload[0], payload[1]]));

        if !code.is_allowed() {
            return None;
        }

        let reason = core::str::from_utf8(&payload[2..]).ok()?;

        Some(Self::new(code, reason))
    }
}
