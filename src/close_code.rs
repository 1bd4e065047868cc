/// A WebSocket close status code.
#[non_exhaustive]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CloseCode {
    /// The purpose of the connection has been fulfilled.
    Normal,
    /// The endpoint is going away.
    Away,
    /// The endpoint saw a protocol error.
    Protocol,
    /// The endpoint received a type of data it cannot accept.
    Unsupported,
    /// No status code was present. Never sent on the wire.
    Status,
    /// The connection dropped without a close frame. Never sent on the wire.
    Abnormal,
    /// The payload was inconsistent with the message type.
    Invalid,
    /// The message violates the endpoint's policy.
    Policy,
    /// The message is too big to process.
    Size,
    /// The server did not negotiate a required extension.
    Extension,
    /// The server hit an unexpected condition.
    Error,
    /// The server is restarting.
    Restart,
    /// The server is overloaded.
    Again,
    /// Application or library defined code in the 3000-4999 range.
    Other(u16),
    /// Anything outside of the registered and private ranges.
    Bad(u16),
}

impl CloseCode {
    /// Returns whether the code may appear in a close frame on the wire.
    pub const fn is_allowed(&self) -> bool {
        !matches!(
            self,
            CloseCode::Status | CloseCode::Abnormal | CloseCode::Bad(_)
        )
    }

    /// Maps a wire value to its code.
    pub const fn from_u16(code: u16) -> Self {
        match code {
            1000 => CloseCode::Normal,
            1001 => CloseCode::Away,
            1002 => CloseCode::Protocol,
            1003 => CloseCode::Unsupported,
            1005 => CloseCode::Status,
            1006 => CloseCode::Abnormal,
            1007 => CloseCode::Invalid,
            1008 => CloseCode::Policy,
            1009 => CloseCode::Size,
            1010 => CloseCode::Extension,
            1011 => CloseCode::Error,
            1012 => CloseCode::Restart,
            1013 => CloseCode::Again,
            3000..=4999 => CloseCode::Other(code),
            _ => CloseCode::Bad(code),
        }
    }

    /// The wire value.
    pub const fn as_u16(&self) -> u16 {
        match self {
            CloseCode::Normal => 1000,
            CloseCode::Away => 1001,
            CloseCode::Protocol => 1002,
            CloseCode::Unsupported => 1003,
            CloseCode::Status => 1005,
            CloseCode::Abnormal => 1006,
            CloseCode::Invalid => 1007,
            CloseCode::Policy => 1008,
            CloseCode::Size => 1009,
            CloseCode::Extension => 1010,
            CloseCode::Error => 1011,
            CloseCode::Restart => 1012,
            CloseCode::Again => 1013,
            CloseCode::Other(code) | CloseCode::Bad(code) => *code,
        }
    }
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        Self::from_u16(code)
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> u16 {
        code.as_u16()
    }
}
