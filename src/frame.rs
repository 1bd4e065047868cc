use crate::OpCode;

/// Largest payload carried by a single data frame sent by this engine.
pub const MAX_DATA_PAYLOAD: usize = 65535;

/// Largest payload of a control frame.
pub const MAX_CONTROL_PAYLOAD: usize = 125;

/// A received frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    /// Indicates if this is the final frame in a message.
    fin: bool,
    /// The opcode of the frame.
    opcode: OpCode,
    /// The payload of the frame.
    payload: &'a [u8],
}

impl<'a> Frame<'a> {
    /// Creates a new `Frame` instance.
    pub const fn new(fin: bool, opcode: OpCode, payload: &'a [u8]) -> Self {
        Self {
            fin,
            opcode,
            payload,
        }
    }

    /// Returns whether this is the final frame in a message.
    pub const fn is_final(&self) -> bool {
        self.fin
    }

    /// Returns the opcode of the frame.
    pub const fn opcode(&self) -> OpCode {
        self.opcode
    }

    /// Returns the payload of the frame.
    pub const fn payload(&self) -> &'a [u8] {
        self.payload
    }
}

/// The fixed part of an outgoing frame: first byte and length field.
///
/// The mask bit is always set; the masking key is written by the codec.
#[derive(Debug)]
pub struct Header {
    fin: bool,
    opcode: OpCode,
    payload_len: usize,
}

impl Header {
    /// A header for a frame carrying `payload_len` bytes.
    pub const fn new(fin: bool, opcode: OpCode, payload_len: usize) -> Self {
        Self {
            fin,
            opcode,
            payload_len,
        }
    }

    /// Appends the header to `dst` and returns the number of bytes written.
    ///
    /// Lengths above [`MAX_DATA_PAYLOAD`] are never produced; the codec rejects them first.
    pub fn write(&self, dst: &mut Vec<u8>) -> usize {
        dst.push((self.fin as u8) << 7 | self.opcode.as_u8());

        let len = self.payload_len;

        if len < 126 {
            dst.push(0x80 | len as u8);
            2
        } else {
            debug_assert!(len <= MAX_DATA_PAYLOAD, "length must fit the 16-bit field");

            dst.push(0x80 | 126);
            dst.extend_from_slice(&(len as u16).to_be_bytes());
            4
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_header() {
        let mut dst = Vec::new();

        let written = Header::new(true, OpCode::Text, 5).write(&mut dst);

        assert_eq!(written, 2);
        assert_eq!(dst, [0x81, 0x85]);
    }

    #[test]
    fn extended_16_bit_header() {
        let mut dst = Vec::new();

        let written = Header::new(false, OpCode::Binary, 300).write(&mut dst);

        assert_eq!(written, 4);
        assert_eq!(dst, [0x02, 0x80 | 126, 0x01, 0x2C]);
    }

    #[test]
    fn boundary_lengths() {
        let mut dst = Vec::new();
        assert_eq!(Header::new(true, OpCode::Binary, 125).write(&mut dst), 2);

        let mut dst = Vec::new();
        assert_eq!(Header::new(true, OpCode::Binary, 126).write(&mut dst), 4);

        let mut dst = Vec::new();
        Header::new(true, OpCode::Binary, MAX_DATA_PAYLOAD).write(&mut dst);
        assert_eq!(&dst[2..], &[0xFF, 0xFF]);
    }
}
