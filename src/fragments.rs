use crate::{Frame, Message, OpCode, error::ProtocolError};

/// Joins fragmented data frames into complete messages.
#[derive(Debug)]
pub struct Reassembler {
    buffer: Vec<u8>,
    is_fragmented: bool,
    is_binary: bool,
    max_message_size: usize,
}

impl Reassembler {
    /// A reassembler rejecting messages over `max_message_size` bytes.
    pub const fn new(max_message_size: usize) -> Self {
        Self {
            buffer: Vec::new(),
            is_fragmented: false,
            is_binary: false,
            max_message_size,
        }
    }

    /// Whether a fragmented message is in progress.
    pub const fn is_fragmented(&self) -> bool {
        self.is_fragmented
    }

    /// Feeds one data frame.
    ///
    /// Returns the complete message once a frame with `fin` set ends it. A final,
    /// unfragmented frame is returned without copying.
    pub fn push<'a>(&'a mut self, frame: Frame<'a>) -> Result<Option<Message<'a>>, ProtocolError> {
        let payload = frame.payload();

        match frame.opcode() {
            OpCode::Text | OpCode::Binary => {
                if self.is_fragmented {
                    return Err(ProtocolError::InvalidFragment);
                }

                let binary = frame.opcode() == OpCode::Binary;

                if frame.is_final() {
                    self.check_size(payload.len())?;

                    return Ok(Some(Message::new(payload, binary)));
                }

                self.buffer.clear();
                self.check_size(payload.len())?;
                self.buffer.extend_from_slice(payload);
                self.is_fragmented = true;
                self.is_binary = binary;

                Ok(None)
            }
            OpCode::Continuation => {
                if !self.is_fragmented {
                    return Err(ProtocolError::InvalidContinuationFrame);
                }

                self.check_size(self.buffer.len() + payload.len())?;
                self.buffer.extend_from_slice(payload);

                if !frame.is_final() {
                    return Ok(None);
                }

                self.is_fragmented = false;

                Ok(Some(Message::new(&self.buffer, self.is_binary)))
            }
            opcode => Err(ProtocolError::UnexpectedOpCode { opcode }),
        }
    }

    /// Drops any partially received message.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.is_fragmented = false;
        self.is_binary = false;
    }

    fn check_size(&self, len: usize) -> Result<(), ProtocolError> {
        match len > self.max_message_size {
            true => Err(ProtocolError::MessageTooLarge {
                limit: self.max_message_size,
            }),
            false => Ok(()),
        }
    }
}
