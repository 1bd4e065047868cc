use rand::Rng;
use rand_core::RngCore;

use crate::{
    Frame, Header, OpCode,
    error::{FrameDecodeError, FrameEncodeError},
    frame::{MAX_CONTROL_PAYLOAD, MAX_DATA_PAYLOAD},
};

const MIN_HEADER_SIZE: usize = 2;

/// Client-side frame encoder.
///
/// Every frame is masked with a fresh key drawn from `rng`.
#[derive(Debug)]
pub struct FramesCodec<R> {
    rng: R,
}

impl<R> FramesCodec<R> {
    /// A codec drawing masking keys from `rng`.
    pub const fn new(rng: R) -> Self {
        Self { rng }
    }

    pub fn rng_mut(&mut self) -> &mut R {
        &mut self.rng
    }
}

impl<R: RngCore> FramesCodec<R> {
    fn encode_inner(&mut self, fin: bool, opcode: OpCode, payload: &[u8]) -> Vec<u8> {
        // 4 bytes of header at most, plus the masking key.
        let mut dst = Vec::with_capacity(payload.len() + 8);

        Header::new(fin, opcode, payload.len()).write(&mut dst);

        let mask: [u8; 4] = self.rng.random();

        dst.extend_from_slice(&mask);
        crate::mask::extend_masked(&mut dst, payload, mask);

        dst
    }

    /// Encodes a data frame (`Text`, `Binary` or `Continuation`).
    pub fn encode_data(
        &mut self,
        fin: bool,
        opcode: OpCode,
        payload: &[u8],
    ) -> Result<Vec<u8>, FrameEncodeError> {
        debug_assert!(opcode.is_data(), "data frames only");

        if payload.len() > MAX_DATA_PAYLOAD {
            return Err(FrameEncodeError::PayloadTooLarge { len: payload.len() });
        }

        Ok(self.encode_inner(fin, opcode, payload))
    }

    /// Encodes a final control frame (`Close`, `Ping` or `Pong`).
    pub fn encode_control(
        &mut self,
        opcode: OpCode,
        payload: &[u8],
    ) -> Result<Vec<u8>, FrameEncodeError> {
        debug_assert!(opcode.is_control(), "control frames only");

        if payload.len() > MAX_CONTROL_PAYLOAD {
            return Err(FrameEncodeError::ControlPayloadTooLarge { len: payload.len() });
        }

        Ok(self.encode_inner(true, opcode, payload))
    }
}

/// Decodes one server frame from the start of `src`.
///
/// Returns `Ok(None)` when `src` does not yet hold a complete frame. Nothing is consumed in
/// that case, so the call can be repeated once more bytes arrived. On success the frame
/// borrows its payload from `src` and the number of bytes it occupies is returned alongside.
pub fn decode(src: &[u8]) -> Result<Option<(Frame<'_>, usize)>, FrameDecodeError> {
    if src.len() < MIN_HEADER_SIZE {
        return Ok(None);
    }

    let fin = src[0] & 0b10000000 != 0;

    if src[0] & 0b01110000 != 0 {
        return Err(FrameDecodeError::ReservedBitsNotZero);
    }

    if src[1] & 0b10000000 != 0 {
        return Err(FrameDecodeError::MaskedFrame);
    }

    let opcode = OpCode::from(src[0]);

    let length_code = src[1] & 0x7F;
    let extra = match length_code {
        126 => 2,
        127 => 8,
        _ => 0,
    };

    let header_len = MIN_HEADER_SIZE + extra;

    if src.len() < header_len {
        return Ok(None);
    }

    let payload_len = match extra {
        0 => length_code as u64,
        2 => u16::from_be_bytes([src[2], src[3]]) as u64,
        _ => u64::from_be_bytes([
            src[2], src[3], src[4], src[5], src[6], src[7], src[8], src[9],
        ]),
    };

    if opcode.is_control() {
        if !fin {
            return Err(FrameDecodeError::ControlFrameFragmented);
        }

        if payload_len > MAX_CONTROL_PAYLOAD as u64 {
            return Err(FrameDecodeError::ControlFrameTooLarge { len: payload_len });
        }
    }

    let frame_len = usize::try_from(payload_len)
        .ok()
        .and_then(|len| len.checked_add(header_len))
        .ok_or(FrameDecodeError::PayloadTooLarge)?;

    if src.len() < frame_len {
        return Ok(None);
    }

    let payload = &src[header_len..frame_len];

    Ok(Some((Frame::new(fin, opcode, payload), frame_len)))
}
