/// XORs `payload` in place with `mask[i % 4]`.
///
/// Applying the same mask twice restores the original bytes.
#[inline]
#[cfg(test)]
pub fn unmask(payload: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= mask[i & 3];
    }
}

/// Appends `payload` to `dst`, masked with `mask`.
#[inline]
pub fn extend_masked(dst: &mut Vec<u8>, payload: &[u8], mask: [u8; 4]) {
    dst.extend(
        payload
            .iter()
            .enumerate()
            .map(|(i, byte)| byte ^ mask[i & 3]),
    );
}
