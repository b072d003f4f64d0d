//! Frame payload masking (RFC 6455 Section 5.3).
//!
//! Byte `i` of a payload is XORed with `mask[i % 4]`. The operation is its own
//! inverse, so the same functions mask and unmask.

/// Byte-by-byte XOR masking.
#[inline]
pub fn apply_mask(data: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }
}

/// XOR masking that processes 4 bytes at a time as a `u32`.
///
/// Output is identical to [`apply_mask`]; used on the inbound path where
/// payloads can be large.
#[inline]
pub fn apply_mask_fast(data: &mut [u8], mask: [u8; 4]) {
    let mask_u32 = u32::from_ne_bytes(mask);
    let mut chunks = data.chunks_exact_mut(4);

    for chunk in &mut chunks {
        let val = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        chunk.copy_from_slice(&(val ^ mask_u32).to_ne_bytes());
    }

    // Every full chunk advanced the offset by 4, so the tail restarts at mask[0].
    for (i, byte) in chunks.into_remainder().iter_mut().enumerate() {
        *byte ^= mask[i];
    }
}

/// Generate a fresh masking key from the operating system's RNG.
///
/// Falls back to a time-derived key if the RNG is unavailable.
pub fn random_mask() -> [u8; 4] {
    let mut buf = [0u8; 4];
    if getrandom::getrandom(&mut buf).is_ok() {
        buf
    } else {
        use std::time::{SystemTime, UNIX_EPOCH};
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u32)
            .unwrap_or(0x1234_5678);
        nanos.wrapping_mul(0x9E37_79B9).to_le_bytes()
    }
}
