//! Frame sealing and unsealing.
//!
//! The hub only ever speaks single, unfragmented text frames. Outbound frames
//! are built with [`seal`] and are never masked; inbound frames are decoded
//! with [`unseal`] (or [`decode`] on a streaming buffer) and must carry the
//! client's mask.
//!
//! ## Frame Structure
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! | |1|2|3|       |K|             |                               |
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |                         Masking key (if present)              |
//! +---------------------------------------------------------------+
//! |                     Payload data                              |
//! +---------------------------------------------------------------+
//! ```
//!
//! The FIN bit and opcode of inbound frames are not inspected. Every physical
//! frame is one message: continuation frames are not reassembled and control
//! frames are not answered.

use crate::error::FrameDecodeError;
use crate::protocol::mask::{apply_mask, apply_mask_fast};

/// First header byte of every frame the hub sends: FIN + text opcode.
pub const TEXT_FIN: u8 = 0x80 | 0x01;

/// Largest payload that fits in the 7-bit length field.
pub const MAX_INLINE_LEN: usize = 125;

/// Length selector announcing a 16-bit extended length.
pub const LEN_16: u8 = 126;

/// Length selector announcing a 64-bit extended length.
pub const LEN_64: u8 = 127;

const MASK_BIT: u8 = 0x80;

/// Write the length selector and any extended length bytes.
///
/// The 64-bit form is written as two big-endian 32-bit words, high then low.
fn push_length(buf: &mut Vec<u8>, len: usize, mask_bit: u8) {
    if len <= MAX_INLINE_LEN {
        buf.push(mask_bit | len as u8);
    } else if len < 65536 {
        buf.push(mask_bit | LEN_16);
        buf.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        let len = len as u64;
        buf.push(mask_bit | LEN_64);
        buf.extend_from_slice(&((len >> 32) as u32).to_be_bytes());
        buf.extend_from_slice(&(len as u32).to_be_bytes());
    }
}

/// Number of header bytes (without mask key) for a payload of `len` bytes.
#[must_use]
pub const fn header_len(len: usize) -> usize {
    if len <= MAX_INLINE_LEN {
        2
    } else if len < 65536 {
        4
    } else {
        10
    }
}

/// Build a single unmasked text frame around `payload`.
///
/// # Example
///
/// ```
/// use wshub::protocol::frame::seal;
///
/// assert_eq!(seal(b"Hello"), [0x81, 0x05, b'H', b'e', b'l', b'l', b'o']);
/// ```
#[must_use]
pub fn seal(payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(header_len(payload.len()) + payload.len());
    buf.push(TEXT_FIN);
    push_length(&mut buf, payload.len(), 0);
    buf.extend_from_slice(payload);
    buf
}

/// Build a single masked text frame, as a client sends it.
#[must_use]
pub fn seal_masked(payload: &[u8], mask: [u8; 4]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(header_len(payload.len()) + 4 + payload.len());
    buf.push(TEXT_FIN);
    push_length(&mut buf, payload.len(), MASK_BIT);
    buf.extend_from_slice(&mask);
    let start = buf.len();
    buf.extend_from_slice(payload);
    apply_mask(&mut buf[start..], mask);
    buf
}

/// Decode the first frame in `buf`.
///
/// Returns `Ok(None)` while `buf` holds only part of a frame, otherwise the
/// unmasked payload together with the number of bytes the frame occupied.
///
/// # Errors
///
/// - [`FrameDecodeError::Unmasked`] if the mask bit is clear
/// - [`FrameDecodeError::TooLarge`] if the declared length exceeds `max_payload`
pub fn decode(
    buf: &[u8],
    max_payload: usize,
) -> Result<Option<(Vec<u8>, usize)>, FrameDecodeError> {
    if buf.len() < 2 {
        return Ok(None);
    }

    let byte1 = buf[1];
    if byte1 & MASK_BIT == 0 {
        return Err(FrameDecodeError::Unmasked);
    }

    let (declared, mask_offset): (u64, usize) = match byte1 & 0x7F {
        LEN_16 => {
            if buf.len() < 4 {
                return Ok(None);
            }
            (u64::from(u16::from_be_bytes([buf[2], buf[3]])), 4)
        }
        LEN_64 => {
            if buf.len() < 10 {
                return Ok(None);
            }
            let high = u32::from_be_bytes([buf[2], buf[3], buf[4], buf[5]]);
            let low = u32::from_be_bytes([buf[6], buf[7], buf[8], buf[9]]);
            ((u64::from(high) << 32) | u64::from(low), 10)
        }
        inline => (u64::from(inline), 2),
    };

    let payload_len = usize::try_from(declared)
        .ok()
        .filter(|&len| len <= max_payload)
        .ok_or(FrameDecodeError::TooLarge {
            size: declared,
            max: max_payload,
        })?;

    let payload_start = mask_offset + 4;
    let total = payload_start
        .checked_add(payload_len)
        .ok_or(FrameDecodeError::TooLarge {
            size: declared,
            max: max_payload,
        })?;
    if buf.len() < total {
        return Ok(None);
    }

    let mask = [
        buf[mask_offset],
        buf[mask_offset + 1],
        buf[mask_offset + 2],
        buf[mask_offset + 3],
    ];
    let mut payload = buf[payload_start..total].to_vec();
    apply_mask_fast(&mut payload, mask);

    Ok(Some((payload, total)))
}

/// Total bytes the first frame in `buf` occupies, once enough of the header
/// has arrived to tell.
#[must_use]
pub fn frame_len(buf: &[u8]) -> Option<usize> {
    let byte1 = *buf.get(1)?;
    let (len, mask_offset): (usize, usize) = match byte1 & 0x7F {
        LEN_16 => (u16::from_be_bytes([*buf.get(2)?, *buf.get(3)?]) as usize, 4),
        LEN_64 => {
            let bytes: [u8; 8] = buf.get(2..10)?.try_into().ok()?;
            (usize::try_from(u64::from_be_bytes(bytes)).ok()?, 10)
        }
        inline => (inline as usize, 2),
    };
    let mask_len = if byte1 & MASK_BIT != 0 { 4 } else { 0 };
    (mask_offset + mask_len).checked_add(len)
}

/// Decode one complete client frame and return its unmasked payload.
///
/// Bytes beyond the declared payload are not part of the frame and are
/// ignored.
///
/// # Errors
///
/// - [`FrameDecodeError::Truncated`] if `frame` is shorter than the header,
///   mask key and declared payload
/// - [`FrameDecodeError::Unmasked`] if the mask bit is clear
///
/// # Example
///
/// ```
/// use wshub::protocol::frame::{seal_masked, unseal};
///
/// let frame = seal_masked(b"Hello", [0x37, 0xfa, 0x21, 0x3d]);
/// assert_eq!(unseal(&frame).unwrap(), b"Hello");
/// ```
pub fn unseal(frame: &[u8]) -> Result<Vec<u8>, FrameDecodeError> {
    match decode(frame, usize::MAX)? {
        Some((payload, _)) => Ok(payload),
        None => Err(FrameDecodeError::Truncated {
            needed: frame_len(frame).unwrap_or(frame.len().max(1) + 1),
            available: frame.len(),
        }),
    }
}
