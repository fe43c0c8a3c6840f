//! Datagram frame encoding.
//!
//! Wire layout, all integers big-endian:
//!
//! ```text
//! magic (4) | remote handle (8) | offset (8) | payload len (4) | payload | checksum (8)
//! ```
//!
//! The checksum is the first eight bytes of the blake3 hash of everything
//! before the trailer. Receivers reject short, foreign, truncated, and
//! corrupt datagrams; the unreliable link never hands garbage upward.

use thiserror::Error;

use vram_core::{PoolError, RemoteHandle};

/// Frame identifier, `VRGD`.
const FRAME_MAGIC: u32 = 0x5652_4744;

const HEADER_LEN: usize = 4 + 8 + 8 + 4;
const CHECKSUM_LEN: usize = 8;

/// Largest payload carried by one datagram frame.
///
/// Leaves room for the header and trailer inside a 64 KiB UDP datagram.
pub const MAX_DATAGRAM_PAYLOAD: usize = 60 * 1024;

/// Why an incoming datagram was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// Datagram shorter than header plus trailer.
    #[error("datagram too short: {len} bytes")]
    TooShort {
        /// Received datagram length.
        len: usize,
    },

    /// Leading magic does not identify a vramgrid frame.
    #[error("bad frame magic 0x{magic:08x}")]
    BadMagic {
        /// Received magic value.
        magic: u32,
    },

    /// Declared payload length disagrees with the datagram size.
    #[error("frame length mismatch: declared {declared}, carried {carried}")]
    LengthMismatch {
        /// Length the header declares.
        declared: usize,
        /// Length the datagram actually carries.
        carried: usize,
    },

    /// Checksum trailer does not match the frame contents.
    #[error("frame checksum mismatch")]
    ChecksumMismatch,
}

impl From<FrameError> for PoolError {
    fn from(err: FrameError) -> Self {
        Self::TransferFailed {
            attempts: vec![format!("datagram: {err}")],
        }
    }
}

/// A verified incoming frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    /// Storage handle the payload belongs to.
    pub handle: RemoteHandle,
    /// Byte offset of the payload within the allocation.
    pub offset: u64,
    /// Verified payload bytes.
    pub payload: Vec<u8>,
}

fn checksum(bytes: &[u8]) -> [u8; CHECKSUM_LEN] {
    let hash = blake3::hash(bytes);
    let mut trailer = [0u8; CHECKSUM_LEN];
    trailer.copy_from_slice(&hash.as_bytes()[..CHECKSUM_LEN]);
    trailer
}

/// Encodes one payload chunk into a checksummed datagram frame.
#[must_use]
pub fn encode_frame(handle: RemoteHandle, offset: u64, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len() + CHECKSUM_LEN);
    frame.extend_from_slice(&FRAME_MAGIC.to_be_bytes());
    frame.extend_from_slice(&handle.as_raw().to_be_bytes());
    frame.extend_from_slice(&offset.to_be_bytes());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(payload);
    let trailer = checksum(&frame);
    frame.extend_from_slice(&trailer);
    frame
}

/// Decodes and verifies an incoming datagram.
///
/// # Errors
///
/// Returns a [`FrameError`] describing why the datagram was rejected.
pub fn decode_frame(datagram: &[u8]) -> Result<DecodedFrame, FrameError> {
    if datagram.len() < HEADER_LEN + CHECKSUM_LEN {
        return Err(FrameError::TooShort {
            len: datagram.len(),
        });
    }

    let magic = u32::from_be_bytes([datagram[0], datagram[1], datagram[2], datagram[3]]);
    if magic != FRAME_MAGIC {
        return Err(FrameError::BadMagic { magic });
    }

    let mut handle_bytes = [0u8; 8];
    handle_bytes.copy_from_slice(&datagram[4..12]);
    let mut offset_bytes = [0u8; 8];
    offset_bytes.copy_from_slice(&datagram[12..20]);
    let declared =
        u32::from_be_bytes([datagram[20], datagram[21], datagram[22], datagram[23]]) as usize;

    let carried = datagram.len() - HEADER_LEN - CHECKSUM_LEN;
    if declared != carried {
        return Err(FrameError::LengthMismatch { declared, carried });
    }

    let body_end = datagram.len() - CHECKSUM_LEN;
    let expected = checksum(&datagram[..body_end]);
    if expected != datagram[body_end..] {
        return Err(FrameError::ChecksumMismatch);
    }

    Ok(DecodedFrame {
        handle: RemoteHandle::from_raw(u64::from_be_bytes(handle_bytes)),
        offset: u64::from_be_bytes(offset_bytes),
        payload: datagram[HEADER_LEN..body_end].to_vec(),
    })
}
