//! # vram-transport
//!
//! Data movement for vramgrid: three transport drivers and the arbitrator
//! that picks between them per transfer.
//!
//! - **RDMA**: one-sided write/read through the [`vram_core::RdmaDriver`]
//!   capability, with per-buffer registrations memoized.
//! - **Datagram**: zero-copy frames over an unreliable datagram link, each
//!   carrying a checksum trailer, with bounded retry.
//! - **Stream**: the payload inline over the node's reliable RPC channel;
//!   the universal fallback and the small-transfer path.
//!
//! The arbitrator attempts transports in the order implied by the plan's
//! transport class and the transfer direction, falling through on failure,
//! and surfaces [`vram_core::PoolError::TransferFailed`] only when every
//! option is exhausted.

#![forbid(unsafe_code)]

mod arbitrator;
mod datagram;
mod frame;
mod rdma;
mod stream;

pub use arbitrator::{
    TransferBuffer, TransferRoute, TransportArbitrator, TransportConfig, TransportKind,
};
pub use datagram::{DatagramLink, DatagramPath, RetryPolicy, UdpDatagramLink};
pub use frame::{DecodedFrame, FrameError, MAX_DATAGRAM_PAYLOAD, decode_frame, encode_frame};
pub use rdma::RdmaPath;
