//! Shared error taxonomy for the launcher core.
//!
//! Every façade call resolves to `Result<T, PoolError>`. Transport-level
//! failures are retried and fallen back inside the transport arbitrator and
//! only surface here once every option is exhausted; planner and
//! handle-table failures surface immediately and are never retried.

use thiserror::Error;

use crate::handle::MemHandle;
use crate::node::NodeId;

/// Errors surfaced by the launcher core.
#[derive(Debug, Error)]
pub enum PoolError {
    /// No node satisfies the requested allocation size.
    #[error("no node can satisfy allocation of {requested} bytes")]
    OutOfCapacity {
        /// Requested allocation size in bytes.
        requested: u64,
    },

    /// The handle is unknown or has already been freed.
    #[error("invalid handle {handle}")]
    InvalidHandle {
        /// The offending handle.
        handle: MemHandle,
    },

    /// A node failed to answer a health probe or RPC.
    #[error("node '{node}' unreachable: {reason}")]
    NodeUnreachable {
        /// The node that did not answer.
        node: NodeId,
        /// What failed.
        reason: String,
    },

    /// Every transport in the plan's fallback order failed.
    #[error("transfer failed: {}", .attempts.join("; "))]
    TransferFailed {
        /// One entry per attempted transport, in attempt order.
        attempts: Vec<String>,
    },

    /// Memory-region registration for RDMA failed.
    #[error("memory region registration failed: {reason}")]
    RegistrationFailed {
        /// Driver-reported reason.
        reason: String,
    },

    /// Invalid configuration (weights, node list, thresholds).
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the error.
        message: String,
    },

    /// Handle-table snapshot export failed.
    #[error("snapshot export failed: {source}")]
    Snapshot {
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Result type for launcher core operations.
pub type Result<T> = std::result::Result<T, PoolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PoolError::OutOfCapacity { requested: 4096 };
        assert!(err.to_string().contains("4096"));

        let err = PoolError::InvalidHandle {
            handle: MemHandle::from_raw(3),
        };
        assert!(err.to_string().contains("invalid handle"));

        let err = PoolError::NodeUnreachable {
            node: NodeId::new("gpu-a"),
            reason: "probe timeout".to_string(),
        };
        assert!(err.to_string().contains("gpu-a"));
        assert!(err.to_string().contains("probe timeout"));

        let err = PoolError::TransferFailed {
            attempts: vec!["rdma: poll timeout".to_string(), "datagram: send".to_string()],
        };
        assert!(err.to_string().contains("rdma: poll timeout; datagram: send"));

        let err = PoolError::RegistrationFailed {
            reason: "no device".to_string(),
        };
        assert!(err.to_string().contains("registration"));

        let err = PoolError::Config {
            message: "weights must sum to 1.0".to_string(),
        };
        assert!(err.to_string().contains("weights"));
    }
}
