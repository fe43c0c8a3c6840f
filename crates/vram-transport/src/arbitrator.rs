//! The transport arbitrator.
//!
//! Takes the transport class a plan chose, derives the concrete attempt
//! order for the transfer direction, and drives the drivers until one
//! succeeds. A failing transport falls through to the next; only when the
//! whole order is exhausted does the caller see a failure.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use vram_core::{
    NodeClient, NodeId, PoolError, RdmaDriver, RemoteHandle, RemoteRegion, Result,
    TransferDirection, TransportClass,
};

use crate::datagram::{DatagramLink, DatagramPath, RetryPolicy};
use crate::rdma::RdmaPath;
use crate::stream;

/// Tuning for transport execution.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Bound on RDMA completion waits.
    pub completion_timeout: Duration,
    /// Retry bounds for datagram sends.
    pub retry: RetryPolicy,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            completion_timeout: Duration::from_secs(2),
            retry: RetryPolicy::default(),
        }
    }
}

/// Everything the arbitrator needs to know about one transfer's target.
#[derive(Debug, Clone)]
pub struct TransferRoute {
    /// Node the data lives on.
    pub node: NodeId,
    /// Storage handle on that node.
    pub remote_handle: RemoteHandle,
    /// Remote region for one-sided access.
    pub region: RemoteRegion,
    /// Transport class the plan chose.
    pub transport: TransportClass,
}

/// The local buffer side of a transfer.
#[derive(Debug)]
pub enum TransferBuffer<'a> {
    /// Bytes to push toward the remote node.
    Send(&'a [u8]),
    /// Destination for bytes pulled back from the remote node.
    Recv(&'a mut [u8]),
}

impl TransferBuffer<'_> {
    /// Direction of the transfer this buffer implies.
    #[must_use]
    pub const fn direction(&self) -> TransferDirection {
        match self {
            Self::Send(_) => TransferDirection::HostToDevice,
            Self::Recv(_) => TransferDirection::DeviceToHost,
        }
    }

    /// Buffer length in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        match self {
            Self::Send(buf) => buf.len(),
            Self::Recv(buf) => buf.len(),
        }
    }

    /// Returns true for an empty buffer.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A concrete transport attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// One-sided RDMA.
    Rdma,
    /// Unreliable datagram (write-only).
    Datagram,
    /// Inline over the reliable RPC channel.
    Stream,
}

/// Derives the attempt order for a transport class and direction.
///
/// Datagrams cannot carry reads, so read orders skip them; the stream path
/// terminates every order as the universal fallback.
#[must_use]
pub(crate) fn candidate_order(
    class: TransportClass,
    direction: TransferDirection,
) -> Vec<TransportKind> {
    use TransportKind::{Datagram, Rdma, Stream};

    match (class, direction.is_write()) {
        (TransportClass::Local, _) => vec![],
        (TransportClass::Stream, _) => vec![Stream],
        (TransportClass::Rdma, true) => vec![Rdma, Datagram, Stream],
        (TransportClass::Rdma, false) => vec![Rdma, Stream],
        (TransportClass::Datagram, true) => vec![Datagram, Stream],
        (TransportClass::Datagram, false) => vec![Stream],
        // Split duplex: reads lean on RDMA, writes on datagrams.
        (TransportClass::RdmaThenDatagram, true) => vec![Datagram, Rdma, Stream],
        (TransportClass::RdmaThenDatagram, false) => vec![Rdma, Stream],
    }
}

/// Executes transfers along the best available transport.
#[derive(Debug)]
pub struct TransportArbitrator {
    rdma: Option<RdmaPath>,
    datagram: Option<DatagramPath>,
    config: TransportConfig,
}

impl TransportArbitrator {
    /// Creates an arbitrator with only the stream path available.
    #[must_use]
    pub fn new(config: TransportConfig) -> Self {
        Self {
            rdma: None,
            datagram: None,
            config,
        }
    }

    /// Enables the RDMA path.
    #[must_use]
    pub fn with_rdma(mut self, driver: Arc<dyn RdmaDriver>) -> Self {
        self.rdma = Some(RdmaPath::new(driver));
        self
    }

    /// Enables the datagram path.
    #[must_use]
    pub fn with_datagram(mut self, link: Arc<dyn DatagramLink>) -> Self {
        self.datagram = Some(DatagramPath::new(link, self.config.retry));
        self
    }

    /// Moves a buffer along the route, falling back across transports.
    ///
    /// Returns the transport that actually carried the data.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::TransferFailed`] listing every attempt once the
    /// whole fallback order is exhausted.
    pub async fn execute(
        &self,
        route: &TransferRoute,
        client: &dyn NodeClient,
        mut buffer: TransferBuffer<'_>,
    ) -> Result<TransportClass> {
        let direction = buffer.direction();
        let order = candidate_order(route.transport, direction);

        if route.transport == TransportClass::Local {
            debug!(node = %route.node, "data colocated, no movement");
            return Ok(TransportClass::Local);
        }

        let mut attempts = Vec::new();
        for kind in order {
            match self.attempt(kind, route, client, &mut buffer).await {
                Ok(used) => {
                    debug!(
                        node = %route.node,
                        transport = %used,
                        direction = %direction,
                        bytes = buffer.len(),
                        "transfer complete"
                    );
                    return Ok(used);
                }
                Err(e) => {
                    warn!(node = %route.node, transport = ?kind, error = %e, "transport failed, falling back");
                    attempts.push(describe_attempt(kind, &e));
                }
            }
        }

        Err(PoolError::TransferFailed { attempts })
    }

    async fn attempt(
        &self,
        kind: TransportKind,
        route: &TransferRoute,
        client: &dyn NodeClient,
        buffer: &mut TransferBuffer<'_>,
    ) -> Result<TransportClass> {
        match kind {
            TransportKind::Rdma => {
                let rdma = self.rdma.as_ref().ok_or_else(|| PoolError::TransferFailed {
                    attempts: vec!["rdma driver not configured".to_string()],
                })?;
                match buffer {
                    TransferBuffer::Send(buf) => {
                        rdma.write(buf, route.region, self.config.completion_timeout)?;
                    }
                    TransferBuffer::Recv(buf) => {
                        rdma.read(buf, route.region, self.config.completion_timeout)?;
                    }
                }
                Ok(TransportClass::Rdma)
            }
            TransportKind::Datagram => {
                let datagram =
                    self.datagram
                        .as_ref()
                        .ok_or_else(|| PoolError::TransferFailed {
                            attempts: vec!["datagram link not configured".to_string()],
                        })?;
                match buffer {
                    TransferBuffer::Send(buf) => {
                        datagram.send_buffer(route.remote_handle, buf).await?;
                    }
                    TransferBuffer::Recv(_) => {
                        return Err(PoolError::TransferFailed {
                            attempts: vec!["datagram cannot carry reads".to_string()],
                        });
                    }
                }
                Ok(TransportClass::Datagram)
            }
            TransportKind::Stream => {
                match buffer {
                    TransferBuffer::Send(buf) => {
                        stream::push(client, route.remote_handle, buf).await?;
                    }
                    TransferBuffer::Recv(buf) => {
                        stream::fetch(client, route.remote_handle, buf).await?;
                    }
                }
                Ok(TransportClass::Stream)
            }
        }
    }
}

fn describe_attempt(kind: TransportKind, err: &PoolError) -> String {
    match kind {
        TransportKind::Rdma => format!("rdma: {err}"),
        TransportKind::Datagram => format!("datagram: {err}"),
        TransportKind::Stream => format!("stream: {err}"),
    }
}
