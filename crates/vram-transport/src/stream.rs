//! Reliable stream path: payload inline over the node RPC channel.

use tracing::debug;

use vram_core::{NodeClient, PoolError, RemoteHandle, Result};

/// Pushes `buf` into the allocation over the reliable RPC channel.
pub(crate) async fn push(client: &dyn NodeClient, handle: RemoteHandle, buf: &[u8]) -> Result<()> {
    client.write_inline(handle, 0, buf.to_vec()).await?;
    debug!(%handle, bytes = buf.len(), "stream write complete");
    Ok(())
}

/// Fetches `buf.len()` bytes back from the allocation.
pub(crate) async fn fetch(
    client: &dyn NodeClient,
    handle: RemoteHandle,
    buf: &mut [u8],
) -> Result<()> {
    let bytes = client.read_inline(handle, 0, buf.len() as u64).await?;
    if bytes.len() != buf.len() {
        return Err(PoolError::TransferFailed {
            attempts: vec![format!(
                "stream: node returned {} bytes, wanted {}",
                bytes.len(),
                buf.len()
            )],
        });
    }
    buf.copy_from_slice(&bytes);
    debug!(%handle, bytes = buf.len(), "stream read complete");
    Ok(())
}
