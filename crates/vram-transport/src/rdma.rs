//! One-sided RDMA path with memoized registrations.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use vram_core::{RdmaDriver, RdmaRegion, RemoteRegion, Result};

/// RDMA transfer path.
///
/// Region registration is expensive, so registrations are memoized per
/// (address, length) buffer identity for the life of the path.
pub struct RdmaPath {
    driver: Arc<dyn RdmaDriver>,
    regions: Mutex<HashMap<(u64, u64), RdmaRegion>>,
}

impl RdmaPath {
    /// Wraps an RDMA driver.
    #[must_use]
    pub fn new(driver: Arc<dyn RdmaDriver>) -> Self {
        Self {
            driver,
            regions: Mutex::new(HashMap::new()),
        }
    }

    fn region_for(&self, buf: &[u8]) -> Result<RdmaRegion> {
        let key = (buf.as_ptr() as u64, buf.len() as u64);
        if let Some(region) = self.regions.lock().get(&key) {
            return Ok(*region);
        }

        let region = self.driver.register(buf)?;
        debug!(addr = key.0, len = key.1, lkey = region.lkey, "registered memory region");
        self.regions.lock().insert(key, region);
        Ok(region)
    }

    /// Posts a one-sided write of `buf` against the remote region.
    ///
    /// # Errors
    ///
    /// Surfaces registration or completion failures from the driver.
    pub fn write(&self, buf: &[u8], remote: RemoteRegion, timeout: Duration) -> Result<()> {
        let region = self.region_for(buf)?;
        self.driver.write(&region, buf, remote, timeout)
    }

    /// Posts a one-sided read from the remote region into `buf`.
    ///
    /// # Errors
    ///
    /// Surfaces registration or completion failures from the driver.
    pub fn read(&self, buf: &mut [u8], remote: RemoteRegion, timeout: Duration) -> Result<()> {
        let region = self.region_for(buf)?;
        self.driver.read(&region, buf, remote, timeout)
    }

    /// Number of distinct buffers registered so far.
    #[must_use]
    pub fn registered_regions(&self) -> usize {
        self.regions.lock().len()
    }
}

impl std::fmt::Debug for RdmaPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RdmaPath")
            .field("registered_regions", &self.registered_regions())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use vram_core::PoolError;

    #[derive(Default)]
    struct CountingDriver {
        registrations: AtomicUsize,
        writes: AtomicUsize,
        fail_register: bool,
    }

    impl RdmaDriver for CountingDriver {
        fn register(&self, buf: &[u8]) -> Result<RdmaRegion> {
            if self.fail_register {
                return Err(PoolError::RegistrationFailed {
                    reason: "no verbs device".to_string(),
                });
            }
            self.registrations.fetch_add(1, Ordering::SeqCst);
            Ok(RdmaRegion {
                addr: buf.as_ptr() as u64,
                len: buf.len() as u64,
                lkey: 42,
            })
        }

        fn write(
            &self,
            _region: &RdmaRegion,
            _buf: &[u8],
            _remote: RemoteRegion,
            _timeout: Duration,
        ) -> Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn read(
            &self,
            _region: &RdmaRegion,
            _buf: &mut [u8],
            _remote: RemoteRegion,
            _timeout: Duration,
        ) -> Result<()> {
            Ok(())
        }
    }

    const REMOTE: RemoteRegion = RemoteRegion {
        addr: 0x8000_0000,
        rkey: 9,
    };

    #[test]
    fn test_registration_is_memoized_per_buffer() {
        let driver = Arc::new(CountingDriver::default());
        let path = RdmaPath::new(Arc::clone(&driver) as Arc<dyn RdmaDriver>);

        let buf = vec![0u8; 4096];
        path.write(&buf, REMOTE, Duration::from_secs(1)).expect("write");
        path.write(&buf, REMOTE, Duration::from_secs(1)).expect("write");
        path.write(&buf, REMOTE, Duration::from_secs(1)).expect("write");

        assert_eq!(driver.registrations.load(Ordering::SeqCst), 1);
        assert_eq!(driver.writes.load(Ordering::SeqCst), 3);
        assert_eq!(path.registered_regions(), 1);
    }

    #[test]
    fn test_distinct_buffers_register_separately() {
        let driver = Arc::new(CountingDriver::default());
        let path = RdmaPath::new(Arc::clone(&driver) as Arc<dyn RdmaDriver>);

        let a = vec![0u8; 1024];
        let b = vec![0u8; 2048];
        path.write(&a, REMOTE, Duration::from_secs(1)).expect("write");
        path.write(&b, REMOTE, Duration::from_secs(1)).expect("write");

        assert_eq!(driver.registrations.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_registration_failure_surfaces() {
        let driver = Arc::new(CountingDriver {
            fail_register: true,
            ..CountingDriver::default()
        });
        let path = RdmaPath::new(driver as Arc<dyn RdmaDriver>);

        let buf = vec![0u8; 64];
        let result = path.write(&buf, REMOTE, Duration::from_secs(1));
        assert!(matches!(result, Err(PoolError::RegistrationFailed { .. })));
        assert_eq!(path.registered_regions(), 0);
    }
}
