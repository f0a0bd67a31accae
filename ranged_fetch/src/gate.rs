use std::sync::Arc;
use std::time::Duration;

use ccp_config::ccp_config;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{DownloadError, Result};

/// Delay step of the ordered-admission shim: worker `i` waits `i` steps
/// before trying to acquire, so under contention lower-index blocks enter
/// the gate first. The consumer waits on those blocks first.
const ADMISSION_STEP: Duration = Duration::from_millis(200);

/// Process-wide counted gate limiting parallel HTTP range fetches.
///
/// A single instance is shared by every in-flight copy; tests construct
/// their own. Admission order is biased, not guaranteed: finish order is
/// whatever the network yields, and byte order is enforced downstream by
/// the sequential reader.
pub struct ConnectionGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl ConnectionGate {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Admits block `index`, holding a slot until the returned permit drops.
    ///
    /// With `sorted` set this sleep-sorts the waiters by block index before
    /// acquiring; `sorted = false` (tests, diagnostics) acquires immediately.
    pub async fn admit(&self, index: usize, sorted: bool) -> Result<OwnedSemaphorePermit> {
        if sorted && index > 0 {
            tokio::time::sleep(ADMISSION_STEP * index as u32).await;
        }
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|err| DownloadError::InternalError(format!("connection gate closed: {err}")))
    }
}

lazy_static::lazy_static! {
    static ref GLOBAL_GATE: Arc<ConnectionGate> = ConnectionGate::new(ccp_config().http.maxhttp);
}

/// The shared gate, sized from `CCP_HTTP_MAXHTTP` (default 24).
pub fn global_gate() -> Arc<ConnectionGate> {
    GLOBAL_GATE.clone()
}
