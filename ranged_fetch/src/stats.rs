use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// One scheduler quantum; wait loops sleep this long between polls.
pub const SCHEDULER_QUANTUM: Duration = Duration::from_millis(200);

/// Releases the task and prevents spinning in a wait loop. With `spin` set
/// the sleep is replaced by a bare yield (diagnostic, may burn a core).
pub async fn quantum(spin: bool) {
    if spin {
        tokio::task::yield_now().await;
    } else {
        tokio::time::sleep(SCHEDULER_QUANTUM).await;
    }
}

/// Process-wide transfer counters: bytes received from the network and bytes
/// delivered to the consumer. An external stall monitor watches these for
/// progress; nothing else in the engine shares mutable state.
#[derive(Debug, Default)]
pub struct TransferStats {
    rx: AtomicU64,
    tx: AtomicU64,
}

impl TransferStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_rx(&self, n: u64) {
        self.rx.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_tx(&self, n: u64) {
        self.tx.fetch_add(n, Ordering::Relaxed);
    }

    pub fn rx(&self) -> u64 {
        self.rx.load(Ordering::Relaxed)
    }

    pub fn tx(&self) -> u64 {
        self.tx.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.rx() + self.tx()
    }
}

lazy_static::lazy_static! {
    static ref GLOBAL_STATS: TransferStats = TransferStats::new();
}

pub fn transfer_stats() -> &'static TransferStats {
    &GLOBAL_STATS
}
