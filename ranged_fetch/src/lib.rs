//! Parallel ranged-download engine.
//!
//! A single large HTTP(S) object is fetched with concurrent byte-range
//! requests. The leading block is buffered in memory to cut first-byte
//! latency; every other block spills to a temp file so memory stays bounded.
//! A process-wide gate caps the number of parallel fetches, and the
//! [`Assembler`] exposes the blocks as one forward-only byte stream,
//! releasing each block's backing as the read cursor crosses past it.

use std::path::PathBuf;
use std::sync::Arc;

use ccp_config::{CcpConfig, ccp_config};
use tokio::task::JoinSet;
use tracing::info;

mod assembler;
mod block_store;
mod error;
mod fetcher;
mod gate;
mod http_source;
mod plan;
mod stats;
mod temp_registry;

pub use assembler::Assembler;
pub use block_store::{BlockStore, ReadOutcome};
pub use error::{DownloadError, ErrorState, Result};
pub use gate::{ConnectionGate, global_gate};
pub use http_source::{apply_insecure, probe_size};
pub use plan::PartitionPlan;
pub use stats::{SCHEDULER_QUANTUM, TransferStats, quantum, transfer_stats};
pub use temp_registry::{TempFileRegistry, cleanup_process_temp_files, global_registry};

use crate::block_store::DiskBlockOptions;

/// Builder for one parallel ranged download.
///
/// Defaults come from the process configuration and the process-wide gate
/// and temp registry; tests inject their own.
///
/// ```no_run
/// # async fn demo() -> ranged_fetch::Result<()> {
/// let mut reader = ranged_fetch::RangedDownload::new("https://example.com/large.bin")
///     .with_seek(1024)
///     .open()
///     .await?;
/// let mut out = Vec::new();
/// reader.copy_to(&mut out).await?;
/// # Ok(())
/// # }
/// ```
pub struct RangedDownload {
    url: String,
    client: Option<reqwest::Client>,
    config: Option<Arc<CcpConfig>>,
    seek: u64,
    count: u64,
    gate: Option<Arc<ConnectionGate>>,
    registry: Option<Arc<TempFileRegistry>>,
}

impl RangedDownload {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: None,
            config: None,
            seek: 0,
            count: 0,
            gate: None,
            registry: None,
        }
    }

    pub fn with_client(self, client: reqwest::Client) -> Self {
        Self {
            client: Some(client),
            ..self
        }
    }

    pub fn with_config(self, config: CcpConfig) -> Self {
        Self {
            config: Some(Arc::new(config)),
            ..self
        }
    }

    /// Byte offset into the object to start reading from.
    pub fn with_seek(self, seek: u64) -> Self {
        Self { seek, ..self }
    }

    /// Bytes to read; 0 means to the end of the object.
    pub fn with_count(self, count: u64) -> Self {
        Self { count, ..self }
    }

    pub fn with_gate(self, gate: Arc<ConnectionGate>) -> Self {
        Self {
            gate: Some(gate),
            ..self
        }
    }

    pub fn with_registry(self, registry: Arc<TempFileRegistry>) -> Self {
        Self {
            registry: Some(registry),
            ..self
        }
    }

    /// Probes the object size, plans the partitioning, spawns one fetch task
    /// per block and returns the sequential reader over the window.
    pub async fn open(self) -> Result<Assembler> {
        let config = self.config.unwrap_or_else(|| Arc::new(ccp_config().clone()));
        let client = self.client.unwrap_or_else(http_source::shared_client);
        let url = Arc::new(apply_insecure(&self.url, config.http.insecure));

        let total = probe_size(&client, &url, &config.http).await?;
        let plan = PartitionPlan::compute(total, self.seek, self.count, config.engine.partsize, config.engine.maxmem)?;
        info!(
            url = %url,
            total,
            seek = plan.seek,
            window = plan.window,
            blocks = plan.num_blocks,
            block_size = plan.block_size,
            "opening ranged download"
        );

        let gate = self.gate.unwrap_or_else(global_gate);
        let registry = self.registry.unwrap_or_else(global_registry);
        let errors = Arc::new(ErrorState::new());
        let disk_options = DiskBlockOptions {
            temp_dirs: Arc::new(temp_dirs_from(&config.engine.tmp)),
            registry,
            retry: config.engine.retry,
            spin: config.engine.spin,
            nogc: config.engine.nogc,
        };

        let blocks: Vec<Arc<BlockStore>> = (0..plan.num_blocks)
            .map(|i| {
                if i == 0 && plan.memory_leading_block {
                    Arc::new(BlockStore::memory())
                } else {
                    Arc::new(BlockStore::disk(i, disk_options.clone()))
                }
            })
            .collect();

        let http = Arc::new(config.http.clone());
        let sorted = !config.engine.nosort;
        let mut workers = JoinSet::new();
        for (index, block) in blocks.iter().enumerate() {
            workers.spawn(fetcher::run(fetcher::BlockFetch {
                client: client.clone(),
                url: url.clone(),
                plan,
                index,
                block: block.clone(),
                gate: gate.clone(),
                http: http.clone(),
                sorted,
                errors: errors.clone(),
            }));
        }

        Ok(Assembler::new(plan, blocks, errors, workers, config.engine.spin))
    }
}

/// Splits the comma-separated temp-dir list; empty means the OS temp dir.
fn temp_dirs_from(tmp: &str) -> Vec<PathBuf> {
    let dirs: Vec<PathBuf> = tmp
        .split(',')
        .filter(|entry| !entry.is_empty())
        .map(PathBuf::from)
        .collect();
    if dirs.is_empty() {
        vec![std::env::temp_dir()]
    } else {
        dirs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_dirs_from() {
        assert_eq!(temp_dirs_from(""), vec![std::env::temp_dir()]);
        assert_eq!(temp_dirs_from("/a,/b"), vec![PathBuf::from("/a"), PathBuf::from("/b")]);
        assert_eq!(temp_dirs_from("/only"), vec![PathBuf::from("/only")]);
    }
}
