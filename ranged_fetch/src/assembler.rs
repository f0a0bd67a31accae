use std::io::Write;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::debug;

use crate::block_store::{BlockStore, ReadOutcome};
use crate::error::{DownloadError, ErrorState, Result};
use crate::plan::PartitionPlan;
use crate::stats::{quantum, transfer_stats};

/// Presents the blocks of one download as a single forward-only byte stream.
///
/// The cursor advances strictly sequentially: block `i + 1` is never read
/// before block `i` is consumed, and crossing a block boundary releases the
/// retired block's backing. Because the gate admits fewer workers than there
/// are blocks, the reader can reach a block whose data is still downloading;
/// that surfaces as [`ReadOutcome::Pending`], never as a premature end.
pub struct Assembler {
    plan: PartitionPlan,
    blocks: Vec<Arc<BlockStore>>,
    /// Bytes delivered so far, relative to the window start.
    cursor: u64,
    errors: Arc<ErrorState>,
    workers: JoinSet<()>,
    spin: bool,
    closed: bool,
}

impl Assembler {
    pub(crate) fn new(
        plan: PartitionPlan,
        blocks: Vec<Arc<BlockStore>>,
        errors: Arc<ErrorState>,
        workers: JoinSet<()>,
        spin: bool,
    ) -> Self {
        Self {
            plan,
            blocks,
            cursor: 0,
            errors,
            workers,
            spin,
            closed: false,
        }
    }

    /// Total bytes this reader delivers: the clamped window size.
    pub fn len(&self) -> u64 {
        self.plan.window
    }

    pub fn is_empty(&self) -> bool {
        self.plan.window == 0
    }

    /// Bytes not yet delivered.
    pub fn remaining(&self) -> u64 {
        self.plan.window - self.cursor
    }

    pub fn plan(&self) -> &PartitionPlan {
        &self.plan
    }

    /// Copies up to `buf.len()` bytes at the cursor into `buf`.
    ///
    /// [`ReadOutcome::Pending`] means the producer of the current block has
    /// not caught up yet; retry after a scheduler quantum (see
    /// [`Assembler::copy_to`] for a loop that does). [`ReadOutcome::End`] is
    /// returned once, and only once, the whole window has been delivered.
    /// Any recorded fetch failure surfaces here.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome> {
        self.errors.check()?;
        if self.cursor >= self.plan.window {
            return Ok(ReadOutcome::End);
        }
        let index = (self.cursor / self.plan.block_size) as usize;
        if index >= self.blocks.len() {
            return Ok(ReadOutcome::End);
        }
        if !self.blocks[index].ready() {
            return Ok(ReadOutcome::Pending);
        }

        let offset = self.cursor % self.plan.block_size;
        let n = match self.blocks[index].read_at(offset, buf).await? {
            ReadOutcome::Bytes(n) => n,
            ReadOutcome::Pending => return Ok(ReadOutcome::Pending),
            // A block-level end below the window is a block-internal
            // boundary, not stream end; the cursor math alone terminates
            // the stream.
            ReadOutcome::End => return Ok(ReadOutcome::Pending),
        };

        self.cursor += n as u64;
        transfer_stats().add_tx(n as u64);

        let next = (self.cursor / self.plan.block_size) as usize;
        if next > index {
            debug!(block = index, "retiring block");
            self.blocks[index].close();
        }
        Ok(ReadOutcome::Bytes(n))
    }

    /// Drains the rest of the window into `writer`, sleeping one scheduler
    /// quantum whenever the producers are behind. Returns the bytes copied.
    pub async fn copy_to<W: Write>(&mut self, writer: &mut W) -> Result<u64> {
        let mut buf = vec![0u8; 64 * 1024];
        let mut total = 0u64;
        loop {
            match self.read(&mut buf).await? {
                ReadOutcome::Bytes(n) => {
                    writer
                        .write_all(&buf[..n])
                        .map_err(|err| DownloadError::ConsumerError(Arc::new(err)))?;
                    total += n as u64;
                },
                ReadOutcome::Pending => quantum(self.spin).await,
                ReadOutcome::End => break,
            }
        }
        Ok(total)
    }

    /// Drains the rest of the window into a buffer.
    pub async fn read_to_vec(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.remaining() as usize);
        self.copy_to(&mut out).await?;
        Ok(out)
    }

    /// Aborts outstanding block fetches and releases every remaining backing
    /// store. Subsequent reads return [`ReadOutcome::End`].
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.workers.abort_all();
        for block in &self.blocks {
            block.close();
        }
        self.cursor = self.plan.window;
    }
}

impl Drop for Assembler {
    fn drop(&mut self) {
        self.close();
    }
}
