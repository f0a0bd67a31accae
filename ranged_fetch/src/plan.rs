use crate::error::{DownloadError, Result};

const MIB: u64 = 1 << 20;
const GIB: u64 = 1 << 30;

/// Selects a partition size for the given byte window when no override is
/// configured. The ladder trades request count against per-block memory and
/// disk pressure.
pub(crate) fn choose_partition_size(window: u64) -> u64 {
    if window >= 100 * GIB {
        1024 * MIB
    } else if window >= 50 * GIB {
        512 * MIB
    } else if window >= 10 * GIB {
        384 * MIB
    } else if window >= 5 * GIB {
        256 * MIB
    } else if window >= GIB {
        128 * MIB
    } else if window >= 100 * MIB {
        64 * MIB
    } else if window >= 32 * MIB {
        32 * MIB
    } else {
        8 * MIB
    }
}

/// How one object is split into blocks for parallel ranged fetching.
///
/// Block sizes are uniform so the reader can locate the block holding any
/// cursor position with a single division; only the tail block may hold fewer
/// bytes, and workers clamp their request range to the window end.
#[derive(Debug, Clone, Copy)]
pub struct PartitionPlan {
    /// Total object length reported by the size probe.
    pub total_len: u64,
    /// First byte of the requested window.
    pub seek: u64,
    /// Bytes the download will deliver: `min(count, total_len - seek)`.
    pub window: u64,
    pub num_blocks: usize,
    pub block_size: u64,
    /// Whether block 0 is buffered in memory instead of a temp file.
    pub memory_leading_block: bool,
}

impl PartitionPlan {
    /// Plans a download of `[seek, seek + count)` out of an object of
    /// `total_len` bytes. `count == 0` means to the end of the object, and a
    /// window reaching past the end is clamped.
    ///
    /// `partsize_override == 0` selects the partition size from the window
    /// ladder. Objects the chosen partition size cannot split are rejected
    /// with [`DownloadError::FileTooSmall`]; callers fall back to a plain
    /// ranged GET for those.
    pub fn compute(total_len: u64, seek: u64, count: u64, partsize_override: u64, maxmem: u64) -> Result<Self> {
        if total_len == 0 || seek >= total_len {
            return Err(DownloadError::FileTooSmall);
        }
        let remain = total_len - seek;
        let window = if count == 0 { remain } else { count.min(remain) };

        let partsize = if partsize_override != 0 {
            partsize_override
        } else {
            choose_partition_size(window)
        };
        if partsize > total_len {
            return Err(DownloadError::FileTooSmall);
        }

        let num_blocks = window.div_ceil(partsize);
        let block_size = window.div_ceil(num_blocks);

        Ok(Self {
            total_len,
            seek,
            window,
            num_blocks: num_blocks as usize,
            block_size,
            memory_leading_block: partsize <= maxmem,
        })
    }

    /// Absolute byte range `[start, end)` that block `index` fetches, clamped
    /// to the window. The tail block may be empty.
    pub fn block_range(&self, index: usize) -> (u64, u64) {
        let start = self.seek + index as u64 * self.block_size;
        let end = (start + self.block_size).min(self.seek + self.window);
        (start, end.max(start))
    }

    /// First byte past the window.
    pub fn end(&self) -> u64 {
        self.seek + self.window
    }
}
