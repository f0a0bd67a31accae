use std::fs::File;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::task::spawn_blocking;
use tracing::{debug, warn};

use crate::error::{DownloadError, Result};
use crate::stats::quantum;
use crate::temp_registry::TempFileRegistry;

/// Outcome of a positional read against a block or the assembled stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Bytes were copied into the caller's buffer.
    Bytes(usize),
    /// The producer has not written this offset yet; retry shortly.
    Pending,
    /// No more data will ever appear at or past this offset.
    End,
}

/// Settings shared by the disk-backed stores of one download.
#[derive(Debug, Clone)]
pub(crate) struct DiskBlockOptions {
    pub temp_dirs: Arc<Vec<PathBuf>>,
    pub registry: Arc<TempFileRegistry>,
    pub retry: u32,
    pub spin: bool,
    pub nogc: bool,
}

/// One contiguous segment of the object being downloaded.
///
/// Every block has exactly one writer (its fetch task) and one reader (the
/// sequential assembler); writes are append-only and the byte offset into
/// the block always equals the cumulative bytes written. A block becomes
/// `ready` once its backing exists and `final` once its writer is done, and
/// only the finality flag turns a short positional read into a true
/// end-of-data signal.
pub enum BlockStore {
    Memory(MemoryBlock),
    Disk(DiskBlock),
}

impl BlockStore {
    /// In-memory backing, used only for the leading block of a download to
    /// cut first-byte latency.
    pub(crate) fn memory() -> Self {
        BlockStore::Memory(MemoryBlock::new())
    }

    /// Disk backing; the temp file is created lazily by `init`, not here.
    pub(crate) fn disk(index: usize, options: DiskBlockOptions) -> Self {
        BlockStore::Disk(DiskBlock::new(index, options))
    }

    /// Allocates the backing store. Idempotent with respect to readiness:
    /// a second call on a ready block is a no-op.
    pub async fn init(&self) -> Result<()> {
        match self {
            BlockStore::Memory(block) => block.init(),
            BlockStore::Disk(block) => block.init().await,
        }
    }

    /// True once `init` has succeeded. Monotonic.
    pub fn ready(&self) -> bool {
        match self {
            BlockStore::Memory(block) => block.ready.load(Ordering::Acquire),
            BlockStore::Disk(block) => block.ready.load(Ordering::Acquire),
        }
    }

    /// Appends to the block. Concurrency-safe with respect to `read_at`.
    pub async fn write(&self, data: Bytes) -> Result<()> {
        match self {
            BlockStore::Memory(block) => block.write(&data),
            BlockStore::Disk(block) => block.write(data).await,
        }
    }

    /// Copies up to `buf.len()` bytes starting at `offset` into `buf`.
    ///
    /// An offset at or past the written length is [`ReadOutcome::Pending`]
    /// while the writer is still running and [`ReadOutcome::End`] once the
    /// block is final.
    pub async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<ReadOutcome> {
        match self {
            BlockStore::Memory(block) => Ok(block.read_at(offset, buf)),
            BlockStore::Disk(block) => block.read_at(offset, buf).await,
        }
    }

    /// Marks that no more writes will ever occur. Monotonic and idempotent.
    pub fn finalize(&self) {
        match self {
            BlockStore::Memory(block) => block.finalized.store(true, Ordering::Release),
            BlockStore::Disk(block) => block.finalized.store(true, Ordering::Release),
        }
    }

    pub fn is_final(&self) -> bool {
        match self {
            BlockStore::Memory(block) => block.finalized.load(Ordering::Acquire),
            BlockStore::Disk(block) => block.finalized.load(Ordering::Acquire),
        }
    }

    /// Releases the backing store: memory is freed, the temp file is deleted
    /// and unregistered. Called when the reader crosses past the block; a
    /// second call is harmless.
    pub fn close(&self) {
        match self {
            BlockStore::Memory(block) => block.close(),
            BlockStore::Disk(block) => block.close(),
        }
    }

    pub fn bytes_written(&self) -> u64 {
        match self {
            BlockStore::Memory(block) => block.data.lock().unwrap().len() as u64,
            BlockStore::Disk(block) => block.written.load(Ordering::Acquire),
        }
    }

    /// Path of the backing temp file, if any.
    pub fn temp_path(&self) -> Option<PathBuf> {
        match self {
            BlockStore::Memory(_) => None,
            BlockStore::Disk(block) => block.path.lock().unwrap().clone(),
        }
    }
}

/// Mutex-protected growing byte buffer.
pub struct MemoryBlock {
    data: Mutex<Vec<u8>>,
    ready: AtomicBool,
    finalized: AtomicBool,
}

impl MemoryBlock {
    fn new() -> Self {
        Self {
            data: Mutex::new(Vec::new()),
            ready: AtomicBool::new(false),
            finalized: AtomicBool::new(false),
        }
    }

    fn init(&self) -> Result<()> {
        if !self.ready.load(Ordering::Acquire) {
            self.data.lock().unwrap().clear();
            self.ready.store(true, Ordering::Release);
        }
        Ok(())
    }

    fn write(&self, data: &[u8]) -> Result<()> {
        self.data.lock().unwrap().extend_from_slice(data);
        Ok(())
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> ReadOutcome {
        let data = self.data.lock().unwrap();
        if offset >= data.len() as u64 {
            return if self.finalized.load(Ordering::Acquire) {
                ReadOutcome::End
            } else {
                ReadOutcome::Pending
            };
        }
        let offset = offset as usize;
        let n = buf.len().min(data.len() - offset);
        buf[..n].copy_from_slice(&data[offset..offset + n]);
        ReadOutcome::Bytes(n)
    }

    fn close(&self) {
        debug!("closing block");
        *self.data.lock().unwrap() = Vec::new();
    }
}

/// Round-robin cursor over the candidate temp directories, shared by every
/// disk block in the process.
static TEMP_DIR_ROTATION: AtomicUsize = AtomicUsize::new(0);

/// OS temp file in one of the candidate directories.
pub struct DiskBlock {
    index: usize,
    options: DiskBlockOptions,
    file: Mutex<Option<Arc<File>>>,
    path: Mutex<Option<PathBuf>>,
    written: AtomicU64,
    ready: AtomicBool,
    finalized: AtomicBool,
}

impl DiskBlock {
    fn new(index: usize, options: DiskBlockOptions) -> Self {
        Self {
            index,
            options,
            file: Mutex::new(None),
            path: Mutex::new(None),
            written: AtomicU64::new(0),
            ready: AtomicBool::new(false),
            finalized: AtomicBool::new(false),
        }
    }

    async fn init(&self) -> Result<()> {
        if self.ready.load(Ordering::Acquire) {
            return Ok(());
        }
        let dirs = self.options.temp_dirs.clone();
        let index = self.index;
        let (file, path) = spawn_blocking(move || make_temp_file(&dirs, index))
            .await
            .map_err(join_error)?
            .map_err(|err| DownloadError::TempCreateFailed(Arc::new(err)))?;
        debug!(block = index, path = %path.display(), "created temp file");

        self.options.registry.register(&path);
        *self.file.lock().unwrap() = Some(Arc::new(file));
        *self.path.lock().unwrap() = Some(path);
        self.ready.store(true, Ordering::Release);
        Ok(())
    }

    async fn write(&self, data: Bytes) -> Result<()> {
        let file = self.handle()?;
        let offset = self.written.load(Ordering::Relaxed);
        let len = data.len() as u64;
        spawn_blocking(move || write_all_at(&file, &data, offset))
            .await
            .map_err(join_error)?
            .map_err(|err| DownloadError::WriteFailed {
                block: self.index,
                cause: Arc::new(err),
            })?;
        self.written.store(offset + len, Ordering::Release);
        Ok(())
    }

    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<ReadOutcome> {
        let written = self.written.load(Ordering::Acquire);
        if offset >= written {
            if self.finalized.load(Ordering::Acquire) {
                return Ok(ReadOutcome::End);
            }
            quantum(self.options.spin).await;
            return Ok(ReadOutcome::Pending);
        }

        let file = self.handle()?;
        let want = buf.len().min((written - offset) as usize);
        let mut attempt = 0u32;
        let (data, n) = loop {
            let file = file.clone();
            let mut scratch = vec![0u8; want];
            let read = spawn_blocking(move || -> std::io::Result<(Vec<u8>, usize)> {
                let n = read_at_offset(&file, &mut scratch, offset)?;
                Ok((scratch, n))
            })
            .await
            .map_err(join_error)?;
            match read {
                Ok(out) => break out,
                Err(err) => {
                    attempt += 1;
                    if attempt > self.options.retry {
                        return Err(DownloadError::IoError(Arc::new(err)));
                    }
                    debug!(block = self.index, attempt, %err, "retrying positional read");
                    quantum(self.options.spin).await;
                },
            }
        };

        if n == 0 {
            // End-of-file from a positional read only means the writer is
            // slow; finality decides whether the stream is actually done.
            if self.finalized.load(Ordering::Acquire) {
                return Ok(ReadOutcome::End);
            }
            quantum(self.options.spin).await;
            return Ok(ReadOutcome::Pending);
        }
        buf[..n].copy_from_slice(&data[..n]);
        Ok(ReadOutcome::Bytes(n))
    }

    fn close(&self) {
        self.file.lock().unwrap().take();
        let Some(path) = self.path.lock().unwrap().take() else {
            return;
        };
        if self.options.nogc {
            debug!(block = self.index, path = %path.display(), "keeping temp file");
            return;
        }
        debug!(block = self.index, path = %path.display(), "delete file");
        match std::fs::remove_file(&path) {
            Ok(()) => {
                self.options.registry.unregister(&path);
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                self.options.registry.unregister(&path);
            },
            // Leave the path registered so process-wide cleanup retries it.
            Err(err) => warn!(block = self.index, path = %path.display(), %err, "failed to remove temp file"),
        }
    }

    fn handle(&self) -> Result<Arc<File>> {
        self.file
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| DownloadError::InternalError(format!("block {} used before init", self.index)))
    }
}

fn make_temp_file(dirs: &[PathBuf], index: usize) -> std::io::Result<(File, PathBuf)> {
    let dir = &dirs[TEMP_DIR_ROTATION.fetch_add(1, Ordering::Relaxed) % dirs.len()];
    let (file, path) = tempfile::Builder::new()
        .prefix("ccp")
        .suffix(&format!("-{index}"))
        .tempfile_in(dir)?
        .keep()
        .map_err(|err| err.error)?;
    Ok((file, path))
}

fn join_error(err: tokio::task::JoinError) -> DownloadError {
    DownloadError::InternalError(format!("blocking task failed: {err}"))
}

#[cfg(unix)]
fn write_all_at(file: &File, buf: &[u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buf, offset)
}

#[cfg(unix)]
fn read_at_offset(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.read_at(buf, offset)
}

#[cfg(windows)]
fn write_all_at(file: &File, mut buf: &[u8], mut offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        let n = file.seek_write(buf, offset)?;
        if n == 0 {
            return Err(std::io::Error::new(std::io::ErrorKind::WriteZero, "seek_write returned 0"));
        }
        buf = &buf[n..];
        offset += n as u64;
    }
    Ok(())
}

#[cfg(windows)]
fn read_at_offset(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_read(buf, offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disk_options(dirs: Vec<PathBuf>, registry: Arc<TempFileRegistry>) -> DiskBlockOptions {
        DiskBlockOptions {
            temp_dirs: Arc::new(dirs),
            registry,
            retry: 3,
            spin: true,
            nogc: false,
        }
    }

    #[tokio::test]
    async fn test_memory_wait_then_data_then_end() {
        let block = BlockStore::memory();
        assert!(!block.ready());
        block.init().await.unwrap();
        assert!(block.ready());

        let mut buf = [0u8; 8];
        // Ahead of the writer: wait, not end.
        assert_eq!(block.read_at(0, &mut buf).await.unwrap(), ReadOutcome::Pending);

        block.write(Bytes::from_static(b"hello")).await.unwrap();
        assert_eq!(block.read_at(0, &mut buf).await.unwrap(), ReadOutcome::Bytes(5));
        assert_eq!(&buf[..5], b"hello");

        // Past the written bytes but not final: still wait.
        assert_eq!(block.read_at(5, &mut buf).await.unwrap(), ReadOutcome::Pending);

        block.finalize();
        assert_eq!(block.read_at(5, &mut buf).await.unwrap(), ReadOutcome::End);
        // Data below the end is still readable after finalize.
        assert_eq!(block.read_at(3, &mut buf).await.unwrap(), ReadOutcome::Bytes(2));
        assert_eq!(&buf[..2], b"lo");
    }

    #[tokio::test]
    async fn test_memory_init_idempotent_and_finalize_monotonic() {
        let block = BlockStore::memory();
        block.init().await.unwrap();
        block.write(Bytes::from_static(b"abc")).await.unwrap();
        // Re-init on a ready block must not discard data.
        block.init().await.unwrap();
        assert_eq!(block.bytes_written(), 3);

        assert!(!block.is_final());
        block.finalize();
        block.finalize();
        assert!(block.is_final());
        assert!(block.ready());
    }

    #[tokio::test]
    async fn test_memory_close_frees_buffer() {
        let block = BlockStore::memory();
        block.init().await.unwrap();
        block.write(Bytes::from_static(b"abcdef")).await.unwrap();
        block.close();
        assert_eq!(block.bytes_written(), 0);
    }

    #[tokio::test]
    async fn test_disk_lazy_create_write_read_close() {
        let dir = tempfile::tempdir().unwrap();
        let registry = TempFileRegistry::new();
        let block = BlockStore::disk(4, disk_options(vec![dir.path().to_path_buf()], registry.clone()));

        // Lazy creation: nothing on disk until init.
        assert!(block.temp_path().is_none());
        assert!(registry.is_empty());

        block.init().await.unwrap();
        let path = block.temp_path().unwrap();
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("ccp"), "unexpected temp name {name}");
        assert!(name.ends_with("-4"), "unexpected temp name {name}");
        assert!(path.exists());
        assert!(registry.contains(&path));

        block.write(Bytes::from_static(b"0123")).await.unwrap();
        block.write(Bytes::from_static(b"4567")).await.unwrap();
        assert_eq!(block.bytes_written(), 8);

        let mut buf = [0u8; 16];
        assert_eq!(block.read_at(2, &mut buf).await.unwrap(), ReadOutcome::Bytes(6));
        assert_eq!(&buf[..6], b"234567");

        // Ahead of the writer: wait. After finalize: end.
        assert_eq!(block.read_at(8, &mut buf).await.unwrap(), ReadOutcome::Pending);
        block.finalize();
        assert_eq!(block.read_at(8, &mut buf).await.unwrap(), ReadOutcome::End);

        block.close();
        assert!(!path.exists());
        assert!(registry.is_empty());
        // Double close is harmless.
        block.close();
    }

    #[tokio::test]
    async fn test_disk_init_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let registry = TempFileRegistry::new();
        let block = BlockStore::disk(0, disk_options(vec![dir.path().to_path_buf()], registry.clone()));

        block.init().await.unwrap();
        let path = block.temp_path().unwrap();
        block.init().await.unwrap();
        assert_eq!(block.temp_path().unwrap(), path);
        assert_eq!(registry.len(), 1);

        block.close();
    }

    #[tokio::test]
    async fn test_disk_nogc_keeps_file_and_registration() {
        let dir = tempfile::tempdir().unwrap();
        let registry = TempFileRegistry::new();
        let mut options = disk_options(vec![dir.path().to_path_buf()], registry.clone());
        options.nogc = true;
        let block = BlockStore::disk(1, options);

        block.init().await.unwrap();
        let path = block.temp_path().unwrap();
        block.write(Bytes::from_static(b"keep me")).await.unwrap();
        block.finalize();
        block.close();

        assert!(path.exists());
        assert!(registry.contains(&path));
    }

    #[tokio::test]
    async fn test_temp_dir_round_robin() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        let registry = TempFileRegistry::new();
        let dirs = vec![dir_a.path().to_path_buf(), dir_b.path().to_path_buf()];

        let mut used = std::collections::HashSet::new();
        let mut blocks = Vec::new();
        for i in 0..4 {
            let block = BlockStore::disk(i, disk_options(dirs.clone(), registry.clone()));
            block.init().await.unwrap();
            used.insert(block.temp_path().unwrap().parent().unwrap().to_path_buf());
            blocks.push(block);
        }
        // Four consecutive creations over two candidates touch both.
        assert_eq!(used.len(), 2);

        for block in &blocks {
            block.close();
        }
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_disk_reader_overtaking_writer_waits() {
        let dir = tempfile::tempdir().unwrap();
        let registry = TempFileRegistry::new();
        let block = Arc::new(BlockStore::disk(2, disk_options(vec![dir.path().to_path_buf()], registry)));
        block.init().await.unwrap();

        let writer = block.clone();
        let producer = tokio::spawn(async move {
            for chunk in [&b"aa"[..], b"bb", b"cc"] {
                tokio::task::yield_now().await;
                writer.write(Bytes::copy_from_slice(chunk)).await.unwrap();
            }
            writer.finalize();
        });

        // Poll the block like the assembler would; a slow producer must only
        // ever surface as Pending, never as a premature End.
        let mut out = Vec::new();
        let mut buf = [0u8; 64];
        loop {
            match block.read_at(out.len() as u64, &mut buf).await.unwrap() {
                ReadOutcome::Bytes(n) => out.extend_from_slice(&buf[..n]),
                ReadOutcome::Pending => tokio::task::yield_now().await,
                ReadOutcome::End => break,
            }
        }
        producer.await.unwrap();
        assert_eq!(out, b"aabbcc");
        block.close();
    }
}
