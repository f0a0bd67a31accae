use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ccp_config::ccp_config;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Process-wide record of every live temp file backing a disk block.
///
/// A path stays registered from creation until its block is closed, so a
/// supervisor can drain everything that is still on disk after a fatal
/// error, a stall, or a trapped signal.
#[derive(Debug, Default)]
pub struct TempFileRegistry {
    files: Mutex<HashSet<PathBuf>>,
}

impl TempFileRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, path: impl Into<PathBuf>) {
        self.files.lock().unwrap().insert(path.into());
    }

    pub fn unregister(&self, path: &Path) -> bool {
        self.files.lock().unwrap().remove(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files.lock().unwrap().contains(path)
    }

    pub fn live(&self) -> Vec<PathBuf> {
        self.files.lock().unwrap().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.files.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.lock().unwrap().is_empty()
    }

    /// Removes every registered file in parallel and clears the registry.
    /// A missing file is not an error; cleanup may race a normal close.
    pub async fn cleanup(&self) {
        let paths: Vec<PathBuf> = {
            let mut files = self.files.lock().unwrap();
            files.drain().collect()
        };

        let mut tasks = JoinSet::new();
        for path in paths {
            tasks.spawn_blocking(move || {
                debug!(path = %path.display(), "removing temp file");
                if let Err(err) = std::fs::remove_file(&path) {
                    if err.kind() != std::io::ErrorKind::NotFound {
                        warn!(path = %path.display(), %err, "failed to remove temp file");
                    }
                }
            });
        }
        while tasks.join_next().await.is_some() {}
    }
}

lazy_static::lazy_static! {
    static ref GLOBAL_REGISTRY: Arc<TempFileRegistry> = TempFileRegistry::new();
}

pub fn global_registry() -> Arc<TempFileRegistry> {
    GLOBAL_REGISTRY.clone()
}

/// Drains the process-wide registry. Intended for the copy supervisor's
/// fatal-error, stall, and signal paths; `CCP_ENGINE_NOGC` leaves the files
/// in place for inspection.
pub async fn cleanup_process_temp_files() {
    if ccp_config().engine.nogc {
        return;
    }
    global_registry().cleanup().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cleanup_removes_registered_files() {
        let dir = tempfile::tempdir().unwrap();
        let registry = TempFileRegistry::new();

        let mut paths = Vec::new();
        for i in 0..3 {
            let path = dir.path().join(format!("ccpxyz-{i}"));
            std::fs::write(&path, b"data").unwrap();
            registry.register(&path);
            paths.push(path);
        }
        // A registered path that is already gone must not fail cleanup.
        let ghost = dir.path().join("ccpghost-9");
        registry.register(&ghost);
        assert_eq!(registry.len(), 4);

        registry.cleanup().await;

        assert!(registry.is_empty());
        for path in paths {
            assert!(!path.exists());
        }
    }

    #[test]
    fn test_register_unregister() {
        let registry = TempFileRegistry::new();
        let path = PathBuf::from("/tmp/ccpabc-0");

        registry.register(&path);
        assert!(registry.contains(&path));
        assert_eq!(registry.live(), vec![path.clone()]);

        assert!(registry.unregister(&path));
        assert!(!registry.unregister(&path));
        assert!(registry.is_empty());
    }
}
