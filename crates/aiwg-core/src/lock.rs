//! Advisory exclusive lock around registry-mutating operations.
//!
//! Two processes installing into the same root serialize on
//! `{root}/.aiwg.lock`; within the lock each run re-reads the registry, so
//! the second one observes the first one's entry.

use crate::error::{AiwgError, Result};
use crate::paths;
use std::fs::OpenOptions;
use std::path::Path;

/// Run `f` while holding the root's exclusive lock. Blocks until acquired.
pub fn with_root_lock<T>(root: &Path, f: impl FnOnce() -> T) -> Result<T> {
    let path = paths::lock_path(root);
    crate::io::ensure_dir(root)?;
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&path)?;
    let mut lock = fd_lock::RwLock::new(file);
    let _guard = lock.write().map_err(|e| AiwgError::Lock {
        path: path.clone(),
        reason: e.to_string(),
    })?;
    tracing::debug!(path = %path.display(), "acquired root lock");
    Ok(f())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    #[test]
    fn lock_runs_closure_and_creates_file() {
        let dir = TempDir::new().unwrap();
        let out = with_root_lock(dir.path(), || 7).unwrap();
        assert_eq!(out, 7);
        assert!(paths::lock_path(dir.path()).exists());
    }

    #[test]
    fn lock_is_reentrant_across_sequential_calls() {
        let dir = TempDir::new().unwrap();
        with_root_lock(dir.path(), || ()).unwrap();
        with_root_lock(dir.path(), || ()).unwrap();
    }

    #[test]
    fn concurrent_holders_do_not_interleave() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_path_buf();
        let log = Arc::new(Mutex::new(Vec::new()));
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let root = root.clone();
                let log = Arc::clone(&log);
                std::thread::spawn(move || {
                    with_root_lock(&root, || {
                        log.lock().unwrap().push(("enter", i));
                        std::thread::sleep(std::time::Duration::from_millis(5));
                        log.lock().unwrap().push(("exit", i));
                    })
                    .unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let log = log.lock().unwrap();
        for pair in log.chunks(2) {
            assert_eq!(pair[0].0, "enter");
            assert_eq!(pair[1].0, "exit");
            assert_eq!(pair[0].1, pair[1].1);
        }
    }
}
