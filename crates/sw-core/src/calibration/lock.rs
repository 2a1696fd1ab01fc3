//! Advisory lock serializing tuner runs against one override path.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fd_lock::RwLock;

use super::tuner::TunerError;

/// Lock file guarding an override path, at `<override>.lock`.
pub struct TunerLock {
    lock_file: RwLock<File>,
    lock_path: PathBuf,
}

impl TunerLock {
    /// Opens (creating if needed) the lock file for `override_path`.
    pub fn for_override(override_path: &Path) -> Result<Self, TunerError> {
        let lock_path = lock_path_for(override_path);
        if let Some(parent) = lock_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| TunerError::Lock {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|source| TunerError::Lock {
                path: lock_path.clone(),
                source,
            })?;
        Ok(Self {
            lock_file: RwLock::new(file),
            lock_path,
        })
    }

    /// Acquires the exclusive lock without blocking.
    ///
    /// Fails with [`TunerError::Locked`] if another run holds it.
    pub fn acquire(&mut self) -> Result<fd_lock::RwLockWriteGuard<'_, File>, TunerError> {
        let path = self.lock_path.clone();
        self.lock_file
            .try_write()
            .map_err(|_| TunerError::Locked(path))
    }

    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

fn lock_path_for(override_path: &Path) -> PathBuf {
    let mut name = override_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "reliability_overrides.yaml".into());
    name.push(".lock");
    override_path.with_file_name(name)
}
