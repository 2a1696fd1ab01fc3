//! Modification-time tracking for hot-reloadable files.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Tracks a file's last observed modification time.
///
/// `has_changed` is a cheap `stat` call; callers reload when it returns true
/// and then call [`FileWatch::mark_loaded`] with the time they observed.
#[derive(Debug, Clone)]
pub struct FileWatch {
    path: PathBuf,
    last_modified: Option<SystemTime>,
    last_existed: bool,
}

impl FileWatch {
    /// Creates a watch that has not yet observed the file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_modified: None,
            last_existed: false,
        }
    }

    /// Returns the watched path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the current modification time, `None` if the file is absent.
    pub fn current_modified(&self) -> Option<SystemTime> {
        std::fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .ok()
    }

    /// Returns the observation if the file changed since the last load.
    ///
    /// A file that appears, disappears, or has a different modification
    /// time counts as changed.
    pub fn poll(&self) -> Option<Option<SystemTime>> {
        let current = self.current_modified();
        let exists = current.is_some();
        if exists != self.last_existed || current != self.last_modified {
            Some(current)
        } else {
            None
        }
    }

    /// Returns true if the file changed since the last load.
    pub fn has_changed(&self) -> bool {
        self.poll().is_some()
    }

    /// Records the state observed at load time.
    pub fn mark_loaded(&mut self, observed: Option<SystemTime>) {
        self.last_existed = observed.is_some();
        self.last_modified = observed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_is_unchanged_after_mark() {
        let dir = tempdir().unwrap();
        let mut watch = FileWatch::new(dir.path().join("absent.yaml"));
        assert!(!watch.has_changed());
        watch.mark_loaded(watch.current_modified());
        assert!(!watch.has_changed());
    }

    #[test]
    fn test_created_and_modified_file_is_detected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let mut watch = FileWatch::new(&path);
        watch.mark_loaded(None);

        std::fs::write(&path, "a: 1").unwrap();
        assert!(watch.has_changed());
        watch.mark_loaded(watch.current_modified());
        assert!(!watch.has_changed());

        let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        let later = SystemTime::now() + Duration::from_secs(5);
        file.set_modified(later).unwrap();
        assert!(watch.has_changed());
    }

    #[test]
    fn test_deleted_file_is_detected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "a: 1").unwrap();
        let mut watch = FileWatch::new(&path);
        watch.mark_loaded(watch.current_modified());

        std::fs::remove_file(&path).unwrap();
        assert!(watch.has_changed());
    }
}
