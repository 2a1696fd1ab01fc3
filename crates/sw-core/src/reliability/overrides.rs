//! Persisted reliability override file.
//!
//! The override file is the only channel between the offline tuner and the
//! live catalog. Writes go to a sibling `.tmp` file which is then renamed
//! over the target, so a reader never observes a partially written file.
//!
//! ```yaml
//! metadata:
//!   generated_at: 2026-10-17T03:00:00Z
//!   version: "1.0"
//!   tuner_config:
//!     min_feedback_threshold: 10
//!     max_adjustment_per_run: 0.02
//! reliability_overrides:
//!   claims: 0.83
//!   commands: 0.88
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Current override file format version.
pub const OVERRIDE_FORMAT_VERSION: &str = "1.0";

/// Errors reading or writing an override file.
#[derive(Error, Debug)]
pub enum OverrideError {
    #[error("Failed to access override file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse override file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Failed to serialize override file: {0}")]
    Serialize(#[from] serde_yaml::Error),
}

/// Generation metadata written alongside the coefficients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OverrideMetadata {
    /// When the file was generated.
    pub generated_at: DateTime<Utc>,
    /// File format version.
    #[serde(default = "default_version")]
    pub version: String,
    /// Tuner parameters used to produce the coefficients.
    #[serde(default)]
    pub tuner_config: BTreeMap<String, serde_yaml::Value>,
}

fn default_version() -> String {
    OVERRIDE_FORMAT_VERSION.to_string()
}

impl OverrideMetadata {
    /// Creates metadata stamped with the current time.
    pub fn now() -> Self {
        Self {
            generated_at: Utc::now(),
            version: default_version(),
            tuner_config: BTreeMap::new(),
        }
    }

    /// Records a tuner parameter.
    pub fn with_param(mut self, key: &str, value: impl Into<serde_yaml::Value>) -> Self {
        self.tuner_config.insert(key.to_string(), value.into());
        self
    }
}

/// Contents of a reliability override file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReliabilityOverrideFile {
    /// Generation metadata; absent in hand-written files.
    #[serde(default)]
    pub metadata: Option<OverrideMetadata>,
    /// Category to coefficient mapping.
    #[serde(default)]
    pub reliability_overrides: BTreeMap<String, f64>,
}

impl ReliabilityOverrideFile {
    /// Creates a file with the given coefficients and metadata.
    pub fn new(metadata: OverrideMetadata, overrides: BTreeMap<String, f64>) -> Self {
        Self {
            metadata: Some(metadata),
            reliability_overrides: overrides,
        }
    }

    /// Reads and parses an override file.
    ///
    /// A missing file surfaces as [`OverrideError::Io`] with
    /// `ErrorKind::NotFound`; callers decide whether that is an error.
    pub fn read(path: &Path) -> Result<Self, OverrideError> {
        let content = std::fs::read_to_string(path).map_err(|source| OverrideError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_yaml::from_str(&content).map_err(|source| OverrideError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reads an override file, treating a missing file as empty.
    pub fn read_or_default(path: &Path) -> Result<Self, OverrideError> {
        match Self::read(path) {
            Err(OverrideError::Io { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Writes the file atomically: serialize, write and sync `<path>.tmp`,
    /// rename it over `path`, then sync the directory.
    pub fn write_atomic(&self, path: &Path) -> Result<(), OverrideError> {
        let yaml = serde_yaml::to_string(self)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| OverrideError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let tmp_path = temp_path_for(path);
        let written = File::create(&tmp_path).and_then(|mut tmp| {
            tmp.write_all(yaml.as_bytes())?;
            tmp.sync_all()
        });
        if let Err(source) = written {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(OverrideError::Io {
                path: tmp_path,
                source,
            });
        }

        if let Err(source) = std::fs::rename(&tmp_path, path) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(OverrideError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            sync_directory(parent).map_err(|source| OverrideError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        debug!(
            path = %path.display(),
            entries = self.reliability_overrides.len(),
            "Override file written"
        );
        Ok(())
    }
}

impl Default for ReliabilityOverrideFile {
    fn default() -> Self {
        Self {
            metadata: None,
            reliability_overrides: BTreeMap::new(),
        }
    }
}

/// Sibling temp path used for atomic replacement.
#[cfg(unix)]
fn sync_directory(dir: &Path) -> std::io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_directory(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "reliability_overrides.yaml".into());
    name.push(".tmp");
    path.with_file_name(name)
}
