//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and passed into the stores and the
//! service. Core code never reads environment variables; binaries do that and hand the
//! values over here.

use crate::constants::{CONDITIONS_DIR_NAME, DEFAULT_DATA_DIR};
use crate::error::{ConditionError, ConditionResult};
use std::path::{Path, PathBuf};

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    data_dir: PathBuf,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`ConditionError::InvalidConfig`] if `data_dir` is empty or names an
    /// existing file.
    pub fn new(data_dir: PathBuf) -> ConditionResult<Self> {
        if data_dir.as_os_str().is_empty() {
            return Err(ConditionError::InvalidConfig(
                "data_dir cannot be empty".into(),
            ));
        }
        if data_dir.is_file() {
            return Err(ConditionError::InvalidConfig(format!(
                "data_dir is a file, not a directory: {}",
                data_dir.display()
            )));
        }

        Ok(Self { data_dir })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Directory holding one YAML document per condition.
    pub fn conditions_dir(&self) -> PathBuf {
        self.data_dir.join(CONDITIONS_DIR_NAME)
    }
}

/// Resolve the data directory from an optional override.
///
/// Blank overrides are treated as absent, in which case [`DEFAULT_DATA_DIR`] relative to
/// the working directory is used.
pub fn resolve_data_dir(override_dir: Option<PathBuf>) -> PathBuf {
    override_dir
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}
