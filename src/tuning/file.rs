//! Tuning file persistence: YAML load/save of a [`TuningCollection`].
//!
//! Every key is required and unknown keys are rejected, so a stale or
//! hand-edited file fails before any audio is produced.

use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result};

use super::TuningCollection;

/// Default location of the tuning file (`~/.peachy/tuning.yaml`).
pub fn default_tuning_path() -> PathBuf {
    let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(".peachy");
    path.push("tuning.yaml");
    path
}

/// The tuning file to use: `explicit` when given, the default location otherwise.
pub fn tuning_path(explicit: Option<&Path>) -> PathBuf {
    explicit.map_or_else(default_tuning_path, Path::to_path_buf)
}

/// Parse and validate a tuning document.
pub fn parse_tuning(content: &str) -> std::result::Result<TuningCollection, ConfigError> {
    let mut collection: TuningCollection = serde_yaml::from_str(content)?;
    collection.validate()?;
    Ok(collection)
}

/// Load a tuning collection from a YAML file.
pub fn load_tuning(path: &Path) -> Result<TuningCollection> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse_tuning(&content)?)
}

/// Save a tuning collection to a YAML file, creating parent directories as needed.
pub fn save_tuning(path: &Path, collection: &TuningCollection) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let yaml = serde_yaml::to_string(collection).map_err(ConfigError::from)?;
    std::fs::write(path, yaml)?;
    Ok(())
}
