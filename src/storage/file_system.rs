//! Data directory layout
//!
//! The index database and the optional `deployments.json` live in one data
//! directory, `~/.study-wizard/data/` unless configured otherwise.

use std::fs;
use std::path::PathBuf;

use crate::storage::index_storage::INDEX_DB_FILE;

/// Deployments file name inside the data directory
pub const DEPLOYMENTS_FILE: &str = "deployments.json";

/// File system errors
#[derive(Debug, thiserror::Error)]
pub enum FileSystemError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Data directory not found")]
    DataDirectoryNotFound,
}

/// Get the default data directory path
///
/// Returns: `~/.study-wizard/data/`
pub fn default_data_dir() -> Result<PathBuf, FileSystemError> {
    let config_dir = crate::config::default_config_dir()
        .map_err(|_| FileSystemError::DataDirectoryNotFound)?;
    Ok(config_dir.join("data"))
}

/// Get the data directory (custom or default)
pub fn data_dir(custom_dir: Option<&str>) -> Result<PathBuf, FileSystemError> {
    match custom_dir {
        Some(dir) => Ok(PathBuf::from(dir)),
        None => default_data_dir(),
    }
}

/// Create the data directory if needed and return its path
///
/// # Example
///
/// ```ignore
/// let dir = ensure_data_dir(config.data_dir.as_deref())?;
/// let indexer = StepIndexer::new(&dir)?;
/// ```
pub fn ensure_data_dir(custom_dir: Option<&str>) -> Result<PathBuf, FileSystemError> {
    let dir = data_dir(custom_dir)?;
    if !dir.exists() {
        fs::create_dir_all(&dir)?;
        log::debug!("✓ Created data directory {}", dir.display());
    }
    Ok(dir)
}

/// Path of the index database
pub fn index_db_path(custom_dir: Option<&str>) -> Result<PathBuf, FileSystemError> {
    Ok(data_dir(custom_dir)?.join(INDEX_DB_FILE))
}

/// Path of the deployments file
pub fn deployments_path(custom_dir: Option<&str>) -> Result<PathBuf, FileSystemError> {
    Ok(data_dir(custom_dir)?.join(DEPLOYMENTS_FILE))
}
