// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{RawWorkerFile, WorkerFile};
use crate::errors::Result;

/// Load a worker file from a given path and return the raw `RawWorkerFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawWorkerFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let raw: RawWorkerFile = toml::from_str(&contents)?;

    Ok(raw)
}

/// Load a worker file from path and validate it.
///
/// - Reads TOML.
/// - Applies defaults for every omitted policy knob.
/// - Resolves a relative `directory` / `log_dir` against the file's own
///   directory.
/// - Builds the immutable `Configuration` (option contributors applied).
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<WorkerFile> {
    let path = path.as_ref();
    let raw = load_from_path(path)?;
    WorkerFile::from_raw(raw, &config_root_dir(path))
}

/// Directory that relative paths in the worker file are resolved against.
///
/// A bare filename like "worker.toml" (parent = "") falls back to the
/// current working directory.
pub fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

/// Default worker file path: `Procwarden.toml` in the current directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Procwarden.toml")
}
