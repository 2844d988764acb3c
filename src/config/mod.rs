// src/config/mod.rs

//! Worker configuration for procwarden.
//!
//! Responsibilities:
//! - Define the immutable `Configuration` contract and its builder (`model.rs`).
//! - Compose option-channel values from independent contributors (`options.rs`).
//! - Load a worker file from disk (`loader.rs`).
//! - Validate basic invariants (`validate.rs`).

pub mod loader;
pub mod model;
pub mod options;
pub mod validate;

pub use loader::{load_and_validate, load_from_path};
pub use model::{
    ClientSection, Configuration, ConfigurationBuilder, RawWorkerFile, RetryPolicy,
    SupervisorPolicy, WorkerFile,
};
pub use options::{HeapOptions, OptionContributor, OptionSet, SystemProperties};
pub use validate::validate_configuration;
