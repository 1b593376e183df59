//! Error types for the component registry

use std::path::PathBuf;
use thiserror::Error;

/// Registry-specific error types.
///
/// None of these are fatal to the process: every operation that returns one
/// has already logged a diagnostic, and the caller decides whether the
/// pipeline can continue without the missing piece.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("not found: '{0}'")]
    NotFound(String),

    #[error("component '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("invalid component name '{0}'")]
    InvalidName(String),

    #[error("failed to load module '{path}': {message}")]
    LoadFailure { path: PathBuf, message: String },

    #[error("module '{path}' does not export '{symbol}'")]
    SymbolMissing { path: PathBuf, symbol: &'static str },

    #[error("failed to unload module '{path}': {message}")]
    UnloadFailure { path: PathBuf, message: String },

    #[error("string table is full (capacity {capacity})")]
    CapacityExceeded { capacity: usize },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        RegistryError::Config(err.to_string())
    }
}

impl From<serde_yaml::Error> for RegistryError {
    fn from(err: serde_yaml::Error) -> Self {
        RegistryError::Config(err.to_string())
    }
}

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;
