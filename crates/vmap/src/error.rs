//! Error types for view-map persistence and configuration.

use thiserror::Error;
use vmap_winged::MeshError;

/// Errors that can occur while loading scenes, configurations or saved
/// view maps.
#[derive(Error, Debug)]
pub enum ViewMapError {
    /// Underlying read or write failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream does not start with a view-map header.
    #[error("not a view-map file (bad magic)")]
    BadMagic,

    /// The stream was written by an incompatible format version.
    #[error("unsupported view-map version {0:?}")]
    UnsupportedVersion(String),

    /// The stream is truncated or holds inconsistent references.
    #[error("corrupt view-map data: {0}")]
    Corrupt(String),

    /// A configuration file could not be parsed.
    #[error("invalid configuration file: {0}")]
    Config(#[from] toml::de::Error),

    /// A configuration value cannot be used.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Input geometry could not be turned into a winged-edge mesh.
    #[error(transparent)]
    Mesh(#[from] MeshError),
}

/// Result type for view-map operations.
pub type Result<T> = std::result::Result<T, ViewMapError>;
