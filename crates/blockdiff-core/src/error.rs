//! Error types for the core crate

use std::path::PathBuf;

use thiserror::Error;

use crate::model::{BlockId, Slot};

/// Errors raised while mutating a workspace graph.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkspaceError {
    #[error("Block '{0}' already exists in this workspace")]
    DuplicateBlock(BlockId),

    #[error("Block '{0}' not found")]
    UnknownBlock(BlockId),

    #[error("Block '{block}' has no connection in slot '{slot}'")]
    UnknownSlot { block: BlockId, slot: Slot },

    #[error("Block '{block}' has no field named '{field}'")]
    UnknownField { block: BlockId, field: String },

    #[error("Connecting '{target}' under '{source_block}' would create a cycle")]
    Cycle { source_block: BlockId, target: BlockId },
}

/// Errors raised while reading or converting a serialized workspace document.
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Failed to parse workspace JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed workspace document: {0}")]
    Malformed(String),

    #[error("Block '{0}' is referenced but has no fragment in the document")]
    UnknownReference(BlockId),

    #[error("Block '{0}' appears more than once in the document")]
    DuplicateFragment(BlockId),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
}

/// Errors raised while loading block shape definitions.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid catalog TOML: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Errors raised while loading `.blockdiff.toml`.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid value for {key}: '{value}'")]
    InvalidEnv { key: String, value: String },
}

/// Errors raised by on-disk document storage.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error("Failed to encode document: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Every share key for these documents is taken by other documents")]
    KeysExhausted,
}

/// Errors raised while dispatching a session event. The session is left as
/// it was before the event.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
}
