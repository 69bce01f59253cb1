//! blockdiff core: workspace model, diff engine and highlight driver

pub mod catalog;
pub mod config;
pub mod diff;
pub mod error;
pub mod fields;
pub mod fingerprint;
pub mod highlight;
pub mod json;
pub mod mergeable;
pub mod model;
pub mod scroll;
pub mod selection;
pub mod serialization;
pub mod session;
pub mod sets;
pub mod storage;
pub mod tree;
pub mod view;
pub mod workspace;


#[cfg(test)]
pub mod test_utils;

pub use catalog::Catalog;
pub use config::Config;
pub use diff::{DiffEngine, DiffResult, DiffSummary, compute_diff};
pub use error::{CatalogError, ConfigError, DocumentError, SessionError, StorageError, WorkspaceError};
pub use fingerprint::{EdgeKey, Snapshot};
pub use highlight::{BlockMark, DecorationState, Decorations, apply_highlights};
pub use model::{Block, BlockId, ConnectionKind, InputKind, Position, Side, Slot};
pub use serialization::Document;
pub use session::{BlockChange, Session, SessionEffect, SessionEvent};
pub use storage::{STORAGE_DIR, Storage};
pub use view::Viewport;
pub use workspace::Workspace;
