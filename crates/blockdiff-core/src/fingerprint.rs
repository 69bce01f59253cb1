//! Structural fingerprints of a workspace
//!
//! A fingerprint is a value-type snapshot: block identities, next-statement
//! edge keys and per-block field state. Everything downstream of capture
//! works on snapshots only and never touches the workspace graph.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Serialize, Serializer};

use crate::fields::{FieldState, field_state};
use crate::model::{Block, BlockId, ConnectionKind, Slot};
use crate::workspace::Workspace;

/// Rendered in place of a missing connection target.
pub const NO_TARGET: &str = "none";

/// Identity of one next-statement connection: `(source, slot, target)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeKey {
    pub source: BlockId,
    pub slot: Slot,
    /// `None` for an unattached connection.
    pub target: Option<BlockId>,
}

impl EdgeKey {
    pub fn new(source: impl Into<BlockId>, slot: Slot, target: Option<&str>) -> Self {
        EdgeKey {
            source: source.into(),
            slot,
            target: target.map(BlockId::from),
        }
    }
}

impl fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let target = self.target.as_ref().map_or(NO_TARGET, BlockId::as_str);
        write!(f, "{} {} {}", self.source, self.slot, target)
    }
}

#[derive(Serialize)]
struct EdgeKeyRepr<'a> {
    source: &'a BlockId,
    slot: &'a str,
    target: Option<&'a BlockId>,
}

impl Serialize for EdgeKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        EdgeKeyRepr {
            source: &self.source,
            slot: self.slot.as_str(),
            target: self.target.as_ref(),
        }
        .serialize(serializer)
    }
}

/// One id per block. Ids are unique within a workspace; a repeat is a
/// precondition violation.
pub fn block_identity_set<'a>(blocks: impl IntoIterator<Item = &'a Block>) -> BTreeSet<BlockId> {
    let mut seen = 0usize;
    let ids: BTreeSet<BlockId> = blocks
        .into_iter()
        .inspect(|_| seen += 1)
        .map(|block| block.id.clone())
        .collect();
    debug_assert_eq!(ids.len(), seen, "duplicate block ids in one workspace");
    ids
}

/// One key per next-statement connection, attached or not. Value
/// connections are not part of the fingerprint.
pub fn edge_key_set<'a>(blocks: impl IntoIterator<Item = &'a Block>) -> BTreeSet<EdgeKey> {
    blocks
        .into_iter()
        .flat_map(|block| {
            block
                .connections()
                .filter(|conn| conn.connection.kind == ConnectionKind::NextStatement)
                .map(move |conn| EdgeKey {
                    source: block.id.clone(),
                    slot: conn.slot(),
                    target: conn.connection.target.clone(),
                })
        })
        .collect()
}

/// Everything the diff engine needs to know about one workspace.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub blocks: BTreeSet<BlockId>,
    pub edges: BTreeSet<EdgeKey>,
    pub fields: BTreeMap<BlockId, FieldState>,
}

impl Snapshot {
    pub fn capture(workspace: &Workspace) -> Self {
        Self::from_blocks(workspace.blocks())
    }

    pub fn from_blocks<'a>(blocks: impl IntoIterator<Item = &'a Block>) -> Self {
        let blocks: Vec<&Block> = blocks.into_iter().collect();
        Snapshot {
            blocks: block_identity_set(blocks.iter().copied()),
            edges: edge_key_set(blocks.iter().copied()),
            fields: blocks
                .iter()
                .map(|block| (block.id.clone(), field_state(block)))
                .collect(),
        }
    }
}
