//! Diff computation between the "mine" and "previous" workspaces

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::fields::{FieldState, FieldVerdicts, compare_fields};
use crate::fingerprint::{EdgeKey, Snapshot};
use crate::model::BlockId;
use crate::sets::{difference, intersection};
use crate::workspace::Workspace;

/// Where the two workspaces disagree. Rebuilt from scratch on every change.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiffResult {
    /// Diff sequence number, stamped by [`DiffEngine`].
    pub sequence: u64,
    /// Blocks only in mine.
    pub added: BTreeSet<BlockId>,
    /// Blocks only in previous.
    pub removed: BTreeSet<BlockId>,
    /// Blocks present on both sides.
    pub common: BTreeSet<BlockId>,
    pub edges_added: BTreeSet<EdgeKey>,
    pub edges_removed: BTreeSet<EdgeKey>,
    pub edges_common: BTreeSet<EdgeKey>,
    /// Per common block: field name → equal on both sides.
    pub fields: BTreeMap<BlockId, FieldVerdicts>,
}

/// Counts for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DiffSummary {
    pub added: usize,
    pub removed: usize,
    pub common: usize,
    pub changed: usize,
    pub edges_added: usize,
    pub edges_removed: usize,
}

impl DiffResult {
    /// Check whether the two sides agree on blocks, edges and fields.
    pub fn is_identical(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.edges_added.is_empty()
            && self.edges_removed.is_empty()
            && self.changed_blocks().next().is_none()
    }

    /// Common blocks with at least one unequal field.
    pub fn changed_blocks(&self) -> impl Iterator<Item = &BlockId> {
        self.fields
            .iter()
            .filter(|(_, verdicts)| verdicts.values().any(|equal| !equal))
            .map(|(id, _)| id)
    }

    /// Verdict for one field of a common block; `None` when not compared.
    pub fn field_equal(&self, block: &str, field: &str) -> Option<bool> {
        self.fields.get(block)?.get(field).copied()
    }

    pub fn summary(&self) -> DiffSummary {
        DiffSummary {
            added: self.added.len(),
            removed: self.removed.len(),
            common: self.common.len(),
            changed: self.changed_blocks().count(),
            edges_added: self.edges_added.len(),
            edges_removed: self.edges_removed.len(),
        }
    }
}

/// Compare two snapshots. Pure.
pub fn diff_snapshots(mine: &Snapshot, previous: &Snapshot) -> DiffResult {
    let added = difference(&mine.blocks, &previous.blocks);
    let removed = difference(&previous.blocks, &mine.blocks);
    let common = intersection(&mine.blocks, &previous.blocks);

    let edges_added = difference(&mine.edges, &previous.edges);
    let edges_removed = difference(&previous.edges, &mine.edges);
    let edges_common = intersection(&mine.edges, &previous.edges);

    let empty = FieldState::new();
    let fields = common
        .iter()
        .map(|id| {
            let ours = mine.fields.get(id).unwrap_or(&empty);
            let theirs = previous.fields.get(id).unwrap_or(&empty);
            (id.clone(), compare_fields(ours, theirs))
        })
        .collect();

    DiffResult {
        sequence: 0,
        added,
        removed,
        common,
        edges_added,
        edges_removed,
        edges_common,
        fields,
    }
}

/// Compare two workspaces. Pure; captures snapshots and diffs them.
pub fn compute_diff(mine: &Workspace, previous: &Workspace) -> DiffResult {
    diff_snapshots(&Snapshot::capture(mine), &Snapshot::capture(previous))
}

/// Diff state for repeated recomputation.
#[derive(Debug)]
pub struct DiffEngine {
    sequence: u64,
}

impl DiffEngine {
    pub fn new() -> Self {
        DiffEngine { sequence: 0 }
    }

    /// Compute the difference between two workspace states.
    /// Returns a DiffResult with the sequence number incremented.
    pub fn compute_diff(&mut self, mine: &Workspace, previous: &Workspace) -> DiffResult {
        let mut diff = compute_diff(mine, previous);
        self.sequence += 1;
        diff.sequence = self.sequence;
        diff
    }

    /// Get current sequence number.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl Default for DiffEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Block, Slot};
    use serde_json::json;

    fn ids(items: &[&str]) -> BTreeSet<BlockId> {
        items.iter().map(|s| BlockId::from(*s)).collect()
    }

    fn flat(ids: &[&str]) -> Workspace {
        Workspace::from_blocks(ids.iter().map(|id| Block::new(*id, "text_print"))).unwrap()
    }

    #[test]
    fn test_block_sets_scenario() {
        let diff = compute_diff(&flat(&["1", "2", "3"]), &flat(&["2", "3", "4"]));
        assert_eq!(diff.added, ids(&["1"]));
        assert_eq!(diff.removed, ids(&["4"]));
        assert_eq!(diff.common, ids(&["2", "3"]));
    }

    #[test]
    fn test_partition_property() {
        let cases: [(&[&str], &[&str]); 5] = [
            (&["1", "2", "3"], &["2", "3", "4"]),
            (&[], &[]),
            (&["a"], &[]),
            (&[], &["b"]),
            (&["x", "y"], &["x", "y"]),
        ];
        for (mine, previous) in cases {
            let diff = compute_diff(&flat(mine), &flat(previous));
            let union: BTreeSet<BlockId> = ids(mine).union(&ids(previous)).cloned().collect();
            let mut parts = diff.added.clone();
            parts.extend(diff.removed.iter().cloned());
            parts.extend(diff.common.iter().cloned());
            assert_eq!(parts, union);
            assert_eq!(
                diff.added.len() + diff.removed.len() + diff.common.len(),
                union.len()
            );
        }
    }

    #[test]
    fn test_edge_added_scenario() {
        let mine = Workspace::from_blocks(vec![
            Block::new("a", "controls_repeat").with_statement("DO", Some("b")),
            Block::new("b", "text_print"),
        ])
        .unwrap();
        let previous = Workspace::from_blocks(vec![
            Block::new("a", "controls_repeat").with_statement("DO", None),
            Block::new("b", "text_print"),
        ])
        .unwrap();
        let diff = compute_diff(&mine, &previous);
        let key = EdgeKey::new("a", Slot::input("DO"), Some("b"));
        assert!(diff.edges_added.contains(&key));
        assert!(!diff.edges_removed.contains(&key));
        assert!(!diff.edges_common.contains(&key));
        assert!(diff.edges_removed.contains(&EdgeKey::new("a", Slot::input("DO"), None)));
    }

    #[test]
    fn test_field_verdicts_only_for_common_blocks() {
        let mine = Workspace::from_blocks(vec![
            Block::new("2", "text").with_field("NAME", json!("x")),
            Block::new("1", "text").with_field("NAME", json!("x")),
        ])
        .unwrap();
        let previous = Workspace::from_blocks(vec![
            Block::new("2", "text").with_field("NAME", json!("y")),
            Block::new("4", "text").with_field("NAME", json!("x")),
        ])
        .unwrap();
        let diff = compute_diff(&mine, &previous);
        assert_eq!(diff.field_equal("2", "NAME"), Some(false));
        assert_eq!(diff.field_equal("1", "NAME"), None);
        assert_eq!(diff.field_equal("4", "NAME"), None);
        assert_eq!(diff.changed_blocks().collect::<Vec<_>>(), vec![&BlockId::from("2")]);
        assert!(!diff.is_identical());
    }

    #[test]
    fn test_identical_workspaces() {
        let ws = Workspace::from_blocks(vec![
            Block::new("a", "text").with_field("TEXT", json!("same")).with_next(None),
        ])
        .unwrap();
        let diff = compute_diff(&ws, &ws.clone());
        assert!(diff.is_identical());
        assert_eq!(diff.field_equal("a", "TEXT"), Some(true));
        assert_eq!(diff.edges_common.len(), 1);
    }

    #[test]
    fn test_empty_workspaces() {
        let diff = compute_diff(&Workspace::new(), &Workspace::new());
        assert_eq!(diff, DiffResult::default());
        assert!(diff.is_identical());
    }

    #[test]
    fn test_engine_stamps_sequence() {
        let mut engine = DiffEngine::new();
        let ws = Workspace::new();
        assert_eq!(engine.compute_diff(&ws, &ws).sequence, 1);
        assert_eq!(engine.compute_diff(&ws, &ws).sequence, 2);
        assert_eq!(engine.sequence(), 2);
    }

    #[test]
    fn test_summary_snapshot() {
        let diff = compute_diff(&flat(&["1", "2", "3"]), &flat(&["2", "3", "4"]));
        insta::assert_json_snapshot!(diff.summary(), @r###"
        {
          "added": 1,
          "removed": 1,
          "common": 2,
          "changed": 0,
          "edges_added": 0,
          "edges_removed": 0
        }
        "###);
    }
}
