//! Highlight driver: turns a diff into per-element decoration
//!
//! The renderer owns the graphical handles; [`Decorations`] is the seam it
//! implements. [`DecorationState`] is an in-memory implementation whose
//! serialized form is what browser clients apply to their views.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::trace;

use crate::diff::DiffResult;
use crate::fingerprint::{EdgeKey, Snapshot};
use crate::model::BlockId;
use crate::workspace::Workspace;

/// Mutually exclusive per-block decoration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BlockMark {
    #[default]
    None,
    Added,
    Removed,
    ValueChanged,
}

/// Per-element decoration handles of one rendered workspace.
///
/// Implementations must tolerate ids they have no handle for.
pub trait Decorations {
    fn set_block_mark(&mut self, block: &BlockId, mark: BlockMark);
    fn set_connection_highlight(&mut self, edge: &EdgeKey, highlighted: bool);
    fn set_field_invalid(&mut self, block: &BlockId, field: &str, invalid: bool);
    /// Clear the invalid mark from every field of `block`.
    fn clear_invalid_fields(&mut self, block: &BlockId);
}

/// Apply a diff to both sides' decorations.
///
/// Every element the diff names is set to its target state rather than
/// toggled, so re-applying an unchanged diff leaves the rendering untouched.
/// Field comparisons only exist for common blocks; a block present on one
/// side only has no invalid fields.
pub fn apply_highlights<M, P>(diff: &DiffResult, mine: &mut M, previous: &mut P)
where
    M: Decorations + ?Sized,
    P: Decorations + ?Sized,
{
    for id in &diff.added {
        mine.set_block_mark(id, BlockMark::Added);
        mine.clear_invalid_fields(id);
    }
    for id in &diff.removed {
        previous.set_block_mark(id, BlockMark::Removed);
        previous.clear_invalid_fields(id);
    }
    for id in &diff.common {
        let changed = diff
            .fields
            .get(id)
            .is_some_and(|verdicts| verdicts.values().any(|equal| !equal));
        let mark = if changed {
            BlockMark::ValueChanged
        } else {
            BlockMark::None
        };
        mine.set_block_mark(id, mark);
        previous.set_block_mark(id, mark);
    }

    for edge in &diff.edges_added {
        mine.set_connection_highlight(edge, true);
    }
    for edge in &diff.edges_removed {
        previous.set_connection_highlight(edge, true);
    }
    for edge in &diff.edges_common {
        mine.set_connection_highlight(edge, false);
        previous.set_connection_highlight(edge, false);
    }

    for (id, verdicts) in &diff.fields {
        for (field, equal) in verdicts {
            mine.set_field_invalid(id, field, !equal);
            previous.set_field_invalid(id, field, !equal);
        }
    }
}

/// Which elements a rendered workspace has handles for.
#[derive(Debug, Clone, Default, PartialEq)]
struct Handles {
    blocks: BTreeSet<BlockId>,
    edges: BTreeSet<EdgeKey>,
    fields: BTreeSet<(BlockId, String)>,
}

impl Handles {
    fn from_snapshot(snapshot: Snapshot) -> Self {
        let fields = snapshot
            .fields
            .iter()
            .flat_map(|(id, state)| state.keys().map(move |name| (id.clone(), name.clone())))
            .collect();
        Handles {
            blocks: snapshot.blocks,
            edges: snapshot.edges,
            fields,
        }
    }
}

/// Decoration state of one workspace as the client should render it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DecorationState {
    #[serde(skip)]
    handles: Handles,
    /// Blocks whose mark is not `None`.
    blocks: BTreeMap<BlockId, BlockMark>,
    connections: BTreeSet<EdgeKey>,
    invalid_fields: BTreeMap<BlockId, BTreeSet<String>>,
}

impl DecorationState {
    pub fn for_workspace(workspace: &Workspace) -> Self {
        let mut state = DecorationState::default();
        state.refresh(workspace);
        state
    }

    /// Re-read handles after the workspace changed; decoration on elements
    /// that no longer exist is dropped.
    pub fn refresh(&mut self, workspace: &Workspace) {
        self.handles = Handles::from_snapshot(Snapshot::capture(workspace));
        let handles = &self.handles;
        self.blocks.retain(|id, _| handles.blocks.contains(id));
        self.connections.retain(|edge| handles.edges.contains(edge));
        self.invalid_fields.retain(|id, names| {
            names.retain(|name| handles.fields.contains(&(id.clone(), name.clone())));
            !names.is_empty()
        });
    }

    pub fn block_mark(&self, id: &str) -> BlockMark {
        self.blocks.get(id).copied().unwrap_or_default()
    }

    pub fn is_highlighted(&self, edge: &EdgeKey) -> bool {
        self.connections.contains(edge)
    }

    pub fn is_invalid(&self, block: &str, field: &str) -> bool {
        self.invalid_fields
            .get(block)
            .is_some_and(|names| names.contains(field))
    }

    /// Check if nothing is decorated.
    pub fn is_clean(&self) -> bool {
        self.blocks.is_empty() && self.connections.is_empty() && self.invalid_fields.is_empty()
    }
}

impl Decorations for DecorationState {
    fn set_block_mark(&mut self, block: &BlockId, mark: BlockMark) {
        if !self.handles.blocks.contains(block) {
            trace!("No block handle for {}", block);
            return;
        }
        match mark {
            BlockMark::None => {
                self.blocks.remove(block);
            }
            mark => {
                self.blocks.insert(block.clone(), mark);
            }
        }
    }

    fn set_connection_highlight(&mut self, edge: &EdgeKey, highlighted: bool) {
        if !self.handles.edges.contains(edge) {
            trace!("No connection handle for {}", edge);
            return;
        }
        if highlighted {
            self.connections.insert(edge.clone());
        } else {
            self.connections.remove(edge);
        }
    }

    fn set_field_invalid(&mut self, block: &BlockId, field: &str, invalid: bool) {
        if !self.handles.fields.contains(&(block.clone(), field.to_string())) {
            trace!("No field handle for {}.{}", block, field);
            return;
        }
        if invalid {
            self.invalid_fields
                .entry(block.clone())
                .or_default()
                .insert(field.to_string());
        } else if let Some(names) = self.invalid_fields.get_mut(block) {
            names.remove(field);
            if names.is_empty() {
                self.invalid_fields.remove(block);
            }
        }
    }

    fn clear_invalid_fields(&mut self, block: &BlockId) {
        if self.invalid_fields.remove(block).is_some() {
            trace!("Cleared invalid fields of {}", block);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::compute_diff;
    use crate::model::{Block, Slot};
    use serde_json::json;

    fn pair() -> (Workspace, Workspace) {
        let mine = Workspace::from_blocks(vec![
            Block::new("1", "text").with_field("TEXT", json!("new")),
            Block::new("2", "text_print")
                .with_field("NAME", json!("x"))
                .with_next(Some("3")),
            Block::new("3", "text_print").with_next(None),
        ])
        .unwrap();
        let previous = Workspace::from_blocks(vec![
            Block::new("2", "text_print")
                .with_field("NAME", json!("y"))
                .with_next(None),
            Block::new("3", "text_print").with_next(Some("4")),
            Block::new("4", "text").with_field("TEXT", json!("old")),
        ])
        .unwrap();
        (mine, previous)
    }

    fn decorate(mine: &Workspace, previous: &Workspace) -> (DecorationState, DecorationState) {
        let diff = compute_diff(mine, previous);
        let mut m = DecorationState::for_workspace(mine);
        let mut p = DecorationState::for_workspace(previous);
        apply_highlights(&diff, &mut m, &mut p);
        (m, p)
    }

    #[test]
    fn test_block_marks() {
        let (mine, previous) = pair();
        let (m, p) = decorate(&mine, &previous);
        assert_eq!(m.block_mark("1"), BlockMark::Added);
        assert_eq!(p.block_mark("4"), BlockMark::Removed);
        assert_eq!(m.block_mark("2"), BlockMark::ValueChanged);
        assert_eq!(p.block_mark("2"), BlockMark::ValueChanged);
        assert_eq!(m.block_mark("3"), BlockMark::None);
        // Only the side that has the block is decorated.
        assert_eq!(p.block_mark("1"), BlockMark::None);
    }

    #[test]
    fn test_field_invalid_on_both_sides() {
        let (mine, previous) = pair();
        let (m, p) = decorate(&mine, &previous);
        assert!(m.is_invalid("2", "NAME"));
        assert!(p.is_invalid("2", "NAME"));
        assert!(!m.is_invalid("1", "TEXT"));
    }

    #[test]
    fn test_connection_highlights() {
        let (mine, previous) = pair();
        let (m, p) = decorate(&mine, &previous);
        let added = crate::fingerprint::EdgeKey::new("2", Slot::Next, Some("3"));
        let removed = crate::fingerprint::EdgeKey::new("3", Slot::Next, Some("4"));
        assert!(m.is_highlighted(&added));
        assert!(!p.is_highlighted(&added));
        assert!(p.is_highlighted(&removed));
    }

    #[test]
    fn test_idempotent() {
        let (mine, previous) = pair();
        let diff = compute_diff(&mine, &previous);
        let mut m = DecorationState::for_workspace(&mine);
        let mut p = DecorationState::for_workspace(&previous);
        apply_highlights(&diff, &mut m, &mut p);
        let (once_m, once_p) = (m.clone(), p.clone());
        apply_highlights(&diff, &mut m, &mut p);
        assert_eq!(m, once_m);
        assert_eq!(p, once_p);
    }

    #[test]
    fn test_resolved_difference_clears_decoration() {
        let (mut mine, previous) = pair();
        let mut m = DecorationState::for_workspace(&mine);
        let mut p = DecorationState::for_workspace(&previous);
        apply_highlights(&compute_diff(&mine, &previous), &mut m, &mut p);
        assert!(m.is_invalid("2", "NAME"));

        mine.set_field("2", "NAME", json!("y")).unwrap();
        m.refresh(&mine);
        apply_highlights(&compute_diff(&mine, &previous), &mut m, &mut p);
        assert!(!m.is_invalid("2", "NAME"));
        assert!(!p.is_invalid("2", "NAME"));
        assert_eq!(m.block_mark("2"), BlockMark::None);
    }

    #[test]
    fn test_block_leaving_common_set_loses_invalid_fields() {
        let (mine, mut previous) = pair();
        let (mut m, mut p) = decorate(&mine, &previous);
        assert!(m.is_invalid("2", "NAME"));

        previous.delete("2").unwrap();
        m.refresh(&mine);
        p.refresh(&previous);
        apply_highlights(&compute_diff(&mine, &previous), &mut m, &mut p);
        assert_eq!(m.block_mark("2"), BlockMark::Added);
        assert!(!m.is_invalid("2", "NAME"));
    }

    #[test]
    fn test_refresh_drops_vanished_handles() {
        let (mut mine, previous) = pair();
        let (mut m, _) = decorate(&mine, &previous);
        mine.delete("1").unwrap();
        m.refresh(&mine);
        assert_eq!(m.block_mark("1"), BlockMark::None);
    }

    #[test]
    fn test_unknown_handles_ignored() {
        let mut state = DecorationState::for_workspace(&Workspace::new());
        state.set_block_mark(&BlockId::from("ghost"), BlockMark::Added);
        state.set_field_invalid(&BlockId::from("ghost"), "F", true);
        assert!(state.is_clean());
    }

    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
    }

    impl Decorations for Recorder {
        fn set_block_mark(&mut self, block: &BlockId, mark: BlockMark) {
            self.calls.push(format!("block {} {:?}", block, mark));
        }
        fn set_connection_highlight(&mut self, edge: &EdgeKey, highlighted: bool) {
            self.calls.push(format!("edge {} {}", edge, highlighted));
        }
        fn set_field_invalid(&mut self, block: &BlockId, field: &str, invalid: bool) {
            self.calls.push(format!("field {}.{} {}", block, field, invalid));
        }
        fn clear_invalid_fields(&mut self, block: &BlockId) {
            self.calls.push(format!("fields {} cleared", block));
        }
    }

    #[test]
    fn test_common_blocks_cleared_on_both_sides() {
        let (mine, previous) = pair();
        let diff = compute_diff(&mine, &previous);
        let mut m = Recorder::default();
        let mut p = Recorder::default();
        apply_highlights(&diff, &mut m, &mut p);
        assert!(m.calls.contains(&"block 3 None".to_string()));
        assert!(p.calls.contains(&"block 3 None".to_string()));
        assert!(m.calls.contains(&"field 2.NAME true".to_string()));
        assert!(!p.calls.iter().any(|c| c.starts_with("block 1 ")));
        assert!(m.calls.contains(&"fields 1 cleared".to_string()));
        assert!(p.calls.contains(&"fields 4 cleared".to_string()));
    }
}
