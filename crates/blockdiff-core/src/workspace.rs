//! Workspace arena using petgraph::StableDiGraph keyed by BlockId

use std::collections::{HashMap, HashSet};

use petgraph::Direction;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use tracing::debug;

use crate::error::WorkspaceError;
use crate::model::*;

/// A resolved connection between two blocks of the same workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub slot: Slot,
    pub kind: ConnectionKind,
}

/// The block workspace: blocks are nodes, attached connections are edges.
///
/// Blocks keep their connection targets as ids; the edges are rebuilt from
/// them after every mutation. Targets naming a block that is not in the
/// workspace stay on the block but get no edge.
#[derive(Clone)]
pub struct Workspace {
    inner: StableDiGraph<Block, Link>,
    index: HashMap<BlockId, NodeIndex>,
    /// Enumeration order of blocks (load/insertion order).
    order: Vec<NodeIndex>,
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("block_count", &self.inner.node_count())
            .field("link_count", &self.inner.edge_count())
            .finish()
    }
}

impl Workspace {
    pub fn new() -> Self {
        Workspace {
            inner: StableDiGraph::new(),
            index: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Build a workspace from a flat list of blocks.
    pub fn from_blocks(blocks: impl IntoIterator<Item = Block>) -> Result<Self, WorkspaceError> {
        let mut workspace = Workspace::new();
        for block in blocks {
            workspace.add_block(block)?;
        }
        workspace.relink();
        Ok(workspace)
    }

    fn add_block(&mut self, block: Block) -> Result<(), WorkspaceError> {
        if self.index.contains_key(&block.id) {
            return Err(WorkspaceError::DuplicateBlock(block.id));
        }
        let id = block.id.clone();
        let idx = self.inner.add_node(block);
        self.index.insert(id, idx);
        self.order.push(idx);
        Ok(())
    }

    /// Rebuild all edges from the blocks' connection targets.
    fn relink(&mut self) {
        self.inner.clear_edges();
        let mut links = Vec::new();
        for &source in &self.order {
            let Some(block) = self.inner.node_weight(source) else {
                continue;
            };
            for conn in block.connections() {
                let Some(target_id) = conn.connection.target.as_ref() else {
                    continue;
                };
                match self.index.get(target_id) {
                    Some(&target) => links.push((
                        source,
                        target,
                        Link {
                            slot: conn.slot(),
                            kind: conn.connection.kind,
                        },
                    )),
                    None => debug!(
                        "Dangling connection {} {} -> {}",
                        block.id,
                        conn.slot(),
                        target_id
                    ),
                }
            }
        }
        for (source, target, link) in links {
            self.inner.add_edge(source, target, link);
        }
    }

    /// Get a block by id.
    pub fn block(&self, id: &str) -> Option<&Block> {
        self.index
            .get(id)
            .and_then(|&idx| self.inner.node_weight(idx))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Total number of blocks.
    pub fn len(&self) -> usize {
        self.inner.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.node_count() == 0
    }

    /// Number of attached connections.
    pub fn link_count(&self) -> usize {
        self.inner.edge_count()
    }

    /// Iterate over all blocks in enumeration order.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.order
            .iter()
            .filter_map(move |&idx| self.inner.node_weight(idx))
    }

    /// Roots of the block trees: blocks no other block connects to.
    pub fn top_blocks(&self) -> impl Iterator<Item = &Block> {
        self.order
            .iter()
            .filter(move |&&idx| {
                self.inner
                    .edges_directed(idx, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .filter_map(move |&idx| self.inner.node_weight(idx))
    }

    /// The block holding a connection to `id`, with the slot it uses.
    pub fn parent(&self, id: &str) -> Option<(&Block, &Slot)> {
        let idx = *self.index.get(id)?;
        let edge = self.inner.edges_directed(idx, Direction::Incoming).next()?;
        let parent = self.inner.node_weight(edge.source())?;
        Some((parent, &edge.weight().slot))
    }

    /// Attached children of a block in slot order.
    pub fn children(&self, id: &str) -> Vec<(Slot, &Block)> {
        let Some(block) = self.block(id) else {
            return Vec::new();
        };
        block
            .connections()
            .filter_map(|conn| {
                let child = self.block(conn.connection.target.as_ref()?.as_str())?;
                Some((conn.slot(), child))
            })
            .collect()
    }

    /// All blocks reachable from `id` through attached connections, `id`
    /// first.
    pub fn subtree(&self, id: &str) -> Vec<BlockId> {
        let mut out = Vec::new();
        let Some(&start) = self.index.get(id) else {
            return out;
        };
        let mut seen = HashSet::new();
        let mut to_visit = vec![start];
        while let Some(current) = to_visit.pop() {
            if !seen.insert(current) {
                continue;
            }
            if let Some(block) = self.inner.node_weight(current) {
                out.push(block.id.clone());
            }
            let mut next: Vec<NodeIndex> = self
                .inner
                .edges_directed(current, Direction::Outgoing)
                .map(|e| e.target())
                .collect();
            next.reverse();
            to_visit.extend(next);
        }
        out
    }

    /// Replace a field value. Returns `true` when the value changed.
    pub fn set_field(
        &mut self,
        id: &str,
        field: &str,
        value: serde_json::Value,
    ) -> Result<bool, WorkspaceError> {
        let idx = self.node_index(id)?;
        let block = &mut self.inner[idx];
        let block_id = block.id.clone();
        let current = block
            .field_mut(field)
            .ok_or_else(|| WorkspaceError::UnknownField {
                block: block_id,
                field: field.to_string(),
            })?;
        if current.value == value {
            return Ok(false);
        }
        current.value = value;
        Ok(true)
    }

    /// Move a block to an absolute position.
    pub fn move_block(&mut self, id: &str, position: Position) -> Result<(), WorkspaceError> {
        let idx = self.node_index(id)?;
        self.inner[idx].position = position;
        Ok(())
    }

    /// Attach `target` to `slot` of `source`, or detach when `target` is
    /// `None`. A target already attached elsewhere is detached first.
    pub fn connect(
        &mut self,
        source: &str,
        slot: &Slot,
        target: Option<&str>,
    ) -> Result<(), WorkspaceError> {
        let source_idx = self.node_index(source)?;
        let source_id = self.inner[source_idx].id.clone();
        if self.inner[source_idx].connection(slot).is_none() {
            return Err(WorkspaceError::UnknownSlot {
                block: source_id,
                slot: slot.clone(),
            });
        }

        if let Some(target) = target {
            self.node_index(target)?;
            if self.subtree(target).iter().any(|id| id == &source_id) {
                return Err(WorkspaceError::Cycle {
                    source_block: source_id,
                    target: BlockId::from(target),
                });
            }
            self.detach(target);
        }

        if let Some(conn) = self.inner[source_idx].connection_mut(slot) {
            conn.target = target.map(BlockId::from);
        }
        self.relink();
        Ok(())
    }

    /// Delete a block together with every block attached beneath it. The
    /// parent's connection is left dangling. Returns the removed ids.
    pub fn delete(&mut self, id: &str) -> Result<Vec<BlockId>, WorkspaceError> {
        self.node_index(id)?;
        let parent = self
            .parent(id)
            .map(|(block, slot)| (block.id.clone(), slot.clone()));
        if let Some((parent_id, slot)) = parent {
            let parent_idx = self.node_index(parent_id.as_str())?;
            if let Some(conn) = self.inner[parent_idx].connection_mut(&slot) {
                conn.target = None;
            }
        }

        let removed = self.subtree(id);
        for block_id in &removed {
            if let Some(idx) = self.index.remove(block_id) {
                self.inner.remove_node(idx);
                self.order.retain(|&i| i != idx);
            }
        }
        self.relink();
        Ok(removed)
    }

    /// Clear every connection pointing at `target`; a block has at most one
    /// parent.
    fn detach(&mut self, target: &str) {
        for &idx in &self.order {
            let block = &mut self.inner[idx];
            let connections = block
                .inputs
                .iter_mut()
                .filter_map(|input| input.connection.as_mut())
                .chain(block.next.as_mut());
            for conn in connections {
                if conn.target.as_ref().map(BlockId::as_str) == Some(target) {
                    conn.target = None;
                }
            }
        }
    }

    /// Remove every block.
    pub fn clear(&mut self) {
        self.inner.clear();
        self.index.clear();
        self.order.clear();
    }

    fn node_index(&self, id: &str) -> Result<NodeIndex, WorkspaceError> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| WorkspaceError::UnknownBlock(BlockId::from(id)))
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stack() -> Workspace {
        Workspace::from_blocks(vec![
            Block::new("a", "controls_repeat")
                .with_statement("DO", Some("b"))
                .with_next(Some("c")),
            Block::new("b", "text_print").with_next(None),
            Block::new("c", "text_print")
                .with_field("TEXT", json!("hi"))
                .with_next(None),
            Block::new("d", "text_print").with_next(None),
        ])
        .unwrap()
    }

    #[test]
    fn test_top_blocks_and_links() {
        let ws = stack();
        assert_eq!(ws.len(), 4);
        assert_eq!(ws.link_count(), 2);
        let roots: Vec<&str> = ws.top_blocks().map(|b| b.id.as_str()).collect();
        assert_eq!(roots, vec!["a", "d"]);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let result = Workspace::from_blocks(vec![
            Block::new("a", "text_print"),
            Block::new("a", "text_print"),
        ]);
        assert_eq!(
            result.unwrap_err(),
            WorkspaceError::DuplicateBlock(BlockId::from("a"))
        );
    }

    #[test]
    fn test_dangling_target_has_no_link() {
        let ws = Workspace::from_blocks(vec![Block::new("a", "x").with_next(Some("ghost"))]).unwrap();
        assert_eq!(ws.link_count(), 0);
        assert!(!ws.contains("ghost"));
        assert_eq!(ws.top_blocks().count(), 1);
    }

    #[test]
    fn test_parent_and_children() {
        let ws = stack();
        let (parent, slot) = ws.parent("b").unwrap();
        assert_eq!(parent.id.as_str(), "a");
        assert_eq!(slot, &Slot::input("DO"));
        let children: Vec<(String, &str)> = ws
            .children("a")
            .into_iter()
            .map(|(slot, b)| (slot.to_string(), b.id.as_str()))
            .collect();
        assert_eq!(children, vec![("DO".to_string(), "b"), ("next".to_string(), "c")]);
    }

    #[test]
    fn test_connect_moves_child_and_rejects_cycles() {
        let mut ws = stack();
        ws.connect("d", &Slot::Next, Some("c")).unwrap();
        assert!(ws.block("a").unwrap().next.as_ref().unwrap().target.is_none());
        assert_eq!(ws.parent("c").unwrap().0.id.as_str(), "d");

        let err = ws.connect("b", &Slot::Next, Some("a")).unwrap_err();
        assert!(matches!(err, WorkspaceError::Cycle { .. }));

        let err = ws.connect("b", &Slot::input("NOPE"), None).unwrap_err();
        assert!(matches!(err, WorkspaceError::UnknownSlot { .. }));
    }

    #[test]
    fn test_delete_removes_subtree() {
        let mut ws = stack();
        let removed = ws.delete("a").unwrap();
        assert_eq!(removed.len(), 3);
        assert_eq!(ws.len(), 1);
        assert!(ws.contains("d"));
        assert_eq!(ws.link_count(), 0);
    }

    #[test]
    fn test_delete_child_detaches_parent() {
        let mut ws = stack();
        ws.delete("b").unwrap();
        assert!(ws
            .block("a")
            .unwrap()
            .connection(&Slot::input("DO"))
            .unwrap()
            .target
            .is_none());
    }

    #[test]
    fn test_set_field() {
        let mut ws = stack();
        assert!(ws.set_field("c", "TEXT", json!("bye")).unwrap());
        assert!(!ws.set_field("c", "TEXT", json!("bye")).unwrap());
        assert!(ws.set_field("c", "MISSING", json!(1)).is_err());
        assert!(ws.set_field("zzz", "TEXT", json!(1)).is_err());
    }
}
