//! Session state and event dispatch
//!
//! A [`Session`] owns both workspaces and everything the event handlers
//! share: decorations, views, the scroll synchronizer and the latest diff.
//! Renderer notifications arrive as [`SessionEvent`]s; each dispatch returns
//! the [`SessionEffect`]s the renderer has to apply.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::catalog::Catalog;
use crate::diff::{DiffEngine, DiffResult};
use crate::error::SessionError;
use crate::highlight::{DecorationState, apply_highlights};
use crate::json;
use crate::model::{BlockId, Position, Side, Slot};
use crate::scroll::ScrollSync;
use crate::selection::bridge_selection;
use crate::serialization::Document;
use crate::view::{ViewState, Viewport};
use crate::workspace::Workspace;

/// Renderer notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SessionEvent {
    /// The user selected a block, or cleared the selection.
    SelectionChanged {
        side: Side,
        #[serde(rename = "newElementId", default)]
        new_element_id: Option<BlockId>,
    },
    /// A view scrolled or zoomed.
    ViewportChanged { side: Side, viewport: Viewport },
    /// The workspace content changed.
    BlockChanged { side: Side, change: BlockChange },
}

/// Workspace mutations carried by [`SessionEvent::BlockChanged`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum BlockChange {
    /// Replace the whole workspace with a native or mergeable document.
    Load { document: Value },
    Clear,
    SetField {
        #[serde(rename = "blockId")]
        block_id: BlockId,
        field: String,
        value: Value,
    },
    Move {
        #[serde(rename = "blockId")]
        block_id: BlockId,
        x: f64,
        y: f64,
    },
    Delete {
        #[serde(rename = "blockId")]
        block_id: BlockId,
    },
    /// Attach `target` under `slot` of the block; a null target detaches.
    Connect {
        #[serde(rename = "blockId")]
        block_id: BlockId,
        slot: Slot,
        #[serde(default)]
        target: Option<BlockId>,
    },
}

impl BlockChange {
    /// The `op` tag this change travels under.
    pub fn op(&self) -> &'static str {
        match self {
            BlockChange::Load { .. } => "load",
            BlockChange::Clear => "clear",
            BlockChange::SetField { .. } => "set-field",
            BlockChange::Move { .. } => "move",
            BlockChange::Delete { .. } => "delete",
            BlockChange::Connect { .. } => "connect",
        }
    }
}

/// What the renderer has to do after an event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SessionEffect {
    /// New diff and the resulting decoration of both views.
    Diff {
        diff: DiffResult,
        mine: DecorationState,
        previous: DecorationState,
    },
    Scroll { side: Side, top: f64 },
    SearchHighlight {
        side: Side,
        #[serde(rename = "blockId")]
        block_id: BlockId,
        viewport: Viewport,
    },
}

/// One side of the split view.
#[derive(Debug, Clone, Default)]
pub struct Pane {
    pub workspace: Workspace,
    /// Document keys carried through untouched (variables and such).
    pub extras: Map<String, Value>,
    pub decorations: DecorationState,
    pub view: ViewState,
}

impl Pane {
    pub fn new(document: Document) -> Self {
        Pane {
            decorations: DecorationState::for_workspace(&document.workspace),
            workspace: document.workspace,
            extras: document.extras,
            view: ViewState::default(),
        }
    }

    pub fn document(&self) -> Document {
        Document {
            workspace: self.workspace.clone(),
            extras: self.extras.clone(),
        }
    }
}

/// Serializable view of a pane for clients joining late.
#[derive(Debug, Clone, Serialize)]
pub struct PaneSnapshot {
    pub blocks: usize,
    pub decorations: DecorationState,
    pub view: ViewState,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub diff: DiffResult,
    pub mine: PaneSnapshot,
    pub previous: PaneSnapshot,
}

#[derive(Debug)]
pub struct Session {
    catalog: Catalog,
    mine: Pane,
    previous: Pane,
    scroll: ScrollSync,
    engine: DiffEngine,
    last_diff: DiffResult,
}

impl Session {
    /// Two empty workspaces.
    pub fn new(catalog: Catalog) -> Self {
        Self::with_documents(catalog, Document::default(), Document::default())
    }

    pub fn with_documents(catalog: Catalog, mine: Document, previous: Document) -> Self {
        let mut session = Session {
            catalog,
            mine: Pane::new(mine),
            previous: Pane::new(previous),
            scroll: ScrollSync::new(),
            engine: DiffEngine::new(),
            last_diff: DiffResult::default(),
        };
        session.refresh();
        session
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn pane(&self, side: Side) -> &Pane {
        match side {
            Side::Mine => &self.mine,
            Side::Previous => &self.previous,
        }
    }

    fn pane_mut(&mut self, side: Side) -> &mut Pane {
        match side {
            Side::Mine => &mut self.mine,
            Side::Previous => &mut self.previous,
        }
    }

    pub fn workspace(&self, side: Side) -> &Workspace {
        &self.pane(side).workspace
    }

    pub fn document(&self, side: Side) -> Document {
        self.pane(side).document()
    }

    pub fn last_diff(&self) -> &DiffResult {
        &self.last_diff
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let pane = |pane: &Pane| PaneSnapshot {
            blocks: pane.workspace.len(),
            decorations: pane.decorations.clone(),
            view: pane.view.clone(),
        };
        SessionSnapshot {
            diff: self.last_diff.clone(),
            mine: pane(&self.mine),
            previous: pane(&self.previous),
        }
    }

    /// Replace one side with an already parsed document.
    pub fn load(&mut self, side: Side, document: Document) -> SessionEffect {
        info!(
            "Loaded {} workspace: {} blocks",
            side,
            document.workspace.len()
        );
        let view = self.pane(side).view.clone();
        *self.pane_mut(side) = Pane {
            view,
            ..Pane::new(document)
        };
        self.refresh()
    }

    /// Handle one renderer event. On error the session is unchanged.
    pub fn dispatch(&mut self, event: SessionEvent) -> Result<Vec<SessionEffect>, SessionError> {
        match event {
            SessionEvent::SelectionChanged {
                side,
                new_element_id,
            } => Ok(self.on_selection_changed(side, new_element_id)),
            SessionEvent::ViewportChanged { side, viewport } => {
                Ok(self.on_viewport_changed(side, viewport))
            }
            SessionEvent::BlockChanged { side, change } => {
                self.apply_change(side, change)?;
                Ok(vec![self.refresh()])
            }
        }
    }

    fn on_selection_changed(&mut self, side: Side, selected: Option<BlockId>) -> Vec<SessionEffect> {
        let Some(selected) = selected else {
            return Vec::new();
        };
        let other = side.other();
        let pane = self.pane_mut(other);
        match bridge_selection(selected.as_str(), &pane.workspace, &mut pane.view) {
            Some(bridged) => vec![SessionEffect::SearchHighlight {
                side: other,
                block_id: bridged.block,
                viewport: pane.view.viewport,
            }],
            None => Vec::new(),
        }
    }

    fn on_viewport_changed(&mut self, side: Side, viewport: Viewport) -> Vec<SessionEffect> {
        self.pane_mut(side).view.viewport = viewport;
        let (source, target) = match side {
            Side::Mine => (&self.mine, &mut self.previous),
            Side::Previous => (&self.previous, &mut self.mine),
        };
        let command = self.scroll.on_viewport_changed(
            side,
            &source.workspace,
            &source.view.viewport,
            &target.workspace,
        );
        match command {
            Some(command) => {
                target.view.viewport = target.view.viewport.scrolled_to(command.top);
                vec![SessionEffect::Scroll {
                    side: command.side,
                    top: command.top,
                }]
            }
            None => Vec::new(),
        }
    }

    fn apply_change(&mut self, side: Side, change: BlockChange) -> Result<(), SessionError> {
        debug!("Applying {} to {}", change.op(), side);
        match change {
            BlockChange::Load { document } => {
                let loaded = Document::from_json(&document, &self.catalog);
                json::release(document);
                let document = loaded?;
                let pane = self.pane_mut(side);
                pane.workspace = document.workspace;
                pane.extras = document.extras;
            }
            BlockChange::Clear => {
                let pane = self.pane_mut(side);
                pane.workspace.clear();
                pane.extras.clear();
            }
            BlockChange::SetField {
                block_id,
                field,
                value,
            } => {
                self.pane_mut(side)
                    .workspace
                    .set_field(block_id.as_str(), &field, value)?;
            }
            BlockChange::Move { block_id, x, y } => {
                self.pane_mut(side)
                    .workspace
                    .move_block(block_id.as_str(), Position::new(x, y))?;
            }
            BlockChange::Delete { block_id } => {
                self.pane_mut(side).workspace.delete(block_id.as_str())?;
            }
            BlockChange::Connect {
                block_id,
                slot,
                target,
            } => {
                self.pane_mut(side).workspace.connect(
                    block_id.as_str(),
                    &slot,
                    target.as_ref().map(BlockId::as_str),
                )?;
            }
        }
        Ok(())
    }

    /// Recompute the diff and re-decorate both views.
    pub fn refresh(&mut self) -> SessionEffect {
        self.mine.decorations.refresh(&self.mine.workspace);
        self.previous.decorations.refresh(&self.previous.workspace);

        let diff = self
            .engine
            .compute_diff(&self.mine.workspace, &self.previous.workspace);
        apply_highlights(
            &diff,
            &mut self.mine.decorations,
            &mut self.previous.decorations,
        );
        debug!(
            "Diff #{}: +{} -{} ~{}",
            diff.sequence,
            diff.added.len(),
            diff.removed.len(),
            diff.changed_blocks().count()
        );
        self.last_diff = diff.clone();

        SessionEffect::Diff {
            diff,
            mine: self.mine.decorations.clone(),
            previous: self.previous.decorations.clone(),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(crate::catalog::builtin_or_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::highlight::BlockMark;
    use crate::model::Block;
    use serde_json::json;

    fn doc(blocks: Vec<Block>) -> Document {
        Document::new(Workspace::from_blocks(blocks).unwrap())
    }

    fn name_session() -> Session {
        Session::with_documents(
            Catalog::empty(),
            doc(vec![Block::new("b", "variables_set").with_field("NAME", json!("x"))]),
            doc(vec![Block::new("b", "variables_set").with_field("NAME", json!("y"))]),
        )
    }

    #[test]
    fn test_initial_diff_is_applied() {
        let session = name_session();
        assert_eq!(session.last_diff().sequence, 1);
        assert!(session.pane(Side::Mine).decorations.is_invalid("b", "NAME"));
        assert!(session.pane(Side::Previous).decorations.is_invalid("b", "NAME"));
    }

    #[test]
    fn test_default_session_uses_builtin_catalog() {
        let session = Session::default();
        assert!(session.catalog().shape("text_print").is_some());
        assert!(session.last_diff().is_identical());
    }

    #[test]
    fn test_set_field_resolves_difference() {
        let mut session = name_session();
        let effects = session
            .dispatch(SessionEvent::BlockChanged {
                side: Side::Mine,
                change: BlockChange::SetField {
                    block_id: BlockId::from("b"),
                    field: "NAME".into(),
                    value: json!("y"),
                },
            })
            .unwrap();
        assert_eq!(effects.len(), 1);
        assert!(!session.pane(Side::Mine).decorations.is_invalid("b", "NAME"));
        assert!(!session.pane(Side::Previous).decorations.is_invalid("b", "NAME"));
        assert_eq!(session.last_diff().sequence, 2);
        assert!(session.last_diff().is_identical());
    }

    #[test]
    fn test_deleting_common_block_clears_field_marks() {
        let mut session = name_session();
        assert!(session.pane(Side::Mine).decorations.is_invalid("b", "NAME"));

        session
            .dispatch(SessionEvent::BlockChanged {
                side: Side::Previous,
                change: BlockChange::Delete {
                    block_id: BlockId::from("b"),
                },
            })
            .unwrap();
        let mine = &session.pane(Side::Mine).decorations;
        assert_eq!(mine.block_mark("b"), BlockMark::Added);
        assert!(!mine.is_invalid("b", "NAME"));
        assert!(session.pane(Side::Previous).decorations.is_clean());
    }

    #[test]
    fn test_failed_change_leaves_state() {
        let mut session = name_session();
        let before = session.last_diff().clone();
        let result = session.dispatch(SessionEvent::BlockChanged {
            side: Side::Previous,
            change: BlockChange::Delete {
                block_id: BlockId::from("ghost"),
            },
        });
        assert!(matches!(result, Err(SessionError::Workspace(_))));

        let result = session.dispatch(SessionEvent::BlockChanged {
            side: Side::Previous,
            change: BlockChange::Load {
                document: json!("not a document"),
            },
        });
        assert!(matches!(result, Err(SessionError::Document(_))));
        assert_eq!(session.last_diff(), &before);
        assert_eq!(session.workspace(Side::Previous).len(), 1);
    }

    #[test]
    fn test_load_and_clear() {
        let mut session = Session::new(Catalog::builtin().unwrap());
        let document = json!({"blocks": {"blocks": [
            {"type": "text_print", "id": "p", "x": 0, "y": 0}
        ]}});
        session
            .dispatch(SessionEvent::BlockChanged {
                side: Side::Mine,
                change: BlockChange::Load { document },
            })
            .unwrap();
        assert_eq!(session.pane(Side::Mine).decorations.block_mark("p"), BlockMark::Added);

        session
            .dispatch(SessionEvent::BlockChanged {
                side: Side::Mine,
                change: BlockChange::Clear,
            })
            .unwrap();
        assert!(session.workspace(Side::Mine).is_empty());
        assert!(session.pane(Side::Mine).decorations.is_clean());
    }

    #[test]
    fn test_selection_bridges_to_other_side() {
        let mut session = name_session();
        let effects = session
            .dispatch(SessionEvent::SelectionChanged {
                side: Side::Mine,
                new_element_id: Some(BlockId::from("b")),
            })
            .unwrap();
        assert!(matches!(
            &effects[..],
            [SessionEffect::SearchHighlight { side: Side::Previous, block_id, .. }] if block_id.as_str() == "b"
        ));
        assert_eq!(
            session.pane(Side::Previous).view.search.current,
            Some(BlockId::from("b"))
        );

        let none = session
            .dispatch(SessionEvent::SelectionChanged {
                side: Side::Mine,
                new_element_id: None,
            })
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_scroll_echo_is_swallowed() {
        let mut session = Session::with_documents(
            Catalog::empty(),
            doc(vec![Block::new("a", "text_print").at(0.0, 120.0)]),
            doc(vec![Block::new("a", "text_print").at(0.0, 520.0)]),
        );
        let viewport = Viewport {
            top: 100.0,
            ..Viewport::default()
        };
        let effects = session
            .dispatch(SessionEvent::ViewportChanged {
                side: Side::Mine,
                viewport,
            })
            .unwrap();
        assert_eq!(
            effects,
            vec![SessionEffect::Scroll {
                side: Side::Previous,
                top: 500.0
            }]
        );
        assert_eq!(session.pane(Side::Previous).view.viewport.top, 500.0);

        // The renderer reports the scroll it was told to do.
        let echo = session
            .dispatch(SessionEvent::ViewportChanged {
                side: Side::Previous,
                viewport: viewport.scrolled_to(500.0),
            })
            .unwrap();
        assert!(echo.is_empty());
    }

    #[test]
    fn test_event_wire_format() {
        let event: SessionEvent = serde_json::from_value(json!({
            "type": "selection-changed",
            "side": "mine",
            "newElementId": "abc"
        }))
        .unwrap();
        assert_eq!(
            event,
            SessionEvent::SelectionChanged {
                side: Side::Mine,
                new_element_id: Some(BlockId::from("abc"))
            }
        );

        let event: SessionEvent = serde_json::from_value(json!({
            "type": "block-changed",
            "side": "previous",
            "change": {"op": "connect", "blockId": "a", "slot": "DO", "target": null}
        }))
        .unwrap();
        assert!(matches!(
            event,
            SessionEvent::BlockChanged {
                change: BlockChange::Connect { slot: Slot::Input(_), target: None, .. },
                ..
            }
        ));

        let effect = SessionEffect::Scroll {
            side: Side::Mine,
            top: 10.0,
        };
        insta::assert_json_snapshot!(effect, @r#"
        {
          "type": "scroll",
          "side": "mine",
          "top": 10.0
        }
        "#);
    }
}
