//! Scroll synchronization between the two views
//!
//! Scrolling one view scrolls the other so the same block sits at the same
//! height. The command this issues makes the other view report its own
//! viewport change; the synchronizer swallows exactly one such echo.

use serde::Serialize;
use tracing::debug;

use crate::model::{Block, Side};
use crate::view::Viewport;
use crate::workspace::Workspace;

/// Instruction for a view to set its vertical scroll offset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScrollCommand {
    pub side: Side,
    pub top: f64,
}

/// Echo-suppressing scroll synchronizer. Assumes two listeners and one echo
/// per issued command.
#[derive(Debug, Default)]
pub struct ScrollSync {
    echo_pending: bool,
}

impl ScrollSync {
    pub fn new() -> Self {
        ScrollSync::default()
    }

    pub fn echo_pending(&self) -> bool {
        self.echo_pending
    }

    /// Handle a viewport change reported by `source`.
    ///
    /// The flag stays set when no counterpart is found, so the next change
    /// from either side is swallowed.
    pub fn on_viewport_changed(
        &mut self,
        source: Side,
        source_workspace: &Workspace,
        source_view: &Viewport,
        target_workspace: &Workspace,
    ) -> Option<ScrollCommand> {
        if self.echo_pending {
            self.echo_pending = false;
            return None;
        }
        self.echo_pending = true;

        let anchor = topmost_visible(source_workspace, source_view)?;
        let Some(counterpart) = target_workspace.block(anchor.id.as_str()) else {
            debug!("Scroll anchor {} has no counterpart", anchor.id);
            return None;
        };

        let offset = anchor.position.y - source_view.top;
        Some(ScrollCommand {
            side: source.other(),
            top: counterpart.position.y - offset,
        })
    }
}

/// The block nearest the top edge of the viewport: smallest y at or below the
/// top, first in enumeration order among equals.
pub fn topmost_visible<'a>(workspace: &'a Workspace, view: &Viewport) -> Option<&'a Block> {
    workspace
        .blocks()
        .filter(|block| block.position.y >= view.top)
        .min_by(|a, b| a.position.y.total_cmp(&b.position.y))
}
