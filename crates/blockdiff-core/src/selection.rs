//! Cross-view selection bridge

use tracing::debug;

use crate::model::BlockId;
use crate::view::{ViewState, Viewport};
use crate::workspace::Workspace;

/// What the bridge did to the other view.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgedSelection {
    pub block: BlockId,
    /// New viewport if the view had to scroll to reveal the block.
    pub scrolled: Option<Viewport>,
}

/// Mirror a selection into the other workspace: highlight the block with the
/// same id as the only member of the search group, make it current, and
/// scroll it into view. Returns `None` when the other side has no such block.
pub fn bridge_selection(
    selected: &str,
    other: &Workspace,
    view: &mut ViewState,
) -> Option<BridgedSelection> {
    let Some(block) = other.block(selected) else {
        debug!("Selected block {} has no counterpart", selected);
        return None;
    };

    view.search.clear();
    view.search.group.push(block.id.clone());
    view.search.current = Some(block.id.clone());

    let scrolled = if view.viewport.contains(block.position) {
        None
    } else {
        view.viewport = view.viewport.centered_on(block.position);
        Some(view.viewport)
    };

    Some(BridgedSelection {
        block: block.id.clone(),
        scrolled,
    })
}
