//! Viewport and search-highlight state of one rendered workspace

use serde::{Deserialize, Serialize};

use crate::model::{BlockId, Position};

/// Visible rectangle in workspace coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Viewport {
            left: 0.0,
            top: 0.0,
            width: 800.0,
            height: 600.0,
        }
    }
}

impl Viewport {
    pub fn contains(&self, position: Position) -> bool {
        position.x >= self.left
            && position.x <= self.left + self.width
            && position.y >= self.top
            && position.y <= self.top + self.height
    }

    /// Same size, centred on `position`.
    pub fn centered_on(&self, position: Position) -> Viewport {
        Viewport {
            left: position.x - self.width / 2.0,
            top: position.y - self.height / 2.0,
            ..*self
        }
    }

    pub fn scrolled_to(&self, top: f64) -> Viewport {
        Viewport { top, ..*self }
    }
}

/// The renderer's search-style highlight group.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchHighlight {
    pub group: Vec<BlockId>,
    pub current: Option<BlockId>,
}

impl SearchHighlight {
    pub fn clear(&mut self) {
        self.group.clear();
        self.current = None;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ViewState {
    pub viewport: Viewport,
    pub search: SearchHighlight,
}
