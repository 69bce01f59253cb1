//! Workspace documents in the editor's native JSON format
//!
//! ```json
//! {"blocks": {"languageVersion": 0, "blocks": [
//!   {"type": "controls_repeat", "id": "a", "x": 20, "y": 20,
//!    "fields": {"TIMES": 10},
//!    "inputs": {"DO": {"block": {"type": "text_print", "id": "b"}}},
//!    "next": {"block": {"type": "text_print", "id": "c"}}}
//! ]}}
//! ```
//!
//! Top-level keys other than `blocks` (variables, extensions) are carried
//! through untouched.

use std::collections::HashSet;

use serde_json::{Map, Value, json};
use tracing::debug;

use crate::catalog::Catalog;
use crate::error::DocumentError;
use crate::json;
use crate::mergeable;
use crate::model::{Block, BlockId, Connection, ConnectionKind, Field, Input, InputKind, Position};
use crate::tree::{Attach, Source, Visit, Walker};
use crate::workspace::Workspace;

/// Vertical distance between stacked blocks when a nested block carries no
/// position of its own.
pub const ROW_HEIGHT: f64 = 32.0;
/// Horizontal indent of blocks nested inside an input.
pub const INPUT_INDENT: f64 = 24.0;

/// A loaded workspace plus the document keys the core does not interpret.
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub workspace: Workspace,
    pub extras: Map<String, Value>,
}

impl Document {
    pub fn new(workspace: Workspace) -> Self {
        Document {
            workspace,
            extras: Map::new(),
        }
    }

    /// Parse a native or mergeable document. Stacks of any length load.
    pub fn parse(source: &str, catalog: &Catalog) -> Result<Self, DocumentError> {
        let value: Value = json::from_str(source)?;
        let document = Self::from_json(&value, catalog);
        json::release(value);
        document
    }

    /// Load a native or mergeable document.
    pub fn from_json(value: &Value, catalog: &Catalog) -> Result<Self, DocumentError> {
        let root = value
            .as_object()
            .ok_or_else(|| DocumentError::Malformed("document is not a JSON object".into()))?;

        let (visits, extras) = if mergeable::is_mergeable(value) {
            let (top_ids, fragments) = mergeable::sections(root)?;
            let visits = mergeable::walk_fragments(&top_ids, fragments, None)?;
            let extras = root
                .iter()
                .filter(|(key, _)| !matches!(key.as_str(), mergeable::MARKER | "top_blocks" | "blocks"))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            (visits, extras)
        } else {
            let mut walker = Walker::new(Source::Native);
            if let Some(section) = root.get("blocks") {
                let top = section
                    .get("blocks")
                    .and_then(Value::as_array)
                    .ok_or_else(|| DocumentError::Malformed("'blocks.blocks' is not an array".into()))?;
                for block in top {
                    walker.walk_value(block)?;
                }
            }
            let extras = root
                .iter()
                .filter(|(key, _)| key.as_str() != "blocks")
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            (walker.finish(), extras)
        };

        let blocks = load_blocks(&visits, catalog)?;
        let workspace = Workspace::from_blocks(blocks)?;
        debug!(
            "Loaded document: {} blocks, {} links",
            workspace.len(),
            workspace.link_count()
        );
        Ok(Document { workspace, extras })
    }

    /// Serialize to the native format.
    ///
    /// Fails with `Malformed` when a stack nests deeper than
    /// [`mergeable::MAX_NATIVE_DEPTH`]; [`Document::to_mergeable_json`]
    /// has no such limit.
    pub fn to_json(&self) -> Result<Value, DocumentError> {
        mergeable::to_native(self.to_mergeable_json())
    }

    /// Serialize to the mergeable format: one flat fragment per block.
    pub fn to_mergeable_json(&self) -> Value {
        let workspace = &self.workspace;
        let top_blocks: Vec<Value> = workspace.top_blocks().map(|b| json!(b.id)).collect();
        let top_level: HashSet<&BlockId> = workspace.top_blocks().map(|b| &b.id).collect();

        let fragments: Map<String, Value> = workspace
            .blocks()
            .map(|block| {
                let fragment = block_fragment(workspace, block, top_level.contains(&block.id));
                (block.id.to_string(), fragment)
            })
            .collect();

        let mut root = self.extras.clone();
        root.insert(mergeable::MARKER.to_string(), Value::Bool(true));
        root.insert("top_blocks".to_string(), Value::Array(top_blocks));
        root.insert("blocks".to_string(), Value::Object(fragments));
        Value::Object(root)
    }
}

/// Where a block's implicit position is measured from: the nearest block
/// above it (itself included) that carries `x`/`y`.
#[derive(Clone, Copy)]
struct Anchor {
    position: Position,
    /// Row of the anchoring block: how many blocks were loaded before it.
    row: usize,
    /// Inputs entered between the anchor and this block.
    indent: usize,
}

/// Build blocks from visits in parent-first order. A block without a stored
/// position sits one row below everything drawn before it in its stack, and
/// one indent right per input it is nested in.
fn load_blocks(visits: &[Visit<'_>], catalog: &Catalog) -> Result<Vec<Block>, DocumentError> {
    let mut blocks: Vec<Block> = Vec::with_capacity(visits.len());
    let mut anchors: Vec<Anchor> = Vec::with_capacity(visits.len());
    // Visits that stay out of the workspace, such as a shadow behind a block.
    let mut skipped = vec![false; visits.len()];
    // Visit index to position in `blocks`.
    let mut slots: Vec<usize> = vec![usize::MAX; visits.len()];

    for (index, visit) in visits.iter().enumerate() {
        let parent = match visit.parent {
            Some((parent, attach)) => {
                if skipped[parent] || !attach.is_connected(visits[parent].object) {
                    skipped[index] = true;
                    anchors.push(anchors[parent]);
                    continue;
                }
                Some((parent, attach))
            }
            None => None,
        };

        let mut block = block_from_json(visit.object, catalog)?;
        let row = blocks.len();
        let stored = match (
            visit.object.get("x").and_then(Value::as_f64),
            visit.object.get("y").and_then(Value::as_f64),
        ) {
            (Some(x), Some(y)) => Some(Position::new(x, y)),
            _ => None,
        };
        let inherited = match parent {
            Some((parent, attach)) => {
                let above = anchors[parent];
                Anchor {
                    indent: above.indent + usize::from(matches!(attach, Attach::Input { .. })),
                    ..above
                }
            }
            None => Anchor {
                position: Position::default(),
                row,
                indent: 0,
            },
        };
        let anchor = match stored {
            Some(position) => {
                block.position = position;
                Anchor {
                    position,
                    row,
                    indent: 0,
                }
            }
            None => {
                block.position = Position::new(
                    inherited.position.x + inherited.indent as f64 * INPUT_INDENT,
                    inherited.position.y + (row - inherited.row) as f64 * ROW_HEIGHT,
                );
                inherited
            }
        };
        anchors.push(anchor);

        if let Some((parent, attach)) = parent {
            let owner = &mut blocks[slots[parent]];
            match attach {
                Attach::Input { name, .. } => attach_input(owner, catalog, name, block.id.clone()),
                Attach::Next { .. } => {
                    owner.next = Some(Connection::new(ConnectionKind::NextStatement, Some(block.id.clone())))
                }
            }
        }
        slots[index] = blocks.len();
        blocks.push(block);
    }
    Ok(blocks)
}

fn block_from_json(object: &Map<String, Value>, catalog: &Catalog) -> Result<Block, DocumentError> {
    let block_type = object
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| DocumentError::Malformed("block without a 'type'".into()))?;
    let id = object
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| DocumentError::Malformed(format!("'{}' block without an 'id'", block_type)))?;

    let mut block = catalog.instantiate(id, block_type);
    if let Some(fields) = object.get("fields").and_then(Value::as_object) {
        for (name, value) in fields {
            match block.field_mut(name) {
                Some(field) => {
                    field.value = value.clone();
                    field.serializable = true;
                }
                None => block = block.with_field_def(Field::new(name.as_str(), value.clone())),
            }
        }
    }
    Ok(block)
}

fn attach_input(block: &mut Block, catalog: &Catalog, name: &str, child: BlockId) {
    if let Some(input) = block.inputs.iter_mut().find(|i| i.name == name) {
        if input.connection.is_none() {
            input.kind = InputKind::Value;
            input.connection = Some(Connection::new(ConnectionKind::Value, None));
        }
        if let Some(connection) = input.connection.as_mut() {
            connection.target = Some(child);
        }
        return;
    }

    let kind = catalog
        .input_kind(&block.block_type, name)
        .unwrap_or_else(|| {
            debug!("Assuming value input for {}.{}", block.block_type, name);
            InputKind::Value
        });
    let mut input = Input::new(name, kind);
    if let Some(connection) = input.connection.as_mut() {
        connection.target = Some(child);
    }
    block.inputs.push(input);
}

/// One block as a mergeable fragment; children are referenced by id.
fn block_fragment(workspace: &Workspace, block: &Block, top_level: bool) -> Value {
    let mut object = Map::new();
    object.insert("type".into(), json!(block.block_type));
    object.insert("id".into(), json!(block.id));
    if top_level {
        object.insert("x".into(), json!(block.position.x));
        object.insert("y".into(), json!(block.position.y));
    }

    let fields: Map<String, Value> = block
        .fields()
        .filter(|f| f.serializable && !f.value.is_null())
        .map(|f| (f.name.clone(), f.value.clone()))
        .collect();
    if !fields.is_empty() {
        object.insert("fields".into(), Value::Object(fields));
    }

    let attached = |target: Option<&BlockId>| {
        target
            .filter(|target| workspace.block(target.as_str()).is_some())
            .map(|target| json!({ "block": { "id": target } }))
    };

    let inputs: Map<String, Value> = block
        .inputs
        .iter()
        .filter_map(|input| {
            let target = input.connection.as_ref().and_then(|c| c.target.as_ref());
            attached(target).map(|slot| (input.name.clone(), slot))
        })
        .collect();
    if !inputs.is_empty() {
        object.insert("inputs".into(), Value::Object(inputs));
    }

    if let Some(next) = attached(block.next.as_ref().and_then(|c| c.target.as_ref())) {
        object.insert("next".into(), next);
    }

    Value::Object(object)
}
