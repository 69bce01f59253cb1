//! Mergeable document format
//!
//! The native format nests every attached block inside its parent, so two
//! edits to one stack touch the same deeply indented region of the file. The
//! mergeable format stores each block as a flat fragment keyed by id and
//! refers to children by id only:
//!
//! ```json
//! {"mergeable": true,
//!  "top_blocks": ["a"],
//!  "blocks": {
//!    "a": {"type": "controls_repeat", "id": "a", "x": 20, "y": 20,
//!          "inputs": {"DO": {"block": {"id": "b"}}}},
//!    "b": {"type": "text_print", "id": "b"}}}
//! ```

use std::collections::HashMap;

use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::error::DocumentError;
use crate::json;
use crate::model::BlockId;
use crate::tree::{Attach, Source, Visit, Walker, copy_shallow};

pub const MARKER: &str = "mergeable";

/// Deepest block nesting written in the native format. Past this a stack
/// only round-trips through the mergeable format.
pub const MAX_NATIVE_DEPTH: usize = 512;

pub fn is_mergeable(document: &Value) -> bool {
    document.get(MARKER).and_then(Value::as_bool).unwrap_or(false)
}

/// Flatten a native document. Already-mergeable documents are returned as is.
pub fn to_mergeable(document: Value) -> Result<Value, DocumentError> {
    if is_mergeable(&document) {
        return Ok(document);
    }
    let flat = flatten(&document);
    json::release(document);
    flat
}

fn flatten(document: &Value) -> Result<Value, DocumentError> {
    let root = document
        .as_object()
        .ok_or_else(|| DocumentError::Malformed("document is not a JSON object".into()))?;

    let mut top_blocks = Vec::new();
    let mut walker = Walker::new(Source::Native);
    if let Some(top) = root
        .get("blocks")
        .and_then(|section| section.get("blocks"))
        .and_then(Value::as_array)
    {
        for block in top {
            walker.walk_value(block)?;
        }
    }
    let visits = walker.finish();

    let mut references: HashMap<usize, Vec<(Attach<'_>, &str)>> = HashMap::new();
    for visit in &visits {
        match visit.parent {
            Some((parent, attach)) => references.entry(parent).or_default().push((attach, visit.id)),
            None => top_blocks.push(json!(visit.id)),
        }
    }

    let mut fragments = Map::new();
    for (index, visit) in visits.iter().enumerate() {
        if fragments.contains_key(visit.id) {
            return Err(DocumentError::DuplicateFragment(BlockId::from(visit.id)));
        }
        let children = references.remove(&index).unwrap_or_default();
        let fragment = copy_shallow(visit.object, |attach| {
            children
                .iter()
                .find(|(slot, _)| *slot == attach)
                .map(|(_, id)| json!({ "id": id }))
        });
        fragments.insert(visit.id.to_string(), Value::Object(fragment));
    }

    let mut out: Map<String, Value> = root
        .iter()
        .filter(|(key, _)| key.as_str() != "blocks")
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    out.insert(MARKER.to_string(), Value::Bool(true));
    out.insert("top_blocks".to_string(), Value::Array(top_blocks));
    out.insert("blocks".to_string(), Value::Object(fragments));
    debug!("Flattened document into {} fragments", fragment_count(&out));
    Ok(Value::Object(out))
}

/// Top block ids and fragments of a mergeable document.
pub(crate) fn sections(root: &Map<String, Value>) -> Result<(Vec<&str>, &Map<String, Value>), DocumentError> {
    let fragments = root
        .get("blocks")
        .and_then(Value::as_object)
        .ok_or_else(|| DocumentError::Malformed("'blocks' is not an object".into()))?;
    let top_ids = match root.get("top_blocks") {
        Some(Value::Array(ids)) => ids
            .iter()
            .map(|id| {
                id.as_str()
                    .ok_or_else(|| DocumentError::Malformed("non-string id in 'top_blocks'".into()))
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => return Err(DocumentError::Malformed("'top_blocks' is not an array".into())),
        None => Vec::new(),
    };
    Ok((top_ids, fragments))
}

/// Walk every fragment parent first, starting from `top_blocks`. Fragments
/// not reachable from them are walked afterwards as extra top blocks rather
/// than dropped.
pub(crate) fn walk_fragments<'a>(
    top_ids: &[&'a str],
    fragments: &'a Map<String, Value>,
    max_depth: Option<usize>,
) -> Result<Vec<Visit<'a>>, DocumentError> {
    let mut walker = Walker::new(Source::Fragments(fragments));
    if let Some(max_depth) = max_depth {
        walker = walker.with_max_depth(max_depth);
    }
    for &id in top_ids {
        walker.walk_fragment(id)?;
    }
    for id in fragments.keys() {
        if !walker.is_placed(id) {
            warn!("Fragment {} is not reachable from any top block", id);
            walker.walk_fragment(id)?;
        }
    }
    Ok(walker.finish())
}

/// Re-nest a mergeable document. Native documents are returned as is.
///
/// Fails with `Malformed` when blocks nest deeper than [`MAX_NATIVE_DEPTH`].
pub fn to_native(document: Value) -> Result<Value, DocumentError> {
    if !is_mergeable(&document) {
        return Ok(document);
    }
    let root = document
        .as_object()
        .ok_or_else(|| DocumentError::Malformed("document is not a JSON object".into()))?;
    let (top_ids, fragments) = sections(root)?;
    let visits = walk_fragments(&top_ids, fragments, Some(MAX_NATIVE_DEPTH))?;

    // Children are visited after their parent, so building in reverse
    // finishes every child before the parent that embeds it.
    let mut built: HashMap<usize, Vec<(Attach<'_>, Value)>> = HashMap::new();
    let mut top = Vec::new();
    for (index, visit) in visits.iter().enumerate().rev() {
        let mut children = built.remove(&index).unwrap_or_default();
        let block = copy_shallow(visit.object, |attach| {
            let position = children.iter().position(|(slot, _)| *slot == attach)?;
            Some(children.swap_remove(position).1)
        });
        match visit.parent {
            Some((parent, attach)) => built
                .entry(parent)
                .or_default()
                .push((attach, Value::Object(block))),
            None => top.push(Value::Object(block)),
        }
    }
    top.reverse();

    let mut out: Map<String, Value> = root
        .iter()
        .filter(|(key, _)| !matches!(key.as_str(), MARKER | "top_blocks" | "blocks"))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    if !top.is_empty() {
        out.insert("blocks".to_string(), blocks_section(top));
    }
    Ok(Value::Object(out))
}

/// `{"languageVersion": 0, "blocks": top}`, built without copying `top`.
fn blocks_section(top: Vec<Value>) -> Value {
    let mut section = Map::new();
    section.insert("languageVersion".to_string(), json!(0));
    section.insert("blocks".to_string(), Value::Array(top));
    Value::Object(section)
}

fn fragment_count(document: &Map<String, Value>) -> usize {
    document
        .get("blocks")
        .and_then(Value::as_object)
        .map_or(0, Map::len)
}
