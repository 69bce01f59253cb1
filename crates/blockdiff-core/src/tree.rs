//! Parent-first traversal of nested block JSON
//!
//! Both document formats describe a forest of blocks: native documents nest
//! child objects inline, mergeable documents point at flat fragments by id.
//! [`Walker`] visits either form with an explicit stack, so stack depth on
//! the Rust side does not grow with the depth of the block tree.

use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::error::DocumentError;
use crate::model::BlockId;

/// Keys inside an input or `next` object that can hold a block.
pub const NESTED_KEYS: [&str; 2] = ["block", "shadow"];

/// Where child blocks come from.
#[derive(Clone, Copy)]
pub enum Source<'a> {
    /// Children are nested inline.
    Native,
    /// Children are `{"id": ...}` references into these fragments.
    Fragments(&'a Map<String, Value>),
}

/// How a child hangs off its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attach<'a> {
    Input { name: &'a str, key: &'static str },
    Next { key: &'static str },
}

impl Attach<'_> {
    /// Whether the editor connects this child: an input's block, or its
    /// shadow when the input has no block, and `next.block`. Other nested
    /// blocks are carried by the converters but not loaded.
    pub fn is_connected(&self, parent: &Map<String, Value>) -> bool {
        match *self {
            Attach::Input { key: "block", .. } | Attach::Next { key: "block" } => true,
            Attach::Input { name, .. } => parent
                .get("inputs")
                .and_then(|inputs| inputs.get(name))
                .and_then(|input| input.get("block"))
                .is_none(),
            Attach::Next { .. } => false,
        }
    }
}

#[derive(Debug)]
pub struct Visit<'a> {
    pub id: &'a str,
    pub object: &'a Map<String, Value>,
    /// Index of the parent visit and the slot this block sits in.
    pub parent: Option<(usize, Attach<'a>)>,
    /// 1 for top blocks.
    pub depth: usize,
}

enum Step<'a> {
    Enter {
        id: &'a str,
        object: &'a Map<String, Value>,
        parent: Option<(usize, Attach<'a>)>,
        depth: usize,
    },
    Leave(&'a str),
}

pub struct Walker<'a> {
    source: Source<'a>,
    max_depth: Option<usize>,
    visits: Vec<Visit<'a>>,
    placed: HashSet<&'a str>,
    path: HashSet<&'a str>,
}

impl<'a> Walker<'a> {
    pub fn new(source: Source<'a>) -> Self {
        Walker {
            source,
            max_depth: None,
            visits: Vec::new(),
            placed: HashSet::new(),
            path: HashSet::new(),
        }
    }

    /// Fail with `Malformed` once a block sits deeper than `max_depth`.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    /// Walk a top-level block of a native document.
    pub fn walk_value(&mut self, value: &'a Value) -> Result<(), DocumentError> {
        let (id, object) = native_block(value)?;
        self.run(id, object)
    }

    /// Walk the fragment stored under `id`.
    pub fn walk_fragment(&mut self, id: &'a str) -> Result<(), DocumentError> {
        let object = self.fragment(id)?;
        self.run(id, object)
    }

    /// Whether a fragment has already been reached.
    pub fn is_placed(&self, id: &str) -> bool {
        self.placed.contains(id)
    }

    pub fn finish(self) -> Vec<Visit<'a>> {
        self.visits
    }

    fn fragment(&self, id: &'a str) -> Result<&'a Map<String, Value>, DocumentError> {
        let Source::Fragments(fragments) = self.source else {
            return Err(DocumentError::Malformed(format!(
                "block '{}' is referenced by id in a nested document",
                id
            )));
        };
        fragments
            .get(id)
            .and_then(Value::as_object)
            .ok_or_else(|| DocumentError::UnknownReference(BlockId::from(id)))
    }

    fn run(&mut self, id: &'a str, object: &'a Map<String, Value>) -> Result<(), DocumentError> {
        let mut stack = vec![Step::Enter {
            id,
            object,
            parent: None,
            depth: 1,
        }];

        while let Some(step) = stack.pop() {
            let (id, object, parent, depth) = match step {
                Step::Leave(id) => {
                    self.path.remove(id);
                    continue;
                }
                Step::Enter {
                    id,
                    object,
                    parent,
                    depth,
                } => (id, object, parent, depth),
            };

            if let Source::Fragments(_) = self.source {
                if self.path.contains(id) {
                    return Err(DocumentError::Malformed(format!(
                        "block '{}' is nested inside itself",
                        id
                    )));
                }
                if !self.placed.insert(id) {
                    return Err(DocumentError::DuplicateFragment(BlockId::from(id)));
                }
            }
            if let Some(max_depth) = self.max_depth {
                if depth > max_depth {
                    return Err(DocumentError::Malformed(format!(
                        "blocks nested more than {} deep under '{}'",
                        max_depth, id
                    )));
                }
            }

            let index = self.visits.len();
            self.visits.push(Visit {
                id,
                object,
                parent,
                depth,
            });
            self.path.insert(id);
            stack.push(Step::Leave(id));

            let children = children(object);
            for (attach, value) in children.into_iter().rev() {
                if let Some((child_id, child)) = self.resolve(value)? {
                    stack.push(Step::Enter {
                        id: child_id,
                        object: child,
                        parent: Some((index, attach)),
                        depth: depth + 1,
                    });
                }
            }
        }
        Ok(())
    }

    fn resolve(
        &self,
        value: &'a Value,
    ) -> Result<Option<(&'a str, &'a Map<String, Value>)>, DocumentError> {
        match self.source {
            Source::Native => native_block(value).map(Some),
            Source::Fragments(_) => match value.get("id").and_then(Value::as_str) {
                Some(id) => Ok(Some((id, self.fragment(id)?))),
                None => Ok(None),
            },
        }
    }
}

fn native_block(value: &Value) -> Result<(&str, &Map<String, Value>), DocumentError> {
    let object = value
        .as_object()
        .ok_or_else(|| DocumentError::Malformed("block is not a JSON object".into()))?;
    let id = object
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| DocumentError::Malformed("block without an 'id'".into()))?;
    Ok((id, object))
}

/// Child values of `object`, inputs in key order then `next`.
fn children(object: &Map<String, Value>) -> Vec<(Attach<'_>, &Value)> {
    let mut out = Vec::new();
    if let Some(inputs) = object.get("inputs").and_then(Value::as_object) {
        for (name, input) in inputs {
            for key in NESTED_KEYS {
                if let Some(child) = input.get(key) {
                    out.push((
                        Attach::Input {
                            name: name.as_str(),
                            key,
                        },
                        child,
                    ));
                }
            }
        }
    }
    if let Some(next) = object.get("next") {
        for key in NESTED_KEYS {
            if let Some(child) = next.get(key) {
                out.push((Attach::Next { key }, child));
            }
        }
    }
    out
}

/// Copy `object` without descending into its children: every nested child
/// slot is filled by `child`, or copied as is when `child` returns `None`.
pub fn copy_shallow(
    object: &Map<String, Value>,
    mut child: impl FnMut(Attach<'_>) -> Option<Value>,
) -> Map<String, Value> {
    let mut out = Map::new();
    for (key, value) in object {
        let copied = match (key.as_str(), value) {
            ("inputs", Value::Object(inputs)) => {
                let mut copied = Map::new();
                for (name, input) in inputs {
                    let input = match input {
                        Value::Object(slot) => Value::Object(copy_slot(slot, |key| {
                            child(Attach::Input {
                                name: name.as_str(),
                                key,
                            })
                        })),
                        other => other.clone(),
                    };
                    copied.insert(name.clone(), input);
                }
                Value::Object(copied)
            }
            ("next", Value::Object(slot)) => {
                Value::Object(copy_slot(slot, |key| child(Attach::Next { key })))
            }
            _ => value.clone(),
        };
        out.insert(key.clone(), copied);
    }
    out
}

fn copy_slot(
    slot: &Map<String, Value>,
    mut child: impl FnMut(&'static str) -> Option<Value>,
) -> Map<String, Value> {
    let mut out = Map::new();
    for (key, value) in slot {
        let nested = NESTED_KEYS.iter().find(|nested| **nested == key.as_str());
        let copied = match nested {
            Some(nested) => child(*nested).unwrap_or_else(|| value.clone()),
            None => value.clone(),
        };
        out.insert(key.clone(), copied);
    }
    out
}
