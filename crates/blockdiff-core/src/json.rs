//! JSON entry points for documents of any nesting depth
//!
//! Native documents nest every stacked block inside the one above it, so a
//! long stack is a deeply nested JSON value. Parsing here lifts serde_json's
//! recursion limit and grows the stack on demand instead of overflowing it.
//! Deep values are taken apart iteratively with [`release`].

use serde::de::{Deserialize, DeserializeOwned};
use serde_json::Value;

/// Deepest value the crate will re-serialize or compare. Writing JSON still
/// recurses once per level.
pub const MAX_DEPTH: usize = 1_600;

/// Parse `source` without a recursion limit.
pub fn from_str<T: DeserializeOwned>(source: &str) -> Result<T, serde_json::Error> {
    let mut deserializer = serde_json::Deserializer::from_str(source);
    deserializer.disable_recursion_limit();
    let value = T::deserialize(serde_stacker::Deserializer::new(&mut deserializer))?;
    deserializer.end()?;
    Ok(value)
}

/// Nesting depth of `value`; scalars are depth 1.
pub fn depth(value: &Value) -> usize {
    let mut deepest = 0;
    let mut stack = vec![(value, 1)];
    while let Some((value, level)) = stack.pop() {
        deepest = deepest.max(level);
        match value {
            Value::Array(items) => stack.extend(items.iter().map(|item| (item, level + 1))),
            Value::Object(map) => stack.extend(map.values().map(|item| (item, level + 1))),
            _ => {}
        }
    }
    deepest
}

/// Drop `value` without recursing into it.
pub fn release(value: Value) {
    let mut stack = vec![value];
    while let Some(value) = stack.pop() {
        match value {
            Value::Array(items) => stack.extend(items),
            Value::Object(map) => stack.extend(map.into_iter().map(|(_, item)| item)),
            _ => {}
        }
    }
}

/// Fail unless `value` is shallow enough to write back out.
pub fn check_depth(value: &Value) -> Result<(), String> {
    let depth = depth(value);
    if depth > MAX_DEPTH {
        return Err(format!(
            "document nests {} levels deep; at most {} can be written as JSON",
            depth, MAX_DEPTH
        ));
    }
    Ok(())
}
