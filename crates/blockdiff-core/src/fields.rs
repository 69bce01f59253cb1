//! Per-block field state capture and comparison

use std::collections::BTreeMap;

use crate::model::Block;

/// Field name → serialized value, serializable fields only.
pub type FieldState = BTreeMap<String, serde_json::Value>;

/// Field name → whether both sides hold deep-equal values.
pub type FieldVerdicts = BTreeMap<String, bool>;

/// Capture the serializable fields of a block, walking inputs then fields in
/// declaration order. A later field with a repeated name wins.
pub fn field_state(block: &Block) -> FieldState {
    block
        .fields()
        .filter(|field| field.serializable)
        .map(|field| (field.name.clone(), field.value.clone()))
        .collect()
}

/// Compare two captures. Verdicts are keyed by the names on the `mine` side;
/// a name missing from `previous` is unequal.
pub fn compare_fields(mine: &FieldState, previous: &FieldState) -> FieldVerdicts {
    mine.iter()
        .map(|(name, value)| {
            let equal = previous.get(name).is_some_and(|other| other == value);
            (name.clone(), equal)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Field;
    use serde_json::json;

    #[test]
    fn test_non_serializable_fields_skipped() {
        let block = Block::new("a", "text_print")
            .with_field_def(Field::label("LABEL", "print"))
            .with_field("TEXT", json!("hello"));
        let state = field_state(&block);
        assert_eq!(state.len(), 1);
        assert_eq!(state.get("TEXT"), Some(&json!("hello")));
    }

    #[test]
    fn test_deep_equality() {
        let mine: FieldState = [("VAR".to_string(), json!({"id": "v1", "name": "x"}))].into();
        let same: FieldState = [("VAR".to_string(), json!({"name": "x", "id": "v1"}))].into();
        let other: FieldState = [("VAR".to_string(), json!({"id": "v2", "name": "x"}))].into();
        assert_eq!(compare_fields(&mine, &same).get("VAR"), Some(&true));
        assert_eq!(compare_fields(&mine, &other).get("VAR"), Some(&false));
    }

    #[test]
    fn test_absent_field_is_unequal() {
        let mine: FieldState = [("NAME".to_string(), json!("x"))].into();
        let previous: FieldState = [("OTHER".to_string(), json!("x"))].into();
        let verdicts = compare_fields(&mine, &previous);
        assert_eq!(verdicts.get("NAME"), Some(&false));
        assert!(!verdicts.contains_key("OTHER"));
    }
}
