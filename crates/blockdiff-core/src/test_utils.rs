//! Test utilities for blockdiff

use std::fs;

use serde_json::{Value, json};
use tempfile::TempDir;

/// A program as the user last committed it.
pub fn previous_document() -> Value {
    json!({
        "blocks": {
            "languageVersion": 0,
            "blocks": [
                {
                    "type": "variables_set", "id": "init", "x": 20, "y": 20,
                    "fields": {"VAR": {"id": "count"}},
                    "inputs": {"VALUE": {"block": {"type": "math_number", "id": "zero", "fields": {"NUM": 0}}}},
                    "next": {"block": {
                        "type": "controls_repeat_ext", "id": "loop",
                        "inputs": {
                            "TIMES": {"block": {"type": "math_number", "id": "times", "fields": {"NUM": 10}}},
                            "DO": {"block": {"type": "text_print", "id": "say",
                                "inputs": {"TEXT": {"block": {"type": "text", "id": "msg", "fields": {"TEXT": "hello"}}}}}}
                        }
                    }}
                }
            ]
        },
        "variables": [{"name": "count", "id": "count"}]
    })
}

/// The same program after an edit: the loop runs 5 times, the greeting
/// changed, and a second print was appended inside the loop.
pub fn mine_document() -> Value {
    json!({
        "blocks": {
            "languageVersion": 0,
            "blocks": [
                {
                    "type": "variables_set", "id": "init", "x": 20, "y": 20,
                    "fields": {"VAR": {"id": "count"}},
                    "inputs": {"VALUE": {"block": {"type": "math_number", "id": "zero", "fields": {"NUM": 0}}}},
                    "next": {"block": {
                        "type": "controls_repeat_ext", "id": "loop",
                        "inputs": {
                            "TIMES": {"block": {"type": "math_number", "id": "times", "fields": {"NUM": 5}}},
                            "DO": {"block": {"type": "text_print", "id": "say",
                                "inputs": {"TEXT": {"block": {"type": "text", "id": "msg", "fields": {"TEXT": "hi"}}}},
                                "next": {"block": {"type": "text_print", "id": "say2",
                                    "inputs": {"TEXT": {"block": {"type": "text", "id": "msg2", "fields": {"TEXT": "bye"}}}}}}}}
                        }
                    }}
                }
            ]
        },
        "variables": [{"name": "count", "id": "count"}]
    })
}

/// A temporary project holding `mine.json` and `previous.json`.
pub fn create_test_project() -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    fs::write(
        root.join("mine.json"),
        serde_json::to_string_pretty(&mine_document()).unwrap(),
    )
    .unwrap();
    fs::write(
        root.join("previous.json"),
        serde_json::to_string_pretty(&previous_document()).unwrap(),
    )
    .unwrap();
    temp_dir
}
