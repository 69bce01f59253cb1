//! Integration tests for blockdiff
//!
//! These tests verify that the CLI, server and watcher work together.

use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use blockdiff_core::{Catalog, Document, Session, Side};
use blockdiff_server::{ServerState, router::create_router};
use serde_json::{Value, json};
use tempfile::TempDir;

fn mine_doc() -> Value {
    json!({"blocks": {"languageVersion": 0, "blocks": [
        {"type": "controls_repeat_ext", "id": "loop", "x": 10, "y": 10,
         "inputs": {
            "TIMES": {"block": {"type": "math_number", "id": "n", "fields": {"NUM": 3}}},
            "DO": {"block": {"type": "text_print", "id": "p1",
                "next": {"block": {"type": "text_print", "id": "p2"}}}}
         }}
    ]}})
}

fn previous_doc() -> Value {
    json!({"blocks": {"languageVersion": 0, "blocks": [
        {"type": "controls_repeat_ext", "id": "loop", "x": 10, "y": 10,
         "inputs": {
            "TIMES": {"block": {"type": "math_number", "id": "n", "fields": {"NUM": 4}}},
            "DO": {"block": {"type": "text_print", "id": "p1"}}
         }}
    ]}})
}

fn write(dir: &Path, name: &str, value: &Value) -> String {
    let path = dir.join(name);
    std::fs::write(&path, value.to_string()).unwrap();
    path.to_string_lossy().to_string()
}

fn blockdiff(root: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_blockdiff"))
        .arg("--root")
        .arg(root)
        .args(args)
        .output()
        .expect("Failed to execute blockdiff")
}

/// Test that the CLI can be invoked
#[test]
fn test_cli_invocation() {
    let temp = TempDir::new().unwrap();
    let output = blockdiff(temp.path(), &["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Side-by-side diff of two block-editor workspaces"));
}

#[test]
fn test_cli_diff_report() {
    let temp = TempDir::new().unwrap();
    let mine = write(temp.path(), "mine.json", &mine_doc());
    let previous = write(temp.path(), "previous.json", &previous_doc());

    let output = blockdiff(temp.path(), &["diff", &mine, &previous]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("1 added, 0 removed, 1 changed"));
    assert!(stdout.contains("~ n.NUM"));
    assert!(stdout.contains("+ p1 next p2"));

    let output = blockdiff(temp.path(), &["diff", &mine, &previous, "--json"]);
    let diff: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(diff["added"], json!(["p2"]));
    assert_eq!(diff["fields"]["n"]["NUM"], json!(false));
}

/// Native stack of `len` print blocks, written as text so no step recurses
/// once per block.
fn native_stack_text(len: usize) -> String {
    let mut text = String::from(r#"{"blocks": {"languageVersion": 0, "blocks": ["#);
    for i in 0..len {
        if i > 0 {
            text.push_str(r#", "next": {"block": "#);
        }
        text.push_str(&format!(r#"{{"type": "text_print", "id": "b{}""#, i));
    }
    for i in 0..len {
        if i > 0 {
            text.push_str("}}");
        }
        text.push('}');
    }
    text.push_str("]}}");
    text
}

#[test]
fn test_cli_diff_long_stacks() {
    let temp = TempDir::new().unwrap();
    let mine = temp.path().join("mine.json");
    let previous = temp.path().join("previous.json");
    std::fs::write(&mine, native_stack_text(500)).unwrap();
    std::fs::write(&previous, native_stack_text(499)).unwrap();

    let output = blockdiff(
        temp.path(),
        &["diff", mine.to_str().unwrap(), previous.to_str().unwrap(), "--json"],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let diff: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(diff["added"], json!(["b499"]));
    assert_eq!(diff["removed"], json!([]));

    let flat = temp.path().join("flat.json");
    let output = blockdiff(
        temp.path(),
        &["convert", mine.to_str().unwrap(), "-o", flat.to_str().unwrap()],
    );
    assert!(output.status.success());
    let flat: Value = serde_json::from_str(&std::fs::read_to_string(flat).unwrap()).unwrap();
    assert_eq!(flat["blocks"].as_object().unwrap().len(), 500);
}

#[test]
fn test_cli_diff_rejects_bad_document() {
    let temp = TempDir::new().unwrap();
    let mine = write(temp.path(), "mine.json", &json!([1, 2, 3]));
    let previous = write(temp.path(), "previous.json", &previous_doc());
    let output = blockdiff(temp.path(), &["diff", &mine, &previous]);
    assert!(!output.status.success());
}

#[test]
fn test_cli_convert_roundtrip() {
    let temp = TempDir::new().unwrap();
    let input = write(temp.path(), "mine.json", &mine_doc());
    let flat = temp.path().join("flat.json");
    let back = temp.path().join("back.json");

    let output = blockdiff(temp.path(), &["convert", &input, "-o", flat.to_str().unwrap()]);
    assert!(output.status.success());
    let output = blockdiff(
        temp.path(),
        &["convert", flat.to_str().unwrap(), "--to", "native", "-o", back.to_str().unwrap()],
    );
    assert!(output.status.success());

    let restored: Value = serde_json::from_str(&std::fs::read_to_string(back).unwrap()).unwrap();
    assert_eq!(restored, mine_doc());
}

#[test]
fn test_cli_clear() {
    let temp = TempDir::new().unwrap();
    std::fs::create_dir_all(temp.path().join(".blockdiff/shares")).unwrap();
    let output = blockdiff(temp.path(), &["clear"]);
    assert!(output.status.success());
    assert!(!temp.path().join(".blockdiff").exists());
}

/// Start the router on an ephemeral port and exercise the HTTP API.
#[tokio::test]
async fn test_server_api() {
    let catalog = Catalog::builtin().unwrap();
    let mine = Document::from_json(&mine_doc(), &catalog).unwrap();
    let previous = Document::from_json(&previous_doc(), &catalog).unwrap();
    let state = Arc::new(ServerState::new(Session::with_documents(catalog, mine, previous)));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let app = create_router(Arc::clone(&state));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    let base = format!("http://{}", address);
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("{}/api/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");

    let diff: Value = client
        .get(format!("{}/api/diff", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(diff["summary"]["added"], 1);

    // Bring previous in line with mine.
    let response = client
        .put(format!("{}/api/workspace/previous", base))
        .json(&mine_doc())
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    assert!(state.session.read().await.last_diff().is_identical());

    let share: Value = client
        .post(format!("{}/api/share", base))
        .json(&json!({"mine": mine_doc(), "previous": previous_doc()}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let key = share["key"].as_str().unwrap();
    let stored: Value = client
        .get(format!("{}/api/share/{}", base, key))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stored["previous"], previous_doc());

    let missing = client
        .post(format!("{}/api/save/mine", base))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status().as_u16(), 404);
}

/// Test that a watcher reload flows into the session.
#[tokio::test]
async fn test_watcher_reload_updates_session() {
    use blockdiff_watcher::WatcherService;

    let temp = TempDir::new().unwrap();
    let mine_path = write(temp.path(), "mine.json", &mine_doc());
    let catalog = Catalog::builtin().unwrap();
    let previous = Document::from_json(&previous_doc(), &catalog).unwrap();
    let state = ServerState::new(Session::with_documents(
        catalog.clone(),
        Document::default(),
        previous,
    ));

    let mut watcher = WatcherService::new(catalog);
    watcher.track(Side::Mine, Path::new(&mine_path)).unwrap();
    let (side, document) = watcher.reload(Path::new(&mine_path)).unwrap();
    state.load(side, document).await;

    let session = state.session.read().await;
    assert_eq!(session.workspace(Side::Mine).len(), 4);
    assert_eq!(session.last_diff().summary().added, 1);
}
