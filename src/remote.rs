//! Documents from the filesystem or over HTTP

use anyhow::{Context, Result};
use blockdiff_core::json;
use serde_json::Value;

pub fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Read a JSON document from a file path or an http(s) URL. One attempt,
/// no retry. Documents of any nesting depth are accepted.
pub async fn fetch_json(source: &str) -> Result<Value> {
    let text = if is_url(source) {
        tracing::debug!("Fetching {}", source);
        reqwest::get(source)
            .await
            .with_context(|| format!("Failed to fetch {}", source))?
            .error_for_status()
            .with_context(|| format!("Server refused {}", source))?
            .text()
            .await
            .with_context(|| format!("Failed to read response from {}", source))?
    } else {
        tokio::fs::read_to_string(source)
            .await
            .with_context(|| format!("Failed to read {}", source))?
    };
    json::from_str(&text).with_context(|| format!("{} is not valid JSON", source))
}

/// Store a document pair on a running server; returns the share key.
pub async fn upload_share(server: &str, mine: Value, previous: Value) -> Result<String> {
    let url = format!("{}/api/share", server.trim_end_matches('/'));
    let mut body = serde_json::Map::new();
    body.insert("mine".into(), mine);
    body.insert("previous".into(), previous);
    let response = reqwest::Client::new()
        .post(&url)
        .json(&body)
        .send()
        .await
        .with_context(|| format!("Failed to reach {}", url))?;

    let status = response.status();
    let body: Value = response.json().await.context("Share response is not JSON")?;
    if !status.is_success() {
        let message = body["error"].as_str().unwrap_or("unknown error");
        anyhow::bail!("Share rejected ({}): {}", status, message);
    }
    body["key"]
        .as_str()
        .map(str::to_string)
        .context("Share response has no key")
}
