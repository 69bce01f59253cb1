//! CLI command implementations

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use blockdiff_core::{Catalog, Config, DiffResult, Document, Side, Storage, compute_diff, json, mergeable};
use blockdiff_server::{BlockdiffServer, ServerConfig, ServerState, WorkspaceFiles};
use blockdiff_watcher::WatcherService;
use clap::ValueEnum;

use crate::remote;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Native,
    Mergeable,
}

pub struct ServeOptions {
    pub mine: PathBuf,
    pub previous: PathBuf,
    pub host: String,
    pub port: u16,
    pub open: bool,
    pub mergeable: bool,
}

pub fn load_config(root: &Path, explicit: Option<&Path>) -> anyhow::Result<Config> {
    Config::discover(root, explicit).context("Failed to load configuration")
}

fn load_catalog(root: &Path, config: &Config) -> anyhow::Result<Catalog> {
    let path = config.catalog_path(root);
    Catalog::with_overrides(path.as_deref()).context("Failed to load block catalog")
}

async fn load_document(source: &str, catalog: &Catalog) -> anyhow::Result<Document> {
    let value = remote::fetch_json(source).await?;
    let document = Document::from_json(&value, catalog);
    json::release(value);
    document.with_context(|| format!("Invalid workspace document {}", source))
}

pub async fn diff(
    root: &Path,
    config: &Config,
    mine: &str,
    previous: &str,
    json: bool,
) -> anyhow::Result<()> {
    let catalog = load_catalog(root, config)?;
    let (mine_doc, previous_doc) = tokio::try_join!(
        load_document(mine, &catalog),
        load_document(previous, &catalog)
    )?;
    let result = compute_diff(&mine_doc.workspace, &previous_doc.workspace);

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", render_diff(&result));
    }
    Ok(())
}

/// Human-readable diff report.
pub fn render_diff(diff: &DiffResult) -> String {
    let summary = diff.summary();
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} added, {} removed, {} changed, {} unchanged blocks",
        summary.added,
        summary.removed,
        summary.changed,
        summary.common - summary.changed
    );
    for id in &diff.added {
        let _ = writeln!(out, "+ {}", id);
    }
    for id in &diff.removed {
        let _ = writeln!(out, "- {}", id);
    }
    for (id, verdicts) in &diff.fields {
        for (field, equal) in verdicts {
            if !equal {
                let _ = writeln!(out, "~ {}.{}", id, field);
            }
        }
    }
    for edge in &diff.edges_added {
        let _ = writeln!(out, "+ {}", edge);
    }
    for edge in &diff.edges_removed {
        let _ = writeln!(out, "- {}", edge);
    }
    if diff.is_identical() {
        out.push_str("Workspaces are identical\n");
    }
    out
}

pub async fn convert(input: &str, to: Format, output: Option<PathBuf>) -> anyhow::Result<()> {
    let value = remote::fetch_json(input).await?;
    let converted = match to {
        Format::Mergeable => mergeable::to_mergeable(value),
        Format::Native => mergeable::to_native(value),
    }
    .with_context(|| format!("Failed to convert {}", input))?;
    if let Err(e) = json::check_depth(&converted) {
        json::release(converted);
        anyhow::bail!("Cannot write {}: {}", input, e);
    }

    let text = serde_json::to_string_pretty(&converted)?;
    match output {
        Some(path) => {
            std::fs::write(&path, text).with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::info!("Wrote {}", path.display());
        }
        None => println!("{}", text),
    }
    Ok(())
}

pub async fn serve(root: PathBuf, config: Config, options: ServeOptions) -> anyhow::Result<()> {
    let catalog = load_catalog(&root, &config)?;
    let mine_source = read_source(&options.mine)?;
    let previous_source = read_source(&options.previous)?;
    let mine = Document::parse(&mine_source, &catalog)
        .with_context(|| format!("Invalid workspace document {}", options.mine.display()))?;
    let previous = Document::parse(&previous_source, &catalog)
        .with_context(|| format!("Invalid workspace document {}", options.previous.display()))?;

    let session = blockdiff_core::Session::with_documents(catalog.clone(), mine, previous);
    tracing::info!("{}", render_diff(session.last_diff()).lines().next().unwrap_or_default());

    let storage = Storage::new(&root, &config.storage.dir);
    let state = ServerState::new(session)
        .with_storage(storage)
        .with_files(WorkspaceFiles {
            mine: Some(options.mine.clone()),
            previous: Some(options.previous.clone()),
            mergeable: options.mergeable,
        });
    let server = BlockdiffServer::new(
        state,
        ServerConfig {
            host: options.host.clone(),
            port: options.port,
        },
    );

    let mut watcher = WatcherService::new(catalog);
    watcher.track(Side::Mine, &options.mine)?;
    watcher.track(Side::Previous, &options.previous)?;
    watcher.mark_loaded(Side::Mine, &mine_source);
    watcher.mark_loaded(Side::Previous, &previous_source);

    let watcher_state = server.state();
    tokio::spawn(async move {
        let result = watcher
            .run(|side, document| {
                let state = Arc::clone(&watcher_state);
                async move {
                    state.load(side, document).await;
                }
            })
            .await;
        if let Err(e) = result {
            tracing::error!("File watcher error: {}", e);
        }
    });

    if options.open {
        let url = format!("http://{}/api/state", server.address());
        if let Err(e) = open::that(&url) {
            tracing::warn!("Failed to open browser: {}", e);
        }
    }

    server.start().await
}

fn read_source(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

pub async fn share(mine: &str, previous: &str, server: &str) -> anyhow::Result<()> {
    let (mine_json, previous_json) =
        tokio::try_join!(remote::fetch_json(mine), remote::fetch_json(previous))?;
    for (source, document) in [(mine, &mine_json), (previous, &previous_json)] {
        json::check_depth(document).map_err(|e| anyhow::anyhow!("Cannot share {}: {}", source, e))?;
    }
    let key = remote::upload_share(server, mine_json, previous_json).await?;
    println!("{}/api/share/{}", server.trim_end_matches('/'), key);
    Ok(())
}

pub fn clear(root: &Path, config: &Config) -> anyhow::Result<()> {
    let storage = Storage::new(root, &config.storage.dir);
    tracing::info!("Clearing storage at {}", storage.dir().display());
    if storage.clear()? {
        tracing::info!("Storage cleared");
    } else {
        tracing::info!("Nothing to clear");
    }
    Ok(())
}
