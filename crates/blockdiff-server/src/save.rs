//! Single-flight document saves
//!
//! At most one save per side is in flight. Starting a new one aborts the
//! previous task, so a burst of saves ends with the latest document on disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};

use blockdiff_core::{Document, Side};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Per-side write serialization. A blocking write that outlives its aborted
/// task must not land after a newer one, so writes check their generation
/// under the lock.
#[derive(Default)]
struct SideSlot {
    generation: AtomicU64,
    write_lock: std::sync::Mutex<()>,
}

pub struct SaveCoordinator {
    slots: HashMap<Side, Arc<SideSlot>>,
    inflight: Mutex<HashMap<Side, JoinHandle<()>>>,
}

impl SaveCoordinator {
    pub fn new() -> Self {
        let slots = [Side::Mine, Side::Previous]
            .into_iter()
            .map(|side| (side, Arc::new(SideSlot::default())))
            .collect();
        SaveCoordinator {
            slots,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, side: Side) -> Arc<SideSlot> {
        self.slots
            .get(&side)
            .cloned()
            .unwrap_or_default()
    }

    /// Start writing `document` to `path`. Returns `true` if a previous save
    /// for the side was still running and got aborted.
    pub async fn save(
        &self,
        side: Side,
        path: PathBuf,
        document: &Document,
        as_mergeable: bool,
    ) -> anyhow::Result<bool> {
        let json = if as_mergeable {
            document.to_mergeable_json()
        } else {
            document.to_json()?
        };
        let text = serde_json::to_string_pretty(&json)?;

        let mut inflight = self.inflight.lock().await;
        let aborted = match inflight.remove(&side) {
            Some(previous) if !previous.is_finished() => {
                debug!("Aborting unfinished save of {} workspace", side);
                previous.abort();
                true
            }
            _ => false,
        };

        let slot = self.slot(side);
        let generation = slot.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = tokio::spawn(async move {
            let target = path.clone();
            let result =
                tokio::task::spawn_blocking(move || write_if_current(&slot, generation, &target, &text))
                    .await;
            match result {
                Ok(Ok(true)) => info!("Saved {} workspace to {}", side, path.display()),
                Ok(Ok(false)) => debug!("Save #{} of {} workspace superseded", generation, side),
                Ok(Err(e)) => warn!("Failed to save {} workspace to {}: {}", side, path.display(), e),
                Err(e) => warn!("Save task for {} workspace failed: {}", side, e),
            }
        });
        inflight.insert(side, handle);
        Ok(aborted)
    }

    /// Wait for the current save of `side`, if any.
    pub async fn wait(&self, side: Side) {
        let handle = self.inflight.lock().await.remove(&side);
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!("Save task for {} workspace failed: {}", side, e);
                }
            }
        }
    }
}

impl Default for SaveCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

fn write_if_current(slot: &SideSlot, generation: u64, path: &Path, text: &str) -> std::io::Result<bool> {
    let _guard = slot.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
    if slot.generation.load(Ordering::SeqCst) != generation {
        return Ok(false);
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, text)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockdiff_core::mergeable;
    use blockdiff_core::{Block, Workspace};
    use tempfile::TempDir;

    fn doc(id: &str) -> Document {
        Document::new(Workspace::from_blocks(vec![Block::new(id, "text_print").with_next(None)]).unwrap())
    }

    #[tokio::test]
    async fn test_latest_save_wins() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out/mine.json");
        let saves = SaveCoordinator::new();

        for i in 0..5 {
            saves
                .save(Side::Mine, path.clone(), &doc(&format!("draft{}", i)), false)
                .await
                .unwrap();
        }
        saves
            .save(Side::Mine, path.clone(), &doc("final"), false)
            .await
            .unwrap();
        saves.wait(Side::Mine).await;

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("final"));
        assert!(!written.contains("draft"));
    }

    #[tokio::test]
    async fn test_sides_are_independent() {
        let temp = TempDir::new().unwrap();
        let saves = SaveCoordinator::new();
        saves
            .save(Side::Mine, temp.path().join("m.json"), &doc("m"), true)
            .await
            .unwrap();
        let aborted = saves
            .save(Side::Previous, temp.path().join("p.json"), &doc("p"), false)
            .await
            .unwrap();
        assert!(!aborted);
        saves.wait(Side::Mine).await;
        saves.wait(Side::Previous).await;

        let mine: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(temp.path().join("m.json")).unwrap()).unwrap();
        assert!(mergeable::is_mergeable(&mine));
        assert!(temp.path().join("p.json").exists());
    }

    #[test]
    fn test_stale_generation_skips_write() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("x.json");
        let slot = SideSlot::default();
        slot.generation.store(2, Ordering::SeqCst);
        assert!(!write_if_current(&slot, 1, &path, "old").unwrap());
        assert!(!path.exists());
        assert!(write_if_current(&slot, 2, &path, "new").unwrap());
    }
}
