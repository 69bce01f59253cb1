//! HTTP + WebSocket server for a blockdiff session

pub mod handlers;
pub mod router;
pub mod save;
pub mod share;
pub mod websocket;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};

use anyhow::Context;
use blockdiff_core::{
    Document, Session, SessionEffect, SessionError, SessionEvent, Side, Storage, StorageError,
};
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info, warn};

use crate::save::SaveCoordinator;
use crate::share::ShareStore;
use crate::websocket::ServerMessage;

/// Capacity of the effect broadcast channel.
const EFFECT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 7878,
        }
    }
}

/// Files the two workspaces are loaded from and saved to.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceFiles {
    pub mine: Option<PathBuf>,
    pub previous: Option<PathBuf>,
    /// Save in the mergeable format.
    pub mergeable: bool,
}

impl WorkspaceFiles {
    pub fn path(&self, side: Side) -> Option<&PathBuf> {
        match side {
            Side::Mine => self.mine.as_ref(),
            Side::Previous => self.previous.as_ref(),
        }
    }
}

/// Backup ordering for one side. Tickets are issued under the session lock
/// and a write only lands if no newer ticket has been written.
#[derive(Default)]
struct BackupSlot {
    issued: AtomicU64,
    written: std::sync::Mutex<u64>,
}

/// A copy of one side taken under the session lock, written after it is
/// released.
struct PendingBackup {
    side: Side,
    document: Document,
    ticket: u64,
}

/// Shared state for every handler and connection.
pub struct ServerState {
    pub session: RwLock<Session>,
    /// Serialized [`ServerMessage`]s for every connected client.
    pub effects_tx: broadcast::Sender<String>,
    pub shares: ShareStore,
    pub saves: SaveCoordinator,
    pub files: WorkspaceFiles,
    storage: Option<Storage>,
    backups: HashMap<Side, Arc<BackupSlot>>,
}

impl ServerState {
    pub fn new(session: Session) -> Self {
        let (effects_tx, _) = broadcast::channel(EFFECT_CHANNEL_CAPACITY);
        ServerState {
            session: RwLock::new(session),
            effects_tx,
            shares: ShareStore::in_memory(),
            saves: SaveCoordinator::new(),
            files: WorkspaceFiles::default(),
            storage: None,
            backups: [Side::Mine, Side::Previous]
                .into_iter()
                .map(|side| (side, Arc::new(BackupSlot::default())))
                .collect(),
        }
    }

    /// Back up edited workspaces and keep shares under `storage`.
    pub fn with_storage(mut self, storage: Storage) -> Self {
        self.shares = ShareStore::new(storage.shares_dir());
        self.storage = Some(storage);
        self
    }

    pub fn with_files(mut self, files: WorkspaceFiles) -> Self {
        self.files = files;
        self
    }

    /// Send a message to every connected client. Having no clients is not an
    /// error.
    pub fn broadcast(&self, message: &ServerMessage) -> anyhow::Result<usize> {
        let text = serde_json::to_string(message).context("Failed to encode server message")?;
        Ok(self.effects_tx.send(text).unwrap_or(0))
    }

    fn publish(&self, effects: &[SessionEffect]) {
        for effect in effects {
            let message = ServerMessage::Effect {
                effect: effect.clone(),
            };
            if let Err(e) = self.broadcast(&message) {
                warn!("Failed to broadcast effect: {}", e);
            }
        }
    }

    /// Dispatch one event, broadcast its effects, and back up the changed
    /// side. The backup is written after the session lock is released.
    pub async fn dispatch(&self, event: SessionEvent) -> Result<Vec<SessionEffect>, SessionError> {
        let changed = match &event {
            SessionEvent::BlockChanged { side, .. } => Some(*side),
            _ => None,
        };
        let mut session = self.session.write().await;
        let effects = session.dispatch(event)?;
        let pending = changed.and_then(|side| self.take_backup(side, &session));
        drop(session);

        self.publish(&effects);
        if let Some(pending) = pending {
            self.write_backup(pending).await;
        }
        Ok(effects)
    }

    /// Replace a side with an already parsed document.
    pub async fn load(&self, side: Side, document: Document) -> SessionEffect {
        let mut session = self.session.write().await;
        let effect = session.load(side, document);
        let pending = self.take_backup(side, &session);
        drop(session);

        self.publish(std::slice::from_ref(&effect));
        if let Some(pending) = pending {
            self.write_backup(pending).await;
        }
        effect
    }

    fn backup_slot(&self, side: Side) -> Arc<BackupSlot> {
        self.backups.get(&side).cloned().unwrap_or_default()
    }

    fn take_backup(&self, side: Side, session: &Session) -> Option<PendingBackup> {
        self.storage.as_ref()?;
        let ticket = self.backup_slot(side).issued.fetch_add(1, Ordering::SeqCst) + 1;
        Some(PendingBackup {
            side,
            document: session.document(side),
            ticket,
        })
    }

    async fn write_backup(&self, pending: PendingBackup) {
        let Some(storage) = self.storage.clone() else {
            return;
        };
        let PendingBackup {
            side,
            document,
            ticket,
        } = pending;
        let slot = self.backup_slot(side);
        let result = tokio::task::spawn_blocking(move || {
            let mut written = slot.written.lock().unwrap_or_else(PoisonError::into_inner);
            if *written > ticket {
                return Ok::<_, StorageError>(false);
            }
            storage.save_backup(side, &document)?;
            *written = ticket;
            Ok(true)
        })
        .await;
        match result {
            Ok(Ok(true)) => {}
            Ok(Ok(false)) => debug!("Backup #{} of {} workspace superseded", ticket, side),
            Ok(Err(e)) => warn!("Failed to back up {} workspace: {}", side, e),
            Err(e) => warn!("Backup task for {} workspace failed: {}", side, e),
        }
    }
}

pub struct BlockdiffServer {
    state: Arc<ServerState>,
    config: ServerConfig,
}

impl BlockdiffServer {
    pub fn new(state: ServerState, config: ServerConfig) -> Self {
        BlockdiffServer {
            state: Arc::new(state),
            config,
        }
    }

    pub fn state(&self) -> Arc<ServerState> {
        Arc::clone(&self.state)
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    /// Bind and serve until the process exits.
    pub async fn start(self) -> anyhow::Result<()> {
        let address = self.address();
        let listener = tokio::net::TcpListener::bind(&address)
            .await
            .with_context(|| format!("Failed to bind {}", address))?;
        info!("Listening on http://{}", address);

        let app = router::create_router(self.state);
        axum::serve(listener, app).await.context("Server error")?;
        Ok(())
    }
}
