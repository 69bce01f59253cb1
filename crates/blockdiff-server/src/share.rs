//! Shareable links for a pair of workspace documents

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use blockdiff_core::storage::{read_string, write_json};
use blockdiff_core::{DocumentError, StorageError, json};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// Salted keys tried for one pair before giving up.
const MAX_KEY_ATTEMPTS: u32 = 16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedPair {
    pub key: String,
    pub created_at: DateTime<Utc>,
    pub mine: Value,
    pub previous: Value,
}

/// Share files on disk with a concurrent in-memory cache in front.
/// Without a directory, shares live only as long as the process.
pub struct ShareStore {
    dir: Option<PathBuf>,
    cache: DashMap<String, SharedPair>,
}

impl ShareStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        ShareStore {
            dir: Some(dir.into()),
            cache: DashMap::new(),
        }
    }

    pub fn in_memory() -> Self {
        ShareStore {
            dir: None,
            cache: DashMap::new(),
        }
    }

    /// Key derived from the content; sharing the same pair twice yields the
    /// same key. A non-zero `salt` gives the pair another key when the first
    /// one is taken by different documents.
    pub fn share_key(mine: &Value, previous: &Value, salt: u32) -> String {
        let mut hasher = DefaultHasher::new();
        mine.to_string().hash(&mut hasher);
        previous.to_string().hash(&mut hasher);
        if salt > 0 {
            salt.hash(&mut hasher);
        }
        format!("{:012x}", hasher.finish() & 0xffff_ffff_ffff)
    }

    /// Store a pair, or return the stored pair with the same content.
    pub fn put(&self, mine: Value, previous: Value) -> Result<SharedPair, StorageError> {
        for document in [&mine, &previous] {
            json::check_depth(document).map_err(|e| StorageError::Document(DocumentError::Malformed(e)))?;
        }

        for salt in 0..MAX_KEY_ATTEMPTS {
            let key = Self::share_key(&mine, &previous, salt);
            // Pulls a pair stored by an earlier run into the cache.
            self.get(&key)?;

            let pair = match self.cache.entry(key.clone()) {
                Entry::Occupied(existing) => {
                    let existing = existing.get();
                    if existing.mine == mine && existing.previous == previous {
                        return Ok(existing.clone());
                    }
                    warn!("Share key {} holds other documents, trying another", key);
                    continue;
                }
                Entry::Vacant(slot) => slot
                    .insert(SharedPair {
                        key: key.clone(),
                        created_at: Utc::now(),
                        mine,
                        previous,
                    })
                    .clone(),
            };

            if let Some(dir) = &self.dir {
                let written = serde_json::to_value(&pair)
                    .map_err(StorageError::from)
                    .and_then(|value| write_json(&share_path(dir, &key), &value));
                if let Err(e) = written {
                    self.cache.remove(&key);
                    return Err(e);
                }
            }
            debug!("Stored share {}", key);
            return Ok(pair);
        }
        Err(StorageError::KeysExhausted)
    }

    pub fn get(&self, key: &str) -> Result<Option<SharedPair>, StorageError> {
        if !is_valid_key(key) {
            return Ok(None);
        }
        if let Some(pair) = self.cache.get(key) {
            return Ok(Some(pair.clone()));
        }
        let Some(dir) = &self.dir else {
            return Ok(None);
        };
        let path = share_path(dir, key);
        if !path.exists() {
            return Ok(None);
        }
        let pair: SharedPair = json::from_str(&read_string(&path)?)?;
        self.cache.insert(key.to_string(), pair.clone());
        Ok(Some(pair))
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

fn share_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{}.json", key))
}

/// Keys are hex only, so a key can never name a path outside the directory.
fn is_valid_key(key: &str) -> bool {
    !key.is_empty() && key.chars().all(|c| c.is_ascii_hexdigit())
}
