//! Persisted client state: the session token and the cached user.
//!
//! The store is a flat string key/value map. On disk it is a single JSON
//! object; tests use the in-memory variant.

use crate::model::User;
use anyhow::{Context, Result};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const TOKEN_KEY: &str = "token";
pub const USER_KEY: &str = "user";

/// String key/value storage shared by the HTTP client and the auth store.
pub trait Storage {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// JSON-object file, re-read on every access so separate runs share it.
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// `~/.donorlink/storage.json`, or `.donorlink/storage.json` without a home.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .map(|home| home.join(".donorlink"))
            .unwrap_or_else(|| PathBuf::from(".donorlink"))
            .join("storage.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> BTreeMap<String, String> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(_) => return BTreeMap::new(),
        };
        match serde_json::from_str(&content) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "ignoring unreadable storage file"
                );
                BTreeMap::new()
            }
        }
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        let content = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(())
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.read_all().remove(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.read_all();
        entries.insert(key.to_string(), value.to_string());
        self.write_all(&entries)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.read_all();
        if entries.remove(key).is_some() {
            self.write_all(&entries)?;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStorage {
    entries: RefCell<BTreeMap<String, String>>,
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}

pub fn token(storage: &dyn Storage) -> Option<String> {
    storage.get(TOKEN_KEY).filter(|t| !t.is_empty())
}

/// Cached user JSON, if present and well formed.
pub fn cached_user(storage: &dyn Storage) -> Option<User> {
    let raw = storage.get(USER_KEY)?;
    serde_json::from_str(&raw).ok()
}

pub fn save_session(storage: &dyn Storage, token: &str, user: &User) -> Result<()> {
    storage.set(TOKEN_KEY, token)?;
    save_user(storage, user)
}

pub fn save_user(storage: &dyn Storage, user: &User) -> Result<()> {
    storage.set(USER_KEY, &serde_json::to_string(user)?)
}

pub fn clear_session(storage: &dyn Storage) -> Result<()> {
    storage.remove(TOKEN_KEY)?;
    storage.remove(USER_KEY)
}
