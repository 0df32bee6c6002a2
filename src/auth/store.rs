//! Durable token storage
//!
//! Two layers live under the persist directory:
//! - `microsoft.token` / `microsoft.expiresOn`: the raw token value and expiry
//!   of the primary resource, one flat file each.
//! - `storage/`: a small key/value store holding a JSON snapshot of the whole
//!   [`AuthSession`] under `{appId}-{resource}`.
//!
//! Reads are forgiving: missing, unreadable or corrupt entries come back as
//! `None` and the session starts empty.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::error::AuthError;
use super::tokens::{AuthSession, TokenRecord};

const TOKEN_FILE: &str = "microsoft.token";
const EXPIRES_ON_FILE: &str = "microsoft.expiresOn";
const STORAGE_DIR: &str = "storage";

/// Directory-backed key/value store, one JSON file per key.
///
/// File names are the SHA-256 of the key so arbitrary resource URLs are safe
/// to use as keys.
#[derive(Debug, Clone)]
pub struct KeyValueStore {
    dir: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct Entry {
    key: String,
    value: String,
}

impl KeyValueStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.dir.join(format!("{:x}", digest))
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let raw = fs::read_to_string(self.entry_path(key)).ok()?;
        match serde_json::from_str::<Entry>(&raw) {
            Ok(entry) if entry.key == key => Some(entry.value),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!("Ignoring unparsable storage entry for {}: {}", key, e);
                None
            }
        }
    }

    pub fn set(&self, key: &str, value: String) -> Result<(), AuthError> {
        fs::create_dir_all(&self.dir)?;
        let entry = Entry {
            key: key.to_string(),
            value,
        };
        write_private(&self.entry_path(key), &serde_json::to_string(&entry)?)
    }

    pub fn remove(&self, key: &str) -> Result<(), AuthError> {
        remove_if_exists(&self.entry_path(key))
    }
}

/// Persistence for tokens and session snapshots.
#[derive(Debug, Clone)]
pub struct TokenStore {
    dir: PathBuf,
    kv: KeyValueStore,
}

impl TokenStore {
    pub fn new(dir: PathBuf) -> Self {
        let kv = KeyValueStore::new(dir.join(STORAGE_DIR));
        Self { dir, kv }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Read the flat-file token pair. Both files must exist and the expiry
    /// must parse, otherwise it is a cache miss.
    pub fn load_token_files(&self) -> Option<TokenRecord> {
        let expires_raw = fs::read_to_string(self.dir.join(EXPIRES_ON_FILE)).ok()?;
        let value = fs::read_to_string(self.dir.join(TOKEN_FILE)).ok()?;
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        let expires_on = DateTime::parse_from_rfc3339(expires_raw.trim())
            .map_err(|e| tracing::debug!("Ignoring unparsable token expiry: {}", e))
            .ok()?
            .with_timezone(&Utc);
        Some(TokenRecord {
            value: value.to_string(),
            expires_on,
        })
    }

    /// Write expiry and value as two independent writes.
    pub fn save_token_files(&self, record: &TokenRecord) -> Result<(), AuthError> {
        fs::create_dir_all(&self.dir)?;
        write_private(&self.dir.join(EXPIRES_ON_FILE), &record.expires_on.to_rfc3339())?;
        tracing::debug!("{} saved", EXPIRES_ON_FILE);
        write_private(&self.dir.join(TOKEN_FILE), &record.value)?;
        tracing::debug!("{} saved", TOKEN_FILE);
        Ok(())
    }

    pub fn load_snapshot(&self, key: &str) -> Option<AuthSession> {
        let raw = self.kv.get(key)?;
        serde_json::from_str(&raw)
            .map_err(|e| tracing::debug!("Ignoring corrupt session snapshot {}: {}", key, e))
            .ok()
    }

    pub fn save_snapshot(&self, key: &str, session: &AuthSession) -> Result<(), AuthError> {
        self.kv.set(key, serde_json::to_string(session)?)
    }

    /// Remove the flat files and the snapshot stored under `key`.
    pub fn clear(&self, key: &str) -> Result<(), AuthError> {
        remove_if_exists(&self.dir.join(EXPIRES_ON_FILE))?;
        remove_if_exists(&self.dir.join(TOKEN_FILE))?;
        self.kv.remove(key)
    }
}

/// Sibling of `path` with `.tmp` appended to the whole file name.
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write through a temp file and rename, with owner-only permissions.
fn write_private(path: &Path, contents: &str) -> Result<(), AuthError> {
    let tmp = temp_path(path);
    fs::write(&tmp, contents)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))?;
    }

    fs::rename(&tmp, path)?;
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<(), AuthError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
