// SPDX-License-Identifier: Apache-2.0

//! Key/value persistence for operator state.
//!
//! Operators see a narrow byte-oriented interface; the file-backed
//! implementation stores state as JSON with atomic write-to-temp-then-rename
//! so a crash mid-write never leaves a torn file behind.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use base64::Engine;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage state is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("storage value for key `{0}` is not valid base64")]
    Encoding(String),

    #[error("storage lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// The persistence collaborator consumed by input operators. Keys are
/// operator-scoped strings, values are opaque bytes.
pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn set(&self, key: &str, value: &[u8]) -> Result<()>;
    fn delete(&self, key: &str) -> Result<()>;
}

/// In-memory storage. Useful for tests and for running without durable
/// checkpoints; clones share the same underlying map.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    data: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let data = self.data.read().map_err(|_| StorageError::Poisoned)?;
        Ok(data.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut data = self.data.write().map_err(|_| StorageError::Poisoned)?;
        data.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut data = self.data.write().map_err(|_| StorageError::Poisoned)?;
        data.remove(key);
        Ok(())
    }
}

/// JSON-file-backed storage. The whole state lives in one JSON object of
/// base64-encoded values, rewritten atomically on every mutation.
pub struct JsonFileStorage {
    path: PathBuf,
    state: RwLock<HashMap<String, String>>,
}

impl JsonFileStorage {
    /// Open or create a storage file at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let state = if path.exists() {
            let file = File::open(&path)?;
            serde_json::from_reader(BufReader::new(file))?
        } else {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    fs::create_dir_all(parent)?;
                }
            }
            HashMap::new()
        };

        Ok(Self {
            path,
            state: RwLock::new(state),
        })
    }

    fn flush(&self, state: &HashMap<String, String>) -> Result<()> {
        let tmp = self.path.with_extension("tmp");
        {
            let file = File::create(&tmp)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, state)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl Storage for JsonFileStorage {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let state = self.state.read().map_err(|_| StorageError::Poisoned)?;
        match state.get(key) {
            None => Ok(None),
            Some(encoded) => {
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(encoded)
                    .map_err(|_| StorageError::Encoding(key.to_string()))?;
                Ok(Some(bytes))
            }
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut state = self.state.write().map_err(|_| StorageError::Poisoned)?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(value);
        state.insert(key.to_string(), encoded);
        self.flush(&state)
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut state = self.state.write().map_err(|_| StorageError::Poisoned)?;
        if state.remove(key).is_some() {
            self.flush(&state)?;
        }
        Ok(())
    }
}
