//! Persistent content-addressed map.
//!
//! The unique index's backing store: fixed-width keys mapped to opaque byte
//! values. Mutations append checksummed frames to a log; the full map is
//! rebuilt from the log on open, tolerating a torn tail the same way the
//! file journal does.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use serde::{Deserialize, Serialize};
use tracing::warn;

use chronicle_core::frame::{self, Frame};

use crate::index::{IndexError, IndexResult};

#[derive(Debug, Serialize, Deserialize)]
enum MapOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Remove { key: Vec<u8> },
}

/// Content-addressed byte map, optionally persisted to an append-only log.
pub struct ContentMap {
    log: Option<(PathBuf, Mutex<File>)>,
    map: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl ContentMap {
    /// Memory-only map (tests/dev).
    pub fn in_memory() -> Self {
        Self {
            log: None,
            map: RwLock::new(HashMap::new()),
        }
    }

    /// Open (or create) a persistent map at `path`.
    pub fn open(path: impl AsRef<Path>) -> IndexResult<Self> {
        let path = path.as_ref().to_path_buf();

        let mut map = HashMap::new();
        if path.exists() {
            let file = File::open(&path).map_err(|e| IndexError::storage(e.to_string()))?;
            let mut reader = BufReader::new(file);
            loop {
                match frame::read_frame(&mut reader)
                    .map_err(|e| IndexError::storage(e.to_string()))?
                {
                    Frame::Record(payload) => match serde_json::from_slice(&payload) {
                        Ok(MapOp::Put { key, value }) => {
                            map.insert(key, value);
                        }
                        Ok(MapOp::Remove { key }) => {
                            map.remove(&key);
                        }
                        Err(e) => {
                            warn!(map = %path.display(), error = %e, "undecodable frame, stopping replay");
                            break;
                        }
                    },
                    Frame::Corrupt => {
                        warn!(map = %path.display(), "torn frame at log tail, stopping replay");
                        break;
                    }
                    Frame::End => break,
                }
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| IndexError::storage(e.to_string()))?;

        Ok(Self {
            log: Some((path, Mutex::new(file))),
            map: RwLock::new(map),
        })
    }

    fn append(&self, op: &MapOp) -> IndexResult<()> {
        let Some((_, file)) = &self.log else {
            return Ok(());
        };
        let payload = serde_json::to_vec(op).map_err(|e| IndexError::storage(e.to_string()))?;
        let mut file = file.lock().map_err(|_| IndexError::Poisoned)?;
        frame::write_frame(&mut *file, &payload).map_err(|e| IndexError::storage(e.to_string()))?;
        file.sync_data()
            .map_err(|e| IndexError::storage(e.to_string()))?;
        Ok(())
    }

    pub fn get(&self, key: &[u8]) -> IndexResult<Option<Vec<u8>>> {
        Ok(self
            .map
            .read()
            .map_err(|_| IndexError::Poisoned)?
            .get(key)
            .cloned())
    }

    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) -> IndexResult<()> {
        self.append(&MapOp::Put {
            key: key.clone(),
            value: value.clone(),
        })?;
        self.map
            .write()
            .map_err(|_| IndexError::Poisoned)?
            .insert(key, value);
        Ok(())
    }

    pub fn remove(&self, key: &[u8]) -> IndexResult<()> {
        self.append(&MapOp::Remove { key: key.to_vec() })?;
        self.map
            .write()
            .map_err(|_| IndexError::Poisoned)?
            .remove(key);
        Ok(())
    }

    pub fn clear(&self) -> IndexResult<()> {
        if let Some((_, file)) = &self.log {
            let file = file.lock().map_err(|_| IndexError::Poisoned)?;
            file.set_len(0)
                .map_err(|e| IndexError::storage(e.to_string()))?;
        }
        self.map.write().map_err(|_| IndexError::Poisoned)?.clear();
        Ok(())
    }

    pub fn len(&self) -> IndexResult<usize> {
        Ok(self.map.read().map_err(|_| IndexError::Poisoned)?.len())
    }

    pub fn is_empty(&self) -> IndexResult<bool> {
        Ok(self.len()? == 0)
    }
}

impl core::fmt::Debug for ContentMap {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ContentMap")
            .field("path", &self.log.as_ref().map(|(p, _)| p))
            .finish_non_exhaustive()
    }
}
