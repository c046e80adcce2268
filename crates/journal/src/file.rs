//! File-backed journal.
//!
//! The backing store is a single append-only log. Every committed
//! transaction is one checksummed frame, so visibility is all-or-nothing by
//! construction: a frame that did not survive its checksum (a torn write at
//! the tail) is treated as if the transaction never happened, and the scan
//! stops there.

use std::fs::{File, OpenOptions};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use serde::{Deserialize, Serialize};
use tracing::warn;

use chronicle_core::frame::{self, Frame};
use chronicle_core::{EntityId, EntityLayout, EntityRecord, HybridTimestamp};

use crate::journal::{EntityIter, Journal, JournalError, JournalResult, JournalTx, UnrecognizedEntity};
use crate::state::JournalState;

/// One durable frame of the log.
#[derive(Debug, Serialize, Deserialize)]
enum LogRecord {
    /// A committed transaction: the command and everything it produced.
    Commit {
        command: Option<EntityRecord>,
        events: Vec<EntityRecord>,
    },
    /// Layout information for registered types, kept so later processes can
    /// describe entities whose types they no longer know.
    Layouts(Vec<EntityLayout>),
    /// Repository clock high-water mark.
    Timestamp(HybridTimestamp),
}

/// Journal over an append-only log file, crash-consistent on reopen.
pub struct FileJournal {
    path: PathBuf,
    writer: Mutex<File>,
    state: RwLock<JournalState>,
}

impl FileJournal {
    /// Open (or create) a journal at `path`, replaying whatever committed
    /// work the log holds.
    ///
    /// A torn or corrupt tail ends the replay; everything before it is
    /// recovered. Entities of types not registered in this process are kept
    /// and reported through
    /// [`unrecognized_entities`](Journal::unrecognized_entities).
    pub fn open(path: impl AsRef<Path>) -> JournalResult<Self> {
        let path = path.as_ref().to_path_buf();

        let mut state = JournalState::default();
        if path.exists() {
            let file = File::open(&path).map_err(|e| JournalError::storage(e.to_string()))?;
            let mut reader = BufReader::new(file);
            loop {
                match frame::read_frame(&mut reader)
                    .map_err(|e| JournalError::storage(e.to_string()))?
                {
                    Frame::Record(payload) => match serde_json::from_slice(&payload) {
                        Ok(record) => Self::replay(&mut state, record),
                        Err(e) => {
                            warn!(journal = %path.display(), error = %e, "undecodable frame, stopping replay");
                            break;
                        }
                    },
                    Frame::Corrupt => {
                        warn!(journal = %path.display(), "torn frame at log tail, stopping replay");
                        break;
                    }
                    Frame::End => break,
                }
            }
        }

        let writer = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| JournalError::storage(e.to_string()))?;

        Ok(Self {
            path,
            writer: Mutex::new(writer),
            state: RwLock::new(state),
        })
    }

    fn replay(state: &mut JournalState, record: LogRecord) {
        match record {
            LogRecord::Commit { command, events } => state.apply(command.as_ref(), &events),
            LogRecord::Layouts(layouts) => state.remember_layouts(&layouts),
            LogRecord::Timestamp(ts) => state.set_timestamp(ts),
        }
    }

    fn append(&self, record: &LogRecord) -> JournalResult<()> {
        let payload =
            serde_json::to_vec(record).map_err(|e| JournalError::storage(e.to_string()))?;
        let mut writer = self.writer.lock().map_err(|_| JournalError::Poisoned)?;
        frame::write_frame(&mut *writer, &payload)
            .map_err(|e| JournalError::storage(e.to_string()))?;
        writer
            .sync_data()
            .map_err(|e| JournalError::storage(e.to_string()))?;
        Ok(())
    }

    fn read(&self) -> JournalResult<std::sync::RwLockReadGuard<'_, JournalState>> {
        self.state.read().map_err(|_| JournalError::Poisoned)
    }

    fn write(&self) -> JournalResult<std::sync::RwLockWriteGuard<'_, JournalState>> {
        self.state.write().map_err(|_| JournalError::Poisoned)
    }
}

impl Journal for FileJournal {
    fn commit(&self, tx: JournalTx) -> JournalResult<()> {
        if tx.is_empty() {
            return Ok(());
        }
        // Durability first: the in-memory view only advances once the frame
        // is on disk, so readers never see work a crash could revoke.
        self.append(&LogRecord::Commit {
            command: tx.command.clone(),
            events: tx.events.clone(),
        })?;
        self.write()?.apply_tx(&tx);
        Ok(())
    }

    fn get(&self, id: EntityId) -> JournalResult<Option<EntityRecord>> {
        Ok(self.read()?.get(id))
    }

    fn command_iter(&self, type_name: &str) -> JournalResult<EntityIter> {
        Ok(EntityIter::new(self.read()?.commands_of_type(type_name)))
    }

    fn event_iter(&self, type_name: &str) -> JournalResult<EntityIter> {
        Ok(EntityIter::new(self.read()?.events_of_type(type_name)))
    }

    fn events_of_command(&self, id: EntityId) -> JournalResult<EntityIter> {
        Ok(EntityIter::new(self.read()?.events_of_command(id)))
    }

    fn size(&self, type_name: &str) -> JournalResult<u64> {
        Ok(self.read()?.size(type_name))
    }

    fn clear(&self) -> JournalResult<()> {
        let mut state = self.write()?;
        {
            let writer = self.writer.lock().map_err(|_| JournalError::Poisoned)?;
            writer
                .set_len(0)
                .map_err(|e| JournalError::storage(e.to_string()))?;
        }
        // Re-seed the truncated log with the layouts of everything still
        // registered, so the next process can describe what it finds.
        let layouts = state.recognized_layouts();
        state.clear();
        state.remember_layouts(&layouts);
        drop(state);
        if !layouts.is_empty() {
            self.append(&LogRecord::Layouts(layouts))?;
        }
        Ok(())
    }

    fn on_command_types_added(&self, layouts: &[EntityLayout]) -> JournalResult<()> {
        self.append(&LogRecord::Layouts(layouts.to_vec()))?;
        self.write()?.recognize_layouts(layouts);
        Ok(())
    }

    fn on_event_types_added(&self, layouts: &[EntityLayout]) -> JournalResult<()> {
        self.append(&LogRecord::Layouts(layouts.to_vec()))?;
        self.write()?.recognize_layouts(layouts);
        Ok(())
    }

    fn repository_timestamp(&self) -> JournalResult<Option<HybridTimestamp>> {
        Ok(self.read()?.timestamp())
    }

    fn set_repository_timestamp(&self, timestamp: HybridTimestamp) -> JournalResult<()> {
        self.append(&LogRecord::Timestamp(timestamp))?;
        self.write()?.set_timestamp(timestamp);
        Ok(())
    }

    fn unrecognized_entities(&self) -> JournalResult<Vec<UnrecognizedEntity>> {
        Ok(self.read()?.unrecognized())
    }
}

impl core::fmt::Debug for FileJournal {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FileJournal")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}
