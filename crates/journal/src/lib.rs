//! `chronicle-journal` — the durable, transactional source of truth for all
//! commands and events.

pub mod file;
pub mod fixtures;
pub mod journal;
pub mod memory;
mod state;

pub use file::FileJournal;
pub use fixtures::FailingJournal;
pub use journal::{
    EntityIter, Journal, JournalError, JournalResult, JournalTx, UnrecognizedEntity,
};
pub use memory::MemoryJournal;
