//! Test fixtures: fault-injecting journal wrapper.
//!
//! Used by this workspace's tests to prove that a failed commit leaves no
//! partially-visible state anywhere in the pipeline.

use std::sync::atomic::{AtomicBool, Ordering};

use chronicle_core::{EntityId, EntityLayout, EntityRecord, HybridTimestamp};

use crate::journal::{EntityIter, Journal, JournalError, JournalResult, JournalTx, UnrecognizedEntity};

/// Delegating journal whose next commit can be made to fail on demand.
pub struct FailingJournal<J> {
    inner: J,
    fail_commits: AtomicBool,
}

impl<J: Journal> FailingJournal<J> {
    pub fn new(inner: J) -> Self {
        Self {
            inner,
            fail_commits: AtomicBool::new(false),
        }
    }

    /// Make every subsequent commit fail until switched off again.
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &J {
        &self.inner
    }
}

impl<J: Journal> Journal for FailingJournal<J> {
    fn commit(&self, tx: JournalTx) -> JournalResult<()> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(JournalError::storage("injected commit failure"));
        }
        self.inner.commit(tx)
    }

    fn get(&self, id: EntityId) -> JournalResult<Option<EntityRecord>> {
        self.inner.get(id)
    }

    fn command_iter(&self, type_name: &str) -> JournalResult<EntityIter> {
        self.inner.command_iter(type_name)
    }

    fn event_iter(&self, type_name: &str) -> JournalResult<EntityIter> {
        self.inner.event_iter(type_name)
    }

    fn events_of_command(&self, id: EntityId) -> JournalResult<EntityIter> {
        self.inner.events_of_command(id)
    }

    fn size(&self, type_name: &str) -> JournalResult<u64> {
        self.inner.size(type_name)
    }

    fn clear(&self) -> JournalResult<()> {
        self.inner.clear()
    }

    fn on_command_types_added(&self, layouts: &[EntityLayout]) -> JournalResult<()> {
        self.inner.on_command_types_added(layouts)
    }

    fn on_event_types_added(&self, layouts: &[EntityLayout]) -> JournalResult<()> {
        self.inner.on_event_types_added(layouts)
    }

    fn repository_timestamp(&self) -> JournalResult<Option<HybridTimestamp>> {
        self.inner.repository_timestamp()
    }

    fn set_repository_timestamp(&self, timestamp: HybridTimestamp) -> JournalResult<()> {
        self.inner.set_repository_timestamp(timestamp)
    }

    fn unrecognized_entities(&self) -> JournalResult<Vec<UnrecognizedEntity>> {
        self.inner.unrecognized_entities()
    }
}
