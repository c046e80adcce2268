//! Journal contract.

use thiserror::Error;

use chronicle_core::{
    CoreError, EntityId, EntityLayout, EntityRecord, FieldDescriptor, Fingerprint, HybridTimestamp,
};

/// Result type for journal operations.
pub type JournalResult<T> = Result<T, JournalError>;

/// Journal operation error.
#[derive(Debug, Error)]
pub enum JournalError {
    /// Underlying store failure (I/O and friends).
    #[error("journal storage failure: {0}")]
    Storage(String),

    /// Codec failure while encoding or decoding a record.
    #[error(transparent)]
    Codec(#[from] CoreError),

    /// An internal lock was poisoned by a panicking writer.
    #[error("journal lock poisoned")]
    Poisoned,

    /// A transaction staged more than one command.
    #[error("transaction already contains command {0}")]
    CommandAlreadyStaged(EntityId),
}

impl JournalError {
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }
}

/// A staged unit of work: one command plus the events it produced.
///
/// Staged records live only in this buffer until [`Journal::commit`] makes
/// them durable and atomically visible; dropping the transaction (or calling
/// [`Journal::rollback`]) discards them with no trace.
#[derive(Debug, Default)]
pub struct JournalTx {
    pub(crate) command: Option<EntityRecord>,
    pub(crate) events: Vec<EntityRecord>,
}

impl JournalTx {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage the command this unit of work belongs to.
    pub fn record_command(&mut self, record: EntityRecord) -> JournalResult<()> {
        if let Some(existing) = &self.command {
            return Err(JournalError::CommandAlreadyStaged(existing.id));
        }
        self.command = Some(record);
        Ok(())
    }

    /// Stage one produced event.
    pub fn record_event(&mut self, record: EntityRecord) {
        self.events.push(record);
    }

    pub fn is_empty(&self) -> bool {
        self.command.is_none() && self.events.is_empty()
    }
}

/// Finite, restartable iteration over a snapshot of durable records.
///
/// The snapshot is taken when the iterator is created; dropping it releases
/// the underlying resources (there is nothing to close explicitly).
#[derive(Debug)]
pub struct EntityIter {
    records: std::vec::IntoIter<EntityRecord>,
}

impl EntityIter {
    pub fn new(records: Vec<EntityRecord>) -> Self {
        Self {
            records: records.into_iter(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

impl Iterator for EntityIter {
    type Item = EntityRecord;

    fn next(&mut self) -> Option<Self::Item> {
        self.records.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.records.size_hint()
    }
}

/// A durable record whose schema fingerprint is unknown to the current
/// process.
///
/// Reopening a journal never fails over these and never drops them: enough
/// structural information survives (type name, field name/type pairs) for
/// tooling to inspect or migrate them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnrecognizedEntity {
    pub id: EntityId,
    pub type_name: String,
    pub fingerprint: Fingerprint,
    pub fields: Vec<FieldDescriptor>,
}

/// Durable, transactional store of commands and events keyed by identity.
///
/// A committed transaction is all-or-nothing: either every staged event plus
/// the command become retrievable, or none of them do; partial sets are
/// never observable, including across a crash and reopen.
pub trait Journal: Send + Sync {
    /// Start staging a unit of work.
    fn begin_transaction(&self) -> JournalTx {
        JournalTx::new()
    }

    /// Make a staged unit of work durable and atomically visible.
    ///
    /// On failure the journal is left exactly as it was before the
    /// transaction began.
    fn commit(&self, tx: JournalTx) -> JournalResult<()>;

    /// Discard a staged unit of work.
    fn rollback(&self, tx: JournalTx) {
        drop(tx);
    }

    /// Retrieve a command or event by identity.
    fn get(&self, id: EntityId) -> JournalResult<Option<EntityRecord>>;

    /// Iterate over all commands of one type.
    fn command_iter(&self, type_name: &str) -> JournalResult<EntityIter>;

    /// Iterate over all events of one type.
    fn event_iter(&self, type_name: &str) -> JournalResult<EntityIter>;

    /// Iterate over the events a committed command produced.
    fn events_of_command(&self, id: EntityId) -> JournalResult<EntityIter>;

    /// Count of entities of one type.
    fn size(&self, type_name: &str) -> JournalResult<u64>;

    fn is_empty(&self, type_name: &str) -> JournalResult<bool> {
        Ok(self.size(type_name)? == 0)
    }

    /// Remove everything. The data is lost irrevocably.
    fn clear(&self) -> JournalResult<()>;

    /// Notification that command types were registered; prepares per-type
    /// storage and records their layouts.
    fn on_command_types_added(&self, layouts: &[EntityLayout]) -> JournalResult<()>;

    /// Notification that event types were registered.
    fn on_event_types_added(&self, layouts: &[EntityLayout]) -> JournalResult<()>;

    /// The repository's last committed clock position, if any.
    fn repository_timestamp(&self) -> JournalResult<Option<HybridTimestamp>>;

    /// Persist the repository's clock position.
    fn set_repository_timestamp(&self, timestamp: HybridTimestamp) -> JournalResult<()>;

    /// Durable records whose fingerprint no registered type claims.
    fn unrecognized_entities(&self) -> JournalResult<Vec<UnrecognizedEntity>>;
}

impl<J: Journal + ?Sized> Journal for std::sync::Arc<J> {
    fn commit(&self, tx: JournalTx) -> JournalResult<()> {
        (**self).commit(tx)
    }

    fn get(&self, id: EntityId) -> JournalResult<Option<EntityRecord>> {
        (**self).get(id)
    }

    fn command_iter(&self, type_name: &str) -> JournalResult<EntityIter> {
        (**self).command_iter(type_name)
    }

    fn event_iter(&self, type_name: &str) -> JournalResult<EntityIter> {
        (**self).event_iter(type_name)
    }

    fn events_of_command(&self, id: EntityId) -> JournalResult<EntityIter> {
        (**self).events_of_command(id)
    }

    fn size(&self, type_name: &str) -> JournalResult<u64> {
        (**self).size(type_name)
    }

    fn is_empty(&self, type_name: &str) -> JournalResult<bool> {
        (**self).is_empty(type_name)
    }

    fn clear(&self) -> JournalResult<()> {
        (**self).clear()
    }

    fn on_command_types_added(&self, layouts: &[EntityLayout]) -> JournalResult<()> {
        (**self).on_command_types_added(layouts)
    }

    fn on_event_types_added(&self, layouts: &[EntityLayout]) -> JournalResult<()> {
        (**self).on_event_types_added(layouts)
    }

    fn repository_timestamp(&self) -> JournalResult<Option<HybridTimestamp>> {
        (**self).repository_timestamp()
    }

    fn set_repository_timestamp(&self, timestamp: HybridTimestamp) -> JournalResult<()> {
        (**self).set_repository_timestamp(timestamp)
    }

    fn unrecognized_entities(&self) -> JournalResult<Vec<UnrecognizedEntity>> {
        (**self).unrecognized_entities()
    }
}
