//! In-memory journal for tests/dev.

use std::sync::RwLock;

use chronicle_core::{EntityId, EntityLayout, EntityRecord, HybridTimestamp};

use crate::journal::{EntityIter, Journal, JournalError, JournalResult, JournalTx, UnrecognizedEntity};
use crate::state::JournalState;

/// In-memory journal.
///
/// Intended for tests/dev. Readers see committed state only; a commit is a
/// single write-locked map update, so partial transactions are never
/// observable.
#[derive(Debug, Default)]
pub struct MemoryJournal {
    state: RwLock<JournalState>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> JournalResult<std::sync::RwLockReadGuard<'_, JournalState>> {
        self.state.read().map_err(|_| JournalError::Poisoned)
    }

    fn write(&self) -> JournalResult<std::sync::RwLockWriteGuard<'_, JournalState>> {
        self.state.write().map_err(|_| JournalError::Poisoned)
    }
}

impl Journal for MemoryJournal {
    fn commit(&self, tx: JournalTx) -> JournalResult<()> {
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
        self.write()?.clear();
        Ok(())
    }

    fn on_command_types_added(&self, layouts: &[EntityLayout]) -> JournalResult<()> {
        self.write()?.recognize_layouts(layouts);
        Ok(())
    }

    fn on_event_types_added(&self, layouts: &[EntityLayout]) -> JournalResult<()> {
        self.write()?.recognize_layouts(layouts);
        Ok(())
    }

    fn repository_timestamp(&self) -> JournalResult<Option<HybridTimestamp>> {
        Ok(self.read()?.timestamp())
    }

    fn set_repository_timestamp(&self, timestamp: HybridTimestamp) -> JournalResult<()> {
        self.write()?.set_timestamp(timestamp);
        Ok(())
    }

    fn unrecognized_entities(&self) -> JournalResult<Vec<UnrecognizedEntity>> {
        Ok(self.read()?.unrecognized())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_core::{EntityKind, Fingerprint, HybridTimestamp};
    use serde_json::json;

    fn record(kind: EntityKind, type_name: &str) -> EntityRecord {
        EntityRecord::new(
            EntityId::new(),
            kind,
            type_name,
            Fingerprint::from_bytes([0; 32]),
            HybridTimestamp::new(1 << 32, 0),
            json!({"n": 1}),
        )
    }

    #[test]
    fn committed_records_are_retrievable_by_id_and_type() {
        let journal = MemoryJournal::new();

        let command = record(EntityKind::Command, "ledger.open_account");
        let event = record(EntityKind::Event, "ledger.account.opened");

        let mut tx = journal.begin_transaction();
        tx.record_event(event.clone());
        tx.record_command(command.clone()).unwrap();
        journal.commit(tx).unwrap();

        assert_eq!(journal.get(event.id).unwrap(), Some(event.clone()));
        assert_eq!(journal.get(command.id).unwrap(), Some(command.clone()));
        assert_eq!(journal.size("ledger.account.opened").unwrap(), 1);
        assert_eq!(
            journal
                .event_iter("ledger.account.opened")
                .unwrap()
                .collect::<Vec<_>>(),
            vec![event.clone()]
        );
        assert_eq!(
            journal
                .events_of_command(command.id)
                .unwrap()
                .collect::<Vec<_>>(),
            vec![event]
        );
    }

    #[test]
    fn rolled_back_transaction_leaves_no_trace() {
        let journal = MemoryJournal::new();

        let event = record(EntityKind::Event, "ledger.account.opened");
        let mut tx = journal.begin_transaction();
        tx.record_event(event.clone());
        journal.rollback(tx);

        assert_eq!(journal.get(event.id).unwrap(), None);
        assert!(journal.is_empty("ledger.account.opened").unwrap());
    }

    #[test]
    fn a_transaction_holds_exactly_one_command() {
        let journal = MemoryJournal::new();
        let mut tx = journal.begin_transaction();
        tx.record_command(record(EntityKind::Command, "ledger.open_account"))
            .unwrap();
        let err = tx
            .record_command(record(EntityKind::Command, "ledger.open_account"))
            .unwrap_err();
        assert!(matches!(err, JournalError::CommandAlreadyStaged(_)));
    }

    #[test]
    fn repository_timestamp_tracks_the_high_water_mark() {
        let journal = MemoryJournal::new();
        assert_eq!(journal.repository_timestamp().unwrap(), None);

        journal
            .set_repository_timestamp(HybridTimestamp::new(5 << 32, 3))
            .unwrap();
        journal
            .set_repository_timestamp(HybridTimestamp::new(2 << 32, 0))
            .unwrap();

        assert_eq!(
            journal.repository_timestamp().unwrap(),
            Some(HybridTimestamp::new(5 << 32, 3))
        );
    }
}
