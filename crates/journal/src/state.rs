//! Shared in-memory journal state.
//!
//! Both journal implementations keep the same queryable maps; the file
//! journal additionally rebuilds them from its log on reopen.

use std::collections::{HashMap, HashSet};

use chronicle_core::{
    EntityId, EntityKind, EntityLayout, EntityRecord, Fingerprint, HybridTimestamp,
};

use crate::journal::{JournalTx, UnrecognizedEntity};

#[derive(Debug, Default)]
pub(crate) struct JournalState {
    entities: HashMap<EntityId, EntityRecord>,
    commands_by_type: HashMap<String, Vec<EntityId>>,
    events_by_type: HashMap<String, Vec<EntityId>>,
    command_events: HashMap<EntityId, Vec<EntityId>>,
    timestamp: Option<HybridTimestamp>,
    /// Layout information ever seen, keyed by fingerprint. Survives in the
    /// file journal's log so unknown entities stay describable.
    layouts: HashMap<Fingerprint, EntityLayout>,
    /// Fingerprints claimed by types registered in this process.
    recognized: HashSet<Fingerprint>,
}

impl JournalState {
    pub fn apply(&mut self, command: Option<&EntityRecord>, events: &[EntityRecord]) {
        for event in events {
            self.insert(event.clone());
        }
        if let Some(command) = command {
            self.insert(command.clone());
            self.command_events.insert(
                command.id,
                events
                    .iter()
                    .filter(|e| e.kind == EntityKind::Event)
                    .map(|e| e.id)
                    .collect(),
            );
        }
    }

    pub fn apply_tx(&mut self, tx: &JournalTx) {
        self.apply(tx.command.as_ref(), &tx.events);
    }

    fn insert(&mut self, record: EntityRecord) {
        let by_type = match record.kind {
            EntityKind::Command => &mut self.commands_by_type,
            EntityKind::Event => &mut self.events_by_type,
        };
        by_type
            .entry(record.type_name.clone())
            .or_default()
            .push(record.id);
        self.timestamp = Some(match self.timestamp {
            Some(current) => current.max(record.timestamp),
            None => record.timestamp,
        });
        self.entities.insert(record.id, record);
    }

    pub fn get(&self, id: EntityId) -> Option<EntityRecord> {
        self.entities.get(&id).cloned()
    }

    pub fn commands_of_type(&self, type_name: &str) -> Vec<EntityRecord> {
        self.collect(&self.commands_by_type, type_name)
    }

    pub fn events_of_type(&self, type_name: &str) -> Vec<EntityRecord> {
        self.collect(&self.events_by_type, type_name)
    }

    fn collect(&self, map: &HashMap<String, Vec<EntityId>>, type_name: &str) -> Vec<EntityRecord> {
        map.get(type_name)
            .into_iter()
            .flatten()
            .filter_map(|id| self.entities.get(id).cloned())
            .collect()
    }

    pub fn events_of_command(&self, id: EntityId) -> Vec<EntityRecord> {
        self.command_events
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.entities.get(id).cloned())
            .collect()
    }

    pub fn size(&self, type_name: &str) -> u64 {
        let commands = self.commands_by_type.get(type_name).map_or(0, Vec::len);
        let events = self.events_by_type.get(type_name).map_or(0, Vec::len);
        (commands + events) as u64
    }

    pub fn clear(&mut self) {
        self.entities.clear();
        self.commands_by_type.clear();
        self.events_by_type.clear();
        self.command_events.clear();
        self.timestamp = None;
        self.layouts.clear();
    }

    pub fn timestamp(&self) -> Option<HybridTimestamp> {
        self.timestamp
    }

    pub fn set_timestamp(&mut self, timestamp: HybridTimestamp) {
        self.timestamp = Some(match self.timestamp {
            Some(current) => current.max(timestamp),
            None => timestamp,
        });
    }

    pub fn remember_layouts(&mut self, layouts: &[EntityLayout]) {
        for layout in layouts {
            self.layouts.insert(layout.fingerprint(), layout.clone());
        }
    }

    pub fn recognize_layouts(&mut self, layouts: &[EntityLayout]) {
        self.remember_layouts(layouts);
        for layout in layouts {
            self.recognized.insert(layout.fingerprint());
        }
    }

    pub fn recognized_layouts(&self) -> Vec<EntityLayout> {
        self.recognized
            .iter()
            .filter_map(|fp| self.layouts.get(fp).cloned())
            .collect()
    }

    pub fn unrecognized(&self) -> Vec<UnrecognizedEntity> {
        let mut found: Vec<UnrecognizedEntity> = self
            .entities
            .values()
            .filter(|record| !self.recognized.contains(&record.fingerprint))
            .map(|record| UnrecognizedEntity {
                id: record.id,
                type_name: record.type_name.clone(),
                fingerprint: record.fingerprint,
                fields: self
                    .layouts
                    .get(&record.fingerprint)
                    .map(|l| l.fields.clone())
                    .unwrap_or_default(),
            })
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        found
    }
}
