//! Layout migration command.

use serde_json::{Value as JsonValue, json};

use chronicle_core::{CoreError, EntityId, EntityLayout};
use chronicle_engine::{
    Command, CommandError, EngineError, EventCausalityEstablished, EventStream, ProducedEvent,
    Repository, TypeDescriptor,
};
use chronicle_index::Predicate;
use tracing::debug;

use crate::events::{EntityLayoutIntroduced, EntityLayoutReplaced};

/// Stable type name of the migration command.
pub const MIGRATION_TYPE_NAME: &str = "chronicle.layout.migration";

/// Descriptor for the migration command type; registered by
/// [`crate::register`].
pub fn migration_descriptor() -> TypeDescriptor {
    TypeDescriptor::new(EntityLayout::new(
        MIGRATION_TYPE_NAME,
        [("old_type", "string"), ("new_type", "string")],
    ))
}

/// Replays every event of an old layout through a transformation into a new
/// layout, preserving causal provenance.
///
/// The whole rewrite runs under a lock keyed by the old type's name, so
/// concurrent migrations or writers of the old type cannot race it. Both
/// event types (old and new) must already be registered with the repository,
/// along with the ledger types via [`crate::register`].
pub struct LayoutMigration<F> {
    old_layout: EntityLayout,
    new_layout: EntityLayout,
    transform: F,
    include_layout: bool,
}

impl<F> LayoutMigration<F>
where
    F: Fn(&JsonValue) -> JsonValue + Send + Sync + 'static,
{
    pub fn new(old_layout: EntityLayout, new_layout: EntityLayout, transform: F) -> Self {
        Self {
            old_layout,
            new_layout,
            transform,
            include_layout: true,
        }
    }

    /// Keep the ledger to fingerprints only, without embedding full schemas.
    pub fn without_layouts(mut self) -> Self {
        self.include_layout = false;
        self
    }

    /// The introduction event id for a layout, reusing an existing ledger
    /// entry when the fingerprint was already seen.
    fn introduction(
        &self,
        repository: &Repository,
        layout: &EntityLayout,
        stream: &mut Vec<ProducedEvent>,
    ) -> Result<EntityId, EngineError> {
        let existing = repository.query(
            EntityLayoutIntroduced::TYPE_NAME,
            &Predicate::equal("fingerprint", json!(layout.fingerprint())),
        )?;
        if let Some(record) = existing.records().first() {
            return Ok(record.id);
        }

        let introduced = ProducedEvent::of(&EntityLayoutIntroduced {
            fingerprint: layout.fingerprint(),
            layout: self.include_layout.then(|| layout.clone()),
        })
        .map_err(EngineError::Codec)?;
        let id = introduced.id;
        stream.push(introduced);
        Ok(id)
    }

    fn replacement_exists(&self, repository: &Repository) -> Result<bool, EngineError> {
        let existing = repository.query(
            EntityLayoutReplaced::TYPE_NAME,
            &Predicate::equal("fingerprint", json!(self.old_layout.fingerprint())),
        )?;
        Ok(!existing.is_empty())
    }

    fn build_stream(&self, repository: &Repository) -> Result<EventStream<u64>, EngineError> {
        let mut stream = Vec::new();

        self.introduction(repository, &self.old_layout, &mut stream)?;
        let new_introduction = self.introduction(repository, &self.new_layout, &mut stream)?;

        // The old → new link is recorded exactly once, however many times
        // the migration runs.
        if !self.replacement_exists(repository)? {
            stream.push(
                ProducedEvent::of(&EntityLayoutReplaced {
                    fingerprint: self.old_layout.fingerprint(),
                    replacement: new_introduction,
                })
                .map_err(EngineError::Codec)?,
            );
        }

        let mut migrated = 0u64;
        for old_event in repository.events_of_type(&self.old_layout.type_name)? {
            let transformed = ProducedEvent::raw(
                self.new_layout.type_name.clone(),
                (self.transform)(&old_event.payload),
            );

            // Every command with provenance over the original event keeps it
            // over the transformed one.
            let causes = repository.commands_causing(old_event.id)?;
            let new_id = transformed.id;
            stream.push(transformed);
            for command in causes {
                stream.push(
                    ProducedEvent::of(&EventCausalityEstablished {
                        event: new_id,
                        command,
                    })
                    .map_err(EngineError::Codec)?,
                );
            }
            migrated += 1;
        }

        debug!(
            old = %self.old_layout.type_name,
            new = %self.new_layout.type_name,
            migrated,
            "layout migration stream built"
        );
        Ok(EventStream::with_state(migrated, stream))
    }
}

impl<F> Command for LayoutMigration<F>
where
    F: Fn(&JsonValue) -> JsonValue + Send + Sync + 'static,
{
    type State = u64;
    /// Number of events rewritten.
    type Output = u64;

    fn type_name(&self) -> &'static str {
        MIGRATION_TYPE_NAME
    }

    fn payload(&self) -> Result<JsonValue, CoreError> {
        Ok(json!({
            "old_type": self.old_layout.type_name,
            "new_type": self.new_layout.type_name,
        }))
    }

    fn lock_key(&self) -> Option<String> {
        Some(self.old_layout.type_name.clone())
    }

    fn events(&self, repository: &Repository) -> Result<EventStream<u64>, CommandError> {
        self.build_stream(repository)
            .map_err(|e| CommandError::new("chronicle::MigrationError", e.to_string()))
    }

    fn result(&self, migrated: u64, _repository: &Repository) -> u64 {
        migrated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde::{Deserialize, Serialize};
    use serde_json::json;

    use chronicle_engine::Event;
    use chronicle_hlc::ManualTimeProvider;
    use chronicle_index::{AttributeDescriptor, IndexFeature};
    use chronicle_journal::MemoryJournal;

    const OLD_EVENT: &str = "audit.trail.recorded";
    const NEW_EVENT: &str = "audit.trail.recorded.v2";

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct TrailRecorded {
        x: i64,
    }

    impl Event for TrailRecorded {
        fn event_type(&self) -> &'static str {
            OLD_EVENT
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct RecordTrail {
        x: i64,
    }

    impl Command for RecordTrail {
        type State = ();
        type Output = ();

        fn type_name(&self) -> &'static str {
            "audit.record_trail"
        }

        fn payload(&self) -> Result<JsonValue, CoreError> {
            serde_json::to_value(self).map_err(|e| CoreError::serialize(e.to_string()))
        }

        fn events(&self, _repository: &Repository) -> Result<EventStream<()>, CommandError> {
            Ok(EventStream::of(vec![
                ProducedEvent::of(&TrailRecorded { x: self.x })
                    .map_err(|e| CommandError::new("audit::Encode", e.to_string()))?,
            ]))
        }

        fn result(&self, _state: (), _repository: &Repository) {}
    }

    fn old_layout() -> EntityLayout {
        EntityLayout::new(OLD_EVENT, [("x", "i64")])
    }

    fn new_layout() -> EntityLayout {
        EntityLayout::new(NEW_EVENT, [("y", "i64")])
    }

    fn repository() -> Repository {
        let journal = Arc::new(MemoryJournal::new());
        let time = Arc::new(ManualTimeProvider::starting_at(1 << 32));
        let repository = Repository::open(journal, time).unwrap();

        crate::register(&repository).unwrap();
        repository
            .register_command_types(vec![TypeDescriptor::new(EntityLayout::new(
                "audit.record_trail",
                [("x", "i64")],
            ))])
            .unwrap();
        repository
            .register_event_types(vec![
                TypeDescriptor::new(old_layout())
                    .with_attribute(AttributeDescriptor::field("x", [IndexFeature::Equality])),
                TypeDescriptor::new(new_layout())
                    .with_attribute(AttributeDescriptor::field("y", [IndexFeature::Equality])),
            ])
            .unwrap();
        repository
    }

    fn migration() -> LayoutMigration<impl Fn(&JsonValue) -> JsonValue> {
        LayoutMigration::new(old_layout(), new_layout(), |payload| {
            json!({"y": payload["x"].as_i64().unwrap_or_default() + 1})
        })
    }

    #[test]
    fn migration_preserves_causality_across_the_rewrite() {
        let repository = repository();

        repository.publish(RecordTrail { x: 0 }).wait().unwrap();
        let old_event = repository.events_of_type(OLD_EVENT).unwrap().next().unwrap();
        let original_command = repository
            .commands_of_type("audit.record_trail")
            .unwrap()
            .next()
            .unwrap();
        assert_eq!(
            repository.commands_causing(old_event.id).unwrap(),
            vec![original_command.id]
        );

        let migrated = repository.publish(migration()).wait().unwrap();
        assert_eq!(migrated, 1);

        let new_event = repository.events_of_type(NEW_EVENT).unwrap().next().unwrap();
        assert_eq!(new_event.payload, json!({"y": 1}));

        // The transformed event is linked to both the original command and
        // the migration command.
        let migration_command = repository
            .commands_of_type(MIGRATION_TYPE_NAME)
            .unwrap()
            .next()
            .unwrap();
        let causes = repository.commands_causing(new_event.id).unwrap();
        assert_eq!(causes.len(), 2);
        assert!(causes.contains(&original_command.id));
        assert!(causes.contains(&migration_command.id));

        // The original event is untouched and still queryable.
        assert_eq!(repository.get(old_event.id).unwrap(), Some(old_event));
    }

    #[test]
    fn layout_ledger_records_the_replacement_exactly_once() {
        let repository = repository();
        repository.publish(RecordTrail { x: 3 }).wait().unwrap();

        repository.publish(migration()).wait().unwrap();
        repository.publish(migration()).wait().unwrap();

        // Introductions: one per fingerprint, not per run.
        let introduced: Vec<_> = repository
            .events_of_type(EntityLayoutIntroduced::TYPE_NAME)
            .unwrap()
            .collect();
        assert_eq!(introduced.len(), 2);

        // The old → new replacement link exists exactly once.
        let replaced: Vec<_> = repository
            .events_of_type(EntityLayoutReplaced::TYPE_NAME)
            .unwrap()
            .collect();
        assert_eq!(replaced.len(), 1);
        assert_eq!(
            replaced[0].payload["fingerprint"],
            json!(old_layout().fingerprint())
        );
    }

    #[test]
    fn migrating_an_empty_history_only_updates_the_ledger() {
        let repository = repository();
        let migrated = repository.publish(migration()).wait().unwrap();
        assert_eq!(migrated, 0);
        assert!(repository.events_of_type(NEW_EVENT).unwrap().next().is_none());
        assert_eq!(
            repository
                .events_of_type(EntityLayoutReplaced::TYPE_NAME)
                .unwrap()
                .count(),
            1
        );
    }

    #[test]
    fn concurrent_old_type_writers_cannot_race_the_rewrite() {
        let repository = repository();
        repository.publish(RecordTrail { x: 1 }).wait().unwrap();

        // The migration holds the old type's name as its lock key; a writer
        // declaring the same key serializes against it.
        let m = repository.publish(migration());
        let w = repository.publish(LockedRecordTrail { x: 2 });
        m.wait().unwrap();
        w.wait().unwrap();

        assert_eq!(repository.size(OLD_EVENT).unwrap(), 2);
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct LockedRecordTrail {
        x: i64,
    }

    impl Command for LockedRecordTrail {
        type State = ();
        type Output = ();

        fn type_name(&self) -> &'static str {
            "audit.record_trail"
        }

        fn payload(&self) -> Result<JsonValue, CoreError> {
            serde_json::to_value(self).map_err(|e| CoreError::serialize(e.to_string()))
        }

        fn lock_key(&self) -> Option<String> {
            Some(OLD_EVENT.to_string())
        }

        fn events(&self, _repository: &Repository) -> Result<EventStream<()>, CommandError> {
            Ok(EventStream::of(vec![
                ProducedEvent::of(&TrailRecorded { x: self.x })
                    .map_err(|e| CommandError::new("audit::Encode", e.to_string()))?,
            ]))
        }

        fn result(&self, _state: (), _repository: &Repository) {}
    }

    #[test]
    fn registration_is_required_before_migrating() {
        let journal = Arc::new(MemoryJournal::new());
        let time = Arc::new(ManualTimeProvider::starting_at(1 << 32));
        let repository = Repository::open(journal, time).unwrap();

        // Without `register`, the migration command type is unknown.
        let outcome = repository.publish(migration()).wait();
        assert!(matches!(outcome, Err(EngineError::UnregisteredType(_))));
    }
}
