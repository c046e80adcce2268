//! The repository: locks, execution, timestamps, journal, indexes,
//! causality, completion.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;

use tracing::{debug, warn};

use chronicle_core::{
    EntityCodec, EntityId, EntityKind, EntityRecord, HybridTimestamp, JsonCodec,
};
use chronicle_hlc::{HybridClock, PhysicalTimeProvider};
use chronicle_index::{
    ContentMap, EntityIndex, IndexFeature, IndexRegistry, MemoryEqualityIndex,
    MemoryNavigableIndex, Predicate, ResultSet, UniqueHashIndex,
};
use chronicle_journal::{EntityIter, Journal, UnrecognizedEntity};

use crate::command::{Command, ProducedEvent};
use crate::error::EngineError;
use crate::events::{
    self, CommandTerminatedExceptionally, EventCausalityEstablished, ExceptionOccurred,
};
use crate::future::CommandFuture;
use crate::lock::LockProvider;
use crate::pool::WorkerPool;
use crate::registry::{TypeDescriptor, TypeRegistry};

/// Construction options for a [`Repository`].
pub struct RepositoryOptions {
    /// Codec used for index persistence.
    pub codec: Arc<dyn EntityCodec>,
    /// Number of pipeline worker threads.
    pub workers: usize,
    /// Directory for persistent index stores; `None` keeps every index in
    /// memory (they are rebuilt from the journal at registration).
    pub index_dir: Option<PathBuf>,
}

impl Default for RepositoryOptions {
    fn default() -> Self {
        Self {
            codec: Arc::new(JsonCodec::new()),
            workers: default_workers(),
            index_dir: None,
        }
    }
}

fn default_workers() -> usize {
    thread::available_parallelism()
        .map(|n| n.get().min(8))
        .unwrap_or(4)
}

struct Inner {
    journal: Arc<dyn Journal>,
    indexes: IndexRegistry,
    types: TypeRegistry,
    locks: LockProvider,
    clock: Mutex<HybridClock>,
    codec: Arc<dyn EntityCodec>,
    index_dir: Option<PathBuf>,
    pool: WorkerPool,
}

/// The engine's orchestrator.
///
/// Cloning is cheap (shared handle); every clone publishes into the same
/// journal, indexes, and clock.
#[derive(Clone)]
pub struct Repository {
    inner: Arc<Inner>,
}

impl Repository {
    /// Open a repository over `journal`, resuming the clock from the
    /// journal's last committed position.
    pub fn open(
        journal: Arc<dyn Journal>,
        time_provider: Arc<dyn PhysicalTimeProvider>,
    ) -> Result<Self, EngineError> {
        Self::open_with(journal, time_provider, RepositoryOptions::default())
    }

    pub fn open_with(
        journal: Arc<dyn Journal>,
        time_provider: Arc<dyn PhysicalTimeProvider>,
        options: RepositoryOptions,
    ) -> Result<Self, EngineError> {
        let starting = journal
            .repository_timestamp()?
            .unwrap_or(HybridTimestamp::ZERO);

        let repository = Self {
            inner: Arc::new(Inner {
                journal,
                indexes: IndexRegistry::new(),
                types: TypeRegistry::new(),
                locks: LockProvider::new(),
                clock: Mutex::new(HybridClock::starting_at(time_provider, starting)),
                codec: options.codec,
                index_dir: options.index_dir,
                pool: WorkerPool::new(options.workers),
            }),
        };

        repository.register_event_types(events::system_event_descriptors())?;
        Ok(repository)
    }

    /// Register command types: the type registry, the journal's per-type
    /// storage, and indexes for every declared attribute.
    pub fn register_command_types(
        &self,
        descriptors: Vec<TypeDescriptor>,
    ) -> Result<(), EngineError> {
        let layouts = self.inner.types.add_commands(descriptors.clone())?;
        self.inner.journal.on_command_types_added(&layouts)?;
        for descriptor in &descriptors {
            self.install_indexes(descriptor, EntityKind::Command)?;
        }
        Ok(())
    }

    /// Register event types, as [`register_command_types`](Self::register_command_types)
    /// does for commands.
    pub fn register_event_types(
        &self,
        descriptors: Vec<TypeDescriptor>,
    ) -> Result<(), EngineError> {
        let layouts = self.inner.types.add_events(descriptors.clone())?;
        self.inner.journal.on_event_types_added(&layouts)?;
        for descriptor in &descriptors {
            self.install_indexes(descriptor, EntityKind::Event)?;
        }
        Ok(())
    }

    /// Register a custom index and seed it from the journal.
    pub fn register_index(
        &self,
        type_name: &str,
        index: Arc<dyn EntityIndex>,
    ) -> Result<(), EngineError> {
        self.seed_index(type_name, index.as_ref())?;
        self.inner.indexes.register(type_name, index)?;
        Ok(())
    }

    /// Create the index each declared attribute asks for: unique attributes
    /// get the persistent content-addressed index, ranged attributes a
    /// navigable index, the rest an equality index.
    fn install_indexes(
        &self,
        descriptor: &TypeDescriptor,
        kind: EntityKind,
    ) -> Result<(), EngineError> {
        let type_name = descriptor.type_name();
        for attribute in &descriptor.attributes {
            let index: Arc<dyn EntityIndex> = if attribute.supports(IndexFeature::Unique) {
                let map = match &self.inner.index_dir {
                    Some(dir) => ContentMap::open(
                        dir.join(format!("{type_name}.{}.unique.idx", attribute.name())),
                    )?,
                    None => ContentMap::in_memory(),
                };
                Arc::new(UniqueHashIndex::new(
                    attribute.clone(),
                    self.inner.codec.clone(),
                    map,
                ))
            } else if attribute.supports(IndexFeature::Range) {
                Arc::new(MemoryNavigableIndex::new(attribute.clone()))
            } else {
                Arc::new(MemoryEqualityIndex::new(attribute.clone()))
            };

            let existing = match kind {
                EntityKind::Event => self.inner.journal.event_iter(type_name)?,
                EntityKind::Command => self.inner.journal.command_iter(type_name)?,
            };
            let existing: Vec<EntityRecord> = existing.collect();
            if !existing.is_empty() {
                index.add_all(&existing)?;
            }
            self.inner.indexes.register(type_name, index)?;
        }
        Ok(())
    }

    fn seed_index(&self, type_name: &str, index: &dyn EntityIndex) -> Result<(), EngineError> {
        let mut records: Vec<EntityRecord> = self.inner.journal.event_iter(type_name)?.collect();
        records.extend(self.inner.journal.command_iter(type_name)?);
        if !records.is_empty() {
            index.init(&records)?;
        }
        Ok(())
    }

    /// Publish a command through the commit pipeline.
    ///
    /// Returns immediately; the future resolves to the command's declared
    /// result, or rejects with the original failure once the failure has
    /// been audited as a diagnostic event.
    pub fn publish<C: Command>(&self, command: C) -> CommandFuture<C::Output> {
        let (future, completer) = CommandFuture::channel();
        let repository = self.clone();
        self.inner.pool.execute(move || {
            let outcome = repository.run_pipeline(&command);
            completer.complete(outcome);
        });
        future
    }

    fn run_pipeline<C: Command>(&self, command: &C) -> Result<C::Output, EngineError> {
        let descriptor = self
            .inner
            .types
            .command(command.type_name())?
            .ok_or_else(|| EngineError::UnregisteredType(command.type_name().to_string()))?;

        // 1. Lock. The guard releases on every path out of this function.
        let _guard = command.lock_key().map(|key| self.inner.locks.lock(&key));

        let command_id = EntityId::new();
        let command_timestamp = self.tick()?;
        let command_record = match command.payload() {
            Ok(payload) => EntityRecord::new(
                command_id,
                EntityKind::Command,
                command.type_name(),
                descriptor.fingerprint(),
                command_timestamp,
                payload,
            ),
            Err(error) => {
                warn!(command = command.type_name(), error = %error, "command payload rejected");
                return Err(EngineError::Codec(error));
            }
        };

        match self.execute_and_commit(command, command_id, &command_record) {
            Ok(state) => {
                debug!(command = command.type_name(), id = %command_id, "command committed");
                // 7. Complete.
                Ok(command.result(state, self))
            }
            Err(error) => {
                // 8. Failure path: audit, then surface the original error.
                self.audit_failure(command_id, &command_record, &error);
                Err(error)
            }
        }
    }

    fn execute_and_commit<C: Command>(
        &self,
        command: &C,
        command_id: EntityId,
        command_record: &EntityRecord,
    ) -> Result<C::State, EngineError> {
        // 2. Execute, with read access to current repository state.
        let stream = command.events(self).map_err(EngineError::Command)?;
        let (state, events) = stream.into_parts();

        // 3–6. Timestamp, journal, index, causality.
        self.commit_unit(Some(command_record.clone()), command_id, events)?;
        Ok(state)
    }

    /// One effective unit of work: timestamp and journal the produced
    /// events, a causality record per event, and (unless already durable)
    /// the command; then, after the commit boundary, index everything.
    fn commit_unit(
        &self,
        command_record: Option<EntityRecord>,
        command_id: EntityId,
        events: Vec<ProducedEvent>,
    ) -> Result<(), EngineError> {
        let causality_descriptor = self
            .inner
            .types
            .event(EventCausalityEstablished::TYPE_NAME)?
            .ok_or_else(|| {
                EngineError::UnregisteredType(EventCausalityEstablished::TYPE_NAME.to_string())
            })?;

        let mut tx = self.inner.journal.begin_transaction();
        let mut staged: HashMap<String, Vec<EntityRecord>> = HashMap::new();

        for produced in events {
            let descriptor = self
                .inner
                .types
                .event(&produced.type_name)?
                .ok_or_else(|| EngineError::UnregisteredType(produced.type_name.clone()))?;

            // 3. Timestamp in emission order.
            let record = EntityRecord::new(
                produced.id,
                EntityKind::Event,
                produced.type_name.clone(),
                descriptor.fingerprint(),
                self.tick()?,
                produced.payload,
            );
            tx.record_event(record.clone());
            staged.entry(record.type_name.clone()).or_default().push(record);

            // 6. Causality shares the unit of work, so it shares the
            // atomicity guarantee.
            let causality = EventCausalityEstablished {
                event: produced.id,
                command: command_id,
            };
            let causality_record = EntityRecord::new(
                EntityId::new(),
                EntityKind::Event,
                EventCausalityEstablished::TYPE_NAME,
                causality_descriptor.fingerprint(),
                self.tick()?,
                serde_json::to_value(&causality)
                    .map_err(|e| EngineError::Codec(chronicle_core::CoreError::serialize(e.to_string())))?,
            );
            tx.record_event(causality_record.clone());
            staged
                .entry(causality_record.type_name.clone())
                .or_default()
                .push(causality_record);
        }

        if let Some(record) = &command_record {
            tx.record_command(record.clone())?;
        }

        // 4. Journal commit is the atomicity boundary: a failure here leaves
        // nothing visible, and nothing reaches an index.
        self.inner.journal.commit(tx)?;

        // 5. Index only after the unit is durable.
        for (type_name, records) in &staged {
            self.inner.indexes.add_all(type_name, records)?;
        }
        if let Some(record) = &command_record {
            self.inner
                .indexes
                .add_all(&record.type_name, std::slice::from_ref(record))?;
        }

        let high_water = {
            let clock = self.inner.clock.lock().map_err(|_| EngineError::Poisoned)?;
            clock.now()
        };
        self.inner.journal.set_repository_timestamp(high_water)?;
        Ok(())
    }

    /// Record a command failure as durable, indexed diagnostic events.
    ///
    /// The failure itself still reaches the publisher; these events exist so
    /// operators can audit what went wrong.
    fn audit_failure(&self, command_id: EntityId, command_record: &EntityRecord, error: &EngineError) {
        // An index failure happens after the journal commit, so the command
        // record is already durable; everything else failed before it.
        let command_record = match error {
            EngineError::Index(_) => None,
            _ => Some(command_record.clone()),
        };

        let termination = ProducedEvent::of(&CommandTerminatedExceptionally {});
        let diagnostic =
            ProducedEvent::of(&ExceptionOccurred::new(error.kind(), error.to_string()));
        let events = match (termination, diagnostic) {
            (Ok(termination), Ok(diagnostic)) => vec![termination, diagnostic],
            (t, d) => {
                warn!(command = %command_id, ?t, ?d, "failure audit events could not be encoded");
                return;
            }
        };

        if let Err(audit_error) = self.commit_unit(command_record, command_id, events) {
            warn!(
                command = %command_id,
                error = %audit_error,
                "failure audit could not be journaled"
            );
        }
    }

    fn tick(&self) -> Result<HybridTimestamp, EngineError> {
        let mut clock = self.inner.clock.lock().map_err(|_| EngineError::Poisoned)?;
        Ok(clock.update()?)
    }

    /// Query entities of one type with an equality or range predicate.
    ///
    /// The cheapest index able to answer is preferred; otherwise the journal
    /// is scanned through the type's declared attribute.
    pub fn query(&self, type_name: &str, predicate: &Predicate) -> Result<ResultSet, EngineError> {
        if let Some(index) = self.inner.indexes.plan(type_name, predicate)? {
            return Ok(index.retrieve(predicate)?);
        }

        let descriptor = self
            .inner
            .types
            .any(type_name)?
            .ok_or_else(|| EngineError::UnregisteredType(type_name.to_string()))?;
        let attribute = descriptor.attribute(predicate.attribute()).ok_or_else(|| {
            EngineError::UnknownAttribute {
                type_name: type_name.to_string(),
                attribute: predicate.attribute().to_string(),
            }
        })?;

        let mut records = Vec::new();
        for record in self
            .inner
            .journal
            .event_iter(type_name)?
            .chain(self.inner.journal.command_iter(type_name)?)
        {
            if predicate.matches(attribute, &record.payload) {
                records.push(record);
            }
        }
        Ok(ResultSet::new(records))
    }

    /// Retrieve a command or event by identity.
    pub fn get(&self, id: EntityId) -> Result<Option<EntityRecord>, EngineError> {
        Ok(self.inner.journal.get(id)?)
    }

    /// All events of one type, in journal order.
    pub fn events_of_type(&self, type_name: &str) -> Result<EntityIter, EngineError> {
        Ok(self.inner.journal.event_iter(type_name)?)
    }

    /// All commands of one type, in journal order.
    pub fn commands_of_type(&self, type_name: &str) -> Result<EntityIter, EngineError> {
        Ok(self.inner.journal.command_iter(type_name)?)
    }

    /// The events a committed command produced.
    pub fn events_of_command(&self, id: EntityId) -> Result<EntityIter, EngineError> {
        Ok(self.inner.journal.events_of_command(id)?)
    }

    /// The commands causally linked to an event.
    pub fn commands_causing(&self, event: EntityId) -> Result<Vec<EntityId>, EngineError> {
        let result = self.query(
            EventCausalityEstablished::TYPE_NAME,
            &Predicate::equal("event", serde_json::json!(event)),
        )?;
        result
            .into_iter()
            .map(|record| {
                record
                    .decode::<EventCausalityEstablished>()
                    .map(|causality| causality.command)
                    .map_err(EngineError::Codec)
            })
            .collect()
    }

    pub fn size(&self, type_name: &str) -> Result<u64, EngineError> {
        Ok(self.inner.journal.size(type_name)?)
    }

    pub fn is_empty(&self, type_name: &str) -> Result<bool, EngineError> {
        Ok(self.inner.journal.is_empty(type_name)?)
    }

    /// Entities whose schema no registered type claims.
    pub fn unrecognized_entities(&self) -> Result<Vec<UnrecognizedEntity>, EngineError> {
        Ok(self.inner.journal.unrecognized_entities()?)
    }

    /// The clock's current position (diagnostics/tests).
    pub fn timestamp(&self) -> Result<HybridTimestamp, EngineError> {
        let clock = self.inner.clock.lock().map_err(|_| EngineError::Poisoned)?;
        Ok(clock.now())
    }

    pub fn journal(&self) -> &Arc<dyn Journal> {
        &self.inner.journal
    }

    pub fn codec(&self) -> Arc<dyn EntityCodec> {
        self.inner.codec.clone()
    }

    pub fn lock_provider(&self) -> &LockProvider {
        &self.inner.locks
    }
}

impl core::fmt::Debug for Repository {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Repository")
            .field("journal", &"<dyn Journal>")
            .field("indexes", &self.inner.indexes)
            .finish_non_exhaustive()
    }
}
