//! Integration tests for the full commit pipeline.
//!
//! Command → lock → execute → timestamp → journal → index → causality →
//! result, plus the failure paths.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

use chronicle_core::{CoreError, EntityLayout};
use chronicle_hlc::ManualTimeProvider;
use chronicle_index::{AttributeDescriptor, IndexError, IndexFeature, Predicate};
use chronicle_journal::{FailingJournal, FileJournal, Journal, MemoryJournal};

use crate::command::{Command, Event, EventStream, ProducedEvent};
use crate::error::{CommandError, EngineError};
use crate::events::{CommandTerminatedExceptionally, ExceptionOccurred};
use crate::registry::TypeDescriptor;
use crate::repository::Repository;

const ACCOUNT_OPENED: &str = "ledger.account.opened";
const OPEN_ACCOUNT: &str = "ledger.open_account";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct AccountOpened {
    owner: String,
    number: u64,
}

impl Event for AccountOpened {
    fn event_type(&self) -> &'static str {
        ACCOUNT_OPENED
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenAccount {
    owner: String,
    number: u64,
}

impl Command for OpenAccount {
    type State = ();
    type Output = u64;

    fn type_name(&self) -> &'static str {
        OPEN_ACCOUNT
    }

    fn payload(&self) -> Result<JsonValue, CoreError> {
        serde_json::to_value(self).map_err(|e| CoreError::serialize(e.to_string()))
    }

    fn lock_key(&self) -> Option<String> {
        Some(format!("account:{}", self.number))
    }

    fn events(&self, _repository: &Repository) -> Result<EventStream<()>, CommandError> {
        if self.owner.trim().is_empty() {
            return Err(CommandError::new("ledger::EmptyOwner", "owner cannot be empty"));
        }
        Ok(EventStream::of(vec![
            ProducedEvent::of(&AccountOpened {
                owner: self.owner.clone(),
                number: self.number,
            })
            .map_err(|e| CommandError::new("ledger::Encode", e.to_string()))?,
        ]))
    }

    fn result(&self, _state: (), _repository: &Repository) -> u64 {
        self.number
    }
}

fn account_opened_descriptor() -> TypeDescriptor {
    TypeDescriptor::new(EntityLayout::new(
        ACCOUNT_OPENED,
        [("owner", "string"), ("number", "u64")],
    ))
    .with_attribute(AttributeDescriptor::field(
        "owner",
        [IndexFeature::Equality, IndexFeature::Unique],
    ))
    .with_attribute(AttributeDescriptor::field("number", [IndexFeature::Equality]))
}

fn open_account_descriptor() -> TypeDescriptor {
    TypeDescriptor::new(EntityLayout::new(
        OPEN_ACCOUNT,
        [("owner", "string"), ("number", "u64")],
    ))
}

fn repository_over(journal: Arc<dyn Journal>) -> Repository {
    let time = Arc::new(ManualTimeProvider::starting_at(1 << 32));
    let repository = Repository::open(journal, time).unwrap();
    repository
        .register_command_types(vec![open_account_descriptor()])
        .unwrap();
    repository
        .register_event_types(vec![account_opened_descriptor()])
        .unwrap();
    repository
}

#[test]
fn publish_journals_indexes_and_links_causality() {
    let journal = Arc::new(MemoryJournal::new());
    let repository = repository_over(journal.clone());

    let number = repository
        .publish(OpenAccount {
            owner: "alice".to_string(),
            number: 7,
        })
        .wait()
        .unwrap();
    assert_eq!(number, 7);

    // The event answers an indexed equality query.
    let result = repository
        .query(ACCOUNT_OPENED, &Predicate::equal("owner", "alice"))
        .unwrap();
    let event = result.unique_result().unwrap();
    assert_eq!(event.payload, json!({"owner": "alice", "number": 7}));

    // Both the event and the command are retrievable by identity.
    assert!(repository.get(event.id).unwrap().is_some());
    let command = repository
        .commands_of_type(OPEN_ACCOUNT)
        .unwrap()
        .next()
        .expect("command journaled");
    // The unit of work holds the domain event plus its causality record.
    let produced: Vec<_> = repository.events_of_command(command.id).unwrap().collect();
    assert_eq!(produced.len(), 2);
    assert_eq!(
        produced
            .iter()
            .filter(|r| r.type_name == ACCOUNT_OPENED)
            .map(|r| r.id)
            .collect::<Vec<_>>(),
        vec![event.id]
    );

    // Causality links the event back to its command.
    assert_eq!(repository.commands_causing(event.id).unwrap(), vec![command.id]);

    // Events from one command are strictly timestamp-ordered after it.
    assert!(event.timestamp > command.timestamp);
}

#[test]
fn duplicate_unique_attribute_rejects_the_later_command() {
    let journal = Arc::new(MemoryJournal::new());
    let repository = repository_over(journal);

    repository
        .publish(OpenAccount {
            owner: "alice".to_string(),
            number: 1,
        })
        .wait()
        .unwrap();

    let outcome = repository
        .publish(OpenAccount {
            owner: "alice".to_string(),
            number: 2,
        })
        .wait();
    assert!(matches!(
        outcome,
        Err(EngineError::Index(IndexError::UniqueViolation { .. }))
    ));

    // The index still maps the owner to the first account only.
    let result = repository
        .query(ACCOUNT_OPENED, &Predicate::equal("owner", "alice"))
        .unwrap();
    assert_eq!(result.unique_result().unwrap().payload["number"], json!(1));
}

#[test]
fn journal_commit_failure_leaves_the_journal_untouched() {
    let journal = Arc::new(FailingJournal::new(MemoryJournal::new()));
    let repository = repository_over(journal.clone());

    journal.fail_commits(true);
    let outcome = repository
        .publish(OpenAccount {
            owner: "alice".to_string(),
            number: 7,
        })
        .wait();

    assert!(matches!(outcome, Err(EngineError::Journal(_))));
    // No event, no command, no diagnostic: the failure audit hit the same
    // broken journal and gave up without partial state.
    assert!(repository.is_empty(ACCOUNT_OPENED).unwrap());
    assert!(repository.is_empty(OPEN_ACCOUNT).unwrap());
    assert!(repository
        .is_empty(CommandTerminatedExceptionally::TYPE_NAME)
        .unwrap());

    // The same command succeeds once the store recovers.
    journal.fail_commits(false);
    repository
        .publish(OpenAccount {
            owner: "alice".to_string(),
            number: 7,
        })
        .wait()
        .unwrap();
    assert_eq!(repository.size(ACCOUNT_OPENED).unwrap(), 1);
}

#[test]
fn execution_failure_is_audited_and_surfaced_unchanged() {
    let journal = Arc::new(MemoryJournal::new());
    let repository = repository_over(journal);

    let outcome = repository
        .publish(OpenAccount {
            owner: "   ".to_string(),
            number: 7,
        })
        .wait();

    match outcome {
        Err(EngineError::Command(error)) => {
            assert_eq!(error.type_name, "ledger::EmptyOwner");
            assert_eq!(error.message, "owner cannot be empty");
        }
        other => panic!("expected the original command error, got {other:?}"),
    }

    // No domain event was recorded, but the failure audit was.
    assert!(repository.is_empty(ACCOUNT_OPENED).unwrap());
    assert_eq!(
        repository.size(CommandTerminatedExceptionally::TYPE_NAME).unwrap(),
        1
    );
    let diagnostic = repository
        .events_of_type(ExceptionOccurred::TYPE_NAME)
        .unwrap()
        .next()
        .expect("diagnostic journaled");
    assert_eq!(diagnostic.payload["error_type"], json!("ledger::EmptyOwner"));
    assert_eq!(diagnostic.payload["message"], json!("owner cannot be empty"));

    // Both audit events are causally linked to the failed command.
    let command = repository
        .commands_of_type(OPEN_ACCOUNT)
        .unwrap()
        .next()
        .expect("failed command still journaled");
    assert_eq!(
        repository.commands_causing(diagnostic.id).unwrap(),
        vec![command.id]
    );
}

#[derive(Debug)]
struct SlowCommand {
    key: Option<String>,
    windows: Arc<Mutex<Vec<(Instant, Instant)>>>,
}

impl Command for SlowCommand {
    type State = ();
    type Output = ();

    fn type_name(&self) -> &'static str {
        "ledger.slow"
    }

    fn payload(&self) -> Result<JsonValue, CoreError> {
        Ok(json!({"key": self.key}))
    }

    fn lock_key(&self) -> Option<String> {
        self.key.clone()
    }

    fn events(&self, _repository: &Repository) -> Result<EventStream<()>, CommandError> {
        let start = Instant::now();
        std::thread::sleep(Duration::from_millis(20));
        self.windows
            .lock()
            .expect("window log")
            .push((start, Instant::now()));
        Ok(EventStream::empty())
    }

    fn result(&self, _state: (), _repository: &Repository) {}
}

#[test]
fn commands_sharing_a_lock_key_never_overlap() {
    let journal = Arc::new(MemoryJournal::new());
    let repository = repository_over(journal);
    repository
        .register_command_types(vec![TypeDescriptor::new(EntityLayout::new(
            "ledger.slow",
            [("key", "string")],
        ))])
        .unwrap();

    let windows = Arc::new(Mutex::new(Vec::new()));
    let futures: Vec<_> = (0..4)
        .map(|_| {
            repository.publish(SlowCommand {
                key: Some("aggregate:1".to_string()),
                windows: windows.clone(),
            })
        })
        .collect();
    for future in &futures {
        future.wait().unwrap();
    }

    let windows = windows.lock().unwrap();
    assert_eq!(windows.len(), 4);
    for (i, (start_a, end_a)) in windows.iter().enumerate() {
        for (start_b, end_b) in windows.iter().skip(i + 1) {
            let overlap = start_a < end_b && start_b < end_a;
            assert!(!overlap, "execution windows overlapped under a shared lock key");
        }
    }
}

#[test]
fn clock_resumes_past_persisted_history_after_restart() {
    let journal = Arc::new(MemoryJournal::new());

    let first_event_ts = {
        let repository = repository_over(journal.clone());
        repository
            .publish(OpenAccount {
                owner: "alice".to_string(),
                number: 1,
            })
            .wait()
            .unwrap();
        repository
            .events_of_type(ACCOUNT_OPENED)
            .unwrap()
            .next()
            .unwrap()
            .timestamp
    };

    // Reopen with a physical clock stuck at zero: the resumed logical clock
    // must still move strictly past everything already committed.
    let time = Arc::new(ManualTimeProvider::new());
    let repository = Repository::open(journal, time).unwrap();
    repository
        .register_command_types(vec![open_account_descriptor()])
        .unwrap();
    repository
        .register_event_types(vec![account_opened_descriptor()])
        .unwrap();

    repository
        .publish(OpenAccount {
            owner: "bob".to_string(),
            number: 2,
        })
        .wait()
        .unwrap();

    let mut timestamps: Vec<_> = repository
        .events_of_type(ACCOUNT_OPENED)
        .unwrap()
        .map(|r| r.timestamp)
        .collect();
    timestamps.sort();
    assert_eq!(timestamps.first(), Some(&first_event_ts));
    assert!(timestamps[1] > first_event_ts);
}

#[test]
fn range_queries_fall_back_to_a_journal_scan() {
    let journal = Arc::new(MemoryJournal::new());
    let repository = repository_over(journal);

    for (owner, number) in [("alice", 3), ("bob", 14), ("carol", 25)] {
        repository
            .publish(OpenAccount {
                owner: owner.to_string(),
                number,
            })
            .wait()
            .unwrap();
    }

    // "number" only declares equality support, so no index accelerates a
    // range predicate; the scan through the declared attribute still answers.
    let result = repository
        .query(
            ACCOUNT_OPENED,
            &Predicate::range("number", Some(json!(10)), Some(json!(20))),
        )
        .unwrap();
    assert_eq!(result.unique_result().unwrap().payload["owner"], json!("bob"));
}

#[test]
fn durable_state_and_uniqueness_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let journal_path = dir.path().join("journal.log");
    let index_dir = dir.path().join("indexes");
    std::fs::create_dir_all(&index_dir).unwrap();

    let open = |path: &std::path::Path, index_dir: &std::path::Path| {
        let journal = Arc::new(FileJournal::open(path).unwrap());
        let time = Arc::new(ManualTimeProvider::starting_at(1 << 32));
        let repository = Repository::open_with(
            journal,
            time,
            crate::repository::RepositoryOptions {
                index_dir: Some(index_dir.to_path_buf()),
                ..Default::default()
            },
        )
        .unwrap();
        repository
            .register_command_types(vec![open_account_descriptor()])
            .unwrap();
        repository
            .register_event_types(vec![account_opened_descriptor()])
            .unwrap();
        repository
    };

    let event_id = {
        let repository = open(&journal_path, &index_dir);
        repository
            .publish(OpenAccount {
                owner: "alice".to_string(),
                number: 7,
            })
            .wait()
            .unwrap();
        repository
            .events_of_type(ACCOUNT_OPENED)
            .unwrap()
            .next()
            .unwrap()
            .id
    };

    let repository = open(&journal_path, &index_dir);

    // The event came back with identical fields.
    let event = repository.get(event_id).unwrap().expect("event survived");
    assert_eq!(event.payload, json!({"owner": "alice", "number": 7}));

    // The persistent unique index still knows the owner is taken.
    let outcome = repository
        .publish(OpenAccount {
            owner: "alice".to_string(),
            number: 8,
        })
        .wait();
    assert!(matches!(
        outcome,
        Err(EngineError::Index(IndexError::UniqueViolation { .. }))
    ));
}

#[test]
fn unregistered_commands_are_rejected() {
    let journal = Arc::new(MemoryJournal::new());
    let time = Arc::new(ManualTimeProvider::starting_at(1 << 32));
    let repository = Repository::open(journal, time).unwrap();

    let outcome = repository
        .publish(OpenAccount {
            owner: "alice".to_string(),
            number: 7,
        })
        .wait();
    assert!(matches!(outcome, Err(EngineError::UnregisteredType(_))));
}
