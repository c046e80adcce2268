//! Commands, events, and the stream carrier between them.

use serde::Serialize;
use serde_json::Value as JsonValue;

use chronicle_core::{CoreError, EntityId};

use crate::error::CommandError;
use crate::repository::Repository;

/// A typed event payload.
///
/// Events are immutable facts: identity and timestamp are assigned by the
/// pipeline at commit, the payload never changes afterwards.
pub trait Event: Serialize + Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event type identifier (e.g. `"ledger.account.opened"`).
    fn event_type(&self) -> &'static str;
}

/// An event produced by a command, not yet committed.
///
/// The identity is assigned at construction, before journaling, so other
/// produced events (causality links, migrations) can refer to it.
#[derive(Debug, Clone, PartialEq)]
pub struct ProducedEvent {
    pub id: EntityId,
    pub type_name: String,
    pub payload: JsonValue,
}

impl ProducedEvent {
    /// Wrap a typed event.
    pub fn of<E: Event>(event: &E) -> Result<Self, CoreError> {
        let payload = serde_json::to_value(event)
            .map_err(|e| CoreError::serialize(format!("{}: {e}", event.event_type())))?;
        Ok(Self::raw(event.event_type(), payload))
    }

    /// Wrap an already-encoded payload (migrations re-emitting transformed
    /// history use this).
    pub fn raw(type_name: impl Into<String>, payload: JsonValue) -> Self {
        Self {
            id: EntityId::new(),
            type_name: type_name.into(),
            payload,
        }
    }
}

/// An ordered stream of produced events plus a typed carrier value, passed
/// from a command's execution to its result function.
#[derive(Debug)]
pub struct EventStream<S> {
    state: S,
    events: Vec<ProducedEvent>,
}

impl EventStream<()> {
    pub fn empty() -> Self {
        Self::of(Vec::new())
    }

    pub fn of(events: Vec<ProducedEvent>) -> Self {
        Self::with_state((), events)
    }
}

impl<S> EventStream<S> {
    pub fn with_state(state: S, events: Vec<ProducedEvent>) -> Self {
        Self { state, events }
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn events(&self) -> &[ProducedEvent] {
        &self.events
    }

    pub fn push(&mut self, event: ProducedEvent) {
        self.events.push(event);
    }

    pub fn into_parts(self) -> (S, Vec<ProducedEvent>) {
        (self.state, self.events)
    }
}

/// A request for changes in the domain. Unlike an event, it is not a
/// statement of fact: it may be rejected.
///
/// Commands declare a lock key when their correctness depends on not racing
/// another command over the same aggregate; commands with distinct keys (or
/// none) run fully concurrently.
pub trait Command: Send + Sync + 'static {
    /// Intermediate state handed from [`events`](Self::events) to
    /// [`result`](Self::result).
    type State: Send + 'static;

    /// The command's public result, delivered through the publish future.
    type Output: Send + 'static;

    /// Stable command type identifier (e.g. `"ledger.open_account"`).
    fn type_name(&self) -> &'static str;

    /// The command's durable payload.
    fn payload(&self) -> Result<JsonValue, CoreError>;

    /// Resource key serializing this command against others sharing it.
    fn lock_key(&self) -> Option<String> {
        None
    }

    /// Compute the events this command records, optionally reading current
    /// repository state first.
    ///
    /// Rejecting the command means returning an error: nothing is recorded
    /// beyond the failure audit.
    fn events(&self, repository: &Repository) -> Result<EventStream<Self::State>, CommandError>;

    /// Produce the command's public result once all events are durable.
    fn result(&self, state: Self::State, repository: &Repository) -> Self::Output;
}
