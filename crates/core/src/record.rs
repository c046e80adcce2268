//! Durable entity records.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::id::EntityId;
use crate::layout::Fingerprint;
use crate::timestamp::HybridTimestamp;

/// Whether a record holds a command (an intention) or an event (a fact).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Command,
    Event,
}

/// The durable form of a command or event.
///
/// Records are immutable once committed: the id and timestamp are assigned
/// exactly once by the publishing pipeline, and further facts (e.g. layout
/// replacement) supersede a record logically instead of mutating it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: EntityId,
    pub kind: EntityKind,
    pub type_name: String,
    pub fingerprint: Fingerprint,
    pub timestamp: HybridTimestamp,
    pub payload: JsonValue,
}

impl EntityRecord {
    pub fn new(
        id: EntityId,
        kind: EntityKind,
        type_name: impl Into<String>,
        fingerprint: Fingerprint,
        timestamp: HybridTimestamp,
        payload: JsonValue,
    ) -> Self {
        Self {
            id,
            kind,
            type_name: type_name.into(),
            fingerprint,
            timestamp,
            payload,
        }
    }

    pub fn is_event(&self) -> bool {
        self.kind == EntityKind::Event
    }

    pub fn is_command(&self) -> bool {
        self.kind == EntityKind::Command
    }

    /// Decode the payload into a typed value.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, crate::CoreError> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| crate::CoreError::deserialize(format!("{}: {e}", self.type_name)))
    }
}
