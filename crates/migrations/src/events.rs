//! The durable migration ledger.

use serde::{Deserialize, Serialize};

use chronicle_core::{EntityId, EntityLayout, Fingerprint};
use chronicle_engine::{EngineError, Event, Repository, TypeDescriptor};
use chronicle_index::{AttributeDescriptor, IndexFeature};

/// First sighting of a layout fingerprint, optionally carrying the full
/// schema for tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityLayoutIntroduced {
    pub fingerprint: Fingerprint,
    pub layout: Option<EntityLayout>,
}

impl EntityLayoutIntroduced {
    pub const TYPE_NAME: &'static str = "chronicle.layout.introduced";

    pub fn descriptor() -> TypeDescriptor {
        TypeDescriptor::new(EntityLayout::new(
            Self::TYPE_NAME,
            [("fingerprint", "fingerprint"), ("layout", "option<layout>")],
        ))
        .with_attribute(AttributeDescriptor::field(
            "fingerprint",
            [IndexFeature::Equality, IndexFeature::Unique],
        ))
    }
}

impl Event for EntityLayoutIntroduced {
    fn event_type(&self) -> &'static str {
        Self::TYPE_NAME
    }
}

/// One fingerprint superseded by a newly-introduced layout: the durable
/// old → new link of the migration ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityLayoutReplaced {
    pub fingerprint: Fingerprint,
    /// Identity of the [`EntityLayoutIntroduced`] event for the new layout.
    pub replacement: EntityId,
}

impl EntityLayoutReplaced {
    pub const TYPE_NAME: &'static str = "chronicle.layout.replaced";

    pub fn descriptor() -> TypeDescriptor {
        TypeDescriptor::new(EntityLayout::new(
            Self::TYPE_NAME,
            [("fingerprint", "fingerprint"), ("replacement", "entity_id")],
        ))
        .with_attribute(AttributeDescriptor::field(
            "fingerprint",
            [IndexFeature::Equality],
        ))
        .with_attribute(AttributeDescriptor::field(
            "replacement",
            [IndexFeature::Equality],
        ))
    }
}

impl Event for EntityLayoutReplaced {
    fn event_type(&self) -> &'static str {
        Self::TYPE_NAME
    }
}

/// Register migration support with a repository: the ledger event types
/// (with their indexes) and the migration command type. Call once before
/// publishing any [`crate::LayoutMigration`].
pub fn register(repository: &Repository) -> Result<(), EngineError> {
    repository.register_event_types(vec![
        EntityLayoutIntroduced::descriptor(),
        EntityLayoutReplaced::descriptor(),
    ])?;
    repository.register_command_types(vec![crate::migration::migration_descriptor()])
}
