//! Index contract.

use serde_json::Value as JsonValue;
use thiserror::Error;

use chronicle_core::{CoreError, EntityId, EntityRecord};

use crate::attribute::AttributeDescriptor;
use crate::predicate::Predicate;
use crate::result_set::ResultSet;

pub type IndexResult<T> = Result<T, IndexError>;

/// Index operation error.
#[derive(Debug, Error)]
pub enum IndexError {
    /// A second distinct entity mapped to an already-claimed unique key.
    /// Never silently overwritten.
    #[error(
        "unique constraint violated on attribute '{attribute}': value {value} is owned by {existing}, rejected {offending}"
    )]
    UniqueViolation {
        attribute: String,
        value: JsonValue,
        existing: EntityId,
        offending: EntityId,
    },

    /// The index does not accelerate this predicate shape.
    #[error("unsupported predicate on attribute '{attribute}'")]
    Unsupported { attribute: String },

    /// A result expected to be unique held a different number of records.
    #[error("expected exactly one record, found {found}")]
    NotUnique { found: usize },

    /// Underlying store failure.
    #[error("index storage failure: {0}")]
    Storage(String),

    /// Codec failure while encoding attribute values or owners.
    #[error(transparent)]
    Codec(#[from] CoreError),

    /// An internal lock was poisoned by a panicking writer.
    #[error("index lock poisoned")]
    Poisoned,
}

impl IndexError {
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }
}

/// A secondary index over one attribute of one entity type.
pub trait EntityIndex: Send + Sync {
    /// The attribute this index is built on.
    fn attribute(&self) -> &AttributeDescriptor;

    /// Whether this index can answer `predicate`.
    fn supports(&self, predicate: &Predicate) -> bool;

    /// Estimated cost of one retrieval; the planner prefers smaller.
    fn retrieval_cost(&self) -> u32;

    /// Estimated cost of merging this index's result into a larger plan.
    fn merge_cost(&self, predicate: &Predicate) -> u32;

    /// Answer a supported predicate.
    fn retrieve(&self, predicate: &Predicate) -> IndexResult<ResultSet>;

    /// Index a batch of records. Per-record attribute values come from the
    /// attribute's extractor; records without a value are skipped.
    fn add_all(&self, records: &[EntityRecord]) -> IndexResult<()>;

    /// Remove a batch of records.
    fn remove_all(&self, records: &[EntityRecord]) -> IndexResult<()>;

    /// Drop everything.
    fn clear(&self) -> IndexResult<()>;

    /// Build the index from an initial set.
    fn init(&self, records: &[EntityRecord]) -> IndexResult<()> {
        self.clear()?;
        self.add_all(records)
    }
}
