//! Persistent unique hash index.
//!
//! On-disk record shape, where compatibility matters: the key is a SHA-256
//! of the codec-serialized attribute value; the value is the serialized
//! attribute followed immediately by the serialized owning record, no
//! separator; the codec's deserializer consumes exactly its own span, which
//! is how the two are recovered.
//!
//! Storing the raw attribute next to its hash is what lets the index both
//! answer equality queries and tell a genuine duplicate value apart from a
//! hash collision.

use std::sync::Arc;

use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};

use chronicle_core::{EntityCodec, EntityRecord};

use crate::attribute::AttributeDescriptor;
use crate::content_map::ContentMap;
use crate::index::{EntityIndex, IndexError, IndexResult};
use crate::predicate::Predicate;
use crate::result_set::ResultSet;

const UNIQUE_RETRIEVAL_COST: u32 = 25;

/// Unique index over a content-addressed map: at most one owner per
/// attribute value.
pub struct UniqueHashIndex {
    attribute: AttributeDescriptor,
    codec: Arc<dyn EntityCodec>,
    map: ContentMap,
}

impl UniqueHashIndex {
    pub fn new(attribute: AttributeDescriptor, codec: Arc<dyn EntityCodec>, map: ContentMap) -> Self {
        Self {
            attribute,
            codec,
            map,
        }
    }

    fn encode_key(&self, value: &JsonValue) -> IndexResult<Vec<u8>> {
        let mut serialized = Vec::new();
        self.codec.serialize(value, &mut serialized)?;
        Ok(Sha256::digest(&serialized).to_vec())
    }

    fn encode_entry(&self, value: &JsonValue, record: &EntityRecord) -> IndexResult<Vec<u8>> {
        let mut entry = Vec::new();
        self.codec.serialize(value, &mut entry)?;
        let owner = serde_json::to_value(record)
            .map_err(|e| IndexError::storage(format!("owner encoding failed: {e}")))?;
        self.codec.serialize(&owner, &mut entry)?;
        Ok(entry)
    }

    fn decode_entry(&self, mut bytes: &[u8]) -> IndexResult<(JsonValue, EntityRecord)> {
        let value = self.codec.deserialize(&mut bytes)?;
        let owner = self.codec.deserialize(&mut bytes)?;
        let record: EntityRecord = serde_json::from_value(owner)
            .map_err(|e| IndexError::storage(format!("owner decoding failed: {e}")))?;
        Ok((value, record))
    }
}

impl EntityIndex for UniqueHashIndex {
    fn attribute(&self) -> &AttributeDescriptor {
        &self.attribute
    }

    fn supports(&self, predicate: &Predicate) -> bool {
        matches!(predicate, Predicate::Equal { attribute, .. } if attribute == self.attribute.name())
    }

    fn retrieval_cost(&self) -> u32 {
        UNIQUE_RETRIEVAL_COST
    }

    fn merge_cost(&self, _predicate: &Predicate) -> u32 {
        // At most one owner per value.
        1
    }

    fn retrieve(&self, predicate: &Predicate) -> IndexResult<ResultSet> {
        let Predicate::Equal { value, .. } = predicate else {
            return Err(IndexError::Unsupported {
                attribute: predicate.attribute().to_string(),
            });
        };
        let key = self.encode_key(value)?;
        match self.map.get(&key)? {
            None => Ok(ResultSet::empty()),
            Some(entry) => {
                let (stored_value, owner) = self.decode_entry(&entry)?;
                // A hash collision stores a different raw value under the
                // same key; it must not answer this query.
                if &stored_value != value {
                    return Ok(ResultSet::empty());
                }
                Ok(ResultSet::new(vec![owner]))
            }
        }
    }

    fn add_all(&self, records: &[EntityRecord]) -> IndexResult<()> {
        for record in records {
            for value in self.attribute.values(&record.payload) {
                let key = self.encode_key(&value)?;
                if let Some(existing) = self.map.get(&key)? {
                    let (stored_value, owner) = self.decode_entry(&existing)?;
                    if owner == *record {
                        // Re-inserting the same owner is a no-op.
                        continue;
                    }
                    return Err(IndexError::UniqueViolation {
                        attribute: self.attribute.name().to_string(),
                        value: stored_value,
                        existing: owner.id,
                        offending: record.id,
                    });
                }
                self.map.put(key, self.encode_entry(&value, record)?)?;
            }
        }
        Ok(())
    }

    fn remove_all(&self, records: &[EntityRecord]) -> IndexResult<()> {
        for record in records {
            for value in self.attribute.values(&record.payload) {
                self.map.remove(&self.encode_key(&value)?)?;
            }
        }
        Ok(())
    }

    fn clear(&self) -> IndexResult<()> {
        self.map.clear()
    }
}

impl core::fmt::Debug for UniqueHashIndex {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("UniqueHashIndex")
            .field("attribute", &self.attribute)
            .field("map", &self.map)
            .finish_non_exhaustive()
    }
}
