//! Per-type index registry and plan selection.
//!
//! Indexes are constructed and owned here, passed in by the embedding
//! application or the repository, never looked up as globals.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chronicle_core::EntityRecord;

use crate::index::{EntityIndex, IndexError, IndexResult};
use crate::predicate::Predicate;

/// Registry of secondary indexes, keyed by entity type name.
#[derive(Default)]
pub struct IndexRegistry {
    indexes: RwLock<HashMap<String, Vec<Arc<dyn EntityIndex>>>>,
}

impl IndexRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, type_name: impl Into<String>, index: Arc<dyn EntityIndex>) -> IndexResult<()> {
        self.indexes
            .write()
            .map_err(|_| IndexError::Poisoned)?
            .entry(type_name.into())
            .or_default()
            .push(index);
        Ok(())
    }

    /// Insert records into every index registered for `type_name`.
    ///
    /// A uniqueness violation from any index aborts the batch and surfaces
    /// unchanged.
    pub fn add_all(&self, type_name: &str, records: &[EntityRecord]) -> IndexResult<()> {
        for index in self.indexes_for(type_name)? {
            index.add_all(records)?;
        }
        Ok(())
    }

    pub fn remove_all(&self, type_name: &str, records: &[EntityRecord]) -> IndexResult<()> {
        for index in self.indexes_for(type_name)? {
            index.remove_all(records)?;
        }
        Ok(())
    }

    pub fn clear(&self) -> IndexResult<()> {
        for indexes in self
            .indexes
            .read()
            .map_err(|_| IndexError::Poisoned)?
            .values()
        {
            for index in indexes {
                index.clear()?;
            }
        }
        Ok(())
    }

    /// The cheapest registered index that can answer `predicate`, if any;
    /// `None` means the caller falls back to a full scan.
    pub fn plan(
        &self,
        type_name: &str,
        predicate: &Predicate,
    ) -> IndexResult<Option<Arc<dyn EntityIndex>>> {
        Ok(self
            .indexes_for(type_name)?
            .into_iter()
            .filter(|index| index.supports(predicate))
            .min_by_key(|index| index.retrieval_cost()))
    }

    fn indexes_for(&self, type_name: &str) -> IndexResult<Vec<Arc<dyn EntityIndex>>> {
        Ok(self
            .indexes
            .read()
            .map_err(|_| IndexError::Poisoned)?
            .get(type_name)
            .cloned()
            .unwrap_or_default())
    }
}

impl core::fmt::Debug for IndexRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let count = self.indexes.read().map(|m| m.len()).unwrap_or(0);
        f.debug_struct("IndexRegistry")
            .field("types", &count)
            .finish_non_exhaustive()
    }
}
