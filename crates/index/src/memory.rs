//! In-memory indexes.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::RwLock;

use chronicle_core::{EntityId, EntityRecord};

use crate::attribute::AttributeDescriptor;
use crate::index::{EntityIndex, IndexError, IndexResult};
use crate::predicate::{OrderedValue, Predicate};
use crate::result_set::ResultSet;

const EQUALITY_RETRIEVAL_COST: u32 = 30;
const NAVIGABLE_RETRIEVAL_COST: u32 = 40;

/// Hash-map equality index.
#[derive(Debug)]
pub struct MemoryEqualityIndex {
    attribute: AttributeDescriptor,
    map: RwLock<HashMap<String, HashMap<EntityId, EntityRecord>>>,
}

impl MemoryEqualityIndex {
    pub fn new(attribute: AttributeDescriptor) -> Self {
        Self {
            attribute,
            map: RwLock::new(HashMap::new()),
        }
    }

    fn key(value: &serde_json::Value) -> String {
        value.to_string()
    }
}

impl EntityIndex for MemoryEqualityIndex {
    fn attribute(&self) -> &AttributeDescriptor {
        &self.attribute
    }

    fn supports(&self, predicate: &Predicate) -> bool {
        matches!(predicate, Predicate::Equal { attribute, .. } if attribute == self.attribute.name())
    }

    fn retrieval_cost(&self) -> u32 {
        EQUALITY_RETRIEVAL_COST
    }

    fn merge_cost(&self, predicate: &Predicate) -> u32 {
        match self.retrieve(predicate) {
            Ok(result) => result.size() as u32,
            Err(_) => u32::MAX,
        }
    }

    fn retrieve(&self, predicate: &Predicate) -> IndexResult<ResultSet> {
        let Predicate::Equal { value, .. } = predicate else {
            return Err(IndexError::Unsupported {
                attribute: predicate.attribute().to_string(),
            });
        };
        let map = self.map.read().map_err(|_| IndexError::Poisoned)?;
        let records = map
            .get(&Self::key(value))
            .map(|owners| owners.values().cloned().collect())
            .unwrap_or_default();
        Ok(ResultSet::new(records))
    }

    fn add_all(&self, records: &[EntityRecord]) -> IndexResult<()> {
        let mut map = self.map.write().map_err(|_| IndexError::Poisoned)?;
        for record in records {
            for value in self.attribute.values(&record.payload) {
                map.entry(Self::key(&value))
                    .or_default()
                    .insert(record.id, record.clone());
            }
        }
        Ok(())
    }

    fn remove_all(&self, records: &[EntityRecord]) -> IndexResult<()> {
        let mut map = self.map.write().map_err(|_| IndexError::Poisoned)?;
        for record in records {
            for value in self.attribute.values(&record.payload) {
                if let Some(owners) = map.get_mut(&Self::key(&value)) {
                    owners.remove(&record.id);
                    if owners.is_empty() {
                        map.remove(&Self::key(&value));
                    }
                }
            }
        }
        Ok(())
    }

    fn clear(&self) -> IndexResult<()> {
        self.map.write().map_err(|_| IndexError::Poisoned)?.clear();
        Ok(())
    }
}

/// B-tree navigable index for range (and equality) retrieval.
#[derive(Debug)]
pub struct MemoryNavigableIndex {
    attribute: AttributeDescriptor,
    map: RwLock<BTreeMap<OrderedValue, HashMap<EntityId, EntityRecord>>>,
}

impl MemoryNavigableIndex {
    pub fn new(attribute: AttributeDescriptor) -> Self {
        Self {
            attribute,
            map: RwLock::new(BTreeMap::new()),
        }
    }
}

impl EntityIndex for MemoryNavigableIndex {
    fn attribute(&self) -> &AttributeDescriptor {
        &self.attribute
    }

    fn supports(&self, predicate: &Predicate) -> bool {
        predicate.attribute() == self.attribute.name()
    }

    fn retrieval_cost(&self) -> u32 {
        NAVIGABLE_RETRIEVAL_COST
    }

    fn merge_cost(&self, predicate: &Predicate) -> u32 {
        match self.retrieve(predicate) {
            Ok(result) => result.size() as u32,
            Err(_) => u32::MAX,
        }
    }

    fn retrieve(&self, predicate: &Predicate) -> IndexResult<ResultSet> {
        let map = self.map.read().map_err(|_| IndexError::Poisoned)?;
        let records = match predicate {
            Predicate::Equal { value, .. } => map
                .get(&OrderedValue(value.clone()))
                .map(|owners| owners.values().cloned().collect())
                .unwrap_or_default(),
            Predicate::Range { from, to, .. } => {
                let lower = from
                    .clone()
                    .map_or(Bound::Unbounded, |v| Bound::Included(OrderedValue(v)));
                let upper = to
                    .clone()
                    .map_or(Bound::Unbounded, |v| Bound::Included(OrderedValue(v)));
                map.range((lower, upper))
                    .flat_map(|(_, owners)| owners.values().cloned())
                    .collect()
            }
        };
        Ok(ResultSet::new(records))
    }

    fn add_all(&self, records: &[EntityRecord]) -> IndexResult<()> {
        let mut map = self.map.write().map_err(|_| IndexError::Poisoned)?;
        for record in records {
            for value in self.attribute.values(&record.payload) {
                map.entry(OrderedValue(value))
                    .or_default()
                    .insert(record.id, record.clone());
            }
        }
        Ok(())
    }

    fn remove_all(&self, records: &[EntityRecord]) -> IndexResult<()> {
        let mut map = self.map.write().map_err(|_| IndexError::Poisoned)?;
        for record in records {
            for value in self.attribute.values(&record.payload) {
                let key = OrderedValue(value);
                if let Some(owners) = map.get_mut(&key) {
                    owners.remove(&record.id);
                    if owners.is_empty() {
                        map.remove(&key);
                    }
                }
            }
        }
        Ok(())
    }

    fn clear(&self) -> IndexResult<()> {
        self.map.write().map_err(|_| IndexError::Poisoned)?.clear();
        Ok(())
    }
}
