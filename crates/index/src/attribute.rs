//! Attribute descriptors.
//!
//! Attributes are declared explicitly by the embedding application: an
//! extractor function plus the predicate features it supports, and
//! assembled into a registration table at startup. Nothing is discovered by
//! scanning.

use std::sync::Arc;

use serde_json::Value as JsonValue;

/// Predicate shapes an index over an attribute can accelerate.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum IndexFeature {
    Equality,
    Range,
    Unique,
}

/// A declared attribute of an entity type.
#[derive(Clone)]
pub struct AttributeDescriptor {
    name: String,
    features: Vec<IndexFeature>,
    extract: Arc<dyn Fn(&JsonValue) -> Vec<JsonValue> + Send + Sync>,
}

impl AttributeDescriptor {
    pub fn new(
        name: impl Into<String>,
        features: impl IntoIterator<Item = IndexFeature>,
        extract: impl Fn(&JsonValue) -> Vec<JsonValue> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            features: features.into_iter().collect(),
            extract: Arc::new(extract),
        }
    }

    /// Attribute backed by a top-level payload field of the same name.
    pub fn field(
        name: impl Into<String>,
        features: impl IntoIterator<Item = IndexFeature>,
    ) -> Self {
        let name = name.into();
        let field = name.clone();
        Self::new(name, features, move |payload: &JsonValue| {
            payload
                .get(&field)
                .filter(|v| !v.is_null())
                .cloned()
                .into_iter()
                .collect()
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn supports(&self, feature: IndexFeature) -> bool {
        self.features.contains(&feature)
    }

    /// The attribute's values for one payload. Null and absent values are
    /// never extracted, so they are never indexed.
    pub fn values(&self, payload: &JsonValue) -> Vec<JsonValue> {
        (self.extract)(payload)
    }
}

impl core::fmt::Debug for AttributeDescriptor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AttributeDescriptor")
            .field("name", &self.name)
            .field("features", &self.features)
            .finish_non_exhaustive()
    }
}
