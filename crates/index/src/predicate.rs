//! Query predicates.
//!
//! Query expressiveness is deliberately limited to equality and range over
//! declared attributes; this is not a general query algebra.

use core::cmp::Ordering;

use serde_json::Value as JsonValue;

use crate::attribute::{AttributeDescriptor, IndexFeature};

/// A predicate over one declared attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// The attribute equals `value`.
    Equal { attribute: String, value: JsonValue },
    /// The attribute lies in `[from, to]` (inclusive on both ends; `None`
    /// leaves that end open).
    Range {
        attribute: String,
        from: Option<JsonValue>,
        to: Option<JsonValue>,
    },
}

impl Predicate {
    pub fn equal(attribute: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        Self::Equal {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    pub fn range(
        attribute: impl Into<String>,
        from: Option<JsonValue>,
        to: Option<JsonValue>,
    ) -> Self {
        Self::Range {
            attribute: attribute.into(),
            from,
            to,
        }
    }

    pub fn attribute(&self) -> &str {
        match self {
            Self::Equal { attribute, .. } | Self::Range { attribute, .. } => attribute,
        }
    }

    /// The index feature needed to accelerate this predicate.
    pub fn required_feature(&self) -> IndexFeature {
        match self {
            Self::Equal { .. } => IndexFeature::Equality,
            Self::Range { .. } => IndexFeature::Range,
        }
    }

    /// Evaluate against a payload through the attribute's extractor; used by
    /// full scans when no index supports the predicate.
    pub fn matches(&self, attribute: &AttributeDescriptor, payload: &JsonValue) -> bool {
        let values = attribute.values(payload);
        match self {
            Self::Equal { value, .. } => values.contains(value),
            Self::Range { from, to, .. } => values.iter().any(|v| {
                from.as_ref()
                    .is_none_or(|f| value_order(v, f) != Ordering::Less)
                    && to
                        .as_ref()
                        .is_none_or(|t| value_order(v, t) != Ordering::Greater)
            }),
        }
    }
}

/// Total order over JSON values: rank by type, then within-type.
///
/// Numbers compare numerically, strings and booleans naturally; arrays and
/// objects fall back to their serialized text. The order only needs to be
/// total and stable, not semantically deep; range queries are declared over
/// attributes whose values share a type.
pub fn value_order(a: &JsonValue, b: &JsonValue) -> Ordering {
    fn rank(v: &JsonValue) -> u8 {
        match v {
            JsonValue::Null => 0,
            JsonValue::Bool(_) => 1,
            JsonValue::Number(_) => 2,
            JsonValue::String(_) => 3,
            JsonValue::Array(_) => 4,
            JsonValue::Object(_) => 5,
        }
    }

    match (a, b) {
        (JsonValue::Bool(x), JsonValue::Bool(y)) => x.cmp(y),
        (JsonValue::Number(x), JsonValue::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (JsonValue::String(x), JsonValue::String(y)) => x.cmp(y),
        _ if rank(a) != rank(b) => rank(a).cmp(&rank(b)),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

/// JSON value wrapper ordered by [`value_order`], usable as a B-tree key.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedValue(pub JsonValue);

impl Eq for OrderedValue {}

impl PartialOrd for OrderedValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedValue {
    fn cmp(&self, other: &Self) -> Ordering {
        value_order(&self.0, &other.0)
    }
}
