//! Entity schema layouts and fingerprints.
//!
//! A layout is an explicit registration-table description of an entity
//! type's serialized shape: its name plus an ordered list of field
//! descriptors. The embedding application assembles layouts at startup;
//! nothing here scans or reflects over types.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::CoreError;

/// One field of an entity layout: name plus a type label (e.g. `"string"`,
/// `"u64"`, `"entity_id"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub type_name: String,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// Schema descriptor for an entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityLayout {
    pub type_name: String,
    pub fields: Vec<FieldDescriptor>,
}

impl EntityLayout {
    pub fn new(
        type_name: impl Into<String>,
        fields: impl IntoIterator<Item = (&'static str, &'static str)>,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            fields: fields
                .into_iter()
                .map(|(name, ty)| FieldDescriptor::new(name, ty))
                .collect(),
        }
    }

    /// Content hash of the field shape (name + order + type).
    ///
    /// The type name is deliberately excluded: two types with identical
    /// field shapes share a fingerprint, which is what makes layout
    /// replacement records meaningful across renames.
    pub fn fingerprint(&self) -> Fingerprint {
        let mut hasher = Sha256::new();
        for field in &self.fields {
            hasher.update(field.name.as_bytes());
            hasher.update([0u8]);
            hasher.update(field.type_name.as_bytes());
            hasher.update([0u8]);
        }
        Fingerprint(hasher.finalize().into())
    }
}

/// Opaque identifier of an entity type's serialized shape.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        let bytes = hex::decode(s).map_err(|e| CoreError::InvalidFingerprint(e.to_string()))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CoreError::InvalidFingerprint(format!("expected 32 bytes: {s}")))?;
        Ok(Self(bytes))
    }
}

impl core::fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

impl core::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Fingerprint::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
