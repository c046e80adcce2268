//! Explicit command/event type registry.
//!
//! The set of types the repository recognizes is configuration: descriptors
//! are assembled by the embedding application (or by crates like the
//! migration support) and handed in at startup or later; nothing is
//! discovered by scanning.

use std::collections::HashMap;
use std::sync::RwLock;

use chronicle_core::{EntityLayout, Fingerprint};
use chronicle_index::AttributeDescriptor;

use crate::error::EngineError;

/// Everything the engine needs to know about one command or event type: its
/// layout (schema shape) and its declared, index-able attributes.
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    pub layout: EntityLayout,
    pub attributes: Vec<AttributeDescriptor>,
}

impl TypeDescriptor {
    pub fn new(layout: EntityLayout) -> Self {
        Self {
            layout,
            attributes: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, attribute: AttributeDescriptor) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn type_name(&self) -> &str {
        &self.layout.type_name
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.layout.fingerprint()
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.attributes.iter().find(|a| a.name() == name)
    }
}

/// Registered command and event types, keyed by type name.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    commands: RwLock<HashMap<String, TypeDescriptor>>,
    events: RwLock<HashMap<String, TypeDescriptor>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register command types; returns their layouts for the journal's
    /// registration hook.
    pub fn add_commands(
        &self,
        descriptors: Vec<TypeDescriptor>,
    ) -> Result<Vec<EntityLayout>, EngineError> {
        Self::add(&self.commands, descriptors)
    }

    /// Register event types; returns their layouts for the journal's
    /// registration hook.
    pub fn add_events(
        &self,
        descriptors: Vec<TypeDescriptor>,
    ) -> Result<Vec<EntityLayout>, EngineError> {
        Self::add(&self.events, descriptors)
    }

    fn add(
        map: &RwLock<HashMap<String, TypeDescriptor>>,
        descriptors: Vec<TypeDescriptor>,
    ) -> Result<Vec<EntityLayout>, EngineError> {
        let mut map = map.write().map_err(|_| EngineError::Poisoned)?;
        let mut layouts = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            layouts.push(descriptor.layout.clone());
            map.insert(descriptor.type_name().to_string(), descriptor);
        }
        Ok(layouts)
    }

    pub fn command(&self, type_name: &str) -> Result<Option<TypeDescriptor>, EngineError> {
        Self::find(&self.commands, type_name)
    }

    pub fn event(&self, type_name: &str) -> Result<Option<TypeDescriptor>, EngineError> {
        Self::find(&self.events, type_name)
    }

    /// Look a type up regardless of kind.
    pub fn any(&self, type_name: &str) -> Result<Option<TypeDescriptor>, EngineError> {
        match self.event(type_name)? {
            Some(descriptor) => Ok(Some(descriptor)),
            None => self.command(type_name),
        }
    }

    fn find(
        map: &RwLock<HashMap<String, TypeDescriptor>>,
        type_name: &str,
    ) -> Result<Option<TypeDescriptor>, EngineError> {
        Ok(map
            .read()
            .map_err(|_| EngineError::Poisoned)?
            .get(type_name)
            .cloned())
    }

    pub fn command_names(&self) -> Result<Vec<String>, EngineError> {
        Ok(self
            .commands
            .read()
            .map_err(|_| EngineError::Poisoned)?
            .keys()
            .cloned()
            .collect())
    }

    pub fn event_names(&self) -> Result<Vec<String>, EngineError> {
        Ok(self
            .events
            .read()
            .map_err(|_| EngineError::Poisoned)?
            .keys()
            .cloned()
            .collect())
    }
}
