//! Registry of trusted peers.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use super::{parse_entities, EntityDescriptor, EntityRole};
use crate::error::{SamlError, SamlResult};

/// Peers keyed by entity ID.
///
/// Descriptors are shared as `Arc`s and never change once registered;
/// registration may continue while engines read.
#[derive(Debug, Default)]
pub struct MetadataRegistry {
    entities: RwLock<HashMap<String, Arc<EntityDescriptor>>>,
}

impl MetadataRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and registers a descriptor.
    ///
    /// # Errors
    ///
    /// Returns `MalformedMetadata` if the descriptor is unusable and
    /// `ConfigurationError` if its entity ID is already registered.
    pub fn register(&self, descriptor: EntityDescriptor) -> SamlResult<Arc<EntityDescriptor>> {
        descriptor.validate()?;
        let mut entities = self.entities.write();
        if entities.contains_key(&descriptor.entity_id) {
            return Err(SamlError::ConfigurationError(format!(
                "entity {} is already registered",
                descriptor.entity_id
            )));
        }
        info!(
            entity_id = %descriptor.entity_id,
            role = ?descriptor.role,
            endpoints = descriptor.endpoints.len(),
            "registered peer"
        );
        let descriptor = Arc::new(descriptor);
        entities.insert(descriptor.entity_id.clone(), Arc::clone(&descriptor));
        Ok(descriptor)
    }

    /// Parses a metadata document and registers every entity in it.
    ///
    /// Nothing is registered unless the whole document is valid.
    ///
    /// # Errors
    ///
    /// Returns the first parse or registration failure.
    pub fn load(&self, metadata: &[u8]) -> SamlResult<Vec<String>> {
        let entities = parse_entities(metadata)?;
        {
            let registered = self.entities.read();
            let mut seen = Vec::with_capacity(entities.len());
            for entity in &entities {
                if registered.contains_key(&entity.entity_id) || seen.contains(&&entity.entity_id) {
                    return Err(SamlError::ConfigurationError(format!(
                        "entity {} is already registered",
                        entity.entity_id
                    )));
                }
                seen.push(&entity.entity_id);
            }
        }
        entities
            .into_iter()
            .map(|e| self.register(e).map(|d| d.entity_id.clone()))
            .collect()
    }

    /// Returns the descriptor for `entity_id`.
    #[must_use]
    pub fn lookup(&self, entity_id: &str) -> Option<Arc<EntityDescriptor>> {
        self.entities.read().get(entity_id).cloned()
    }

    /// Returns the descriptor for `entity_id` if it plays `role`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownIssuer` if no such peer is registered.
    pub fn peer(&self, entity_id: &str, role: EntityRole) -> SamlResult<Arc<EntityDescriptor>> {
        self.lookup(entity_id)
            .filter(|d| d.role == role)
            .ok_or_else(|| SamlError::UnknownIssuer(entity_id.to_string()))
    }

    /// Returns true if at least one peer of `role` is registered.
    #[must_use]
    pub fn has_role(&self, role: EntityRole) -> bool {
        self.entities.read().values().any(|d| d.role == role)
    }

    /// Returns the number of registered peers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.read().len()
    }

    /// Returns true if no peer is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.read().is_empty()
    }
}
