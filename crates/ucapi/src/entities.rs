//! Entity registries of the driver
//!
//! The driver keeps two registries: the available entities it can offer and
//! the configured entities the Remote subscribed to.

use crate::protocol::{AvailableEntity, EntityFilter, EntityState};
use intg_core::{AttributeMap, EntityDefinition};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
struct RegisteredEntity {
    definition: EntityDefinition,
    attributes: AttributeMap,
}

/// Entity definitions and their last known attributes, ordered by entity id
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    entities: BTreeMap<String, RegisteredEntity>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an entity
    ///
    /// Returns `true` if the entity was not registered before.
    pub fn add(&mut self, definition: EntityDefinition, attributes: AttributeMap) -> bool {
        self.entities
            .insert(
                definition.entity_id.clone(),
                RegisteredEntity {
                    definition,
                    attributes,
                },
            )
            .is_none()
    }

    pub fn remove(&mut self, entity_id: &str) -> Option<EntityDefinition> {
        self.entities.remove(entity_id).map(|e| e.definition)
    }

    pub fn clear(&mut self) {
        self.entities.clear();
    }

    pub fn contains(&self, entity_id: &str) -> bool {
        self.entities.contains_key(entity_id)
    }

    pub fn definition(&self, entity_id: &str) -> Option<&EntityDefinition> {
        self.entities.get(entity_id).map(|e| &e.definition)
    }

    pub fn attributes(&self, entity_id: &str) -> Option<&AttributeMap> {
        self.entities.get(entity_id).map(|e| &e.attributes)
    }

    pub fn ids(&self) -> Vec<String> {
        self.entities.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Merge `attributes` into the stored attributes of an entity
    ///
    /// Returns the attributes whose value changed, or `None` if the entity
    /// is not registered. An empty map means nothing changed.
    pub fn update_attributes(
        &mut self,
        entity_id: &str,
        attributes: &AttributeMap,
    ) -> Option<AttributeMap> {
        let entity = self.entities.get_mut(entity_id)?;

        let mut changed = AttributeMap::new();
        for (key, value) in attributes {
            if entity.attributes.get(key) != Some(value) {
                entity.attributes.insert(key.clone(), value.clone());
                changed.insert(key.clone(), value.clone());
            }
        }
        Some(changed)
    }

    pub fn available_entities(&self, filter: Option<&EntityFilter>) -> Vec<AvailableEntity> {
        self.entities
            .values()
            .filter(|e| filter.map_or(true, |f| matches_filter(&e.definition, f)))
            .map(|e| AvailableEntity {
                definition: e.definition.clone(),
                attributes: e.attributes.clone(),
            })
            .collect()
    }

    pub fn entity_states(&self) -> Vec<EntityState> {
        self.entities
            .values()
            .map(|e| EntityState {
                entity_id: e.definition.entity_id.clone(),
                entity_type: e.definition.entity_type,
                device_id: e.definition.device_id.clone(),
                attributes: e.attributes.clone(),
            })
            .collect()
    }
}

fn matches_filter(definition: &EntityDefinition, filter: &EntityFilter) -> bool {
    let device_matches = filter
        .device_id
        .as_deref()
        .map_or(true, |id| definition.device_id.as_deref() == Some(id));
    let type_matches = filter
        .entity_type
        .as_deref()
        .map_or(true, |t| definition.entity_type.as_str() == t);

    device_matches && type_matches
}
