//! # Entity Kinds
//!
//! The closed set of entities a [`Registry`](crate::Registry) owns.
//!
//! Every kind keeps its free-form properties in a serde-backed `*Props`
//! struct and its graph edges in one typed [`Relation`] field per relation
//! name. Which relations a kind carries is fixed by [`EntityData::RELATIONS`].

pub mod component;
pub mod component_model;
pub mod dynamic_interface;
pub mod external_reference;
pub mod interface;
pub mod interface_model;
pub mod module;

pub use component::{Component, ComponentProps};
pub use component_model::{ComponentModel, ComponentModelProps};
pub use dynamic_interface::{DynamicInterface, DynamicInterfaceProps};
pub use external_reference::{ExternalReference, ExternalReferenceProps};
pub use interface::{Interface, InterfaceProps};
pub use interface_model::{InterfaceModel, InterfaceModelProps};
pub use module::{InterfaceView, Module, ModuleProps, ModuleView};

use crate::{EntityKind, PartsmithError, Relation, RelationName};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

// =============================================================================
// ENTITY DATA TRAIT
// =============================================================================

/// Shape shared by every entity kind.
pub trait EntityData {
    /// Serializable property record of this kind.
    type Props: Serialize + DeserializeOwned;

    const KIND: EntityKind;

    /// Relations this kind carries, in declaration order.
    const RELATIONS: &'static [RelationName];

    fn props(&self) -> &Self::Props;

    fn props_mut(&mut self) -> &mut Self::Props;

    fn relation(&self, name: RelationName) -> Option<&Relation>;

    fn relation_mut(&mut self, name: RelationName) -> Option<&mut Relation>;

    fn name(&self) -> &str;

    /// Properties as a JSON object.
    fn properties(&self) -> Result<Map<String, Value>, PartsmithError> {
        match serde_json::to_value(self.props())
            .map_err(|e| PartsmithError::SerializationError(e.to_string()))?
        {
            Value::Object(map) => Ok(map),
            other => Err(PartsmithError::SerializationError(format!(
                "{} properties serialized to {}",
                Self::KIND,
                other
            ))),
        }
    }

    /// Overlay `patch` on the current properties (top-level keys replace).
    fn set_properties(&mut self, patch: &Map<String, Value>) -> Result<(), PartsmithError> {
        let mut current = self.properties()?;
        for (key, value) in patch {
            current.insert(key.clone(), value.clone());
        }
        *self.props_mut() = serde_json::from_value(Value::Object(current))
            .map_err(|e| PartsmithError::DeserializationError(e.to_string()))?;
        Ok(())
    }
}

// =============================================================================
// ENTITY ENUM
// =============================================================================

/// An entity stored in a registry.
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    ComponentModel(ComponentModel),
    Component(Component),
    InterfaceModel(InterfaceModel),
    Interface(Interface),
    DynamicInterface(DynamicInterface),
    Module(Module),
    ExternalReference(ExternalReference),
}

macro_rules! dispatch {
    ($entity:expr, $inner:ident => $body:expr) => {
        match $entity {
            Entity::ComponentModel($inner) => $body,
            Entity::Component($inner) => $body,
            Entity::InterfaceModel($inner) => $body,
            Entity::Interface($inner) => $body,
            Entity::DynamicInterface($inner) => $body,
            Entity::Module($inner) => $body,
            Entity::ExternalReference($inner) => $body,
        }
    };
}

macro_rules! entity_from {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for Entity {
                fn from(value: $variant) -> Self {
                    Self::$variant(value)
                }
            }
        )*
    };
}

entity_from!(
    ComponentModel,
    Component,
    InterfaceModel,
    Interface,
    DynamicInterface,
    Module,
    ExternalReference,
);

impl Entity {
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::ComponentModel(_) => EntityKind::ComponentModel,
            Self::Component(_) => EntityKind::Component,
            Self::InterfaceModel(_) => EntityKind::InterfaceModel,
            Self::Interface(_) => EntityKind::Interface,
            Self::DynamicInterface(_) => EntityKind::DynamicInterface,
            Self::Module(_) => EntityKind::Module,
            Self::ExternalReference(_) => EntityKind::ExternalReference,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        dispatch!(self, e => e.name())
    }

    #[must_use]
    pub fn relation_names(&self) -> &'static [RelationName] {
        fn names<T: EntityData>(_: &T) -> &'static [RelationName] {
            T::RELATIONS
        }
        dispatch!(self, e => names(e))
    }

    pub fn relation(&self, name: RelationName) -> Result<&Relation, PartsmithError> {
        let kind = self.kind();
        dispatch!(self, e => e.relation(name))
            .ok_or(PartsmithError::UnknownRelation { kind, relation: name })
    }

    pub fn relation_mut(&mut self, name: RelationName) -> Result<&mut Relation, PartsmithError> {
        let kind = self.kind();
        dispatch!(self, e => e.relation_mut(name))
            .ok_or(PartsmithError::UnknownRelation { kind, relation: name })
    }

    pub fn properties(&self) -> Result<Map<String, Value>, PartsmithError> {
        dispatch!(self, e => e.properties())
    }

    pub fn set_properties(&mut self, patch: &Map<String, Value>) -> Result<(), PartsmithError> {
        dispatch!(self, e => e.set_properties(patch))
    }

    /// Mark every unpopulated relation as known-empty.
    pub fn set_all_unknown_facts_empty(&mut self) {
        for name in self.relation_names() {
            if let Ok(relation) = self.relation_mut(*name) {
                relation.mark_known();
            }
        }
    }

    /// A copy carrying the same properties and relation states, without facts.
    pub(crate) fn detached_copy(&self) -> Self {
        let mut copy = self.clone();
        for name in self.relation_names() {
            if let Ok(relation) = copy.relation_mut(*name) {
                if relation.is_known() {
                    relation.clear();
                }
            }
        }
        copy
    }
}
