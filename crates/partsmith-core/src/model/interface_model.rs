//! # Interface Models
//!
//! Port types. An interface model carries the default direction and
//! multiplicity handed to every port instantiated from it.

use super::{DynamicInterface, DynamicInterfaceProps, Entity, EntityData, Interface, InterfaceProps};
use crate::primitives::URI_SCHEME;
use crate::{
    Direction, Domain, EntityId, EntityKind, Multiplicity, PartsmithError, Registry, Relation,
    RelationName,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Properties of an interface model.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InterfaceModelProps {
    pub name: String,
    pub domain: Domain,
    pub direction: Direction,
    pub multiplicity: Multiplicity,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A port type.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InterfaceModel {
    pub props: InterfaceModelProps,
    /// Supertypes (`subclass_of`).
    pub(crate) model: Relation,
}

impl InterfaceModel {
    #[must_use]
    pub fn new(name: impl Into<String>, domain: Domain) -> Self {
        Self {
            props: InterfaceModelProps {
                name: name.into(),
                domain,
                ..InterfaceModelProps::default()
            },
            ..Self::default()
        }
    }

    /// Set the defaults inherited by instantiated ports.
    #[must_use]
    pub fn with_defaults(mut self, direction: Direction, multiplicity: Multiplicity) -> Self {
        self.props.direction = direction;
        self.props.multiplicity = multiplicity;
        self
    }

    /// URI of the interface model identified by `domain` and `name`.
    #[must_use]
    pub fn uri_for(domain: Domain, name: &str) -> String {
        format!("{URI_SCHEME}interface_model/{domain}/{name}")
    }
}

impl EntityData for InterfaceModel {
    type Props = InterfaceModelProps;
    const KIND: EntityKind = EntityKind::InterfaceModel;
    const RELATIONS: &'static [RelationName] = &[RelationName::Model];

    fn props(&self) -> &Self::Props {
        &self.props
    }

    fn props_mut(&mut self) -> &mut Self::Props {
        &mut self.props
    }

    fn relation(&self, name: RelationName) -> Option<&Relation> {
        match name {
            RelationName::Model => Some(&self.model),
            _ => None,
        }
    }

    fn relation_mut(&mut self, name: RelationName) -> Option<&mut Relation> {
        match name {
            RelationName::Model => Some(&mut self.model),
            _ => None,
        }
    }

    fn name(&self) -> &str {
        &self.props.name
    }
}

// =============================================================================
// REGISTRY OPERATIONS
// =============================================================================

impl Registry {
    /// Create a port of type `interface_model` owned by the component model
    /// `for_model`.
    ///
    /// An empty `name` keeps the interface model's name. `NotSet` direction
    /// or multiplicity inherit the interface model's defaults.
    pub fn instantiate_interface(
        &mut self,
        interface_model: EntityId,
        for_model: EntityId,
        name: &str,
        direction: Direction,
        multiplicity: Multiplicity,
        with_empty_facts: bool,
    ) -> Result<EntityId, PartsmithError> {
        let defaults = self.interface_model(interface_model)?.props.clone();
        self.component_model(for_model)?;

        let props = InterfaceProps {
            name: if name.is_empty() {
                defaults.name.clone()
            } else {
                name.to_string()
            },
            alias: String::new(),
            direction: inherit_direction(direction, defaults.direction),
            multiplicity: inherit_multiplicity(multiplicity, defaults.multiplicity),
            extra: defaults.extra,
        };
        let mut entity = Entity::from(Interface::new(props));
        if with_empty_facts {
            entity.set_all_unknown_facts_empty();
        }
        let id = self.instantiate(entity);
        self.interface_instance_of(id, interface_model)?;
        self.child_of(id, for_model)?;
        Ok(id)
    }

    /// Create a port template of type `interface_model` on `for_model`.
    pub fn instantiate_dynamic(
        &mut self,
        interface_model: EntityId,
        for_model: EntityId,
        direction: Direction,
        multiplicity: Multiplicity,
        with_empty_facts: bool,
    ) -> Result<EntityId, PartsmithError> {
        let defaults = self.interface_model(interface_model)?.props.clone();
        self.component_model(for_model)?;

        let props = DynamicInterfaceProps {
            name: defaults.name,
            direction: inherit_direction(direction, defaults.direction),
            multiplicity: inherit_multiplicity(multiplicity, defaults.multiplicity),
            extra: defaults.extra,
        };
        let mut entity = Entity::from(DynamicInterface::new(props));
        if with_empty_facts {
            entity.set_all_unknown_facts_empty();
        }
        let id = self.instantiate(entity);
        self.relation_mut(id, RelationName::Model)?
            .set_single(interface_model, Map::new());
        self.link(id, RelationName::Parent, for_model, Map::new())?;
        Ok(id)
    }

    /// Direct supertypes of a component model or interface model.
    pub fn get_types(&self, model: EntityId) -> Result<Vec<EntityId>, PartsmithError> {
        match self.kind(model)? {
            EntityKind::ComponentModel | EntityKind::InterfaceModel => {
                self.targets(model, RelationName::Model)
            }
            actual => Err(PartsmithError::KindMismatch {
                id: model,
                expected: EntityKind::ComponentModel,
                actual,
            }),
        }
    }

    /// Declare `superclass` a supertype of `model`. Both must be of the same
    /// kind (component model or interface model).
    pub fn subclass_of(&mut self, model: EntityId, superclass: EntityId) -> Result<(), PartsmithError> {
        let kind = self.kind(model)?;
        if !matches!(kind, EntityKind::ComponentModel | EntityKind::InterfaceModel) {
            return Err(PartsmithError::KindMismatch {
                id: model,
                expected: EntityKind::ComponentModel,
                actual: kind,
            });
        }
        let super_kind = self.kind(superclass)?;
        if super_kind != kind {
            return Err(PartsmithError::KindMismatch {
                id: superclass,
                expected: kind,
                actual: super_kind,
            });
        }
        if model == superclass {
            return Err(PartsmithError::SelfReference(format!(
                "{} cannot be its own supertype",
                self.uri(model)?
            )));
        }
        self.link(model, RelationName::Model, superclass, Map::new())
    }
}

pub(crate) fn inherit_direction(requested: Direction, default: Direction) -> Direction {
    if requested == Direction::NotSet {
        default
    } else {
        requested
    }
}

pub(crate) fn inherit_multiplicity(requested: Multiplicity, default: Multiplicity) -> Multiplicity {
    if requested == Multiplicity::NotSet {
        default
    } else {
        requested
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ComponentModel;

    #[test]
    fn instantiate_names_ports_and_counts_them() {
        let mut reg = Registry::new();
        let cm = reg.instantiate(ComponentModel::default());
        let im = reg.instantiate(InterfaceModel::default());

        let a = reg
            .instantiate_interface(im, cm, "a", Direction::NotSet, Multiplicity::NotSet, false)
            .expect("a");
        let b = reg
            .instantiate_interface(im, cm, "b", Direction::NotSet, Multiplicity::NotSet, false)
            .expect("b");

        assert_eq!(reg.name(a).expect("name"), "a");
        assert_eq!(reg.name(b).expect("name"), "b");
        assert_ne!(reg.uri(a).expect("uri"), reg.uri(b).expect("uri"));
        assert_eq!(
            reg.get_facts(cm, RelationName::Interfaces).expect("facts").len(),
            2
        );
    }

    #[test]
    fn not_set_inherits_model_defaults() {
        let mut reg = Registry::new();
        let cm = reg.instantiate(ComponentModel::default());
        let im = reg.instantiate(
            InterfaceModel::new("float", Domain::Software)
                .with_defaults(Direction::Outgoing, Multiplicity::Many),
        );

        let port = reg
            .instantiate_interface(im, cm, "", Direction::NotSet, Multiplicity::One, true)
            .expect("port");
        let props = &reg.interface(port).expect("interface").props;
        assert_eq!(props.name, "float");
        assert_eq!(props.direction, Direction::Outgoing);
        assert_eq!(props.multiplicity, Multiplicity::One);
    }

    #[test]
    fn instantiate_dynamic_binds_type_and_owner() {
        let mut reg = Registry::new();
        let cm = reg.instantiate(ComponentModel::default());
        let im = reg.instantiate(InterfaceModel::new("some type", Domain::Software));

        let dynamic = reg
            .instantiate_dynamic(im, cm, Direction::NotSet, Multiplicity::NotSet, false)
            .expect("dynamic");
        assert_eq!(reg.name(dynamic).expect("name"), "some type");
        assert_eq!(
            reg.get_facts(cm, RelationName::DynamicInterfaces)
                .expect("facts")
                .len(),
            1
        );
    }

    #[test]
    fn instantiate_requires_component_model_owner() {
        let mut reg = Registry::new();
        let im = reg.instantiate(InterfaceModel::default());
        let other = reg.instantiate(InterfaceModel::default());
        let err = reg
            .instantiate_interface(im, other, "x", Direction::NotSet, Multiplicity::NotSet, false)
            .expect_err("not a component model");
        assert!(matches!(err, PartsmithError::KindMismatch { .. }));
    }

    #[test]
    fn subclass_of_rejects_self_and_mixed_kinds() {
        let mut reg = Registry::new();
        let base = reg.instantiate(InterfaceModel::new("base", Domain::Software));
        let derived = reg.instantiate(InterfaceModel::new("derived", Domain::Software));
        let cm = reg.instantiate(ComponentModel::default());

        reg.subclass_of(derived, base).expect("subclass");
        assert_eq!(reg.get_types(derived).expect("types"), vec![base]);
        assert!(reg.subclass_of(base, base).is_err());
        assert!(reg.subclass_of(derived, cm).is_err());
    }
}
