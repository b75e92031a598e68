//! # Dynamic Interfaces
//!
//! Port templates on a component model: a port of this type and direction
//! may be materialized on the model's components on demand.

use super::interface_model::{inherit_direction, inherit_multiplicity};
use super::{Entity, EntityData, Interface, InterfaceProps};
use crate::{
    Direction, EntityId, EntityKind, Multiplicity, PartsmithError, Registry, Relation,
    RelationName,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Properties of a port template.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicInterfaceProps {
    pub name: String,
    pub direction: Direction,
    pub multiplicity: Multiplicity,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DynamicInterface {
    pub props: DynamicInterfaceProps,
    pub(crate) model: Relation,
    pub(crate) parent: Relation,
}

impl DynamicInterface {
    #[must_use]
    pub fn new(props: DynamicInterfaceProps) -> Self {
        Self {
            props,
            ..Self::default()
        }
    }
}

impl EntityData for DynamicInterface {
    type Props = DynamicInterfaceProps;
    const KIND: EntityKind = EntityKind::DynamicInterface;
    const RELATIONS: &'static [RelationName] = &[RelationName::Model, RelationName::Parent];

    fn props(&self) -> &Self::Props {
        &self.props
    }

    fn props_mut(&mut self) -> &mut Self::Props {
        &mut self.props
    }

    fn relation(&self, name: RelationName) -> Option<&Relation> {
        match name {
            RelationName::Model => Some(&self.model),
            RelationName::Parent => Some(&self.parent),
            _ => None,
        }
    }

    fn relation_mut(&mut self, name: RelationName) -> Option<&mut Relation> {
        match name {
            RelationName::Model => Some(&mut self.model),
            RelationName::Parent => Some(&mut self.parent),
            _ => None,
        }
    }

    fn name(&self) -> &str {
        &self.props.name
    }
}

impl Registry {
    /// Materialize a port template on a component of the template's model.
    ///
    /// `NotSet` direction or multiplicity keep the template's values.
    pub fn materialize_dynamic(
        &mut self,
        dynamic: EntityId,
        for_component: EntityId,
        name: &str,
        direction: Direction,
        multiplicity: Multiplicity,
        with_empty_facts: bool,
    ) -> Result<EntityId, PartsmithError> {
        let template = self.dynamic_interface(dynamic)?;
        let owner = template.parent.first();
        let interface_model = self.get_interface_type(dynamic)?;
        let template_props = template.props.clone();
        let component_model = self.component(for_component)?.model.first();
        if owner.is_none() || owner != component_model {
            return Err(PartsmithError::ForeignTemplate(self.uri(dynamic)?));
        }

        let props = InterfaceProps {
            name: if name.is_empty() {
                template_props.name
            } else {
                name.to_string()
            },
            alias: String::new(),
            direction: inherit_direction(direction, template_props.direction),
            multiplicity: inherit_multiplicity(multiplicity, template_props.multiplicity),
            extra: template_props.extra,
        };
        let mut entity = Entity::from(Interface::new(props));
        if with_empty_facts {
            entity.set_all_unknown_facts_empty();
        }
        let id = self.instantiate(entity);
        self.interface_instance_of(id, interface_model)?;
        self.child_of(id, for_component)?;
        Ok(id)
    }
}
