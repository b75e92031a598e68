//! # Components
//!
//! A component is a part slot inside a component model: an instance of
//! another model, with its own name, alias and configuration override.

use super::EntityData;
use crate::{EntityId, EntityKind, PartsmithError, Registry, Relation, RelationName};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Properties of a component.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentProps {
    pub name: String,
    pub alias: String,
    /// Instance-level configuration override.
    pub configuration: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Component {
    pub props: ComponentProps,
    pub(crate) model: Relation,
    pub(crate) whole: Relation,
    pub(crate) interfaces: Relation,
}

impl Component {
    #[must_use]
    pub fn new(props: ComponentProps) -> Self {
        Self {
            props,
            ..Self::default()
        }
    }
}

impl EntityData for Component {
    type Props = ComponentProps;
    const KIND: EntityKind = EntityKind::Component;
    const RELATIONS: &'static [RelationName] = &[
        RelationName::Model,
        RelationName::Whole,
        RelationName::Interfaces,
    ];

    fn props(&self) -> &Self::Props {
        &self.props
    }

    fn props_mut(&mut self) -> &mut Self::Props {
        &mut self.props
    }

    fn relation(&self, name: RelationName) -> Option<&Relation> {
        match name {
            RelationName::Model => Some(&self.model),
            RelationName::Whole => Some(&self.whole),
            RelationName::Interfaces => Some(&self.interfaces),
            _ => None,
        }
    }

    fn relation_mut(&mut self, name: RelationName) -> Option<&mut Relation> {
        match name {
            RelationName::Model => Some(&mut self.model),
            RelationName::Whole => Some(&mut self.whole),
            RelationName::Interfaces => Some(&mut self.interfaces),
            _ => None,
        }
    }

    fn name(&self) -> &str {
        &self.props.name
    }
}

impl Registry {
    /// Bind a component or module to the component model it instantiates.
    pub fn instance_of(&mut self, instance: EntityId, model: EntityId) -> Result<(), PartsmithError> {
        self.component_model(model)?;
        match self.kind(instance)? {
            EntityKind::Component => {
                if let Some(whole) = self.component(instance)?.whole.first() {
                    self.check_containment(whole, model)?;
                }
            }
            EntityKind::Module => {}
            actual => {
                return Err(PartsmithError::KindMismatch {
                    id: instance,
                    expected: EntityKind::Component,
                    actual,
                });
            }
        }
        self.relation_mut(instance, RelationName::Model)?
            .set_single(model, Map::new());
        Ok(())
    }

    /// Make `part` a part of `whole`: a component of a component model, or a
    /// module of a module.
    pub fn part_of(&mut self, part: EntityId, whole: EntityId) -> Result<(), PartsmithError> {
        match self.kind(part)? {
            EntityKind::Component => self.composed_of(whole, part),
            EntityKind::Module => self.module_part_of(part, whole),
            actual => Err(PartsmithError::KindMismatch {
                id: part,
                expected: EntityKind::Component,
                actual,
            }),
        }
    }

    /// Model a component or module was instantiated from.
    pub fn get_type(&self, instance: EntityId) -> Result<EntityId, PartsmithError> {
        match self.kind(instance)? {
            EntityKind::Component | EntityKind::Module => {}
            actual => {
                return Err(PartsmithError::KindMismatch {
                    id: instance,
                    expected: EntityKind::Component,
                    actual,
                });
            }
        }
        self.target(instance, RelationName::Model)?.ok_or_else(|| {
            PartsmithError::MissingArgument(format!("{} has no model", instance))
        })
    }

    /// The alias if set, otherwise the name.
    pub fn alias_or_name(&self, id: EntityId) -> Result<String, PartsmithError> {
        let props = self.properties(id)?;
        match props.get("alias").and_then(Value::as_str) {
            Some(alias) if !alias.is_empty() => Ok(alias.to_string()),
            _ => Ok(self.name(id)?.to_string()),
        }
    }

    /// Ports of a component that have no exact (type and name) counterpart
    /// on its model, each with the model ports of the same type that are
    /// not already matched exactly.
    pub fn find_nonmatching_interfaces(
        &self,
        component: EntityId,
    ) -> Result<BTreeMap<EntityId, Vec<EntityId>>, PartsmithError> {
        let mut result = BTreeMap::new();
        let c = self.component(component)?;
        if !c.interfaces.is_known() {
            return Ok(result);
        }
        let model = self.get_type(component)?;

        let mut exact = BTreeSet::new();
        let mut unmatched = Vec::new();
        for port in c.interfaces.facts().iter().map(|f| f.target) {
            let ty = self.get_interface_type(port)?;
            let matches = self.get_interfaces(model, Some(ty), Some(self.name(port)?))?;
            match matches.as_slice() {
                [] => unmatched.push((port, ty)),
                [single] => {
                    exact.insert(*single);
                }
                _ => {
                    return Err(PartsmithError::Wiring(format!(
                        "multiple ports of {} match {} by type and name",
                        self.uri(model)?,
                        self.uri(port)?
                    )));
                }
            }
        }
        for (port, ty) in unmatched {
            let candidates = self
                .get_interfaces(model, Some(ty), None)?
                .into_iter()
                .filter(|candidate| !exact.contains(candidate))
                .collect();
            result.insert(port, candidates);
        }
        Ok(result)
    }
}
