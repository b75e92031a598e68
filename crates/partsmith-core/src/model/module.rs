//! # Modules
//!
//! Nodes of an elaborated instance tree. Modules are only created by
//! [`Registry::build`]; they always point at a concrete component model.
//!
//! Configuration of a module tree is finished in two passes:
//! [`Registry::configure`] pushes named overrides down the tree and
//! [`Registry::apply_global_variables`] renders template placeholders.

use super::{Entity, EntityData};
use crate::document::{TemplateContext, merge_documents};
use crate::primitives::{GLOBAL_VARIABLES_KEY, MAX_CONTAINMENT_DEPTH, SUBMODEL_KEY};
use crate::{
    Direction, EntityId, EntityKind, Multiplicity, PartsmithError, Registry, Relation,
    RelationName,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Properties of a module.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleProps {
    pub name: String,
    pub alias: String,
    /// Fully resolved configuration.
    pub configuration: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Module {
    pub props: ModuleProps,
    pub(crate) model: Relation,
    pub(crate) whole: Relation,
    pub(crate) parts: Relation,
    pub(crate) interfaces: Relation,
}

impl Module {
    #[must_use]
    pub fn new(props: ModuleProps) -> Self {
        Self {
            props,
            ..Self::default()
        }
    }
}

impl EntityData for Module {
    type Props = ModuleProps;
    const KIND: EntityKind = EntityKind::Module;
    const RELATIONS: &'static [RelationName] = &[
        RelationName::Model,
        RelationName::Whole,
        RelationName::Parts,
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
            RelationName::Parts => Some(&self.parts),
            RelationName::Interfaces => Some(&self.interfaces),
            _ => None,
        }
    }

    fn relation_mut(&mut self, name: RelationName) -> Option<&mut Relation> {
        match name {
            RelationName::Model => Some(&mut self.model),
            RelationName::Whole => Some(&mut self.whole),
            RelationName::Parts => Some(&mut self.parts),
            RelationName::Interfaces => Some(&mut self.interfaces),
            _ => None,
        }
    }

    fn name(&self) -> &str {
        &self.props.name
    }
}

// =============================================================================
// SNAPSHOT VIEWS
// =============================================================================

/// Serializable snapshot of a port of a module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceView {
    pub name: String,
    pub direction: Direction,
    pub multiplicity: Multiplicity,
    #[serde(rename = "type")]
    pub interface_type: String,
    /// URIs of the ports this port is connected to.
    pub connected_to: Vec<String>,
    /// URI of the port this port re-exports.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original: Option<String>,
}

/// Serializable snapshot of a module tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleView {
    pub name: String,
    pub alias: String,
    pub uri: String,
    /// URI of the component model the module instantiates.
    pub model: String,
    pub configuration: Map<String, Value>,
    pub interfaces: Vec<InterfaceView>,
    pub parts: Vec<ModuleView>,
}

// =============================================================================
// REGISTRY OPERATIONS
// =============================================================================

impl Registry {
    /// Make the module `part` a submodule of `whole`.
    pub(crate) fn module_part_of(&mut self, part: EntityId, whole: EntityId) -> Result<(), PartsmithError> {
        self.module(whole)?;
        if part == whole {
            return Err(PartsmithError::SelfReference(format!(
                "module {} cannot be a part of itself",
                self.uri(part)?
            )));
        }
        match self.module(part)?.whole.first() {
            Some(existing) if existing == whole => Ok(()),
            Some(_) => Err(PartsmithError::AlreadyPartOf(self.uri(part)?)),
            None => self.link(part, RelationName::Whole, whole, Map::new()),
        }
    }

    /// Push configuration overrides down a module tree.
    ///
    /// `overrides` is keyed by module alias (or name). A module merges the
    /// entry naming it, then lifts the entries of its own `submodel` list
    /// into the overrides handed to its parts.
    pub fn configure(&mut self, module: EntityId, overrides: &Map<String, Value>) -> Result<(), PartsmithError> {
        let mut stack = vec![(module, overrides.clone())];
        while let Some((current, mut pending)) = stack.pop() {
            let key = self.alias_or_name(current)?;
            let mut configuration = self.module(current)?.props.configuration.clone();
            if let Some(Value::Object(mine)) = pending.get(&key) {
                let mine = mine.clone();
                merge_documents(&mut configuration, &mine);
                pending.remove(&key);
            }
            if let Some(submodel) = configuration.remove(SUBMODEL_KEY) {
                let entries: Vec<Value> = match submodel {
                    Value::Array(items) => items,
                    Value::Object(map) => map.into_iter().map(|(_, v)| v).collect(),
                    _ => Vec::new(),
                };
                for entry in entries {
                    if let Some(name) = entry.get("name").and_then(Value::as_str) {
                        pending.insert(name.to_string(), entry.clone());
                    }
                }
            }
            self.module_mut(current)?.props.configuration = configuration;
            for part in self.targets(current, RelationName::Parts)?.into_iter().rev() {
                stack.push((part, pending.clone()));
            }
        }
        Ok(())
    }

    /// Template variables of a module: the model's `globalVariables`,
    /// overridden by `incoming`.
    pub fn get_global_variables(
        &self,
        module: EntityId,
        incoming: &Map<String, Value>,
    ) -> Result<Map<String, Value>, PartsmithError> {
        let model = self.get_type(module)?;
        let mut variables = match self.component_model(model)?.props.data.get(GLOBAL_VARIABLES_KEY) {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };
        for (key, value) in incoming {
            variables.insert(key.clone(), value.clone());
        }
        Ok(variables)
    }

    /// Render the configuration of every module of a tree.
    ///
    /// Each module sees its model's variables plus everything inherited
    /// from above. Nothing is written unless the whole tree renders.
    pub fn apply_global_variables(
        &mut self,
        module: EntityId,
        globals: &Map<String, Value>,
    ) -> Result<(), PartsmithError> {
        let mut rendered = Vec::new();
        let mut stack = vec![(module, globals.clone())];
        while let Some((current, incoming)) = stack.pop() {
            let context = TemplateContext::new(self.get_global_variables(current, &incoming)?);
            if !context.is_empty() {
                let configuration = context.render_map(&self.module(current)?.props.configuration)?;
                rendered.push((current, configuration));
            }
            for part in self.targets(current, RelationName::Parts)? {
                stack.push((part, context.variables().clone()));
            }
        }
        for (id, configuration) in rendered {
            self.module_mut(id)?.props.configuration = configuration;
        }
        Ok(())
    }

    /// Snapshot of a module tree.
    pub fn module_view(&self, module: EntityId) -> Result<ModuleView, PartsmithError> {
        self.module_view_at_depth(module, 0)
    }

    fn module_view_at_depth(&self, module: EntityId, depth: usize) -> Result<ModuleView, PartsmithError> {
        if depth > MAX_CONTAINMENT_DEPTH {
            return Err(PartsmithError::ContainmentCycle(self.uri(module)?));
        }
        let m = self.module(module)?;
        let mut interfaces = Vec::new();
        for port in m.interfaces.facts() {
            let p = self.interface(port.target)?;
            let ty = self.get_interface_type(port.target)?;
            interfaces.push(InterfaceView {
                name: p.props.name.clone(),
                direction: p.props.direction,
                multiplicity: p.props.multiplicity,
                interface_type: self.name(ty)?.to_string(),
                connected_to: p
                    .others
                    .facts()
                    .iter()
                    .map(|f| self.uri(f.target))
                    .collect::<Result<_, _>>()?,
                original: p.original.first().map(|o| self.uri(o)).transpose()?,
            });
        }
        let mut parts = Vec::new();
        for part in m.parts.facts() {
            parts.push(self.module_view_at_depth(part.target, depth + 1)?);
        }
        Ok(ModuleView {
            name: m.props.name.clone(),
            alias: m.props.alias.clone(),
            uri: self.uri(module)?,
            model: m.model.first().map(|id| self.uri(id)).transpose()?.unwrap_or_default(),
            configuration: m.props.configuration.clone(),
            interfaces,
            parts,
        })
    }

    /// Every module in the tree below (and including) `module`, breadth first.
    pub fn module_tree(&self, module: EntityId) -> Result<Vec<EntityId>, PartsmithError> {
        self.module(module)?;
        let mut order = vec![module];
        let mut cursor = 0;
        while let Some(&current) = order.get(cursor) {
            cursor += 1;
            for part in self.targets(current, RelationName::Parts)? {
                if !order.contains(&part) {
                    order.push(part);
                }
            }
        }
        Ok(order)
    }

    /// Create a module shell without relations.
    pub(crate) fn new_module(
        &mut self,
        name: &str,
        alias: &str,
        configuration: Map<String, Value>,
        extra: Map<String, Value>,
    ) -> EntityId {
        let mut entity = Entity::from(Module::new(ModuleProps {
            name: name.to_string(),
            alias: alias.to_string(),
            configuration,
            extra,
        }));
        entity.set_all_unknown_facts_empty();
        self.instantiate(entity)
    }
}

// =============================================================================
// TESTS
// =============================================================================
