//! # Component Models
//!
//! Composite types: their parts, ports, supertypes and the abstract /
//! implementation relationship.
//!
//! ## Abstractness
//!
//! A model is abstract if it is flagged so, or if any of its parts is an
//! instance of an abstract model. Abstractness is therefore contagious up
//! the containment tree and is always computed, never cached.
//!
//! ## Containment
//!
//! A part whose model (transitively) contains the whole it is added to is
//! rejected with [`PartsmithError::ContainmentCycle`]. Traversals that walk
//! containment are iterative and bounded by
//! [`MAX_CONTAINMENT_DEPTH`](crate::primitives::MAX_CONTAINMENT_DEPTH).

use super::{Component, ComponentProps, Entity, EntityData, Interface};
use crate::primitives::{MAX_CONTAINMENT_DEPTH, URI_SCHEME};
use crate::{Domain, EntityId, EntityKind, PartsmithError, Registry, Relation, RelationName};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Properties of a component model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentModelProps {
    pub name: String,
    pub domain: Domain,
    pub version: String,
    #[serde(rename = "abstract")]
    pub is_abstract: bool,
    pub can_have_parts: bool,
    #[serde(rename = "defaultConfiguration")]
    pub default_configuration: Map<String, Value>,
    /// Domain payload, including template variables.
    pub data: Map<String, Value>,
    pub date: String,
    #[serde(rename = "designedBy")]
    pub designed_by: String,
    #[serde(rename = "projectName")]
    pub project_name: String,
    pub maturity: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for ComponentModelProps {
    fn default() -> Self {
        Self {
            name: String::new(),
            domain: Domain::default(),
            version: String::new(),
            is_abstract: false,
            can_have_parts: true,
            default_configuration: Map::new(),
            data: Map::new(),
            date: String::new(),
            designed_by: String::new(),
            project_name: String::new(),
            maturity: String::new(),
            extra: Map::new(),
        }
    }
}

/// A composite type.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ComponentModel {
    pub props: ComponentModelProps,
    /// Supertypes.
    pub(crate) model: Relation,
    pub(crate) parts: Relation,
    /// Abstract models this model implements.
    pub(crate) abstracts: Relation,
    pub(crate) implementations: Relation,
    pub(crate) configured_for: Relation,
    pub(crate) deployables: Relation,
    pub(crate) interfaces: Relation,
    pub(crate) dynamic_interfaces: Relation,
    pub(crate) external_references: Relation,
}

impl ComponentModel {
    #[must_use]
    pub fn new(name: impl Into<String>, domain: Domain, version: impl Into<String>) -> Self {
        Self {
            props: ComponentModelProps {
                name: name.into(),
                domain,
                version: version.into(),
                ..ComponentModelProps::default()
            },
            ..Self::default()
        }
    }

    /// Flag the model as abstract.
    #[must_use]
    pub fn as_abstract(mut self) -> Self {
        self.props.is_abstract = true;
        self
    }

    /// Declare that the model never has parts.
    #[must_use]
    pub fn without_parts(mut self) -> Self {
        self.props.can_have_parts = false;
        self
    }

    #[must_use]
    pub fn with_default_configuration(mut self, configuration: Map<String, Value>) -> Self {
        self.props.default_configuration = configuration;
        self
    }

    #[must_use]
    pub fn uri_for(domain: Domain, name: &str, version: &str) -> String {
        format!("{URI_SCHEME}component_model/{domain}/{name}/{version}")
    }
}

impl EntityData for ComponentModel {
    type Props = ComponentModelProps;
    const KIND: EntityKind = EntityKind::ComponentModel;
    const RELATIONS: &'static [RelationName] = &[
        RelationName::Model,
        RelationName::Parts,
        RelationName::Abstracts,
        RelationName::Implementations,
        RelationName::ConfiguredFor,
        RelationName::Deployables,
        RelationName::Interfaces,
        RelationName::DynamicInterfaces,
        RelationName::ExternalReferences,
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
            RelationName::Parts => Some(&self.parts),
            RelationName::Abstracts => Some(&self.abstracts),
            RelationName::Implementations => Some(&self.implementations),
            RelationName::ConfiguredFor => Some(&self.configured_for),
            RelationName::Deployables => Some(&self.deployables),
            RelationName::Interfaces => Some(&self.interfaces),
            RelationName::DynamicInterfaces => Some(&self.dynamic_interfaces),
            RelationName::ExternalReferences => Some(&self.external_references),
            _ => None,
        }
    }

    fn relation_mut(&mut self, name: RelationName) -> Option<&mut Relation> {
        match name {
            RelationName::Model => Some(&mut self.model),
            RelationName::Parts => Some(&mut self.parts),
            RelationName::Abstracts => Some(&mut self.abstracts),
            RelationName::Implementations => Some(&mut self.implementations),
            RelationName::ConfiguredFor => Some(&mut self.configured_for),
            RelationName::Deployables => Some(&mut self.deployables),
            RelationName::Interfaces => Some(&mut self.interfaces),
            RelationName::DynamicInterfaces => Some(&mut self.dynamic_interfaces),
            RelationName::ExternalReferences => Some(&mut self.external_references),
            _ => None,
        }
    }

    fn name(&self) -> &str {
        &self.props.name
    }
}

// =============================================================================
// INSTANTIATION AND CONTAINMENT
// =============================================================================

impl Registry {
    /// Create a component of `model` as a part of `whole`.
    ///
    /// The component starts with the model's default configuration and a
    /// clone of every port of the model. Port templates are not
    /// materialized.
    pub fn instantiate_component(
        &mut self,
        model: EntityId,
        whole: EntityId,
        name: &str,
        with_empty_facts: bool,
    ) -> Result<EntityId, PartsmithError> {
        let source = self.component_model(model)?;
        let props = ComponentProps {
            name: if name.is_empty() {
                source.props.name.clone()
            } else {
                name.to_string()
            },
            alias: String::new(),
            configuration: source.props.default_configuration.clone(),
            extra: Map::new(),
        };
        let ports = self.targets(model, RelationName::Interfaces)?;
        self.component_model(whole)?;

        let mut entity = Entity::from(Component::new(props));
        if with_empty_facts {
            entity.set_all_unknown_facts_empty();
        }
        let component = self.instantiate(entity);
        let attached = self
            .composed_of(whole, component)
            .and_then(|()| self.instance_of(component, model));
        if let Err(e) = attached {
            self.remove(component)?;
            return Err(e);
        }
        for port in ports {
            self.clone_interface(port, component, with_empty_facts)?;
        }
        Ok(component)
    }

    /// Create a port on `owner` with the properties and type of `port`.
    pub(crate) fn clone_interface(
        &mut self,
        port: EntityId,
        owner: EntityId,
        with_empty_facts: bool,
    ) -> Result<EntityId, PartsmithError> {
        let props = self.interface(port)?.props.clone();
        let ty = self.get_interface_type(port)?;
        let mut entity = Entity::from(Interface::new(props));
        if with_empty_facts {
            entity.set_all_unknown_facts_empty();
        }
        let clone = self.instantiate(entity);
        self.interface_instance_of(clone, ty)?;
        self.child_of(clone, owner)?;
        Ok(clone)
    }

    /// Make the component `part` a part of the model `whole`.
    ///
    /// Repeating the same call is a no-op.
    pub fn composed_of(&mut self, whole: EntityId, part: EntityId) -> Result<(), PartsmithError> {
        if !self.component_model(whole)?.props.can_have_parts {
            return Err(PartsmithError::PartsNotAllowed(self.uri(whole)?));
        }
        let component = self.component(part)?;
        let model = component.model.first();
        match component.whole.first() {
            Some(existing) if existing == whole => return Ok(()),
            Some(_) => return Err(PartsmithError::AlreadyPartOf(self.uri(part)?)),
            None => {}
        }
        if let Some(model) = model {
            self.check_containment(whole, model)?;
        }
        self.link(part, RelationName::Whole, whole, Map::new())
    }

    /// Reject a part of `part_model` inside `whole` if it would make a model
    /// contain itself.
    pub(crate) fn check_containment(
        &self,
        whole: EntityId,
        part_model: EntityId,
    ) -> Result<(), PartsmithError> {
        if whole == part_model {
            return Err(PartsmithError::SelfReference(format!(
                "{} cannot be a part of itself",
                self.uri(whole)?
            )));
        }
        let mut visited = BTreeSet::new();
        let mut stack = vec![(part_model, 0_usize)];
        while let Some((model, depth)) = stack.pop() {
            if !visited.insert(model) {
                continue;
            }
            if depth >= MAX_CONTAINMENT_DEPTH {
                return Err(PartsmithError::ContainmentCycle(format!(
                    "{} exceeds containment depth {}",
                    self.uri(part_model)?,
                    MAX_CONTAINMENT_DEPTH
                )));
            }
            for part in self.targets(model, RelationName::Parts)? {
                let Some(inner) = self.component(part)?.model.first() else {
                    continue;
                };
                if inner == whole {
                    return Err(PartsmithError::ContainmentCycle(format!(
                        "{} already contains {}",
                        self.uri(part_model)?,
                        self.uri(whole)?
                    )));
                }
                stack.push((inner, depth + 1));
            }
        }
        Ok(())
    }

    /// Part of a model or module by name.
    pub fn get_part(&self, owner: EntityId, name: &str) -> Result<Option<EntityId>, PartsmithError> {
        for part in self.targets(owner, RelationName::Parts)? {
            if self.name(part)? == name {
                return Ok(Some(part));
            }
        }
        Ok(None)
    }

    /// `true` if the model or module has no parts.
    ///
    /// With `throw_on_inconsistency`, a model that has parts although it is
    /// declared without parts is an error.
    pub fn is_atomic(&self, model: EntityId, throw_on_inconsistency: bool) -> Result<bool, PartsmithError> {
        if let Entity::Module(module) = self.get(model)? {
            return Ok(module.parts.is_empty());
        }
        let m = self.component_model(model)?;
        let has_parts = !m.parts.is_empty();
        if has_parts && !m.props.can_have_parts && throw_on_inconsistency {
            return Err(PartsmithError::InconsistentAtomicity(self.uri(model)?));
        }
        Ok(!has_parts)
    }

    /// Set the model's domain from its parts: the common domain, or
    /// ASSEMBLY if they differ. Returns `false` if there are no parts.
    pub fn derive_domain_from_parts(&mut self, model: EntityId) -> Result<bool, PartsmithError> {
        let mut derived: Option<Domain> = None;
        for part in self.targets(model, RelationName::Parts)? {
            let Some(part_model) = self.component(part)?.model.first() else {
                continue;
            };
            let domain = self.component_model(part_model)?.props.domain;
            match derived {
                None => derived = Some(domain),
                Some(d) if d != domain => {
                    derived = Some(Domain::Assembly);
                    break;
                }
                Some(_) => {}
            }
        }
        match derived {
            Some(domain) => {
                self.component_model_mut(model)?.props.domain = domain;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

// =============================================================================
// TYPES, ABSTRACTS AND IMPLEMENTATIONS
// =============================================================================

impl Registry {
    /// Transitive supertypes, keyed by URI.
    pub fn get_all_types(&self, model: EntityId) -> Result<BTreeMap<String, EntityId>, PartsmithError> {
        let mut result = BTreeMap::new();
        let mut stack = self.get_types(model)?;
        while let Some(current) = stack.pop() {
            let uri = self.uri(current)?;
            if result.insert(uri, current).is_none() {
                stack.extend(self.get_types(current)?);
            }
        }
        Ok(result)
    }

    /// Flagged abstract, or any part (transitively) is an instance of an
    /// abstract model.
    pub fn is_abstract(&self, model: EntityId) -> Result<bool, PartsmithError> {
        let mut visited = BTreeSet::new();
        let mut stack = vec![model];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            let m = self.component_model(current)?;
            if m.props.is_abstract {
                return Ok(true);
            }
            for part in m.parts.facts() {
                if let Some(part_model) = self.component(part.target)?.model.first() {
                    stack.push(part_model);
                }
            }
        }
        Ok(false)
    }

    /// Abstract models this model directly implements.
    pub fn get_abstracts(&self, model: EntityId) -> Result<Vec<EntityId>, PartsmithError> {
        self.component_model(model)?;
        self.targets(model, RelationName::Abstracts)
    }

    /// Models that directly implement this abstract model.
    pub fn get_implementations(&self, model: EntityId) -> Result<Vec<EntityId>, PartsmithError> {
        self.component_model(model)?;
        self.targets(model, RelationName::Implementations)
    }

    /// Every abstract model implemented directly, through an abstract's own
    /// abstracts, or through a supertype. Keyed by URI.
    pub fn get_all_abstracts(&self, model: EntityId) -> Result<BTreeMap<String, EntityId>, PartsmithError> {
        let mut result = BTreeMap::new();
        let mut visited = BTreeSet::new();
        let mut stack = vec![model];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            for abstract_model in self.get_abstracts(current)? {
                result.insert(self.uri(abstract_model)?, abstract_model);
                stack.push(abstract_model);
            }
            stack.extend(self.get_types(current)?);
        }
        Ok(result)
    }

    pub fn is_implementing(&self, model: EntityId, superclass: EntityId) -> Result<bool, PartsmithError> {
        let uri = self.uri(superclass)?;
        Ok(self.get_all_abstracts(model)?.contains_key(&uri))
    }

    /// Structural check: every port of `superclass` can be matched by a
    /// distinct port of `model` with the same type and direction.
    ///
    /// Matching is greedy: each port of `model` takes the first abstract
    /// port it can realize that is still unmatched.
    pub fn can_implement(&self, model: EntityId, superclass: EntityId) -> Result<bool, PartsmithError> {
        if !self.is_abstract(superclass)? || self.is_abstract(model)? {
            return Ok(false);
        }
        let abstract_ports = self.targets(superclass, RelationName::Interfaces)?;
        let ports = self.targets(model, RelationName::Interfaces)?;
        if abstract_ports.is_empty() || ports.is_empty() {
            return Ok(false);
        }
        let mut matched = BTreeSet::new();
        for port in ports {
            for abstract_port in &abstract_ports {
                if matched.contains(abstract_port) {
                    continue;
                }
                if self.can_realize(port, *abstract_port)? {
                    matched.insert(*abstract_port);
                    break;
                }
            }
        }
        Ok(matched.len() == abstract_ports.len())
    }

    /// Declared check: counts the ports of `model` that realize a port of
    /// `superclass` and compares with the port count of `superclass`.
    pub fn is_valid_implementation(
        &self,
        model: EntityId,
        superclass: EntityId,
    ) -> Result<bool, PartsmithError> {
        if !self.is_abstract(superclass)? {
            return Err(PartsmithError::NotAbstract(self.name(superclass)?.to_string()));
        }
        if self.is_abstract(model)? {
            return Err(PartsmithError::AbstractImplementer(self.name(model)?.to_string()));
        }
        if self.component_model(model)?.abstracts.contains(superclass) {
            return Err(PartsmithError::DuplicateImplementation {
                model: self.name(model)?.to_string(),
                abstract_model: self.name(superclass)?.to_string(),
            });
        }
        let mut matches = 0_usize;
        for port in self.targets(model, RelationName::Interfaces)? {
            let realized = self
                .targets(port, RelationName::InterfacesOfAbstracts)?
                .into_iter()
                .map(|abstract_port| self.get_parent(abstract_port))
                .collect::<Result<Vec<_>, _>>()?;
            if realized.contains(&Some(superclass)) {
                matches += 1;
            }
        }
        let expected = self.component_model(superclass)?.interfaces.len();
        debug!(model = %model, superclass = %superclass, matches, expected, "implementation check");
        Ok(matches == expected)
    }

    /// Record that `model` implements the abstract `superclass`.
    pub fn implements(&mut self, model: EntityId, superclass: EntityId) -> Result<(), PartsmithError> {
        if !self.is_valid_implementation(model, superclass)? {
            return Err(PartsmithError::InvalidImplementation {
                model: self.name(model)?.to_string(),
                abstract_model: self.name(superclass)?.to_string(),
            });
        }
        self.link(model, RelationName::Abstracts, superclass, Map::new())
    }
}

// =============================================================================
// PORTS
// =============================================================================

impl Registry {
    /// Ports of `owner` filtered by type and name, when given.
    pub fn get_interfaces(
        &self,
        owner: EntityId,
        with_type: Option<EntityId>,
        with_name: Option<&str>,
    ) -> Result<Vec<EntityId>, PartsmithError> {
        let mut result = Vec::new();
        for port in self.targets(owner, RelationName::Interfaces)? {
            if let Some(ty) = with_type {
                if self.get_interface_type(port)? != ty {
                    continue;
                }
            }
            if let Some(name) = with_name {
                if self.name(port)? != name {
                    continue;
                }
            }
            result.push(port);
        }
        Ok(result)
    }

    /// First port of `owner` with the given name.
    pub fn get_interface(&self, owner: EntityId, name: &str) -> Result<Option<EntityId>, PartsmithError> {
        Ok(self.get_interfaces(owner, None, Some(name))?.into_iter().next())
    }

    /// Disconnect and delete every port of `model` named `name`.
    pub fn remove_interface(&mut self, model: EntityId, name: &str) -> Result<usize, PartsmithError> {
        self.component_model(model)?;
        let matches = self.get_interfaces(model, None, Some(name))?;
        for port in &matches {
            self.disconnect(*port)?;
            self.remove(*port)?;
        }
        Ok(matches.len())
    }

    /// Non-matching ports of every part, see
    /// [`Registry::find_nonmatching_interfaces`].
    pub fn find_nonmatching_part_interfaces(
        &self,
        model: EntityId,
    ) -> Result<BTreeMap<EntityId, Vec<EntityId>>, PartsmithError> {
        let mut result = BTreeMap::new();
        for part in self.targets(model, RelationName::Parts)? {
            result.extend(self.find_nonmatching_interfaces(part)?);
        }
        Ok(result)
    }

    /// Drop every outgoing connection of every part port.
    pub fn disconnect_parts(&mut self, model: EntityId) -> Result<(), PartsmithError> {
        for part in self.targets(model, RelationName::Parts)? {
            for port in self.targets(part, RelationName::Interfaces)? {
                self.disconnect(port)?;
            }
        }
        Ok(())
    }

    /// Re-export the port `inner` of one of `model`'s parts on `model`.
    ///
    /// An existing alias of the same type pointing at `inner` is reused;
    /// otherwise a new port named `{part}:{port}` is created.
    pub fn export_inner_interface(
        &mut self,
        model: EntityId,
        inner: EntityId,
        with_empty_facts: bool,
    ) -> Result<EntityId, PartsmithError> {
        self.component_model(model)?;
        let part = self.get_parent(inner)?.ok_or_else(|| {
            PartsmithError::MissingArgument(format!("interface {} has no parent", inner))
        })?;

        for candidate in self.targets(model, RelationName::Interfaces)? {
            if self.interface(candidate)?.original.contains(inner) && self.has_same_type(candidate, inner)? {
                debug!(interface = %self.name(candidate)?, "reusing exported interface");
                return Ok(candidate);
            }
        }

        let mut props = self.interface(inner)?.props.clone();
        props.name = format!("{}:{}", self.name(part)?, props.name);
        let ty = self.get_interface_type(inner)?;
        let mut entity = Entity::from(Interface::new(props));
        if with_empty_facts {
            entity.set_all_unknown_facts_empty();
        }
        let outer = self.instantiate(entity);
        self.interface_instance_of(outer, ty)?;
        self.child_of(outer, model)?;
        self.alias_of(outer, inner)?;
        Ok(outer)
    }
}

// =============================================================================
// REFERENCES AND DEPLOYMENT
// =============================================================================

impl Registry {
    /// Attach an external reference; `optional` is kept on the edge.
    pub fn annotate_with(
        &mut self,
        model: EntityId,
        reference: EntityId,
        optional: bool,
    ) -> Result<(), PartsmithError> {
        self.component_model(model)?;
        self.external_reference(reference)?;
        let mut props = Map::new();
        props.insert("optional".to_string(), Value::Bool(optional));
        self.link(model, RelationName::ExternalReferences, reference, props)
    }

    /// Only SOFTWARE models can be configured for ASSEMBLY models.
    pub fn can_configure(&self, model: EntityId, target: EntityId) -> Result<bool, PartsmithError> {
        Ok(self.component_model(model)?.props.domain == Domain::Software
            && self.component_model(target)?.props.domain == Domain::Assembly)
    }

    pub fn configured_for(&mut self, model: EntityId, target: EntityId) -> Result<(), PartsmithError> {
        if !self.can_configure(model, target)? {
            return Err(PartsmithError::CannotConfigure {
                model: self.uri(model)?,
                target: self.uri(target)?,
            });
        }
        self.link(model, RelationName::ConfiguredFor, target, Map::new())
    }

    pub fn remove_configured_for(&mut self, model: EntityId, target: EntityId) -> Result<bool, PartsmithError> {
        self.component_model(model)?;
        self.unlink(model, RelationName::ConfiguredFor, target)
    }

    pub fn get_configured_for(&self, model: EntityId) -> Result<Vec<EntityId>, PartsmithError> {
        self.component_model(model)?;
        self.targets(model, RelationName::ConfiguredFor)
    }
}

// =============================================================================
// TESTS
// =============================================================================
