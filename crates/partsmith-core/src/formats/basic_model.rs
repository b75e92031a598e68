//! # Basic Model Format
//!
//! JSON exchange format for component models. One document describes one
//! model name in one domain, with an entry per version:
//!
//! ```text
//! { name, domain, uri, types[], abstracts[], implementations[],
//!   interfaces_of_abstracts[], configured_for[],
//!   versions: [{ name, date, designedBy, projectName, maturity,
//!                can_have_parts, abstract, defaultConfiguration, data,
//!                external_references[],
//!                components: { nodes[], edges[],
//!                              configuration: { nodes[], edges[] } },
//!                interfaces[], dynamic_interfaces[] }] }
//! ```
//!
//! ## Import Semantics
//!
//! - Models referenced by URI are looked up locally first, then in the
//!   given [`ModelSource`]
//! - Unresolvable supertypes and deployment targets become stub models
//! - A version that cannot be built is logged, removed from the registry
//!   again and skipped; the other versions still import
//! - Realizations of abstract interfaces are restored best effort

use crate::model::Entity;
use crate::primitives::{MAX_DOCUMENT_BYTES, UNKNOWN_INTERFACE_TYPE};
use crate::{
    ComponentModel, ComponentModelProps, Direction, Domain, EntityId, EntityKind,
    ExternalReference, ExternalReferenceProps, InterfaceModel, ModelSource, Multiplicity,
    PartsmithError, Registry, RelationName,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Keys of an exported port entry that are not port properties.
const PORT_ANNOTATIONS: &[&str] = &["domain", "type", "linkToNode", "linkToInterface"];

fn default_true() -> bool {
    true
}

// =============================================================================
// DOCUMENT RECORDS
// =============================================================================

/// Top level of a basic-model document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicModel {
    pub name: String,
    pub domain: Domain,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uri: String,
    /// Direct supertypes, in the document's domain.
    #[serde(default)]
    pub types: Vec<TypeRef>,
    /// Only present for abstract models.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implementations: Option<Vec<ModelRef>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub abstracts: Vec<ModelRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interfaces_of_abstracts: Vec<RealizationRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub configured_for: Vec<DeploymentRef>,
    /// Kept as raw JSON so one malformed version does not reject the
    /// whole document.
    pub versions: Vec<Value>,
}

impl BasicModel {
    /// Parse a document, rejecting oversized input before parsing.
    pub fn from_json(document: &str) -> Result<Self, PartsmithError> {
        if document.len() > MAX_DOCUMENT_BYTES {
            return Err(PartsmithError::BasicModel(format!(
                "document of {} bytes exceeds the limit of {} bytes",
                document.len(),
                MAX_DOCUMENT_BYTES
            )));
        }
        serde_json::from_str(document).map_err(|e| PartsmithError::BasicModel(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, PartsmithError> {
        serde_json::to_string_pretty(self).map_err(|e| PartsmithError::SerializationError(e.to_string()))
    }

    /// Version names, skipping entries without one.
    #[must_use]
    pub fn version_names(&self) -> Vec<String> {
        self.versions
            .iter()
            .filter_map(|v| v.get("name").and_then(Value::as_str).map(str::to_string))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeRef {
    pub name: String,
    pub version: String,
}

/// A component model named by its identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRef {
    pub name: String,
    pub domain: Domain,
    pub version: String,
}

impl ModelRef {
    #[must_use]
    pub fn uri(&self) -> String {
        ComponentModel::uri_for(self.domain, &self.name, &self.version)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRef {
    pub name: String,
    pub version: String,
    pub uri: String,
}

/// A port of the model realizing a port of one of its abstract models.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealizationRef {
    #[serde(default)]
    pub interface: String,
    pub abstract_model_name: String,
    pub abstract_interface_name: String,
    #[serde(default)]
    pub abstract_interface_direction: Direction,
    #[serde(default)]
    pub abstract_interface_type: String,
}

/// One version of the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionEntry {
    pub name: String,
    #[serde(default)]
    pub date: String,
    #[serde(default, rename = "designedBy")]
    pub designed_by: String,
    #[serde(default, rename = "projectName")]
    pub project_name: String,
    #[serde(default)]
    pub maturity: String,
    #[serde(default = "default_true")]
    pub can_have_parts: bool,
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    #[serde(default, rename = "defaultConfiguration", skip_serializing_if = "Map::is_empty")]
    pub default_configuration: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub external_references: Vec<ReferenceEntry>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components: Option<Components>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dynamic_interfaces: Vec<Map<String, Value>>,
    /// Domain payload keys (`softwareData`, ...) and unknown fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceEntry {
    #[serde(flatten)]
    pub reference: ExternalReferenceProps,
    #[serde(default = "default_true")]
    pub optional: bool,
}

/// Parts and connections of a version.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Components {
    #[serde(default)]
    pub nodes: Vec<NodeEntry>,
    #[serde(default)]
    pub edges: Vec<EdgeEntry>,
    #[serde(default, skip_serializing_if = "ComponentsConfiguration::is_empty")]
    pub configuration: ComponentsConfiguration,
}

/// Configuration overrides of parts and connections, keyed by `name`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ComponentsConfiguration {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edges: Vec<Map<String, Value>>,
}

impl ComponentsConfiguration {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}

/// A part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub alias: String,
    pub model: ModelRef,
    /// Port name to port alias.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub interface_aliases: BTreeMap<String, String>,
}

/// A connection between two part ports; every other key is a connection
/// property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeEntry {
    pub from: Endpoint,
    pub to: Endpoint,
    #[serde(flatten)]
    pub props: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Part name.
    pub name: String,
    pub interface: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<Domain>,
}

// =============================================================================
// EXPORT
// =============================================================================

/// Describe `model` as a single-version basic-model document.
pub fn export_basic_model(registry: &Registry, model: EntityId) -> Result<BasicModel, PartsmithError> {
    let props = registry.component_model(model)?.props.clone();
    let uri = registry.uri(model)?;

    let types = registry
        .get_types(model)?
        .into_iter()
        .map(|supertype| {
            let p = &registry.component_model(supertype)?.props;
            Ok(TypeRef {
                name: p.name.clone(),
                version: p.version.clone(),
            })
        })
        .collect::<Result<Vec<_>, PartsmithError>>()?;
    let implementations = if props.is_abstract {
        Some(model_refs(registry, registry.get_implementations(model)?)?)
    } else {
        None
    };
    let abstracts = model_refs(registry, registry.get_abstracts(model)?)?;
    let configured_for = registry
        .get_configured_for(model)?
        .into_iter()
        .map(|target| {
            Ok(DeploymentRef {
                name: registry.name(target)?.to_string(),
                version: registry.component_model(target)?.props.version.clone(),
                uri: registry.uri(target)?,
            })
        })
        .collect::<Result<Vec<_>, PartsmithError>>()?;

    let ports = registry.get_interfaces(model, None, None)?;
    let mut interfaces_of_abstracts = Vec::new();
    for port in &ports {
        for abstract_port in registry.targets(*port, RelationName::InterfacesOfAbstracts)? {
            let owner = registry.get_parent(abstract_port)?.ok_or_else(|| {
                PartsmithError::BasicModel(format!("abstract interface {} has no parent", abstract_port))
            })?;
            let abstract_props = &registry.interface(abstract_port)?.props;
            interfaces_of_abstracts.push(RealizationRef {
                interface: registry.name(*port)?.to_string(),
                abstract_model_name: registry.name(owner)?.to_string(),
                abstract_interface_name: abstract_props.name.clone(),
                abstract_interface_direction: abstract_props.direction,
                abstract_interface_type: registry
                    .name(registry.get_interface_type(abstract_port)?)?
                    .to_string(),
            });
        }
    }

    let external_references = registry
        .get_facts(model, RelationName::ExternalReferences)?
        .iter()
        .map(|fact| {
            Ok(ReferenceEntry {
                reference: registry.external_reference(fact.target)?.props.clone(),
                optional: fact.props.get("optional").and_then(Value::as_bool).unwrap_or(true),
            })
        })
        .collect::<Result<Vec<_>, PartsmithError>>()?;

    let version = VersionEntry {
        name: props.version,
        date: props.date,
        designed_by: props.designed_by,
        project_name: props.project_name,
        maturity: props.maturity,
        can_have_parts: props.can_have_parts,
        is_abstract: props.is_abstract,
        default_configuration: props.default_configuration,
        external_references,
        data: props.data,
        components: export_components(registry, model)?,
        interfaces: ports
            .iter()
            .map(|port| export_port(registry, *port))
            .collect::<Result<_, _>>()?,
        dynamic_interfaces: registry
            .targets(model, RelationName::DynamicInterfaces)?
            .into_iter()
            .map(|template| export_port(registry, template))
            .collect::<Result<_, _>>()?,
        extra: props.extra,
    };
    let version =
        serde_json::to_value(&version).map_err(|e| PartsmithError::SerializationError(e.to_string()))?;

    Ok(BasicModel {
        name: props.name,
        domain: props.domain,
        uri,
        types,
        implementations,
        abstracts,
        interfaces_of_abstracts,
        configured_for,
        versions: vec![version],
    })
}

fn model_refs(registry: &Registry, models: Vec<EntityId>) -> Result<Vec<ModelRef>, PartsmithError> {
    models.into_iter().map(|m| model_ref(registry, m)).collect()
}

fn model_ref(registry: &Registry, model: EntityId) -> Result<ModelRef, PartsmithError> {
    let p = &registry.component_model(model)?.props;
    Ok(ModelRef {
        name: p.name.clone(),
        domain: p.domain,
        version: p.version.clone(),
    })
}

fn export_components(registry: &Registry, model: EntityId) -> Result<Option<Components>, PartsmithError> {
    let parts = registry.targets(model, RelationName::Parts)?;
    if parts.is_empty() {
        return Ok(None);
    }
    let mut components = Components::default();
    for part in parts {
        let component = registry.component(part)?;
        let mut node = NodeEntry {
            name: component.props.name.clone(),
            alias: component.props.alias.clone(),
            model: model_ref(registry, registry.get_type(part)?)?,
            interface_aliases: BTreeMap::new(),
        };
        if !component.props.configuration.is_empty() {
            let mut configuration = component.props.configuration.clone();
            configuration.insert("name".to_string(), Value::String(node.name.clone()));
            components.configuration.nodes.push(configuration);
        }

        for port in registry.targets(part, RelationName::Interfaces)? {
            let port_props = &registry.interface(port)?.props;
            if !port_props.alias.is_empty() {
                node.interface_aliases
                    .insert(port_props.name.clone(), port_props.alias.clone());
            }
            for fact in registry.get_facts(port, RelationName::Others)? {
                let peer = registry.get_parent(fact.target)?.ok_or_else(|| {
                    PartsmithError::BasicModel(format!("connected interface {} has no parent", fact.target))
                })?;
                let mut props = fact.props.clone();
                // Named connections carry their configuration in the
                // configuration section; unnamed ones keep it inline.
                let edge_name = props.get("name").and_then(Value::as_str).map(str::to_string);
                if let (Some(edge_name), Some(Value::Object(configuration))) =
                    (edge_name, props.get("configuration"))
                {
                    let mut configuration = configuration.clone();
                    configuration.insert("name".to_string(), Value::String(edge_name));
                    components.configuration.edges.push(configuration);
                    props.remove("configuration");
                }
                components.edges.push(EdgeEntry {
                    from: Endpoint {
                        name: node.name.clone(),
                        interface: port_props.name.clone(),
                        domain: Some(registry.get_domain(port)?),
                    },
                    to: Endpoint {
                        name: registry.name(peer)?.to_string(),
                        interface: registry.name(fact.target)?.to_string(),
                        domain: Some(registry.get_domain(fact.target)?),
                    },
                    props,
                });
            }
        }
        components.nodes.push(node);
    }
    Ok(Some(components))
}

/// Properties of a port or port template plus its domain, type name and,
/// for aliases, the part port it re-exports.
fn export_port(registry: &Registry, port: EntityId) -> Result<Map<String, Value>, PartsmithError> {
    let mut entry = registry.properties(port)?;
    entry.insert(
        "domain".to_string(),
        Value::String(registry.get_domain(port)?.as_str().to_string()),
    );
    entry.insert(
        "type".to_string(),
        Value::String(registry.name(registry.get_interface_type(port)?)?.to_string()),
    );
    if registry.kind(port)? == EntityKind::Interface {
        if let Some(original) = registry.get_original(port)? {
            if let Some(owner) = registry.get_parent(original)? {
                entry.insert("linkToNode".to_string(), Value::String(registry.name(owner)?.to_string()));
                entry.insert(
                    "linkToInterface".to_string(),
                    Value::String(registry.name(original)?.to_string()),
                );
            }
        }
    }
    Ok(entry)
}

// =============================================================================
// IMPORT
// =============================================================================

/// Resolves referenced models, caching hits for the duration of one import.
struct Resolver<'a> {
    source: Option<&'a dyn ModelSource>,
    models: BTreeMap<String, EntityId>,
}

impl Resolver<'_> {
    fn model(&mut self, registry: &mut Registry, uri: &str) -> Result<Option<EntityId>, PartsmithError> {
        if let Some(id) = self.models.get(uri) {
            if registry.contains(*id) {
                return Ok(Some(*id));
            }
        }
        let found = registry.load_by_uri(uri, self.source)?;
        if let Some(id) = found {
            self.models.insert(uri.to_string(), id);
        }
        Ok(found)
    }

    fn model_or_stub(
        &mut self,
        registry: &mut Registry,
        domain: Domain,
        name: &str,
        version: &str,
    ) -> Result<EntityId, PartsmithError> {
        let uri = ComponentModel::uri_for(domain, name, version);
        if let Some(id) = self.model(registry, &uri)? {
            return Ok(id);
        }
        debug!(uri = %uri, "creating stub model");
        let id = registry.instantiate(ComponentModel::new(name, domain, version));
        self.models.insert(uri, id);
        Ok(id)
    }

    /// Interface model named by a port entry's `type` and `domain`.
    fn interface_model(
        &mut self,
        registry: &mut Registry,
        entry: &Map<String, Value>,
        fallback: Domain,
    ) -> Result<EntityId, PartsmithError> {
        let name = entry
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or(UNKNOWN_INTERFACE_TYPE);
        let domain = match entry.get("domain").and_then(Value::as_str) {
            Some(domain) => Domain::parse(domain)?,
            None => fallback,
        };
        let uri = InterfaceModel::uri_for(domain, name);
        if let Some(id) = registry.load_by_uri(&uri, self.source)? {
            return Ok(id);
        }
        Ok(registry.instantiate(InterfaceModel::new(name, domain)))
    }
}

/// Models shared by every version of one document.
struct Shared {
    supertypes: Vec<EntityId>,
    deployment_targets: Vec<EntityId>,
    abstracts: Vec<EntityId>,
}

/// Import every buildable version of a basic-model document.
///
/// Returns the models in document order. A version whose URI is already
/// known is not imported again; the existing model is returned instead.
pub fn import_basic_model(
    registry: &mut Registry,
    document: &str,
    source: Option<&dyn ModelSource>,
) -> Result<Vec<EntityId>, PartsmithError> {
    let header = BasicModel::from_json(document)?;
    let mut resolver = Resolver {
        source,
        models: BTreeMap::new(),
    };

    let mut shared = Shared {
        supertypes: Vec::new(),
        deployment_targets: Vec::new(),
        abstracts: Vec::new(),
    };
    for supertype in &header.types {
        let id = resolver.model_or_stub(registry, header.domain, &supertype.name, &supertype.version)?;
        shared.supertypes.push(id);
    }
    for target in &header.configured_for {
        let id = match resolver.model(registry, &target.uri)? {
            Some(id) => id,
            None => resolver.model_or_stub(registry, Domain::Assembly, &target.name, &target.version)?,
        };
        shared.deployment_targets.push(id);
    }
    for abstract_ref in &header.abstracts {
        match resolver.model(registry, &abstract_ref.uri())? {
            Some(id) => shared.abstracts.push(id),
            None => warn!(uri = %abstract_ref.uri(), "abstract model not found"),
        }
    }

    let mut result = Vec::new();
    for (index, raw) in header.versions.iter().enumerate() {
        let entry: VersionEntry = match serde_json::from_value(raw.clone()) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(model = %header.name, index, error = %e, "skipping malformed version");
                continue;
            }
        };
        let uri = ComponentModel::uri_for(header.domain, &header.name, &entry.name);
        if let Some(existing) = registry.get_by_uri(&uri) {
            debug!(uri = %uri, "version already loaded");
            result.push(existing);
            continue;
        }
        match import_version(registry, &header, &entry, &shared, &mut resolver) {
            Ok(model) => {
                debug!(uri = %uri, "imported version");
                result.push(model);
            }
            Err(e) => warn!(uri = %uri, error = %e, "skipping version"),
        }
    }

    // Implementations link themselves to this model while being imported.
    if !result.is_empty() {
        for implementation in header.implementations.iter().flatten() {
            let uri = implementation.uri();
            match resolver.model(registry, &uri) {
                Ok(Some(_)) => {}
                Ok(None) => debug!(uri = %uri, "implementation not available"),
                Err(e) => warn!(uri = %uri, error = %e, "could not load implementation"),
            }
        }
    }
    Ok(result)
}

/// Build one version; everything it created is removed again on failure.
fn import_version(
    registry: &mut Registry,
    header: &BasicModel,
    entry: &VersionEntry,
    shared: &Shared,
    resolver: &mut Resolver<'_>,
) -> Result<EntityId, PartsmithError> {
    let mut extra = entry.extra.clone();
    if extra.contains_key("repository") {
        return Err(PartsmithError::BasicModel(
            "'repository' is deprecated, use external references instead".to_string(),
        ));
    }
    let data_key = header.domain.data_key();
    let data = match extra.remove(data_key) {
        Some(Value::Object(data)) => data,
        Some(other) => {
            return Err(PartsmithError::BasicModel(format!("'{}' must be an object, got {}", data_key, other)));
        }
        None => entry.data.clone(),
    };

    let props = ComponentModelProps {
        name: header.name.clone(),
        domain: header.domain,
        version: entry.name.clone(),
        is_abstract: entry.is_abstract,
        can_have_parts: entry.can_have_parts,
        default_configuration: entry.default_configuration.clone(),
        data,
        date: entry.date.clone(),
        designed_by: entry.designed_by.clone(),
        project_name: entry.project_name.clone(),
        maturity: entry.maturity.clone(),
        extra,
    };
    let mut model_entity = Entity::from(ComponentModel {
        props,
        ..ComponentModel::default()
    });
    model_entity.set_all_unknown_facts_empty();
    let model = registry.instantiate(model_entity);

    let mut created = vec![model];
    match populate_version(registry, model, header, entry, shared, resolver, &mut created) {
        Ok(()) => Ok(model),
        Err(e) => {
            for id in created.iter().rev() {
                if registry.contains(*id) {
                    registry.remove_cascading(*id)?;
                }
            }
            Err(e)
        }
    }
}

fn populate_version(
    registry: &mut Registry,
    model: EntityId,
    header: &BasicModel,
    entry: &VersionEntry,
    shared: &Shared,
    resolver: &mut Resolver<'_>,
    created: &mut Vec<EntityId>,
) -> Result<(), PartsmithError> {
    for supertype in &shared.supertypes {
        registry.subclass_of(model, *supertype)?;
    }
    for target in &shared.deployment_targets {
        registry.configured_for(model, *target)?;
    }

    for reference in &entry.external_references {
        let uri = ExternalReference::uri_for(&reference.reference.remote_url);
        let id = match registry.get_by_uri(&uri) {
            Some(id) => id,
            None => {
                let id = registry.instantiate(ExternalReference {
                    props: reference.reference.clone(),
                    ..ExternalReference::default()
                });
                created.push(id);
                id
            }
        };
        registry.annotate_with(model, id, reference.optional)?;
    }

    let mut parts = BTreeMap::new();
    if let Some(components) = &entry.components {
        for node in &components.nodes {
            let part_model = resolver.model(registry, &node.model.uri())?.ok_or_else(|| {
                PartsmithError::BasicModel(format!(
                    "could not load model {} for part {}",
                    node.model.uri(),
                    node.name
                ))
            })?;
            let part = registry.instantiate_component(part_model, model, &node.name, true)?;
            if !node.alias.is_empty() {
                registry.component_mut(part)?.props.alias = node.alias.clone();
            }
            for (port_name, alias) in &node.interface_aliases {
                let port = registry.get_interface(part, port_name)?.ok_or_else(|| {
                    PartsmithError::BasicModel(format!("part {} has no interface {}", node.name, port_name))
                })?;
                registry.interface_mut(port)?.props.alias = alias.clone();
            }
            parts.insert(node.name.clone(), part);
        }

        for edge in &components.edges {
            let from = part_port(registry, &parts, &edge.from.name, &edge.from.interface)?;
            let to = part_port(registry, &parts, &edge.to.name, &edge.to.interface)?;
            if !registry.connected_to(from, to, edge.props.clone())? {
                return Err(PartsmithError::BasicModel(format!(
                    "could not connect {}.{} to {}.{}",
                    edge.from.name, edge.from.interface, edge.to.name, edge.to.interface
                )));
            }
        }

        for overrides in &components.configuration.nodes {
            let Some(name) = overrides.get("name").and_then(Value::as_str) else {
                continue;
            };
            let part = parts.get(name).ok_or_else(|| {
                PartsmithError::BasicModel(format!("configuration names unknown part {}", name))
            })?;
            let mut configuration = overrides.clone();
            configuration.remove("name");
            registry.component_mut(*part)?.props.configuration = configuration;
        }

        for overrides in &components.configuration.edges {
            let Some(name) = overrides.get("name").and_then(Value::as_str) else {
                continue;
            };
            let mut configuration = overrides.clone();
            configuration.remove("name");
            let connections = named_connections(registry, &parts, name)?;
            if connections.is_empty() {
                return Err(PartsmithError::BasicModel(format!(
                    "configuration names unknown connection {}",
                    name
                )));
            }
            for (a, b, mut props) in connections {
                props.insert("configuration".to_string(), Value::Object(configuration.clone()));
                registry.set_connection_props(a, b, props)?;
            }
        }
    }

    let domain = header.domain;
    for port_entry in &entry.interfaces {
        let name = port_entry
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| PartsmithError::BasicModel("interface without a name".to_string()))?;
        let interface_model = resolver.interface_model(registry, port_entry, domain)?;
        let port = registry.instantiate_interface(
            interface_model,
            model,
            name,
            Direction::NotSet,
            Multiplicity::NotSet,
            true,
        )?;
        registry.set_properties(port, &port_properties(port_entry))?;

        let link_node = port_entry.get("linkToNode").and_then(Value::as_str);
        let link_interface = port_entry.get("linkToInterface").and_then(Value::as_str);
        if let (Some(node), Some(inner)) = (link_node, link_interface) {
            let original = part_port(registry, &parts, node, inner)?;
            registry.alias_of(port, original)?;
        }
    }

    for template_entry in &entry.dynamic_interfaces {
        let interface_model = resolver.interface_model(registry, template_entry, domain)?;
        let template = registry.instantiate_dynamic(
            interface_model,
            model,
            Direction::NotSet,
            Multiplicity::NotSet,
            true,
        )?;
        registry.set_properties(template, &port_properties(template_entry))?;
    }

    restore_realizations(registry, model, header, shared)
}

fn part_port(
    registry: &Registry,
    parts: &BTreeMap<String, EntityId>,
    part_name: &str,
    port_name: &str,
) -> Result<EntityId, PartsmithError> {
    let part = parts
        .get(part_name)
        .ok_or_else(|| PartsmithError::BasicModel(format!("unknown part {}", part_name)))?;
    registry
        .get_interface(*part, port_name)?
        .ok_or_else(|| PartsmithError::BasicModel(format!("part {} has no interface {}", part_name, port_name)))
}

/// Connections between part ports whose `name` property equals `name`.
fn named_connections(
    registry: &Registry,
    parts: &BTreeMap<String, EntityId>,
    name: &str,
) -> Result<Vec<(EntityId, EntityId, Map<String, Value>)>, PartsmithError> {
    let mut found = Vec::new();
    for part in parts.values() {
        for port in registry.targets(*part, RelationName::Interfaces)? {
            for fact in registry.get_facts(port, RelationName::Others)? {
                if fact.props.get("name").and_then(Value::as_str) == Some(name) {
                    found.push((port, fact.target, fact.props.clone()));
                }
            }
        }
    }
    Ok(found)
}

fn port_properties(entry: &Map<String, Value>) -> Map<String, Value> {
    entry
        .iter()
        .filter(|(key, _)| !PORT_ANNOTATIONS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Re-declare realizations and `implements` edges; failures are logged.
fn restore_realizations(
    registry: &mut Registry,
    model: EntityId,
    header: &BasicModel,
    shared: &Shared,
) -> Result<(), PartsmithError> {
    for realization in &header.interfaces_of_abstracts {
        let mut owner = None;
        for candidate in &shared.abstracts {
            if registry.name(*candidate)? == realization.abstract_model_name {
                owner = Some(*candidate);
                break;
            }
        }
        let Some(owner) = owner else {
            warn!(abstract_model = %realization.abstract_model_name, "realized abstract model not found");
            continue;
        };
        let port = registry.get_interface(model, &realization.interface)?;
        let abstract_port = registry.get_interface(owner, &realization.abstract_interface_name)?;
        let (Some(port), Some(abstract_port)) = (port, abstract_port) else {
            warn!(
                interface = %realization.interface,
                abstract_interface = %realization.abstract_interface_name,
                "realized interface not found"
            );
            continue;
        };
        if let Err(e) = registry.realizes(port, abstract_port) {
            warn!(error = %e, "could not restore realization");
        }
    }
    for abstract_model in &shared.abstracts {
        if let Err(e) = registry.implements(model, *abstract_model) {
            warn!(error = %e, "could not restore implementation");
        }
    }
    Ok(())
}

// =============================================================================
// DIGESTS
// =============================================================================

/// BLAKE3 digest of the exported basic-model document of `model`.
///
/// The export is deterministic, so equal models yield equal digests in
/// every registry.
///
/// # Requires
///
/// This function is only available with the `crypto-hash` feature enabled.
#[cfg(feature = "crypto-hash")]
pub fn document_digest(registry: &Registry, model: EntityId) -> Result<String, PartsmithError> {
    let document = export_basic_model(registry, model)?.to_json()?;
    Ok(blake3::hash(document.as_bytes()).to_hex().to_string())
}

// =============================================================================
// TESTS
// =============================================================================
