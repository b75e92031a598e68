//! # Registry
//!
//! The arena that owns every entity of one assembly graph.
//!
//! Entities refer to each other only through [`EntityId`] handles stored in
//! their relations. The registry is the sole owner: removing an entity
//! scrubs its handle from every relation, and a stale handle resolves to
//! [`PartsmithError::EntityNotFound`].
//!
//! ## Bidirectional relations
//!
//! Most relations have an inverse that is maintained automatically:
//!
//! | relation | inverse |
//! |---|---|
//! | `whole` | `parts` |
//! | `abstracts` | `implementations` |
//! | `configured_for` | `deployables` |
//! | `parent` | `interfaces` / `dynamic_interfaces` |
//! | `others` | `from_others` |
//! | `external_references` | `referenced_by` |
//!
//! `model`, `original` and `interfaces_of_abstracts` are one-way.

use crate::model::{ComponentModel, Entity, ExternalReference, InterfaceModel};
use crate::model::{Component, DynamicInterface, Interface, Module};
use crate::primitives::{MAX_CONTAINMENT_DEPTH, URI_SCHEME};
use crate::{EntityId, EntityKind, Fact, PartsmithError, Relation, RelationName};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

// =============================================================================
// REGISTRY
// =============================================================================

/// Owner of an assembly graph.
///
/// Uses `BTreeMap` so iteration follows creation order.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entities: BTreeMap<EntityId, Entity>,

    /// Unanchored entities by URI: models, references, root modules and
    /// detached instances. Anchored URIs are found by walking down from one.
    roots: BTreeMap<String, BTreeSet<EntityId>>,

    /// Reverse of `roots`.
    root_uris: BTreeMap<EntityId, String>,

    /// Last entity handed out mutably; reindexed on the next mutation.
    dirty: Option<EntityId>,

    next_id: u64,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new entity and return its fresh handle.
    pub fn instantiate(&mut self, entity: impl Into<Entity>) -> EntityId {
        self.flush_dirty();
        let id = EntityId(self.next_id);
        self.next_id = self.next_id.saturating_add(1);
        self.entities.insert(id, entity.into());
        self.reindex(id);
        id
    }

    pub fn get(&self, id: EntityId) -> Result<&Entity, PartsmithError> {
        self.entities
            .get(&id)
            .ok_or(PartsmithError::EntityNotFound(id))
    }

    pub(crate) fn get_mut(&mut self, id: EntityId) -> Result<&mut Entity, PartsmithError> {
        self.flush_dirty();
        self.dirty = Some(id);
        self.entities
            .get_mut(&id)
            .ok_or(PartsmithError::EntityNotFound(id))
    }

    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn kind(&self, id: EntityId) -> Result<EntityKind, PartsmithError> {
        Ok(self.get(id)?.kind())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// All handles in creation order.
    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.keys().copied()
    }

    /// Handles of every entity of `kind`, in creation order.
    #[must_use]
    pub fn ids_of_kind(&self, kind: EntityKind) -> Vec<EntityId> {
        self.entities
            .iter()
            .filter(|(_, e)| e.kind() == kind)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Drop every entity. Handles are not reused afterwards.
    pub fn clear(&mut self) {
        self.entities.clear();
        self.roots.clear();
        self.root_uris.clear();
        self.dirty = None;
    }

    /// Remove one entity and scrub its handle from every relation.
    ///
    /// Owned interfaces and parts are left in place; see
    /// [`Registry::remove_cascading`].
    pub fn remove(&mut self, id: EntityId) -> Result<Entity, PartsmithError> {
        self.flush_dirty();
        let entity = self
            .entities
            .remove(&id)
            .ok_or(PartsmithError::EntityNotFound(id))?;
        let mut touched = vec![id];
        for (other_id, other) in &mut self.entities {
            let mut changed = false;
            for name in other.relation_names() {
                if let Ok(relation) = other.relation_mut(*name) {
                    changed |= relation.remove(id);
                }
            }
            if changed {
                touched.push(*other_id);
            }
        }
        // Parts and ports of `id` may have become unanchored.
        for other in touched {
            self.reindex(other);
        }
        Ok(entity)
    }

    /// Remove an entity together with everything it owns: interfaces,
    /// port templates and (for models and modules) parts.
    pub fn remove_cascading(&mut self, id: EntityId) -> Result<usize, PartsmithError> {
        let mut doomed = vec![id];
        let mut cursor = 0;
        while let Some(&current) = doomed.get(cursor) {
            cursor += 1;
            let entity = self.get(current)?;
            for name in [
                RelationName::Interfaces,
                RelationName::DynamicInterfaces,
                RelationName::Parts,
            ] {
                if let Ok(relation) = entity.relation(name) {
                    for fact in relation.facts() {
                        if !doomed.contains(&fact.target) {
                            doomed.push(fact.target);
                        }
                    }
                }
            }
        }
        for current in doomed.iter().rev() {
            self.remove(*current)?;
        }
        Ok(doomed.len())
    }
}

// =============================================================================
// TYPED ACCESS
// =============================================================================

macro_rules! typed_accessors {
    ($($get:ident, $get_mut:ident => $variant:ident;)*) => {
        impl Registry {
            $(
                pub fn $get(&self, id: EntityId) -> Result<&$variant, PartsmithError> {
                    match self.get(id)? {
                        Entity::$variant(e) => Ok(e),
                        other => Err(PartsmithError::KindMismatch {
                            id,
                            expected: EntityKind::$variant,
                            actual: other.kind(),
                        }),
                    }
                }

                pub fn $get_mut(&mut self, id: EntityId) -> Result<&mut $variant, PartsmithError> {
                    match self.get_mut(id)? {
                        Entity::$variant(e) => Ok(e),
                        other => Err(PartsmithError::KindMismatch {
                            id,
                            expected: EntityKind::$variant,
                            actual: other.kind(),
                        }),
                    }
                }
            )*
        }
    };
}

typed_accessors! {
    component_model, component_model_mut => ComponentModel;
    component, component_mut => Component;
    interface_model, interface_model_mut => InterfaceModel;
    interface, interface_mut => Interface;
    dynamic_interface, dynamic_interface_mut => DynamicInterface;
    module, module_mut => Module;
    external_reference, external_reference_mut => ExternalReference;
}

// =============================================================================
// IDENTITY
// =============================================================================

impl Registry {
    pub fn name(&self, id: EntityId) -> Result<&str, PartsmithError> {
        Ok(self.get(id)?.name())
    }

    /// Stable, human-readable identity derived from the entity's position
    /// in the containment tree.
    pub fn uri(&self, id: EntityId) -> Result<String, PartsmithError> {
        self.uri_at_depth(id, 0)
    }

    fn uri_at_depth(&self, id: EntityId, depth: usize) -> Result<String, PartsmithError> {
        if depth > MAX_CONTAINMENT_DEPTH {
            return Err(PartsmithError::ContainmentCycle(format!(
                "uri of {} exceeds depth {}",
                id, MAX_CONTAINMENT_DEPTH
            )));
        }
        let detached = |kind: EntityKind| format!("{URI_SCHEME}{kind}/{id}");
        let entity = self.get(id)?;
        let uri = match entity {
            Entity::ComponentModel(m) => {
                ComponentModel::uri_for(m.props.domain, &m.props.name, &m.props.version)
            }
            Entity::InterfaceModel(m) => InterfaceModel::uri_for(m.props.domain, &m.props.name),
            Entity::ExternalReference(r) => ExternalReference::uri_for(&r.props.remote_url),
            Entity::Component(c) => match c.whole.first() {
                Some(whole) => format!(
                    "{}/parts/{}",
                    self.uri_at_depth(whole, depth + 1)?,
                    c.props.name
                ),
                None => detached(EntityKind::Component),
            },
            Entity::Module(m) => match m.whole.first() {
                Some(whole) => format!(
                    "{}/parts/{}",
                    self.uri_at_depth(whole, depth + 1)?,
                    m.props.name
                ),
                None => format!("{URI_SCHEME}module/{}", m.props.name),
            },
            Entity::Interface(i) => match i.parent.first() {
                Some(parent) => format!(
                    "{}/interfaces/{}",
                    self.uri_at_depth(parent, depth + 1)?,
                    i.props.name
                ),
                None => detached(EntityKind::Interface),
            },
            Entity::DynamicInterface(d) => match d.parent.first() {
                Some(parent) => format!(
                    "{}/dynamic_interfaces/{}:{}",
                    self.uri_at_depth(parent, depth + 1)?,
                    d.props.name,
                    d.props.direction
                ),
                None => detached(EntityKind::DynamicInterface),
            },
        };
        Ok(uri)
    }

    /// Name-based UUID of the entity's URI; equal across registries.
    pub fn uuid(&self, id: EntityId) -> Result<Uuid, PartsmithError> {
        Ok(Uuid::new_v5(&Uuid::NAMESPACE_URL, self.uri(id)?.as_bytes()))
    }

    /// Find the entity with the given URI. If several share it, the oldest
    /// one wins.
    #[must_use]
    pub fn get_by_uri(&self, uri: &str) -> Option<EntityId> {
        let mut found = Vec::new();
        for end in root_boundaries(uri) {
            let Some(prefix) = uri.get(..end) else {
                continue;
            };
            let Some(rest) = uri.get(end..) else {
                continue;
            };
            for root in self.roots_with_uri(prefix) {
                self.walk_uri(root, rest, &mut found);
            }
        }
        found
            .into_iter()
            .filter(|id| self.uri(*id).is_ok_and(|u| u == uri))
            .min()
    }

    #[must_use]
    pub fn knows_uri(&self, uri: &str) -> bool {
        self.get_by_uri(uri).is_some()
    }

    /// `true` for instances without a whole or parent. Their URI carries the
    /// registry-local handle.
    pub(crate) fn is_detached(&self, id: EntityId) -> bool {
        match self.get(id) {
            Ok(Entity::Component(c)) => c.whole.is_empty(),
            Ok(Entity::Interface(i)) => i.parent.is_empty(),
            Ok(Entity::DynamicInterface(d)) => d.parent.is_empty(),
            _ => false,
        }
    }

    fn is_anchored(entity: &Entity) -> bool {
        match entity {
            Entity::Component(c) => !c.whole.is_empty(),
            Entity::Module(m) => !m.whole.is_empty(),
            Entity::Interface(i) => !i.parent.is_empty(),
            Entity::DynamicInterface(d) => !d.parent.is_empty(),
            Entity::ComponentModel(_) | Entity::InterfaceModel(_) | Entity::ExternalReference(_) => false,
        }
    }

    /// Indexed roots with `uri`, plus the pending entity if it matches.
    fn roots_with_uri(&self, uri: &str) -> Vec<EntityId> {
        let mut roots: Vec<EntityId> = self
            .roots
            .get(uri)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default();
        if let Some(pending) = self.dirty {
            let unanchored = self.get(pending).is_ok_and(|e| !Self::is_anchored(e));
            if unanchored && !roots.contains(&pending) && self.uri(pending).is_ok_and(|u| u == uri) {
                roots.push(pending);
            }
        }
        roots
    }

    /// Follow `rest` (`/parts/a/interfaces/b`...) down from `from` by name.
    fn walk_uri(&self, from: EntityId, rest: &str, found: &mut Vec<EntityId>) {
        if rest.is_empty() {
            found.push(from);
            return;
        }
        for (marker, name) in URI_SEGMENTS {
            let Some(tail) = rest.strip_prefix(*marker) else {
                continue;
            };
            let Ok(children) = self.relation(from, *name) else {
                continue;
            };
            for fact in children.facts() {
                let segment = match self.get(fact.target) {
                    Ok(Entity::DynamicInterface(d)) => format!("{}:{}", d.props.name, d.props.direction),
                    Ok(entity) => entity.name().to_string(),
                    Err(_) => continue,
                };
                if let Some(after) = tail.strip_prefix(segment.as_str()) {
                    self.walk_uri(fact.target, after, found);
                }
            }
        }
    }

    fn flush_dirty(&mut self) {
        if let Some(id) = self.dirty.take() {
            self.reindex(id);
        }
    }

    /// Bring the root index entry of `id` up to date.
    fn reindex(&mut self, id: EntityId) {
        if let Some(old) = self.root_uris.remove(&id) {
            if let Some(ids) = self.roots.get_mut(&old) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.roots.remove(&old);
                }
            }
        }
        let unanchored = self.get(id).is_ok_and(|e| !Self::is_anchored(e));
        if !unanchored {
            return;
        }
        if let Ok(uri) = self.uri(id) {
            self.roots.entry(uri.clone()).or_default().insert(id);
            self.root_uris.insert(id, uri);
        }
    }
}

/// Path segments below a root URI.
const URI_SEGMENTS: &[(&str, RelationName)] = &[
    ("/parts/", RelationName::Parts),
    ("/interfaces/", RelationName::Interfaces),
    ("/dynamic_interfaces/", RelationName::DynamicInterfaces),
];

/// Positions where the root part of `uri` may end.
fn root_boundaries(uri: &str) -> Vec<usize> {
    let mut ends: Vec<usize> = uri
        .match_indices('/')
        .map(|(i, _)| i)
        .filter(|&i| {
            uri.get(i..)
                .is_some_and(|rest| URI_SEGMENTS.iter().any(|(marker, _)| rest.starts_with(*marker)))
        })
        .collect();
    ends.push(uri.len());
    ends
}

// =============================================================================
// PROPERTIES
// =============================================================================

impl Registry {
    pub fn properties(&self, id: EntityId) -> Result<Map<String, Value>, PartsmithError> {
        self.get(id)?.properties()
    }

    /// Overlay `patch` on the entity's properties; top-level keys replace.
    pub fn set_properties(
        &mut self,
        id: EntityId,
        patch: &Map<String, Value>,
    ) -> Result<(), PartsmithError> {
        self.get_mut(id)?.set_properties(patch)
    }

    pub fn set_property(
        &mut self,
        id: EntityId,
        key: &str,
        value: Value,
    ) -> Result<(), PartsmithError> {
        let mut patch = Map::new();
        patch.insert(key.to_string(), value);
        self.set_properties(id, &patch)
    }
}

// =============================================================================
// FACTS
// =============================================================================

/// Relation maintained on the target when `name` is set on an entity of `kind`.
pub(crate) fn inverse_of(kind: EntityKind, name: RelationName) -> Option<RelationName> {
    match name {
        RelationName::Whole => Some(RelationName::Parts),
        RelationName::Parts => Some(RelationName::Whole),
        RelationName::Abstracts => Some(RelationName::Implementations),
        RelationName::Implementations => Some(RelationName::Abstracts),
        RelationName::ConfiguredFor => Some(RelationName::Deployables),
        RelationName::Deployables => Some(RelationName::ConfiguredFor),
        RelationName::Parent if kind == EntityKind::DynamicInterface => {
            Some(RelationName::DynamicInterfaces)
        }
        RelationName::Parent => Some(RelationName::Interfaces),
        RelationName::Interfaces | RelationName::DynamicInterfaces => Some(RelationName::Parent),
        RelationName::Others => Some(RelationName::FromOthers),
        RelationName::FromOthers => Some(RelationName::Others),
        RelationName::ExternalReferences => Some(RelationName::ReferencedBy),
        RelationName::ReferencedBy => Some(RelationName::ExternalReferences),
        RelationName::Model | RelationName::Original | RelationName::InterfacesOfAbstracts => None,
    }
}

impl Registry {
    pub fn relation(&self, id: EntityId, name: RelationName) -> Result<&Relation, PartsmithError> {
        self.get(id)?.relation(name)
    }

    pub(crate) fn relation_mut(
        &mut self,
        id: EntityId,
        name: RelationName,
    ) -> Result<&mut Relation, PartsmithError> {
        self.get_mut(id)?.relation_mut(name)
    }

    /// Facts of one relation. An unpopulated relation yields no facts.
    pub fn get_facts(&self, id: EntityId, name: RelationName) -> Result<&[Fact], PartsmithError> {
        Ok(self.relation(id, name)?.facts())
    }

    /// `true` once the relation is populated or explicitly emptied.
    pub fn has_facts(&self, id: EntityId, name: RelationName) -> Result<bool, PartsmithError> {
        Ok(self.relation(id, name)?.is_known())
    }

    /// First target of a relation.
    pub(crate) fn target(
        &self,
        id: EntityId,
        name: RelationName,
    ) -> Result<Option<EntityId>, PartsmithError> {
        Ok(self.relation(id, name)?.first())
    }

    /// All targets of a relation, in insertion order.
    pub(crate) fn targets(
        &self,
        id: EntityId,
        name: RelationName,
    ) -> Result<Vec<EntityId>, PartsmithError> {
        Ok(self
            .relation(id, name)?
            .facts()
            .iter()
            .map(|f| f.target)
            .collect())
    }

    /// Add a fact. Every relation is routed through its dedicated operation
    /// so the same checks apply; connections must go through
    /// [`Registry::connected_to`].
    pub fn add_fact(
        &mut self,
        id: EntityId,
        name: RelationName,
        target: EntityId,
        props: Map<String, Value>,
    ) -> Result<(), PartsmithError> {
        let kind = self.kind(id)?;
        self.relation(id, name)?;
        self.get(target)?;
        match name {
            RelationName::Others | RelationName::FromOthers => {
                Err(PartsmithError::SetterRestricted {
                    relation: name,
                    use_instead: "connected_to",
                })
            }
            RelationName::Parts => self.part_of(target, id),
            RelationName::Whole => self.part_of(id, target),
            RelationName::Abstracts => self.implements(id, target),
            RelationName::Implementations => self.implements(target, id),
            RelationName::ConfiguredFor => self.configured_for(id, target),
            RelationName::Deployables => self.configured_for(target, id),
            RelationName::Parent if kind == EntityKind::DynamicInterface => {
                self.link(id, name, target, props)
            }
            RelationName::Parent => self.child_of(id, target),
            RelationName::Interfaces => self.child_of(target, id),
            RelationName::DynamicInterfaces => self.link(id, name, target, props),
            RelationName::Original => self.alias_of(id, target),
            RelationName::InterfacesOfAbstracts => self.realizes(id, target),
            RelationName::ExternalReferences => {
                self.annotate_with(id, target, optional_flag(&props))
            }
            RelationName::ReferencedBy => self.annotate_with(target, id, optional_flag(&props)),
            RelationName::Model => match kind {
                EntityKind::ComponentModel | EntityKind::InterfaceModel => {
                    self.subclass_of(id, target)
                }
                EntityKind::Interface | EntityKind::DynamicInterface => {
                    self.interface_instance_of(id, target)
                }
                EntityKind::Component | EntityKind::Module => self.instance_of(id, target),
                EntityKind::ExternalReference => Err(PartsmithError::UnknownRelation {
                    kind,
                    relation: name,
                }),
            },
        }
    }

    /// Remove the fact `id -name-> target` and its inverse.
    pub fn remove_fact(
        &mut self,
        id: EntityId,
        name: RelationName,
        target: EntityId,
    ) -> Result<bool, PartsmithError> {
        self.unlink(id, name, target)
    }

    /// Mark one relation as known-empty if nothing is known about it yet.
    pub fn set_unknown_fact_empty(
        &mut self,
        id: EntityId,
        name: RelationName,
    ) -> Result<(), PartsmithError> {
        self.relation_mut(id, name)?.mark_known();
        Ok(())
    }

    pub fn set_all_unknown_facts_empty(&mut self, id: EntityId) -> Result<(), PartsmithError> {
        self.get_mut(id)?.set_all_unknown_facts_empty();
        Ok(())
    }

    /// Upsert `from -name-> to` and its inverse, if any.
    ///
    /// Both relations are validated before either side is touched.
    pub(crate) fn link(
        &mut self,
        from: EntityId,
        name: RelationName,
        to: EntityId,
        props: Map<String, Value>,
    ) -> Result<(), PartsmithError> {
        let inverse = inverse_of(self.kind(from)?, name);
        self.relation(from, name)?;
        if let Some(inverse) = inverse {
            self.relation(to, inverse)?;
        } else {
            self.get(to)?;
        }
        if let Some(inverse) = inverse {
            self.relation_mut(to, inverse)?.upsert(from, props.clone());
        }
        self.relation_mut(from, name)?.upsert(to, props);
        Ok(())
    }

    /// Remove `from -name-> to` and its inverse. Returns `true` if the
    /// forward fact existed.
    pub(crate) fn unlink(
        &mut self,
        from: EntityId,
        name: RelationName,
        to: EntityId,
    ) -> Result<bool, PartsmithError> {
        let inverse = inverse_of(self.kind(from)?, name);
        let removed = self.relation_mut(from, name)?.remove(to);
        if let Some(inverse) = inverse {
            if let Ok(relation) = self.relation_mut(to, inverse) {
                relation.remove(from);
            }
        }
        Ok(removed)
    }
}

fn optional_flag(props: &Map<String, Value>) -> bool {
    props
        .get("optional")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

// =============================================================================
// TESTS
// =============================================================================
