//! # Model Sources
//!
//! Cross-registry loading. A [`ModelSource`] can materialize an entity,
//! identified by URI, into another registry. Another [`Registry`] is a
//! source; so is a persistent
//! [`ModelStore`](crate::storage::ModelStore).

use crate::{EntityId, PartsmithError, Registry, RelationName};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Relations followed when an entity is committed into another registry.
///
/// `referenced_by` and `deployables` point back at unrelated users and are
/// not followed.
const COMMITTED_RELATIONS: &[RelationName] = &[
    RelationName::Model,
    RelationName::Whole,
    RelationName::Parts,
    RelationName::Abstracts,
    RelationName::Implementations,
    RelationName::ConfiguredFor,
    RelationName::Interfaces,
    RelationName::Parent,
    RelationName::DynamicInterfaces,
    RelationName::Others,
    RelationName::FromOthers,
    RelationName::Original,
    RelationName::InterfacesOfAbstracts,
    RelationName::ExternalReferences,
];

/// Something that can materialize a URI into a registry.
pub trait ModelSource {
    /// Load the entity with `uri` (and what it owns) into `into`.
    ///
    /// Returns `Ok(None)` if the source does not know the URI.
    fn fetch(&self, uri: &str, into: &mut Registry) -> Result<Option<EntityId>, PartsmithError>;
}

impl ModelSource for Registry {
    fn fetch(&self, uri: &str, into: &mut Registry) -> Result<Option<EntityId>, PartsmithError> {
        match self.get_by_uri(uri) {
            Some(id) => into.commit(self, id).map(Some),
            None => Ok(None),
        }
    }
}

impl Registry {
    /// Look `uri` up locally, then in `source`.
    pub fn load_by_uri(
        &mut self,
        uri: &str,
        source: Option<&dyn ModelSource>,
    ) -> Result<Option<EntityId>, PartsmithError> {
        if let Some(id) = self.get_by_uri(uri) {
            return Ok(Some(id));
        }
        match source {
            Some(source) => source.fetch(uri, self),
            None => Ok(None),
        }
    }

    /// Copy `root` of `source` and everything it transitively refers to into
    /// this registry.
    ///
    /// Entities whose URI is already known here are reused, not copied.
    /// Detached instances are always copied: their URI names a handle of
    /// `source`. Returns the local handle of `root`.
    pub fn commit(&mut self, source: &Registry, root: EntityId) -> Result<EntityId, PartsmithError> {
        let closure = closure_of(source, root)?;

        // Resolve identities before anything is inserted.
        let mut mapping = BTreeMap::new();
        let mut existing = BTreeSet::new();
        for &id in &closure {
            if let Some(local) = self.known_twin(source, id)? {
                mapping.insert(id, local);
                existing.insert(id);
            }
        }
        for &id in &closure {
            if !mapping.contains_key(&id) {
                let copy = self.instantiate(source.get(id)?.detached_copy());
                mapping.insert(id, copy);
            }
        }

        for &id in &closure {
            if existing.contains(&id) {
                continue;
            }
            let local = mapping.get(&id).copied().ok_or(PartsmithError::EntityNotFound(id))?;
            let entity = source.get(id)?;
            for name in entity.relation_names() {
                for fact in entity.relation(*name)?.facts() {
                    let target = match mapping.get(&fact.target) {
                        Some(target) => *target,
                        None => match self.known_twin(source, fact.target)? {
                            Some(target) => target,
                            None => continue,
                        },
                    };
                    self.relation_mut(local, *name)?.upsert(target, fact.props.clone());
                    let target_is_new = mapping.get(&fact.target).is_some_and(|_| !existing.contains(&fact.target));
                    if target_is_new {
                        continue;
                    }
                    let inverse = crate::registry::inverse_of(entity.kind(), *name);
                    if let Some(inverse) = inverse {
                        if matches!(inverse, RelationName::Whole | RelationName::Parent) {
                            continue;
                        }
                        if let Ok(relation) = self.relation_mut(target, inverse) {
                            relation.upsert(local, fact.props.clone());
                        }
                    }
                }
            }
        }
        debug!(root = %source.uri(root)?, entities = closure.len(), reused = existing.len(), "committed");
        mapping.get(&root).copied().ok_or(PartsmithError::EntityNotFound(root))
    }

    /// Local entity with the same URI as `id` of `source`.
    fn known_twin(&self, source: &Registry, id: EntityId) -> Result<Option<EntityId>, PartsmithError> {
        if source.is_detached(id) {
            return Ok(None);
        }
        Ok(self.get_by_uri(&source.uri(id)?).filter(|local| !self.is_detached(*local)))
    }
}

/// `root` and everything reachable over [`COMMITTED_RELATIONS`], breadth first.
fn closure_of(source: &Registry, root: EntityId) -> Result<Vec<EntityId>, PartsmithError> {
    let mut order = vec![root];
    let mut seen = BTreeSet::from([root]);
    let mut cursor = 0;
    while let Some(&current) = order.get(cursor) {
        cursor += 1;
        let entity = source.get(current)?;
        for name in COMMITTED_RELATIONS {
            let Ok(relation) = entity.relation(*name) else {
                continue;
            };
            for fact in relation.facts() {
                if seen.insert(fact.target) {
                    order.push(fact.target);
                }
            }
        }
    }
    Ok(order)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ComponentModel, Direction, Domain, InterfaceModel, Multiplicity};
    use serde_json::Map;

    fn source_registry() -> (Registry, EntityId) {
        let mut reg = Registry::new();
        let float = reg.instantiate(InterfaceModel::new("float", Domain::Software));
        let pid = reg.instantiate(ComponentModel::new("PID", Domain::Software, "v1"));
        for (name, direction) in [("x", Direction::Incoming), ("y", Direction::Outgoing)] {
            reg.instantiate_interface(float, pid, name, direction, Multiplicity::Many, true)
                .expect("port");
        }
        let outer = reg.instantiate(ComponentModel::new("Loop", Domain::Software, "v1"));
        let a = reg.instantiate_component(pid, outer, "a", true).expect("a");
        let b = reg.instantiate_component(pid, outer, "b", true).expect("b");
        let ay = reg.get_interface(a, "y").expect("lookup").expect("a.y");
        let bx = reg.get_interface(b, "x").expect("lookup").expect("b.x");
        reg.connected_to(ay, bx, Map::new()).expect("connect");
        (reg, outer)
    }

    #[test]
    fn commit_copies_the_owned_graph() {
        let (source, outer) = source_registry();
        let mut target = Registry::new();
        let copied = target.commit(&source, outer).expect("commit");

        assert_eq!(target.uuid(copied).expect("uuid"), source.uuid(outer).expect("uuid"));
        assert_eq!(target.len(), source.len());
        let a = target.get_part(copied, "a").expect("lookup").expect("a");
        let ay = target.get_interface(a, "y").expect("lookup").expect("a.y");
        assert_eq!(target.get_facts(ay, RelationName::Others).expect("others").len(), 1);
    }

    #[test]
    fn commit_reuses_known_entities() {
        let (source, outer) = source_registry();
        let mut target = Registry::new();
        let float = target.instantiate(InterfaceModel::new("float", Domain::Software));
        let copied = target.commit(&source, outer).expect("commit");

        assert_eq!(target.len(), source.len());
        let pid = target
            .get_by_uri("drock://component_model/SOFTWARE/PID/v1")
            .expect("pid copied");
        let x = target.get_interface(pid, "x").expect("lookup").expect("x");
        assert_eq!(target.get_interface_type(x).expect("type"), float);
        assert!(target.contains(copied));
    }

    #[test]
    fn load_by_uri_prefers_local_entities() {
        let (source, outer) = source_registry();
        let uri = source.uri(outer).expect("uri");
        let mut target = Registry::new();
        assert_eq!(target.load_by_uri(&uri, None).expect("load"), None);

        let first = target.load_by_uri(&uri, Some(&source)).expect("load").expect("found");
        let size = target.len();
        let second = target.load_by_uri(&uri, Some(&source)).expect("load").expect("found");
        assert_eq!(first, second);
        assert_eq!(target.len(), size);
    }

    #[test]
    fn commit_copies_detached_ports() {
        let mut source = Registry::new();
        let float = source.instantiate(InterfaceModel::new("float", Domain::Software));
        let loose = source.instantiate(crate::Interface::new(crate::InterfaceProps {
            name: "loose".to_string(),
            ..crate::InterfaceProps::default()
        }));
        source.interface_instance_of(loose, float).expect("type");

        let mut target = Registry::new();
        target.instantiate(InterfaceModel::new("float", Domain::Software));
        let unrelated = target.instantiate(crate::Interface::new(crate::InterfaceProps {
            name: "other".to_string(),
            ..crate::InterfaceProps::default()
        }));
        assert_eq!(target.uri(unrelated).expect("uri"), source.uri(loose).expect("uri"));

        let copied = target.commit(&source, loose).expect("commit");
        assert_ne!(copied, unrelated);
        assert_eq!(target.len(), 3);
        assert_eq!(target.name(copied).expect("name"), "loose");
        assert_eq!(target.name(unrelated).expect("name"), "other");
    }
}
