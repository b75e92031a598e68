//! # Interfaces
//!
//! Port instances and the interface algebra: compatibility, connection,
//! aliasing and realization of abstract ports.
//!
//! ## Connection bookkeeping
//!
//! A connection is stored once as an `others` fact on the source port and
//! mirrored as a `from_others` fact on the target port, both carrying the
//! same connection properties. Only [`Registry::connected_to`] creates
//! connections; the generic fact setter refuses both relations.

use super::EntityData;
use crate::{
    Direction, Domain, Entity, EntityId, EntityKind, Multiplicity, PartsmithError, Registry,
    Relation, RelationName,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Properties of a port instance.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InterfaceProps {
    pub name: String,
    pub alias: String,
    pub direction: Direction,
    pub multiplicity: Multiplicity,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A port instance owned by a component model, component or module.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Interface {
    pub props: InterfaceProps,
    pub(crate) model: Relation,
    pub(crate) parent: Relation,
    pub(crate) others: Relation,
    pub(crate) from_others: Relation,
    pub(crate) original: Relation,
    pub(crate) interfaces_of_abstracts: Relation,
}

impl Interface {
    #[must_use]
    pub fn new(props: InterfaceProps) -> Self {
        Self {
            props,
            ..Self::default()
        }
    }
}

impl EntityData for Interface {
    type Props = InterfaceProps;
    const KIND: EntityKind = EntityKind::Interface;
    const RELATIONS: &'static [RelationName] = &[
        RelationName::Model,
        RelationName::Parent,
        RelationName::Others,
        RelationName::FromOthers,
        RelationName::Original,
        RelationName::InterfacesOfAbstracts,
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
            RelationName::Parent => Some(&self.parent),
            RelationName::Others => Some(&self.others),
            RelationName::FromOthers => Some(&self.from_others),
            RelationName::Original => Some(&self.original),
            RelationName::InterfacesOfAbstracts => Some(&self.interfaces_of_abstracts),
            _ => None,
        }
    }

    fn relation_mut(&mut self, name: RelationName) -> Option<&mut Relation> {
        match name {
            RelationName::Model => Some(&mut self.model),
            RelationName::Parent => Some(&mut self.parent),
            RelationName::Others => Some(&mut self.others),
            RelationName::FromOthers => Some(&mut self.from_others),
            RelationName::Original => Some(&mut self.original),
            RelationName::InterfacesOfAbstracts => Some(&mut self.interfaces_of_abstracts),
            _ => None,
        }
    }

    fn name(&self) -> &str {
        &self.props.name
    }
}

// =============================================================================
// TYPING AND OWNERSHIP
// =============================================================================

impl Registry {
    /// Bind a port (or port template) to its interface model.
    pub fn interface_instance_of(
        &mut self,
        interface: EntityId,
        interface_model: EntityId,
    ) -> Result<(), PartsmithError> {
        self.interface_model(interface_model)?;
        match self.kind(interface)? {
            EntityKind::Interface | EntityKind::DynamicInterface => {}
            actual => {
                return Err(PartsmithError::KindMismatch {
                    id: interface,
                    expected: EntityKind::Interface,
                    actual,
                });
            }
        }
        self.relation_mut(interface, RelationName::Model)?
            .set_single(interface_model, Map::new());
        Ok(())
    }

    /// Interface model of a port or port template.
    pub fn get_interface_type(&self, interface: EntityId) -> Result<EntityId, PartsmithError> {
        match self.get(interface)? {
            Entity::Interface(i) => i.model.first(),
            Entity::DynamicInterface(d) => d.model.first(),
            other => {
                return Err(PartsmithError::KindMismatch {
                    id: interface,
                    expected: EntityKind::Interface,
                    actual: other.kind(),
                });
            }
        }
        .ok_or_else(|| {
            PartsmithError::MissingArgument(format!("interface {} has no interface model", interface))
        })
    }

    /// Domain of a model, or of a port's interface model.
    pub fn get_domain(&self, id: EntityId) -> Result<Domain, PartsmithError> {
        match self.get(id)? {
            Entity::ComponentModel(m) => Ok(m.props.domain),
            Entity::InterfaceModel(m) => Ok(m.props.domain),
            Entity::Interface(_) | Entity::DynamicInterface(_) => {
                let model = self.get_interface_type(id)?;
                Ok(self.interface_model(model)?.props.domain)
            }
            other => Err(PartsmithError::KindMismatch {
                id,
                expected: EntityKind::ComponentModel,
                actual: other.kind(),
            }),
        }
    }

    /// Owner of a port or port template.
    pub fn get_parent(&self, interface: EntityId) -> Result<Option<EntityId>, PartsmithError> {
        Ok(self.relation(interface, RelationName::Parent)?.first())
    }

    /// Attach a port to its owner.
    ///
    /// The owner must be a component model, component or module. A port
    /// that already has an owner is rejected.
    pub fn child_of(&mut self, interface: EntityId, parent: EntityId) -> Result<(), PartsmithError> {
        let port = self.interface(interface)?;
        let parent_kind = self.kind(parent)?;
        if !matches!(
            parent_kind,
            EntityKind::ComponentModel | EntityKind::Component | EntityKind::Module
        ) {
            return Err(PartsmithError::InvalidParent(parent_kind));
        }
        if !port.parent.is_empty() {
            return Err(PartsmithError::AlreadyHasParent(self.uri(interface)?));
        }
        self.link(interface, RelationName::Parent, parent, Map::new())
    }

    /// Make `alias` re-export `original`.
    ///
    /// Repeating the same link is a no-op; pointing an alias at a second
    /// original is rejected.
    pub fn alias_of(&mut self, alias: EntityId, original: EntityId) -> Result<(), PartsmithError> {
        let current = self.interface(alias)?.original.first();
        self.interface(original)?;
        if alias == original {
            return Err(PartsmithError::SelfReference(format!(
                "interface {} cannot alias itself",
                self.uri(alias)?
            )));
        }
        match current {
            Some(existing) if existing == original => Ok(()),
            Some(_) => Err(PartsmithError::AliasConflict(self.uri(alias)?)),
            None => {
                self.relation_mut(alias, RelationName::Original)?
                    .set_single(original, Map::new());
                Ok(())
            }
        }
    }

    /// The original a port re-exports, if any.
    pub fn get_original(&self, alias: EntityId) -> Result<Option<EntityId>, PartsmithError> {
        Ok(self.interface(alias)?.original.first())
    }
}

// =============================================================================
// COMPATIBILITY AND CONNECTION
// =============================================================================

impl Registry {
    /// `true` if both ports are typed by the same interface model.
    pub fn has_same_type(&self, a: EntityId, b: EntityId) -> Result<bool, PartsmithError> {
        Ok(self.get_interface_type(a)? == self.get_interface_type(b)?)
    }

    /// Same type and a pairing direction.
    pub fn is_compatible_with(&self, a: EntityId, b: EntityId) -> Result<bool, PartsmithError> {
        if !self.has_same_type(a, b)? {
            debug!(a = %a, b = %b, "interfaces incompatible: type mismatch");
            return Ok(false);
        }
        let da = self.interface(a)?.props.direction;
        let db = self.interface(b)?.props.direction;
        if da.pairs_with(db) {
            return Ok(true);
        }
        debug!(a = %a, b = %b, from = %da, to = %db, "interfaces incompatible: direction mismatch");
        Ok(false)
    }

    /// Compatible, and neither end of multiplicity ONE is already linked.
    ///
    /// An unspecified multiplicity on either side is permissive.
    pub fn is_connectable_to(&self, a: EntityId, b: EntityId) -> Result<bool, PartsmithError> {
        if !self.is_compatible_with(a, b)? {
            return Ok(false);
        }
        let source = self.interface(a)?;
        let target = self.interface(b)?;
        if source.props.multiplicity == Multiplicity::One
            && (!source.others.is_empty() || !source.from_others.is_empty())
        {
            debug!(interface = %a, "multiplicity of source interface is violated");
            return Ok(false);
        }
        if target.props.multiplicity == Multiplicity::One
            && (!target.others.is_empty() || !target.from_others.is_empty())
        {
            debug!(interface = %b, "multiplicity of target interface is violated");
            return Ok(false);
        }
        if source.props.multiplicity == Multiplicity::NotSet
            || target.props.multiplicity == Multiplicity::NotSet
        {
            debug!(a = %a, b = %b, "multiplicity unspecified");
        }
        Ok(true)
    }

    /// `true` if `a` has an outgoing connection to `b`.
    pub fn is_connected_to(&self, a: EntityId, b: EntityId) -> Result<bool, PartsmithError> {
        self.interface(b)?;
        Ok(self.interface(a)?.others.contains(b))
    }

    /// Connect `a` to `b` with the given connection properties.
    ///
    /// Idempotent: an existing connection is left untouched. Returns
    /// `Ok(false)` when the ports are not connectable.
    pub fn connected_to(
        &mut self,
        a: EntityId,
        b: EntityId,
        props: Map<String, Value>,
    ) -> Result<bool, PartsmithError> {
        if a == b {
            return Err(PartsmithError::SelfReference(format!(
                "interface {} cannot connect to itself",
                self.uri(a)?
            )));
        }
        if self.is_connected_to(a, b)? {
            return Ok(true);
        }
        if !self.is_connectable_to(a, b)? {
            warn!(
                source = %self.interface(a)?.props.name,
                target = %self.interface(b)?.props.name,
                "interface cannot be connected"
            );
            return Ok(false);
        }
        self.link(a, RelationName::Others, b, props)?;
        Ok(true)
    }

    /// Replace the properties of an existing connection `a -> b`.
    pub fn set_connection_props(
        &mut self,
        a: EntityId,
        b: EntityId,
        props: Map<String, Value>,
    ) -> Result<(), PartsmithError> {
        if !self.is_connected_to(a, b)? {
            return Err(PartsmithError::Wiring(format!(
                "{} is not connected to {}",
                self.uri(a)?,
                self.uri(b)?
            )));
        }
        self.link(a, RelationName::Others, b, props)
    }

    /// Drop every outgoing connection of `a`, on both ends.
    pub fn disconnect(&mut self, a: EntityId) -> Result<(), PartsmithError> {
        let partners = self.targets(a, RelationName::Others)?;
        for partner in partners {
            if let Ok(relation) = self.relation_mut(partner, RelationName::FromOthers) {
                relation.remove(a);
            }
        }
        self.relation_mut(a, RelationName::Others)?.clear();
        Ok(())
    }
}

// =============================================================================
// REALIZATION
// =============================================================================

impl Registry {
    /// Same type and the exact same direction.
    pub fn can_realize(&self, concrete: EntityId, abstract_interface: EntityId) -> Result<bool, PartsmithError> {
        if !self.has_same_type(concrete, abstract_interface)? {
            return Ok(false);
        }
        Ok(self.interface(concrete)?.props.direction
            == self.interface(abstract_interface)?.props.direction)
    }

    /// Declare that `concrete` realizes `abstract_interface`.
    ///
    /// A port realizes at most one port of any given abstract model.
    pub fn realizes(&mut self, concrete: EntityId, abstract_interface: EntityId) -> Result<(), PartsmithError> {
        if concrete == abstract_interface {
            return Err(PartsmithError::SelfReference(format!(
                "interface {} cannot realize itself",
                self.uri(concrete)?
            )));
        }
        if !self.can_realize(concrete, abstract_interface)? {
            return Err(PartsmithError::NotRealizable {
                concrete: self.uri(concrete)?,
                abstract_interface: self.uri(abstract_interface)?,
            });
        }
        let owner = self.get_parent(abstract_interface)?;
        for existing in self.targets(concrete, RelationName::InterfacesOfAbstracts)? {
            if existing == abstract_interface {
                return Ok(());
            }
            if owner.is_some() && self.get_parent(existing)? == owner {
                return Err(PartsmithError::NotRealizable {
                    concrete: self.uri(concrete)?,
                    abstract_interface: self.uri(abstract_interface)?,
                });
            }
        }
        self.link(concrete, RelationName::InterfacesOfAbstracts, abstract_interface, Map::new())
    }

    /// Forget every realization declared by `concrete`.
    pub fn unrealize(&mut self, concrete: EntityId) -> Result<(), PartsmithError> {
        let relation = self.relation_mut(concrete, RelationName::InterfacesOfAbstracts)?;
        if relation.is_known() {
            relation.clear();
        }
        Ok(())
    }

    pub fn has_realization(&self, concrete: EntityId, abstract_interface: EntityId) -> Result<bool, PartsmithError> {
        Ok(self
            .interface(concrete)?
            .interfaces_of_abstracts
            .contains(abstract_interface))
    }

    /// The port template of the owning component's model that this port
    /// was materialized from (same type and direction).
    pub fn get_dynamic_interface(&self, interface: EntityId) -> Result<Option<EntityId>, PartsmithError> {
        let Some(parent) = self.get_parent(interface)? else {
            return Ok(None);
        };
        let Entity::Component(component) = self.get(parent)? else {
            return Ok(None);
        };
        let Some(model) = component.model.first() else {
            return Ok(None);
        };
        let ty = self.get_interface_type(interface)?;
        let direction = self.interface(interface)?.props.direction;
        for candidate in self.targets(model, RelationName::DynamicInterfaces)? {
            let template = self.dynamic_interface(candidate)?;
            if template.model.first() == Some(ty) && template.props.direction == direction {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ComponentModel, InterfaceModel};

    fn fixture() -> (Registry, EntityId, EntityId) {
        let mut reg = Registry::new();
        let cm = reg.instantiate(ComponentModel::new("M", Domain::Software, "v1"));
        let im = reg.instantiate(InterfaceModel::new("float", Domain::Software));
        (reg, cm, im)
    }

    fn port(reg: &mut Registry, im: EntityId, cm: EntityId, name: &str, d: Direction, m: Multiplicity) -> EntityId {
        reg.instantiate_interface(im, cm, name, d, m, true).expect("port")
    }

    #[test]
    fn connect_and_disconnect_keep_both_sides_consistent() {
        let (mut reg, cm, im) = fixture();
        let a = port(&mut reg, im, cm, "a", Direction::NotSet, Multiplicity::NotSet);
        let b = port(&mut reg, im, cm, "b", Direction::NotSet, Multiplicity::NotSet);
        let c = port(&mut reg, im, cm, "c", Direction::NotSet, Multiplicity::NotSet);

        assert!(reg.connected_to(a, b, Map::new()).expect("a-b"));
        assert!(reg.connected_to(a, c, Map::new()).expect("a-c"));
        assert_eq!(reg.get_facts(a, RelationName::Others).expect("others").len(), 2);
        assert_eq!(reg.get_facts(b, RelationName::FromOthers).expect("from").len(), 1);
        assert_eq!(reg.get_facts(c, RelationName::FromOthers).expect("from").len(), 1);

        reg.disconnect(a).expect("disconnect");
        assert!(reg.get_facts(a, RelationName::Others).expect("others").is_empty());
        assert!(reg.get_facts(b, RelationName::FromOthers).expect("from").is_empty());
        assert!(reg.get_facts(c, RelationName::FromOthers).expect("from").is_empty());
    }

    #[test]
    fn direction_mismatch_is_not_an_error() {
        let (mut reg, cm, im) = fixture();
        let a = port(&mut reg, im, cm, "a", Direction::Incoming, Multiplicity::Many);
        let b = port(&mut reg, im, cm, "b", Direction::Incoming, Multiplicity::Many);
        assert!(!reg.connected_to(a, b, Map::new()).expect("call succeeds"));
        assert!(reg.get_facts(a, RelationName::Others).expect("others").is_empty());
    }

    #[test]
    fn multiplicity_one_rejects_second_link() {
        let (mut reg, cm, im) = fixture();
        let out = port(&mut reg, im, cm, "out", Direction::Outgoing, Multiplicity::Many);
        let in1 = port(&mut reg, im, cm, "in1", Direction::Incoming, Multiplicity::One);
        let out2 = port(&mut reg, im, cm, "out2", Direction::Outgoing, Multiplicity::Many);

        assert!(reg.connected_to(out, in1, Map::new()).expect("first"));
        assert!(!reg.is_connectable_to(out2, in1).expect("check"));
        // already connected pair stays idempotent even though in1 is now full
        assert!(reg.connected_to(out, in1, Map::new()).expect("again"));
        assert_eq!(reg.get_facts(out, RelationName::Others).expect("others").len(), 1);
    }

    #[test]
    fn connection_props_are_mirrored() {
        let (mut reg, cm, im) = fixture();
        let a = port(&mut reg, im, cm, "a", Direction::Outgoing, Multiplicity::Many);
        let b = port(&mut reg, im, cm, "b", Direction::Incoming, Multiplicity::Many);
        let mut props = Map::new();
        props.insert("name".into(), Value::from("test"));
        reg.connected_to(a, b, props.clone()).expect("connect");

        let back = reg.get_facts(b, RelationName::FromOthers).expect("from");
        assert_eq!(back[0].props, props);
    }

    #[test]
    fn second_parent_is_rejected() {
        let (mut reg, cm, im) = fixture();
        let other = reg.instantiate(ComponentModel::new("N", Domain::Software, "v1"));
        let a = port(&mut reg, im, cm, "a", Direction::NotSet, Multiplicity::NotSet);
        let err = reg.child_of(a, other).expect_err("second parent");
        assert!(matches!(err, PartsmithError::AlreadyHasParent(_)));
    }

    #[test]
    fn child_of_rejects_interface_model_parent() {
        let (mut reg, _cm, im) = fixture();
        let loose = reg.instantiate(crate::Interface::default());
        let err = reg.child_of(loose, im).expect_err("invalid parent");
        assert!(matches!(err, PartsmithError::InvalidParent(EntityKind::InterfaceModel)));
    }

    #[test]
    fn alias_of_is_zero_or_one() {
        let (mut reg, cm, im) = fixture();
        let a = port(&mut reg, im, cm, "a", Direction::NotSet, Multiplicity::NotSet);
        let b = port(&mut reg, im, cm, "b", Direction::NotSet, Multiplicity::NotSet);
        let c = port(&mut reg, im, cm, "c", Direction::NotSet, Multiplicity::NotSet);

        reg.alias_of(a, b).expect("alias");
        reg.alias_of(a, b).expect("repeat is a no-op");
        assert!(matches!(reg.alias_of(a, c), Err(PartsmithError::AliasConflict(_))));
        assert!(matches!(reg.alias_of(c, c), Err(PartsmithError::SelfReference(_))));
        assert_eq!(reg.get_original(a).expect("original"), Some(b));
    }

    #[test]
    fn realize_requires_type_and_direction() {
        let (mut reg, cm, im) = fixture();
        let air = reg.instantiate(InterfaceModel::new("Air", Domain::Assembly));
        let abs = reg.instantiate(ComponentModel::new("A", Domain::Software, "v1"));
        let v_wing = port(&mut reg, air, abs, "wing", Direction::Incoming, Multiplicity::NotSet);
        let c_steer = port(&mut reg, im, cm, "steer", Direction::NotSet, Multiplicity::NotSet);
        let c_wing = port(&mut reg, air, cm, "wing", Direction::Outgoing, Multiplicity::NotSet);

        assert!(reg.realizes(c_steer, v_wing).is_err());
        assert!(reg.realizes(c_wing, v_wing).is_err());

        reg.interface_mut(c_wing).expect("port").props.direction = Direction::Incoming;
        reg.realizes(c_wing, v_wing).expect("realize");
        assert!(reg.has_realization(c_wing, v_wing).expect("has"));

        reg.unrealize(c_wing).expect("unrealize");
        assert!(!reg.has_realization(c_wing, v_wing).expect("has"));
    }

    #[test]
    fn generic_setter_refuses_connections() {
        let (mut reg, cm, im) = fixture();
        let a = port(&mut reg, im, cm, "a", Direction::NotSet, Multiplicity::NotSet);
        let b = port(&mut reg, im, cm, "b", Direction::NotSet, Multiplicity::NotSet);
        let err = reg
            .add_fact(a, RelationName::Others, b, Map::new())
            .expect_err("restricted");
        assert!(matches!(err, PartsmithError::SetterRestricted { .. }));
    }
}
