//! # Elaboration
//!
//! Turns a component model into a concrete, fully wired module tree.
//!
//! ## Passes
//!
//! 1. Expansion: a FIFO work queue of `(part, parent module)` pairs creates
//!    one submodule per part, in declared part order. Abstract part models
//!    are resolved to an implementation first.
//! 2. Alias resolution: every alias port of a containing model is re-created
//!    between the module twins. Misses are logged and skipped.
//! 3. Wiring: every part connection is replayed between the module twins
//!    with its original connection properties. Misses are fatal.
//!
//! Ports of an abstract part are matched to the ports of the chosen
//! implementation through the declared realizations, which must map
//! injectively.

use crate::primitives::MAX_CONTAINMENT_DEPTH;
use crate::{EntityId, PartsmithError, Registry, RelationName};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, warn};

// =============================================================================
// IMPLEMENTATION SELECTION
// =============================================================================

/// Chooses one implementation of an abstract model during elaboration.
///
/// Returning `None`, or a model that is not among the candidates, aborts
/// the build.
pub trait ImplementationSelector {
    fn select(
        &mut self,
        registry: &Registry,
        abstract_model: EntityId,
        candidates: &[EntityId],
    ) -> Option<EntityId>;
}

impl<F> ImplementationSelector for F
where
    F: FnMut(&Registry, EntityId, &[EntityId]) -> Option<EntityId>,
{
    fn select(
        &mut self,
        registry: &Registry,
        abstract_model: EntityId,
        candidates: &[EntityId],
    ) -> Option<EntityId> {
        self(registry, abstract_model, candidates)
    }
}

/// Port twins of abstract parts: submodule port -> abstract part port.
type Realizations = BTreeMap<EntityId, EntityId>;

// =============================================================================
// BUILD
// =============================================================================

impl Registry {
    /// Elaborate `model` into a module tree rooted at a module named `name`.
    pub fn build(
        &mut self,
        model: EntityId,
        name: &str,
        mut selector: Option<&mut dyn ImplementationSelector>,
    ) -> Result<EntityId, PartsmithError> {
        let model = self.resolve_concrete(model, selector.as_deref_mut())?;

        let root_config = self.component_model(model)?.props.default_configuration.clone();
        let root_props = self.inherited_properties(model)?;
        let root = self.new_module(name, "", root_config, root_props);
        self.instance_of(root, model)?;
        for port in self.targets(model, RelationName::Interfaces)? {
            self.clone_interface(port, root, true)?;
        }
        let parts = self.targets(model, RelationName::Parts)?;
        if parts.is_empty() {
            return Ok(root);
        }

        // Expansion
        let mut submodules: Vec<(EntityId, EntityId)> = Vec::new();
        let mut realizations = Realizations::new();
        let mut queue: VecDeque<(EntityId, EntityId, usize)> =
            parts.into_iter().map(|part| (part, root, 1)).collect();
        while let Some((part, parent_module, depth)) = queue.pop_front() {
            if depth > MAX_CONTAINMENT_DEPTH {
                return Err(PartsmithError::ContainmentCycle(format!(
                    "elaboration of {} exceeds depth {}",
                    self.uri(model)?,
                    MAX_CONTAINMENT_DEPTH
                )));
            }
            let part_model = self.get_type(part)?;
            let submodule_model = self.resolve_concrete(part_model, selector.as_deref_mut())?;

            let component = self.component(part)?;
            let (part_name, part_alias) = (component.props.name.clone(), component.props.alias.clone());
            let mut configuration = self
                .component_model(submodule_model)?
                .props
                .default_configuration
                .clone();
            crate::document::merge_documents(&mut configuration, &component.props.configuration);

            let part_props = self.inherited_properties(part)?;
            let submodule = self.new_module(&part_name, &part_alias, configuration, part_props);
            self.instance_of(submodule, submodule_model)?;
            self.part_of(submodule, parent_module)?;
            submodules.push((submodule, part));
            for port in self.targets(submodule_model, RelationName::Interfaces)? {
                self.clone_interface(port, submodule, true)?;
            }

            if self.component_model(part_model)?.props.is_abstract {
                self.map_realizations(part, part_model, submodule, submodule_model, &mut realizations)?;
            }

            if !self.is_atomic(submodule_model, false)? {
                for inner in self.targets(submodule_model, RelationName::Parts)? {
                    queue.push_back((inner, submodule, depth + 1));
                }
            }
        }

        self.resolve_aliases(&submodules, &realizations)?;
        self.wire(&submodules, &realizations)?;
        debug!(model = %self.uri(model)?, modules = submodules.len() + 1, "build finished");
        Ok(root)
    }

    /// Properties of `source` a module shell starts from; the shell's own
    /// name, alias and configuration are set separately.
    fn inherited_properties(&self, source: EntityId) -> Result<Map<String, Value>, PartsmithError> {
        let mut props = self.properties(source)?;
        for key in ["name", "alias", "configuration"] {
            props.remove(key);
        }
        Ok(props)
    }

    /// Follow abstract models to a concrete implementation.
    fn resolve_concrete(
        &self,
        model: EntityId,
        mut selector: Option<&mut (dyn ImplementationSelector + '_)>,
    ) -> Result<EntityId, PartsmithError> {
        let mut current = model;
        let mut hops = 0_usize;
        while self.component_model(current)?.props.is_abstract {
            hops += 1;
            if hops > MAX_CONTAINMENT_DEPTH {
                return Err(PartsmithError::ImplementationSelection(format!(
                    "{} does not resolve to a concrete model",
                    self.uri(model)?
                )));
            }
            current = self.select_implementation(current, selector.as_deref_mut())?;
        }
        Ok(current)
    }

    fn select_implementation(
        &self,
        abstract_model: EntityId,
        selector: Option<&mut (dyn ImplementationSelector + '_)>,
    ) -> Result<EntityId, PartsmithError> {
        let candidates = self.get_implementations(abstract_model)?;
        match (candidates.as_slice(), selector) {
            ([], _) => Err(PartsmithError::ImplementationSelection(format!(
                "{} is abstract and has no implementations",
                self.uri(abstract_model)?
            ))),
            ([only], _) => Ok(*only),
            (_, None) => Err(PartsmithError::ImplementationSelection(format!(
                "{} is abstract and has multiple implementations but no selector was given",
                self.uri(abstract_model)?
            ))),
            (_, Some(selector)) => match selector.select(self, abstract_model, &candidates) {
                Some(chosen) if candidates.contains(&chosen) => Ok(chosen),
                Some(chosen) => Err(PartsmithError::ImplementationSelection(format!(
                    "{} is not an implementation of {}",
                    chosen,
                    self.uri(abstract_model)?
                ))),
                None => Err(PartsmithError::ImplementationSelection(format!(
                    "no implementation selected for {}",
                    self.uri(abstract_model)?
                ))),
            },
        }
    }

    /// Record which submodule port stands in for which abstract part port.
    ///
    /// Injective per submodule. A model used as a part several times maps
    /// every submodule to the same part ports.
    fn map_realizations(
        &self,
        part: EntityId,
        part_model: EntityId,
        submodule: EntityId,
        submodule_model: EntityId,
        realizations: &mut Realizations,
    ) -> Result<(), PartsmithError> {
        let mut local = Realizations::new();
        for implementation_port in self.targets(submodule_model, RelationName::Interfaces)? {
            let Some(module_port) = self.get_interface(submodule, self.name(implementation_port)?)? else {
                continue;
            };
            for abstract_port in self.targets(implementation_port, RelationName::InterfacesOfAbstracts)? {
                if self.get_parent(abstract_port)? != Some(part_model) {
                    continue;
                }
                let Some(part_port) = self.get_interface(part, self.name(abstract_port)?)? else {
                    warn!(
                        port = %self.uri(abstract_port)?,
                        part = %self.uri(part)?,
                        "abstract interface missing on part"
                    );
                    continue;
                };
                if local.contains_key(&module_port) || local.values().any(|claimed| *claimed == part_port) {
                    return Err(PartsmithError::NonInjectiveRealization(format!(
                        "{} is claimed twice at {}",
                        self.uri(part_port)?,
                        self.uri(submodule)?
                    )));
                }
                local.insert(module_port, part_port);
            }
        }
        realizations.extend(local);
        Ok(())
    }

    /// Module port standing in for `part_port` on `submodule`.
    fn module_twin(
        &self,
        submodule: EntityId,
        part_port: EntityId,
        part_is_abstract: bool,
        realizations: &Realizations,
    ) -> Result<Option<EntityId>, PartsmithError> {
        if !part_is_abstract {
            return self.get_interface(submodule, self.name(part_port)?);
        }
        Ok(self
            .targets(submodule, RelationName::Interfaces)?
            .into_iter()
            .find(|candidate| realizations.get(candidate) == Some(&part_port)))
    }

    fn part_is_abstract(&self, part: EntityId) -> Result<bool, PartsmithError> {
        Ok(self.component_model(self.get_type(part)?)?.props.is_abstract)
    }

    fn resolve_aliases(
        &mut self,
        submodules: &[(EntityId, EntityId)],
        realizations: &Realizations,
    ) -> Result<(), PartsmithError> {
        for &(submodule, part) in submodules {
            let Some(whole) = self.target(part, RelationName::Whole)? else {
                continue;
            };
            let Some(parent_module) = self.target(submodule, RelationName::Whole)? else {
                continue;
            };
            let part_is_abstract = self.part_is_abstract(part)?;
            for alias in self.targets(whole, RelationName::Interfaces)? {
                let Some(original) = self.get_original(alias)? else {
                    continue;
                };
                if self.get_parent(original)? != Some(part) {
                    continue;
                }
                let Some(alias_twin) = self.get_interface(parent_module, self.name(alias)?)? else {
                    warn!(
                        interface = %self.uri(alias)?,
                        module = %self.uri(parent_module)?,
                        "could not resolve alias interface at parent module"
                    );
                    continue;
                };
                let Some(original_twin) = self.module_twin(submodule, original, part_is_abstract, realizations)? else {
                    warn!(
                        interface = %self.uri(original)?,
                        module = %self.uri(submodule)?,
                        "could not resolve original interface at submodule"
                    );
                    continue;
                };
                self.alias_of(alias_twin, original_twin)?;
            }
        }
        Ok(())
    }

    fn wire(
        &mut self,
        submodules: &[(EntityId, EntityId)],
        realizations: &Realizations,
    ) -> Result<(), PartsmithError> {
        for &(submodule, part) in submodules {
            let whole_module = self.target(submodule, RelationName::Whole)?;
            let part_is_abstract = self.part_is_abstract(part)?;
            for part_port in self.targets(part, RelationName::Interfaces)? {
                let connections = self.get_facts(part_port, RelationName::Others)?.to_vec();
                if connections.is_empty() {
                    continue;
                }
                let module_port = self
                    .module_twin(submodule, part_port, part_is_abstract, realizations)?
                    .ok_or_else(|| self.wiring_error(part_port, submodule))?;
                for connection in connections {
                    let other_part = self.get_parent(connection.target)?.ok_or_else(|| {
                        PartsmithError::Wiring(format!("interface {} has no parent", connection.target))
                    })?;
                    let other_submodule = submodules
                        .iter()
                        .find(|(candidate, candidate_part)| {
                            *candidate_part == other_part
                                && self.target(*candidate, RelationName::Whole).ok().flatten() == whole_module
                        })
                        .map(|(candidate, _)| *candidate)
                        .ok_or_else(|| match self.uri(other_part) {
                            Ok(uri) => PartsmithError::Wiring(format!("could not find submodule for {}", uri)),
                            Err(e) => e,
                        })?;
                    let other_port = self
                        .module_twin(
                            other_submodule,
                            connection.target,
                            self.part_is_abstract(other_part)?,
                            realizations,
                        )?
                        .ok_or_else(|| self.wiring_error(connection.target, other_submodule))?;
                    if !self.connected_to(module_port, other_port, connection.props)? {
                        warn!(
                            from = %self.uri(module_port)?,
                            to = %self.uri(other_port)?,
                            "module interfaces could not be connected"
                        );
                    }
                }
            }
        }
        Ok(())
    }

    fn wiring_error(&self, part_port: EntityId, module: EntityId) -> PartsmithError {
        match (self.uri(part_port), self.uri(module)) {
            (Ok(port), Ok(module)) => PartsmithError::Wiring(format!(
                "could not map part interface {} to an interface of {}",
                port, module
            )),
            (Err(e), _) | (_, Err(e)) => e,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ComponentModel, Direction, Domain, InterfaceModel, Multiplicity};
    use serde_json::{Map, Value, json};

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn atomic_model_builds_a_leaf() {
        let mut reg = Registry::new();
        let float = reg.instantiate(InterfaceModel::new("float", Domain::Software));
        let pid = reg.instantiate(
            ComponentModel::new("PID", Domain::Software, "v1")
                .with_default_configuration(object(json!({"kp": 1}))),
        );
        reg.instantiate_interface(float, pid, "y", Direction::Outgoing, Multiplicity::Many, true)
            .expect("port");

        let root = reg.build(pid, "pid", None).expect("build");
        let module = reg.module(root).expect("module");
        assert_eq!(module.props.configuration, object(json!({"kp": 1})));
        assert!(reg.is_atomic(root, false).expect("atomic"));
        assert!(reg.get_interface(root, "y").expect("lookup").is_some());
        assert!(reg.has_facts(root, RelationName::Parts).expect("known"));
    }

    #[test]
    fn part_configuration_overrides_model_default() {
        let mut reg = Registry::new();
        let inner = reg.instantiate(
            ComponentModel::new("Inner", Domain::Software, "v1")
                .with_default_configuration(object(json!({"a": 1, "nested": {"x": 1, "y": 1}}))),
        );
        let outer = reg.instantiate(ComponentModel::new("Outer", Domain::Software, "v1"));
        let part = reg.instantiate_component(inner, outer, "inner", true).expect("part");
        reg.component_mut(part).expect("part").props.configuration =
            object(json!({"nested": {"y": 2}}));

        let root = reg.build(outer, "outer", None).expect("build");
        let sub = reg.get_part(root, "inner").expect("lookup").expect("submodule");
        assert_eq!(
            Value::Object(reg.module(sub).expect("sub").props.configuration.clone()),
            json!({"a": 1, "nested": {"x": 1, "y": 2}})
        );
        assert_eq!(reg.get_type(sub).expect("type"), inner);
    }

    #[test]
    fn abstract_root_without_implementation_fails() {
        let mut reg = Registry::new();
        let vehicle = reg.instantiate(ComponentModel::new("Vehicle", Domain::Assembly, "v1").as_abstract());
        let err = reg.build(vehicle, "v", None).expect_err("unresolvable");
        assert!(matches!(err, PartsmithError::ImplementationSelection(_)));
    }

    #[test]
    fn shared_realization_is_not_injective() {
        let mut reg = Registry::new();
        let signal = reg.instantiate(InterfaceModel::new("signal", Domain::Electronics));
        let sensor = reg.instantiate(ComponentModel::new("Sensor", Domain::Electronics, "v1").as_abstract());
        let a = reg
            .instantiate_interface(signal, sensor, "a", Direction::Outgoing, Multiplicity::Many, true)
            .expect("a");
        reg.instantiate_interface(signal, sensor, "b", Direction::Outgoing, Multiplicity::Many, true)
            .expect("b");
        let thermistor = reg.instantiate(ComponentModel::new("Thermistor", Domain::Electronics, "v1"));
        for name in ["x", "y"] {
            let port = reg
                .instantiate_interface(signal, thermistor, name, Direction::Outgoing, Multiplicity::Many, true)
                .expect("port");
            reg.realizes(port, a).expect("realizes");
        }
        reg.implements(thermistor, sensor).expect("implements");
        let rig = reg.instantiate(ComponentModel::new("Rig", Domain::Electronics, "v1"));
        reg.instantiate_component(sensor, rig, "sensor", true).expect("part");

        let err = reg.build(rig, "rig", None).expect_err("two ports realize a");
        assert!(matches!(err, PartsmithError::NonInjectiveRealization(_)));
    }

    #[test]
    fn unmappable_connection_is_fatal() {
        let mut reg = Registry::new();
        let audio = reg.instantiate(InterfaceModel::new("audio", Domain::Electronics));
        let amp = reg.instantiate(ComponentModel::new("Amp", Domain::Electronics, "v1"));
        reg.instantiate_interface(audio, amp, "in", Direction::Incoming, Multiplicity::Many, true)
            .expect("in");
        reg.instantiate_interface(audio, amp, "out", Direction::Outgoing, Multiplicity::Many, true)
            .expect("out");
        let chain = reg.instantiate(ComponentModel::new("Chain", Domain::Electronics, "v1"));
        let first = reg.instantiate_component(amp, chain, "first", true).expect("first");
        let second = reg.instantiate_component(amp, chain, "second", true).expect("second");
        let out = reg.get_interface(first, "out").expect("lookup").expect("out");
        let input = reg.get_interface(second, "in").expect("lookup").expect("in");
        assert!(reg.connected_to(out, input, Map::new()).expect("connect"));

        // The part keeps its port after the model drops it.
        assert_eq!(reg.remove_interface(amp, "out").expect("remove"), 1);
        let err = reg.build(chain, "chain", None).expect_err("out has no module twin");
        assert!(matches!(err, PartsmithError::Wiring(_)));
    }
}
