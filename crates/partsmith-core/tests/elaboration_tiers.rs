//! # Elaboration Tier Tests (T0-T4)
//!
//! Each tier builds on the guarantees of the tier below it.
//!
//! ## Tiers
//! - T0: Fact Store
//! - T1: Interface Algebra
//! - T2: Abstract / Implementation Resolution
//! - T3: Elaboration
//! - T4: Basic-Model Round Trip

use partsmith_core::{
    ComponentModel, Direction, Domain, EntityId, ImplementationSelector, InterfaceModel,
    Multiplicity, PartsmithError, Registry, RelationName,
};
use serde_json::{Map, Value, json};

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// `PID` with ports `P, I, D, reference, current, out`.
fn pid(reg: &mut Registry) -> EntityId {
    let float = reg.instantiate(InterfaceModel::new("float", Domain::Software));
    let model = reg.instantiate(ComponentModel::new("PID", Domain::Software, "v1"));
    for name in ["P", "I", "D", "reference", "current"] {
        reg.instantiate_interface(float, model, name, Direction::Incoming, Multiplicity::Many, true)
            .expect("input port");
    }
    reg.instantiate_interface(float, model, "out", Direction::Outgoing, Multiplicity::Many, true)
        .expect("output port");
    model
}

/// `CascadedController` with parts `Velocity` and `Position`, wired
/// `Position.out -> Velocity.reference`.
fn cascaded_controller(reg: &mut Registry, pid: EntityId) -> EntityId {
    let cascade = reg.instantiate(ComponentModel::new("CascadedController", Domain::Software, "v1"));
    let velocity = reg
        .instantiate_component(pid, cascade, "Velocity", true)
        .expect("velocity");
    let position = reg
        .instantiate_component(pid, cascade, "Position", true)
        .expect("position");
    let out = reg.get_interface(position, "out").expect("lookup").expect("out");
    let reference = reg
        .get_interface(velocity, "reference")
        .expect("lookup")
        .expect("reference");
    assert!(reg.connected_to(out, reference, object(json!({"name": "test"}))).expect("connect"));
    cascade
}

/// Number of connections between the parts of `model`.
fn connection_count(reg: &Registry, model: EntityId) -> usize {
    let mut count = 0;
    for part in reg.get_facts(model, RelationName::Parts).expect("parts") {
        for port in reg.get_facts(part.target, RelationName::Interfaces).expect("ports") {
            count += reg.get_facts(port.target, RelationName::Others).expect("others").len();
        }
    }
    count
}

/// Abstract `Vehicle` (wheel, brake, horn) implemented by `Opel` (3 ports)
/// and `VW` (4 ports). Returns `(vehicle, opel, vw)`.
fn vehicles(reg: &mut Registry) -> (EntityId, EntityId, EntityId) {
    let vehicle = reg.instantiate(ComponentModel::new("Vehicle", Domain::Assembly, "v1").as_abstract());
    let mut types = Vec::new();
    for name in ["wheel", "brake", "horn"] {
        let ty = reg.instantiate(InterfaceModel::new(name, Domain::Assembly));
        reg.instantiate_interface(ty, vehicle, "", Direction::Bidirectional, Multiplicity::Many, true)
            .expect("abstract port");
        types.push(ty);
    }

    let implement = |reg: &mut Registry, name: &str, radio: bool| {
        let model = reg.instantiate(ComponentModel::new(name, Domain::Assembly, "v1"));
        for ty in &types {
            let port = reg
                .instantiate_interface(*ty, model, "", Direction::Bidirectional, Multiplicity::Many, true)
                .expect("port");
            let abstract_port = reg
                .get_interfaces(vehicle, Some(*ty), None)
                .expect("lookup")
                .into_iter()
                .next()
                .expect("abstract port");
            reg.realizes(port, abstract_port).expect("realizes");
        }
        if radio {
            let audio = reg.instantiate(InterfaceModel::new("audio", Domain::Assembly));
            reg.instantiate_interface(audio, model, "radio", Direction::Outgoing, Multiplicity::Many, true)
                .expect("radio");
        }
        reg.implements(model, vehicle).expect("implements");
        model
    };
    let opel = implement(reg, "Opel", false);
    let vw = implement(reg, "VW", true);
    (vehicle, opel, vw)
}

// =============================================================================
// TIER T0: FACT STORE
// =============================================================================

mod t0_fact_store {
    use super::*;

    /// T0.1: A fresh entity knows nothing about its relations until told.
    #[test]
    fn unknown_and_empty_are_distinct() {
        let mut reg = Registry::new();
        let model = reg.instantiate(ComponentModel::new("Motor", Domain::Assembly, "v1"));

        assert!(!reg.has_facts(model, RelationName::Parts).expect("parts"));
        assert!(reg.get_facts(model, RelationName::Parts).expect("parts").is_empty());

        reg.set_unknown_fact_empty(model, RelationName::Parts).expect("empty");
        assert!(reg.has_facts(model, RelationName::Parts).expect("parts"));
        assert!(!reg.has_facts(model, RelationName::Interfaces).expect("interfaces"));

        reg.set_all_unknown_facts_empty(model).expect("all empty");
        assert!(reg.has_facts(model, RelationName::Interfaces).expect("interfaces"));
    }

    /// T0.2: Adding a fact maintains its inverse; removing drops both.
    #[test]
    fn facts_keep_their_inverse() {
        let mut reg = Registry::new();
        let motor = reg.instantiate(ComponentModel::new("Motor", Domain::Assembly, "v1"));
        let car = reg.instantiate(ComponentModel::new("Car", Domain::Assembly, "v1"));
        let part = reg.instantiate_component(motor, car, "engine", true).expect("part");

        let whole = reg.get_facts(part, RelationName::Whole).expect("whole");
        assert_eq!(whole.len(), 1);
        assert_eq!(whole[0].target, car);

        assert!(reg.remove_fact(car, RelationName::Parts, part).expect("remove"));
        assert!(reg.get_facts(part, RelationName::Whole).expect("whole").is_empty());
        assert!(!reg.remove_fact(car, RelationName::Parts, part).expect("second remove"));
    }

    /// T0.3: Connections cannot be set through the generic fact setter.
    #[test]
    fn connections_are_setter_restricted() {
        let mut reg = Registry::new();
        let model = pid(&mut reg);
        let p = reg.get_interface(model, "P").expect("lookup").expect("P");
        let out = reg.get_interface(model, "out").expect("lookup").expect("out");

        let result = reg.add_fact(out, RelationName::Others, p, Map::new());
        assert!(matches!(result, Err(PartsmithError::SetterRestricted { .. })));
    }

    /// T0.4: A removed entity resolves to a lookup failure everywhere.
    #[test]
    fn removed_handles_do_not_dangle() {
        let mut reg = Registry::new();
        let model = pid(&mut reg);
        let out = reg.get_interface(model, "out").expect("lookup").expect("out");

        reg.remove(out).expect("remove");
        assert!(matches!(reg.get(out), Err(PartsmithError::EntityNotFound(_))));
        assert_eq!(reg.get_interfaces(model, None, None).expect("ports").len(), 5);
    }

    /// T0.5: URIs and UUIDs identify the same model across registries.
    #[test]
    fn identity_is_registry_independent() {
        let mut a = Registry::new();
        let mut b = Registry::new();
        let in_a = pid(&mut a);
        let in_b = pid(&mut b);

        assert_eq!(a.uri(in_a).expect("uri"), "drock://component_model/SOFTWARE/PID/v1");
        assert_eq!(a.uuid(in_a).expect("uuid"), b.uuid(in_b).expect("uuid"));
        assert_eq!(b.get_by_uri(&a.uri(in_a).expect("uri")), Some(in_b));
    }
}

// =============================================================================
// TIER T1: INTERFACE ALGEBRA
// =============================================================================

mod t1_interface_algebra {
    use super::*;

    /// T1.1: The PID example has six ports and one connection.
    #[test]
    fn cascaded_controller_has_one_connection() {
        let mut reg = Registry::new();
        let model = pid(&mut reg);
        let cascade = cascaded_controller(&mut reg, model);

        assert_eq!(reg.get_interfaces(model, None, None).expect("ports").len(), 6);
        assert_eq!(connection_count(&reg, cascade), 1);
    }

    /// T1.2: Connecting twice does not duplicate the connection.
    #[test]
    fn connecting_is_idempotent() {
        let mut reg = Registry::new();
        let model = pid(&mut reg);
        let cascade = cascaded_controller(&mut reg, model);
        let position = reg.get_part(cascade, "Position").expect("lookup").expect("part");
        let velocity = reg.get_part(cascade, "Velocity").expect("lookup").expect("part");
        let out = reg.get_interface(position, "out").expect("lookup").expect("out");
        let reference = reg.get_interface(velocity, "reference").expect("lookup").expect("ref");

        assert!(reg.connected_to(out, reference, Map::new()).expect("again"));
        assert_eq!(connection_count(&reg, cascade), 1);
        // The original connection properties survive.
        let facts = reg.get_facts(out, RelationName::Others).expect("others");
        assert_eq!(facts[0].props.get("name"), Some(&json!("test")));
        let props = reg.properties(velocity).expect("props");
        assert_eq!(props.get("loop"), Some(&json!("inner")));
        assert_eq!(props.get("name"), Some(&json!("Velocity")));
    }

    /// T1.3: Mismatched directions and types are not connectable.
    #[test]
    fn incompatible_ports_are_rejected() {
        let mut reg = Registry::new();
        let model = pid(&mut reg);
        let cascade = cascaded_controller(&mut reg, model);
        let position = reg.get_part(cascade, "Position").expect("lookup").expect("part");
        let velocity = reg.get_part(cascade, "Velocity").expect("lookup").expect("part");
        let p = reg.get_interface(position, "P").expect("lookup").expect("P");
        let i = reg.get_interface(velocity, "I").expect("lookup").expect("I");

        assert!(!reg.is_compatible_with(p, i).expect("check"));
        assert!(!reg.connected_to(p, i, Map::new()).expect("connect"));

        let int = reg.instantiate(InterfaceModel::new("int", Domain::Software));
        let other = reg
            .instantiate_interface(int, model, "count", Direction::Outgoing, Multiplicity::Many, true)
            .expect("port");
        assert!(!reg.is_compatible_with(other, i).expect("check"));
    }

    /// T1.4: A port of multiplicity ONE takes a single connection.
    #[test]
    fn multiplicity_one_is_exclusive() {
        let mut reg = Registry::new();
        let float = reg.instantiate(InterfaceModel::new("float", Domain::Software));
        let owner = reg.instantiate(ComponentModel::new("Board", Domain::Software, "v1"));
        let single = reg
            .instantiate_interface(float, owner, "single", Direction::Incoming, Multiplicity::One, true)
            .expect("single");
        let a = reg
            .instantiate_interface(float, owner, "a", Direction::Outgoing, Multiplicity::Many, true)
            .expect("a");
        let b = reg
            .instantiate_interface(float, owner, "b", Direction::Outgoing, Multiplicity::Many, true)
            .expect("b");

        assert!(reg.connected_to(a, single, Map::new()).expect("first"));
        assert!(!reg.is_connectable_to(b, single).expect("check"));
        assert!(!reg.connected_to(b, single, Map::new()).expect("second"));
    }

    /// T1.5: Unspecified multiplicity is permissive.
    #[test]
    fn unspecified_multiplicity_connects() {
        let mut reg = Registry::new();
        let float = reg.instantiate(InterfaceModel::new("float", Domain::Software));
        let owner = reg.instantiate(ComponentModel::new("Board", Domain::Software, "v1"));
        let sink = reg
            .instantiate_interface(float, owner, "sink", Direction::Incoming, Multiplicity::NotSet, true)
            .expect("sink");
        for name in ["a", "b", "c"] {
            let source = reg
                .instantiate_interface(float, owner, name, Direction::Outgoing, Multiplicity::NotSet, true)
                .expect("source");
            assert!(reg.connected_to(source, sink, Map::new()).expect("connect"));
        }
        assert_eq!(reg.get_facts(sink, RelationName::FromOthers).expect("from").len(), 3);
    }

    /// T1.6: Disconnecting clears both ends.
    #[test]
    fn disconnect_clears_both_ends() {
        let mut reg = Registry::new();
        let float = reg.instantiate(InterfaceModel::new("float", Domain::Software));
        let owner = reg.instantiate(ComponentModel::new("Bus", Domain::Software, "v1"));
        let hub = reg
            .instantiate_interface(float, owner, "hub", Direction::Bidirectional, Multiplicity::Many, true)
            .expect("hub");
        let mut partners = Vec::new();
        for name in ["n1", "n2", "n3"] {
            let partner = reg
                .instantiate_interface(float, owner, name, Direction::Bidirectional, Multiplicity::Many, true)
                .expect("partner");
            assert!(reg.connected_to(hub, partner, Map::new()).expect("connect"));
            partners.push(partner);
        }

        reg.disconnect(hub).expect("disconnect");
        assert!(reg.get_facts(hub, RelationName::Others).expect("others").is_empty());
        for partner in partners {
            assert!(reg.get_facts(partner, RelationName::FromOthers).expect("from").is_empty());
        }
    }

    /// T1.7: A port cannot connect to itself.
    #[test]
    fn self_connection_is_an_error() {
        let mut reg = Registry::new();
        let model = pid(&mut reg);
        let out = reg.get_interface(model, "out").expect("lookup").expect("out");
        assert!(matches!(
            reg.connected_to(out, out, Map::new()),
            Err(PartsmithError::SelfReference(_))
        ));
    }
}

// =============================================================================
// TIER T2: ABSTRACT / IMPLEMENTATION RESOLUTION
// =============================================================================

mod t2_abstract_implementation {
    use super::*;

    /// T2.1: Declared implementations are recorded in both directions.
    #[test]
    fn implementations_are_recorded() {
        let mut reg = Registry::new();
        let (vehicle, opel, vw) = vehicles(&mut reg);

        assert_eq!(reg.get_implementations(vehicle).expect("impls"), vec![opel, vw]);
        assert_eq!(reg.get_abstracts(opel).expect("abstracts"), vec![vehicle]);
        assert!(reg.is_implementing(vw, vehicle).expect("check"));
    }

    /// T2.2: Structural matching needs every abstract port covered.
    #[test]
    fn can_implement_requires_a_full_matching() {
        let mut reg = Registry::new();
        let (vehicle, opel, _) = vehicles(&mut reg);
        assert!(reg.can_implement(opel, vehicle).expect("check"));

        let bike = reg.instantiate(ComponentModel::new("Bike", Domain::Assembly, "v1"));
        let wheel = reg
            .get_interfaces(vehicle, None, Some("wheel"))
            .expect("lookup")
            .into_iter()
            .next()
            .expect("wheel");
        let wheel_type = reg.get_interface_type(wheel).expect("type");
        reg.instantiate_interface(wheel_type, bike, "", Direction::Bidirectional, Multiplicity::Many, true)
            .expect("port");
        assert!(!reg.can_implement(bike, vehicle).expect("check"));
    }

    /// T2.3: A structural match is not a declared implementation.
    #[test]
    fn valid_implementation_needs_realizations() {
        let mut reg = Registry::new();
        let (vehicle, _, _) = vehicles(&mut reg);
        let clone = reg.instantiate(ComponentModel::new("Clone", Domain::Assembly, "v1"));
        for name in ["wheel", "brake", "horn"] {
            let abstract_port = reg.get_interface(vehicle, name).expect("lookup").expect("port");
            let ty = reg.get_interface_type(abstract_port).expect("type");
            reg.instantiate_interface(ty, clone, "", Direction::Bidirectional, Multiplicity::Many, true)
                .expect("port");
        }

        assert!(reg.can_implement(clone, vehicle).expect("structural"));
        assert!(!reg.is_valid_implementation(clone, vehicle).expect("declared"));
        assert!(matches!(
            reg.implements(clone, vehicle),
            Err(PartsmithError::InvalidImplementation { .. })
        ));
    }

    /// T2.4: Implementing the same abstract twice is rejected.
    #[test]
    fn duplicate_implementation_is_rejected() {
        let mut reg = Registry::new();
        let (vehicle, opel, _) = vehicles(&mut reg);
        assert!(matches!(
            reg.implements(opel, vehicle),
            Err(PartsmithError::DuplicateImplementation { .. })
        ));
    }

    /// T2.5: Abstractness propagates up through containment.
    #[test]
    fn abstract_is_contagious() {
        let mut reg = Registry::new();
        let (vehicle, _, _) = vehicles(&mut reg);
        let garage = reg.instantiate(ComponentModel::new("Garage", Domain::Assembly, "v1"));
        assert!(!reg.is_abstract(garage).expect("check"));

        reg.instantiate_component(vehicle, garage, "car", true).expect("car");
        assert!(reg.is_abstract(garage).expect("check"));
    }
}

// =============================================================================
// TIER T3: ELABORATION
// =============================================================================

mod t3_elaboration {
    use super::*;

    /// T3.1: An atomic model builds a leaf with the same ports and the
    /// model's properties.
    #[test]
    fn atomic_model_builds_a_leaf() {
        let mut reg = Registry::new();
        let model = pid(&mut reg);
        reg.component_model_mut(model).expect("model").props.maturity = "stable".to_string();
        let root = reg.build(model, "pid", None).expect("build");

        assert!(reg.get_facts(root, RelationName::Parts).expect("parts").is_empty());
        assert_eq!(reg.get_interfaces(root, None, None).expect("ports").len(), 6);
        assert_eq!(reg.get_type(root).expect("type"), model);

        let props = reg.properties(root).expect("props");
        assert_eq!(props.get("name"), Some(&json!("pid")));
        assert_eq!(props.get("version"), Some(&json!("v1")));
        assert_eq!(props.get("maturity"), Some(&json!("stable")));
    }

    /// T3.2: A composite model builds one submodule per part, wired.
    #[test]
    fn composite_model_is_wired() {
        let mut reg = Registry::new();
        let model = pid(&mut reg);
        let cascade = cascaded_controller(&mut reg, model);
        let velocity_part = reg.get_part(cascade, "Velocity").expect("lookup").expect("part");
        reg.set_property(velocity_part, "loop", json!("inner")).expect("tag");
        let root = reg.build(cascade, "controller", None).expect("build");

        let parts = reg.get_facts(root, RelationName::Parts).expect("parts");
        assert_eq!(parts.len(), 2);
        assert_eq!(connection_count(&reg, root), 1);

        let position = reg.get_part(root, "Position").expect("lookup").expect("position");
        let velocity = reg.get_part(root, "Velocity").expect("lookup").expect("velocity");
        let out = reg.get_interface(position, "out").expect("lookup").expect("out");
        let reference = reg.get_interface(velocity, "reference").expect("lookup").expect("ref");
        assert!(reg.is_connected_to(out, reference).expect("check"));
        let facts = reg.get_facts(out, RelationName::Others).expect("others");
        assert_eq!(facts[0].props.get("name"), Some(&json!("test")));
    }

    /// T3.3: Containment depth is mirrored in the module tree.
    #[test]
    fn three_level_chain_keeps_its_depth() {
        let mut reg = Registry::new();
        let leaf = reg.instantiate(ComponentModel::new("Leaf", Domain::Assembly, "v1"));
        let middle = reg.instantiate(ComponentModel::new("Middle", Domain::Assembly, "v1"));
        let root_model = reg.instantiate(ComponentModel::new("Root", Domain::Assembly, "v1"));
        reg.instantiate_component(leaf, middle, "b", true).expect("b");
        reg.instantiate_component(middle, root_model, "a", true).expect("a");

        let root = reg.build(root_model, "root", None).expect("build");
        let view = reg.module_view(root).expect("view");
        assert_eq!(view.parts.len(), 1);
        assert_eq!(view.parts[0].parts.len(), 1);
        assert!(view.parts[0].parts[0].parts.is_empty());
        assert_eq!(view.parts[0].parts[0].uri, "drock://module/root/parts/a/parts/b");
        assert_eq!(reg.module_tree(root).expect("tree").len(), 3);
    }

    /// T3.4: An abstract model with several implementations needs a selector.
    #[test]
    fn abstract_build_requires_a_selection() {
        let mut reg = Registry::new();
        let (vehicle, opel, _) = vehicles(&mut reg);
        assert!(matches!(
            reg.build(vehicle, "car", None),
            Err(PartsmithError::ImplementationSelection(_))
        ));

        let mut first = |_: &Registry, _: EntityId, candidates: &[EntityId]| candidates.first().copied();
        let selector: &mut dyn ImplementationSelector = &mut first;
        let root = reg.build(vehicle, "car", Some(selector)).expect("build");
        assert_eq!(reg.get_type(root).expect("type"), opel);
        assert_eq!(
            reg.get_interfaces(root, None, None).expect("ports").len(),
            reg.get_interfaces(opel, None, None).expect("ports").len()
        );
    }

    /// T3.5: A selector outside the candidate list aborts the build.
    #[test]
    fn foreign_selection_is_rejected() {
        let mut reg = Registry::new();
        let (vehicle, _, _) = vehicles(&mut reg);
        let mut pick_abstract = |_: &Registry, abstract_model: EntityId, _: &[EntityId]| Some(abstract_model);
        let selector: &mut dyn ImplementationSelector = &mut pick_abstract;
        assert!(matches!(
            reg.build(vehicle, "car", Some(selector)),
            Err(PartsmithError::ImplementationSelection(_))
        ));
    }

    /// T3.6: Abstract parts resolve per build; aliases follow realizations.
    #[test]
    fn garage_resolves_abstract_parts_round_robin() {
        let mut reg = Registry::new();
        let (vehicle, opel, vw) = vehicles(&mut reg);
        let garage = reg.instantiate(ComponentModel::new("Garage", Domain::Assembly, "v1"));
        let car = reg.instantiate_component(vehicle, garage, "car", true).expect("car");
        let horn = reg.get_interface(car, "horn").expect("lookup").expect("horn");
        reg.export_inner_interface(garage, horn, true).expect("export");

        let mut calls = 0_usize;
        let mut round_robin = |_: &Registry, _: EntityId, candidates: &[EntityId]| {
            let chosen = candidates.get(calls % candidates.len()).copied();
            calls += 1;
            chosen
        };
        let selector: &mut dyn ImplementationSelector = &mut round_robin;
        let first = reg.build(garage, "garage1", Some(selector)).expect("first build");
        let selector: &mut dyn ImplementationSelector = &mut round_robin;
        let second = reg.build(garage, "garage2", Some(selector)).expect("second build");

        let car1 = reg.get_part(first, "car").expect("lookup").expect("car");
        let car2 = reg.get_part(second, "car").expect("lookup").expect("car");
        assert_eq!(reg.get_type(car1).expect("type"), opel);
        assert_eq!(reg.get_type(car2).expect("type"), vw);

        let alias = reg.get_interface(first, "car:horn").expect("lookup").expect("alias");
        let original = reg.get_original(alias).expect("original").expect("linked");
        assert_eq!(reg.get_parent(original).expect("parent"), Some(car1));
        assert_eq!(reg.name(original).expect("name"), "horn");
    }

    /// T3.7: Globals render into the configuration of the whole tree.
    #[test]
    fn global_variables_render_the_tree() {
        let mut reg = Registry::new();
        let model = pid(&mut reg);
        reg.component_model_mut(model).expect("model").props.default_configuration =
            object(json!({"limit": "{{ AN_UNKNOWN_VARIABLE }}", "kp": 1}));
        let cascade = cascaded_controller(&mut reg, model);
        reg.component_model_mut(cascade).expect("model").props.data =
            object(json!({"globalVariables": {"AN_UNKNOWN_VARIABLE": 35}}));

        let root = reg.build(cascade, "controller", None).expect("build");
        reg.apply_global_variables(root, &Map::new()).expect("render");
        for name in ["Position", "Velocity"] {
            let part = reg.get_part(root, name).expect("lookup").expect("part");
            assert_eq!(
                Value::Object(reg.module(part).expect("module").props.configuration.clone()),
                json!({"limit": "35", "kp": 1})
            );
        }
    }

    /// T3.8: A missing variable leaves every configuration untouched.
    #[test]
    fn unresolved_variable_renders_nothing() {
        let mut reg = Registry::new();
        let model = pid(&mut reg);
        reg.component_model_mut(model).expect("model").props.default_configuration =
            object(json!({"limit": "{{ MISSING }}"}));
        let cascade = cascaded_controller(&mut reg, model);
        let root = reg.build(cascade, "controller", None).expect("build");

        let globals = object(json!({"OTHER": 1}));
        assert!(matches!(
            reg.apply_global_variables(root, &globals),
            Err(PartsmithError::UnresolvedVariable(_))
        ));
        let part = reg.get_part(root, "Position").expect("lookup").expect("part");
        assert_eq!(
            reg.module(part).expect("module").props.configuration.get("limit"),
            Some(&json!("{{ MISSING }}"))
        );
    }

    /// T3.9: A composite with an abstract part can be used several times.
    #[test]
    fn abstract_part_in_a_reused_composite() {
        let mut reg = Registry::new();
        let signal = reg.instantiate(InterfaceModel::new("signal", Domain::Electronics));
        let sensor = reg.instantiate(ComponentModel::new("Sensor", Domain::Electronics, "v1").as_abstract());
        let a = reg
            .instantiate_interface(signal, sensor, "a", Direction::Outgoing, Multiplicity::Many, true)
            .expect("a");
        let thermistor = reg.instantiate(ComponentModel::new("Thermistor", Domain::Electronics, "v1"));
        let tip = reg
            .instantiate_interface(signal, thermistor, "tip", Direction::Outgoing, Multiplicity::Many, true)
            .expect("tip");
        reg.realizes(tip, a).expect("realizes");
        reg.implements(thermistor, sensor).expect("implements");
        let adc = reg.instantiate(ComponentModel::new("Adc", Domain::Electronics, "v1"));
        reg.instantiate_interface(signal, adc, "in", Direction::Incoming, Multiplicity::One, true)
            .expect("in");

        let board = reg.instantiate(ComponentModel::new("Board", Domain::Electronics, "v1"));
        let s = reg.instantiate_component(sensor, board, "s", true).expect("s");
        let converter = reg.instantiate_component(adc, board, "adc", true).expect("adc");
        let s_a = reg.get_interface(s, "a").expect("lookup").expect("s.a");
        let adc_in = reg.get_interface(converter, "in").expect("lookup").expect("adc.in");
        assert!(reg.connected_to(s_a, adc_in, Map::new()).expect("connect"));
        let rig = reg.instantiate(ComponentModel::new("Rig", Domain::Electronics, "v1"));
        reg.instantiate_component(board, rig, "left", true).expect("left");
        reg.instantiate_component(board, rig, "right", true).expect("right");

        let root = reg.build(rig, "rig", None).expect("build");
        for side in ["left", "right"] {
            let board_module = reg.get_part(root, side).expect("lookup").expect("board");
            let sensor_module = reg.get_part(board_module, "s").expect("lookup").expect("sensor");
            let adc_module = reg.get_part(board_module, "adc").expect("lookup").expect("adc");
            assert_eq!(reg.get_type(sensor_module).expect("type"), thermistor);
            let module_tip = reg.get_interface(sensor_module, "tip").expect("lookup").expect("tip");
            let module_in = reg.get_interface(adc_module, "in").expect("lookup").expect("in");
            assert!(reg.is_connected_to(module_tip, module_in).expect("check"));
        }
    }

    /// T3.10: Connections of an abstract part land on the realizing port.
    #[test]
    fn abstract_part_connection_is_wired_to_the_implementation() {
        let mut reg = Registry::new();
        let sound = reg.instantiate(InterfaceModel::new("sound", Domain::Assembly));
        let siren = reg.instantiate(ComponentModel::new("Siren", Domain::Assembly, "v1").as_abstract());
        let horn = reg
            .instantiate_interface(sound, siren, "horn", Direction::Outgoing, Multiplicity::Many, true)
            .expect("horn");
        let buzzer = reg.instantiate(ComponentModel::new("Buzzer", Domain::Assembly, "v1"));
        let troete = reg
            .instantiate_interface(sound, buzzer, "troete", Direction::Outgoing, Multiplicity::Many, true)
            .expect("troete");
        reg.realizes(troete, horn).expect("realizes");
        reg.implements(buzzer, siren).expect("implements");
        let speaker = reg.instantiate(ComponentModel::new("Speaker", Domain::Assembly, "v1"));
        reg.instantiate_interface(sound, speaker, "in", Direction::Incoming, Multiplicity::Many, true)
            .expect("in");

        let garage = reg.instantiate(ComponentModel::new("Garage", Domain::Assembly, "v1"));
        let alarm = reg.instantiate_component(siren, garage, "alarm", true).expect("alarm");
        let spk = reg.instantiate_component(speaker, garage, "spk", true).expect("spk");
        let alarm_horn = reg.get_interface(alarm, "horn").expect("lookup").expect("horn");
        let spk_in = reg.get_interface(spk, "in").expect("lookup").expect("in");
        assert!(reg.connected_to(alarm_horn, spk_in, object(json!({"cable": "red"}))).expect("connect"));

        let root = reg.build(garage, "garage", None).expect("build");
        let alarm_module = reg.get_part(root, "alarm").expect("lookup").expect("alarm");
        let spk_module = reg.get_part(root, "spk").expect("lookup").expect("spk");
        assert!(reg.get_interface(alarm_module, "horn").expect("lookup").is_none());
        let module_troete = reg.get_interface(alarm_module, "troete").expect("lookup").expect("troete");
        let module_in = reg.get_interface(spk_module, "in").expect("lookup").expect("in");

        let facts = reg.get_facts(module_troete, RelationName::Others).expect("others");
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].target, module_in);
        assert_eq!(facts[0].props.get("cable"), Some(&json!("red")));
    }

    /// T3.11: An alias whose original has no module twin is skipped.
    #[test]
    fn unresolved_alias_does_not_fail_the_build() {
        let mut reg = Registry::new();
        let audio = reg.instantiate(InterfaceModel::new("audio", Domain::Electronics));
        let amp = reg.instantiate(ComponentModel::new("Amp", Domain::Electronics, "v1"));
        reg.instantiate_interface(audio, amp, "in", Direction::Incoming, Multiplicity::Many, true)
            .expect("in");
        reg.instantiate_interface(audio, amp, "out", Direction::Outgoing, Multiplicity::Many, true)
            .expect("out");
        let rack = reg.instantiate(ComponentModel::new("Rack", Domain::Electronics, "v1"));
        let part = reg.instantiate_component(amp, rack, "amp", true).expect("amp");
        let out = reg.get_interface(part, "out").expect("lookup").expect("out");
        reg.export_inner_interface(rack, out, true).expect("export");
        let input = reg.get_interface(part, "in").expect("lookup").expect("in");
        reg.export_inner_interface(rack, input, true).expect("export");

        // The part keeps `out`; the model no longer has it.
        assert_eq!(reg.remove_interface(amp, "out").expect("remove"), 1);
        let root = reg.build(rack, "rack", None).expect("build");

        let missing = reg.get_interface(root, "amp:out").expect("lookup").expect("alias");
        assert_eq!(reg.get_original(missing).expect("original"), None);
        let linked = reg.get_interface(root, "amp:in").expect("lookup").expect("alias");
        let original = reg.get_original(linked).expect("original").expect("linked");
        let amp_module = reg.get_part(root, "amp").expect("lookup").expect("amp");
        assert_eq!(reg.get_parent(original).expect("parent"), Some(amp_module));
    }
}

// =============================================================================
// TIER T4: BASIC-MODEL ROUND TRIP
// =============================================================================

mod t4_basic_model_round_trip {
    use super::*;
    use partsmith_core::{ModelStore, export_basic_model, import_basic_model};
    use tempfile::tempdir;

    /// T4.1: Export then import keeps identity and structure.
    #[test]
    fn cascaded_controller_round_trips() {
        let mut source = Registry::new();
        let model = pid(&mut source);
        let cascade = cascaded_controller(&mut source, model);
        let document = export_basic_model(&source, cascade)
            .expect("export")
            .to_json()
            .expect("json");

        let mut reg = Registry::new();
        let imported = import_basic_model(&mut reg, &document, Some(&source)).expect("import");
        assert_eq!(imported.len(), 1);
        let copy = imported[0];

        assert_eq!(reg.uuid(copy).expect("uuid"), source.uuid(cascade).expect("uuid"));
        assert_eq!(
            reg.get_facts(copy, RelationName::Parts).expect("parts").len(),
            source.get_facts(cascade, RelationName::Parts).expect("parts").len()
        );
        assert_eq!(
            reg.get_interfaces(copy, None, None).expect("ports").len(),
            source.get_interfaces(cascade, None, None).expect("ports").len()
        );
        assert_eq!(connection_count(&reg, copy), 1);
    }

    /// T4.2: Importing an already known version returns the existing model.
    #[test]
    fn reimport_is_a_no_op() {
        let mut reg = Registry::new();
        let model = pid(&mut reg);
        let cascade = cascaded_controller(&mut reg, model);
        let document = export_basic_model(&reg, cascade)
            .expect("export")
            .to_json()
            .expect("json");
        let before = reg.len();

        let imported = import_basic_model(&mut reg, &document, None).expect("import");
        assert_eq!(imported, vec![cascade]);
        assert_eq!(reg.len(), before);
    }

    /// T4.3: A stored model loads with its parts into an empty registry.
    #[test]
    fn stored_models_load_on_demand() {
        let temp = tempdir().expect("temp dir");
        let mut store = ModelStore::open(temp.path().join("models.db")).expect("open");
        let mut source = Registry::new();
        let model = pid(&mut source);
        let cascade = cascaded_controller(&mut source, model);
        store.put(&source, model).expect("put pid");
        let uri = store.put(&source, cascade).expect("put cascade");

        let mut reg = Registry::new();
        let loaded = reg
            .load_by_uri(&uri, Some(&store))
            .expect("load")
            .expect("found");
        assert_eq!(reg.uuid(loaded).expect("uuid"), source.uuid(cascade).expect("uuid"));
        let root = reg.build(loaded, "controller", None).expect("build");
        assert_eq!(connection_count(&reg, root), 1);
    }
}
