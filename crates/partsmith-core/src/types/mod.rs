//! # Core Type Definitions
//!
//! This module contains the vocabulary shared by every part of the engine:
//! - Arena handles (`EntityId`) and the closed set of entity kinds (`EntityKind`)
//! - Port semantics (`Direction`, `Multiplicity`)
//! - Engineering domains (`Domain`)
//! - Relation names of the fixed domain schema (`RelationName`)
//! - Error types (`PartsmithError`)
//!
//! ## Determinism Guarantees
//!
//! All identifier types implement `Ord` so they can key `BTreeMap`/`BTreeSet`
//! and iterate in a stable order.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// ENTITY IDENTIFIERS
// =============================================================================

/// Handle of an entity inside a [`crate::Registry`] arena.
///
/// Handles are assigned at creation and never reused by the same registry.
/// A handle whose entity has been removed resolves to
/// [`PartsmithError::EntityNotFound`], never to another entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The closed set of entity kinds held by a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    ComponentModel,
    Component,
    InterfaceModel,
    Interface,
    DynamicInterface,
    Module,
    ExternalReference,
}

impl EntityKind {
    /// Lower-case name used in URIs and messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ComponentModel => "component_model",
            Self::Component => "component",
            Self::InterfaceModel => "interface_model",
            Self::Interface => "interface",
            Self::DynamicInterface => "dynamic_interface",
            Self::Module => "module",
            Self::ExternalReference => "external_reference",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// PORT SEMANTICS
// =============================================================================

/// Data flow direction of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub enum Direction {
    #[serde(rename = "INCOMING")]
    Incoming,
    #[serde(rename = "OUTGOING")]
    Outgoing,
    #[serde(rename = "BIDIRECTIONAL")]
    Bidirectional,
    #[default]
    #[serde(rename = "DIRECTION_NOT_SET", alias = "NOT_SET")]
    NotSet,
}

impl Direction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Incoming => "INCOMING",
            Self::Outgoing => "OUTGOING",
            Self::Bidirectional => "BIDIRECTIONAL",
            Self::NotSet => "DIRECTION_NOT_SET",
        }
    }

    /// `true` if two ports with these directions may be wired together.
    ///
    /// INCOMING pairs with OUTGOING (either order), BIDIRECTIONAL with
    /// BIDIRECTIONAL and NOT_SET with NOT_SET. Everything else is a mismatch.
    #[must_use]
    pub const fn pairs_with(self, other: Self) -> bool {
        matches!(
            (self, other),
            (Self::Incoming, Self::Outgoing)
                | (Self::Outgoing, Self::Incoming)
                | (Self::Bidirectional, Self::Bidirectional)
                | (Self::NotSet, Self::NotSet)
        )
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How many connections a port accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub enum Multiplicity {
    #[serde(rename = "ONE")]
    One,
    #[serde(rename = "N")]
    Many,
    #[default]
    #[serde(rename = "MULTIPLICITY_NOT_SET", alias = "NOT_SET")]
    NotSet,
}

impl Multiplicity {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::One => "ONE",
            Self::Many => "N",
            Self::NotSet => "MULTIPLICITY_NOT_SET",
        }
    }
}

impl fmt::Display for Multiplicity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// DOMAINS
// =============================================================================

/// Engineering domain of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Domain {
    #[default]
    Software,
    Mechanics,
    Electronics,
    Computation,
    Assembly,
}

impl Domain {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Software => "SOFTWARE",
            Self::Mechanics => "MECHANICS",
            Self::Electronics => "ELECTRONICS",
            Self::Computation => "COMPUTATION",
            Self::Assembly => "ASSEMBLY",
        }
    }

    /// Parse the exchange-format spelling of a domain.
    pub fn parse(s: &str) -> Result<Self, PartsmithError> {
        match s {
            "SOFTWARE" => Ok(Self::Software),
            "MECHANICS" => Ok(Self::Mechanics),
            "ELECTRONICS" => Ok(Self::Electronics),
            "COMPUTATION" => Ok(Self::Computation),
            "ASSEMBLY" => Ok(Self::Assembly),
            other => Err(PartsmithError::BasicModel(format!("unknown domain '{}'", other))),
        }
    }

    /// Key under which the exchange format carries this domain's payload.
    #[must_use]
    pub const fn data_key(self) -> &'static str {
        match self {
            Self::Software => "softwareData",
            Self::Mechanics => "mechanicsData",
            Self::Electronics => "electronicsData",
            Self::Computation => "computationData",
            Self::Assembly => "assemblyData",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// RELATION NAMES
// =============================================================================

/// Names of the relations of the fixed domain schema.
///
/// Which relations exist on which entity kind is decided by the entity
/// definitions in [`crate::model`]; asking an entity for a relation it does
/// not carry yields [`PartsmithError::UnknownRelation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationName {
    Model,
    Whole,
    Parts,
    Abstracts,
    Implementations,
    ConfiguredFor,
    Deployables,
    Interfaces,
    Parent,
    DynamicInterfaces,
    Others,
    FromOthers,
    Original,
    InterfacesOfAbstracts,
    ExternalReferences,
    ReferencedBy,
}

impl RelationName {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::Whole => "whole",
            Self::Parts => "parts",
            Self::Abstracts => "abstracts",
            Self::Implementations => "implementations",
            Self::ConfiguredFor => "configured_for",
            Self::Deployables => "deployables",
            Self::Interfaces => "interfaces",
            Self::Parent => "parent",
            Self::DynamicInterfaces => "dynamic_interfaces",
            Self::Others => "others",
            Self::FromOthers => "from_others",
            Self::Original => "original",
            Self::InterfacesOfAbstracts => "interfaces_of_abstracts",
            Self::ExternalReferences => "external_references",
            Self::ReferencedBy => "referenced_by",
        }
    }
}

impl fmt::Display for RelationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the Partsmith engine.
///
/// - Usage and validation errors fail fast at the call site
/// - Expected negative outcomes (incompatible ports, unresolved aliases) are
///   NOT errors; they are `bool`/`Option` results plus a `tracing` diagnostic
/// - Messages name the offending entity by URI or name
#[derive(Debug, Error)]
pub enum PartsmithError {
    /// The handle does not (or no longer) resolve to an entity.
    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    /// No entity or stored model has the URI.
    #[error("No model with URI {0}")]
    UriNotFound(String),

    /// The handle resolves to an entity of another kind.
    #[error("Entity {id} is a {actual}, expected {expected}")]
    KindMismatch {
        id: EntityId,
        expected: EntityKind,
        actual: EntityKind,
    },

    /// The entity kind does not carry the requested relation.
    #[error("A {kind} has no relation '{relation}'")]
    UnknownRelation {
        kind: EntityKind,
        relation: RelationName,
    },

    /// The relation may only be changed through its dedicated entry point.
    #[error("Relation '{relation}' cannot be set directly, use {use_instead}() instead")]
    SetterRestricted {
        relation: RelationName,
        use_instead: &'static str,
    },

    /// A required argument was missing or empty.
    #[error("Missing argument: {0}")]
    MissingArgument(String),

    /// The edge would make an entity refer to itself.
    #[error("Self reference rejected: {0}")]
    SelfReference(String),

    /// The edge would close a containment cycle.
    #[error("Containment cycle rejected: {0}")]
    ContainmentCycle(String),

    /// An interface can only ever have one parent.
    #[error("Interface {0} already has a parent")]
    AlreadyHasParent(String),

    /// A part can only belong to one whole.
    #[error("Part {0} already belongs to a whole")]
    AlreadyPartOf(String),

    /// The parent kind is not allowed to own interfaces.
    #[error("A {0} cannot own interfaces")]
    InvalidParent(EntityKind),

    /// A port template was materialized on a component of another model.
    #[error("Dynamic interface {0} does not belong to the component's model")]
    ForeignTemplate(String),

    /// The model is declared to not have parts.
    #[error("Component model {0} is defined to not have parts")]
    PartsNotAllowed(String),

    /// A model declared without parts nevertheless has parts.
    #[error("Component model {0} is defined to not have parts, but has parts")]
    InconsistentAtomicity(String),

    /// The interface cannot realize the given abstract interface.
    #[error("Interface {concrete} cannot realize {abstract_interface}")]
    NotRealizable {
        concrete: String,
        abstract_interface: String,
    },

    /// The interface already aliases another original.
    #[error("Interface {0} is already an alias of another interface")]
    AliasConflict(String),

    /// The model was expected to be abstract.
    #[error("Component model {0} is not abstract")]
    NotAbstract(String),

    /// An abstract model cannot implement another abstract model.
    #[error("Component model {0} is abstract and cannot implement an abstract model")]
    AbstractImplementer(String),

    /// The model already implements the abstract model.
    #[error("Component model {model} has already implemented {abstract_model}")]
    DuplicateImplementation {
        model: String,
        abstract_model: String,
    },

    /// The declared realizations do not cover the abstract model.
    #[error("Component model {model} is not a valid implementation of {abstract_model}")]
    InvalidImplementation {
        model: String,
        abstract_model: String,
    },

    /// Deployment compatibility rule violated.
    #[error("Component model {model} cannot be configured for {target}")]
    CannotConfigure { model: String, target: String },

    /// Abstract model could not be resolved to an implementation.
    #[error("Cannot resolve implementation: {0}")]
    ImplementationSelection(String),

    /// Two implementation interfaces claim the same abstract interface.
    #[error("Realization mapping is not injective: {0}")]
    NonInjectiveRealization(String),

    /// The wiring pass hit a structurally broken model.
    #[error("Wiring failed: {0}")]
    Wiring(String),

    /// A template placeholder names an unknown variable.
    #[error("Unresolved template variable '{0}'")]
    UnresolvedVariable(String),

    /// A template is malformed.
    #[error("Template error: {0}")]
    Template(String),

    /// Local changes cannot be pushed to a read-only reference.
    #[error("External reference {0} is read-only")]
    ReadOnlyReference(String),

    /// A basic-model document is malformed or unresolvable.
    #[error("Basic model error: {0}")]
    BasicModel(String),

    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A deserialization error occurred.
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

// =============================================================================
// TESTS
// =============================================================================
