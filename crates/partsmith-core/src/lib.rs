//! # partsmith-core
//!
//! The component-assembly engine for Partsmith.
//!
//! This crate holds a typed fact graph of component models, their parts
//! and ports, and elaborates a model into a concrete tree of wired
//! modules:
//! - `registry` + `model`: the arena and its entity kinds
//! - `build`: abstract resolution, expansion and wiring
//! - `document`: configuration merging and `{{ variable }}` templates
//! - `formats`: the basic-model JSON exchange format
//! - `storage` + `source`: a redb model catalogue and cross-registry loading
//! - `reference`: fetching the content behind external references
//!
//! ## Architectural Constraints
//!
//! - Single-threaded and synchronous; the registry exclusively owns every
//!   entity and hands out `EntityId` handles
//! - Deterministic iteration (`BTreeMap`, declared part order)
//! - Diagnostics go through `tracing`; nothing is printed
//! - NO async, NO network dependencies (pure Rust)

// =============================================================================
// MODULES
// =============================================================================

pub mod build;
pub mod document;
pub mod formats;
pub mod model;
pub mod primitives;
pub mod reference;
pub mod registry;
pub mod relation;
pub mod source;
pub mod storage;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{Direction, Domain, EntityId, EntityKind, Multiplicity, PartsmithError, RelationName};

// =============================================================================
// RE-EXPORTS: Fact Graph
// =============================================================================

pub use model::{
    Component, ComponentModel, ComponentModelProps, ComponentProps, DynamicInterface,
    DynamicInterfaceProps, Entity, EntityData, ExternalReference, ExternalReferenceProps,
    Interface, InterfaceModel, InterfaceModelProps, InterfaceProps, InterfaceView, Module,
    ModuleProps, ModuleView,
};
pub use registry::Registry;
pub use relation::{Fact, Relation};

// =============================================================================
// RE-EXPORTS: Elaboration
// =============================================================================

pub use build::ImplementationSelector;
pub use document::{TemplateContext, merge_documents};

// =============================================================================
// RE-EXPORTS: Formats and Persistence
// =============================================================================

pub use formats::{BasicModel, export_basic_model, import_basic_model};
pub use reference::{FileReferenceStore, LoadedReference, ReferenceStore};
pub use source::ModelSource;
pub use storage::{ModelRecord, ModelStore, ModelSummary};

#[cfg(feature = "crypto-hash")]
pub use formats::document_digest;
