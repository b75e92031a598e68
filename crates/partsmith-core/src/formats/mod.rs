//! # Exchange Formats
//!
//! Serialization of component models into documents other tools can read.
//!
//! ## Available Formats
//!
//! - `basic_model`: one JSON document per component model, with every
//!   version, part, connection and port of the model

pub mod basic_model;

pub use basic_model::{
    BasicModel, Components, ComponentsConfiguration, DeploymentRef, EdgeEntry, Endpoint,
    ModelRef, NodeEntry, RealizationRef, ReferenceEntry, TypeRef, VersionEntry,
    export_basic_model, import_basic_model,
};

#[cfg(feature = "crypto-hash")]
pub use basic_model::document_digest;
