//! # Engine Primitives
//!
//! Hardcoded constants for the Partsmith engine.
//!
//! These values are compiled into the binary and are immutable at runtime.

/// Scheme prefix of every entity URI.
pub const URI_SCHEME: &str = "drock://";

/// Maximum nesting depth of a containment tree.
///
/// - Checked by the containment cycle guard when a part is added.
/// - Checked by `build` while expanding the module tree.
pub const MAX_CONTAINMENT_DEPTH: usize = 256;

/// Maximum accepted size of a single basic-model document in bytes.
///
/// Documents larger than this are rejected before parsing.
pub const MAX_DOCUMENT_BYTES: usize = 16 * 1024 * 1024; // 16 MB

/// Name of the basic-model key carrying a model's template variables,
/// nested inside the domain `data` document.
pub const GLOBAL_VARIABLES_KEY: &str = "globalVariables";

/// Name of the configuration key that pushes overrides down to submodules.
pub const SUBMODEL_KEY: &str = "submodel";

/// Interface type name used when an imported interface omits its `type`.
pub const UNKNOWN_INTERFACE_TYPE: &str = "UNKNOWN";

/// Suffix of the sidecar file that caches reference fetch metadata.
pub const REFERENCE_META_SUFFIX: &str = ".meta";
