//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.
//!
//! Every command opens the catalogue, loads what it needs into a fresh
//! registry and prints its result; nothing is kept between invocations.

use partsmith_core::{
    Domain, EntityId, FileReferenceStore, ImplementationSelector, ModelStore, ModuleView,
    PartsmithError, Registry, RelationName, document_digest, export_basic_model,
    import_basic_model, primitives::{MAX_DOCUMENT_BYTES, URI_SCHEME},
};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

// =============================================================================
// FILE VALIDATION
// =============================================================================

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), PartsmithError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| PartsmithError::IoError(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(PartsmithError::IoError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Resolve an input path to an existing regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, PartsmithError> {
    let canonical = path.canonicalize().map_err(|e| {
        PartsmithError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(PartsmithError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Resolve an output path below an existing directory.
fn validate_output_path(path: &Path) -> Result<PathBuf, PartsmithError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        PartsmithError::IoError(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(PartsmithError::IoError(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| PartsmithError::IoError("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

/// Read a document of at most [`MAX_DOCUMENT_BYTES`].
fn read_document(path: &Path) -> Result<String, PartsmithError> {
    let validated = validate_file_path(path)?;
    validate_file_size(&validated, MAX_DOCUMENT_BYTES as u64)?;
    std::fs::read_to_string(&validated)
        .map_err(|e| PartsmithError::IoError(format!("Read file: {}", e)))
}

/// Read a JSON object from a file.
pub fn read_json_object(path: &Path) -> Result<Map<String, Value>, PartsmithError> {
    match serde_json::from_str(&read_document(path)?) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(PartsmithError::DeserializationError(format!(
            "{} does not hold a JSON object",
            path.display()
        ))),
        Err(e) => Err(PartsmithError::DeserializationError(e.to_string())),
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<(), PartsmithError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| PartsmithError::SerializationError(e.to_string()))?;
    println!("{}", text);
    Ok(())
}

// =============================================================================
// IMPLEMENTATION SELECTION
// =============================================================================

/// Implementation choices given on the command line.
///
/// Keys and values are model names or URIs: `Vehicle=Opel`, or
/// `drock://component_model/ASSEMBLY/Vehicle/v1=drock://...`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selections {
    choices: BTreeMap<String, String>,
}

impl Selections {
    /// Parse `ABSTRACT=IMPLEMENTATION` pairs.
    pub fn parse(pairs: &[String]) -> Result<Self, PartsmithError> {
        let mut choices = BTreeMap::new();
        for pair in pairs {
            let (key, value) = pair
                .split_once('=')
                .map(|(k, v)| (k.trim(), v.trim()))
                .filter(|(k, v)| !k.is_empty() && !v.is_empty())
                .ok_or_else(|| {
                    PartsmithError::MissingArgument(format!(
                        "selection '{}' is not of the form ABSTRACT=IMPLEMENTATION",
                        pair
                    ))
                })?;
            choices.insert(key.to_string(), value.to_string());
        }
        Ok(Self { choices })
    }

    /// Chosen implementations that are given by URI.
    pub fn implementation_uris(&self) -> impl Iterator<Item = &str> {
        self.choices
            .values()
            .map(String::as_str)
            .filter(|v| v.starts_with(URI_SCHEME))
    }

    fn matches(registry: &Registry, id: EntityId, wanted: &str) -> bool {
        registry.name(id).is_ok_and(|name| name == wanted)
            || registry.uri(id).is_ok_and(|uri| uri == wanted)
    }
}

impl ImplementationSelector for Selections {
    fn select(
        &mut self,
        registry: &Registry,
        abstract_model: EntityId,
        candidates: &[EntityId],
    ) -> Option<EntityId> {
        let wanted = self
            .choices
            .iter()
            .find(|(key, _)| Self::matches(registry, abstract_model, key))
            .map(|(_, value)| value)?;
        candidates
            .iter()
            .copied()
            .find(|candidate| Self::matches(registry, *candidate, wanted))
    }
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Load a stored model and everything it needs into `registry`.
pub fn load_model(
    store: &ModelStore,
    registry: &mut Registry,
    uri: &str,
) -> Result<EntityId, PartsmithError> {
    registry
        .load_by_uri(uri, Some(store))?
        .ok_or_else(|| PartsmithError::UriNotFound(uri.to_string()))
}

fn print_module(view: &ModuleView, depth: usize) {
    let indent = "  ".repeat(depth);
    println!("{}{} <{}>", indent, view.name, view.model);
    for port in &view.interfaces {
        println!(
            "{}  - {} ({} {}) -> {}",
            indent,
            port.name,
            port.interface_type,
            port.direction,
            port.connected_to.len()
        );
    }
    for part in &view.parts {
        print_module(part, depth + 1);
    }
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show catalogue status.
pub fn cmd_status(db_path: &Path, json_mode: bool) -> Result<(), PartsmithError> {
    let store = ModelStore::open(db_path)?;
    let models = store.find(None, None)?;
    let mut per_domain: BTreeMap<String, usize> = BTreeMap::new();
    for model in &models {
        *per_domain.entry(model.domain.to_string()).or_insert(0) += 1;
    }

    if json_mode {
        let output = serde_json::json!({
            "database": db_path.to_string_lossy(),
            "model_count": models.len(),
            "domains": per_domain,
        });
        return print_json(&output);
    }

    println!("Partsmith Catalogue Status");
    println!("==========================");
    println!("Database: {:?}", db_path);
    println!();
    println!("Models:   {}", models.len());
    for (domain, count) in &per_domain {
        println!("  {:<12} {}", domain, count);
    }
    Ok(())
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Initialize a new catalogue.
pub fn cmd_init(db_path: &Path, force: bool) -> Result<(), PartsmithError> {
    if db_path.exists() {
        if !force {
            return Err(PartsmithError::IoError(
                "Database already exists. Use --force to overwrite.".to_string(),
            ));
        }
        std::fs::remove_file(db_path).map_err(|e| PartsmithError::IoError(e.to_string()))?;
    }
    let _store = ModelStore::open(db_path)?;
    println!("Initialized new catalogue at {:?}", db_path);
    Ok(())
}

// =============================================================================
// IMPORT / EXPORT COMMANDS
// =============================================================================

/// Import every version of a basic-model document into the catalogue.
///
/// Part models and abstracts referenced by the document are resolved
/// against the catalogue.
pub fn cmd_import(db_path: &Path, json_mode: bool, input: &Path) -> Result<(), PartsmithError> {
    let document = read_document(input)?;
    let mut store = ModelStore::open(db_path)?;
    let mut registry = Registry::new();
    let models = import_basic_model(&mut registry, &document, Some(&store))?;
    if models.is_empty() {
        warn!(file = %input.display(), "document holds no importable version");
    }

    let mut uris = Vec::new();
    for model in models {
        uris.push(store.put(&registry, model)?);
    }
    info!(count = uris.len(), "import finished");

    if json_mode {
        return print_json(&serde_json::json!({ "imported": uris }));
    }
    println!("Imported {} model(s)", uris.len());
    for uri in &uris {
        println!("  {}", uri);
    }
    Ok(())
}

/// Write the stored document of a model to a file.
pub fn cmd_export(db_path: &Path, uri: &str, output: &Path) -> Result<(), PartsmithError> {
    let validated_output = validate_output_path(output)?;
    let store = ModelStore::open(db_path)?;
    let document = store
        .get_document(uri)?
        .ok_or_else(|| PartsmithError::UriNotFound(uri.to_string()))?;

    std::fs::write(&validated_output, document.as_bytes())
        .map_err(|e| PartsmithError::IoError(format!("Write file: {}", e)))?;
    println!("Exported {} bytes to {:?}", document.len(), validated_output);
    Ok(())
}

// =============================================================================
// FIND / SHOW COMMANDS
// =============================================================================

/// List stored models.
pub fn cmd_find(
    db_path: &Path,
    json_mode: bool,
    name: Option<&str>,
    domain: Option<&str>,
) -> Result<(), PartsmithError> {
    let domain = domain.map(Domain::parse).transpose()?;
    let store = ModelStore::open(db_path)?;
    let models = store.find(name, domain)?;

    if json_mode {
        return print_json(&models);
    }
    if models.is_empty() {
        println!("No models found");
    }
    for model in &models {
        println!(
            "{:<12} {:<24} {:<8} {}",
            model.domain.as_str(),
            model.name,
            model.version,
            model.uri
        );
    }
    Ok(())
}

/// Show a stored model with its ports, parts and references.
pub fn cmd_show(db_path: &Path, json_mode: bool, uri: &str) -> Result<(), PartsmithError> {
    let store = ModelStore::open(db_path)?;
    let mut registry = Registry::new();
    let model = load_model(&store, &mut registry, uri)?;

    if json_mode {
        return print_json(&export_basic_model(&registry, model)?);
    }

    let props = &registry.component_model(model)?.props;
    println!("{} {} ({})", props.name, props.version, props.domain);
    println!("URI:      {}", uri);
    println!("Abstract: {}", registry.is_abstract(model)?);
    for implementation in registry.get_implementations(model)? {
        println!("  implemented by {}", registry.uri(implementation)?);
    }

    let ports = registry.get_interfaces(model, None, None)?;
    println!();
    println!("Interfaces: {}", ports.len());
    for port in ports {
        let p = registry.interface(port)?;
        let ty = registry.get_interface_type(port)?;
        println!(
            "  {} ({} {} {})",
            p.props.name,
            registry.name(ty)?,
            p.props.direction,
            p.props.multiplicity
        );
    }

    let parts = registry.get_facts(model, RelationName::Parts)?.to_vec();
    println!();
    println!("Parts: {}", parts.len());
    let mut connections = 0;
    for part in parts {
        let part_model = registry.get_type(part.target)?;
        println!("  {} : {}", registry.alias_or_name(part.target)?, registry.uri(part_model)?);
        for port in registry.get_interfaces(part.target, None, None)? {
            connections += registry.get_facts(port, RelationName::Others)?.len();
        }
    }
    println!("Connections: {}", connections);

    let references = registry.get_facts(model, RelationName::ExternalReferences)?;
    if !references.is_empty() {
        println!();
        println!("External references: {}", references.len());
        for reference in references {
            println!("  {}", registry.external_reference(reference.target)?.props.remote_url);
        }
    }
    Ok(())
}

// =============================================================================
// BUILD COMMAND
// =============================================================================

/// Arguments of the `build` command.
#[derive(Debug, Clone, Default)]
pub struct BuildRequest {
    pub uri: String,
    pub name: String,
    pub select: Vec<String>,
    pub globals: Option<PathBuf>,
    pub configure: Option<PathBuf>,
}

/// Elaborate a stored model and return the resulting module tree.
pub fn build_model(store: &ModelStore, request: &BuildRequest) -> Result<ModuleView, PartsmithError> {
    let mut selections = Selections::parse(&request.select)?;
    let globals = request
        .globals
        .as_deref()
        .map(read_json_object)
        .transpose()?
        .unwrap_or_default();
    let overrides = request
        .configure
        .as_deref()
        .map(read_json_object)
        .transpose()?;

    let mut registry = Registry::new();
    let model = load_model(store, &mut registry, &request.uri)?;
    for uri in selections.implementation_uris().map(str::to_string).collect::<Vec<_>>() {
        if registry.load_by_uri(&uri, Some(store))?.is_none() {
            warn!(uri = %uri, "selected implementation not in catalogue");
        }
    }

    let root = registry.build(model, &request.name, Some(&mut selections))?;
    if let Some(overrides) = overrides {
        registry.configure(root, &overrides)?;
    }
    registry.apply_global_variables(root, &globals)?;
    info!(model = %request.uri, modules = registry.module_tree(root)?.len(), "model built");
    registry.module_view(root)
}

/// Elaborate a stored model and print the module tree.
pub fn cmd_build(db_path: &Path, json_mode: bool, request: &BuildRequest) -> Result<(), PartsmithError> {
    let store = ModelStore::open(db_path)?;
    let view = build_model(&store, request)?;

    if json_mode {
        return print_json(&view);
    }
    print_module(&view, 0);
    Ok(())
}

// =============================================================================
// FETCH COMMAND
// =============================================================================

/// Fetch the external references of a stored model into `dir`.
///
/// A failing optional reference is reported and skipped.
pub fn cmd_fetch(db_path: &Path, json_mode: bool, uri: &str, dir: &Path) -> Result<(), PartsmithError> {
    let store = ModelStore::open(db_path)?;
    let mut registry = Registry::new();
    let model = load_model(&store, &mut registry, uri)?;

    let mut fetched = Vec::new();
    for reference in registry.get_facts(model, RelationName::ExternalReferences)? {
        let optional = reference
            .props
            .get("optional")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        match registry.load_reference(reference.target, &FileReferenceStore, dir) {
            Ok(loaded) => fetched.push(loaded),
            Err(e) if optional => warn!(error = %e, "skipping optional reference"),
            Err(e) => return Err(e),
        }
    }

    if json_mode {
        return print_json(&fetched);
    }
    println!("Fetched {} reference(s)", fetched.len());
    for loaded in &fetched {
        println!("  {} -> {}", loaded.url, loaded.local_path.display());
    }
    Ok(())
}

// =============================================================================
// REMOVE / HASH COMMANDS
// =============================================================================

/// Remove a stored model.
pub fn cmd_remove(db_path: &Path, uri: &str) -> Result<(), PartsmithError> {
    let mut store = ModelStore::open(db_path)?;
    if !store.remove(uri)? {
        return Err(PartsmithError::UriNotFound(uri.to_string()));
    }
    println!("Removed {}", uri);
    Ok(())
}

/// Compute the BLAKE3 digest of a stored model.
pub fn cmd_hash(db_path: &Path, json_mode: bool, uri: &str) -> Result<(), PartsmithError> {
    let store = ModelStore::open(db_path)?;
    let mut registry = Registry::new();
    let model = load_model(&store, &mut registry, uri)?;
    let digest = document_digest(&registry, model)?;

    if json_mode {
        return print_json(&serde_json::json!({ "uri": uri, "blake3": digest }));
    }
    println!("BLAKE3: {}", digest);
    Ok(())
}
