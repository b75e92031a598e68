//! # External Reference Stores
//!
//! Fetching the content behind an [`ExternalReference`](crate::ExternalReference)
//! into a local directory, and pushing local changes back.
//!
//! The local copy of a reference lives at `{local_dir}/{uuid}`, where
//! `uuid` is the name-based UUID of the reference's URI, next to a
//! `{uuid}.meta` sidecar recording what was fetched. A reload only copies
//! again when the remote changed since.

use crate::primitives::REFERENCE_META_SUFFIX;
use crate::{EntityId, ExternalReference, ExternalReferenceProps, PartsmithError, Registry};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::debug;
use uuid::Uuid;

/// Where a reference's content was placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadedReference {
    pub url: String,
    pub local_path: PathBuf,
}

/// Something that can move reference content between its remote location
/// and a local directory.
pub trait ReferenceStore {
    /// Fetch the content of `reference` into `local_dir`. Safe to call
    /// repeatedly.
    fn load(&self, reference: &ExternalReferenceProps, local_dir: &Path) -> Result<LoadedReference, PartsmithError>;

    /// Push the local copy in `local_dir` back to the remote location.
    fn store(&self, reference: &ExternalReferenceProps, local_dir: &Path) -> Result<(), PartsmithError>;
}

/// Local file name of a reference's content.
#[must_use]
pub fn local_file_name(remote_url: &str) -> String {
    let uri = ExternalReference::uri_for(remote_url);
    Uuid::new_v5(&Uuid::NAMESPACE_URL, uri.as_bytes()).to_string()
}

// =============================================================================
// FILE STORE
// =============================================================================

/// Metadata of the remote file at fetch time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct FetchMeta {
    modified_secs: u64,
    modified_nanos: u32,
    length: u64,
}

/// [`ReferenceStore`] for `file://` URLs.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileReferenceStore;

impl FileReferenceStore {
    const SCHEME: &'static str = "file://";

    fn remote_path(url: &str) -> Result<PathBuf, PartsmithError> {
        url.strip_prefix(Self::SCHEME)
            .map(PathBuf::from)
            .ok_or_else(|| PartsmithError::IoError(format!("unsupported reference url '{}'", url)))
    }

    fn meta_of(path: &Path) -> Result<FetchMeta, PartsmithError> {
        let metadata = fs::metadata(path).map_err(|e| PartsmithError::IoError(format!("{}: {}", path.display(), e)))?;
        if !metadata.is_file() {
            return Err(PartsmithError::IoError(format!("{} is not a file", path.display())));
        }
        let modified = metadata
            .modified()
            .map_err(|e| PartsmithError::IoError(e.to_string()))?
            .duration_since(UNIX_EPOCH)
            .map_err(|e| PartsmithError::IoError(e.to_string()))?;
        Ok(FetchMeta {
            modified_secs: modified.as_secs(),
            modified_nanos: modified.subsec_nanos(),
            length: metadata.len(),
        })
    }

    fn sidecar(local_path: &Path) -> PathBuf {
        let mut name = local_path.as_os_str().to_owned();
        name.push(REFERENCE_META_SUFFIX);
        PathBuf::from(name)
    }

    fn read_sidecar(path: &Path) -> Option<FetchMeta> {
        let text = fs::read_to_string(path).ok()?;
        serde_json::from_str(&text).ok()
    }

    fn write_sidecar(path: &Path, meta: FetchMeta) -> Result<(), PartsmithError> {
        let text = serde_json::to_string(&meta).map_err(|e| PartsmithError::SerializationError(e.to_string()))?;
        fs::write(path, text).map_err(|e| PartsmithError::IoError(e.to_string()))
    }
}

impl ReferenceStore for FileReferenceStore {
    fn load(&self, reference: &ExternalReferenceProps, local_dir: &Path) -> Result<LoadedReference, PartsmithError> {
        let remote = Self::remote_path(&reference.remote_url)?;
        let local_path = local_dir.join(local_file_name(&reference.remote_url));
        let sidecar = Self::sidecar(&local_path);
        let current = Self::meta_of(&remote)?;

        if local_path.is_file() && Self::read_sidecar(&sidecar) == Some(current) {
            debug!(url = %reference.remote_url, "reference is up to date");
        } else {
            fs::create_dir_all(local_dir).map_err(|e| PartsmithError::IoError(e.to_string()))?;
            fs::copy(&remote, &local_path).map_err(|e| PartsmithError::IoError(e.to_string()))?;
            Self::write_sidecar(&sidecar, current)?;
            debug!(url = %reference.remote_url, path = %local_path.display(), "reference fetched");
        }
        Ok(LoadedReference {
            url: reference.remote_url.clone(),
            local_path,
        })
    }

    fn store(&self, reference: &ExternalReferenceProps, local_dir: &Path) -> Result<(), PartsmithError> {
        if reference.read_only {
            return Err(PartsmithError::ReadOnlyReference(reference.remote_url.clone()));
        }
        let remote = Self::remote_path(&reference.remote_url)?;
        let local_path = local_dir.join(local_file_name(&reference.remote_url));
        if !local_path.is_file() {
            return Err(PartsmithError::IoError(format!(
                "no local copy of {} at {}",
                reference.remote_url,
                local_path.display()
            )));
        }
        fs::copy(&local_path, &remote).map_err(|e| PartsmithError::IoError(e.to_string()))?;
        Self::write_sidecar(&Self::sidecar(&local_path), Self::meta_of(&remote)?)?;
        debug!(url = %reference.remote_url, "reference stored");
        Ok(())
    }
}

impl Registry {
    /// Fetch the content of the external reference `reference`.
    pub fn load_reference(
        &self,
        reference: EntityId,
        store: &dyn ReferenceStore,
        local_dir: &Path,
    ) -> Result<LoadedReference, PartsmithError> {
        store.load(&self.external_reference(reference)?.props, local_dir)
    }

    /// Push local changes of the external reference `reference`.
    pub fn store_reference(
        &self,
        reference: EntityId,
        store: &dyn ReferenceStore,
        local_dir: &Path,
    ) -> Result<(), PartsmithError> {
        store.store(&self.external_reference(reference)?.props, local_dir)
    }
}

// =============================================================================
// TESTS
// =============================================================================
