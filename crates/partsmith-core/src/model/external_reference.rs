//! # External References
//!
//! Pointers to artifacts held outside the registry (datasheets, CAD files,
//! firmware images). Component models link to them through
//! [`Registry::annotate_with`](crate::Registry::annotate_with).

use super::EntityData;
use crate::primitives::URI_SCHEME;
use crate::{EntityKind, Relation, RelationName};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Properties of an external reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalReferenceProps {
    pub name: String,
    pub remote_url: String,
    pub read_only: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for ExternalReferenceProps {
    fn default() -> Self {
        Self {
            name: String::new(),
            remote_url: String::new(),
            read_only: true,
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExternalReference {
    pub props: ExternalReferenceProps,
    pub(crate) referenced_by: Relation,
}

impl ExternalReference {
    #[must_use]
    pub fn new(name: impl Into<String>, remote_url: impl Into<String>) -> Self {
        Self {
            props: ExternalReferenceProps {
                name: name.into(),
                remote_url: remote_url.into(),
                ..ExternalReferenceProps::default()
            },
            ..Self::default()
        }
    }

    /// URI derived from the remote URL: separators are flattened so the
    /// result stays a single path segment.
    #[must_use]
    pub fn uri_for(remote_url: &str) -> String {
        format!("{URI_SCHEME}{}", remote_url.replace(['/', ':'], "_"))
    }
}

impl EntityData for ExternalReference {
    type Props = ExternalReferenceProps;
    const KIND: EntityKind = EntityKind::ExternalReference;
    const RELATIONS: &'static [RelationName] = &[RelationName::ReferencedBy];

    fn props(&self) -> &Self::Props {
        &self.props
    }

    fn props_mut(&mut self) -> &mut Self::Props {
        &mut self.props
    }

    fn relation(&self, name: RelationName) -> Option<&Relation> {
        match name {
            RelationName::ReferencedBy => Some(&self.referenced_by),
            _ => None,
        }
    }

    fn relation_mut(&mut self, name: RelationName) -> Option<&mut Relation> {
        match name {
            RelationName::ReferencedBy => Some(&mut self.referenced_by),
            _ => None,
        }
    }

    fn name(&self) -> &str {
        &self.props.name
    }
}
