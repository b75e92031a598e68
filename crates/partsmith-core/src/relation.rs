//! # Relations
//!
//! Storage for one named relation of one entity: an ordered list of
//! (target handle, property bag) facts.
//!
//! A relation is in one of three states:
//! - `Unpopulated`: nothing is known about it yet
//! - `Empty`: it is known to hold no facts
//! - `Populated`: it holds at least one fact
//!
//! Reading an unpopulated relation yields no facts; [`Relation::is_known`]
//! tells the two empty states apart.

use crate::EntityId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One edge of a relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    /// The entity the edge points at.
    pub target: EntityId,
    /// Free-form edge properties (e.g. connection name and configuration).
    pub props: Map<String, Value>,
}

impl Fact {
    #[must_use]
    pub fn new(target: EntityId, props: Map<String, Value>) -> Self {
        Self { target, props }
    }
}

/// Three-state relation storage.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Relation {
    #[default]
    Unpopulated,
    Empty,
    Populated(Vec<Fact>),
}

impl Relation {
    /// Facts in insertion order. Empty for both empty states.
    #[must_use]
    pub fn facts(&self) -> &[Fact] {
        match self {
            Self::Populated(facts) => facts,
            Self::Unpopulated | Self::Empty => &[],
        }
    }

    /// `true` once the relation has been populated or explicitly emptied.
    #[must_use]
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unpopulated)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.facts().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.facts().is_empty()
    }

    #[must_use]
    pub fn contains(&self, target: EntityId) -> bool {
        self.facts().iter().any(|f| f.target == target)
    }

    /// First target, for relations of cardinality 0..1.
    #[must_use]
    pub fn first(&self) -> Option<EntityId> {
        self.facts().first().map(|f| f.target)
    }

    /// Properties of the fact pointing at `target`.
    #[must_use]
    pub fn props_of(&self, target: EntityId) -> Option<&Map<String, Value>> {
        self.facts()
            .iter()
            .find(|f| f.target == target)
            .map(|f| &f.props)
    }

    /// Add a fact. Adding an existing target replaces its properties.
    pub fn upsert(&mut self, target: EntityId, props: Map<String, Value>) {
        match self {
            Self::Populated(facts) => {
                if let Some(existing) = facts.iter_mut().find(|f| f.target == target) {
                    existing.props = props;
                } else {
                    facts.push(Fact::new(target, props));
                }
            }
            Self::Unpopulated | Self::Empty => {
                *self = Self::Populated(vec![Fact::new(target, props)]);
            }
        }
    }

    /// Replace the whole relation with a single fact.
    pub fn set_single(&mut self, target: EntityId, props: Map<String, Value>) {
        *self = Self::Populated(vec![Fact::new(target, props)]);
    }

    /// Remove every fact pointing at `target`. Returns `true` if one was removed.
    pub fn remove(&mut self, target: EntityId) -> bool {
        let Self::Populated(facts) = self else {
            return false;
        };
        let before = facts.len();
        facts.retain(|f| f.target != target);
        let removed = facts.len() != before;
        if facts.is_empty() {
            *self = Self::Empty;
        }
        removed
    }

    /// Drop every fact; the relation stays known.
    pub fn clear(&mut self) {
        *self = Self::Empty;
    }

    /// Turn `Unpopulated` into `Empty`; known relations are left alone.
    pub fn mark_known(&mut self) {
        if matches!(self, Self::Unpopulated) {
            *self = Self::Empty;
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
