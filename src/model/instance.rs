//! Instance projections handed to the unit of work and to listeners.
//!
//! None of these types touch the graph; they are snapshots built from nodes.

use serde::{Deserialize, Serialize};

use super::{Guid, PropertyMap, Status};

/// Which direction(s) classifications flow across a relationship type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PropagateTags {
    #[default]
    None,
    /// From the relationship's first end (link source) to the second (link target).
    OneToTwo,
    /// From the second end (link target) to the first (link source).
    TwoToOne,
    Both,
}

impl PropagateTags {
    pub fn flows_one_to_two(self) -> bool {
        matches!(self, PropagateTags::OneToTwo | PropagateTags::Both)
    }

    pub fn flows_two_to_one(self) -> bool {
        matches!(self, PropagateTags::TwoToOne | PropagateTags::Both)
    }
}

/// Lightweight entity projection used for ledgers and notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityHeader {
    pub guid: Guid,
    pub type_name: String,
    pub status: Status,
    /// Unique attributes plus `name`, when present.
    pub attributes: PropertyMap,
    pub classification_names: Vec<String>,
}

impl EntityHeader {
    pub fn new(guid: Guid, type_name: impl Into<String>) -> Self {
        Self {
            guid,
            type_name: type_name.into(),
            status: Status::Active,
            attributes: PropertyMap::new(),
            classification_names: Vec::new(),
        }
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }
}

/// One applied classification, as seen by listeners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub type_name: String,
    /// The entity the classification was directly attached to.
    pub entity_guid: Guid,
    pub entity_status: Status,
    pub propagate: bool,
    pub remove_propagations: bool,
    pub attributes: PropertyMap,
}

/// Full typed entity, delivered to typed-protocol listeners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub guid: Guid,
    pub type_name: String,
    pub status: Status,
    pub attributes: PropertyMap,
    pub classifications: Vec<Classification>,
}

impl Entity {
    /// Minimal entity rebuilt from a header. Used for deletes, where the
    /// graph may no longer hold the full entity.
    pub fn from_header(header: &EntityHeader) -> Self {
        Self {
            guid: header.guid,
            type_name: header.type_name.clone(),
            status: header.status,
            attributes: header.attributes.clone(),
            classifications: Vec::new(),
        }
    }
}

/// Loosely typed projection delivered to legacy-protocol listeners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Referenceable {
    pub guid: Guid,
    pub type_name: String,
    pub values: PropertyMap,
    pub trait_names: Vec<String>,
}

/// Relationship instance, as seen by listeners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub guid: Guid,
    pub type_name: String,
    pub end1: Guid,
    pub end2: Guid,
    pub status: Status,
    pub propagate_tags: PropagateTags,
}

/// Glossary term whose entity assignments changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlossaryTerm {
    pub guid: Guid,
    pub qualified_name: String,
    pub name: String,
}
