//! Node (vertex) in the catalog graph.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{PropertyMap, Value};

/// Globally unique identifier of a node (entity, struct or classification instance).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Guid(pub Uuid);

impl Guid {
    /// Fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_u128(v: u128) -> Self {
        Self(Uuid::from_u128(v))
    }
}

impl Default for Guid {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Guid {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Guid)
    }
}

/// Lifecycle status shared by nodes and links.
///
/// Transitions are monotonic within one delete: `Active → Deleted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Status {
    #[default]
    Active,
    Deleted,
}

impl Status {
    pub fn is_active(self) -> bool {
        self == Status::Active
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Active => write!(f, "ACTIVE"),
            Status::Deleted => write!(f, "DELETED"),
        }
    }
}

/// State carried only by classification nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationState {
    /// The entity the classification was directly attached to.
    pub associated_entity: Guid,
    /// Mirrors whether the associated entity is still active.
    pub entity_status: Status,
    /// Whether the classification flows across propagating relationships.
    pub propagate: bool,
    /// Whether propagated copies are removed when the source relationship or entity goes away.
    pub remove_propagations: bool,
}

impl ClassificationState {
    pub fn new(associated_entity: Guid) -> Self {
        Self {
            associated_entity,
            entity_status: Status::Active,
            propagate: true,
            remove_propagations: true,
        }
    }
}

/// What a node represents. Closed set: every dispatch over node kind is an
/// exhaustive match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    Entity,
    Struct,
    Classification(ClassificationState),
}

/// A node in the catalog graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: Guid,
    pub type_name: String,
    pub kind: NodeKind,
    pub status: Status,
    pub properties: PropertyMap,
}

impl Node {
    pub fn entity(id: Guid, type_name: impl Into<String>) -> Self {
        Self::with_kind(id, type_name, NodeKind::Entity)
    }

    pub fn structure(id: Guid, type_name: impl Into<String>) -> Self {
        Self::with_kind(id, type_name, NodeKind::Struct)
    }

    pub fn classification(
        id: Guid,
        type_name: impl Into<String>,
        state: ClassificationState,
    ) -> Self {
        Self::with_kind(id, type_name, NodeKind::Classification(state))
    }

    fn with_kind(id: Guid, type_name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id,
            type_name: type_name.into(),
            kind,
            status: Status::Active,
            properties: PropertyMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn is_entity(&self) -> bool {
        matches!(self.kind, NodeKind::Entity)
    }

    /// Classification state, if this node is a classification instance.
    pub fn classification_state(&self) -> Option<&ClassificationState> {
        match &self.kind {
            NodeKind::Classification(state) => Some(state),
            NodeKind::Entity | NodeKind::Struct => None,
        }
    }

    /// Names in a string-list property (`__traitNames`, `__propagatedTraitNames`).
    pub fn string_list(&self, key: &str) -> Vec<String> {
        self.properties
            .get(key)
            .map(|v| v.strings().map(str::to_owned).collect())
            .unwrap_or_default()
    }
}
