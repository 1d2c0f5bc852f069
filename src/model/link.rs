//! Link (directed labeled edge) in the catalog graph.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Guid, PropertyMap, Status, Value};

/// Label shared by direct and propagated classification links.
pub const CLASSIFICATION_LABEL: &str = "classifiedAs";

/// Link property holding the classification name on classification links.
pub const CLASSIFICATION_NAME_KEY: &str = "__name";

/// Opaque link identifier assigned by the graph store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkId(pub u64);

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Traversal direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Outgoing,
    Incoming,
    Both,
}

/// What a link represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkKind {
    /// Attribute or relationship reference between two nodes.
    Reference,
    /// Entity → classification it was directly tagged with.
    Classification,
    /// Entity → classification that reached it through propagation.
    PropagatedClassification,
}

/// A link in the catalog graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub id: LinkId,
    /// `__{OwningType}.{attribute}` for references, `classifiedAs` for classifications.
    pub label: String,
    pub from: Guid,
    pub to: Guid,
    pub status: Status,
    /// Set for links that are instances of a relationship type.
    pub relationship_id: Option<Guid>,
    pub relationship_type: Option<String>,
    pub kind: LinkKind,
    pub properties: PropertyMap,
}

impl Link {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn is_relationship(&self) -> bool {
        self.relationship_id.is_some()
    }

    /// Direct (non-propagated) classification link.
    pub fn is_classification_edge(&self) -> bool {
        self.kind == LinkKind::Classification
    }

    pub fn is_propagated(&self) -> bool {
        self.kind == LinkKind::PropagatedClassification
    }

    pub fn is_any_classification(&self) -> bool {
        matches!(self.kind, LinkKind::Classification | LinkKind::PropagatedClassification)
    }

    /// Classification name recorded on a classification link.
    pub fn classification_name(&self) -> Option<&str> {
        self.properties.get(CLASSIFICATION_NAME_KEY).and_then(Value::as_str)
    }

    /// The "other" end of the link from the given node.
    pub fn other_end(&self, node: Guid) -> Option<Guid> {
        if node == self.from {
            Some(self.to)
        } else if node == self.to {
            Some(self.from)
        } else {
            None
        }
    }
}

/// Everything needed to create a link; the store assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLink {
    pub label: String,
    pub from: Guid,
    pub to: Guid,
    pub relationship_id: Option<Guid>,
    pub relationship_type: Option<String>,
    pub kind: LinkKind,
    pub properties: PropertyMap,
}

impl NewLink {
    /// Plain attribute reference `from.attribute → to`.
    pub fn reference(from: Guid, to: Guid, label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            from,
            to,
            relationship_id: None,
            relationship_type: None,
            kind: LinkKind::Reference,
            properties: PropertyMap::new(),
        }
    }

    /// Instance of a relationship type.
    pub fn relationship(
        from: Guid,
        to: Guid,
        label: impl Into<String>,
        relationship_id: Guid,
        relationship_type: impl Into<String>,
    ) -> Self {
        Self {
            relationship_id: Some(relationship_id),
            relationship_type: Some(relationship_type.into()),
            ..Self::reference(from, to, label)
        }
    }

    pub fn classification(entity: Guid, classification: Guid, name: impl Into<String>) -> Self {
        Self::classification_kind(entity, classification, name, LinkKind::Classification)
    }

    pub fn propagated_classification(
        entity: Guid,
        classification: Guid,
        name: impl Into<String>,
    ) -> Self {
        Self::classification_kind(entity, classification, name, LinkKind::PropagatedClassification)
    }

    fn classification_kind(
        entity: Guid,
        classification: Guid,
        name: impl Into<String>,
        kind: LinkKind,
    ) -> Self {
        let mut properties = PropertyMap::new();
        properties.insert(CLASSIFICATION_NAME_KEY.to_string(), Value::String(name.into()));
        Self {
            label: CLASSIFICATION_LABEL.to_string(),
            from: entity,
            to: classification,
            relationship_id: None,
            relationship_type: None,
            kind,
            properties,
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn into_link(self, id: LinkId) -> Link {
        Link {
            id,
            label: self.label,
            from: self.from,
            to: self.to,
            status: Status::Active,
            relationship_id: self.relationship_id,
            relationship_type: self.relationship_type,
            kind: self.kind,
            properties: self.properties,
        }
    }
}

/// A reference label split into `(owning_type, attribute_name)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeLabel {
    pub type_name: String,
    pub attribute_name: String,
}

impl EdgeLabel {
    const PREFIX: &'static str = "__";

    /// Build the label used for `owning_type.attribute`.
    pub fn format(type_name: &str, attribute_name: &str) -> String {
        format!("{}{type_name}.{attribute_name}", Self::PREFIX)
    }

    /// Parse `__{type}.{attribute}`. Returns `None` for classification and
    /// other non-reference labels.
    pub fn parse(label: &str) -> Option<Self> {
        let body = label.strip_prefix(Self::PREFIX)?;
        let (type_name, attribute_name) = body.rsplit_once('.')?;
        if type_name.is_empty() || attribute_name.is_empty() {
            return None;
        }
        Some(Self {
            type_name: type_name.to_string(),
            attribute_name: attribute_name.to_string(),
        })
    }
}
