//! # Type Registry
//!
//! Attribute and type metadata the engines consult while walking the graph:
//! which attributes hold references, whether a reference is owned, cardinality
//! bounds, inverse attributes, and relationship propagation policy.
//!
//! The registry is built once and read-only afterwards.

pub mod registry;

use serde::{Deserialize, Serialize};

use crate::model::{EdgeLabel, PropagateTags};

pub use registry::TypeRegistry;

// ============================================================================
// Categories
// ============================================================================

/// Kind of a registered type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeKind {
    Entity,
    Struct,
    Classification,
}

impl TypeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TypeKind::Entity => "ENTITY",
            TypeKind::Struct => "STRUCT",
            TypeKind::Classification => "CLASSIFICATION",
        }
    }
}

/// Element type of an array or map attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementType {
    Primitive,
    Struct(String),
    ObjectId(String),
}

impl ElementType {
    /// Category of the referenced node, `None` for primitives.
    pub fn ref_category(&self) -> Option<RefCategory> {
        match self {
            ElementType::Primitive => None,
            ElementType::Struct(_) => Some(RefCategory::Struct),
            ElementType::ObjectId(_) => Some(RefCategory::ObjectId),
        }
    }
}

/// Declared type of an attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeType {
    Primitive,
    Struct(String),
    ObjectId(String),
    Array(ElementType),
    Map(ElementType),
}

impl AttributeType {
    /// Name of the referenced type for reference-valued attributes.
    pub fn referenced_type(&self) -> Option<&str> {
        match self {
            AttributeType::Struct(t)
            | AttributeType::ObjectId(t)
            | AttributeType::Array(ElementType::Struct(t) | ElementType::ObjectId(t))
            | AttributeType::Map(ElementType::Struct(t) | ElementType::ObjectId(t)) => Some(t),
            AttributeType::Primitive
            | AttributeType::Array(ElementType::Primitive)
            | AttributeType::Map(ElementType::Primitive) => None,
        }
    }
}

/// Category of the node on the far side of a reference link. Drives how
/// `delete_edge_reference` treats the referenced node's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefCategory {
    Struct,
    Classification,
    ObjectId,
}

/// Which endpoint of a relationship link an attribute sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RelationshipDirection {
    /// The owning node is the link source; the referenced node is the target.
    #[default]
    Out,
    /// The owning node is the link target.
    In,
    Both,
}

// ============================================================================
// Attribute definition
// ============================================================================

/// Attribute of a struct, entity or classification type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDef {
    pub name: String,
    pub attr_type: AttributeType,
    /// Composite: the referenced node's lifecycle is controlled by the owner.
    pub is_owned: bool,
    pub is_optional: bool,
    pub is_unique: bool,
    /// Minimum number of values for array/map attributes.
    pub min_count: usize,
    /// Reference stored as a serialized `type:guid` value, not a link.
    pub soft_reference: bool,
    /// Name of the attribute on the referenced type that points back here.
    pub inverse_ref: Option<String>,
    /// Label override; defaults to `__{OwningType}.{name}`.
    pub edge_label: Option<String>,
    pub direction: RelationshipDirection,
}

impl AttributeDef {
    pub fn new(name: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
            is_owned: false,
            is_optional: true,
            is_unique: false,
            min_count: 0,
            soft_reference: false,
            inverse_ref: None,
            edge_label: None,
            direction: RelationshipDirection::Out,
        }
    }

    pub fn primitive(name: impl Into<String>) -> Self {
        Self::new(name, AttributeType::Primitive)
    }

    pub fn object_id(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::new(name, AttributeType::ObjectId(type_name.into()))
    }

    pub fn structure(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::new(name, AttributeType::Struct(type_name.into()))
    }

    pub fn array_of(name: impl Into<String>, element: ElementType) -> Self {
        Self::new(name, AttributeType::Array(element))
    }

    pub fn map_of(name: impl Into<String>, element: ElementType) -> Self {
        Self::new(name, AttributeType::Map(element))
    }

    pub fn owned(mut self) -> Self {
        self.is_owned = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.is_optional = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.is_unique = true;
        self
    }

    pub fn min_count(mut self, min: usize) -> Self {
        self.min_count = min;
        self
    }

    pub fn soft_reference(mut self) -> Self {
        self.soft_reference = true;
        self
    }

    pub fn inverse(mut self, attribute: impl Into<String>) -> Self {
        self.inverse_ref = Some(attribute.into());
        self
    }

    pub fn with_edge_label(mut self, label: impl Into<String>) -> Self {
        self.edge_label = Some(label.into());
        self
    }

    pub fn with_direction(mut self, direction: RelationshipDirection) -> Self {
        self.direction = direction;
        self
    }

    /// Label of the link that stores this attribute on an `owner` node.
    pub fn relationship_edge_label(&self, owner: &str) -> String {
        self.edge_label
            .clone()
            .unwrap_or_else(|| EdgeLabel::format(owner, &self.name))
    }

    /// Property holding the secondary uniqueness index for a unique primitive.
    pub fn unique_property_name(&self, owner: &str) -> Option<String> {
        match (&self.attr_type, self.is_unique) {
            (AttributeType::Primitive, true) => Some(format!("__u_{owner}.{}", self.name)),
            _ => None,
        }
    }

    /// Owned reference attribute walked by the ownership closure.
    pub fn is_owned_ref(&self) -> bool {
        self.is_owned
            && matches!(
                self.attr_type,
                AttributeType::ObjectId(_)
                    | AttributeType::Array(ElementType::ObjectId(_))
                    | AttributeType::Map(ElementType::ObjectId(_))
            )
    }
}

// ============================================================================
// Type definitions
// ============================================================================

/// A registered entity, struct or classification type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDef {
    pub name: String,
    pub kind: TypeKind,
    pub super_types: Vec<String>,
    pub attributes: Vec<AttributeDef>,
    /// Synthetic/system entity type: always hard-deleted.
    pub internal: bool,
    /// Classification types only: entity types this classification may be
    /// applied to. Empty means any.
    pub entity_types: Vec<String>,
}

impl TypeDef {
    fn new(name: impl Into<String>, kind: TypeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            super_types: Vec::new(),
            attributes: Vec::new(),
            internal: false,
            entity_types: Vec::new(),
        }
    }

    pub fn entity(name: impl Into<String>) -> Self {
        Self::new(name, TypeKind::Entity)
    }

    pub fn structure(name: impl Into<String>) -> Self {
        Self::new(name, TypeKind::Struct)
    }

    pub fn classification(name: impl Into<String>) -> Self {
        Self::new(name, TypeKind::Classification)
    }

    pub fn with_attribute(mut self, attribute: AttributeDef) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn with_super_type(mut self, name: impl Into<String>) -> Self {
        self.super_types.push(name.into());
        self
    }

    pub fn internal(mut self) -> Self {
        self.internal = true;
        self
    }

    pub fn applicable_to(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_types.push(entity_type.into());
        self
    }
}

/// A relationship type: links carrying `relationship_type == name` follow
/// its propagation policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipDef {
    pub name: String,
    pub propagate_tags: PropagateTags,
}

impl RelationshipDef {
    pub fn new(name: impl Into<String>, propagate_tags: PropagateTags) -> Self {
        Self { name: name.into(), propagate_tags }
    }
}
