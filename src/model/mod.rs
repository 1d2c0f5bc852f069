//! # Catalog Graph Model
//!
//! Clean DTOs that define the catalog property graph and the projections
//! built from it. These types cross every boundary: storage ↔ engines ↔
//! unit of work ↔ listeners.
//!
//! Design rule: this module is pure data with no I/O.

pub mod node;
pub mod link;
pub mod value;
pub mod property_map;
pub mod instance;

pub use node::{Guid, Node, NodeKind, ClassificationState, Status};
pub use link::{
    Link, LinkId, LinkKind, NewLink, EdgeLabel, Direction,
    CLASSIFICATION_LABEL, CLASSIFICATION_NAME_KEY,
};
pub use value::Value;
pub use property_map::{PropertyMap, props, is_system_key};
pub use instance::{
    PropagateTags, EntityHeader, Entity, Classification, Referenceable,
    Relationship, GlossaryTerm,
};

// ============================================================================
// System property keys
// ============================================================================

pub const MODIFICATION_TIMESTAMP_KEY: &str = "__modificationTimestamp";
pub const MODIFIED_BY_KEY: &str = "__modifiedBy";
pub const TRAIT_NAMES_KEY: &str = "__traitNames";
pub const PROPAGATED_TRAIT_NAMES_KEY: &str = "__propagatedTraitNames";
pub const ENTITY_TEXT_KEY: &str = "__entityText";
