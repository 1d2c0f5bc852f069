//! # catalog-mutation: Mutation Core of a Graph-Backed Metadata Catalog
//!
//! Entities, structs and classifications are nodes; attributes and
//! relationships are directed labeled links. This crate keeps that graph
//! consistent across multi-step mutations:
//!
//! 1. **Unit of work**: per-operation cache, mutation ledger and
//!    propagation ledger ([`uow`]).
//! 2. **Cascading deletion and tag propagation**: ownership closure,
//!    soft/hard deletes, cardinality checks, propagated classification links
//!    ([`delete`], [`propagation`]).
//! 3. **Change notification**: pruned, ordered fanout of what the operation
//!    did to registered listeners ([`notify`]).
//!
//! ## Design Principles
//!
//! 1. **Trait-first**: [`GraphStore`] is the contract with the graph engine
//! 2. **Explicit context**: every engine call takes the [`UnitOfWork`] it records into
//! 3. **Closed node kinds**: entity / struct / classification dispatch is an exhaustive match
//! 4. **Best-effort, not transactional**: a failed step leaves earlier steps applied
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use catalog_mutation::{
//!     ActiveUnits, CoreConfig, DeletionEngine, Guid, MemoryGraph, TypeRegistry, UnitOfWork,
//! };
//!
//! # fn example(registry: TypeRegistry, table: Guid) -> catalog_mutation::Result<()> {
//! let graph = MemoryGraph::new();
//! let config = CoreConfig::default();
//! let engine = DeletionEngine::new(&graph, &registry, &config);
//!
//! let mut uow = UnitOfWork::begin(&ActiveUnits::global());
//! engine.delete_entities(&mut uow, [table])?;
//! println!("deleted {} entities", uow.deleted_entities().count());
//! uow.clear();
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod types;
pub mod storage;
pub mod uow;
pub mod config;
pub mod delete;
pub mod propagation;
pub mod notify;
pub mod index;

mod ops;

// ============================================================================
// Re-exports: Model (the DTOs)
// ============================================================================

pub use model::{
    Node, NodeKind, ClassificationState, Link, LinkId, LinkKind, NewLink,
    Value, PropertyMap, Guid, Status, Direction, PropagateTags,
    EntityHeader, Entity, Classification,
};

// ============================================================================
// Re-exports: Types, Storage, Unit of Work
// ============================================================================

pub use types::{TypeRegistry, TypeDef, AttributeDef, RelationshipDef, RefCategory};
pub use storage::{GraphStore, MemoryGraph};
pub use uow::{UnitOfWork, ActiveUnits, DeleteType};
pub use config::{CoreConfig, ListenerProtocol};

// ============================================================================
// Re-exports: Engines
// ============================================================================

pub use delete::{DeletionEngine, OwnershipWalker, OwnedNode};
pub use propagation::PropagationEngine;
pub use notify::{ChangeNotifier, ChangeListener, MutationBatch, EntityView};

// ============================================================================
// Error Types
// ============================================================================

/// Error raised by a change listener.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Type not found: {category} {name}")]
    TypeNotFound { category: String, name: String },

    #[error("Cannot unset required attribute {attribute} on {guid} (edge = {label})")]
    RequiredAttributeViolation { guid: Guid, attribute: String, label: String },

    #[error(
        "Cannot remove {container} element from required attribute {attribute} on {guid}: \
         {count} values, minimum {min_count}"
    )]
    CardinalityViolation {
        guid: Guid,
        attribute: String,
        container: &'static str,
        count: usize,
        min_count: usize,
    },

    #[error(
        "Propagated classification {classification} cannot be removed while associated entity \
         {associated_entity} is active"
    )]
    PropagatedClassificationRemovalNotSupported { classification: String, associated_entity: Guid },

    #[error(
        "Propagated classification {classification} from {associated_entity} is not associated \
         with entity {entity}"
    )]
    PropagatedClassificationNotAssociated {
        classification: String,
        associated_entity: Guid,
        entity: Guid,
    },

    #[error("Notification failed: listener {listener}, operation {operation}")]
    NotificationFailed {
        listener: String,
        operation: String,
        #[source]
        source: ListenerError,
    },

    #[error(transparent)]
    Listener(ListenerError),

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),
}

impl Error {
    pub fn type_not_found(category: impl Into<String>, name: impl Into<String>) -> Self {
        Self::TypeNotFound { category: category.into(), name: name.into() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
