//! # Graph Store Trait
//!
//! The contract between the mutation engines and the graph engine that holds
//! the catalog. Everything the deletion, propagation and notification paths
//! read or write goes through this trait.
//!
//! ## Implementations
//!
//! | Store | Module | Description |
//! |-------|--------|-------------|
//! | `MemoryGraph` | `memory` | In-memory for testing/embedding |
//!
//! ## Guarantees expected from an implementation
//!
//! - Per-node and per-link atomic reads and writes.
//! - Consistent link enumeration: a link returned by `get_links` is visible
//!   to `get_link` until it is removed.
//! - Removal is idempotent: removing an absent node or link returns `Ok(false)`.
//!
//! Multi-step atomicity is NOT expected. The engines are best-effort.

pub mod memory;

use crate::model::*;
use crate::Result;

pub use memory::MemoryGraph;

// ============================================================================
// The GraphStore trait
// ============================================================================

/// Node/link access consumed by the engines.
pub trait GraphStore: Send + Sync {
    // ========================================================================
    // Nodes
    // ========================================================================

    /// Insert a node. The node's guid is its identity.
    fn create_node(&self, node: Node) -> Result<Guid>;

    fn get_node(&self, id: Guid) -> Result<Option<Node>>;

    /// Lookup by guid through the store's unique index. Stores without a
    /// separate index resolve it as a plain node lookup.
    fn find_by_guid(&self, guid: Guid) -> Result<Option<Node>> {
        self.get_node(guid)
    }

    fn get_property(&self, id: Guid, key: &str) -> Result<Option<Value>> {
        Ok(self.get_node(id)?.and_then(|n| n.properties.get(key).cloned()))
    }

    fn set_property(&self, id: Guid, key: &str, value: Value) -> Result<()>;

    fn remove_property(&self, id: Guid, key: &str) -> Result<()>;

    /// Node lifecycle transition (the soft-delete primitive).
    fn set_node_status(&self, id: Guid, status: Status) -> Result<()>;

    /// Update the `entity_status` mirror carried by a classification node.
    fn set_classification_entity_status(&self, id: Guid, status: Status) -> Result<()>;

    /// Hard-remove a node and every link incident to it.
    fn remove_node(&self, id: Guid) -> Result<bool>;

    // ========================================================================
    // Links
    // ========================================================================

    fn create_link(&self, link: NewLink) -> Result<LinkId>;

    fn get_link(&self, id: LinkId) -> Result<Option<Link>>;

    /// Links incident to `node`, in creation order, of any status.
    fn get_links(&self, node: Guid, dir: Direction, label: Option<&str>) -> Result<Vec<Link>>;

    /// The active outgoing link of `node` carrying `label`, if any.
    fn get_edge_for_label(&self, node: Guid, label: &str) -> Result<Option<Link>> {
        Ok(self
            .get_links(node, Direction::Outgoing, Some(label))?
            .into_iter()
            .find(Link::is_active))
    }

    /// Link lifecycle transition (the soft-delete primitive).
    fn set_link_status(&self, id: LinkId, status: Status) -> Result<()>;

    fn remove_link(&self, id: LinkId) -> Result<bool>;
}
