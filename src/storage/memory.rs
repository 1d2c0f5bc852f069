//! In-memory graph store.
//!
//! This is the reference implementation of `GraphStore`.
//! It uses simple HashMaps protected by RwLock.
//!
//! ## Limitations
//!
//! - **No transactions**: writes are applied immediately.
//! - **Per-collection locks**: multi-step mutations are NOT atomic, which is
//!   exactly what the engines assume of any store.
//! - **No property indexes**: `find_by_guid` is a map lookup, nothing else is indexed.
//!
//! Use this store for:
//! - Testing the deletion, propagation and notification engines
//! - Embedding the mutation core in applications that don't need persistence

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use parking_lot::RwLock;

use crate::model::*;
use crate::{Error, Result};
use super::GraphStore;

// ============================================================================
// MemoryGraph
// ============================================================================

/// In-memory catalog graph. Cloning shares the underlying graph.
#[derive(Clone)]
pub struct MemoryGraph {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    nodes: RwLock<HashMap<Guid, Node>>,
    links: RwLock<HashMap<LinkId, Link>>,
    /// node guid → incident link IDs, in creation order
    adjacency: RwLock<HashMap<Guid, Vec<LinkId>>>,
    next_link_id: AtomicU64,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                nodes: RwLock::new(HashMap::new()),
                links: RwLock::new(HashMap::new()),
                adjacency: RwLock::new(HashMap::new()),
                next_link_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn node_count(&self) -> usize {
        self.inner.nodes.read().len()
    }

    pub fn link_count(&self) -> usize {
        self.inner.links.read().len()
    }

    /// Every link in the graph, ordered by id.
    pub fn all_links(&self) -> Vec<Link> {
        let mut links: Vec<Link> = self.inner.links.read().values().cloned().collect();
        links.sort_by_key(|l| l.id);
        links
    }

    fn with_node_mut<R>(&self, id: Guid, f: impl FnOnce(&mut Node) -> R) -> Result<R> {
        let mut nodes = self.inner.nodes.write();
        let node = nodes.get_mut(&id).ok_or_else(|| Error::NotFound(format!("Node {id}")))?;
        Ok(f(node))
    }
}

impl Default for MemoryGraph {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// GraphStore impl
// ============================================================================

impl GraphStore for MemoryGraph {
    // ========================================================================
    // Node CRUD
    // ========================================================================

    fn create_node(&self, node: Node) -> Result<Guid> {
        let id = node.id;
        {
            let mut nodes = self.inner.nodes.write();
            if nodes.contains_key(&id) {
                return Err(Error::StorageError(format!("Node {id} already exists")));
            }
            nodes.insert(id, node);
        }
        self.inner.adjacency.write().entry(id).or_default();
        Ok(id)
    }

    fn get_node(&self, id: Guid) -> Result<Option<Node>> {
        Ok(self.inner.nodes.read().get(&id).cloned())
    }

    fn get_property(&self, id: Guid, key: &str) -> Result<Option<Value>> {
        Ok(self.inner.nodes.read().get(&id).and_then(|n| n.properties.get(key).cloned()))
    }

    fn set_property(&self, id: Guid, key: &str, value: Value) -> Result<()> {
        self.with_node_mut(id, |node| {
            node.properties.insert(key.to_string(), value);
        })
    }

    fn remove_property(&self, id: Guid, key: &str) -> Result<()> {
        self.with_node_mut(id, |node| {
            node.properties.remove(key);
        })
    }

    fn set_node_status(&self, id: Guid, status: Status) -> Result<()> {
        self.with_node_mut(id, |node| node.status = status)
    }

    fn set_classification_entity_status(&self, id: Guid, status: Status) -> Result<()> {
        self.with_node_mut(id, |node| match &mut node.kind {
            NodeKind::Classification(state) => {
                state.entity_status = status;
                Ok(())
            }
            NodeKind::Entity | NodeKind::Struct => Err(Error::IllegalState(format!(
                "Node {id} of type {} is not a classification", node.type_name
            ))),
        })?
    }

    /// Detach-delete: incident links go with the node.
    fn remove_node(&self, id: Guid) -> Result<bool> {
        let incident = self.inner.adjacency.write().remove(&id).unwrap_or_default();
        for link_id in incident {
            self.remove_link(link_id)?;
        }
        Ok(self.inner.nodes.write().remove(&id).is_some())
    }

    // ========================================================================
    // Link CRUD
    // ========================================================================

    fn create_link(&self, link: NewLink) -> Result<LinkId> {
        // Verify both nodes exist
        {
            let nodes = self.inner.nodes.read();
            if !nodes.contains_key(&link.from) {
                return Err(Error::NotFound(format!("Source node {}", link.from)));
            }
            if !nodes.contains_key(&link.to) {
                return Err(Error::NotFound(format!("Target node {}", link.to)));
            }
        }

        let id = LinkId(self.inner.next_link_id.fetch_add(1, Ordering::Relaxed));
        let (from, to) = (link.from, link.to);
        self.inner.links.write().insert(id, link.into_link(id));

        // Update adjacency for both endpoints
        let mut adj = self.inner.adjacency.write();
        adj.entry(from).or_default().push(id);
        if from != to {
            adj.entry(to).or_default().push(id);
        }

        Ok(id)
    }

    fn get_link(&self, id: LinkId) -> Result<Option<Link>> {
        Ok(self.inner.links.read().get(&id).cloned())
    }

    fn get_links(&self, node: Guid, dir: Direction, label: Option<&str>) -> Result<Vec<Link>> {
        let link_ids = self.inner.adjacency.read().get(&node).cloned().unwrap_or_default();
        let links = self.inner.links.read();

        let mut result = Vec::new();
        for lid in link_ids {
            if let Some(link) = links.get(&lid) {
                // Direction filter
                let matches_dir = match dir {
                    Direction::Outgoing => link.from == node,
                    Direction::Incoming => link.to == node,
                    Direction::Both => true,
                };
                // Label filter
                let matches_label = label.is_none_or(|l| link.label == l);

                if matches_dir && matches_label {
                    result.push(link.clone());
                }
            }
        }

        Ok(result)
    }

    fn set_link_status(&self, id: LinkId, status: Status) -> Result<()> {
        let mut links = self.inner.links.write();
        let link = links.get_mut(&id).ok_or_else(|| Error::NotFound(format!("Link {id}")))?;
        link.status = status;
        Ok(())
    }

    fn remove_link(&self, id: LinkId) -> Result<bool> {
        let removed = self.inner.links.write().remove(&id);
        if let Some(link) = &removed {
            let mut adj = self.inner.adjacency.write();
            if let Some(ids) = adj.get_mut(&link.from) {
                ids.retain(|lid| *lid != id);
            }
            if link.from != link.to {
                if let Some(ids) = adj.get_mut(&link.to) {
                    ids.retain(|lid| *lid != id);
                }
            }
        }
        Ok(removed.is_some())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn guid(n: u128) -> Guid {
        Guid::from_u128(n)
    }

    #[test]
    fn test_create_and_get_node() {
        let db = MemoryGraph::new();
        let id = db
            .create_node(Node::entity(guid(1), "Person").with_property("name", "Ada"))
            .unwrap();

        let node = db.get_node(id).unwrap().unwrap();
        assert_eq!(node.type_name, "Person");
        assert_eq!(node.get("name"), Some(&Value::from("Ada")));
        assert_eq!(db.get_property(id, "name").unwrap(), Some(Value::from("Ada")));
    }

    #[test]
    fn test_duplicate_guid_rejected() {
        let db = MemoryGraph::new();
        db.create_node(Node::entity(guid(1), "Person")).unwrap();
        assert!(db.create_node(Node::entity(guid(1), "Person")).is_err());
    }

    #[test]
    fn test_create_link_requires_endpoints() {
        let db = MemoryGraph::new();
        db.create_node(Node::entity(guid(1), "Person")).unwrap();
        let result = db.create_link(NewLink::reference(guid(1), guid(2), "__Person.manager"));
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_links_by_direction_and_label() {
        let db = MemoryGraph::new();
        for n in 1..=3 {
            db.create_node(Node::entity(guid(n), "Person")).unwrap();
        }
        db.create_link(NewLink::reference(guid(1), guid(2), "__Person.manager")).unwrap();
        db.create_link(NewLink::reference(guid(3), guid(1), "__Person.manager")).unwrap();
        db.create_link(NewLink::reference(guid(1), guid(3), "__Person.friends")).unwrap();

        assert_eq!(db.get_links(guid(1), Direction::Outgoing, None).unwrap().len(), 2);
        assert_eq!(db.get_links(guid(1), Direction::Incoming, None).unwrap().len(), 1);
        let managed = db.get_links(guid(1), Direction::Both, Some("__Person.manager")).unwrap();
        assert_eq!(managed.len(), 2);
    }

    #[test]
    fn test_edge_for_label_skips_deleted() {
        let db = MemoryGraph::new();
        for n in 1..=3 {
            db.create_node(Node::entity(guid(n), "Person")).unwrap();
        }
        let old = db.create_link(NewLink::reference(guid(1), guid(2), "__Person.manager")).unwrap();
        db.set_link_status(old, Status::Deleted).unwrap();
        db.create_link(NewLink::reference(guid(1), guid(3), "__Person.manager")).unwrap();

        let edge = db.get_edge_for_label(guid(1), "__Person.manager").unwrap().unwrap();
        assert_eq!(edge.to, guid(3));
    }

    #[test]
    fn test_remove_node_detaches_links() {
        let db = MemoryGraph::new();
        db.create_node(Node::entity(guid(1), "Person")).unwrap();
        db.create_node(Node::entity(guid(2), "Person")).unwrap();
        db.create_link(NewLink::reference(guid(1), guid(2), "__Person.manager")).unwrap();

        assert!(db.remove_node(guid(2)).unwrap());
        assert_eq!(db.link_count(), 0);
        assert!(db.get_links(guid(1), Direction::Both, None).unwrap().is_empty());

        // Idempotent on already-removed targets
        assert!(!db.remove_node(guid(2)).unwrap());
    }

    #[test]
    fn test_classification_entity_status_only_on_classifications() {
        let db = MemoryGraph::new();
        db.create_node(Node::entity(guid(1), "Table")).unwrap();
        let pii = Node::classification(guid(2), "PII", ClassificationState::new(guid(1)));
        db.create_node(pii).unwrap();

        db.set_classification_entity_status(guid(2), Status::Deleted).unwrap();
        let tag = db.get_node(guid(2)).unwrap().unwrap();
        assert_eq!(tag.classification_state().unwrap().entity_status, Status::Deleted);

        assert!(matches!(
            db.set_classification_entity_status(guid(1), Status::Deleted),
            Err(Error::IllegalState(_))
        ));
    }
}
