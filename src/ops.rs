//! Low-level graph operations shared by the deletion and propagation engines:
//! the soft/hard delete primitives, modification stamping, denormalized trait
//! names and the projections recorded into the unit of work.

use tracing::debug;

use crate::config::CoreConfig;
use crate::model::*;
use crate::storage::GraphStore;
use crate::types::TypeRegistry;
use crate::uow::UnitOfWork;
use crate::Result;

#[derive(Clone, Copy)]
pub(crate) struct GraphOps<'a> {
    pub graph: &'a dyn GraphStore,
    pub registry: &'a TypeRegistry,
    pub config: &'a CoreConfig,
}

impl<'a> GraphOps<'a> {
    pub fn new(
        graph: &'a dyn GraphStore,
        registry: &'a TypeRegistry,
        config: &'a CoreConfig,
    ) -> Self {
        Self { graph, registry, config }
    }

    /// Effective soft-delete policy for this operation.
    pub fn is_soft(&self, uow: &UnitOfWork) -> bool {
        uow.delete_type.is_soft(self.config.soft_delete_enabled)
    }

    pub fn is_internal(&self, node: &Node) -> bool {
        self.registry.is_internal(&node.type_name)
    }

    pub fn is_internal_guid(&self, guid: Guid) -> Result<bool> {
        Ok(self.graph.get_node(guid)?.is_some_and(|n| self.is_internal(&n)))
    }

    // ========================================================================
    // Delete primitives
    // ========================================================================

    /// Remove the node, or mark it Deleted under the soft policy.
    pub fn delete_node_raw(&self, uow: &UnitOfWork, node: &Node, force: bool) -> Result<()> {
        if force || !self.is_soft(uow) {
            debug!(guid = %node.id, type_name = %node.type_name, "removing node");
            self.graph.remove_node(node.id)?;
        } else {
            debug!(guid = %node.id, type_name = %node.type_name, "marking node deleted");
            self.graph.set_node_status(node.id, Status::Deleted)?;
            self.update_modification_metadata(uow, node.id)?;
        }
        Ok(())
    }

    /// Remove the link, or mark it Deleted under the soft policy.
    pub fn delete_link_raw(&self, uow: &UnitOfWork, link: &Link, force: bool) -> Result<()> {
        if force || !self.is_soft(uow) {
            debug!(link = %link.id, label = %link.label, "removing link");
            self.graph.remove_link(link.id)?;
        } else {
            debug!(link = %link.id, label = %link.label, "marking link deleted");
            self.graph.set_link_status(link.id, Status::Deleted)?;
        }
        Ok(())
    }

    /// Delete a classification node once nothing (direct or propagated, of
    /// any status) links to it any more.
    pub fn delete_classification_node(
        &self,
        uow: &UnitOfWork,
        cnode: &Node,
        force: bool,
    ) -> Result<bool> {
        let incoming = self
            .graph
            .get_links(cnode.id, Direction::Incoming, Some(CLASSIFICATION_LABEL))?;
        if !incoming.is_empty() {
            debug!(guid = %cnode.id, remaining = incoming.len(), "classification still referenced");
            return Ok(false);
        }
        self.delete_node_raw(uow, cnode, force)?;
        Ok(true)
    }

    // ========================================================================
    // Modification metadata
    // ========================================================================

    pub fn update_modification_metadata(&self, uow: &UnitOfWork, guid: Guid) -> Result<()> {
        self.graph
            .set_property(guid, MODIFICATION_TIMESTAMP_KEY, Value::DateTime(uow.request_time()))?;
        self.graph
            .set_property(guid, MODIFIED_BY_KEY, Value::from(uow.user_name()))
    }

    /// Stamp `guid` and record it updated, once per node per operation.
    pub fn record_update_once(&self, uow: &mut UnitOfWork, guid: Guid) -> Result<()> {
        if uow.is_updated_entity(guid) {
            return Ok(());
        }
        if self.graph.get_node(guid)?.is_none() {
            return Ok(());
        }
        self.update_modification_metadata(uow, guid)?;
        if let Some(node) = self.graph.get_node(guid)? {
            uow.record_entity_update(self.entity_header(&node));
        }
        Ok(())
    }

    // ========================================================================
    // Denormalized propagated trait names
    // ========================================================================

    pub fn add_propagated_trait_name(&self, guid: Guid, name: &str) -> Result<()> {
        let mut names = self.string_list(guid, PROPAGATED_TRAIT_NAMES_KEY)?;
        names.push(name.to_string());
        self.graph.set_property(guid, PROPAGATED_TRAIT_NAMES_KEY, Value::from(names))
    }

    /// Drops one occurrence of `name`; the same classification may reach an
    /// entity through several propagated copies.
    pub fn remove_propagated_trait_name(&self, guid: Guid, name: &str) -> Result<()> {
        let mut names = self.string_list(guid, PROPAGATED_TRAIT_NAMES_KEY)?;
        if let Some(pos) = names.iter().position(|n| n == name) {
            names.remove(pos);
        }
        if names.is_empty() {
            self.graph.remove_property(guid, PROPAGATED_TRAIT_NAMES_KEY)
        } else {
            self.graph.set_property(guid, PROPAGATED_TRAIT_NAMES_KEY, Value::from(names))
        }
    }

    fn string_list(&self, guid: Guid, key: &str) -> Result<Vec<String>> {
        Ok(self.graph.get_node(guid)?.map(|n| n.string_list(key)).unwrap_or_default())
    }

    // ========================================================================
    // Classification links
    // ========================================================================

    /// Active classification links (direct and propagated) leaving `entity`.
    pub fn classification_links(&self, entity: Guid) -> Result<Vec<Link>> {
        Ok(self
            .graph
            .get_links(entity, Direction::Outgoing, Some(CLASSIFICATION_LABEL))?
            .into_iter()
            .filter(Link::is_active)
            .collect())
    }

    pub fn direct_classification_edge(&self, entity: Guid, cnode: Guid) -> Result<Option<Link>> {
        Ok(self
            .classification_links(entity)?
            .into_iter()
            .find(|l| l.to == cnode && l.is_classification_edge()))
    }

    pub fn propagated_classification_edge(
        &self,
        entity: Guid,
        cnode: Guid,
    ) -> Result<Option<Link>> {
        Ok(self
            .classification_links(entity)?
            .into_iter()
            .find(|l| l.to == cnode && l.is_propagated()))
    }

    // ========================================================================
    // Projections
    // ========================================================================

    /// Header: unique attributes plus `name`, and direct trait names.
    pub fn entity_header(&self, node: &Node) -> EntityHeader {
        let mut header =
            EntityHeader::new(node.id, node.type_name.clone()).with_status(node.status);

        let unique: Vec<String> = self
            .registry
            .all_attributes(&node.type_name)
            .map(|attrs| {
                attrs.into_iter().filter(|a| a.is_unique).map(|a| a.name.clone()).collect()
            })
            .unwrap_or_default();

        for key in unique.iter().map(String::as_str).chain(std::iter::once("name")) {
            if let Some(value) = node.get(key).filter(|v| !v.is_null()) {
                header.attributes.insert(key.to_string(), value.clone());
            }
        }
        header.classification_names = node.string_list(TRAIT_NAMES_KEY);
        header
    }

    pub fn classification(&self, cnode: &Node) -> Option<Classification> {
        let state = cnode.classification_state()?;
        Some(Classification {
            type_name: cnode.type_name.clone(),
            entity_guid: state.associated_entity,
            entity_status: state.entity_status,
            propagate: state.propagate,
            remove_propagations: state.remove_propagations,
            attributes: user_attributes(&cnode.properties),
        })
    }

    /// Full typed entity with every active classification (direct and propagated).
    pub fn entity(&self, node: &Node) -> Result<Entity> {
        let mut classifications = Vec::new();
        for link in self.classification_links(node.id)? {
            if let Some(cnode) = self.graph.get_node(link.to)? {
                classifications.extend(self.classification(&cnode));
            }
        }
        Ok(Entity {
            guid: node.id,
            type_name: node.type_name.clone(),
            status: node.status,
            attributes: user_attributes(&node.properties),
            classifications,
        })
    }

    pub fn referenceable(&self, node: &Node) -> Referenceable {
        let mut trait_names = node.string_list(TRAIT_NAMES_KEY);
        trait_names.extend(node.string_list(PROPAGATED_TRAIT_NAMES_KEY));
        Referenceable {
            guid: node.id,
            type_name: node.type_name.clone(),
            values: user_attributes(&node.properties),
            trait_names,
        }
    }
}

fn user_attributes(properties: &PropertyMap) -> PropertyMap {
    properties
        .iter()
        .filter(|(k, _)| !is_system_key(k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryGraph;
    use crate::types::{AttributeDef, TypeDef};
    use crate::uow::{ActiveUnits, DeleteType};

    fn registry() -> TypeRegistry {
        let qualified_name = AttributeDef::primitive("qualifiedName").unique();
        TypeRegistry::new().with_type(TypeDef::entity("Table").with_attribute(qualified_name))
    }

    #[test]
    fn test_header_projects_unique_and_name() {
        let graph = MemoryGraph::new();
        let registry = registry();
        let config = CoreConfig::default();
        let ops = GraphOps::new(&graph, &registry, &config);

        let node = Node::entity(Guid::from_u128(1), "Table")
            .with_property("qualifiedName", "db.orders")
            .with_property("name", "orders")
            .with_property("owner", "etl");
        let header = ops.entity_header(&node);

        assert_eq!(header.attributes.len(), 2);
        assert_eq!(header.attributes.get("qualifiedName"), Some(&Value::from("db.orders")));
        assert!(!header.attributes.contains_key("owner"));
    }

    #[test]
    fn test_soft_and_hard_node_delete() {
        let graph = MemoryGraph::new();
        let registry = registry();
        let config = CoreConfig::default();
        let ops = GraphOps::new(&graph, &registry, &config);
        let units = ActiveUnits::new();

        let soft = Node::entity(Guid::from_u128(1), "Table");
        let hard = Node::entity(Guid::from_u128(2), "Table");
        graph.create_node(soft.clone()).unwrap();
        graph.create_node(hard.clone()).unwrap();

        let uow = UnitOfWork::begin(&units).with_user("admin", Vec::new());
        ops.delete_node_raw(&uow, &soft, false).unwrap();
        let stored = graph.get_node(soft.id).unwrap().unwrap();
        assert_eq!(stored.status, Status::Deleted);
        assert_eq!(stored.get(MODIFIED_BY_KEY), Some(&Value::from("admin")));

        let uow = uow.with_delete_type(DeleteType::Hard);
        ops.delete_node_raw(&uow, &hard, false).unwrap();
        assert!(graph.get_node(hard.id).unwrap().is_none());
    }

    #[test]
    fn test_propagated_trait_names_remove_one_occurrence() {
        let graph = MemoryGraph::new();
        let registry = registry();
        let config = CoreConfig::default();
        let ops = GraphOps::new(&graph, &registry, &config);
        let g = Guid::from_u128(1);
        graph.create_node(Node::entity(g, "Table")).unwrap();

        ops.add_propagated_trait_name(g, "PII").unwrap();
        ops.add_propagated_trait_name(g, "PII").unwrap();
        ops.remove_propagated_trait_name(g, "PII").unwrap();
        let node = graph.get_node(g).unwrap().unwrap();
        assert_eq!(node.string_list(PROPAGATED_TRAIT_NAMES_KEY), vec!["PII".to_string()]);

        ops.remove_propagated_trait_name(g, "PII").unwrap();
        assert!(graph.get_property(g, PROPAGATED_TRAIT_NAMES_KEY).unwrap().is_none());
    }
}
