//! # Cascading Deletion
//!
//! Deleting an entity deletes everything it owns (composite references),
//! detaches every classification it carries, drops the references other
//! entities hold to it and re-evaluates tag propagation for every
//! relationship that goes away.
//!
//! ```text
//! delete_entities
//!   ├─ owned_closure(root)         → deletion candidates, recorded deleted
//!   └─ per candidate
//!        ├─ delete_all_classifications
//!        └─ delete_type_vertex
//!             ├─ per attribute: delete_edge_reference (cascades into owned nodes)
//!             └─ delete_node_with_incoming_refs
//!                  ├─ relationship links → delete_relationship (+ tag re-evaluation)
//!                  └─ legacy references  → delete_edge_between (cardinality checks)
//! ```
//!
//! Soft vs hard is decided per call from [`UnitOfWork::delete_type`] and
//! [`CoreConfig::soft_delete_enabled`]. Internal entity types are always
//! hard-deleted.

pub mod owned;

use std::collections::HashSet;

use tracing::debug;

pub use owned::{parse_soft_ref, OwnedNode, OwnershipWalker};

use crate::config::CoreConfig;
use crate::model::*;
use crate::ops::GraphOps;
use crate::propagation::PropagationEngine;
use crate::storage::GraphStore;
use crate::types::{
    AttributeDef, AttributeType, RefCategory, RelationshipDirection, TypeKind, TypeRegistry,
};
use crate::uow::UnitOfWork;
use crate::{Error, Result};

/// Cascading delete over the catalog graph.
#[derive(Clone, Copy)]
pub struct DeletionEngine<'a> {
    ops: GraphOps<'a>,
    walker: OwnershipWalker<'a>,
    propagation: PropagationEngine<'a>,
}

impl<'a> DeletionEngine<'a> {
    pub fn new(
        graph: &'a dyn GraphStore,
        registry: &'a TypeRegistry,
        config: &'a CoreConfig,
    ) -> Self {
        let ops = GraphOps::new(graph, registry, config);
        Self {
            ops,
            walker: OwnershipWalker::new(ops),
            propagation: PropagationEngine::with_ops(ops),
        }
    }

    pub fn walker(&self) -> &OwnershipWalker<'a> {
        &self.walker
    }

    pub fn propagation(&self) -> &PropagationEngine<'a> {
        &self.propagation
    }

    // ========================================================================
    // Entities
    // ========================================================================

    /// Delete `roots` and everything they own.
    ///
    /// Roots that are missing, already deleted, or already deleted earlier in
    /// this unit of work are skipped. Every entity of each ownership closure
    /// is recorded in the unit's deleted ledger before anything is touched.
    pub fn delete_entities(
        &self,
        uow: &mut UnitOfWork,
        roots: impl IntoIterator<Item = Guid>,
    ) -> Result<()> {
        let metric = uow.start_metric("deleteEntities");

        let mut candidates = Vec::new();
        let mut seen = HashSet::new();

        for root in roots {
            let Some(node) = self.ops.graph.get_node(root)? else {
                debug!(guid = %root, "skipping delete: entity not found");
                continue;
            };
            if !node.is_active() || uow.is_deleted_entity(root) {
                debug!(guid = %root, "skipping delete: already deleted");
                continue;
            }

            for owned in self.walker.owned_closure(root)? {
                uow.record_entity_delete(owned.header);
                if seen.insert(owned.node.id) {
                    candidates.push(owned.node.id);
                }
            }
        }

        for guid in candidates {
            // A candidate may already be gone through an earlier cascade.
            let Some(node) = self.ops.graph.get_node(guid)? else {
                continue;
            };
            self.delete_all_classifications(uow, &node)?;
            let internal = self.ops.is_internal(&node);
            self.delete_type_vertex(uow, &node, internal)?;
        }

        uow.end_metric(metric);
        Ok(())
    }

    // ========================================================================
    // Relationships
    // ========================================================================

    pub fn delete_relationship(&self, uow: &mut UnitOfWork, link: &Link) -> Result<()> {
        self.delete_relationships(uow, std::slice::from_ref(link), false)
    }

    /// Delete relationship links, re-evaluating tag propagation for each
    /// before it goes. Links between two internal entities are always removed.
    pub fn delete_relationships(
        &self,
        uow: &mut UnitOfWork,
        links: &[Link],
        force: bool,
    ) -> Result<()> {
        for link in links {
            let Some(link) = self.ops.graph.get_link(link.id)? else {
                continue;
            };
            let internal =
                self.ops.is_internal_guid(link.from)? && self.ops.is_internal_guid(link.to)?;
            if !internal && !link.is_active() {
                debug!(link = %link.id, "skipping delete: relationship already deleted");
                continue;
            }

            self.propagation.remove_tag_propagation(uow, &link)?;
            self.ops.delete_link_raw(uow, &link, internal || force)?;
        }
        Ok(())
    }

    // ========================================================================
    // Edge references
    // ========================================================================

    /// Delete one reference held by `vertex`.
    ///
    /// Struct and classification targets and owned entity targets are deleted
    /// along with the link. Plain relationship links only lose the link and
    /// stamp the referenced entity as updated; legacy links also clear the
    /// inverse reference. Returns true when the link was removed rather than
    /// marked deleted.
    pub fn delete_edge_reference(
        &self,
        uow: &mut UnitOfWork,
        link: &Link,
        category: RefCategory,
        is_owned: bool,
        force_struct_or_classification: bool,
        direction: RelationshipDirection,
        vertex: &Node,
    ) -> Result<bool> {
        let internal = self.ops.is_internal(vertex);
        let force = matches!(category, RefCategory::Struct | RefCategory::Classification)
            && (force_struct_or_classification || internal);

        debug!(
            link = %link.id,
            label = %link.label,
            ?category,
            is_owned,
            internal,
            force,
            "deleting edge reference"
        );

        let cascades = match category {
            RefCategory::Struct | RefCategory::Classification => true,
            RefCategory::ObjectId => is_owned,
        };

        if cascades {
            // Target goes away too, so the inverse side needs no update.
            self.delete_link(uow, link, false, force)?;
            self.delete_type_node(uow, link.to, force)?;
        } else if link.is_relationship() {
            self.ops.delete_link_raw(uow, link, internal)?;
            let referenced = match direction {
                RelationshipDirection::Out => Some(link.to),
                RelationshipDirection::In => Some(link.from),
                RelationshipDirection::Both => link.other_end(vertex.id),
            };
            if let Some(referenced) = referenced {
                self.ops.record_update_once(uow, referenced)?;
            }
        } else {
            self.delete_link(uow, link, true, internal)?;
        }

        Ok(!self.ops.is_soft(uow) || force)
    }

    /// Delete the single outgoing `label` link of `node`, if any.
    pub fn delete_edge_reference_by_label(
        &self,
        uow: &mut UnitOfWork,
        node: &Node,
        label: &str,
        category: RefCategory,
        is_owned: bool,
    ) -> Result<bool> {
        match self.ops.graph.get_edge_for_label(node.id, label)? {
            Some(link) => self.delete_edge_reference(
                uow,
                &link,
                category,
                is_owned,
                false,
                RelationshipDirection::Out,
                node,
            ),
            None => Ok(false),
        }
    }

    /// Delete a link, optionally clearing the inverse attribute on the
    /// other end first. A direct classification link also marks its
    /// classification's associated entity as deleted.
    fn delete_link(
        &self,
        uow: &mut UnitOfWork,
        link: &Link,
        update_inverse: bool,
        force: bool,
    ) -> Result<()> {
        if update_inverse {
            if let Some(inverse) = self.inverse_attribute(link)? {
                self.delete_edge_between(uow, link.to, link.from, inverse)?;
            }
        }

        if link.is_classification_edge() {
            self.ops.graph.set_classification_entity_status(link.to, Status::Deleted)?;
        }

        self.ops.delete_link_raw(uow, link, force)
    }

    /// Attribute on the target type that mirrors the attribute stored in `link`.
    fn inverse_attribute(&self, link: &Link) -> Result<Option<&'a AttributeDef>> {
        let Some(label) = EdgeLabel::parse(&link.label) else {
            return Ok(None);
        };
        let registry = self.ops.registry;
        let parent = registry.get_type(&label.type_name)?;
        if parent.kind != TypeKind::Entity {
            return Ok(None);
        }
        let Some(attribute) = registry.attribute(&parent.name, &label.attribute_name)? else {
            return Ok(None);
        };
        let (Some(inverse), Some(target_type)) =
            (&attribute.inverse_ref, attribute.attr_type.referenced_type())
        else {
            return Ok(None);
        };
        registry.attribute(target_type, inverse)
    }

    /// Delete the node behind a cascading reference according to its kind.
    fn delete_type_node(&self, uow: &mut UnitOfWork, guid: Guid, force: bool) -> Result<()> {
        let Some(node) = self.ops.graph.get_node(guid)? else {
            return Ok(());
        };
        match node.kind {
            NodeKind::Struct => self.delete_type_vertex(uow, &node, force),
            NodeKind::Classification(_) => {
                self.ops.delete_classification_node(uow, &node, force).map(|_| ())
            }
            NodeKind::Entity => self.delete_entities(uow, [node.id]),
        }
    }

    // ========================================================================
    // Vertices
    // ========================================================================

    /// Delete every reference held in `node`'s attributes, the references
    /// others hold to it, then the node itself.
    pub fn delete_type_vertex(&self, uow: &mut UnitOfWork, node: &Node, force: bool) -> Result<()> {
        debug!(guid = %node.id, type_name = %node.type_name, force, "deleting vertex");

        let registry = self.ops.registry;
        for (owner, attr) in registry.all_attributes_with_owner(&node.type_name)? {
            let is_owned = node.is_entity() && attr.is_owned_ref();
            let label = attr.relationship_edge_label(owner);

            match &attr.attr_type {
                AttributeType::ObjectId(_) => {
                    let category = RefCategory::ObjectId;
                    self.delete_edge_reference_by_label(uow, node, &label, category, is_owned)?;
                }
                AttributeType::Struct(_) => {
                    let category = RefCategory::Struct;
                    self.delete_edge_reference_by_label(uow, node, &label, category, false)?;
                }
                AttributeType::Array(element) | AttributeType::Map(element) => {
                    let Some(category) = element.ref_category() else {
                        continue;
                    };
                    let links: Vec<Link> = self
                        .ops
                        .graph
                        .get_links(node.id, link_direction(attr.direction), Some(&label))?
                        .into_iter()
                        .filter(Link::is_active)
                        .collect();
                    for link in &links {
                        self.delete_edge_reference(
                            uow,
                            link,
                            category,
                            is_owned,
                            false,
                            attr.direction,
                            node,
                        )?;
                    }
                }
                AttributeType::Primitive => {
                    if let Some(key) = attr.unique_property_name(owner) {
                        self.ops.graph.remove_property(node.id, &key)?;
                    }
                }
            }
        }

        self.delete_node_with_incoming_refs(uow, node, force)
    }

    /// Drop every active reference pointing at `node`, then delete it.
    fn delete_node_with_incoming_refs(
        &self,
        uow: &mut UnitOfWork,
        node: &Node,
        force: bool,
    ) -> Result<()> {
        let incoming = self.ops.graph.get_links(node.id, Direction::Incoming, None)?;

        for link in incoming {
            // Earlier steps may already have removed or deleted it.
            let Some(link) = self.ops.graph.get_link(link.id)? else {
                continue;
            };
            if !link.is_active() {
                continue;
            }

            if link.is_relationship() {
                self.delete_relationship(uow, &link)?;
                continue;
            }

            let Some(label) = EdgeLabel::parse(&link.label) else {
                continue;
            };
            let attribute = self
                .ops
                .registry
                .attribute(&label.type_name, &label.attribute_name)?
                .ok_or_else(|| {
                    Error::IllegalState(format!(
                        "no attribute {} on type {} for link {}",
                        label.attribute_name, label.type_name, link.id
                    ))
                })?;
            self.delete_edge_between(uow, link.from, link.to, attribute)?;
        }

        self.ops.delete_node_raw(uow, node, force)
    }

    /// Remove the `attribute` reference from `out` to `target`.
    ///
    /// Fails rather than leave a required reference unset or a required
    /// array/map below its minimum size. The size check counts every link
    /// under the attribute's label, deleted ones included.
    pub fn delete_edge_between(
        &self,
        uow: &mut UnitOfWork,
        out: Guid,
        target: Guid,
        attribute: &AttributeDef,
    ) -> Result<()> {
        let Some(out_node) = self.ops.graph.get_node(out)? else {
            return Ok(());
        };
        if !out_node.is_active() || uow.is_deleted_entity(out) {
            return Ok(());
        }

        let label = self.ops.registry.relationship_edge_label(&out_node.type_name, attribute)?;

        let edge = match &attribute.attr_type {
            AttributeType::ObjectId(_) => {
                if !attribute.is_optional {
                    return Err(Error::RequiredAttributeViolation {
                        guid: out,
                        attribute: attribute.name.clone(),
                        label,
                    });
                }
                let edge = self.ops.graph.get_edge_for_label(out, &label)?;
                if self.ops.config.update_inverse_references {
                    self.ops.graph.set_property(out, &attribute.name, Value::Null)?;
                }
                edge
            }
            AttributeType::Array(_) | AttributeType::Map(_) => {
                let container = match attribute.attr_type {
                    AttributeType::Array(_) => "array",
                    _ => "map",
                };
                let all = self.ops.graph.get_links(out, Direction::Outgoing, Some(&label))?;
                let count = all.len();
                // Any element edge to the target qualifies; an active one wins.
                let edge = all
                    .iter()
                    .find(|l| l.to == target && l.is_active())
                    .or_else(|| all.iter().find(|l| l.to == target))
                    .cloned();
                if edge.is_some() && !attribute.is_optional && count <= attribute.min_count {
                    return Err(Error::CardinalityViolation {
                        guid: out,
                        attribute: attribute.name.clone(),
                        container,
                        count,
                        min_count: attribute.min_count,
                    });
                }
                edge
            }
            AttributeType::Struct(_) => None,
            AttributeType::Primitive => {
                return Err(Error::IllegalState(format!(
                    "primitive attribute {} of {} cannot hold a reference",
                    attribute.name, out_node.type_name
                )));
            }
        };

        if let Some(edge) = edge {
            let internal = self.ops.is_internal(&out_node) && self.ops.is_internal_guid(target)?;
            self.ops.delete_link_raw(uow, &edge, internal)?;
            self.ops.record_update_once(uow, out)?;
        }
        Ok(())
    }

    // ========================================================================
    // Classifications
    // ========================================================================

    /// Detach every classification from `node`. Direct classifications that
    /// ask for it lose their propagated copies first.
    pub fn delete_all_classifications(&self, uow: &mut UnitOfWork, node: &Node) -> Result<()> {
        for link in self.ops.classification_links(node.id)? {
            if link.is_classification_edge() {
                if let Some(cnode) = self.ops.graph.get_node(link.to)? {
                    if cnode.classification_state().is_some_and(|s| s.remove_propagations) {
                        self.propagation.remove_all_propagations(uow, &cnode)?;
                    }
                }
            }
            self.delete_edge_reference(
                uow,
                &link,
                RefCategory::Classification,
                false,
                false,
                RelationshipDirection::Out,
                node,
            )?;
        }
        Ok(())
    }
}

fn link_direction(direction: RelationshipDirection) -> Direction {
    match direction {
        RelationshipDirection::Out => Direction::Outgoing,
        RelationshipDirection::In => Direction::Incoming,
        RelationshipDirection::Both => Direction::Both,
    }
}
