//! Ownership closure: every node whose lifecycle is controlled by a root.

use std::collections::HashSet;

use tracing::debug;

use crate::model::{Direction, EntityHeader, Guid, Link, Node, Value};
use crate::ops::GraphOps;
use crate::types::{AttributeDef, AttributeType};
use crate::{Error, Result};

/// One node discovered by the walk, with the header recorded for it.
#[derive(Debug, Clone, PartialEq)]
pub struct OwnedNode {
    pub header: EntityHeader,
    pub node: Node,
}

/// Walks owned (composite) reference attributes from a root entity.
#[derive(Clone, Copy)]
pub struct OwnershipWalker<'a> {
    ops: GraphOps<'a>,
}

impl<'a> OwnershipWalker<'a> {
    pub(crate) fn new(ops: GraphOps<'a>) -> Self {
        Self { ops }
    }

    /// Transitive closure of entities owned by `root`, root included.
    ///
    /// Deleted nodes are skipped and each guid is reported once, so cyclic
    /// and diamond-shaped ownership terminate. Result order is discovery order.
    pub fn owned_closure(&self, root: Guid) -> Result<Vec<OwnedNode>> {
        let mut out = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![root];

        while let Some(guid) = stack.pop() {
            let Some(node) = self.ops.graph.get_node(guid)? else {
                continue;
            };
            if !node.is_active() || !visited.insert(guid) {
                continue;
            }

            let entity_type = self.ops.registry.require_entity_type(&node.type_name)?;
            let header = self.ops.entity_header(&node);

            for attr in self.ops.registry.owned_ref_attributes(&entity_type.name)? {
                if attr.soft_reference {
                    stack.extend(self.soft_referenced(&node, attr)?);
                } else {
                    let label = self.ops.registry.relationship_edge_label(&entity_type.name, attr)?;
                    stack.extend(self.hard_referenced(&node, attr, &label)?);
                }
            }

            out.push(OwnedNode { header, node });
        }

        debug!(root = %root, owned = out.len(), "computed owned closure");
        Ok(out)
    }

    /// Soft references are `type:guid` strings held in the attribute's property.
    fn soft_referenced(&self, node: &Node, attr: &AttributeDef) -> Result<Vec<Guid>> {
        let refs: Vec<&str> = match (&attr.attr_type, node.get(&attr.name)) {
            (AttributeType::ObjectId(_), Some(Value::String(s))) => vec![s.as_str()],
            (AttributeType::Array(_), Some(Value::List(items))) => {
                items.iter().filter_map(Value::as_str).collect()
            }
            (AttributeType::Map(_), Some(Value::Map(entries))) => {
                entries.values().filter_map(Value::as_str).collect()
            }
            _ => Vec::new(),
        };

        let mut found = Vec::new();
        for soft_ref in refs {
            let Some(guid) = parse_soft_ref(soft_ref) else {
                debug!(
                    guid = %node.id,
                    attribute = %attr.name,
                    value = soft_ref,
                    "unparseable soft reference"
                );
                continue;
            };
            if self.ops.graph.find_by_guid(guid)?.is_some() {
                found.push(guid);
            }
        }
        Ok(found)
    }

    fn hard_referenced(&self, node: &Node, attr: &AttributeDef, label: &str) -> Result<Vec<Guid>> {
        match attr.attr_type {
            AttributeType::ObjectId(_) => Ok(self
                .ops
                .graph
                .get_edge_for_label(node.id, label)?
                .map(|edge| edge.to)
                .into_iter()
                .collect()),
            AttributeType::Array(_) | AttributeType::Map(_) => Ok(self
                .ops
                .graph
                .get_links(node.id, Direction::Outgoing, Some(label))?
                .into_iter()
                .filter(Link::is_active)
                .map(|edge| edge.to)
                .collect()),
            AttributeType::Primitive | AttributeType::Struct(_) => Err(Error::IllegalState(format!(
                "attribute {} of {} is not an owned object reference",
                attr.name, node.type_name
            ))),
        }
    }
}

/// Parse a `type_name:guid` soft reference.
pub fn parse_soft_ref(value: &str) -> Option<Guid> {
    let (type_name, guid) = value.split_once(':')?;
    if type_name.is_empty() {
        return None;
    }
    guid.parse().ok()
}
