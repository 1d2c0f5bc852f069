//! # Tag Propagation
//!
//! Classifications flow from the entity they are attached to across
//! relationships whose type allows it (`PropagateTags`). Each propagated copy
//! is a `PropagatedClassification` link from the reached entity to the same
//! classification node, plus the classification name in the entity's
//! `__propagatedTraitNames`.
//!
//! Every add/remove works over a reachable set computed up front, never a
//! live recursive walk. Propagated links are deduplicated per
//! (target, classification) before creation, so graph cycles cannot cause
//! unbounded propagation.

use std::collections::{HashSet, VecDeque};

use tracing::debug;

use crate::config::CoreConfig;
use crate::model::*;
use crate::ops::GraphOps;
use crate::storage::GraphStore;
use crate::types::TypeRegistry;
use crate::uow::UnitOfWork;
use crate::{Error, Result};

/// Relationship type linking glossary terms to the entities they describe.
/// Removing such a link always removes the propagations it carried.
pub const TERM_ASSIGNMENT_RELATIONSHIP: &str = "AtlasGlossarySemanticAssignment";

#[derive(Clone, Copy)]
pub struct PropagationEngine<'a> {
    ops: GraphOps<'a>,
}

impl<'a> PropagationEngine<'a> {
    pub fn new(
        graph: &'a dyn GraphStore,
        registry: &'a TypeRegistry,
        config: &'a CoreConfig,
    ) -> Self {
        Self::with_ops(GraphOps::new(graph, registry, config))
    }

    pub(crate) fn with_ops(ops: GraphOps<'a>) -> Self {
        Self { ops }
    }

    // ========================================================================
    // Reachability
    // ========================================================================

    /// Propagation policy of a relationship link; `None` for plain
    /// references and unregistered relationship types.
    pub fn link_policy(&self, link: &Link) -> PropagateTags {
        link.relationship_type
            .as_deref()
            .and_then(|t| self.ops.registry.relationship(t).ok())
            .map_or(PropagateTags::None, |def| def.propagate_tags)
    }

    /// Active entities reachable from `start` over active relationship links
    /// whose policy lets tags flow in the traversal direction. Links of
    /// relationship `exclude` are not followed. `start` is not included.
    pub fn impacted_entities(&self, start: Guid, exclude: Option<Guid>) -> Result<Vec<Guid>> {
        self.reachable(start, exclude, false)
    }

    /// Same as [`impacted_entities`](Self::impacted_entities) with `start`
    /// itself first in the result.
    pub fn included_impacted_entities(
        &self,
        start: Guid,
        exclude: Option<Guid>,
    ) -> Result<Vec<Guid>> {
        self.reachable(start, exclude, true)
    }

    fn reachable(
        &self,
        start: Guid,
        exclude: Option<Guid>,
        include_start: bool,
    ) -> Result<Vec<Guid>> {
        let mut out = Vec::new();
        if include_start && self.is_active_entity(start)? {
            out.push(start);
        }

        let mut visited = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);

        while let Some(current) = queue.pop_front() {
            for link in self.ops.graph.get_links(current, Direction::Both, None)? {
                if !link.is_active() || !link.is_relationship() {
                    continue;
                }
                if exclude.is_some() && link.relationship_id == exclude {
                    continue;
                }
                let policy = self.link_policy(&link);
                let next = if link.from == current && policy.flows_one_to_two() {
                    link.to
                } else if link.to == current && policy.flows_two_to_one() {
                    link.from
                } else {
                    continue;
                };
                if !visited.insert(next) {
                    continue;
                }
                if self.is_active_entity(next)? {
                    out.push(next);
                    queue.push_back(next);
                }
            }
        }

        Ok(out)
    }

    fn is_active_entity(&self, guid: Guid) -> Result<bool> {
        Ok(self.ops.graph.get_node(guid)?.is_some_and(|n| n.is_entity() && n.is_active()))
    }

    /// Classification nodes on `entity` (direct or propagated) that are
    /// flagged to propagate, each once.
    pub fn propagation_enabled_classifications(&self, entity: Guid) -> Result<Vec<Node>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for link in self.ops.classification_links(entity)? {
            if !seen.insert(link.to) {
                continue;
            }
            if let Some(cnode) = self.ops.graph.get_node(link.to)? {
                if cnode.classification_state().is_some_and(|s| s.propagate) {
                    out.push(cnode);
                }
            }
        }
        Ok(out)
    }

    // ========================================================================
    // Add
    // ========================================================================

    /// Propagate classifications across a relationship link according to `policy`.
    pub fn add_tag_propagation(
        &self,
        uow: &mut UnitOfWork,
        link: &Link,
        policy: PropagateTags,
    ) -> Result<()> {
        if policy.flows_one_to_two() {
            self.propagate_across(uow, link.from, link.to, link)?;
        }
        if policy.flows_two_to_one() {
            self.propagate_across(uow, link.to, link.from, link)?;
        }
        Ok(())
    }

    fn propagate_across(
        &self,
        uow: &mut UnitOfWork,
        from: Guid,
        to: Guid,
        link: &Link,
    ) -> Result<()> {
        let classifications = self.propagation_enabled_classifications(from)?;
        if classifications.is_empty() {
            return Ok(());
        }
        let targets = self.included_impacted_entities(to, link.relationship_id)?;
        if targets.is_empty() {
            return Ok(());
        }

        debug!(
            from = %from,
            classifications = classifications.len(),
            targets = targets.len(),
            "propagating tags"
        );
        for cnode in &classifications {
            self.add_tag_propagation_to(uow, cnode, &targets)?;
        }
        Ok(())
    }

    /// Propagate one classification to `targets`. Targets already carrying it
    /// (directly or propagated) and targets whose type it cannot apply to are
    /// skipped. Returns the targets that received a new propagated link.
    pub fn add_tag_propagation_to(
        &self,
        uow: &mut UnitOfWork,
        cnode: &Node,
        targets: &[Guid],
    ) -> Result<Vec<Guid>> {
        let classification = self.classification_of(cnode)?;
        let classification_type = self.ops.registry.classification_type(&cnode.type_name)?;
        let mut added = Vec::new();

        for &target in targets {
            if self.ops.direct_classification_edge(target, cnode.id)?.is_some() {
                debug!(
                    target = %target,
                    classification = %cnode.type_name,
                    "classification edge already exists"
                );
                continue;
            }
            if self.ops.propagated_classification_edge(target, cnode.id)?.is_some() {
                debug!(
                    target = %target,
                    classification = %cnode.type_name,
                    "propagated classification edge already exists"
                );
                continue;
            }
            let Some(node) = self.ops.graph.get_node(target)? else {
                continue;
            };
            let entity_type = self.ops.registry.require_entity_type(&node.type_name)?;
            if !self.ops.registry.can_apply_to_entity_type(classification_type, &entity_type.name) {
                debug!(
                    target = %target,
                    classification = %cnode.type_name,
                    "classification not applicable to entity type"
                );
                continue;
            }

            debug!(
                target = %target,
                classification = %cnode.type_name,
                "adding propagated classification"
            );
            let edge =
                NewLink::propagated_classification(target, cnode.id, cnode.type_name.clone());
            self.ops.graph.create_link(edge)?;
            self.ops.add_propagated_trait_name(target, &cnode.type_name)?;
            uow.record_added_propagation(target, classification.clone());
            added.push(target);
        }

        Ok(added)
    }

    // ========================================================================
    // Remove
    // ========================================================================

    /// Re-evaluate propagation for a relationship link that is about to go
    /// away. For each classification propagating across it, entities reachable
    /// from the classification's own entity before but not after dropping the
    /// link lose their propagated copy, when the link is a term assignment or
    /// the classification asks for removal.
    pub fn remove_tag_propagation(&self, uow: &mut UnitOfWork, link: &Link) -> Result<()> {
        if !link.is_relationship() {
            return Ok(());
        }

        let policy = self.link_policy(link);
        let mut classifications = Vec::new();
        if policy.flows_one_to_two() {
            classifications.extend(self.propagation_enabled_classifications(link.from)?);
        }
        if policy.flows_two_to_one() {
            classifications.extend(self.propagation_enabled_classifications(link.to)?);
        }
        let mut seen = HashSet::new();
        classifications.retain(|c| seen.insert(c.id));

        let is_term_edge = link.relationship_type.as_deref() == Some(TERM_ASSIGNMENT_RELATIONSHIP);

        for cnode in &classifications {
            let Some(state) = cnode.classification_state() else {
                continue;
            };
            let associated = state.associated_entity;
            let before = self.impacted_entities(associated, None)?;
            let after: HashSet<Guid> = self
                .impacted_entities(associated, link.relationship_id)?
                .into_iter()
                .collect();

            // Still reachable through another path, or the classification's own entity.
            let removed: Vec<Guid> = before
                .into_iter()
                .filter(|g| *g != associated && !after.contains(g))
                .collect();
            if removed.is_empty() {
                continue;
            }

            if is_term_edge || state.remove_propagations {
                self.remove_tag_propagation_from(uow, cnode, &removed)?;
            } else {
                debug!(
                    classification = %cnode.type_name,
                    entities = removed.len(),
                    "keeping propagations: removal not requested"
                );
            }
        }
        Ok(())
    }

    /// Drop the propagated copies of `cnode` on `entities`.
    pub fn remove_tag_propagation_from(
        &self,
        uow: &mut UnitOfWork,
        cnode: &Node,
        entities: &[Guid],
    ) -> Result<()> {
        let classification = self.classification_of(cnode)?;
        for &entity in entities {
            if let Some(edge) = self.ops.propagated_classification_edge(entity, cnode.id)? {
                self.delete_propagated_edge(uow, &edge)?;
                uow.record_removed_propagation(entity, classification.clone());
            }
        }
        Ok(())
    }

    /// Undo what [`add_tag_propagation`](Self::add_tag_propagation) did for
    /// `link` under `policy`, sparing entities still reachable from each
    /// classification's own entity without the link.
    pub fn remove_tag_propagation_for_policy(
        &self,
        uow: &mut UnitOfWork,
        link: &Link,
        policy: PropagateTags,
    ) -> Result<()> {
        if policy.flows_one_to_two() {
            self.unpropagate_across(uow, link.from, link.to, link)?;
        }
        if policy.flows_two_to_one() {
            self.unpropagate_across(uow, link.to, link.from, link)?;
        }
        Ok(())
    }

    fn unpropagate_across(
        &self,
        uow: &mut UnitOfWork,
        from: Guid,
        to: Guid,
        link: &Link,
    ) -> Result<()> {
        let classifications = self.propagation_enabled_classifications(from)?;
        if classifications.is_empty() {
            return Ok(());
        }
        let impacted = self.included_impacted_entities(to, link.relationship_id)?;

        for cnode in &classifications {
            let Some(state) = cnode.classification_state() else {
                continue;
            };
            let referrals: HashSet<Guid> = self
                .included_impacted_entities(state.associated_entity, link.relationship_id)?
                .into_iter()
                .collect();
            let classification = self.classification_of(cnode)?;

            for &entity in &impacted {
                if referrals.contains(&entity) {
                    if entity == state.associated_entity {
                        debug!(
                            entity = %entity,
                            classification = %cnode.type_name,
                            "not removing: entity owns the classification"
                        );
                    } else {
                        debug!(
                            entity = %entity,
                            classification = %cnode.type_name,
                            "not removing: propagated through another path"
                        );
                    }
                    continue;
                }
                if let Some(edge) = self.ops.propagated_classification_edge(entity, cnode.id)? {
                    self.delete_propagated_edge(uow, &edge)?;
                    uow.record_removed_propagation(entity, classification.clone());
                }
            }
        }
        Ok(())
    }

    /// Remove every propagated copy of `cnode`. Returns the entities that lost it.
    pub fn remove_all_propagations(&self, uow: &mut UnitOfWork, cnode: &Node) -> Result<Vec<Guid>> {
        let classification = self.classification_of(cnode)?;
        let propagated: Vec<Link> = self
            .ops
            .graph
            .get_links(cnode.id, Direction::Incoming, Some(CLASSIFICATION_LABEL))?
            .into_iter()
            .filter(|l| l.is_active() && l.is_propagated())
            .collect();

        let mut entities = Vec::with_capacity(propagated.len());
        for edge in &propagated {
            uow.record_removed_propagation(edge.from, classification.clone());
            self.delete_propagated_edge(uow, edge)?;
            entities.push(edge.from);
        }
        Ok(entities)
    }

    /// Remove a propagated classification link: drop the name from the
    /// entity's propagated trait names, hard-delete the link, and stamp the
    /// entity's modification metadata.
    pub fn delete_propagated_edge(&self, uow: &UnitOfWork, link: &Link) -> Result<()> {
        let entity = link.from;
        debug!(
            entity = %entity,
            classification = ?link.classification_name(),
            "removing propagated classification"
        );

        if let Some(name) = link.classification_name() {
            self.ops.remove_propagated_trait_name(entity, name)?;
        }
        self.ops.delete_link_raw(uow, link, true)?;
        self.ops.update_modification_metadata(uow, entity)
    }

    /// Remove the propagated copy of `classification_name` that came from
    /// `associated_entity`. Only allowed once the associated entity is no
    /// longer active.
    pub fn delete_propagated_classification(
        &self,
        uow: &mut UnitOfWork,
        entity: Guid,
        classification_name: &str,
        associated_entity: Guid,
    ) -> Result<()> {
        let mut found = None;
        for link in self.ops.classification_links(entity)? {
            if !link.is_propagated() || link.classification_name() != Some(classification_name) {
                continue;
            }
            if let Some(cnode) = self.ops.graph.get_node(link.to)? {
                let state = cnode.classification_state();
                if state.is_some_and(|s| s.associated_entity == associated_entity) {
                    found = Some((link, cnode));
                    break;
                }
            }
        }

        let Some((edge, cnode)) = found else {
            return Err(Error::PropagatedClassificationNotAssociated {
                classification: classification_name.to_string(),
                associated_entity,
                entity,
            });
        };

        if cnode.classification_state().is_some_and(|s| s.entity_status.is_active()) {
            return Err(Error::PropagatedClassificationRemovalNotSupported {
                classification: classification_name.to_string(),
                associated_entity,
            });
        }

        debug!(
            entity = %entity,
            classification = classification_name,
            associated_entity = %associated_entity,
            "removing propagated classification"
        );
        let classification = self.classification_of(&cnode)?;
        self.delete_propagated_edge(uow, &edge)?;
        self.ops.delete_classification_node(uow, &cnode, true)?;
        uow.record_removed_propagation(entity, classification);
        Ok(())
    }

    fn classification_of(&self, cnode: &Node) -> Result<Classification> {
        self.ops.classification(cnode).ok_or_else(|| {
            Error::IllegalState(format!(
                "node {} of type {} is not a classification",
                cnode.id, cnode.type_name
            ))
        })
    }
}
