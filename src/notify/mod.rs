//! # Change Notification
//!
//! At the end of an operation the notifier prunes what the operation did,
//! refreshes derived search text, and fans the result out to registered
//! listeners in a fixed order:
//!
//! ```text
//! created → updated → partially updated → deleted
//!         → propagations added → propagations removed
//! ```
//!
//! Two listener payloads exist ([`ListenerProtocol`]): `Legacy` listeners get
//! [`Referenceable`] projections and their failures are wrapped in
//! [`Error::NotificationFailed`]; `Typed` listeners get full [`Entity`]
//! values (internal types skipped) and their failures propagate as
//! [`Error::Listener`].

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::config::{CoreConfig, ListenerProtocol};
use crate::index::{AttributeTextMapper, FullTextMapper};
use crate::model::*;
use crate::ops::GraphOps;
use crate::storage::GraphStore;
use crate::types::TypeRegistry;
use crate::uow::UnitOfWork;
use crate::{Error, ListenerError, Result};

type ListenerResult = std::result::Result<(), ListenerError>;

// ============================================================================
// Listener contract
// ============================================================================

/// Entity payload handed to listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityView {
    /// Legacy protocol projection.
    Reference(Referenceable),
    /// Typed protocol entity.
    Typed(Entity),
}

impl EntityView {
    pub fn guid(&self) -> Guid {
        match self {
            EntityView::Reference(r) => r.guid,
            EntityView::Typed(e) => e.guid,
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            EntityView::Reference(r) => &r.type_name,
            EntityView::Typed(e) => &e.type_name,
        }
    }
}

/// Receives change notifications. Every callback defaults to a no-op.
pub trait ChangeListener: Send + Sync {
    /// Name reported in `NotificationFailed`.
    fn name(&self) -> &str;

    fn on_entities_added(&self, _entities: &[EntityView], _is_import: bool) -> ListenerResult {
        Ok(())
    }

    fn on_entities_updated(&self, _entities: &[EntityView], _is_import: bool) -> ListenerResult {
        Ok(())
    }

    fn on_entities_deleted(&self, _entities: &[EntityView], _is_import: bool) -> ListenerResult {
        Ok(())
    }

    fn on_classifications_added(
        &self,
        _entity: &EntityView,
        _classifications: &[Classification],
    ) -> ListenerResult {
        Ok(())
    }

    fn on_classifications_updated(
        &self,
        _entity: &EntityView,
        _classifications: &[Classification],
    ) -> ListenerResult {
        Ok(())
    }

    fn on_classifications_deleted(
        &self,
        _entity: &EntityView,
        _classifications: &[Classification],
    ) -> ListenerResult {
        Ok(())
    }

    fn on_relationships_added(
        &self,
        _relationships: &[Relationship],
        _is_import: bool,
    ) -> ListenerResult {
        Ok(())
    }

    fn on_relationships_updated(
        &self,
        _relationships: &[Relationship],
        _is_import: bool,
    ) -> ListenerResult {
        Ok(())
    }

    fn on_relationships_deleted(
        &self,
        _relationships: &[Relationship],
        _is_import: bool,
    ) -> ListenerResult {
        Ok(())
    }

    fn on_term_added(&self, _term: &GlossaryTerm, _entities: &[EntityView]) -> ListenerResult {
        Ok(())
    }

    fn on_term_deleted(&self, _term: &GlossaryTerm, _entities: &[EntityView]) -> ListenerResult {
        Ok(())
    }
}

/// Kind of entity change being dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityOperation {
    Create,
    Update,
    PartialUpdate,
    Delete,
}

impl EntityOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityOperation::Create => "CREATE",
            EntityOperation::Update => "UPDATE",
            EntityOperation::PartialUpdate => "PARTIAL_UPDATE",
            EntityOperation::Delete => "DELETE",
        }
    }
}

/// Kind of relationship change passed to [`ChangeNotifier::notify_relationship_mutation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipOperation {
    Create,
    Update,
    Delete,
}

// ============================================================================
// MutationBatch
// ============================================================================

/// Entity headers an operation created, updated, partially updated or deleted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationBatch {
    pub created: Vec<EntityHeader>,
    pub updated: Vec<EntityHeader>,
    pub partially_updated: Vec<EntityHeader>,
    pub deleted: Vec<EntityHeader>,
}

impl MutationBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Batch reporting what `uow` recorded as updated and deleted.
    pub fn from_unit(uow: &UnitOfWork) -> Self {
        Self {
            updated: uow.updated_entities().cloned().collect(),
            deleted: uow.deleted_entities().cloned().collect(),
            ..Self::default()
        }
    }

    /// Leave each guid in at most one list.
    ///
    /// Headers already in Deleted status leave created/updated/partial;
    /// deleted guids leave the other three; created guids leave updated and
    /// partial; updated guids leave partial.
    pub fn prune(&mut self) {
        for list in [&mut self.created, &mut self.updated, &mut self.partially_updated] {
            list.retain(|h| h.status.is_active());
        }

        let deleted: HashSet<Guid> = self.deleted.iter().map(|h| h.guid).collect();
        for list in [&mut self.created, &mut self.updated, &mut self.partially_updated] {
            list.retain(|h| !deleted.contains(&h.guid));
        }

        let created: HashSet<Guid> = self.created.iter().map(|h| h.guid).collect();
        for list in [&mut self.updated, &mut self.partially_updated] {
            list.retain(|h| !created.contains(&h.guid));
        }

        let updated: HashSet<Guid> = self.updated.iter().map(|h| h.guid).collect();
        self.partially_updated.retain(|h| !updated.contains(&h.guid));
    }

    pub fn is_empty(&self) -> bool {
        self.created.is_empty()
            && self.updated.is_empty()
            && self.partially_updated.is_empty()
            && self.deleted.is_empty()
    }
}

// ============================================================================
// ChangeNotifier
// ============================================================================

/// Dispatches the effects of an operation to registered listeners.
pub struct ChangeNotifier<'a> {
    ops: GraphOps<'a>,
    protocol: ListenerProtocol,
    listeners: Vec<Arc<dyn ChangeListener>>,
    mapper: Box<dyn FullTextMapper>,
}

impl<'a> ChangeNotifier<'a> {
    /// Notifier using the configured listener protocol and the default
    /// full-text mapper.
    pub fn new(
        graph: &'a dyn GraphStore,
        registry: &'a TypeRegistry,
        config: &'a CoreConfig,
    ) -> Self {
        Self {
            ops: GraphOps::new(graph, registry, config),
            protocol: config.listener_protocol,
            listeners: Vec::new(),
            mapper: Box::new(AttributeTextMapper),
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn ChangeListener>) -> Self {
        self.register(listener);
        self
    }

    pub fn with_full_text_mapper(mut self, mapper: Box<dyn FullTextMapper>) -> Self {
        self.mapper = mapper;
        self
    }

    pub fn register(&mut self, listener: Arc<dyn ChangeListener>) {
        self.listeners.push(listener);
    }

    pub fn protocol(&self) -> ListenerProtocol {
        self.protocol
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    // ========================================================================
    // Entity mutations
    // ========================================================================

    /// Prune `batch`, refresh search text, then notify in order: created,
    /// updated, partially updated, deleted, followed by the propagation
    /// events recorded in `uow`.
    pub fn on_entities_mutated(
        &self,
        uow: &mut UnitOfWork,
        mut batch: MutationBatch,
        is_import: bool,
    ) -> Result<()> {
        if self.listeners.is_empty() {
            return Ok(());
        }

        batch.prune();

        // Text first, so listeners reading an entity back see it refreshed.
        self.do_full_text_mapping(uow, batch.created.iter().map(|h| h.guid));
        self.do_full_text_mapping(uow, batch.updated.iter().map(|h| h.guid));
        self.do_full_text_mapping(uow, batch.partially_updated.iter().map(|h| h.guid));

        self.notify_listeners(uow, &batch.created, EntityOperation::Create, is_import)?;
        self.notify_listeners(uow, &batch.updated, EntityOperation::Update, is_import)?;
        let partial = EntityOperation::PartialUpdate;
        self.notify_listeners(uow, &batch.partially_updated, partial, is_import)?;
        self.notify_listeners(uow, &batch.deleted, EntityOperation::Delete, is_import)?;

        self.notify_propagated_entities(uow)
    }

    fn notify_listeners(
        &self,
        uow: &mut UnitOfWork,
        headers: &[EntityHeader],
        operation: EntityOperation,
        is_import: bool,
    ) -> Result<()> {
        if headers.is_empty() {
            return Ok(());
        }
        debug!(operation = operation.as_str(), entities = headers.len(), "notifying listeners");

        match self.protocol {
            ListenerProtocol::Legacy => {
                let views = self.to_referenceables(headers, operation)?;
                for listener in &self.listeners {
                    dispatch_entities(listener.as_ref(), operation, &views, is_import).map_err(
                        |source| notification_failed(listener.as_ref(), operation.as_str(), source),
                    )?;
                }
            }
            ListenerProtocol::Typed => {
                let views = self.to_entities(uow, headers, operation)?;
                for listener in &self.listeners {
                    dispatch_entities(listener.as_ref(), operation, &views, is_import)
                        .map_err(Error::Listener)?;
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // Relationships
    // ========================================================================

    /// Legacy listeners have no relationship callbacks; the change is logged
    /// and dropped for them.
    pub fn notify_relationship_mutation(
        &self,
        relationship: &Relationship,
        operation: RelationshipOperation,
    ) -> Result<()> {
        if self.listeners.is_empty() {
            return Ok(());
        }

        if self.protocol == ListenerProtocol::Legacy {
            warn!(
                relationship = %relationship.guid,
                type_name = %relationship.type_name,
                "relationships not supported by legacy notifications"
            );
            return Ok(());
        }

        let relationships = std::slice::from_ref(relationship);
        for listener in &self.listeners {
            let result = match operation {
                RelationshipOperation::Create => {
                    listener.on_relationships_added(relationships, false)
                }
                RelationshipOperation::Update => {
                    listener.on_relationships_updated(relationships, false)
                }
                RelationshipOperation::Delete => {
                    listener.on_relationships_deleted(relationships, false)
                }
            };
            result.map_err(Error::Listener)?;
        }
        Ok(())
    }

    // ========================================================================
    // Classifications
    // ========================================================================

    pub fn on_classifications_added(
        &self,
        uow: &mut UnitOfWork,
        entity: &Entity,
        classifications: &[Classification],
    ) -> Result<()> {
        if self.listeners.is_empty() {
            return Ok(());
        }

        match self.protocol {
            ListenerProtocol::Typed => {
                self.do_full_text_mapping(uow, [entity.guid]);
                let view = EntityView::Typed(entity.clone());
                for listener in &self.listeners {
                    listener
                        .on_classifications_added(&view, classifications)
                        .map_err(Error::Listener)?;
                }
            }
            ListenerProtocol::Legacy => {
                self.update_full_text_mapping(uow, entity.guid, classifications);
                if classifications.is_empty() {
                    return Ok(());
                }
                let Some(view) = self.referenceable(entity.guid)? else {
                    return Ok(());
                };
                for listener in &self.listeners {
                    listener
                        .on_classifications_added(&view, classifications)
                        .map_err(|source| {
                            notification_failed(listener.as_ref(), "TraitAdd", source)
                        })?;
                }
            }
        }
        Ok(())
    }

    pub fn on_classifications_updated(
        &self,
        uow: &mut UnitOfWork,
        entity: &Entity,
        classifications: &[Classification],
    ) -> Result<()> {
        if self.listeners.is_empty() {
            return Ok(());
        }
        self.do_full_text_mapping(uow, [entity.guid]);

        match self.protocol {
            ListenerProtocol::Typed => {
                let view = EntityView::Typed(entity.clone());
                for listener in &self.listeners {
                    listener
                        .on_classifications_updated(&view, classifications)
                        .map_err(Error::Listener)?;
                }
            }
            ListenerProtocol::Legacy => {
                if classifications.is_empty() {
                    return Ok(());
                }
                let Some(view) = self.referenceable(entity.guid)? else {
                    return Ok(());
                };
                for listener in &self.listeners {
                    listener
                        .on_classifications_updated(&view, classifications)
                        .map_err(|source| {
                            notification_failed(listener.as_ref(), "TraitUpdate", source)
                        })?;
                }
            }
        }
        Ok(())
    }

    pub fn on_classifications_deleted(
        &self,
        uow: &mut UnitOfWork,
        entity: &Entity,
        classifications: &[Classification],
    ) -> Result<()> {
        if self.listeners.is_empty() {
            return Ok(());
        }
        self.do_full_text_mapping(uow, [entity.guid]);

        match self.protocol {
            ListenerProtocol::Typed => {
                let view = EntityView::Typed(entity.clone());
                for listener in &self.listeners {
                    listener
                        .on_classifications_deleted(&view, classifications)
                        .map_err(Error::Listener)?;
                }
            }
            ListenerProtocol::Legacy => {
                if classifications.is_empty() {
                    return Ok(());
                }
                let Some(view) = self.referenceable(entity.guid)? else {
                    return Ok(());
                };
                for listener in &self.listeners {
                    listener
                        .on_classifications_deleted(&view, classifications)
                        .map_err(|source| {
                            notification_failed(listener.as_ref(), "TraitDelete", source)
                        })?;
                }
            }
        }
        Ok(())
    }

    /// Report and drain the propagation ledgers of `uow`: additions, then
    /// removals. Entities deleted in the same operation are skipped.
    pub fn notify_propagated_entities(&self, uow: &mut UnitOfWork) -> Result<()> {
        if self.listeners.is_empty() {
            return Ok(());
        }

        let added = uow.take_added_propagations();
        for (guid, classifications) in &added {
            if uow.is_deleted_entity(*guid) {
                continue;
            }
            if let Some(entity) = self.get_and_cache_entity(uow, *guid)? {
                self.on_classifications_added(uow, &entity, classifications)?;
            }
        }

        let removed = uow.take_removed_propagations();
        for (guid, classifications) in &removed {
            if uow.is_deleted_entity(*guid) {
                continue;
            }
            if let Some(entity) = self.get_and_cache_entity(uow, *guid)? {
                self.on_classifications_deleted(uow, &entity, classifications)?;
            }
        }
        Ok(())
    }

    // ========================================================================
    // Glossary terms
    // ========================================================================

    pub fn on_term_added(
        &self,
        uow: &mut UnitOfWork,
        term: &GlossaryTerm,
        entities: &[Guid],
    ) -> Result<()> {
        if self.listeners.is_empty() {
            return Ok(());
        }
        let views = self.term_entities(uow, entities)?;
        for listener in &self.listeners {
            let result = listener.on_term_added(term, &views);
            match self.protocol {
                ListenerProtocol::Legacy => result.map_err(|source| {
                    notification_failed(listener.as_ref(), "TermAdd", source)
                })?,
                ListenerProtocol::Typed => result.map_err(Error::Listener)?,
            }
        }
        Ok(())
    }

    pub fn on_term_deleted(
        &self,
        uow: &mut UnitOfWork,
        term: &GlossaryTerm,
        entities: &[Guid],
    ) -> Result<()> {
        if self.listeners.is_empty() {
            return Ok(());
        }
        let views = self.term_entities(uow, entities)?;
        for listener in &self.listeners {
            let result = listener.on_term_deleted(term, &views);
            match self.protocol {
                ListenerProtocol::Legacy => result.map_err(|source| {
                    notification_failed(listener.as_ref(), "TermDelete", source)
                })?,
                ListenerProtocol::Typed => result.map_err(Error::Listener)?,
            }
        }
        Ok(())
    }

    fn term_entities(&self, uow: &mut UnitOfWork, guids: &[Guid]) -> Result<Vec<EntityView>> {
        let mut views = Vec::with_capacity(guids.len());
        for &guid in guids {
            let view = match self.protocol {
                ListenerProtocol::Legacy => self.referenceable(guid)?,
                ListenerProtocol::Typed => {
                    self.get_and_cache_entity(uow, guid)?.map(EntityView::Typed)
                }
            };
            views.extend(view);
        }
        Ok(views)
    }

    // ========================================================================
    // Payload conversion
    // ========================================================================

    /// Deletes are rebuilt from their headers; the graph may no longer hold them.
    fn to_referenceables(
        &self,
        headers: &[EntityHeader],
        operation: EntityOperation,
    ) -> Result<Vec<EntityView>> {
        let mut views = Vec::with_capacity(headers.len());
        for header in headers {
            if operation == EntityOperation::Delete {
                views.push(EntityView::Reference(Referenceable {
                    guid: header.guid,
                    type_name: header.type_name.clone(),
                    values: header.attributes.clone(),
                    trait_names: header.classification_names.clone(),
                }));
            } else {
                match self.referenceable(header.guid)? {
                    Some(view) => views.push(view),
                    None => debug!(guid = %header.guid, "skipping notification: entity not found"),
                }
            }
        }
        Ok(views)
    }

    /// Unknown and internal entity types are skipped.
    fn to_entities(
        &self,
        uow: &mut UnitOfWork,
        headers: &[EntityHeader],
        operation: EntityOperation,
    ) -> Result<Vec<EntityView>> {
        let mut views = Vec::with_capacity(headers.len());
        for header in headers {
            let Some(entity_type) = self.ops.registry.entity_type(&header.type_name) else {
                continue;
            };
            if entity_type.internal {
                debug!(type_name = %header.type_name, "skipping internal type");
                continue;
            }

            let entity = if operation == EntityOperation::Delete {
                Some(Entity::from_header(header))
            } else {
                self.get_and_cache_entity(uow, header.guid)?
            };
            views.extend(entity.map(EntityView::Typed));
        }
        Ok(views)
    }

    fn referenceable(&self, guid: Guid) -> Result<Option<EntityView>> {
        Ok(self
            .ops
            .graph
            .find_by_guid(guid)?
            .map(|node| EntityView::Reference(self.ops.referenceable(&node))))
    }

    fn get_and_cache_entity(&self, uow: &mut UnitOfWork, guid: Guid) -> Result<Option<Entity>> {
        if let Some(entity) = uow.cached_entity(guid) {
            return Ok(Some(entity.clone()));
        }
        let Some(node) = self.ops.graph.find_by_guid(guid)? else {
            return Ok(None);
        };
        let entity = self.ops.entity(&node)?;
        uow.cache(entity.clone());
        Ok(Some(entity))
    }

    // ========================================================================
    // Full-text mapping
    // ========================================================================

    /// Recompute `__entityText` for each entity. Failures are logged.
    fn do_full_text_mapping(&self, uow: &mut UnitOfWork, guids: impl IntoIterator<Item = Guid>) {
        if !self.ops.config.full_text_enabled {
            return;
        }

        let metric = uow.start_metric("fullTextMapping");
        for guid in guids {
            if let Err(e) = self.map_entity_text(guid) {
                error!(guid = %guid, error = %e, "full text mapping failed");
            }
        }
        uow.end_metric(metric);
    }

    fn map_entity_text(&self, guid: Guid) -> Result<()> {
        let Some(node) = self.ops.graph.find_by_guid(guid)? else {
            return Ok(());
        };
        if self.ops.is_internal(&node) {
            return Ok(());
        }
        let text = self.mapper.index_text_for_entity(self.ops.graph, guid)?;
        self.ops.graph.set_property(guid, ENTITY_TEXT_KEY, Value::from(text))
    }

    /// Append the text of newly added classifications to `__entityText`.
    fn update_full_text_mapping(
        &self,
        uow: &mut UnitOfWork,
        guid: Guid,
        classifications: &[Classification],
    ) {
        if !self.ops.config.full_text_enabled || classifications.is_empty() {
            return;
        }

        let metric = uow.start_metric("fullTextMapping");
        if let Err(e) = self.append_classification_text(guid, classifications) {
            error!(guid = %guid, error = %e, "full text mapping failed");
        }
        uow.end_metric(metric);
    }

    fn append_classification_text(
        &self,
        guid: Guid,
        classifications: &[Classification],
    ) -> Result<()> {
        let Some(node) = self.ops.graph.find_by_guid(guid)? else {
            return Ok(());
        };
        if self.ops.is_internal(&node) {
            return Ok(());
        }
        let addition =
            self.mapper.index_text_for_classifications(self.ops.graph, guid, classifications)?;
        let text = match node.get(ENTITY_TEXT_KEY).and_then(Value::as_str) {
            Some(existing) if !existing.is_empty() => format!("{existing} {addition}"),
            _ => addition,
        };
        self.ops.graph.set_property(guid, ENTITY_TEXT_KEY, Value::from(text))
    }
}

fn dispatch_entities(
    listener: &dyn ChangeListener,
    operation: EntityOperation,
    views: &[EntityView],
    is_import: bool,
) -> ListenerResult {
    match operation {
        EntityOperation::Create => listener.on_entities_added(views, is_import),
        EntityOperation::Update | EntityOperation::PartialUpdate => {
            listener.on_entities_updated(views, is_import)
        }
        EntityOperation::Delete => listener.on_entities_deleted(views, is_import),
    }
}

fn notification_failed(
    listener: &dyn ChangeListener,
    operation: &str,
    source: ListenerError,
) -> Error {
    Error::NotificationFailed {
        listener: listener.name().to_string(),
        operation: operation.to_string(),
        source,
    }
}
