//! Shared fixture for the end-to-end tests: a small lineage catalog on top of
//! `MemoryGraph`, plus a recording listener.

#![allow(dead_code)]

use std::sync::Arc;

use catalog_mutation::model::{EdgeLabel, TRAIT_NAMES_KEY};
use catalog_mutation::notify::EntityView;
use catalog_mutation::types::ElementType;
use catalog_mutation::{
    ActiveUnits, AttributeDef, ChangeListener, Classification, ClassificationState, CoreConfig,
    DeletionEngine, GraphStore, Guid, Link, LinkId, MemoryGraph, NewLink, Node, PropagateTags,
    PropagationEngine, RelationshipDef, TypeDef, TypeRegistry, UnitOfWork, Value,
};
use catalog_mutation::model::{GlossaryTerm, Relationship};
use catalog_mutation::ListenerError;
use parking_lot::Mutex;

pub const LINEAGE: &str = "lineage";
pub const LINEAGE_BOTH: &str = "lineage_both";
pub const SCHEMA: &str = "schema";
pub const TERM_ASSIGNMENT: &str = "AtlasGlossarySemanticAssignment";

pub fn guid(n: u128) -> Guid {
    Guid::from_u128(n)
}

/// DataSet ⊃ Table (owned columns, struct storage descriptor), Column,
/// Process, GlossaryTerm, Person (manager ⇄ subordinates), Team (at least two
/// members), an internal AuditRecord, and two classifications.
pub fn lineage_registry() -> TypeRegistry {
    TypeRegistry::new()
        .with_type(
            TypeDef::entity("DataSet")
                .with_attribute(AttributeDef::primitive("qualifiedName").unique())
                .with_attribute(AttributeDef::primitive("name")),
        )
        .with_type(
            TypeDef::entity("Table")
                .with_super_type("DataSet")
                .with_attribute(AttributeDef::structure("sd", "StorageDesc"))
                .with_attribute(
                    AttributeDef::array_of("columns", ElementType::ObjectId("Column".into()))
                        .owned(),
                ),
        )
        .with_type(
            TypeDef::structure("StorageDesc").with_attribute(AttributeDef::primitive("location")),
        )
        .with_type(
            TypeDef::entity("Column")
                .with_attribute(AttributeDef::primitive("name"))
                .with_attribute(AttributeDef::object_id("table", "Table")),
        )
        .with_type(TypeDef::entity("Process").with_attribute(AttributeDef::primitive("name")))
        .with_type(TypeDef::entity("GlossaryTerm").with_attribute(AttributeDef::primitive("name")))
        .with_type(
            TypeDef::entity("Person")
                .with_attribute(
                    AttributeDef::object_id("manager", "Person").inverse("subordinates"),
                )
                .with_attribute(
                    AttributeDef::array_of("subordinates", ElementType::ObjectId("Person".into()))
                        .inverse("manager"),
                ),
        )
        .with_type(
            TypeDef::entity("Team").with_attribute(
                AttributeDef::array_of("members", ElementType::ObjectId("Person".into()))
                    .required()
                    .min_count(2),
            ),
        )
        .with_type(TypeDef::entity("AuditRecord").internal())
        .with_type(TypeDef::classification("PII"))
        .with_type(TypeDef::classification("Sensitive").applicable_to("DataSet"))
        .with_relationship(RelationshipDef::new(LINEAGE, PropagateTags::OneToTwo))
        .with_relationship(RelationshipDef::new(LINEAGE_BOTH, PropagateTags::Both))
        .with_relationship(RelationshipDef::new(SCHEMA, PropagateTags::None))
        .with_relationship(RelationshipDef::new(TERM_ASSIGNMENT, PropagateTags::OneToTwo))
}

pub struct Catalog {
    pub graph: MemoryGraph,
    pub registry: TypeRegistry,
    pub config: CoreConfig,
    pub units: Arc<ActiveUnits>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::with_config(CoreConfig::default())
    }

    pub fn with_config(config: CoreConfig) -> Self {
        Self {
            graph: MemoryGraph::new(),
            registry: lineage_registry(),
            config,
            units: ActiveUnits::new(),
        }
    }

    pub fn uow(&self) -> UnitOfWork {
        UnitOfWork::begin(&self.units).with_user("steward", Vec::new())
    }

    pub fn deletion(&self) -> DeletionEngine<'_> {
        DeletionEngine::new(&self.graph, &self.registry, &self.config)
    }

    pub fn propagation(&self) -> PropagationEngine<'_> {
        PropagationEngine::new(&self.graph, &self.registry, &self.config)
    }

    // ==================== Graph building ====================

    pub fn entity(&self, n: u128, type_name: &str) -> Guid {
        self.graph.create_node(Node::entity(guid(n), type_name)).unwrap()
    }

    pub fn named(&self, n: u128, type_name: &str, name: &str) -> Guid {
        self.graph
            .create_node(Node::entity(guid(n), type_name).with_property("name", name))
            .unwrap()
    }

    /// Plain attribute reference `from.attribute → to`.
    pub fn reference(&self, from: Guid, owner: &str, attribute: &str, to: Guid) -> LinkId {
        self.graph
            .create_link(NewLink::reference(from, to, EdgeLabel::format(owner, attribute)))
            .unwrap()
    }

    /// Relationship instance of `rel_type` with relationship guid `rel`.
    pub fn relate(&self, from: Guid, to: Guid, rel: u128, rel_type: &str) -> Link {
        let label = format!("r:{rel_type}");
        let id = self
            .graph
            .create_link(NewLink::relationship(from, to, label, guid(rel), rel_type))
            .unwrap();
        self.link(id).unwrap()
    }

    /// Attach classification `name` (node `n`) directly to `entity`.
    pub fn classify(&self, entity: Guid, n: u128, name: &str) -> Node {
        self.classify_with(entity, n, name, ClassificationState::new(entity))
    }

    pub fn classify_with(
        &self,
        entity: Guid,
        n: u128,
        name: &str,
        state: ClassificationState,
    ) -> Node {
        let cnode = Node::classification(guid(n), name, state);
        self.graph.create_node(cnode.clone()).unwrap();
        self.graph.create_link(NewLink::classification(entity, cnode.id, name)).unwrap();

        let mut names = self.node(entity).unwrap().string_list(TRAIT_NAMES_KEY);
        names.push(name.to_string());
        self.graph.set_property(entity, TRAIT_NAMES_KEY, Value::from(names)).unwrap();
        cnode
    }

    // ==================== Reads ====================

    pub fn node(&self, g: Guid) -> Option<Node> {
        self.graph.get_node(g).unwrap()
    }

    pub fn link(&self, id: LinkId) -> Option<Link> {
        self.graph.get_link(id).unwrap()
    }

    /// Links touching `g`, in any status.
    pub fn links_touching(&self, g: Guid) -> Vec<Link> {
        self.graph.all_links().into_iter().filter(|l| l.from == g || l.to == g).collect()
    }

    pub fn has_propagated(&self, entity: Guid, cnode: Guid) -> bool {
        self.links_touching(entity)
            .iter()
            .any(|l| l.from == entity && l.to == cnode && l.is_active() && l.is_propagated())
    }
}

// ============================================================================
// Recording listener
// ============================================================================

/// Records every callback as `"{callback}:{guids}"` in call order.
#[derive(Default)]
pub struct Recorder {
    pub events: Mutex<Vec<String>>,
    pub fail_on: Option<&'static str>,
}

impl Recorder {
    pub fn failing_on(callback: &'static str) -> Self {
        Self { fail_on: Some(callback), ..Self::default() }
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    fn push(&self, callback: &str, ids: Vec<Guid>) -> Result<(), ListenerError> {
        let ids: Vec<String> = ids.iter().map(|g| g.0.as_u128().to_string()).collect();
        self.events.lock().push(format!("{callback}:{}", ids.join(",")));
        if self.fail_on == Some(callback) {
            return Err(format!("{callback} rejected").into());
        }
        Ok(())
    }
}

fn view_ids(views: &[EntityView]) -> Vec<Guid> {
    views.iter().map(EntityView::guid).collect()
}

impl ChangeListener for Recorder {
    fn name(&self) -> &str {
        "Recorder"
    }

    fn on_entities_added(
        &self,
        entities: &[EntityView],
        _is_import: bool,
    ) -> Result<(), ListenerError> {
        self.push("added", view_ids(entities))
    }

    fn on_entities_updated(
        &self,
        entities: &[EntityView],
        _is_import: bool,
    ) -> Result<(), ListenerError> {
        self.push("updated", view_ids(entities))
    }

    fn on_entities_deleted(
        &self,
        entities: &[EntityView],
        _is_import: bool,
    ) -> Result<(), ListenerError> {
        self.push("deleted", view_ids(entities))
    }

    fn on_classifications_added(
        &self,
        entity: &EntityView,
        _c: &[Classification],
    ) -> Result<(), ListenerError> {
        self.push("classifications_added", vec![entity.guid()])
    }

    fn on_classifications_updated(
        &self,
        entity: &EntityView,
        _c: &[Classification],
    ) -> Result<(), ListenerError> {
        self.push("classifications_updated", vec![entity.guid()])
    }

    fn on_classifications_deleted(
        &self,
        entity: &EntityView,
        _c: &[Classification],
    ) -> Result<(), ListenerError> {
        self.push("classifications_deleted", vec![entity.guid()])
    }

    fn on_relationships_added(
        &self,
        relationships: &[Relationship],
        _is_import: bool,
    ) -> Result<(), ListenerError> {
        self.push("relationships_added", relationships.iter().map(|r| r.guid).collect())
    }

    fn on_relationships_deleted(
        &self,
        relationships: &[Relationship],
        _is_import: bool,
    ) -> Result<(), ListenerError> {
        self.push("relationships_deleted", relationships.iter().map(|r| r.guid).collect())
    }

    fn on_term_added(
        &self,
        term: &GlossaryTerm,
        entities: &[EntityView],
    ) -> Result<(), ListenerError> {
        let mut ids = vec![term.guid];
        ids.extend(view_ids(entities));
        self.push("term_added", ids)
    }
}
