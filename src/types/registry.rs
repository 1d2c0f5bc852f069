//! The TypeRegistry: read-only type lookup.

use std::collections::{HashMap, HashSet};

use super::{AttributeDef, RelationshipDef, TypeDef, TypeKind};
use crate::{Error, Result};

/// Runtime lookup of type and relationship definitions.
#[derive(Debug, Default, Clone)]
pub struct TypeRegistry {
    types: HashMap<String, TypeDef>,
    relationships: HashMap<String, RelationshipDef>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, def: TypeDef) -> Self {
        self.register(def);
        self
    }

    pub fn with_relationship(mut self, def: RelationshipDef) -> Self {
        self.register_relationship(def);
        self
    }

    pub fn register(&mut self, def: TypeDef) {
        self.types.insert(def.name.clone(), def);
    }

    pub fn register_relationship(&mut self, def: RelationshipDef) {
        self.relationships.insert(def.name.clone(), def);
    }

    // ==================== Type Lookups ====================

    /// Get a type definition by name.
    pub fn get_type(&self, name: &str) -> Result<&TypeDef> {
        self.types.get(name).ok_or_else(|| Error::type_not_found("TYPE", name))
    }

    /// Entity type by name; `None` for unknown names and non-entity types.
    pub fn entity_type(&self, name: &str) -> Option<&TypeDef> {
        self.types.get(name).filter(|t| t.kind == TypeKind::Entity)
    }

    /// Entity type by name, failing with `TypeNotFound`.
    pub fn require_entity_type(&self, name: &str) -> Result<&TypeDef> {
        self.entity_type(name)
            .ok_or_else(|| Error::type_not_found(TypeKind::Entity.as_str(), name))
    }

    pub fn classification_type(&self, name: &str) -> Result<&TypeDef> {
        self.types
            .get(name)
            .filter(|t| t.kind == TypeKind::Classification)
            .ok_or_else(|| Error::type_not_found(TypeKind::Classification.as_str(), name))
    }

    pub fn relationship(&self, name: &str) -> Result<&RelationshipDef> {
        self.relationships
            .get(name)
            .ok_or_else(|| Error::type_not_found("RELATIONSHIP", name))
    }

    /// Internal (synthetic) entity types are always hard-deleted.
    pub fn is_internal(&self, type_name: &str) -> bool {
        self.entity_type(type_name).is_some_and(|t| t.internal)
    }

    // ==================== Attributes ====================

    /// All attributes of a type, including those inherited from super types.
    /// Own attributes come first; a name declared twice keeps the nearest.
    pub fn all_attributes(&self, type_name: &str) -> Result<Vec<&AttributeDef>> {
        Ok(self
            .all_attributes_with_owner(type_name)?
            .into_iter()
            .map(|(_, attr)| attr)
            .collect())
    }

    /// Like [`all_attributes`](Self::all_attributes), paired with the name
    /// of the type that declares each attribute.
    pub fn all_attributes_with_owner(&self, type_name: &str) -> Result<Vec<(&str, &AttributeDef)>> {
        let mut out: Vec<(&str, &AttributeDef)> = Vec::new();
        let mut seen_names = HashSet::new();
        let mut visited = HashSet::new();
        let mut stack = vec![type_name];

        while let Some(name) = stack.pop() {
            if !visited.insert(name) {
                continue;
            }
            let def = self.get_type(name)?;
            for attr in &def.attributes {
                if seen_names.insert(attr.name.as_str()) {
                    out.push((def.name.as_str(), attr));
                }
            }
            for sup in def.super_types.iter().rev() {
                stack.push(sup.as_str());
            }
        }

        Ok(out)
    }

    /// Label of the link storing `attribute` on a node of `type_name`. The
    /// label names the declaring type, so subtypes share their parent's labels.
    pub fn relationship_edge_label(
        &self,
        type_name: &str,
        attribute: &AttributeDef,
    ) -> Result<String> {
        let owner = self
            .all_attributes_with_owner(type_name)?
            .into_iter()
            .find(|(_, a)| a.name == attribute.name)
            .map_or(type_name, |(owner, _)| owner);
        Ok(attribute.relationship_edge_label(owner))
    }

    /// Attribute `attribute` of `type_name` (inherited attributes included).
    pub fn attribute(&self, type_name: &str, attribute: &str) -> Result<Option<&AttributeDef>> {
        Ok(self
            .all_attributes(type_name)?
            .into_iter()
            .find(|a| a.name == attribute))
    }

    /// Owned object-id attributes walked by the ownership closure.
    pub fn owned_ref_attributes(&self, type_name: &str) -> Result<Vec<&AttributeDef>> {
        Ok(self
            .all_attributes(type_name)?
            .into_iter()
            .filter(|a| a.is_owned_ref())
            .collect())
    }

    // ==================== Subtyping ====================

    /// True when `type_name` is `super_name` or inherits from it.
    pub fn is_subtype_of(&self, type_name: &str, super_name: &str) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![type_name];
        while let Some(name) = stack.pop() {
            if name == super_name {
                return true;
            }
            if !visited.insert(name) {
                continue;
            }
            if let Some(def) = self.types.get(name) {
                stack.extend(def.super_types.iter().map(String::as_str));
            }
        }
        false
    }

    /// Whether a classification may be applied to an entity of `entity_type`.
    pub fn can_apply_to_entity_type(&self, classification: &TypeDef, entity_type: &str) -> bool {
        classification.entity_types.is_empty()
            || classification
                .entity_types
                .iter()
                .any(|allowed| self.is_subtype_of(entity_type, allowed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ElementType;

    fn registry() -> TypeRegistry {
        TypeRegistry::new()
            .with_type(
                TypeDef::entity("DataSet")
                    .with_attribute(AttributeDef::primitive("qualifiedName").unique())
                    .with_attribute(AttributeDef::primitive("name")),
            )
            .with_type(
                TypeDef::entity("Table")
                    .with_super_type("DataSet")
                    .with_attribute(AttributeDef::array_of(
                        "columns",
                        ElementType::ObjectId("Column".into()),
                    ).owned())
                    .with_attribute(AttributeDef::primitive("name").unique()),
            )
            .with_type(TypeDef::entity("Column"))
            .with_type(TypeDef::entity("AuditRecord").internal())
            .with_type(TypeDef::classification("PII").applicable_to("DataSet"))
    }

    #[test]
    fn test_inherited_attributes_nearest_wins() {
        let reg = registry();
        let attrs = reg.all_attributes("Table").unwrap();
        let names: Vec<&str> = attrs.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["columns", "name", "qualifiedName"]);
        let name = reg.attribute("Table", "name").unwrap().unwrap();
        assert!(name.is_unique);
    }

    #[test]
    fn test_edge_label_names_declaring_type() {
        let reg = registry()
            .with_type(TypeDef::entity("View").with_super_type("Table"));
        let columns = reg.attribute("View", "columns").unwrap().unwrap().clone();
        assert_eq!(reg.relationship_edge_label("View", &columns).unwrap(), "__Table.columns");
    }

    #[test]
    fn test_unknown_type_is_type_not_found() {
        let reg = registry();
        assert!(matches!(reg.all_attributes("Nope"), Err(Error::TypeNotFound { .. })));
        assert!(matches!(reg.classification_type("Table"), Err(Error::TypeNotFound { .. })));
    }

    #[test]
    fn test_can_apply_through_super_type() {
        let reg = registry();
        let pii = reg.classification_type("PII").unwrap();
        assert!(reg.can_apply_to_entity_type(pii, "Table"));
        assert!(!reg.can_apply_to_entity_type(pii, "Column"));
    }

    #[test]
    fn test_internal_and_owned_refs() {
        let reg = registry();
        assert!(reg.is_internal("AuditRecord"));
        assert!(!reg.is_internal("Table"));
        assert_eq!(reg.owned_ref_attributes("Table").unwrap().len(), 1);
    }
}
