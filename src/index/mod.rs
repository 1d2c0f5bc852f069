//! Full-text mapping.
//!
//! The notifier recomputes each touched entity's derived search text
//! (`__entityText`) before listeners run, so a listener that reads the entity
//! back sees consistent text. The mapping itself is a capability.

use crate::model::{
    is_system_key, Classification, Guid, Node, PROPAGATED_TRAIT_NAMES_KEY, TRAIT_NAMES_KEY,
};
use crate::storage::GraphStore;
use crate::{Error, Result};

/// Computes the search text stored on an entity.
pub trait FullTextMapper: Send + Sync {
    /// Full text for the entity `guid` as it currently is in the graph.
    fn index_text_for_entity(&self, graph: &dyn GraphStore, guid: Guid) -> Result<String>;

    /// Text contributed by `classifications` on `guid`, appended to the
    /// existing text when classifications are added.
    fn index_text_for_classifications(
        &self,
        graph: &dyn GraphStore,
        guid: Guid,
        classifications: &[Classification],
    ) -> Result<String>;
}

/// Default mapper: type name, user attribute values (ordered by attribute
/// name), then classification names.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttributeTextMapper;

impl AttributeTextMapper {
    fn node_text(node: &Node) -> String {
        let mut words = vec![node.type_name.clone()];

        let mut keys: Vec<&String> = node.properties.keys().filter(|k| !is_system_key(k)).collect();
        keys.sort();
        for key in keys {
            if let Some(value) = node.properties.get(key) {
                value.push_terms(&mut words);
            }
        }

        words.extend(node.string_list(TRAIT_NAMES_KEY));
        words.extend(node.string_list(PROPAGATED_TRAIT_NAMES_KEY));
        words.join(" ")
    }
}

impl FullTextMapper for AttributeTextMapper {
    fn index_text_for_entity(&self, graph: &dyn GraphStore, guid: Guid) -> Result<String> {
        let node = graph
            .find_by_guid(guid)?
            .ok_or_else(|| Error::NotFound(format!("Entity {guid}")))?;
        Ok(Self::node_text(&node))
    }

    fn index_text_for_classifications(
        &self,
        _graph: &dyn GraphStore,
        _guid: Guid,
        classifications: &[Classification],
    ) -> Result<String> {
        let mut words = Vec::new();
        for classification in classifications {
            words.push(classification.type_name.clone());
            let mut keys: Vec<&String> = classification.attributes.keys().collect();
            keys.sort();
            for key in keys {
                if let Some(value) = classification.attributes.get(key) {
                    value.push_terms(&mut words);
                }
            }
        }
        Ok(words.join(" "))
    }
}
