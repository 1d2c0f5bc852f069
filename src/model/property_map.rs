//! PropertyMap: the key-value store on nodes and links.

use std::collections::HashMap;
use super::Value;

/// A map of property names to values.
pub type PropertyMap = HashMap<String, Value>;

/// Build a PropertyMap from (key, value) pairs.
pub fn props<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> PropertyMap
where
    K: Into<String>,
    V: Into<Value>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}

/// Keys prefixed with `__` are system properties, not attributes.
pub fn is_system_key(key: &str) -> bool {
    key.starts_with("__")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_props_builder() {
        let map = props([("name", "orders"), ("owner", "etl")]);
        assert_eq!(map.get("name"), Some(&Value::from("orders")));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_system_keys() {
        assert!(is_system_key("__traitNames"));
        assert!(!is_system_key("qualifiedName"));
    }
}
