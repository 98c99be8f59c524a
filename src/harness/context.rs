//! The key-value store shared by every script in a batch.
//!
//! Later scripts see whatever earlier scripts left behind; that coupling is
//! part of the contract with script authors.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context {
    values: BTreeMap<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Typed read; `None` when missing or of another shape.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.values
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Insert or replace, returning the previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// JSON object form, as handed to out-of-process engines.
    pub fn to_json(&self) -> String {
        // A map of strings to `Value`s always serializes.
        serde_json::to_string(&self.values).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_get_remove() {
        let mut ctx = Context::new();
        assert!(ctx.is_empty());
        assert_eq!(ctx.set("count", 3), None);
        assert_eq!(ctx.set("count", 4), Some(json!(3)));
        assert_eq!(ctx.get_as::<u32>("count"), Some(4));
        assert_eq!(ctx.get_as::<String>("count"), None);
        assert!(ctx.contains_key("count"));
        assert_eq!(ctx.remove("count"), Some(json!(4)));
        assert!(ctx.is_empty());
    }

    #[test]
    fn test_json_form_is_an_object() {
        let mut ctx = Context::new();
        ctx.set("b", json!({ "nested": true }));
        ctx.set("a", "text");
        assert_eq!(ctx.to_json(), r#"{"a":"text","b":{"nested":true}}"#);
    }
}
