//! Cached value shapes
//!
//! The backend answers list queries in three interchangeable shapes:
//!
//! ```text
//! [ {..}, {..} ]                      Bare
//! { "data":  [ {..} ], "total": 40 }  Wrapped
//! { "leads": [ {..} ], "page": 2 }    Nested
//! ```
//!
//! The shape is detected once when a value enters the cache and kept as a tag,
//! so patching never has to sniff JSON again. Sibling fields of the wrapper
//! (totals, paging) are carried along untouched.

use serde_json::{Map, Value};

use crate::lead::{entity_id, normalize_entity};

/// Which wire representation a list view came in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListShape {
    Bare,
    Wrapped,
    Nested,
}

impl ListShape {
    fn field(&self) -> Option<&'static str> {
        match self {
            ListShape::Bare => None,
            ListShape::Wrapped => Some("data"),
            ListShape::Nested => Some("leads"),
        }
    }
}

/// An ordered list of entities plus the envelope it arrived in.
#[derive(Debug, Clone, PartialEq)]
pub struct ListView {
    pub shape: ListShape,
    pub items: Vec<Value>,
    /// Other fields of a wrapped/nested envelope
    pub envelope: Map<String, Value>,
}

impl ListView {
    /// Detect the list shape of a wire value, normalizing every item's id.
    ///
    /// Returns the value back when it is not one of the three list shapes.
    pub fn detect(value: Value) -> std::result::Result<Self, Value> {
        let (shape, items, envelope) = match value {
            Value::Array(items) => (ListShape::Bare, items, Map::new()),
            Value::Object(mut obj) => {
                let shape = if matches!(obj.get("data"), Some(Value::Array(_))) {
                    ListShape::Wrapped
                } else if matches!(obj.get("leads"), Some(Value::Array(_))) {
                    ListShape::Nested
                } else {
                    return Err(Value::Object(obj));
                };
                let items = match shape.field().and_then(|f| obj.remove(f)) {
                    Some(Value::Array(items)) => items,
                    _ => Vec::new(),
                };
                (shape, items, obj)
            }
            other => return Err(other),
        };

        let mut view = Self {
            shape,
            items,
            envelope,
        };
        view.items.iter_mut().for_each(normalize_entity);
        Ok(view)
    }

    /// Render back to the wire shape it came in.
    pub fn to_value(&self) -> Value {
        let items = Value::Array(self.items.clone());
        match self.shape.field() {
            None => items,
            Some(field) => {
                let mut obj = self.envelope.clone();
                obj.insert(field.to_string(), items);
                Value::Object(obj)
            }
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.items.iter().any(|item| entity_id(item) == Some(id))
    }

    /// Apply `updater` to every item with this id; returns how many matched.
    pub fn patch_matching(&mut self, id: &str, updater: &dyn Fn(&mut Value)) -> usize {
        let mut touched = 0;
        for item in self.items.iter_mut().filter(|item| entity_id(item) == Some(id)) {
            updater(item);
            touched += 1;
        }
        touched
    }

    /// Drop every item with this id; returns how many were removed.
    pub fn remove_matching(&mut self, id: &str) -> usize {
        let before = self.items.len();
        self.items.retain(|item| entity_id(item) != Some(id));
        before - self.items.len()
    }
}

/// Value held under a cache key.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    /// A single entity
    Entity(Value),
    /// A list query result
    List(ListView),
    /// Rollup or anything else this core does not patch
    Aggregate(Value),
}

impl CachedValue {
    /// Classify an entity payload. `null` counts as nothing cached.
    pub fn entity(mut value: Value) -> Self {
        normalize_entity(&mut value);
        CachedValue::Entity(value)
    }

    /// Classify a list payload; unknown shapes are kept opaque.
    pub fn list(value: Value) -> Self {
        match ListView::detect(value) {
            Ok(view) => CachedValue::List(view),
            Err(other) => CachedValue::Aggregate(other),
        }
    }

    pub fn as_list(&self) -> Option<&ListView> {
        match self {
            CachedValue::List(view) => Some(view),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<&Value> {
        match self {
            CachedValue::Entity(v) if !v.is_null() => Some(v),
            _ => None,
        }
    }

    /// Wire representation
    pub fn to_value(&self) -> Value {
        match self {
            CachedValue::Entity(v) | CachedValue::Aggregate(v) => v.clone(),
            CachedValue::List(view) => view.to_value(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_detect_bare() {
        let view = ListView::detect(json!([{"_id": "L1"}, {"id": "L2"}])).unwrap();
        assert_eq!(view.shape, ListShape::Bare);
        assert!(view.contains("L1"));
        assert!(view.contains("L2"));
        assert_eq!(view.to_value(), json!([{"id": "L1"}, {"id": "L2"}]));
    }

    #[test]
    fn test_detect_wrapped_keeps_envelope() {
        let view = ListView::detect(json!({"data": [{"id": "L1"}], "total": 40})).unwrap();
        assert_eq!(view.shape, ListShape::Wrapped);
        assert_eq!(view.envelope.get("total"), Some(&json!(40)));
        assert_eq!(view.to_value(), json!({"data": [{"id": "L1"}], "total": 40}));
    }

    #[test]
    fn test_detect_nested() {
        let view = ListView::detect(json!({"leads": [{"id": "L1"}], "page": 2})).unwrap();
        assert_eq!(view.shape, ListShape::Nested);
        assert_eq!(view.items.len(), 1);
    }

    #[test]
    fn test_non_list_rejected() {
        assert!(ListView::detect(json!({"total": 3})).is_err());
        assert!(ListView::detect(json!({"data": "nope"})).is_err());
        assert!(ListView::detect(Value::Null).is_err());
        assert!(matches!(CachedValue::list(Value::Null), CachedValue::Aggregate(Value::Null)));
    }

    #[test]
    fn test_patch_and_remove_matching() {
        let mut view = ListView::detect(json!([
            {"id": "L1", "stage": "New Lead"},
            {"id": "L2", "stage": "New Lead"}
        ]))
        .unwrap();

        let touched = view.patch_matching("L2", &|item| item["stage"] = json!("Working"));
        assert_eq!(touched, 1);
        assert_eq!(view.items[0]["stage"], json!("New Lead"));
        assert_eq!(view.items[1]["stage"], json!("Working"));

        assert_eq!(view.patch_matching("L9", &|item| item["stage"] = json!("Nurture")), 0);

        assert_eq!(view.remove_matching("L1"), 1);
        assert_eq!(view.items.len(), 1);
    }
}
