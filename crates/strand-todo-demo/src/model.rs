#![forbid(unsafe_code)]

//! The Todo data layer: model factory and the ordered, persisted
//! collection.

use std::rc::Rc;

use strand_core::{Collection, Comparator, KeyValueStore, LocalStore, Model, Value};

/// Namespace key the todos persist under.
pub const STORE_NAMESPACE: &str = "todos-strand";

/// Build one todo. Defaults: empty `title`, not `completed`.
#[must_use]
pub fn todo_model(value: &Value) -> Model {
    let model = match value {
        Value::Object(map) => Model::from_attrs(map.iter().map(|(k, v)| (k.clone(), v.clone()))),
        Value::Bag(bag) => Model::from_json(bag.to_json()),
        Value::Model(existing) => existing.clone(),
        _ => Model::new(),
    };
    model.apply_defaults([
        ("title", Value::from("")),
        ("completed", Value::Bool(false)),
    ]);
    model
}

/// The todos collection: ordered by `order`, persisted through a local
/// store under [`STORE_NAMESPACE`].
#[must_use]
pub fn todo_collection(store: Rc<dyn KeyValueStore>) -> Collection {
    let collection = Collection::new();
    collection.set_factory(todo_model);
    collection.set_comparator(Comparator::Property("order".to_owned()));
    collection.set_transport(Rc::new(LocalStore::new(store, STORE_NAMESPACE)));
    collection
}

/// Todo-specific queries over the collection.
pub trait TodoCollectionExt {
    /// The finished todos.
    fn completed(&self) -> Vec<Model>;
    /// The todos still to do.
    fn remaining(&self) -> Vec<Model>;
    /// The next `order` number; insertion order survives the unordered
    /// store.
    fn next_order(&self) -> i64;
}

impl TodoCollectionExt for Collection {
    fn completed(&self) -> Vec<Model> {
        self.models()
            .into_iter()
            .filter(|todo| todo.get("completed").truthy())
            .collect()
    }

    fn remaining(&self) -> Vec<Model> {
        self.models()
            .into_iter()
            .filter(|todo| !todo.get("completed").truthy())
            .collect()
    }

    fn next_order(&self) -> i64 {
        match self.last() {
            None => 1,
            Some(todo) => todo.get("order").as_i64().unwrap_or(0) + 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_core::MemoryStore;

    #[test]
    fn factory_applies_defaults() {
        let todo = todo_model(&Value::from_json(serde_json::json!({"order": 3})));
        assert_eq!(todo.get("title"), Value::from(""));
        assert_eq!(todo.get("completed"), Value::Bool(false));
        assert_eq!(todo.get("order"), Value::Int(3));
    }

    #[test]
    fn factory_keeps_explicit_values() {
        let todo = todo_model(&Value::from_json(
            serde_json::json!({"title": "walk", "completed": true}),
        ));
        assert_eq!(todo.get("title"), Value::from("walk"));
        assert_eq!(todo.get("completed"), Value::Bool(true));
    }

    #[test]
    fn collection_keeps_order_comparator_order() {
        let collection = todo_collection(Rc::new(MemoryStore::new()));
        for order in [3, 1, 2] {
            collection.push(Value::from_json(
                serde_json::json!({"title": order.to_string(), "order": order}),
            ));
        }
        assert_eq!(
            collection.pluck("order"),
            vec![Value::Int(1), Value::Int(2), Value::Int(3)]
        );
    }

    #[test]
    fn completed_and_remaining_partition() {
        let collection = todo_collection(Rc::new(MemoryStore::new()));
        collection.push(Value::from_json(
            serde_json::json!({"title": "a", "order": 1, "completed": true}),
        ));
        collection.push(Value::from_json(
            serde_json::json!({"title": "b", "order": 2}),
        ));
        assert_eq!(collection.completed().len(), 1);
        assert_eq!(collection.remaining().len(), 1);
    }

    #[test]
    fn next_order_counts_from_the_tail() {
        let collection = todo_collection(Rc::new(MemoryStore::new()));
        assert_eq!(collection.next_order(), 1);
        collection.push(Value::from_json(serde_json::json!({"order": 5})));
        assert_eq!(collection.next_order(), 6);
    }
}
