#![forbid(unsafe_code)]

//! Safe property-path resolution over the view scope.
//!
//! Binding expressions like `todos.selected.title` resolve segment by
//! segment through observable values — an explicit walk over a typed
//! object graph, never string evaluation. Every intermediate segment must
//! hold a bag or a model; anything else is an undefined path, which is a
//! programmer error surfaced at bind time.

use strand_core::{Bag, Dispatcher, Model, SetOptions, Value};

use super::BindError;

/// An observable source a binding reads from and writes to.
#[derive(Clone)]
pub enum BindingSource {
    Bag(Bag),
    Model(Model),
}

impl std::fmt::Debug for BindingSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BindingSource::Bag(_) => f.write_str("BindingSource::Bag"),
            BindingSource::Model(_) => f.write_str("BindingSource::Model"),
        }
    }
}

impl BindingSource {
    #[must_use]
    pub fn get(&self, property: &str) -> Value {
        match self {
            BindingSource::Bag(bag) => bag.get(property),
            BindingSource::Model(model) => model.get(property),
        }
    }

    /// Write from the DOM side. A model's validation rejection leaves the
    /// write unapplied; the model has already dispatched `invalid`.
    pub fn set(&self, property: &str, value: Value) {
        match self {
            BindingSource::Bag(bag) => bag.set(property, value),
            BindingSource::Model(model) => {
                if let Err(error) = model.set_one(property, value, SetOptions::default()) {
                    tracing::debug!(property, %error, "binding write rejected");
                }
            }
        }
    }

    #[must_use]
    pub fn dispatcher(&self) -> Dispatcher {
        match self {
            BindingSource::Bag(bag) => bag.dispatcher().clone(),
            BindingSource::Model(model) => model.dispatcher().clone(),
        }
    }
}

/// Strip everything but word characters and dots from a path expression.
#[must_use]
pub fn clean_property_path(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '.')
        .collect()
}

/// Resolve a dotted path against the scope, yielding the owning source and
/// the final property name.
pub fn resolve(scope: &Bag, raw_path: &str) -> Result<(BindingSource, String), BindError> {
    let path = clean_property_path(raw_path);
    let mut segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
    let Some(property) = segments.pop() else {
        return Err(BindError::UndefinedPath {
            path: raw_path.to_owned(),
        });
    };

    let mut source = BindingSource::Bag(scope.clone());
    for segment in segments {
        source = match source.get(segment) {
            Value::Bag(bag) => BindingSource::Bag(bag),
            Value::Model(model) => BindingSource::Model(model),
            _ => {
                return Err(BindError::UndefinedPath {
                    path: raw_path.to_owned(),
                });
            }
        };
    }
    Ok((source, property.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_a_bare_property_to_the_scope() {
        let scope = Bag::from_pairs([("title", Value::from("t"))]);
        let (source, property) = resolve(&scope, "title").unwrap();
        assert_eq!(property, "title");
        assert_eq!(source.get(&property), Value::from("t"));
    }

    #[test]
    fn walks_nested_models() {
        let model = Model::from_attrs([("title", Value::from("inner"))]);
        let scope = Bag::from_pairs([("data", Value::Model(model.clone()))]);
        let (source, property) = resolve(&scope, "data.title").unwrap();
        assert_eq!(source.get(&property), Value::from("inner"));
        source.set(&property, Value::from("changed"));
        assert_eq!(model.get("title"), Value::from("changed"));
    }

    #[test]
    fn walks_nested_bags() {
        let inner = Bag::from_pairs([("n", Value::Int(1))]);
        let outer = Bag::from_pairs([("config", Value::Bag(inner))]);
        let scope = Bag::from_pairs([("app", Value::Bag(outer))]);
        let (source, property) = resolve(&scope, "app.config.n").unwrap();
        assert_eq!(source.get(&property), Value::Int(1));
    }

    #[test]
    fn non_observable_segment_is_undefined() {
        let scope = Bag::from_pairs([("n", Value::Int(1))]);
        let error = resolve(&scope, "n.title").unwrap_err();
        assert!(matches!(error, BindError::UndefinedPath { .. }));
    }

    #[test]
    fn empty_path_is_undefined() {
        let scope = Bag::new();
        assert!(resolve(&scope, "").is_err());
        assert!(resolve(&scope, "...").is_err());
    }

    #[test]
    fn cleaning_strips_expression_noise() {
        assert_eq!(clean_property_path("this.model.title"), "this.model.title");
        assert_eq!(clean_property_path("a-b(c) d"), "abcd");
    }

    #[test]
    fn missing_property_on_valid_source_resolves_to_null() {
        // Binding to an absent property is allowed; it reads Null and can
        // be written later.
        let scope = Bag::new();
        scope.declare("model");
        let (source, property) = resolve(&scope, "model").unwrap();
        assert_eq!(source.get(&property), Value::Null);
    }

    #[test]
    fn model_validation_rejection_leaves_value() {
        let model = Model::from_attrs([("n", Value::Int(1))]);
        model.set_validator(|attrs| {
            (attrs.get("n").and_then(Value::as_i64).unwrap_or(0) > 10)
                .then(|| Value::from("too big"))
        });
        let source = BindingSource::Model(model.clone());
        source.set("n", Value::Int(99));
        assert_eq!(model.get("n"), Value::Int(1));
    }
}
