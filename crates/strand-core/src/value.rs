#![forbid(unsafe_code)]

//! Dynamic value type shared across the framework.
//!
//! `Value` is the currency of every bindable surface: property bags, model
//! attributes, list items, and DOM element properties all traffic in it.
//! Scalars compare by value; framework handles (`Bag`, `Model`, `List`,
//! `Collection`) compare by identity, so the "setting an unchanged value is
//! a no-op" rule means *same instance*, never structural equality.
//!
//! Plain JSON objects deserialize to [`Value::Object`] (deep equality), not
//! to a `Bag`; wrapping an object in an observable bag is a binding-layer
//! decision, not a deserialization one.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use crate::bag::Bag;
use crate::collection::Collection;
use crate::dispatch::Dispatcher;
use crate::list::List;
use crate::model::Model;

/// A dynamically-typed framework value.
#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(Vec<Value>),
    /// A plain (non-observable) JSON object.
    Object(BTreeMap<String, Value>),
    Bag(Bag),
    Model(Model),
    List(List),
    Collection(Collection),
}

impl Value {
    /// Whether this value is `Null`.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// JavaScript-flavored truthiness, used by the class/visibility bindings.
    #[must_use]
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::Array(_)
            | Value::Object(_)
            | Value::Bag(_)
            | Value::Model(_)
            | Value::List(_)
            | Value::Collection(_) => true,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Float(n) if n.fract() == 0.0 => Some(*n as i64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bag(&self) -> Option<&Bag> {
        match self {
            Value::Bag(b) => Some(b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_model(&self) -> Option<&Model> {
        match self {
            Value::Model(m) => Some(m),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&List> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_collection(&self) -> Option<&Collection> {
        match self {
            Value::Collection(c) => Some(c),
            _ => None,
        }
    }

    /// The dispatcher of an observable value, if this value is one.
    ///
    /// Lists use this to decide whether an inserted item's change events
    /// should bubble.
    #[must_use]
    pub fn dispatcher(&self) -> Option<Dispatcher> {
        match self {
            Value::Bag(b) => Some(b.dispatcher().clone()),
            Value::Model(m) => Some(m.dispatcher().clone()),
            Value::List(l) => Some(l.dispatcher().clone()),
            Value::Collection(c) => Some(c.dispatcher().clone()),
            _ => None,
        }
    }

    /// Serialize to JSON. Observable handles serialize through their own
    /// `to_json`, so a value graph flattens to plain data.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(n) => serde_json::Value::from(*n),
            Value::Float(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Object(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Value::Bag(b) => b.to_json(),
            Value::Model(m) => m.to_json(),
            Value::List(l) => l.to_json(),
            Value::Collection(c) => c.to_json(),
        }
    }

    /// Deserialize from JSON. Integral numbers become `Int`, everything else
    /// numeric becomes `Float`; objects stay plain (see module docs).
    #[must_use]
    pub fn from_json(json: serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// The text a one-way binding writes into an element: `Null` renders as
    /// the empty string, scalars as themselves, containers as JSON.
    #[must_use]
    pub fn display_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(n) => n.to_string(),
            Value::Float(n) => n.to_string(),
            Value::Str(s) => s.clone(),
            other => other.to_json().to_string(),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Float(_) => 2,
            Value::Str(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
            Value::Bag(_) => 6,
            Value::Model(_) => 7,
            Value::List(_) => 8,
            Value::Collection(_) => 9,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                *a as f64 == *b
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Bag(a), Value::Bag(b)) => a == b,
            (Value::Model(a), Value::Model(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Collection(a), Value::Collection(b)) => a == b,
            _ => false,
        }
    }
}

/// Total ordering over values, used by comparator-sorted collections.
///
/// Values order by type rank first, then within-type; numbers compare
/// across `Int`/`Float` and floats use `total_cmp`. Handles fall back to
/// dispatcher-id order so the result is deterministic.
#[must_use]
pub fn cmp_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::Int(x), Value::Float(y)) => (*x as f64).total_cmp(y),
        (Value::Float(x), Value::Int(y)) => x.total_cmp(&(*y as f64)),
        (Value::Float(x), Value::Float(y)) => x.total_cmp(y),
        (Value::Str(x), Value::Str(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (xa, ya) in x.iter().zip(y.iter()) {
                let ord = cmp_values(xa, ya);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => match a.rank().cmp(&b.rank()) {
            Ordering::Equal => match (a.dispatcher(), b.dispatcher()) {
                (Some(x), Some(y)) => x.id().cmp(&y.id()),
                _ => Ordering::Equal,
            },
            other => other,
        },
    }
}

/// Escape `<`, `>`, `&`, `"` and `'` for safe text rendering.
#[must_use]
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_text())
    }
}

impl serde::Serialize for Value {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<Bag> for Value {
    fn from(b: Bag) -> Self {
        Value::Bag(b)
    }
}

impl From<Model> for Value {
    fn from(m: Model) -> Self {
        Value::Model(m)
    }
}

impl From<List> for Value {
    fn from(l: List) -> Self {
        Value::List(l)
    }
}

impl From<Collection> for Value {
    fn from(c: Collection) -> Self {
        Value::Collection(c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_is_default() {
        assert_eq!(Value::default(), Value::Null);
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Null.truthy());
        assert!(!Value::Bool(false).truthy());
        assert!(!Value::Int(0).truthy());
        assert!(!Value::Str(String::new()).truthy());
        assert!(Value::Bool(true).truthy());
        assert!(Value::Int(-1).truthy());
        assert!(Value::Str("x".into()).truthy());
        assert!(Value::Array(vec![]).truthy());
    }

    #[test]
    fn json_round_trip_scalars() {
        for v in [
            Value::Null,
            Value::Bool(true),
            Value::Int(42),
            Value::Str("hello".into()),
        ] {
            assert_eq!(Value::from_json(v.to_json()), v);
        }
    }

    #[test]
    fn json_objects_stay_plain() {
        let v = Value::from_json(serde_json::json!({"a": 1, "b": [true]}));
        let Value::Object(map) = &v else {
            panic!("expected object, got {v:?}");
        };
        assert_eq!(map.get("a"), Some(&Value::Int(1)));
        assert_eq!(v, Value::from_json(serde_json::json!({"b": [true], "a": 1})));
    }

    #[test]
    fn mixed_number_equality() {
        assert_eq!(Value::Int(2), Value::Float(2.0));
        assert_ne!(Value::Int(2), Value::Float(2.5));
    }

    #[test]
    fn cmp_orders_numbers_across_kinds() {
        assert_eq!(cmp_values(&Value::Int(1), &Value::Float(1.5)), Ordering::Less);
        assert_eq!(cmp_values(&Value::Float(3.0), &Value::Int(2)), Ordering::Greater);
        assert_eq!(cmp_values(&Value::Int(2), &Value::Float(2.0)), Ordering::Equal);
    }

    #[test]
    fn display_text_renders_null_empty() {
        assert_eq!(Value::Null.display_text(), "");
        assert_eq!(Value::Str("8 < 10".into()).display_text(), "8 < 10");
        assert_eq!(Value::Int(7).display_text(), "7");
    }

    #[test]
    fn escape_html_covers_specials() {
        assert_eq!(escape_html("8 < 10 & 'x' \"y\""), "8 &lt; 10 &amp; &#39;x&#39; &quot;y&quot;");
    }

    #[test]
    fn serializes_through_its_json_form() {
        let value = Value::Array(vec![Value::Int(1), Value::from("x"), Value::Null]);
        assert_eq!(serde_json::to_string(&value).unwrap(), r#"[1,"x",null]"#);
    }

    #[test]
    fn bag_equality_is_identity() {
        let a = Bag::new();
        let b = Bag::new();
        assert_eq!(Value::Bag(a.clone()), Value::Bag(a.clone()));
        assert_ne!(Value::Bag(a), Value::Bag(b));
    }
}
