#![forbid(unsafe_code)]

//! Observable property bag.
//!
//! A [`Bag`] is the framework's base bindable data type: named properties
//! behind a `get`/`set` pair that dispatches `change:<property>` followed by
//! `change` on every effective write. `set` with a value strictly equal to
//! the current one is a no-op — nothing fires.
//!
//! Computed properties are installed with [`Bag::define_property`]: an
//! explicit setter runs its own logic against the raw property map first and
//! the change events fire afterward, so subclass-style derived properties
//! still participate in data binding.
//!
//! # Invariants
//!
//! 1. `set` dispatches `change:<p>` then `change`, or nothing at all.
//! 2. Accessor definitions never overwrite an existing accessor.
//! 3. A getter runs against the raw property map; it must not re-enter the
//!    owning bag (the map is borrowed for the duration of the call).

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::dispatch::{Dispatcher, DispatcherId};
use crate::event::{Detail, Event, kind};
use crate::value::Value;

type Props = BTreeMap<String, Value>;
type Getter = Rc<dyn Fn(&Props) -> Value>;
type Setter = Rc<dyn Fn(&mut Props, Value)>;

/// Accessor definition for [`Bag::define_property`].
#[derive(Clone)]
pub struct PropertyDef {
    getter: Option<Getter>,
    setter: Option<Setter>,
    enumerable: bool,
}

impl PropertyDef {
    /// A computed, read-only property.
    #[must_use]
    pub fn computed(getter: impl Fn(&Props) -> Value + 'static) -> Self {
        Self {
            getter: Some(Rc::new(getter)),
            setter: None,
            enumerable: true,
        }
    }

    /// A property with explicit write logic; the setter runs before the
    /// change events fire.
    #[must_use]
    pub fn with_setter(mut self, setter: impl Fn(&mut Props, Value) + 'static) -> Self {
        self.setter = Some(Rc::new(setter));
        self
    }

    /// A write-wrapped property with the default read.
    #[must_use]
    pub fn writable(setter: impl Fn(&mut Props, Value) + 'static) -> Self {
        Self {
            getter: None,
            setter: Some(Rc::new(setter)),
            enumerable: true,
        }
    }

    /// Exclude this property from iteration (`keys`/`to_json`).
    #[must_use]
    pub fn non_enumerable(mut self) -> Self {
        self.enumerable = false;
        self
    }
}

struct BagInner {
    dispatcher: Dispatcher,
    props: RefCell<Props>,
    accessors: RefCell<BTreeMap<String, PropertyDef>>,
}

/// An observable bag of named properties. Cloning shares state.
#[derive(Clone)]
pub struct Bag {
    inner: Rc<BagInner>,
}

impl Default for Bag {
    fn default() -> Self {
        Self::new()
    }
}

impl Bag {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(BagInner {
                dispatcher: Dispatcher::new(),
                props: RefCell::new(Props::new()),
                accessors: RefCell::new(BTreeMap::new()),
            }),
        }
    }

    /// Build a bag from initial properties. No events fire.
    #[must_use]
    pub fn from_pairs<K, I>(pairs: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let bag = Self::new();
        {
            let mut props = bag.inner.props.borrow_mut();
            for (key, value) in pairs {
                props.insert(key.into(), value);
            }
        }
        bag
    }

    /// Fill in properties that are absent, silently. Existing values win.
    pub fn defaults<K, I>(&self, pairs: I)
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let mut props = self.inner.props.borrow_mut();
        for (key, value) in pairs {
            props.entry(key.into()).or_insert(value);
        }
    }

    /// Declare a property slot (as `Null`) without dispatching. Used for
    /// dependency-injection targets.
    pub fn declare(&self, name: impl Into<String>) {
        self.inner
            .props
            .borrow_mut()
            .entry(name.into())
            .or_insert(Value::Null);
    }

    /// Whether the bag carries `name`, as a raw property or an accessor.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.inner.props.borrow().contains_key(name)
            || self.inner.accessors.borrow().contains_key(name)
    }

    /// Read a property. Absent properties read as `Null`.
    #[must_use]
    pub fn get(&self, name: &str) -> Value {
        let accessor = self.inner.accessors.borrow().get(name).cloned();
        if let Some(getter) = accessor.and_then(|a| a.getter) {
            return getter(&self.inner.props.borrow());
        }
        self.inner
            .props
            .borrow()
            .get(name)
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Write a property, dispatching `change:<name>` then `change` if the
    /// value actually changed (strict equality).
    pub fn set(&self, name: &str, value: Value) {
        let accessor = self.inner.accessors.borrow().get(name).cloned();
        if let Some(accessor) = accessor {
            match accessor.setter {
                Some(setter) => {
                    setter(&mut self.inner.props.borrow_mut(), value);
                    let current = self.get(name);
                    self.dispatch_change(name, current);
                }
                None => {
                    tracing::warn!(property = name, "write to read-only computed property ignored");
                }
            }
            return;
        }

        let previous = self
            .inner
            .props
            .borrow()
            .get(name)
            .cloned()
            .unwrap_or(Value::Null);
        if previous == value {
            return;
        }
        self.inner
            .props
            .borrow_mut()
            .insert(name.to_owned(), value.clone());
        self.dispatch_change(name, value);
    }

    /// Write several properties; each effective change dispatches its own
    /// pair of events. (Models layer the one-aggregate-`change` protocol on
    /// top of this.)
    pub fn set_many<K, I>(&self, pairs: I)
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        for (key, value) in pairs {
            self.set(&key.into(), value);
        }
    }

    /// Install an accessor. A no-op when `name` already has one.
    pub fn define_property(&self, name: impl Into<String>, def: PropertyDef) {
        let name = name.into();
        let mut accessors = self.inner.accessors.borrow_mut();
        if accessors.contains_key(&name) {
            return;
        }
        if def.getter.is_none() && def.setter.is_none() {
            // Plain backing property: the default set/get path already
            // dispatches, so only the slot needs to exist.
            drop(accessors);
            self.declare(name);
            return;
        }
        accessors.insert(name, def);
    }

    /// Enumerable property names, raw and computed.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let accessors = self.inner.accessors.borrow();
        let mut keys: Vec<String> = self
            .inner
            .props
            .borrow()
            .keys()
            .filter(|k| accessors.get(k.as_str()).is_none_or(|a| a.enumerable))
            .cloned()
            .collect();
        for (name, def) in accessors.iter() {
            if def.enumerable && def.getter.is_some() && !keys.contains(name) {
                keys.push(name.clone());
            }
        }
        keys.sort();
        keys
    }

    /// JSON form: enumerable properties whose names don't start with `_`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for key in self.keys() {
            if key.starts_with('_') {
                continue;
            }
            map.insert(key.clone(), self.get(&key).to_json());
        }
        serde_json::Value::Object(map)
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    #[must_use]
    pub fn id(&self) -> DispatcherId {
        self.inner.dispatcher.id()
    }

    fn dispatch_change(&self, name: &str, value: Value) {
        self.inner.dispatcher.dispatch(Event::with_detail(
            kind::change_of(name),
            Detail::Change {
                property: name.to_owned(),
                value: value.clone(),
            },
        ));
        self.inner.dispatcher.dispatch(Event::with_detail(
            kind::CHANGE,
            Detail::Change {
                property: name.to_owned(),
                value,
            },
        ));
    }
}

impl PartialEq for Bag {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Bag {}

impl fmt::Debug for Bag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bag")
            .field("id", &self.id())
            .field("keys", &self.keys())
            .finish()
    }
}
