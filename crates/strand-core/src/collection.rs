#![forbid(unsafe_code)]

//! Collections: ordered, id-indexed sets of models.
//!
//! A [`Collection`] layers model lifecycle over the list shape: members are
//! always [`Model`]s produced by a configurable factory, indexed by `id` and
//! `cid` for O(1) lookup, and optionally kept in comparator order. Every
//! member's events proxy onto the collection itself, so one listener on the
//! collection observes the whole set.
//!
//! # Invariants
//!
//! 1. With a comparator and no explicit insertion index, iteration order is
//!    comparator order after any sequence of adds and removes.
//! 2. `remove` is idempotent per call; absent models are a silent no-op.
//! 3. `add`/`remove` events that originate in a *different* collection are
//!    filtered out of the proxy (no cross-collection cross-talk).
//! 4. A model's `destroy` event removes it from the collection.
//! 5. Re-keying: when a member's id attribute changes, the id index follows.
//!
//! # Failure Modes
//!
//! - Sorting without a comparator is a programmer error and panics.
//! - A factory-built model that fails validation is skipped; the collection
//!   dispatches `invalid` and carries on with the remaining items.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use ahash::{AHashMap, AHashSet};

use crate::dispatch::{Dispatcher, DispatcherId, ListenerId};
use crate::event::{Detail, Event, kind};
use crate::model::{Model, ModelError, SetOptions};
use crate::sync::{RequestHandle, SyncError, SyncMethod, SyncOptions, SyncTarget, Transport, TransportFailure};
use crate::value::{Value, cmp_values};

/// Ordering policy for a collection.
#[derive(Clone)]
pub enum Comparator {
    /// Order by a derived key.
    Key(Rc<dyn Fn(&Model) -> Value>),
    /// Order by an attribute's value.
    Property(String),
    /// Full pairwise ordering.
    Ordering(Rc<dyn Fn(&Model, &Model) -> Ordering>),
}

impl Comparator {
    fn compare(&self, a: &Model, b: &Model) -> Ordering {
        match self {
            Comparator::Key(key) => cmp_values(&key(a), &key(b)),
            Comparator::Property(attr) => cmp_values(&a.get(attr), &b.get(attr)),
            Comparator::Ordering(compare) => compare(a, b),
        }
    }
}

/// Flags controlling the three-way reconciliation in [`Collection::set`].
#[derive(Clone, Copy, Debug)]
pub struct SetSemantics {
    /// Insert genuinely new models.
    pub add: bool,
    /// Remove models absent from the incoming list.
    pub remove: bool,
    /// Merge matched models' attributes in place.
    pub merge: bool,
    /// Explicit insertion index; suppresses comparator re-sorting.
    pub at: Option<usize>,
    /// Suppress events.
    pub silent: bool,
    /// Allow comparator re-sorting (on by default).
    pub sort: bool,
}

impl Default for SetSemantics {
    fn default() -> Self {
        Self {
            add: true,
            remove: true,
            merge: true,
            at: None,
            silent: false,
            sort: true,
        }
    }
}

impl SetSemantics {
    /// The `add` flavor: insert new models, leave the rest alone.
    #[must_use]
    pub fn adds_only() -> Self {
        Self {
            remove: false,
            merge: false,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn at(mut self, index: usize) -> Self {
        self.at = Some(index);
        self
    }

    #[must_use]
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }
}

type Factory = Rc<dyn Fn(&Value) -> Model>;

pub(crate) struct CollectionInner {
    dispatcher: Dispatcher,
    models: RefCell<Vec<Model>>,
    by_id: RefCell<AHashMap<String, Model>>,
    by_cid: RefCell<AHashMap<u64, Model>>,
    listeners: RefCell<AHashMap<u64, ListenerId>>,
    comparator: RefCell<Option<Comparator>>,
    factory: RefCell<Factory>,
    transport: RefCell<Option<Rc<dyn Transport>>>,
    url: RefCell<Option<String>>,
}

impl Drop for CollectionInner {
    fn drop(&mut self) {
        let listeners = self.listeners.get_mut();
        for model in self.models.get_mut().iter() {
            if let Some(listener) = listeners.remove(&model.cid().raw()) {
                model.dispatcher().remove_listener(listener);
            }
        }
    }
}

/// An ordered, id-indexed set of models. Cloning shares state.
#[derive(Clone)]
pub struct Collection {
    inner: Rc<CollectionInner>,
}

fn default_factory(value: &Value) -> Model {
    match value {
        Value::Model(model) => model.clone(),
        Value::Object(map) => {
            Model::from_attrs(map.iter().map(|(k, v)| (k.clone(), v.clone())))
        }
        Value::Bag(bag) => Model::from_json(bag.to_json()),
        other => Model::from_attrs([("value".to_owned(), other.clone())]),
    }
}

impl Default for Collection {
    fn default() -> Self {
        Self::new()
    }
}

impl Collection {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(CollectionInner {
                dispatcher: Dispatcher::new(),
                models: RefCell::new(Vec::new()),
                by_id: RefCell::new(AHashMap::new()),
                by_cid: RefCell::new(AHashMap::new()),
                listeners: RefCell::new(AHashMap::new()),
                comparator: RefCell::new(None),
                factory: RefCell::new(Rc::new(default_factory)),
                transport: RefCell::new(None),
                url: RefCell::new(None),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Rc<CollectionInner>) -> Self {
        Self { inner }
    }

    // ── configuration ───────────────────────────────────────────────────

    pub fn set_comparator(&self, comparator: Comparator) {
        *self.inner.comparator.borrow_mut() = Some(comparator);
    }

    /// The model factory used for non-model items (raw attribute objects).
    pub fn set_factory(&self, factory: impl Fn(&Value) -> Model + 'static) {
        *self.inner.factory.borrow_mut() = Rc::new(factory);
    }

    pub fn set_transport(&self, transport: Rc<dyn Transport>) {
        *self.inner.transport.borrow_mut() = Some(transport);
    }

    #[must_use]
    pub fn transport(&self) -> Option<Rc<dyn Transport>> {
        self.inner.transport.borrow().clone()
    }

    pub fn set_url(&self, url: impl Into<String>) {
        *self.inner.url.borrow_mut() = Some(url.into());
    }

    #[must_use]
    pub fn url(&self) -> Option<String> {
        self.inner.url.borrow().clone()
    }

    // ── reads ───────────────────────────────────────────────────────────

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.models.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.models.borrow().is_empty()
    }

    #[must_use]
    pub fn at(&self, index: usize) -> Option<Model> {
        self.inner.models.borrow().get(index).cloned()
    }

    #[must_use]
    pub fn first(&self) -> Option<Model> {
        self.at(0)
    }

    #[must_use]
    pub fn last(&self) -> Option<Model> {
        let models = self.inner.models.borrow();
        models.last().cloned()
    }

    /// A snapshot of the member models in order.
    #[must_use]
    pub fn models(&self) -> Vec<Model> {
        self.inner.models.borrow().clone()
    }

    #[must_use]
    pub fn index_of(&self, model: &Model) -> Option<usize> {
        self.inner.models.borrow().iter().position(|m| m == model)
    }

    /// Resolve a member by model identity, id value, or id text.
    #[must_use]
    pub fn find(&self, key: &Value) -> Option<Model> {
        match key {
            Value::Model(model) => self.lookup(model),
            other => self.inner.by_id.borrow().get(&other.display_text()).cloned(),
        }
    }

    #[must_use]
    pub fn get_by_id(&self, id: &str) -> Option<Model> {
        self.inner.by_id.borrow().get(id).cloned()
    }

    /// Members whose attributes all equal the given pairs.
    #[must_use]
    pub fn where_attrs(&self, attrs: &[(&str, Value)]) -> Vec<Model> {
        self.inner
            .models
            .borrow()
            .iter()
            .filter(|model| attrs.iter().all(|(attr, value)| model.get(attr) == *value))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn find_where(&self, attrs: &[(&str, Value)]) -> Option<Model> {
        self.where_attrs(attrs).into_iter().next()
    }

    /// One attribute's value from every member, in order.
    #[must_use]
    pub fn pluck(&self, attr: &str) -> Vec<Value> {
        self.inner
            .models
            .borrow()
            .iter()
            .map(|model| model.get(attr))
            .collect()
    }

    /// The insertion index that keeps comparator order.
    ///
    /// # Panics
    ///
    /// Panics without a comparator.
    #[must_use]
    pub fn sorted_index(&self, model: &Model) -> usize {
        let comparator = self.inner.comparator.borrow().clone();
        let comparator = comparator.expect("sorted_index requires a comparator");
        self.inner
            .models
            .borrow()
            .partition_point(|m| comparator.compare(m, model) == Ordering::Less)
    }

    // ── mutation ────────────────────────────────────────────────────────

    /// Insert new models (no merge, no removal).
    pub fn add(&self, items: Vec<Value>) {
        self.set(items, SetSemantics::adds_only());
    }

    /// Insert new models at an explicit index (suppresses re-sorting).
    pub fn add_at(&self, items: Vec<Value>, index: usize) {
        self.set(items, SetSemantics::adds_only().at(index));
    }

    /// Append one item; with a comparator the collection re-sorts, so the
    /// model lands in comparator order. Returns the member model.
    pub fn push(&self, item: Value) -> Option<Model> {
        let model = match self.prepare(item) {
            Ok(model) => model,
            Err(_) => return None,
        };
        self.set(vec![Value::Model(model.clone())], SetSemantics::adds_only());
        Some(model)
    }

    /// Remove and return the last member.
    pub fn pop(&self) -> Option<Model> {
        let model = self.last()?;
        self.remove(&[model.clone()]);
        Some(model)
    }

    /// Prepend one item (explicit index 0: no re-sorting).
    pub fn unshift(&self, item: Value) -> Option<Model> {
        let model = match self.prepare(item) {
            Ok(model) => model,
            Err(_) => return None,
        };
        self.set(
            vec![Value::Model(model.clone())],
            SetSemantics::adds_only().at(0),
        );
        Some(model)
    }

    /// Remove and return the first member.
    pub fn shift(&self) -> Option<Model> {
        let model = self.first()?;
        self.remove(&[model.clone()]);
        Some(model)
    }

    /// Remove models. Absent models are silently skipped.
    pub fn remove(&self, models: &[Model]) {
        self.remove_models(models, false);
    }

    /// Three-way reconciliation against an incoming list: merge matched
    /// models in place, insert genuinely new ones, drop the rest —
    /// controlled by [`SetSemantics`].
    pub fn set(&self, items: Vec<Value>, semantics: SetSemantics) {
        let comparator = self.inner.comparator.borrow().clone();
        let sortable = semantics.sort && semantics.at.is_none() && comparator.is_some();
        let sort_property = match &comparator {
            Some(Comparator::Property(attr)) => Some(attr.clone()),
            _ => None,
        };

        let mut needs_sort = false;
        let mut to_add: Vec<Model> = Vec::new();
        let mut matched: AHashSet<u64> = AHashSet::new();

        for item in items {
            let model = match self.prepare(item) {
                Ok(model) => model,
                Err(_) => continue,
            };
            if let Some(existing) = self.lookup(&model) {
                if semantics.remove {
                    matched.insert(existing.cid().raw());
                }
                if semantics.merge && existing != model {
                    let attrs: Vec<(String, Value)> = existing_merge_attrs(&model);
                    let _ = existing.set(attrs, SetOptions::default());
                    if sortable && !needs_sort {
                        needs_sort = match &sort_property {
                            Some(attr) => existing.has_changed(Some(attr)),
                            None => existing.has_changed(None),
                        };
                    }
                }
            } else if semantics.add {
                self.wire(&model);
                to_add.push(model);
            }
        }

        if semantics.remove {
            let to_remove: Vec<Model> = self
                .inner
                .models
                .borrow()
                .iter()
                .filter(|model| !matched.contains(&model.cid().raw()))
                .cloned()
                .collect();
            if !to_remove.is_empty() {
                self.remove_models(&to_remove, semantics.silent);
            }
        }

        if !to_add.is_empty() {
            if sortable {
                needs_sort = true;
            }
            let mut models = self.inner.models.borrow_mut();
            match semantics.at {
                Some(at) => {
                    let at = at.min(models.len());
                    for (offset, model) in to_add.iter().enumerate() {
                        models.insert(at + offset, model.clone());
                    }
                }
                None => models.extend(to_add.iter().cloned()),
            }
        }

        if needs_sort {
            self.sort_in_place();
        }

        if semantics.silent {
            return;
        }
        for model in &to_add {
            let index = self.index_of(model);
            model.dispatcher().dispatch(Event::membership(
                kind::ADD,
                model.clone(),
                Some(self),
                index,
            ));
        }
        if needs_sort {
            self.inner.dispatcher.emit(kind::SORT);
        }
    }

    /// Replace the entire contents without add/remove events; fires one
    /// `reset` carrying the previous members.
    pub fn reset(&self, items: Vec<Value>) {
        let previous = self.models();
        for model in &previous {
            self.unwire(model);
        }
        self.inner.models.borrow_mut().clear();
        self.inner.by_id.borrow_mut().clear();
        self.inner.by_cid.borrow_mut().clear();
        self.set(items, SetSemantics { silent: true, ..SetSemantics::adds_only() });
        self.inner.dispatcher.dispatch(Event::with_detail(
            kind::RESET,
            Detail::Reset { previous },
        ));
    }

    /// Re-sort into comparator order; fires `sort`.
    ///
    /// # Panics
    ///
    /// Panics without a comparator.
    pub fn sort(&self) {
        self.sort_in_place();
        self.inner.dispatcher.emit(kind::SORT);
    }

    fn sort_in_place(&self) {
        let comparator = self.inner.comparator.borrow().clone();
        let comparator = comparator.expect("cannot sort a collection without a comparator");
        self.inner
            .models
            .borrow_mut()
            .sort_by(|a, b| comparator.compare(a, b));
    }

    // ── persistence ─────────────────────────────────────────────────────

    /// Build a model, add it (immediately, or on store confirmation with
    /// `wait`), and save it through the collection's transport.
    pub fn create(&self, item: Value, mut options: SyncOptions) -> Result<Model, ModelError> {
        let model = self
            .prepare(item)
            .map_err(|error| ModelError::Invalid { error })?;
        if model.transport().is_none() {
            if let Some(transport) = self.transport() {
                model.set_transport(transport);
            }
        }
        let wait = options.wait;
        if !wait {
            self.add(vec![Value::Model(model.clone())]);
        }
        let collection = self.clone();
        let pending = model.clone();
        let user_success = options.success.take();
        options.success = Some(Box::new(move |response: serde_json::Value| {
            if wait {
                collection.add(vec![Value::Model(pending.clone())]);
            }
            if let Some(callback) = user_success {
                callback(response);
            }
        }));
        model.save(None, options)?;
        Ok(model)
    }

    /// Fetch the collection's contents; routes through [`reset`](Self::reset)
    /// when `options.reset` is set, [`set`](Self::set) otherwise.
    pub fn fetch(&self, mut options: SyncOptions) -> Result<RequestHandle, ModelError> {
        let collection = self.clone();
        let reset = options.reset;
        let user_success = options.success.take();
        options.success = Some(Box::new(move |response: serde_json::Value| {
            let items: Vec<Value> = match response.clone() {
                serde_json::Value::Array(entries) => {
                    entries.into_iter().map(Value::from_json).collect()
                }
                _ => Vec::new(),
            };
            if reset {
                collection.reset(items);
            } else {
                collection.set(items, SetSemantics::default());
            }
            if let Some(callback) = user_success {
                callback(response.clone());
            }
            collection
                .inner
                .dispatcher
                .dispatch(Event::with_detail(kind::SYNC, Detail::Sync { response }));
        }));
        self.wrap_error(&mut options);
        let transport = self.transport().ok_or(SyncError::NoTransport)?;
        Ok(transport.sync(SyncMethod::Read, SyncTarget::Collection(self.clone()), options)?)
    }

    /// JSON form: the array of member JSON.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(
            self.inner
                .models
                .borrow()
                .iter()
                .map(Model::to_json)
                .collect(),
        )
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    #[must_use]
    pub fn id(&self) -> DispatcherId {
        self.inner.dispatcher.id()
    }

    // ── internals ───────────────────────────────────────────────────────

    fn lookup(&self, model: &Model) -> Option<Model> {
        if let Some(found) = self.inner.by_cid.borrow().get(&model.cid().raw()) {
            return Some(found.clone());
        }
        let id = model.id()?;
        self.inner.by_id.borrow().get(&id.display_text()).cloned()
    }

    fn prepare(&self, item: Value) -> Result<Model, Value> {
        if let Value::Model(model) = item {
            return Ok(model);
        }
        let factory = self.inner.factory.borrow().clone();
        let model = factory(&item);
        if model.is_valid() {
            Ok(model)
        } else {
            let error = model
                .validation_error()
                .unwrap_or_else(|| Value::from("model failed validation"));
            self.inner.dispatcher.dispatch(Event::with_detail(
                kind::INVALID,
                Detail::Invalid { error: error.clone() },
            ));
            Err(error)
        }
    }

    fn wire(&self, model: &Model) {
        model.attach_collection(&self.inner);
        self.inner
            .by_cid
            .borrow_mut()
            .insert(model.cid().raw(), model.clone());
        if let Some(id) = model.id() {
            self.inner
                .by_id
                .borrow_mut()
                .insert(id.display_text(), model.clone());
        }
        let weak = Rc::downgrade(&self.inner);
        let member = model.clone();
        let listener = model.dispatcher().on(kind::ALL, move |event| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            Collection::from_inner(inner).on_model_event(&member, event);
        });
        self.inner
            .listeners
            .borrow_mut()
            .insert(model.cid().raw(), listener);
    }

    fn unwire(&self, model: &Model) {
        if let Some(listener) = self
            .inner
            .listeners
            .borrow_mut()
            .remove(&model.cid().raw())
        {
            model.dispatcher().remove_listener(listener);
        }
        model.detach_collection(&self.inner);
    }

    /// Every member event lands here: re-index on id changes, self-remove
    /// on destroy, filter foreign membership events, proxy the rest.
    fn on_model_event(&self, model: &Model, event: &Event) {
        if matches!(event.kind(), kind::ADD | kind::REMOVE)
            && event.collection_id() != Some(self.id())
        {
            return;
        }

        if event.kind() == kind::DESTROY {
            self.remove_models(std::slice::from_ref(model), false);
        }

        if event.kind() == kind::change_of(&model.id_property()) {
            let id_property = model.id_property();
            let mut by_id = self.inner.by_id.borrow_mut();
            if let Some(previous) = model.previous(&id_property) {
                if !previous.is_null() {
                    by_id.remove(&previous.display_text());
                }
            }
            if let Some(id) = model.id() {
                by_id.insert(id.display_text(), model.clone());
            }
        }

        self.inner.dispatcher.dispatch(event.clone());
    }

    fn remove_models(&self, models: &[Model], silent: bool) {
        for model in models {
            let Some(found) = self.lookup(model) else {
                continue; // absent: a silent no-op
            };
            let index = {
                let mut members = self.inner.models.borrow_mut();
                let Some(index) = members.iter().position(|m| *m == found) else {
                    continue;
                };
                members.remove(index);
                index
            };
            if let Some(id) = found.id() {
                self.inner.by_id.borrow_mut().remove(&id.display_text());
            }
            self.inner.by_cid.borrow_mut().remove(&found.cid().raw());
            if !silent {
                self.inner.dispatcher.dispatch(Event::membership(
                    kind::REMOVE,
                    found.clone(),
                    Some(self),
                    Some(index),
                ));
            }
            self.unwire(&found);
        }
    }

    fn wrap_error(&self, options: &mut SyncOptions) {
        let collection = self.clone();
        let user_error = options.error.take();
        options.error = Some(Box::new(move |failure: TransportFailure| {
            if let Some(callback) = user_error {
                callback(failure.clone());
            }
            collection.inner.dispatcher.dispatch(Event::with_detail(
                kind::ERROR,
                Detail::Failed {
                    error: Value::from(failure.message),
                },
            ));
        }));
    }
}

fn existing_merge_attrs(incoming: &Model) -> Vec<(String, Value)> {
    incoming.attributes().into_iter().collect()
}

impl PartialEq for Collection {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Collection {}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("id", &self.id())
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn order_collection() -> Collection {
        let collection = Collection::new();
        collection.set_comparator(Comparator::Property("order".into()));
        collection
    }

    fn todo(order: i64, title: &str) -> Value {
        Value::Model(Model::from_attrs([
            ("order".to_owned(), Value::Int(order)),
            ("title".to_owned(), Value::from(title)),
        ]))
    }

    fn counter(collection: &Collection, kinds: &str) -> Rc<Cell<usize>> {
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        collection.dispatcher().on(kinds, move |_| c.set(c.get() + 1));
        count
    }

    #[test]
    fn push_in_any_order_iterates_in_comparator_order() {
        let collection = order_collection();
        collection.push(todo(3, "three"));
        collection.push(todo(1, "one"));
        collection.push(todo(2, "two"));
        let orders = collection.pluck("order");
        assert_eq!(orders, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    }

    #[test]
    fn comparator_order_survives_adds_and_removes() {
        let collection = order_collection();
        collection.push(todo(5, "e"));
        collection.push(todo(2, "b"));
        let second = collection.push(todo(4, "d")).unwrap();
        collection.push(todo(1, "a"));
        collection.remove(&[second]);
        collection.push(todo(3, "c"));
        assert_eq!(
            collection.pluck("order"),
            vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(5)]
        );
    }

    #[test]
    fn add_dispatches_membership_with_model() {
        let collection = Collection::new();
        let seen = Rc::new(RefCell::new(None));
        let s = Rc::clone(&seen);
        collection.dispatcher().on(kind::ADD, move |e| {
            *s.borrow_mut() = e.model().cloned();
        });
        let model = collection.push(todo(1, "x")).unwrap();
        assert_eq!(seen.borrow().as_ref(), Some(&model));
    }

    #[test]
    fn remove_is_idempotent() {
        let collection = Collection::new();
        let model = collection.push(todo(1, "x")).unwrap();
        let removes = counter(&collection, kind::REMOVE);
        collection.remove(&[model.clone()]);
        collection.remove(&[model]);
        assert_eq!(removes.get(), 1);
        assert!(collection.is_empty());
    }

    #[test]
    fn set_merges_adds_and_removes() {
        let collection = Collection::new();
        let keep = Model::from_attrs([("id", Value::Int(1)), ("title", Value::from("old"))]);
        let drop_me = Model::from_attrs([("id", Value::Int(2)), ("title", Value::from("bye"))]);
        collection.add(vec![Value::Model(keep.clone()), Value::Model(drop_me.clone())]);

        let incoming_keep =
            Model::from_attrs([("id", Value::Int(1)), ("title", Value::from("new"))]);
        let incoming_new =
            Model::from_attrs([("id", Value::Int(3)), ("title", Value::from("hi"))]);
        collection.set(
            vec![Value::Model(incoming_keep), Value::Model(incoming_new)],
            SetSemantics::default(),
        );

        assert_eq!(collection.len(), 2);
        // Matched by id: merged in place, same instance.
        let kept = collection.find(&Value::Int(1)).unwrap();
        assert_eq!(kept, keep);
        assert_eq!(kept.get("title"), Value::from("new"));
        assert!(collection.find(&Value::Int(2)).is_none());
        assert!(collection.find(&Value::Int(3)).is_some());
        assert!(drop_me.collection().is_none(), "removed model is detached");
    }

    #[test]
    fn set_flags_disable_phases() {
        let collection = Collection::new();
        let a = Model::from_attrs([("id", Value::Int(1)), ("title", Value::from("a"))]);
        collection.add(vec![Value::Model(a.clone())]);

        // remove: false keeps unmatched members.
        let b = Model::from_attrs([("id", Value::Int(2))]);
        collection.set(
            vec![Value::Model(b)],
            SetSemantics { remove: false, ..SetSemantics::default() },
        );
        assert_eq!(collection.len(), 2);

        // merge: false leaves matched attributes alone.
        let a2 = Model::from_attrs([("id", Value::Int(1)), ("title", Value::from("changed"))]);
        collection.set(
            vec![Value::Model(a2)],
            SetSemantics { merge: false, remove: false, ..SetSemantics::default() },
        );
        assert_eq!(a.get("title"), Value::from("a"));
    }

    #[test]
    fn id_change_rekeys_the_index() {
        let collection = Collection::new();
        let model = collection.push(todo(1, "x")).unwrap();
        model.set_one("id", Value::Int(10), SetOptions::default()).unwrap();
        assert_eq!(collection.find(&Value::Int(10)), Some(model.clone()));
        model.set_one("id", Value::Int(20), SetOptions::default()).unwrap();
        assert!(collection.get_by_id("10").is_none());
        assert_eq!(collection.get_by_id("20"), Some(model));
    }

    #[test]
    fn destroy_removes_the_model_from_its_collection() {
        let collection = Collection::new();
        let model = collection.push(todo(1, "x")).unwrap();
        let removes = counter(&collection, kind::REMOVE);
        model.destroy(SyncOptions::default()).unwrap();
        assert!(collection.is_empty());
        assert_eq!(removes.get(), 1);
        assert_eq!(
            model.dispatcher().total_listeners(),
            0,
            "collection proxy must be unwired after destroy"
        );
    }

    #[test]
    fn member_events_proxy_onto_the_collection() {
        let collection = Collection::new();
        let model = collection.push(todo(1, "x")).unwrap();
        let changes = counter(&collection, "change:title");
        model
            .set_one("title", Value::from("renamed"), SetOptions::default())
            .unwrap();
        assert_eq!(changes.get(), 1);
    }

    #[test]
    fn foreign_membership_events_are_filtered() {
        let shared = Model::from_attrs([("id", Value::Int(1))]);
        let left = Collection::new();
        let right = Collection::new();
        left.add(vec![Value::Model(shared.clone())]);
        let left_adds = counter(&left, kind::ADD);
        right.add(vec![Value::Model(shared)]);
        assert_eq!(
            left_adds.get(),
            0,
            "another collection's add must not bleed through"
        );
    }

    #[test]
    fn reset_replaces_without_add_events() {
        let collection = Collection::new();
        let old = collection.push(todo(1, "old")).unwrap();
        let adds = counter(&collection, kind::ADD);
        let resets = counter(&collection, kind::RESET);
        let previous = Rc::new(RefCell::new(Vec::new()));
        let p = Rc::clone(&previous);
        collection.dispatcher().on(kind::RESET, move |e| {
            if let Detail::Reset { previous } = e.detail() {
                *p.borrow_mut() = previous.clone();
            }
        });
        collection.reset(vec![todo(2, "new")]);
        assert_eq!(adds.get(), 0);
        assert_eq!(resets.get(), 1);
        assert_eq!(collection.len(), 1);
        assert_eq!(previous.borrow().as_slice(), &[old.clone()]);
        assert_eq!(old.dispatcher().total_listeners(), 0);
    }

    #[test]
    fn factory_builds_models_from_plain_objects() {
        let collection = Collection::new();
        collection.set_factory(|value| {
            let model = match value {
                Value::Object(map) => {
                    Model::from_attrs(map.iter().map(|(k, v)| (k.clone(), v.clone())))
                }
                _ => Model::new(),
            };
            model.apply_defaults([("completed", Value::Bool(false))]);
            model
        });
        collection.add(vec![Value::from_json(serde_json::json!({"title": "t"}))]);
        let model = collection.at(0).unwrap();
        assert_eq!(model.get("title"), Value::from("t"));
        assert_eq!(model.get("completed"), Value::Bool(false));
    }

    #[test]
    fn invalid_factory_models_are_skipped() {
        let collection = Collection::new();
        collection.set_factory(|value| {
            let model = default_factory(value);
            model.set_validator(|attrs| {
                attrs
                    .get("title")
                    .is_none_or(|t| t.display_text().is_empty())
                    .then(|| Value::from("title required"))
            });
            model
        });
        let invalid = counter(&collection, kind::INVALID);
        collection.add(vec![Value::from_json(serde_json::json!({"title": ""}))]);
        assert!(collection.is_empty());
        assert_eq!(invalid.get(), 1);
    }

    #[test]
    fn where_attrs_filters_members() {
        let collection = Collection::new();
        collection.push(todo(1, "a"));
        collection.push(todo(2, "b"));
        let model = collection.find_where(&[("title", Value::from("b"))]).unwrap();
        assert_eq!(model.get("order"), Value::Int(2));
        assert!(collection.where_attrs(&[("title", Value::from("zzz"))]).is_empty());
    }

    #[test]
    fn unshift_skips_resorting() {
        let collection = order_collection();
        collection.push(todo(1, "a"));
        collection.unshift(todo(9, "front"));
        assert_eq!(collection.pluck("order"), vec![Value::Int(9), Value::Int(1)]);
    }

    #[test]
    fn members_know_their_collection() {
        let collection = Collection::new();
        let model = collection.push(todo(1, "x")).unwrap();
        assert_eq!(model.collection(), Some(collection.clone()));
        collection.remove(&[model.clone()]);
        assert!(model.collection().is_none());
    }

    #[test]
    fn to_json_is_member_json_in_order() {
        let collection = order_collection();
        collection.push(todo(2, "b"));
        collection.push(todo(1, "a"));
        assert_eq!(
            collection.to_json(),
            serde_json::json!([
                {"order": 1, "title": "a"},
                {"order": 2, "title": "b"},
            ])
        );
    }

    #[test]
    #[should_panic(expected = "cannot sort a collection without a comparator")]
    fn sorting_without_comparator_panics() {
        Collection::new().sort();
    }
}
