#![forbid(unsafe_code)]

//! Models: identified, validated, persistable observable records.
//!
//! A [`Model`] is a property bag with an identity (`cid` unique for the
//! process lifetime, `id` assigned by the remote store), a change-tracking
//! snapshot, and a persistence lifecycle (`fetch`/`save`/`destroy` through a
//! pluggable [`Transport`]).
//!
//! # Invariants
//!
//! 1. One `change:<attr>` fires per attribute whose value actually changed
//!    (strict equality), in application order.
//! 2. Exactly one aggregate `change` fires per outer `set`, even when
//!    handlers call `set` again synchronously: nested writes mark a pending
//!    flag and the aggregate event replays after the outer call unwinds.
//! 3. A rejected validation dispatches `invalid` and leaves every attribute
//!    untouched.
//! 4. `cid` never repeats within a process; `id` mirrors the configured id
//!    attribute and may be absent (`is_new`).
//!
//! # Failure Modes
//!
//! - No transport configured: `fetch`/`save`/`destroy` return
//!   [`SyncError::NoTransport`].
//! - No url derivable: the transport surfaces [`SyncError::MissingUrl`].
//! - A model destroyed while a save is in flight still runs the save's
//!   callbacks against the detached state; requests are never cancelled.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;

use crate::collection::{Collection, CollectionInner};
use crate::dispatch::{Dispatcher, DispatcherId};
use crate::event::{Detail, Event, kind};
use crate::sync::{RequestHandle, SyncError, SyncMethod, SyncOptions, SyncTarget, Transport, TransportFailure};
use crate::value::{Value, escape_html};

static NEXT_CID: AtomicU64 = AtomicU64::new(1);

/// Client id, unique per model instance for the process lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cid(u64);

impl Cid {
    fn next() -> Self {
        Cid(NEXT_CID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub(crate) fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// Options for [`Model::set`].
#[derive(Clone, Copy, Debug)]
pub struct SetOptions {
    /// Suppress all change events.
    pub silent: bool,
    /// Remove the named attributes instead of writing them.
    pub unset: bool,
    /// Run the validator before applying.
    pub validate: bool,
}

impl Default for SetOptions {
    fn default() -> Self {
        Self {
            silent: false,
            unset: false,
            validate: true,
        }
    }
}

impl SetOptions {
    #[must_use]
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    #[must_use]
    pub fn unset(mut self) -> Self {
        self.unset = true;
        self
    }

    #[must_use]
    pub fn no_validate(mut self) -> Self {
        self.validate = false;
        self
    }
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("validation rejected the change: {error}")]
    Invalid { error: Value },
    #[error(transparent)]
    Sync(#[from] SyncError),
}

type Props = BTreeMap<String, Value>;
type Validator = Rc<dyn Fn(&Props) -> Option<Value>>;
type ParseHook = Rc<dyn Fn(serde_json::Value) -> serde_json::Value>;

pub(crate) struct ModelInner {
    dispatcher: Dispatcher,
    cid: Cid,
    id: RefCell<Option<Value>>,
    id_property: RefCell<String>,
    attributes: RefCell<Props>,
    previous: RefCell<Props>,
    changed: RefCell<Props>,
    changing: Cell<bool>,
    pending: Cell<bool>,
    validator: RefCell<Option<Validator>>,
    validation_error: RefCell<Option<Value>>,
    parse: RefCell<Option<ParseHook>>,
    transport: RefCell<Option<Rc<dyn Transport>>>,
    url_root: RefCell<Option<String>>,
    collection: RefCell<Option<Weak<CollectionInner>>>,
}

/// An identified, persistable observable record. Cloning shares state.
#[derive(Clone)]
pub struct Model {
    inner: Rc<ModelInner>,
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}

impl Model {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(ModelInner {
                dispatcher: Dispatcher::new(),
                cid: Cid::next(),
                id: RefCell::new(None),
                id_property: RefCell::new("id".to_owned()),
                attributes: RefCell::new(Props::new()),
                previous: RefCell::new(Props::new()),
                changed: RefCell::new(Props::new()),
                changing: Cell::new(false),
                pending: Cell::new(false),
                validator: RefCell::new(None),
                validation_error: RefCell::new(None),
                parse: RefCell::new(None),
                transport: RefCell::new(None),
                url_root: RefCell::new(None),
                collection: RefCell::new(None),
            }),
        }
    }

    /// Build a model from initial attributes. No events fire.
    #[must_use]
    pub fn from_attrs<K, I>(pairs: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let model = Self::new();
        model.write_silently(pairs);
        model
    }

    /// Build a model from a JSON object. Non-object JSON yields an empty
    /// model.
    #[must_use]
    pub fn from_json(json: serde_json::Value) -> Self {
        let model = Self::new();
        if let serde_json::Value::Object(map) = json {
            model.write_silently(map.into_iter().map(|(k, v)| (k, Value::from_json(v))));
        }
        model
    }

    /// Fill in attributes that are absent, silently. Existing values win.
    pub fn apply_defaults<K, I>(&self, pairs: I)
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let mut attrs = self.inner.attributes.borrow_mut();
        for (key, value) in pairs {
            attrs.entry(key.into()).or_insert(value);
        }
        drop(attrs);
        self.refresh_id();
    }

    fn write_silently<K, I>(&self, pairs: I)
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let mut attrs = self.inner.attributes.borrow_mut();
        for (key, value) in pairs {
            attrs.insert(key.into(), value);
        }
        drop(attrs);
        self.refresh_id();
    }

    // ── identity ────────────────────────────────────────────────────────

    #[must_use]
    pub fn cid(&self) -> Cid {
        self.inner.cid
    }

    /// The store-assigned id, if the model has been persisted.
    #[must_use]
    pub fn id(&self) -> Option<Value> {
        self.inner.id.borrow().clone()
    }

    /// A model is new until the remote store has assigned it an id.
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.inner.id.borrow().is_none()
    }

    /// The attribute that carries the store id (default `"id"`).
    #[must_use]
    pub fn id_property(&self) -> String {
        self.inner.id_property.borrow().clone()
    }

    /// Reconfigure the id attribute (for stores using e.g. `"_id"`).
    pub fn set_id_property(&self, name: impl Into<String>) {
        *self.inner.id_property.borrow_mut() = name.into();
        self.refresh_id();
    }

    fn refresh_id(&self) {
        let id_property = self.inner.id_property.borrow().clone();
        let id = self
            .inner
            .attributes
            .borrow()
            .get(&id_property)
            .cloned()
            .filter(|v| !v.is_null());
        *self.inner.id.borrow_mut() = id;
    }

    // ── configuration ───────────────────────────────────────────────────

    pub fn set_validator(&self, validator: impl Fn(&Props) -> Option<Value> + 'static) {
        *self.inner.validator.borrow_mut() = Some(Rc::new(validator));
    }

    /// Hook that converts a raw store response into the attributes to set.
    pub fn set_parse(&self, parse: impl Fn(serde_json::Value) -> serde_json::Value + 'static) {
        *self.inner.parse.borrow_mut() = Some(Rc::new(parse));
    }

    pub fn set_transport(&self, transport: Rc<dyn Transport>) {
        *self.inner.transport.borrow_mut() = Some(transport);
    }

    #[must_use]
    pub fn transport(&self) -> Option<Rc<dyn Transport>> {
        self.inner.transport.borrow().clone()
    }

    pub fn set_url_root(&self, url_root: impl Into<String>) {
        *self.inner.url_root.borrow_mut() = Some(url_root.into());
    }

    pub(crate) fn attach_collection(&self, inner: &Rc<CollectionInner>) {
        let mut slot = self.inner.collection.borrow_mut();
        if slot.is_none() {
            *slot = Some(Rc::downgrade(inner));
        }
    }

    pub(crate) fn detach_collection(&self, inner: &Rc<CollectionInner>) {
        let mut slot = self.inner.collection.borrow_mut();
        if let Some(current) = slot.as_ref().and_then(Weak::upgrade) {
            if Rc::ptr_eq(&current, inner) {
                *slot = None;
            }
        }
    }

    /// The collection this model belongs to, if any.
    #[must_use]
    pub fn collection(&self) -> Option<Collection> {
        self.inner
            .collection
            .borrow()
            .as_ref()
            .and_then(Weak::upgrade)
            .map(Collection::from_inner)
    }

    // ── reads ───────────────────────────────────────────────────────────

    /// Read an attribute. Absent attributes read as `Null`.
    #[must_use]
    pub fn get(&self, attr: &str) -> Value {
        self.inner
            .attributes
            .borrow()
            .get(attr)
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Whether the attribute holds a non-null value.
    #[must_use]
    pub fn has(&self, attr: &str) -> bool {
        !self.get(attr).is_null()
    }

    /// HTML-escaped text form of an attribute.
    #[must_use]
    pub fn escape(&self, attr: &str) -> String {
        escape_html(&self.get(attr).display_text())
    }

    #[must_use]
    pub fn attribute_names(&self) -> Vec<String> {
        self.inner.attributes.borrow().keys().cloned().collect()
    }

    #[must_use]
    pub fn attributes(&self) -> Props {
        self.inner.attributes.borrow().clone()
    }

    // ── the core write protocol ─────────────────────────────────────────

    /// Apply a batch of attribute writes.
    ///
    /// Dispatches one `change:<attr>` per changed attribute, then exactly
    /// one aggregate `change` per outer call (nested sets fold into it).
    pub fn set<K, I>(&self, attrs: I, options: SetOptions) -> Result<(), ModelError>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let attrs: Vec<(String, Value)> = attrs
            .into_iter()
            .map(|(k, v)| {
                let v = if options.unset { Value::Null } else { v };
                (k.into(), v)
            })
            .collect();

        if options.validate {
            self.validate_merged(&attrs)?;
        }

        let was_changing = self.inner.changing.replace(true);
        if !was_changing {
            *self.inner.previous.borrow_mut() = self.inner.attributes.borrow().clone();
            self.inner.changed.borrow_mut().clear();
        }

        let mut changes: Vec<String> = Vec::new();
        {
            let mut current = self.inner.attributes.borrow_mut();
            let previous = self.inner.previous.borrow();
            let mut changed = self.inner.changed.borrow_mut();
            for (attr, value) in &attrs {
                let current_value = current.get(attr).cloned().unwrap_or(Value::Null);
                if current_value != *value {
                    changes.push(attr.clone());
                }
                let previous_value = previous.get(attr).cloned().unwrap_or(Value::Null);
                if previous_value != *value {
                    changed.insert(attr.clone(), value.clone());
                } else {
                    changed.remove(attr);
                }
                if options.unset {
                    current.remove(attr);
                } else {
                    current.insert(attr.clone(), value.clone());
                }
            }
        }

        let id_property = self.inner.id_property.borrow().clone();
        if attrs.iter().any(|(attr, _)| *attr == id_property) {
            self.refresh_id();
        }

        if !options.silent {
            if !changes.is_empty() {
                self.inner.pending.set(true);
            }
            for attr in &changes {
                let value = self.get(attr);
                self.inner.dispatcher.dispatch(Event::with_detail(
                    kind::change_of(attr),
                    Detail::Change {
                        property: attr.clone(),
                        value,
                    },
                ));
            }
        }

        // A nested set folds into the outer call's aggregate event.
        if was_changing {
            return Ok(());
        }

        if !options.silent {
            while self.inner.pending.replace(false) {
                self.inner
                    .dispatcher
                    .dispatch(Event::new(kind::CHANGE));
            }
        }
        self.inner.pending.set(false);
        self.inner.changing.set(false);
        Ok(())
    }

    /// Write a single attribute.
    pub fn set_one(
        &self,
        attr: impl Into<String>,
        value: Value,
        options: SetOptions,
    ) -> Result<(), ModelError> {
        self.set([(attr.into(), value)], options)
    }

    /// Apply a JSON object as attribute writes.
    pub fn set_json(
        &self,
        json: serde_json::Value,
        options: SetOptions,
    ) -> Result<(), ModelError> {
        match json {
            serde_json::Value::Object(map) => self.set(
                map.into_iter().map(|(k, v)| (k, Value::from_json(v))),
                options,
            ),
            _ => Ok(()),
        }
    }

    /// Remove an attribute, firing change events. A no-op if absent.
    pub fn unset(&self, attr: &str, options: SetOptions) -> Result<(), ModelError> {
        self.set([(attr.to_owned(), Value::Null)], SetOptions { unset: true, ..options })
    }

    /// Remove every attribute, firing change events.
    pub fn clear(&self, options: SetOptions) -> Result<(), ModelError> {
        let names: Vec<String> = self.attribute_names();
        self.set(
            names.into_iter().map(|name| (name, Value::Null)),
            SetOptions { unset: true, ..options },
        )
    }

    // ── change tracking ─────────────────────────────────────────────────

    /// Whether anything (or a specific attribute) changed since the last
    /// aggregate `change`.
    #[must_use]
    pub fn has_changed(&self, attr: Option<&str>) -> bool {
        let changed = self.inner.changed.borrow();
        match attr {
            Some(attr) => changed.contains_key(attr),
            None => !changed.is_empty(),
        }
    }

    /// The attributes that differ from the previous snapshot, or `None`
    /// when nothing changed.
    #[must_use]
    pub fn changed_attributes(&self) -> Option<Props> {
        let changed = self.inner.changed.borrow();
        if changed.is_empty() {
            None
        } else {
            Some(changed.clone())
        }
    }

    /// An attribute's value at the last aggregate `change`.
    #[must_use]
    pub fn previous(&self, attr: &str) -> Option<Value> {
        self.inner.previous.borrow().get(attr).cloned()
    }

    /// The full snapshot from the last aggregate `change`.
    #[must_use]
    pub fn previous_attributes(&self) -> Props {
        self.inner.previous.borrow().clone()
    }

    // ── validation ──────────────────────────────────────────────────────

    /// Run the validator against the current attributes.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.validate_merged(&[]).is_ok()
    }

    /// The payload from the last failed validation.
    #[must_use]
    pub fn validation_error(&self) -> Option<Value> {
        self.inner.validation_error.borrow().clone()
    }

    fn validate_merged(&self, attrs: &[(String, Value)]) -> Result<(), ModelError> {
        let Some(validator) = self.inner.validator.borrow().clone() else {
            return Ok(());
        };
        let mut merged = self.inner.attributes.borrow().clone();
        for (attr, value) in attrs {
            merged.insert(attr.clone(), value.clone());
        }
        match validator(&merged) {
            None => {
                *self.inner.validation_error.borrow_mut() = None;
                Ok(())
            }
            Some(error) => {
                *self.inner.validation_error.borrow_mut() = Some(error.clone());
                self.inner.dispatcher.dispatch(Event::with_detail(
                    kind::INVALID,
                    Detail::Invalid { error: error.clone() },
                ));
                Err(ModelError::Invalid { error })
            }
        }
    }

    // ── persistence ─────────────────────────────────────────────────────

    /// The endpoint for this model: `url_root` (or the collection's url),
    /// plus the encoded id for persisted models.
    pub fn url(&self) -> Result<String, SyncError> {
        let base = self
            .inner
            .url_root
            .borrow()
            .clone()
            .or_else(|| self.collection().and_then(|c| c.url()));
        let base = base.ok_or(SyncError::MissingUrl)?;
        match self.id() {
            None => Ok(base),
            Some(id) => {
                let sep = if base.ends_with('/') { "" } else { "/" };
                Ok(format!(
                    "{base}{sep}{}",
                    crate::sync::encode_uri_component(&id.display_text())
                ))
            }
        }
    }

    /// Refresh attributes from the store. Differences fire change events.
    pub fn fetch(&self, mut options: SyncOptions) -> Result<RequestHandle, ModelError> {
        let model = self.clone();
        let user_success = options.success.take();
        let parse = options.parse;
        options.success = Some(Box::new(move |response: serde_json::Value| {
            let attrs = if parse {
                model.parse_response(response.clone())
            } else {
                response.clone()
            };
            if model.set_json(attrs, SetOptions::default()).is_err() {
                return;
            }
            if let Some(callback) = user_success {
                callback(response.clone());
            }
            model
                .inner
                .dispatcher
                .dispatch(Event::with_detail(kind::SYNC, Detail::Sync { response }));
        }));
        self.wrap_error(&mut options);
        self.sync(SyncMethod::Read, options)
    }

    /// Write attributes and persist.
    ///
    /// Without `wait`, attributes apply immediately (validated); with
    /// `wait`, they only apply once the store confirms, but the request
    /// body still carries them.
    pub fn save(
        &self,
        attrs: Option<Vec<(String, Value)>>,
        mut options: SyncOptions,
    ) -> Result<RequestHandle, ModelError> {
        let wait = options.wait;
        let patch = options.patch;

        if let Some(ref attrs) = attrs {
            if wait {
                self.validate_merged(attrs)?;
            } else {
                self.set(attrs.clone(), SetOptions::default())?;
            }
        }

        if patch {
            let map: serde_json::Map<String, serde_json::Value> = attrs
                .iter()
                .flatten()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect();
            options.attrs = Some(serde_json::Value::Object(map));
        } else if wait && attrs.is_some() {
            let mut body = self.to_json();
            if let (serde_json::Value::Object(map), Some(attrs)) = (&mut body, &attrs) {
                for (attr, value) in attrs {
                    map.insert(attr.clone(), value.to_json());
                }
            }
            options.attrs = Some(body);
        }

        let model = self.clone();
        let user_success = options.success.take();
        let parse = options.parse;
        let wait_attrs = if wait { attrs } else { None };
        options.success = Some(Box::new(move |response: serde_json::Value| {
            let mut server_attrs = if parse {
                model.parse_response(response.clone())
            } else {
                response.clone()
            };
            if let (serde_json::Value::Object(map), Some(attrs)) =
                (&mut server_attrs, &wait_attrs)
            {
                for (attr, value) in attrs {
                    map.entry(attr.clone()).or_insert_with(|| value.to_json());
                }
            }
            if server_attrs.is_object()
                && model.set_json(server_attrs, SetOptions::default()).is_err()
            {
                return;
            }
            if let Some(callback) = user_success {
                callback(response.clone());
            }
            model
                .inner
                .dispatcher
                .dispatch(Event::with_detail(kind::SYNC, Detail::Sync { response }));
        }));
        self.wrap_error(&mut options);

        let method = if self.is_new() {
            SyncMethod::Create
        } else if patch {
            SyncMethod::Patch
        } else {
            SyncMethod::Update
        };
        self.sync(method, options)
    }

    /// Destroy the model on the store (if persisted) and dispatch
    /// `destroy`, which collections use to drop the model.
    ///
    /// Returns `Ok(None)` for never-persisted models, which skip the store
    /// round trip entirely.
    pub fn destroy(
        &self,
        mut options: SyncOptions,
    ) -> Result<Option<RequestHandle>, ModelError> {
        let wait = options.wait;
        let was_new = self.is_new();
        let user_success = options.success.take();

        let fire_destroy: Rc<dyn Fn()> = {
            let model = self.clone();
            Rc::new(move || {
                let collection = model.collection();
                model.inner.dispatcher.dispatch(Event::membership(
                    kind::DESTROY,
                    model.clone(),
                    collection.as_ref(),
                    None,
                ));
            })
        };

        let model = self.clone();
        let fire = Rc::clone(&fire_destroy);
        options.success = Some(Box::new(move |response: serde_json::Value| {
            if wait || was_new {
                fire();
            }
            if let Some(callback) = user_success {
                callback(response.clone());
            }
            if !was_new {
                model
                    .inner
                    .dispatcher
                    .dispatch(Event::with_detail(kind::SYNC, Detail::Sync { response }));
            }
        }));

        if was_new {
            if let Some(callback) = options.success.take() {
                callback(serde_json::Value::Null);
            }
            return Ok(None);
        }

        self.wrap_error(&mut options);
        let handle = self.sync(SyncMethod::Delete, options)?;
        if !wait {
            fire_destroy();
        }
        Ok(Some(handle))
    }

    fn sync(
        &self,
        method: SyncMethod,
        options: SyncOptions,
    ) -> Result<RequestHandle, ModelError> {
        let transport = self
            .transport()
            .or_else(|| self.collection().and_then(|c| c.transport()))
            .ok_or(SyncError::NoTransport)?;
        Ok(transport.sync(method, SyncTarget::Model(self.clone()), options)?)
    }

    fn parse_response(&self, response: serde_json::Value) -> serde_json::Value {
        match self.inner.parse.borrow().clone() {
            Some(parse) => parse(response),
            None => response,
        }
    }

    fn wrap_error(&self, options: &mut SyncOptions) {
        let model = self.clone();
        let user_error = options.error.take();
        options.error = Some(Box::new(move |failure: TransportFailure| {
            if let Some(callback) = user_error {
                callback(failure.clone());
            }
            model.inner.dispatcher.dispatch(Event::with_detail(
                kind::ERROR,
                Detail::Failed {
                    error: Value::from(failure.message),
                },
            ));
        }));
    }

    // ── misc ────────────────────────────────────────────────────────────

    /// JSON form: all attributes except underscore-prefixed ones.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (key, value) in self.inner.attributes.borrow().iter() {
            if key.starts_with('_') {
                continue;
            }
            map.insert(key.clone(), value.to_json());
        }
        serde_json::Value::Object(map)
    }

    /// A new model with identical attributes and configuration but a fresh
    /// `cid` and no collection link.
    #[must_use]
    pub fn clone_model(&self) -> Model {
        let copy = Model::new();
        *copy.inner.id_property.borrow_mut() = self.id_property();
        *copy.inner.validator.borrow_mut() = self.inner.validator.borrow().clone();
        *copy.inner.parse.borrow_mut() = self.inner.parse.borrow().clone();
        *copy.inner.transport.borrow_mut() = self.inner.transport.borrow().clone();
        *copy.inner.url_root.borrow_mut() = self.inner.url_root.borrow().clone();
        copy.write_silently(self.attributes());
        copy
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    #[must_use]
    pub fn dispatcher_id(&self) -> DispatcherId {
        self.inner.dispatcher.id()
    }
}

impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Model {}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("cid", &self.inner.cid)
            .field("id", &self.id())
            .field("attributes", &self.inner.attributes.borrow())
            .finish()
    }
}
