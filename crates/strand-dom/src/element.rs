#![forbid(unsafe_code)]

//! Elements: tag, attributes, classes, typed properties, children, and
//! listeners.
//!
//! An [`Element`] is an `Rc`-backed handle with identity equality — two
//! handles are the same element when they share storage, never by
//! structural comparison. Text content is stored rendered: [`set_text`]
//! escapes markup characters, [`set_html`] stores the string verbatim.
//!
//! There is no event bubbling: listeners fire only on the element they were
//! attached to, which is also how the binding layer wires them.
//!
//! [`set_text`]: Element::set_text
//! [`set_html`]: Element::set_html

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use strand_core::Value;
use strand_core::value::escape_html;

use crate::event::{DomEvent, DomListenerId};

static NEXT_DOM_LISTENER: AtomicU64 = AtomicU64::new(1);

type DomHandler = Rc<dyn Fn(&DomEvent)>;

struct NodeData {
    tag: String,
    attributes: BTreeMap<String, String>,
    classes: BTreeSet<String>,
    properties: BTreeMap<String, Value>,
    content: String,
    children: Vec<Element>,
    parent: Weak<RefCell<NodeData>>,
    listeners: BTreeMap<String, Vec<(DomListenerId, DomHandler)>>,
}

/// A node in the headless element tree. Cloning shares identity.
#[derive(Clone)]
pub struct Element {
    inner: Rc<RefCell<NodeData>>,
}

impl Element {
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(NodeData {
                tag: tag.into(),
                attributes: BTreeMap::new(),
                classes: BTreeSet::new(),
                properties: BTreeMap::new(),
                content: String::new(),
                children: Vec::new(),
                parent: Weak::new(),
                listeners: BTreeMap::new(),
            })),
        }
    }

    /// Identity comparison: same storage, not same shape.
    #[must_use]
    pub fn ptr_eq(&self, other: &Element) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    #[must_use]
    pub fn tag(&self) -> String {
        self.inner.borrow().tag.clone()
    }

    // ── builder style ───────────────────────────────────────────────────

    #[must_use]
    pub fn with_attr(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    #[must_use]
    pub fn with_class(self, class: impl Into<String>) -> Self {
        self.add_class(class);
        self
    }

    #[must_use]
    pub fn with_id(self, id: impl Into<String>) -> Self {
        self.set_attr("id", id);
        self
    }

    #[must_use]
    pub fn with_text(self, text: &str) -> Self {
        self.set_text(text);
        self
    }

    #[must_use]
    pub fn with_child(self, child: Element) -> Self {
        self.append_child(&child);
        self
    }

    // ── attributes ──────────────────────────────────────────────────────

    #[must_use]
    pub fn attr(&self, name: &str) -> Option<String> {
        self.inner.borrow().attributes.get(name).cloned()
    }

    pub fn set_attr(&self, name: impl Into<String>, value: impl Into<String>) {
        self.inner
            .borrow_mut()
            .attributes
            .insert(name.into(), value.into());
    }

    pub fn remove_attr(&self, name: &str) {
        self.inner.borrow_mut().attributes.remove(name);
    }

    /// All attributes in name order.
    #[must_use]
    pub fn attributes(&self) -> Vec<(String, String)> {
        self.inner
            .borrow()
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    // ── classes ─────────────────────────────────────────────────────────

    pub fn add_class(&self, class: impl Into<String>) {
        self.inner.borrow_mut().classes.insert(class.into());
    }

    pub fn remove_class(&self, class: &str) {
        self.inner.borrow_mut().classes.remove(class);
    }

    pub fn toggle_class(&self, class: &str, on: bool) {
        if on {
            self.add_class(class);
        } else {
            self.remove_class(class);
        }
    }

    #[must_use]
    pub fn has_class(&self, class: &str) -> bool {
        self.inner.borrow().classes.contains(class)
    }

    #[must_use]
    pub fn class_list(&self) -> Vec<String> {
        self.inner.borrow().classes.iter().cloned().collect()
    }

    // ── typed properties ────────────────────────────────────────────────

    /// Read a property. Absent properties read as `Null`.
    #[must_use]
    pub fn property(&self, name: &str) -> Value {
        self.inner
            .borrow()
            .properties
            .get(name)
            .cloned()
            .unwrap_or(Value::Null)
    }

    pub fn set_property(&self, name: impl Into<String>, value: Value) {
        self.inner.borrow_mut().properties.insert(name.into(), value);
    }

    #[must_use]
    pub fn has_property(&self, name: &str) -> bool {
        self.inner.borrow().properties.contains_key(name)
    }

    /// Whether the property currently holds a boolean (drives coercion in
    /// two-way bindings).
    #[must_use]
    pub fn property_is_bool(&self, name: &str) -> bool {
        matches!(self.property(name), Value::Bool(_))
    }

    /// The `value` property as text (empty when unset).
    #[must_use]
    pub fn value(&self) -> String {
        self.property("value").display_text()
    }

    pub fn set_value(&self, value: impl Into<String>) {
        self.set_property("value", Value::Str(value.into()));
    }

    /// The `checked` property (false when unset).
    #[must_use]
    pub fn checked(&self) -> bool {
        self.property("checked").truthy()
    }

    pub fn set_checked(&self, checked: bool) {
        self.set_property("checked", Value::Bool(checked));
    }

    // ── content ─────────────────────────────────────────────────────────

    /// The rendered content string.
    #[must_use]
    pub fn content(&self) -> String {
        self.inner.borrow().content.clone()
    }

    /// Set escaped text content (`<` becomes `&lt;` and so on).
    pub fn set_text(&self, text: &str) {
        self.inner.borrow_mut().content = escape_html(text);
    }

    /// Set raw markup content, verbatim.
    pub fn set_html(&self, html: &str) {
        self.inner.borrow_mut().content = html.to_owned();
    }

    // ── tree ────────────────────────────────────────────────────────────

    #[must_use]
    pub fn children(&self) -> Vec<Element> {
        self.inner.borrow().children.clone()
    }

    #[must_use]
    pub fn parent(&self) -> Option<Element> {
        self.inner
            .borrow()
            .parent
            .upgrade()
            .map(|inner| Element { inner })
    }

    /// Append `child`, detaching it from any previous parent first.
    pub fn append_child(&self, child: &Element) {
        child.detach();
        child.inner.borrow_mut().parent = Rc::downgrade(&self.inner);
        self.inner.borrow_mut().children.push(child.clone());
    }

    /// Insert `child` directly after `anchor` among this element's
    /// children; appends when `anchor` is not a child.
    pub fn insert_child_after(&self, anchor: &Element, child: &Element) {
        child.detach();
        child.inner.borrow_mut().parent = Rc::downgrade(&self.inner);
        let mut data = self.inner.borrow_mut();
        match data.children.iter().position(|c| c.ptr_eq(anchor)) {
            Some(index) => data.children.insert(index + 1, child.clone()),
            None => data.children.push(child.clone()),
        }
    }

    /// Remove `child` from this element. Returns whether it was a child.
    pub fn remove_child(&self, child: &Element) -> bool {
        let mut data = self.inner.borrow_mut();
        match data.children.iter().position(|c| c.ptr_eq(child)) {
            Some(index) => {
                data.children.remove(index);
                child.inner.borrow_mut().parent = Weak::new();
                true
            }
            None => false,
        }
    }

    /// Detach this element from its parent, if any.
    pub fn detach(&self) {
        if let Some(parent) = self.parent() {
            parent.remove_child(self);
        }
    }

    /// Every descendant in pre-order, excluding this element.
    #[must_use]
    pub fn descendants(&self) -> Vec<Element> {
        let mut out = Vec::new();
        collect_descendants(self, &mut out);
        out
    }

    /// Descendants (and this element) carrying the attribute.
    #[must_use]
    pub fn query_attr(&self, name: &str) -> Vec<Element> {
        let mut out = Vec::new();
        if self.attr(name).is_some() {
            out.push(self.clone());
        }
        out.extend(
            self.descendants()
                .into_iter()
                .filter(|el| el.attr(name).is_some()),
        );
        out
    }

    /// Descendants (and this element) carrying the class.
    #[must_use]
    pub fn query_class(&self, class: &str) -> Vec<Element> {
        let mut out = Vec::new();
        if self.has_class(class) {
            out.push(self.clone());
        }
        out.extend(
            self.descendants()
                .into_iter()
                .filter(|el| el.has_class(class)),
        );
        out
    }

    /// A structural copy with fresh identity: attributes, classes,
    /// properties, content, and deep-cloned children. Listeners are not
    /// copied.
    #[must_use]
    pub fn deep_clone(&self) -> Element {
        let data = self.inner.borrow();
        let copy = Element::new(data.tag.clone());
        {
            let mut copy_data = copy.inner.borrow_mut();
            copy_data.attributes = data.attributes.clone();
            copy_data.classes = data.classes.clone();
            copy_data.properties = data.properties.clone();
            copy_data.content = data.content.clone();
        }
        for child in &data.children {
            let child_copy = child.deep_clone();
            copy.append_child(&child_copy);
        }
        copy
    }

    // ── listeners ───────────────────────────────────────────────────────

    pub fn add_listener(
        &self,
        kind: impl Into<String>,
        handler: impl Fn(&DomEvent) + 'static,
    ) -> DomListenerId {
        let id = DomListenerId(NEXT_DOM_LISTENER.fetch_add(1, Ordering::Relaxed));
        self.inner
            .borrow_mut()
            .listeners
            .entry(kind.into())
            .or_default()
            .push((id, Rc::new(handler)));
        id
    }

    pub fn remove_listener(&self, id: DomListenerId) {
        let mut data = self.inner.borrow_mut();
        data.listeners.retain(|_, handlers| {
            handlers.retain(|(handler_id, _)| *handler_id != id);
            !handlers.is_empty()
        });
    }

    /// Total listener registrations on this element.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.borrow().listeners.values().map(Vec::len).sum()
    }

    /// Deliver an event to this element's listeners for its kind.
    pub fn emit_event(&self, event: &DomEvent) {
        let handlers: Vec<DomHandler> = {
            let data = self.inner.borrow();
            data.listeners
                .get(event.kind())
                .map(|handlers| handlers.iter().map(|(_, h)| Rc::clone(h)).collect())
                .unwrap_or_default()
        };
        tracing::trace!(kind = event.kind(), handlers = handlers.len(), "dom event");
        for handler in handlers {
            handler(event);
        }
    }

    /// Emit a plain event of `kind` targeting this element.
    pub fn emit(&self, kind: &str) {
        self.emit_event(&DomEvent::new(kind, self.clone()));
    }

    /// Emit a keyboard event of `kind` carrying `key`.
    pub fn emit_key(&self, kind: &str, key: &str) {
        self.emit_event(&DomEvent::new(kind, self.clone()).with_key(key));
    }
}

fn collect_descendants(element: &Element, out: &mut Vec<Element>) {
    for child in element.children() {
        out.push(child.clone());
        collect_descendants(&child, out);
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Element {}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.inner.borrow();
        f.debug_struct("Element")
            .field("tag", &data.tag)
            .field("attributes", &data.attributes)
            .field("classes", &data.classes)
            .field("children", &data.children.len())
            .finish()
    }
}
