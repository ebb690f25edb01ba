#![forbid(unsafe_code)]

//! Views: element owners with a bindable scope.
//!
//! A view's lifecycle is unbound → bound → unbound. Construction (through
//! [`ViewBuilder::build`]) resolves the element (supplied, or created from
//! tag/id/classes), applies the template, runs the render closure, and
//! binds. [`View::remove`] tears everything down again: bindings, own
//! listeners, and the element's place in the tree.
//!
//! There is no inheritance here; a view's behavior is composed at
//! definition time from closures: a render function, named DOM-event
//! handlers, and named parse functions the binding expressions refer to.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use strand_core::{Bag, Dispatcher, Value};
use strand_dom::{DomEvent, Element};

use crate::binding::{self, BindError, BindingRecord};
use crate::context::Context;

pub type ParseFn = Rc<dyn Fn(&Value) -> Value>;
pub type HandlerFn = Rc<dyn Fn(&View, &DomEvent)>;
type RenderFn = Rc<dyn Fn(&View)>;
type TemplateFn = Rc<dyn Fn() -> Vec<Element>>;

/// Dispatched when a view's element is swapped out.
pub const ELEMENT_CHANGE: &str = "elementchange";

/// What a registered view factory receives when the framework instantiates
/// a child or item view.
pub struct ViewSeed {
    pub element: Element,
    /// The bound item for repeat-created views, `Null` otherwise.
    pub data: Value,
    pub context: Option<Context>,
}

/// Factory for child/item views, registered on the [`Context`] by name.
pub type ViewFactory = Rc<dyn Fn(ViewSeed) -> Result<View, BindError>>;

pub(crate) struct ViewInner {
    dispatcher: Dispatcher,
    element: RefCell<Option<Element>>,
    scope: Bag,
    parsers: RefCell<BTreeMap<String, ParseFn>>,
    handlers: RefCell<BTreeMap<String, HandlerFn>>,
    renderer: RefCell<Option<RenderFn>>,
    template: RefCell<Option<TemplateFn>>,
    bindings: RefCell<Vec<BindingRecord>>,
    context: RefCell<Option<Context>>,
}

/// A bound DOM-element owner. Cloning shares state.
#[derive(Clone)]
pub struct View {
    inner: Rc<ViewInner>,
}

/// Non-owning view handle for listener closures.
pub(crate) struct WeakView {
    inner: Weak<ViewInner>,
}

impl WeakView {
    pub(crate) fn upgrade(&self) -> Option<View> {
        self.inner.upgrade().map(|inner| View { inner })
    }
}

/// Builder collecting a view's composition before the bind lifecycle runs.
pub struct ViewBuilder {
    element: Option<Element>,
    tag: String,
    id: Option<String>,
    classes: Vec<String>,
    attributes: Vec<(String, String)>,
    data: Vec<(String, Value)>,
    declared: Vec<String>,
    parsers: Vec<(String, ParseFn)>,
    handlers: Vec<(String, HandlerFn)>,
    renderer: Option<RenderFn>,
    template: Option<TemplateFn>,
}

impl Default for ViewBuilder {
    fn default() -> Self {
        Self {
            element: None,
            tag: "div".to_owned(),
            id: None,
            classes: Vec::new(),
            attributes: Vec::new(),
            data: Vec::new(),
            declared: Vec::new(),
            parsers: Vec::new(),
            handlers: Vec::new(),
            renderer: None,
            template: None,
        }
    }
}

impl ViewBuilder {
    /// Bind to an existing element instead of creating one.
    #[must_use]
    pub fn element(mut self, element: Element) -> Self {
        self.element = Some(element);
        self
    }

    /// Tag for a created element (default `div`).
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    #[must_use]
    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    /// Seed a scope property.
    #[must_use]
    pub fn data(mut self, name: impl Into<String>, value: Value) -> Self {
        self.data.push((name.into(), value));
        self
    }

    /// Declare an injection slot: filled by the context when a same-named
    /// singleton is registered.
    #[must_use]
    pub fn declare(mut self, name: impl Into<String>) -> Self {
        self.declared.push(name.into());
        self
    }

    /// Register a parse function usable as a `|name` binding suffix.
    #[must_use]
    pub fn parser(mut self, name: impl Into<String>, parse: impl Fn(&Value) -> Value + 'static) -> Self {
        self.parsers.push((name.into(), Rc::new(parse)));
        self
    }

    /// Register a DOM-event handler bindable via `st-on<kind>`.
    #[must_use]
    pub fn handler(
        mut self,
        name: impl Into<String>,
        handler: impl Fn(&View, &DomEvent) + 'static,
    ) -> Self {
        self.handlers.push((name.into(), Rc::new(handler)));
        self
    }

    /// The overridable render step, run before binding.
    #[must_use]
    pub fn render_with(mut self, render: impl Fn(&View) + 'static) -> Self {
        self.renderer = Some(Rc::new(render));
        self
    }

    /// Template: an element-tree factory whose output replaces the
    /// element's children.
    #[must_use]
    pub fn template_with(mut self, template: impl Fn() -> Vec<Element> + 'static) -> Self {
        self.template = Some(Rc::new(template));
        self
    }

    /// Run the construction lifecycle: resolve element, inject, template,
    /// render, bind.
    pub fn build(self, context: Option<&Context>) -> Result<View, BindError> {
        let scope = Bag::from_pairs(self.data);
        for name in &self.declared {
            scope.declare(name.clone());
        }
        if let Some(context) = context {
            context.inject(&scope);
        }

        let element = match self.element {
            Some(element) => {
                for class in &self.classes {
                    element.add_class(class.clone());
                }
                element
            }
            None => {
                let element = Element::new(self.tag);
                if let Some(id) = self.id {
                    element.set_attr("id", id);
                }
                for class in &self.classes {
                    element.add_class(class.clone());
                }
                for (name, value) in self.attributes {
                    element.set_attr(name, value);
                }
                element
            }
        };
        element.add_class("st-view");

        let view = View {
            inner: Rc::new(ViewInner {
                dispatcher: Dispatcher::new(),
                element: RefCell::new(Some(element)),
                scope,
                parsers: RefCell::new(self.parsers.into_iter().collect()),
                handlers: RefCell::new(self.handlers.into_iter().collect()),
                renderer: RefCell::new(self.renderer),
                template: RefCell::new(self.template),
                bindings: RefCell::new(Vec::new()),
                context: RefCell::new(context.cloned()),
            }),
        };

        view.apply_template();
        view.render();
        binding::bind_view(&view)?;
        Ok(view)
    }
}

impl View {
    #[must_use]
    pub fn builder() -> ViewBuilder {
        ViewBuilder::default()
    }

    #[must_use]
    pub fn element(&self) -> Option<Element> {
        self.inner.element.borrow().clone()
    }

    #[must_use]
    pub fn scope(&self) -> &Bag {
        &self.inner.scope
    }

    #[must_use]
    pub fn context(&self) -> Option<Context> {
        self.inner.context.borrow().clone()
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    #[must_use]
    pub fn parser(&self, name: &str) -> Option<ParseFn> {
        self.inner.parsers.borrow().get(name).cloned()
    }

    #[must_use]
    pub fn handler(&self, name: &str) -> Option<HandlerFn> {
        self.inner.handlers.borrow().get(name).cloned()
    }

    /// Run the render closure, if one was composed in.
    pub fn render(&self) {
        let renderer = self.inner.renderer.borrow().clone();
        if let Some(renderer) = renderer {
            renderer(self);
        }
    }

    /// Wire the declarative bindings for this view's subtree. Re-binding
    /// fully unbinds first; listeners never accumulate.
    pub fn bind(&self) -> Result<(), BindError> {
        binding::bind_view(self)
    }

    /// Remove every binding this view created, leaving the element's and
    /// the sources' listener registries as they were before binding.
    pub fn unbind(&self) {
        binding::unbind_view(self);
    }

    /// Swap in a new template: unbind, replace children, render, rebind.
    pub fn set_template(
        &self,
        template: impl Fn() -> Vec<Element> + 'static,
    ) -> Result<(), BindError> {
        *self.inner.template.borrow_mut() = Some(Rc::new(template));
        binding::unbind_view(self);
        self.apply_template();
        self.render();
        binding::bind_view(self)
    }

    /// Swap the view's element, re-binding if the view was bound.
    /// Dispatches [`ELEMENT_CHANGE`].
    pub fn set_element(&self, element: Element) -> Result<(), BindError> {
        let was_bound = !self.inner.bindings.borrow().is_empty();
        if was_bound {
            binding::unbind_view(self);
        }
        element.add_class("st-view");
        *self.inner.element.borrow_mut() = Some(element);
        if was_bound {
            binding::bind_view(self)?;
        }
        self.inner
            .dispatcher
            .dispatch(strand_core::Event::new(ELEMENT_CHANGE));
        Ok(())
    }

    /// Append another view's element under this view's element.
    pub fn append_view(&self, child: &View) {
        if let (Some(parent), Some(child_el)) = (self.element(), child.element()) {
            parent.append_child(&child_el);
        }
    }

    /// Tear down: unbind, drop own listeners, detach the element.
    pub fn remove(&self) {
        binding::unbind_view(self);
        self.inner.dispatcher.clear();
        let element = self.inner.element.borrow().clone();
        if let Some(element) = element {
            element.detach();
        }
    }

    fn apply_template(&self) {
        let template = self.inner.template.borrow().clone();
        let Some(template) = template else {
            return;
        };
        let Some(element) = self.element() else {
            return;
        };
        for child in element.children() {
            element.remove_child(&child);
        }
        for child in template() {
            element.append_child(&child);
        }
    }

    pub(crate) fn push_binding(&self, record: BindingRecord) {
        self.inner.bindings.borrow_mut().push(record);
    }

    pub(crate) fn take_bindings(&self) -> Vec<BindingRecord> {
        self.inner.bindings.borrow_mut().drain(..).collect()
    }

    pub(crate) fn has_bindings(&self) -> bool {
        !self.inner.bindings.borrow().is_empty()
    }

    pub(crate) fn downgrade(&self) -> WeakView {
        WeakView {
            inner: Rc::downgrade(&self.inner),
        }
    }
}

impl PartialEq for View {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for View {}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("element", &self.inner.element.borrow().as_ref().map(Element::tag))
            .field("bindings", &self.inner.bindings.borrow().len())
            .finish()
    }
}
