#![forbid(unsafe_code)]

//! Applications: the root view plus declarative child-view application.
//!
//! An application owns a [`Context`], mounts its root view onto an
//! element, and then walks the subtree for `st-view="Name"` attributes,
//! instantiating each named factory from the context's view registry. An
//! unknown view name is a logged warning and a skip, never a failure.

use std::cell::RefCell;
use std::fmt;

use strand_core::Value;
use strand_dom::Element;

use crate::binding::BindError;
use crate::context::Context;
use crate::view::{View, ViewBuilder, ViewSeed};

pub struct Application {
    context: Context,
    root: RefCell<Option<View>>,
    children: RefCell<Vec<View>>,
}

impl Application {
    #[must_use]
    pub fn new(context: Context) -> Self {
        Self {
            context,
            root: RefCell::new(None),
            children: RefCell::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn context(&self) -> &Context {
        &self.context
    }

    #[must_use]
    pub fn root(&self) -> Option<View> {
        self.root.borrow().clone()
    }

    #[must_use]
    pub fn children(&self) -> Vec<View> {
        self.children.borrow().clone()
    }

    /// Build the root view onto `element` and apply registered child views
    /// to `st-view`-tagged descendants.
    pub fn mount(&self, builder: ViewBuilder, element: Element) -> Result<View, BindError> {
        element.add_class("st-app");
        let view = builder.element(element.clone()).build(Some(&self.context))?;
        *self.root.borrow_mut() = Some(view.clone());
        self.apply_views(&element);
        Ok(view)
    }

    /// Instantiate registered view factories for descendant elements
    /// carrying `st-view` attributes. Elements that already belong to a
    /// built view are left alone.
    pub fn apply_views(&self, root: &Element) {
        for element in root.descendants() {
            let Some(name) = element.attr("st-view") else {
                continue;
            };
            if element.has_class("st-view") {
                continue; // already built
            }
            let Some(factory) = self.context.view_factory(&name) else {
                tracing::warn!(view = %name, "no registered view class; skipped");
                continue;
            };
            match factory(ViewSeed {
                element: element.clone(),
                data: Value::Null,
                context: Some(self.context.clone()),
            }) {
                Ok(child) => self.children.borrow_mut().push(child),
                Err(error) => {
                    tracing::warn!(view = %name, %error, "child view failed to bind; skipped");
                }
            }
        }
    }

    /// Tear down the root and all applied child views.
    pub fn unmount(&self) {
        for child in self.children.borrow_mut().drain(..) {
            child.remove();
        }
        if let Some(root) = self.root.borrow_mut().take() {
            root.remove();
        }
    }
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("mounted", &self.root.borrow().is_some())
            .field("children", &self.children.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;
    use strand_core::Model;

    #[test]
    fn mount_builds_root_and_child_views() {
        let context = Context::new();
        context.map_singleton(
            "filterModel",
            Value::Model(Model::from_attrs([("filter", Value::from("active"))])),
        );
        context.register_view(
            "FilterLabel",
            Rc::new(|seed: ViewSeed| {
                View::builder()
                    .element(seed.element)
                    .declare("filterModel")
                    .build(seed.context.as_ref())
            }),
        );

        let label = Element::new("span")
            .with_attr("st-view", "FilterLabel")
            .with_child(Element::new("em").with_attr("st-text", "filterModel.filter"));
        let root = Element::new("div").with_child(label.clone());

        let app = Application::new(context);
        app.mount(View::builder(), root.clone()).unwrap();

        assert!(root.has_class("st-app"));
        assert_eq!(app.children().len(), 1);
        let em = label.children()[0].clone();
        assert_eq!(em.content(), "active");
    }

    #[test]
    fn unknown_view_names_are_skipped() {
        let context = Context::new();
        let child = Element::new("div").with_attr("st-view", "Nope");
        let root = Element::new("div").with_child(child);
        let app = Application::new(context);
        app.mount(View::builder(), root).unwrap();
        assert!(app.children().is_empty());
    }

    #[test]
    fn unmount_detaches_everything() {
        let context = Context::new();
        let root = Element::new("div").with_child(Element::new("span"));
        let holder = Element::new("body").with_child(root.clone());
        let app = Application::new(context);
        app.mount(View::builder(), root.clone()).unwrap();
        app.unmount();
        assert!(app.root().is_none());
        assert!(holder.children().is_empty());
        assert!(root.parent().is_none());
    }
}
