#![forbid(unsafe_code)]

//! The declarative attribute-binding engine.
//!
//! [`bind_view`] walks a view's element and descendants (excluding
//! subtrees owned by nested views and the insides of repeat templates),
//! collects every `st-`-prefixed attribute, and wires it by strategy, in
//! priority order:
//!
//! 1. A dedicated handler for the attribute name (`st-hide`, `st-class`,
//!    `st-text`, `st-html`, `st-repeat`, …) — applied once immediately and
//!    again on every `change:<property>` from the source.
//! 2. A native DOM property or event: `st-on<kind>` attaches a DOM listener
//!    to a named view handler; anything else becomes a two-way link
//!    (model→DOM on `change:<property>`, DOM→model on `input`/`change`).
//!    The `attr-` sub-prefix forces this interpretation.
//! 3. Anything unrecognized warns and is skipped.
//!
//! The attribute value grammar is `path[:param][,path:param…][|parser]`:
//! dotted paths resolve through the view scope, `:param` feeds handlers
//! like class toggling, extra comma entries are honored only by handlers
//! that declare multi-support, and `|parser` names a view parse function.
//!
//! Every wiring is recorded so [`unbind_view`] removes exactly those
//! listeners: binding then unbinding leaves the element's and the
//! sources' registries as they were. Re-binding unbinds first; listeners
//! never accumulate.

pub mod attributes;
pub mod path;

use std::cell::RefCell;
use std::rc::Rc;

use thiserror::Error;

use strand_core::event::kind;
use strand_core::{Bag, Dispatcher, ListenerId, Value};
use strand_dom::{DomListenerId, Element};

use crate::context::Context;
use crate::view::{ParseFn, View, ViewSeed};
use attributes::{Applier, EXCLUDE_CLASS};
use path::BindingSource;

/// The reserved binding-attribute prefix.
pub const PREFIX: &str = "st-";

/// Attribute names (after the prefix) claimed by view/application wiring.
const RESERVED: [&str; 2] = ["app", "view"];

/// DOM properties treated as booleans in two-way bindings.
const BOOL_PROPERTIES: [&str; 4] = ["checked", "disabled", "readonly", "selected"];

/// DOM properties bindable by name on any element.
const NATIVE_PROPERTIES: [&str; 11] = [
    "alt",
    "checked",
    "disabled",
    "href",
    "placeholder",
    "readonly",
    "selected",
    "src",
    "title",
    "type",
    "value",
];

#[derive(Debug, Error)]
pub enum BindError {
    #[error("binding attribute {attribute} cannot be empty")]
    EmptyBinding { attribute: String },
    #[error("{path} is not defined in this view")]
    UndefinedPath { path: String },
    #[error("{name} is not a view handler and cannot be bound to DOM events")]
    MissingHandler { name: String },
    #[error("{attribute} must name a CSS class, e.g. st-class=\"property:class-name\"")]
    ClassParam { attribute: String },
    #[error("view has no element")]
    NoElement,
}

/// One recorded wiring, removable exactly once.
pub(crate) enum BindingRecord {
    Source {
        dispatcher: Dispatcher,
        listener: ListenerId,
    },
    Dom {
        element: Element,
        listener: DomListenerId,
    },
    Teardown(Box<dyn FnOnce()>),
}

/// Bind the view's subtree. Fully unbinds first when already bound.
pub(crate) fn bind_view(view: &View) -> Result<(), BindError> {
    if view.has_bindings() {
        unbind_view(view);
    }
    let root = view.element().ok_or(BindError::NoElement)?;
    let mut elements = vec![root.clone()];
    if root.attr("st-repeat").is_none() {
        collect_bindable(&root, &mut elements);
    }
    for element in elements {
        bind_element_attributes(view, &element)?;
    }
    Ok(())
}

/// Remove exactly the listeners this view's bindings created.
pub(crate) fn unbind_view(view: &View) {
    for record in view.take_bindings() {
        match record {
            BindingRecord::Source {
                dispatcher,
                listener,
            } => dispatcher.remove_listener(listener),
            BindingRecord::Dom { element, listener } => element.remove_listener(listener),
            BindingRecord::Teardown(teardown) => teardown(),
        }
    }
}

fn collect_bindable(element: &Element, out: &mut Vec<Element>) {
    for child in element.children() {
        if is_nested_view(&child) {
            continue;
        }
        out.push(child.clone());
        // A repeat template's insides belong to the item views.
        if child.attr("st-repeat").is_none() {
            collect_bindable(&child, out);
        }
    }
}

fn is_nested_view(element: &Element) -> bool {
    element.attr("st-view").is_some()
        || element.attr("st-app").is_some()
        || element.has_class("st-view")
        || element.has_class("st-app")
}

fn bind_element_attributes(view: &View, element: &Element) -> Result<(), BindError> {
    let is_repeat_template = element.attr("st-repeat").is_some();
    for (name, raw_value) in element.attributes() {
        let Some(key) = name.strip_prefix(PREFIX) else {
            continue;
        };
        if RESERVED.contains(&key) {
            continue;
        }
        // A repeat template's other bindings belong to the item views that
        // will be cloned from it, not to this scope.
        if is_repeat_template && key != "repeat" {
            continue;
        }
        if raw_value.trim().is_empty() {
            return Err(BindError::EmptyBinding { attribute: name });
        }

        let mut halves = raw_value.splitn(2, '|');
        let expr = halves.next().unwrap_or_default();
        let parser = halves.next().and_then(|parser_name| {
            let parser_name = path::clean_property_path(parser_name);
            let found = view.parser(&parser_name);
            if found.is_none() {
                tracing::warn!(attribute = %name, parser = %parser_name, "unknown parse function");
            }
            found
        });

        let entries: Vec<(String, Option<String>)> = expr
            .split(',')
            .map(|entry| {
                let mut parts = entry.splitn(2, ':');
                (
                    parts.next().unwrap_or_default().trim().to_owned(),
                    parts.next().map(|p| p.trim().to_owned()),
                )
            })
            .collect();
        let (first_path, first_param) = entries[0].clone();

        match key {
            "bind" | "model" => {
                bind_element_value(view, element, &first_path, parser.clone())?;
            }
            "repeat" => {
                bind_repeat(view, element, &first_path, first_param.as_deref())?;
            }
            _ if key.starts_with("attr-") => {
                let property = &key["attr-".len()..];
                bind_native_property(view, element, property, &first_path, parser.clone())?;
            }
            _ => match Applier::lookup(key) {
                Some((applier, multiple)) => {
                    let take = if multiple { entries.len() } else { 1 };
                    for (entry_path, entry_param) in entries.iter().take(take) {
                        bind_applier(
                            view,
                            element,
                            applier,
                            &name,
                            entry_path,
                            entry_param.as_deref(),
                            parser.clone(),
                        )?;
                    }
                }
                None if key.starts_with("on") => {
                    bind_dom_event(view, element, &key["on".len()..], &first_path)?;
                }
                None if is_native_property(element, key) => {
                    bind_native_property(view, element, key, &first_path, parser.clone())?;
                }
                None => {
                    tracing::warn!(
                        attribute = %name,
                        "unrecognized binding attribute; skipped"
                    );
                }
            },
        }
    }
    Ok(())
}

fn is_native_property(element: &Element, name: &str) -> bool {
    element.has_property(name) || NATIVE_PROPERTIES.contains(&name)
}

fn parsed(value: Value, parser: &Option<ParseFn>) -> Value {
    match parser {
        Some(parse) => parse(&value),
        None => value,
    }
}

/// Apply now, re-apply on every `change:<property>`, and record the wiring.
fn watch(view: &View, source: &BindingSource, property: &str, apply: Rc<dyn Fn()>) {
    apply();
    let dispatcher = source.dispatcher();
    let listener = {
        let apply = Rc::clone(&apply);
        dispatcher.on(&kind::change_of(property), move |_| apply())
    };
    view.push_binding(BindingRecord::Source {
        dispatcher,
        listener,
    });
}

fn record_dom(view: &View, element: &Element, listener: DomListenerId) {
    view.push_binding(BindingRecord::Dom {
        element: element.clone(),
        listener,
    });
}

fn bind_applier(
    view: &View,
    element: &Element,
    applier: Applier,
    attribute: &str,
    raw_path: &str,
    param: Option<&str>,
    parser: Option<ParseFn>,
) -> Result<(), BindError> {
    if applier == Applier::Class && param.is_none() {
        return Err(BindError::ClassParam {
            attribute: attribute.to_owned(),
        });
    }
    let (source, property) = path::resolve(view.scope(), raw_path)?;
    let apply: Rc<dyn Fn()> = {
        let source = source.clone();
        let property = property.clone();
        let element = element.clone();
        let param = param.map(str::to_owned);
        Rc::new(move || {
            let value = parsed(source.get(&property), &parser);
            applier.apply(&value, &element, param.as_deref());
        })
    };
    watch(view, &source, &property, apply);
    Ok(())
}

fn bind_dom_event(
    view: &View,
    element: &Element,
    dom_kind: &str,
    raw_path: &str,
) -> Result<(), BindError> {
    let handler_name = path::clean_property_path(raw_path);
    let handler = view
        .handler(&handler_name)
        .ok_or(BindError::MissingHandler {
            name: handler_name.clone(),
        })?;
    let weak = view.downgrade();
    let listener = element.add_listener(dom_kind, move |event| {
        if let Some(view) = weak.upgrade() {
            handler(&view, event);
        }
    });
    record_dom(view, element, listener);
    Ok(())
}

fn bind_native_property(
    view: &View,
    element: &Element,
    property_name: &str,
    raw_path: &str,
    parser: Option<ParseFn>,
) -> Result<(), BindError> {
    let (source, property) = path::resolve(view.scope(), raw_path)?;
    let boolean =
        BOOL_PROPERTIES.contains(&property_name) || element.property_is_bool(property_name);

    let apply: Rc<dyn Fn()> = {
        let source = source.clone();
        let property = property.clone();
        let element = element.clone();
        let property_name = property_name.to_owned();
        Rc::new(move || {
            let value = parsed(source.get(&property), &parser);
            if boolean {
                element.set_property(property_name.clone(), Value::Bool(value.truthy()));
            } else {
                element.set_property(property_name.clone(), value);
            }
        })
    };
    watch(view, &source, &property, apply);

    for dom_kind in ["input", "change"] {
        let source = source.clone();
        let property = property.clone();
        let element_for_read = element.clone();
        let property_name = property_name.to_owned();
        let listener = element.add_listener(dom_kind, move |_| {
            source.set(&property, element_for_read.property(&property_name));
        });
        record_dom(view, element, listener);
    }
    Ok(())
}

/// Element-type best judgement for `st-bind`/`st-model`: checkbox checked
/// state, radio matching by value, input value, otherwise rendered content.
fn bind_element_value(
    view: &View,
    element: &Element,
    raw_path: &str,
    parser: Option<ParseFn>,
) -> Result<(), BindError> {
    let (source, property) = path::resolve(view.scope(), raw_path)?;
    let tag = element.tag();

    if matches!(tag.as_str(), "input" | "textarea" | "select") {
        let input_type = element
            .attr("type")
            .unwrap_or_else(|| tag.clone())
            .to_lowercase();
        match input_type.as_str() {
            "checkbox" => {
                let apply: Rc<dyn Fn()> = {
                    let source = source.clone();
                    let property = property.clone();
                    let element = element.clone();
                    Rc::new(move || element.set_checked(source.get(&property).truthy()))
                };
                watch(view, &source, &property, apply);
                for dom_kind in ["input", "change"] {
                    let source = source.clone();
                    let property = property.clone();
                    let element_for_read = element.clone();
                    let listener = element.add_listener(dom_kind, move |_| {
                        source.set(&property, Value::Bool(element_for_read.checked()));
                    });
                    record_dom(view, element, listener);
                }
                return Ok(());
            }
            "radio" => {
                let apply: Rc<dyn Fn()> = {
                    let source = source.clone();
                    let property = property.clone();
                    let element = element.clone();
                    Rc::new(move || {
                        if element.value() == source.get(&property).display_text() {
                            element.set_checked(true);
                        }
                    })
                };
                watch(view, &source, &property, apply);
            }
            _ => {
                let apply: Rc<dyn Fn()> = {
                    let source = source.clone();
                    let property = property.clone();
                    let element = element.clone();
                    let parser = parser.clone();
                    Rc::new(move || {
                        let text = parsed(source.get(&property), &parser).display_text();
                        if element.value() != text {
                            element.set_value(text);
                        }
                    })
                };
                watch(view, &source, &property, apply);
            }
        }
        for dom_kind in ["input", "change"] {
            let source = source.clone();
            let property = property.clone();
            let element_for_read = element.clone();
            let listener = element.add_listener(dom_kind, move |_| {
                source.set(&property, Value::Str(element_for_read.value()));
            });
            record_dom(view, element, listener);
        }
        return Ok(());
    }

    let apply: Rc<dyn Fn()> = {
        let source = source.clone();
        let property = property.clone();
        let element = element.clone();
        Rc::new(move || {
            element.set_html(&parsed(source.get(&property), &parser).display_text());
        })
    };
    watch(view, &source, &property, apply);
    Ok(())
}

// ── repeat ──────────────────────────────────────────────────────────────

struct RepeatState {
    tracked: Option<(Dispatcher, ListenerId)>,
    item_views: Vec<View>,
}

struct RepeatCtx {
    template: Element,
    source: BindingSource,
    property: String,
    renderer: Option<String>,
    context: Option<Context>,
    state: RefCell<RepeatState>,
}

/// `st-repeat="listProperty:ItemViewName"`: one clone of the template
/// element per item, fully rebuilt (remove all, recreate all) on every
/// `add`/`remove`/`change` from the bound list.
fn bind_repeat(
    view: &View,
    element: &Element,
    raw_path: &str,
    renderer: Option<&str>,
) -> Result<(), BindError> {
    let (source, property) = path::resolve(view.scope(), raw_path)?;
    element.add_class(EXCLUDE_CLASS);

    let ctx = Rc::new(RepeatCtx {
        template: element.clone(),
        source: source.clone(),
        property: property.clone(),
        renderer: renderer.map(str::to_owned),
        context: view.context(),
        state: RefCell::new(RepeatState {
            tracked: None,
            item_views: Vec::new(),
        }),
    });

    let apply: Rc<dyn Fn()> = {
        let ctx = Rc::clone(&ctx);
        Rc::new(move || run_repeat(&ctx))
    };
    watch(view, &source, &property, apply);

    view.push_binding(BindingRecord::Teardown(Box::new(move || {
        let mut state = ctx.state.borrow_mut();
        if let Some((dispatcher, listener)) = state.tracked.take() {
            dispatcher.remove_listener(listener);
        }
        let old = std::mem::take(&mut state.item_views);
        drop(state);
        for item_view in old {
            item_view.remove();
        }
    })));
    Ok(())
}

fn run_repeat(ctx: &Rc<RepeatCtx>) {
    let bound = ctx.source.get(&ctx.property);

    // Follow the bound container: re-run on its add/remove/change.
    let container = match &bound {
        Value::List(list) => Some(list.dispatcher().clone()),
        Value::Collection(collection) => Some(collection.dispatcher().clone()),
        _ => None,
    };
    {
        let mut state = ctx.state.borrow_mut();
        let tracked_id = state.tracked.as_ref().map(|(d, _)| d.id());
        if tracked_id != container.as_ref().map(Dispatcher::id) {
            if let Some((dispatcher, listener)) = state.tracked.take() {
                dispatcher.remove_listener(listener);
            }
            if let Some(dispatcher) = container {
                let weak = Rc::downgrade(ctx);
                let listener = dispatcher.on("add remove change", move |_| {
                    if let Some(ctx) = weak.upgrade() {
                        run_repeat(&ctx);
                    }
                });
                state.tracked = Some((dispatcher, listener));
            }
        }
    }

    // Full replace: tear down the previous clones before creating new ones.
    let previous: Vec<View> = {
        let mut state = ctx.state.borrow_mut();
        std::mem::take(&mut state.item_views)
    };
    for item_view in previous {
        item_view.remove();
    }

    let items: Vec<Value> = match bound {
        Value::List(list) => list.to_vec(),
        Value::Collection(collection) => collection
            .models()
            .into_iter()
            .map(Value::Model)
            .collect(),
        Value::Array(items) => items,
        _ => Vec::new(),
    };

    let Some(parent) = ctx.template.parent() else {
        return; // a detached template has nowhere to render
    };

    let factory = ctx.renderer.as_deref().and_then(|name| {
        let found = ctx
            .context
            .as_ref()
            .and_then(|context| context.view_factory(name));
        if found.is_none() {
            tracing::warn!(renderer = name, "unknown item view; using a plain view");
        }
        found
    });

    let mut item_views = Vec::new();
    let mut anchor = ctx.template.clone();
    for item in items {
        let data = match item {
            Value::Model(_) | Value::Bag(_) => item,
            Value::Object(map) => Value::Bag(Bag::from_pairs(map)),
            other => Value::Bag(Bag::from_pairs([("value".to_owned(), other)])),
        };
        let clone = ctx.template.deep_clone();
        clone.remove_attr(&format!("{PREFIX}repeat"));
        clone.remove_class(EXCLUDE_CLASS);
        clone.add_class("st-repeat");
        parent.insert_child_after(&anchor, &clone);

        let built = match &factory {
            Some(factory) => factory(ViewSeed {
                element: clone.clone(),
                data,
                context: ctx.context.clone(),
            }),
            None => View::builder()
                .element(clone.clone())
                .data("data", data)
                .build(ctx.context.as_ref()),
        };
        match built {
            Ok(item_view) => item_views.push(item_view),
            Err(error) => {
                tracing::warn!(%error, "repeat item view failed to bind; skipped");
                clone.detach();
            }
        }
        anchor = clone;
    }
    ctx.state.borrow_mut().item_views = item_views;
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_core::{List, Model, SetOptions};
    use std::cell::Cell;

    fn scope_view(element: Element, data: Vec<(&str, Value)>) -> View {
        let mut builder = View::builder().element(element);
        for (name, value) in data {
            builder = builder.data(name, value);
        }
        builder.build(None).expect("view binds")
    }

    #[test]
    fn text_binding_renders_and_tracks() {
        let span = Element::new("span").with_attr("st-text", "title");
        let root = Element::new("div").with_child(span.clone());
        let view = scope_view(root, vec![("title", Value::from("first"))]);
        assert_eq!(span.content(), "first");
        view.scope().set("title", Value::from("second"));
        assert_eq!(span.content(), "second");
    }

    #[test]
    fn checkbox_two_way_binding() {
        let checkbox = Element::new("input")
            .with_attr("type", "checkbox")
            .with_attr("st-bind", "done");
        let root = Element::new("div").with_child(checkbox.clone());
        let view = scope_view(root, vec![("done", Value::Bool(false))]);
        assert!(!checkbox.checked());

        // Model → DOM.
        view.scope().set("done", Value::Bool(true));
        assert!(checkbox.checked());

        // DOM → model.
        checkbox.set_checked(false);
        checkbox.emit("change");
        assert_eq!(view.scope().get("done"), Value::Bool(false));
        checkbox.set_checked(true);
        checkbox.emit("input");
        assert_eq!(view.scope().get("done"), Value::Bool(true));
    }

    #[test]
    fn double_bind_does_not_duplicate_listeners() {
        let checkbox = Element::new("input")
            .with_attr("type", "checkbox")
            .with_attr("st-bind", "done");
        let root = Element::new("div").with_child(checkbox.clone());
        let view = scope_view(root, vec![("done", Value::Bool(false))]);

        let after_first = checkbox.listener_count();
        let scope_after_first = view.scope().dispatcher().total_listeners();
        view.bind().unwrap();
        assert_eq!(checkbox.listener_count(), after_first);
        assert_eq!(view.scope().dispatcher().total_listeners(), scope_after_first);

        // Still exactly one write per DOM event.
        let writes = Rc::new(Cell::new(0));
        let w = Rc::clone(&writes);
        view.scope().dispatcher().on("change:done", move |_| w.set(w.get() + 1));
        checkbox.set_checked(true);
        checkbox.emit("change");
        assert_eq!(writes.get(), 1);
    }

    #[test]
    fn bind_then_unbind_leaves_no_listeners() {
        let model = Model::from_attrs([("title", Value::from("x")), ("done", Value::Bool(false))]);
        let label = Element::new("label").with_attr("st-text", "item.title");
        let checkbox = Element::new("input")
            .with_attr("type", "checkbox")
            .with_attr("st-bind", "item.done");
        let hidden = Element::new("footer").with_attr("st-hide", "item.done");
        let root = Element::new("div")
            .with_child(label)
            .with_child(checkbox.clone())
            .with_child(hidden);

        let view = scope_view(root, vec![("item", Value::Model(model.clone()))]);
        assert!(model.dispatcher().total_listeners() > 0);
        assert!(checkbox.listener_count() > 0);

        view.unbind();
        assert_eq!(model.dispatcher().total_listeners(), 0);
        assert_eq!(checkbox.listener_count(), 0);
        assert_eq!(view.scope().dispatcher().total_listeners(), 0);
    }

    #[test]
    fn input_value_two_way() {
        let input = Element::new("input").with_attr("st-bind", "title");
        let root = Element::new("div").with_child(input.clone());
        let view = scope_view(root, vec![("title", Value::from("hello"))]);
        assert_eq!(input.value(), "hello");

        input.set_value("typed");
        input.emit("input");
        assert_eq!(view.scope().get("title"), Value::from("typed"));
    }

    #[test]
    fn non_input_bind_renders_content() {
        let div = Element::new("div").with_attr("st-bind", "n");
        let root = Element::new("section").with_child(div.clone());
        scope_view(root, vec![("n", Value::Int(7))]);
        assert_eq!(div.content(), "7");
    }

    #[test]
    fn parser_suffix_shapes_output() {
        let span = Element::new("span").with_attr("st-text", "remaining|itemOrItems");
        let root = Element::new("div").with_child(span.clone());
        let view = View::builder()
            .element(root)
            .data("remaining", Value::Int(1))
            .parser("itemOrItems", |value| {
                Value::from(if value.as_i64() == Some(1) { "item" } else { "items" })
            })
            .build(None)
            .unwrap();
        assert_eq!(span.content(), "item");
        view.scope().set("remaining", Value::Int(3));
        assert_eq!(span.content(), "items");
    }

    #[test]
    fn class_binding_requires_a_param() {
        let li = Element::new("li").with_attr("st-class", "done");
        let root = Element::new("ul").with_child(li);
        let error = View::builder()
            .element(root)
            .data("done", Value::Bool(true))
            .build(None)
            .unwrap_err();
        assert!(matches!(error, BindError::ClassParam { .. }));
    }

    #[test]
    fn class_binding_handles_multiple_entries() {
        let li = Element::new("li").with_attr("st-class", "done:completed,active:selected");
        let root = Element::new("ul").with_child(li.clone());
        let view = scope_view(
            root,
            vec![("done", Value::Bool(true)), ("active", Value::Bool(false))],
        );
        assert!(li.has_class("completed"));
        assert!(!li.has_class("selected"));
        view.scope().set("active", Value::Bool(true));
        assert!(li.has_class("selected"));
    }

    #[test]
    fn dom_event_binding_invokes_the_named_handler() {
        let button = Element::new("button").with_attr("st-onclick", "clear");
        let root = Element::new("div").with_child(button.clone());
        let clicks = Rc::new(Cell::new(0));
        let c = Rc::clone(&clicks);
        View::builder()
            .element(root)
            .handler("clear", move |_, _| c.set(c.get() + 1))
            .build(None)
            .unwrap();
        button.emit("click");
        assert_eq!(clicks.get(), 1);
    }

    #[test]
    fn missing_handler_is_fatal() {
        let button = Element::new("button").with_attr("st-onclick", "nope");
        let root = Element::new("div").with_child(button);
        let error = View::builder().element(root).build(None).unwrap_err();
        assert!(matches!(error, BindError::MissingHandler { .. }));
    }

    #[test]
    fn undefined_path_is_fatal() {
        let span = Element::new("span").with_attr("st-text", "missing.title");
        let root = Element::new("div").with_child(span);
        let error = View::builder().element(root).build(None).unwrap_err();
        assert!(matches!(error, BindError::UndefinedPath { .. }));
    }

    #[test]
    fn empty_attribute_is_fatal() {
        let span = Element::new("span").with_attr("st-text", "  ");
        let root = Element::new("div").with_child(span);
        let error = View::builder().element(root).build(None).unwrap_err();
        assert!(matches!(error, BindError::EmptyBinding { .. }));
    }

    #[test]
    fn unrecognized_attribute_is_skipped() {
        let span = Element::new("span").with_attr("st-bogus", "title");
        let root = Element::new("div").with_child(span.clone());
        scope_view(root, vec![("title", Value::from("x"))]);
        assert_eq!(span.content(), "");
    }

    #[test]
    fn attr_subprefix_forces_native_interpretation() {
        let input = Element::new("input").with_attr("st-attr-placeholder", "hint");
        let root = Element::new("div").with_child(input.clone());
        let view = scope_view(root, vec![("hint", Value::from("type here"))]);
        assert_eq!(input.property("placeholder"), Value::from("type here"));
        view.scope().set("hint", Value::from("changed"));
        assert_eq!(input.property("placeholder"), Value::from("changed"));
    }

    #[test]
    fn native_boolean_property_coerces_truthiness() {
        let button = Element::new("button").with_attr("st-disabled", "busy");
        let root = Element::new("div").with_child(button.clone());
        scope_view(root, vec![("busy", Value::Int(1))]);
        assert_eq!(button.property("disabled"), Value::Bool(true));
    }

    #[test]
    fn nested_view_subtrees_are_skipped() {
        let inner_span = Element::new("span").with_attr("st-text", "missing");
        let nested = Element::new("div")
            .with_attr("st-view", "Child")
            .with_child(inner_span.clone());
        let root = Element::new("div").with_child(nested);
        // "missing" is undefined; binding would fail if the subtree were
        // visited.
        scope_view(root, vec![]);
        assert_eq!(inner_span.content(), "");
    }

    #[test]
    fn repeat_renders_one_clone_per_item() {
        let list = List::from_values([
            Value::from_json(serde_json::json!({"title": "a"})),
            Value::from_json(serde_json::json!({"title": "b"})),
        ]);
        let template = Element::new("li")
            .with_attr("st-repeat", "items")
            .with_attr("st-text", "data.title");
        let root = Element::new("ul").with_child(template.clone());
        scope_view(root.clone(), vec![("items", Value::List(list.clone()))]);

        let clones = root.query_class("st-repeat");
        assert_eq!(clones.len(), 2);
        assert_eq!(clones[0].content(), "a");
        assert_eq!(clones[1].content(), "b");
        assert!(template.has_class(EXCLUDE_CLASS));

        // The list grows: full rebuild, three fresh clones.
        list.push(Value::from_json(serde_json::json!({"title": "c"})));
        let clones = root.query_class("st-repeat");
        assert_eq!(clones.len(), 3);
        assert_eq!(clones[2].content(), "c");

        list.pop();
        list.pop();
        assert_eq!(root.query_class("st-repeat").len(), 1);
    }

    #[test]
    fn repeat_rebuilds_on_member_change() {
        let model = Model::from_attrs([("title", Value::from("before"))]);
        let list = List::from_values([Value::Model(model.clone())]);
        let template = Element::new("li")
            .with_attr("st-repeat", "items")
            .with_attr("st-text", "data.title");
        let root = Element::new("ul").with_child(template);
        scope_view(root.clone(), vec![("items", Value::List(list))]);

        model
            .set_one("title", Value::from("after"), SetOptions::default())
            .unwrap();
        let clones = root.query_class("st-repeat");
        assert_eq!(clones.len(), 1);
        assert_eq!(clones[0].content(), "after");
    }

    #[test]
    fn repeat_teardown_releases_the_list() {
        let list = List::from_values([Value::from_json(serde_json::json!({"title": "a"}))]);
        let template = Element::new("li").with_attr("st-repeat", "items");
        let root = Element::new("ul").with_child(template);
        let view = scope_view(root.clone(), vec![("items", Value::List(list.clone()))]);
        assert!(list.dispatcher().total_listeners() > 0);

        view.unbind();
        assert_eq!(list.dispatcher().total_listeners(), 0);
        assert!(root.query_class("st-repeat").is_empty());
    }

    #[test]
    fn repeat_uses_registered_item_views() {
        let context = Context::new();
        context.register_view(
            "Shouty",
            Rc::new(|seed: ViewSeed| {
                let element = seed.element.clone();
                let data = seed.data.clone();
                let view = View::builder()
                    .element(seed.element)
                    .data("data", seed.data)
                    .build(seed.context.as_ref())?;
                if let (Some(bag), true) = (data.as_bag(), element.attr("st-text").is_none()) {
                    element.set_text(&bag.get("title").display_text().to_uppercase());
                }
                Ok(view)
            }),
        );
        let template = Element::new("li").with_attr("st-repeat", "items:Shouty");
        let root = Element::new("ul").with_child(template);
        View::builder()
            .element(root.clone())
            .data(
                "items",
                Value::List(List::from_values([Value::from_json(
                    serde_json::json!({"title": "loud"}),
                )])),
            )
            .build(Some(&context))
            .unwrap();
        let clones = root.query_class("st-repeat");
        assert_eq!(clones.len(), 1);
        assert_eq!(clones[0].content(), "LOUD");
    }
}
