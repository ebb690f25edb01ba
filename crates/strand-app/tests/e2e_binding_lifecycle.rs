//! End-to-end binding lifecycle: a view with injected singletons, a
//! repeat, two-way inputs, and template swaps must never leak or
//! duplicate listeners across bind/unbind/rebind cycles.

use std::rc::Rc;

use strand_app::{Context, View};
use strand_core::{Collection, List, Model, SetOptions, Value};
use strand_dom::Element;

fn listener_totals(sources: &[&strand_core::Dispatcher]) -> Vec<usize> {
    sources.iter().map(|d| d.total_listeners()).collect()
}

#[test]
fn bind_unbind_restores_all_listener_registries() {
    let model = Model::from_attrs([
        ("title", Value::from("t")),
        ("completed", Value::Bool(false)),
    ]);
    let list = List::from_values([Value::from_json(serde_json::json!({"label": "x"}))]);

    let input = Element::new("input").with_attr("st-bind", "item.title");
    let checkbox = Element::new("input")
        .with_attr("type", "checkbox")
        .with_attr("st-bind", "item.completed");
    let repeat = Element::new("li").with_attr("st-repeat", "entries");
    let root = Element::new("div")
        .with_child(input.clone())
        .with_child(checkbox.clone())
        .with_child(Element::new("ul").with_child(repeat));

    let view = View::builder()
        .element(root)
        .data("item", Value::Model(model.clone()))
        .data("entries", Value::List(list.clone()))
        .build(None)
        .unwrap();

    let bound = listener_totals(&[model.dispatcher(), list.dispatcher()]);
    assert!(bound.iter().all(|n| *n > 0));
    assert!(input.listener_count() > 0);

    view.unbind();
    assert_eq!(
        listener_totals(&[model.dispatcher(), list.dispatcher()]),
        vec![0, 0]
    );
    assert_eq!(input.listener_count(), 0);
    assert_eq!(checkbox.listener_count(), 0);
    assert_eq!(view.scope().dispatcher().total_listeners(), 0);

    // Rebinding restores exactly the same counts.
    view.bind().unwrap();
    assert_eq!(
        listener_totals(&[model.dispatcher(), list.dispatcher()]),
        bound
    );
}

#[test]
fn template_swap_rebinds_without_duplicates() {
    let model = Model::from_attrs([("title", Value::from("hello"))]);
    let root = Element::new("div");
    let view = View::builder()
        .element(root.clone())
        .data("item", Value::Model(model.clone()))
        .template_with(|| vec![Element::new("span").with_attr("st-text", "item.title")])
        .build(None)
        .unwrap();
    assert_eq!(root.children()[0].content(), "hello");
    let after_first = model.dispatcher().total_listeners();

    view.set_template(|| {
        vec![
            Element::new("strong").with_attr("st-text", "item.title"),
            Element::new("em").with_attr("st-text", "item.title"),
        ]
    })
    .unwrap();

    assert_eq!(root.children().len(), 2);
    assert_eq!(root.children()[0].content(), "hello");
    assert_eq!(
        model.dispatcher().total_listeners(),
        after_first + 1,
        "two text bindings now, one before; nothing stale"
    );

    model
        .set_one("title", Value::from("swapped"), SetOptions::default())
        .unwrap();
    assert_eq!(root.children()[1].content(), "swapped");
}

#[test]
fn injected_collection_drives_a_repeat_through_the_context() {
    let context = Context::new();
    let collection = Collection::new();
    context.map_singleton("todos", Value::Collection(collection.clone()));

    let template = Element::new("li").with_attr("st-repeat", "todos");
    let root = Element::new("ul").with_child(template);
    let view = View::builder()
        .element(root.clone())
        .declare("todos")
        .build(Some(&context))
        .unwrap();

    assert!(root.query_class("st-repeat").is_empty());
    collection.push(Value::Model(Model::from_attrs([(
        "title",
        Value::from("a"),
    )])));
    assert_eq!(root.query_class("st-repeat").len(), 1);

    collection.push(Value::Model(Model::from_attrs([(
        "title",
        Value::from("b"),
    )])));
    assert_eq!(root.query_class("st-repeat").len(), 2);

    view.remove();
    assert_eq!(collection.dispatcher().total_listeners(), 0);
    assert!(root.query_class("st-repeat").is_empty());
}
