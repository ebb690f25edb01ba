#![forbid(unsafe_code)]

//! Headless walkthrough of the Todo application: create, toggle, filter,
//! clear, and show what the store persisted.

use std::rc::Rc;

use tracing_subscriber::EnvFilter;

use strand_app::history::{MemoryLocation, NavigateOptions};
use strand_core::{KeyValueStore, MemoryStore};
use strand_dom::key;
use strand_todo_demo::{DemoError, TodoApp, TodoCollectionExt};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    if let Err(error) = run() {
        eprintln!("{error}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), DemoError> {
    let store = Rc::new(MemoryStore::new());
    let location = Rc::new(MemoryLocation::new());
    let app = TodoApp::bootstrap(store.clone(), location)?;

    for title in ["buy milk", "write docs", "walk the dog"] {
        app.dom.new_todo.set_value(title);
        app.dom.new_todo.emit_key("keydown", key::ENTER);
    }
    println!(
        "created {} todos, {} remaining",
        app.collection().len(),
        app.collection().remaining().len()
    );

    // Tick off the first one through its checkbox.
    if let Some(first) = app.dom.items().first() {
        if let Some(toggle) = first.query_class("toggle").first() {
            toggle.set_checked(true);
            toggle.emit("change");
        }
    }
    println!(
        "after toggling: {} completed, {} remaining",
        app.collection().completed().len(),
        app.collection().remaining().len()
    );

    // Route to the "completed" filter and show what stays visible.
    app.router
        .navigate("completed", NavigateOptions::default().trigger());
    println!(
        "filter is now {:?}",
        app.filter_model().get("filter").display_text()
    );
    for (item, view) in app.dom.items().iter().zip(app.item_views()) {
        let title = view.scope().get("model");
        let title = title
            .as_model()
            .map(|m| m.get("title").display_text())
            .unwrap_or_default();
        let hidden = if item.has_class("hidden") { "hidden" } else { "shown" };
        println!("  [{hidden}] {title}");
    }

    app.dom.clear_completed.emit("click");
    println!(
        "after clearing completed: {} todos left",
        app.collection().len()
    );

    println!(
        "persisted: {}",
        store
            .get(strand_todo_demo::model::STORE_NAMESPACE)
            .unwrap_or_else(|| "[]".to_owned())
    );
    Ok(())
}
