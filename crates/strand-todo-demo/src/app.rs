#![forbid(unsafe_code)]

//! Application wiring: context, router, the application view, and the
//! per-todo item views.
//!
//! The shape follows the classic pattern: the context registers the
//! `todoCollection` and `filterModel` singletons, a `*filter` route keeps
//! the filter model in sync with the URL fragment, and the application
//! view owns the stats line plus create/clear/toggle-all interactions.
//! Item views are created one per todo as models join the collection and
//! torn down when the collection drops them.

use std::cell::RefCell;
use std::rc::Rc;

use thiserror::Error;

use strand_app::history::StartOptions;
use strand_app::{
    Application, BindError, Context, History, HistoryError, Location, Router, RouterError, View,
    ViewBuilder,
};
use strand_core::{
    Bag, Collection, KeyValueStore, Model, ModelError, SetOptions, SyncOptions, Value,
};
use strand_dom::{Element, key};

use crate::dom::TodoDom;
use crate::model::{TodoCollectionExt, todo_collection};

#[derive(Debug, Error)]
pub enum DemoError {
    #[error(transparent)]
    Bind(#[from] BindError),
    #[error(transparent)]
    Router(#[from] RouterError),
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error(transparent)]
    Model(#[from] ModelError),
}

struct TodoItem {
    model: Model,
    view: View,
}

/// Shared application core the event listeners close over.
struct Core {
    context: Context,
    collection: Collection,
    filter_model: Model,
    scope: Bag,
    todo_list: Element,
    filters: Vec<(String, Element)>,
    items: RefCell<Vec<TodoItem>>,
}

impl Core {
    /// Refresh the stats line, section visibility, and filter-link
    /// highlighting. The bound DOM follows through the scope bindings.
    fn render(&self) {
        let completed = self.collection.completed().len() as i64;
        let remaining = self.collection.remaining().len() as i64;
        self.scope.set("completed", Value::Int(completed));
        self.scope.set("remaining", Value::Int(remaining));
        let any = !self.collection.is_empty();
        self.scope.set("mainVisible", Value::Bool(any));
        self.scope.set("footerVisible", Value::Bool(any));
        self.scope.set("hasCompleted", Value::Bool(completed > 0));
        self.scope.set("allChecked", Value::Bool(remaining == 0));

        let filter = self.filter_model.get("filter").display_text();
        for (fragment, link) in &self.filters {
            link.toggle_class("selected", *fragment == filter);
        }
    }

    fn add_one(&self, model: Model) {
        match build_item(&model, &self.context) {
            Ok(view) => {
                if let Some(li) = view.element() {
                    self.todo_list.append_child(&li);
                }
                self.apply_filter(&view, &model);
                self.items.borrow_mut().push(TodoItem { model, view });
            }
            Err(error) => tracing::warn!(%error, "todo item view failed to bind"),
        }
    }

    fn add_all(&self) {
        for item in self.items.borrow_mut().drain(..) {
            item.view.remove();
        }
        for model in self.collection.models() {
            self.add_one(model);
        }
    }

    fn remove_item(&self, model: &Model) {
        let mut items = self.items.borrow_mut();
        let Some(index) = items.iter().position(|item| item.model == *model) else {
            return;
        };
        let item = items.remove(index);
        drop(items);
        item.view.remove();
    }

    fn filter_all(&self) {
        let items: Vec<(Model, View)> = self
            .items
            .borrow()
            .iter()
            .map(|item| (item.model.clone(), item.view.clone()))
            .collect();
        for (model, view) in items {
            self.apply_filter(&view, &model);
        }
    }

    fn apply_filter(&self, view: &View, model: &Model) {
        let filter = self.filter_model.get("filter").display_text();
        let completed = model.get("completed").truthy();
        let hidden = (!completed && filter == "completed") || (completed && filter == "active");
        view.scope().set("hidden", Value::Bool(hidden));
    }
}

/// The bootstrapped Todo application.
pub struct TodoApp {
    pub application: Application,
    pub history: History,
    pub router: Router,
    pub dom: TodoDom,
    view: View,
    core: Rc<Core>,
}

impl TodoApp {
    /// Wire the whole application over a key-value store and a location:
    /// context singletons, router + history, the mounted application view,
    /// and the initial fetch from the store.
    pub fn bootstrap(
        store: Rc<dyn KeyValueStore>,
        location: Rc<dyn Location>,
    ) -> Result<TodoApp, DemoError> {
        let context = Context::new();
        let collection = todo_collection(store);
        let filter_model = Model::from_attrs([("filter", Value::from(""))]);
        context.map_singleton("todoCollection", Value::Collection(collection.clone()));
        context.map_singleton("filterModel", Value::Model(filter_model.clone()));

        let history = History::new();
        let router = Router::new(&history);
        {
            let filter_model = filter_model.clone();
            router.route("*filter", "setFilter", move |params| {
                let fragment = params.first().cloned().flatten().unwrap_or_default();
                let _ = filter_model.set_one("filter", Value::from(fragment), SetOptions::default());
            })?;
        }
        history.start(location, StartOptions::default())?;

        let dom = TodoDom::build();
        let application = Application::new(context.clone());
        let view = application.mount(app_view_builder(&dom), dom.root.clone())?;

        let core = Rc::new(Core {
            context,
            collection: collection.clone(),
            filter_model: filter_model.clone(),
            scope: view.scope().clone(),
            todo_list: dom.todo_list.clone(),
            filters: dom.filters.clone(),
            items: RefCell::new(Vec::new()),
        });
        wire(&core, &collection, &filter_model);

        collection.fetch(SyncOptions::default().reset())?;

        let app = TodoApp {
            application,
            history,
            router,
            dom,
            view,
            core,
        };
        app.core.render();
        Ok(app)
    }

    #[must_use]
    pub fn collection(&self) -> &Collection {
        &self.core.collection
    }

    #[must_use]
    pub fn filter_model(&self) -> &Model {
        &self.core.filter_model
    }

    #[must_use]
    pub fn view(&self) -> &View {
        &self.view
    }

    /// The live item views, in list order.
    #[must_use]
    pub fn item_views(&self) -> Vec<View> {
        self.core
            .items
            .borrow()
            .iter()
            .map(|item| item.view.clone())
            .collect()
    }
}

fn wire(core: &Rc<Core>, collection: &Collection, filter_model: &Model) {
    let dispatcher = collection.dispatcher();
    {
        let core = Rc::clone(core);
        dispatcher.on("add", move |event| {
            if let Some(model) = event.model() {
                core.add_one(model.clone());
            }
        });
    }
    {
        let core = Rc::clone(core);
        dispatcher.on("remove", move |event| {
            if let Some(model) = event.model() {
                core.remove_item(model);
            }
        });
    }
    {
        let core = Rc::clone(core);
        dispatcher.on("reset", move |_| core.add_all());
    }
    {
        let core = Rc::clone(core);
        dispatcher.on("change:completed", move |_| core.filter_all());
    }
    {
        let core = Rc::clone(core);
        dispatcher.on("all", move |_| core.render());
    }
    {
        let core = Rc::clone(core);
        filter_model.dispatcher().on("change:filter", move |_| {
            core.filter_all();
            core.render();
        });
    }
}

fn app_view_builder(dom: &TodoDom) -> ViewBuilder {
    let new_todo = dom.new_todo.clone();
    View::builder()
        .declare("todoCollection")
        .declare("filterModel")
        .data("completed", Value::Int(0))
        .data("remaining", Value::Int(0))
        .data("mainVisible", Value::Bool(false))
        .data("footerVisible", Value::Bool(false))
        .data("hasCompleted", Value::Bool(false))
        .data("allChecked", Value::Bool(false))
        .parser("itemOrItems", |value| {
            Value::from(if value.as_i64() == Some(1) { "item" } else { "items" })
        })
        .handler("createOnEnter", move |view, event| {
            if event.key() != Some(key::ENTER) {
                return;
            }
            let title = new_todo.value().trim().to_owned();
            if title.is_empty() {
                return;
            }
            let Some(collection) = view.scope().get("todoCollection").as_collection().cloned()
            else {
                return;
            };
            let attrs = serde_json::json!({
                "title": title,
                "order": collection.next_order(),
                "completed": false,
            });
            if let Err(error) = collection.create(Value::from_json(attrs), SyncOptions::default())
            {
                tracing::warn!(%error, "todo create failed");
            }
            new_todo.set_value("");
        })
        .handler("clearCompleted", |view, _| {
            let Some(collection) = view.scope().get("todoCollection").as_collection().cloned()
            else {
                return;
            };
            for todo in collection.completed() {
                if let Err(error) = todo.destroy(SyncOptions::default()) {
                    tracing::warn!(%error, "todo destroy failed");
                }
            }
        })
        .handler("toggleAllComplete", |view, _| {
            let completed = view.scope().get("allChecked").truthy();
            let Some(collection) = view.scope().get("todoCollection").as_collection().cloned()
            else {
                return;
            };
            for todo in collection.models() {
                if let Err(error) = todo.save(
                    Some(vec![("completed".to_owned(), Value::Bool(completed))]),
                    SyncOptions::default(),
                ) {
                    tracing::warn!(%error, "todo save failed");
                }
            }
        })
}

/// One todo's list item: checkbox, label, destroy button, and the
/// editing input.
fn build_item(model: &Model, context: &Context) -> Result<View, BindError> {
    let toggle = Element::new("input")
        .with_class("toggle")
        .with_attr("type", "checkbox")
        .with_attr("st-bind", "model.completed")
        .with_attr("st-onchange", "persist");
    let label = Element::new("label")
        .with_attr("st-text", "model.title")
        .with_attr("st-ondblclick", "edit");
    let destroy = Element::new("button")
        .with_class("destroy")
        .with_attr("st-onclick", "clear");
    let edit = Element::new("input")
        .with_class("edit")
        .with_attr("st-onkeydown", "editKeydown")
        .with_attr("st-onblur", "close");
    let li = Element::new("li")
        .with_class("todo-item")
        .with_attr("st-class", "model.completed:completed,hidden:hidden")
        .with_child(
            Element::new("div")
                .with_class("view")
                .with_child(toggle)
                .with_child(label)
                .with_child(destroy),
        )
        .with_child(edit.clone());

    // Shared by Enter and blur: save a trimmed title, or clear the todo
    // when it was emptied out.
    let close: Rc<dyn Fn(&View)> = {
        let li = li.clone();
        let edit = edit.clone();
        Rc::new(move |view: &View| {
            if !li.has_class("editing") {
                return;
            }
            let Some(model) = view.scope().get("model").as_model().cloned() else {
                return;
            };
            let trimmed = edit.value().trim().to_owned();
            if trimmed.is_empty() {
                if let Err(error) = model.destroy(SyncOptions::default()) {
                    tracing::warn!(%error, "todo destroy failed");
                }
            } else if let Err(error) = model.save(
                Some(vec![("title".to_owned(), Value::from(trimmed))]),
                SyncOptions::default(),
            ) {
                tracing::warn!(%error, "todo save failed");
            }
            li.remove_class("editing");
        })
    };

    View::builder()
        .element(li.clone())
        .data("model", Value::Model(model.clone()))
        .data("hidden", Value::Bool(false))
        .handler("persist", |view, _| {
            if let Some(model) = view.scope().get("model").as_model().cloned() {
                if let Err(error) = model.save(None, SyncOptions::default()) {
                    tracing::warn!(%error, "todo save failed");
                }
            }
        })
        .handler("edit", {
            let li = li.clone();
            let edit = edit.clone();
            move |view, _| {
                if let Some(model) = view.scope().get("model").as_model() {
                    edit.set_value(model.get("title").display_text());
                }
                li.add_class("editing");
            }
        })
        .handler("editKeydown", {
            let close = Rc::clone(&close);
            let li = li.clone();
            move |view, event| match event.key() {
                Some(key::ENTER) => close(view),
                Some(key::ESCAPE) => li.remove_class("editing"),
                _ => {}
            }
        })
        .handler("close", {
            let close = Rc::clone(&close);
            move |view, _| close(view)
        })
        .handler("clear", |view, _| {
            if let Some(model) = view.scope().get("model").as_model().cloned() {
                if let Err(error) = model.destroy(SyncOptions::default()) {
                    tracing::warn!(%error, "todo destroy failed");
                }
            }
        })
        .build(Some(context))
}
