#![forbid(unsafe_code)]

//! The application context: dependency-injection registry, event bus, and
//! command dispatcher.
//!
//! Singletons are framework [`Value`]s stored under property names; a
//! target bag receives exactly the dependencies it *declares* (properties
//! explicitly present with a `Null` value). There is no scanning for
//! accidentally-matching names — injection targets opt in per slot.
//!
//! Commands map event kinds to factories; each matching event instantiates
//! the command, runs [`Command::execute`], and drops it.
//!
//! # Invariants
//!
//! 1. `inject` only fills declared, still-`Null` slots; set slots win.
//! 2. Command factories run in mapping order, wildcard mappings first.
//! 3. Mapping a singleton name twice replaces the previous instance.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use strand_core::{Bag, Collection, Dispatcher, Event, List, Model, Value};

use crate::command::{Command, CommandScope};
use crate::view::ViewFactory;

type CommandFactory = Rc<dyn Fn(CommandScope) -> Box<dyn Command>>;

struct ContextInner {
    dispatcher: Dispatcher,
    singletons: RefCell<BTreeMap<String, Value>>,
    commands: RefCell<BTreeMap<String, Vec<CommandFactory>>>,
    views: RefCell<BTreeMap<String, ViewFactory>>,
}

/// Per-application DI registry and event bus. Cloning shares state.
#[derive(Clone)]
pub struct Context {
    inner: Rc<ContextInner>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    #[must_use]
    pub fn new() -> Self {
        let inner = Rc::new(ContextInner {
            dispatcher: Dispatcher::new(),
            singletons: RefCell::new(BTreeMap::new()),
            commands: RefCell::new(BTreeMap::new()),
            views: RefCell::new(BTreeMap::new()),
        });
        let weak: Weak<ContextInner> = Rc::downgrade(&inner);
        inner.dispatcher.on("all", move |event| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            Context { inner }.execute_commands(event);
        });
        Self { inner }
    }

    // ── singletons ──────────────────────────────────────────────────────

    /// Store `value` under one or more space-separated property names.
    pub fn map_singleton(&self, names: &str, value: Value) {
        assert!(
            !names.trim().is_empty(),
            "singleton name must not be empty"
        );
        let mut singletons = self.inner.singletons.borrow_mut();
        for name in names.split_whitespace() {
            singletons.insert(name.to_owned(), value.clone());
        }
    }

    /// Construct-and-store: the factory runs once, at mapping time.
    pub fn map_singleton_with(&self, name: &str, factory: impl FnOnce() -> Value) {
        self.map_singleton(name, factory());
    }

    pub fn unmap_singleton(&self, names: &str) {
        let mut singletons = self.inner.singletons.borrow_mut();
        for name in names.split_whitespace() {
            singletons.remove(name);
        }
    }

    #[must_use]
    pub fn singleton(&self, name: &str) -> Option<Value> {
        self.inner.singletons.borrow().get(name).cloned()
    }

    #[must_use]
    pub fn singleton_model(&self, name: &str) -> Option<Model> {
        self.singleton(name)?.as_model().cloned()
    }

    #[must_use]
    pub fn singleton_collection(&self, name: &str) -> Option<Collection> {
        self.singleton(name)?.as_collection().cloned()
    }

    #[must_use]
    pub fn singleton_list(&self, name: &str) -> Option<List> {
        self.singleton(name)?.as_list().cloned()
    }

    #[must_use]
    pub fn singleton_bag(&self, name: &str) -> Option<Bag> {
        self.singleton(name)?.as_bag().cloned()
    }

    /// Fill the target's declared, still-`Null` slots from the registry.
    pub fn inject(&self, target: &Bag) {
        let singletons = self.inner.singletons.borrow();
        for (name, value) in singletons.iter() {
            if target.contains(name) && target.get(name).is_null() {
                target.set(name, value.clone());
            }
        }
    }

    // ── commands ────────────────────────────────────────────────────────

    /// Map a command factory to one or more space-separated event kinds
    /// (or `"all"`).
    pub fn map_command(
        &self,
        kinds: &str,
        factory: impl Fn(CommandScope) -> Box<dyn Command> + 'static,
    ) {
        assert!(!kinds.trim().is_empty(), "event kind must not be empty");
        let factory: CommandFactory = Rc::new(factory);
        let mut commands = self.inner.commands.borrow_mut();
        for kind in kinds.split_whitespace() {
            commands
                .entry(kind.to_owned())
                .or_default()
                .push(Rc::clone(&factory));
        }
    }

    /// Drop every command mapping for the given kinds.
    pub fn unmap_command(&self, kinds: &str) {
        let mut commands = self.inner.commands.borrow_mut();
        for kind in kinds.split_whitespace() {
            commands.remove(kind);
        }
    }

    fn execute_commands(&self, event: &Event) {
        let factories: Vec<CommandFactory> = {
            let commands = self.inner.commands.borrow();
            let mut merged = Vec::new();
            if event.kind() != "all" {
                if let Some(wildcard) = commands.get("all") {
                    merged.extend(wildcard.iter().cloned());
                }
            }
            if let Some(specific) = commands.get(event.kind()) {
                merged.extend(specific.iter().cloned());
            }
            merged
        };
        for factory in factories {
            let mut command = factory(CommandScope {
                context: self.clone(),
                event: event.clone(),
            });
            command.execute();
        }
    }

    // ── view registry ───────────────────────────────────────────────────

    /// Register an item/child view factory under a class-style name.
    pub fn register_view(&self, name: impl Into<String>, factory: ViewFactory) {
        self.inner.views.borrow_mut().insert(name.into(), factory);
    }

    #[must_use]
    pub fn view_factory(&self, name: &str) -> Option<ViewFactory> {
        self.inner.views.borrow().get(name).cloned()
    }

    // ── event bus ───────────────────────────────────────────────────────

    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    pub fn dispatch(&self, event: Event) {
        self.inner.dispatcher.dispatch(event);
    }
}

impl PartialEq for Context {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Context {}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("singletons", &self.inner.singletons.borrow().len())
            .field("commands", &self.inner.commands.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::FnCommand;
    use std::cell::Cell;

    #[test]
    fn inject_fills_only_declared_null_slots() {
        let context = Context::new();
        let collection = Collection::new();
        context.map_singleton("todos", Value::Collection(collection.clone()));
        context.map_singleton("filterModel", Value::Model(Model::new()));

        let scope = Bag::new();
        scope.declare("todos");
        scope.set("filterModel", Value::Int(1)); // already set: must win
        context.inject(&scope);

        assert_eq!(scope.get("todos"), Value::Collection(collection));
        assert_eq!(scope.get("filterModel"), Value::Int(1));
        assert!(!scope.contains("somethingElse"));
    }

    #[test]
    fn undeclared_slots_stay_untouched() {
        let context = Context::new();
        context.map_singleton("todos", Value::Collection(Collection::new()));
        let scope = Bag::new();
        context.inject(&scope);
        assert!(!scope.contains("todos"));
    }

    #[test]
    fn space_separated_names_map_each() {
        let context = Context::new();
        context.map_singleton("a b", Value::Int(7));
        assert_eq!(context.singleton("a"), Some(Value::Int(7)));
        assert_eq!(context.singleton("b"), Some(Value::Int(7)));
        context.unmap_singleton("a b");
        assert!(context.singleton("a").is_none());
    }

    #[test]
    fn remapping_replaces_the_instance() {
        let context = Context::new();
        context.map_singleton("n", Value::Int(1));
        context.map_singleton("n", Value::Int(2));
        assert_eq!(context.singleton("n"), Some(Value::Int(2)));
    }

    #[test]
    fn typed_singleton_accessors() {
        let context = Context::new();
        context.map_singleton("c", Value::Collection(Collection::new()));
        context.map_singleton("m", Value::Model(Model::new()));
        assert!(context.singleton_collection("c").is_some());
        assert!(context.singleton_model("m").is_some());
        assert!(context.singleton_model("c").is_none());
    }

    #[test]
    fn commands_execute_once_per_matching_event() {
        let context = Context::new();
        let runs = Rc::new(Cell::new(0));
        let r = Rc::clone(&runs);
        context.map_command("todo:create", move |_scope| {
            let r = Rc::clone(&r);
            Box::new(FnCommand::new(move || r.set(r.get() + 1)))
        });
        context.dispatch(Event::new("todo:create"));
        context.dispatch(Event::new("todo:create"));
        context.dispatch(Event::new("unrelated"));
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn command_receives_event_and_context() {
        let context = Context::new();
        context.map_singleton("n", Value::Int(5));
        let seen = Rc::new(RefCell::new(None));
        let s = Rc::clone(&seen);
        context.map_command("ping", move |scope| {
            let s = Rc::clone(&s);
            Box::new(FnCommand::new(move || {
                *s.borrow_mut() =
                    Some((scope.event.kind().to_owned(), scope.context.singleton("n")));
            }))
        });
        context.dispatch(Event::new("ping"));
        assert_eq!(
            *seen.borrow(),
            Some(("ping".to_owned(), Some(Value::Int(5))))
        );
    }

    #[test]
    fn wildcard_commands_run_before_specific() {
        let context = Context::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        let o = Rc::clone(&order);
        context.map_command("all", move |_| {
            let o = Rc::clone(&o);
            Box::new(FnCommand::new(move || o.borrow_mut().push("all")))
        });
        let o = Rc::clone(&order);
        context.map_command("ping", move |_| {
            let o = Rc::clone(&o);
            Box::new(FnCommand::new(move || o.borrow_mut().push("ping")))
        });
        context.dispatch(Event::new("ping"));
        assert_eq!(*order.borrow(), ["all", "ping"]);
    }

    #[test]
    fn unmap_command_stops_execution() {
        let context = Context::new();
        let runs = Rc::new(Cell::new(0));
        let r = Rc::clone(&runs);
        context.map_command("x y", move |_| {
            let r = Rc::clone(&r);
            Box::new(FnCommand::new(move || r.set(r.get() + 1)))
        });
        context.unmap_command("x");
        context.dispatch(Event::new("x"));
        context.dispatch(Event::new("y"));
        assert_eq!(runs.get(), 1);
    }
}
