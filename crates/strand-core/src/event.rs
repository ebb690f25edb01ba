#![forbid(unsafe_code)]

//! Framework event types and the kind catalogue.

use std::cell::Cell;

use crate::collection::Collection;
use crate::dispatch::DispatcherId;
use crate::model::Model;
use crate::value::Value;

/// Well-known event kinds dispatched by the framework.
pub mod kind {
    /// An observable property changed (aggregate form).
    pub const CHANGE: &str = "change";
    /// An item or model was added to a container.
    pub const ADD: &str = "add";
    /// An item or model was removed from a container.
    pub const REMOVE: &str = "remove";
    /// A model was destroyed.
    pub const DESTROY: &str = "destroy";
    /// A collection's entire contents were replaced.
    pub const RESET: &str = "reset";
    /// A container re-sorted itself.
    pub const SORT: &str = "sort";
    /// A persistence request was issued.
    pub const REQUEST: &str = "request";
    /// A model or collection synced successfully with its store.
    pub const SYNC: &str = "sync";
    /// A persistence request failed.
    pub const ERROR: &str = "error";
    /// Client-side validation rejected a change.
    pub const INVALID: &str = "invalid";
    /// A route matched the current fragment.
    pub const ROUTE: &str = "route";
    /// The wildcard channel; receives every event.
    pub const ALL: &str = "all";

    /// The per-property change kind, `change:<property>`.
    #[must_use]
    pub fn change_of(property: &str) -> String {
        format!("{CHANGE}:{property}")
    }

    /// The named route kind, `route:<name>`.
    #[must_use]
    pub fn route_to(name: &str) -> String {
        format!("{ROUTE}:{name}")
    }
}

/// Typed event payload.
#[derive(Clone, Debug, Default)]
pub enum Detail {
    #[default]
    None,
    /// A property changed to `value`.
    Change { property: String, value: Value },
    /// A positional list entry changed.
    Entry { index: usize, value: Value },
    /// A model joined or left a container (`add`/`remove`/`destroy`).
    Membership {
        model: Model,
        collection: Option<DispatcherId>,
        index: Option<usize>,
    },
    /// A collection was reset; carries the models it previously held.
    Reset { previous: Vec<Model> },
    /// A successful store response.
    Sync { response: serde_json::Value },
    /// A failed persistence request or a surfaced failure payload.
    Failed { error: Value },
    /// Validation rejected a change.
    Invalid { error: Value },
    /// A route matched; `params` holds decoded captures.
    Route {
        name: String,
        params: Vec<Option<String>>,
    },
}

/// A dispatched framework event.
///
/// Events are `Clone` so containers can re-dispatch (bubble) them; a clone
/// carries its own propagation-stop flag.
#[derive(Clone, Debug)]
pub struct Event {
    kind: String,
    pub(crate) target: Option<DispatcherId>,
    pub(crate) current_target: Option<DispatcherId>,
    detail: Detail,
    stopped: Cell<bool>,
}

impl Event {
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self::with_detail(kind, Detail::None)
    }

    #[must_use]
    pub fn with_detail(kind: impl Into<String>, detail: Detail) -> Self {
        Self {
            kind: kind.into(),
            target: None,
            current_target: None,
            detail,
            stopped: Cell::new(false),
        }
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The dispatcher the event was originally dispatched from.
    #[must_use]
    pub fn target(&self) -> Option<DispatcherId> {
        self.target
    }

    /// The dispatcher currently delivering the event (differs from
    /// [`target`](Self::target) for bubbled events).
    #[must_use]
    pub fn current_target(&self) -> Option<DispatcherId> {
        self.current_target
    }

    #[must_use]
    pub fn detail(&self) -> &Detail {
        &self.detail
    }

    /// Keep the remaining handlers in the current dispatch from running.
    pub fn stop_immediate_propagation(&self) {
        self.stopped.set(true);
    }

    #[must_use]
    pub fn propagation_stopped(&self) -> bool {
        self.stopped.get()
    }

    /// The changed value, for `change:<property>` events.
    #[must_use]
    pub fn changed_value(&self) -> Option<&Value> {
        match &self.detail {
            Detail::Change { value, .. } => Some(value),
            _ => None,
        }
    }

    /// The model carried by a membership event.
    #[must_use]
    pub fn model(&self) -> Option<&Model> {
        match &self.detail {
            Detail::Membership { model, .. } => Some(model),
            _ => None,
        }
    }

    /// The owning container of a membership event, if any.
    #[must_use]
    pub fn collection_id(&self) -> Option<DispatcherId> {
        match &self.detail {
            Detail::Membership { collection, .. } => *collection,
            _ => None,
        }
    }

    /// Convenience constructor for membership events.
    #[must_use]
    pub fn membership(
        kind: &str,
        model: Model,
        collection: Option<&Collection>,
        index: Option<usize>,
    ) -> Self {
        Self::with_detail(
            kind,
            Detail::Membership {
                model,
                collection: collection.map(Collection::id),
                index,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_kind_formats() {
        assert_eq!(kind::change_of("title"), "change:title");
        assert_eq!(kind::route_to("setFilter"), "route:setFilter");
    }

    #[test]
    fn clone_gets_independent_stop_flag() {
        let event = Event::new(kind::CHANGE);
        let copy = event.clone();
        event.stop_immediate_propagation();
        assert!(event.propagation_stopped());
        assert!(!copy.propagation_stopped());
    }

    #[test]
    fn changed_value_reads_change_detail() {
        let event = Event::with_detail(
            kind::change_of("n"),
            Detail::Change {
                property: "n".into(),
                value: Value::Int(3),
            },
        );
        assert_eq!(event.changed_value(), Some(&Value::Int(3)));
        assert!(event.model().is_none());
    }
}
