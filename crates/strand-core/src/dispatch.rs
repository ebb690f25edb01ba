#![forbid(unsafe_code)]

//! Publish/subscribe event dispatch.
//!
//! [`Dispatcher`] is the notification primitive every observable type in the
//! framework is built on. It is a cheaply-cloneable handle over shared
//! listener state; clones dispatch into the same queues.
//!
//! # Invariants
//!
//! 1. Listeners for a kind execute in descending priority order; ties break
//!    by insertion order.
//! 2. The `"all"` queue receives every event, after the kind-specific queue.
//! 3. A `once` listener fires at most one time per kind it was registered
//!    under.
//! 4. Dispatch iterates a snapshot: listeners added or removed by a handler
//!    take effect on the *next* dispatch.
//! 5. [`Event::stop_immediate_propagation`] halts delivery to the remaining
//!    snapshot entries.
//!
//! # Failure Modes
//!
//! - Registering under an empty kind string is a programmer error and
//!   panics.
//! - A handler that panics unwinds through `dispatch`; no cleanup runs for
//!   the remaining entries.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::event::Event;

/// The wildcard queue name: listeners registered here see every event.
pub const ALL: &str = "all";

static NEXT_DISPATCHER_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a [`Dispatcher`].
///
/// Events carry these as `target`/`current_target`, and containers use them
/// to tell their own membership events apart from another container's.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DispatcherId(u64);

impl DispatcherId {
    fn next() -> Self {
        DispatcherId(NEXT_DISPATCHER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for DispatcherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d{}", self.0)
    }
}

/// Handle returned by [`Dispatcher::add_listener`], used for removal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    fn next() -> Self {
        ListenerId(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Grouping tag for bulk listener removal.
///
/// A container that wires many listeners (a collection watching its models)
/// tags them all and tears them down with [`Dispatcher::remove_tagged`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Tag(pub u64);

impl From<DispatcherId> for Tag {
    fn from(id: DispatcherId) -> Self {
        Tag(id.0)
    }
}

/// Registration options for a listener.
#[derive(Clone, Copy, Debug, Default)]
pub struct ListenerOptions {
    /// Higher priorities run first; equal priorities run in insertion order.
    pub priority: i32,
    /// Remove the listener after its first invocation.
    pub once: bool,
    /// Bulk-removal tag.
    pub tag: Option<Tag>,
}

impl ListenerOptions {
    #[must_use]
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }

    #[must_use]
    pub fn tag(mut self, tag: Tag) -> Self {
        self.tag = Some(tag);
        self
    }
}

type Handler = Rc<dyn Fn(&Event)>;

#[derive(Clone)]
struct Entry {
    id: ListenerId,
    handler: Handler,
    priority: i32,
    once: bool,
    tag: Option<Tag>,
    seq: u64,
}

#[derive(Default)]
struct Slots {
    queues: BTreeMap<String, Vec<Entry>>,
    next_seq: u64,
}

/// A priority-ordered publish/subscribe dispatcher.
pub struct Dispatcher {
    id: DispatcherId,
    slots: Rc<RefCell<Slots>>,
}

impl Clone for Dispatcher {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            slots: Rc::clone(&self.slots),
        }
    }
}

impl PartialEq for Dispatcher {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Dispatcher {}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("id", &self.id)
            .field("listeners", &self.total_listeners())
            .finish()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: DispatcherId::next(),
            slots: Rc::new(RefCell::new(Slots::default())),
        }
    }

    /// This dispatcher's process-unique identity.
    #[must_use]
    pub fn id(&self) -> DispatcherId {
        self.id
    }

    /// Register `handler` under one or more space-separated event kinds.
    ///
    /// `"*"` is accepted as an alias for the [`ALL`] wildcard queue.
    ///
    /// # Panics
    ///
    /// Panics if `kinds` contains no kind.
    pub fn add_listener(
        &self,
        kinds: &str,
        options: ListenerOptions,
        handler: impl Fn(&Event) + 'static,
    ) -> ListenerId {
        assert!(
            !kinds.trim().is_empty(),
            "event kind must not be empty"
        );
        let id = ListenerId::next();
        let handler: Handler = Rc::new(handler);
        let mut slots = self.slots.borrow_mut();
        for kind in kinds.split_whitespace() {
            let kind = if kind == "*" { ALL } else { kind };
            let seq = slots.next_seq;
            slots.next_seq += 1;
            let queue = slots.queues.entry(kind.to_owned()).or_default();
            queue.push(Entry {
                id,
                handler: Rc::clone(&handler),
                priority: options.priority,
                once: options.once,
                tag: options.tag,
                seq,
            });
            queue.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.seq.cmp(&b.seq)));
        }
        id
    }

    /// Register with default options. Shorthand for the common case.
    pub fn on(&self, kinds: &str, handler: impl Fn(&Event) + 'static) -> ListenerId {
        self.add_listener(kinds, ListenerOptions::default(), handler)
    }

    /// Remove a listener from every kind it was registered under.
    pub fn remove_listener(&self, id: ListenerId) {
        let mut slots = self.slots.borrow_mut();
        slots.queues.retain(|_, queue| {
            queue.retain(|entry| entry.id != id);
            !queue.is_empty()
        });
    }

    /// Remove every listener registered under `kind`.
    pub fn remove_kind(&self, kind: &str) {
        self.slots.borrow_mut().queues.remove(kind);
    }

    /// Remove every listener carrying `tag`.
    pub fn remove_tagged(&self, tag: Tag) {
        let mut slots = self.slots.borrow_mut();
        slots.queues.retain(|_, queue| {
            queue.retain(|entry| entry.tag != Some(tag));
            !queue.is_empty()
        });
    }

    /// Remove every listener.
    pub fn clear(&self) {
        self.slots.borrow_mut().queues.clear();
    }

    #[must_use]
    pub fn listener_count(&self, kind: &str) -> usize {
        self.slots
            .borrow()
            .queues
            .get(kind)
            .map_or(0, Vec::len)
    }

    /// Total registrations across all kinds. A listener registered under
    /// several kinds counts once per kind.
    #[must_use]
    pub fn total_listeners(&self) -> usize {
        self.slots.borrow().queues.values().map(Vec::len).sum()
    }

    /// Dispatch `event` to the kind-specific queue, then the wildcard queue.
    ///
    /// Sets the event's `target` (if unset) and `current_target` to this
    /// dispatcher before delivery.
    pub fn dispatch(&self, mut event: Event) {
        if event.target.is_none() {
            event.target = Some(self.id);
        }
        event.current_target = Some(self.id);

        let snapshot: Vec<(&'static str, Entry)> = {
            let slots = self.slots.borrow();
            let mut merged = Vec::new();
            if let Some(queue) = slots.queues.get(event.kind()) {
                merged.extend(queue.iter().cloned().map(|e| ("kind", e)));
            }
            if event.kind() != ALL {
                if let Some(queue) = slots.queues.get(ALL) {
                    merged.extend(queue.iter().cloned().map(|e| ("all", e)));
                }
            }
            merged
        };

        for (queue, entry) in snapshot {
            (entry.handler)(&event);
            if entry.once {
                let kind = if queue == "all" { ALL } else { event.kind() };
                self.remove_entry(kind, entry.id);
            }
            if event.propagation_stopped() {
                break;
            }
        }
    }

    /// Dispatch a payload-free event of `kind`.
    pub fn emit(&self, kind: &str) {
        self.dispatch(Event::new(kind));
    }

    fn remove_entry(&self, kind: &str, id: ListenerId) {
        let mut slots = self.slots.borrow_mut();
        if let Some(queue) = slots.queues.get_mut(kind) {
            queue.retain(|entry| entry.id != id);
            if queue.is_empty() {
                slots.queues.remove(kind);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell as StdRefCell;

    fn record() -> (Rc<StdRefCell<Vec<String>>>, impl Fn(&str) -> Box<dyn Fn(&Event)>) {
        let log = Rc::new(StdRefCell::new(Vec::new()));
        let log2 = Rc::clone(&log);
        let make = move |name: &str| -> Box<dyn Fn(&Event)> {
            let log = Rc::clone(&log2);
            let name = name.to_owned();
            Box::new(move |_| log.borrow_mut().push(name.clone()))
        };
        (log, make)
    }

    #[test]
    fn listeners_fire_in_priority_order() {
        let d = Dispatcher::new();
        let (log, make) = record();
        let low = make("low");
        let high = make("high");
        let mid = make("mid");
        d.add_listener("ping", ListenerOptions::default().priority(-1), move |e| low(e));
        d.add_listener("ping", ListenerOptions::default().priority(10), move |e| high(e));
        d.add_listener("ping", ListenerOptions::default(), move |e| mid(e));
        d.emit("ping");
        assert_eq!(*log.borrow(), ["high", "mid", "low"]);
    }

    #[test]
    fn equal_priority_ties_break_by_insertion() {
        let d = Dispatcher::new();
        let (log, make) = record();
        for name in ["a", "b", "c"] {
            let f = make(name);
            d.on("ping", move |e| f(e));
        }
        d.emit("ping");
        assert_eq!(*log.borrow(), ["a", "b", "c"]);
    }

    #[test]
    fn space_separated_kinds_register_each() {
        let d = Dispatcher::new();
        let (log, make) = record();
        let f = make("x");
        d.on("add remove", move |e| f(e));
        d.emit("add");
        d.emit("remove");
        d.emit("change");
        assert_eq!(log.borrow().len(), 2);
    }

    #[test]
    fn all_queue_sees_everything_after_kind_queue() {
        let d = Dispatcher::new();
        let (log, make) = record();
        let any = make("all");
        let specific = make("specific");
        d.on(ALL, move |e| any(e));
        d.on("ping", move |e| specific(e));
        d.emit("ping");
        assert_eq!(*log.borrow(), ["specific", "all"]);
    }

    #[test]
    fn star_aliases_all() {
        let d = Dispatcher::new();
        let (log, make) = record();
        let f = make("x");
        d.on("*", move |e| f(e));
        d.emit("anything");
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn once_listener_fires_a_single_time() {
        let d = Dispatcher::new();
        let (log, make) = record();
        let f = make("once");
        d.add_listener("ping", ListenerOptions::default().once(), move |e| f(e));
        d.emit("ping");
        d.emit("ping");
        assert_eq!(log.borrow().len(), 1);
        assert_eq!(d.total_listeners(), 0);
    }

    #[test]
    fn stop_immediate_propagation_halts_delivery() {
        let d = Dispatcher::new();
        let (log, make) = record();
        let first = make("first");
        d.on("ping", move |e| {
            first(e);
            e.stop_immediate_propagation();
        });
        let second = make("second");
        d.on("ping", move |e| second(e));
        d.emit("ping");
        assert_eq!(*log.borrow(), ["first"]);
    }

    #[test]
    fn remove_listener_covers_every_kind() {
        let d = Dispatcher::new();
        let (log, make) = record();
        let f = make("x");
        let id = d.on("add remove", move |e| f(e));
        d.remove_listener(id);
        d.emit("add");
        d.emit("remove");
        assert!(log.borrow().is_empty());
        assert_eq!(d.total_listeners(), 0);
    }

    #[test]
    fn remove_kind_leaves_other_kinds() {
        let d = Dispatcher::new();
        let (log, make) = record();
        let f = make("x");
        d.on("add remove", move |e| f(e));
        d.remove_kind("add");
        d.emit("add");
        d.emit("remove");
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn remove_tagged_is_selective() {
        let d = Dispatcher::new();
        let (log, make) = record();
        let tagged = make("tagged");
        let plain = make("plain");
        d.add_listener("ping", ListenerOptions::default().tag(Tag(7)), move |e| tagged(e));
        d.on("ping", move |e| plain(e));
        d.remove_tagged(Tag(7));
        d.emit("ping");
        assert_eq!(*log.borrow(), ["plain"]);
    }

    #[test]
    fn clear_drops_all_listeners() {
        let d = Dispatcher::new();
        let (log, make) = record();
        let f = make("x");
        d.on("a b c", move |e| f(e));
        d.clear();
        d.emit("a");
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn dispatch_snapshots_before_delivery() {
        let d = Dispatcher::new();
        let (log, make) = record();
        let inner = make("added-during-dispatch");
        let d2 = d.clone();
        let inner = Rc::new(inner);
        d.on("ping", move |_| {
            let inner = Rc::clone(&inner);
            d2.on("ping", move |e| inner(e));
        });
        d.emit("ping");
        assert!(log.borrow().is_empty(), "listener added mid-dispatch must wait");
        d.emit("ping");
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn target_and_current_target_are_set() {
        let d = Dispatcher::new();
        let seen = Rc::new(StdRefCell::new(None));
        let seen2 = Rc::clone(&seen);
        d.on("ping", move |e| {
            *seen2.borrow_mut() = Some((e.target(), e.current_target()));
        });
        d.emit("ping");
        let (target, current) = seen.borrow().expect("handler ran");
        assert_eq!(target, Some(d.id()));
        assert_eq!(current, Some(d.id()));
    }

    #[test]
    #[should_panic(expected = "event kind must not be empty")]
    fn empty_kind_panics() {
        let d = Dispatcher::new();
        d.on("  ", |_| {});
    }

    #[test]
    fn clones_share_listener_state() {
        let d = Dispatcher::new();
        let clone = d.clone();
        let (log, make) = record();
        let f = make("x");
        clone.on("ping", move |e| f(e));
        d.emit("ping");
        assert_eq!(log.borrow().len(), 1);
        assert_eq!(d, clone);
    }
}
