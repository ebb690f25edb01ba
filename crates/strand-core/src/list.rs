#![forbid(unsafe_code)]

//! Ordered observable container for arbitrary values.
//!
//! A [`List`] wraps a `Vec<Value>` with `add`/`remove`/`sort`/`change`
//! events around each mutation. Observable items (values holding a `Bag`,
//! `Model`, `List` or `Collection`) are watched while they are members:
//! their aggregate `change` events re-dispatch from the list itself, so a
//! binding watching the list sees member mutations without subscribing to
//! every member.
//!
//! [`Collection`](crate::collection::Collection) layers model lifecycle on
//! top of this shape; `List` stays item-agnostic.
//!
//! # Invariants
//!
//! 1. An observable item is watched exactly once per occurrence; removing
//!    the last occurrence removes the watch.
//! 2. Dropping the list detaches every watch it installed.
//! 3. `splice` fires at most one `remove` and one `add` event, in that
//!    order, and only for non-empty removals/insertions.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;

use crate::dispatch::{Dispatcher, DispatcherId, ListenerId};
use crate::event::{Detail, Event, kind};
use crate::value::{Value, cmp_values};

struct Watch {
    dispatcher: Dispatcher,
    listener: ListenerId,
    occurrences: usize,
}

struct ListInner {
    dispatcher: Dispatcher,
    items: RefCell<Vec<Value>>,
    watches: RefCell<AHashMap<DispatcherId, Watch>>,
}

impl Drop for ListInner {
    fn drop(&mut self) {
        for watch in self.watches.get_mut().values() {
            watch.dispatcher.remove_listener(watch.listener);
        }
    }
}

/// An ordered, observable sequence of values. Cloning shares state.
#[derive(Clone)]
pub struct List {
    inner: Rc<ListInner>,
}

impl Default for List {
    fn default() -> Self {
        Self::new()
    }
}

impl List {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(ListInner {
                dispatcher: Dispatcher::new(),
                items: RefCell::new(Vec::new()),
                watches: RefCell::new(AHashMap::new()),
            }),
        }
    }

    /// Build a list from initial items. No events fire, but observable
    /// items are watched.
    #[must_use]
    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        let list = Self::new();
        {
            let mut items = list.inner.items.borrow_mut();
            for value in values {
                list.watch(&value);
                items.push(value);
            }
        }
        list
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.items.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.items.borrow().is_empty()
    }

    /// Append an item; fires `add`.
    pub fn push(&self, value: Value) -> usize {
        self.watch(&value);
        let len = {
            let mut items = self.inner.items.borrow_mut();
            items.push(value);
            items.len()
        };
        self.inner.dispatcher.emit(kind::ADD);
        len
    }

    /// Append several items; fires one `add` for the batch.
    pub fn extend(&self, values: impl IntoIterator<Item = Value>) -> usize {
        let len = {
            let mut items = self.inner.items.borrow_mut();
            for value in values {
                self.watch(&value);
                items.push(value);
            }
            items.len()
        };
        self.inner.dispatcher.emit(kind::ADD);
        len
    }

    /// Remove and return the last item; fires `remove`.
    pub fn pop(&self) -> Option<Value> {
        let value = self.inner.items.borrow_mut().pop()?;
        self.unwatch(&value);
        self.inner.dispatcher.emit(kind::REMOVE);
        Some(value)
    }

    /// Prepend an item; fires `add`.
    pub fn unshift(&self, value: Value) -> usize {
        self.watch(&value);
        let len = {
            let mut items = self.inner.items.borrow_mut();
            items.insert(0, value);
            items.len()
        };
        self.inner.dispatcher.emit(kind::ADD);
        len
    }

    /// Remove and return the first item; fires `remove`.
    pub fn shift(&self) -> Option<Value> {
        let value = {
            let mut items = self.inner.items.borrow_mut();
            if items.is_empty() {
                return None;
            }
            items.remove(0)
        };
        self.unwatch(&value);
        self.inner.dispatcher.emit(kind::REMOVE);
        Some(value)
    }

    /// Remove `delete_count` items at `start` and insert `inserts` in their
    /// place. Returns the removed items; fires `remove` and/or `add`.
    pub fn splice(
        &self,
        start: usize,
        delete_count: usize,
        inserts: Vec<Value>,
    ) -> Vec<Value> {
        let inserted = !inserts.is_empty();
        let removed: Vec<Value> = {
            let mut items = self.inner.items.borrow_mut();
            let start = start.min(items.len());
            let end = start.saturating_add(delete_count).min(items.len());
            for value in &inserts {
                self.watch(value);
            }
            items.splice(start..end, inserts).collect()
        };
        for value in &removed {
            self.unwatch(value);
        }
        if !removed.is_empty() {
            self.inner.dispatcher.emit(kind::REMOVE);
        }
        if inserted {
            self.inner.dispatcher.emit(kind::ADD);
        }
        removed
    }

    /// The item at `index`, if present.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Value> {
        self.inner.items.borrow().get(index).cloned()
    }

    /// Alias of [`get`](Self::get).
    #[must_use]
    pub fn at(&self, index: usize) -> Option<Value> {
        self.get(index)
    }

    /// Replace (or append, at `index == len`) an item; fires `change`, plus
    /// `add` when the list grew. Returns the replaced item.
    pub fn set_at(&self, index: usize, value: Value) -> Option<Value> {
        let (replaced, grew) = {
            let mut items = self.inner.items.borrow_mut();
            if index > items.len() {
                return None;
            }
            self.watch(&value);
            if index == items.len() {
                items.push(value.clone());
                (None, true)
            } else {
                let replaced = std::mem::replace(&mut items[index], value.clone());
                (Some(replaced), false)
            }
        };
        if let Some(ref old) = replaced {
            self.unwatch(old);
        }
        if grew {
            self.inner.dispatcher.emit(kind::ADD);
        }
        self.inner.dispatcher.dispatch(Event::with_detail(
            kind::CHANGE,
            Detail::Entry { index, value },
        ));
        replaced
    }

    /// Sort in place with the framework's total value order; fires `sort`.
    pub fn sort(&self) {
        self.sort_by(cmp_values);
    }

    /// Sort in place with a custom comparator; fires `sort`.
    pub fn sort_by(&self, compare: impl Fn(&Value, &Value) -> Ordering) {
        self.inner.items.borrow_mut().sort_by(|a, b| compare(a, b));
        self.inner.dispatcher.emit(kind::SORT);
    }

    /// A copied sub-range.
    #[must_use]
    pub fn slice(&self, start: usize, end: usize) -> Vec<Value> {
        let items = self.inner.items.borrow();
        let start = start.min(items.len());
        let end = end.clamp(start, items.len());
        items[start..end].to_vec()
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<Value> {
        self.inner.items.borrow().clone()
    }

    /// Index of the first item strictly equal to `value`.
    #[must_use]
    pub fn index_of(&self, value: &Value) -> Option<usize> {
        self.inner.items.borrow().iter().position(|v| v == value)
    }

    #[must_use]
    pub fn first(&self) -> Option<Value> {
        self.get(0)
    }

    #[must_use]
    pub fn last(&self) -> Option<Value> {
        let items = self.inner.items.borrow();
        items.last().cloned()
    }

    /// JSON form: the array of item JSON.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(self.inner.items.borrow().iter().map(Value::to_json).collect())
    }

    /// A new list holding the same items.
    #[must_use]
    pub fn clone_list(&self) -> List {
        List::from_values(self.to_vec())
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    #[must_use]
    pub fn id(&self) -> DispatcherId {
        self.inner.dispatcher.id()
    }

    fn watch(&self, value: &Value) {
        let Some(dispatcher) = value.dispatcher() else {
            return;
        };
        if dispatcher.id() == self.inner.dispatcher.id() {
            return; // a list never bubbles itself
        }
        let mut watches = self.inner.watches.borrow_mut();
        if let Some(watch) = watches.get_mut(&dispatcher.id()) {
            watch.occurrences += 1;
            return;
        }
        let forward = self.inner.dispatcher.clone();
        let listener = dispatcher.on(kind::CHANGE, move |event| {
            forward.dispatch(event.clone());
        });
        watches.insert(
            dispatcher.id(),
            Watch {
                dispatcher,
                listener,
                occurrences: 1,
            },
        );
    }

    fn unwatch(&self, value: &Value) {
        let Some(dispatcher) = value.dispatcher() else {
            return;
        };
        let mut watches = self.inner.watches.borrow_mut();
        let Some(watch) = watches.get_mut(&dispatcher.id()) else {
            return;
        };
        watch.occurrences -= 1;
        if watch.occurrences == 0 {
            watch.dispatcher.remove_listener(watch.listener);
            watches.remove(&dispatcher.id());
        }
    }
}

impl PartialEq for List {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for List {}

impl fmt::Debug for List {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("List")
            .field("id", &self.id())
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bag::Bag;
    use std::cell::Cell;

    fn counter(list: &List, kinds: &str) -> Rc<Cell<usize>> {
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        list.dispatcher().on(kinds, move |_| c.set(c.get() + 1));
        count
    }

    #[test]
    fn push_pop_fire_add_remove() {
        let list = List::new();
        let adds = counter(&list, kind::ADD);
        let removes = counter(&list, kind::REMOVE);
        list.push(Value::Int(1));
        list.push(Value::Int(2));
        assert_eq!(list.pop(), Some(Value::Int(2)));
        assert_eq!(adds.get(), 2);
        assert_eq!(removes.get(), 1);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn shift_unshift_work_at_the_front() {
        let list = List::from_values([Value::Int(2)]);
        list.unshift(Value::Int(1));
        assert_eq!(list.first(), Some(Value::Int(1)));
        assert_eq!(list.shift(), Some(Value::Int(1)));
        assert_eq!(list.shift(), Some(Value::Int(2)));
        assert_eq!(list.shift(), None);
    }

    #[test]
    fn bag_changes_bubble_through_the_list() {
        let list = List::new();
        let bag = Bag::new();
        list.push(Value::Bag(bag.clone()));
        let changes = counter(&list, kind::CHANGE);
        bag.set("n", Value::Int(1));
        assert_eq!(changes.get(), 1);
        // The bubbled event keeps the bag as target, the list as current.
        let seen = Rc::new(RefCell::new(None));
        let s = Rc::clone(&seen);
        list.dispatcher().on(kind::CHANGE, move |e| {
            *s.borrow_mut() = Some((e.target(), e.current_target()));
        });
        bag.set("n", Value::Int(2));
        let (target, current) = seen.borrow().unwrap();
        assert_eq!(target, Some(bag.id()));
        assert_eq!(current, Some(list.id()));
    }

    #[test]
    fn removal_stops_bubbling() {
        let list = List::new();
        let bag = Bag::new();
        list.push(Value::Bag(bag.clone()));
        list.pop();
        let changes = counter(&list, kind::CHANGE);
        bag.set("n", Value::Int(1));
        assert_eq!(changes.get(), 0);
        assert_eq!(bag.dispatcher().total_listeners(), 0);
    }

    #[test]
    fn duplicate_member_unwires_only_after_last_removal() {
        let list = List::new();
        let bag = Bag::new();
        list.push(Value::Bag(bag.clone()));
        list.push(Value::Bag(bag.clone()));
        list.pop();
        let changes = counter(&list, kind::CHANGE);
        bag.set("n", Value::Int(1));
        assert_eq!(changes.get(), 1, "one occurrence remains, so changes still bubble");
        list.pop();
        bag.set("n", Value::Int(2));
        assert_eq!(changes.get(), 1);
    }

    #[test]
    fn splice_removes_then_inserts() {
        let list = List::from_values([Value::Int(1), Value::Int(2), Value::Int(3)]);
        let adds = counter(&list, kind::ADD);
        let removes = counter(&list, kind::REMOVE);
        let removed = list.splice(1, 1, vec![Value::Int(9), Value::Int(8)]);
        assert_eq!(removed, vec![Value::Int(2)]);
        assert_eq!(
            list.to_vec(),
            vec![Value::Int(1), Value::Int(9), Value::Int(8), Value::Int(3)]
        );
        assert_eq!(adds.get(), 1);
        assert_eq!(removes.get(), 1);
    }

    #[test]
    fn splice_with_no_deletes_only_adds() {
        let list = List::from_values([Value::Int(1)]);
        let adds = counter(&list, kind::ADD);
        let removes = counter(&list, kind::REMOVE);
        list.splice(1, 0, vec![Value::Int(2)]);
        assert_eq!(adds.get(), 1);
        assert_eq!(removes.get(), 0);
    }

    #[test]
    fn spliced_in_observables_bubble() {
        let list = List::new();
        let bag = Bag::new();
        list.splice(0, 0, vec![Value::Bag(bag.clone())]);
        let changes = counter(&list, kind::CHANGE);
        bag.set("x", Value::Int(1));
        assert_eq!(changes.get(), 1);
    }

    #[test]
    fn set_at_replaces_and_fires_change() {
        let list = List::from_values([Value::Int(1)]);
        let changes = counter(&list, kind::CHANGE);
        let replaced = list.set_at(0, Value::Int(5));
        assert_eq!(replaced, Some(Value::Int(1)));
        assert_eq!(changes.get(), 1);
        assert_eq!(list.get(0), Some(Value::Int(5)));
    }

    #[test]
    fn set_at_end_appends_and_fires_add() {
        let list = List::from_values([Value::Int(1)]);
        let adds = counter(&list, kind::ADD);
        assert_eq!(list.set_at(1, Value::Int(2)), None);
        assert_eq!(adds.get(), 1);
        assert_eq!(list.len(), 2);
        assert_eq!(list.set_at(9, Value::Int(3)), None);
        assert_eq!(list.len(), 2, "out-of-range set is ignored");
    }

    #[test]
    fn sort_orders_and_fires() {
        let list = List::from_values([Value::Int(3), Value::Int(1), Value::Int(2)]);
        let sorts = counter(&list, kind::SORT);
        list.sort();
        assert_eq!(list.to_vec(), vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(sorts.get(), 1);
    }

    #[test]
    fn dropping_the_list_detaches_watches() {
        let bag = Bag::new();
        {
            let list = List::new();
            list.push(Value::Bag(bag.clone()));
            assert_eq!(bag.dispatcher().total_listeners(), 1);
        }
        assert_eq!(bag.dispatcher().total_listeners(), 0);
    }

    #[test]
    fn slice_and_index_of() {
        let list = List::from_values([Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(list.slice(1, 3), vec![Value::Int(2), Value::Int(3)]);
        assert_eq!(list.index_of(&Value::Int(2)), Some(1));
        assert_eq!(list.index_of(&Value::Int(9)), None);
    }

    #[test]
    fn to_json_is_the_item_array() {
        let list = List::from_values([Value::Int(1), Value::from("x")]);
        assert_eq!(list.to_json(), serde_json::json!([1, "x"]));
    }
}
