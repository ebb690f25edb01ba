#![forbid(unsafe_code)]

//! Core: event dispatch, observable data types, and the persistence contract.

pub mod bag;
pub mod collection;
pub mod dispatch;
pub mod event;
pub mod list;
pub mod model;
pub mod store;
pub mod sync;
pub mod value;

pub use bag::{Bag, PropertyDef};
pub use collection::{Collection, Comparator, SetSemantics};
pub use dispatch::{Dispatcher, DispatcherId, ListenerId, ListenerOptions, Tag};
pub use event::{Detail, Event};
pub use list::List;
pub use model::{Cid, Model, ModelError, SetOptions};
pub use store::{KeyValueStore, LocalStore, MemoryStore};
pub use sync::{
    HttpClient, HttpRequest, RequestHandle, RestTransport, SyncError, SyncMethod, SyncOptions,
    SyncTarget, Transport, TransportFailure,
};
pub use value::Value;
