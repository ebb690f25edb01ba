#![forbid(unsafe_code)]

//! Key-value persistence: the local-storage stand-in and a transport over it.
//!
//! [`LocalStore`] keeps an application's records as a JSON array under a
//! single namespace key in a [`KeyValueStore`] — the layout the Todo example
//! persists (`[{"title": …, "completed": …, "order": …, "id": …}, …]`).
//! Ids are assigned from a per-namespace counter on create.

use std::cell::RefCell;
use std::rc::Rc;

use ahash::AHashMap;

use crate::sync::{RequestHandle, SyncError, SyncMethod, SyncOptions, SyncTarget, Transport, TransportFailure};

/// The browser-local-storage seam: a string-keyed string store.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

/// In-memory [`KeyValueStore`]. Cloning shares contents.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Rc<RefCell<AHashMap<String, String>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.inner.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.inner.borrow_mut().insert(key.to_owned(), value.to_owned());
    }

    fn remove(&self, key: &str) {
        self.inner.borrow_mut().remove(key);
    }
}

/// A [`Transport`] persisting into a [`KeyValueStore`] namespace.
///
/// All operations complete synchronously; callbacks run before `sync`
/// returns.
pub struct LocalStore {
    store: Rc<dyn KeyValueStore>,
    namespace: String,
}

impl LocalStore {
    #[must_use]
    pub fn new(store: Rc<dyn KeyValueStore>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
        }
    }

    fn records(&self) -> Vec<serde_json::Value> {
        self.store
            .get(&self.namespace)
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .and_then(|json: serde_json::Value| match json {
                serde_json::Value::Array(records) => Some(records),
                _ => None,
            })
            .unwrap_or_default()
    }

    fn write(&self, records: &[serde_json::Value]) {
        self.store.set(
            &self.namespace,
            &serde_json::Value::Array(records.to_vec()).to_string(),
        );
    }

    fn next_id(&self) -> u64 {
        let key = format!("{}:next", self.namespace);
        let next = self
            .store
            .get(&key)
            .and_then(|raw| raw.parse::<u64>().ok())
            .unwrap_or(1);
        self.store.set(&key, &(next + 1).to_string());
        next
    }
}

fn record_id_text(record: &serde_json::Value, id_property: &str) -> Option<String> {
    match record.get(id_property)? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl Transport for LocalStore {
    fn sync(
        &self,
        method: SyncMethod,
        target: SyncTarget,
        mut options: SyncOptions,
    ) -> Result<RequestHandle, SyncError> {
        let handle = RequestHandle::next();
        let mut records = self.records();

        let succeed = |options: &mut SyncOptions, response: serde_json::Value| {
            if let Some(callback) = options.success.take() {
                callback(response);
            }
        };
        let fail = |options: &mut SyncOptions, message: &str| {
            if let Some(callback) = options.error.take() {
                callback(TransportFailure::new(message).with_status(404));
            }
        };

        match (&target, method) {
            (SyncTarget::Collection(_), SyncMethod::Read) => {
                succeed(&mut options, serde_json::Value::Array(records));
            }
            (SyncTarget::Model(model), SyncMethod::Read) => {
                let id_property = model.id_property();
                let wanted = model.id().map(|id| id.display_text());
                match records.iter().find(|record| {
                    record_id_text(record, &id_property) == wanted
                        && wanted.is_some()
                }) {
                    Some(record) => succeed(&mut options, record.clone()),
                    None => fail(&mut options, "record not found"),
                }
            }
            (SyncTarget::Model(model), SyncMethod::Create) => {
                let id_property = model.id_property();
                let mut record = options.attrs.clone().unwrap_or_else(|| model.to_json());
                if let serde_json::Value::Object(map) = &mut record {
                    map.entry(id_property).or_insert_with(|| self.next_id().into());
                }
                records.push(record.clone());
                self.write(&records);
                succeed(&mut options, record);
            }
            (SyncTarget::Model(model), SyncMethod::Update | SyncMethod::Patch) => {
                let id_property = model.id_property();
                let record = options.attrs.clone().unwrap_or_else(|| model.to_json());
                let wanted = model.id().map(|id| id.display_text());
                match records
                    .iter_mut()
                    .find(|existing| record_id_text(existing, &id_property) == wanted)
                {
                    Some(existing) => {
                        if method == SyncMethod::Patch {
                            if let (serde_json::Value::Object(map), serde_json::Value::Object(patch)) =
                                (&mut *existing, &record)
                            {
                                for (key, value) in patch {
                                    map.insert(key.clone(), value.clone());
                                }
                            }
                        } else {
                            *existing = record.clone();
                        }
                        let response = existing.clone();
                        self.write(&records);
                        succeed(&mut options, response);
                    }
                    None => {
                        records.push(record.clone());
                        self.write(&records);
                        succeed(&mut options, record);
                    }
                }
            }
            (SyncTarget::Model(model), SyncMethod::Delete) => {
                let id_property = model.id_property();
                let wanted = model.id().map(|id| id.display_text());
                records.retain(|record| record_id_text(record, &id_property) != wanted);
                self.write(&records);
                succeed(&mut options, serde_json::Value::Null);
            }
            (SyncTarget::Collection(_), _) => {
                fail(&mut options, "unsupported collection operation");
            }
        }

        Ok(handle)
    }
}
