use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::watch;

use crate::error::{HostError, Result};
use crate::traits::Collection;

/// Field name every document is keyed by.
pub const ID_FIELD: &str = "_id";

/// Field-equality query. Dotted keys reach into nested objects; an empty
/// selector matches every document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Selector {
    fields: Map<String, Value>,
}

impl Selector {
    /// Match everything.
    pub fn all() -> Self {
        Self::default()
    }

    /// Match documents whose `field` equals `value`.
    pub fn field(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::all().and(field, value)
    }

    /// Add another equality constraint.
    pub fn and(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn matches(&self, document: &Value) -> bool {
        self.fields
            .iter()
            .all(|(field, expected)| lookup(document, field) == Some(expected))
    }
}

fn lookup<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(document, |value, segment| value.get(segment))
}

fn document_id(document: &Value) -> Result<String> {
    document
        .get(ID_FIELD)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(HostError::MissingId)
}

/// A live query: a collection plus a selector.
///
/// Publishers hand these to the host; the host keeps subscribers in sync
/// with whatever the cursor matches as the collection changes.
#[derive(Clone)]
pub struct Cursor {
    collection: Arc<dyn Collection>,
    selector: Selector,
}

impl Cursor {
    pub fn new(collection: Arc<dyn Collection>, selector: Selector) -> Self {
        Self {
            collection,
            selector,
        }
    }

    /// Cursor over every document of `collection`.
    pub fn all(collection: Arc<dyn Collection>) -> Self {
        Self::new(collection, Selector::all())
    }

    pub fn collection_name(&self) -> &str {
        self.collection.name()
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    /// Current matching documents.
    pub fn fetch(&self) -> Vec<Value> {
        self.collection.find(&self.selector)
    }

    pub fn watch(&self) -> watch::Receiver<u64> {
        self.collection.watch()
    }

    /// Whether this cursor reads straight out of `collection`.
    pub(crate) fn reads_from(&self, collection: &MemoryCollection) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.collection), collection as *const MemoryCollection)
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("collection", &self.collection.name())
            .field("selector", &self.selector)
            .finish()
    }
}

/// In-memory, `_id`-keyed document collection.
///
/// `find` returns documents in ascending `_id` order. Every mutation that
/// actually changes the contents bumps the watch version; no-op writes do not.
///
/// When used as a subscription cache, the collection also records which
/// subscriptions publish each document. A published document is removed
/// only once no live subscription publishes it any more.
pub struct MemoryCollection {
    name: String,
    store: Mutex<Store>,
    version: watch::Sender<u64>,
}

#[derive(Default)]
struct Store {
    documents: BTreeMap<String, Value>,
    publishers: HashMap<String, BTreeSet<u64>>,
}

impl MemoryCollection {
    pub fn new(name: impl Into<String>) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            name: name.into(),
            store: Mutex::new(Store::default()),
            version,
        }
    }

    /// Insert a new document. Fails if the `_id` is missing or taken.
    pub fn insert(&self, document: Value) -> Result<String> {
        let id = document_id(&document)?;
        {
            let mut store = self.lock();
            let documents = &mut store.documents;
            if documents.contains_key(&id) {
                return Err(HostError::DuplicateId(id));
            }
            documents.insert(id.clone(), document);
        }
        self.bump();
        Ok(id)
    }

    /// Insert or replace a document. Returns whether the contents changed.
    pub fn upsert(&self, document: Value) -> Result<bool> {
        let id = document_id(&document)?;
        let changed = {
            let mut store = self.lock();
            let documents = &mut store.documents;
            match documents.get(&id) {
                Some(existing) if *existing == document => false,
                _ => {
                    documents.insert(id, document);
                    true
                }
            }
        };
        if changed {
            self.bump();
        }
        Ok(changed)
    }

    /// Remove a document by `_id`. Returns whether it existed.
    pub fn remove(&self, id: &str) -> bool {
        let removed = self.lock().documents.remove(id).is_some();
        if removed {
            self.bump();
        }
        removed
    }

    pub fn clear(&self) {
        let had_documents = {
            let mut store = self.lock();
            let documents = &mut store.documents;
            let had_documents = !documents.is_empty();
            documents.clear();
            had_documents
        };
        if had_documents {
            self.bump();
        }
    }

    pub fn get(&self, id: &str) -> Option<Value> {
        self.lock().documents.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().documents.is_empty()
    }

    /// Current version of the change subject.
    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    /// Replace the documents `subscription` publishes with a fresh set,
    /// under a single version bump. Documents it no longer publishes are
    /// removed unless another subscription still publishes them.
    pub(crate) fn sync_published(&self, subscription: u64, published: Vec<Value>) -> Result<()> {
        let mut incoming = BTreeMap::new();
        for document in published {
            incoming.insert(document_id(&document)?, document);
        }

        let mut changed = false;
        {
            let mut store = self.lock();
            let Store {
                documents,
                publishers,
            } = &mut *store;

            publishers.retain(|id, owners| {
                if incoming.contains_key(id) || !owners.remove(&subscription) {
                    return true;
                }
                if owners.is_empty() {
                    changed |= documents.remove(id).is_some();
                    return false;
                }
                true
            });

            for (id, document) in incoming {
                publishers.entry(id.clone()).or_default().insert(subscription);
                if documents.get(&id) != Some(&document) {
                    documents.insert(id, document);
                    changed = true;
                }
            }
        }
        if changed {
            self.bump();
        }
        Ok(())
    }

    /// Drop every publication claim held by `subscription`. The documents
    /// themselves stay.
    pub(crate) fn release(&self, subscription: u64) {
        self.lock().publishers.retain(|_, owners| {
            owners.remove(&subscription);
            !owners.is_empty()
        });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn bump(&self) {
        self.version.send_modify(|version| *version = version.wrapping_add(1));
    }
}

impl Collection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn find(&self, selector: &Selector) -> Vec<Value> {
        self.lock()
            .documents
            .values()
            .filter(|document| selector.matches(document))
            .cloned()
            .collect()
    }

    fn watch(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }
}

impl fmt::Debug for MemoryCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCollection")
            .field("name", &self.name)
            .field("len", &self.len())
            .field("version", &self.version())
            .finish()
    }
}
