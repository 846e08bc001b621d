use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use super::{DocumentStore, Query, Snapshot, Subscription};
use crate::errors::StoreError;
use crate::models::Document;

#[derive(Debug, Default, Clone)]
struct StoredDocument {
    fields: Map<String, Value>,
    subcollections: HashMap<String, BTreeMap<String, Map<String, Value>>>,
}

struct Listener {
    query: Query,
    tx: mpsc::UnboundedSender<Result<Snapshot, StoreError>>,
}

#[derive(Default)]
struct StoreState {
    collections: HashMap<String, BTreeMap<String, StoredDocument>>,
    listeners: HashMap<u64, Listener>,
    next_listener_id: u64,
}

impl StoreState {
    fn snapshot(&self, query: &Query) -> Snapshot {
        let docs = self
            .collections
            .get(&query.collection)
            .into_iter()
            .flat_map(|c| c.iter())
            .map(|(id, d)| Document::new(id.clone(), d.fields.clone()));
        Snapshot {
            documents: query.apply(docs),
        }
    }

    /// Re-runs every listener on `collection`; listeners whose receiver is
    /// gone get dropped on the way.
    fn notify(&mut self, collection: &str) {
        let mut closed = Vec::new();
        for (id, listener) in &self.listeners {
            if listener.query.collection != collection {
                continue;
            }
            let snapshot = self.snapshot(&listener.query);
            if listener.tx.send(Ok(snapshot)).is_err() {
                closed.push(*id);
            }
        }
        for id in closed {
            self.listeners.remove(&id);
        }
    }
}

/// Seed file layout: collection name to a list of documents, each with
/// optional sub-collections.
#[derive(Debug, Deserialize)]
struct SeedDocument {
    id: String,
    #[serde(default)]
    fields: Map<String, Value>,
    #[serde(default)]
    subcollections: HashMap<String, Vec<SeedSubDocument>>,
}

#[derive(Debug, Deserialize)]
struct SeedSubDocument {
    id: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

/// Document store living in process memory. Live queries are re-evaluated
/// after every write to their collection.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<StoreState>>,
}

fn lock(state: &Mutex<StoreState>) -> MutexGuard<'_, StoreState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_seed_json(&raw)
    }

    pub fn from_seed_json(raw: &str) -> anyhow::Result<Self> {
        let seed: HashMap<String, Vec<SeedDocument>> = serde_json::from_str(raw)?;
        let store = Self::new();
        let mut total = 0;
        {
            let mut state = lock(&store.state);
            for (collection, docs) in seed {
                let target = state.collections.entry(collection).or_default();
                for doc in docs {
                    let subcollections = doc
                        .subcollections
                        .into_iter()
                        .map(|(name, subs)| {
                            let subs = subs.into_iter().map(|s| (s.id, s.fields)).collect();
                            (name, subs)
                        })
                        .collect();
                    target.insert(
                        doc.id,
                        StoredDocument {
                            fields: doc.fields,
                            subcollections,
                        },
                    );
                    total += 1;
                }
            }
        }
        info!("Seeded in-memory store with {} documents", total);
        Ok(store)
    }

    /// Creates or overwrites a document, keeping its sub-collections.
    pub fn set_document(&self, collection: &str, id: &str, fields: Map<String, Value>) {
        let mut state = lock(&self.state);
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .entry(id.to_string())
            .or_default()
            .fields = fields;
        state.notify(collection);
    }

    /// Stores a document under a fresh id and returns that id.
    pub fn add_document(&self, collection: &str, fields: Map<String, Value>) -> String {
        let id = Uuid::new_v4().to_string();
        self.set_document(collection, &id, fields);
        id
    }

    pub fn remove_document(&self, collection: &str, id: &str) -> bool {
        let mut state = lock(&self.state);
        let removed = state
            .collections
            .get_mut(collection)
            .and_then(|c| c.remove(id))
            .is_some();
        if removed {
            state.notify(collection);
        }
        removed
    }

    /// Writes `collection/{id}/{name}/{sub_id}`. The parent is created empty if
    /// missing. Live queries on the parent collection are not re-run.
    pub fn set_subdocument(
        &self,
        collection: &str,
        id: &str,
        name: &str,
        sub_id: &str,
        fields: Map<String, Value>,
    ) {
        let mut state = lock(&self.state);
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .entry(id.to_string())
            .or_default()
            .subcollections
            .entry(name.to_string())
            .or_default()
            .insert(sub_id.to_string(), fields);
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.state).listeners.len()
    }

    fn unregister(state: &Weak<Mutex<StoreState>>, id: u64) {
        if let Some(state) = state.upgrade() {
            if lock(&state).listeners.remove(&id).is_some() {
                debug!("Listener {} removed", id);
            }
        }
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn subscribe(&self, query: Query) -> Result<Subscription, StoreError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut state = lock(&self.state);
            let id = state.next_listener_id;
            state.next_listener_id += 1;

            let initial = state.snapshot(&query);
            // The receiver is still in scope, this cannot fail.
            let _ = tx.send(Ok(initial));
            state.listeners.insert(id, Listener { query, tx });
            id
        };
        debug!("Listener {} registered", id);

        let weak = Arc::downgrade(&self.state);
        Ok(Subscription::new(rx, move || {
            InMemoryStore::unregister(&weak, id)
        }))
    }

    async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        let state = lock(&self.state);
        Ok(state
            .collections
            .get(collection)
            .and_then(|c| c.get(id))
            .map(|d| Document::new(id, d.fields.clone())))
    }

    async fn get_subcollection(
        &self,
        collection: &str,
        id: &str,
        name: &str,
    ) -> Result<Vec<Document>, StoreError> {
        let state = lock(&self.state);
        Ok(state
            .collections
            .get(collection)
            .and_then(|c| c.get(id))
            .and_then(|d| d.subcollections.get(name))
            .map(|subs| {
                subs.iter()
                    .map(|(sub_id, fields)| Document::new(sub_id.clone(), fields.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }
}
