use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use serde_json::{json, Map, Value};

use crate::errors::StoreError;
use crate::models::Document;
use crate::store::collections::TRIPS;
use crate::store::{DocumentStore, InMemoryStore, Query, Subscription};

pub fn fields(v: Value) -> Map<String, Value> {
    match v {
        Value::Object(m) => m,
        _ => Map::new(),
    }
}

pub fn seed_trip(store: &InMemoryStore, id: &str, driver: &str, end_time: &str) {
    store.set_document(
        TRIPS,
        id,
        fields(json!({
            "driverId": driver,
            "passengers": 1,
            "startLocation": "Depot",
            "endLocation": "Terminal",
            "startTime": end_time,
            "endTime": end_time,
            "status": "completed"
        })),
    );
}

/// `InMemoryStore` with knobs for failures, hangs and slow reads, and a log of
/// the queries it was asked to run.
#[derive(Default)]
pub struct ScriptedStore {
    pub inner: InMemoryStore,
    pub subscribe_calls: AtomicUsize,
    pub queries: Mutex<Vec<Query>>,
    fail_subscribe: AtomicBool,
    close_subscribe: AtomicBool,
    subscribe_delay: Mutex<Duration>,
    failing: Mutex<HashSet<String>>,
    hanging: Mutex<HashSet<String>>,
    slow_rides: Mutex<HashMap<String, Duration>>,
}

impl ScriptedStore {
    pub fn fail_subscribe(&self, fail: bool) {
        self.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    /// Hands out subscriptions whose store side is already gone.
    pub fn close_subscribe(&self, close: bool) {
        self.close_subscribe.store(close, Ordering::SeqCst);
    }

    pub fn delay_subscribe(&self, delay: Duration) {
        *self.subscribe_delay.lock().unwrap() = delay;
    }

    pub fn fail_subcollection(&self, name: &str) {
        self.failing.lock().unwrap().insert(name.to_string());
    }

    pub fn hang_subcollection(&self, name: &str) {
        self.hanging.lock().unwrap().insert(name.to_string());
    }

    pub fn slow_ride(&self, ride_id: &str, delay: Duration) {
        self.slow_rides
            .lock()
            .unwrap()
            .insert(ride_id.to_string(), delay);
    }

    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    pub fn last_query(&self) -> Option<Query> {
        self.queries.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl DocumentStore for ScriptedStore {
    async fn subscribe(&self, query: Query) -> Result<Subscription, StoreError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query.clone());
        let delay = *self.subscribe_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let fails = self.fail_subscribe.load(Ordering::SeqCst);
        if fails {
            return Err(StoreError::Unavailable("backend offline".to_string()));
        }
        let closes = self.close_subscribe.load(Ordering::SeqCst);
        if closes {
            let (_, rx) = mpsc::unbounded_channel();
            return Ok(Subscription::new(rx, || {}));
        }
        self.inner.subscribe(query).await
    }

    async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        self.inner.get_document(collection, id).await
    }

    async fn get_subcollection(
        &self,
        collection: &str,
        id: &str,
        name: &str,
    ) -> Result<Vec<Document>, StoreError> {
        let slow = self.slow_rides.lock().unwrap().get(id).copied();
        if let Some(delay) = slow {
            tokio::time::sleep(delay).await;
        }
        let hangs = self.hanging.lock().unwrap().contains(name);
        if hangs {
            futures::future::pending::<()>().await;
        }
        let fails = self.failing.lock().unwrap().contains(name);
        if fails {
            return Err(StoreError::Read {
                path: format!("{}/{}/{}", collection, id, name),
                reason: "permission denied".to_string(),
            });
        }
        self.inner.get_subcollection(collection, id, name).await
    }
}
