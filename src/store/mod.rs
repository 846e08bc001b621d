use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::errors::StoreError;
use crate::models::Document;

pub mod collections;
pub mod memory;
pub mod query;

pub use memory::InMemoryStore;
pub use query::{Cursor, Query};

/// Result set of a live query at one point in time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub documents: Vec<Document>,
}

type CancelFn = Box<dyn FnOnce() + Send>;

/// Handle on a live query. Dropping it unregisters the listener.
pub struct Subscription {
    snapshots: mpsc::UnboundedReceiver<Result<Snapshot, StoreError>>,
    on_cancel: Option<CancelFn>,
}

impl Subscription {
    pub fn new(
        snapshots: mpsc::UnboundedReceiver<Result<Snapshot, StoreError>>,
        on_cancel: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            snapshots,
            on_cancel: Some(Box::new(on_cancel)),
        }
    }

    /// Next snapshot or listener error. `None` once the store side is gone.
    pub async fn next(&mut self) -> Option<Result<Snapshot, StoreError>> {
        self.snapshots.recv().await
    }

    pub fn cancel(mut self) {
        self.run_cancel();
    }

    fn run_cancel(&mut self) {
        if let Some(cancel) = self.on_cancel.take() {
            cancel();
        }
        self.snapshots.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run_cancel();
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Starts a live query. The first snapshot is delivered right away, later
    /// ones whenever the matching set changes.
    async fn subscribe(&self, query: Query) -> Result<Subscription, StoreError>;

    async fn get_document(&self, collection: &str, id: &str)
        -> Result<Option<Document>, StoreError>;

    async fn get_subcollection(
        &self,
        collection: &str,
        id: &str,
        name: &str,
    ) -> Result<Vec<Document>, StoreError>;
}
