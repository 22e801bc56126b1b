//! A document store that keeps collections in memory and pushes snapshots to
//! subscribers synchronously after every write.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;

use crate::store::{
    Collection, Document, DocumentId, DocumentStore, Filter, SnapshotSender, StoreError,
    StoredDocument, Subscription, subscription_channel,
};

#[derive(Debug)]
struct Subscriber {
    collection: Collection,
    filter: Filter,
    sender: SnapshotSender,
}

#[derive(Debug, Default)]
struct StoreState {
    collections: HashMap<Collection, BTreeMap<DocumentId, Document>>,
    subscribers: Vec<Subscriber>,
    next_id: u64,
    offline: bool,
    /// How many more deletes succeed before every delete fails.
    deletes_before_failure: Option<usize>,
}

impl StoreState {
    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline {
            Err(StoreError::Unavailable("the store is offline".to_owned()))
        } else {
            Ok(())
        }
    }

    fn matching(&self, collection: Collection, filter: &Filter) -> Vec<StoredDocument> {
        self.collections
            .get(&collection)
            .map(|documents| {
                documents
                    .iter()
                    .filter(|(_, data)| filter.matches(data))
                    .map(|(id, data)| StoredDocument {
                        id: id.clone(),
                        data: data.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Push the current matching set to every live subscriber of `collection`
    /// and forget the ones that have been cancelled.
    fn notify(&mut self, collection: Collection) {
        let snapshots: Vec<_> = self
            .subscribers
            .iter()
            .map(|subscriber| {
                (subscriber.collection == collection)
                    .then(|| self.matching(collection, &subscriber.filter))
            })
            .collect();

        let mut snapshots = snapshots.into_iter();
        self.subscribers.retain(|subscriber| match snapshots.next() {
            Some(Some(snapshot)) => subscriber.sender.send(snapshot),
            _ => !subscriber.sender.is_closed(),
        });
    }
}

/// Keeps documents in memory.
///
/// Failures can be injected with [InMemoryStore::set_offline],
/// [InMemoryStore::fail_deletes_after] and [InMemoryStore::push_error].
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, StoreError> {
        self.state.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Make every read and write fail with [StoreError::Unavailable] until
    /// called again with `false`. Live subscriptions are kept.
    pub fn set_offline(&self, offline: bool) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .offline = offline;
    }

    /// Let the next `count` deletes succeed and fail every delete after that.
    pub fn fail_deletes_after(&self, count: usize) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .deletes_before_failure = Some(count);
    }

    /// Deliver a transient error to every subscriber of `collection`.
    pub fn push_error(&self, collection: Collection, error: StoreError) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        state.subscribers.retain(|subscriber| {
            subscriber.collection != collection || subscriber.sender.send_error(error.clone())
        });
    }

    /// Write a document as-is, bypassing validation, and notify subscribers.
    ///
    /// Used to simulate documents written by other clients.
    pub fn insert_raw(&self, collection: Collection, id: &str, document: Document) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        state
            .collections
            .entry(collection)
            .or_default()
            .insert(DocumentId::new(id), document);
        state.notify(collection);
    }

    /// Every document in `collection`, ordered by ID.
    pub fn documents(&self, collection: Collection) -> Vec<StoredDocument> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .matching(collection, &Filter::any())
    }

    /// The number of subscriptions on `collection` that have not been cancelled.
    pub fn subscriber_count(&self, collection: Collection) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .subscribers
            .iter()
            .filter(|subscriber| {
                subscriber.collection == collection && !subscriber.sender.is_closed()
            })
            .count()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    fn subscribe(&self, collection: Collection, filter: Filter) -> Subscription {
        let (sender, subscription) = subscription_channel();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        sender.send(state.matching(collection, &filter));
        state.subscribers.push(Subscriber {
            collection,
            filter,
            sender,
        });

        subscription
    }

    async fn create(
        &self,
        collection: Collection,
        document: Document,
    ) -> Result<DocumentId, StoreError> {
        let mut state = self.lock()?;
        state.check_online()?;

        state.next_id += 1;
        let id = DocumentId::new(&format!("doc-{}", state.next_id));
        state
            .collections
            .entry(collection)
            .or_default()
            .insert(id.clone(), document);
        state.notify(collection);

        Ok(id)
    }

    async fn delete(&self, collection: Collection, id: &DocumentId) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        state.check_online()?;

        match state.deletes_before_failure {
            Some(0) => {
                return Err(StoreError::Unavailable(format!(
                    "could not delete {collection}/{id}"
                )));
            }
            Some(remaining) => state.deletes_before_failure = Some(remaining - 1),
            None => {}
        }

        let removed = state
            .collections
            .get_mut(&collection)
            .and_then(|documents| documents.remove(id));

        if removed.is_some() {
            state.notify(collection);
        }

        Ok(())
    }

    async fn get(
        &self,
        collection: Collection,
        id: &DocumentId,
    ) -> Result<Option<Document>, StoreError> {
        let state = self.lock()?;
        state.check_online()?;

        Ok(state
            .collections
            .get(&collection)
            .and_then(|documents| documents.get(id))
            .cloned())
    }

    async fn set(
        &self,
        collection: Collection,
        id: &DocumentId,
        document: Document,
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        state.check_online()?;

        state
            .collections
            .entry(collection)
            .or_default()
            .insert(id.clone(), document);
        state.notify(collection);

        Ok(())
    }

    async fn list(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<Vec<StoredDocument>, StoreError> {
        let state = self.lock()?;
        state.check_online()?;

        Ok(state.matching(collection, filter))
    }
}
