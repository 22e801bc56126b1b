//! Defines the remote document store trait and the subscription channel it
//! pushes snapshots through.

use std::fmt::Display;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

/// A JSON object stored in a [Collection].
pub type Document = Value;

/// The document field holding the ID of the user that owns the document.
pub const OWNER_FIELD: &str = "userId";

/// The complete set of documents matching a subscription at a point in time.
pub type Snapshot = Vec<StoredDocument>;

/// The named collections the core reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// One document per expense.
    Expenses,
    /// One document per user per month.
    Budgets,
}

impl Collection {
    /// The name of the collection in the remote store.
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Expenses => "expenses",
            Collection::Budgets => "budgets",
        }
    }
}

impl Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The key of a document within its collection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocumentId(String);

impl DocumentId {
    /// Create a document ID.
    pub fn new(id: &str) -> Self {
        Self(id.to_owned())
    }

    /// The document ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A document together with its key.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    /// The key of the document.
    pub id: DocumentId,
    /// The body of the document.
    pub data: Document,
}

/// Selects the documents whose top level fields equal the given values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    /// A filter that matches every document.
    pub fn any() -> Self {
        Self::default()
    }

    /// Create a filter that matches documents where `field == value`.
    pub fn field_equals(field: &str, value: impl Into<Value>) -> Self {
        Self::any().and(field, value)
    }

    /// Also require `field == value`.
    pub fn and(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions.push((field.to_owned(), value.into()));
        self
    }

    /// Whether `document` passes the filter.
    pub fn matches(&self, document: &Document) -> bool {
        self.conditions
            .iter()
            .all(|(field, value)| document.get(field) == Some(value))
    }
}

/// Errors reported by the remote document store.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("the store is unavailable: {0}")]
    Unavailable(String),

    /// A document did not have the expected shape.
    #[error("malformed document: {0}")]
    Malformed(String),

    /// Could not acquire the store lock
    #[error("could not acquire the store lock")]
    LockPoisoned,
}

/// What a subscription delivers: a full snapshot, or a transient error after
/// which the subscription stays open.
pub type SnapshotResult = Result<Snapshot, StoreError>;

/// Create a connected [SnapshotSender] and [Subscription].
pub fn subscription_channel() -> (SnapshotSender, Subscription) {
    let (sender, receiver) = mpsc::unbounded_channel();

    (SnapshotSender { sender }, Subscription { receiver })
}

/// The store's end of a subscription.
#[derive(Debug, Clone)]
pub struct SnapshotSender {
    sender: mpsc::UnboundedSender<SnapshotResult>,
}

impl SnapshotSender {
    /// Deliver a snapshot. Returns `false` if the subscription has been cancelled.
    pub fn send(&self, snapshot: Snapshot) -> bool {
        self.sender.send(Ok(snapshot)).is_ok()
    }

    /// Deliver a transient error. Returns `false` if the subscription has been cancelled.
    pub fn send_error(&self, error: StoreError) -> bool {
        self.sender.send(Err(error)).is_ok()
    }

    /// Whether the subscriber has cancelled the subscription.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// The subscriber's end of a subscription.
///
/// Cancelling (or dropping) the subscription closes the channel immediately,
/// after which nothing more is delivered.
#[derive(Debug)]
pub struct Subscription {
    receiver: mpsc::UnboundedReceiver<SnapshotResult>,
}

impl Subscription {
    /// Wait for the next delivery. Returns `None` once the store has dropped
    /// its end of the subscription.
    pub async fn next(&mut self) -> Option<SnapshotResult> {
        self.receiver.recv().await
    }

    /// Take the next delivery if one is already waiting.
    pub fn try_next(&mut self) -> Option<SnapshotResult> {
        self.receiver.try_recv().ok()
    }

    /// Stop the subscription.
    pub fn cancel(mut self) {
        self.receiver.close();
    }
}

/// The operations the core needs from a remote document store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Register a live subscription to the documents in `collection` that match `filter`.
    ///
    /// Implementations must deliver the current matching set straight away and
    /// then the complete matching set after every change.
    fn subscribe(&self, collection: Collection, filter: Filter) -> Subscription;

    /// Create a document with a store-assigned ID.
    async fn create(
        &self,
        collection: Collection,
        document: Document,
    ) -> Result<DocumentId, StoreError>;

    /// Delete a document. Deleting a document that does not exist succeeds.
    async fn delete(&self, collection: Collection, id: &DocumentId) -> Result<(), StoreError>;

    /// Read a single document.
    async fn get(
        &self,
        collection: Collection,
        id: &DocumentId,
    ) -> Result<Option<Document>, StoreError>;

    /// Create or overwrite a document.
    async fn set(
        &self,
        collection: Collection,
        id: &DocumentId,
        document: Document,
    ) -> Result<(), StoreError>;

    /// Read the documents in `collection` that match `filter` once.
    async fn list(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<Vec<StoredDocument>, StoreError>;
}
