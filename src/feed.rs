//! The live, per-user feed of expense records.
//!
//! The feed holds at most one subscription. Snapshots replace the cached
//! records wholesale and are tagged with the generation of the subscription
//! they came from, so a snapshot that was in flight when the owner changed is
//! never applied to the new owner's records.

use std::sync::Arc;

use crate::{
    Error,
    expense::{Expense, ExpenseId, NewExpense},
    identity::UserID,
    store::{
        Collection, DocumentStore, Filter, OWNER_FIELD, SnapshotResult, StoreError, Subscription,
    },
};

/// A snapshot or subscription error, tagged with the generation of the
/// subscription that delivered it.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// The generation of the subscription the delivery came from.
    pub generation: u64,
    /// The snapshot, or a transient error.
    pub result: SnapshotResult,
}

#[derive(Debug)]
struct ActiveSubscription {
    owner: UserID,
    generation: u64,
    subscription: Subscription,
}

/// Subscribes to a user's expenses and caches the latest snapshot.
pub struct ExpenseFeed<S> {
    store: Arc<S>,
    active: Option<ActiveSubscription>,
    generation: u64,
    expenses: Vec<Expense>,
}

impl<S> ExpenseFeed<S>
where
    S: DocumentStore,
{
    /// Create a feed with no subscription.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            active: None,
            generation: 0,
            expenses: Vec::new(),
        }
    }

    /// Subscribe to the expenses owned by `owner`.
    ///
    /// Any previous subscription is cancelled and the cached records are
    /// cleared before the new subscription is registered.
    pub fn subscribe(&mut self, owner: &UserID) {
        self.unsubscribe();

        self.generation += 1;
        let subscription = self.store.subscribe(
            Collection::Expenses,
            Filter::field_equals(OWNER_FIELD, owner.as_str()),
        );
        tracing::debug!(
            "Subscribed to expenses of {owner} (generation {})",
            self.generation
        );

        self.active = Some(ActiveSubscription {
            owner: owner.clone(),
            generation: self.generation,
            subscription,
        });
    }

    /// Cancel the subscription, if any, and clear the cached records.
    pub fn unsubscribe(&mut self) {
        if let Some(active) = self.active.take() {
            tracing::debug!(
                "Cancelled expense subscription of {} (generation {})",
                active.owner,
                active.generation
            );
            active.subscription.cancel();
        }

        self.expenses.clear();
    }

    /// The generation of the most recent subscription, zero before the first.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The records from the latest snapshot, in the order the store delivered them.
    pub fn expenses(&self) -> &[Expense] {
        &self.expenses
    }

    /// Take the next delivery if one is already waiting.
    pub fn try_next(&mut self) -> Option<Delivery> {
        let active = self.active.as_mut()?;
        let result = active.subscription.try_next()?;

        Some(Delivery {
            generation: active.generation,
            result,
        })
    }

    /// Wait for the next delivery.
    ///
    /// Never resolves while there is no subscription. Returns `None` if the
    /// store ended the subscription, which also drops it.
    pub async fn next(&mut self) -> Option<Delivery> {
        let Some(active) = self.active.as_mut() else {
            return std::future::pending().await;
        };

        let generation = active.generation;
        match active.subscription.next().await {
            Some(result) => Some(Delivery { generation, result }),
            None => {
                tracing::warn!("The store ended the expense subscription (generation {generation})");
                self.active = None;
                None
            }
        }
    }

    /// Apply a delivery to the cache. Returns whether the cached records changed.
    ///
    /// Deliveries from an older subscription are discarded. Documents that
    /// cannot be decoded are skipped and transient errors leave the cache as is.
    pub fn apply(&mut self, delivery: Delivery) -> bool {
        if self.active.as_ref().map(|active| active.generation) != Some(delivery.generation) {
            tracing::debug!(
                "Discarding stale expense delivery (generation {}, current {})",
                delivery.generation,
                self.generation
            );
            return false;
        }

        let snapshot = match delivery.result {
            Ok(snapshot) => snapshot,
            Err(error) => {
                tracing::warn!("Expense subscription reported an error: {error}");
                return false;
            }
        };

        self.expenses = snapshot
            .into_iter()
            .filter_map(|document| match Expense::from_document(document) {
                Ok(expense) => Some(expense),
                Err(error) => {
                    tracing::warn!("Skipping expense document: {error}");
                    None
                }
            })
            .collect();
        tracing::debug!("Expense snapshot with {} records", self.expenses.len());

        true
    }

    /// Write a new expense owned by `owner`.
    ///
    /// The cache is not touched, the record appears with the next snapshot.
    ///
    /// # Errors
    /// Returns an [Error::Store] error if the write fails.
    pub async fn add_expense(
        &self,
        owner: &UserID,
        expense: &NewExpense,
    ) -> Result<ExpenseId, Error> {
        let document = expense.to_document(owner)?;
        let id = self
            .store
            .create(Collection::Expenses, document)
            .await
            .inspect_err(|error| tracing::error!("Could not add expense: {error}"))?;

        tracing::info!("Added expense {id} for {owner}");

        Ok(id.into())
    }

    /// Delete an expense.
    ///
    /// # Errors
    /// Returns an [Error::Store] error if the delete fails.
    pub async fn delete_expense(&self, id: &ExpenseId) -> Result<(), Error> {
        self.store
            .delete(Collection::Expenses, id.document_id())
            .await
            .inspect_err(|error| tracing::error!("Could not delete expense {id}: {error}"))?;

        tracing::info!("Deleted expense {id}");

        Ok(())
    }

    /// Delete every expense owned by `owner`, reading them from the store
    /// rather than the cache.
    ///
    /// Stops at the first failure.
    ///
    /// # Errors
    /// Returns the number of expenses deleted before the failure together with
    /// the failure.
    pub async fn delete_all(&self, owner: &UserID) -> Result<usize, (usize, StoreError)> {
        let documents = self
            .store
            .list(
                Collection::Expenses,
                &Filter::field_equals(OWNER_FIELD, owner.as_str()),
            )
            .await
            .map_err(|error| (0, error))?;

        for (deleted, document) in documents.iter().enumerate() {
            self.store
                .delete(Collection::Expenses, &document.id)
                .await
                .map_err(|error| (deleted, error))?;
        }

        tracing::info!("Deleted {} expenses of {owner}", documents.len());

        Ok(documents.len())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use time::macros::date;

    use crate::{
        category::Category,
        expense::NewExpense,
        identity::UserID,
        memory::InMemoryStore,
        store::{Collection, StoreError},
    };

    use super::{Delivery, ExpenseFeed};

    fn get_feed() -> (Arc<InMemoryStore>, ExpenseFeed<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let feed = ExpenseFeed::new(store.clone());

        (store, feed)
    }

    fn drain(feed: &mut ExpenseFeed<InMemoryStore>) {
        while let Some(delivery) = feed.try_next() {
            feed.apply(delivery);
        }
    }

    fn lunch() -> NewExpense {
        NewExpense::new(50.0, "Lunch", Category::Food, date!(2024 - 03 - 01)).unwrap()
    }

    #[tokio::test]
    async fn add_then_snapshot_contains_new_record() {
        let (_, mut feed) = get_feed();
        let owner = UserID::new("alice");
        feed.subscribe(&owner);
        drain(&mut feed);
        let before = feed.expenses().len();

        let id = feed.add_expense(&owner, &lunch()).await.unwrap();
        drain(&mut feed);

        assert_eq!(feed.expenses().len(), before + 1);
        let added = &feed.expenses()[0];
        assert_eq!(added.id, id);
        assert_eq!(added.amount, 50.0);
        assert_eq!(added.description, "Lunch");
        assert_eq!(added.category, Category::Food);
        assert_eq!(added.date, date!(2024 - 03 - 01));
        assert_eq!(added.owner, owner);
    }

    #[tokio::test]
    async fn feed_only_contains_records_of_owner() {
        let (_, mut feed) = get_feed();
        let alice = UserID::new("alice");
        let bob = UserID::new("bob");
        feed.add_expense(&bob, &lunch()).await.unwrap();

        feed.subscribe(&alice);
        drain(&mut feed);

        assert!(feed.expenses().is_empty());
    }

    #[tokio::test]
    async fn resubscribing_cancels_previous_subscription_and_clears_cache() {
        let (store, mut feed) = get_feed();
        let alice = UserID::new("alice");
        feed.add_expense(&alice, &lunch()).await.unwrap();
        feed.subscribe(&alice);
        drain(&mut feed);
        assert_eq!(feed.expenses().len(), 1);

        feed.subscribe(&UserID::new("bob"));

        assert!(feed.expenses().is_empty());
        assert_eq!(feed.generation(), 2);
        assert_eq!(store.subscriber_count(Collection::Expenses), 1);
    }

    #[tokio::test]
    async fn stale_delivery_is_discarded() {
        let (store, mut feed) = get_feed();
        let alice = UserID::new("alice");
        feed.add_expense(&alice, &lunch()).await.unwrap();
        feed.subscribe(&alice);
        let stale = feed.try_next().unwrap();

        feed.subscribe(&UserID::new("bob"));

        assert!(!feed.apply(stale));
        assert!(feed.expenses().is_empty());
        assert_eq!(store.documents(Collection::Expenses).len(), 1);
    }

    #[tokio::test]
    async fn malformed_documents_are_skipped() {
        let (store, mut feed) = get_feed();
        let alice = UserID::new("alice");
        feed.add_expense(&alice, &lunch()).await.unwrap();
        store.insert_raw(
            Collection::Expenses,
            "broken",
            json!({"userId": "alice", "amount": "lots"}),
        );

        feed.subscribe(&alice);
        drain(&mut feed);

        assert_eq!(feed.expenses().len(), 1);
    }

    #[tokio::test]
    async fn transient_error_keeps_cached_records() {
        let (store, mut feed) = get_feed();
        let alice = UserID::new("alice");
        feed.add_expense(&alice, &lunch()).await.unwrap();
        feed.subscribe(&alice);
        drain(&mut feed);

        store.push_error(
            Collection::Expenses,
            StoreError::Unavailable("connection lost".to_owned()),
        );
        let delivery = feed.try_next().unwrap();

        assert!(matches!(delivery, Delivery { result: Err(_), .. }));
        assert!(!feed.apply(delivery));
        assert_eq!(feed.expenses().len(), 1);
    }

    #[tokio::test]
    async fn delete_all_reports_progress_on_failure() {
        let (store, feed) = get_feed();
        let alice = UserID::new("alice");
        for _ in 0..3 {
            feed.add_expense(&alice, &lunch()).await.unwrap();
        }
        store.fail_deletes_after(2);

        let result = feed.delete_all(&alice).await;

        assert!(matches!(result, Err((2, StoreError::Unavailable(_)))));
        assert_eq!(store.documents(Collection::Expenses).len(), 1);
    }

    #[tokio::test]
    async fn delete_all_leaves_other_owners_alone() {
        let (store, feed) = get_feed();
        let alice = UserID::new("alice");
        feed.add_expense(&alice, &lunch()).await.unwrap();
        feed.add_expense(&UserID::new("bob"), &lunch()).await.unwrap();

        assert_eq!(feed.delete_all(&alice).await, Ok(1));
        assert_eq!(store.documents(Collection::Expenses).len(), 1);
    }

    #[tokio::test]
    async fn failed_add_is_reported() {
        let (store, feed) = get_feed();
        store.set_offline(true);

        let result = feed.add_expense(&UserID::new("alice"), &lunch()).await;

        assert!(result.is_err());
    }
}
