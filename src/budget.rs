//! Reads and writes the monthly spending budget of each user.
//!
//! Each user has at most one budget per [Period], stored under the document ID
//! `"{userId}_{YYYY-MM}"`. A missing document means no budget has been set,
//! which is different from a budget of zero.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    Error,
    expense::validate_amount,
    identity::UserID,
    period::Period,
    store::{Collection, DocumentId, DocumentStore, Filter, OWNER_FIELD, StoreError},
};

pub use crate::expense::parse_amount;

/// A ceiling for the total spent in a period.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Budget {
    /// The month the budget applies to.
    pub period: Period,
    /// The most that should be spent in the period.
    pub amount: f64,
}

/// The ID of the budget document for `owner` in `period`.
pub fn budget_document_id(owner: &UserID, period: Period) -> DocumentId {
    DocumentId::new(&format!("{owner}_{period}"))
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BudgetDocument {
    amount: f64,
    user_id: UserID,
    period: String,
}

/// Reads and writes budget documents.
pub struct BudgetStore<S> {
    store: Arc<S>,
}

impl<S> BudgetStore<S>
where
    S: DocumentStore,
{
    /// Create a budget store backed by `store`.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Read the budget `owner` set for `period`.
    ///
    /// # Errors
    /// Returns an [Error::Store] error if the read fails or the document is malformed.
    pub async fn fetch_budget(
        &self,
        owner: &UserID,
        period: Period,
    ) -> Result<Option<Budget>, Error> {
        let id = budget_document_id(owner, period);
        let Some(document) = self.store.get(Collection::Budgets, &id).await? else {
            tracing::debug!("No budget set for {id}");
            return Ok(None);
        };

        let fields: BudgetDocument = serde_json::from_value(document)
            .map_err(|error| StoreError::Malformed(format!("budget {id}: {error}")))?;

        Ok(Some(Budget {
            period,
            amount: fields.amount,
        }))
    }

    /// Set the budget of `owner` for `period`, replacing any previous value.
    ///
    /// # Errors
    /// Returns an [Error::Validation] error if `amount` is negative or not
    /// finite, or an [Error::Store] error if the write fails.
    pub async fn save_budget(
        &self,
        owner: &UserID,
        period: Period,
        amount: f64,
    ) -> Result<Budget, Error> {
        let amount = validate_amount(amount)?;
        let id = budget_document_id(owner, period);
        let document = serde_json::to_value(BudgetDocument {
            amount,
            user_id: owner.clone(),
            period: period.to_string(),
        })
        .map_err(|error| StoreError::Malformed(error.to_string()))?;

        self.store
            .set(Collection::Budgets, &id, document)
            .await
            .inspect_err(|error| tracing::error!("Could not save budget {id}: {error}"))?;

        tracing::info!("Saved budget {id}");

        Ok(Budget { period, amount })
    }

    /// Remove the budget of `owner` for `period`.
    ///
    /// # Errors
    /// Returns an [Error::Store] error if the delete fails.
    pub async fn delete_budget(&self, owner: &UserID, period: Period) -> Result<(), Error> {
        let id = budget_document_id(owner, period);

        self.store
            .delete(Collection::Budgets, &id)
            .await
            .inspect_err(|error| tracing::error!("Could not delete budget {id}: {error}"))?;

        tracing::info!("Deleted budget {id}");

        Ok(())
    }

    /// Delete every budget of `owner`, in any period.
    ///
    /// Stops at the first failure.
    ///
    /// # Errors
    /// Returns the number of budgets deleted before the failure together with
    /// the failure.
    pub async fn delete_all(&self, owner: &UserID) -> Result<usize, (usize, StoreError)> {
        let documents = self
            .store
            .list(
                Collection::Budgets,
                &Filter::field_equals(OWNER_FIELD, owner.as_str()),
            )
            .await
            .map_err(|error| (0, error))?;

        for (deleted, document) in documents.iter().enumerate() {
            self.store
                .delete(Collection::Budgets, &document.id)
                .await
                .map_err(|error| (deleted, error))?;
        }

        tracing::info!("Deleted {} budgets of {owner}", documents.len());

        Ok(documents.len())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use time::Month;

    use crate::{
        Error,
        error::ValidationError,
        identity::UserID,
        memory::InMemoryStore,
        period::Period,
        store::{Collection, DocumentId, StoreError},
    };

    use super::{Budget, BudgetStore, budget_document_id};

    fn get_budgets() -> (Arc<InMemoryStore>, BudgetStore<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let budgets = BudgetStore::new(store.clone());

        (store, budgets)
    }

    const MARCH: Period = Period::new(2024, Month::March);

    #[test]
    fn document_id_combines_owner_and_period() {
        assert_eq!(
            budget_document_id(&UserID::new("alice"), MARCH),
            DocumentId::new("alice_2024-03")
        );
    }

    #[tokio::test]
    async fn fetch_without_budget_returns_none() {
        let (_, budgets) = get_budgets();

        let budget = budgets
            .fetch_budget(&UserID::new("alice"), MARCH)
            .await
            .unwrap();

        assert_eq!(budget, None);
    }

    #[tokio::test]
    async fn save_overwrites_and_fetch_reads_back() {
        let (store, budgets) = get_budgets();
        let alice = UserID::new("alice");

        budgets.save_budget(&alice, MARCH, 100.0).await.unwrap();
        budgets.save_budget(&alice, MARCH, 120.0).await.unwrap();

        assert_eq!(
            budgets.fetch_budget(&alice, MARCH).await.unwrap(),
            Some(Budget {
                period: MARCH,
                amount: 120.0
            })
        );
        assert_eq!(
            store.documents(Collection::Budgets)[0].data,
            json!({"amount": 120.0, "userId": "alice", "period": "2024-03"})
        );
    }

    #[tokio::test]
    async fn zero_budget_is_not_absent() {
        let (_, budgets) = get_budgets();
        let alice = UserID::new("alice");

        budgets.save_budget(&alice, MARCH, 0.0).await.unwrap();

        assert_eq!(
            budgets.fetch_budget(&alice, MARCH).await.unwrap(),
            Some(Budget {
                period: MARCH,
                amount: 0.0
            })
        );
    }

    #[tokio::test]
    async fn budgets_are_scoped_to_their_period() {
        let (_, budgets) = get_budgets();
        let alice = UserID::new("alice");

        budgets.save_budget(&alice, MARCH, 100.0).await.unwrap();

        let april = budgets
            .fetch_budget(&alice, Period::new(2024, Month::April))
            .await
            .unwrap();
        assert_eq!(april, None);
    }

    #[tokio::test]
    async fn delete_then_fetch_returns_none() {
        let (_, budgets) = get_budgets();
        let alice = UserID::new("alice");
        budgets.save_budget(&alice, MARCH, 100.0).await.unwrap();

        budgets.delete_budget(&alice, MARCH).await.unwrap();

        assert_eq!(budgets.fetch_budget(&alice, MARCH).await.unwrap(), None);
    }

    #[tokio::test]
    async fn save_rejects_invalid_amounts() {
        let (store, budgets) = get_budgets();
        let alice = UserID::new("alice");

        for amount in [-1.0, f64::NAN, f64::INFINITY] {
            let result = budgets.save_budget(&alice, MARCH, amount).await;

            assert!(matches!(
                result,
                Err(Error::Validation(ValidationError::InvalidAmount(_)))
            ));
        }
        assert!(store.documents(Collection::Budgets).is_empty());
    }

    #[tokio::test]
    async fn malformed_budget_is_reported() {
        let (store, budgets) = get_budgets();
        store.insert_raw(Collection::Budgets, "alice_2024-03", json!({"amount": "lots"}));

        let result = budgets.fetch_budget(&UserID::new("alice"), MARCH).await;

        assert!(matches!(
            result,
            Err(Error::Store(StoreError::Malformed(_)))
        ));
    }

    #[tokio::test]
    async fn delete_all_removes_every_period() {
        let (store, budgets) = get_budgets();
        let alice = UserID::new("alice");
        budgets.save_budget(&alice, MARCH, 100.0).await.unwrap();
        budgets
            .save_budget(&alice, Period::new(2024, Month::April), 80.0)
            .await
            .unwrap();
        budgets
            .save_budget(&UserID::new("bob"), MARCH, 50.0)
            .await
            .unwrap();

        assert_eq!(budgets.delete_all(&alice).await, Ok(2));
        assert_eq!(store.documents(Collection::Budgets).len(), 1);
    }
}
