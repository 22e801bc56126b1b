//! The orchestrator that ties the session, the expense feed, the budget store
//! and the view together.
//!
//! Every change to the session is turned into a list of [Effect]s by
//! [session_effects], which is pure, and the tracker then runs those effects in
//! order. Leaving a verified session always stops the feed and clears every
//! piece of derived state before a new session's feed is started, so one
//! user's records can never show up in another user's view.

use std::sync::Arc;

use crate::{
    Error,
    alert::Alert,
    budget::{Budget, BudgetStore},
    config::TrackerConfig,
    display::CurrencyFormatter,
    expense::{Expense, ExpenseForm, ExpenseId, NewExpense},
    export::to_csv,
    feed::{Delivery, ExpenseFeed},
    identity::{Identity, IdentityProvider, UserID},
    pending::{Operation, PendingOperations},
    period::Period,
    session::{SessionManager, SessionState},
    store::DocumentStore,
    view::{CategoryFilter, ExpenseView, SortOrder, ViewOptions, exceeds_budget, period_total},
};

/// Something the tracker must do because the session changed.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Cancel the expense subscription and clear the cached records and view.
    StopFeed,
    /// Forget the cached budget.
    ClearBudget,
    /// Subscribe to the expenses of the user.
    StartFeed(UserID),
    /// Read the user's budget for the current period.
    FetchBudget(UserID),
}

/// The effects of the session changing from `old` to `new`.
///
/// Only entering or leaving a verified session has effects. Switching
/// directly between two verified users stops everything for the first user
/// before starting anything for the second.
pub fn session_effects(old: &SessionState, new: &SessionState) -> Vec<Effect> {
    let old_owner = old.verified_identity().map(|identity| &identity.id);
    let new_owner = new.verified_identity().map(|identity| &identity.id);

    if old_owner == new_owner {
        return Vec::new();
    }

    let mut effects = Vec::new();

    if old_owner.is_some() {
        effects.push(Effect::StopFeed);
        effects.push(Effect::ClearBudget);
    }

    if let Some(owner) = new_owner {
        effects.push(Effect::StartFeed(owner.clone()));
        effects.push(Effect::FetchBudget(owner.clone()));
    }

    effects
}

/// The result of adding an expense.
#[derive(Debug, Clone, PartialEq)]
pub struct AddedExpense {
    /// The ID the store assigned to the new expense.
    pub id: ExpenseId,
    /// A warning if the expense took spending in its month over the budget.
    ///
    /// The expense is saved either way.
    pub budget_alert: Option<Alert>,
}

/// What woke up [ExpenseTracker::next_update].
enum Update {
    Auth(Option<Option<Identity>>),
    Feed(Option<Delivery>),
}

/// The expense tracker for a single client.
///
/// Owns the session and everything derived from it. All reads of the session
/// go through the tracker.
pub struct ExpenseTracker<P, S> {
    session: SessionManager<P>,
    feed: ExpenseFeed<S>,
    budgets: BudgetStore<S>,
    options: ViewOptions,
    view: ExpenseView,
    budget: Option<Budget>,
    current_period: Period,
    pending: PendingOperations,
    currency: CurrencyFormatter,
    config: TrackerConfig,
}

impl<P, S> ExpenseTracker<P, S>
where
    P: IdentityProvider,
    S: DocumentStore,
{
    /// Create a signed out tracker.
    ///
    /// If `provider` already has a signed in identity, it is picked up by the
    /// first call to [ExpenseTracker::sync].
    ///
    /// # Errors
    /// Returns [Error::InvalidTimezone] or [Error::InvalidCurrencySymbol] if
    /// `config` is invalid.
    pub fn new(provider: Arc<P>, store: Arc<S>, config: TrackerConfig) -> Result<Self, Error> {
        let current_period = config.current_period()?;
        let currency = CurrencyFormatter::new(&config.currency_symbol)?;

        Ok(Self {
            session: SessionManager::new(provider),
            feed: ExpenseFeed::new(store.clone()),
            budgets: BudgetStore::new(store),
            options: ViewOptions::default(),
            view: ExpenseView::default(),
            budget: None,
            current_period,
            pending: PendingOperations::new(),
            currency,
            config,
        })
    }

    /// The current session.
    pub fn session_state(&self) -> &SessionState {
        self.session.state()
    }

    /// The filtered and sorted expenses and their totals.
    pub fn view(&self) -> &ExpenseView {
        &self.view
    }

    /// The expenses from the latest snapshot, unfiltered and in store order.
    pub fn expenses(&self) -> &[Expense] {
        self.feed.expenses()
    }

    /// The budget for the current period, if one has been set.
    pub fn budget(&self) -> Option<Budget> {
        self.budget
    }

    /// The month the cached budget belongs to.
    pub fn current_period(&self) -> Period {
        self.current_period
    }

    /// The current filter and sort order.
    pub fn options(&self) -> ViewOptions {
        self.options
    }

    /// A handle to the set of operations in flight.
    pub fn pending(&self) -> PendingOperations {
        self.pending.clone()
    }

    /// The formatter for amounts in the configured currency.
    pub fn currency(&self) -> &CurrencyFormatter {
        &self.currency
    }

    /// The settings the tracker was created with.
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    fn verified_owner(&self) -> Result<UserID, Error> {
        self.session
            .state()
            .verified_identity()
            .map(|identity| identity.id.clone())
            .ok_or(Error::NotSignedIn)
    }

    fn rederive(&mut self) {
        self.view = ExpenseView::derive(self.feed.expenses(), &self.options);
    }

    async fn reconcile(&mut self, previous: SessionState) {
        let effects = session_effects(&previous, self.session.state());

        for effect in effects {
            tracing::debug!("Running {effect:?}");
            self.run_effect(effect).await;
        }
    }

    async fn run_effect(&mut self, effect: Effect) {
        match effect {
            Effect::StopFeed => {
                self.feed.unsubscribe();
                self.rederive();
            }
            Effect::ClearBudget => self.budget = None,
            Effect::StartFeed(owner) => self.feed.subscribe(&owner),
            Effect::FetchBudget(owner) => {
                match self.config.current_period() {
                    Ok(period) => self.current_period = period,
                    Err(error) => tracing::warn!("Keeping period {}: {error}", self.current_period),
                }

                self.budget = match self.budgets.fetch_budget(&owner, self.current_period).await {
                    Ok(budget) => budget,
                    Err(error) => {
                        tracing::error!("Could not fetch the budget of {owner}: {error}");
                        None
                    }
                };
            }
        }
    }

    async fn observe_identity(&mut self, pushed: Option<Identity>) {
        let previous = self.session.state().clone();
        self.session.observe(pushed);
        self.reconcile(previous).await;
    }

    /// Apply every auth change and snapshot that has already arrived, without
    /// waiting for new ones, and re-derive the view.
    pub async fn sync(&mut self) {
        while let Some(pushed) = self.session.take_auth_change() {
            self.observe_identity(pushed).await;
        }

        self.apply_waiting_snapshots();
    }

    /// Apply the snapshots already waiting in the feed and re-derive the view.
    fn apply_waiting_snapshots(&mut self) {
        while let Some(delivery) = self.feed.try_next() {
            self.feed.apply(delivery);
        }

        self.rederive();
    }

    /// Wait for the next auth change or snapshot and apply it.
    ///
    /// Returns `false` once the identity provider has shut down.
    pub async fn next_update(&mut self) -> bool {
        let update = tokio::select! {
            change = self.session.wait_auth_change() => Update::Auth(change),
            delivery = self.feed.next() => Update::Feed(delivery),
        };

        match update {
            Update::Auth(Some(pushed)) => self.observe_identity(pushed).await,
            Update::Auth(None) => {
                tracing::warn!("The identity provider has shut down");
                return false;
            }
            Update::Feed(Some(delivery)) => {
                self.feed.apply(delivery);
            }
            Update::Feed(None) => {}
        }

        self.rederive();

        true
    }

    /// Create an account, see [SessionManager::sign_up].
    ///
    /// # Errors
    /// Returns [Error::OperationInProgress] or any error from the sign up.
    pub async fn sign_up(&mut self, email: &str, password: &str) -> Result<Identity, Error> {
        let _guard = self.pending.begin(Operation::SignUp)?;
        let previous = self.session.state().clone();

        let result = self.session.sign_up(email, password).await;
        self.reconcile(previous).await;

        result
    }

    /// Sign in, see [SessionManager::sign_in].
    ///
    /// # Errors
    /// Returns [Error::OperationInProgress] or any error from the sign in.
    pub async fn sign_in(&mut self, email: &str, password: &str) -> Result<Identity, Error> {
        let _guard = self.pending.begin(Operation::SignIn)?;
        let previous = self.session.state().clone();

        let result = self.session.sign_in(email, password).await;
        self.reconcile(previous).await;

        result
    }

    /// Sign out and clear everything derived from the session.
    pub async fn sign_out(&mut self) {
        let previous = self.session.state().clone();

        self.session.sign_out().await;
        self.reconcile(previous).await;
    }

    /// Send a password reset email, see [SessionManager::reset_password].
    ///
    /// # Errors
    /// Returns [Error::OperationInProgress] or any error from the reset.
    pub async fn reset_password(&self, email: &str) -> Result<(), Error> {
        let _guard = self.pending.begin(Operation::ResetPassword)?;

        self.session.reset_password(email).await
    }

    /// Check whether the signed in user has verified their email, and load
    /// their data if they have.
    ///
    /// # Errors
    /// Returns [Error::NotSignedIn] or an [Error::Auth] error.
    pub async fn refresh_verification(&mut self) -> Result<bool, Error> {
        let previous = self.session.state().clone();

        let result = self.session.refresh_verification().await;
        self.reconcile(previous).await;

        result
    }

    /// Send the verification email again.
    ///
    /// # Errors
    /// Returns [Error::NotSignedIn] or an [Error::Auth] error.
    pub async fn resend_verification(&self) -> Result<(), Error> {
        self.session.resend_verification().await
    }

    /// Show only the expenses that pass `filter`.
    pub fn set_filter(&mut self, filter: CategoryFilter) {
        self.options.filter = filter;
        self.rederive();
    }

    /// Change the order the expenses are shown in.
    pub fn set_sort(&mut self, sort: SortOrder) {
        self.options.sort = sort;
        self.rederive();
    }

    /// The budget that applies to `period`, from the cache if `period` is the
    /// current period.
    ///
    /// A failed read is treated as no budget so it never blocks adding an
    /// expense.
    async fn budget_for(&self, owner: &UserID, period: Period) -> Option<Budget> {
        if period == self.current_period {
            return self.budget;
        }

        match self.budgets.fetch_budget(owner, period).await {
            Ok(budget) => budget,
            Err(error) => {
                tracing::error!("Skipping the budget check, could not read the budget: {error}");
                None
            }
        }
    }

    /// Validate the add expense form and save the expense.
    ///
    /// The returned [AddedExpense] carries a warning if the expense takes
    /// spending in its month over that month's budget. The new record shows up
    /// in the view with the next snapshot.
    ///
    /// # Errors
    /// Returns an [Error::Validation] error naming the first invalid field
    /// without contacting the store, [Error::NotSignedIn],
    /// [Error::OperationInProgress] or an [Error::Store] error.
    pub async fn add_expense(&mut self, form: &ExpenseForm) -> Result<AddedExpense, Error> {
        let _guard = self.pending.begin(Operation::AddExpense)?;
        let owner = self.verified_owner()?;
        let expense = NewExpense::from_form(form)?;
        // Earlier writes may have been confirmed without a sync since.
        self.apply_waiting_snapshots();

        let period = Period::of(expense.date());
        let budget = self.budget_for(&owner, period).await;
        let spent = period_total(self.feed.expenses(), period);
        let exceeded = exceeds_budget(spent, expense.amount(), budget.map(|budget| budget.amount));

        let id = self.feed.add_expense(&owner, &expense).await?;

        let budget_alert = match budget {
            Some(budget) if exceeded => {
                let new_total = spent + expense.amount();
                tracing::warn!(
                    "Spending of {owner} in {period} is {new_total}, over the budget of {}",
                    budget.amount
                );

                Some(Alert::warning(
                    "Budget exceeded",
                    &format!(
                        "Spending in {period} is now {}, over your budget of {}.",
                        self.currency.format(new_total),
                        self.currency.format(budget.amount)
                    ),
                ))
            }
            _ => None,
        };

        Ok(AddedExpense { id, budget_alert })
    }

    /// Delete an expense.
    ///
    /// # Errors
    /// Returns [Error::NotSignedIn], [Error::OperationInProgress] or an
    /// [Error::Store] error.
    pub async fn delete_expense(&mut self, id: &ExpenseId) -> Result<(), Error> {
        let _guard = self.pending.begin(Operation::DeleteExpense)?;
        self.verified_owner()?;

        self.feed.delete_expense(id).await
    }

    /// Set the budget for the current period.
    ///
    /// # Errors
    /// See [ExpenseTracker::save_budget_for].
    pub async fn save_budget(&mut self, amount: f64) -> Result<Budget, Error> {
        self.save_budget_for(self.current_period, amount).await
    }

    /// Set the budget for `period`, replacing any previous budget.
    ///
    /// # Errors
    /// Returns an [Error::Validation] error for a negative or non-finite
    /// amount, [Error::NotSignedIn], [Error::OperationInProgress] or an
    /// [Error::Store] error.
    pub async fn save_budget_for(&mut self, period: Period, amount: f64) -> Result<Budget, Error> {
        let _guard = self.pending.begin(Operation::SaveBudget)?;
        let owner = self.verified_owner()?;

        let budget = self.budgets.save_budget(&owner, period, amount).await?;

        if period == self.current_period {
            self.budget = Some(budget);
        }

        Ok(budget)
    }

    /// Remove the budget for the current period.
    ///
    /// # Errors
    /// Returns [Error::NotSignedIn], [Error::OperationInProgress] or an
    /// [Error::Store] error.
    pub async fn delete_budget(&mut self) -> Result<(), Error> {
        let _guard = self.pending.begin(Operation::DeleteBudget)?;
        let owner = self.verified_owner()?;

        self.budgets
            .delete_budget(&owner, self.current_period)
            .await?;
        self.budget = None;

        Ok(())
    }

    /// The visible expenses as CSV text.
    ///
    /// # Errors
    /// Returns [Error::NothingToExport] if no expenses are visible.
    pub fn export_csv(&self) -> Result<String, Error> {
        to_csv(&self.view.visible)
    }

    /// Delete the signed in user's expenses, budgets and identity, in that
    /// order.
    ///
    /// The password is checked first, a wrong password changes nothing. If
    /// any of the user's data cannot be deleted the identity is kept so the
    /// user can sign in and try again.
    ///
    /// # Errors
    /// Returns [Error::NotSignedIn], [Error::OperationInProgress], an
    /// [Error::Auth] error or [Error::CascadeDeletion].
    pub async fn delete_account(&mut self, password: &str) -> Result<(), Error> {
        let _guard = self.pending.begin(Operation::DeleteAccount)?;
        let owner = self.verified_owner()?;

        self.session.reauthenticate(password).await?;

        let expenses_deleted = self.feed.delete_all(&owner).await.map_err(|(deleted, source)| {
            tracing::error!("Stopped deleting the account of {owner} after {deleted} expenses: {source}");
            Error::CascadeDeletion {
                expenses_deleted: deleted,
                budgets_deleted: 0,
                source,
            }
        })?;

        self.budgets
            .delete_all(&owner)
            .await
            .map_err(|(deleted, source)| {
                tracing::error!("Stopped deleting the account of {owner} after {deleted} budgets: {source}");
                Error::CascadeDeletion {
                    expenses_deleted,
                    budgets_deleted: deleted,
                    source,
                }
            })?;

        let previous = self.session.state().clone();
        self.session.delete_identity().await?;
        self.reconcile(previous).await;

        tracing::info!("Deleted the account of {owner}");

        Ok(())
    }
}
