//! Tracks which mutating operations are in flight so duplicate submissions can
//! be rejected and the presentation layer can show progress.

use std::{
    collections::HashSet,
    fmt::Display,
    sync::{Arc, Mutex, PoisonError},
};

use crate::Error;

/// A mutating operation that may take a while to complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Creating an account.
    SignUp,
    /// Signing in.
    SignIn,
    /// Sending a password reset email.
    ResetPassword,
    /// Writing a new expense.
    AddExpense,
    /// Deleting an expense.
    DeleteExpense,
    /// Saving the budget.
    SaveBudget,
    /// Deleting the budget.
    DeleteBudget,
    /// Deleting the account and all of its data.
    DeleteAccount,
}

impl Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Operation::SignUp => "Signing up",
            Operation::SignIn => "Signing in",
            Operation::ResetPassword => "Sending the password reset email",
            Operation::AddExpense => "Adding an expense",
            Operation::DeleteExpense => "Deleting an expense",
            Operation::SaveBudget => "Saving the budget",
            Operation::DeleteBudget => "Deleting the budget",
            Operation::DeleteAccount => "Deleting the account",
        };

        f.write_str(text)
    }
}

/// The set of operations currently in flight.
///
/// Cloning gives another handle to the same set, so a presentation layer can
/// hold on to one and poll it while the tracker awaits a collaborator.
#[derive(Debug, Clone, Default)]
pub struct PendingOperations {
    operations: Arc<Mutex<HashSet<Operation>>>,
}

impl PendingOperations {
    /// Create an empty set of pending operations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `operation` is currently in flight.
    pub fn is_pending(&self, operation: Operation) -> bool {
        self.operations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&operation)
    }

    /// Whether any operation is currently in flight.
    pub fn any_pending(&self) -> bool {
        !self
            .operations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// Mark `operation` as in flight until the returned guard is dropped.
    ///
    /// # Errors
    /// Returns [Error::OperationInProgress] if `operation` is already in flight.
    pub fn begin(&self, operation: Operation) -> Result<OperationGuard, Error> {
        let inserted = self
            .operations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(operation);

        if !inserted {
            tracing::debug!("Rejected duplicate submission: {operation}");
            return Err(Error::OperationInProgress(operation));
        }

        Ok(OperationGuard {
            operations: self.operations.clone(),
            operation,
        })
    }
}

/// Clears the in-flight flag of an operation when dropped, including when the
/// future driving the operation is dropped before it completes.
#[derive(Debug)]
pub struct OperationGuard {
    operations: Arc<Mutex<HashSet<Operation>>>,
    operation: Operation,
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        self.operations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.operation);
    }
}
