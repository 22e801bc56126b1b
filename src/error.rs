//! Defines the app level error type and its conversion to user-facing alerts.

use crate::{alert::Alert, identity::AuthError, pending::Operation, store::StoreError};

/// A problem with user input that is caught before any collaborator is
/// contacted.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum ValidationError {
    /// The amount was not a finite number, or it was negative.
    #[error("\"{0}\" is not a valid amount, enter a number that is zero or greater")]
    InvalidAmount(String),

    /// The description was empty or only whitespace.
    #[error("description cannot be empty")]
    EmptyDescription,

    /// No category was selected.
    #[error("select a category")]
    MissingCategory,

    /// The category text did not match any known category.
    #[error("\"{0}\" is not a valid category")]
    UnknownCategory(String),

    /// No date was given.
    #[error("date cannot be empty")]
    MissingDate,

    /// The date could not be parsed as `YYYY-MM-DD`.
    #[error("could not parse \"{0}\" as a date, expected YYYY-MM-DD")]
    InvalidDate(String),

    /// The period could not be parsed as `YYYY-MM`.
    #[error("could not parse \"{0}\" as a month, expected YYYY-MM")]
    InvalidPeriod(String),

    /// The sort order did not match any known sort order.
    #[error("\"{0}\" is not a valid sort order, expected newest, oldest, lowest or highest")]
    UnknownSortOrder(String),
}

impl ValidationError {
    /// The name of the form field the error refers to.
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::InvalidAmount(_) => "amount",
            ValidationError::EmptyDescription => "description",
            ValidationError::MissingCategory | ValidationError::UnknownCategory(_) => "category",
            ValidationError::MissingDate | ValidationError::InvalidDate(_) => "date",
            ValidationError::InvalidPeriod(_) => "period",
            ValidationError::UnknownSortOrder(_) => "sort",
        }
    }
}

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// The user entered something invalid into a form.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The identity provider rejected the request.
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// The remote document store failed to complete a request.
    #[error("remote store error: {0}")]
    Store(#[from] StoreError),

    /// The user provided a password that is too easy to guess.
    #[error("password is too weak: {0}")]
    TooWeak(String),

    /// An unexpected error occurred with the underlying hashing library.
    #[error("hashing failed: {0}")]
    HashingError(String),

    /// A password reset was requested without an email address.
    #[error("enter your email address to reset your password")]
    MissingEmail,

    /// The text entered as an email address is not a valid email address.
    #[error("{0} is not a valid email address")]
    InvalidEmail(String),

    /// The operation needs a signed in, verified user.
    #[error("no verified user is signed in")]
    NotSignedIn,

    /// Account deletion stopped part way through deleting the user's data.
    ///
    /// The identity itself has not been deleted. The user must retry.
    #[error(
        "account deletion stopped after deleting {expenses_deleted} expense(s) and \
        {budgets_deleted} budget(s): {source}"
    )]
    CascadeDeletion {
        /// The number of expenses deleted before the failure.
        expenses_deleted: usize,
        /// The number of budgets deleted before the failure.
        budgets_deleted: usize,
        /// The store error that stopped the cascade.
        source: StoreError,
    },

    /// An export was requested for an empty list of expenses.
    #[error("there are no expenses to export")]
    NothingToExport,

    /// The same operation was submitted again before the first one finished.
    #[error("{0} is already in progress")]
    OperationInProgress(Operation),

    /// An error occurred while getting the local timezone from a canonical timezone string.
    #[error("invalid timezone {0}")]
    InvalidTimezone(String),

    /// The configured currency symbol cannot be used to format amounts.
    #[error("invalid currency symbol \"{0}\"")]
    InvalidCurrencySymbol(String),
}

impl Error {
    /// Convert the error into a message that can be shown to the user.
    pub fn into_alert(self) -> Alert {
        match self {
            Error::Validation(error) => {
                Alert::error(&format!("Invalid {}", error.field()), &error.to_string())
            }
            Error::Auth(AuthError::InvalidCredentials) => Alert::error(
                "Incorrect email or password",
                "Check your email and password and try again.",
            ),
            Error::Auth(AuthError::NotVerified) => Alert::error(
                "Email not verified",
                "Please check your inbox for the verification link.",
            ),
            Error::Auth(AuthError::RequiresRecentLogin) => Alert::error(
                "Please sign in again",
                "This operation needs you to have signed in recently.",
            ),
            Error::Auth(AuthError::EmailInUse) => Alert::error(
                "Email already in use",
                "Sign in instead, or reset your password.",
            ),
            Error::Auth(AuthError::Network(_)) | Error::Store(StoreError::Unavailable(_)) => {
                Alert::error(
                    "Could not reach the server",
                    "Check your internet connection and try again.",
                )
            }
            Error::TooWeak(feedback) => Alert::error("Password is too weak", &feedback),
            Error::MissingEmail => Alert::error_simple("Enter your email to reset password."),
            Error::InvalidEmail(email) => Alert::error(
                "Invalid email address",
                &format!("{email} is not a valid email address."),
            ),
            Error::NotSignedIn => Alert::error_simple("Sign in with a verified account first."),
            error @ Error::CascadeDeletion { .. } => Alert::error(
                "Account deletion did not finish",
                &format!("{error}. Your account has not been deleted, please try again."),
            ),
            Error::NothingToExport => Alert::error_simple("There are no expenses to export."),
            Error::OperationInProgress(operation) => Alert::warning(
                "Please wait",
                &format!("{operation} is still in progress."),
            ),
            Error::InvalidTimezone(timezone) => Alert::error(
                "Invalid Timezone Settings",
                &format!(
                    "Could not get local timezone \"{timezone}\". Ensure the timezone has been \
                    set to a valid, canonical timezone string"
                ),
            ),
            Error::InvalidCurrencySymbol(symbol) => Alert::error(
                "Invalid Currency Settings",
                &format!("\"{symbol}\" cannot be used as a currency symbol, use a shorter symbol."),
            ),
            // Any errors that are not handled above are not intended to be shown to the user.
            error => {
                tracing::error!("An unexpected error occurred: {}", error);
                Alert::error(
                    "Something went wrong",
                    "An unexpected error occurred, check the logs for more details.",
                )
            }
        }
    }
}
