//! Identities issued by the identity provider and the provider interface.

use std::fmt::Display;

use async_trait::async_trait;
use email_address::EmailAddress;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// A newtype wrapper for the opaque user IDs issued by the identity provider.
///
/// This helps disambiguate user IDs from other types of IDs, leading to better compile time
/// errors.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserID(String);

impl UserID {
    /// Create a new user ID.
    pub fn new(id: &str) -> Self {
        Self(id.to_owned())
    }

    /// The user ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for UserID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// An authenticated principal.
///
/// The lifecycle is owned by the identity provider, the core only observes it.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    /// The provider's ID for the user.
    pub id: UserID,
    /// The email address the user signed up with.
    pub email: EmailAddress,
    /// Whether the user has clicked the link in the verification email.
    pub verified: bool,
}

/// The classified failures reported by the identity provider.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum AuthError {
    /// The email and password combination did not match an account.
    #[error("invalid email or password")]
    InvalidCredentials,

    /// The account exists but its email address has not been verified.
    #[error("email not verified")]
    NotVerified,

    /// The operation is sensitive and the user must re-authenticate first.
    #[error("this operation requires a recent login")]
    RequiresRecentLogin,

    /// An account already exists for the email address.
    #[error("the email address is already in use")]
    EmailInUse,

    /// The provider could not be reached.
    #[error("network error: {0}")]
    Network(String),

    /// Any other failure.
    #[error("unknown error: {0}")]
    Unknown(String),
}

/// The operations the core needs from an identity provider.
///
/// Implementations own the current identity and publish every change to it
/// through [IdentityProvider::auth_state].
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Create an account and sign it in.
    async fn sign_up(&self, email: &EmailAddress, password: &str) -> Result<Identity, AuthError>;

    /// Sign in to an existing account.
    async fn sign_in(&self, email: &EmailAddress, password: &str) -> Result<Identity, AuthError>;

    /// Sign out the current identity, if any.
    async fn sign_out(&self) -> Result<(), AuthError>;

    /// Send the email containing the verification link.
    async fn send_verification_email(&self, identity: &Identity) -> Result<(), AuthError>;

    /// Send a password reset email.
    async fn send_password_reset(&self, email: &EmailAddress) -> Result<(), AuthError>;

    /// Confirm the password of the signed in identity.
    ///
    /// Sensitive operations such as [IdentityProvider::delete_identity] need a
    /// recent re-authentication.
    async fn reauthenticate(&self, identity: &Identity, password: &str) -> Result<(), AuthError>;

    /// Fetch the latest state of `identity`, e.g. to check if it has since been verified.
    async fn reload(&self, identity: &Identity) -> Result<Identity, AuthError>;

    /// Delete the identity and sign it out.
    async fn delete_identity(&self, identity: &Identity) -> Result<(), AuthError>;

    /// Subscribe to changes of the current identity.
    fn auth_state(&self) -> watch::Receiver<Option<Identity>>;
}

#[cfg(test)]
mod tests {
    use super::UserID;

    #[test]
    fn user_id_serializes_as_plain_string() {
        let id = UserID::new("abc123");

        let json = serde_json::to_string(&id).unwrap();

        assert_eq!(json, "\"abc123\"");
        assert_eq!(id.to_string(), "abc123");
    }
}
