//! An identity provider that keeps accounts in memory.

use std::{
    collections::{HashMap, HashSet},
    str::FromStr,
    sync::{Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use email_address::EmailAddress;
use tokio::sync::watch;

use crate::{
    Error,
    identity::{AuthError, Identity, IdentityProvider, UserID},
    password::{PasswordHash, ValidatedPassword},
};

/// An email the provider would have sent.
#[derive(Debug, Clone, PartialEq)]
pub enum SentEmail {
    /// A link to verify the address.
    Verification(EmailAddress),
    /// A link to reset the password.
    PasswordReset(EmailAddress),
}

#[derive(Debug)]
struct Account {
    identity: Identity,
    password_hash: PasswordHash,
}

#[derive(Debug, Default)]
struct ProviderState {
    /// Accounts keyed by lower case email address.
    accounts: HashMap<String, Account>,
    next_id: u64,
    offline: bool,
    outbox: Vec<SentEmail>,
    recently_authenticated: HashSet<UserID>,
}

impl ProviderState {
    fn check_online(&self) -> Result<(), AuthError> {
        if self.offline {
            Err(AuthError::Network("the identity provider is offline".to_owned()))
        } else {
            Ok(())
        }
    }

    fn account_by_id(&mut self, id: &UserID) -> Option<&mut Account> {
        self.accounts
            .values_mut()
            .find(|account| &account.identity.id == id)
    }
}

/// Keeps accounts in memory and "sends" emails to an outbox that tests can
/// inspect.
///
/// Verification links are "clicked" with [InMemoryIdentityProvider::confirm_email].
#[derive(Debug)]
pub struct InMemoryIdentityProvider {
    password_hash_cost: u32,
    state: Mutex<ProviderState>,
    current: watch::Sender<Option<Identity>>,
}

impl InMemoryIdentityProvider {
    /// Create a provider with no accounts.
    ///
    /// `password_hash_cost` is the bcrypt cost, tests should use the minimum of 4.
    pub fn new(password_hash_cost: u32) -> Self {
        let (current, _) = watch::channel(None);

        Self {
            password_hash_cost,
            state: Mutex::new(ProviderState::default()),
            current,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ProviderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn create_account(
        &self,
        email: &EmailAddress,
        password: &str,
        verified: bool,
    ) -> Result<Identity, AuthError> {
        let password_hash = PasswordHash::new(
            &ValidatedPassword::new_unchecked(password),
            self.password_hash_cost,
        )
        .map_err(|error| AuthError::Unknown(error.to_string()))?;

        let mut state = self.lock();
        state.check_online()?;

        let key = email.as_str().to_lowercase();
        if state.accounts.contains_key(&key) {
            return Err(AuthError::EmailInUse);
        }

        state.next_id += 1;
        let identity = Identity {
            id: UserID::new(&format!("user-{}", state.next_id)),
            email: email.clone(),
            verified,
        };

        state.accounts.insert(
            key,
            Account {
                identity: identity.clone(),
                password_hash,
            },
        );

        Ok(identity)
    }

    /// Create an account without signing it in.
    ///
    /// # Errors
    /// Returns [Error::InvalidEmail] for a malformed address, or [Error::Auth]
    /// if the account cannot be created.
    pub fn register(&self, email: &str, password: &str, verified: bool) -> Result<Identity, Error> {
        let email =
            EmailAddress::from_str(email).map_err(|_| Error::InvalidEmail(email.to_owned()))?;

        Ok(self.create_account(&email, password, verified)?)
    }

    /// Mark the account for `email` as verified, as if the user clicked the
    /// link in the verification email.
    ///
    /// The current session is not updated, the client has to reload the
    /// identity to see the change.
    ///
    /// # Errors
    /// Returns [AuthError::InvalidCredentials] if there is no such account.
    pub fn confirm_email(&self, email: &str) -> Result<Identity, AuthError> {
        let mut state = self.lock();
        let account = state
            .accounts
            .get_mut(&email.to_lowercase())
            .ok_or(AuthError::InvalidCredentials)?;

        account.identity.verified = true;

        Ok(account.identity.clone())
    }

    /// Simulate losing (or regaining) the connection to the provider.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// The identity that is currently signed in.
    pub fn current_identity(&self) -> Option<Identity> {
        self.current.borrow().clone()
    }

    /// Whether an account exists for `email`.
    pub fn has_account(&self, email: &str) -> bool {
        self.lock().accounts.contains_key(&email.to_lowercase())
    }

    /// Every email sent so far, oldest first.
    pub fn outbox(&self) -> Vec<SentEmail> {
        self.lock().outbox.clone()
    }

    /// The number of verification emails sent to `email`.
    pub fn verification_emails_sent(&self, email: &str) -> usize {
        self.lock()
            .outbox
            .iter()
            .filter(|sent| {
                matches!(sent, SentEmail::Verification(to) if to.as_str().eq_ignore_ascii_case(email))
            })
            .count()
    }
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    async fn sign_up(&self, email: &EmailAddress, password: &str) -> Result<Identity, AuthError> {
        let identity = self.create_account(email, password, false)?;

        self.lock()
            .recently_authenticated
            .insert(identity.id.clone());
        self.current.send_replace(Some(identity.clone()));

        Ok(identity)
    }

    async fn sign_in(&self, email: &EmailAddress, password: &str) -> Result<Identity, AuthError> {
        let identity = {
            let mut state = self.lock();
            state.check_online()?;

            let account = state
                .accounts
                .get(&email.as_str().to_lowercase())
                .ok_or(AuthError::InvalidCredentials)?;

            if !account.password_hash.verify(password) {
                return Err(AuthError::InvalidCredentials);
            }

            let identity = account.identity.clone();
            state.recently_authenticated.insert(identity.id.clone());
            identity
        };

        self.current.send_replace(Some(identity.clone()));

        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        if let Some(identity) = self.current.send_replace(None) {
            self.lock().recently_authenticated.remove(&identity.id);
        }

        Ok(())
    }

    async fn send_verification_email(&self, identity: &Identity) -> Result<(), AuthError> {
        let mut state = self.lock();
        state.check_online()?;

        let email = state
            .account_by_id(&identity.id)
            .map(|account| account.identity.email.clone())
            .ok_or_else(|| AuthError::Unknown(format!("no account for {}", identity.id)))?;

        state.outbox.push(SentEmail::Verification(email));

        Ok(())
    }

    async fn send_password_reset(&self, email: &EmailAddress) -> Result<(), AuthError> {
        let mut state = self.lock();
        state.check_online()?;

        // Unknown addresses succeed too, so the response does not reveal which
        // addresses have accounts.
        if state.accounts.contains_key(&email.as_str().to_lowercase()) {
            state.outbox.push(SentEmail::PasswordReset(email.clone()));
        }

        Ok(())
    }

    async fn reauthenticate(&self, identity: &Identity, password: &str) -> Result<(), AuthError> {
        let mut state = self.lock();
        state.check_online()?;

        let matches = state
            .account_by_id(&identity.id)
            .map(|account| account.password_hash.verify(password))
            .unwrap_or(false);

        if !matches {
            return Err(AuthError::InvalidCredentials);
        }

        state.recently_authenticated.insert(identity.id.clone());

        Ok(())
    }

    async fn reload(&self, identity: &Identity) -> Result<Identity, AuthError> {
        let mut state = self.lock();
        state.check_online()?;

        state
            .account_by_id(&identity.id)
            .map(|account| account.identity.clone())
            .ok_or_else(|| AuthError::Unknown(format!("no account for {}", identity.id)))
    }

    async fn delete_identity(&self, identity: &Identity) -> Result<(), AuthError> {
        {
            let mut state = self.lock();
            state.check_online()?;

            if !state.recently_authenticated.remove(&identity.id) {
                return Err(AuthError::RequiresRecentLogin);
            }

            state
                .accounts
                .retain(|_, account| account.identity.id != identity.id);
        }

        self.current.send_replace(None);

        Ok(())
    }

    fn auth_state(&self) -> watch::Receiver<Option<Identity>> {
        self.current.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use email_address::EmailAddress;

    use crate::identity::{AuthError, IdentityProvider};

    use super::{InMemoryIdentityProvider, SentEmail};

    const PASSWORD: &str = "correct-horse-battery-staple";

    fn email(text: &str) -> EmailAddress {
        EmailAddress::from_str(text).unwrap()
    }

    #[tokio::test]
    async fn sign_up_rejects_duplicate_email() {
        let provider = InMemoryIdentityProvider::new(4);
        provider.sign_up(&email("a@example.com"), PASSWORD).await.unwrap();

        let result = provider.sign_up(&email("A@example.com"), PASSWORD).await;

        assert_eq!(result, Err(AuthError::EmailInUse));
    }

    #[tokio::test]
    async fn sign_in_publishes_identity() {
        let provider = InMemoryIdentityProvider::new(4);
        provider.register("a@example.com", PASSWORD, true).unwrap();
        let receiver = provider.auth_state();

        let identity = provider
            .sign_in(&email("a@example.com"), PASSWORD)
            .await
            .unwrap();

        assert_eq!(receiver.borrow().as_ref(), Some(&identity));
    }

    #[tokio::test]
    async fn delete_requires_recent_login() {
        let provider = InMemoryIdentityProvider::new(4);
        let identity = provider.register("a@example.com", PASSWORD, true).unwrap();

        assert_eq!(
            provider.delete_identity(&identity).await,
            Err(AuthError::RequiresRecentLogin)
        );

        provider.reauthenticate(&identity, PASSWORD).await.unwrap();
        provider.delete_identity(&identity).await.unwrap();

        assert!(!provider.has_account("a@example.com"));
        assert!(provider.current_identity().is_none());
    }

    #[tokio::test]
    async fn password_reset_is_only_sent_to_known_addresses() {
        let provider = InMemoryIdentityProvider::new(4);
        provider.register("a@example.com", PASSWORD, true).unwrap();

        provider
            .send_password_reset(&email("a@example.com"))
            .await
            .unwrap();
        provider
            .send_password_reset(&email("nobody@example.com"))
            .await
            .unwrap();

        assert_eq!(
            provider.outbox(),
            vec![SentEmail::PasswordReset(email("a@example.com"))]
        );
    }

    #[tokio::test]
    async fn offline_provider_reports_network_error() {
        let provider = InMemoryIdentityProvider::new(4);
        provider.register("a@example.com", PASSWORD, true).unwrap();
        provider.set_offline(true);

        let result = provider.sign_in(&email("a@example.com"), PASSWORD).await;

        assert!(matches!(result, Err(AuthError::Network(_))));
    }
}
