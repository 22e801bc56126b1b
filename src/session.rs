//! The session state machine and the operations that drive it.
//!
//! [SessionManager] is the only place that knows who the current user is.
//! Every change to [SessionState] goes through [SessionState::apply], so the
//! allowed transitions can be read (and tested) in one place:
//!
//! ```text
//! SignedOut -> Authenticating -> SignedInVerified
//!                             -> SignedInUnverified -> SignedInVerified
//!                             -> SignedOut
//! ```

use std::{str::FromStr, sync::Arc};

use email_address::EmailAddress;
use tokio::sync::watch;

use crate::{
    Error,
    identity::{AuthError, Identity, IdentityProvider},
    password::ValidatedPassword,
};

/// Who is signed in, if anyone, and whether they may see their data.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SessionState {
    /// Nobody is signed in.
    #[default]
    SignedOut,
    /// A sign-in or sign-up request is in flight.
    Authenticating,
    /// Signed in, but the email address has not been verified yet, so no data
    /// may be loaded.
    SignedInUnverified(Identity),
    /// Signed in with a verified email address.
    SignedInVerified(Identity),
}

/// Something that happened to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A sign-in or sign-up request was sent.
    AuthenticationStarted,
    /// The provider accepted the credentials and started a new session.
    Authenticated(Identity),
    /// The provider rejected the request, which leaves the session as it was
    /// before the request was sent.
    AuthenticationFailed {
        /// The state before [SessionEvent::AuthenticationStarted].
        previous: SessionState,
    },
    /// The provider confirmed that the identity has been verified.
    Verified(Identity),
    /// The session ended.
    SignedOut,
}

impl SessionState {
    /// Compute the state after `event`.
    ///
    /// Verification only promotes an unverified session of the same identity,
    /// it is ignored in any other state.
    pub fn apply(self, event: SessionEvent) -> SessionState {
        match (self, event) {
            (_, SessionEvent::AuthenticationStarted) => SessionState::Authenticating,
            (_, SessionEvent::AuthenticationFailed { previous }) => previous,
            (_, SessionEvent::SignedOut) => SessionState::SignedOut,
            (_, SessionEvent::Authenticated(identity)) if identity.verified => {
                SessionState::SignedInVerified(identity)
            }
            (_, SessionEvent::Authenticated(identity)) => SessionState::SignedInUnverified(identity),
            (SessionState::SignedInUnverified(current), SessionEvent::Verified(identity))
                if current.id == identity.id && identity.verified =>
            {
                SessionState::SignedInVerified(identity)
            }
            (state, SessionEvent::Verified(_)) => state,
        }
    }

    /// The signed in identity, verified or not.
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            SessionState::SignedInUnverified(identity) | SessionState::SignedInVerified(identity) => {
                Some(identity)
            }
            SessionState::SignedOut | SessionState::Authenticating => None,
        }
    }

    /// The signed in identity, only if it has been verified.
    pub fn verified_identity(&self) -> Option<&Identity> {
        match self {
            SessionState::SignedInVerified(identity) => Some(identity),
            _ => None,
        }
    }
}

/// Runs the identity provider operations and keeps [SessionState] in step
/// with their results.
pub struct SessionManager<P> {
    provider: Arc<P>,
    state: SessionState,
    auth_state: watch::Receiver<Option<Identity>>,
}

impl<P> SessionManager<P>
where
    P: IdentityProvider,
{
    /// Create a session manager that starts signed out.
    ///
    /// If the provider already has a current identity it is picked up by the
    /// first call to [SessionManager::take_auth_change].
    pub fn new(provider: Arc<P>) -> Self {
        let mut auth_state = provider.auth_state();
        auth_state.mark_changed();

        Self {
            provider,
            state: SessionState::SignedOut,
            auth_state,
        }
    }

    /// The current session state.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    fn transition(&mut self, event: SessionEvent) {
        let previous = std::mem::take(&mut self.state);
        tracing::debug!("Session event {event:?} in state {previous:?}");
        self.state = previous.apply(event);
    }

    /// Create an account.
    ///
    /// The password strength is checked before the provider is contacted. A new
    /// unverified account is sent a verification email and the session stays
    /// unverified, so no data is loaded until the email has been verified.
    ///
    /// # Errors
    /// Returns an [Error::InvalidEmail], [Error::TooWeak] or [Error::Auth] error.
    pub async fn sign_up(&mut self, email: &str, password: &str) -> Result<Identity, Error> {
        let email = parse_email(email)?;
        let password = ValidatedPassword::new(password)?;

        let previous = self.state.clone();
        self.transition(SessionEvent::AuthenticationStarted);

        let identity = match self.provider.sign_up(&email, password.as_str()).await {
            Ok(identity) => identity,
            Err(error) => {
                tracing::info!("Sign up failed: {error}");
                self.transition(SessionEvent::AuthenticationFailed { previous });
                return Err(error.into());
            }
        };

        self.transition(SessionEvent::Authenticated(identity.clone()));

        if !identity.verified {
            self.provider.send_verification_email(&identity).await?;
            tracing::info!("Sent verification email to {}", identity.email);
        }

        Ok(identity)
    }

    /// Sign in.
    ///
    /// An identity that has not been verified is signed straight back out and
    /// [AuthError::NotVerified] is returned instead of a live session.
    ///
    /// # Errors
    /// Returns an [Error::InvalidEmail] or [Error::Auth] error.
    pub async fn sign_in(&mut self, email: &str, password: &str) -> Result<Identity, Error> {
        let email = parse_email(email)?;

        let previous = self.state.clone();
        self.transition(SessionEvent::AuthenticationStarted);

        let identity = match self.provider.sign_in(&email, password).await {
            Ok(identity) => identity,
            Err(error) => {
                tracing::info!("Sign in failed: {error}");
                self.transition(SessionEvent::AuthenticationFailed { previous });
                return Err(error.into());
            }
        };

        if !identity.verified {
            tracing::info!("Signing out {} because their email is not verified", identity.id);

            if let Err(error) = self.provider.sign_out().await {
                tracing::warn!("Could not sign out unverified user: {error}");
            }

            self.transition(SessionEvent::SignedOut);
            return Err(AuthError::NotVerified.into());
        }

        self.transition(SessionEvent::Authenticated(identity.clone()));

        Ok(identity)
    }

    /// Sign out. The local session is cleared even if the provider fails.
    pub async fn sign_out(&mut self) {
        if let Err(error) = self.provider.sign_out().await {
            tracing::warn!("Provider failed to sign out, clearing the session anyway: {error}");
        }

        self.transition(SessionEvent::SignedOut);
    }

    /// Send a password reset email to `email`.
    ///
    /// # Errors
    /// Returns [Error::MissingEmail] without contacting the provider if `email`
    /// is empty, otherwise an [Error::InvalidEmail] or [Error::Auth] error.
    pub async fn reset_password(&self, email: &str) -> Result<(), Error> {
        if email.trim().is_empty() {
            return Err(Error::MissingEmail);
        }

        let email = parse_email(email)?;
        self.provider.send_password_reset(&email).await?;
        tracing::info!("Sent password reset email to {email}");

        Ok(())
    }

    /// Ask the provider whether the signed in identity has been verified yet.
    ///
    /// Returns whether the session is now verified.
    ///
    /// # Errors
    /// Returns [Error::NotSignedIn] if nobody is signed in, or an [Error::Auth] error.
    pub async fn refresh_verification(&mut self) -> Result<bool, Error> {
        let identity = self.state.identity().cloned().ok_or(Error::NotSignedIn)?;
        let reloaded = self.provider.reload(&identity).await?;

        self.transition(SessionEvent::Verified(reloaded));

        Ok(self.state.verified_identity().is_some())
    }

    /// Send the verification email again.
    ///
    /// # Errors
    /// Returns [Error::NotSignedIn] unless an unverified identity is signed in,
    /// or an [Error::Auth] error.
    pub async fn resend_verification(&self) -> Result<(), Error> {
        match &self.state {
            SessionState::SignedInUnverified(identity) => {
                self.provider.send_verification_email(identity).await?;
                Ok(())
            }
            _ => Err(Error::NotSignedIn),
        }
    }

    /// Confirm the password of the signed in, verified identity.
    ///
    /// # Errors
    /// Returns [Error::NotSignedIn] or an [Error::Auth] error, e.g.
    /// [AuthError::InvalidCredentials] for a wrong password.
    pub async fn reauthenticate(&self, password: &str) -> Result<(), Error> {
        let identity = self.state.verified_identity().ok_or(Error::NotSignedIn)?;
        self.provider.reauthenticate(identity, password).await?;

        Ok(())
    }

    /// Delete the signed in identity and end the session.
    ///
    /// Callers must delete the identity's data first, see
    /// [crate::ExpenseTracker::delete_account].
    ///
    /// # Errors
    /// Returns [Error::NotSignedIn] or an [Error::Auth] error, in which case
    /// the session is unchanged.
    pub async fn delete_identity(&mut self) -> Result<(), Error> {
        let identity = self.state.identity().cloned().ok_or(Error::NotSignedIn)?;
        self.provider.delete_identity(&identity).await?;
        tracing::info!("Deleted identity {}", identity.id);

        self.transition(SessionEvent::SignedOut);

        Ok(())
    }

    /// Reconcile the session with an identity pushed by the provider.
    pub fn observe(&mut self, pushed: Option<Identity>) {
        let event = match (pushed, self.state.identity()) {
            (None, None) => return,
            (None, Some(_)) => SessionEvent::SignedOut,
            (Some(pushed), Some(current)) if pushed.id == current.id => {
                SessionEvent::Verified(pushed)
            }
            // The provider may echo a session that this manager is still
            // authenticating, the sign-in call will apply it.
            (Some(_), None) if self.state == SessionState::Authenticating => return,
            (Some(pushed), _) => SessionEvent::Authenticated(pushed),
        };

        self.transition(event);
    }

    /// Take the provider's latest identity if it changed since the last call.
    pub fn take_auth_change(&mut self) -> Option<Option<Identity>> {
        match self.auth_state.has_changed() {
            Ok(true) => Some(self.auth_state.borrow_and_update().clone()),
            Ok(false) | Err(_) => None,
        }
    }

    /// Wait until the provider's identity changes. Returns `None` if the
    /// provider has shut down.
    pub async fn wait_auth_change(&mut self) -> Option<Option<Identity>> {
        self.auth_state.changed().await.ok()?;

        Some(self.auth_state.borrow_and_update().clone())
    }
}

fn parse_email(text: &str) -> Result<EmailAddress, Error> {
    EmailAddress::from_str(text.trim()).map_err(|_| Error::InvalidEmail(text.trim().to_owned()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use email_address::EmailAddress;

    use crate::{
        Error,
        identity::{AuthError, Identity, UserID},
        memory::InMemoryIdentityProvider,
    };

    use super::{SessionEvent, SessionManager, SessionState};

    const PASSWORD: &str = "correct-horse-battery-staple";

    fn identity(id: &str, verified: bool) -> Identity {
        Identity {
            id: UserID::new(id),
            email: EmailAddress::new_unchecked(format!("{id}@example.com")),
            verified,
        }
    }

    #[test]
    fn authenticated_event_respects_verification() {
        let verified = SessionState::Authenticating
            .apply(SessionEvent::Authenticated(identity("a", true)));
        let unverified = SessionState::Authenticating
            .apply(SessionEvent::Authenticated(identity("a", false)));

        assert_eq!(verified, SessionState::SignedInVerified(identity("a", true)));
        assert_eq!(unverified, SessionState::SignedInUnverified(identity("a", false)));
    }

    #[test]
    fn unverified_session_is_not_silently_promoted() {
        let state = SessionState::SignedInUnverified(identity("a", false));

        let still_unverified = state
            .clone()
            .apply(SessionEvent::Verified(identity("a", false)));
        let other_user = state.clone().apply(SessionEvent::Verified(identity("b", true)));
        let promoted = state.apply(SessionEvent::Verified(identity("a", true)));

        assert_eq!(
            still_unverified,
            SessionState::SignedInUnverified(identity("a", false))
        );
        assert_eq!(other_user, SessionState::SignedInUnverified(identity("a", false)));
        assert_eq!(promoted, SessionState::SignedInVerified(identity("a", true)));
    }

    #[test]
    fn verification_is_ignored_when_signed_out() {
        let state = SessionState::SignedOut.apply(SessionEvent::Verified(identity("a", true)));

        assert_eq!(state, SessionState::SignedOut);
    }

    #[test]
    fn sign_out_always_ends_the_session() {
        for state in [
            SessionState::Authenticating,
            SessionState::SignedInUnverified(identity("a", false)),
            SessionState::SignedInVerified(identity("a", true)),
        ] {
            assert_eq!(state.apply(SessionEvent::SignedOut), SessionState::SignedOut);
        }
    }

    #[test]
    fn failed_authentication_restores_previous_state() {
        for previous in [
            SessionState::SignedOut,
            SessionState::SignedInUnverified(identity("a", false)),
            SessionState::SignedInVerified(identity("a", true)),
        ] {
            let state = previous
                .clone()
                .apply(SessionEvent::AuthenticationStarted)
                .apply(SessionEvent::AuthenticationFailed {
                    previous: previous.clone(),
                });

            assert_eq!(state, previous);
        }
    }

    fn get_manager() -> (Arc<InMemoryIdentityProvider>, SessionManager<InMemoryIdentityProvider>) {
        let provider = Arc::new(InMemoryIdentityProvider::new(4));
        let manager = SessionManager::new(provider.clone());

        (provider, manager)
    }

    #[tokio::test]
    async fn sign_up_sends_verification_and_stays_unverified() {
        let (provider, mut manager) = get_manager();

        let identity = manager.sign_up("new@example.com", PASSWORD).await.unwrap();

        assert!(!identity.verified);
        assert_eq!(manager.state(), &SessionState::SignedInUnverified(identity));
        assert_eq!(provider.verification_emails_sent("new@example.com"), 1);
    }

    #[tokio::test]
    async fn sign_up_rejects_weak_password_before_contacting_provider() {
        let (provider, mut manager) = get_manager();

        let result = manager.sign_up("new@example.com", "password").await;

        assert!(matches!(result, Err(Error::TooWeak(_))));
        assert!(!provider.has_account("new@example.com"));
        assert_eq!(manager.state(), &SessionState::SignedOut);
    }

    #[tokio::test]
    async fn sign_in_with_unverified_identity_signs_out() {
        let (provider, mut manager) = get_manager();
        provider.register("late@example.com", PASSWORD, false).unwrap();

        let result = manager.sign_in("late@example.com", PASSWORD).await;

        assert_eq!(result, Err(Error::Auth(AuthError::NotVerified)));
        assert_eq!(manager.state(), &SessionState::SignedOut);
        assert!(provider.current_identity().is_none());
    }

    #[tokio::test]
    async fn sign_in_with_wrong_password_signs_out() {
        let (provider, mut manager) = get_manager();
        provider.register("user@example.com", PASSWORD, true).unwrap();

        let result = manager.sign_in("user@example.com", "wrong password").await;

        assert_eq!(result, Err(Error::Auth(AuthError::InvalidCredentials)));
        assert_eq!(manager.state(), &SessionState::SignedOut);
    }

    #[tokio::test]
    async fn sign_in_with_verified_identity_succeeds() {
        let (provider, mut manager) = get_manager();
        provider.register("user@example.com", PASSWORD, true).unwrap();

        let identity = manager.sign_in("user@example.com", PASSWORD).await.unwrap();

        assert_eq!(manager.state(), &SessionState::SignedInVerified(identity));
    }

    #[tokio::test]
    async fn reset_password_fails_fast_without_email() {
        let (provider, manager) = get_manager();
        provider.set_offline(true);

        let result = manager.reset_password("   ").await;

        assert_eq!(result, Err(Error::MissingEmail));
    }

    #[tokio::test]
    async fn reset_password_reports_provider_failure() {
        let (provider, manager) = get_manager();
        provider.set_offline(true);

        let result = manager.reset_password("user@example.com").await;

        assert!(matches!(result, Err(Error::Auth(AuthError::Network(_)))));
    }

    #[tokio::test]
    async fn refresh_verification_promotes_after_confirmation() {
        let (provider, mut manager) = get_manager();
        manager.sign_up("new@example.com", PASSWORD).await.unwrap();

        assert!(!manager.refresh_verification().await.unwrap());

        provider.confirm_email("new@example.com").unwrap();

        assert!(manager.refresh_verification().await.unwrap());
        assert!(manager.state().verified_identity().is_some());
    }

    #[tokio::test]
    async fn observe_signs_out_when_provider_drops_identity() {
        let (provider, mut manager) = get_manager();
        provider.register("user@example.com", PASSWORD, true).unwrap();
        manager.sign_in("user@example.com", PASSWORD).await.unwrap();

        manager.observe(None);

        assert_eq!(manager.state(), &SessionState::SignedOut);
    }

    #[tokio::test]
    async fn take_auth_change_reports_provider_pushes_once() {
        let (provider, mut manager) = get_manager();
        provider.register("user@example.com", PASSWORD, true).unwrap();
        // Initial value is reported so an existing session can be restored.
        assert_eq!(manager.take_auth_change(), Some(None));
        assert_eq!(manager.take_auth_change(), None);

        manager.sign_in("user@example.com", PASSWORD).await.unwrap();

        let pushed = manager.take_auth_change().unwrap().unwrap();
        assert_eq!(pushed.email.as_str(), "user@example.com");
        assert_eq!(manager.take_auth_change(), None);
    }
}
