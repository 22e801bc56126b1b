//! Password strength checks and salted password hashes.
//!
//! The identity provider owns credentials, so the core only checks strength
//! before sign-up. [PasswordHash] is used by the in-memory provider.

use std::fmt::Display;

use zxcvbn::{Score, feedback::Feedback, zxcvbn};

use crate::Error;

/// A password that has passed the strength check.
#[derive(Clone, PartialEq)]
pub struct ValidatedPassword(String);

impl ValidatedPassword {
    /// Check that `raw_password` is hard enough to guess.
    ///
    /// # Errors
    ///
    /// Returns [Error::TooWeak] with advice on how to make the password stronger.
    pub fn new(raw_password: &str) -> Result<Self, Error> {
        let analysis = zxcvbn(raw_password, &[]);

        match analysis.score() {
            Score::Three | Score::Four => Ok(Self(raw_password.to_owned())),
            _ => Err(Error::TooWeak(
                analysis
                    .feedback()
                    .unwrap_or(&Feedback::default())
                    .to_string(),
            )),
        }
    }

    /// Wrap `raw_password` without checking its strength.
    ///
    /// Intended for tests and for passwords that were checked elsewhere.
    pub fn new_unchecked(raw_password: &str) -> Self {
        Self(raw_password.to_owned())
    }

    /// The plain text password.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Never print the password itself, not even in debug logs.
impl std::fmt::Debug for ValidatedPassword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ValidatedPassword(********)")
    }
}

impl Display for ValidatedPassword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("********")
    }
}

/// A salted and hashed password.
#[derive(Debug, Clone, PartialEq)]
pub struct PasswordHash(String);

impl PasswordHash {
    /// An alias for the default encryption cost for hashing passwords.
    pub const DEFAULT_COST: u32 = bcrypt::DEFAULT_COST;

    /// Hash `password` with `cost` rounds.
    ///
    /// A cost of at least 12 is recommended outside of tests.
    ///
    /// # Errors
    ///
    /// Returns [Error::HashingError] if the password could not be hashed.
    pub fn new(password: &ValidatedPassword, cost: u32) -> Result<Self, Error> {
        bcrypt::hash(password.as_str(), cost)
            .map(Self)
            .map_err(|error| Error::HashingError(error.to_string()))
    }

    /// Check `raw_password` against the hash.
    ///
    /// A hash that bcrypt cannot read never matches.
    pub fn verify(&self, raw_password: &str) -> bool {
        match bcrypt::verify(raw_password, &self.0) {
            Ok(matches) => matches,
            Err(error) => {
                tracing::error!("could not verify password hash: {error}");
                false
            }
        }
    }
}
