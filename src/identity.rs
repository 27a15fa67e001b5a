//! User identity and the request-scoped context carried into every call.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_SALT;

/// Upper bound (exclusive) for generated fallback identities.
const GENERATED_IDENTITY_SPACE: u64 = 10_000_000_000;

/// Stable per-user identifier.
///
/// Anything works as long as it is consistent for the same user: a user id
/// after login, a session token, or a generated value persisted in a cookie.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity(String);

impl Identity {
    /// Wrap an externally assigned identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a random identity for an anonymous user.
    ///
    /// Uniqueness is only as good as the randomness; persist the result for
    /// the lifetime of the session.
    #[must_use]
    pub fn generate() -> Self {
        let n = rand::thread_rng().gen_range(0..GENERATED_IDENTITY_SPACE);
        Self(n.to_string())
    }

    /// Borrow the identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for Identity {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u64> for Identity {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

/// Request-scoped state: who the user is and which salt buckets them.
///
/// Build one per inbound request, usually via
/// [`Abingo::context`](crate::Abingo::context) so the configured salt is used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
    identity: Identity,
    salt: String,
}

impl Context {
    /// Context with the default salt.
    #[must_use]
    pub fn new(identity: impl Into<Identity>) -> Self {
        Self {
            identity: identity.into(),
            salt: DEFAULT_SALT.to_string(),
        }
    }

    /// Context for an anonymous user with a freshly generated identity.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::new(Identity::generate())
    }

    /// Replace the salt. A new salt reassigns every user in every experiment.
    #[must_use]
    pub fn with_salt(mut self, salt: impl Into<String>) -> Self {
        self.salt = salt.into();
        self
    }

    /// The user's identity.
    #[must_use]
    pub const fn identity(&self) -> &Identity {
        &self.identity
    }

    /// The bucketing salt.
    #[must_use]
    pub fn salt(&self) -> &str {
        &self.salt
    }
}
