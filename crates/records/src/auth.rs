//! User existence check.
//!
//! This is not authentication in the cryptographic sense: a user is
//! "authenticated" when a decodable user blob exists under the identifier.
//! No secret is compared.

use brokerage_ledger_storage::StorageBackend;
use serde::Serialize;

use crate::{
    codec,
    error::{RecordError, RecordResult},
    keys::user_key,
    model::User,
};

/// Result of [`Authenticator::authenticate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthOutcome {
    /// Whether the user exists and decodes.
    pub authenticated: bool,
    /// The user, when authenticated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
}

impl AuthOutcome {
    fn denied() -> Self {
        Self { authenticated: false, user: None }
    }
}

/// Looks users up by identifier.
#[derive(Clone)]
pub struct Authenticator<B> {
    backend: B,
}

impl<B: StorageBackend> Authenticator<B> {
    /// Creates an authenticator over `backend`.
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Looks up `user_id`.
    ///
    /// A missing or undecodable user yields `authenticated: false`.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::LedgerRead`] if the ledger cannot be read.
    #[tracing::instrument(skip(self))]
    pub async fn authenticate(&self, user_id: &str) -> RecordResult<AuthOutcome> {
        let key = user_key(user_id);
        let Some(bytes) = self.backend.get(key.as_bytes()).await.map_err(RecordError::read)?
        else {
            tracing::debug!("unknown user");
            return Ok(AuthOutcome::denied());
        };

        match codec::decode::<User>(&bytes) {
            Ok(user) => Ok(AuthOutcome { authenticated: true, user: Some(user) }),
            Err(e) => {
                tracing::warn!(error = %e, "stored user does not decode");
                Ok(AuthOutcome::denied())
            },
        }
    }
}
