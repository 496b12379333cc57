//! Session validation seam.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

use crate::message::UserId;

/// Authentication errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No token was presented.
    #[error("missing session token")]
    MissingToken,

    /// The token is not valid.
    #[error("invalid session token")]
    InvalidToken,

    /// The token has expired.
    #[error("session expired")]
    Expired,
}

/// The user a session token belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    /// Name shown in other users' chat lists.
    pub display_name: Option<String>,
}

impl Identity {
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            display_name: None,
        }
    }

    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// Resolves a session token to the user it belongs to.
#[async_trait]
pub trait SessionValidator: Send + Sync {
    /// Validate `token` and return its identity.
    async fn validate(&self, token: &str) -> Result<Identity, AuthError>;
}

/// A fixed token table.
#[derive(Debug, Clone, Default)]
pub struct StaticSessionValidator {
    tokens: HashMap<String, Identity>,
}

impl StaticSessionValidator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `token` for `user`.
    #[must_use]
    pub fn with_token(self, token: impl Into<String>, user: UserId) -> Self {
        self.with_identity(token, Identity::new(user))
    }

    /// Accept `token` for a full identity.
    #[must_use]
    pub fn with_identity(mut self, token: impl Into<String>, identity: Identity) -> Self {
        self.tokens.insert(token.into(), identity);
        self
    }
}

#[async_trait]
impl SessionValidator for StaticSessionValidator {
    async fn validate(&self, token: &str) -> Result<Identity, AuthError> {
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        self.tokens
            .get(token)
            .cloned()
            .ok_or(AuthError::InvalidToken)
    }
}
