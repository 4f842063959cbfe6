use async_trait::async_trait;

use super::AuthError;
use crate::models::Authenticated;

/// Remote authority the controller authenticates against.
///
/// Timeouts and any retry policy belong to implementations.
#[async_trait]
pub trait AuthGateway: Send + Sync {
    /// Exchange credentials for a user and a freshly issued token
    async fn authenticate(&self, email: &str, password: &str) -> Result<Authenticated, AuthError>;

    /// `Ok(true)` if the token is accepted, `Ok(false)` if the authority
    /// explicitly rejects it. Transient failures are `Err`, never `Ok(false)`.
    async fn validate_token(&self, token: &str) -> Result<bool, AuthError>;

    /// Best-effort remote logout
    async fn revoke(&self, token: &str) -> Result<(), AuthError>;
}
