use async_trait::async_trait;

use sakay_types::{AuthError, AuthUser};

/// Session capability of the hosted backend.
///
/// The client never stores credentials or refreshes tokens itself; it asks
/// the provider who the current user is whenever it needs an identity.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Resolve the signed-in user, or fail with [`AuthError`] when no
    /// session is available.
    async fn current_user(&self) -> Result<AuthUser, AuthError>;
}
