use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use sakay_backend::AuthProvider;
use sakay_types::{AuthError, AuthUser};

/// [`AuthProvider`] double that always answers the same thing.
pub struct StaticAuth {
    user: Option<AuthUser>,
}

impl StaticAuth {
    pub fn signed_in(id: Uuid) -> Self {
        Self {
            user: Some(AuthUser {
                id,
                email: format!("user-{id}@sakay.test"),
                metadata: json!({}),
            }),
        }
    }

    pub fn signed_out() -> Self {
        Self { user: None }
    }
}

#[async_trait]
impl AuthProvider for StaticAuth {
    async fn current_user(&self) -> Result<AuthUser, AuthError> {
        self.user.clone().ok_or(AuthError::NotSignedIn)
    }
}
