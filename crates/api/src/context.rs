use axum::{async_trait, extract::FromRequestParts, http::StatusCode, http::request::Parts, response::Response};

use jobboard_auth::{AuthzError, Role, require_role};
use jobboard_core::UserId;

use crate::app::errors::json_error;

/// Authenticated caller, placed in request extensions by the auth middleware.
///
/// Extracting it directly answers 401 when the request carried no token;
/// `Option<PrincipalContext>` is for routes that also serve anonymous callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    user_id: UserId,
    email: String,
    roles: Vec<Role>,
}

impl PrincipalContext {
    pub fn new(user_id: UserId, email: String, roles: Vec<Role>) -> Self {
        Self { user_id, email, roles }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn is_admin(&self) -> bool {
        self.require_admin().is_ok()
    }

    pub fn require_admin(&self) -> Result<(), AuthzError> {
        require_role(&self.roles, &Role::ADMIN)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for PrincipalContext
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<PrincipalContext>()
            .cloned()
            .ok_or_else(|| json_error(StatusCode::UNAUTHORIZED, "unauthorized", "missing bearer token"))
    }
}
