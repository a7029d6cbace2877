use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use jobboard_core::UserId;

use crate::Role;

/// Claims the service expects in a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject: the user id.
    pub sub: UserId,

    /// Address used for job notifications.
    pub email: String,

    #[serde(default)]
    pub roles: Vec<Role>,

    pub issued_at: DateTime<Utc>,

    pub expires_at: DateTime<Utc>,
}

impl JwtClaims {
    pub fn has_role(&self, role: &Role) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("invalid token: {0}")]
    Invalid(String),

    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,
}

/// Validate the claim time window.
pub fn validate_claims(claims: &JwtClaims, now: DateTime<Utc>) -> Result<(), TokenError> {
    if claims.expires_at <= claims.issued_at {
        return Err(TokenError::InvalidTimeWindow);
    }
    if now < claims.issued_at {
        return Err(TokenError::NotYetValid);
    }
    if now >= claims.expires_at {
        return Err(TokenError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn claims(now: DateTime<Utc>) -> JwtClaims {
        JwtClaims {
            sub: UserId::new(),
            email: "u@example.com".to_string(),
            roles: vec![Role::ADMIN],
            issued_at: now,
            expires_at: now + Duration::minutes(5),
        }
    }

    #[test]
    fn window_is_enforced() {
        let now = Utc::now();
        let c = claims(now);
        assert_eq!(validate_claims(&c, now), Ok(()));
        assert_eq!(validate_claims(&c, now - Duration::seconds(1)), Err(TokenError::NotYetValid));
        assert_eq!(validate_claims(&c, c.expires_at), Err(TokenError::Expired));

        let mut bad = c.clone();
        bad.expires_at = bad.issued_at;
        assert_eq!(validate_claims(&bad, now), Err(TokenError::InvalidTimeWindow));
    }

    #[test]
    fn roles_default_to_empty() {
        let now = Utc::now();
        let mut value = serde_json::to_value(claims(now)).unwrap();
        value.as_object_mut().unwrap().remove("roles");
        let parsed: JwtClaims = serde_json::from_value(value).unwrap();
        assert!(parsed.roles.is_empty());
        assert!(!parsed.has_role(&Role::ADMIN));
    }
}
