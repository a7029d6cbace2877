use thiserror::Error;

use crate::Role;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing role '{0}'")]
    Forbidden(String),
}

/// Pure role check. No IO.
pub fn require_role(roles: &[Role], required: &Role) -> Result<(), AuthzError> {
    if roles.iter().any(|r| r == required) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_role_is_required() {
        assert_eq!(require_role(&[Role::ADMIN], &Role::ADMIN), Ok(()));
        assert_eq!(
            require_role(&[Role::new("user")], &Role::ADMIN),
            Err(AuthzError::Forbidden("admin".to_string()))
        );
        assert!(require_role(&[], &Role::ADMIN).is_err());
    }
}
