//! `jobboard-auth`: bearer-token authentication and role checks.
//!
//! Decoupled from HTTP and storage: the API layer extracts the token and
//! asks a [`JwtValidator`] for the claims.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod roles;

pub use authorize::{AuthzError, require_role};
pub use claims::{JwtClaims, TokenError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtValidator};
pub use roles::Role;
