//! `khata-auth`: bearer-token authentication boundary.
//!
//! Decoupled from HTTP and storage: the transport hands a raw token in and gets an
//! [`AuthenticatedUser`] back. Every ledger operation is then scoped to that user.

pub mod claims;
pub mod principal;
pub mod validator;

pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use principal::AuthenticatedUser;
pub use validator::{Hs256JwtValidator, JwtValidator};
