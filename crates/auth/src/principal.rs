use khata_core::UserId;

use crate::JwtClaims;

/// Identity established for a request after its token validated.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct AuthenticatedUser {
    user_id: UserId,
}

impl AuthenticatedUser {
    pub fn new(user_id: UserId) -> Self {
        Self { user_id }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }
}

impl From<&JwtClaims> for AuthenticatedUser {
    fn from(claims: &JwtClaims) -> Self {
        Self::new(claims.sub)
    }
}
