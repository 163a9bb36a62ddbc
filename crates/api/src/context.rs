use khata_auth::AuthenticatedUser;
use khata_core::UserId;

/// The acting user for a request.
///
/// Inserted by the auth middleware; every ledger route reads it and scopes all work
/// to this user.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct UserContext {
    user_id: UserId,
}

impl UserContext {
    pub fn new(user_id: UserId) -> Self {
        Self { user_id }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }
}

impl From<AuthenticatedUser> for UserContext {
    fn from(user: AuthenticatedUser) -> Self {
        Self::new(user.user_id())
    }
}
