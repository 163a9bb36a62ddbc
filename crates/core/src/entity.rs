//! Entity trait: identity + continuity across state changes.

use crate::id::UserId;

/// Entity marker + minimal interface.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}

/// An entity that belongs to exactly one user.
///
/// Ownership is the tenant isolation boundary: every read and write is checked
/// against the requesting user before anything else happens.
pub trait Owned: Entity {
    fn owner(&self) -> UserId;

    fn is_owned_by(&self, user: UserId) -> bool {
        self.owner() == user
    }
}
