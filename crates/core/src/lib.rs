//! `khata-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives shared by the customer directory
//! and the ledger (no infrastructure concerns).

pub mod entity;
pub mod error;
pub mod id;
pub mod money;
pub mod time;
pub mod value_object;

pub use entity::{Entity, Owned};
pub use error::{DomainError, DomainResult};
pub use id::{CustomerId, EntryId, UserId};
pub use money::{Amount, MONEY_SCALE, round_money};
pub use time::{BusinessZone, Clock, ManualClock, SystemClock};
pub use value_object::ValueObject;
