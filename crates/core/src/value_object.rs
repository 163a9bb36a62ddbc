//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects have **no identity**: two values with equal attributes are the
/// same value. They are immutable; "changing" one means building a new one, which
/// is how `Amount` and `BusinessZone` are used throughout the ledger.
///
/// - **Value object**: `Amount(12.50)` equals any other `Amount(12.50)`
/// - **Entity**: two customers named "Karim" are still different customers
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
