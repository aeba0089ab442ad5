//! Value object trait: equality by value, not identity.
//!
//! Computed roll-up figures (cost totals, weight contributions, earned-value
//! ratios) are value objects: two totals with the same amounts are the same
//! total, regardless of which pass produced them.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values. To
/// "modify" one, build a new one.
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq)]
/// struct CostTotals { actual: Decimal, committed: Decimal }
///
/// impl ValueObject for CostTotals {}
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
