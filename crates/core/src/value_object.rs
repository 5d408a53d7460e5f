//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects carry no identity and are immutable: a rounding precision of
/// `0.01` is the same precision wherever it appears. To "modify" one, build a
/// new value.
///
/// ```ignore
/// #[derive(Debug, Clone, Copy, PartialEq)]
/// struct LotMultiple(f64);
///
/// impl ValueObject for LotMultiple {}
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
