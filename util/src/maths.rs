//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

/// Map a value from one range into another.
pub fn lin_map<T>(source_range: (T, T), target_range: (T, T), value: T) -> T
where
    T: Float,
{
    target_range.0
        + ((value - source_range.0) * (target_range.1 - target_range.0)
            / (source_range.1 - source_range.0))
}

/// Map an integer value from one range into another using truncating integer
/// division.
///
/// Truncation is toward zero (Rust `/` semantics), applied uniformly in all
/// callers. The endpoints of the source range map exactly onto the endpoints
/// of the target range, which may be inverted (`target.0 > target.1`).
pub fn lin_map_int(source_range: (i64, i64), target_range: (i64, i64), value: i64) -> i64 {
    target_range.0
        + (value - source_range.0) * (target_range.1 - target_range.0)
            / (source_range.1 - source_range.0)
}
