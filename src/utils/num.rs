//! Numeric conversions kept in one place so call sites stay searchable.
//!
//! Fallible conversions return `Option`; saturating ones clamp instead of truncating.

#[inline]
#[must_use]
pub fn i64_to_usize(v: i64) -> Option<usize> {
    usize::try_from(v).ok()
}

#[inline]
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn usize_to_f64(v: usize) -> f64 {
    v as f64
}

#[inline]
#[must_use]
pub fn u128_to_u64_saturating(v: u128) -> u64 {
    u64::try_from(v).unwrap_or(u64::MAX)
}

/// Resolves a possibly negative position against `len`; `-1` is the last element.
/// Returns `None` when a negative position reaches before the start.
#[inline]
#[must_use]
pub fn resolve_index(i: i64, len: usize) -> Option<usize> {
    if i >= 0 {
        return i64_to_usize(i);
    }
    let back = usize::try_from(i.unsigned_abs()).ok()?;
    len.checked_sub(back)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saturating_conversions() {
        assert_eq!(u128_to_u64_saturating(7), 7);
        assert_eq!(u128_to_u64_saturating(u128::MAX), u64::MAX);
    }

    #[test]
    fn negative_indices_count_from_end() {
        assert_eq!(resolve_index(-1, 3), Some(2));
        assert_eq!(resolve_index(-3, 3), Some(0));
        assert_eq!(resolve_index(-4, 3), None);
        assert_eq!(resolve_index(5, 3), Some(5));
    }
}
