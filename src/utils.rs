//! Small utility functions shared across the crate.
//!
//! Mirrors the shape of `gnomics::utils`: a handful of `#[inline]` free
//! functions rather than trait methods, kept deliberately tiny.

use rand::Rng;

/// Return the minimum of two values.
#[inline]
pub fn min<T: Ord>(a: T, b: T) -> T {
    if a < b {
        a
    } else {
        b
    }
}

/// Return the maximum of two values.
#[inline]
pub fn max<T: Ord>(a: T, b: T) -> T {
    if a > b {
        a
    } else {
        b
    }
}

/// Draw a uniform random integer in `[0, n)`.
///
/// This is the crate's single rng primitive: every random choice the
/// temporal memory makes (tie-breaking the least-used cell, sampling
/// synapse growth candidates) goes through this function, so that all
/// randomness is attributable to one seeded stream.
///
/// # Panics
///
/// Panics if `n == 0` (mirrors `rand::Rng::gen_range` on an empty range;
/// callers are expected to only invoke this over a nonempty candidate set).
///
/// # Examples
///
/// ```
/// use dendron::utils::uint32_below;
/// use rand::SeedableRng;
///
/// let mut rng = rand::rngs::StdRng::seed_from_u64(0);
/// let val = uint32_below(10, &mut rng);
/// assert!(val < 10);
/// ```
#[inline]
pub fn uint32_below<R: Rng>(n: usize, rng: &mut R) -> usize {
    assert!(n > 0, "uint32_below requires a nonempty range");
    rng.gen_range(0..n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_min() {
        assert_eq!(min(5, 10), 5);
        assert_eq!(min(10, 5), 5);
        assert_eq!(min(7, 7), 7);
    }

    #[test]
    fn test_max() {
        assert_eq!(max(5, 10), 10);
        assert_eq!(max(10, 5), 10);
        assert_eq!(max(7, 7), 7);
    }

    #[test]
    fn test_uint32_below_in_range() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(0);
        for _ in 0..200 {
            let val = uint32_below(17, &mut rng);
            assert!(val < 17);
        }
    }

    #[test]
    fn test_uint32_below_deterministic() {
        let mut rng1 = rand::rngs::StdRng::seed_from_u64(42);
        let mut rng2 = rand::rngs::StdRng::seed_from_u64(42);

        let seq1: Vec<usize> = (0..20).map(|_| uint32_below(100, &mut rng1)).collect();
        let seq2: Vec<usize> = (0..20).map(|_| uint32_below(100, &mut rng2)).collect();

        assert_eq!(seq1, seq2);
    }

    #[test]
    #[should_panic(expected = "uint32_below requires a nonempty range")]
    fn test_uint32_below_zero() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(0);
        uint32_below(0, &mut rng);
    }
}
