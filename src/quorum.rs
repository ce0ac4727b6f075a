// Copyright (C) 2019-2025, Lux Industries Inc. All rights reserved.
// See the file LICENSE for licensing terms.

//! Quorum predicates (C2): pure, side-effect-free BFT super-majority arithmetic.
//!
//! All comparisons widen to `u128` before multiplying so that `w, total` up
//! to `u64::MAX` never overflow — the "LP-CONSENSUS-69" threshold is an
//! integer comparison, never a floating-point one, to keep honest peers
//! bit-for-bit in agreement.

/// `w·100 ≥ total·69` — the 69% super-majority used by this engine in place
/// of the classical 2/3, for a 2-point safety margin.
pub fn super_majority(w: u64, total: u64) -> bool {
    if total == 0 {
        return true;
    }
    (w as u128) * 100 >= (total as u128) * 69
}

/// `w·100 ≥ total·51` — simple majority.
pub fn simple_majority(w: u64, total: u64) -> bool {
    if total == 0 {
        return true;
    }
    (w as u128) * 100 >= (total as u128) * 51
}

/// `byz·100 ≤ total·31` — whether `total` can tolerate `byz` Byzantine weight
/// under the 69% quorum.
pub fn can_tolerate(byz: u64, total: u64) -> bool {
    if total == 0 {
        return true;
    }
    (byz as u128) * 100 <= (total as u128) * 31
}

/// `⌈K·0.69⌉`, collapsing to 1 for the degenerate `K=1` network.
pub fn alpha_for_k(k: u32) -> u32 {
    if k == 1 {
        return 1;
    }
    // ceil(k*69/100) computed in integer arithmetic.
    ((k as u64 * 69 + 99) / 100) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn super_majority_boundary() {
        assert!(super_majority(69, 100));
        assert!(!super_majority(68, 100));
        assert!(!super_majority(46, 67)); // 4600 < 4623
        assert!(super_majority(47, 67)); // 4700 >= 4623
    }

    #[test]
    fn vacuous_total_zero() {
        assert!(super_majority(0, 0));
        assert!(simple_majority(0, 0));
        assert!(can_tolerate(0, 0));
    }

    #[test]
    fn no_overflow_at_u64_max() {
        assert!(super_majority(u64::MAX, u64::MAX));
        assert!(!super_majority(u64::MAX / 2, u64::MAX));
    }

    #[test]
    fn alpha_for_k_one_collapses_to_one() {
        assert_eq!(alpha_for_k(1), 1);
    }

    #[test]
    fn alpha_for_k_rounds_up() {
        assert_eq!(alpha_for_k(20), 14); // ceil(13.8)
        assert_eq!(alpha_for_k(100), 69);
    }

    #[test]
    fn simple_majority_boundary() {
        assert!(simple_majority(51, 100));
        assert!(!simple_majority(50, 100));
    }

    #[test]
    fn can_tolerate_boundary() {
        assert!(can_tolerate(31, 100));
        assert!(!can_tolerate(32, 100));
    }

    // Property 7: super_majority(w, total) == (w*100 >= total*69) for all
    // w, total, verified via an overflow-safe u128 comparison against a
    // handful of boundary-adjacent samples (exhaustive u64 space is
    // infeasible; proptest exercises the general case in tests/properties.rs).
    #[test]
    fn matches_definition_at_samples() {
        for total in [0u64, 1, 3, 67, 100, 1_000_000, u64::MAX] {
            for w in [0u64, 1, total / 2, total, total.saturating_sub(1)] {
                let expected = if total == 0 {
                    true
                } else {
                    (w as u128) * 100 >= (total as u128) * 69
                };
                assert_eq!(super_majority(w, total), expected, "w={w} total={total}");
            }
        }
    }
}
