//! Property-based tests for colour and confidence invariants.

use proptest::prelude::*;
use umbra_math::{contrast_ratio, frequency, relative_luminance, Rgba};

fn rgb_strategy() -> impl Strategy<Value = Rgba> {
    (any::<u8>(), any::<u8>(), any::<u8>()).prop_map(|(r, g, b)| Rgba::opaque(r, g, b))
}

proptest! {
    #[test]
    fn contrast_is_symmetric_and_bounded(a in rgb_strategy(), b in rgb_strategy()) {
        let ab = contrast_ratio(a, b);
        let ba = contrast_ratio(b, a);
        prop_assert!((ab - ba).abs() < 1e-12);
        prop_assert!(ab >= 1.0 - 1e-12);
        prop_assert!(ab <= 21.0 + 1e-9);
    }

    #[test]
    fn identical_colours_have_unit_contrast(a in rgb_strategy()) {
        prop_assert!((contrast_ratio(a, a) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn luminance_is_a_probability(a in rgb_strategy()) {
        let l = relative_luminance(a);
        prop_assert!((0.0..=1.0 + 1e-12).contains(&l));
    }

    #[test]
    fn frequency_is_bounded(success in 0u32..10_000, failure in 0u32..10_000) {
        let c = frequency(success, failure);
        prop_assert!((0.0..=1.0).contains(&c));
    }
}
