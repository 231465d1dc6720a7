//! Count-based confidence estimates.
//!
//! Every confidence in Umbra is a probability derived from observation
//! counts. Nothing here keeps state; callers own the counts.

/// Clamp a value into [0, 1], mapping NaN to 0.
pub fn clamp_probability(p: f64) -> f64 {
    if p.is_nan() {
        0.0
    } else {
        p.clamp(0.0, 1.0)
    }
}

/// Plain success frequency: `success / (success + failure)`.
///
/// Returns 0.0 when there are no observations.
pub fn frequency(success: u32, failure: u32) -> f64 {
    let total = success as u64 + failure as u64;
    if total == 0 {
        return 0.0;
    }
    clamp_probability(success as f64 / total as f64)
}

/// Laplace-smoothed frequency: `(success + 1) / (total + 2)`.
///
/// Used where an estimate is needed before any evidence exists (0.5 prior).
pub fn laplace(success: u32, failure: u32) -> f64 {
    let total = success as f64 + failure as f64;
    clamp_probability((success as f64 + 1.0) / (total + 2.0))
}
