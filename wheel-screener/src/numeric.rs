//! Small numeric helpers shared by the scoring modules.

use std::cmp::Ordering;

/// Round to `decimals` places, half away from zero.
pub fn round_dp(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Descending comparison for scores, NaN-tolerant.
pub fn desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_dp() {
        assert_eq!(round_dp(33.333, 1), 33.3);
        assert_eq!(round_dp(-1.26, 1), -1.3);
        assert_eq!(round_dp(50.0, 1), 50.0);
    }

    #[test]
    fn test_desc_orders_high_first() {
        let mut scores = vec![1.0, 3.0, 2.0];
        scores.sort_by(|a, b| desc(*a, *b));
        assert_eq!(scores, vec![3.0, 2.0, 1.0]);
    }
}
