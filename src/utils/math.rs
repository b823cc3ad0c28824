/// Round a money amount to cents.
pub fn round_money(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Ratio that yields `0.0` instead of NaN/inf on an empty denominator.
pub fn safe_ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

/// Delta that moves `current` to `proposed` after clamping into `[min, max]`.
///
/// Rounded to cents so the resulting bid is a valid platform value.
pub fn bounded_delta(current: f64, proposed: f64, min: f64, max: f64) -> f64 {
    let target = round_money(proposed.clamp(min, max));
    round_money(target - current)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_money() {
        assert!((round_money(2.449_99) - 2.45).abs() < 1e-9);
        assert!((round_money(0.844) - 0.84).abs() < 1e-9);
    }

    #[test]
    fn test_safe_ratio_zero_denominator() {
        assert_eq!(safe_ratio(5.0, 0.0), 0.0);
        assert!((safe_ratio(20.0, 50.0) - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_bounded_delta_clamps() {
        assert!((bounded_delta(0.67, 2.45, 0.11, 1.51) - 0.84).abs() < 1e-9);
        assert!((bounded_delta(0.20, 0.01, 0.11, 1.51) + 0.09).abs() < 1e-9);
    }
}
