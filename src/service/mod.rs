//! Pure business computations. Nothing in here touches the database, so
//! handlers, the offline till and the tests all share the same arithmetic.

pub mod accounting;
pub mod attendance;
pub mod cart;
pub mod export;
pub mod hr_stats;
pub mod inventory;
pub mod leave;
pub mod payroll;
pub mod pos_report;
pub mod sales;

/// Money and hours are reported to two decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `part / whole * 100`, two decimals, 0 for an empty whole.
pub fn percentage(part: f64, whole: f64) -> f64 {
    if whole == 0.0 {
        0.0
    } else {
        round2(part / whole * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(round2(1.005_1), 1.01);
        assert_eq!(round2(2.344), 2.34);
        assert_eq!(round2(-0.125_1), -0.13);
    }

    #[test]
    fn percentage_of_nothing_is_zero() {
        assert_eq!(percentage(3.0, 0.0), 0.0);
        assert_eq!(percentage(1.0, 3.0), 33.33);
    }
}
