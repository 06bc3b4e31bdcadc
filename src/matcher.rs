//! Resolution of a month count to the closest backend plan.

use crate::model::Plan;

/// Days assumed per month when comparing against `durationDays`.
pub const DAYS_PER_MONTH: i64 = 30;

/// Find the plan whose duration is closest to `months * 30` days.
///
/// Returns `None` for an empty slice or a non-positive month count. When two
/// plans are equally close the one that appears first in `plans` wins, so the
/// result depends on the order the backend returned them in.
pub fn match_by_months(plans: &[Plan], months: i64) -> Option<&Plan> {
    if months <= 0 {
        return None;
    }
    let expected_days = months.saturating_mul(DAYS_PER_MONTH);

    // `min_by_key` keeps the first of several equal minima.
    plans
        .iter()
        .min_by_key(|plan| plan.duration_days.abs_diff(expected_days))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog(days: &[i64]) -> Vec<Plan> {
        days.iter()
            .enumerate()
            .map(|(i, d)| Plan::new(i as i64 + 1, *d))
            .collect()
    }

    #[test]
    fn test_empty_catalog_never_matches() {
        for months in [-12, -1, 0, 1, 3, 12, i64::MAX] {
            assert!(match_by_months(&[], months).is_none());
        }
    }

    #[test]
    fn test_exact_match() {
        let plans = catalog(&[30, 90, 365]);
        let plan = match_by_months(&plans, 3).unwrap();
        assert_eq!(plan.duration_days, 90);
        assert_eq!(plan.plan_id, 2);
    }

    #[test]
    fn test_tie_prefers_first() {
        let plans = catalog(&[29, 31]);
        let plan = match_by_months(&plans, 1).unwrap();
        assert_eq!(plan.duration_days, 29);

        let reversed = catalog(&[31, 29]);
        assert_eq!(match_by_months(&reversed, 1).unwrap().duration_days, 31);
    }

    #[test]
    fn test_year_prefers_360_over_30() {
        let plans = catalog(&[30, 360]);
        assert_eq!(match_by_months(&plans, 12).unwrap().duration_days, 360);
    }

    #[test]
    fn test_non_positive_months() {
        let plans = catalog(&[30, 90]);
        assert!(match_by_months(&plans, 0).is_none());
        assert!(match_by_months(&plans, -3).is_none());
    }

    #[test]
    fn test_deterministic_reference() {
        let plans = catalog(&[30, 90, 180, 365]);
        let first = match_by_months(&plans, 6).unwrap();
        let second = match_by_months(&plans, 6).unwrap();
        assert!(std::ptr::eq(first, second));
        assert_eq!(first.duration_days, 180);
    }

    #[test]
    fn test_far_from_every_plan_still_matches_nearest() {
        let plans = catalog(&[30, 90]);
        assert_eq!(match_by_months(&plans, 24).unwrap().duration_days, 90);
    }
}
