use serde::Serialize;
use tracing::warn;

use crate::{
    optimizer::{
        bid::BidReason, params::PlacementParams, pause_threshold, research_spend_threshold,
        response_multiplier, royalty_adjusted_spend,
    },
    performance::PerformanceSlice,
};

/// Outcome for one campaign placement. Percentages are whole points.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PlacementDecision {
    pub new_pct: f64,
    pub delta_pct: f64,
    pub reason: BidReason,
}

impl PlacementDecision {
    fn to(current_pct: f64, proposed: f64, min: f64, max: f64, reason: BidReason) -> Self {
        let new_pct = proposed.clamp(min, max).round();
        Self {
            new_pct,
            delta_pct: new_pct - current_pct,
            reason,
        }
    }

    fn hold(current_pct: f64, reason: BidReason) -> Self {
        Self {
            new_pct: current_pct,
            delta_pct: 0.0,
            reason,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.delta_pct == 0.0
    }
}

fn pct_bounds(
    params: &PlacementParams,
    raw_spend: f64,
    target_acos: f64,
    book_price: f64,
    reviews: Option<u32>,
) -> (f64, f64) {
    let mut min_pct = params.min_pct;
    let mut max_pct = params.max_pct;
    if raw_spend >= book_price * target_acos {
        min_pct = params.conservative_min_pct;
    }
    if reviews.map(|r| r < params.min_reviews).unwrap_or(false) {
        max_pct = params.conservative_max_pct;
    }
    (min_pct, max_pct.max(min_pct))
}

/// Decide a placement multiplier change from the campaign's aggregated
/// slice for that placement.
///
/// Follows the bid tree, but scales the effective bid factor
/// `1 + pct/100` instead of a raw bid. A "pause" drops the placement to its
/// floor since placements cannot be paused on their own.
pub fn adjust_placement(
    params: &PlacementParams,
    slice: &PerformanceSlice,
    current_pct: f64,
    target_acos: f64,
    book_price: f64,
    reviews: Option<u32>,
) -> PlacementDecision {
    if target_acos <= 0.0 || book_price <= 0.0 {
        warn!(
            target: "optimizer",
            target_acos,
            book_price,
            "no usable target ACOS or book price; holding placement"
        );
        return PlacementDecision::hold(current_pct, BidReason::InvalidInput);
    }

    let (min_pct, max_pct) = pct_bounds(params, slice.spend, target_acos, book_price, reviews);
    let spend = royalty_adjusted_spend(slice, params.nominal_spend);
    let factor = 1.0 + current_pct / 100.0;

    if slice.sales == 0.0 {
        let threshold = pause_threshold(
            book_price,
            params.pause_threshold_multiplier,
            params.pause_ceiling,
        );
        if spend > threshold {
            return PlacementDecision::to(current_pct, min_pct, min_pct, max_pct, BidReason::Pause);
        }

        if slice.clicks == 0 {
            if slice.impressions < params.impression_threshold && current_pct < max_pct {
                return PlacementDecision::to(
                    current_pct,
                    current_pct + params.small_step_pct,
                    min_pct,
                    max_pct,
                    BidReason::ResearchRaise,
                );
            }
            if slice.impressions > params.impression_threshold && current_pct > min_pct {
                return PlacementDecision::to(
                    current_pct,
                    current_pct - params.small_step_pct,
                    min_pct,
                    max_pct,
                    BidReason::ReachTrim,
                );
            }
            return PlacementDecision::hold(current_pct, BidReason::Hold);
        }

        let research_threshold =
            research_spend_threshold(target_acos, book_price, params.research_margin_multiplier);

        if spend > research_threshold && current_pct > min_pct {
            let phantom_acos = spend / book_price;
            let goal_factor = factor / (phantom_acos / target_acos);
            let mut delta = (goal_factor - 1.0) * 100.0 - current_pct;
            if delta >= 0.0 {
                delta = -2.0 * params.big_step_pct;
            }
            return PlacementDecision::to(
                current_pct,
                current_pct + delta,
                min_pct,
                max_pct,
                BidReason::PhantomAcosCut,
            );
        }

        // The observed CPC was paid at the current factor.
        let cpc_factor = factor;
        if spend < research_threshold
            && current_pct < max_pct
            && factor < params.upper_cpc_multiplier * cpc_factor
        {
            return PlacementDecision::to(
                current_pct,
                current_pct + params.small_step_pct,
                min_pct,
                max_pct,
                BidReason::ResearchStep,
            );
        }

        return PlacementDecision::hold(current_pct, BidReason::Hold);
    }

    let acos = spend / slice.sales;
    if acos == 0.0 {
        warn!(
            target: "optimizer",
            sales = slice.sales,
            spend = slice.spend,
            "placement sales recorded against zero spend; holding"
        );
        return PlacementDecision::hold(current_pct, BidReason::InvalidInput);
    }

    let multiplier = response_multiplier(acos / target_acos);
    let proposed = (factor * multiplier - 1.0) * 100.0;
    PlacementDecision::to(current_pct, proposed, min_pct, max_pct, BidReason::AcosCurve)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BidConfig, PlacementConfig};

    fn params() -> PlacementParams {
        PlacementParams::new(&BidConfig::default(), &PlacementConfig::default())
    }

    fn slice(sales: f64, spend: f64, clicks: u64, impressions: u64) -> PerformanceSlice {
        PerformanceSlice {
            sales,
            spend,
            clicks,
            impressions,
            ..Default::default()
        }
    }

    #[test]
    fn profitable_placement_is_raised() {
        // acos 0.1 vs target 0.4 -> multiplier ~1.61; factor 1.5 -> ~141%
        let d = adjust_placement(&params(), &slice(40.0, 4.0, 6, 900), 50.0, 0.4, 14.99, None);
        assert_eq!(d.reason, BidReason::AcosCurve);
        assert_eq!(d.new_pct, 141.0);
    }

    #[test]
    fn unprofitable_placement_drops_to_floor() {
        let d = adjust_placement(&params(), &slice(5.0, 15.0, 20, 3_000), 120.0, 0.4, 14.99, None);
        assert!(d.delta_pct < 0.0);
        assert_eq!(d.new_pct, 10.0, "conservative floor after spending the acos share");
    }

    #[test]
    fn no_click_branch_uses_clicks_not_spend() {
        // spend recorded but no clicks attributed to the bucket: research branch
        let d = adjust_placement(&params(), &slice(0.0, 0.5, 0, 200), 20.0, 0.4, 14.99, None);
        assert_eq!(d.reason, BidReason::ResearchRaise);
        assert_eq!(d.new_pct, 25.0);
    }

    #[test]
    fn research_step_respects_cpc_ceiling() {
        let clicked = slice(0.0, 1.0, 2, 400);
        let d = adjust_placement(&params(), &clicked, 20.0, 0.4, 14.99, None);
        assert_eq!(d.reason, BidReason::ResearchStep);
        assert_eq!(d.new_pct, 25.0);

        let mut capped = params();
        capped.upper_cpc_multiplier = 1.0;
        let d = adjust_placement(&capped, &clicked, 20.0, 0.4, 14.99, None);
        assert_eq!(d.reason, BidReason::Hold);
        assert!(d.is_noop());
    }

    #[test]
    fn pause_path_resets_to_floor() {
        let d = adjust_placement(&params(), &slice(0.0, 30.0, 40, 9_000), 75.0, 0.4, 14.99, None);
        assert_eq!(d.reason, BidReason::Pause);
        assert_eq!(d.new_pct, 10.0);
    }

    #[test]
    fn few_reviews_cap_the_multiplier() {
        let d = adjust_placement(&params(), &slice(60.0, 3.0, 6, 900), 140.0, 0.4, 14.99, Some(2));
        assert!(d.new_pct <= 150.0);
    }
}
