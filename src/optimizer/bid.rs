use serde::Serialize;
use tracing::warn;

use crate::{
    optimizer::{
        params::BidParams, pause_threshold, research_spend_threshold, response_multiplier,
        royalty_adjusted_spend,
    },
    performance::PerformanceSlice,
    utils::math::{bounded_delta, round_money},
};

/// Which branch of the decision tree produced a decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BidReason {
    /// Spent past the pause threshold without a sale.
    Pause,
    /// No spend and little reach: bid up to find traffic.
    ResearchRaise,
    /// No spend despite plenty of impressions: trim wasted reach.
    ReachTrim,
    /// Spent past the research budget without a sale.
    PhantomAcosCut,
    /// Clicked, no sale yet, still inside the research budget.
    ResearchStep,
    /// Converting: bid follows the ACOS response curve.
    AcosCurve,
    /// Sales recorded against zero spend, or no usable target ACOS.
    InvalidInput,
    Hold,
}

/// Outcome for one target. `delta` is in money and already bounded.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct BidDecision {
    pub delta: f64,
    pub pause: bool,
    pub reason: BidReason,
    pub min_bid: f64,
    pub max_bid: f64,
}

impl BidDecision {
    fn hold(reason: BidReason, min_bid: f64, max_bid: f64) -> Self {
        Self {
            delta: 0.0,
            pause: false,
            reason,
            min_bid,
            max_bid,
        }
    }

    fn change(delta: f64, reason: BidReason, min_bid: f64, max_bid: f64) -> Self {
        Self {
            delta,
            pause: false,
            reason,
            min_bid,
            max_bid,
        }
    }

    pub fn is_noop(&self) -> bool {
        !self.pause && self.delta == 0.0
    }
}

/// Cost per click as reported. Falls back to `default_cpc` for spend
/// without clicks, and is zero when nothing was spent.
pub fn observed_cpc(slice: &PerformanceSlice, default_cpc: f64) -> f64 {
    if slice.spend == 0.0 {
        0.0
    } else if slice.clicks >= 1 {
        slice.spend / slice.clicks as f64
    } else {
        default_cpc
    }
}

/// Bid floor and ceiling for one target.
///
/// The floor rises once the target has spent its target-ACOS share of the
/// price; the ceiling tightens for books with too few reviews.
pub fn bid_bounds(
    params: &BidParams,
    raw_spend: f64,
    target_acos: f64,
    book_price: f64,
    reviews: Option<u32>,
) -> (f64, f64) {
    let mut min_bid = params.min_bid;
    let mut max_bid = params.max_bid;
    if raw_spend >= book_price * target_acos {
        min_bid = params.conservative_min_bid;
    }
    if reviews.map(|r| r < params.min_reviews).unwrap_or(false) {
        max_bid = params.conservative_max_bid;
    }
    (min_bid, max_bid.max(min_bid))
}

/// Decide the bid change for one target from the previous day's slice.
pub fn adjust_bid(
    params: &BidParams,
    slice: &PerformanceSlice,
    current_bid: f64,
    target_acos: f64,
    book_price: f64,
    reviews: Option<u32>,
) -> BidDecision {
    let cpc = observed_cpc(slice, params.default_cpc);
    let (min_bid, max_bid) = bid_bounds(params, slice.spend, target_acos, book_price, reviews);

    if target_acos <= 0.0 || book_price <= 0.0 {
        warn!(
            target: "optimizer",
            target_acos,
            book_price,
            "no usable target ACOS or book price; holding bid"
        );
        return BidDecision::hold(BidReason::InvalidInput, min_bid, max_bid);
    }

    let spend = royalty_adjusted_spend(slice, params.nominal_spend);
    // A target that was never charged has no CPC of its own; price off its bid.
    let base_cpc = if cpc > 0.0 { cpc } else { current_bid };

    if slice.sales == 0.0 {
        let threshold = pause_threshold(
            book_price,
            params.pause_threshold_multiplier,
            params.pause_ceiling,
        );
        if spend > threshold {
            return BidDecision {
                delta: 0.0,
                pause: true,
                reason: BidReason::Pause,
                min_bid,
                max_bid,
            };
        }

        if spend == 0.0 {
            return no_spend_step(params, slice, current_bid, min_bid, max_bid);
        }

        let research_threshold =
            research_spend_threshold(target_acos, book_price, params.research_margin_multiplier);

        if spend > research_threshold && current_bid > min_bid {
            let phantom_acos = spend / book_price;
            let goal = base_cpc / (phantom_acos / target_acos);
            let mut delta = round_money(goal - current_bid);
            if delta >= 0.0 {
                delta = -2.0 * params.big_step;
            }
            let delta = bounded_delta(current_bid, current_bid + delta, min_bid, max_bid);
            return BidDecision::change(delta, BidReason::PhantomAcosCut, min_bid, max_bid);
        }

        if spend < research_threshold
            && current_bid < params.upper_cpc_multiplier * base_cpc
            && current_bid < max_bid
        {
            let delta =
                bounded_delta(current_bid, current_bid + params.small_step, min_bid, max_bid);
            return BidDecision::change(delta, BidReason::ResearchStep, min_bid, max_bid);
        }

        return BidDecision::hold(BidReason::Hold, min_bid, max_bid);
    }

    let acos = spend / slice.sales;
    if acos == 0.0 {
        warn!(
            target: "optimizer",
            sales = slice.sales,
            spend = slice.spend,
            "sales recorded against zero spend; holding bid"
        );
        return BidDecision::hold(BidReason::InvalidInput, min_bid, max_bid);
    }

    let acos_ratio = acos / target_acos;
    let multiplier = response_multiplier(acos_ratio);
    let delta = bounded_delta(current_bid, multiplier * base_cpc, min_bid, max_bid);
    BidDecision::change(delta, BidReason::AcosCurve, min_bid, max_bid)
}

fn no_spend_step(
    params: &BidParams,
    slice: &PerformanceSlice,
    current_bid: f64,
    min_bid: f64,
    max_bid: f64,
) -> BidDecision {
    if slice.impressions < params.impression_threshold {
        if current_bid >= max_bid {
            return BidDecision::hold(BidReason::Hold, min_bid, max_bid);
        }
        let delta = bounded_delta(current_bid, current_bid + params.small_step, min_bid, max_bid);
        BidDecision::change(delta, BidReason::ResearchRaise, min_bid, max_bid)
    } else if slice.impressions > params.impression_threshold && current_bid > min_bid {
        let delta = bounded_delta(current_bid, current_bid - params.small_step, min_bid, max_bid);
        BidDecision::change(delta, BidReason::ReachTrim, min_bid, max_bid)
    } else {
        BidDecision::hold(BidReason::Hold, min_bid, max_bid)
    }
}
