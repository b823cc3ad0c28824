use std::cmp::Ordering;

use serde::Serialize;

use crate::{
    model::ExternalId,
    optimizer::params::BudgetParams,
    utils::math::{round_money, safe_ratio},
};

/// A bid-managed target as seen by the budget pass.
#[derive(Clone, Debug, PartialEq)]
pub struct BudgetCandidate {
    pub target_id: ExternalId,
    /// Sales over the proven lookback window; non-zero makes the target proven.
    pub trailing_sales: f64,
    pub yesterday_spend: f64,
    pub has_launch_book: bool,
    pub current_bid: f64,
}

impl BudgetCandidate {
    pub fn is_proven(&self) -> bool {
        self.trailing_sales > 0.0
    }
}

/// Replaces the engine's tentative delta so the bid lands on the global floor.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct FloorOverride {
    pub target_id: ExternalId,
    pub delta: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PoolSummary {
    pub targets: usize,
    pub budget: f64,
    pub actual_spend: f64,
    pub predicted_spend: f64,
    pub fraction_to_floor: f64,
    pub count_to_floor: usize,
    /// Predicted spend once the floored share is taken out.
    pub spend_estimate: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BudgetAllocation {
    pub outstanding_daily_budget: f64,
    pub proven_budget: f64,
    pub unproven_budget: f64,
    /// Surplus before any flooring; negative means the pools overshoot.
    pub projected_surplus: f64,
    pub surplus_budget: f64,
    pub proven: PoolSummary,
    pub unproven: PoolSummary,
    pub floors: Vec<FloorOverride>,
}

impl BudgetAllocation {
    pub fn floor_for(&self, target_id: ExternalId) -> Option<&FloorOverride> {
        self.floors.iter().find(|f| f.target_id == target_id)
    }

    pub fn flooring_triggered(&self) -> bool {
        self.projected_surplus < 0.0
    }
}

/// Nudge yesterday's spend toward the budget line.
fn predict_spend(params: &BudgetParams, actual: f64, budget: f64) -> f64 {
    if actual <= budget {
        actual * params.under_budget_factor
    } else {
        actual * params.over_budget_factor
    }
}

fn summarize(params: &BudgetParams, pool: &[&BudgetCandidate], budget: f64) -> PoolSummary {
    let actual_spend: f64 = pool.iter().map(|c| c.yesterday_spend).sum();
    let predicted_spend = predict_spend(params, actual_spend, budget);
    PoolSummary {
        targets: pool.len(),
        budget,
        actual_spend,
        predicted_spend,
        fraction_to_floor: 0.0,
        count_to_floor: 0,
        spend_estimate: predicted_spend,
    }
}

fn apply_floor_fraction(summary: &mut PoolSummary) {
    let fraction = if summary.predicted_spend > 0.0 {
        (1.0 - safe_ratio(summary.budget, summary.predicted_spend)).clamp(0.0, 1.0)
    } else {
        0.0
    };
    summary.fraction_to_floor = fraction;
    summary.count_to_floor = ((fraction * summary.targets as f64).round() as usize).min(summary.targets);
    summary.spend_estimate = summary.predicted_spend * (1.0 - fraction);
}

/// Weakest proven targets first: fewest sales, then biggest spenders.
/// Launch books go last.
fn proven_floor_order(a: &&BudgetCandidate, b: &&BudgetCandidate) -> Ordering {
    a.trailing_sales
        .total_cmp(&b.trailing_sales)
        .then(b.yesterday_spend.total_cmp(&a.yesterday_spend))
        .then(a.has_launch_book.cmp(&b.has_launch_book))
        .then(a.target_id.cmp(&b.target_id))
}

/// Biggest unproven spenders first, launch books last.
fn unproven_floor_order(a: &&BudgetCandidate, b: &&BudgetCandidate) -> Ordering {
    a.has_launch_book
        .cmp(&b.has_launch_book)
        .then(b.yesterday_spend.total_cmp(&a.yesterday_spend))
        .then(a.target_id.cmp(&b.target_id))
}

fn floors_for(
    params: &BudgetParams,
    mut pool: Vec<&BudgetCandidate>,
    count: usize,
    order: fn(&&BudgetCandidate, &&BudgetCandidate) -> Ordering,
) -> Vec<FloorOverride> {
    pool.sort_by(order);
    pool.into_iter()
        .take(count)
        .map(|c| FloorOverride {
            target_id: c.target_id,
            delta: round_money(params.min_bid - c.current_bid),
        })
        .collect()
}

/// Split the outstanding daily budget into proven and unproven pools and
/// floor enough targets to bring predicted spend back under it.
pub fn allocate(
    params: &BudgetParams,
    outstanding_daily_budget: f64,
    candidates: &[BudgetCandidate],
) -> BudgetAllocation {
    let outstanding = outstanding_daily_budget.max(0.0);
    let unproven_budget = outstanding * params.unproven_share;
    let proven_budget = outstanding - unproven_budget;

    let (proven, unproven): (Vec<&BudgetCandidate>, Vec<&BudgetCandidate>) =
        candidates.iter().partition(|c| c.is_proven());

    let mut proven_summary = summarize(params, &proven, proven_budget);
    let mut unproven_summary = summarize(params, &unproven, unproven_budget);

    let projected_surplus =
        outstanding - proven_summary.predicted_spend - unproven_summary.predicted_spend;

    let mut allocation = BudgetAllocation {
        outstanding_daily_budget: outstanding,
        proven_budget,
        unproven_budget,
        projected_surplus,
        surplus_budget: projected_surplus,
        ..Default::default()
    };

    if projected_surplus < 0.0 {
        apply_floor_fraction(&mut proven_summary);
        apply_floor_fraction(&mut unproven_summary);

        let mut floors = floors_for(params, proven, proven_summary.count_to_floor, proven_floor_order);
        floors.extend(floors_for(
            params,
            unproven,
            unproven_summary.count_to_floor,
            unproven_floor_order,
        ));
        allocation.floors = floors;
        allocation.surplus_budget = 0.0;
    }

    allocation.proven = proven_summary;
    allocation.unproven = unproven_summary;
    allocation
}
