//! Pure decision engines. Nothing in here performs I/O; the passes in
//! `execution` feed them slices and apply what they return.

pub mod bid;
pub mod budget;
pub mod dedup;
pub mod params;
pub mod placement;
pub mod search_terms;

pub use bid::{adjust_bid, BidDecision, BidReason};
pub use budget::{allocate, BudgetAllocation, BudgetCandidate, FloorOverride};
pub use dedup::{group_duplicates, resolve, DedupKey, DedupOutcome};
pub use params::{BidParams, BudgetParams, DedupParams, OptimizerParams, PlacementParams, SearchTermParams};
pub use placement::{adjust_placement, PlacementDecision};
pub use search_terms::{classify, TermAction};

use crate::performance::PerformanceSlice;

/// Quadratic response of the bid to how far ACOS is from target.
///
/// `1.0` ratio lands at ~1.22x CPC, ratio ~2.55 at 0x.
pub fn response_multiplier(acos_ratio: f64) -> f64 {
    -0.1219 * acos_ratio * acos_ratio - 0.3564 * acos_ratio + 1.703
}

/// Spend after crediting KENP royalties. When royalties exceed the spend
/// the target is treated as nearly free; an exact match nets to zero.
pub fn royalty_adjusted_spend(slice: &PerformanceSlice, nominal_spend: f64) -> f64 {
    if slice.kenp_royalties > slice.spend {
        nominal_spend
    } else {
        (slice.spend - slice.kenp_royalties).max(0.0)
    }
}

/// Spend without sales above which a target is paused.
pub fn pause_threshold(book_price: f64, multiplier: f64, ceiling: f64) -> f64 {
    (book_price * multiplier).min(ceiling)
}

/// Spend a target may burn researching before it is expected to convert.
pub fn research_spend_threshold(target_acos: f64, book_price: f64, margin: f64) -> f64 {
    target_acos * book_price * margin
}
