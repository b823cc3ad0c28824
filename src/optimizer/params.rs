use crate::types::{
    AppConfig, BidConfig, BudgetConfig, DedupConfig, PlacementConfig, SearchTermConfig,
    ZeroSalesTieBreak,
};

/// Bid decision tree constants, derived from `[bids]`.
#[derive(Clone, Debug)]
pub struct BidParams {
    pub default_cpc: f64,
    pub min_bid: f64,
    pub max_bid: f64,
    pub conservative_min_bid: f64,
    pub conservative_max_bid: f64,
    pub small_step: f64,
    pub big_step: f64,
    pub impression_threshold: u64,
    pub pause_ceiling: f64,
    pub pause_threshold_multiplier: f64,
    pub research_margin_multiplier: f64,
    pub upper_cpc_multiplier: f64,
    pub min_reviews: u32,
    pub nominal_spend: f64,
}

impl From<&BidConfig> for BidParams {
    fn from(cfg: &BidConfig) -> Self {
        Self {
            default_cpc: cfg.default_cpc,
            min_bid: cfg.min_bid,
            max_bid: cfg.max_bid,
            conservative_min_bid: cfg.conservative_min_bid,
            conservative_max_bid: cfg.conservative_max_bid,
            small_step: cfg.small_step,
            big_step: cfg.big_step,
            impression_threshold: cfg.impression_threshold,
            pause_ceiling: cfg.pause_ceiling,
            pause_threshold_multiplier: cfg.pause_threshold_multiplier,
            research_margin_multiplier: cfg.research_margin_multiplier,
            upper_cpc_multiplier: cfg.upper_cpc_multiplier,
            min_reviews: cfg.min_reviews,
            nominal_spend: cfg.nominal_spend,
        }
    }
}

/// Placement adjuster constants. Thresholds are shared with the bid tree,
/// bounds and steps are in percentage points.
#[derive(Clone, Debug)]
pub struct PlacementParams {
    pub min_pct: f64,
    pub max_pct: f64,
    pub conservative_min_pct: f64,
    pub conservative_max_pct: f64,
    pub small_step_pct: f64,
    pub big_step_pct: f64,
    pub impression_threshold: u64,
    pub pause_ceiling: f64,
    pub pause_threshold_multiplier: f64,
    pub research_margin_multiplier: f64,
    pub upper_cpc_multiplier: f64,
    pub min_reviews: u32,
    pub nominal_spend: f64,
}

impl PlacementParams {
    pub fn new(bids: &BidConfig, placements: &PlacementConfig) -> Self {
        Self {
            min_pct: placements.min_pct,
            max_pct: placements.max_pct,
            conservative_min_pct: placements.conservative_min_pct,
            conservative_max_pct: placements.conservative_max_pct,
            small_step_pct: placements.small_step_pct,
            big_step_pct: placements.big_step_pct,
            impression_threshold: bids.impression_threshold,
            pause_ceiling: bids.pause_ceiling,
            pause_threshold_multiplier: bids.pause_threshold_multiplier,
            research_margin_multiplier: bids.research_margin_multiplier,
            upper_cpc_multiplier: bids.upper_cpc_multiplier,
            min_reviews: bids.min_reviews,
            nominal_spend: bids.nominal_spend,
        }
    }
}

#[derive(Clone, Debug)]
pub struct BudgetParams {
    pub unproven_share: f64,
    pub under_budget_factor: f64,
    pub over_budget_factor: f64,
    pub min_bid: f64,
}

impl BudgetParams {
    pub fn new(budget: &BudgetConfig, bids: &BidConfig) -> Self {
        Self {
            unproven_share: budget.unproven_share.clamp(0.0, 1.0),
            under_budget_factor: budget.under_budget_factor,
            over_budget_factor: budget.over_budget_factor,
            min_bid: bids.min_bid,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SearchTermParams {
    pub min_orders_for_graduation: f64,
    pub royalty_graduation_multiplier: f64,
}

impl From<&SearchTermConfig> for SearchTermParams {
    fn from(cfg: &SearchTermConfig) -> Self {
        Self {
            min_orders_for_graduation: cfg.min_orders_for_graduation,
            royalty_graduation_multiplier: cfg.royalty_graduation_multiplier,
        }
    }
}

#[derive(Clone, Debug)]
pub struct DedupParams {
    pub zero_sales_tie_break: ZeroSalesTieBreak,
}

impl From<&DedupConfig> for DedupParams {
    fn from(cfg: &DedupConfig) -> Self {
        Self {
            zero_sales_tie_break: cfg.zero_sales_tie_break,
        }
    }
}

/// Every engine's parameters, built once per run from the loaded config.
#[derive(Clone, Debug)]
pub struct OptimizerParams {
    pub bids: BidParams,
    pub placements: PlacementParams,
    pub budget: BudgetParams,
    pub search_terms: SearchTermParams,
    pub dedup: DedupParams,
}

impl From<&AppConfig> for OptimizerParams {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            bids: BidParams::from(&cfg.bids),
            placements: PlacementParams::new(&cfg.bids, &cfg.placements),
            budget: BudgetParams::new(&cfg.budget, &cfg.bids),
            search_terms: SearchTermParams::from(&cfg.search_terms),
            dedup: DedupParams::from(&cfg.dedup),
        }
    }
}

impl Default for OptimizerParams {
    fn default() -> Self {
        let bids = BidConfig::default();
        let placements = PlacementConfig::default();
        Self {
            bids: BidParams::from(&bids),
            placements: PlacementParams::new(&bids, &placements),
            budget: BudgetParams::new(&BudgetConfig::default(), &bids),
            search_terms: SearchTermParams::from(&SearchTermConfig::default()),
            dedup: DedupParams::from(&DedupConfig::default()),
        }
    }
}
