use anyhow::Context;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Whether mutations are sent to the Ads API or only logged.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Paper,
    Live,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub url: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    /// Overrides the regional Ads API host; used against sandboxes.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_max_retries() -> u32 {
    3
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionConfig {
    pub mode: ExecutionMode,
    #[serde(default = "default_parallel_profiles")]
    pub max_parallel_profiles: usize,
    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: u64,
}

fn default_parallel_profiles() -> usize {
    4
}

fn default_lock_ttl_secs() -> u64 {
    3_600
}

/// Bid decision tree constants. Money values are in the profile currency.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BidConfig {
    /// CPC assumed for a target that spent without recording a click.
    pub default_cpc: f64,
    pub min_bid: f64,
    pub max_bid: f64,
    /// Floor used once a target has spent its target-ACOS share of the price.
    pub conservative_min_bid: f64,
    /// Ceiling used for books with too few reviews.
    pub conservative_max_bid: f64,
    pub small_step: f64,
    pub big_step: f64,
    pub impression_threshold: u64,
    pub pause_ceiling: f64,
    pub pause_threshold_multiplier: f64,
    pub research_margin_multiplier: f64,
    pub upper_cpc_multiplier: f64,
    pub min_reviews: u32,
    /// Spend substituted when KENP royalties exceed spend.
    pub nominal_spend: f64,
    pub cooldown_hours: i64,
}

impl Default for BidConfig {
    fn default() -> Self {
        Self {
            default_cpc: 0.45,
            min_bid: 0.11,
            max_bid: 1.51,
            conservative_min_bid: 0.25,
            conservative_max_bid: 0.90,
            small_step: 0.02,
            big_step: 0.10,
            impression_threshold: 1_000,
            pause_ceiling: 20.0,
            pause_threshold_multiplier: 1.0,
            research_margin_multiplier: 1.5,
            upper_cpc_multiplier: 1.2,
            min_reviews: 20,
            nominal_spend: 0.01,
            cooldown_hours: 19,
        }
    }
}

/// Placement percentages are the "+N%" multipliers Amazon applies on top of the bid.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementConfig {
    pub min_pct: f64,
    pub max_pct: f64,
    pub conservative_min_pct: f64,
    pub conservative_max_pct: f64,
    pub small_step_pct: f64,
    pub big_step_pct: f64,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            min_pct: 0.0,
            max_pct: 900.0,
            conservative_min_pct: 10.0,
            conservative_max_pct: 150.0,
            small_step_pct: 5.0,
            big_step_pct: 20.0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Share of the outstanding daily budget reserved for targets without sales.
    pub unproven_share: f64,
    pub proven_lookback_days: i64,
    pub under_budget_factor: f64,
    pub over_budget_factor: f64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            unproven_share: 0.25,
            proven_lookback_days: 60,
            under_budget_factor: 1.1,
            over_budget_factor: 0.9,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchTermConfig {
    pub lookback_days: i64,
    pub min_orders_for_graduation: f64,
    pub royalty_graduation_multiplier: f64,
    pub graduated_bid: f64,
}

impl Default for SearchTermConfig {
    fn default() -> Self {
        Self {
            lookback_days: 30,
            min_orders_for_graduation: 2.0,
            royalty_graduation_multiplier: 1.0,
            graduated_bid: 0.45,
        }
    }
}

/// Which duplicate survives when every tied duplicate has zero sales.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ZeroSalesTieBreak {
    /// Keeps the cheapest duplicate. Older configs kept the biggest zero-sale
    /// spender; set `keep_highest_spend` to restore that.
    #[default]
    KeepLowestSpend,
    KeepHighestSpend,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub lookback_days: i64,
    pub zero_sales_tie_break: ZeroSalesTieBreak,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            lookback_days: 60,
            zero_sales_tie_break: ZeroSalesTieBreak::default(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    pub redis: RedisConfig,
    pub postgres: PostgresConfig,
    pub api: ApiConfig,
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub bids: BidConfig,
    #[serde(default)]
    pub placements: PlacementConfig,
    #[serde(default)]
    pub budget: BudgetConfig,
    #[serde(default)]
    pub search_terms: SearchTermConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
}

impl AppConfig {
    /// Load the TOML file and apply `ADS__SECTION__KEY` environment overrides.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::new(path, config::FileFormat::Toml))
            .add_source(
                config::Environment::with_prefix("ADS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("failed to load config from {path}"))?;
        let cfg: Self = settings
            .try_deserialize()
            .with_context(|| format!("failed to deserialize config at {path}"))?;
        Ok(cfg)
    }
}
