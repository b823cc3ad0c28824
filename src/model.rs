//! Advertising entities shared by the engines, storage and the Ads API adapter.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Amazon-assigned identifier. `0` marks an entity not yet created on the platform.
pub type ExternalId = i64;

pub const UNCREATED_ID: ExternalId = 0;

/// Serving statuses under which a target is actually delivering (or only
/// held back by budget) and may be adjusted.
pub const VALID_SERVING_STATUSES: &[&str] = &[
    "TARGETING_CLAUSE_STATUS_LIVE",
    "CAMPAIGN_OUT_OF_BUDGET",
    "ACCOUNT_OUT_OF_BUDGET",
    "PORTFOLIO_OUT_OF_BUDGET",
    "ADVERTISER_OUT_OF_BUDGET",
];

#[derive(Debug, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

macro_rules! string_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_ascii_uppercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(ParseEnumError { kind: $kind, value: s.to_string() }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityState {
    Enabled,
    Paused,
    Archived,
}

string_enum!(EntityState, "state", {
    Enabled => "ENABLED",
    Paused => "PAUSED",
    Archived => "ARCHIVED",
});

/// Keyword match types and product-targeting expression types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchType {
    Exact,
    Phrase,
    Broad,
    NegativeExact,
    NegativePhrase,
    AsinSameAs,
    AsinExpandedFrom,
    AsinCategorySameAs,
    QueryHighRelMatches,
    QueryBroadRelMatches,
    AsinSubstituteRelated,
    AsinAccessoryRelated,
}

string_enum!(MatchType, "match type", {
    Exact => "EXACT",
    Phrase => "PHRASE",
    Broad => "BROAD",
    NegativeExact => "NEGATIVE_EXACT",
    NegativePhrase => "NEGATIVE_PHRASE",
    AsinSameAs => "ASIN_SAME_AS",
    AsinExpandedFrom => "ASIN_EXPANDED_FROM",
    AsinCategorySameAs => "ASIN_CATEGORY_SAME_AS",
    QueryHighRelMatches => "QUERY_HIGH_REL_MATCHES",
    QueryBroadRelMatches => "QUERY_BROAD_REL_MATCHES",
    AsinSubstituteRelated => "ASIN_SUBSTITUTE_RELATED",
    AsinAccessoryRelated => "ASIN_ACCESSORY_RELATED",
});

impl MatchType {
    pub fn is_negative(&self) -> bool {
        matches!(self, Self::NegativeExact | Self::NegativePhrase)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeywordType {
    Positive,
    Negative,
}

string_enum!(KeywordType, "keyword type", {
    Positive => "POSITIVE",
    Negative => "NEGATIVE",
});

/// Keyword clause vs. product (ASIN/category) targeting clause.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TargetKind {
    Keyword,
    Product,
}

string_enum!(TargetKind, "target kind", {
    Keyword => "KEYWORD",
    Product => "PRODUCT",
});

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CampaignPurpose {
    Research,
    Scale,
    Discovery,
    ProductComparison,
    GeneralPlacement,
    AutoGeneralPlacement,
    Launch,
    Other,
}

string_enum!(CampaignPurpose, "campaign purpose", {
    Research => "RESEARCH",
    Scale => "SCALE",
    Discovery => "DISCOVERY",
    ProductComparison => "PRODUCT_COMPARISON",
    GeneralPlacement => "GENERAL_PLACEMENT",
    AutoGeneralPlacement => "AUTO_GENERAL_PLACEMENT",
    Launch => "LAUNCH",
    Other => "OTHER",
});

impl CampaignPurpose {
    /// Placement campaigns overlap with everything on purpose and are never deduplicated.
    pub fn allows_overlap(&self) -> bool {
        matches!(self, Self::GeneralPlacement | Self::AutoGeneralPlacement)
    }
}

/// Placement buckets with their own bid multiplier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Placement {
    TopOfSearch,
    ProductPage,
}

string_enum!(Placement, "placement", {
    TopOfSearch => "PLACEMENT_TOP",
    ProductPage => "PLACEMENT_PRODUCT_PAGE",
});

/// Ads API region; each has its own host and token endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Region {
    Na,
    Eu,
    Fe,
}

string_enum!(Region, "region", {
    Na => "NA",
    Eu => "EU",
    Fe => "FE",
});

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Local primary key.
    pub id: i64,
    /// Amazon advertising profile id, sent as the API scope.
    pub profile_id: i64,
    pub region: Region,
    pub country_code: String,
    pub daily_budget: f64,
    pub surplus_budget: f64,
    pub managed: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: i64,
    pub profile_pk: i64,
    pub asin: String,
    pub price: f64,
    pub break_even_acos: f64,
    pub reviews: Option<u32>,
    /// Books in launch are protected when the budget forces bids to the floor.
    pub launch: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: i64,
    pub external_id: ExternalId,
    pub profile_pk: i64,
    pub name: String,
    /// `0.0` means "use the book's break-even ACOS".
    pub target_acos: f64,
    pub daily_budget: f64,
    pub placement_top_pct: f64,
    pub placement_product_page_pct: f64,
    pub purpose: CampaignPurpose,
    pub managed: bool,
    pub state: EntityState,
    /// Ad group that receives graduated search terms.
    pub default_ad_group_id: Option<ExternalId>,
    /// Advertised ASINs; the first one is the campaign's primary book.
    pub asins: Vec<String>,
}

impl Campaign {
    pub fn primary_asin(&self) -> Option<&str> {
        self.asins.first().map(String::as_str)
    }

    pub fn effective_target_acos(&self, book: &Book) -> f64 {
        if self.target_acos > 0.0 {
            self.target_acos
        } else {
            book.break_even_acos
        }
    }

    pub fn placement_pct(&self, placement: Placement) -> f64 {
        match placement {
            Placement::TopOfSearch => self.placement_top_pct,
            Placement::ProductPage => self.placement_product_page_pct,
        }
    }
}

/// Only the default bid matters here: targets without their own bid inherit it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdGroup {
    pub external_id: ExternalId,
    pub campaign_id: ExternalId,
    pub default_bid: f64,
    pub state: EntityState,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub id: i64,
    pub external_id: ExternalId,
    pub profile_pk: i64,
    pub campaign_id: ExternalId,
    pub ad_group_id: ExternalId,
    pub kind: TargetKind,
    /// Keyword text, or the expression value (usually an ASIN) for product targets.
    pub text: String,
    pub match_type: MatchType,
    pub keyword_type: KeywordType,
    /// `None` inherits the ad group default bid.
    pub bid: Option<f64>,
    pub ad_group_bid: f64,
    pub state: EntityState,
    pub serving_status: String,
    pub last_updated_on_platform: i64,
}

impl Target {
    pub fn effective_bid(&self) -> f64 {
        self.bid.unwrap_or(self.ad_group_bid)
    }

    pub fn has_valid_serving_status(&self) -> bool {
        VALID_SERVING_STATUSES.contains(&self.serving_status.as_str())
    }

    pub fn normalized_text(&self) -> String {
        normalize_term(&self.text)
    }

    /// Enabled positive clause that is delivering and was not touched on the
    /// platform after `cooldown_cutoff_ms`.
    pub fn is_adjustable(&self, cooldown_cutoff_ms: i64) -> bool {
        self.state == EntityState::Enabled
            && self.keyword_type == KeywordType::Positive
            && self.has_valid_serving_status()
            && self.last_updated_on_platform <= cooldown_cutoff_ms
    }
}

/// A customer search term observed in a campaign's search-term report.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchTermKey {
    pub campaign_id: ExternalId,
    pub ad_group_id: ExternalId,
    pub term: String,
}

/// Lowercase, trim and collapse inner whitespace.
pub fn normalize_term(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Search terms that are themselves ASINs ("b0..." + 8 alphanumerics).
pub fn looks_like_asin(term: &str) -> bool {
    let t = term.trim();
    t.len() == 10
        && t.chars().all(|c| c.is_ascii_alphanumeric())
        && t[..2].eq_ignore_ascii_case("b0")
}
