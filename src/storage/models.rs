use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::model::{
    Book, Campaign, ExternalId, ParseEnumError, Placement, Profile, SearchTermKey, Target,
};
use crate::performance::{DailyRow, PerformanceSlice};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProfileRow {
    pub id: i64,
    pub profile_id: i64,
    pub region: String,
    pub country_code: String,
    pub daily_budget: f64,
    pub surplus_budget: f64,
    pub managed: bool,
}

impl TryFrom<ProfileRow> for Profile {
    type Error = ParseEnumError;

    fn try_from(row: ProfileRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            profile_id: row.profile_id,
            region: row.region.parse()?,
            country_code: row.country_code,
            daily_budget: row.daily_budget,
            surplus_budget: row.surplus_budget,
            managed: row.managed,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BookRow {
    pub id: i64,
    pub profile_pk: i64,
    pub asin: String,
    pub price: f64,
    pub break_even_acos: f64,
    pub reviews: Option<i32>,
    pub launch: bool,
}

impl From<BookRow> for Book {
    fn from(row: BookRow) -> Self {
        Self {
            id: row.id,
            profile_pk: row.profile_pk,
            asin: row.asin,
            price: row.price,
            break_even_acos: row.break_even_acos,
            reviews: row.reviews.map(|r| r.max(0) as u32),
            launch: row.launch,
        }
    }
}

/// Campaign row with its advertised ASINs aggregated in link order.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CampaignRow {
    pub id: i64,
    pub external_id: i64,
    pub profile_pk: i64,
    pub name: String,
    pub target_acos: f64,
    pub daily_budget: f64,
    pub placement_top_pct: f64,
    pub placement_product_page_pct: f64,
    pub purpose: String,
    pub managed: bool,
    pub state: String,
    pub default_ad_group_id: Option<i64>,
    pub asins: Vec<String>,
}

impl TryFrom<CampaignRow> for Campaign {
    type Error = ParseEnumError;

    fn try_from(row: CampaignRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            external_id: row.external_id,
            profile_pk: row.profile_pk,
            name: row.name,
            target_acos: row.target_acos,
            daily_budget: row.daily_budget,
            placement_top_pct: row.placement_top_pct,
            placement_product_page_pct: row.placement_product_page_pct,
            purpose: row.purpose.parse()?,
            managed: row.managed,
            state: row.state.parse()?,
            default_ad_group_id: row.default_ad_group_id,
            asins: row.asins,
        })
    }
}

/// Keyword or product target joined with its ad group's default bid.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TargetRow {
    pub id: i64,
    pub external_id: i64,
    pub profile_pk: i64,
    pub campaign_id: i64,
    pub ad_group_id: i64,
    pub kind: String,
    pub text: String,
    pub match_type: String,
    pub keyword_type: String,
    pub bid: Option<f64>,
    pub ad_group_bid: f64,
    pub state: String,
    pub serving_status: String,
    pub last_updated_on_platform: i64,
}

impl TryFrom<TargetRow> for Target {
    type Error = ParseEnumError;

    fn try_from(row: TargetRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            external_id: row.external_id,
            profile_pk: row.profile_pk,
            campaign_id: row.campaign_id,
            ad_group_id: row.ad_group_id,
            kind: row.kind.parse()?,
            text: row.text,
            match_type: row.match_type.parse()?,
            keyword_type: row.keyword_type.parse()?,
            bid: row.bid,
            ad_group_bid: row.ad_group_bid,
            state: row.state.parse()?,
            serving_status: row.serving_status,
            last_updated_on_platform: row.last_updated_on_platform,
        })
    }
}

/// One report day for one target.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TargetPerformanceRow {
    pub target_id: i64,
    pub date: NaiveDate,
    pub sales: f64,
    pub spend: f64,
    pub kenp_royalties: f64,
    pub impressions: i64,
    pub clicks: i64,
    pub orders: i64,
}

impl From<TargetPerformanceRow> for DailyRow<ExternalId> {
    fn from(row: TargetPerformanceRow) -> Self {
        Self {
            key: row.target_id,
            date: row.date,
            slice: PerformanceSlice::from_raw(
                row.sales,
                row.spend,
                row.kenp_royalties,
                row.impressions,
                row.clicks,
                row.orders,
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlacementPerformanceRow {
    pub campaign_id: i64,
    pub placement: String,
    pub date: NaiveDate,
    pub sales: f64,
    pub spend: f64,
    pub kenp_royalties: f64,
    pub impressions: i64,
    pub clicks: i64,
    pub orders: i64,
}

impl TryFrom<PlacementPerformanceRow> for DailyRow<(ExternalId, Placement)> {
    type Error = ParseEnumError;

    fn try_from(row: PlacementPerformanceRow) -> Result<Self, Self::Error> {
        Ok(Self {
            key: (row.campaign_id, row.placement.parse()?),
            date: row.date,
            slice: PerformanceSlice::from_raw(
                row.sales,
                row.spend,
                row.kenp_royalties,
                row.impressions,
                row.clicks,
                row.orders,
            ),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SearchTermPerformanceRow {
    pub campaign_id: i64,
    pub ad_group_id: i64,
    pub search_term: String,
    pub date: NaiveDate,
    pub sales: f64,
    pub spend: f64,
    pub kenp_royalties: f64,
    pub impressions: i64,
    pub clicks: i64,
    pub orders: i64,
}

impl From<SearchTermPerformanceRow> for DailyRow<SearchTermKey> {
    fn from(row: SearchTermPerformanceRow) -> Self {
        Self {
            key: SearchTermKey {
                campaign_id: row.campaign_id,
                ad_group_id: row.ad_group_id,
                term: row.search_term,
            },
            date: row.date,
            slice: PerformanceSlice::from_raw(
                row.sales,
                row.spend,
                row.kenp_royalties,
                row.impressions,
                row.clicks,
                row.orders,
            ),
        }
    }
}
