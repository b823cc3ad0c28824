use std::collections::HashMap;

use sqlx::{query, query_as, query_scalar};

use crate::model::{AdGroup, Book, Campaign, ExternalId, Placement, Profile, SearchTermKey, Target};
use crate::performance::{aggregate, DailyRow, PerformanceSlice, ReportKind};
use crate::storage::models::{
    BookRow, CampaignRow, PlacementPerformanceRow, ProfileRow, SearchTermPerformanceRow,
    TargetPerformanceRow, TargetRow,
};
use crate::storage::{PgPool, StorageError, StorageResult};
use crate::utils::time::DateRange;

/// Read and write access to the local copy of the advertising account.
///
/// Slices are reduced with [`aggregate`], so every backend applies the same
/// window and blackout rules.
#[allow(async_fn_in_trait)]
pub trait AdsRepository {
    /// Managed profiles, optionally restricted to the given local ids.
    async fn managed_profiles(&self, only: &[i64]) -> StorageResult<Vec<Profile>>;

    async fn books(&self, profile_pk: i64) -> StorageResult<Vec<Book>>;

    async fn campaigns(&self, profile_pk: i64) -> StorageResult<Vec<Campaign>>;

    /// Keywords and product targets, positive and negative.
    async fn targets(&self, profile_pk: i64) -> StorageResult<Vec<Target>>;

    /// Per-target totals from the keyword or product-target report.
    async fn fetch_slices(
        &self,
        report: ReportKind,
        target_ids: &[ExternalId],
        range: DateRange,
        exclude: Option<DateRange>,
    ) -> StorageResult<HashMap<ExternalId, PerformanceSlice>>;

    async fn placement_slices(
        &self,
        campaign_ids: &[ExternalId],
        range: DateRange,
    ) -> StorageResult<HashMap<(ExternalId, Placement), PerformanceSlice>>;

    async fn search_term_slices(
        &self,
        campaign_ids: &[ExternalId],
        range: DateRange,
    ) -> StorageResult<HashMap<SearchTermKey, PerformanceSlice>>;

    /// Daily budget left for managed campaigns once unmanaged enabled
    /// campaigns have taken their share.
    async fn outstanding_daily_budget(&self, profile_pk: i64) -> StorageResult<f64>;

    async fn save_surplus_budget(&self, profile_pk: i64, surplus: f64) -> StorageResult<()>;

    /// Insert or update by external id. Locally owned fields (purpose,
    /// managed flag, target ACOS, book links) are left untouched.
    async fn upsert_campaigns(&self, campaigns: &[Campaign]) -> StorageResult<()>;

    async fn upsert_ad_groups(&self, ad_groups: &[AdGroup]) -> StorageResult<()>;

    async fn upsert_targets(&self, targets: &[Target]) -> StorageResult<()>;
}

/// Postgres-backed repository.
///
/// The expected schema is in `migrations/0001_init.sql`.
#[derive(Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const PERFORMANCE_COLUMNS: &str = "date, sales, spend, kenp_royalties, impressions, clicks, orders";

impl AdsRepository for PgRepository {
    async fn managed_profiles(&self, only: &[i64]) -> StorageResult<Vec<Profile>> {
        let rows: Vec<ProfileRow> = query_as(
            "SELECT id, profile_id, region, country_code, daily_budget, surplus_budget, managed \
             FROM profiles \
             WHERE managed AND (cardinality($1::BIGINT[]) = 0 OR id = ANY($1)) \
             ORDER BY id",
        )
        .bind(only)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| Profile::try_from(r).map_err(StorageError::from))
            .collect()
    }

    async fn books(&self, profile_pk: i64) -> StorageResult<Vec<Book>> {
        let rows: Vec<BookRow> = query_as(
            "SELECT id, profile_pk, asin, price, break_even_acos, reviews, launch \
             FROM books WHERE profile_pk = $1 ORDER BY id",
        )
        .bind(profile_pk)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Book::from).collect())
    }

    async fn campaigns(&self, profile_pk: i64) -> StorageResult<Vec<Campaign>> {
        let rows: Vec<CampaignRow> = query_as(
            "SELECT c.id, c.external_id, c.profile_pk, c.name, c.target_acos, c.daily_budget, \
                    c.placement_top_pct, c.placement_product_page_pct, c.purpose, c.managed, \
                    c.state, c.default_ad_group_id, \
                    COALESCE(ARRAY_AGG(b.asin ORDER BY cb.position) \
                             FILTER (WHERE b.asin IS NOT NULL), '{}') AS asins \
             FROM campaigns c \
             LEFT JOIN campaign_books cb ON cb.campaign_id = c.id \
             LEFT JOIN books b ON b.id = cb.book_id \
             WHERE c.profile_pk = $1 \
             GROUP BY c.id \
             ORDER BY c.id",
        )
        .bind(profile_pk)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| Campaign::try_from(r).map_err(StorageError::from))
            .collect()
    }

    async fn targets(&self, profile_pk: i64) -> StorageResult<Vec<Target>> {
        let rows: Vec<TargetRow> = query_as(
            "SELECT t.id, t.external_id, t.profile_pk, t.campaign_id, t.ad_group_id, t.kind, \
                    t.text, t.match_type, t.keyword_type, t.bid, \
                    COALESCE(ag.default_bid, 0.0) AS ad_group_bid, \
                    t.state, t.serving_status, t.last_updated_on_platform \
             FROM targets t \
             LEFT JOIN ad_groups ag ON ag.external_id = t.ad_group_id \
             WHERE t.profile_pk = $1 \
             ORDER BY t.id",
        )
        .bind(profile_pk)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| Target::try_from(r).map_err(StorageError::from))
            .collect()
    }

    async fn fetch_slices(
        &self,
        report: ReportKind,
        target_ids: &[ExternalId],
        range: DateRange,
        exclude: Option<DateRange>,
    ) -> StorageResult<HashMap<ExternalId, PerformanceSlice>> {
        let table = match report {
            ReportKind::Keyword => "keyword_performance",
            ReportKind::ProductTarget => "product_target_performance",
            other => return Err(StorageError::UnsupportedReport(other)),
        };
        if target_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let sql = format!(
            "SELECT target_id, {PERFORMANCE_COLUMNS} FROM {table} \
             WHERE target_id = ANY($1) AND date BETWEEN $2 AND $3"
        );
        let rows: Vec<TargetPerformanceRow> = query_as(&sql)
            .bind(target_ids)
            .bind(range.from)
            .bind(range.to)
            .fetch_all(&self.pool)
            .await?;

        Ok(aggregate(rows.into_iter().map(DailyRow::from), range, exclude))
    }

    async fn placement_slices(
        &self,
        campaign_ids: &[ExternalId],
        range: DateRange,
    ) -> StorageResult<HashMap<(ExternalId, Placement), PerformanceSlice>> {
        if campaign_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let sql = format!(
            "SELECT campaign_id, placement, {PERFORMANCE_COLUMNS} FROM placement_performance \
             WHERE campaign_id = ANY($1) AND date BETWEEN $2 AND $3"
        );
        let rows: Vec<PlacementPerformanceRow> = query_as(&sql)
            .bind(campaign_ids)
            .bind(range.from)
            .bind(range.to)
            .fetch_all(&self.pool)
            .await?;

        let mut daily = Vec::with_capacity(rows.len());
        for row in rows {
            // Amazon also reports "Other on-Amazon"; it carries no multiplier.
            if let Ok(r) = DailyRow::try_from(row) {
                daily.push(r);
            }
        }
        Ok(aggregate(daily, range, None))
    }

    async fn search_term_slices(
        &self,
        campaign_ids: &[ExternalId],
        range: DateRange,
    ) -> StorageResult<HashMap<SearchTermKey, PerformanceSlice>> {
        if campaign_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let sql = format!(
            "SELECT campaign_id, ad_group_id, search_term, {PERFORMANCE_COLUMNS} \
             FROM search_term_performance \
             WHERE campaign_id = ANY($1) AND date BETWEEN $2 AND $3"
        );
        let rows: Vec<SearchTermPerformanceRow> = query_as(&sql)
            .bind(campaign_ids)
            .bind(range.from)
            .bind(range.to)
            .fetch_all(&self.pool)
            .await?;

        Ok(aggregate(rows.into_iter().map(DailyRow::from), range, None))
    }

    async fn outstanding_daily_budget(&self, profile_pk: i64) -> StorageResult<f64> {
        let budget: f64 = query_scalar(
            "SELECT p.daily_budget - COALESCE(( \
                 SELECT SUM(c.daily_budget) FROM campaigns c \
                 WHERE c.profile_pk = p.id AND c.state = 'ENABLED' AND NOT c.managed \
             ), 0.0) \
             FROM profiles p WHERE p.id = $1",
        )
        .bind(profile_pk)
        .fetch_one(&self.pool)
        .await?;
        Ok(budget)
    }

    async fn save_surplus_budget(&self, profile_pk: i64, surplus: f64) -> StorageResult<()> {
        query("UPDATE profiles SET surplus_budget = $2 WHERE id = $1")
            .bind(profile_pk)
            .bind(surplus)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn upsert_campaigns(&self, campaigns: &[Campaign]) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;
        for c in campaigns {
            query(
                "INSERT INTO campaigns \
                 (external_id, profile_pk, name, target_acos, daily_budget, placement_top_pct, \
                  placement_product_page_pct, purpose, managed, state, default_ad_group_id) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
                 ON CONFLICT (external_id) DO UPDATE SET \
                   name = EXCLUDED.name, \
                   daily_budget = EXCLUDED.daily_budget, \
                   placement_top_pct = EXCLUDED.placement_top_pct, \
                   placement_product_page_pct = EXCLUDED.placement_product_page_pct, \
                   state = EXCLUDED.state",
            )
            .bind(c.external_id)
            .bind(c.profile_pk)
            .bind(&c.name)
            .bind(c.target_acos)
            .bind(c.daily_budget)
            .bind(c.placement_top_pct)
            .bind(c.placement_product_page_pct)
            .bind(c.purpose.as_str())
            .bind(c.managed)
            .bind(c.state.as_str())
            .bind(c.default_ad_group_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn upsert_ad_groups(&self, ad_groups: &[AdGroup]) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;
        for g in ad_groups {
            query(
                "INSERT INTO ad_groups (external_id, campaign_id, default_bid, state) \
                 VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (external_id) DO UPDATE SET \
                   default_bid = EXCLUDED.default_bid, \
                   state = EXCLUDED.state",
            )
            .bind(g.external_id)
            .bind(g.campaign_id)
            .bind(g.default_bid)
            .bind(g.state.as_str())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn upsert_targets(&self, targets: &[Target]) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;
        for t in targets {
            query(
                "INSERT INTO targets \
                 (external_id, profile_pk, campaign_id, ad_group_id, kind, text, match_type, \
                  keyword_type, bid, state, serving_status, last_updated_on_platform) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
                 ON CONFLICT (external_id) DO UPDATE SET \
                   text = EXCLUDED.text, \
                   match_type = EXCLUDED.match_type, \
                   bid = EXCLUDED.bid, \
                   state = EXCLUDED.state, \
                   serving_status = EXCLUDED.serving_status, \
                   last_updated_on_platform = EXCLUDED.last_updated_on_platform",
            )
            .bind(t.external_id)
            .bind(t.profile_pk)
            .bind(t.campaign_id)
            .bind(t.ad_group_id)
            .bind(t.kind.as_str())
            .bind(&t.text)
            .bind(t.match_type.as_str())
            .bind(t.keyword_type.as_str())
            .bind(t.bid)
            .bind(t.state.as_str())
            .bind(&t.serving_status)
            .bind(t.last_updated_on_platform)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
