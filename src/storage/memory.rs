use std::collections::{HashMap, HashSet};

use tokio::sync::RwLock;

use crate::model::{AdGroup, Book, Campaign, EntityState, ExternalId, Placement, Profile, SearchTermKey, Target};
use crate::performance::{aggregate, DailyRow, PerformanceSlice, ReportKind};
use crate::storage::repository::AdsRepository;
use crate::storage::{StorageError, StorageResult};
use crate::utils::time::DateRange;

#[derive(Default)]
struct MemoryState {
    profiles: Vec<Profile>,
    books: Vec<Book>,
    campaigns: Vec<Campaign>,
    ad_groups: Vec<AdGroup>,
    targets: Vec<Target>,
    keyword_rows: Vec<DailyRow<ExternalId>>,
    product_rows: Vec<DailyRow<ExternalId>>,
    placement_rows: Vec<DailyRow<(ExternalId, Placement)>>,
    search_term_rows: Vec<DailyRow<SearchTermKey>>,
}

/// Repository held entirely in memory. Used for dry runs against fixtures
/// and by the test suite.
#[derive(Default)]
pub struct MemoryRepository {
    state: RwLock<MemoryState>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_profile(&mut self, profile: Profile) -> &mut Self {
        self.state.get_mut().profiles.push(profile);
        self
    }

    pub fn add_book(&mut self, book: Book) -> &mut Self {
        self.state.get_mut().books.push(book);
        self
    }

    pub fn add_campaign(&mut self, campaign: Campaign) -> &mut Self {
        self.state.get_mut().campaigns.push(campaign);
        self
    }

    pub fn add_target(&mut self, target: Target) -> &mut Self {
        self.state.get_mut().targets.push(target);
        self
    }

    pub fn add_target_row(&mut self, report: ReportKind, row: DailyRow<ExternalId>) -> &mut Self {
        let state = self.state.get_mut();
        match report {
            ReportKind::ProductTarget => state.product_rows.push(row),
            _ => state.keyword_rows.push(row),
        }
        self
    }

    pub fn add_placement_row(&mut self, row: DailyRow<(ExternalId, Placement)>) -> &mut Self {
        self.state.get_mut().placement_rows.push(row);
        self
    }

    pub fn add_search_term_row(&mut self, row: DailyRow<SearchTermKey>) -> &mut Self {
        self.state.get_mut().search_term_rows.push(row);
        self
    }

    pub async fn profile(&self, id: i64) -> Option<Profile> {
        self.state.read().await.profiles.iter().find(|p| p.id == id).cloned()
    }

    pub async fn target(&self, external_id: ExternalId) -> Option<Target> {
        self.state
            .read()
            .await
            .targets
            .iter()
            .find(|t| t.external_id == external_id)
            .cloned()
    }

    pub async fn campaign(&self, external_id: ExternalId) -> Option<Campaign> {
        self.state
            .read()
            .await
            .campaigns
            .iter()
            .find(|c| c.external_id == external_id)
            .cloned()
    }
}

impl AdsRepository for MemoryRepository {
    async fn managed_profiles(&self, only: &[i64]) -> StorageResult<Vec<Profile>> {
        let state = self.state.read().await;
        Ok(state
            .profiles
            .iter()
            .filter(|p| p.managed && (only.is_empty() || only.contains(&p.id)))
            .cloned()
            .collect())
    }

    async fn books(&self, profile_pk: i64) -> StorageResult<Vec<Book>> {
        let state = self.state.read().await;
        Ok(state.books.iter().filter(|b| b.profile_pk == profile_pk).cloned().collect())
    }

    async fn campaigns(&self, profile_pk: i64) -> StorageResult<Vec<Campaign>> {
        let state = self.state.read().await;
        Ok(state
            .campaigns
            .iter()
            .filter(|c| c.profile_pk == profile_pk)
            .cloned()
            .collect())
    }

    async fn targets(&self, profile_pk: i64) -> StorageResult<Vec<Target>> {
        let state = self.state.read().await;
        Ok(state
            .targets
            .iter()
            .filter(|t| t.profile_pk == profile_pk)
            .map(|t| {
                let mut t = t.clone();
                if let Some(g) = state.ad_groups.iter().find(|g| g.external_id == t.ad_group_id) {
                    t.ad_group_bid = g.default_bid;
                }
                t
            })
            .collect())
    }

    async fn fetch_slices(
        &self,
        report: ReportKind,
        target_ids: &[ExternalId],
        range: DateRange,
        exclude: Option<DateRange>,
    ) -> StorageResult<HashMap<ExternalId, PerformanceSlice>> {
        let state = self.state.read().await;
        let rows = match report {
            ReportKind::Keyword => &state.keyword_rows,
            ReportKind::ProductTarget => &state.product_rows,
            other => return Err(StorageError::UnsupportedReport(other)),
        };
        let wanted: HashSet<ExternalId> = target_ids.iter().copied().collect();
        let selected = rows.iter().filter(|r| wanted.contains(&r.key)).cloned();
        Ok(aggregate(selected, range, exclude))
    }

    async fn placement_slices(
        &self,
        campaign_ids: &[ExternalId],
        range: DateRange,
    ) -> StorageResult<HashMap<(ExternalId, Placement), PerformanceSlice>> {
        let state = self.state.read().await;
        let selected = state
            .placement_rows
            .iter()
            .filter(|r| campaign_ids.contains(&r.key.0))
            .cloned();
        Ok(aggregate(selected, range, None))
    }

    async fn search_term_slices(
        &self,
        campaign_ids: &[ExternalId],
        range: DateRange,
    ) -> StorageResult<HashMap<SearchTermKey, PerformanceSlice>> {
        let state = self.state.read().await;
        let selected = state
            .search_term_rows
            .iter()
            .filter(|r| campaign_ids.contains(&r.key.campaign_id))
            .cloned();
        Ok(aggregate(selected, range, None))
    }

    async fn outstanding_daily_budget(&self, profile_pk: i64) -> StorageResult<f64> {
        let state = self.state.read().await;
        let budget = state
            .profiles
            .iter()
            .find(|p| p.id == profile_pk)
            .map(|p| p.daily_budget)
            .unwrap_or(0.0);
        let unmanaged: f64 = state
            .campaigns
            .iter()
            .filter(|c| c.profile_pk == profile_pk && !c.managed && c.state == EntityState::Enabled)
            .map(|c| c.daily_budget)
            .sum();
        Ok(budget - unmanaged)
    }

    async fn save_surplus_budget(&self, profile_pk: i64, surplus: f64) -> StorageResult<()> {
        let mut state = self.state.write().await;
        if let Some(p) = state.profiles.iter_mut().find(|p| p.id == profile_pk) {
            p.surplus_budget = surplus;
        }
        Ok(())
    }

    async fn upsert_campaigns(&self, campaigns: &[Campaign]) -> StorageResult<()> {
        let mut state = self.state.write().await;
        for c in campaigns {
            match state.campaigns.iter_mut().find(|e| e.external_id == c.external_id) {
                Some(existing) => {
                    existing.name = c.name.clone();
                    existing.daily_budget = c.daily_budget;
                    existing.placement_top_pct = c.placement_top_pct;
                    existing.placement_product_page_pct = c.placement_product_page_pct;
                    existing.state = c.state;
                }
                None => {
                    let mut fresh = c.clone();
                    fresh.id = state.campaigns.len() as i64 + 1;
                    state.campaigns.push(fresh);
                }
            }
        }
        Ok(())
    }

    async fn upsert_ad_groups(&self, ad_groups: &[AdGroup]) -> StorageResult<()> {
        let mut state = self.state.write().await;
        for g in ad_groups {
            match state.ad_groups.iter_mut().find(|e| e.external_id == g.external_id) {
                Some(existing) => *existing = g.clone(),
                None => state.ad_groups.push(g.clone()),
            }
        }
        Ok(())
    }

    async fn upsert_targets(&self, targets: &[Target]) -> StorageResult<()> {
        let mut state = self.state.write().await;
        for t in targets {
            match state.targets.iter_mut().find(|e| e.external_id == t.external_id) {
                Some(existing) => {
                    existing.text = t.text.clone();
                    existing.match_type = t.match_type;
                    existing.bid = t.bid;
                    existing.state = t.state;
                    existing.serving_status = t.serving_status.clone();
                    existing.last_updated_on_platform = t.last_updated_on_platform;
                }
                None => {
                    let mut fresh = t.clone();
                    fresh.id = state.targets.len() as i64 + 1;
                    state.targets.push(fresh);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CampaignPurpose, Region};
    use chrono::NaiveDate;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn row(key: ExternalId, d: u32, spend: f64) -> DailyRow<ExternalId> {
        DailyRow {
            key,
            date: date(d),
            slice: PerformanceSlice {
                spend,
                ..Default::default()
            },
        }
    }

    fn campaign(external_id: ExternalId, managed: bool, budget: f64) -> Campaign {
        Campaign {
            id: external_id,
            external_id,
            profile_pk: 1,
            name: format!("c{external_id}"),
            target_acos: 0.0,
            daily_budget: budget,
            placement_top_pct: 0.0,
            placement_product_page_pct: 0.0,
            purpose: CampaignPurpose::Research,
            managed,
            state: EntityState::Enabled,
            default_ad_group_id: None,
            asins: vec![],
        }
    }

    #[tokio::test]
    async fn slices_are_filtered_by_id_and_window() {
        let mut repo = MemoryRepository::new();
        repo.add_target_row(ReportKind::Keyword, row(1, 1, 2.0))
            .add_target_row(ReportKind::Keyword, row(1, 2, 3.0))
            .add_target_row(ReportKind::Keyword, row(1, 9, 50.0))
            .add_target_row(ReportKind::Keyword, row(2, 1, 7.0))
            .add_target_row(ReportKind::ProductTarget, row(1, 1, 11.0));

        let slices = repo
            .fetch_slices(ReportKind::Keyword, &[1], DateRange::new(date(1), date(5)), None)
            .await
            .unwrap();
        assert_eq!(slices.len(), 1);
        assert_eq!(slices[&1].spend, 5.0);

        let err = repo
            .fetch_slices(ReportKind::Placement, &[1], DateRange::new(date(1), date(5)), None)
            .await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn outstanding_budget_excludes_unmanaged_campaigns() {
        let mut repo = MemoryRepository::new();
        repo.add_profile(Profile {
            id: 1,
            profile_id: 99,
            region: Region::Na,
            country_code: "US".into(),
            daily_budget: 100.0,
            surplus_budget: 0.0,
            managed: true,
        })
        .add_campaign(campaign(10, true, 30.0))
        .add_campaign(campaign(11, false, 25.0));

        assert_eq!(repo.outstanding_daily_budget(1).await.unwrap(), 75.0);
    }

    #[tokio::test]
    async fn targets_inherit_synced_ad_group_bid() {
        let mut repo = MemoryRepository::new();
        repo.add_target(Target {
            id: 1,
            external_id: 500,
            profile_pk: 1,
            campaign_id: 10,
            ad_group_id: 20,
            kind: crate::model::TargetKind::Keyword,
            text: "space opera".into(),
            match_type: crate::model::MatchType::Exact,
            keyword_type: crate::model::KeywordType::Positive,
            bid: None,
            ad_group_bid: 0.0,
            state: EntityState::Enabled,
            serving_status: "TARGETING_CLAUSE_STATUS_LIVE".into(),
            last_updated_on_platform: 0,
        });
        repo.upsert_ad_groups(&[AdGroup {
            external_id: 20,
            campaign_id: 10,
            default_bid: 0.38,
            state: EntityState::Enabled,
        }])
        .await
        .unwrap();

        let targets = repo.targets(1).await.unwrap();
        assert_eq!(targets[0].effective_bid(), 0.38);
    }

    #[tokio::test]
    async fn upsert_keeps_locally_owned_campaign_fields() {
        let mut repo = MemoryRepository::new();
        let mut local = campaign(10, true, 30.0);
        local.purpose = CampaignPurpose::Scale;
        local.target_acos = 0.4;
        repo.add_campaign(local);

        let mut synced = campaign(10, false, 45.0);
        synced.purpose = CampaignPurpose::Other;
        synced.state = EntityState::Paused;
        repo.upsert_campaigns(&[synced, campaign(12, false, 5.0)]).await.unwrap();

        let stored = repo.campaign(10).await.unwrap();
        assert_eq!(stored.purpose, CampaignPurpose::Scale);
        assert!(stored.managed);
        assert_eq!(stored.target_acos, 0.4);
        assert_eq!(stored.daily_budget, 45.0);
        assert_eq!(stored.state, EntityState::Paused);
        assert!(repo.campaign(12).await.is_some());
    }
}
