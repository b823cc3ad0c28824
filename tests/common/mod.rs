#![allow(dead_code)]

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use kdp_ads_optimizer::execution::{
    AppliedMutation, ExecutionError, ExecutionResult, FailedMutation, Mutation, MutationGateway,
    MutationOutcome, PassContext, PassSettings,
};
use kdp_ads_optimizer::model::{
    AdGroup, Book, Campaign, CampaignPurpose, EntityState, ExternalId, KeywordType, MatchType,
    Profile, Region, Target, TargetKind,
};
use kdp_ads_optimizer::optimizer::OptimizerParams;
use kdp_ads_optimizer::performance::{DailyRow, PerformanceSlice};
use kdp_ads_optimizer::storage::MemoryRepository;

pub const BOOK_ASIN: &str = "B0DRAGON01";
pub const RESEARCH_CAMPAIGN: ExternalId = 100;
pub const RESEARCH_AD_GROUP: ExternalId = 10;
pub const SCALE_CAMPAIGN: ExternalId = 200;
pub const SCALE_AD_GROUP: ExternalId = 20;

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
}

pub fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
}

pub fn profile(id: i64, daily_budget: f64) -> Profile {
    Profile {
        id,
        profile_id: 9_000 + id,
        region: Region::Na,
        country_code: "US".into(),
        daily_budget,
        surplus_budget: 0.0,
        managed: true,
    }
}

pub fn book(profile_pk: i64) -> Book {
    Book {
        id: profile_pk,
        profile_pk,
        asin: BOOK_ASIN.into(),
        price: 20.0,
        break_even_acos: 0.4,
        reviews: Some(50),
        launch: false,
    }
}

pub fn campaign(
    external_id: ExternalId,
    profile_pk: i64,
    purpose: CampaignPurpose,
    default_ad_group_id: Option<ExternalId>,
) -> Campaign {
    Campaign {
        id: external_id,
        external_id,
        profile_pk,
        name: format!("Dragon Saga - {}", purpose.as_str()),
        target_acos: 0.4,
        daily_budget: 10.0,
        placement_top_pct: 0.0,
        placement_product_page_pct: 0.0,
        purpose,
        managed: true,
        state: EntityState::Enabled,
        default_ad_group_id,
        asins: vec![BOOK_ASIN.into()],
    }
}

pub fn keyword(
    external_id: ExternalId,
    profile_pk: i64,
    campaign_id: ExternalId,
    text: &str,
    match_type: MatchType,
    bid: f64,
) -> Target {
    let ad_group_id = if campaign_id == SCALE_CAMPAIGN {
        SCALE_AD_GROUP
    } else {
        RESEARCH_AD_GROUP
    };
    Target {
        id: external_id,
        external_id,
        profile_pk,
        campaign_id,
        ad_group_id,
        kind: TargetKind::Keyword,
        text: text.into(),
        match_type,
        keyword_type: KeywordType::Positive,
        bid: Some(bid),
        ad_group_bid: 0.3,
        state: EntityState::Enabled,
        serving_status: "TARGETING_CLAUSE_STATUS_LIVE".into(),
        last_updated_on_platform: 0,
    }
}

pub fn slice(sales: f64, spend: f64, clicks: u64, impressions: u64) -> PerformanceSlice {
    PerformanceSlice {
        sales,
        spend,
        clicks,
        impressions,
        ..Default::default()
    }
}

pub fn row<K>(key: K, date: NaiveDate, slice: PerformanceSlice) -> DailyRow<K> {
    DailyRow { key, date, slice }
}

/// Profile 1 with one book, a research campaign and a scale campaign.
pub fn seeded_repo(daily_budget: f64) -> MemoryRepository {
    let mut repo = MemoryRepository::new();
    repo.add_profile(profile(1, daily_budget))
        .add_book(book(1))
        .add_campaign(campaign(
            RESEARCH_CAMPAIGN,
            1,
            CampaignPurpose::Research,
            Some(RESEARCH_AD_GROUP),
        ))
        .add_campaign(campaign(
            SCALE_CAMPAIGN,
            1,
            CampaignPurpose::Scale,
            Some(SCALE_AD_GROUP),
        ));
    repo
}

pub fn context<'a, G>(
    repo: &'a MemoryRepository,
    gateway: &'a G,
    params: &'a OptimizerParams,
    settings: &'a PassSettings,
) -> PassContext<'a, MemoryRepository, G> {
    PassContext {
        repo,
        gateway,
        params,
        settings,
        now: now(),
    }
}

/// Live-style gateway that records what it is sent. Rejects updates for
/// chosen targets and fails whole runs for chosen profiles.
pub struct RecordingGateway {
    pub sent: Mutex<Vec<Mutation>>,
    pub reject_targets: Vec<ExternalId>,
    pub failing_profiles: Vec<i64>,
    pub pulled_campaigns: Option<Vec<Campaign>>,
    pub pulled_ad_groups: Option<Vec<AdGroup>>,
    pub pulled_targets: Option<Vec<Target>>,
    next_id: AtomicI64,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            reject_targets: Vec::new(),
            failing_profiles: Vec::new(),
            pulled_campaigns: None,
            pulled_ad_groups: None,
            pulled_targets: None,
            next_id: AtomicI64::new(5_000),
        }
    }

    pub fn sent(&self) -> Vec<Mutation> {
        self.sent.lock().unwrap().clone()
    }

    fn check_profile(&self, profile: &Profile) -> ExecutionResult<()> {
        if self.failing_profiles.contains(&profile.id) {
            return Err(ExecutionError::Other("platform unavailable".into()));
        }
        Ok(())
    }
}

impl MutationGateway for RecordingGateway {
    fn is_dry_run(&self) -> bool {
        false
    }

    async fn apply(&self, profile: &Profile, mutations: Vec<Mutation>) -> ExecutionResult<MutationOutcome> {
        self.check_profile(profile)?;
        let mut outcome = MutationOutcome::default();
        for m in mutations {
            self.sent.lock().unwrap().push(m.clone());
            let rejected = m
                .target_id()
                .map(|id| self.reject_targets.contains(&id))
                .unwrap_or(false);
            if rejected {
                outcome.failed.push(FailedMutation {
                    mutation: m,
                    message: "TARGET_NOT_FOUND".into(),
                });
                continue;
            }
            let created_id = m
                .is_create()
                .then(|| self.next_id.fetch_add(1, Ordering::Relaxed));
            outcome.applied.push(AppliedMutation { mutation: m, created_id });
        }
        Ok(outcome)
    }

    async fn pull_campaigns(&self, profile: &Profile) -> ExecutionResult<Option<Vec<Campaign>>> {
        self.check_profile(profile)?;
        Ok(self.pulled_campaigns.clone())
    }

    async fn pull_ad_groups(&self, profile: &Profile) -> ExecutionResult<Option<Vec<AdGroup>>> {
        self.check_profile(profile)?;
        Ok(self.pulled_ad_groups.clone())
    }

    async fn pull_targets(&self, profile: &Profile) -> ExecutionResult<Option<Vec<Target>>> {
        self.check_profile(profile)?;
        Ok(self.pulled_targets.clone())
    }
}
