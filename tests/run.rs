mod common;

use std::time::Duration;

use kdp_ads_optimizer::execution::{run_pipeline, run_profiles, PassKind, PassSettings, RunOptions};
use kdp_ads_optimizer::model::{AdGroup, CampaignPurpose, EntityState, MatchType};
use kdp_ads_optimizer::optimizer::OptimizerParams;
use kdp_ads_optimizer::storage::{profile_lock_key, AdsRepository, LocalRunLock, RunLock};

use common::*;

fn options(passes: &[PassKind]) -> RunOptions {
    RunOptions {
        passes: passes.to_vec(),
        only: Vec::new(),
        max_parallel: 2,
        lock_ttl: Duration::from_secs(60),
    }
}

#[tokio::test]
async fn one_profile_failing_or_locked_does_not_stop_the_rest() {
    let mut repo = seeded_repo(100.0);
    repo.add_profile(profile(2, 50.0)).add_profile(profile(3, 50.0));

    let mut gateway = RecordingGateway::new();
    gateway.failing_profiles = vec![3];
    let params = OptimizerParams::default();
    let settings = PassSettings::default();
    let ctx = context(&repo, &gateway, &params, &settings);

    let lock = LocalRunLock::new();
    let held = lock
        .try_acquire(&profile_lock_key(2), Duration::from_secs(60))
        .await
        .unwrap()
        .unwrap();

    let summary = run_profiles(&ctx, &lock, &options(&PassKind::ALL)).await.unwrap();
    assert_eq!(summary.completed.len(), 1);
    assert_eq!(summary.completed[0].profile_pk, 1);
    assert_eq!(summary.completed[0].passes.len(), PassKind::ALL.len());
    assert_eq!(summary.locked, vec![2]);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].0, 3);
    assert!(summary.has_failures());

    // Finished and failed runs both give their lock back.
    for pk in [1, 3] {
        let token = lock
            .try_acquire(&profile_lock_key(pk), Duration::from_secs(60))
            .await
            .unwrap();
        assert!(token.is_some(), "profile {pk} still locked");
    }
    lock.release(&profile_lock_key(2), &held).await.unwrap();
}

#[tokio::test]
async fn profile_filter_limits_the_run() {
    let mut repo = seeded_repo(100.0);
    repo.add_profile(profile(2, 50.0));

    let gateway = RecordingGateway::new();
    let params = OptimizerParams::default();
    let settings = PassSettings::default();
    let ctx = context(&repo, &gateway, &params, &settings);

    let mut opts = options(&[PassKind::Dedup]);
    opts.only = vec![2];
    let summary = run_profiles(&ctx, &LocalRunLock::new(), &opts).await.unwrap();
    assert_eq!(summary.completed.len(), 1);
    assert_eq!(summary.completed[0].profile_pk, 2);
    assert!(!summary.has_failures());
}

#[tokio::test]
async fn sync_refreshes_platform_fields_and_ad_group_bids() {
    let repo = seeded_repo(100.0);

    let mut pulled_campaign = campaign(RESEARCH_CAMPAIGN, 1, CampaignPurpose::Other, None);
    pulled_campaign.name = "Dragon Saga - renamed".into();
    pulled_campaign.daily_budget = 12.0;
    pulled_campaign.target_acos = 0.0;
    pulled_campaign.managed = false;

    let mut pulled_target = keyword(1001, 1, RESEARCH_CAMPAIGN, "dragon romance", MatchType::Exact, 0.0);
    pulled_target.bid = None;

    let mut gateway = RecordingGateway::new();
    gateway.pulled_campaigns = Some(vec![pulled_campaign]);
    gateway.pulled_ad_groups = Some(vec![AdGroup {
        external_id: RESEARCH_AD_GROUP,
        campaign_id: RESEARCH_CAMPAIGN,
        default_bid: 0.55,
        state: EntityState::Enabled,
    }]);
    gateway.pulled_targets = Some(vec![pulled_target]);

    let params = OptimizerParams::default();
    let settings = PassSettings::default();
    let ctx = context(&repo, &gateway, &params, &settings);

    let profile = repo.profile(1).await.unwrap();
    let report = run_pipeline(&ctx, profile, &[]).await.unwrap();
    assert_eq!(report.synced_campaigns, Some(1));
    assert_eq!(report.synced_ad_groups, Some(1));
    assert_eq!(report.synced_targets, Some(1));
    assert!(report.passes.is_empty());

    let campaign = repo.campaign(RESEARCH_CAMPAIGN).await.unwrap();
    assert_eq!(campaign.name, "Dragon Saga - renamed");
    assert_eq!(campaign.daily_budget, 12.0);
    assert_eq!(campaign.purpose, CampaignPurpose::Research);
    assert_eq!(campaign.target_acos, 0.4);
    assert!(campaign.managed);
    assert_eq!(campaign.default_ad_group_id, Some(RESEARCH_AD_GROUP));

    let targets = repo.targets(1).await.unwrap();
    let inherited = targets.iter().find(|t| t.external_id == 1001).unwrap();
    assert_eq!(inherited.bid, None);
    assert_eq!(inherited.effective_bid(), 0.55);
}

#[tokio::test]
async fn paper_pipeline_skips_sync() {
    let repo = seeded_repo(100.0);
    let params = OptimizerParams::default();
    let settings = PassSettings::default();
    let gateway = kdp_ads_optimizer::execution::PaperGateway;
    let ctx = context(&repo, &gateway, &params, &settings);

    let profile = repo.profile(1).await.unwrap();
    let report = run_pipeline(&ctx, profile, &[PassKind::Placements]).await.unwrap();
    assert_eq!(report.synced_campaigns, None);
    assert_eq!(report.synced_targets, None);
    assert_eq!(report.passes.len(), 1);
    assert_eq!(report.failed_mutations(), 0);
}
