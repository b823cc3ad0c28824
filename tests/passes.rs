mod common;

use kdp_ads_optimizer::execution::passes::{
    adjust_bids, adjust_placements, dedup_targets, graduate_search_terms,
};
use kdp_ads_optimizer::execution::{Mutation, PaperGateway, PassSettings};
use kdp_ads_optimizer::model::{
    Campaign, CampaignPurpose, EntityState, KeywordType, MatchType, Placement, SearchTermKey,
    TargetKind, UNCREATED_ID,
};
use kdp_ads_optimizer::optimizer::OptimizerParams;
use kdp_ads_optimizer::performance::ReportKind;
use kdp_ads_optimizer::storage::AdsRepository;

use common::*;

fn bid_fixture() -> kdp_ads_optimizer::storage::MemoryRepository {
    let mut repo = seeded_repo(100.0);
    repo.add_target(keyword(1001, 1, RESEARCH_CAMPAIGN, "dragon romance", MatchType::Exact, 0.67))
        .add_target(keyword(1002, 1, RESEARCH_CAMPAIGN, "dragon books", MatchType::Phrase, 0.50))
        .add_target({
            let mut recent = keyword(1003, 1, RESEARCH_CAMPAIGN, "fantasy romance", MatchType::Exact, 0.40);
            recent.last_updated_on_platform = (now() - chrono::Duration::hours(2)).timestamp_millis();
            recent
        })
        .add_target_row(ReportKind::Keyword, row(1001, day(14), slice(50.0, 20.0, 10, 400)))
        .add_target_row(ReportKind::Keyword, row(1002, day(14), slice(0.0, 25.0, 10, 500)))
        .add_target_row(ReportKind::Keyword, row(1003, day(14), slice(0.0, 30.0, 12, 700)));
    repo
}

#[tokio::test]
async fn bid_pass_raises_converting_target_and_pauses_waste() {
    let repo = bid_fixture();
    let gateway = RecordingGateway::new();
    let params = OptimizerParams::default();
    let settings = PassSettings::default();
    let ctx = context(&repo, &gateway, &params, &settings);
    let profile = repo.profile(1).await.unwrap();

    let report = adjust_bids(&ctx, &profile).await.unwrap();
    assert_eq!(report.decisions, 2);
    assert_eq!(report.applied, 2);
    assert_eq!(report.failed, 0);

    let sent = gateway.sent();
    assert!(sent.contains(&Mutation::UpdateTarget {
        target_id: 1001,
        campaign_id: RESEARCH_CAMPAIGN,
        kind: TargetKind::Keyword,
        bid: Some(1.51),
        state: None,
    }));
    assert!(sent.contains(&Mutation::UpdateTarget {
        target_id: 1002,
        campaign_id: RESEARCH_CAMPAIGN,
        kind: TargetKind::Keyword,
        bid: None,
        state: Some(EntityState::Paused),
    }));
    assert!(sent.iter().all(|m| m.target_id() != Some(1003)));

    let raised = repo.target(1001).await.unwrap();
    assert_eq!(raised.bid, Some(1.51));
    assert_eq!(raised.last_updated_on_platform, now().timestamp_millis());
    assert_eq!(repo.target(1002).await.unwrap().state, EntityState::Paused);

    // 100 outstanding - 22.0 proven - 27.5 unproven
    let surplus = repo.profile(1).await.unwrap().surplus_budget;
    assert!((surplus - 50.5).abs() < 1e-9);
}

#[tokio::test]
async fn bid_pass_floors_weakest_spenders_when_over_budget() {
    let mut repo = seeded_repo(10.0);
    let mut unmanaged = campaign(300, 1, CampaignPurpose::Other, None);
    unmanaged.managed = false;
    unmanaged.daily_budget = 4.0;
    repo.add_campaign(unmanaged);
    for (id, spend) in [(1, 2.0), (2, 2.5), (3, 1.5), (4, 2.2)] {
        repo.add_target(keyword(id, 1, RESEARCH_CAMPAIGN, &format!("term {id}"), MatchType::Broad, 0.50))
            .add_target_row(ReportKind::Keyword, row(id, day(14), slice(0.0, spend, 2, 100)));
    }

    let gateway = RecordingGateway::new();
    let params = OptimizerParams::default();
    let settings = PassSettings::default();
    let ctx = context(&repo, &gateway, &params, &settings);
    let profile = repo.profile(1).await.unwrap();

    adjust_bids(&ctx, &profile).await.unwrap();

    // Unproven pool: 1.5 budget against 7.38 predicted, so 3 of 4 go to the floor.
    for id in [2, 4, 1] {
        assert_eq!(repo.target(id).await.unwrap().bid, Some(0.11), "target {id}");
    }
    assert_eq!(repo.target(3).await.unwrap().bid, Some(0.52));
    assert_eq!(repo.profile(1).await.unwrap().surplus_budget, 0.0);
}

#[tokio::test]
async fn paper_gateway_leaves_local_state_alone() {
    let repo = bid_fixture();
    let params = OptimizerParams::default();
    let settings = PassSettings::default();
    let ctx = context(&repo, &PaperGateway, &params, &settings);
    let profile = repo.profile(1).await.unwrap();

    let report = adjust_bids(&ctx, &profile).await.unwrap();
    assert_eq!(report.applied, report.decisions);
    assert_eq!(repo.target(1001).await.unwrap().bid, Some(0.67));
    assert_eq!(repo.target(1002).await.unwrap().state, EntityState::Enabled);
}

#[tokio::test]
async fn rejected_items_do_not_roll_back_the_rest() {
    let repo = bid_fixture();
    let mut gateway = RecordingGateway::new();
    gateway.reject_targets = vec![1002];
    let params = OptimizerParams::default();
    let settings = PassSettings::default();
    let ctx = context(&repo, &gateway, &params, &settings);
    let profile = repo.profile(1).await.unwrap();

    let report = adjust_bids(&ctx, &profile).await.unwrap();
    assert_eq!(report.applied, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(repo.target(1001).await.unwrap().bid, Some(1.51));
    assert_eq!(repo.target(1002).await.unwrap().state, EntityState::Enabled);
}

#[tokio::test]
async fn campaign_without_book_is_skipped() {
    let mut repo = seeded_repo(100.0);
    let mut orphan = campaign(400, 1, CampaignPurpose::Discovery, None);
    orphan.asins = vec!["B0MISSING0".into()];
    repo.add_campaign(orphan)
        .add_target(keyword(4001, 1, 400, "orphan term", MatchType::Exact, 0.5))
        .add_target_row(ReportKind::Keyword, row(4001, day(14), slice(0.0, 50.0, 20, 900)));

    let gateway = RecordingGateway::new();
    let params = OptimizerParams::default();
    let settings = PassSettings::default();
    let ctx = context(&repo, &gateway, &params, &settings);
    let profile = repo.profile(1).await.unwrap();

    let report = adjust_bids(&ctx, &profile).await.unwrap();
    assert_eq!(report.skipped, 1);
    assert!(gateway.sent().is_empty());
}

#[tokio::test]
async fn placement_pass_updates_both_percentages() {
    let mut repo = seeded_repo(100.0);
    repo.add_placement_row(row(
        (RESEARCH_CAMPAIGN, Placement::TopOfSearch),
        day(14),
        slice(0.0, 0.0, 0, 5_000),
    ));

    let gateway = RecordingGateway::new();
    let params = OptimizerParams::default();
    let settings = PassSettings::default();
    let ctx = context(&repo, &gateway, &params, &settings);
    let profile = repo.profile(1).await.unwrap();

    adjust_placements(&ctx, &profile).await.unwrap();

    // Top of search is already at the floor with wasted reach; product
    // page has no traffic at all and gets a research step.
    let sent = gateway.sent();
    assert!(sent.contains(&Mutation::UpdatePlacements {
        campaign_id: RESEARCH_CAMPAIGN,
        top_of_search_pct: 0.0,
        product_page_pct: 5.0,
    }));
    let updated: Campaign = repo.campaign(RESEARCH_CAMPAIGN).await.unwrap();
    assert_eq!(updated.placement_product_page_pct, 5.0);
    assert_eq!(updated.purpose, CampaignPurpose::Research);
}

fn search_term_fixture() -> kdp_ads_optimizer::storage::MemoryRepository {
    let mut repo = seeded_repo(100.0);
    let term = |t: &str| SearchTermKey {
        campaign_id: RESEARCH_CAMPAIGN,
        ad_group_id: RESEARCH_AD_GROUP,
        term: t.into(),
    };
    repo.add_target(keyword(1001, 1, RESEARCH_CAMPAIGN, "dragon romance", MatchType::Exact, 0.6))
        .add_search_term_row(row(term("Dragon Romance Saga"), day(10), slice(60.0, 10.0, 8, 300)))
        .add_search_term_row(row(term("free books"), day(12), slice(0.0, 25.0, 30, 900)))
        .add_search_term_row(row(term("b0otherbk1"), day(13), slice(0.0, 30.0, 25, 600)))
        .add_search_term_row(row(term("dragon romance"), day(13), slice(80.0, 5.0, 6, 200)))
        .add_search_term_row(row(term("dragon love"), day(13), slice(10.0, 2.0, 2, 80)));
    repo
}

#[tokio::test]
async fn search_terms_graduate_into_scale_campaign_and_negate_in_place() {
    let repo = search_term_fixture();
    let gateway = RecordingGateway::new();
    let params = OptimizerParams::default();
    let settings = PassSettings::default();
    let ctx = context(&repo, &gateway, &params, &settings);
    let profile = repo.profile(1).await.unwrap();

    let report = graduate_search_terms(&ctx, &profile).await.unwrap();
    assert_eq!(report.decisions, 3);

    let sent = gateway.sent();
    assert!(sent.contains(&Mutation::CreateKeyword {
        campaign_id: SCALE_CAMPAIGN,
        ad_group_id: SCALE_AD_GROUP,
        text: "dragon romance saga".into(),
        bid: 1.25,
    }));
    assert!(sent.contains(&Mutation::CreateNegativeKeyword {
        campaign_id: RESEARCH_CAMPAIGN,
        ad_group_id: RESEARCH_AD_GROUP,
        text: "free books".into(),
    }));
    assert!(sent.contains(&Mutation::CreateNegativeProductTarget {
        campaign_id: RESEARCH_CAMPAIGN,
        ad_group_id: RESEARCH_AD_GROUP,
        asin: "b0otherbk1".into(),
    }));

    let targets = repo.targets(1).await.unwrap();
    let graduated = targets.iter().find(|t| t.text == "dragon romance saga").unwrap();
    assert_eq!(graduated.campaign_id, SCALE_CAMPAIGN);
    assert_eq!(graduated.keyword_type, KeywordType::Positive);
    assert_eq!(graduated.bid, Some(1.25));
    let negative_asin = targets.iter().find(|t| t.text == "B0OTHERBK1").unwrap();
    assert_eq!(negative_asin.kind, TargetKind::Product);
    assert_eq!(negative_asin.keyword_type, KeywordType::Negative);
}

#[tokio::test]
async fn search_term_pass_is_idempotent_once_applied() {
    let repo = search_term_fixture();
    let gateway = RecordingGateway::new();
    let params = OptimizerParams::default();
    let settings = PassSettings::default();
    let ctx = context(&repo, &gateway, &params, &settings);
    let profile = repo.profile(1).await.unwrap();

    graduate_search_terms(&ctx, &profile).await.unwrap();
    let second = graduate_search_terms(&ctx, &profile).await.unwrap();
    assert_eq!(second.decisions, 0);
}

#[tokio::test]
async fn graduation_without_scale_campaign_is_skipped() {
    let mut repo = kdp_ads_optimizer::storage::MemoryRepository::new();
    repo.add_profile(profile(1, 100.0))
        .add_book(book(1))
        .add_campaign(campaign(RESEARCH_CAMPAIGN, 1, CampaignPurpose::Research, Some(RESEARCH_AD_GROUP)))
        .add_campaign(campaign(SCALE_CAMPAIGN, 1, CampaignPurpose::Scale, None));
    repo.add_search_term_row(row(
        SearchTermKey {
            campaign_id: RESEARCH_CAMPAIGN,
            ad_group_id: RESEARCH_AD_GROUP,
            term: "dragon romance saga".into(),
        },
        day(10),
        slice(60.0, 10.0, 8, 300),
    ));

    let gateway = RecordingGateway::new();
    let params = OptimizerParams::default();
    let settings = PassSettings::default();
    let ctx = context(&repo, &gateway, &params, &settings);
    let profile = repo.profile(1).await.unwrap();

    let report = graduate_search_terms(&ctx, &profile).await.unwrap();
    assert_eq!(report.skipped, 1);
    assert!(gateway.sent().is_empty());
}

#[tokio::test]
async fn dedup_pauses_losers_and_leaves_uncreated_groups() {
    let mut repo = seeded_repo(100.0);
    repo.add_target(keyword(1001, 1, RESEARCH_CAMPAIGN, "dragon romance", MatchType::Exact, 0.6))
        .add_target(keyword(2001, 1, SCALE_CAMPAIGN, "Dragon  Romance", MatchType::Exact, 0.8))
        .add_target(keyword(1005, 1, RESEARCH_CAMPAIGN, "space opera", MatchType::Exact, 0.5))
        .add_target(keyword(UNCREATED_ID, 1, SCALE_CAMPAIGN, "space opera", MatchType::Exact, 0.5))
        .add_target_row(ReportKind::Keyword, row(1001, day(1), slice(0.0, 5.0, 4, 300)))
        .add_target_row(ReportKind::Keyword, row(2001, day(2), slice(12.0, 3.0, 3, 200)));

    let gateway = RecordingGateway::new();
    let params = OptimizerParams::default();
    let settings = PassSettings::default();
    let ctx = context(&repo, &gateway, &params, &settings);
    let profile = repo.profile(1).await.unwrap();

    let report = dedup_targets(&ctx, &profile).await.unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(
        gateway.sent(),
        vec![Mutation::UpdateTarget {
            target_id: 1001,
            campaign_id: RESEARCH_CAMPAIGN,
            kind: TargetKind::Keyword,
            bid: None,
            state: Some(EntityState::Paused),
        }]
    );
    assert_eq!(repo.target(1001).await.unwrap().state, EntityState::Paused);
    assert_eq!(repo.target(2001).await.unwrap().state, EntityState::Enabled);
    assert_eq!(repo.target(1005).await.unwrap().state, EntityState::Enabled);
}
