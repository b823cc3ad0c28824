//! Per-profile passes: read the local copy, ask the engines, send the
//! resulting mutations through the gateway.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::model::{
    looks_like_asin, normalize_term, Book, Campaign, CampaignPurpose, EntityState, ExternalId,
    KeywordType, MatchType, Placement, Profile, SearchTermKey, Target, TargetKind, UNCREATED_ID,
};
use crate::monitoring::metrics::METRICS;
use crate::optimizer::bid::observed_cpc;
use crate::optimizer::search_terms::KnownTerms;
use crate::optimizer::{
    adjust_bid, adjust_placement, allocate, classify, group_duplicates, resolve, BidDecision,
    BudgetCandidate, OptimizerParams, TermAction,
};
use crate::performance::{PerformanceSlice, ReportKind};
use crate::storage::AdsRepository;
use crate::types::{AppConfig, BidConfig, BudgetConfig, DedupConfig, SearchTermConfig};
use crate::utils::math::round_money;
use crate::utils::time::{cooldown_cutoff_ms, q1_blackout, trailing_window, yesterday, DateRange};

use super::executor::{ExecutionResult, MutationGateway};
use super::mutation::{AppliedMutation, Mutation, MutationOutcome};

/// Windows and defaults the passes need beyond the engine parameters.
#[derive(Clone, Debug)]
pub struct PassSettings {
    pub cooldown_hours: i64,
    pub proven_lookback_days: i64,
    pub search_term_lookback_days: i64,
    pub dedup_lookback_days: i64,
    /// Bid for a graduated term that never recorded a click.
    pub graduated_bid: f64,
}

impl From<&AppConfig> for PassSettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            cooldown_hours: cfg.bids.cooldown_hours,
            proven_lookback_days: cfg.budget.proven_lookback_days,
            search_term_lookback_days: cfg.search_terms.lookback_days,
            dedup_lookback_days: cfg.dedup.lookback_days,
            graduated_bid: cfg.search_terms.graduated_bid,
        }
    }
}

impl Default for PassSettings {
    fn default() -> Self {
        let search_terms = SearchTermConfig::default();
        Self {
            cooldown_hours: BidConfig::default().cooldown_hours,
            proven_lookback_days: BudgetConfig::default().proven_lookback_days,
            search_term_lookback_days: search_terms.lookback_days,
            dedup_lookback_days: DedupConfig::default().lookback_days,
            graduated_bid: search_terms.graduated_bid,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PassKind {
    Bids,
    Placements,
    SearchTerms,
    Dedup,
}

impl PassKind {
    /// Every pass, in the order a full run executes them. Duplicates are
    /// paused before bids so losers are not re-priced.
    pub const ALL: [PassKind; 4] = [
        PassKind::Dedup,
        PassKind::Bids,
        PassKind::Placements,
        PassKind::SearchTerms,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PassKind::Bids => "bids",
            PassKind::Placements => "placements",
            PassKind::SearchTerms => "search_terms",
            PassKind::Dedup => "dedup",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PassReport {
    pub pass: PassKind,
    pub profile_pk: i64,
    /// Mutations the pass decided on.
    pub decisions: usize,
    pub applied: usize,
    pub failed: usize,
    /// Campaigns, terms or groups left alone for lack of data.
    pub skipped: usize,
}

impl PassReport {
    fn new(pass: PassKind, profile_pk: i64) -> Self {
        Self {
            pass,
            profile_pk,
            decisions: 0,
            applied: 0,
            failed: 0,
            skipped: 0,
        }
    }
}

/// Everything a pass reads from or writes to.
pub struct PassContext<'a, R, G> {
    pub repo: &'a R,
    pub gateway: &'a G,
    pub params: &'a OptimizerParams,
    pub settings: &'a PassSettings,
    /// Start of the run; report windows end the day before.
    pub now: DateTime<Utc>,
}

impl<'a, R: AdsRepository, G: MutationGateway> PassContext<'a, R, G> {
    fn today(&self) -> NaiveDate {
        self.now.date_naive()
    }

    pub async fn run(&self, pass: PassKind, profile: &Profile) -> ExecutionResult<PassReport> {
        match pass {
            PassKind::Bids => adjust_bids(self, profile).await,
            PassKind::Placements => adjust_placements(self, profile).await,
            PassKind::SearchTerms => graduate_search_terms(self, profile).await,
            PassKind::Dedup => dedup_targets(self, profile).await,
        }
    }
}

/// Managed, enabled campaigns with the book their primary ASIN resolves
/// to, ordered by external id. Campaigns without a book are skipped.
fn managed_scope<'c>(
    profile: &Profile,
    campaigns: &'c [Campaign],
    books: &'c [Book],
    report: &mut PassReport,
) -> Vec<(&'c Campaign, &'c Book)> {
    let mut scope = Vec::new();
    for c in campaigns
        .iter()
        .filter(|c| c.managed && c.state == EntityState::Enabled)
    {
        let book = c
            .primary_asin()
            .and_then(|asin| books.iter().find(|b| b.asin.eq_ignore_ascii_case(asin)));
        match book {
            Some(book) => scope.push((c, book)),
            None => {
                warn!(
                    target: "execution",
                    profile = profile.id,
                    campaign = c.external_id,
                    asin = ?c.primary_asin(),
                    "campaign has no resolvable book; skipping"
                );
                report.skipped += 1;
            }
        }
    }
    scope.sort_by_key(|(c, _)| c.external_id);
    scope
}

/// Keyword and product-target slices for `targets`, each from its own report.
async fn fetch_target_slices<R: AdsRepository>(
    repo: &R,
    targets: &[&Target],
    range: DateRange,
    exclude: Option<DateRange>,
) -> ExecutionResult<HashMap<ExternalId, PerformanceSlice>> {
    let ids_of = |kind: TargetKind| -> Vec<ExternalId> {
        targets
            .iter()
            .filter(|t| t.kind == kind)
            .map(|t| t.external_id)
            .collect()
    };
    let mut slices = repo
        .fetch_slices(ReportKind::Keyword, &ids_of(TargetKind::Keyword), range, exclude)
        .await?;
    slices.extend(
        repo.fetch_slices(ReportKind::ProductTarget, &ids_of(TargetKind::Product), range, exclude)
            .await?,
    );
    Ok(slices)
}

async fn apply_and_record<R, G: MutationGateway>(
    ctx: &PassContext<'_, R, G>,
    profile: &Profile,
    mutations: Vec<Mutation>,
    report: &mut PassReport,
) -> ExecutionResult<MutationOutcome> {
    report.decisions += mutations.len();
    if mutations.is_empty() {
        return Ok(MutationOutcome::default());
    }

    let outcome = ctx.gateway.apply(profile, mutations).await?;
    for failed in &outcome.failed {
        warn!(
            target: "execution",
            profile = profile.id,
            campaign = failed.mutation.campaign_id(),
            target_id = ?failed.mutation.target_id(),
            entity = failed.mutation.entity().name,
            error = %failed.message,
            "mutation failed"
        );
    }
    METRICS.record_mutations(profile.id, outcome.applied.len(), outcome.failed.len());
    report.applied += outcome.applied.len();
    report.failed += outcome.failed.len();

    info!(
        target: "execution",
        profile = profile.id,
        pass = report.pass.as_str(),
        applied = outcome.applied.len(),
        failed = outcome.failed.len(),
        failed_requests = outcome.failed_requests,
        "mutations sent"
    );
    Ok(outcome)
}

/// Mirror applied bid and state updates into the local copy. Dry runs
/// leave it untouched.
async fn write_back_updates<R: AdsRepository, G: MutationGateway>(
    ctx: &PassContext<'_, R, G>,
    targets: &[Target],
    outcome: &MutationOutcome,
) -> ExecutionResult<()> {
    if ctx.gateway.is_dry_run() {
        return Ok(());
    }
    let touched_ms = ctx.now.timestamp_millis();
    let by_id: HashMap<ExternalId, &Target> = targets.iter().map(|t| (t.external_id, t)).collect();

    let mut updated = Vec::new();
    for applied in &outcome.applied {
        let Mutation::UpdateTarget { target_id, bid, state, .. } = &applied.mutation else {
            continue;
        };
        let Some(existing) = by_id.get(target_id) else {
            continue;
        };
        let mut t = (*existing).clone();
        if bid.is_some() {
            t.bid = *bid;
        }
        if let Some(state) = state {
            t.state = *state;
        }
        t.last_updated_on_platform = touched_ms;
        updated.push(t);
    }

    if !updated.is_empty() {
        ctx.repo.upsert_targets(&updated).await?;
    }
    Ok(())
}

/// Bid pass: per-target decisions from yesterday's slice, then the
/// portfolio-wide budget correction, then one update per changed target.
pub async fn adjust_bids<R: AdsRepository, G: MutationGateway>(
    ctx: &PassContext<'_, R, G>,
    profile: &Profile,
) -> ExecutionResult<PassReport> {
    let mut report = PassReport::new(PassKind::Bids, profile.id);
    let books = ctx.repo.books(profile.id).await?;
    let campaigns = ctx.repo.campaigns(profile.id).await?;
    let targets = ctx.repo.targets(profile.id).await?;

    let scope: HashMap<ExternalId, (&Campaign, &Book)> =
        managed_scope(profile, &campaigns, &books, &mut report)
            .into_iter()
            .map(|(c, b)| (c.external_id, (c, b)))
            .collect();

    let cutoff = cooldown_cutoff_ms(ctx.now, ctx.settings.cooldown_hours);
    let eligible: Vec<&Target> = targets
        .iter()
        .filter(|t| t.external_id != UNCREATED_ID)
        .filter(|t| scope.contains_key(&t.campaign_id))
        .filter(|t| t.is_adjustable(cutoff))
        .collect();
    if eligible.is_empty() {
        info!(target: "execution", profile = profile.id, "no adjustable targets");
        return Ok(report);
    }

    let today = ctx.today();
    let daily = fetch_target_slices(ctx.repo, &eligible, yesterday(today), None).await?;
    let trailing = fetch_target_slices(
        ctx.repo,
        &eligible,
        trailing_window(today, ctx.settings.proven_lookback_days),
        q1_blackout(today),
    )
    .await?;

    let mut decisions: Vec<(&Target, BidDecision)> = Vec::with_capacity(eligible.len());
    let mut candidates: Vec<BudgetCandidate> = Vec::with_capacity(eligible.len());
    for t in &eligible {
        let Some((campaign, book)) = scope.get(&t.campaign_id) else {
            continue;
        };
        let slice = daily.get(&t.external_id).copied().unwrap_or_default();
        let target_acos = campaign.effective_target_acos(book);
        let current_bid = t.effective_bid();
        let decision = adjust_bid(
            &ctx.params.bids,
            &slice,
            current_bid,
            target_acos,
            book.price,
            book.reviews,
        );
        debug!(
            target: "optimizer",
            profile = profile.id,
            campaign = t.campaign_id,
            target_id = t.external_id,
            sales = slice.sales,
            spend = slice.spend,
            kenp = slice.kenp_royalties,
            clicks = slice.clicks,
            impressions = slice.impressions,
            current_bid,
            target_acos,
            book_price = book.price,
            reviews = ?book.reviews,
            delta = decision.delta,
            pause = decision.pause,
            reason = ?decision.reason,
            "bid decision"
        );

        candidates.push(BudgetCandidate {
            target_id: t.external_id,
            trailing_sales: trailing.get(&t.external_id).map(|s| s.sales).unwrap_or(0.0),
            yesterday_spend: slice.spend,
            has_launch_book: book.launch,
            current_bid,
        });
        decisions.push((*t, decision));
    }

    let outstanding = ctx.repo.outstanding_daily_budget(profile.id).await?;
    let allocation = allocate(&ctx.params.budget, outstanding, &candidates);
    info!(
        target: "optimizer",
        profile = profile.id,
        outstanding_daily_budget = allocation.outstanding_daily_budget,
        proven_budget = allocation.proven_budget,
        unproven_budget = allocation.unproven_budget,
        proven_targets = allocation.proven.targets,
        proven_predicted_spend = allocation.proven.predicted_spend,
        proven_to_floor = allocation.proven.count_to_floor,
        unproven_targets = allocation.unproven.targets,
        unproven_predicted_spend = allocation.unproven.predicted_spend,
        unproven_to_floor = allocation.unproven.count_to_floor,
        projected_surplus = allocation.projected_surplus,
        flooring = allocation.flooring_triggered(),
        surplus_budget = allocation.surplus_budget,
        "budget allocation"
    );
    ctx.repo
        .save_surplus_budget(profile.id, allocation.surplus_budget)
        .await?;

    let mut mutations = Vec::new();
    for (t, decision) in &decisions {
        if decision.pause {
            METRICS.record_pause();
            info!(
                target: "optimizer",
                profile = profile.id,
                campaign = t.campaign_id,
                target_id = t.external_id,
                "pausing target"
            );
            mutations.push(Mutation::UpdateTarget {
                target_id: t.external_id,
                campaign_id: t.campaign_id,
                kind: t.kind,
                bid: None,
                state: Some(EntityState::Paused),
            });
            continue;
        }

        let current_bid = t.effective_bid();
        let floor = allocation.floor_for(t.external_id);
        let delta = floor.map(|f| f.delta).unwrap_or(decision.delta);
        if round_money(delta) == 0.0 {
            continue;
        }
        let new_bid = round_money(current_bid + delta);

        if floor.is_some() {
            METRICS.record_floor();
            info!(
                target: "optimizer",
                profile = profile.id,
                campaign = t.campaign_id,
                target_id = t.external_id,
                current_bid,
                engine_delta = decision.delta,
                floor_delta = delta,
                new_bid,
                "budget floor override"
            );
        } else {
            METRICS.record_bid_change(delta);
            info!(
                target: "optimizer",
                profile = profile.id,
                campaign = t.campaign_id,
                target_id = t.external_id,
                current_bid,
                delta,
                new_bid,
                reason = ?decision.reason,
                "bid change"
            );
        }

        mutations.push(Mutation::UpdateTarget {
            target_id: t.external_id,
            campaign_id: t.campaign_id,
            kind: t.kind,
            bid: Some(new_bid),
            state: None,
        });
    }

    let outcome = apply_and_record(ctx, profile, mutations, &mut report).await?;
    write_back_updates(ctx, &targets, &outcome).await?;
    Ok(report)
}

/// Placement pass: both placement percentages of every managed campaign,
/// from yesterday's per-placement slices.
pub async fn adjust_placements<R: AdsRepository, G: MutationGateway>(
    ctx: &PassContext<'_, R, G>,
    profile: &Profile,
) -> ExecutionResult<PassReport> {
    let mut report = PassReport::new(PassKind::Placements, profile.id);
    let books = ctx.repo.books(profile.id).await?;
    let campaigns = ctx.repo.campaigns(profile.id).await?;
    let scope = managed_scope(profile, &campaigns, &books, &mut report);
    if scope.is_empty() {
        return Ok(report);
    }

    let ids: Vec<ExternalId> = scope.iter().map(|(c, _)| c.external_id).collect();
    let slices = ctx
        .repo
        .placement_slices(&ids, yesterday(ctx.today()))
        .await?;

    let mut mutations = Vec::new();
    for (campaign, book) in &scope {
        let target_acos = campaign.effective_target_acos(book);
        let decide = |placement: Placement| {
            let slice = slices
                .get(&(campaign.external_id, placement))
                .copied()
                .unwrap_or_default();
            let current = campaign.placement_pct(placement);
            let decision = adjust_placement(
                &ctx.params.placements,
                &slice,
                current,
                target_acos,
                book.price,
                book.reviews,
            );
            debug!(
                target: "optimizer",
                profile = profile.id,
                campaign = campaign.external_id,
                placement = placement.as_str(),
                sales = slice.sales,
                spend = slice.spend,
                kenp = slice.kenp_royalties,
                clicks = slice.clicks,
                impressions = slice.impressions,
                current_pct = current,
                target_acos,
                new_pct = decision.new_pct,
                reason = ?decision.reason,
                "placement decision"
            );
            decision
        };
        let top = decide(Placement::TopOfSearch);
        let product_page = decide(Placement::ProductPage);
        if top.is_noop() && product_page.is_noop() {
            continue;
        }

        for (placement, d) in [(Placement::TopOfSearch, &top), (Placement::ProductPage, &product_page)] {
            if !d.is_noop() {
                METRICS.record_placement_change();
                info!(
                    target: "optimizer",
                    profile = profile.id,
                    campaign = campaign.external_id,
                    placement = placement.as_str(),
                    delta_pct = d.delta_pct,
                    new_pct = d.new_pct,
                    "placement change"
                );
            }
        }
        mutations.push(Mutation::UpdatePlacements {
            campaign_id: campaign.external_id,
            top_of_search_pct: top.new_pct,
            product_page_pct: product_page.new_pct,
        });
    }

    let outcome = apply_and_record(ctx, profile, mutations, &mut report).await?;
    if !ctx.gateway.is_dry_run() {
        let mut updated = Vec::new();
        for applied in &outcome.applied {
            let Mutation::UpdatePlacements {
                campaign_id,
                top_of_search_pct,
                product_page_pct,
            } = &applied.mutation
            else {
                continue;
            };
            if let Some((c, _)) = scope.iter().find(|(c, _)| c.external_id == *campaign_id) {
                let mut c = (*c).clone();
                c.placement_top_pct = *top_of_search_pct;
                c.placement_product_page_pct = *product_page_pct;
                updated.push(c);
            }
        }
        if !updated.is_empty() {
            ctx.repo.upsert_campaigns(&updated).await?;
        }
    }
    Ok(report)
}

/// Scale campaign and ad group that receive graduated terms for a book.
fn graduation_destination(campaigns: &[Campaign], asin: &str) -> Option<(ExternalId, ExternalId)> {
    campaigns
        .iter()
        .filter(|c| c.managed && c.state == EntityState::Enabled)
        .filter(|c| c.purpose == CampaignPurpose::Scale)
        .filter(|c| c.primary_asin().map(|a| a.eq_ignore_ascii_case(asin)).unwrap_or(false))
        .find_map(|c| c.default_ad_group_id.map(|ag| (c.external_id, ag)))
}

/// Positive exact clauses and negatives per book ASIN.
fn known_terms(campaigns: &[Campaign], targets: &[Target]) -> HashMap<String, KnownTerms> {
    let asin_by_campaign: HashMap<ExternalId, String> = campaigns
        .iter()
        .filter_map(|c| c.primary_asin().map(|a| (c.external_id, a.to_ascii_uppercase())))
        .collect();

    let mut known: HashMap<String, KnownTerms> = HashMap::new();
    for t in targets {
        if t.state == EntityState::Archived {
            continue;
        }
        let blocks = t.keyword_type == KeywordType::Negative
            || matches!(t.match_type, MatchType::Exact | MatchType::AsinSameAs);
        if !blocks {
            continue;
        }
        if let Some(asin) = asin_by_campaign.get(&t.campaign_id) {
            known.entry(asin.clone()).or_default().insert(&t.text);
        }
    }
    known
}

/// Search-term pass: graduate converting terms into the book's scale
/// campaign and negate wasteful ones where they were observed.
pub async fn graduate_search_terms<R: AdsRepository, G: MutationGateway>(
    ctx: &PassContext<'_, R, G>,
    profile: &Profile,
) -> ExecutionResult<PassReport> {
    let mut report = PassReport::new(PassKind::SearchTerms, profile.id);
    let books = ctx.repo.books(profile.id).await?;
    let campaigns = ctx.repo.campaigns(profile.id).await?;
    let targets = ctx.repo.targets(profile.id).await?;

    let scope: HashMap<ExternalId, &Book> = managed_scope(profile, &campaigns, &books, &mut report)
        .into_iter()
        .map(|(c, b)| (c.external_id, b))
        .collect();
    if scope.is_empty() {
        return Ok(report);
    }

    let ids: Vec<ExternalId> = scope.keys().copied().collect();
    let range = trailing_window(ctx.today(), ctx.settings.search_term_lookback_days);
    let slices = ctx.repo.search_term_slices(&ids, range).await?;

    let mut terms: Vec<(&SearchTermKey, &PerformanceSlice)> = slices.iter().collect();
    terms.sort_by(|a, b| {
        (a.0.campaign_id, a.0.ad_group_id, &a.0.term).cmp(&(b.0.campaign_id, b.0.ad_group_id, &b.0.term))
    });

    let mut known = known_terms(&campaigns, &targets);
    let bids = &ctx.params.bids;
    let mut mutations = Vec::new();

    for (key, slice) in terms {
        let Some(book) = scope.get(&key.campaign_id) else {
            continue;
        };
        let term = normalize_term(&key.term);
        if term.is_empty() {
            continue;
        }
        let book_known = known.entry(book.asin.to_ascii_uppercase()).or_default();
        let action = classify(
            &ctx.params.search_terms,
            &term,
            slice,
            book.price,
            book.break_even_acos,
            book_known,
        );
        debug!(
            target: "optimizer",
            profile = profile.id,
            campaign = key.campaign_id,
            ad_group = key.ad_group_id,
            term = %term,
            sales = slice.sales,
            spend = slice.spend,
            kenp = slice.kenp_royalties,
            book_price = book.price,
            break_even_acos = book.break_even_acos,
            action = ?action,
            "search term decision"
        );

        match action {
            TermAction::Graduate => {
                let Some((scale_campaign, ad_group)) = graduation_destination(&campaigns, &book.asin)
                else {
                    warn!(
                        target: "execution",
                        profile = profile.id,
                        asin = %book.asin,
                        term = %term,
                        "no scale campaign with a default ad group; term not graduated"
                    );
                    report.skipped += 1;
                    continue;
                };
                let cpc = observed_cpc(slice, 0.0);
                let base = if cpc > 0.0 { cpc } else { ctx.settings.graduated_bid };
                let bid = round_money(base.clamp(bids.min_bid, bids.max_bid));

                METRICS.record_graduation();
                info!(
                    target: "optimizer",
                    profile = profile.id,
                    source_campaign = key.campaign_id,
                    campaign = scale_campaign,
                    ad_group,
                    term = %term,
                    bid,
                    "graduating search term"
                );
                mutations.push(if looks_like_asin(&term) {
                    Mutation::CreateProductTarget {
                        campaign_id: scale_campaign,
                        ad_group_id: ad_group,
                        asin: term.clone(),
                        bid,
                    }
                } else {
                    Mutation::CreateKeyword {
                        campaign_id: scale_campaign,
                        ad_group_id: ad_group,
                        text: term.clone(),
                        bid,
                    }
                });
                book_known.insert(&term);
            }
            TermAction::Negate => {
                METRICS.record_negation();
                info!(
                    target: "optimizer",
                    profile = profile.id,
                    campaign = key.campaign_id,
                    ad_group = key.ad_group_id,
                    term = %term,
                    "negating search term"
                );
                mutations.push(if looks_like_asin(&term) {
                    Mutation::CreateNegativeProductTarget {
                        campaign_id: key.campaign_id,
                        ad_group_id: key.ad_group_id,
                        asin: term.clone(),
                    }
                } else {
                    Mutation::CreateNegativeKeyword {
                        campaign_id: key.campaign_id,
                        ad_group_id: key.ad_group_id,
                        text: term.clone(),
                    }
                });
                book_known.insert(&term);
            }
            TermAction::Keep | TermAction::AlreadyTargeted => {}
        }
    }

    let outcome = apply_and_record(ctx, profile, mutations, &mut report).await?;
    if !ctx.gateway.is_dry_run() {
        let touched_ms = ctx.now.timestamp_millis();
        let created: Vec<Target> = outcome
            .applied
            .iter()
            .filter_map(|a| created_target(profile.id, a, touched_ms))
            .collect();
        if !created.is_empty() {
            ctx.repo.upsert_targets(&created).await?;
        }
    }
    Ok(report)
}

/// Local record for a clause the platform just created.
fn created_target(profile_pk: i64, applied: &AppliedMutation, touched_ms: i64) -> Option<Target> {
    let external_id = applied.created_id?;
    let (campaign_id, ad_group_id, kind, text, match_type, keyword_type, bid) = match &applied.mutation {
        Mutation::CreateKeyword {
            campaign_id,
            ad_group_id,
            text,
            bid,
        } => (
            *campaign_id,
            *ad_group_id,
            TargetKind::Keyword,
            text.clone(),
            MatchType::Exact,
            KeywordType::Positive,
            Some(*bid),
        ),
        Mutation::CreateProductTarget {
            campaign_id,
            ad_group_id,
            asin,
            bid,
        } => (
            *campaign_id,
            *ad_group_id,
            TargetKind::Product,
            asin.to_ascii_uppercase(),
            MatchType::AsinSameAs,
            KeywordType::Positive,
            Some(*bid),
        ),
        Mutation::CreateNegativeKeyword {
            campaign_id,
            ad_group_id,
            text,
        } => (
            *campaign_id,
            *ad_group_id,
            TargetKind::Keyword,
            text.clone(),
            MatchType::NegativeExact,
            KeywordType::Negative,
            None,
        ),
        Mutation::CreateNegativeProductTarget {
            campaign_id,
            ad_group_id,
            asin,
        } => (
            *campaign_id,
            *ad_group_id,
            TargetKind::Product,
            asin.to_ascii_uppercase(),
            MatchType::AsinSameAs,
            KeywordType::Negative,
            None,
        ),
        Mutation::UpdateTarget { .. } | Mutation::UpdatePlacements { .. } => return None,
    };

    Some(Target {
        id: 0,
        external_id,
        profile_pk,
        campaign_id,
        ad_group_id,
        kind,
        text,
        match_type,
        keyword_type,
        bid,
        ad_group_bid: 0.0,
        state: EntityState::Enabled,
        serving_status: String::new(),
        last_updated_on_platform: touched_ms,
    })
}

/// Dedup pass: pause every duplicate except the best performer of its group.
pub async fn dedup_targets<R: AdsRepository, G: MutationGateway>(
    ctx: &PassContext<'_, R, G>,
    profile: &Profile,
) -> ExecutionResult<PassReport> {
    let mut report = PassReport::new(PassKind::Dedup, profile.id);
    let campaigns = ctx.repo.campaigns(profile.id).await?;
    let targets = ctx.repo.targets(profile.id).await?;

    let groups = group_duplicates(&campaigns, &targets);
    if groups.is_empty() {
        return Ok(report);
    }

    let by_id: HashMap<ExternalId, &Target> = targets
        .iter()
        .filter(|t| t.external_id != UNCREATED_ID)
        .map(|t| (t.external_id, t))
        .collect();
    let members: Vec<&Target> = groups
        .values()
        .flatten()
        .filter_map(|id| by_id.get(id).copied())
        .collect();
    let range = trailing_window(ctx.today(), ctx.settings.dedup_lookback_days);
    let slices = fetch_target_slices(ctx.repo, &members, range, None).await?;

    let mut mutations = Vec::new();
    for (key, group) in &groups {
        let outcome = resolve(&ctx.params.dedup, group, &slices);
        if outcome.is_deferred() {
            info!(
                target: "optimizer",
                profile = profile.id,
                asin = %key.asin,
                match_type = %key.match_type,
                text = %key.text,
                "duplicate group holds an uncreated target; left alone"
            );
            report.skipped += 1;
            continue;
        }

        for loser in &outcome.losers {
            let Some(t) = by_id.get(loser) else {
                continue;
            };
            let slice = slices.get(loser).copied().unwrap_or_default();
            METRICS.record_duplicate_paused();
            info!(
                target: "optimizer",
                profile = profile.id,
                asin = %key.asin,
                match_type = %key.match_type,
                text = %key.text,
                winner = outcome.winner,
                loser = *loser,
                campaign = t.campaign_id,
                sales = slice.sales,
                spend = slice.spend,
                "pausing duplicate target"
            );
            mutations.push(Mutation::UpdateTarget {
                target_id: *loser,
                campaign_id: t.campaign_id,
                kind: t.kind,
                bid: None,
                state: Some(EntityState::Paused),
            });
        }
    }

    let outcome = apply_and_record(ctx, profile, mutations, &mut report).await?;
    write_back_updates(ctx, &targets, &outcome).await?;
    Ok(report)
}
