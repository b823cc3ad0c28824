//! Staged run for one profile.
//!
//! Each stage consumes the previous stage's output, so the ordering
//! `sync campaigns -> sync targets -> optimize` is enforced by the types.

use serde::Serialize;
use tracing::info;

use crate::model::Profile;
use crate::storage::AdsRepository;

use super::executor::{ExecutionResult, MutationGateway};
use super::passes::{PassContext, PassKind, PassReport};

/// Output of the campaign sync. `None` counts mean the gateway has no
/// platform to pull from and the stage was skipped.
#[derive(Clone, Debug)]
pub struct CampaignsSynced {
    pub profile: Profile,
    pub campaigns: Option<usize>,
}

#[derive(Clone, Debug)]
pub struct TargetsSynced {
    pub profile: Profile,
    pub campaigns: Option<usize>,
    pub ad_groups: Option<usize>,
    pub targets: Option<usize>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ProfileRunReport {
    pub profile_pk: i64,
    pub synced_campaigns: Option<usize>,
    pub synced_ad_groups: Option<usize>,
    pub synced_targets: Option<usize>,
    pub passes: Vec<PassReport>,
}

impl ProfileRunReport {
    pub fn failed_mutations(&self) -> usize {
        self.passes.iter().map(|p| p.failed).sum()
    }
}

pub async fn sync_campaigns<R: AdsRepository, G: MutationGateway>(
    ctx: &PassContext<'_, R, G>,
    profile: Profile,
) -> ExecutionResult<CampaignsSynced> {
    let campaigns = match ctx.gateway.pull_campaigns(&profile).await? {
        Some(campaigns) => {
            ctx.repo.upsert_campaigns(&campaigns).await?;
            info!(target: "sync", profile = profile.id, count = campaigns.len(), "campaigns synced");
            Some(campaigns.len())
        }
        None => None,
    };
    Ok(CampaignsSynced { profile, campaigns })
}

/// Ad groups go first so targets read back with their inherited bid.
pub async fn sync_targets<R: AdsRepository, G: MutationGateway>(
    ctx: &PassContext<'_, R, G>,
    input: CampaignsSynced,
) -> ExecutionResult<TargetsSynced> {
    let CampaignsSynced { profile, campaigns } = input;

    let ad_groups = match ctx.gateway.pull_ad_groups(&profile).await? {
        Some(groups) => {
            ctx.repo.upsert_ad_groups(&groups).await?;
            Some(groups.len())
        }
        None => None,
    };
    let targets = match ctx.gateway.pull_targets(&profile).await? {
        Some(targets) => {
            ctx.repo.upsert_targets(&targets).await?;
            Some(targets.len())
        }
        None => None,
    };
    if ad_groups.is_some() || targets.is_some() {
        info!(
            target: "sync",
            profile = profile.id,
            ad_groups = ?ad_groups,
            targets = ?targets,
            "targets synced"
        );
    }

    Ok(TargetsSynced {
        profile,
        campaigns,
        ad_groups,
        targets,
    })
}

pub async fn optimize<R: AdsRepository, G: MutationGateway>(
    ctx: &PassContext<'_, R, G>,
    input: TargetsSynced,
    passes: &[PassKind],
) -> ExecutionResult<ProfileRunReport> {
    let mut reports = Vec::with_capacity(passes.len());
    for pass in passes {
        let report = ctx.run(*pass, &input.profile).await?;
        info!(
            target: "execution",
            profile = input.profile.id,
            pass = pass.as_str(),
            decisions = report.decisions,
            applied = report.applied,
            failed = report.failed,
            skipped = report.skipped,
            "pass finished"
        );
        reports.push(report);
    }

    Ok(ProfileRunReport {
        profile_pk: input.profile.id,
        synced_campaigns: input.campaigns,
        synced_ad_groups: input.ad_groups,
        synced_targets: input.targets,
        passes: reports,
    })
}

pub async fn run_pipeline<R: AdsRepository, G: MutationGateway>(
    ctx: &PassContext<'_, R, G>,
    profile: Profile,
    passes: &[PassKind],
) -> ExecutionResult<ProfileRunReport> {
    let campaigns = sync_campaigns(ctx, profile).await?;
    let targets = sync_targets(ctx, campaigns).await?;
    optimize(ctx, targets, passes).await
}
