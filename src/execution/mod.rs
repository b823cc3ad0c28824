mod executor;
pub mod mutation;
pub mod passes;
pub mod pipeline;
pub mod sync;

use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::model::Profile;
use crate::monitoring::metrics::{log_metrics_snapshot, METRICS};
use crate::optimizer::OptimizerParams;
use crate::storage::{
    create_pg_pool, profile_lock_key, AdsRepository, LocalRunLock, PgRepository, RedisRunLock,
    RunLock, RunLockBackend,
};
use crate::types::{AppConfig, ExecutionMode};

pub use executor::{
    ExecutionError, ExecutionResult, GatewayBackend, LiveGateway, MutationExecutor, MutationGateway,
    PaperGateway,
};
pub use mutation::{AppliedMutation, FailedMutation, Mutation, MutationOutcome};
pub use passes::{PassContext, PassKind, PassReport, PassSettings};
pub use pipeline::{run_pipeline, ProfileRunReport};

/// What to run and how wide.
#[derive(Clone, Debug)]
pub struct RunOptions {
    pub passes: Vec<PassKind>,
    /// Local profile ids; empty means every managed profile.
    pub only: Vec<i64>,
    pub max_parallel: usize,
    pub lock_ttl: Duration,
}

impl RunOptions {
    pub fn from_config(cfg: &AppConfig, passes: &[PassKind], only: &[i64]) -> Self {
        Self {
            passes: passes.to_vec(),
            only: only.to_vec(),
            max_parallel: cfg.execution.max_parallel_profiles,
            lock_ttl: Duration::from_secs(cfg.execution.lock_ttl_secs),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct RunSummary {
    pub completed: Vec<ProfileRunReport>,
    pub failed: Vec<(i64, String)>,
    /// Profiles another run was already holding.
    pub locked: Vec<i64>,
}

impl RunSummary {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

async fn run_locked<R, G, L>(
    ctx: &PassContext<'_, R, G>,
    lock: &L,
    profile: Profile,
    opts: &RunOptions,
) -> ExecutionResult<ProfileRunReport>
where
    R: AdsRepository,
    G: MutationGateway,
    L: RunLock,
{
    let pk = profile.id;
    let key = profile_lock_key(pk);
    let token = lock
        .try_acquire(&key, opts.lock_ttl)
        .await?
        .ok_or(ExecutionError::LockHeld(pk))?;

    let result = run_pipeline(ctx, profile, &opts.passes).await;

    if let Err(err) = lock.release(&key, &token).await {
        warn!(target: "execution", profile = pk, error = %err, "failed to release run lock");
    }
    result
}

/// Run the selected passes for every selected profile. Profiles run
/// concurrently up to `max_parallel`; one profile failing never stops
/// the others.
pub async fn run_profiles<R, G, L>(
    ctx: &PassContext<'_, R, G>,
    lock: &L,
    opts: &RunOptions,
) -> ExecutionResult<RunSummary>
where
    R: AdsRepository,
    G: MutationGateway,
    L: RunLock,
{
    let profiles = ctx.repo.managed_profiles(&opts.only).await?;
    info!(
        target: "execution",
        profiles = profiles.len(),
        passes = ?opts.passes,
        dry_run = ctx.gateway.is_dry_run(),
        "starting run"
    );

    let results: Vec<(i64, ExecutionResult<ProfileRunReport>)> = stream::iter(profiles)
        .map(|profile| async move {
            let pk = profile.id;
            (pk, run_locked(ctx, lock, profile, opts).await)
        })
        .buffer_unordered(opts.max_parallel.max(1))
        .collect()
        .await;

    let mut summary = RunSummary::default();
    for (pk, result) in results {
        match result {
            Ok(report) => {
                METRICS.record_profile_run(pk, true);
                summary.completed.push(report);
            }
            Err(ExecutionError::LockHeld(_)) => {
                warn!(target: "execution", profile = pk, "profile run already in progress; skipped");
                summary.locked.push(pk);
            }
            Err(err) => {
                METRICS.record_profile_run(pk, false);
                error!(target: "execution", profile = pk, error = %err, "profile run failed");
                summary.failed.push((pk, err.to_string()));
            }
        }
    }
    summary.completed.sort_by_key(|r| r.profile_pk);
    summary.failed.sort_by_key(|(pk, _)| *pk);
    Ok(summary)
}

/// Entrypoint used by `main.rs`: wires Postgres, the gateway for the
/// configured mode and the run lock, then runs the passes.
pub async fn run(cfg: &AppConfig, passes: &[PassKind], only: &[i64]) -> anyhow::Result<RunSummary> {
    let pool = create_pg_pool(&cfg.postgres)
        .await
        .context("failed to connect to Postgres")?;
    let repo = PgRepository::new(pool);
    let gateway = MutationExecutor::from_config(cfg)?;

    let lock = match cfg.execution.mode {
        ExecutionMode::Live => RunLockBackend::Redis(
            RedisRunLock::new(&cfg.redis)
                .await
                .context("failed to connect to Redis")?,
        ),
        ExecutionMode::Paper => RunLockBackend::Local(LocalRunLock::new()),
    };

    let params = OptimizerParams::from(cfg);
    let settings = PassSettings::from(cfg);
    let ctx = PassContext {
        repo: &repo,
        gateway: &gateway,
        params: &params,
        settings: &settings,
        now: Utc::now(),
    };
    let opts = RunOptions::from_config(cfg, passes, only);

    let summary = run_profiles(&ctx, &lock, &opts).await?;
    info!(
        target: "execution",
        completed = summary.completed.len(),
        failed = summary.failed.len(),
        locked = summary.locked.len(),
        "run finished"
    );
    log_metrics_snapshot(&METRICS.snapshot());
    Ok(summary)
}
