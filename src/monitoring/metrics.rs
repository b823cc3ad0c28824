use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use once_cell::sync::Lazy;
use serde::Serialize;
use tracing::{info, warn};

/// Global decision counters for the current process.
pub static METRICS: Lazy<Metrics> = Lazy::new(Metrics::default);

fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs()
}

#[derive(Default)]
struct MetricsInner {
    bids_raised: AtomicU64,
    bids_lowered: AtomicU64,
    targets_paused: AtomicU64,
    bids_floored: AtomicU64,
    placements_changed: AtomicU64,
    terms_graduated: AtomicU64,
    terms_negated: AtomicU64,
    duplicates_paused: AtomicU64,
    mutations_applied: AtomicU64,
    mutations_failed: AtomicU64,
    profiles_completed: AtomicU64,
    profiles_failed: AtomicU64,
    last_event_ts: AtomicU64,
}

/// Lightweight metrics handle backed by atomics so it can be cloned cheaply.
#[derive(Clone, Default)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

impl Metrics {
    fn bump(&self, counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
        self.inner.last_event_ts.store(now_unix_secs(), Ordering::Relaxed);
    }

    pub fn record_bid_change(&self, delta: f64) {
        if delta > 0.0 {
            self.bump(&self.inner.bids_raised, 1);
        } else if delta < 0.0 {
            self.bump(&self.inner.bids_lowered, 1);
        }
    }

    pub fn record_pause(&self) {
        self.bump(&self.inner.targets_paused, 1);
    }

    pub fn record_floor(&self) {
        self.bump(&self.inner.bids_floored, 1);
    }

    pub fn record_placement_change(&self) {
        self.bump(&self.inner.placements_changed, 1);
    }

    pub fn record_graduation(&self) {
        self.bump(&self.inner.terms_graduated, 1);
    }

    pub fn record_negation(&self) {
        self.bump(&self.inner.terms_negated, 1);
    }

    pub fn record_duplicate_paused(&self) {
        self.bump(&self.inner.duplicates_paused, 1);
    }

    pub fn record_mutations(&self, profile_pk: i64, applied: usize, failed: usize) {
        self.bump(&self.inner.mutations_applied, applied as u64);
        if failed > 0 {
            self.bump(&self.inner.mutations_failed, failed as u64);
            warn!(
                target: "metrics",
                event = "mutations_failed",
                profile = profile_pk,
                failed,
                total_failures = self.inner.mutations_failed.load(Ordering::Relaxed),
                "mutations failed"
            );
        }
    }

    pub fn record_profile_run(&self, profile_pk: i64, ok: bool) {
        if ok {
            self.bump(&self.inner.profiles_completed, 1);
        } else {
            self.bump(&self.inner.profiles_failed, 1);
        }
        info!(
            target: "metrics",
            event = "profile_run",
            profile = profile_pk,
            ok,
            "profile run finished"
        );
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            bids_raised: load(&self.inner.bids_raised),
            bids_lowered: load(&self.inner.bids_lowered),
            targets_paused: load(&self.inner.targets_paused),
            bids_floored: load(&self.inner.bids_floored),
            placements_changed: load(&self.inner.placements_changed),
            terms_graduated: load(&self.inner.terms_graduated),
            terms_negated: load(&self.inner.terms_negated),
            duplicates_paused: load(&self.inner.duplicates_paused),
            mutations_applied: load(&self.inner.mutations_applied),
            mutations_failed: load(&self.inner.mutations_failed),
            profiles_completed: load(&self.inner.profiles_completed),
            profiles_failed: load(&self.inner.profiles_failed),
            last_event_ts: load(&self.inner.last_event_ts),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub bids_raised: u64,
    pub bids_lowered: u64,
    pub targets_paused: u64,
    pub bids_floored: u64,
    pub placements_changed: u64,
    pub terms_graduated: u64,
    pub terms_negated: u64,
    pub duplicates_paused: u64,
    pub mutations_applied: u64,
    pub mutations_failed: u64,
    pub profiles_completed: u64,
    pub profiles_failed: u64,
    pub last_event_ts: u64,
}

pub fn log_metrics_snapshot(snapshot: &MetricsSnapshot) {
    info!(
        target: "metrics",
        event = "metrics_snapshot",
        bids_raised = snapshot.bids_raised,
        bids_lowered = snapshot.bids_lowered,
        targets_paused = snapshot.targets_paused,
        bids_floored = snapshot.bids_floored,
        placements_changed = snapshot.placements_changed,
        terms_graduated = snapshot.terms_graduated,
        terms_negated = snapshot.terms_negated,
        duplicates_paused = snapshot.duplicates_paused,
        mutations_applied = snapshot.mutations_applied,
        mutations_failed = snapshot.mutations_failed,
        profiles_completed = snapshot.profiles_completed,
        profiles_failed = snapshot.profiles_failed,
        last_event_ts = snapshot.last_event_ts,
        "metrics snapshot"
    );
}
