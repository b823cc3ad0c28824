use serde::Serialize;
use tracing::info;

use crate::types::{AppConfig, ExecutionMode};

#[derive(Serialize)]
struct StartupLog<'a> {
    event: &'a str,
    execution_mode: &'a str,
    command: &'a str,
    profiles: &'a [i64],
    max_parallel_profiles: usize,
    min_bid: f64,
    max_bid: f64,
}

pub fn log_startup(cfg: &AppConfig, command: &str, profiles: &[i64]) {
    let mode = match cfg.execution.mode {
        ExecutionMode::Paper => "paper",
        ExecutionMode::Live => "live",
    };
    let payload = StartupLog {
        event: "startup",
        execution_mode: mode,
        command,
        profiles,
        max_parallel_profiles: cfg.execution.max_parallel_profiles,
        min_bid: cfg.bids.min_bid,
        max_bid: cfg.bids.max_bid,
    };
    info!(target: "optimizer", startup = serde_json::to_string(&payload).unwrap_or_default().as_str());
}
