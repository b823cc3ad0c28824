use clap::{Args, Parser, Subcommand};
use dotenv::dotenv;
use tracing_subscriber::EnvFilter;

use kdp_ads_optimizer::{
    execution::{self, PassKind},
    monitoring,
    types::{AppConfig, ExecutionMode},
};

fn redact_host(url: &str) -> String {
    url.split('@')
        .nth(1)
        .and_then(|s| s.split('/').next())
        .unwrap_or("?")
        .to_string()
}

#[derive(Parser, Debug)]
#[command(name = "kdp-ads-optimizer")]
#[command(about = "Bid, placement and budget optimizer for Amazon Sponsored Products book ads", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.toml")]
    config: String,

    /// Override execution mode (paper/live)
    #[arg(long)]
    mode: Option<ExecutionMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct ProfileFilter {
    /// Local profile ids to process; all managed profiles when omitted
    #[arg(long, value_delimiter = ',')]
    profiles: Vec<i64>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Adjust target bids and apply the daily budget correction
    AdjustBids(ProfileFilter),
    /// Adjust top-of-search and product-page placement multipliers
    AdjustPlacements(ProfileFilter),
    /// Graduate converting search terms and negate wasteful ones
    GraduateSearchTerms(ProfileFilter),
    /// Pause duplicate targets competing for the same book
    DedupTargets(ProfileFilter),
    /// Run every pass in order
    RunAll(ProfileFilter),
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::AdjustBids(_) => "adjust-bids",
            Commands::AdjustPlacements(_) => "adjust-placements",
            Commands::GraduateSearchTerms(_) => "graduate-search-terms",
            Commands::DedupTargets(_) => "dedup-targets",
            Commands::RunAll(_) => "run-all",
        }
    }

    fn passes(&self) -> &'static [PassKind] {
        match self {
            Commands::AdjustBids(_) => &[PassKind::Bids],
            Commands::AdjustPlacements(_) => &[PassKind::Placements],
            Commands::GraduateSearchTerms(_) => &[PassKind::SearchTerms],
            Commands::DedupTargets(_) => &[PassKind::Dedup],
            Commands::RunAll(_) => &PassKind::ALL,
        }
    }

    fn profiles(&self) -> &[i64] {
        match self {
            Commands::AdjustBids(f)
            | Commands::AdjustPlacements(f)
            | Commands::GraduateSearchTerms(f)
            | Commands::DedupTargets(f)
            | Commands::RunAll(f) => &f.profiles,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "kdp_ads_optimizer=debug,info");
    }
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let cli = Cli::parse();
    tracing::debug!(target: "optimizer", config = %cli.config, "loading config");

    let mut settings = AppConfig::load(&cli.config)?;
    tracing::info!(
        target: "optimizer",
        config = %cli.config,
        postgres_host = redact_host(&settings.postgres.url),
        "config loaded"
    );

    if let Some(mode) = cli.mode {
        settings.execution.mode = mode;
    }

    let command = cli.command;
    monitoring::logger::log_startup(&settings, command.name(), command.profiles());

    let summary = execution::run(&settings, command.passes(), command.profiles()).await?;
    if summary.has_failures() {
        let failed: Vec<i64> = summary.failed.iter().map(|(pk, _)| *pk).collect();
        anyhow::bail!("{} profile run(s) failed: {:?}", failed.len(), failed);
    }

    Ok(())
}
