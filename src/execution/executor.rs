use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::client::ads_api::{AdsApiClient, ApiScope};
use crate::client::auth::{LwaRefresher, TokenRefresher};
use crate::client::entities::{EntitySpec, AD_GROUPS, CAMPAIGNS, KEYWORDS, NEGATIVE_KEYWORDS, NEGATIVE_TARGETS, TARGETS};
use crate::client::ClientError;
use crate::model::{AdGroup, Campaign, Profile, Target};
use crate::storage::StorageError;
use crate::types::{AppConfig, ExecutionMode};

use super::mutation::{AppliedMutation, FailedMutation, Mutation, MutationOutcome};
use super::sync::{ad_group_from_api, campaign_from_api, target_from_api};

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("client error: {0}")]
    Client(#[from] ClientError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("circuit breaker open")]
    CircuitOpen,

    #[error("profile {0} is already being processed")]
    LockHeld(i64),

    #[error("other execution error: {0}")]
    Other(String),
}

pub type ExecutionResult<T> = Result<T, ExecutionError>;

/// Simple on-process circuit breaker for bulk request failures.
#[derive(Debug)]
struct CircuitBreaker {
    failures: u32,
    threshold: u32,
    cooldown: Duration,
    opened_at: Option<Instant>,
}

impl CircuitBreaker {
    fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            failures: 0,
            threshold,
            cooldown,
            opened_at: None,
        }
    }

    fn is_open(&self) -> bool {
        match self.opened_at {
            None => false,
            Some(opened) => opened.elapsed() < self.cooldown,
        }
    }

    fn allow(&mut self) -> bool {
        !self.is_open()
    }

    fn on_success(&mut self) {
        self.failures = 0;
        self.opened_at = None;
    }

    fn on_failure(&mut self) {
        self.failures = self.failures.saturating_add(1);
        if self.failures >= self.threshold {
            self.opened_at = Some(Instant::now());
            warn!(
                failures = self.failures,
                "mutation circuit breaker opened after consecutive failures"
            );
        }
    }
}

/// The Ads API as seen by the passes.
#[allow(async_fn_in_trait)]
pub trait MutationGateway {
    /// Dry-run gateways accept everything without touching the platform;
    /// callers must not write their results back.
    fn is_dry_run(&self) -> bool;

    async fn apply(&self, profile: &Profile, mutations: Vec<Mutation>) -> ExecutionResult<MutationOutcome>;

    /// `None` when there is no platform to pull from.
    async fn pull_campaigns(&self, profile: &Profile) -> ExecutionResult<Option<Vec<Campaign>>>;

    async fn pull_ad_groups(&self, profile: &Profile) -> ExecutionResult<Option<Vec<AdGroup>>>;

    async fn pull_targets(&self, profile: &Profile) -> ExecutionResult<Option<Vec<Target>>>;
}

/// Logs every mutation and reports it applied.
pub struct PaperGateway;

impl MutationGateway for PaperGateway {
    fn is_dry_run(&self) -> bool {
        true
    }

    async fn apply(&self, profile: &Profile, mutations: Vec<Mutation>) -> ExecutionResult<MutationOutcome> {
        let mut outcome = MutationOutcome::default();
        for mutation in mutations {
            info!(
                target: "paper",
                profile = profile.id,
                entity = mutation.entity().name,
                campaign = mutation.campaign_id(),
                payload = %mutation.to_payload(),
                "paper mutation"
            );
            outcome.applied.push(AppliedMutation {
                mutation,
                created_id: None,
            });
        }
        Ok(outcome)
    }

    async fn pull_campaigns(&self, _profile: &Profile) -> ExecutionResult<Option<Vec<Campaign>>> {
        Ok(None)
    }

    async fn pull_ad_groups(&self, _profile: &Profile) -> ExecutionResult<Option<Vec<AdGroup>>> {
        Ok(None)
    }

    async fn pull_targets(&self, _profile: &Profile) -> ExecutionResult<Option<Vec<Target>>> {
        Ok(None)
    }
}

/// Request groups in send order: campaigns, then updates, then creates.
const SEND_ORDER: [(&EntitySpec, bool); 7] = [
    (&CAMPAIGNS, false),
    (&KEYWORDS, false),
    (&TARGETS, false),
    (&KEYWORDS, true),
    (&TARGETS, true),
    (&NEGATIVE_KEYWORDS, true),
    (&NEGATIVE_TARGETS, true),
];

/// Sends mutations through the Ads API, grouped per entity and chunked by
/// the client.
pub struct LiveGateway<R> {
    api: AdsApiClient<R>,
}

impl<R: TokenRefresher> LiveGateway<R> {
    pub fn new(api: AdsApiClient<R>) -> Self {
        Self { api }
    }

    fn scope(profile: &Profile) -> ApiScope {
        ApiScope {
            region: profile.region,
            profile_id: profile.profile_id,
        }
    }
}

impl<R: TokenRefresher> MutationGateway for LiveGateway<R> {
    fn is_dry_run(&self) -> bool {
        false
    }

    async fn apply(&self, profile: &Profile, mutations: Vec<Mutation>) -> ExecutionResult<MutationOutcome> {
        let scope = Self::scope(profile);
        let mut outcome = MutationOutcome::default();

        for (spec, create) in SEND_ORDER {
            let group: Vec<&Mutation> = mutations
                .iter()
                .filter(|m| m.entity() == spec && m.is_create() == create)
                .collect();
            if group.is_empty() {
                continue;
            }

            let payloads: Vec<Value> = group.iter().map(|m| m.to_payload()).collect();
            let batch = if create {
                self.api.create(scope, spec, &payloads).await?
            } else {
                self.api.update(scope, spec, &payloads).await?
            };
            outcome.failed_requests += batch.failed_requests;

            for s in batch.successes {
                let Some(mutation) = group.get(s.index) else {
                    continue;
                };
                outcome.applied.push(AppliedMutation {
                    mutation: (*mutation).clone(),
                    created_id: if create { s.id.parse().ok() } else { None },
                });
            }
            for e in batch.errors {
                let Some(mutation) = group.get(e.index) else {
                    continue;
                };
                outcome.failed.push(FailedMutation {
                    mutation: (*mutation).clone(),
                    message: e.message,
                });
            }
        }
        Ok(outcome)
    }

    async fn pull_campaigns(&self, profile: &Profile) -> ExecutionResult<Option<Vec<Campaign>>> {
        let filter = json!({
            "stateFilter": {"include": ["ENABLED", "PAUSED"]},
            "maxResults": CAMPAIGNS.max_batch,
        });
        let items = self.api.list(Self::scope(profile), &CAMPAIGNS, filter).await?;
        Ok(Some(items.iter().filter_map(|v| campaign_from_api(profile.id, v)).collect()))
    }

    async fn pull_ad_groups(&self, profile: &Profile) -> ExecutionResult<Option<Vec<AdGroup>>> {
        let filter = json!({
            "stateFilter": {"include": ["ENABLED", "PAUSED"]},
            "maxResults": AD_GROUPS.max_batch,
        });
        let items = self.api.list(Self::scope(profile), &AD_GROUPS, filter).await?;
        Ok(Some(items.iter().filter_map(ad_group_from_api).collect()))
    }

    async fn pull_targets(&self, profile: &Profile) -> ExecutionResult<Option<Vec<Target>>> {
        let scope = Self::scope(profile);
        let filter = json!({
            "stateFilter": {"include": ["ENABLED", "PAUSED"]},
            "includeExtendedDataFields": true,
            "maxResults": KEYWORDS.max_batch,
        });

        let mut targets = Vec::new();
        for spec in [&KEYWORDS, &TARGETS, &NEGATIVE_KEYWORDS, &NEGATIVE_TARGETS] {
            let items = self.api.list(scope, spec, filter.clone()).await?;
            targets.extend(items.iter().filter_map(|v| target_from_api(profile.id, spec, v)));
        }
        Ok(Some(targets))
    }
}

/// Backend for execution: simulated (paper) or the live Ads API.
pub enum GatewayBackend {
    Paper(PaperGateway),
    Live(LiveGateway<LwaRefresher>),
}

/// Gateway picked from the execution mode, guarded by a circuit breaker.
pub struct MutationExecutor {
    backend: GatewayBackend,
    breaker: Mutex<CircuitBreaker>,
}

impl MutationExecutor {
    pub fn from_config(cfg: &AppConfig) -> ExecutionResult<Self> {
        let backend = match cfg.execution.mode {
            ExecutionMode::Paper => GatewayBackend::Paper(PaperGateway),
            ExecutionMode::Live => {
                let api = AdsApiClient::from_config(&cfg.api)?;
                GatewayBackend::Live(LiveGateway::new(api))
            }
        };
        Ok(Self::new(backend))
    }

    pub fn new(backend: GatewayBackend) -> Self {
        Self {
            backend,
            breaker: Mutex::new(CircuitBreaker::new(5, Duration::from_secs(60))),
        }
    }

    fn with_breaker<T>(&self, f: impl FnOnce(&mut CircuitBreaker) -> T) -> T {
        let mut guard = self.breaker.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }
}

impl MutationGateway for MutationExecutor {
    fn is_dry_run(&self) -> bool {
        match &self.backend {
            GatewayBackend::Paper(p) => p.is_dry_run(),
            GatewayBackend::Live(l) => l.is_dry_run(),
        }
    }

    async fn apply(&self, profile: &Profile, mutations: Vec<Mutation>) -> ExecutionResult<MutationOutcome> {
        if mutations.is_empty() {
            return Ok(MutationOutcome::default());
        }
        if !self.with_breaker(|b| b.allow()) {
            return Err(ExecutionError::CircuitOpen);
        }

        let result = match &self.backend {
            GatewayBackend::Paper(p) => p.apply(profile, mutations).await,
            GatewayBackend::Live(l) => l.apply(profile, mutations).await,
        };

        match &result {
            Ok(outcome) if outcome.failed_requests == 0 => self.with_breaker(|b| b.on_success()),
            Ok(outcome) => self.with_breaker(|b| {
                for _ in 0..outcome.failed_requests {
                    b.on_failure();
                }
            }),
            Err(_) => self.with_breaker(|b| b.on_failure()),
        }
        result
    }

    async fn pull_campaigns(&self, profile: &Profile) -> ExecutionResult<Option<Vec<Campaign>>> {
        match &self.backend {
            GatewayBackend::Paper(p) => p.pull_campaigns(profile).await,
            GatewayBackend::Live(l) => l.pull_campaigns(profile).await,
        }
    }

    async fn pull_ad_groups(&self, profile: &Profile) -> ExecutionResult<Option<Vec<AdGroup>>> {
        match &self.backend {
            GatewayBackend::Paper(p) => p.pull_ad_groups(profile).await,
            GatewayBackend::Live(l) => l.pull_ad_groups(profile).await,
        }
    }

    async fn pull_targets(&self, profile: &Profile) -> ExecutionResult<Option<Vec<Target>>> {
        match &self.backend {
            GatewayBackend::Paper(p) => p.pull_targets(profile).await,
            GatewayBackend::Live(l) => l.pull_targets(profile).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::auth::AccessToken;
    use crate::client::ClientResult;
    use crate::model::{EntityState, Region, TargetKind};
    use crate::types::ApiConfig;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    struct StaticToken;

    impl TokenRefresher for StaticToken {
        async fn refresh(&self, _region: Region) -> ClientResult<AccessToken> {
            Ok(AccessToken {
                value: "token".into(),
                expires_at: Instant::now() + Duration::from_secs(3_600),
            })
        }
    }

    /// Local Ads API stand-in: campaign updates succeed, every other
    /// endpoint answers 200 with an empty object.
    async fn stub_ads_api() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut sock, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    let mut chunk = [0u8; 4096];
                    loop {
                        let n = sock.read(&mut chunk).await.unwrap_or(0);
                        if n == 0 {
                            break;
                        }
                        buf.extend_from_slice(&chunk[..n]);
                        let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                            continue;
                        };
                        let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
                        let len = head
                            .lines()
                            .find_map(|l| l.strip_prefix("content-length:"))
                            .and_then(|v| v.trim().parse::<usize>().ok())
                            .unwrap_or(0);
                        if buf.len() >= end + 4 + len {
                            break;
                        }
                    }
                    let request = String::from_utf8_lossy(&buf);
                    let body = if request.starts_with("PUT /sp/campaigns ") {
                        r#"{"campaigns":{"success":[{"index":0,"campaignId":"100"}],"error":[]}}"#
                    } else {
                        "{}"
                    };
                    let resp = format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = sock.write_all(resp.as_bytes()).await;
                });
            }
        });
        format!("http://{addr}")
    }

    fn profile() -> Profile {
        Profile {
            id: 1,
            profile_id: 1234,
            region: Region::Na,
            country_code: "US".into(),
            daily_budget: 50.0,
            surplus_budget: 0.0,
            managed: true,
        }
    }

    #[test]
    fn circuit_breaker_opens_after_failures() {
        let mut cb = CircuitBreaker::new(3, Duration::from_secs(60));
        assert!(cb.allow());
        cb.on_failure();
        cb.on_failure();
        assert!(cb.allow());
        cb.on_failure();
        assert!(cb.is_open());
        assert!(!cb.allow());
        cb.on_success();
        assert!(cb.allow());
    }

    #[tokio::test]
    async fn paper_executor_applies_everything_without_ids() {
        let exec = MutationExecutor::new(GatewayBackend::Paper(PaperGateway));
        assert!(exec.is_dry_run());
        let out = exec
            .apply(
                &profile(),
                vec![
                    Mutation::UpdateTarget {
                        target_id: 5,
                        campaign_id: 2,
                        kind: TargetKind::Keyword,
                        bid: None,
                        state: Some(EntityState::Paused),
                    },
                    Mutation::CreateNegativeKeyword {
                        campaign_id: 2,
                        ad_group_id: 3,
                        text: "free books".into(),
                    },
                ],
            )
            .await
            .unwrap();
        assert_eq!(out.applied.len(), 2);
        assert!(out.failed.is_empty());
        assert!(out.applied.iter().all(|a| a.created_id.is_none()));
        assert!(exec.pull_campaigns(&profile()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unreadable_response_fails_only_its_own_group() {
        let cfg = ApiConfig {
            client_id: "id".into(),
            client_secret: "secret".into(),
            refresh_token: "refresh".into(),
            base_url: Some(stub_ads_api().await),
            max_retries: 0,
        };
        let api = AdsApiClient::new(reqwest::Client::new(), &cfg, StaticToken);
        let gateway = LiveGateway::new(api);

        let placements = Mutation::UpdatePlacements {
            campaign_id: 100,
            top_of_search_pct: 10.0,
            product_page_pct: 5.0,
        };
        let pause = Mutation::UpdateTarget {
            target_id: 7,
            campaign_id: 100,
            kind: TargetKind::Keyword,
            bid: None,
            state: Some(EntityState::Paused),
        };
        let out = gateway
            .apply(&profile(), vec![placements.clone(), pause.clone()])
            .await
            .unwrap();

        assert_eq!(out.applied.len(), 1);
        assert_eq!(out.applied[0].mutation, placements);
        assert_eq!(out.failed.len(), 1);
        assert_eq!(out.failed[0].mutation, pause);
        assert!(out.failed[0].message.contains("keywords"));
        assert_eq!(out.failed_requests, 1);
    }
}
