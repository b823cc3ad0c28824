use std::time::Duration;

use rand::Rng;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, Method, Response, StatusCode};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::time::sleep;

use crate::model::Region;
use crate::types::ApiConfig;

use super::auth::{LwaRefresher, TokenRefresher, TokenStore};
use super::entities::EntitySpec;
use super::{ClientError, ClientResult};

pub fn regional_host(region: Region) -> &'static str {
    match region {
        Region::Na => "https://advertising-api.amazon.com",
        Region::Eu => "https://advertising-api-eu.amazon.com",
        Region::Fe => "https://advertising-api-fe.amazon.com",
    }
}

/// Which advertiser account a request acts on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ApiScope {
    pub region: Region,
    pub profile_id: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ItemSuccess {
    /// Position in the caller's item list, across chunks.
    pub index: usize,
    pub id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ItemError {
    pub index: usize,
    pub message: String,
}

/// Per-item result of a chunked create or update.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub successes: Vec<ItemSuccess>,
    pub errors: Vec<ItemError>,
    /// Bulk requests that failed as a whole; their items are in `errors`.
    pub failed_requests: usize,
}

impl BatchOutcome {
    fn absorb(&mut self, other: BatchOutcome) {
        self.successes.extend(other.successes);
        self.errors.extend(other.errors);
        self.failed_requests += other.failed_requests;
    }

    /// Fold in one chunk's result. A chunk whose request failed or whose
    /// response could not be read becomes one error per item; earlier
    /// chunks keep their outcome.
    fn record_chunk(
        &mut self,
        offset: usize,
        size: usize,
        result: ClientResult<BatchOutcome>,
    ) -> Option<ClientError> {
        match result {
            Ok(chunk) => {
                self.absorb(chunk);
                None
            }
            Err(err) => {
                let message = err.to_string();
                self.failed_requests += 1;
                self.errors.extend((0..size).map(|i| ItemError {
                    index: offset + i,
                    message: message.clone(),
                }));
                Some(err)
            }
        }
    }
}

fn envelope(key: &str, value: Value) -> Value {
    let mut body = Map::new();
    body.insert(key.to_string(), value);
    Value::Object(body)
}

fn id_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn describe_error(err: &Value) -> String {
    let kind = err.get("errorType").and_then(Value::as_str).unwrap_or("unknown");
    let detail = err
        .get("errorValue")
        .and_then(Value::as_object)
        .and_then(|m| m.values().next())
        .and_then(|v| v.get("message"))
        .and_then(Value::as_str);
    match detail {
        Some(msg) => format!("{kind}: {msg}"),
        None => kind.to_string(),
    }
}

/// Split a bulk response envelope into per-item successes and errors,
/// shifting indexes by the chunk `offset`.
pub fn parse_batch_response(spec: &EntitySpec, resp: &Value, offset: usize) -> ClientResult<BatchOutcome> {
    let section = resp.get(spec.response_key).ok_or_else(|| {
        ClientError::UnexpectedResponse(format!("{} response without `{}`", spec.name, spec.response_key))
    })?;

    let mut out = BatchOutcome::default();
    for item in section.get("success").and_then(Value::as_array).into_iter().flatten() {
        let index = item.get("index").and_then(Value::as_u64).unwrap_or(0) as usize;
        let Some(id) = item.get(spec.id_field).and_then(id_to_string) else {
            out.errors.push(ItemError {
                index: offset + index,
                message: format!("success entry without {}", spec.id_field),
            });
            continue;
        };
        out.successes.push(ItemSuccess {
            index: offset + index,
            id,
        });
    }

    for item in section.get("error").and_then(Value::as_array).into_iter().flatten() {
        let index = item.get("index").and_then(Value::as_u64).unwrap_or(0) as usize;
        let message = item
            .get("errors")
            .and_then(Value::as_array)
            .map(|errs| errs.iter().map(describe_error).collect::<Vec<_>>().join("; "))
            .unwrap_or_else(|| item.to_string());
        out.errors.push(ItemError {
            index: offset + index,
            message,
        });
    }
    Ok(out)
}

/// Continuation token of a list page; absent or empty ends the listing.
pub fn next_page_token(resp: &Value) -> Option<String> {
    resp.get("nextToken")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Generic Sponsored Products client. Entity differences live in
/// [`EntitySpec`]; this type only knows the shared request shapes.
pub struct AdsApiClient<R> {
    http: Client,
    client_id: String,
    base_url: Option<String>,
    tokens: TokenStore<R>,
    max_retries: u32,
}

impl AdsApiClient<LwaRefresher> {
    pub fn from_config(config: &ApiConfig) -> ClientResult<Self> {
        if config.client_id.is_empty() || config.refresh_token.is_empty() {
            return Err(ClientError::Config(
                "api.client_id and api.refresh_token must be configured for live mode".to_string(),
            ));
        }
        let http = Client::builder()
            .user_agent("kdp-ads-optimizer/0.1")
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(ClientError::Http)?;
        let refresher = LwaRefresher::new(http.clone(), config);
        Ok(Self::new(http, config, refresher))
    }
}

impl<R: TokenRefresher> AdsApiClient<R> {
    pub fn new(http: Client, config: &ApiConfig, refresher: R) -> Self {
        Self {
            http,
            client_id: config.client_id.clone(),
            base_url: config.base_url.clone(),
            tokens: TokenStore::new(refresher),
            max_retries: config.max_retries,
        }
    }

    fn url(&self, region: Region, path: &str) -> String {
        let base = self.base_url.as_deref().unwrap_or(regional_host(region));
        format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    fn backoff(attempt: u32) -> Duration {
        let capped = attempt.min(5);
        let millis = (500 * (1_u64 << capped)).min(8_000);
        let jitter = rand::rng().random_range(0..250);
        Duration::from_millis(millis + jitter)
    }

    fn retry_after(resp: &Response) -> Option<Duration> {
        resp.headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }

    async fn send(
        &self,
        method: Method,
        scope: ApiScope,
        spec: &EntitySpec,
        path: &str,
        body: &Value,
    ) -> ClientResult<Value> {
        let url = self.url(scope.region, path);
        let payload = serde_json::to_string(body)?;

        let mut attempt = 0;
        loop {
            let token = self.tokens.get(scope.region).await?;
            let req = self
                .http
                .request(method.clone(), &url)
                .header("Amazon-Advertising-API-ClientId", &self.client_id)
                .header("Amazon-Advertising-API-Scope", scope.profile_id.to_string())
                .header(AUTHORIZATION, format!("Bearer {token}"))
                .header(CONTENT_TYPE, spec.media_type)
                .header(ACCEPT, spec.media_type)
                .body(payload.clone());

            match req.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return Ok(resp.json::<Value>().await?);
                    }

                    if status == StatusCode::UNAUTHORIZED && attempt < self.max_retries {
                        attempt += 1;
                        self.tokens.invalidate(scope.region).await;
                        continue;
                    }

                    if (status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error())
                        && attempt < self.max_retries
                    {
                        attempt += 1;
                        let wait = Self::retry_after(&resp).unwrap_or_else(|| Self::backoff(attempt));
                        tracing::warn!(
                            target: "ads_api",
                            entity = spec.name,
                            status = %status,
                            attempt,
                            wait_ms = wait.as_millis() as u64,
                            "retrying Ads API request"
                        );
                        sleep(wait).await;
                        continue;
                    }

                    let body = resp.text().await.unwrap_or_default();
                    return Err(ClientError::HttpStatus { status, body });
                }
                Err(err) => {
                    if attempt < self.max_retries {
                        attempt += 1;
                        sleep(Self::backoff(attempt)).await;
                        continue;
                    }
                    return Err(ClientError::Http(err));
                }
            }
        }
    }

    async fn write(
        &self,
        method: Method,
        scope: ApiScope,
        spec: &EntitySpec,
        items: &[Value],
    ) -> ClientResult<BatchOutcome> {
        let mut outcome = BatchOutcome::default();
        for (n, chunk) in items.chunks(spec.max_batch).enumerate() {
            let offset = n * spec.max_batch;
            let body = envelope(spec.response_key, Value::Array(chunk.to_vec()));
            let result = match self.send(method.clone(), scope, spec, spec.path, &body).await {
                Ok(resp) => parse_batch_response(spec, &resp, offset),
                Err(err) => Err(err),
            };
            if let Some(err) = outcome.record_chunk(offset, chunk.len(), result) {
                tracing::warn!(
                    target: "ads_api",
                    entity = spec.name,
                    profile_id = scope.profile_id,
                    offset,
                    size = chunk.len(),
                    error = %err,
                    "bulk request failed"
                );
            }
        }
        Ok(outcome)
    }

    pub async fn create(&self, scope: ApiScope, spec: &EntitySpec, items: &[Value]) -> ClientResult<BatchOutcome> {
        self.write(Method::POST, scope, spec, items).await
    }

    pub async fn update(&self, scope: ApiScope, spec: &EntitySpec, items: &[Value]) -> ClientResult<BatchOutcome> {
        self.write(Method::PUT, scope, spec, items).await
    }

    /// List every entity matching `filter`, following continuation tokens.
    pub async fn list(&self, scope: ApiScope, spec: &EntitySpec, filter: Value) -> ClientResult<Vec<Value>> {
        let path = format!("{}/list", spec.path);
        let base = match filter {
            Value::Object(m) => m,
            _ => Map::new(),
        };

        let mut items = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let mut body = base.clone();
            if let Some(token) = &next_token {
                body.insert("nextToken".to_string(), Value::String(token.clone()));
            }
            let resp = self
                .send(Method::POST, scope, spec, &path, &Value::Object(body))
                .await?;
            let page = resp
                .get(spec.response_key)
                .and_then(Value::as_array)
                .ok_or_else(|| {
                    ClientError::UnexpectedResponse(format!("{} list without `{}`", spec.name, spec.response_key))
                })?;
            items.extend(page.iter().cloned());

            match next_page_token(&resp) {
                Some(token) => next_token = Some(token),
                None => break,
            }
        }
        tracing::debug!(target: "ads_api", entity = spec.name, profile_id = scope.profile_id, count = items.len(), "listed entities");
        Ok(items)
    }
}
