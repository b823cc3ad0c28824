use std::time::{Duration, Instant};

use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::model::Region;
use crate::types::ApiConfig;

use super::{ClientError, ClientResult};

/// Tokens this close to expiry are refreshed before use.
const REFRESH_SKEW: Duration = Duration::from_secs(60);

#[derive(Clone, Debug)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: Instant,
}

impl AccessToken {
    fn is_fresh(&self, now: Instant) -> bool {
        self.expires_at > now + REFRESH_SKEW
    }
}

#[allow(async_fn_in_trait)]
pub trait TokenRefresher {
    async fn refresh(&self, region: Region) -> ClientResult<AccessToken>;
}

/// Login with Amazon token endpoint for a region.
pub fn token_endpoint(region: Region) -> &'static str {
    match region {
        Region::Na => "https://api.amazon.com/auth/o2/token",
        Region::Eu => "https://api.amazon.co.uk/auth/o2/token",
        Region::Fe => "https://api.amazon.co.jp/auth/o2/token",
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

/// Exchanges the configured refresh token for short-lived access tokens.
pub struct LwaRefresher {
    http: Client,
    client_id: String,
    client_secret: String,
    refresh_token: String,
}

impl LwaRefresher {
    pub fn new(http: Client, config: &ApiConfig) -> Self {
        Self {
            http,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            refresh_token: config.refresh_token.clone(),
        }
    }
}

impl TokenRefresher for LwaRefresher {
    async fn refresh(&self, region: Region) -> ClientResult<AccessToken> {
        let resp = self
            .http
            .post(token_endpoint(region))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", self.refresh_token.as_str()),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Auth(format!(
                "token refresh for {region} failed with {status}: {body}"
            )));
        }

        let token: TokenResponse = resp.json().await?;
        tracing::debug!(target: "auth", region = %region, expires_in = token.expires_in, "access token refreshed");
        Ok(AccessToken {
            value: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        })
    }
}

/// Per-region access token cache.
///
/// Each region has its own async mutex held across the refresh call, so
/// concurrent callers wait for one refresh instead of racing.
pub struct TokenStore<R> {
    refresher: R,
    na: Mutex<Option<AccessToken>>,
    eu: Mutex<Option<AccessToken>>,
    fe: Mutex<Option<AccessToken>>,
}

impl<R: TokenRefresher> TokenStore<R> {
    pub fn new(refresher: R) -> Self {
        Self {
            refresher,
            na: Mutex::new(None),
            eu: Mutex::new(None),
            fe: Mutex::new(None),
        }
    }

    fn slot(&self, region: Region) -> &Mutex<Option<AccessToken>> {
        match region {
            Region::Na => &self.na,
            Region::Eu => &self.eu,
            Region::Fe => &self.fe,
        }
    }

    pub async fn get(&self, region: Region) -> ClientResult<String> {
        let mut slot = self.slot(region).lock().await;
        if let Some(token) = slot.as_ref() {
            if token.is_fresh(Instant::now()) {
                return Ok(token.value.clone());
            }
        }
        let token = self.refresher.refresh(region).await?;
        let value = token.value.clone();
        *slot = Some(token);
        Ok(value)
    }

    /// Drop the cached token, e.g. after the API answered 401.
    pub async fn invalidate(&self, region: Region) {
        *self.slot(region).lock().await = None;
    }
}
