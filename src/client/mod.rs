use thiserror::Error;

pub mod ads_api;
pub mod auth;
pub mod entities;

pub use ads_api::{AdsApiClient, ApiScope, BatchOutcome, ItemError, ItemSuccess};
pub use auth::{LwaRefresher, TokenRefresher, TokenStore};
pub use entities::EntitySpec;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {status}: {body}")]
    HttpStatus {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("serialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("authorization error: {0}")]
    Auth(String),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type ClientResult<T> = Result<T, ClientError>;
