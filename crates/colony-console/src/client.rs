//! HTTP client for the resource API.
//!
//! Only the two listings the pollers need are implemented. Every failure is
//! turned into a [`ClientError`] whose message is what the dashboard shows
//! next to the stale data.

use std::sync::Arc;

use colony_types::{Room, Worker};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::ApiConfig;

/// Errors returned by the resource client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// The HTTP client could not be built.
    #[error("HTTP client setup failed: {0}")]
    Setup(String),

    /// The request could not be sent or timed out.
    #[error("request to {path} failed: {message}")]
    Request {
        /// The API path requested.
        path: String,
        /// Transport-level failure.
        message: String,
    },

    /// The API answered with a non-success status.
    #[error("{path} returned {status}: {body}")]
    Status {
        /// The API path requested.
        path: String,
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },

    /// The response body was not the expected JSON.
    #[error("unexpected response from {path}: {message}")]
    Decode {
        /// The API path requested.
        path: String,
        /// Decoder failure.
        message: String,
    },
}

/// Client for the resource API. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ResourceClient {
    http: reqwest::Client,
    base_url: Arc<str>,
    token: Option<Arc<str>>,
}

impl ResourceClient {
    /// Build a client from the `api` configuration section.
    pub fn new(config: &ApiConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ClientError::Setup(e.to_string()))?;
        Ok(Self {
            http,
            base_url: Arc::from(config.url.trim_end_matches('/')),
            token: config.token.as_deref().map(Arc::from),
        })
    }

    /// `GET /api/rooms`.
    pub async fn list_rooms(&self) -> Result<Vec<Room>, ClientError> {
        self.get_json("/api/rooms").await
    }

    /// `GET /api/workers`.
    pub async fn list_workers(&self) -> Result<Vec<Worker>, ClientError> {
        self.get_json("/api/workers").await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let mut request = self.http.get(self.url(path));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| ClientError::Request {
            path: path.to_owned(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error body".to_owned());
            return Err(ClientError::Status {
                path: path.to_owned(),
                status: status.as_u16(),
                body,
            });
        }

        let value = response.json().await.map_err(|e| ClientError::Decode {
            path: path.to_owned(),
            message: e.to_string(),
        })?;
        debug!(path, "resource fetched");
        Ok(value)
    }
}
