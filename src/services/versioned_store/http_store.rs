//! HTTP-backed versioned store.
//!
//! Talks to any endpoint that serves a single object with entity tags:
//! `GET` returns the body and an `ETag`, `PUT` honours `If-Match` /
//! `If-None-Match: *` and answers 409 or 412 when the precondition fails.

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, ETAG, IF_MATCH, IF_NONE_MATCH};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;

use super::{StoreError, Version, Versioned, VersionedStore};

const REQUEST_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Clone)]
pub struct HttpStore {
    client: Client,
    url: String,
    token: Option<String>,
}

impl HttpStore {
    pub fn new(url: String, token: Option<String>) -> Self {
        let client = Client::builder()
            .user_agent("Paperbot/1.0")
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { client, url, token }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.token {
            Some(ref token) => request.bearer_auth(token),
            None => request,
        }
    }
}

fn etag(headers: &reqwest::header::HeaderMap) -> Result<Version, StoreError> {
    headers
        .get(ETAG)
        .and_then(|v| v.to_str().ok())
        .map(Version::new)
        .ok_or_else(|| StoreError::InvalidResponse("missing ETag header".to_string()))
}

fn network(e: reqwest::Error) -> StoreError {
    StoreError::Network(e.to_string())
}

#[async_trait]
impl VersionedStore for HttpStore {
    fn name(&self) -> &str {
        "http"
    }

    async fn pull(&self) -> Result<Option<Versioned>, StoreError> {
        let response = self
            .authorize(self.client.get(&self.url))
            .send()
            .await
            .map_err(network)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!("Remote ledger not found at {}", self.url);
            return Ok(None);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(StoreError::Http {
                status: status.as_u16(),
                message: text.chars().take(200).collect(),
            });
        }

        let version = etag(response.headers())?;
        let content = response.bytes().await.map_err(network)?.to_vec();
        Ok(Some(Versioned { content, version }))
    }

    async fn put(&self, content: &[u8], expected: Option<&Version>) -> Result<Version, StoreError> {
        let mut request = self
            .authorize(self.client.put(&self.url))
            .header(CONTENT_TYPE, "application/json")
            .body(content.to_vec());

        request = match expected {
            Some(version) => request.header(IF_MATCH, version.as_str()),
            None => request.header(IF_NONE_MATCH, "*"),
        };

        let response = request.send().await.map_err(network)?;
        let status = response.status();

        if status == StatusCode::CONFLICT || status == StatusCode::PRECONDITION_FAILED {
            return Err(StoreError::Conflict {
                expected: expected.cloned(),
            });
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(StoreError::Http {
                status: status.as_u16(),
                message: text.chars().take(200).collect(),
            });
        }

        etag(response.headers())
    }
}
