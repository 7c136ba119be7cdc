//! Remote changeset API client.
//!
//! Only the two calls the bundle transport needs live here: resolving an
//! abbreviated session id and asking where a changeset's bundle can be
//! downloaded. Authentication is a bearer token taken from configuration.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::core::changeset::ChangesetId;
use crate::error::{FerryError, Result};
use crate::io::config::ApiConfig;

const API_TIMEOUT: Duration = Duration::from_secs(30);

/// Where a changeset's bundle lives, as reported by the remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleLocation {
    /// `None` while the remote is still packaging the bundle.
    #[serde(default)]
    pub download_url: Option<String>,
    pub has_changes: bool,
    /// Hex SHA-256 of the bundle bytes, when the remote publishes one.
    #[serde(default)]
    pub sha256: Option<String>,
}

/// Remote calls consumed by the bundle transport.
#[async_trait]
pub trait ChangesetApi: Send + Sync {
    /// Expand a session id prefix to the one full id it matches.
    async fn resolve_session_prefix(&self, prefix: &str) -> Result<String>;

    async fn bundle_location(&self, id: &ChangesetId) -> Result<BundleLocation>;
}

#[derive(Debug, Deserialize)]
struct SessionList {
    sessions: Vec<SessionRef>,
}

#[derive(Debug, Deserialize)]
struct SessionRef {
    id: String,
}

/// [`ChangesetApi`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpChangesetApi {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpChangesetApi {
    pub fn new(config: &ApiConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(API_TIMEOUT)
            .user_agent(concat!("ferry/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn get(&self, url: &str) -> RequestBuilder {
        let req = self.client.get(url);
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }
}

#[async_trait]
impl ChangesetApi for HttpChangesetApi {
    #[instrument(skip(self))]
    async fn resolve_session_prefix(&self, prefix: &str) -> Result<String> {
        let url = self.endpoint("sessions");
        let response = self
            .get(&url)
            .query(&[("prefix", prefix)])
            .send()
            .await
            .map_err(|err| request_error(&url, err))?;
        let response = check_status(response, prefix).await?;
        let list: SessionList = response
            .json()
            .await
            .map_err(|err| FerryError::Api(format!("decode session list: {err}")))?;
        let mut matches: Vec<String> = list
            .sessions
            .into_iter()
            .map(|s| s.id)
            .filter(|id| id.starts_with(prefix))
            .collect();
        matches.sort();
        matches.dedup();
        debug!(matches = matches.len(), "resolved session prefix");
        match matches.len() {
            0 => Err(FerryError::ChangesetNotFound {
                id: prefix.to_string(),
            }),
            1 => Ok(matches.remove(0)),
            _ => Err(FerryError::AmbiguousId {
                prefix: prefix.to_string(),
                matches,
            }),
        }
    }

    #[instrument(skip(self), fields(id = %id))]
    async fn bundle_location(&self, id: &ChangesetId) -> Result<BundleLocation> {
        let collection = match id {
            ChangesetId::Job(_) => "jobs",
            ChangesetId::Session(_) => "sessions",
        };
        let url = self.endpoint(&format!("{collection}/{}/bundle", id.raw()));
        let response = self
            .get(&url)
            .send()
            .await
            .map_err(|err| request_error(&url, err))?;
        let response = check_status(response, id.raw()).await?;
        response
            .json()
            .await
            .map_err(|err| FerryError::Api(format!("decode bundle location: {err}")))
    }
}

async fn check_status(response: reqwest::Response, id: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(FerryError::ChangesetNotFound { id: id.to_string() });
    }
    let body = response.text().await.unwrap_or_default();
    Err(FerryError::Api(format!("{status}: {}", body.trim())))
}

fn request_error(url: &str, err: reqwest::Error) -> FerryError {
    if err.is_timeout() {
        FerryError::Timeout(format!("request to {url}"))
    } else {
        FerryError::Api(format!("request to {url} failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundle_location_tolerates_missing_optional_fields() {
        let loc: BundleLocation = serde_json::from_str(r#"{"has_changes": false}"#).expect("parse");
        assert_eq!(
            loc,
            BundleLocation {
                download_url: None,
                has_changes: false,
                sha256: None,
            }
        );
    }

    #[test]
    fn endpoint_joins_without_double_slashes() {
        let api = HttpChangesetApi::new(&ApiConfig {
            base_url: "http://localhost:9000/".to_string(),
            token: None,
        })
        .expect("client");
        assert_eq!(
            api.endpoint("/jobs/run_1/bundle"),
            "http://localhost:9000/v1/jobs/run_1/bundle"
        );
    }
}
