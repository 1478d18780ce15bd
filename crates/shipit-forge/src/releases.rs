//! Release publication against the forge.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use shipit_core::broker::InstallationToken;
use shipit_core::release::{ReleaseHost, ReleaseRecord, ReleaseRequest};
use shipit_core::{Error, Result};

use crate::USER_AGENT;

/// Release publisher bound to one repository.
pub struct ForgeReleases {
    client: reqwest::Client,
    api_url: String,
    owner: String,
    repo: String,
}

#[derive(Debug, Deserialize)]
struct ReleaseResponse {
    id: u64,
    tag_name: String,
    html_url: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    code: String,
}

impl ForgeReleases {
    pub fn new(
        api_url: impl Into<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            client: crate::http_client(crate::REQUEST_TIMEOUT)?,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            owner: owner.into(),
            repo: repo.into(),
        })
    }

    fn payload(request: &ReleaseRequest) -> serde_json::Value {
        json!({
            "tag_name": request.tag.as_str(),
            "target_commitish": request.target,
            "name": request.title,
            "generate_release_notes": request.generate_notes,
            // The forge expects a string enum here, not a bool.
            "make_latest": if request.make_latest { "true" } else { "false" },
        })
    }
}

/// Classify a failed publish response into the error taxonomy.
///
/// A 422 whose error list carries `already_exists` means the tag is
/// taken: a re-run without a marker bump, reported as a conflict and
/// never retried. Authorization shapes (401/403, and 404 which the forge
/// uses to hide repositories from unauthorized callers) map to `Auth`.
fn classify_failure(status: reqwest::StatusCode, body: &str, tag: &str) -> Error {
    use reqwest::StatusCode;

    let parsed: ApiErrorBody = serde_json::from_str(body).unwrap_or_default();

    if status == StatusCode::UNPROCESSABLE_ENTITY
        && parsed.errors.iter().any(|e| e.code == "already_exists")
    {
        return Error::Conflict(format!("release tag {tag} already exists"));
    }

    let message = if parsed.message.is_empty() {
        body.to_string()
    } else {
        parsed.message
    };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
            Error::Auth(format!("release publish rejected ({status}): {message}"))
        }
        _ => Error::Internal(format!("release publish failed ({status}): {message}")),
    }
}

#[async_trait]
impl ReleaseHost for ForgeReleases {
    fn name(&self) -> &'static str {
        "forge"
    }

    async fn publish(
        &self,
        token: &InstallationToken,
        request: &ReleaseRequest,
    ) -> Result<ReleaseRecord> {
        let url = format!(
            "{}/repos/{}/{}/releases",
            self.api_url, self.owner, self.repo
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", token.token.expose()))
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/vnd.github+json")
            .json(&Self::payload(request))
            .send()
            .await
            .map_err(|e| Error::Internal(format!("release request failed: {e}")))?;

        let status = response.status();
        if status != reqwest::StatusCode::CREATED {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &body, request.tag.as_str()));
        }

        let parsed: ReleaseResponse = response
            .json()
            .await
            .map_err(|e| Error::Internal(format!("release response malformed: {e}")))?;

        info!(tag = %parsed.tag_name, url = %parsed.html_url, "release published");

        Ok(ReleaseRecord {
            id: parsed.id,
            tag: parsed.tag_name,
            html_url: parsed.html_url,
            created_at: parsed.created_at,
        })
    }
}
