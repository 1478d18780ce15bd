//! Release publication types and the release-host seam.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::broker::InstallationToken;
use crate::version::VersionMarker;

/// Request to publish a tag+release for a resolved version marker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseRequest {
    /// Tag to create; equal to the version marker.
    pub tag: VersionMarker,
    /// Branch or commit the new tag points at.
    pub target: String,
    /// Human-facing release title.
    pub title: String,
    /// Ask the forge to generate release notes.
    pub generate_notes: bool,
    /// Mark the release as the repository's latest.
    pub make_latest: bool,
}

/// A release accepted by the forge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseRecord {
    /// Forge-assigned release id.
    pub id: u64,
    pub tag: String,
    pub html_url: String,
    pub created_at: DateTime<Utc>,
}

/// Trait for release hosts.
#[async_trait]
pub trait ReleaseHost: Send + Sync {
    /// Name of this host.
    fn name(&self) -> &'static str;

    /// Publish a tag+release. An existing tag is a conflict, never
    /// silently reused.
    async fn publish(
        &self,
        token: &InstallationToken,
        request: &ReleaseRequest,
    ) -> Result<ReleaseRecord>;
}
