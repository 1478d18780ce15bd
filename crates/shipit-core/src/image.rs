//! Container image references and the publisher seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::Result;
use crate::secret::Secret;
use crate::version::VersionMarker;

/// A fully qualified image reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageReference {
    pub registry: String,
    pub repository: String,
    pub tag: String,
}

impl ImageReference {
    /// Build a reference. Repositories are lower-cased; registries
    /// reject mixed-case paths.
    pub fn new(
        registry: impl Into<String>,
        repository: impl Into<String>,
        tag: impl Into<String>,
    ) -> Self {
        Self {
            registry: registry.into(),
            repository: repository.into().to_lowercase(),
            tag: tag.into(),
        }
    }

    /// Render `registry/repository:tag`.
    pub fn canonical(&self) -> String {
        self.to_string()
    }

    /// The untagged name, `registry/repository`.
    pub fn name(&self) -> String {
        format!("{}/{}", self.registry, self.repository)
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.registry, self.repository, self.tag)
    }
}

/// The three-tag fan-out derived from a single build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSet {
    /// Floating convenience tag.
    pub latest: ImageReference,
    /// Human-readable release tag.
    pub version: ImageReference,
    /// Immutable traceability tag (full commit hash).
    pub commit: ImageReference,
}

impl TagSet {
    /// Derive the three references for one release.
    pub fn derive(registry: &str, repository: &str, marker: &VersionMarker, commit: &str) -> Self {
        Self {
            latest: ImageReference::new(registry, repository, "latest"),
            version: ImageReference::new(registry, repository, marker.as_str()),
            commit: ImageReference::new(registry, repository, commit),
        }
    }

    /// All references, commit tag first (the build's primary tag).
    pub fn all(&self) -> [&ImageReference; 3] {
        [&self.commit, &self.version, &self.latest]
    }
}

/// Inputs for one build-and-publish pass.
#[derive(Debug, Clone)]
pub struct ImageBuildSpec {
    /// Build context directory.
    pub context: PathBuf,
    /// Dockerfile path relative to the context.
    pub dockerfile: String,
    pub tags: TagSet,
}

/// Registry credentials, distinct from the forge installation token.
#[derive(Debug, Clone)]
pub struct RegistryAuth {
    pub username: String,
    pub password: Secret,
}

/// Result of a successful three-tag publish.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishedImage {
    pub tags: TagSet,
    /// Content digest common to all three references.
    pub digest: String,
}

impl PublishedImage {
    /// The commit-hash reference; the only one deployment consumes.
    pub fn by_commit(&self) -> &ImageReference {
        &self.tags.commit
    }
}

/// Trait for image publishers.
#[async_trait]
pub trait ImagePublisher: Send + Sync {
    /// Name of this publisher.
    fn name(&self) -> &'static str;

    /// Build once, tag three ways, push every tag, verify one digest.
    async fn publish(&self, spec: &ImageBuildSpec) -> Result<PublishedImage>;
}
