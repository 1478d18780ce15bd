//! Docker image build and three-tag publish.

use std::collections::HashMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use bollard::Docker;
use bollard::auth::DockerCredentials;
use bollard::image::{BuildImageOptions, PushImageOptions, TagImageOptions};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use regex::Regex;
use tracing::{debug, info};

use shipit_core::image::{
    ImageBuildSpec, ImagePublisher, ImageReference, PublishedImage, RegistryAuth, TagSet,
};
use shipit_core::{Error, Result};

use crate::context::archive_context;

// Push progress reports the digest in a status line like
// "1.4.0: digest: sha256:4f53... size: 1201".
static DIGEST_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"digest:\s*(sha256:[0-9a-f]+)").unwrap());

/// Image publisher backed by the local Docker daemon.
///
/// One build per run: the commit tag is the build's primary tag, the
/// version and latest tags are pure relabelings of the same image id,
/// and all three are pushed concurrently.
pub struct DockerImagePublisher {
    docker: Docker,
    auth: RegistryAuth,
}

impl DockerImagePublisher {
    /// Connect to the local Docker daemon.
    pub fn new(auth: RegistryAuth) -> Result<Self> {
        let docker =
            Docker::connect_with_local_defaults().map_err(|e| Error::Internal(e.to_string()))?;
        Ok(Self { docker, auth })
    }

    /// Create with a custom Docker client.
    pub fn with_client(docker: Docker, auth: RegistryAuth) -> Self {
        Self { docker, auth }
    }

    /// Daemon reachability, used by preflight checks.
    pub async fn ping(&self) -> Result<()> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| Error::Internal(format!("docker daemon unreachable: {e}")))
    }

    fn credentials(&self) -> DockerCredentials {
        DockerCredentials {
            username: Some(self.auth.username.clone()),
            password: Some(self.auth.password.expose().to_string()),
            ..Default::default()
        }
    }

    async fn build(&self, spec: &ImageBuildSpec) -> Result<()> {
        let tar = archive_context(&spec.context, &spec.dockerfile)?;
        let primary = &spec.tags.commit;

        let options = BuildImageOptions::<String> {
            dockerfile: spec.dockerfile.clone(),
            t: primary.canonical(),
            rm: true,
            pull: true,
            ..Default::default()
        };

        let mut registry_credentials = HashMap::new();
        registry_credentials.insert(primary.registry.clone(), self.credentials());

        info!(image = %primary, "building image");
        let mut stream = self.docker.build_image(
            options,
            Some(registry_credentials),
            Some(bollard::body_full(tar)),
        );

        while let Some(result) = stream.next().await {
            let update = result.map_err(|e| Error::Build(e.to_string()))?;
            if let Some(message) = update.error {
                return Err(Error::Build(message));
            }
            if let Some(line) = update.stream {
                let line = line.trim_end();
                if !line.is_empty() {
                    debug!(line = %line, "build output");
                }
            }
        }

        Ok(())
    }

    /// Relabel the built image under the version and latest references.
    async fn apply_tags(&self, tags: &TagSet) -> Result<()> {
        let source = tags.commit.canonical();
        for reference in [&tags.version, &tags.latest] {
            let options = TagImageOptions {
                repo: reference.name(),
                tag: reference.tag.clone(),
            };
            self.docker
                .tag_image(&source, Some(options))
                .await
                .map_err(|e| Error::Build(format!("tagging {reference} failed: {e}")))?;
        }
        Ok(())
    }

    /// Push one tag; yields the digest scraped from the status stream.
    async fn push_tag(&self, reference: &ImageReference) -> std::result::Result<String, String> {
        let options = PushImageOptions {
            tag: reference.tag.clone(),
        };

        info!(image = %reference, "pushing image");
        let mut stream =
            self.docker
                .push_image(&reference.name(), Some(options), Some(self.credentials()));

        let mut digest = None;
        while let Some(result) = stream.next().await {
            let update = result.map_err(|e| e.to_string())?;
            if let Some(message) = update.error {
                return Err(message);
            }
            if let Some(status) = update.status {
                if let Some(found) = scrape_digest(&status) {
                    digest = Some(found);
                }
                debug!(status = %status, "push progress");
            }
        }

        digest.ok_or_else(|| "push reported no digest".to_string())
    }
}

/// Extract a content digest from a push status line.
fn scrape_digest(status: &str) -> Option<String> {
    DIGEST_REGEX
        .captures(status)
        .map(|caps| caps[1].to_string())
}

/// Fold per-tag push results into the publish verdict.
///
/// `outcomes` holds one entry per tag that ran to completion; tags with
/// no entry were aborted after the first failure. Success requires all
/// three tags pushed with one identical digest; anything less names the
/// tags that made it and the tags that did not.
fn publish_verdict(
    tags: &TagSet,
    outcomes: &[(String, std::result::Result<String, String>)],
) -> Result<String> {
    let mut pushed = Vec::new();
    let mut failed = Vec::new();
    let mut reasons = Vec::new();
    let mut digests: Vec<(String, String)> = Vec::new();

    for reference in tags.all() {
        match outcomes.iter().find(|(tag, _)| tag == &reference.tag) {
            Some((tag, Ok(digest))) => {
                pushed.push(tag.clone());
                digests.push((tag.clone(), digest.clone()));
            }
            Some((tag, Err(reason))) => {
                failed.push(tag.clone());
                reasons.push(format!("{tag}: {reason}"));
            }
            None => {
                failed.push(reference.tag.clone());
                reasons.push(format!("{}: aborted after first failure", reference.tag));
            }
        }
    }

    if !failed.is_empty() {
        return Err(Error::Publish {
            pushed,
            failed,
            reason: reasons.join("; "),
        });
    }

    let Some(primary) = digests
        .iter()
        .find(|(tag, _)| *tag == tags.commit.tag)
        .map(|(_, digest)| digest.clone())
    else {
        return Err(Error::Internal(
            "primary tag missing from push outcomes".to_string(),
        ));
    };

    let (matching, mismatched): (Vec<_>, Vec<_>) =
        digests.iter().partition(|(_, digest)| *digest == primary);

    if !mismatched.is_empty() {
        return Err(Error::Publish {
            pushed: matching.into_iter().map(|(tag, _)| tag.clone()).collect(),
            failed: mismatched.into_iter().map(|(tag, _)| tag.clone()).collect(),
            reason: "pushed tags resolved to different digests".to_string(),
        });
    }

    Ok(primary)
}

#[async_trait]
impl ImagePublisher for DockerImagePublisher {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn publish(&self, spec: &ImageBuildSpec) -> Result<PublishedImage> {
        self.build(spec).await?;
        self.apply_tags(&spec.tags).await?;

        let mut pushes = FuturesUnordered::new();
        for reference in spec.tags.all() {
            pushes.push(async move {
                let outcome = self.push_tag(reference).await;
                (reference.tag.clone(), outcome)
            });
        }

        let mut outcomes = Vec::new();
        while let Some((tag, outcome)) = pushes.next().await {
            let failed = outcome.is_err();
            outcomes.push((tag, outcome));
            if failed {
                // Fail fast: the in-flight pushes are dropped.
                break;
            }
        }
        drop(pushes);

        let digest = publish_verdict(&spec.tags, &outcomes)?;
        info!(digest = %digest, "image published under three tags");

        Ok(PublishedImage {
            tags: spec.tags.clone(),
            digest,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipit_core::version::VersionMarker;

    fn make_tags() -> TagSet {
        let marker = VersionMarker::parse("1.4.0").unwrap();
        TagSet::derive(
            "ghcr.io",
            "acme/turplanlegger",
            &marker,
            "0123456789abcdef0123456789abcdef01234567",
        )
    }

    fn ok(tag: &str, digest: &str) -> (String, std::result::Result<String, String>) {
        (tag.to_string(), Ok(digest.to_string()))
    }

    fn err(tag: &str, reason: &str) -> (String, std::result::Result<String, String>) {
        (tag.to_string(), Err(reason.to_string()))
    }

    #[test]
    fn scrapes_digest_from_status_line() {
        let status = "1.4.0: digest: sha256:4f53cda18c2baa0c0354bb5f9a3ecbe5ed12ab4d8e11ba873c2f11161202b945 size: 1201";
        assert_eq!(
            scrape_digest(status).as_deref(),
            Some("sha256:4f53cda18c2baa0c0354bb5f9a3ecbe5ed12ab4d8e11ba873c2f11161202b945")
        );
    }

    #[test]
    fn ignores_non_digest_status_lines() {
        assert_eq!(scrape_digest("Pushing [=====>     ]"), None);
        assert_eq!(scrape_digest("Layer already exists"), None);
    }

    #[test]
    fn verdict_succeeds_when_all_tags_share_a_digest() {
        let tags = make_tags();
        let outcomes = vec![
            ok(&tags.commit.tag, "sha256:abc"),
            ok("1.4.0", "sha256:abc"),
            ok("latest", "sha256:abc"),
        ];

        let digest = publish_verdict(&tags, &outcomes).unwrap();
        assert_eq!(digest, "sha256:abc");
    }

    #[test]
    fn verdict_names_pushed_and_failed_tags() {
        let tags = make_tags();
        let outcomes = vec![
            ok(&tags.commit.tag, "sha256:abc"),
            ok("1.4.0", "sha256:abc"),
            err("latest", "connection reset by peer"),
        ];

        let err = publish_verdict(&tags, &outcomes).unwrap_err();
        match &err {
            Error::Publish {
                pushed,
                failed,
                reason,
            } => {
                assert_eq!(pushed.len(), 2);
                assert!(pushed.contains(&tags.commit.tag));
                assert!(pushed.contains(&"1.4.0".to_string()));
                assert_eq!(failed, &vec!["latest".to_string()]);
                assert!(reason.contains("connection reset"));
            }
            other => panic!("expected Publish, got {other:?}"),
        }
        assert_eq!(err.exit_code(), 14);
    }

    #[test]
    fn aborted_tags_count_as_failed() {
        let tags = make_tags();
        // Only the commit push completed before the fan-out was abandoned.
        let outcomes = vec![ok(&tags.commit.tag, "sha256:abc")];

        let err = publish_verdict(&tags, &outcomes).unwrap_err();
        match err {
            Error::Publish { pushed, failed, .. } => {
                assert_eq!(pushed, vec![tags.commit.tag.clone()]);
                assert_eq!(failed.len(), 2);
            }
            other => panic!("expected Publish, got {other:?}"),
        }
    }

    #[test]
    fn digest_mismatch_is_a_publish_failure() {
        let tags = make_tags();
        let outcomes = vec![
            ok(&tags.commit.tag, "sha256:abc"),
            ok("1.4.0", "sha256:abc"),
            ok("latest", "sha256:def"),
        ];

        let err = publish_verdict(&tags, &outcomes).unwrap_err();
        match err {
            Error::Publish { pushed, failed, reason } => {
                assert!(pushed.contains(&tags.commit.tag));
                assert_eq!(failed, vec!["latest".to_string()]);
                assert!(reason.contains("different digests"));
            }
            other => panic!("expected Publish, got {other:?}"),
        }
    }

    #[test]
    fn missing_digest_on_one_tag_fails_the_publish() {
        let tags = make_tags();
        let outcomes = vec![
            ok(&tags.commit.tag, "sha256:abc"),
            err("1.4.0", "push reported no digest"),
        ];

        let err = publish_verdict(&tags, &outcomes).unwrap_err();
        assert!(matches!(err, Error::Publish { .. }));
    }
}
