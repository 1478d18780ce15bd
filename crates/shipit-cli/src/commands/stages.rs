//! Per-component commands: each pipeline stage runnable on its own.

use anyhow::Result;
use shipit_config::git::is_full_hash;
use shipit_core::deploy::DeploymentRequest;
use shipit_core::image::ImageReference;
use shipit_core::version::read_marker;
use shipit_pipeline::RunPlan;

use super::{
    load_config, load_context, make_broker, make_deployer, make_images, make_releases, repo_root,
};

/// Resolve and print the version marker.
pub fn version(config_path: &str) -> Result<()> {
    let config = load_config(config_path)?;
    let marker = repo_root(config_path).join(&config.version.marker);
    let version = read_marker(&marker)?;
    println!("{}", version);
    Ok(())
}

/// Exchange app credentials; prints the expiry, never the token.
pub async fn auth(config_path: &str) -> Result<()> {
    let config = load_config(config_path)?;
    let broker = make_broker(&config)?;
    let token = broker.installation_token().await?;
    println!("installation token minted; expires {}", token.expires_at);
    Ok(())
}

/// Publish the release for the current marker.
pub async fn release(config_path: &str) -> Result<()> {
    let context = load_context(config_path)?;
    let plan = RunPlan::from_config(&context.config, &context.git, &context.root);
    let version = read_marker(&plan.marker_path)?;

    let broker = make_broker(&context.config)?;
    let token = broker.installation_token().await?;

    let releases = make_releases(&context.config)?;
    let record = releases
        .publish(&token, &plan.release_request(&version))
        .await?;
    println!("release {} published: {}", record.tag, record.html_url);
    Ok(())
}

/// Build the image once and push the three-tag set.
pub async fn image(config_path: &str) -> Result<()> {
    let context = load_context(config_path)?;
    let plan = RunPlan::from_config(&context.config, &context.git, &context.root);
    let version = read_marker(&plan.marker_path)?;

    let images = make_images()?;
    let published = images.publish(&plan.build_spec(&version)).await?;

    println!("published at digest {}", published.digest);
    for reference in published.tags.all() {
        println!("  {}", reference);
    }
    Ok(())
}

/// Request a rollout of an explicit image reference.
pub async fn deploy(config_path: &str, image: &str) -> Result<()> {
    let config = load_config(config_path)?;
    let reference = parse_reference(image)?;

    let deployer = make_deployer(&config)?;
    let request = DeploymentRequest {
        resource: config.deploy.resource.clone(),
        resource_group: config.deploy.resource_group.clone(),
        image: reference,
    };
    let receipt = deployer.roll_out(&request).await?;
    println!(
        "rollout accepted: {} -> {} ({})",
        receipt.resource, receipt.image, receipt.status
    );
    Ok(())
}

/// Parse `registry/repository:tag`, insisting on a commit-hash tag.
///
/// Rollouts pin by commit for traceability; version and latest tags are
/// for humans and must not be deployed.
fn parse_reference(value: &str) -> Result<ImageReference> {
    let Some(slash) = value.find('/') else {
        anyhow::bail!("image reference {value:?} must look like registry/repository:commit-hash");
    };
    let (registry, rest) = value.split_at(slash);
    let rest = &rest[1..];

    let Some((repository, tag)) = rest.rsplit_once(':') else {
        anyhow::bail!("image reference {value:?} has no tag");
    };
    if registry.is_empty() || repository.is_empty() || tag.is_empty() {
        anyhow::bail!("image reference {value:?} must look like registry/repository:commit-hash");
    }
    if !is_full_hash(tag) {
        anyhow::bail!("deploy pins images by full commit hash; refusing tag {tag:?}");
    }

    Ok(ImageReference::new(registry, repository, tag))
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMMIT: &str = "0123456789abcdef0123456789abcdef01234567";

    #[test]
    fn parses_a_commit_tagged_reference() {
        let reference = parse_reference(&format!("ghcr.io/acme/app:{COMMIT}")).unwrap();
        assert_eq!(reference.registry, "ghcr.io");
        assert_eq!(reference.repository, "acme/app");
        assert_eq!(reference.tag, COMMIT);
    }

    #[test]
    fn accepts_a_registry_with_a_port() {
        let reference = parse_reference(&format!("localhost:5000/acme/app:{COMMIT}")).unwrap();
        assert_eq!(reference.registry, "localhost:5000");
        assert_eq!(reference.repository, "acme/app");
    }

    #[test]
    fn rejects_non_commit_tags() {
        assert!(parse_reference("ghcr.io/acme/app:latest").is_err());
        assert!(parse_reference("ghcr.io/acme/app:1.4.0").is_err());
    }

    #[test]
    fn rejects_malformed_references() {
        assert!(parse_reference("just-a-name").is_err());
        assert!(parse_reference("ghcr.io/acme/app").is_err());
        assert!(parse_reference("/acme/app:abc").is_err());
    }
}
