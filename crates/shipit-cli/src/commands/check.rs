//! Preflight checks, run before anything mutates.

use anyhow::Result;
use shipit_config::{credentials, git};
use shipit_core::version::read_marker;
use shipit_image::DockerImagePublisher;

use super::{load_config, repo_root};

/// Verify configuration, marker, git, and the docker daemon, in that
/// order. The first failing check ends the command.
pub async fn preflight(config_path: &str) -> Result<()> {
    let config = load_config(config_path)?;
    println!("✓ configuration: {} ({})", config.project, config_path);

    let root = repo_root(config_path);
    let marker = root.join(&config.version.marker);
    let version = read_marker(&marker)?;
    println!("✓ version marker: {} ({})", version, marker.display());

    let git = git::resolve_context(root)?;
    println!("✓ git: commit {}", git.commit);

    let auth = credentials::registry_auth_from_env()?;
    let publisher = DockerImagePublisher::new(auth)?;
    publisher.ping().await?;
    println!("✓ docker daemon reachable");

    println!("\nall checks passed");
    Ok(())
}
