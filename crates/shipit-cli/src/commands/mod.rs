//! CLI command implementations.

pub mod check;
pub mod plan;
pub mod run;
pub mod stages;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use shipit_config::git::{self, GitContext};
use shipit_config::{PipelineConfig, credentials, load_pipeline};
use shipit_core::broker::CredentialBroker;
use shipit_core::deploy::Deployer;
use shipit_core::image::ImagePublisher;
use shipit_core::release::ReleaseHost;
use shipit_deployer::ContainerAppDeployer;
use shipit_forge::{ForgeBroker, ForgeReleases};
use shipit_image::DockerImagePublisher;

/// Configuration plus git context, loaded once per command.
pub struct CommandContext {
    pub config: PipelineConfig,
    pub git: GitContext,
    /// Directory holding the configuration file; relative paths in the
    /// configuration resolve against it.
    pub root: PathBuf,
}

pub fn load_config(config_path: &str) -> Result<PipelineConfig> {
    load_pipeline(Path::new(config_path)).with_context(|| format!("failed to load {config_path}"))
}

pub fn load_context(config_path: &str) -> Result<CommandContext> {
    let config = load_config(config_path)?;
    let root = repo_root(config_path).to_path_buf();
    let mut git = git::resolve_context(&root)?;
    if git.branch.is_none() {
        // Detached HEAD in CI; the configured branch is the answer of record.
        git.branch = Some(config.forge.branch.clone());
    }
    Ok(CommandContext { config, git, root })
}

/// The repository root is the directory holding the configuration file.
pub fn repo_root(config_path: &str) -> &Path {
    Path::new(config_path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
}

pub fn make_broker(config: &PipelineConfig) -> Result<Arc<dyn CredentialBroker>> {
    let auth = credentials::app_auth_from_env()?;
    Ok(Arc::new(ForgeBroker::new(
        config.forge.api_url.clone(),
        auth,
    )?))
}

pub fn make_releases(config: &PipelineConfig) -> Result<Arc<dyn ReleaseHost>> {
    Ok(Arc::new(ForgeReleases::new(
        config.forge.api_url.clone(),
        config.forge.owner.clone(),
        config.forge.repo.clone(),
    )?))
}

pub fn make_images() -> Result<Arc<dyn ImagePublisher>> {
    let auth = credentials::registry_auth_from_env()?;
    let publisher = DockerImagePublisher::new(auth)?;
    Ok(Arc::new(publisher))
}

pub fn make_deployer(config: &PipelineConfig) -> Result<Arc<dyn Deployer>> {
    let cloud = credentials::cloud_credentials_from_env()?;
    Ok(Arc::new(ContainerAppDeployer::new(
        config.deploy.management_url.clone(),
        config.deploy.login_url.clone(),
        cloud,
    )?))
}
