//! Static run inputs, distilled from configuration and git state.

use std::path::{Path, PathBuf};

use shipit_config::PipelineConfig;
use shipit_config::git::GitContext;
use shipit_core::deploy::DeploymentRequest;
use shipit_core::image::{ImageBuildSpec, ImageReference, TagSet};
use shipit_core::release::ReleaseRequest;
use shipit_core::version::VersionMarker;

/// Everything a run needs before any stage has produced output.
///
/// The version, tag set, and deployment image are deliberately absent:
/// those only exist once the resolve and publish stages have run.
#[derive(Debug, Clone)]
pub struct RunPlan {
    /// File holding the single version assignment line.
    pub marker_path: PathBuf,
    /// Full commit hash the run releases, tags, and deploys.
    pub commit: String,
    pub registry: String,
    pub repository: String,
    /// Image build context directory.
    pub context: PathBuf,
    pub dockerfile: String,
    pub generate_notes: bool,
    pub resource: String,
    pub resource_group: String,
}

impl RunPlan {
    /// Distill a plan from the loaded configuration and git context.
    ///
    /// Relative marker and context paths resolve against `root`, the
    /// repository root, so a run behaves the same from any working
    /// directory.
    pub fn from_config(config: &PipelineConfig, git: &GitContext, root: &Path) -> Self {
        Self {
            marker_path: root.join(&config.version.marker),
            commit: git.commit.clone(),
            registry: config.image.registry.clone(),
            repository: config.image.repository.clone(),
            context: root.join(&config.image.context),
            dockerfile: config.image.dockerfile.clone(),
            generate_notes: config.forge.generate_notes,
            resource: config.deploy.resource.clone(),
            resource_group: config.deploy.resource_group.clone(),
        }
    }

    /// Derive the three-tag fan-out once the version marker is known.
    pub fn tag_set(&self, version: &VersionMarker) -> TagSet {
        TagSet::derive(&self.registry, &self.repository, version, &self.commit)
    }

    /// Release request for a resolved version. The tag is the marker
    /// verbatim and the release points at the exact commit under release.
    pub fn release_request(&self, version: &VersionMarker) -> ReleaseRequest {
        ReleaseRequest {
            tag: version.clone(),
            target: self.commit.clone(),
            title: version.to_string(),
            generate_notes: self.generate_notes,
            make_latest: true,
        }
    }

    /// Build inputs for the image stage.
    pub fn build_spec(&self, version: &VersionMarker) -> ImageBuildSpec {
        ImageBuildSpec {
            context: self.context.clone(),
            dockerfile: self.dockerfile.clone(),
            tags: self.tag_set(version),
        }
    }

    /// Rollout request for a published image reference.
    pub fn deployment_request(&self, image: &ImageReference) -> DeploymentRequest {
        DeploymentRequest {
            resource: self.resource.clone(),
            resource_group: self.resource_group.clone(),
            image: image.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipit_config::{DeployConfig, ForgeConfig, ImageConfig, VersionConfig};

    fn make_config() -> PipelineConfig {
        PipelineConfig {
            project: "turplanlegger".to_string(),
            forge: ForgeConfig {
                api_url: "https://api.github.com".to_string(),
                owner: "acme".to_string(),
                repo: "turplanlegger".to_string(),
                branch: "main".to_string(),
                generate_notes: true,
            },
            version: VersionConfig {
                marker: "turplanlegger/__about__.py".to_string(),
            },
            image: ImageConfig {
                registry: "ghcr.io".to_string(),
                repository: "acme/turplanlegger".to_string(),
                context: ".".to_string(),
                dockerfile: "Dockerfile".to_string(),
            },
            deploy: DeployConfig {
                resource: "turplanlegger-api".to_string(),
                resource_group: "prod".to_string(),
                management_url: "https://management.azure.com".to_string(),
                login_url: "https://login.microsoftonline.com".to_string(),
            },
        }
    }

    fn make_git() -> GitContext {
        GitContext {
            commit: "0123456789abcdef0123456789abcdef01234567".to_string(),
            branch: Some("main".to_string()),
        }
    }

    #[test]
    fn plan_carries_config_and_git_inputs() {
        let plan = RunPlan::from_config(&make_config(), &make_git(), Path::new(""));

        assert_eq!(plan.marker_path, PathBuf::from("turplanlegger/__about__.py"));
        assert_eq!(plan.commit, "0123456789abcdef0123456789abcdef01234567");
        assert_eq!(plan.registry, "ghcr.io");
        assert_eq!(plan.resource, "turplanlegger-api");
    }

    #[test]
    fn relative_paths_resolve_against_the_repo_root() {
        let mut config = make_config();
        config.image.context = "services/api".to_string();
        let plan = RunPlan::from_config(&config, &make_git(), Path::new("/repo"));

        assert_eq!(
            plan.marker_path,
            PathBuf::from("/repo/turplanlegger/__about__.py")
        );
        assert_eq!(plan.context, PathBuf::from("/repo/services/api"));
    }

    #[test]
    fn absolute_marker_paths_are_left_alone() {
        let mut config = make_config();
        config.version.marker = "/elsewhere/__about__.py".to_string();
        let plan = RunPlan::from_config(&config, &make_git(), Path::new("/repo"));

        assert_eq!(plan.marker_path, PathBuf::from("/elsewhere/__about__.py"));
    }

    #[test]
    fn release_request_targets_the_commit_and_marks_latest() {
        let plan = RunPlan::from_config(&make_config(), &make_git(), Path::new(""));
        let version = VersionMarker::parse("1.4.0").unwrap();

        let request = plan.release_request(&version);
        assert_eq!(request.tag.as_str(), "1.4.0");
        assert_eq!(request.target, plan.commit);
        assert_eq!(request.title, "1.4.0");
        assert!(request.generate_notes);
        assert!(request.make_latest);
    }

    #[test]
    fn build_spec_fans_out_to_three_tags() {
        let plan = RunPlan::from_config(&make_config(), &make_git(), Path::new(""));
        let version = VersionMarker::parse("1.4.0").unwrap();

        let spec = plan.build_spec(&version);
        assert_eq!(spec.tags.latest.tag, "latest");
        assert_eq!(spec.tags.version.tag, "1.4.0");
        assert_eq!(spec.tags.commit.tag, plan.commit);
        assert_eq!(spec.dockerfile, "Dockerfile");
    }

    #[test]
    fn deployment_request_pins_the_given_reference() {
        let plan = RunPlan::from_config(&make_config(), &make_git(), Path::new(""));
        let version = VersionMarker::parse("1.4.0").unwrap();
        let tags = plan.tag_set(&version);

        let request = plan.deployment_request(&tags.commit);
        assert_eq!(request.resource, "turplanlegger-api");
        assert_eq!(request.resource_group, "prod");
        assert_eq!(request.image.tag, plan.commit);
    }
}
