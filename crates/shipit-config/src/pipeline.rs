//! Pipeline configuration parsing.
//!
//! `shipit.kdl` carries everything a run needs apart from credentials:
//! the forge repository, the version marker location, the image
//! coordinates, and the deployment target. Credentials never live here.

use crate::{ConfigError, ConfigResult};
use kdl::{KdlDocument, KdlNode};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

const DEFAULT_API_URL: &str = "https://api.github.com";
const DEFAULT_MANAGEMENT_URL: &str = "https://management.azure.com";
const DEFAULT_LOGIN_URL: &str = "https://login.microsoftonline.com";

/// Top-level pipeline configuration (shipit.kdl).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Project name, used in run banners and logs.
    pub project: String,
    pub forge: ForgeConfig,
    pub version: VersionConfig,
    pub image: ImageConfig,
    pub deploy: DeployConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForgeConfig {
    /// API base URL.
    pub api_url: String,
    pub owner: String,
    pub repo: String,
    /// Fallback branch context when git gives no answer.
    pub branch: String,
    /// Ask the forge to generate release notes.
    pub generate_notes: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionConfig {
    /// Marker file path, relative to the repository root.
    pub marker: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    pub registry: String,
    /// Lower-cased on load; registries reject mixed-case paths.
    pub repository: String,
    /// Build context directory, relative to the repository root.
    pub context: String,
    /// Dockerfile path relative to the context.
    pub dockerfile: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Container app resource name.
    pub resource: String,
    pub resource_group: String,
    /// Management-plane base URL.
    pub management_url: String,
    /// Login endpoint base URL for the token exchange.
    pub login_url: String,
}

/// Parse a pipeline configuration from KDL text.
pub fn parse_pipeline(kdl: &str) -> ConfigResult<PipelineConfig> {
    let doc: KdlDocument = kdl.parse()?;

    let mut project = None;
    let mut forge = None;
    let mut version = None;
    let mut image = None;
    let mut deploy = None;

    for node in doc.nodes() {
        match node.name().value() {
            "project" => {
                project = Some(
                    get_first_string_arg(node)
                        .ok_or_else(|| ConfigError::MissingField("project name".to_string()))?,
                );
            }
            "forge" => forge = Some(parse_forge(node)?),
            "version" => version = Some(parse_version(node)?),
            "image" => image = Some(parse_image(node)?),
            "deploy" => deploy = Some(parse_deploy(node)?),
            _ => {} // Ignore unknown nodes
        }
    }

    Ok(PipelineConfig {
        project: project.ok_or_else(|| ConfigError::MissingField("project".to_string()))?,
        forge: forge.ok_or_else(|| ConfigError::MissingField("forge".to_string()))?,
        version: version.ok_or_else(|| ConfigError::MissingField("version".to_string()))?,
        image: image.ok_or_else(|| ConfigError::MissingField("image".to_string()))?,
        deploy: deploy.ok_or_else(|| ConfigError::MissingField("deploy".to_string()))?,
    })
}

/// Read and parse the configuration file at `path`.
pub fn load_pipeline(path: &Path) -> ConfigResult<PipelineConfig> {
    let kdl = std::fs::read_to_string(path)?;
    parse_pipeline(&kdl)
}

fn parse_forge(node: &KdlNode) -> ConfigResult<ForgeConfig> {
    let mut api_url = DEFAULT_API_URL.to_string();
    let mut owner = None;
    let mut repo = None;
    let mut branch = "main".to_string();
    let mut generate_notes = true;

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "api-url" => {
                    api_url = require_url_arg(child, "forge api-url")?;
                }
                "owner" => owner = Some(require_string_arg(child, "forge owner")?),
                "repo" => repo = Some(require_string_arg(child, "forge repo")?),
                "branch" => branch = require_string_arg(child, "forge branch")?,
                "generate-notes" => {
                    generate_notes = get_first_bool_arg(child).ok_or_else(|| {
                        ConfigError::InvalidValue {
                            field: "forge generate-notes".to_string(),
                            message: "expected #true or #false".to_string(),
                        }
                    })?;
                }
                _ => {}
            }
        }
    }

    Ok(ForgeConfig {
        api_url,
        owner: owner.ok_or_else(|| ConfigError::MissingField("forge owner".to_string()))?,
        repo: repo.ok_or_else(|| ConfigError::MissingField("forge repo".to_string()))?,
        branch,
        generate_notes,
    })
}

fn parse_version(node: &KdlNode) -> ConfigResult<VersionConfig> {
    let mut marker = None;

    if let Some(children) = node.children() {
        for child in children.nodes() {
            if child.name().value() == "marker" {
                marker = Some(require_string_arg(child, "version marker")?);
            }
        }
    }

    Ok(VersionConfig {
        marker: marker.ok_or_else(|| ConfigError::MissingField("version marker".to_string()))?,
    })
}

fn parse_image(node: &KdlNode) -> ConfigResult<ImageConfig> {
    let mut registry = None;
    let mut repository = None;
    let mut context = ".".to_string();
    let mut dockerfile = "Dockerfile".to_string();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "registry" => registry = Some(require_string_arg(child, "image registry")?),
                "repository" => repository = Some(require_string_arg(child, "image repository")?),
                "context" => context = require_string_arg(child, "image context")?,
                "dockerfile" => dockerfile = require_string_arg(child, "image dockerfile")?,
                _ => {}
            }
        }
    }

    Ok(ImageConfig {
        registry: registry
            .ok_or_else(|| ConfigError::MissingField("image registry".to_string()))?,
        repository: repository
            .ok_or_else(|| ConfigError::MissingField("image repository".to_string()))?
            .to_lowercase(),
        context,
        dockerfile,
    })
}

fn parse_deploy(node: &KdlNode) -> ConfigResult<DeployConfig> {
    let mut resource = None;
    let mut resource_group = None;
    let mut management_url = DEFAULT_MANAGEMENT_URL.to_string();
    let mut login_url = DEFAULT_LOGIN_URL.to_string();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "resource" => resource = Some(require_string_arg(child, "deploy resource")?),
                "resource-group" => {
                    resource_group = Some(require_string_arg(child, "deploy resource-group")?);
                }
                "management-url" => {
                    management_url = require_url_arg(child, "deploy management-url")?;
                }
                "login-url" => login_url = require_url_arg(child, "deploy login-url")?,
                _ => {}
            }
        }
    }

    Ok(DeployConfig {
        resource: resource
            .ok_or_else(|| ConfigError::MissingField("deploy resource".to_string()))?,
        resource_group: resource_group
            .ok_or_else(|| ConfigError::MissingField("deploy resource-group".to_string()))?,
        management_url,
        login_url,
    })
}

// Helper functions for extracting values from KDL nodes

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_first_bool_arg(node: &KdlNode) -> Option<bool> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_bool())
}

fn require_string_arg(node: &KdlNode, field: &str) -> ConfigResult<String> {
    get_first_string_arg(node).ok_or_else(|| ConfigError::MissingField(field.to_string()))
}

/// Like `require_string_arg`, but the value must parse as a URL.
fn require_url_arg(node: &KdlNode, field: &str) -> ConfigResult<String> {
    let value = require_string_arg(node, field)?;
    Url::parse(&value).map_err(|e| ConfigError::InvalidValue {
        field: field.to_string(),
        message: e.to_string(),
    })?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_config() -> &'static str {
        r##"
            project "turplanlegger"

            forge {
                api-url "https://api.github.com"
                owner "acme"
                repo "turplanlegger"
                branch "main"
                generate-notes #true
            }

            version {
                marker "turplanlegger/__about__.py"
            }

            image {
                registry "ghcr.io"
                repository "acme/turplanlegger"
                context "."
                dockerfile "Dockerfile"
            }

            deploy {
                resource "tp-api"
                resource-group "tp-prod"
            }
        "##
    }

    #[test]
    fn test_parse_full_config() {
        let config = parse_pipeline(full_config()).unwrap();
        assert_eq!(config.project, "turplanlegger");
        assert_eq!(config.forge.owner, "acme");
        assert_eq!(config.forge.repo, "turplanlegger");
        assert!(config.forge.generate_notes);
        assert_eq!(config.version.marker, "turplanlegger/__about__.py");
        assert_eq!(config.image.registry, "ghcr.io");
        assert_eq!(config.deploy.resource, "tp-api");
        assert_eq!(config.deploy.management_url, "https://management.azure.com");
    }

    #[test]
    fn test_defaults_applied() {
        let kdl = r#"
            project "app"

            forge {
                owner "acme"
                repo "app"
            }

            version {
                marker "VERSION"
            }

            image {
                registry "ghcr.io"
                repository "acme/app"
            }

            deploy {
                resource "app"
                resource-group "prod"
            }
        "#;

        let config = parse_pipeline(kdl).unwrap();
        assert_eq!(config.forge.api_url, "https://api.github.com");
        assert_eq!(config.forge.branch, "main");
        assert!(config.forge.generate_notes);
        assert_eq!(config.image.context, ".");
        assert_eq!(config.image.dockerfile, "Dockerfile");
        assert_eq!(config.deploy.login_url, "https://login.microsoftonline.com");
    }

    #[test]
    fn test_repository_lower_cased() {
        let kdl = r#"
            project "app"

            forge {
                owner "acme"
                repo "app"
            }

            version {
                marker "VERSION"
            }

            image {
                registry "ghcr.io"
                repository "Acme/App"
            }

            deploy {
                resource "app"
                resource-group "prod"
            }
        "#;

        let config = parse_pipeline(kdl).unwrap();
        assert_eq!(config.image.repository, "acme/app");
    }

    #[test]
    fn test_missing_section() {
        let kdl = r#"
            project "app"

            version {
                marker "VERSION"
            }
        "#;

        let result = parse_pipeline(kdl);
        assert!(matches!(result.unwrap_err(), ConfigError::MissingField(f) if f == "forge"));
    }

    #[test]
    fn test_missing_field_in_section() {
        let kdl = r#"
            project "app"

            forge {
                owner "acme"
            }

            version {
                marker "VERSION"
            }

            image {
                registry "ghcr.io"
                repository "acme/app"
            }

            deploy {
                resource "app"
                resource-group "prod"
            }
        "#;

        let result = parse_pipeline(kdl);
        assert!(matches!(result.unwrap_err(), ConfigError::MissingField(f) if f == "forge repo"));
    }

    #[test]
    fn test_rejects_malformed_url() {
        let kdl = r#"
            project "app"

            forge {
                api-url "not a url"
                owner "acme"
                repo "app"
            }

            version {
                marker "VERSION"
            }

            image {
                registry "ghcr.io"
                repository "acme/app"
            }

            deploy {
                resource "app"
                resource-group "prod"
            }
        "#;

        let result = parse_pipeline(kdl);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidValue { field, .. } if field == "forge api-url"
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shipit.kdl");
        std::fs::write(&path, full_config()).unwrap();
        let config = load_pipeline(&path).unwrap();
        assert_eq!(config.project, "turplanlegger");
    }
}
