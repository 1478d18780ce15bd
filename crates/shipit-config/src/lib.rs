//! KDL configuration and credential loading for shipit.
//!
//! This crate handles:
//! - Pipeline definitions (shipit.kdl)
//! - Environment-scoped credential loading
//! - Git commit/branch context resolution

pub mod credentials;
pub mod error;
pub mod git;
pub mod pipeline;

pub use error::{ConfigError, ConfigResult};
pub use pipeline::{
    DeployConfig, ForgeConfig, ImageConfig, PipelineConfig, VersionConfig, load_pipeline,
    parse_pipeline,
};
