//! Container image building and registry publishing for shipit.

pub mod context;
pub mod docker;

pub use docker::DockerImagePublisher;
