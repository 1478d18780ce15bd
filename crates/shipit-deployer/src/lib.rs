//! Managed-compute deployment for shipit.

pub mod container_apps;

pub use container_apps::ContainerAppDeployer;
