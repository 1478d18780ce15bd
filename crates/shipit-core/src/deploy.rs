//! Deployment request types and the deployer seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::image::ImageReference;
use crate::secret::Secret;

/// Cloud service principal for the management-plane login.
#[derive(Debug, Clone)]
pub struct CloudCredentials {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: Secret,
    pub subscription_id: String,
}

/// Request to roll a managed compute resource onto a new image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRequest {
    /// Resource (container app) name.
    pub resource: String,
    /// Resource group holding the resource.
    pub resource_group: String,
    /// Commit-tagged image reference to roll out.
    pub image: ImageReference,
}

/// Receipt for an accepted rollout request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolloutReceipt {
    pub resource: String,
    pub image: String,
    /// Provisioning status reported by the platform at acceptance.
    pub status: String,
}

/// Trait for deployment executors.
#[async_trait]
pub trait Deployer: Send + Sync {
    /// Name of this deployer.
    fn name(&self) -> &'static str;

    /// Request the rollout. The contract ends at acceptance; no health
    /// watching, no rollback.
    async fn roll_out(&self, request: &DeploymentRequest) -> Result<RolloutReceipt>;
}
