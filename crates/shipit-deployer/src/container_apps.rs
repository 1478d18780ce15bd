//! Container-app deployer backed by the cloud management plane.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use shipit_core::deploy::{CloudCredentials, Deployer, DeploymentRequest, RolloutReceipt};
use shipit_core::secret::Secret;
use shipit_core::{Error, Result};

const API_VERSION: &str = "2024-03-01";

/// Upper bound on any single management-plane request. Cancellation is
/// only observed between pipeline stages, so a hung call has to fail on
/// its own.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Internal(format!("http client construction failed: {e}")))
}

#[derive(Deserialize)]
struct AccessTokenResponse {
    access_token: Secret,
}

/// Deployer that retargets a managed container app to a new image.
///
/// The rollout is a read-modify-write against the management API: fetch
/// the app, rewrite every container image in its template, and patch the
/// template back. The control plane restarts the app on its own.
pub struct ContainerAppDeployer {
    client: reqwest::Client,
    management_url: String,
    login_url: String,
    credentials: CloudCredentials,
}

impl ContainerAppDeployer {
    pub fn new(
        management_url: impl Into<String>,
        login_url: impl Into<String>,
        credentials: CloudCredentials,
    ) -> Result<Self> {
        Ok(Self {
            client: http_client(REQUEST_TIMEOUT)?,
            management_url: management_url.into().trim_end_matches('/').to_string(),
            login_url: login_url.into().trim_end_matches('/').to_string(),
            credentials,
        })
    }

    /// Form fields for the client-credentials grant. The token audience is
    /// the management plane the deployer talks to.
    fn token_form(&self) -> [(&'static str, String); 4] {
        [
            ("client_id", self.credentials.client_id.clone()),
            (
                "client_secret",
                self.credentials.client_secret.expose().to_string(),
            ),
            ("scope", format!("{}/.default", self.management_url)),
            ("grant_type", "client_credentials".to_string()),
        ]
    }

    /// Exchange the service principal for a management-plane token.
    async fn access_token(&self) -> Result<Secret> {
        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.login_url, self.credentials.tenant_id
        );
        let form = self.token_form();

        let response = self
            .client
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::Auth(format!("cloud token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Auth(format!("cloud login rejected ({status}): {body}")));
        }

        let token: AccessTokenResponse = response
            .json()
            .await
            .map_err(|e| Error::Auth(format!("malformed token response: {e}")))?;

        debug!("management token acquired");
        Ok(token.access_token)
    }

    fn resource_url(&self, request: &DeploymentRequest) -> String {
        format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.App/containerApps/{}?api-version={}",
            self.management_url,
            urlencoding::encode(&self.credentials.subscription_id),
            urlencoding::encode(&request.resource_group),
            urlencoding::encode(&request.resource),
            API_VERSION,
        )
    }
}

/// Copy the app's container list with every image replaced by `image`.
///
/// The rest of each container entry (env, probes, resources) is kept so
/// the patch does not strip configuration the app already has.
fn retarget_containers(resource: &Value, image: &str) -> std::result::Result<Value, String> {
    let containers = resource
        .pointer("/properties/template/containers")
        .and_then(Value::as_array)
        .ok_or_else(|| "resource has no container template".to_string())?;

    if containers.is_empty() {
        return Err("resource template lists no containers".to_string());
    }

    let mut patched = containers.clone();
    for container in patched.iter_mut() {
        match container.as_object_mut() {
            Some(fields) => {
                fields.insert("image".to_string(), Value::String(image.to_string()));
            }
            None => return Err("container entry is not an object".to_string()),
        }
    }

    Ok(Value::Array(patched))
}

fn classify_fetch_failure(
    status: StatusCode,
    body: &str,
    resource: &str,
    resource_group: &str,
) -> Error {
    match status {
        StatusCode::NOT_FOUND => Error::Deploy(format!(
            "container app {resource} not found in resource group {resource_group}"
        )),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Auth(format!(
            "management api rejected the token ({status}): {body}"
        )),
        _ => Error::Deploy(format!("fetching container app failed ({status}): {body}")),
    }
}

#[async_trait]
impl Deployer for ContainerAppDeployer {
    fn name(&self) -> &'static str {
        "container-apps"
    }

    async fn roll_out(&self, request: &DeploymentRequest) -> Result<RolloutReceipt> {
        let token = self.access_token().await?;
        let url = self.resource_url(request);
        let image = request.image.canonical();

        let response = self
            .client
            .get(&url)
            .bearer_auth(token.expose())
            .send()
            .await
            .map_err(|e| Error::Deploy(format!("fetching container app failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_fetch_failure(
                status,
                &body,
                &request.resource,
                &request.resource_group,
            ));
        }

        let resource: Value = response
            .json()
            .await
            .map_err(|e| Error::Deploy(format!("malformed container app resource: {e}")))?;

        let containers = retarget_containers(&resource, &image).map_err(Error::Deploy)?;
        let patch = serde_json::json!({
            "properties": {
                "template": {
                    "containers": containers,
                }
            }
        });

        info!(resource = %request.resource, image = %image, "rolling out image");
        let response = self
            .client
            .patch(&url)
            .bearer_auth(token.expose())
            .json(&patch)
            .send()
            .await
            .map_err(|e| Error::Deploy(format!("container app update failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Deploy(format!(
                "container app update rejected ({status}): {body}"
            )));
        }

        // 202 responses carry no body; 200 responses echo the resource.
        let body: Value = response.json().await.unwrap_or(Value::Null);
        let state = body
            .pointer("/properties/provisioningState")
            .and_then(Value::as_str)
            .unwrap_or("accepted")
            .to_string();

        info!(resource = %request.resource, status = %state, "rollout accepted");
        Ok(RolloutReceipt {
            resource: request.resource.clone(),
            image,
            status: state,
        })
    }
}


/// Integration tests that require live cloud credentials.
/// Run with: cargo test -p shipit-deployer -- --ignored
#[cfg(test)]
mod integration_tests {
    use super::*;

    #[tokio::test]
    #[ignore]
    async fn acquires_a_management_token() {
        let credentials = CloudCredentials {
            tenant_id: std::env::var("SHIPIT_CLOUD_TENANT_ID").expect("SHIPIT_CLOUD_TENANT_ID"),
            client_id: std::env::var("SHIPIT_CLOUD_CLIENT_ID").expect("SHIPIT_CLOUD_CLIENT_ID"),
            client_secret: Secret::new(
                std::env::var("SHIPIT_CLOUD_CLIENT_SECRET").expect("SHIPIT_CLOUD_CLIENT_SECRET"),
            ),
            subscription_id: std::env::var("SHIPIT_CLOUD_SUBSCRIPTION_ID")
                .expect("SHIPIT_CLOUD_SUBSCRIPTION_ID"),
        };

        let deployer = ContainerAppDeployer::new(
            "https://management.azure.com",
            "https://login.microsoftonline.com",
            credentials,
        )
        .unwrap();
        deployer.access_token().await.unwrap();
    }
}
