//! Credential broker types and seam.
//!
//! The broker exchanges a platform app identity (app id + private key +
//! installation id) for a short-lived installation token. The token lives
//! for one pipeline run and is never persisted or logged.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::Result;
use crate::secret::Secret;

/// App identity used to mint installation tokens.
#[derive(Debug, Clone)]
pub struct AppAuth {
    /// Platform-assigned app id (the `iss` claim of the assertion).
    pub app_id: String,
    /// RSA private key in PEM form.
    pub private_key_pem: Secret,
    /// Installation of the app on the target account.
    pub installation_id: String,
}

/// A short-lived installation token.
#[derive(Debug, Clone)]
pub struct InstallationToken {
    pub token: Secret,
    pub expires_at: DateTime<Utc>,
}

/// Trait for credential brokers.
#[async_trait]
pub trait CredentialBroker: Send + Sync {
    /// Name of this broker.
    fn name(&self) -> &'static str;

    /// Exchange the app identity for an installation token.
    async fn installation_token(&self) -> Result<InstallationToken>;
}
