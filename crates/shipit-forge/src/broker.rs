//! Credential broker: signed app assertion to installation token.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tracing::debug;

use shipit_core::broker::{AppAuth, CredentialBroker, InstallationToken};
use shipit_core::secret::Secret;
use shipit_core::{Error, Result};

use crate::USER_AGENT;

/// Assertion claims. The platform caps assertion lifetime at ten minutes;
/// the backdated `iat` absorbs clock drift between us and the forge.
#[derive(Debug, Serialize)]
struct AssertionClaims {
    iat: i64,
    exp: i64,
    iss: String,
}

impl AssertionClaims {
    fn new(app_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            iat: (now - Duration::seconds(30)).timestamp(),
            exp: (now + Duration::minutes(9)).timestamp(),
            iss: app_id.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Secret,
    expires_at: DateTime<Utc>,
}

/// Exchanges the app identity for installation tokens.
///
/// One network call per exchange; neither the assertion nor the token is
/// retained on the broker.
pub struct ForgeBroker {
    client: reqwest::Client,
    api_url: String,
    auth: AppAuth,
}

impl ForgeBroker {
    pub fn new(api_url: impl Into<String>, auth: AppAuth) -> Result<Self> {
        Ok(Self {
            client: crate::http_client(crate::REQUEST_TIMEOUT)?,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            auth,
        })
    }

    /// Sign the RS256 app assertion.
    fn sign_assertion(&self, now: DateTime<Utc>) -> Result<String> {
        let key = EncodingKey::from_rsa_pem(self.auth.private_key_pem.expose().as_bytes())
            .map_err(|e| Error::Auth(format!("app private key rejected: {e}")))?;
        let claims = AssertionClaims::new(&self.auth.app_id, now);
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| Error::Auth(format!("assertion signing failed: {e}")))
    }
}

#[async_trait]
impl CredentialBroker for ForgeBroker {
    fn name(&self) -> &'static str {
        "forge"
    }

    async fn installation_token(&self) -> Result<InstallationToken> {
        let assertion = self.sign_assertion(Utc::now())?;
        let url = format!(
            "{}/app/installations/{}/access_tokens",
            self.api_url, self.auth.installation_id
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {assertion}"))
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| Error::Auth(format!("token exchange request failed: {e}")))?;

        let status = response.status();
        if status != reqwest::StatusCode::CREATED {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Auth(format!(
                "token exchange rejected ({status}): {text}"
            )));
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::Auth(format!("token response malformed: {e}")))?;

        debug!(expires_at = %parsed.expires_at, "installation token minted");

        Ok(InstallationToken {
            token: parsed.token,
            expires_at: parsed.expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claims_window_is_backdated_and_capped() {
        let now = Utc::now();
        let claims = AssertionClaims::new("12345", now);

        assert_eq!(claims.iss, "12345");
        assert_eq!(claims.iat, (now - Duration::seconds(30)).timestamp());
        assert_eq!(claims.exp, (now + Duration::minutes(9)).timestamp());
        // Under the platform's ten-minute cap.
        assert!(claims.exp - now.timestamp() < 600);
        assert!(claims.iat < now.timestamp());
    }

    #[test]
    fn malformed_private_key_is_an_auth_error() {
        let broker = ForgeBroker::new(
            "https://api.github.com",
            AppAuth {
                app_id: "12345".into(),
                private_key_pem: Secret::new("not a pem"),
                installation_id: "67890".into(),
            },
        )
        .unwrap();

        let err = broker.sign_assertion(Utc::now()).unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
        assert!(err.to_string().contains("private key"));
    }

    #[test]
    fn token_url_has_no_trailing_slash_artifacts() {
        let broker = ForgeBroker::new(
            "https://api.github.com/",
            AppAuth {
                app_id: "1".into(),
                private_key_pem: Secret::new("x"),
                installation_id: "2".into(),
            },
        )
        .unwrap();
        assert_eq!(broker.api_url, "https://api.github.com");
    }
}

#[cfg(test)]
mod integration_tests {
    //! Tests against the live forge. Run with:
    //! SHIPIT_APP_ID=... SHIPIT_APP_PRIVATE_KEY=... SHIPIT_APP_INSTALLATION_ID=... \
    //!   cargo test -p shipit-forge -- --ignored

    use super::*;

    #[tokio::test]
    #[ignore]
    async fn exchanges_live_credentials() {
        let auth = AppAuth {
            app_id: std::env::var("SHIPIT_APP_ID").expect("SHIPIT_APP_ID"),
            private_key_pem: Secret::new(
                std::env::var("SHIPIT_APP_PRIVATE_KEY").expect("SHIPIT_APP_PRIVATE_KEY"),
            ),
            installation_id: std::env::var("SHIPIT_APP_INSTALLATION_ID")
                .expect("SHIPIT_APP_INSTALLATION_ID"),
        };

        let broker = ForgeBroker::new("https://api.github.com", auth).unwrap();
        let token = broker.installation_token().await.unwrap();
        assert!(token.expires_at > Utc::now());
    }
}
