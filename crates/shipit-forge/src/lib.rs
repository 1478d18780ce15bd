//! Forge client: credential broker and release publisher.
//!
//! Hand-rolled reqwest clients with explicit headers. The broker signs an
//! RS256 app assertion and exchanges it for a short-lived installation
//! token; the release publisher creates the tag+release for a resolved
//! version marker.

pub mod broker;
pub mod releases;

pub use broker::ForgeBroker;
pub use releases::ForgeReleases;

use std::time::Duration;

use shipit_core::{Error, Result};

/// User-Agent for all forge requests; the platform rejects anonymous clients.
pub(crate) const USER_AGENT: &str = "shipit";

/// Upper bound on any single forge request. Cancellation is only observed
/// between pipeline stages, so a hung call has to fail on its own.
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Internal(format!("http client construction failed: {e}")))
}
