//! Error taxonomy for shipit.
//!
//! Each variant corresponds to one failure class of the pipeline and maps
//! to a distinct process exit code, so CI wrappers can branch on the kind
//! of failure without parsing output.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("version marker invalid: {0}")]
    VersionFormat(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("image build failed: {0}")]
    Build(String),

    #[error("publish incomplete: {reason} (pushed: {}; failed: {})", .pushed.join(", "), .failed.join(", "))]
    Publish {
        /// Tags confirmed on the registry.
        pushed: Vec<String>,
        /// Tags that did not land.
        failed: Vec<String>,
        reason: String,
    },

    #[error("deployment failed: {0}")]
    Deploy(String),

    #[error("cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Exit code for this failure class.
    ///
    /// Codes are stable: wrappers distinguish a version-format problem (fix
    /// the marker) from a conflict (bump the marker) from an auth problem
    /// (rotate credentials) purely by code.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Auth(_) => 10,
            Error::VersionFormat(_) => 11,
            Error::Conflict(_) => 12,
            Error::Build(_) => 13,
            Error::Publish { .. } => 14,
            Error::Deploy(_) => 15,
            Error::Cancelled => 16,
            Error::Io(_) | Error::Internal(_) => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct_per_failure_class() {
        let errors = vec![
            Error::Auth("x".into()),
            Error::VersionFormat("x".into()),
            Error::Conflict("x".into()),
            Error::Build("x".into()),
            Error::Publish {
                pushed: vec![],
                failed: vec![],
                reason: "x".into(),
            },
            Error::Deploy("x".into()),
            Error::Cancelled,
        ];
        let mut codes: Vec<i32> = errors.iter().map(|e| e.exit_code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
        assert!(codes.iter().all(|c| *c != 0));
    }

    #[test]
    fn publish_error_names_both_tag_groups() {
        let err = Error::Publish {
            pushed: vec!["latest".into(), "1.4.0".into()],
            failed: vec!["abc123".into()],
            reason: "connection reset".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("latest, 1.4.0"));
        assert!(msg.contains("abc123"));
        assert!(msg.contains("connection reset"));
    }
}
