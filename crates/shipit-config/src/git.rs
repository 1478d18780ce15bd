//! Git commit and branch context resolution.
//!
//! CI environments provide the commit through well-known variables;
//! outside CI the local repository is asked directly. The commit feeds
//! the immutable image tag, so only a full hash is accepted.

use std::path::Path;
use std::process::Command;

use crate::{ConfigError, ConfigResult};

/// Commit and branch a run operates on.
#[derive(Debug, Clone)]
pub struct GitContext {
    /// Full commit hash.
    pub commit: String,
    pub branch: Option<String>,
}

/// Resolve the commit context for `repo_path`.
///
/// Commit: `SHIPIT_COMMIT`, `GITHUB_SHA`, `CI_COMMIT_SHA`, else
/// `git rev-parse HEAD`. Branch: the analogous chain, with `None` when a
/// detached HEAD gives no answer (the caller falls back to configuration).
pub fn resolve_context(repo_path: &Path) -> ConfigResult<GitContext> {
    let commit = std::env::var("SHIPIT_COMMIT")
        .or_else(|_| std::env::var("GITHUB_SHA"))
        .or_else(|_| std::env::var("CI_COMMIT_SHA"))
        .ok()
        .or_else(|| run_git(repo_path, &["rev-parse", "HEAD"]))
        .ok_or_else(|| ConfigError::InvalidValue {
            field: "commit".to_string(),
            message: "no commit in the environment and no git repository".to_string(),
        })?;

    if !is_full_hash(&commit) {
        return Err(ConfigError::InvalidValue {
            field: "commit".to_string(),
            message: format!("{commit:?} is not a full commit hash"),
        });
    }

    let branch = std::env::var("SHIPIT_BRANCH")
        .or_else(|_| std::env::var("GITHUB_REF_NAME"))
        .or_else(|_| std::env::var("CI_COMMIT_BRANCH"))
        .ok()
        .or_else(|| {
            run_git(repo_path, &["rev-parse", "--abbrev-ref", "HEAD"]).filter(|b| b != "HEAD")
        });

    Ok(GitContext { commit, branch })
}

/// Whether `s` is a full 40-character hex commit hash.
pub fn is_full_hash(s: &str) -> bool {
    s.len() == 40 && s.chars().all(|c| c.is_ascii_hexdigit())
}

fn run_git(repo_path: &Path, args: &[&str]) -> Option<String> {
    Command::new("git")
        .args(args)
        .current_dir(repo_path)
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        .filter(|s| !s.is_empty())
}
